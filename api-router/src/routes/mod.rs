pub mod articles;
pub mod liveness;
pub mod qa;
pub mod readiness;
