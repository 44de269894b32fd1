use std::path::Path;

use lopdf::Document;
use tracing::debug;

use common::error::AppError;

/// Extract page-level text from a PDF file.
///
/// Parsing runs on the blocking pool to keep the executor free. The returned
/// vector has one entry per page, in order; pages without a text layer come
/// back empty and are left for the caller to drop.
pub async fn extract_page_text(path: &Path) -> Result<Vec<String>, AppError> {
    let bytes = tokio::fs::read(path).await?;

    let page_count = load_page_count(bytes.clone()).await?;
    if page_count == 0 {
        return Err(AppError::Processing("PDF appears to have no pages".into()));
    }

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    })
    .await?
    .map_err(|err| AppError::Processing(format!("failed to extract text from PDF: {err}")))?;

    if pages.len() != page_count {
        debug!(
            structural = page_count,
            extracted = pages.len(),
            "page count mismatch between PDF structure and text extraction"
        );
    }

    Ok(pages)
}

/// Parse the PDF structure to count pages, off the async executor.
async fn load_page_count(bytes: Vec<u8>) -> Result<usize, AppError> {
    let count = tokio::task::spawn_blocking(move || -> Result<usize, AppError> {
        let document = Document::load_mem(&bytes)
            .map_err(|err| AppError::Processing(format!("failed to parse PDF: {err}")))?;
        Ok(document.get_pages().len())
    })
    .await??;

    Ok(count)
}
