use text_splitter::TextSplitter;

/// Split page text into chunks bounded by `max_chars`, sized for the
/// embedding model input-size limit. Splits fall on semantic boundaries where
/// the text allows.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let splitter = TextSplitter::new(max_chars.max(1));
    splitter.chunks(text).map(str::to_string).collect()
}
