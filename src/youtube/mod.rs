pub mod extractor;
pub mod url;
