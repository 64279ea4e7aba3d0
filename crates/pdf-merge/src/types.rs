use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read {}: {source}", .path.display())]
    ReadSource {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Document is encrypted")]
    Encrypted,
    #[error("No pages to merge")]
    NoPages,
    #[error("Output file already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, MergeError>;

/// Page size used when neither a page nor its ancestors declare a MediaBox (US Letter, points)
pub const DEFAULT_PAGE_DIMENSIONS: (i64, i64) = (612, 792);
