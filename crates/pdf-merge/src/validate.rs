//! Validation of uploaded document bytes
//!
//! Every input, however malformed, produces a [`DocumentReport`]. Parse failures
//! become [`Validity::Invalid`] values with a readable reason; nothing here panics
//! or returns an error.

use lopdf::{Dictionary, Document, Object};
use std::panic::{self, AssertUnwindSafe};

/// The PDF header may be preceded by junk; readers search the first kilobyte for it.
const HEADER_SEARCH_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Why a file was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InvalidKind {
    /// Has a PDF header but the structure cannot be parsed
    Corrupt,
    /// Protected by a password we cannot open
    Encrypted,
    /// Zero bytes
    Empty,
    /// Not a PDF at all
    #[cfg_attr(feature = "serde", serde(rename = "not_pdf"))]
    NotThisFormat,
}

impl InvalidKind {
    /// Stable wire name
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidKind::Corrupt => "corrupt",
            InvalidKind::Encrypted => "encrypted",
            InvalidKind::Empty => "empty",
            InvalidKind::NotThisFormat => "not_pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum Validity {
    Valid { page_count: usize },
    Invalid { kind: InvalidKind, reason: String },
}

/// Outcome of validating one uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentReport {
    pub filename: String,
    pub validity: Validity,
    pub byte_size: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl DocumentReport {
    pub fn is_valid(&self) -> bool {
        matches!(self.validity, Validity::Valid { .. })
    }

    pub fn page_count(&self) -> Option<usize> {
        match self.validity {
            Validity::Valid { page_count } => Some(page_count),
            Validity::Invalid { .. } => None,
        }
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        match &self.validity {
            Validity::Valid { .. } => None,
            Validity::Invalid { reason, .. } => Some(reason),
        }
    }
}

/// Totals over a list of validated files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileListSummary {
    pub total_files: usize,
    pub valid_files: usize,
    pub total_pages: usize,
    /// Bytes across valid files only
    pub total_size: usize,
}

pub fn summarize(reports: &[DocumentReport]) -> FileListSummary {
    reports
        .iter()
        .fold(FileListSummary::default(), |mut summary, report| {
            summary.total_files += 1;
            if let Some(pages) = report.page_count() {
                summary.valid_files += 1;
                summary.total_pages += pages;
                summary.total_size += report.byte_size;
            }
            summary
        })
}

/// Check whether `bytes` hold a readable PDF and extract its page count and metadata.
pub fn validate_document(filename: impl Into<String>, bytes: &[u8]) -> DocumentReport {
    let filename = filename.into();
    let byte_size = bytes.len();

    match inspect(bytes) {
        Ok(info) => DocumentReport {
            filename,
            validity: Validity::Valid {
                page_count: info.page_count,
            },
            byte_size,
            title: info.title,
            author: info.author,
        },
        Err((kind, reason)) => {
            log::debug!("Rejected {filename}: {reason}");
            DocumentReport {
                filename,
                validity: Validity::Invalid { kind, reason },
                byte_size,
                title: None,
                author: None,
            }
        }
    }
}

struct DocumentInfo {
    page_count: usize,
    title: Option<String>,
    author: Option<String>,
}

fn inspect(bytes: &[u8]) -> std::result::Result<DocumentInfo, (InvalidKind, String)> {
    if bytes.is_empty() {
        return Err((InvalidKind::Empty, "file is empty".to_string()));
    }
    if !has_pdf_header(bytes) {
        return Err((
            InvalidKind::NotThisFormat,
            "not a PDF file (missing %PDF- header)".to_string(),
        ));
    }

    // lopdf can panic on some malformed cross-reference tables
    let doc = match panic::catch_unwind(AssertUnwindSafe(|| Document::load_mem(bytes))) {
        Ok(Ok(doc)) => doc,
        Ok(Err(e)) if declares_encryption(bytes) => {
            return Err((InvalidKind::Encrypted, format!("document is encrypted: {e}")));
        }
        Ok(Err(e)) => {
            return Err((InvalidKind::Corrupt, format!("failed to parse PDF: {e}")));
        }
        Err(_) => {
            return Err((
                InvalidKind::Corrupt,
                "PDF parser aborted on malformed input".to_string(),
            ));
        }
    };

    if doc.is_encrypted() {
        return Err((
            InvalidKind::Encrypted,
            "document is password protected".to_string(),
        ));
    }

    let page_count = doc.get_pages().len();
    if page_count == 0 {
        return Err((InvalidKind::Corrupt, "document has no pages".to_string()));
    }

    let info = info_dictionary(&doc);
    Ok(DocumentInfo {
        page_count,
        title: info.and_then(|dict| info_string(dict, b"Title")),
        author: info.and_then(|dict| info_string(dict, b"Author")),
    })
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

fn declares_encryption(bytes: &[u8]) -> bool {
    const ENCRYPT: &[u8] = b"/Encrypt";
    bytes.windows(ENCRYPT.len()).any(|w| w == ENCRYPT)
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let raw = dict.get(key).ok()?.as_str().ok()?;
    let text = decode_text_string(raw);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, otherwise byte-wise.
fn decode_text_string(raw: &[u8]) -> String {
    match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_may_follow_leading_junk() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.7\n");
        assert!(has_pdf_header(&bytes));
        assert!(!has_pdf_header(b"GIF89a"));
    }

    #[test]
    fn test_header_outside_window_is_ignored() {
        let mut bytes = vec![0u8; HEADER_SEARCH_WINDOW + 10];
        bytes.extend_from_slice(b"%PDF-1.4");
        assert!(!has_pdf_header(&bytes));
    }

    #[test]
    fn test_decode_utf16_text_string() {
        let raw = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_text_string(&raw), "Hi");
        assert_eq!(decode_text_string(b"Plain"), "Plain");
    }

    #[test]
    fn test_invalid_kind_wire_names() {
        assert_eq!(InvalidKind::Corrupt.as_str(), "corrupt");
        assert_eq!(InvalidKind::NotThisFormat.as_str(), "not_pdf");
    }
}
