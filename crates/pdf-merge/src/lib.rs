pub mod combine;
mod io;
mod naming;
mod types;
mod validate;

pub use combine::{CombineBackend, Combiner, LopdfBackend, LopdfCombiner, merge_documents};
pub use io::{SourceFile, read_input_list, read_source, read_sources, write_output};
pub use naming::{DEFAULT_OUTPUT_NAME, sanitize_output_name};
pub use types::*;
pub use validate::{
    DocumentReport, FileListSummary, InvalidKind, Validity, summarize, validate_document,
};
