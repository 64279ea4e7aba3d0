//! File I/O for command-line merges

use crate::types::*;
use std::path::{Path, PathBuf};

/// Raw bytes of an input file together with its display name
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Read a single input file
pub async fn read_source(path: impl AsRef<Path>) -> Result<SourceFile> {
    let path = path.as_ref().to_owned();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(source) => return Err(MergeError::ReadSource { path, source }),
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceFile {
        path,
        filename,
        bytes,
    })
}

/// Read several input files, keeping their order. Stops at the first unreadable file.
pub async fn read_sources(paths: &[impl AsRef<Path>]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        sources.push(read_source(path).await?);
    }
    Ok(sources)
}

/// Read a list of input paths, one per line; blank lines are skipped
pub async fn read_input_list(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Write merged output, creating parent directories as needed
pub async fn write_output(bytes: &[u8], path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
    let path = path.as_ref();
    if !overwrite && tokio::fs::try_exists(path).await? {
        return Err(MergeError::OutputExists(path.to_owned()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
