use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_merge::{DocumentReport, FileListSummary, SourceFile, summarize, validate_document};
use pdf_merge_jobs::{JobStatus, JobStore, StoreConfig, UploadedFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "pdfm", about = "Merge PDF files", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge PDF files into one, in the order given
    Merge {
        #[command(flatten)]
        inputs: Inputs,

        /// Output PDF file
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite the output file if it exists
        #[arg(short, long)]
        force: bool,

        /// Don't show a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show page count, size and metadata of PDF files
    Info {
        #[command(flatten)]
        inputs: Inputs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check that every input is a readable PDF
    Validate {
        #[command(flatten)]
        inputs: Inputs,
    },
}

#[derive(Args)]
struct Inputs {
    /// Input PDF files
    files: Vec<PathBuf>,

    /// Text file listing input PDFs, one path per line
    #[arg(short, long)]
    input_list: Option<PathBuf>,
}

impl Inputs {
    async fn resolve(&self) -> Result<Vec<PathBuf>> {
        let mut paths = self.files.clone();
        if let Some(list) = &self.input_list {
            let listed = pdf_merge::read_input_list(list)
                .await
                .with_context(|| format!("Failed to read input list {}", list.display()))?;
            paths.extend(listed);
        }
        if paths.is_empty() {
            bail!("No input files given");
        }
        Ok(paths)
    }

    async fn read(&self) -> Result<Vec<SourceFile>> {
        let paths = self.resolve().await?;
        Ok(pdf_merge::read_sources(&paths).await?)
    }
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    files: &'a [DocumentReport],
    summary: FileListSummary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Merge {
            inputs,
            output,
            force,
            no_progress,
        } => merge(&inputs, &output, force, no_progress).await?,

        Commands::Info { inputs, json } => {
            let reports = validate_all(&inputs).await?;
            let summary = summarize(&reports);
            if json {
                let out = InfoOutput {
                    files: &reports,
                    summary,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for report in &reports {
                    println!("{}", describe(report));
                }
                println!(
                    "Total: {}/{} valid, {} pages, {}",
                    summary.valid_files,
                    summary.total_files,
                    summary.total_pages,
                    format_size(summary.total_size)
                );
            }
        }

        Commands::Validate { inputs } => {
            let reports = validate_all(&inputs).await?;
            let mut invalid = 0;
            for report in &reports {
                match report.page_count() {
                    Some(pages) => println!("OK       {} ({} pages)", report.filename, pages),
                    None => {
                        invalid += 1;
                        println!(
                            "INVALID  {}: {}",
                            report.filename,
                            report.invalid_reason().unwrap_or_default()
                        );
                    }
                }
            }
            if invalid > 0 {
                bail!("{} of {} files are not valid PDFs", invalid, reports.len());
            }
        }
    }

    Ok(())
}

async fn validate_all(inputs: &Inputs) -> Result<Vec<DocumentReport>> {
    let sources = inputs.read().await?;
    let reports = tokio::task::spawn_blocking(move || {
        sources
            .iter()
            .map(|source| validate_document(source.filename.as_str(), &source.bytes))
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(reports)
}

/// Run the inputs through a job store: upload, merge, then write the result
async fn merge(inputs: &Inputs, output: &Path, force: bool, no_progress: bool) -> Result<()> {
    if !force && output.exists() {
        bail!(
            "Output file {} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let sources = inputs.read().await?;
    let store = JobStore::new(StoreConfig {
        max_upload_bytes: u64::MAX,
        ..Default::default()
    });

    let files = sources
        .into_iter()
        .map(|source| UploadedFile::new(source.filename, source.bytes))
        .collect();
    let summary = store.upload(files).await?;
    for entry in summary.entries.iter().filter(|e| !e.is_valid()) {
        eprintln!(
            "Warning: skipping {}: {}",
            entry.filename,
            entry.invalid_reason().unwrap_or_default()
        );
    }
    if summary.valid_count() == 0 {
        bail!("None of the input files is a valid PDF");
    }

    let output_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut events = store.subscribe();
    store.start_merge(summary.job_id, &output_name)?;

    let bar = if no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")?
                .progress_chars("=> "),
        );
        bar.set_message("Merging");
        bar
    };

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("Missed {} progress updates", skipped);
                continue;
            }
            Err(RecvError::Closed) => bail!("Merge stopped unexpectedly"),
        };
        if event.job_id != summary.job_id {
            continue;
        }
        match event.status {
            JobStatus::Created => {}
            JobStatus::Merging { progress } => bar.set_position(u64::from(progress)),
            JobStatus::Completed => {
                bar.finish_and_clear();
                break;
            }
            JobStatus::Failed { error } => {
                bar.abandon();
                bail!("Merge failed: {}", error);
            }
        }
    }

    let snapshot = store.snapshot(summary.job_id)?;
    let merged = store.get_output(summary.job_id).await?;
    pdf_merge::write_output(&merged.bytes, output, force)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    store.delete_job(summary.job_id).await;

    println!(
        "Merged {} file(s), {} pages → {} ({})",
        snapshot.valid_count(),
        snapshot.total_pages(),
        output.display(),
        format_size(merged.bytes.len())
    );
    Ok(())
}

fn describe(report: &DocumentReport) -> String {
    match report.page_count() {
        Some(pages) => {
            let mut line = format!(
                "{}: {} pages, {}",
                report.filename,
                pages,
                format_size(report.byte_size)
            );
            if let Some(title) = &report.title {
                line.push_str(&format!(", title \"{}\"", title));
            }
            if let Some(author) = &report.author {
                line.push_str(&format!(", author \"{}\"", author));
            }
            line
        }
        None => format!(
            "{}: invalid ({})",
            report.filename,
            report.invalid_reason().unwrap_or_default()
        ),
    }
}

fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_cli_parses_input_list() {
        let cli = Cli::try_parse_from(["pdfm", "merge", "-i", "list.txt", "-o", "out.pdf", "--force"])
            .unwrap();
        match cli.command {
            Commands::Merge {
                inputs,
                output,
                force,
                no_progress,
            } => {
                assert!(inputs.files.is_empty());
                assert_eq!(inputs.input_list, Some(PathBuf::from("list.txt")));
                assert_eq!(output, PathBuf::from("out.pdf"));
                assert!(force);
                assert!(!no_progress);
            }
            _ => panic!("Expected merge"),
        }
    }

    #[test]
    fn test_describe_invalid_report() {
        let report = validate_document("notes.txt", b"plain text");
        assert!(describe(&report).starts_with("notes.txt: invalid"));
    }
}
