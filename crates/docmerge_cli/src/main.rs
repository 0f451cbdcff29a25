use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use docmerge_batch::{
    C_FILE_ARCHIVE_DEFAULT, C_KEY_FILENAME_DEFAULT, EnumFilenameConflictStrategy,
    EnumMissingValueMode, N_ROWS_PREVIEW_DEFAULT, ReportBatch, SpecBatchOptions, SpecReadOptions,
    generate_documents_from_dataframe, preview_dataframe, read_workbook_dataframe,
};
use docmerge_log::{LogConfig, init_logging};
use tracing::info;

const N_EXIT_USAGE: u8 = 2;
const C_MSG_MISSING_INPUTS: &str =
    "Please provide both a spreadsheet and a Word template to proceed.";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MissingValues {
    Blank,
    Error,
}

impl From<MissingValues> for EnumMissingValueMode {
    fn from(value: MissingValues) -> Self {
        match value {
            MissingValues::Blank => Self::Blank,
            MissingValues::Error => Self::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FilenameConflict {
    Suffix,
    Skip,
}

impl From<FilenameConflict> for EnumFilenameConflictStrategy {
    fn from(value: FilenameConflict) -> Self {
        match value {
            FilenameConflict::Suffix => Self::Suffix,
            FilenameConflict::Skip => Self::Skip,
        }
    }
}

#[derive(Parser)]
#[command(about = "Generate one Word document per spreadsheet row and bundle them into a zip.")]
struct Args {
    /// Spreadsheet (`.xlsx`); the first row holds the column names.
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Word template (`.docx`) with `{{ column }}` placeholders.
    #[arg(long, value_name = "PATH")]
    template: Option<PathBuf>,

    /// Output archive.
    #[arg(long, value_name = "PATH", default_value = C_FILE_ARCHIVE_DEFAULT)]
    output: PathBuf,

    /// Worksheet to read (default: first sheet).
    #[arg(long)]
    sheet: Option<String>,

    /// Placeholder whose value names each document.
    #[arg(long, default_value = C_KEY_FILENAME_DEFAULT)]
    key_filename: String,

    /// What an empty cell does to a row.
    #[arg(long, value_enum, default_value_t = MissingValues::Blank)]
    missing_values: MissingValues,

    /// What happens when two rows derive the same document name.
    #[arg(long, value_enum, default_value_t = FilenameConflict::Suffix)]
    filename_conflict: FilenameConflict,

    /// Number of parsed rows to print before processing (0 disables).
    #[arg(long, default_value_t = N_ROWS_PREVIEW_DEFAULT)]
    preview: usize,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(LogConfig {
        verbose: args.verbose,
    }) {
        eprintln!("Warning: logging disabled: {err}");
    }

    match run(args) {
        Ok(n_code) => ExitCode::from(n_code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<u8> {
    let (Some(path_data), Some(path_template)) = (args.data.as_deref(), args.template.as_deref())
    else {
        eprintln!("{C_MSG_MISSING_INPUTS}");
        return Ok(N_EXIT_USAGE);
    };

    let options = derive_batch_options(&args);

    let bytes_data = read_input(path_data)?;
    let bytes_template = read_input(path_template)?;

    let df = read_workbook_dataframe(&bytes_data, &options.read_options)
        .with_context(|| format!("Failed to read spreadsheet {}", path_data.display()))?;
    if args.preview > 0 {
        println!("Data preview:");
        println!("{}", preview_dataframe(&df, args.preview));
    }

    let output = generate_documents_from_dataframe(&df, &bytes_template, &options)
        .with_context(|| format!("Failed to process template {}", path_template.display()))?;

    for c_line in derive_report_lines(&output.report) {
        println!("{c_line}");
    }

    fs::write(&args.output, &output.archive)
        .with_context(|| format!("Failed to write archive {}", args.output.display()))?;
    info!(path = %args.output.display(), "archive written");

    println!(
        "Documents generated successfully: {}",
        args.output.display()
    );
    println!("{}", output.report);
    Ok(0)
}

fn derive_batch_options(args: &Args) -> SpecBatchOptions {
    SpecBatchOptions {
        key_filename: args.key_filename.clone(),
        rule_missing_value: args.missing_values.into(),
        rule_filename_conflict: args.filename_conflict.into(),
        read_options: SpecReadOptions {
            sheet_name: args.sheet.clone(),
        },
    }
}

/// Row failures, then warnings, one line each.
fn derive_report_lines(report: &ReportBatch) -> Vec<String> {
    report
        .failures
        .iter()
        .map(ToString::to_string)
        .chain(
            report
                .warnings
                .iter()
                .map(|c_warning| format!("Warning: {c_warning}")),
        )
        .collect()
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}
