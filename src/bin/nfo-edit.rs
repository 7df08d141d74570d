//! nfo-edit CLI
//!
//! Detect, inspect and bulk-edit NFO metadata files.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nfo_editor::{
    BatchOptions, BatchResult, FieldUpdate, FieldUpdates, NfoEditor, NfoFormat, ScanOptions, Value,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nfo-edit")]
#[command(version)]
#[command(about = "NFO metadata file editor")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect the format of files
    Detect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the fields of a file
    Show {
        file: PathBuf,

        /// List fields as dotted paths
        #[arg(long)]
        flat: bool,

        /// Parse as this format instead of detecting it
        #[arg(long)]
        format: Option<NfoFormat>,
    },

    /// Set or clear fields in every matching file
    Set {
        /// Directories (or files) to edit
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Field to set, as path=value (repeatable)
        #[arg(short, long = "field", value_name = "PATH=VALUE")]
        fields: Vec<String>,

        /// Field to remove (repeatable)
        #[arg(long = "clear", value_name = "PATH")]
        clears: Vec<String>,

        /// Keep values as strings instead of reading numbers and booleans
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        scan: ScanArgs,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Do not keep a .backup copy of edited files
        #[arg(long)]
        no_backup: bool,

        /// Write files in this format
        #[arg(long)]
        format: Option<NfoFormat>,

        /// Parse files as this format instead of detecting it
        #[arg(long)]
        input_format: Option<NfoFormat>,
    },

    /// List the files a batch would touch
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// File name glob
    #[arg(short, long, default_value = nfo_editor::scanner::DEFAULT_PATTERN)]
    pattern: String,

    /// Only look at the top level of each directory
    #[arg(long)]
    no_recursive: bool,

    /// Deepest subdirectory level to visit
    #[arg(long)]
    max_depth: Option<usize>,

    /// Extra entry names to skip (repeatable)
    #[arg(long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Stop after this many files
    #[arg(long)]
    max_files: Option<usize>,
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        let mut options = ScanOptions::default()
            .with_pattern(self.pattern.clone())
            .with_recursive(!self.no_recursive)
            .with_max_depth(self.max_depth)
            .with_max_files(self.max_files);
        for pattern in &self.ignore {
            options = options.with_ignore_pattern(pattern.clone());
        }
        options
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let editor = NfoEditor::new();
    match cli.command {
        Commands::Detect { files } => detect(&editor, &files, cli.json),
        Commands::Show { file, flat, format } => show(&editor, file, flat, format, cli.json),
        Commands::Set {
            paths,
            fields,
            clears,
            raw,
            scan,
            dry_run,
            no_backup,
            format,
            input_format,
        } => {
            let updates = parse_updates(&fields, &clears, raw)?;
            let options = BatchOptions::new()
                .with_scan(scan.options())
                .with_dry_run(dry_run)
                .with_backup(!no_backup)
                .with_output_format(format)
                .with_input_format(input_format);
            set(&editor, &paths, &updates, &options, cli.json)
        }
        Commands::Scan { paths, scan } => {
            let result = editor.scan_files(&paths, &scan.options());
            if cli.json {
                print_json(&result)?;
            } else {
                for file in &result.files {
                    println!("{}", file.display());
                }
                for error in &result.errors {
                    eprintln!("error: {}: {}", error.path.display(), error.message);
                }
                if result.truncated {
                    eprintln!("(stopped at {} files)", result.files.len());
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "nfo_editor=debug,nfo_edit=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    path: &'a PathBuf,
    #[serde(flatten)]
    detection: nfo_editor::FormatDetection,
}

fn detect(editor: &NfoEditor, files: &[PathBuf], json: bool) -> Result<()> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let detection = editor
            .detect_format(file)
            .with_context(|| format!("Failed to detect: {}", file.display()))?;
        if !json {
            let fallbacks: Vec<&str> = detection.fallbacks.iter().map(NfoFormat::as_str).collect();
            println!(
                "{}: {} ({:.2}, {}){}",
                file.display(),
                detection.format,
                detection.confidence,
                detection.encoding,
                if fallbacks.is_empty() {
                    String::new()
                } else {
                    format!(" fallbacks: {}", fallbacks.join(", "))
                }
            );
        }
        results.push(DetectOutput {
            path: file,
            detection,
        });
    }
    if json {
        print_json(&results)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    path: &'a PathBuf,
    format: NfoFormat,
    encoding: nfo_editor::TextEncoding,
    root_element: Option<&'a str>,
    fields: Value,
}

fn show(editor: &NfoEditor, file: PathBuf, flat: bool, format: Option<NfoFormat>, json: bool) -> Result<()> {
    let data = match format {
        Some(format) => editor.parse_file_as(&file, format),
        None => editor.parse_file(&file),
    }
    .with_context(|| format!("Failed to parse: {}", file.display()))?;

    if flat {
        let entries = data.flatten();
        if json {
            return print_json(&Value::Map(entries));
        }
        for (path, value) in entries {
            println!("{path} = {value}");
        }
        return Ok(());
    }

    if json {
        return print_json(&ShowOutput {
            path: &file,
            format: data.format,
            encoding: data.encoding,
            root_element: data.root_element.as_deref(),
            fields: Value::Map(data.fields.clone()),
        });
    }
    println!("# {} ({}, {})", file.display(), data.format, data.encoding);
    println!("{}", serde_json::to_string_pretty(&Value::Map(data.fields))?);
    Ok(())
}

fn parse_updates(fields: &[String], clears: &[String], raw: bool) -> Result<FieldUpdates> {
    let mut updates = FieldUpdates::new();
    for field in fields {
        let Some((path, value)) = field.split_once('=') else {
            bail!("Expected PATH=VALUE, got '{field}'");
        };
        let path = path.trim();
        if path.is_empty() {
            bail!("Empty field path in '{field}'");
        }
        let value = if raw {
            Value::from(value)
        } else {
            Value::coerce(value)
        };
        updates.insert(path.to_string(), FieldUpdate::Set(value));
    }
    for path in clears {
        updates.insert(path.trim().to_string(), FieldUpdate::Clear);
    }
    if updates.is_empty() {
        bail!("Nothing to do: pass --field PATH=VALUE or --clear PATH");
    }
    Ok(updates)
}

fn set(
    editor: &NfoEditor,
    paths: &[PathBuf],
    updates: &FieldUpdates,
    options: &BatchOptions,
    json: bool,
) -> Result<()> {
    let result = editor.batch_edit(paths, updates, options);
    if json {
        print_json(&result)?;
    } else {
        print_summary(&result);
    }
    if result.failed > 0 {
        bail!("{} of {} files failed", result.failed, result.total_files);
    }
    Ok(())
}

fn print_summary(result: &BatchResult) {
    for outcome in result.outcomes.iter().filter(|o| o.success) {
        let verb = if result.dry_run { "would update" } else { "updated" };
        println!("{verb} {}", outcome.path.display());
        for change in &outcome.changes {
            let show = |value: &Option<Value>| value.as_ref().map_or("-".to_string(), Value::to_string);
            println!("  {}: {} -> {}", change.path, show(&change.before), show(&change.after));
        }
        if let Some(backup) = &outcome.backup_path {
            println!("  backup: {}", backup.display());
        }
    }
    for error in &result.errors {
        eprintln!("error: {} ({}): {}", error.path.display(), error.stage, error.message);
    }
    for error in &result.scan_errors {
        eprintln!("error: {}: {}", error.path.display(), error.message);
    }
    println!(
        "{} files, {} succeeded, {} failed{}",
        result.total_files,
        result.successful,
        result.failed,
        if result.dry_run { " (dry run)" } else { "" }
    );
}
