//! Batch mutation engine
//!
//! Every discovered file moves through read, parse, update and write on its
//! own. A failure at any stage is recorded against that file and the batch
//! carries on with the next one, so one broken file never blocks the rest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::editor::NfoEditor;
use crate::encoding;
use crate::error::{AccessOp, NfoError};
use crate::model::{FieldUpdate, FieldUpdates, NfoFormat, Value};
use crate::scanner::{ScanError, ScanOptions};

/// How a batch finds and treats files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOptions {
    pub scan: ScanOptions,
    /// Compute changes without writing anything
    pub dry_run: bool,
    /// Copy each file aside before replacing it
    pub backup: bool,
    /// Write every file in this format instead of its own
    pub output_format: Option<NfoFormat>,
    /// Parse every file in this format instead of detecting it
    pub input_format: Option<NfoFormat>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            dry_run: false,
            backup: true,
            output_format: None,
            input_format: None,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_output_format(mut self, format: Option<NfoFormat>) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_input_format(mut self, format: Option<NfoFormat>) -> Self {
        self.input_format = format;
        self
    }
}

/// Pipeline stage at which a file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStage {
    Read,
    Parse,
    Update,
    Write,
}

impl std::fmt::Display for FileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            FileStage::Read => "read",
            FileStage::Parse => "parse",
            FileStage::Update => "update",
            FileStage::Write => "write",
        };
        f.write_str(stage)
    }
}

/// Why one file failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub stage: FileStage,
    pub message: String,
}

/// Value of one field before and after the update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Terminal state of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub success: bool,
    /// Format the file was read in
    pub format: Option<NfoFormat>,
    /// Format the file was (or in a dry run would be) written in
    pub output_format: Option<NfoFormat>,
    /// Every requested path, in update order
    pub changed_fields: Vec<String>,
    pub changes: Vec<FieldChange>,
    pub backup_path: Option<PathBuf>,
    pub bytes_written: usize,
    pub dry_run: bool,
    pub error: Option<FileError>,
}

impl FileOutcome {
    fn failed(path: &Path, error: FileError, dry_run: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            format: None,
            output_format: None,
            changed_fields: Vec::new(),
            changes: Vec::new(),
            backup_path: None,
            bytes_written: 0,
            dry_run,
            error: Some(error),
        }
    }
}

/// Aggregate result of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub dry_run: bool,
    /// One entry per discovered file, in discovery order
    pub outcomes: Vec<FileOutcome>,
    /// Per-file failures, in discovery order
    pub errors: Vec<FileError>,
    /// Directories that could not be scanned
    pub scan_errors: Vec<ScanError>,
    /// Discovery stopped at the file cap
    pub truncated: bool,
    /// At least one file was copied aside before being replaced
    pub backups_created: bool,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.scan_errors.is_empty()
    }
}

/// Error for one file together with the stage it happened in
#[derive(Debug)]
pub(crate) struct StageFailure {
    pub stage: FileStage,
    pub error: NfoError,
}

trait AtStage<T> {
    fn at(self, stage: FileStage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for crate::error::Result<T> {
    fn at(self, stage: FileStage) -> std::result::Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// Run the full pipeline for one file
pub(crate) fn edit_file(
    editor: &NfoEditor,
    path: &Path,
    updates: &FieldUpdates,
    options: &BatchOptions,
) -> std::result::Result<FileOutcome, StageFailure> {
    let bytes = fs::read(path)
        .map_err(|err| NfoError::access(path, AccessOp::Read, err))
        .at(FileStage::Read)?;
    let (text, detection) = encoding::decode(&bytes);

    let mut data = editor
        .parse_decoded(&text, options.input_format, NfoFormat::from_path(path), detection.encoding)
        .at(FileStage::Parse)?
        .with_path(path);
    debug!(path = %path.display(), format = %data.format, "Parsed");

    let before: Vec<Option<Value>> = updates.keys().map(|field| data.get(field).cloned()).collect();
    let changed_fields = data.update_fields(updates).at(FileStage::Update)?;
    let changes = updates
        .iter()
        .zip(before)
        .map(|((field, update), before)| FieldChange {
            path: field.clone(),
            before,
            after: match update {
                FieldUpdate::Set(_) => data.get(field).cloned(),
                FieldUpdate::Clear => None,
            },
        })
        .collect();

    let output_format = options.output_format.unwrap_or(data.format);
    let mut outcome = FileOutcome {
        path: path.to_path_buf(),
        success: true,
        format: Some(data.format),
        output_format: Some(output_format),
        changed_fields,
        changes,
        backup_path: None,
        bytes_written: 0,
        dry_run: options.dry_run,
        error: None,
    };

    if options.dry_run {
        debug!(path = %path.display(), "Dry run, not writing");
        return Ok(outcome);
    }

    let written = editor
        .write_file(&data, path, Some(output_format), options.backup)
        .at(FileStage::Write)?;
    outcome.backup_path = written.backup_path;
    outcome.bytes_written = written.bytes_written;
    Ok(outcome)
}

/// Apply updates to every file found under `directories`
///
/// Never fails as a whole: unreadable directories end up in `scan_errors`
/// and every per-file failure in `errors`.
pub fn batch_edit<P: AsRef<Path>>(
    editor: &NfoEditor,
    directories: &[P],
    updates: &FieldUpdates,
    options: &BatchOptions,
) -> BatchResult {
    let start = Instant::now();
    let scan = editor.scan_files(directories, &options.scan);

    let mut result = BatchResult {
        total_files: scan.files.len(),
        dry_run: options.dry_run,
        scan_errors: scan.errors,
        truncated: scan.truncated,
        ..BatchResult::default()
    };

    for path in &scan.files {
        match edit_file(editor, path, updates, options) {
            Ok(outcome) => {
                result.successful += 1;
                result.backups_created |= outcome.backup_path.is_some();
                result.outcomes.push(outcome);
            }
            Err(StageFailure { stage, error }) => {
                warn!(path = %path.display(), %stage, error = %error, "File failed");
                let error = FileError {
                    path: path.clone(),
                    stage,
                    message: error.to_string(),
                };
                result.failed += 1;
                result.errors.push(error.clone());
                result.outcomes.push(FileOutcome::failed(path, error, options.dry_run));
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    info!(
        total = result.total_files,
        successful = result.successful,
        failed = result.failed,
        dry_run = result.dry_run,
        duration_ms = result.duration_ms,
        "Batch finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn updates() -> FieldUpdates {
        let mut updates = FieldUpdates::new();
        updates.insert("title".into(), FieldUpdate::set("Dune"));
        updates.insert("tagline".into(), FieldUpdate::Clear);
        updates
    }

    #[test]
    fn test_edit_file_records_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.nfo");
        fs::write(&path, "Title: Old\nTagline: Gone soon\n").unwrap();

        let outcome = edit_file(&NfoEditor::new(), &path, &updates(), &BatchOptions::new()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.changed_fields, vec!["title", "tagline"]);
        assert_eq!(outcome.changes[0].before, Some(Value::from("Old")));
        assert_eq!(outcome.changes[0].after, Some(Value::from("Dune")));
        assert_eq!(outcome.changes[1].after, None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Title: Dune\n");
        assert!(outcome.backup_path.is_some());
    }

    #[test]
    fn test_field_error_fails_at_update_stage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.nfo");
        fs::write(&path, "Title: Old\n").unwrap();

        let mut updates = FieldUpdates::new();
        updates.insert("title.sub".into(), FieldUpdate::set("x"));
        let failure = edit_file(&NfoEditor::new(), &path, &updates, &BatchOptions::new()).unwrap_err();
        assert_eq!(failure.stage, FileStage::Update);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Title: Old\n");
    }

    #[test]
    fn test_output_format_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.nfo");
        fs::write(&path, "Title: Old\n").unwrap();

        let options = BatchOptions::new()
            .with_backup(false)
            .with_output_format(Some(NfoFormat::Json));
        let outcome = edit_file(&NfoEditor::new(), &path, &updates(), &options).unwrap();
        assert_eq!(outcome.format, Some(NfoFormat::Text));
        assert_eq!(outcome.output_format, Some(NfoFormat::Json));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\n  \"title\": \"Dune\"\n}\n");
    }

    #[test]
    fn test_all_failures_still_return_result() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.nfo"), "").unwrap();
        fs::write(dir.path().join("b.nfo"), "just prose\n").unwrap();

        let result = batch_edit(&NfoEditor::new(), &[dir.path()], &updates(), &BatchOptions::new());
        assert_eq!(result.total_files, 2);
        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 2);
        assert!(result.errors.iter().all(|e| e.stage == FileStage::Parse));
        assert!(!result.is_success());
        assert!(!result.backups_created);
    }
}
