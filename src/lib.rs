//! # nfo-editor
//!
//! Read, edit and write NFO metadata files in bulk.
//!
//! NFO files sit next to media files and describe them. Media managers write
//! them in three shapes, all stored with the same `.nfo` extension:
//!
//! ```text
//! <movie>                         {                          Title: Dune
//!   <title>Dune</title>             "title": "Dune",         Year: 2021
//!   <year>2021</year>               "year": 2021
//! </movie>                        }
//! ```
//!
//! Every shape is parsed into one nested field model ([`NfoData`]) addressed
//! with dotted paths such as `ratings.imdb.value`, edited there and written
//! back in its own format (or converted to another).
//!
//! ## Pipeline
//!
//! 1. [`encoding`] sniffs the byte encoding (BOM, UTF-8, windows-1252)
//! 2. [`detector`] scores the decoded text with every registered parser
//! 3. a [`parser`] builds the model
//! 4. [`NfoData::set`] / [`NfoData::remove`] apply updates
//! 5. a [`writer`] renders the model, backing up the original first
//!
//! [`batch_edit`] runs the pipeline over every file [`scan_files`] finds,
//! isolating failures per file and optionally as a dry run.
//!
//! ## Lossy conventions
//!
//! Converting between formats is not always exact. Markup and text store
//! every scalar as a string unless type coercion is enabled, null becomes an
//! empty string, single-element lists read back as scalars and text output
//! drops comments.

pub mod batch;
pub mod detector;
pub mod editor;
pub mod encoding;
pub mod error;
pub mod model;
pub mod parser;
pub mod registry;
pub mod scanner;
pub mod writer;

use std::path::Path;

pub use batch::{BatchOptions, BatchResult, FieldChange, FileError, FileOutcome, FileStage};
pub use detector::{DetectorConfig, FormatDetection, FormatDetector, FormatScore};
pub use editor::{NfoEditor, DEFAULT_MIN_CONFIDENCE};
pub use encoding::{EncodingConfidence, EncodingDetection, TextEncoding};
pub use error::{AccessOp, Location, NfoError, Result};
pub use model::{FieldUpdate, FieldUpdates, Map, NfoData, NfoFormat, Value};
pub use parser::{JsonParser, Parser, TextParser, XmlParser};
pub use registry::FormatRegistry;
pub use scanner::{ScanError, ScanOptions, ScanResult, ScanStats};
pub use writer::{JsonWriter, TextWriter, WriteResult, Writer, XmlWriter};

/// Detect the format of a file with a default editor
pub fn detect_format(path: impl AsRef<Path>) -> Result<FormatDetection> {
    NfoEditor::new().detect_format(path)
}

/// Parse a file with a default editor
pub fn parse_file(path: impl AsRef<Path>) -> Result<NfoData> {
    NfoEditor::new().parse_file(path)
}

/// Write a model with a default editor
pub fn write_file(
    data: &NfoData,
    path: impl AsRef<Path>,
    format: Option<NfoFormat>,
    create_backup: bool,
) -> Result<WriteResult> {
    NfoEditor::new().write_file(data, path, format, create_backup)
}

/// Discover NFO files
pub fn scan_files<P: AsRef<Path>>(directories: &[P], options: &ScanOptions) -> ScanResult {
    scanner::scan_files(directories, options)
}

/// Apply updates to every file under `directories` with a default editor
pub fn batch_edit<P: AsRef<Path>>(
    directories: &[P],
    updates: &FieldUpdates,
    options: &BatchOptions,
) -> BatchResult {
    NfoEditor::new().batch_edit(directories, updates, options)
}
