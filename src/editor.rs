//! Single-file operations on top of the registry and detector

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::batch::{self, BatchOptions, BatchResult, FileOutcome};
use crate::detector::{FormatDetection, FormatDetector};
use crate::encoding::{self, TextEncoding};
use crate::error::{AccessOp, NfoError, Result};
use crate::model::{FieldUpdates, NfoData, NfoFormat};
use crate::registry::FormatRegistry;
use crate::scanner::{self, ScanOptions, ScanResult};
use crate::writer::WriteResult;

/// Lowest detection confidence accepted when parsing
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.25;

/// Detects, parses, edits and writes NFO files
///
/// Each editor owns its registry, so parsers or writers replaced on one
/// editor never affect another.
#[derive(Debug)]
pub struct NfoEditor {
    registry: FormatRegistry,
    detector: FormatDetector,
    min_confidence: f64,
}

impl Default for NfoEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl NfoEditor {
    /// Editor with the built-in parsers and writers
    pub fn new() -> Self {
        Self::with_registry(FormatRegistry::new())
    }

    pub fn with_registry(registry: FormatRegistry) -> Self {
        Self {
            registry,
            detector: FormatDetector::new(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_detector(mut self, detector: FormatDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Lowest detection confidence at which a file is parsed
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FormatRegistry {
        &mut self.registry
    }

    /// Detect the format of a file, using its extension as a hint
    pub fn detect_format(&self, path: impl AsRef<Path>) -> Result<FormatDetection> {
        let path = path.as_ref();
        let bytes = read(path)?;
        let (_, detection) = self
            .detector
            .detect_bytes(&self.registry, &bytes, NfoFormat::from_path(path));
        Ok(detection)
    }

    /// Detect the format of text that is already decoded
    pub fn detect_text(&self, text: &str, hint: Option<NfoFormat>) -> FormatDetection {
        self.detector
            .detect_text(&self.registry, text, hint, TextEncoding::default())
    }

    /// Read and parse a file in whatever format it is in
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<NfoData> {
        self.load(path.as_ref(), None)
    }

    /// Read and parse a file in a known format, skipping detection
    pub fn parse_file_as(&self, path: impl AsRef<Path>, format: NfoFormat) -> Result<NfoData> {
        self.load(path.as_ref(), Some(format))
    }

    /// Parse text, detecting the format unless one is given
    pub fn parse_str(&self, text: &str, format: Option<NfoFormat>) -> Result<NfoData> {
        self.parse_decoded(text, format, None, TextEncoding::default())
    }

    /// Write a model to `path`
    ///
    /// `format` overrides the model's own format. With `create_backup` an
    /// existing file is copied aside before it is replaced.
    pub fn write_file(
        &self,
        data: &NfoData,
        path: impl AsRef<Path>,
        format: Option<NfoFormat>,
        create_backup: bool,
    ) -> Result<WriteResult> {
        let format = format.unwrap_or(data.format);
        let writer = self
            .registry
            .writer(format)
            .ok_or_else(|| NfoError::Format(format!("no writer registered for {format}")))?;
        writer.write(data, path.as_ref(), create_backup)
    }

    /// Discover files without touching them
    pub fn scan_files<P: AsRef<Path>>(&self, directories: &[P], options: &ScanOptions) -> ScanResult {
        scanner::scan_files(directories, options)
    }

    /// Apply updates to every file found under `directories`
    pub fn batch_edit<P: AsRef<Path>>(
        &self,
        directories: &[P],
        updates: &FieldUpdates,
        options: &BatchOptions,
    ) -> BatchResult {
        batch::batch_edit(self, directories, updates, options)
    }

    /// Apply updates to one file
    pub fn edit_file(
        &self,
        path: impl AsRef<Path>,
        updates: &FieldUpdates,
        options: &BatchOptions,
    ) -> Result<FileOutcome> {
        batch::edit_file(self, path.as_ref(), updates, options).map_err(|failure| failure.error)
    }

    fn load(&self, path: &Path, format: Option<NfoFormat>) -> Result<NfoData> {
        let bytes = read(path)?;
        let (text, detection) = encoding::decode(&bytes);
        let data = self.parse_decoded(&text, format, NfoFormat::from_path(path), detection.encoding)?;
        Ok(data.with_path(path))
    }

    pub(crate) fn parse_decoded(
        &self,
        text: &str,
        format: Option<NfoFormat>,
        hint: Option<NfoFormat>,
        encoding: TextEncoding,
    ) -> Result<NfoData> {
        let format = match format {
            Some(format) => format,
            None => self.choose_format(text, hint, encoding)?,
        };
        let parser = self
            .registry
            .parser(format)
            .ok_or_else(|| NfoError::Format(format!("no parser registered for {format}")))?;
        parser.parse(text, encoding)
    }

    /// Detect a format and make sure it is convincing enough to parse with
    fn choose_format(&self, text: &str, hint: Option<NfoFormat>, encoding: TextEncoding) -> Result<NfoFormat> {
        let detection = self.detector.detect_text(&self.registry, text, hint, encoding);
        if detection.confidence >= self.min_confidence {
            return Ok(detection.format);
        }

        // A malformed structured file explains itself better than "unknown format".
        // Object notation scores zero once broken, so its opening bracket is
        // enough to ask it.
        let opens_object = matches!(text.trim_start().chars().next(), Some('{' | '['));
        let structured = detection
            .fallbacks
            .iter()
            .copied()
            .find(|format| *format != NfoFormat::Text)
            .or_else(|| opens_object.then_some(NfoFormat::Json));
        if let Some(parser) = structured.and_then(|format| self.registry.parser(format)) {
            if let Err(err) = parser.parse(text, encoding) {
                debug!(format = %parser.format(), "Reporting error from the closest format");
                return Err(err);
            }
        }

        warn!(
            format = %detection.format,
            confidence = detection.confidence,
            "No format reached the minimum confidence"
        );
        Err(NfoError::parse(
            detection.format,
            None,
            format!(
                "no format reached the minimum confidence of {:.2} (best: {} at {:.2})",
                self.min_confidence, detection.format, detection.confidence
            ),
        ))
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|err| NfoError::access(path, AccessOp::Read, err))
}
