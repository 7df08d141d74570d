//! Format writers
//!
//! Writers render an [`NfoData`] back to text. Saving to disk goes through
//! the shared [`Writer::write`], which encodes the rendered text in the
//! model's encoding and takes the backup before the original is replaced.

pub mod backup;
pub mod json;
pub mod text;
pub mod xml;

pub use json::JsonWriter;
pub use text::TextWriter;
pub use xml::XmlWriter;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::encoding::{self, TextEncoding};
use crate::error::{NfoError, Result};
use crate::model::{NfoData, NfoFormat};

/// Outcome of writing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub path: PathBuf,
    pub format: NfoFormat,
    pub bytes_written: usize,
    /// Copy of the previous file contents, when one was taken
    pub backup_path: Option<PathBuf>,
}

/// Renders the canonical model in one representation
pub trait Writer: Send + Sync {
    /// Format this writer produces
    fn format(&self) -> NfoFormat;

    /// Whether the model fits this format's structural limits
    fn can_write(&self, data: &NfoData) -> bool {
        self.check(data).is_ok()
    }

    /// Explain why the model does not fit, if it does not
    fn check(&self, data: &NfoData) -> Result<()>;

    /// Render the model to text
    fn render(&self, data: &NfoData) -> Result<String>;

    /// Render, encode and save the model to `path`
    ///
    /// With `create_backup` an existing file is first copied to a sibling
    /// `.backup` file. Nothing touches the disk when rendering fails. A model
    /// whose text does not fit its encoding is rendered again as UTF-8, so
    /// any declared encoding matches the bytes.
    fn write(&self, data: &NfoData, path: &Path, create_backup: bool) -> Result<WriteResult> {
        self.check(data)?;
        let mut text = self.render(data)?;
        let mut target = data.encoding;
        if !encoding::can_encode(&text, target) {
            warn!(
                path = %path.display(),
                encoding = %target,
                "Text not representable in the file's encoding, writing UTF-8 instead"
            );
            target = TextEncoding::Utf8;
            text = self.render(&data.clone().with_encoding(target))?;
        }
        let bytes = encoding::encode(&text, target);

        let backup_path = if create_backup {
            backup::create_backup(path)?
        } else {
            None
        };
        backup::write_bytes(path, &bytes)?;

        debug!(
            path = %path.display(),
            format = %self.format(),
            bytes = bytes.len(),
            "Wrote file"
        );

        Ok(WriteResult {
            path: path.to_path_buf(),
            format: self.format(),
            bytes_written: bytes.len(),
            backup_path,
        })
    }
}

/// Error for a model this format cannot represent
pub(crate) fn unrepresentable(format: NfoFormat, what: impl std::fmt::Display) -> NfoError {
    NfoError::Format(format!("cannot write {format}: {what}"))
}
