//! Format parsers
//!
//! Each parser turns decoded text into an [`NfoData`] and can score how
//! likely an input is to be in its format. The scores feed the format
//! detector, so a parser registered in place of a built-in one also takes
//! over its share of detection.

pub mod json;
pub mod text;
pub mod xml;

pub use json::JsonParser;
pub use text::TextParser;
pub use xml::XmlParser;

use crate::encoding::TextEncoding;
use crate::error::Result;
use crate::model::{NfoData, NfoFormat};

/// Parses one representation into the canonical model
pub trait Parser: Send + Sync {
    /// Format this parser reads
    fn format(&self) -> NfoFormat;

    /// Confidence in [0.0, 1.0] that `text` is in this format
    fn confidence(&self, text: &str) -> f64;

    /// Parse `text`, recording `encoding` on the model
    ///
    /// Fails with a parse error when the text does not follow the format's
    /// grammar. Missing domain fields are never an error.
    fn parse(&self, text: &str, encoding: TextEncoding) -> Result<NfoData>;
}
