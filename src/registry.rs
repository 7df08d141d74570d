//! Parser and writer lookup by format

use std::collections::HashMap;
use std::fmt;

use crate::model::NfoFormat;
use crate::parser::{JsonParser, Parser, TextParser, XmlParser};
use crate::writer::{JsonWriter, TextWriter, Writer, XmlWriter};

/// Parsers and writers available to an editor
///
/// Registering a parser or writer replaces the existing one for its format.
/// Every editor owns its own registry.
pub struct FormatRegistry {
    parsers: HashMap<NfoFormat, Box<dyn Parser>>,
    writers: HashMap<NfoFormat, Box<dyn Writer>>,
}

impl FormatRegistry {
    /// Registry without any parsers or writers
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            writers: HashMap::new(),
        }
    }

    /// Registry holding the built-in parser and writer for every format
    pub fn new() -> Self {
        Self::empty()
            .with_parser(XmlParser::new())
            .with_parser(JsonParser::new())
            .with_parser(TextParser::new())
            .with_writer(XmlWriter::new())
            .with_writer(JsonWriter::new())
            .with_writer(TextWriter::new())
    }

    pub fn with_parser(mut self, parser: impl Parser + 'static) -> Self {
        self.register_parser(Box::new(parser));
        self
    }

    pub fn with_writer(mut self, writer: impl Writer + 'static) -> Self {
        self.register_writer(Box::new(writer));
        self
    }

    /// Register a parser, returning the one it replaced
    pub fn register_parser(&mut self, parser: Box<dyn Parser>) -> Option<Box<dyn Parser>> {
        self.parsers.insert(parser.format(), parser)
    }

    /// Register a writer, returning the one it replaced
    pub fn register_writer(&mut self, writer: Box<dyn Writer>) -> Option<Box<dyn Writer>> {
        self.writers.insert(writer.format(), writer)
    }

    pub fn parser(&self, format: NfoFormat) -> Option<&dyn Parser> {
        self.parsers.get(&format).map(Box::as_ref)
    }

    pub fn writer(&self, format: NfoFormat) -> Option<&dyn Writer> {
        self.writers.get(&format).map(Box::as_ref)
    }

    /// Registered parsers, most structured format first
    pub fn parsers(&self) -> impl Iterator<Item = &dyn Parser> {
        NfoFormat::ALL.into_iter().filter_map(|format| self.parser(format))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parsers: Vec<NfoFormat> = NfoFormat::ALL
            .into_iter()
            .filter(|format| self.parsers.contains_key(format))
            .collect();
        let writers: Vec<NfoFormat> = NfoFormat::ALL
            .into_iter()
            .filter(|format| self.writers.contains_key(format))
            .collect();
        f.debug_struct("FormatRegistry")
            .field("parsers", &parsers)
            .field("writers", &writers)
            .finish()
    }
}
