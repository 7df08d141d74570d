//! Object notation (JSON) parser

use std::borrow::Cow;

use super::Parser;
use crate::encoding::TextEncoding;
use crate::error::{Location, NfoError, Result};
use crate::model::{Map, NfoData, NfoFormat, Value};

/// Key holding a top-level array
pub const ITEMS_KEY: &str = "items";
/// Key holding a top-level scalar
pub const VALUE_KEY: &str = "value";

/// Parser for JSON NFO files
///
/// Objects become mappings, arrays become lists and scalars pass through
/// with their JSON type. `//` and `/* */` comments are accepted unless
/// turned off with [`JsonParser::with_comments`].
#[derive(Debug, Clone)]
pub struct JsonParser {
    allow_comments: bool,
}

impl Default for JsonParser {
    fn default() -> Self {
        Self {
            allow_comments: true,
        }
    }
}

impl JsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept comments outside string literals
    pub fn with_comments(mut self, allow: bool) -> Self {
        self.allow_comments = allow;
        self
    }

    fn read(&self, text: &str) -> serde_json::Result<serde_json::Value> {
        if self.allow_comments {
            serde_json::from_str(&strip_comments(text))
        } else {
            serde_json::from_str(text)
        }
    }
}

/// Blank out `//` and `/* */` comments outside string literals
///
/// Comment characters become spaces and newlines are kept, so error
/// positions still point into the original text.
pub fn strip_comments(text: &str) -> Cow<'_, str> {
    if !text.contains('/') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                while let Some(&skipped) = chars.peek() {
                    if skipped == '\n' {
                        break;
                    }
                    chars.next();
                    out.push(' ');
                }
                out.push(' ');
            }
            ('/', Some('*')) => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    out.push(if skipped == '\n' { '\n' } else { ' ' });
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

impl Parser for JsonParser {
    fn format(&self) -> NfoFormat {
        NfoFormat::Json
    }

    fn confidence(&self, text: &str) -> f64 {
        match self.read(text) {
            Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_)) => 0.95,
            _ => 0.0,
        }
    }

    fn parse(&self, text: &str, encoding: TextEncoding) -> Result<NfoData> {
        let json = self.read(text).map_err(|err| {
            let location = (err.line() > 0).then(|| Location::new(err.line(), err.column()));
            NfoError::parse(NfoFormat::Json, location, err.to_string())
        })?;

        let fields = match Value::from(json) {
            Value::Map(map) => map,
            list @ Value::List(_) => Map::from_iter([(ITEMS_KEY.to_string(), list)]),
            scalar => Map::from_iter([(VALUE_KEY.to_string(), scalar)]),
        };

        Ok(NfoData::with_fields(NfoFormat::Json, fields).with_encoding(encoding))
    }
}
