//! Markup (XML) parser
//!
//! Element trees map onto the field model as follows:
//!
//! ```text
//! <movie>                               root_element = "movie"
//!   <title>Dune</title>                 title        = "Dune"
//!   <uniqueid type="imdb">tt1</uniqueid> uniqueid    = { "@type": "imdb", "#text": "tt1" }
//!   <genre>Drama</genre>                genre        = ["Drama", "Sci-Fi"]
//!   <genre>Sci-Fi</genre>
//!   <actor><name>A</name></actor>       actor        = { "name": "A" }
//! </movie>
//! ```
//!
//! Attributes live under `@`-prefixed keys and text that shares an element
//! with attributes or children lives under `#text`, so neither can collide
//! with a child element of the same name.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::Parser;
use crate::encoding::TextEncoding;
use crate::error::{Location, NfoError, Result};
use crate::model::{Map, NfoData, NfoFormat, Value};

/// Key prefix for element attributes
pub const ATTRIBUTE_PREFIX: &str = "@";
/// Key holding an element's own text next to attributes or children
pub const TEXT_KEY: &str = "#text";

/// Root elements written by common media managers
const KNOWN_ROOTS: &[&str] = &["movie", "tvshow", "episodedetails", "musicvideo", "album", "artist"];

/// A structural problem and the byte offset where it was found
#[derive(Debug)]
struct Fault {
    offset: usize,
    message: String,
}

impl Fault {
    fn new(offset: impl TryInto<usize>, message: impl Into<String>) -> Self {
        Self {
            offset: offset.try_into().unwrap_or(usize::MAX),
            message: message.into(),
        }
    }
}

/// Element being assembled while reading
#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Map,
}

/// Parser for XML NFO files
#[derive(Debug, Clone, Default)]
pub struct XmlParser {
    keep_namespaces: bool,
    coerce_types: bool,
}

impl XmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `prefix:` parts of element and attribute names
    pub fn with_namespaces(mut self, keep: bool) -> Self {
        self.keep_namespaces = keep;
        self
    }

    /// Turn numeric and `true`/`false` text into typed scalars
    pub fn with_type_coercion(mut self, coerce: bool) -> Self {
        self.coerce_types = coerce;
        self
    }

    fn scalar(&self, text: &str) -> Value {
        if self.coerce_types {
            Value::coerce(text)
        } else {
            Value::String(text.to_string())
        }
    }

    fn qualified(&self, full: &[u8], local: &[u8]) -> std::result::Result<String, std::str::Utf8Error> {
        let bytes = if self.keep_namespaces { full } else { local };
        std::str::from_utf8(bytes).map(str::to_string)
    }

    fn open(&self, start: &BytesStart<'_>, offset: usize) -> std::result::Result<Element, Fault> {
        let name = self
            .qualified(start.name().as_ref(), start.local_name().as_ref())
            .map_err(|err| Fault::new(offset, err.to_string()))?;

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| Fault::new(offset, err.to_string()))?;
            let full = attr.key.as_ref();
            // Namespace declarations are kept verbatim so they can be written back
            let key = if full.starts_with(b"xmlns") {
                std::str::from_utf8(full).map(str::to_string)
            } else {
                self.qualified(full, attr.key.local_name().as_ref())
            }
            .map_err(|err| Fault::new(offset, err.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|err| Fault::new(offset, err.to_string()))?;
            attributes.push((key, value.into_owned()));
        }

        Ok(Element {
            name,
            attributes,
            text: String::new(),
            children: Map::new(),
        })
    }

    fn element_value(&self, element: Element) -> Value {
        let text = element.text.trim();
        if element.attributes.is_empty() && element.children.is_empty() {
            return self.scalar(text);
        }

        let mut map = Map::new();
        for (key, value) in element.attributes {
            map.insert(format!("{ATTRIBUTE_PREFIX}{key}"), self.scalar(&value));
        }
        if !text.is_empty() {
            map.insert(TEXT_KEY.to_string(), self.scalar(text));
        }
        map.extend(element.children);
        Value::Map(map)
    }

    /// Read the whole document into its root element
    fn read_tree(&self, text: &str) -> std::result::Result<Element, Fault> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|err| Fault::new(reader.error_position(), err.to_string()))?;
            let offset = reader.buffer_position() as usize;

            match event {
                Event::Start(start) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(Fault::new(offset, "multiple root elements"));
                    }
                    stack.push(self.open(&start, offset)?);
                }
                Event::Empty(start) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(Fault::new(offset, "multiple root elements"));
                    }
                    let element = self.open(&start, offset)?;
                    self.close(element, &mut stack, &mut root);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Fault::new(offset, "closing tag without matching opening tag"))?;
                    self.close(element, &mut stack, &mut root);
                }
                Event::Text(content) => {
                    let content = content
                        .unescape()
                        .map_err(|err| Fault::new(offset, err.to_string()))?;
                    push_text(&mut stack, &content, offset)?;
                }
                Event::CData(content) => {
                    let content = String::from_utf8_lossy(&content.into_inner()).into_owned();
                    push_text(&mut stack, &content, offset)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Fault::new(text.len(), format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| Fault::new(text.len(), "document has no root element"))
    }

    fn close(&self, element: Element, stack: &mut [Element], root: &mut Option<Element>) {
        match stack.last_mut() {
            Some(parent) => {
                let name = element.name.clone();
                let value = self.element_value(element);
                add_child(&mut parent.children, name, value);
            }
            None => *root = Some(element),
        }
    }
}

fn push_text(stack: &mut [Element], content: &str, offset: usize) -> std::result::Result<(), Fault> {
    match stack.last_mut() {
        Some(element) => {
            element.text.push_str(content);
            Ok(())
        }
        None if content.trim().is_empty() => Ok(()),
        None => Err(Fault::new(offset, "text outside the root element")),
    }
}

/// Insert a child, turning repeated tags into a list at the first position
fn add_child(children: &mut Map, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::List(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::take(existing);
            *existing = Value::List(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Whether text starts the way a markup document does
fn looks_like_markup(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") || trimmed.starts_with("<!") {
        return true;
    }
    let mut chars = trimmed.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
}

impl Parser for XmlParser {
    fn format(&self) -> NfoFormat {
        NfoFormat::Xml
    }

    fn confidence(&self, text: &str) -> f64 {
        if !looks_like_markup(text) {
            return 0.0;
        }
        match self.read_tree(text) {
            Ok(root) => {
                let mut score: f64 = 0.9;
                if text.trim_start().starts_with("<?xml") {
                    score += 0.05;
                }
                if KNOWN_ROOTS.contains(&root.name.to_ascii_lowercase().as_str()) {
                    score += 0.05;
                }
                score.min(1.0)
            }
            Err(fault) => {
                // The further in the error, the more of the document was valid
                let progress = fault.offset.min(text.len()) as f64 / text.len().max(1) as f64;
                0.8 * progress
            }
        }
    }

    fn parse(&self, text: &str, encoding: TextEncoding) -> Result<NfoData> {
        let root = self.read_tree(text).map_err(|fault| {
            NfoError::parse(
                NfoFormat::Xml,
                Some(Location::from_offset(text, fault.offset)),
                fault.message,
            )
        })?;

        let root_name = root.name.clone();
        let fields = match self.element_value(root) {
            Value::Map(map) => map,
            Value::String(s) if s.is_empty() => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert(TEXT_KEY.to_string(), other);
                map
            }
        };

        Ok(NfoData::with_fields(NfoFormat::Xml, fields)
            .with_encoding(encoding)
            .with_root_element(root_name))
    }
}
