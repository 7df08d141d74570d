//! Markup (XML) writer
//!
//! Reverses the parser's mapping: `@name` keys become attributes, `#text`
//! becomes element text, lists become repeated sibling elements and null
//! becomes an empty element.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{unrepresentable, Writer};
use crate::encoding::TextEncoding;
use crate::error::{NfoError, Result};
use crate::model::{Map, NfoData, NfoFormat, Value};
use crate::parser::xml::{ATTRIBUTE_PREFIX, TEXT_KEY};

/// Root element used when the model does not name one
pub const DEFAULT_ROOT: &str = "movie";

type XmlOut = quick_xml::Writer<Vec<u8>>;

/// Writer for XML NFO files
#[derive(Debug, Clone)]
pub struct XmlWriter {
    indent: usize,
    standalone: bool,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self {
            indent: 2,
            standalone: true,
        }
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spaces per nesting level
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Emit `standalone="yes"` in the declaration
    pub fn with_standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }
}

/// Whether `name` can be used as an element or attribute name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn declared_encoding(encoding: TextEncoding) -> &'static str {
    match encoding {
        TextEncoding::Utf8 | TextEncoding::Utf8Bom => "UTF-8",
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => "UTF-16",
        TextEncoding::Windows1252 => "windows-1252",
    }
}

fn refuse(what: impl std::fmt::Display) -> NfoError {
    unrepresentable(NfoFormat::Xml, what)
}

fn check_element(name: &str, value: &Value) -> Result<()> {
    if !is_valid_name(name) {
        return Err(refuse(format!("'{name}' is not a valid element name")));
    }
    match value {
        Value::List(items) => items.iter().try_for_each(|item| match item {
            Value::List(_) => Err(refuse(format!("'{name}' holds a list directly inside a list"))),
            other => check_element(name, other),
        }),
        Value::Map(map) => check_content(name, map),
        _ => Ok(()),
    }
}

fn check_content(name: &str, map: &Map) -> Result<()> {
    for (key, value) in map {
        if let Some(attribute) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            if !is_valid_name(attribute) {
                return Err(refuse(format!("'{attribute}' is not a valid attribute name")));
            }
            if !value.is_scalar() {
                return Err(refuse(format!("attribute '{attribute}' of <{name}> is not a scalar")));
            }
        } else if key == TEXT_KEY {
            if !value.is_scalar() {
                return Err(refuse(format!("text of <{name}> is not a scalar")));
            }
        } else {
            check_element(key, value)?;
        }
    }
    Ok(())
}

/// Attributes, text and child elements of a mapping
fn split_content(map: &Map) -> (Vec<(&str, String)>, Option<String>, Vec<(&str, &Value)>) {
    let mut attributes = Vec::new();
    let mut text = None;
    let mut children = Vec::new();
    for (key, value) in map {
        if let Some(attribute) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            attributes.push((attribute, value.scalar_text().unwrap_or_default()));
        } else if key == TEXT_KEY {
            text = value.scalar_text().filter(|t| !t.is_empty());
        } else {
            children.push((key.as_str(), value));
        }
    }
    (attributes, text, children)
}

fn write_element(out: &mut XmlOut, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::List(items) => items.iter().try_for_each(|item| write_element(out, name, item)),
        Value::Map(map) => write_mapping(out, name, map),
        scalar => {
            let text = scalar.scalar_text().unwrap_or_default();
            if text.is_empty() {
                emit(out, Event::Empty(BytesStart::new(name)))
            } else {
                emit(out, Event::Start(BytesStart::new(name)))?;
                emit(out, Event::Text(BytesText::new(&text)))?;
                emit(out, Event::End(BytesEnd::new(name)))
            }
        }
    }
}

fn write_mapping(out: &mut XmlOut, name: &str, map: &Map) -> Result<()> {
    let (attributes, text, children) = split_content(map);
    let mut start = BytesStart::new(name);
    for (key, value) in &attributes {
        start.push_attribute((*key, value.as_str()));
    }

    if text.is_none() && children.is_empty() {
        return emit(out, Event::Empty(start));
    }
    emit(out, Event::Start(start))?;
    if let Some(text) = &text {
        emit(out, Event::Text(BytesText::new(text)))?;
    }
    for (child, value) in children {
        write_element(out, child, value)?;
    }
    emit(out, Event::End(BytesEnd::new(name)))
}

fn emit(out: &mut XmlOut, event: Event<'_>) -> Result<()> {
    out.write_event(event).map_err(refuse)
}

impl Writer for XmlWriter {
    fn format(&self) -> NfoFormat {
        NfoFormat::Xml
    }

    fn check(&self, data: &NfoData) -> Result<()> {
        let root = data.root_element.as_deref().unwrap_or(DEFAULT_ROOT);
        if !is_valid_name(root) {
            return Err(refuse(format!("'{root}' is not a valid root element name")));
        }
        check_content(root, &data.fields)
    }

    fn render(&self, data: &NfoData) -> Result<String> {
        self.check(data)?;
        let root = data.root_element.as_deref().unwrap_or(DEFAULT_ROOT);

        let mut out = quick_xml::Writer::new_with_indent(Vec::new(), b' ', self.indent);
        let standalone = self.standalone.then_some("yes");
        emit(
            &mut out,
            Event::Decl(BytesDecl::new("1.0", Some(declared_encoding(data.encoding)), standalone)),
        )?;
        write_mapping(&mut out, root, &data.fields)?;

        let mut text = String::from_utf8(out.into_inner()).map_err(refuse)?;
        text.push('\n');
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Parser, XmlParser};

    fn actor(name: &str, role: &str) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(name));
        map.insert("role".into(), Value::from(role));
        Value::Map(map)
    }

    #[test]
    fn test_render_layout() {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("title", "Dune").unwrap();
        data.set("uniqueid.@type", "imdb").unwrap();
        data.set("uniqueid.#text", "tt1160419").unwrap();
        data.set("genre", Value::List(vec!["Sci-Fi".into(), "Drama".into()])).unwrap();
        data.set("trailer", Value::Null).unwrap();

        let out = XmlWriter::new().render(&data).unwrap();
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <movie>\n\
             \x20 <title>Dune</title>\n\
             \x20 <uniqueid type=\"imdb\">tt1160419</uniqueid>\n\
             \x20 <genre>Sci-Fi</genre>\n\
             \x20 <genre>Drama</genre>\n\
             \x20 <trailer/>\n\
             </movie>\n"
        );
    }

    #[test]
    fn test_declaration_follows_bytes_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("movie.nfo");
        let writer = XmlWriter::new();

        let mut data = NfoData::new(NfoFormat::Xml).with_encoding(TextEncoding::Windows1252);
        data.set("title", "Amélie").unwrap();
        writer.write(&data, &path, false).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"windows-1252\""));
        assert!(bytes.windows(6).any(|w| w == b"Am\xE9lie"));

        data.set("title", "東京").unwrap();
        writer.write(&data, &path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\""));
        assert!(written.contains("<title>東京</title>"));
    }

    #[test]
    fn test_render_escapes_text() {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("plot", "K & <Joi>").unwrap();
        let out = XmlWriter::new().render(&data).unwrap();
        assert!(out.contains("<plot>K &amp; &lt;Joi&gt;</plot>"));
    }

    #[test]
    fn test_root_element_kept() {
        let data = NfoData::new(NfoFormat::Xml).with_root_element("tvshow");
        let out = XmlWriter::new().render(&data).unwrap();
        assert!(out.ends_with("<tvshow/>\n"));
    }

    #[test]
    fn test_refuses_invalid_names() {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("1st", "x").unwrap();
        assert!(!XmlWriter::new().can_write(&data));

        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("release date", "x").unwrap();
        assert!(matches!(XmlWriter::new().render(&data), Err(NfoError::Format(_))));
    }

    #[test]
    fn test_refuses_nested_lists_and_map_attributes() {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("matrix", Value::List(vec![Value::List(vec!["a".into()])])).unwrap();
        assert!(!XmlWriter::new().can_write(&data));

        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("uniqueid.@type.inner", "x").unwrap();
        assert!(!XmlWriter::new().can_write(&data));
    }

    #[test]
    fn test_round_trip() {
        let mut data = NfoData::new(NfoFormat::Xml).with_root_element("movie");
        data.set("title", "Blade Runner 2049").unwrap();
        data.set("year", "2017").unwrap();
        data.set("ratings.rating.@name", "imdb").unwrap();
        data.set("ratings.rating.value", "8.0").unwrap();
        data.set("actor", Value::List(vec![actor("Ryan Gosling", "K"), actor("Ana de Armas", "Joi")]))
            .unwrap();

        let rendered = XmlWriter::new().render(&data).unwrap();
        let parsed = XmlParser::new().parse(&rendered, TextEncoding::Utf8).unwrap();
        assert_eq!(parsed.root_element.as_deref(), Some("movie"));
        assert_eq!(parsed.flatten(), data.flatten());
    }
}
