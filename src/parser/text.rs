//! Key-value text parser
//!
//! Handles the loose `Key: Value` files many release tools emit:
//!
//! ```text
//! Title: Blade Runner 2049
//! Genre: Sci-Fi, Drama
//! Plot: A young blade runner discovers
//!   a long-buried secret.
//!
//! [Cast]
//! Ryan Gosling: Officer K
//! ```
//!
//! Keys are normalised (`Ryan Gosling` becomes `ryan_gosling`), `[Section]`
//! headers open a nested mapping and lines that are neither entries nor
//! headers are gathered into `description`.

use super::Parser;
use crate::encoding::TextEncoding;
use crate::error::{Location, NfoError, Result};
use crate::model::{Map, NfoData, NfoFormat, Value};

/// Key collecting free-form lines
pub const DESCRIPTION_KEY: &str = "description";

/// Fields whose comma-separated values are split into lists
pub const DEFAULT_LIST_FIELDS: &[&str] = &[
    "genre", "genres", "tag", "tags", "country", "countries", "studio", "studios", "director",
    "directors", "writer", "writers", "credits", "language", "languages", "style", "styles",
    "mood", "moods",
];

/// Characters that never appear in a key, so markup and object notation
/// lines are not mistaken for entries
const NON_KEY_CHARS: &[char] = &['<', '>', '{', '}', '"'];

/// Normalise a raw key or section name
///
/// Lowercases, collapses every run of non-word characters into `_` and trims
/// underscores from both ends.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_separator {
                out.push('_');
                pending_separator = false;
            }
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    // Runs of literal underscores collapse the same way as other separators
    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

/// Shape of one input line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Line<'a> {
    Blank,
    Comment,
    Section(&'a str),
    UnterminatedSection,
    Entry { key: &'a str, value: &'a str },
    Continuation(&'a str),
    Free(&'a str),
}

/// Classify one line
///
/// `open` is the indent of the entry still waiting for continuation lines.
/// An indented line continues it when it sits deeper than that entry or is
/// not an entry of its own.
fn classify(line: &str, open: Option<usize>) -> (usize, Line<'_>) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return (0, Line::Blank);
    }
    let indent = line.len() - line.trim_start().len();
    let shape = classify_unindented(trimmed);
    let indented = line.starts_with("  ") || line.starts_with('\t');
    match open {
        Some(open) if indented && (indent > open || matches!(shape, Line::Free(_))) => {
            (indent, Line::Continuation(trimmed))
        }
        _ => (indent, shape),
    }
}

fn classify_unindented(trimmed: &str) -> Line<'_> {
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Line::Comment;
    }
    if let Some(rest) = trimmed.strip_prefix('[') {
        return match rest.strip_suffix(']') {
            Some(name) => Line::Section(name.trim()),
            None if !rest.contains(']') => Line::UnterminatedSection,
            None => Line::Free(trimmed),
        };
    }

    let Some(split) = trimmed.find([':', '=']) else {
        return Line::Free(trimmed);
    };
    let key = trimmed[..split].trim();
    let starts_word = key.chars().next().is_some_and(char::is_alphanumeric);
    if !starts_word || key.contains(NON_KEY_CHARS) {
        return Line::Free(trimmed);
    }
    Line::Entry {
        key,
        value: trimmed[split + 1..].trim(),
    }
}

/// Entry waiting for possible continuation lines
struct Pending {
    key: String,
    value: String,
    indent: usize,
}

/// Parser for key-value text NFO files
#[derive(Debug, Clone)]
pub struct TextParser {
    list_fields: Vec<String>,
    coerce_types: bool,
}

impl Default for TextParser {
    fn default() -> Self {
        Self {
            list_fields: DEFAULT_LIST_FIELDS.iter().map(|f| f.to_string()).collect(),
            coerce_types: false,
        }
    }
}

impl TextParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of fields whose values are split on commas
    pub fn with_list_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.list_fields = fields.into_iter().map(|f| normalize_key(f.as_ref())).collect();
        self
    }

    /// Turn numeric and `true`/`false` values into typed scalars
    pub fn with_type_coercion(mut self, coerce: bool) -> Self {
        self.coerce_types = coerce;
        self
    }

    pub fn is_list_field(&self, key: &str) -> bool {
        self.list_fields.iter().any(|f| f == key)
    }

    fn scalar(&self, text: &str) -> Value {
        if self.coerce_types {
            Value::coerce(text)
        } else {
            Value::String(text.to_string())
        }
    }

    fn entry_value(&self, key: &str, raw: &str) -> Value {
        if self.is_list_field(key) && raw.contains(',') {
            let items = raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| self.scalar(item))
                .collect();
            Value::List(items)
        } else {
            self.scalar(raw)
        }
    }

    fn flush(&self, pending: &mut Option<Pending>, level: &mut Map) {
        if let Some(Pending { key, value, .. }) = pending.take() {
            let value = self.entry_value(&key, &value);
            insert_repeated(level, key, value);
        }
    }
}

/// Insert a value, turning a repeated key into a list
fn insert_repeated(level: &mut Map, key: String, value: Value) {
    match level.get_mut(&key) {
        None => {
            level.insert(key, value);
        }
        Some(Value::List(items)) => match value {
            Value::List(more) => items.extend(more),
            single => items.push(single),
        },
        Some(existing) => {
            let first = std::mem::take(existing);
            let mut items = vec![first];
            match value {
                Value::List(more) => items.extend(more),
                single => items.push(single),
            }
            *existing = Value::List(items);
        }
    }
}

/// Section currently receiving entries
struct Section {
    name: String,
    fields: Map,
}

/// Mapping that receives entries: the open section or the top level
fn level_mut<'a>(root: &'a mut Map, section: &'a mut Option<Section>) -> &'a mut Map {
    match section {
        Some(open) => &mut open.fields,
        None => root,
    }
}

impl Parser for TextParser {
    fn format(&self) -> NfoFormat {
        NfoFormat::Text
    }

    fn confidence(&self, text: &str) -> f64 {
        let mut considered = 0usize;
        let mut matched = 0usize;
        let mut open = None;
        for line in text.lines() {
            let (indent, shape) = classify(line, open);
            match shape {
                Line::Blank | Line::Comment | Line::Continuation(_) => {}
                Line::Entry { .. } => {
                    considered += 1;
                    matched += 1;
                    open = Some(indent);
                }
                Line::Section(_) => {
                    considered += 1;
                    matched += 1;
                    open = None;
                }
                Line::UnterminatedSection | Line::Free(_) => {
                    considered += 1;
                    open = None;
                }
            }
        }
        if considered == 0 {
            0.0
        } else {
            matched as f64 / considered as f64
        }
    }

    fn parse(&self, text: &str, encoding: TextEncoding) -> Result<NfoData> {
        let mut root = Map::new();
        let mut section: Option<Section> = None;
        let mut pending: Option<Pending> = None;
        let mut free_lines: Vec<String> = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let (indent, shape) = classify(line, pending.as_ref().map(|open| open.indent));
            match shape {
                Line::Blank | Line::Comment => {}
                Line::Continuation(rest) => {
                    // Only produced while an entry is pending
                    if let Some(open) = pending.as_mut() {
                        open.value.push('\n');
                        open.value.push_str(rest);
                    }
                }
                Line::Entry { key, value } => {
                    self.flush(&mut pending, level_mut(&mut root, &mut section));
                    pending = Some(Pending {
                        key: normalize_key(key),
                        value: value.to_string(),
                        indent,
                    });
                }
                Line::Section(raw) => {
                    let level = level_mut(&mut root, &mut section);
                    self.flush(&mut pending, level);
                    flush_description(&mut free_lines, level);
                    close_section(&mut root, &mut section);

                    let name = normalize_key(raw);
                    let location = Some(Location::new(index + 1, 1));
                    if name.is_empty() {
                        return Err(NfoError::parse(NfoFormat::Text, location, "empty section name"));
                    }
                    let fields = match root.get_mut(&name) {
                        // A repeated header reopens the section in place
                        Some(Value::Map(existing)) => std::mem::take(existing),
                        Some(_) => {
                            return Err(NfoError::parse(
                                NfoFormat::Text,
                                location,
                                format!("section [{raw}] conflicts with field '{name}'"),
                            ))
                        }
                        None => {
                            root.insert(name.clone(), Value::Map(Map::new()));
                            Map::new()
                        }
                    };
                    section = Some(Section { name, fields });
                }
                Line::UnterminatedSection => {
                    return Err(NfoError::parse(
                        NfoFormat::Text,
                        Some(Location::new(index + 1, 1)),
                        "section header is missing its closing ']'",
                    ));
                }
                Line::Free(content) => {
                    self.flush(&mut pending, level_mut(&mut root, &mut section));
                    free_lines.push(content.to_string());
                }
            }
        }

        let level = level_mut(&mut root, &mut section);
        self.flush(&mut pending, level);
        flush_description(&mut free_lines, level);
        close_section(&mut root, &mut section);

        Ok(NfoData::with_fields(NfoFormat::Text, root).with_encoding(encoding))
    }
}

/// Put the open section back at its position in the top level
fn close_section(root: &mut Map, section: &mut Option<Section>) {
    if let Some(Section { name, fields }) = section.take() {
        root.insert(name, Value::Map(fields));
    }
}

fn flush_description(lines: &mut Vec<String>, level: &mut Map) {
    if !lines.is_empty() {
        let text = lines.join("\n");
        lines.clear();
        insert_repeated(level, DESCRIPTION_KEY.to_string(), Value::String(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLADE_RUNNER: &str =
        "Title: Blade Runner 2049\nYear: 2017\nGenre: Sci-Fi, Drama, Thriller\n\n[Cast]\nRyan Gosling: Officer K\n";

    fn parse(text: &str) -> NfoData {
        TextParser::new().parse(text, TextEncoding::Utf8).unwrap()
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Title"), "title");
        assert_eq!(normalize_key("  Ryan Gosling "), "ryan_gosling");
        assert_eq!(normalize_key("Release-Date (US)"), "release_date_us");
        assert_eq!(normalize_key("a__b"), "a_b");
        assert_eq!(normalize_key("__x__"), "x");
        assert_eq!(normalize_key("Größe"), "größe");
    }

    #[test]
    fn test_parse_blade_runner() {
        let data = parse(BLADE_RUNNER);

        assert_eq!(data.get("title"), Some(&Value::from("Blade Runner 2049")));
        assert_eq!(data.get("year"), Some(&Value::from("2017")));
        assert_eq!(
            data.get("genre"),
            Some(&Value::List(vec![
                Value::from("Sci-Fi"),
                Value::from("Drama"),
                Value::from("Thriller"),
            ]))
        );
        assert_eq!(data.get("cast.ryan_gosling"), Some(&Value::from("Officer K")));
    }

    #[test]
    fn test_comma_outside_list_fields_is_kept() {
        let data = parse("Plot: Dark, moody, slow\nTags: a, b\n");
        assert_eq!(data.get("plot"), Some(&Value::from("Dark, moody, slow")));
        assert_eq!(data.get("tags").unwrap().as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_custom_list_fields() {
        let parser = TextParser::new().with_list_fields(["Keywords"]);
        let data = parser.parse("Keywords: a, b\nGenre: x, y\n", TextEncoding::Utf8).unwrap();
        assert!(data.get("keywords").unwrap().as_list().is_some());
        assert_eq!(data.get("genre"), Some(&Value::from("x, y")));
    }

    #[test]
    fn test_equals_delimiter() {
        let data = parse("title = Dune\nurl = http://example.com/a=b\n");
        assert_eq!(data.get("title"), Some(&Value::from("Dune")));
        assert_eq!(data.get("url"), Some(&Value::from("http://example.com/a=b")));
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let data = parse("# header\n; note\n\nTitle: Dune\n");
        assert_eq!(data.fields.len(), 1);
    }

    #[test]
    fn test_repeated_key_becomes_list() {
        let data = parse("Actor: A\nActor: B\nActor: C\n");
        assert_eq!(
            data.get("actor"),
            Some(&Value::List(vec![Value::from("A"), Value::from("B"), Value::from("C")]))
        );
    }

    #[test]
    fn test_continuation_lines() {
        let data = parse("Plot: First line\n  second line\n\tthird line\nYear: 2021\n");
        assert_eq!(
            data.get("plot"),
            Some(&Value::from("First line\nsecond line\nthird line"))
        );
        assert_eq!(data.get("year"), Some(&Value::from("2021")));
    }

    #[test]
    fn test_indented_section_entries_stay_separate() {
        let data = parse("Title: X\n\n[Cast]\n  Ryan Gosling: Officer K\n  Harrison Ford: Rick Deckard\n");
        assert_eq!(data.get("cast.ryan_gosling"), Some(&Value::from("Officer K")));
        assert_eq!(data.get("cast.harrison_ford"), Some(&Value::from("Rick Deckard")));

        // Deeper lines still continue an indented entry
        let data = parse("[Info]\n  Plot: One\n    two: three\n  Year: 2021\n");
        assert_eq!(data.get("info.plot"), Some(&Value::from("One\ntwo: three")));
        assert_eq!(data.get("info.year"), Some(&Value::from("2021")));
    }

    #[test]
    fn test_free_lines_become_description() {
        let data = parse("Title: Dune\nA desert planet.\nSpice flows.\n");
        assert_eq!(
            data.get("description"),
            Some(&Value::from("A desert planet.\nSpice flows."))
        );
    }

    #[test]
    fn test_sections_preserve_order() {
        let data = parse("Title: X\n[Video]\nCodec: x264\n[Audio]\nCodec: AAC\n");
        let keys: Vec<&str> = data.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "video", "audio"]);
        assert_eq!(data.get("audio.codec"), Some(&Value::from("AAC")));
    }

    #[test]
    fn test_unterminated_section_fails_with_line() {
        let err = TextParser::new()
            .parse("Title: X\n[Cast\nA: B\n", TextEncoding::Utf8)
            .unwrap_err();
        match err {
            NfoError::Parse { format, location, .. } => {
                assert_eq!(format, NfoFormat::Text);
                assert_eq!(location, Some(Location::new(2, 1)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_section_conflicting_with_field_fails() {
        let err = TextParser::new()
            .parse("Cast: none\n[Cast]\nA: B\n", TextEncoding::Utf8)
            .unwrap_err();
        assert!(matches!(err, NfoError::Parse { .. }));
    }

    #[test]
    fn test_type_coercion() {
        let parser = TextParser::new().with_type_coercion(true);
        let data = parser.parse("Year: 2017\nRating: 8.5\nTitle: 1917 Redux\n", TextEncoding::Utf8).unwrap();
        assert_eq!(data.get("year"), Some(&Value::Integer(2017)));
        assert_eq!(data.get("rating"), Some(&Value::Float(8.5)));
        assert_eq!(data.get("title"), Some(&Value::from("1917 Redux")));
    }

    #[test]
    fn test_confidence() {
        let parser = TextParser::new();
        assert_eq!(parser.confidence(BLADE_RUNNER), 1.0);
        assert_eq!(parser.confidence("Title: X\nfree text\n"), 0.5);
        assert_eq!(parser.confidence(""), 0.0);
        assert_eq!(
            parser.confidence("<?xml version=\"1.0\"?>\n<movie>\n  <title>X</title>\n</movie>\n"),
            0.0
        );
        assert_eq!(parser.confidence("{\n  \"title\": \"X\"\n}\n"), 0.0);
    }
}
