//! Canonical field model shared by every format

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::encoding::TextEncoding;
use crate::error::{NfoError, Result};

/// Separator between segments of a dotted field path
pub const PATH_SEPARATOR: char = '.';

/// Ordered mapping used at every nesting level
pub type Map = IndexMap<String, Value>;

/// Supported on-disk representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NfoFormat {
    /// Markup (Kodi-style XML)
    Xml,
    /// Object notation (JSON)
    Json,
    /// Flat `key: value` text with optional `[Section]` headers
    Text,
}

impl NfoFormat {
    /// All formats, most structured first
    pub const ALL: [NfoFormat; 3] = [NfoFormat::Xml, NfoFormat::Json, NfoFormat::Text];

    /// Tie-break rank: lower wins
    pub fn structure_rank(&self) -> u8 {
        match self {
            NfoFormat::Xml => 0,
            NfoFormat::Json => 1,
            NfoFormat::Text => 2,
        }
    }

    /// Format implied by a file extension, if unambiguous
    ///
    /// `.nfo` is used for every representation and gives no hint.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xml" => Some(NfoFormat::Xml),
            "json" => Some(NfoFormat::Json),
            "txt" | "text" | "info" | "meta" => Some(NfoFormat::Text),
            _ => None,
        }
    }

    /// Format implied by a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NfoFormat::Xml => "xml",
            NfoFormat::Json => "json",
            NfoFormat::Text => "text",
        }
    }
}

impl fmt::Display for NfoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NfoFormat {
    type Err = NfoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(NfoFormat::Xml),
            "json" => Ok(NfoFormat::Json),
            "text" | "txt" => Ok(NfoFormat::Text),
            other => Err(NfoError::Format(format!("unknown format '{other}'"))),
        }
    }
}

/// A field value: scalar, ordered list or nested mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Textual form of a scalar, as the markup and text formats store it
    ///
    /// Returns `None` for lists and mappings.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Interpret a bare string as a boolean or number when it is one
    pub fn coerce(text: &str) -> Value {
        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            // Leading zeros and signs would not survive a round trip
            if i.to_string() == text {
                return Value::Integer(i);
            }
        }
        if text.contains('.') {
            if let Ok(f) = text.parse::<f64>() {
                if f.is_finite() && f.to_string() == text {
                    return Value::Float(f);
                }
            }
        }
        Value::String(text.to_string())
    }

    /// Descend one mapping level, following the first element of a list
    fn child(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::List(items) => match items.first() {
                Some(Value::Map(map)) => map.get(key),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar_text() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Requested change to one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Create or overwrite the field
    Set(Value),
    /// Remove the field
    Clear,
}

impl FieldUpdate {
    pub fn set(value: impl Into<Value>) -> Self {
        FieldUpdate::Set(value.into())
    }
}

impl From<Value> for FieldUpdate {
    fn from(value: Value) -> Self {
        FieldUpdate::Set(value)
    }
}

/// Field updates keyed by dotted path, applied in insertion order
pub type FieldUpdates = IndexMap<String, FieldUpdate>;

/// Parsed content of one NFO file
#[derive(Debug, Clone, PartialEq)]
pub struct NfoData {
    /// File the model was read from, if any
    pub path: Option<PathBuf>,
    /// Representation the model was read from or is destined for
    pub format: NfoFormat,
    /// Encoding to use when writing
    pub encoding: TextEncoding,
    /// Name of the markup root element (`movie`, `tvshow`, ...)
    pub root_element: Option<String>,
    /// Top-level fields
    pub fields: Map,
    modified: bool,
}

impl NfoData {
    /// Create an empty model with no backing file
    pub fn new(format: NfoFormat) -> Self {
        Self::with_fields(format, Map::new())
    }

    /// Create a model holding the given top-level fields
    pub fn with_fields(format: NfoFormat, fields: Map) -> Self {
        Self {
            path: None,
            format,
            encoding: TextEncoding::default(),
            root_element: None,
            fields,
            modified: false,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_root_element(mut self, root: impl Into<String>) -> Self {
        self.root_element = Some(root.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether any mutation happened since construction
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Look up a dotted path
    ///
    /// A segment that lands on a list of mappings continues in the first
    /// element of the list.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path)?.into_iter();
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Create or overwrite the value at a dotted path
    ///
    /// Missing intermediate mappings are created. Fails with a field error
    /// when a segment would index into a scalar.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let segments = split_path(path)
            .ok_or_else(|| NfoError::field(path, "path must not be empty or contain empty segments"))?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| NfoError::field(path, "path must not be empty"))?;

        let mut current = &mut self.fields;
        for segment in parents {
            let slot = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Map(Map::new()));
            current = match slot {
                Value::Map(map) => map,
                Value::List(items) => match items.first_mut() {
                    Some(Value::Map(map)) => map,
                    _ => {
                        return Err(NfoError::field(
                            path,
                            format!("'{segment}' is a list without mapping elements"),
                        ))
                    }
                },
                _ => {
                    return Err(NfoError::field(
                        path,
                        format!("'{segment}' is a scalar, not a mapping"),
                    ))
                }
            };
        }

        current.insert((*last).to_string(), value.into());
        self.modified = true;
        Ok(())
    }

    /// Remove the value at a dotted path, returning it if it existed
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>> {
        let segments = split_path(path)
            .ok_or_else(|| NfoError::field(path, "path must not be empty or contain empty segments"))?;
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };

        let mut current = &mut self.fields;
        for segment in parents {
            current = match current.get_mut(*segment) {
                Some(Value::Map(map)) => map,
                Some(Value::List(items)) => match items.first_mut() {
                    Some(Value::Map(map)) => map,
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            };
        }

        let removed = current.shift_remove(*last);
        if removed.is_some() {
            self.modified = true;
        }
        Ok(removed)
    }

    /// Apply a set of updates in order
    ///
    /// Returns the paths touched, in update order. Stops at the first error.
    pub fn update_fields(&mut self, updates: &FieldUpdates) -> Result<Vec<String>> {
        let mut changed = Vec::with_capacity(updates.len());
        for (path, update) in updates {
            match update {
                FieldUpdate::Set(value) => self.set(path, value.clone())?,
                FieldUpdate::Clear => {
                    self.remove(path)?;
                }
            }
            changed.push(path.clone());
        }
        Ok(changed)
    }

    /// Flatten nested mappings into dotted paths
    ///
    /// Scalars and lists are leaves; empty mappings are kept as leaves so
    /// they are not silently lost.
    pub fn flatten(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        flatten_into(&self.fields, "", &mut out);
        out
    }
}

fn flatten_into(map: &Map, prefix: &str, out: &mut IndexMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{PATH_SEPARATOR}{key}")
        };
        match value {
            Value::Map(child) if !child.is_empty() => flatten_into(child, &path, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn split_path(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        None
    } else {
        Some(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NfoData {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("title", "Blade Runner 2049").unwrap();
        data.set("year", 2017i64).unwrap();
        let actor = |name: &str, role: &str| {
            let mut map = Map::new();
            map.insert("name".into(), Value::from(name));
            map.insert("role".into(), Value::from(role));
            Value::Map(map)
        };
        data.set(
            "actor",
            Value::List(vec![actor("Ryan Gosling", "K"), actor("Harrison Ford", "Deckard")]),
        )
        .unwrap();
        data
    }

    #[test]
    fn test_get_top_level() {
        let data = sample();
        assert_eq!(data.get("title"), Some(&Value::from("Blade Runner 2049")));
        assert_eq!(data.get("year"), Some(&Value::Integer(2017)));
        assert_eq!(data.get("missing"), None);
    }

    #[test]
    fn test_get_through_list_uses_first_element() {
        let data = sample();
        assert_eq!(data.get("actor.name"), Some(&Value::from("Ryan Gosling")));
        assert_eq!(data.get("actor.role"), Some(&Value::from("K")));
    }

    #[test]
    fn test_get_rejects_empty_segments() {
        let data = sample();
        assert_eq!(data.get(""), None);
        assert_eq!(data.get("title."), None);
        assert_eq!(data.get(".title"), None);
    }

    #[test]
    fn test_get_into_scalar_is_absent() {
        let data = sample();
        assert_eq!(data.get("title.sub"), None);
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut data = NfoData::new(NfoFormat::Json);
        assert!(!data.is_modified());
        data.set("metadata.updated", "2024-01-01").unwrap();
        assert_eq!(data.get("metadata.updated"), Some(&Value::from("2024-01-01")));
        assert!(data.has("metadata"));
        assert!(data.get("metadata").unwrap().as_map().is_some());
        assert!(data.is_modified());
    }

    #[test]
    fn test_set_into_scalar_fails() {
        let mut data = sample();
        let err = data.set("title.sub", "x").unwrap_err();
        assert!(matches!(err, NfoError::Field { .. }));
        assert!(err.to_string().contains("scalar"));
    }

    #[test]
    fn test_set_rejects_empty_path() {
        let mut data = sample();
        assert!(matches!(data.set("", "x"), Err(NfoError::Field { .. })));
        assert!(matches!(data.set("a..b", "x"), Err(NfoError::Field { .. })));
    }

    #[test]
    fn test_set_preserves_key_position() {
        let mut data = sample();
        data.set("title", "Dune").unwrap();
        let keys: Vec<&String> = data.fields.keys().collect();
        assert_eq!(keys, vec!["title", "year", "actor"]);
    }

    #[test]
    fn test_set_preserves_value_type() {
        let mut data = NfoData::new(NfoFormat::Json);
        data.set("rating", 8.5).unwrap();
        data.set("watched", true).unwrap();
        assert_eq!(data.get("rating"), Some(&Value::Float(8.5)));
        assert_eq!(data.get("watched"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_set_never_creates_lists() {
        let mut data = NfoData::new(NfoFormat::Xml);
        data.set("genre", "Drama").unwrap();
        data.set("genre", "Sci-Fi").unwrap();
        assert_eq!(data.get("genre"), Some(&Value::from("Sci-Fi")));
    }

    #[test]
    fn test_remove() {
        let mut data = sample();
        assert_eq!(data.remove("year").unwrap(), Some(Value::Integer(2017)));
        assert!(!data.has("year"));
        assert_eq!(data.remove("year").unwrap(), None);
        assert_eq!(data.remove("title.sub").unwrap(), None);
    }

    #[test]
    fn test_update_fields_idempotent() {
        let mut updates = FieldUpdates::new();
        updates.insert("title".into(), FieldUpdate::set("Dune"));
        updates.insert("metadata.source".into(), FieldUpdate::set("manual"));
        updates.insert("year".into(), FieldUpdate::Clear);

        let mut once = sample();
        once.update_fields(&updates).unwrap();
        let mut twice = sample();
        twice.update_fields(&updates).unwrap();
        let changed = twice.update_fields(&updates).unwrap();

        assert_eq!(once.fields, twice.fields);
        assert_eq!(changed, vec!["title", "metadata.source", "year"]);
    }

    #[test]
    fn test_flatten() {
        let mut data = sample();
        data.set("ratings.imdb.value", 8.0).unwrap();
        let flat = data.flatten();
        assert_eq!(flat.get("title"), Some(&Value::from("Blade Runner 2049")));
        assert_eq!(flat.get("ratings.imdb.value"), Some(&Value::Float(8.0)));
        assert!(flat.get("actor").unwrap().as_list().is_some());
        assert!(!flat.contains_key("ratings"));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::coerce("2017"), Value::Integer(2017));
        assert_eq!(Value::coerce("007"), Value::from("007"));
        assert_eq!(Value::coerce("8.5"), Value::Float(8.5));
        assert_eq!(Value::coerce("8.50"), Value::from("8.50"));
        assert_eq!(Value::coerce("true"), Value::Bool(true));
        assert_eq!(Value::coerce("yes"), Value::from("yes"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(NfoFormat::from_path(Path::new("a/movie.XML")), Some(NfoFormat::Xml));
        assert_eq!(NfoFormat::from_path(Path::new("movie.json")), Some(NfoFormat::Json));
        assert_eq!(NfoFormat::from_path(Path::new("movie.nfo")), None);
        assert_eq!("TXT".parse::<NfoFormat>().unwrap(), NfoFormat::Text);
        assert!("yaml".parse::<NfoFormat>().is_err());
    }
}
