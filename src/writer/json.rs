//! Object notation (JSON) writer

use super::{unrepresentable, Writer};
use crate::error::Result;
use crate::model::{Map, NfoData, NfoFormat, Value};

/// Pretty-printing JSON writer
///
/// Output uses two-space indentation and keeps the model's key order.
#[derive(Debug, Clone, Default)]
pub struct JsonWriter;

impl JsonWriter {
    pub fn new() -> Self {
        Self
    }
}

fn find_non_finite(map: &Map, prefix: &str) -> Option<String> {
    map.iter().find_map(|(key, value)| {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        non_finite_in(value, &path)
    })
}

fn non_finite_in(value: &Value, path: &str) -> Option<String> {
    match value {
        Value::Float(f) if !f.is_finite() => Some(path.to_string()),
        Value::List(items) => items.iter().find_map(|item| non_finite_in(item, path)),
        Value::Map(map) => find_non_finite(map, path),
        _ => None,
    }
}

impl Writer for JsonWriter {
    fn format(&self) -> NfoFormat {
        NfoFormat::Json
    }

    fn check(&self, data: &NfoData) -> Result<()> {
        match find_non_finite(&data.fields, "") {
            Some(path) => Err(unrepresentable(
                NfoFormat::Json,
                format!("'{path}' holds a non-finite number"),
            )),
            None => Ok(()),
        }
    }

    fn render(&self, data: &NfoData) -> Result<String> {
        self.check(data)?;
        let object = Value::Map(data.fields.clone()).to_json();
        let mut out = serde_json::to_string_pretty(&object)
            .map_err(|err| unrepresentable(NfoFormat::Json, err))?;
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::TextEncoding;
    use crate::parser::{JsonParser, Parser};

    #[test]
    fn test_render_pretty_in_order() {
        let mut data = NfoData::new(NfoFormat::Json);
        data.set("title", "Dune").unwrap();
        data.set("year", 2021i64).unwrap();
        data.set("ratings.imdb", 8.0).unwrap();

        let out = JsonWriter::new().render(&data).unwrap();
        assert_eq!(
            out,
            "{\n  \"title\": \"Dune\",\n  \"year\": 2021,\n  \"ratings\": {\n    \"imdb\": 8.0\n  }\n}\n"
        );
    }

    #[test]
    fn test_non_finite_float_refused() {
        let mut data = NfoData::new(NfoFormat::Json);
        data.set("ratings.imdb", f64::NAN).unwrap();

        let writer = JsonWriter::new();
        assert!(!writer.can_write(&data));
        let err = writer.render(&data).unwrap_err();
        assert!(err.to_string().contains("ratings.imdb"));
    }

    #[test]
    fn test_round_trip() {
        let source = r#"{"title": "Dune", "year": 2021, "genre": ["Sci-Fi", "Drama"], "watched": true}"#;
        let parser = JsonParser::new();
        let first = parser.parse(source, TextEncoding::Utf8).unwrap();
        let rendered = JsonWriter::new().render(&first).unwrap();
        let second = parser.parse(&rendered, TextEncoding::Utf8).unwrap();
        assert_eq!(first.flatten(), second.flatten());
    }
}
