//! Key-value text writer

use super::{unrepresentable, Writer};
use crate::error::{NfoError, Result};
use crate::model::{NfoData, NfoFormat, Value};
use crate::parser::text::{normalize_key, DEFAULT_LIST_FIELDS};

/// Writer for key-value text NFO files
///
/// Top-level scalars and lists come first, followed by one `[Section]`
/// block per top-level mapping. Only one level of nesting fits the format.
#[derive(Debug, Clone)]
pub struct TextWriter {
    list_fields: Vec<String>,
}

impl Default for TextWriter {
    fn default() -> Self {
        Self {
            list_fields: DEFAULT_LIST_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl TextWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields written as a single comma-joined line
    ///
    /// Should match the list fields of the parser that will read the output.
    pub fn with_list_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.list_fields = fields.into_iter().map(|f| normalize_key(f.as_ref())).collect();
        self
    }

    fn joins(&self, key: &str, items: &[Value]) -> bool {
        self.list_fields.iter().any(|f| f == key)
            && items.iter().all(|item| {
                item.scalar_text()
                    .is_some_and(|text| !text.contains(',') && !text.contains('\n'))
            })
    }

    fn write_entries(&self, out: &mut String, key: &str, value: &Value) {
        let label = display_key(key);
        match value {
            Value::List(items) if self.joins(key, items) => {
                let joined: Vec<String> = items.iter().filter_map(Value::scalar_text).collect();
                push_line(out, &label, &joined.join(", "));
            }
            Value::List(items) => {
                for item in items {
                    push_line(out, &label, &item.scalar_text().unwrap_or_default());
                }
            }
            scalar => push_line(out, &label, &scalar.scalar_text().unwrap_or_default()),
        }
    }
}

/// Readable form of a normalised key: `ryan_gosling` becomes `Ryan Gosling`
pub fn display_key(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_line(out: &mut String, label: &str, value: &str) {
    let mut lines = value.lines().map(str::trim).filter(|line| !line.is_empty());
    out.push_str(label);
    out.push(':');
    if let Some(first) = lines.next() {
        out.push(' ');
        out.push_str(first);
    }
    out.push('\n');
    for line in lines {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
}

fn refuse(what: impl std::fmt::Display) -> NfoError {
    unrepresentable(NfoFormat::Text, what)
}

fn check_key(key: &str) -> Result<()> {
    if normalize_key(&display_key(key)) == key {
        Ok(())
    } else {
        Err(refuse(format!("key '{key}' would not read back unchanged")))
    }
}

fn check_leaf(path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Map(_) => Err(refuse(format!("'{path}' nests a mapping inside a section"))),
        Value::List(items) if items.iter().any(|item| !item.is_scalar()) => {
            Err(refuse(format!("list '{path}' holds mappings or lists")))
        }
        _ => Ok(()),
    }
}

impl Writer for TextWriter {
    fn format(&self) -> NfoFormat {
        NfoFormat::Text
    }

    fn check(&self, data: &NfoData) -> Result<()> {
        for (key, value) in &data.fields {
            check_key(key)?;
            match value {
                Value::Map(section) => {
                    for (child, value) in section {
                        check_key(child)?;
                        check_leaf(&format!("{key}.{child}"), value)?;
                    }
                }
                other => check_leaf(key, other)?,
            }
        }
        Ok(())
    }

    fn render(&self, data: &NfoData) -> Result<String> {
        self.check(data)?;
        let mut out = String::new();

        let (sections, top): (Vec<_>, Vec<_>) = data
            .fields
            .iter()
            .partition(|(_, value)| matches!(value, Value::Map(_)));

        for (key, value) in top {
            self.write_entries(&mut out, key, value);
        }
        for (key, value) in sections {
            let Value::Map(section) = value else { continue };
            if !out.is_empty() {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&display_key(key));
            out.push_str("]\n");
            for (child, value) in section {
                self.write_entries(&mut out, child, value);
            }
        }
        Ok(out)
    }
}
