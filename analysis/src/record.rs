//! Character records and the text that gets embedded for them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fields combined into the embedded text when nothing else is configured.
pub const DEFAULT_EMBED_FIELDS: [&str; 6] = [
    "name",
    "description",
    "personality",
    "scenario",
    "first_mes",
    "mes_example",
];

/// A character supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque identifier (the host uses the avatar file name).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Named text fields.
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

impl Record {
    /// Create a record without text fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a text field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a field. `name` falls back to the display name.
    pub fn field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(value) => Some(value.as_str()),
            None if key == "name" => Some(self.name.as_str()),
            None => None,
        }
    }

    /// Join the non-blank `fields` with newlines.
    ///
    /// Returns `None` when there is nothing to embed.
    pub fn combined_text<S: AsRef<str>>(&self, fields: &[S]) -> Option<String> {
        let text = fields
            .iter()
            .filter_map(|key| self.field(key.as_ref()))
            .filter(|value| !value.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combined_text_follows_field_order() {
        let record = Record::new("alice.png", "Alice")
            .with_field("scenario", "A tavern")
            .with_field("description", "A bard");

        let text = record.combined_text(&DEFAULT_EMBED_FIELDS).unwrap();
        assert_eq!(text, "Alice\nA bard\nA tavern");
    }

    #[test]
    fn test_combined_text_skips_blank_fields() {
        let record = Record::new("bob.png", "Bob")
            .with_field("description", "   ")
            .with_field("personality", "Grumpy");

        assert_eq!(
            record.combined_text(&["description", "personality"]).unwrap(),
            "Grumpy"
        );
    }

    #[test]
    fn test_combined_text_empty() {
        let record = Record::new("ghost.png", "  ").with_field("description", "\n\t");
        assert_eq!(record.combined_text(&DEFAULT_EMBED_FIELDS), None);
    }

    #[test]
    fn test_name_field_override() {
        let record = Record::new("c.png", "Carol").with_field("name", "Carol the Brave");
        assert_eq!(record.field("name"), Some("Carol the Brave"));
        assert_eq!(record.field("scenario"), None);
    }

    #[test]
    fn test_deserialize_without_fields() {
        let record: Record = serde_json::from_str(r#"{"id":"d.png","name":"Dan"}"#).unwrap();
        assert_eq!(record, Record::new("d.png", "Dan"));
    }
}
