//! Recursive field allow-lists for projecting MTGJSON records.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Copy the value verbatim.
    Keep,
    /// Recurse into the value with a narrower schema.
    Nested(FieldSchema),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    fields: BTreeMap<&'static str, FieldRule>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep(mut self, key: &'static str) -> Self {
        self.fields.insert(key, FieldRule::Keep);
        self
    }

    pub fn keep_all(mut self, keys: &[&'static str]) -> Self {
        for &key in keys {
            self.fields.insert(key, FieldRule::Keep);
        }
        self
    }

    pub fn nested(mut self, key: &'static str, schema: FieldSchema) -> Self {
        self.fields.insert(key, FieldRule::Nested(schema));
        self
    }

    pub fn rule(&self, key: &str) -> Option<&FieldRule> {
        self.fields.get(key)
    }

    /// Project `value` through this schema.
    ///
    /// Objects keep only allowed keys, arrays are projected element-wise with the
    /// same schema, and scalars pass through untouched.
    pub fn project(&self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => {
                let mut out = Map::new();
                for (key, inner) in obj {
                    match self.rule(key) {
                        Some(FieldRule::Keep) => {
                            out.insert(key.clone(), inner.clone());
                        }
                        Some(FieldRule::Nested(sub)) => {
                            out.insert(key.clone(), sub.project(inner));
                        }
                        None => {}
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.project(v)).collect()),
            other => other.clone(),
        }
    }
}

/// Fields kept on every indexed card or token document.
pub fn card_schema() -> FieldSchema {
    FieldSchema::new()
        .keep_all(&[
            "borderColor",
            "cardParts",
            "colorIdentity",
            "colors",
            "convertedManaCost",
            "defense",
            "flavorName",
            "flavorText",
            "keywords",
            "legalities",
            "life",
            "loyalty",
            "manaCost",
            "name",
            "number",
            "otherFaceIds",
            "power",
            "rarity",
            "releaseDate",
            "setCode",
            "subtypes",
            "supertypes",
            "text",
            "toughness",
            "type",
            "types",
            "uuid",
        ])
        .nested(
            "identifiers",
            FieldSchema::new().keep_all(&[
                "scryfallId",
                "scryfallIllustrationId",
                "tcgplayerProductId",
            ]),
        )
        .nested(
            "leadershipSkills",
            FieldSchema::new().keep_all(&["brawl", "commander", "oathbreaker"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_unknown_keys_and_honours_nested_allow_list() {
        let card = json!({
            "name": "Lightning Bolt",
            "manaCost": "{R}",
            "foreignData": [{"language": "German"}],
            "identifiers": {
                "scryfallId": "abc",
                "mtgoId": "999",
                "tcgplayerProductId": "123"
            },
            "leadershipSkills": {"brawl": false, "commander": true, "extra": 1}
        });

        let projected = card_schema().project(&card);
        assert_eq!(
            projected,
            json!({
                "name": "Lightning Bolt",
                "manaCost": "{R}",
                "identifiers": {"scryfallId": "abc", "tcgplayerProductId": "123"},
                "leadershipSkills": {"brawl": false, "commander": true}
            })
        );
    }

    #[test]
    fn keep_copies_nested_values_verbatim() {
        let card = json!({"legalities": {"modern": "Legal", "vintage": "Restricted"}});
        assert_eq!(card_schema().project(&card), card);
    }

    #[test]
    fn arrays_are_projected_element_wise() {
        let schema = FieldSchema::new().nested("faces", FieldSchema::new().keep("name"));
        let value = json!({"faces": [{"name": "A", "art": 1}, {"name": "B"}, 3]});
        assert_eq!(
            schema.project(&value),
            json!({"faces": [{"name": "A"}, {"name": "B"}, 3]})
        );
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(card_schema().project(&json!("x")), json!("x"));
        assert_eq!(card_schema().project(&Value::Null), Value::Null);
    }
}
