use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Collections stripped from `data` when building the shared set metadata.
const NON_METADATA_KEYS: [&str; 3] = ["cards", "tokens", "booster"];

/// One MTGJSON set file (`AllSetFiles/<CODE>.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct SetFile {
    #[serde(default)]
    pub meta: Option<Value>,
    pub data: Map<String, Value>,
}

impl SetFile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening set file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing set file {}", path.display()))
    }

    pub fn from_value(v: Value) -> Result<Self> {
        serde_json::from_value(v).map_err(|e| anyhow!("invalid set file: {e}"))
    }

    pub fn code(&self) -> Option<&str> {
        self.data.get("code").and_then(|v| v.as_str())
    }

    /// Card entries; an absent or null `cards` key yields nothing.
    pub fn cards(&self) -> &[Value] {
        collection(&self.data, "cards")
    }

    /// Token entries; an absent or null `tokens` key yields nothing.
    pub fn tokens(&self) -> &[Value] {
        collection(&self.data, "tokens")
    }

    /// Cards followed by tokens.
    pub fn records(&self) -> impl Iterator<Item = &Value> {
        self.cards().iter().chain(self.tokens().iter())
    }

    /// Distinct Scryfall ids referenced by the set's cards and tokens.
    pub fn scryfall_ids(&self) -> HashSet<String> {
        self.records()
            .filter_map(scryfall_id)
            .map(str::to_string)
            .collect()
    }

    /// Set-level metadata shared by every document built from this file.
    pub fn set_info(&self) -> Value {
        let mut info = self.data.clone();
        for key in NON_METADATA_KEYS {
            info.remove(key);
        }
        Value::Object(info)
    }
}

fn collection<'a>(data: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `identifiers.scryfallId` of a card or token, if present and non-empty.
pub fn scryfall_id(record: &Value) -> Option<&str> {
    record
        .pointer("/identifiers/scryfallId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// All `*.json` files directly under `dir`, in sorted order.
pub fn list_set_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading set directory {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if path.is_file() && is_json {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card(id: Option<&str>) -> Value {
        match id {
            Some(id) => json!({"name": "c", "identifiers": {"scryfallId": id}}),
            None => json!({"name": "c", "identifiers": {}}),
        }
    }

    #[test]
    fn ids_are_the_union_of_cards_and_tokens_without_duplicates() {
        let set = SetFile::from_value(json!({
            "data": {
                "code": "TST",
                "cards": [card(Some("a")), card(Some("b")), card(Some("a")), card(None)],
                "tokens": [card(Some("b")), card(Some("t1")), {"name": "no identifiers"}]
            }
        }))
        .unwrap();

        let ids = set.scryfall_ids();
        let expected: HashSet<String> = ["a", "b", "t1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn missing_or_null_collections_are_empty() {
        let set = SetFile::from_value(json!({"data": {"code": "NIL", "tokens": null}})).unwrap();
        assert!(set.cards().is_empty());
        assert!(set.tokens().is_empty());
        assert!(set.scryfall_ids().is_empty());
    }

    #[test]
    fn empty_scryfall_ids_are_ignored() {
        let set = SetFile::from_value(json!({"data": {"cards": [card(Some("")), card(Some("  "))]}}))
            .unwrap();
        assert!(set.scryfall_ids().is_empty());
    }

    #[test]
    fn set_info_strips_card_token_and_booster_collections() {
        let set = SetFile::from_value(json!({
            "data": {
                "code": "TST",
                "name": "Test Set",
                "cards": [card(Some("a"))],
                "tokens": [],
                "booster": {"default": {}}
            }
        }))
        .unwrap();
        assert_eq!(set.set_info(), json!({"code": "TST", "name": "Test Set"}));
        // source data untouched
        assert_eq!(set.cards().len(), 1);
    }

    #[test]
    fn lists_only_json_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["B.json", "A.json", "notes.txt"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let files = list_set_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.json", "B.json"]);
    }
}
