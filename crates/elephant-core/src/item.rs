use serde::{Deserialize, Serialize};

/// One selectable result row. Items are pure data: they reference their
/// originating provider by name, never by pointer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Provider-scoped opaque identifier; uniquely selects the item for
    /// activation within one provider's results for one query.
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subtext: String,
    #[serde(default)]
    pub icon: String,
    /// Originating provider name. Filled in by the dispatcher if a provider
    /// leaves it empty.
    #[serde(default)]
    pub provider: String,
    /// Higher is more relevant.
    #[serde(default)]
    pub score: i32,
    #[serde(default, rename = "type")]
    pub item_type: ItemType,
    /// Per-item action names, first is the default.
    #[serde(default)]
    pub actions: Vec<String>,
    /// State tokens such as `"history"` or `"paired"`.
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub fuzzy_info: Option<FuzzyInfo>,
}

/// Reserved for future item tags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    #[default]
    Regular,
}

/// Match-highlighting metadata produced by the fuzzy scorer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzyInfo {
    #[serde(default)]
    pub positions: Vec<i32>,
    #[serde(default)]
    pub start: i32,
    /// Which display field the positions index into: `"text"` or `"subtext"`.
    #[serde(default)]
    pub field: String,
}

impl FuzzyInfo {
    pub fn text(positions: Vec<i32>, start: i32) -> Self {
        Self {
            positions,
            start,
            field: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_serializes_screaming() {
        let json = serde_json::to_string(&ItemType::Regular).unwrap();
        assert_eq!(json, r#""REGULAR""#);
    }

    #[test]
    fn item_deserializes_with_missing_fields() {
        let item: Item = serde_json::from_str(r#"{"identifier":"a","text":"b"}"#).unwrap();
        assert_eq!(item.identifier, "a");
        assert_eq!(item.text, "b");
        assert_eq!(item.score, 0);
        assert_eq!(item.item_type, ItemType::Regular);
        assert!(item.actions.is_empty());
        assert!(item.fuzzy_info.is_none());
    }

    #[test]
    fn item_serde_roundtrip() {
        let item = Item {
            identifier: "dev:AA:BB".into(),
            text: "Headphones".into(),
            subtext: "AA:BB".into(),
            icon: "audio-headset".into(),
            provider: "bluetooth".into(),
            score: 420,
            item_type: ItemType::Regular,
            actions: vec!["connect".into(), "remove".into()],
            state: vec!["paired".into()],
            fuzzy_info: Some(FuzzyInfo::text(vec![0, 1, 2], 0)),
        };
        let json = serde_json::to_string(&item).unwrap();
        let parsed: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(item, parsed);
    }

    #[test]
    fn fuzzy_info_field_helper() {
        let info = FuzzyInfo::text(vec![3, 4], 3);
        assert_eq!(info.field, "text");
        assert_eq!(info.start, 3);
    }
}
