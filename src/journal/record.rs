use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minutes covered by one activity block.
pub const MINUTES_PER_UNIT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Study,
    Work,
    Exercise,
    Play,
    Rest,
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Study,
        Category::Work,
        Category::Exercise,
        Category::Play,
        Category::Rest,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Work => "work",
            Self::Exercise => "exercise",
            Self::Play => "play",
            Self::Rest => "rest",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "study" | "learning" | "勉強" => Self::Study,
            "work" | "job" | "仕事" => Self::Work,
            "exercise" | "sport" | "運動" => Self::Exercise,
            "play" | "fun" | "遊び" => Self::Play,
            "rest" | "sleep" | "休憩" => Self::Rest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block of time spent on something, counted in 30-minute units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub category: Category,
    pub title: String,
    pub unit_count: u32,
    #[serde(default)]
    pub note: String,
}

impl ActivityItem {
    pub fn new(category: Category, title: impl Into<String>, unit_count: u32) -> Self {
        Self {
            category,
            title: title.into(),
            unit_count,
            note: String::new(),
        }
    }
}

/// Everything written for one calendar date.
///
/// `total_units` and `recorded_at` are owned by the store: whatever a caller
/// puts there is replaced on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<ActivityItem>,
    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub total_units: u32,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            fields: BTreeMap::new(),
            items: Vec::new(),
            recorded_at: None,
            total_units: 0,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_item(mut self, item: ActivityItem) -> Self {
        self.items.push(item);
        self
    }

    /// Text of `key`, empty when the field was never written.
    pub fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn computed_total_units(&self) -> u32 {
        total_units(&self.items)
    }

    pub fn date_key(&self) -> String {
        date_key(self.date)
    }

    pub fn is_blank(&self) -> bool {
        self.items.is_empty() && self.fields.values().all(|value| value.trim().is_empty())
    }
}

/// Sum of `unit_count`, clamped at `u32::MAX`.
pub fn total_units(items: &[ActivityItem]) -> u32 {
    items
        .iter()
        .fold(0u32, |total, item| total.saturating_add(item.unit_count))
}

/// Sum of `unit_count`, `None` when it does not fit in a `u32`.
pub fn checked_total_units(items: &[ActivityItem]) -> Option<u32> {
    items
        .iter()
        .try_fold(0u32, |total, item| total.checked_add(item.unit_count))
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::{ActivityItem, Category, DailyRecord, checked_total_units};
    use chrono::NaiveDate;

    #[test]
    fn unknown_category_decodes_as_other() {
        let item: ActivityItem =
            serde_json::from_str(r#"{"category":"gaming","title":"x","unitCount":1}"#)
                .expect("item");
        assert_eq!(item.category, Category::Other);
        assert_eq!(item.note, "");
    }

    #[test]
    fn category_aliases_normalize() {
        assert_eq!(Category::parse(" Study "), Category::Study);
        assert_eq!(Category::parse("遊び"), Category::Play);
        assert_eq!(Category::parse("unknown"), Category::Other);
    }

    #[test]
    fn computed_total_sums_units() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).expect("date");
        let record = DailyRecord::new(date)
            .with_item(ActivityItem::new(Category::Play, "game", 2))
            .with_item(ActivityItem::new(Category::Study, "rust", 3));

        assert_eq!(record.computed_total_units(), 5);
        assert_eq!(record.date_key(), "2024-02-01");
    }

    #[test]
    fn oversized_unit_counts_saturate_instead_of_wrapping() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).expect("date");
        let record = DailyRecord::new(date)
            .with_item(ActivityItem::new(Category::Work, "a", u32::MAX))
            .with_item(ActivityItem::new(Category::Work, "b", 1));

        assert_eq!(record.computed_total_units(), u32::MAX);
        assert_eq!(checked_total_units(&record.items), None);
        assert_eq!(checked_total_units(&record.items[1..]), Some(1));
    }
}
