use crate::journal::record::{ActivityItem, Category, MINUTES_PER_UNIT};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitMetric {
    pub name: String,
    pub units: u32,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub days: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub total_units: u32,
    pub total_minutes: u32,
    pub categories: BTreeMap<String, u32>,
    pub categories_minutes: BTreeMap<String, u32>,
    pub top_titles: Vec<UnitMetric>,
}

pub fn build_summary<I>(items: I, top_n: usize) -> ActivitySummary
where
    I: IntoIterator<Item = (NaiveDate, ActivityItem)>,
{
    let mut dates = BTreeSet::new();
    let mut category_units: HashMap<Category, u32> = HashMap::new();
    let mut title_units: HashMap<String, u32> = HashMap::new();

    for (date, item) in items {
        dates.insert(date);
        let category_total = category_units.entry(item.category).or_insert(0);
        *category_total = category_total.saturating_add(item.unit_count);
        let title_total = title_units.entry(item.title.trim().to_string()).or_insert(0);
        *title_total = title_total.saturating_add(item.unit_count);
    }

    let total_units = category_units
        .values()
        .fold(0u32, |total, units| total.saturating_add(*units));

    let categories = Category::ALL
        .iter()
        .map(|category| {
            (
                category.to_string(),
                category_units.get(category).copied().unwrap_or_default(),
            )
        })
        .collect::<BTreeMap<_, _>>();
    let categories_minutes = categories
        .iter()
        .map(|(name, units)| (name.clone(), units_to_minutes(*units)))
        .collect::<BTreeMap<_, _>>();

    ActivitySummary {
        days: dates.len(),
        first_date: dates.first().map(|date| date.format("%Y-%m-%d").to_string()),
        last_date: dates.last().map(|date| date.format("%Y-%m-%d").to_string()),
        total_units,
        total_minutes: units_to_minutes(total_units),
        categories,
        categories_minutes,
        top_titles: top_n_metrics(title_units, top_n),
    }
}

pub fn render_text(summary: &ActivitySummary) -> String {
    let period = match (&summary.first_date, &summary.last_date) {
        (Some(first), Some(last)) if first == last => first.clone(),
        (Some(first), Some(last)) => format!("{first} ~ {last}"),
        _ => "no data".to_string(),
    };

    let category_rows = Category::ALL
        .iter()
        .map(|category| {
            let units = summary
                .categories
                .get(category.as_str())
                .copied()
                .unwrap_or_default();
            let ratio = if summary.total_units == 0 {
                0.0
            } else {
                (f64::from(units) / f64::from(summary.total_units)) * 100.0
            };

            format!(
                "| {} | {} | {} | {:.0}% |",
                category,
                units,
                format_minutes(units_to_minutes(units)),
                ratio
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let title_rows = if summary.top_titles.is_empty() {
        "- No data".to_string()
    } else {
        summary
            .top_titles
            .iter()
            .enumerate()
            .map(|(index, metric)| {
                format!(
                    "{}. {} - {} units ({})",
                    index + 1,
                    metric.name,
                    metric.units,
                    format_minutes(metric.minutes)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# Activity Summary - {period}\n\n- Days with blocks: {}\n- Total: {} units ({})\n\n| Category | Units | Time | Ratio |\n|----------|-------|------|-------|\n{category_rows}\n\n## Top Activities\n{title_rows}\n",
        summary.days,
        summary.total_units,
        format_minutes(summary.total_minutes),
    )
}

fn top_n_metrics(source: HashMap<String, u32>, n: usize) -> Vec<UnitMetric> {
    let mut items = source
        .into_iter()
        .map(|(name, units)| UnitMetric {
            name,
            units,
            minutes: units_to_minutes(units),
        })
        .collect::<Vec<_>>();

    items.sort_by(|left, right| {
        right
            .units
            .cmp(&left.units)
            .then_with(|| left.name.cmp(&right.name))
    });
    items.into_iter().take(n).collect()
}

pub fn units_to_minutes(units: u32) -> u32 {
    units.saturating_mul(MINUTES_PER_UNIT)
}

pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let remain = minutes % 60;

    match (hours, remain) {
        (0, remain) => format!("{remain}m"),
        (hours, 0) => format!("{hours}h"),
        (hours, remain) => format!("{hours}h {remain}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_summary, format_minutes, render_text};
    use crate::journal::record::{ActivityItem, Category};
    use chrono::NaiveDate;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn totals_per_category_are_zero_filled() {
        let summary = build_summary(
            vec![
                (date("2024-02-01"), ActivityItem::new(Category::Play, "game", 2)),
                (date("2024-02-02"), ActivityItem::new(Category::Study, "rust", 3)),
                (date("2024-02-02"), ActivityItem::new(Category::Play, "game ", 1)),
            ],
            5,
        );

        assert_eq!(summary.days, 2);
        assert_eq!(summary.total_units, 6);
        assert_eq!(summary.total_minutes, 180);
        assert_eq!(summary.categories["play"], 3);
        assert_eq!(summary.categories["study"], 3);
        assert_eq!(summary.categories["rest"], 0);
        assert_eq!(summary.categories.len(), Category::ALL.len());
        assert_eq!(summary.top_titles[0].name, "game");
        assert_eq!(summary.top_titles[0].units, 3);
        assert_eq!(summary.first_date.as_deref(), Some("2024-02-01"));
        assert_eq!(summary.last_date.as_deref(), Some("2024-02-02"));
    }

    #[test]
    fn empty_input_renders_no_data() {
        let summary = build_summary(Vec::new(), 5);
        let text = render_text(&summary);

        assert_eq!(summary.total_units, 0);
        assert!(text.contains("no data"));
        assert!(text.contains("- No data"));
    }

    #[test]
    fn minutes_format_as_hours() {
        assert_eq!(format_minutes(30), "30m");
        assert_eq!(format_minutes(120), "2h");
        assert_eq!(format_minutes(90), "1h 30m");
    }

    #[test]
    fn huge_unit_counts_clamp_totals() {
        let summary = build_summary(
            vec![
                (date("2024-02-01"), ActivityItem::new(Category::Work, "a", u32::MAX)),
                (date("2024-02-02"), ActivityItem::new(Category::Work, "a", 5)),
                (date("2024-02-02"), ActivityItem::new(Category::Rest, "nap", 1)),
            ],
            5,
        );

        assert_eq!(summary.categories["work"], u32::MAX);
        assert_eq!(summary.total_units, u32::MAX);
        assert_eq!(summary.total_minutes, u32::MAX);
        assert_eq!(summary.top_titles[0].units, u32::MAX);
    }
}
