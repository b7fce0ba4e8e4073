pub mod summary;

use crate::analyzer::summary::ActivitySummary;
use crate::journal::Journal;
use crate::store::TabularStore;
use chrono::NaiveDate;

pub const TOP_TITLES: usize = 10;

/// Summarize activity blocks recorded between `from` and `to`, both inclusive.
pub fn summarize_range<S: TabularStore>(
    journal: &Journal<S>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ActivitySummary {
    let items = journal.flattened_items().filter(|(date, _)| {
        from.is_none_or(|start| *date >= start) && to.is_none_or(|end| *date <= end)
    });

    summary::build_summary(items, TOP_TITLES)
}
