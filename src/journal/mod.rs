pub mod codec;
pub mod record;
pub mod schema;

use crate::journal::record::{
    ActivityItem, DailyRecord, checked_total_units, date_key, parse_date_key,
};
use crate::journal::schema::{MigrationPlan, Schema};
use crate::store::{StoreError, StoreResult, TabularStore};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// One record per calendar date on top of a [`TabularStore`].
///
/// Opening a journal reconciles the table header with the current schema.
/// Writes report failures as [`StoreError`]; reads never fail and return
/// nothing when the table cannot be read.
pub struct Journal<S> {
    store: S,
    schema: Schema,
}

impl<S: TabularStore> Journal<S> {
    pub fn open(store: S) -> StoreResult<Self> {
        Self::open_with_schema(store, Schema::current())
    }

    pub fn open_with_schema(store: S, schema: Schema) -> StoreResult<Self> {
        let mut journal = Self { store, schema };
        journal.ensure_schema()?;
        Ok(journal)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn close(mut self) -> StoreResult<()> {
        self.store.close()
    }

    /// Bring the stored header up to the current schema. Safe to repeat.
    pub fn ensure_schema(&mut self) -> StoreResult<()> {
        let stored = self.store.read_header()?;
        let plan = self.schema.reconcile(&stored);
        if plan.is_noop() {
            return Ok(());
        }

        match &plan {
            MigrationPlan::Noop => {}
            MigrationPlan::Initialize { header } => {
                info!(columns = header.len(), "initializing journal header");
                if stored.is_empty() && self.store.read_rows()?.is_empty() {
                    self.store.append_row(header)?;
                } else {
                    self.store.update_row(0, 0, header)?;
                }
            }
            MigrationPlan::Extend { from, columns } => {
                info!(from, added = ?columns, "extending journal header");
                self.store.update_row(0, *from, columns)?;
            }
            MigrationPlan::Rewrite { header, .. } => {
                plan.log_risks();
                self.store.update_row(0, 0, header)?;
            }
        }

        Ok(())
    }

    /// Store `record` under `date`, replacing whatever was stored for it.
    ///
    /// The first row whose date cell parses to `date` is overwritten from the
    /// second column on; without a match a new row is appended. Later
    /// duplicates of the same date are left as they are.
    pub fn save(&mut self, date: NaiveDate, record: &DailyRecord) -> StoreResult<DailyRecord> {
        validate_items(&record.items)?;
        self.ensure_schema()?;

        let stored = DailyRecord {
            date,
            fields: self.normalized_fields(&record.fields),
            items: record.items.clone(),
            recorded_at: Some(now_seconds()),
            total_units: record.computed_total_units(),
        };
        let row = codec::encode(&stored, &self.schema);

        let key = date_key(date);
        let dates = self.store.read_column(self.schema.date_column())?;
        let mut matches = dates
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, cell)| parse_date_key(cell) == Some(date))
            .map(|(index, _)| index);

        match matches.next() {
            Some(index) => {
                let duplicates = matches.count();
                if duplicates > 0 {
                    warn!(date = %key, duplicates, "duplicate rows for date; updating the first only");
                }
                debug!(date = %key, row = index, "updating journal row");
                self.store.update_row(index, 1, &row[1..])?;
            }
            None => {
                debug!(date = %key, "appending journal row");
                self.store.append_row(&row)?;
            }
        }

        Ok(stored)
    }

    /// Read the header straight from the store, so an outage after `open`
    /// shows up as an error instead of an empty journal.
    pub fn check(&self) -> StoreResult<()> {
        self.store.read_header().map(|_| ())
    }

    /// Drop every row and write a fresh header.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.store.clear()?;
        self.store.append_row(&self.schema.current_header())?;
        info!("journal reset");
        Ok(())
    }

    /// First record stored for `date`, in storage order.
    pub fn for_date(&self, date: NaiveDate) -> Option<DailyRecord> {
        let mut matches = self.all_records().filter(|record| record.date == date);
        let first = matches.next()?;

        let duplicates = matches.count();
        if duplicates > 0 {
            warn!(date = %date, duplicates, "duplicate rows for date; returning the first");
        }

        Some(first)
    }

    /// Every readable record in storage order.
    pub fn all_records(&self) -> impl Iterator<Item = DailyRecord> + '_ {
        let (header, rows) = self.load();

        rows.into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
            .filter_map(move |(index, row)| {
                match codec::decode(&row, &header, &self.schema) {
                    Ok(record) => Some(record),
                    Err(error) => {
                        warn!(row = index + 1, error = %error, "skipping unreadable journal row");
                        None
                    }
                }
            })
    }

    /// Each activity item paired with the date it was recorded under.
    pub fn flattened_items(&self) -> impl Iterator<Item = (NaiveDate, ActivityItem)> + '_ {
        self.all_records().flat_map(|record| {
            let date = record.date;
            record.items.into_iter().map(move |item| (date, item))
        })
    }

    /// All records, newest date first.
    pub fn history(&self) -> Vec<DailyRecord> {
        let mut records = self.all_records().collect::<Vec<_>>();
        records.sort_by(|left, right| right.date.cmp(&left.date));
        records
    }

    /// What the previous day planned for `date`.
    pub fn previous_plan(&self, date: NaiveDate) -> Option<String> {
        let yesterday = date.pred_opt()?;
        self.for_date(yesterday)
            .map(|record| record.field("tomorrowPlan").trim().to_string())
            .filter(|plan| !plan.is_empty())
    }

    fn load(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut rows = match self.store.read_rows() {
            Ok(rows) => rows,
            Err(error) => {
                warn!(error = %error, "failed to read journal; showing no data");
                return (Vec::new(), Vec::new());
            }
        };

        if rows.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let header = rows.remove(0);
        (header, rows)
    }

    fn normalized_fields(&self, fields: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let known = self.schema.text_keys().collect::<Vec<_>>();

        fields
            .iter()
            .filter(|(key, value)| {
                let is_known = known.contains(&key.as_str());
                if !is_known {
                    debug!(field = %key, "ignoring field without a column");
                }
                is_known && !value.trim().is_empty()
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn validate_items(items: &[ActivityItem]) -> StoreResult<()> {
    items.iter().enumerate().try_for_each(|(index, item)| {
        if item.title.trim().is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "item {} has an empty title",
                index + 1
            )));
        }
        if item.unit_count == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "item {} ({}) must cover at least one unit",
                index + 1,
                item.title
            )));
        }
        Ok(())
    })?;

    if checked_total_units(items).is_none() {
        return Err(StoreError::InvalidRecord(format!(
            "items add up to more than {} units",
            u32::MAX
        )));
    }

    Ok(())
}

fn now_seconds() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::Journal;
    use crate::journal::record::{ActivityItem, Category, DailyRecord};
    use crate::journal::schema::{Column, ColumnKind, Schema};
    use crate::store::memory::MemoryStore;
    use crate::store::sqlite::SqliteSheet;
    use crate::store::{StoreError, TabularStore};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn rows_for(store: &MemoryStore, raw: &str) -> usize {
        store
            .rows()
            .iter()
            .skip(1)
            .filter(|row| row.first().map(String::as_str) == Some(raw))
            .count()
    }

    fn journal() -> Journal<MemoryStore> {
        Journal::open(MemoryStore::new()).expect("open")
    }

    #[test]
    fn open_initializes_empty_store_with_current_header() {
        let journal = journal();
        assert_eq!(
            journal.store.rows(),
            &[Schema::current().current_header()][..]
        );
    }

    #[test]
    fn first_save_round_trips_through_for_date() {
        let mut journal = journal();
        let record = DailyRecord::new(date("2024-01-01")).with_field("experience", "x");

        journal.save(date("2024-01-01"), &record).expect("save");

        let loaded = journal.for_date(date("2024-01-01")).expect("record");
        assert_eq!(loaded.field("experience"), "x");
        assert_eq!(loaded.total_units, 0);
        assert!(loaded.recorded_at.is_some());
        assert_eq!(journal.store.rows()[1][11], "0");
    }

    #[test]
    fn saving_twice_keeps_one_row() {
        let mut journal = journal();
        let record = DailyRecord::new(date("2024-01-01")).with_field("feelings", "calm");

        journal.save(date("2024-01-01"), &record).expect("first");
        journal.save(date("2024-01-01"), &record).expect("second");

        assert_eq!(rows_for(&journal.store, "2024-01-01"), 1);
        assert_eq!(journal.all_records().count(), 1);
        assert_eq!(
            journal.for_date(date("2024-01-01")).expect("record").field("feelings"),
            "calm"
        );
    }

    #[test]
    fn second_save_overwrites_instead_of_merging() {
        let mut journal = journal();
        let day = date("2024-01-02");
        let first = DailyRecord::new(day)
            .with_field("experience", "first")
            .with_field("ideas", "keep?")
            .with_item(ActivityItem::new(Category::Work, "report", 4));
        let second = DailyRecord::new(day).with_field("experience", "second");

        journal.save(day, &first).expect("first");
        let stored = journal.save(day, &second).expect("second");
        let loaded = journal.for_date(day).expect("record");

        assert_eq!(loaded, stored);
        assert_eq!(loaded.field("experience"), "second");
        assert_eq!(loaded.field("ideas"), "");
        assert!(loaded.items.is_empty());
        assert_eq!(loaded.total_units, 0);
    }

    #[test]
    fn caller_supplied_total_is_ignored() {
        let mut journal = journal();
        let day = date("2024-02-01");
        let mut record = DailyRecord::new(day)
            .with_item(ActivityItem::new(Category::Play, "game", 2))
            .with_item(ActivityItem::new(Category::Study, "rust", 3));
        record.total_units = 42;

        let stored = journal.save(day, &record).expect("save");

        assert_eq!(stored.total_units, 5);
        assert_eq!(journal.store.rows()[1][11], "5");
        assert_eq!(journal.for_date(day).expect("record").total_units, 5);
    }

    #[test]
    fn single_item_is_flattened_with_its_date() {
        let mut journal = journal();
        let day = date("2024-02-01");
        let record = DailyRecord::new(day).with_item(ActivityItem::new(Category::Play, "game", 2));

        let stored = journal.save(day, &record).expect("save");
        let flattened = journal.flattened_items().collect::<Vec<_>>();

        assert_eq!(stored.total_units, 2);
        assert_eq!(
            flattened,
            vec![(day, ActivityItem::new(Category::Play, "game", 2))]
        );
    }

    #[test]
    fn flattened_items_follow_record_then_item_order() {
        let mut journal = journal();
        journal
            .save(
                date("2024-02-02"),
                &DailyRecord::new(date("2024-02-02"))
                    .with_item(ActivityItem::new(Category::Work, "a", 1))
                    .with_item(ActivityItem::new(Category::Rest, "b", 1)),
            )
            .expect("save");
        journal
            .save(
                date("2024-02-01"),
                &DailyRecord::new(date("2024-02-01"))
                    .with_item(ActivityItem::new(Category::Study, "c", 2)),
            )
            .expect("save");

        let titles = journal
            .flattened_items()
            .map(|(day, item)| (day.to_string(), item.title))
            .collect::<Vec<_>>();

        assert_eq!(
            titles,
            vec![
                ("2024-02-02".to_string(), "a".to_string()),
                ("2024-02-02".to_string(), "b".to_string()),
                ("2024-02-01".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn prefix_header_is_extended_and_old_rows_keep_their_cells() {
        let schema = Schema::new(vec![
            Column {
                header: "Date",
                kind: ColumnKind::Date,
            },
            Column {
                header: "A",
                kind: ColumnKind::Text("a"),
            },
            Column {
                header: "B",
                kind: ColumnKind::Text("b"),
            },
            Column {
                header: "C",
                kind: ColumnKind::Text("c"),
            },
        ]);
        let store = MemoryStore::with_rows(&[&["Date", "A", "B"], &["2024-01-01", "a1", "b1"]]);

        let journal = Journal::open_with_schema(store, schema).expect("open");

        assert_eq!(journal.store.rows()[0], vec!["Date", "A", "B", "C"]);
        assert_eq!(journal.store.rows()[1], vec!["2024-01-01", "a1", "b1"]);

        let record = journal.for_date(date("2024-01-01")).expect("record");
        assert_eq!(record.field("a"), "a1");
        assert_eq!(record.field("b"), "b1");
        assert_eq!(record.field("c"), "");
    }

    #[test]
    fn reflection_rows_read_under_current_schema() {
        let store = MemoryStore::with_rows(&[
            &[
                "Date",
                "Experience",
                "Feelings",
                "Ideas",
                "TomorrowPlan",
                "Advice",
                "Timestamp",
            ],
            &["2023-12-31", "party", "", "", "sleep in", "", "2023-12-31 23:59:00"],
        ]);

        let journal = Journal::open(store).expect("open");
        let record = journal.for_date(date("2023-12-31")).expect("record");

        assert_eq!(journal.store.rows()[0], Schema::current().current_header());
        assert_eq!(record.field("experience"), "party");
        assert_eq!(record.field("tomorrowPlan"), "sleep in");
        assert!(record.items.is_empty());
        assert_eq!(journal.previous_plan(date("2024-01-01")).as_deref(), Some("sleep in"));
    }

    #[test]
    fn diverging_header_is_rewritten_in_place() {
        let store = MemoryStore::with_rows(&[
            &["Date", "Item 1", "Item 2"],
            &["2024-01-01", "events", "insights"],
        ]);

        let journal = Journal::open(store).expect("open");

        assert_eq!(journal.store.rows()[0], Schema::current().current_header());
        let record = journal.for_date(date("2024-01-01")).expect("record");
        assert_eq!(record.field("experience"), "events");
        assert_eq!(record.field("feelings"), "insights");
    }

    #[test]
    fn corrupt_items_do_not_hide_other_rows() {
        let header = Schema::current().current_header();
        let mut broken = vec![String::new(); header.len()];
        broken[0] = "2024-03-01".to_string();
        broken[10] = "[{oops".to_string();
        let mut healthy = vec![String::new(); header.len()];
        healthy[0] = "2024-03-02".to_string();
        healthy[10] = r#"[{"category":"work","title":"ship","unitCount":3}]"#.to_string();

        let mut store = MemoryStore::new();
        store.append_row(&header).expect("header");
        store.append_row(&broken).expect("broken");
        store.append_row(&["not-a-date".to_string()]).expect("bad date");
        store.append_row(&healthy).expect("healthy");

        let journal = Journal::open(store).expect("open");
        let records = journal.all_records().collect::<Vec<_>>();

        assert_eq!(records.len(), 2);
        assert!(records[0].items.is_empty());
        assert_eq!(records[1].total_units, 3);
        assert_eq!(journal.flattened_items().count(), 1);
    }

    #[test]
    fn duplicate_dates_update_and_return_the_first() {
        let header = Schema::current().current_header();
        let header_cells = header.iter().map(String::as_str).collect::<Vec<_>>();
        let store = MemoryStore::with_rows(&[
            header_cells.as_slice(),
            &["2024-03-01", "older"],
            &["2024-03-01", "newer"],
        ]);
        let mut journal = Journal::open(store).expect("open");
        let day = date("2024-03-01");

        journal
            .save(day, &DailyRecord::new(day).with_field("experience", "fixed"))
            .expect("save");

        assert_eq!(journal.store.rows()[1][1], "fixed");
        assert_eq!(journal.store.rows()[2], vec!["2024-03-01", "newer"]);
        assert_eq!(rows_for(&journal.store, "2024-03-01"), 2);
        assert_eq!(
            journal.for_date(day).expect("record").field("experience"),
            "fixed"
        );
    }

    #[test]
    fn unknown_and_blank_fields_are_not_persisted() {
        let mut journal = journal();
        let day = date("2024-04-01");
        let record = DailyRecord::new(day)
            .with_field("experience", "walk")
            .with_field("mood", "great")
            .with_field("ideas", "   ");

        let stored = journal.save(day, &record).expect("save");

        assert_eq!(stored.fields.len(), 1);
        assert_eq!(journal.for_date(day), Some(stored));
    }

    #[test]
    fn invalid_items_are_rejected_before_any_write() {
        let mut journal = journal();
        let day = date("2024-04-02");
        let before = journal.store.rows().to_vec();

        let empty_title = DailyRecord::new(day).with_item(ActivityItem::new(Category::Work, " ", 1));
        let zero_units = DailyRecord::new(day).with_item(ActivityItem::new(Category::Work, "x", 0));

        assert!(matches!(
            journal.save(day, &empty_title),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            journal.save(day, &zero_units),
            Err(StoreError::InvalidRecord(_))
        ));
        assert_eq!(journal.store.rows(), &before[..]);
    }

    #[test]
    fn overflowing_unit_total_is_rejected() {
        let mut journal = journal();
        let day = date("2024-04-03");
        let before = journal.store.rows().to_vec();
        let record = DailyRecord::new(day)
            .with_item(ActivityItem::new(Category::Work, "a", u32::MAX))
            .with_item(ActivityItem::new(Category::Work, "b", 1));

        assert!(matches!(
            journal.save(day, &record),
            Err(StoreError::InvalidRecord(_))
        ));
        assert_eq!(journal.store.rows(), &before[..]);
    }

    #[test]
    fn padded_date_cell_is_updated_not_duplicated() {
        let header = Schema::current().current_header();
        let header_cells = header.iter().map(String::as_str).collect::<Vec<_>>();
        let store =
            MemoryStore::with_rows(&[header_cells.as_slice(), &["2024-01-01 ", "old"]]);
        let mut journal = Journal::open(store).expect("open");
        let day = date("2024-01-01");

        journal
            .save(day, &DailyRecord::new(day).with_field("experience", "new"))
            .expect("save");

        assert_eq!(journal.store.rows().len(), 2);
        assert_eq!(journal.store.rows()[1][1], "new");
        assert_eq!(
            journal.for_date(day).expect("record").field("experience"),
            "new"
        );
    }

    #[test]
    fn check_reports_read_outage_after_open() {
        let mut journal = journal();
        assert!(journal.check().is_ok());

        journal.store.set_fail_reads(true);

        assert!(matches!(journal.check(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn write_failure_is_reported() {
        let mut journal = journal();
        journal.store.set_fail_writes(true);
        let day = date("2024-05-01");

        let result = journal.save(day, &DailyRecord::new(day).with_field("experience", "x"));

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        journal.store.set_fail_writes(false);
        assert!(journal.for_date(day).is_none());
    }

    #[test]
    fn read_failure_degrades_to_no_data() {
        let mut journal = journal();
        let day = date("2024-05-02");
        journal
            .save(day, &DailyRecord::new(day).with_field("experience", "x"))
            .expect("save");

        journal.store.set_fail_reads(true);

        assert!(journal.for_date(day).is_none());
        assert_eq!(journal.all_records().count(), 0);
        assert_eq!(journal.flattened_items().count(), 0);
        assert!(journal.history().is_empty());
        assert!(journal.save(day, &DailyRecord::new(day)).is_err());
    }

    #[test]
    fn history_is_newest_first() {
        let mut journal = journal();
        for raw in ["2024-01-02", "2024-01-03", "2024-01-01"] {
            journal
                .save(date(raw), &DailyRecord::new(date(raw)).with_field("ideas", raw))
                .expect("save");
        }

        let dates = journal
            .history()
            .into_iter()
            .map(|record| record.date_key())
            .collect::<Vec<_>>();
        assert_eq!(dates, vec!["2024-01-03", "2024-01-02", "2024-01-01"]);
    }

    #[test]
    fn previous_plan_ignores_blank_or_missing_days() {
        let mut journal = journal();
        let day = date("2024-06-01");
        assert!(journal.previous_plan(day).is_none());

        journal
            .save(
                date("2024-05-31"),
                &DailyRecord::new(date("2024-05-31")).with_field("tomorrowPlan", "  interview  "),
            )
            .expect("save");

        assert_eq!(journal.previous_plan(day).as_deref(), Some("interview"));
        assert!(journal.previous_plan(date("2024-05-31")).is_none());
    }

    #[test]
    fn reset_is_idempotent() {
        let mut journal = journal();
        let day = date("2024-07-01");
        journal
            .save(day, &DailyRecord::new(day).with_field("experience", "x"))
            .expect("save");

        journal.reset().expect("reset");
        journal.reset().expect("reset again");

        assert_eq!(
            journal.store.rows(),
            &[Schema::current().current_header()][..]
        );
        assert_eq!(journal.all_records().count(), 0);
    }

    #[test]
    fn journal_over_sqlite_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("journal.db");
        let day = date("2024-01-01");

        {
            let mut journal = Journal::open(SqliteSheet::open(&path).expect("sqlite")).expect("open");
            journal
                .save(day, &DailyRecord::new(day).with_field("experience", "x"))
                .expect("save");
            journal.close().expect("close");
        }

        let mut journal = Journal::open(SqliteSheet::open(&path).expect("sqlite")).expect("reopen");
        journal
            .save(day, &DailyRecord::new(day).with_field("experience", "y"))
            .expect("save again");

        assert_eq!(journal.all_records().count(), 1);
        assert_eq!(journal.for_date(day).expect("record").field("experience"), "y");
    }

    #[test]
    fn corrupt_sqlite_row_does_not_hide_the_rest() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("journal.db");
        let mut journal = Journal::open(SqliteSheet::open(&path).expect("sqlite")).expect("open");
        for raw in ["2024-01-01", "2024-01-02"] {
            journal
                .save(date(raw), &DailyRecord::new(date(raw)).with_field("experience", raw))
                .expect("save");
        }

        rusqlite::Connection::open(&path)
            .expect("second connection")
            .execute("UPDATE sheet_rows SET cells = 'not json' WHERE position = 2", [])
            .expect("corrupt row");

        assert_eq!(journal.all_records().count(), 1);
        assert!(journal.for_date(date("2024-01-01")).is_some());

        journal
            .save(
                date("2024-01-03"),
                &DailyRecord::new(date("2024-01-03")).with_field("experience", "x"),
            )
            .expect("save after corruption");
        assert_eq!(journal.all_records().count(), 2);
    }
}
