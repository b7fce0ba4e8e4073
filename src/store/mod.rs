#[cfg(test)]
pub mod memory;
pub mod queries;
pub mod sheets;
pub mod sqlite;

use crate::config::{Config, StorageBackend};
use thiserror::Error;

/// Failures a backing table can report to the journal.
///
/// Decode problems and duplicate dates never show up here: the journal
/// absorbs those itself so that one bad row cannot hide the rest.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not configured: {0}")]
    Configuration(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A row/column medium that only knows whole-row operations.
///
/// Rows are zero-based and row 0 is the header row. There is no unique key,
/// no transaction and no partial-cell API beyond "write these cells starting
/// at this column".
pub trait TabularStore {
    /// Every row, header first. Trailing empty cells may be trimmed.
    fn read_rows(&self) -> StoreResult<Vec<Vec<String>>>;

    /// The header row, empty when the table has no rows.
    fn read_header(&self) -> StoreResult<Vec<String>> {
        Ok(self.read_rows()?.into_iter().next().unwrap_or_default())
    }

    /// Cells of a single column, header included.
    fn read_column(&self, column: usize) -> StoreResult<Vec<String>> {
        Ok(self
            .read_rows()?
            .into_iter()
            .map(|row| row.into_iter().nth(column).unwrap_or_default())
            .collect())
    }

    /// Overwrite `values.len()` cells of `row`, starting at `first_column`.
    fn update_row(&mut self, row: usize, first_column: usize, values: &[String])
    -> StoreResult<()>;

    fn append_row(&mut self, values: &[String]) -> StoreResult<()>;

    /// Remove every row, header included.
    fn clear(&mut self) -> StoreResult<()>;

    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

impl<T: TabularStore + ?Sized> TabularStore for Box<T> {
    fn read_rows(&self) -> StoreResult<Vec<Vec<String>>> {
        (**self).read_rows()
    }

    fn read_header(&self) -> StoreResult<Vec<String>> {
        (**self).read_header()
    }

    fn read_column(&self, column: usize) -> StoreResult<Vec<String>> {
        (**self).read_column(column)
    }

    fn update_row(
        &mut self,
        row: usize,
        first_column: usize,
        values: &[String],
    ) -> StoreResult<()> {
        (**self).update_row(row, first_column, values)
    }

    fn append_row(&mut self, values: &[String]) -> StoreResult<()> {
        (**self).append_row(values)
    }

    fn clear(&mut self) -> StoreResult<()> {
        (**self).clear()
    }

    fn close(&mut self) -> StoreResult<()> {
        (**self).close()
    }
}

pub type DynStore = Box<dyn TabularStore + Send>;

/// Connect the backend selected in `config`.
pub fn connect(config: &Config) -> StoreResult<DynStore> {
    match config.storage {
        StorageBackend::Local => Ok(Box::new(sqlite::SqliteSheet::open(&config.db_path)?)),
        StorageBackend::Sheet => Ok(Box::new(sheets::RemoteSheet::connect(
            sheets::SheetSettings::from_config(config)?,
        )?)),
    }
}
