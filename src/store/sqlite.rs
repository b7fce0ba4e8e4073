use crate::store::{StoreError, StoreResult, TabularStore, queries};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Local single-file table. Each SQLite row keeps one sheet row as a JSON
/// array of cells, keyed by its zero-based position.
pub struct SqliteSheet {
    conn: Connection,
}

impl SqliteSheet {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                StoreError::Unavailable(format!(
                    "Failed to create DB directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|error| {
            StoreError::Unavailable(format!(
                "Failed to open SQLite DB {}: {error}",
                path.display()
            ))
        })?;

        let sheet = Self { conn };
        sheet.init_schema()?;

        Ok(sheet)
    }

    fn init_schema(&self) -> StoreResult<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| self.conn.execute(statement, []).map(|_| ()))
            .map_err(StoreError::from)
    }

    fn row_cells(&self, position: usize) -> StoreResult<Option<Vec<String>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                queries::SELECT_ROW_BY_POSITION,
                params![position as i64],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.map(|content| decode_cells_or_blank(position, &content)))
    }
}

impl TabularStore for SqliteSheet {
    fn read_rows(&self) -> StoreResult<Vec<Vec<String>>> {
        let mut statement = self.conn.prepare(queries::SELECT_ROWS)?;

        let stored = statement
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        // Positions written through `update_row` past the end leave gaps;
        // a spreadsheet shows those as blank rows.
        let mut rows: Vec<Vec<String>> = Vec::with_capacity(stored.len());
        for (position, content) in stored {
            let position = position.max(0) as usize;
            while rows.len() < position {
                rows.push(Vec::new());
            }
            rows.push(decode_cells_or_blank(position, &content));
        }

        Ok(rows)
    }

    fn read_header(&self) -> StoreResult<Vec<String>> {
        Ok(self.row_cells(0)?.unwrap_or_default())
    }

    fn update_row(
        &mut self,
        row: usize,
        first_column: usize,
        values: &[String],
    ) -> StoreResult<()> {
        let mut cells = self.row_cells(row)?.unwrap_or_default();
        let required = first_column + values.len();
        if cells.len() < required {
            cells.resize(required, String::new());
        }
        cells[first_column..required].clone_from_slice(values);

        self.conn
            .execute(queries::UPSERT_ROW, params![row as i64, encode_cells(&cells)?])?;

        Ok(())
    }

    fn append_row(&mut self, values: &[String]) -> StoreResult<()> {
        let max_position: Option<i64> =
            self.conn
                .query_row(queries::SELECT_MAX_POSITION, [], |row| row.get(0))?;
        let next = max_position.map_or(0, |position| position + 1);

        self.conn
            .execute(queries::INSERT_ROW, params![next, encode_cells(values)?])?;

        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.conn.execute(queries::DELETE_ALL_ROWS, [])?;
        Ok(())
    }
}

fn encode_cells(cells: &[String]) -> StoreResult<String> {
    serde_json::to_string(cells)
        .map_err(|error| StoreError::Unavailable(format!("Failed to encode row: {error}")))
}

/// A row that is not a JSON array of strings reads as blank; the journal
/// skips blank rows, so the rest of the table stays readable.
fn decode_cells_or_blank(position: usize, content: &str) -> Vec<String> {
    serde_json::from_str(content).unwrap_or_else(|error| {
        warn!(position, error = %error, "corrupt row in local store, reading it as blank");
        Vec::new()
    })
}
