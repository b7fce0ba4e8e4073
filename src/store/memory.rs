use crate::store::{StoreError, StoreResult, TabularStore};

/// In-memory table for exercising the journal without I/O.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<Vec<String>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        Ok(())
    }
}

impl TabularStore for MemoryStore {
    fn read_rows(&self) -> StoreResult<Vec<Vec<String>>> {
        if self.fail_reads {
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(self.rows.clone())
    }

    fn update_row(
        &mut self,
        row: usize,
        first_column: usize,
        values: &[String],
    ) -> StoreResult<()> {
        self.check_write()?;

        if self.rows.len() <= row {
            self.rows.resize(row + 1, Vec::new());
        }
        let cells = &mut self.rows[row];
        let required = first_column + values.len();
        if cells.len() < required {
            cells.resize(required, String::new());
        }
        cells[first_column..required].clone_from_slice(values);

        Ok(())
    }

    fn append_row(&mut self, values: &[String]) -> StoreResult<()> {
        self.check_write()?;
        self.rows.push(values.to_vec());
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.check_write()?;
        self.rows.clear();
        Ok(())
    }
}
