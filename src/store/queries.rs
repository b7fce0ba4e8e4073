pub const CREATE_SHEET_ROWS: &str = r#"
CREATE TABLE IF NOT EXISTS sheet_rows (
  position  INTEGER PRIMARY KEY,
  cells     TEXT NOT NULL DEFAULT '[]'
);
"#;

pub const SELECT_ROWS: &str = "SELECT position, cells FROM sheet_rows ORDER BY position ASC";

pub const SELECT_ROW_BY_POSITION: &str = "SELECT cells FROM sheet_rows WHERE position = ?1";

pub const SELECT_MAX_POSITION: &str = "SELECT MAX(position) FROM sheet_rows";

pub const UPSERT_ROW: &str = r#"
INSERT INTO sheet_rows (position, cells) VALUES (?1, ?2)
ON CONFLICT(position) DO UPDATE SET cells = excluded.cells
"#;

pub const INSERT_ROW: &str = "INSERT INTO sheet_rows (position, cells) VALUES (?1, ?2)";

pub const DELETE_ALL_ROWS: &str = "DELETE FROM sheet_rows";

pub fn schema_statements() -> Vec<&'static str> {
    vec![CREATE_SHEET_ROWS]
}
