//! Column layout of the journal table and header reconciliation.
//!
//! There is no stored version number. The generation of a table is read off
//! its header row and compared with [`CURRENT_COLUMNS`]; newer generations
//! only ever append columns, so an older header is a prefix of the current
//! one.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    /// Free-text field stored under the given record key.
    Text(&'static str),
    Items,
    TotalUnits,
    RecordedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub header: &'static str,
    pub kind: ColumnKind,
}

const fn column(header: &'static str, kind: ColumnKind) -> Column {
    Column { header, kind }
}

pub const DATE_HEADER: &str = "Date";

pub const CURRENT_COLUMNS: &[Column] = &[
    column(DATE_HEADER, ColumnKind::Date),
    column("Experience", ColumnKind::Text("experience")),
    column("Feelings", ColumnKind::Text("feelings")),
    column("Ideas", ColumnKind::Text("ideas")),
    column("TomorrowPlan", ColumnKind::Text("tomorrowPlan")),
    column("Advice", ColumnKind::Text("advice")),
    column("Timestamp", ColumnKind::RecordedAt),
    column("NewIdeas", ColumnKind::Text("newIdeas")),
    column("FunnyEpisodes", ColumnKind::Text("funnyEpisodes")),
    column("NextAction", ColumnKind::Text("nextAction")),
    column("ItemsJSON", ColumnKind::Items),
    column("TotalUnits", ColumnKind::TotalUnits),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn current() -> Self {
        Self::new(CURRENT_COLUMNS.to_vec())
    }

    /// The first column must be the date key.
    pub fn new(columns: Vec<Column>) -> Self {
        debug_assert!(
            columns.first().map(|column| column.kind) == Some(ColumnKind::Date),
            "first column must hold the date"
        );
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn current_header(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.header.to_string())
            .collect()
    }

    pub fn text_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter_map(|column| match column.kind {
            ColumnKind::Text(key) => Some(key),
            _ => None,
        })
    }

    pub fn kind_of(&self, header: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|column| column.header == header.trim())
            .map(|column| column.kind)
    }

    pub fn date_column(&self) -> usize {
        0
    }

    pub fn reconcile(&self, store_header: &[String]) -> MigrationPlan {
        reconcile(store_header, &self.current_header())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedColumn {
    pub position: usize,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
    Noop,
    /// Table has no header yet.
    Initialize { header: Vec<String> },
    /// Header is a strict prefix; write `columns` starting at `from`.
    Extend { from: usize, columns: Vec<String> },
    /// A shared position carries a different name. The whole current header
    /// is written over the old one; existing data is read under the new names.
    Rewrite {
        header: Vec<String>,
        renamed: Vec<RenamedColumn>,
    },
}

pub fn reconcile(store_header: &[String], current: &[String]) -> MigrationPlan {
    let observed = trim_trailing_blanks(store_header);

    if observed.is_empty() {
        return MigrationPlan::Initialize {
            header: current.to_vec(),
        };
    }

    let renamed = observed
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (stored, wanted))| stored.trim() != wanted.as_str())
        .map(|(position, (stored, wanted))| RenamedColumn {
            position,
            from: stored.clone(),
            to: wanted.clone(),
        })
        .collect::<Vec<_>>();

    if !renamed.is_empty() {
        return MigrationPlan::Rewrite {
            header: current.to_vec(),
            renamed,
        };
    }

    if observed.len() < current.len() {
        return MigrationPlan::Extend {
            from: observed.len(),
            columns: current[observed.len()..].to_vec(),
        };
    }

    MigrationPlan::Noop
}

impl MigrationPlan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    pub fn log_risks(&self) {
        if let Self::Rewrite { renamed, .. } = self {
            for column in renamed {
                warn!(
                    position = column.position,
                    from = %column.from,
                    to = %column.to,
                    "header cell renamed; existing data in this column is now read under the new name"
                );
            }
        }
    }
}

fn trim_trailing_blanks(header: &[String]) -> &[String] {
    let end = header
        .iter()
        .rposition(|cell| !cell.trim().is_empty())
        .map_or(0, |last| last + 1);
    &header[..end]
}
