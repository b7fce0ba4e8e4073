use crate::ai;
use crate::analyzer::{self, summary::ActivitySummary};
use crate::config::Config;
use crate::journal::Journal;
use crate::journal::record::{ActivityItem, DailyRecord, date_key, parse_date_key};
use crate::store::{self, DynStore, StoreError};
use anyhow::anyhow;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::task::{self, JoinError};
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    journal: Arc<Mutex<Option<Journal<DynStore>>>>,
}

impl ApiState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            journal: Arc::new(Mutex::new(None)),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/entries", get(entry_list).post(entry_save))
        .route("/api/v1/entries/:date", get(entry_by_date))
        .route("/api/v1/entries/:date/previous-plan", get(previous_plan))
        .route("/api/v1/items", get(items))
        .route("/api/v1/stats", get(stats))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntriesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EntryPayload {
    date: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    items: Vec<ActivityItem>,
    #[serde(default = "default_advice")]
    advice: bool,
}

fn default_advice() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    storage: String,
    store_reachable: bool,
    store_error: Option<String>,
    entries: usize,
    latest_date: Option<String>,
    ai_enabled: bool,
    ai_key_configured: bool,
    api_port: u16,
}

#[derive(Debug, Serialize)]
struct EntriesPayload {
    count: usize,
    entries: Vec<DailyRecord>,
}

#[derive(Debug, Serialize)]
struct PreviousPlanPayload {
    date: String,
    previous_date: Option<String>,
    plan: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemRow {
    date: String,
    #[serde(flatten)]
    item: ActivityItem,
}

#[derive(Debug, Serialize)]
struct ItemsPayload {
    from: Option<String>,
    to: Option<String>,
    count: usize,
    items: Vec<ItemRow>,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let overview = with_journal(&state, |journal| {
        journal.check()?;
        let history = journal.history();
        Ok((history.len(), history.first().map(DailyRecord::date_key)))
    })
    .await;

    let (store_reachable, store_error, entries, latest_date) = match overview {
        Ok((entries, latest_date)) => (true, None, entries, latest_date),
        Err(ApiError::Internal(error)) => return Err(ApiError::Internal(error)),
        Err(error) => (false, Some(error.message()), 0, None),
    };

    Ok(Json(StatusPayload {
        storage: state.config.storage.to_string(),
        store_reachable,
        store_error,
        entries,
        latest_date,
        ai_enabled: state.config.ai_enabled,
        ai_key_configured: ai::has_api_key(&state.config),
        api_port: state.config.api_port,
    }))
}

async fn entry_list(
    State(state): State<ApiState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Json<EntriesPayload>> {
    let limit = query.limit.unwrap_or(30).clamp(1, 366);
    let entries = with_journal(&state, move |journal| {
        Ok(journal.history().into_iter().take(limit).collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(EntriesPayload {
        count: entries.len(),
        entries,
    }))
}

async fn entry_save(
    State(state): State<ApiState>,
    Json(payload): Json<EntryPayload>,
) -> ApiResult<Json<DailyRecord>> {
    let date = match payload.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => Local::now().date_naive(),
    };

    let mut record = DailyRecord {
        fields: payload.fields,
        items: payload.items,
        ..DailyRecord::new(date)
    };

    if payload.advice {
        let config = Arc::clone(&state.config);
        record = task::spawn_blocking(move || ai::with_advice(&config, record)).await?;
    }

    let stored = with_journal(&state, move |journal| Ok(journal.save(date, &record)?)).await?;
    Ok(Json(stored))
}

async fn entry_by_date(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> ApiResult<Json<DailyRecord>> {
    let target_date = parse_date(&date)?;

    with_journal(&state, move |journal| Ok(journal.for_date(target_date)))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No entry found for date: {target_date}")))
}

async fn previous_plan(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> ApiResult<Json<PreviousPlanPayload>> {
    let target_date = parse_date(&date)?;
    let plan = with_journal(&state, move |journal| Ok(journal.previous_plan(target_date))).await?;

    Ok(Json(PreviousPlanPayload {
        date: date_key(target_date),
        previous_date: target_date.pred_opt().map(date_key),
        plan,
    }))
}

async fn items(
    State(state): State<ApiState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<ItemsPayload>> {
    let (from, to) = parse_range(&query)?;

    let items = with_journal(&state, move |journal| {
        Ok(journal
            .flattened_items()
            .filter(|(date, _)| {
                from.is_none_or(|start| *date >= start) && to.is_none_or(|end| *date <= end)
            })
            .map(|(date, item)| ItemRow {
                date: date_key(date),
                item,
            })
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(ItemsPayload {
        from: from.map(date_key),
        to: to.map(date_key),
        count: items.len(),
        items,
    }))
}

async fn stats(
    State(state): State<ApiState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<ActivitySummary>> {
    let (from, to) = parse_range(&query)?;
    let summary = with_journal(&state, move |journal| {
        Ok(analyzer::summarize_range(&*journal, from, to))
    })
    .await?;

    Ok(Json(summary))
}

/// Run `work` against the shared journal on the blocking pool, opening the
/// journal on first use and again after a request panicked while holding it.
async fn with_journal<T, F>(state: &ApiState, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Journal<DynStore>) -> ApiResult<T> + Send + 'static,
{
    let config = Arc::clone(&state.config);
    let shared = Arc::clone(&state.journal);

    task::spawn_blocking(move || {
        let mut guard = shared.lock().unwrap_or_else(|poisoned| {
            warn!("journal lock poisoned by a failed request; reopening the journal");
            shared.clear_poison();
            let mut guard = poisoned.into_inner();
            *guard = None;
            guard
        });

        if guard.is_none() {
            *guard = Some(Journal::open(store::connect(&config)?)?);
        }

        let journal = guard
            .as_mut()
            .ok_or_else(|| ApiError::Internal(anyhow!("journal is not open")))?;
        work(journal)
    })
    .await?
}

fn parse_range(query: &RangeQuery) -> ApiResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    let from = query.from.as_deref().map(parse_date).transpose()?;
    let to = query.to.as_deref().map(parse_date).transpose()?;
    Ok((from, to))
}

fn parse_date(input: &str) -> ApiResult<NaiveDate> {
    parse_date_key(input).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid date format: {input}. Example: 2024-01-31"))
    })
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn message(&self) -> String {
        match self {
            Self::BadRequest(message)
            | Self::NotFound(message)
            | Self::ServiceUnavailable(message) => message.clone(),
            Self::Internal(error) => error.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidRecord(_) => Self::BadRequest(value.to_string()),
            StoreError::Configuration(_) | StoreError::Unavailable(_) => {
                Self::ServiceUnavailable(value.to_string())
            }
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(value: JoinError) -> Self {
        Self::Internal(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.message() }))).into_response()
    }
}
