use crate::config::Config;
use crate::store::{StoreError, StoreResult, TabularStore};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

const TOKEN_ENV: &str = "DAYLOG_SHEET_TOKEN";

#[derive(Debug, Clone)]
pub struct SheetSettings {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub worksheet: String,
    pub access_token: String,
    pub timeout_seconds: u64,
}

impl SheetSettings {
    pub fn from_config(config: &Config) -> StoreResult<Self> {
        let spreadsheet_id = config
            .sheet_id
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                StoreError::Configuration(
                    "sheet id is missing. Set `Daylog config set sheet.id <ID>`".to_string(),
                )
            })?;

        let access_token = resolve_access_token(config).ok_or_else(|| {
            StoreError::Configuration(format!(
                "sheet access token is missing. Set `Daylog config set sheet.token <TOKEN>` or `{TOKEN_ENV}`"
            ))
        })?;

        Ok(Self {
            base_url: config.sheet_api_base_url.clone(),
            spreadsheet_id,
            worksheet: config.sheet_worksheet.clone(),
            access_token,
            timeout_seconds: config.sheet_timeout_seconds.max(5),
        })
    }
}

pub fn has_access_token(config: &Config) -> bool {
    resolve_access_token(config).is_some()
}

fn resolve_access_token(config: &Config) -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            config
                .sheet_access_token
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    values: [&'a [String]; 1],
}

/// Spreadsheet reached through a Sheets-v4 style `values` REST API.
///
/// The HTTP client is created by `connect` and released by `close`; every
/// operation after `close` fails with `StoreError::Unavailable`.
pub struct RemoteSheet {
    settings: SheetSettings,
    client: Option<Client>,
}

impl RemoteSheet {
    pub fn connect(settings: SheetSettings) -> StoreResult<Self> {
        // Validates the base URL before any request goes out.
        base_url(&settings.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", settings.access_token)).map_err(|_| {
                StoreError::Configuration("sheet access token contains invalid characters".into())
            })?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                StoreError::Unavailable(format!("Failed to create sheet HTTP client: {error}"))
            })?;

        Ok(Self {
            settings,
            client: Some(client),
        })
    }

    fn client(&self) -> StoreResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("sheet connection is closed".to_string()))
    }

    fn values_url(&self, range: &str, suffix: &str) -> StoreResult<Url> {
        let target = format!("{range}{suffix}");
        let mut url = base_url(&self.settings.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::Configuration("sheet API base URL is not hierarchical".into())
            })?
            .pop_if_empty()
            .extend([
                "spreadsheets",
                self.settings.spreadsheet_id.as_str(),
                "values",
                target.as_str(),
            ]);
        Ok(url)
    }

    fn fetch_range(&self, range: &str) -> StoreResult<Vec<Vec<String>>> {
        let url = self.values_url(range, "")?;
        debug!(range, "reading sheet range");

        let response = send(self.client()?.get(url))?;
        let body: ValueRange = response.json().map_err(|error| {
            StoreError::Unavailable(format!("Malformed sheet response: {error}"))
        })?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

impl TabularStore for RemoteSheet {
    fn read_rows(&self) -> StoreResult<Vec<Vec<String>>> {
        self.fetch_range(&whole_sheet_range(&self.settings.worksheet))
    }

    fn read_header(&self) -> StoreResult<Vec<String>> {
        let range = format!("{}!1:1", quote_sheet_name(&self.settings.worksheet));
        Ok(self.fetch_range(&range)?.into_iter().next().unwrap_or_default())
    }

    fn read_column(&self, column: usize) -> StoreResult<Vec<String>> {
        let letter = column_letter(column);
        let range = format!(
            "{}!{letter}:{letter}",
            quote_sheet_name(&self.settings.worksheet)
        );

        Ok(self
            .fetch_range(&range)?
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect())
    }

    fn update_row(
        &mut self,
        row: usize,
        first_column: usize,
        values: &[String],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let range = row_range(&self.settings.worksheet, row, first_column, values.len());
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        debug!(range, "updating sheet row");

        send(
            self.client()?
                .put(url)
                .json(&ValueRangeBody { values: [values] }),
        )?;
        Ok(())
    }

    fn append_row(&mut self, values: &[String]) -> StoreResult<()> {
        let range = format!("{}!A1", quote_sheet_name(&self.settings.worksheet));
        let mut url = self.values_url(&range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        debug!(range, "appending sheet row");

        send(
            self.client()?
                .post(url)
                .json(&ValueRangeBody { values: [values] }),
        )?;
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        let url = self.values_url(&quote_sheet_name(&self.settings.worksheet), ":clear")?;
        send(self.client()?.post(url).json(&json!({})))?;
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.client = None;
        Ok(())
    }
}

fn send(request: RequestBuilder) -> StoreResult<Response> {
    let response = request
        .send()
        .map_err(|error| StoreError::Unavailable(format!("Sheet API request failed: {error}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Configuration(
            format!("sheet credentials rejected ({status}): {body}"),
        )),
        _ => Err(StoreError::Unavailable(format!(
            "Sheet API error {status}: {body}"
        ))),
    }
}

fn base_url(raw: &str) -> StoreResult<Url> {
    Url::parse(raw.trim()).map_err(|error| {
        StoreError::Configuration(format!("invalid sheet API base URL {raw}: {error}"))
    })
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Zero-based column index to A1 letters: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letter(index: usize) -> String {
    let mut remaining = index + 1;
    let mut letters = Vec::new();

    while remaining > 0 {
        let offset = (remaining - 1) % 26;
        letters.push(char::from(b'A' + offset as u8));
        remaining = (remaining - 1) / 26;
    }

    letters.iter().rev().collect()
}

fn quote_sheet_name(name: &str) -> String {
    if name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Every journal column. `ZZ` leaves room far beyond the current schema.
fn whole_sheet_range(worksheet: &str) -> String {
    format!("{}!A:ZZ", quote_sheet_name(worksheet))
}

fn row_range(worksheet: &str, row: usize, first_column: usize, width: usize) -> String {
    let sheet_row = row + 1;
    format!(
        "{}!{}{sheet_row}:{}{sheet_row}",
        quote_sheet_name(worksheet),
        column_letter(first_column),
        column_letter(first_column + width - 1)
    )
}

#[cfg(test)]
mod tests {
    use super::{
        RemoteSheet, SheetSettings, column_letter, quote_sheet_name, row_range, whole_sheet_range,
    };
    use crate::config::Config;
    use crate::store::{StoreError, TabularStore};

    fn settings() -> SheetSettings {
        SheetSettings {
            base_url: "https://sheets.example.com/v4/".to_string(),
            spreadsheet_id: "abc123".to_string(),
            worksheet: "Journal".to_string(),
            access_token: "token".to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn column_letters_roll_over_after_z() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn row_range_skips_date_column() {
        assert_eq!(row_range("Journal", 4, 1, 11), "Journal!B5:L5");
        assert_eq!(row_range("My Diary", 0, 0, 1), "'My Diary'!A1:A1");
    }

    #[test]
    fn full_read_covers_columns_a_to_zz() {
        assert_eq!(whole_sheet_range("Journal"), "Journal!A:ZZ");
        assert_eq!(whole_sheet_range("My Diary"), "'My Diary'!A:ZZ");
    }

    #[test]
    fn sheet_names_with_quotes_are_escaped() {
        assert_eq!(quote_sheet_name("Tom's"), "'Tom''s'");
    }

    #[test]
    fn values_url_encodes_range_segment() {
        let sheet = RemoteSheet::connect(settings()).expect("connect");
        let url = sheet
            .values_url("'My Diary'!A1", ":append")
            .expect("url");

        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/abc123/values/'My%20Diary'!A1:append"
        );
    }

    #[test]
    fn closed_sheet_reports_unavailable() {
        let mut sheet = RemoteSheet::connect(settings()).expect("connect");
        sheet.close().expect("close");

        let error = sheet.read_rows().expect_err("closed");
        assert!(matches!(error, StoreError::Unavailable(_)));
    }

    #[test]
    fn missing_sheet_id_is_a_configuration_error() {
        let config = Config {
            sheet_id: None,
            sheet_access_token: Some("token".to_string()),
            ..Config::default()
        };

        let error = SheetSettings::from_config(&config).expect_err("missing id");
        assert!(error.is_configuration());
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let error = RemoteSheet::connect(SheetSettings {
            base_url: "not a url".to_string(),
            ..settings()
        })
        .err()
        .expect("invalid url");

        assert!(error.is_configuration());
    }
}
