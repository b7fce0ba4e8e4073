use crate::config::Config;
use crate::journal::record::DailyRecord;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const API_KEY_ENV: &str = "DAYLOG_AI_API_KEY";
const ADVICE_FIELD: &str = "advice";
const MAX_ADVICE_CHARS: usize = 600;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Mentor comment for a reflection entry.
///
/// Returns `Ok(None)` when advice is disabled, no key is configured, or the
/// entry has nothing to comment on.
pub fn advise(config: &Config, record: &DailyRecord) -> Result<Option<String>> {
    if !config.ai_enabled || record.is_blank() {
        return Ok(None);
    }

    let Some(api_key) = resolve_api_key(config) else {
        return Ok(None);
    };

    let system_prompt = "You are a mentor for a student who is job hunting. Read the diary entry and reply in at most 300 characters: point out concrete growth and skills being built, reframe noise or needless worries positively, and end with one encouraging sentence for tomorrow.";

    let advice = chat_completion(config, &api_key, system_prompt, &entry_prompt(record))?;
    Ok(Some(truncate_chars(&advice, MAX_ADVICE_CHARS)))
}

/// `record` with mentor advice in its `advice` field when advice is available.
/// Failures are logged and the record comes back unchanged.
pub fn with_advice(config: &Config, mut record: DailyRecord) -> DailyRecord {
    match advise(config, &record) {
        Ok(Some(advice)) => {
            record.fields.insert(ADVICE_FIELD.to_string(), advice);
        }
        Ok(None) => {}
        Err(error) => {
            warn!(date = %record.date, error = %error, "mentor advice failed; saving without it");
        }
    }
    record
}

pub fn test_connection(config: &Config) -> Result<String> {
    let api_key = resolve_api_key(config).context(
        "AI API key is missing. Set `Daylog config set ai.api_key <KEY>` or `DAYLOG_AI_API_KEY`.",
    )?;

    let system_prompt = "Return exactly one short sentence indicating AI API connectivity is healthy.";
    let user_prompt = "Health check for Daylog.";

    chat_completion(config, &api_key, system_prompt, user_prompt)
}

pub fn has_api_key(config: &Config) -> bool {
    resolve_api_key(config).is_some()
}

fn resolve_api_key(config: &Config) -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            config
                .ai_api_key
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}

fn entry_prompt(record: &DailyRecord) -> String {
    let items = record
        .items
        .iter()
        .map(|item| format!("- [{}] {} x{}", item.category, item.title, item.unit_count))
        .collect::<Vec<_>>();

    json!({
        "date": record.date_key(),
        "experience": record.field("experience"),
        "feelings": record.field("feelings"),
        "ideas": record.field("ideas"),
        "tomorrow_plan": record.field("tomorrowPlan"),
        "new_ideas": record.field("newIdeas"),
        "funny_episodes": record.field("funnyEpisodes"),
        "next_action": record.field("nextAction"),
        "activity_blocks": items,
    })
    .to_string()
}

fn chat_completion(config: &Config, api_key: &str, system: &str, user: &str) -> Result<String> {
    let base_url = config.ai_api_base_url.clone();
    let model = config.ai_model.clone();
    let timeout_seconds = config.ai_timeout_seconds.max(5);
    let api_key = api_key.to_string();
    let system = system.to_string();
    let user = user.to_string();

    std::thread::spawn(move || {
        chat_completion_blocking(&base_url, &model, timeout_seconds, &api_key, &system, &user)
    })
    .join()
    .map_err(|_| anyhow!("AI worker thread panicked"))?
}

fn chat_completion_blocking(
    base_url: &str,
    model: &str,
    timeout_seconds: u64,
    api_key: &str,
    system: &str,
    user: &str,
) -> Result<String> {
    if api_key.trim().is_empty() {
        bail!("AI API key is empty");
    }

    let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("Failed to build Authorization header")?,
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()
        .context("Failed to create AI HTTP client")?;

    let request_body = json!({
        "model": model,
        "temperature": 0.4,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ]
    });

    let response = client
        .post(endpoint)
        .json(&request_body)
        .send()
        .context("AI API request failed")?;

    let status = response.status();
    let body = response.text().context("Failed to read AI response body")?;

    if !status.is_success() {
        bail!("AI API error {}: {}", status, body);
    }

    parse_completion(&body)
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse AI response: {body}"))?;

    parsed
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("AI response did not include message.content"))
}

fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", value[..cut].trim_end()),
        None => value.to_string(),
    }
}
