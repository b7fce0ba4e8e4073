use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const APP_DIR: &str = ".Daylog";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_SHEET_API: &str = "https://sheets.googleapis.com/v4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Sheet,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Sheet => f.write_str("sheet"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" | "sqlite" | "file" => Ok(Self::Local),
            "sheet" | "sheets" | "spreadsheet" => Ok(Self::Sheet),
            other => bail!("storage must be local or sheet, got: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageBackend,
    pub db_path: PathBuf,
    pub sheet_api_base_url: String,
    pub sheet_id: Option<String>,
    pub sheet_worksheet: String,
    pub sheet_access_token: Option<String>,
    pub sheet_timeout_seconds: u64,
    pub api_port: u16,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            storage: StorageBackend::Local,
            db_path: root.join("db").join("journal.db"),
            sheet_api_base_url: DEFAULT_SHEET_API.to_string(),
            sheet_id: None,
            sheet_worksheet: "Sheet1".to_string(),
            sheet_access_token: None,
            sheet_timeout_seconds: 20,
            api_port: 7891,
            ai_enabled: false,
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 20,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "storage" => {
                self.storage = value.parse()?;
            }
            "db_path" => {
                self.db_path = expand_home(value.trim());
            }
            "sheet_api_base_url" => {
                self.sheet_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "sheet_id" => {
                self.sheet_id = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "sheet_worksheet" => {
                let worksheet = value.trim();
                if worksheet.is_empty() {
                    bail!("sheet_worksheet must not be empty");
                }
                self.sheet_worksheet = worksheet.to_string();
            }
            "sheet_access_token" => {
                self.sheet_access_token = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "sheet_timeout_seconds" => {
                self.sheet_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("sheet_timeout_seconds must be a number"))?
                    .max(5);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "ai_enabled" => {
                self.ai_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("ai_enabled must be true/false"))?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: storage, db_path|db.path, sheet_api_base_url|sheet.base_url, sheet_id|sheet.id, sheet_worksheet|sheet.worksheet, sheet_access_token|sheet.token, sheet_timeout_seconds|sheet.timeout_seconds, api_port|api.port, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "storage" => Some(self.storage.to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "sheet_api_base_url" => Some(self.sheet_api_base_url.clone()),
            "sheet_id" => Some(
                self.sheet_id
                    .clone()
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "sheet_worksheet" => Some(self.sheet_worksheet.clone()),
            "sheet_access_token" => Some(mask_secret(self.sheet_access_token.as_deref())),
            "sheet_timeout_seconds" => Some(self.sheet_timeout_seconds.to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(mask_secret(self.ai_api_key.as_deref())),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

pub fn is_secret_key(key: &str) -> bool {
    matches!(
        normalize_config_key(key),
        "sheet_access_token" | "ai_api_key"
    )
}

fn mask_secret(value: Option<&str>) -> String {
    value
        .map(|_| "***set***".to_string())
        .unwrap_or_else(|| "not_set".to_string())
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "storage" | "storage.backend" => "storage",
        "db_path" | "db.path" => "db_path",
        "sheet_api_base_url" | "sheet.base_url" => "sheet_api_base_url",
        "sheet_id" | "sheet.id" => "sheet_id",
        "sheet_worksheet" | "sheet.worksheet" => "sheet_worksheet",
        "sheet_access_token" | "sheet.token" => "sheet_access_token",
        "sheet_timeout_seconds" | "sheet.timeout_seconds" => "sheet_timeout_seconds",
        "api_port" | "api.port" => "api_port",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, StorageBackend, is_secret_key};
    use tempfile::tempdir;

    #[test]
    fn dotted_aliases_map_to_fields() {
        let mut config = Config::default();
        config.set_value("storage.backend", "sheet").expect("storage");
        config.set_value("sheet.id", " abc123 ").expect("sheet id");
        config.set_value("sheet.base_url", "https://example.com/v4/").expect("base url");

        assert_eq!(config.storage, StorageBackend::Sheet);
        assert_eq!(config.sheet_id.as_deref(), Some("abc123"));
        assert_eq!(config.sheet_api_base_url, "https://example.com/v4");
        assert_eq!(config.get_value("sheet.id").as_deref(), Some("abc123"));
    }

    #[test]
    fn secrets_are_masked_on_read() {
        let mut config = Config::default();
        assert_eq!(config.get_value("sheet.token").as_deref(), Some("not_set"));

        config.set_value("sheet.token", "s3cret").expect("token");
        assert_eq!(config.get_value("sheet.token").as_deref(), Some("***set***"));
        assert!(is_secret_key("ai.api_key"));
        assert!(!is_secret_key("sheet.id"));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let mut config = Config::default();
        assert!(config.set_value("report.time", "23:30").is_err());
        assert!(config.set_value("storage", "postgres").is_err());
        assert!(config.set_value("api.port", "http").is_err());
        assert!(config.get_value("report.time").is_none());
    }

    #[test]
    fn save_and_load_round_trip_through_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.set_value("api.port", "9000").expect("port");
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.api_port, 9000);
        assert_eq!(loaded.storage, StorageBackend::Local);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"storage":"sheet"}"#).expect("write");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.storage, StorageBackend::Sheet);
        assert_eq!(loaded.sheet_worksheet, "Sheet1");
    }
}
