use crate::config::{Config, StorageBackend, expand_home};
use crate::journal::Journal;
use crate::store;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, Select, theme::ColorfulTheme};

pub fn run_onboarding() -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to Daylog setup.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let mut config = Config::load().unwrap_or_default();

    println!("\n[1/3] Where should entries be stored?");
    let backends = ["Local file (SQLite)", "Remote spreadsheet"];
    let selected = Select::with_theme(&theme)
        .with_prompt("  Storage backend")
        .default(match config.storage {
            StorageBackend::Local => 0,
            StorageBackend::Sheet => 1,
        })
        .items(&backends)
        .interact()
        .context("Failed to select storage backend")?;

    if selected == 0 {
        config.storage = StorageBackend::Local;
        let db_path: String = Input::with_theme(&theme)
            .with_prompt("  Journal file")
            .default(config.db_path.display().to_string())
            .interact_text()
            .context("Failed to read journal file path")?;
        config.db_path = expand_home(&db_path);
        println!("  ✓ {}", config.db_path.display());
    } else {
        config.storage = StorageBackend::Sheet;
        let sheet_id: String = Input::with_theme(&theme)
            .with_prompt("  Spreadsheet id")
            .default(config.sheet_id.clone().unwrap_or_default())
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                if input.trim().is_empty() {
                    Err("Spreadsheet id is required")
                } else {
                    Ok(())
                }
            })
            .interact_text()
            .context("Failed to read spreadsheet id")?;
        let worksheet: String = Input::with_theme(&theme)
            .with_prompt("  Worksheet name")
            .default(config.sheet_worksheet.clone())
            .interact_text()
            .context("Failed to read worksheet name")?;
        let token = Password::with_theme(&theme)
            .with_prompt("  Access token (empty to use DAYLOG_SHEET_TOKEN)")
            .allow_empty_password(true)
            .interact()
            .context("Failed to read access token")?;

        config.set_value("sheet.id", &sheet_id)?;
        config.set_value("sheet.worksheet", &worksheet)?;
        if !token.trim().is_empty() {
            config.set_value("sheet.token", &token)?;
        }
        println!("  ✓ Spreadsheet {} / {}", sheet_id.trim(), worksheet.trim());
    }

    println!("\n[2/3] Mentor advice");
    config.ai_enabled = Confirm::with_theme(&theme)
        .with_prompt("  Ask an AI mentor for advice when saving reflections?")
        .default(config.ai_enabled)
        .interact()
        .context("Failed to read advice preference")?;

    if config.ai_enabled && config.ai_api_key.is_none() {
        let key = Password::with_theme(&theme)
            .with_prompt("  AI API key (empty to use DAYLOG_AI_API_KEY)")
            .allow_empty_password(true)
            .interact()
            .context("Failed to read AI API key")?;
        config.set_value("ai.api_key", &key)?;
    }

    config.ensure_bootstrap_files()?;
    config.save()?;

    println!("\n[3/3] Checking storage");
    match store::connect(&config).and_then(Journal::open) {
        Ok(journal) => {
            let entries = journal.all_records().count();
            println!("  ✓ Storage reachable ({entries} entries)");
            journal.close()?;
        }
        Err(error) => {
            println!("  ! Storage check failed: {error}");
            println!("  Fix it with `Daylog config set ...` and run `Daylog doctor`.");
        }
    }

    println!("\n──────────────────────────────────────────");
    println!("  Setup complete!");
    println!("  Run Daylog save --experience \"...\" to write today's entry.");
    println!("──────────────────────────────────────────");

    Ok(config)
}
