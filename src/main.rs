mod ai;
mod analyzer;
mod api;
mod cli;
mod config;
mod journal;
mod store;

use crate::analyzer::summary::{self, format_minutes, units_to_minutes};
use crate::cli::onboard::run_onboarding;
use crate::cli::{AiCommands, Cli, Commands, ConfigCommands, SaveArgs};
use crate::config::{Config, StorageBackend, is_secret_key};
use crate::journal::Journal;
use crate::journal::record::{DailyRecord, TIMESTAMP_FORMAT, date_key, parse_date_key};
use crate::journal::schema::{ColumnKind, Schema};
use crate::store::DynStore;
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let _ = run_onboarding()?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Save(args) => handle_save(args),
        Commands::Show { date, json } => handle_show(date, json),
        Commands::History { limit } => handle_history(limit),
        Commands::Stats { from, to, json } => handle_stats(from, to, json),
        Commands::Plan { date } => handle_plan(date),
        Commands::Reset { yes } => handle_reset(yes),
        Commands::Doctor => handle_doctor(),
        Commands::Serve => {
            let config = load_config()?;
            run_service(config)
        }
        Commands::Ai { command } => handle_ai_command(command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if is_secret_key(&key) {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_save(args: SaveArgs) -> Result<()> {
    let config = load_or_default_config()?;
    let date = parse_optional_date(args.date.as_deref())?;

    let mut record = DailyRecord::new(date);
    for (key, value) in args.text_fields() {
        if let Some(text) = value.as_deref().filter(|text| !text.trim().is_empty()) {
            record.fields.insert(key.to_string(), text.to_string());
        }
    }
    record.items = args.items;

    if record.is_blank() {
        bail!("Nothing to save for {date}. Pass at least one field or --item.");
    }

    if !args.no_advice {
        record = ai::with_advice(&config, record);
    }

    let mut journal = open_journal(&config)?;
    let stored = journal
        .save(date, &record)
        .with_context(|| format!("Failed to save entry for {date}"))?;
    journal.close()?;

    println!(
        "Saved entry for {} ({} units, {})",
        stored.date_key(),
        stored.total_units,
        format_minutes(units_to_minutes(stored.total_units))
    );
    let advice = stored.field("advice");
    if !advice.is_empty() {
        println!("\nMentor advice:\n{advice}");
    }

    Ok(())
}

fn handle_show(date: Option<String>, json: bool) -> Result<()> {
    let config = load_or_default_config()?;
    let target_date = parse_optional_date(date.as_deref())?;
    let journal = open_journal(&config)?;

    let Some(record) = journal.for_date(target_date) else {
        println!("No entries found for {}", date_key(target_date));
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialize entry")?
        );
    } else {
        print!("{}", render_record(&record, journal.schema()));
    }

    Ok(())
}

fn handle_history(limit: usize) -> Result<()> {
    let config = load_or_default_config()?;
    let journal = open_journal(&config)?;
    let history = journal.history();
    let limit = limit.max(1);

    if history.is_empty() {
        println!("No entries found");
        return Ok(());
    }

    for record in history.iter().take(limit) {
        let headline = record
            .field("experience")
            .lines()
            .next()
            .unwrap_or_default()
            .trim();
        println!(
            "{}  {:>3} units  {}",
            record.date_key(),
            record.total_units,
            headline
        );
    }

    if history.len() > limit {
        println!("... {} older entries", history.len() - limit);
    }

    Ok(())
}

fn handle_stats(from: Option<String>, to: Option<String>, json: bool) -> Result<()> {
    let config = load_or_default_config()?;
    let from = from.as_deref().map(parse_date).transpose()?;
    let to = to.as_deref().map(parse_date).transpose()?;
    let journal = open_journal(&config)?;

    let report = analyzer::summarize_range(&journal, from, to);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize summary")?
        );
    } else {
        print!("{}", summary::render_text(&report));
    }

    Ok(())
}

fn handle_plan(date: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let target_date = parse_optional_date(date.as_deref())?;
    let journal = open_journal(&config)?;

    match journal.previous_plan(target_date) {
        Some(plan) => println!("Plan for {}:\n{plan}", date_key(target_date)),
        None => println!("No plan was written for {}", date_key(target_date)),
    }

    Ok(())
}

fn handle_reset(yes: bool) -> Result<()> {
    if !yes {
        bail!("Reset deletes every entry. Re-run with `Daylog reset --yes` to confirm.");
    }

    let config = load_config()?;
    let mut journal = open_journal(&config)?;
    journal.reset().context("Failed to reset journal")?;
    journal.close()?;

    println!("Journal reset: all entries removed");
    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    if config.storage == StorageBackend::Sheet {
        match config.sheet_id.as_deref() {
            Some(id) if !id.trim().is_empty() => println!("[OK] spreadsheet id: {id}"),
            _ => {
                println!("[WARN] spreadsheet id is not set");
                issues.push("sheet id missing".to_string());
            }
        }

        if store::sheets::has_access_token(&config) {
            println!("[OK] sheet access token is configured");
        } else {
            println!("[WARN] sheet access token is missing");
            issues.push("sheet token missing".to_string());
        }
    }

    match open_journal(&config) {
        Ok(journal) => {
            println!(
                "[OK] {} storage reachable ({} entries)",
                config.storage,
                journal.all_records().count()
            );
            journal.close()?;
        }
        Err(error) => {
            println!("[WARN] {} storage check failed: {error:#}", config.storage);
            issues.push("storage unreachable".to_string());
        }
    }

    if config.ai_enabled {
        if ai::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] AI is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }
    } else {
        println!("[OK] AI advice disabled");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test {
            key,
            base_url,
            model,
        } => {
            let mut config = load_or_default_config()?;

            if let Some(value) = key {
                config.ai_api_key = Some(value);
            }
            if let Some(value) = base_url {
                config.ai_api_base_url = value;
            }
            if let Some(value) = model {
                config.ai_model = value;
            }

            let response = ai::test_connection(&config)?;
            println!("AI API connection successful");
            println!("{response}");

            Ok(())
        }
    }
}

fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let shared_config = Arc::new(config);

    runtime.block_on(async move {
        info!(storage = %shared_config.storage, "Daylog service started");

        tokio::select! {
            api_result = api::run_server(shared_config) => {
                api_result?;
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
            }
        }

        Ok::<(), anyhow::Error>(())
    })
}

fn open_journal(config: &Config) -> Result<Journal<DynStore>> {
    let store = match store::connect(config) {
        Ok(store) => store,
        Err(error) if error.is_configuration() => {
            bail!("{error}. Run `Daylog init` or `Daylog doctor`.")
        }
        Err(error) => {
            return Err(error)
                .with_context(|| format!("Failed to connect {} storage", config.storage));
        }
    };
    Journal::open(store).context("Failed to prepare journal header")
}

fn render_record(record: &DailyRecord, schema: &Schema) -> String {
    let mut lines = vec![format!("# {}", record.date_key())];

    for column in schema.columns() {
        if let ColumnKind::Text(key) = column.kind {
            let value = record.field(key).trim();
            if !value.is_empty() {
                lines.push(format!("\n## {}\n{value}", column.header));
            }
        }
    }

    if !record.items.is_empty() {
        lines.push(format!(
            "\n## Activity blocks ({} units, {})",
            record.total_units,
            format_minutes(units_to_minutes(record.total_units))
        ));
        for item in &record.items {
            let note = if item.note.trim().is_empty() {
                String::new()
            } else {
                format!(" - {}", item.note.trim())
            };
            lines.push(format!(
                "- [{}] {} x{}{note}",
                item.category, item.title, item.unit_count
            ));
        }
    }

    if let Some(recorded_at) = record.recorded_at {
        lines.push(format!("\nRecorded at {}", recorded_at.format(TIMESTAMP_FORMAT)));
    }

    lines.join("\n") + "\n"
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    parse_date_key(input)
        .with_context(|| format!("Invalid date format: {input}. Example: 2024-01-31"))
}

fn parse_optional_date(input: Option<&str>) -> Result<NaiveDate> {
    input
        .map(parse_date)
        .transpose()
        .map(|date| date.unwrap_or_else(|| Local::now().date_naive()))
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `Daylog init` first.".to_string())
}
