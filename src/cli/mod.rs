pub mod onboard;

use crate::journal::record::{ActivityItem, Category};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "Daylog", about = "Daily Journal & Activity Block Record Store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Interactive setup of storage and advice settings
    Init,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Write the entry for a date, replacing any earlier entry for it
    Save(SaveArgs),
    Show {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    History {
        #[arg(long, default_value_t = 14)]
        limit: usize,
    },
    /// Activity block totals per category
    Stats {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the plan written the day before
    Plan {
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete every entry and rewrite the header row
    Reset {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    Doctor,
    Serve,
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub experience: Option<String>,
    #[arg(long)]
    pub feelings: Option<String>,
    #[arg(long)]
    pub ideas: Option<String>,
    #[arg(long)]
    pub tomorrow_plan: Option<String>,
    #[arg(long)]
    pub new_ideas: Option<String>,
    #[arg(long)]
    pub funny_episodes: Option<String>,
    #[arg(long)]
    pub next_action: Option<String>,
    /// Activity block as `category:title:units[:note]`, repeatable
    #[arg(long = "item", value_parser = parse_item_spec)]
    pub items: Vec<ActivityItem>,
    #[arg(long, default_value_t = false)]
    pub no_advice: bool,
}

impl SaveArgs {
    pub fn text_fields(&self) -> Vec<(&'static str, &Option<String>)> {
        vec![
            ("experience", &self.experience),
            ("feelings", &self.feelings),
            ("ideas", &self.ideas),
            ("tomorrowPlan", &self.tomorrow_plan),
            ("newIdeas", &self.new_ideas),
            ("funnyEpisodes", &self.funny_episodes),
            ("nextAction", &self.next_action),
        ]
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

pub fn parse_item_spec(raw: &str) -> Result<ActivityItem, String> {
    let mut parts = raw.splitn(4, ':');
    let category = parts.next().unwrap_or_default();
    let title = parts.next().unwrap_or_default().trim();
    let units = parts.next().unwrap_or_default().trim();
    let note = parts.next().unwrap_or_default().trim();

    if title.is_empty() {
        return Err(format!("item needs a title: {raw}. Example: study:rust book:2"));
    }

    let unit_count = units
        .parse::<u32>()
        .ok()
        .filter(|count| *count > 0)
        .ok_or_else(|| format!("item units must be a positive number: {raw}"))?;

    Ok(ActivityItem {
        category: Category::parse(category),
        title: title.to_string(),
        unit_count,
        note: note.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, parse_item_spec};
    use crate::journal::record::Category;
    use clap::Parser;

    #[test]
    fn item_spec_with_note_keeps_colons() {
        let item = parse_item_spec("play:game:2:ranked: lost twice").expect("item");

        assert_eq!(item.category, Category::Play);
        assert_eq!(item.title, "game");
        assert_eq!(item.unit_count, 2);
        assert_eq!(item.note, "ranked: lost twice");
    }

    #[test]
    fn item_spec_rejects_missing_title_or_units() {
        assert!(parse_item_spec("play").is_err());
        assert!(parse_item_spec("play:game").is_err());
        assert!(parse_item_spec("play:game:0").is_err());
    }

    #[test]
    fn save_collects_repeated_items() {
        let cli = Cli::try_parse_from([
            "Daylog",
            "save",
            "--date",
            "2024-02-01",
            "--experience",
            "x",
            "--item",
            "play:game:2",
            "--item",
            "study:rust:1",
        ])
        .expect("parse");

        match cli.command {
            Commands::Save(args) => {
                assert_eq!(args.items.len(), 2);
                assert_eq!(args.experience.as_deref(), Some("x"));
                assert!(!args.no_advice);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
