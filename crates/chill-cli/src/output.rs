//! Output formatting for CLI

use chill_core::PlaybackStatus;
use console::{style, StyledObject};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

pub fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Status word colored by severity
pub fn status(status: PlaybackStatus) -> StyledObject<String> {
    let text = format!("{:<9}", status.to_string());
    match status {
        PlaybackStatus::Playing => style(text).green(),
        PlaybackStatus::Paused | PlaybackStatus::Ended => style(text).cyan(),
        PlaybackStatus::Loading | PlaybackStatus::Buffering => style(text).yellow(),
        PlaybackStatus::Errored => style(text).red().bold(),
        PlaybackStatus::Idle => style(text).dim(),
    }
}
