use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    All,
    Count { max_items: usize },
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl ScrapeMode {
    pub fn label(self) -> &'static str {
        match self {
            ScrapeMode::All => "all",
            ScrapeMode::Count { .. } => "count",
            ScrapeMode::DateRange { .. } => "date_range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub mode: ScrapeMode,
}

impl ScrapeConfig {
    pub fn new(mode: ScrapeMode) -> Self {
        Self { mode }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            ScrapeMode::All => Ok(()),
            ScrapeMode::Count { max_items } => {
                if max_items == 0 {
                    Err(ConfigError::ZeroCount)
                } else {
                    Ok(())
                }
            }
            ScrapeMode::DateRange { start, end } => {
                if start > end {
                    Err(ConfigError::InvertedRange { start, end })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            mode: ScrapeMode::All,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("count mode requires max_items >= 1")]
    ZeroCount,
    #[error("date range start {start} is after end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// One extraction result for a rendered item node. Rebuilt from scratch on
/// every collection cycle; never retained across cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub text: String,
    pub timestamp: Option<String>,
    pub author: Option<String>,
    pub quoted_url: Option<String>,
    pub media_urls: Vec<String>,
    /// Visual continuation marker, on the item itself or inherited from the
    /// immediately preceding rendered container.
    pub continues_previous: bool,
}

/// An item accepted into the accumulated collection. Immutable once
/// appended; thread fields are filled before the item leaves the
/// reconstruction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
    pub is_thread: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thread_items: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thread_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quoted_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub active: bool,
    pub item_count: usize,
}

/// Commands consumed from the external control surface.
#[derive(Debug)]
pub enum ScrapeControl {
    Start(ScrapeConfig),
    Stop,
    QueryStatus(oneshot::Sender<StatusSnapshot>),
    QueryItems(oneshot::Sender<Vec<RetainedItem>>),
}

/// Events produced toward the external control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeEvent {
    Status {
        message: String,
        item_count: usize,
    },
    Complete {
        items: Vec<RetainedItem>,
        item_count: usize,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

/// Parses an item timestamp as rendered in a machine-readable datetime
/// attribute. Anything that is not RFC 3339 is treated as absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}
