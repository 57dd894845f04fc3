//! Incremental timeline harvester.
//!
//! Collects post records from a continuously-growing, virtualized feed
//! rendering that is only reachable by progressive scrolling: extraction
//! under multi-strategy heuristics, adjacency-based thread reconstruction,
//! fingerprint deduplication across re-observations, and a pagination
//! controller that seeks date windows and decides when enough has been
//! seen. The rendering environment is injected through [`PageDriver`], so
//! the engine runs unchanged over live pages and captured snapshots.

pub mod data_io;
pub mod dedup;
pub mod driver;
pub mod extract;
pub mod runtime;
pub mod scrape;
pub mod threads;
pub mod types;

pub use driver::{DriverError, PageDriver, ReplayDriver};
pub use scrape::{Engine, EngineTuning, Phase};
pub use types::{
    CandidateRecord, ConfigError, DataFormat, RetainedItem, ScrapeConfig, ScrapeControl,
    ScrapeEvent, ScrapeMode, StatusSnapshot,
};
