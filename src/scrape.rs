use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use scraper::Html;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::dedup::SeenSet;
use crate::driver::{DriverError, PageDriver};
use crate::extract::{extract_batch, leading_timestamps};
use crate::threads::reconstruct;
use crate::types::{
    RetainedItem, ScrapeConfig, ScrapeControl, ScrapeEvent, ScrapeMode, StatusSnapshot,
    parse_timestamp,
};

/// Leading items sampled for the date seek and the date stop condition.
const SAMPLE_WINDOW: usize = 3;

/// Fixed (not backoff-adjusted) pacing and seek budgets. Defaults suit a
/// live rendering environment; replay drivers and tests shrink the delays.
#[derive(Debug, Clone, Copy)]
pub struct EngineTuning {
    /// Settle delay after scrolling, before the next snapshot is trusted.
    pub scroll_settle: Duration,
    /// Settle delay after triggering show-more expansion.
    pub expand_settle: Duration,
    /// Global ceiling on date-seek scroll attempts.
    pub seek_max_attempts: u32,
    /// Consecutive seek attempts tolerated with no readable timestamp.
    pub seek_unreadable_limit: u32,
    /// Extra scroll attempts granted once samples fall behind the window,
    /// covering temporarily sparse stretches before giving up.
    pub seek_grace: u32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            scroll_settle: Duration::from_millis(1500),
            expand_settle: Duration::from_millis(350),
            seek_max_attempts: 40,
            seek_unreadable_limit: 6,
            seek_grace: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Seeking,
    Collecting,
    Stopped,
}

/// The single mutable value of a run. Created on start, mutated only from
/// the engine's cooperative step sequence, reset by the next start.
#[derive(Debug)]
struct RunState {
    config: ScrapeConfig,
    accumulated: Vec<RetainedItem>,
    seen: SeenSet,
    phase: Phase,
    active: bool,
    seek_attempts: u32,
    seek_unreadable: u32,
    seek_behind: u32,
}

impl RunState {
    fn idle() -> Self {
        Self {
            config: ScrapeConfig::default(),
            accumulated: Vec::new(),
            seen: SeenSet::new(),
            phase: Phase::Idle,
            active: false,
            seek_attempts: 0,
            seek_unreadable: 0,
            seek_behind: 0,
        }
    }

    fn started(config: ScrapeConfig) -> Self {
        let phase = match config.mode {
            ScrapeMode::DateRange { .. } => Phase::Seeking,
            _ => Phase::Collecting,
        };
        Self {
            config,
            phase,
            active: true,
            ..Self::idle()
        }
    }
}

/// The collection engine: one cooperative task owning the run state,
/// consuming control commands and producing status/completion events.
/// Commands are drained between steps, so an external stop takes effect at
/// the start of the next scheduled step at the latest.
pub struct Engine<D: PageDriver> {
    driver: D,
    tuning: EngineTuning,
    events: UnboundedSender<ScrapeEvent>,
    state: RunState,
}

impl<D: PageDriver> Engine<D> {
    pub fn new(driver: D, events: UnboundedSender<ScrapeEvent>) -> Self {
        Self::with_tuning(driver, EngineTuning::default(), events)
    }

    pub fn with_tuning(driver: D, tuning: EngineTuning, events: UnboundedSender<ScrapeEvent>) -> Self {
        Self {
            driver,
            tuning,
            events,
            state: RunState::idle(),
        }
    }

    pub async fn run(mut self, mut control: UnboundedReceiver<ScrapeControl>) {
        loop {
            while let Ok(command) = control.try_recv() {
                self.handle_control(command);
            }
            match self.state.phase {
                Phase::Idle | Phase::Stopped => match control.recv().await {
                    Some(command) => self.handle_control(command),
                    None => break,
                },
                Phase::Seeking => {
                    if let Err(err) = self.seek_step().await {
                        self.abort_run(&err);
                    }
                }
                Phase::Collecting => {
                    if let Err(err) = self.collect_step().await {
                        self.abort_run(&err);
                    }
                }
            }
        }
    }

    fn handle_control(&mut self, command: ScrapeControl) {
        match command {
            ScrapeControl::Start(config) => self.handle_start(config),
            ScrapeControl::Stop => {
                if self.state.active {
                    self.finish_run("collection stopped");
                } else {
                    self.send_status("no active collection to stop");
                }
            }
            ScrapeControl::QueryStatus(reply) => {
                let _ = reply.send(StatusSnapshot {
                    active: self.state.active,
                    item_count: self.state.accumulated.len(),
                });
            }
            ScrapeControl::QueryItems(reply) => {
                let _ = reply.send(self.state.accumulated.clone());
            }
        }
    }

    fn handle_start(&mut self, config: ScrapeConfig) {
        if self.state.active {
            // A second start while running is a no-op, not an error.
            self.send_status("collection already running");
            return;
        }
        if let Err(err) = config.validate() {
            self.send_status(&format!("invalid configuration: {err}"));
            return;
        }

        debug!(mode = config.mode.label(), "starting collection run");
        self.state = RunState::started(config);
        match self.state.config.mode {
            ScrapeMode::DateRange { .. } => self.send_status("locating the selected date range"),
            _ => self.send_status("collection started"),
        }
    }

    /// Date-range pre-phase: sample the first few rendered timestamps and
    /// scroll until the window is on screen, the budget runs out, or the
    /// samples show the window has been passed entirely.
    async fn seek_step(&mut self) -> Result<(), DriverError> {
        let ScrapeMode::DateRange { start, end } = self.state.config.mode else {
            self.state.phase = Phase::Collecting;
            return Ok(());
        };

        let html = self.driver.snapshot().await?;
        // The parsed document is not Send; keep it off the await points.
        let sampled = {
            let doc = Html::parse_document(&html);
            leading_timestamps(&doc, SAMPLE_WINDOW)
        };
        let readable: Vec<NaiveDate> = sampled.iter().flatten().map(utc_date).collect();

        self.state.seek_attempts += 1;
        debug!(
            attempt = self.state.seek_attempts,
            readable = readable.len(),
            "seek sample"
        );

        if readable.is_empty() {
            self.state.seek_unreadable += 1;
            if self.state.seek_unreadable > self.tuning.seek_unreadable_limit {
                self.send_status("timestamps unreadable; collecting from the current position");
                self.state.phase = Phase::Collecting;
                return Ok(());
            }
        } else {
            self.state.seek_unreadable = 0;
            if readable.iter().any(|date| (start..=end).contains(date)) {
                // The current rendering becomes the first cycle's input.
                self.send_status("date range located");
                self.state.phase = Phase::Collecting;
                return Ok(());
            }
            if readable.iter().all(|date| *date > end) {
                self.state.seek_behind = 0;
            } else {
                // Samples have fallen behind the window start; allow a
                // bounded grace period for temporarily sparse stretches.
                self.state.seek_behind += 1;
                if self.state.seek_behind > self.tuning.seek_grace {
                    self.finish_run("no posts found in the selected date range");
                    return Ok(());
                }
            }
        }

        if self.state.seek_attempts >= self.tuning.seek_max_attempts {
            self.send_status("date seek budget exhausted; collecting from the current position");
            self.state.phase = Phase::Collecting;
            return Ok(());
        }

        self.driver.scroll_to_bottom().await?;
        sleep(self.tuning.scroll_settle).await;
        Ok(())
    }

    /// One collection cycle: expand, snapshot, extract, rebuild threads,
    /// filter and merge, report, then either finish or scroll onward.
    async fn collect_step(&mut self) -> Result<(), DriverError> {
        let expanded = self.driver.expand_primary_toggles().await?;
        if expanded > 0 {
            sleep(self.tuning.expand_settle).await;
        }

        let html = self.driver.snapshot().await?;
        let (sampled, rendered, records) = {
            let doc = Html::parse_document(&html);
            let sampled = leading_timestamps(&doc, SAMPLE_WINDOW);
            let candidates = extract_batch(&doc, self.driver.base_url());
            (sampled, candidates.len(), reconstruct(candidates))
        };

        let mut added = 0usize;
        for record in records {
            if let ScrapeMode::Count { max_items } = self.state.config.mode {
                if self.state.accumulated.len() >= max_items {
                    break;
                }
            }
            if let ScrapeMode::DateRange { start, end } = self.state.config.mode {
                // Records without a parseable timestamp are kept.
                let date = record.timestamp.as_deref().and_then(parse_timestamp);
                if let Some(date) = date.as_ref().map(utc_date) {
                    if date < start || date > end {
                        continue;
                    }
                }
            }
            if self
                .state
                .seen
                .is_new(&record.text, record.timestamp.as_deref())
            {
                self.state
                    .seen
                    .insert(&record.text, record.timestamp.as_deref());
                self.state.accumulated.push(record);
                added += 1;
            }
        }

        let total = self.state.accumulated.len();
        debug!(rendered, added, total, "collection cycle finished");
        let message = match self.state.config.mode {
            ScrapeMode::All => format!("collected {total} posts"),
            ScrapeMode::Count { max_items } => format!("collected {total} of {max_items} posts"),
            ScrapeMode::DateRange { .. } => {
                format!("collected {total} posts in the selected range")
            }
        };
        self.send_status(&message);

        if self.should_stop(&sampled) {
            self.finish_run("collection finished");
            return Ok(());
        }

        self.driver.scroll_to_bottom().await?;
        sleep(self.tuning.scroll_settle).await;
        Ok(())
    }

    fn should_stop(&self, sampled: &[Option<DateTime<FixedOffset>>]) -> bool {
        match self.state.config.mode {
            ScrapeMode::All => false,
            ScrapeMode::Count { max_items } => self.state.accumulated.len() >= max_items,
            ScrapeMode::DateRange { start, .. } => {
                // The scroll has passed the window once every sampled
                // leading item carries a timestamp older than its start.
                let readable: Vec<NaiveDate> = sampled.iter().flatten().map(utc_date).collect();
                readable.len() >= SAMPLE_WINDOW && readable.iter().all(|date| *date < start)
            }
        }
    }

    fn finish_run(&mut self, message: &str) {
        self.state.phase = Phase::Stopped;
        self.state.active = false;
        self.send_status(message);
        let _ = self.events.send(ScrapeEvent::Complete {
            items: self.state.accumulated.clone(),
            item_count: self.state.accumulated.len(),
        });
    }

    fn abort_run(&mut self, err: &DriverError) {
        warn!(error = %err, "page driver failed; stopping run");
        self.finish_run(&format!("page driver failed: {err}"));
    }

    fn send_status(&self, message: &str) {
        let _ = self.events.send(ScrapeEvent::Status {
            message: message.to_string(),
            item_count: self.state.accumulated.len(),
        });
    }
}

fn utc_date(ts: &DateTime<FixedOffset>) -> NaiveDate {
    ts.with_timezone(&Utc).date_naive()
}
