use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("page source unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Narrow capability interface over the rendered view. The engine never
/// touches a rendering environment directly: reading the currently mounted
/// content, triggering expansion controls and scrolling all go through this
/// boundary, so the collection logic runs unchanged against live pages and
/// captured fixtures alike.
#[async_trait]
pub trait PageDriver: Send {
    /// Origin used to resolve relative permalinks and media sources.
    fn base_url(&self) -> &str;

    /// Full markup of the currently rendered view.
    async fn snapshot(&mut self) -> Result<String, DriverError>;

    /// Triggers every "show more" control belonging to a primary item, once
    /// per control, and returns how many were triggered. Controls nested
    /// inside quoted items must be left untouched; expanding those corrupts
    /// quoted-text capture.
    async fn expand_primary_toggles(&mut self) -> Result<usize, DriverError>;

    /// Scrolls to the bottom of the growing view so lazy content mounts.
    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError>;
}

/// Replays an ordered sequence of captured timeline snapshots. Each scroll
/// advances the page cursor; once the cursor passes the final snapshot the
/// shared exhaustion flag flips so a runner can stop an open-ended run.
#[derive(Debug)]
pub struct ReplayDriver {
    pages: Vec<String>,
    pos: usize,
    base_url: String,
    exhausted: Arc<AtomicBool>,
}

impl ReplayDriver {
    pub fn new(pages: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            pages,
            pos: 0,
            base_url: base_url.into(),
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        base_url: impl Into<String>,
    ) -> io::Result<Self> {
        let mut pages = Vec::with_capacity(paths.len());
        for path in paths {
            pages.push(fs::read_to_string(path)?);
        }
        Ok(Self::new(pages, base_url))
    }

    /// Shared flag that flips once scrolling has run past the last snapshot.
    pub fn exhaustion_flag(&self) -> Arc<AtomicBool> {
        self.exhausted.clone()
    }
}

#[async_trait]
impl PageDriver for ReplayDriver {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn snapshot(&mut self) -> Result<String, DriverError> {
        Ok(self.pages.get(self.pos).cloned().unwrap_or_default())
    }

    async fn expand_primary_toggles(&mut self) -> Result<usize, DriverError> {
        // Captured snapshots are taken after expansion; nothing to trigger.
        Ok(0)
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        if self.pos + 1 < self.pages.len() {
            self.pos += 1;
        } else {
            self.exhausted.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}
