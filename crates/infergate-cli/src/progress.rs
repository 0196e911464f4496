//! Terminal progress bar for batch jobs.

use std::sync::Mutex;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use infergate_core::{ProgressSink, SinkError};

/// Progress sink drawing an indicatif bar on stderr.
///
/// The bar is created on the first report, once the total is known.
pub struct BarProgressSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgressSink {
    pub const fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn create_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({eta})")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }
}

impl Default for BarProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressSink for BarProgressSink {
    async fn report(&self, completed: usize, total: usize) -> Result<(), SinkError> {
        let mut guard = self
            .bar
            .lock()
            .map_err(|_| SinkError::Unavailable("progress bar lock poisoned".into()))?;
        let pb = guard.get_or_insert_with(|| Self::create_bar(total as u64));
        pb.set_position(completed as u64);
        Ok(())
    }

    async fn finish(&self, total: usize) -> Result<(), SinkError> {
        let mut guard = self
            .bar
            .lock()
            .map_err(|_| SinkError::Unavailable("progress bar lock poisoned".into()))?;
        if let Some(pb) = guard.take() {
            pb.set_position(total as u64);
            pb.finish_with_message("done");
        }
        Ok(())
    }
}
