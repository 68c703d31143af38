//! indicatif-backed progress reporting for cache downloads.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use hoist_cache::FetchEvents;

/// Renders one progress bar per in-flight download.
pub struct ProgressEvents {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressEvents {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn label(url: &str) -> String {
        url.rsplit('/').next().unwrap_or(url).to_string()
    }
}

impl Default for ProgressEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchEvents for ProgressEvents {
    fn started(&self, url: &str, length: Option<u64>) {
        let bar = match length {
            Some(total) if total > 100_000 => {
                let bar = self.multi.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template("  {msg} {bar:30.cyan/dim} {bytes}/{total_bytes}")
                        .unwrap()
                        .progress_chars("##-"),
                );
                bar
            }
            _ => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(ProgressStyle::with_template("  {msg} {bytes}").unwrap());
                bar
            }
        };
        bar.set_message(Self::label(url));
        self.bars.lock().unwrap().insert(url.to_string(), bar);
    }

    fn progress(&self, url: &str, total: u64) {
        if let Some(bar) = self.bars.lock().unwrap().get(url) {
            bar.set_position(total);
        }
    }

    fn finished(&self, url: &str) {
        if let Some(bar) = self.bars.lock().unwrap().remove(url) {
            bar.finish_and_clear();
        }
    }

    fn failed(&self, url: &str, _message: &str) {
        if let Some(bar) = self.bars.lock().unwrap().remove(url) {
            bar.abandon();
        }
    }
}
