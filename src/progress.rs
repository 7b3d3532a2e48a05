//! Progress bar for apply and destroy runs.

use crate::ui;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use provision::{Disposition, Operation, ProgressCallback, ResourceKind, RunReport};
use std::collections::BTreeSet;

/// Reports engine progress on a terminal progress bar.
///
/// Every settled resource is printed above the bar; the bar message lists
/// what is currently in flight.
pub struct RunProgress {
    bar: ProgressBar,
    in_flight: BTreeSet<String>,
}

impl RunProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self {
            bar,
            in_flight: BTreeSet::new(),
        }
    }

    fn refresh(&self) {
        let names: Vec<&str> = self.in_flight.iter().map(String::as_str).collect();
        self.bar.set_message(names.join(", "));
    }
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, operation: Operation, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        log::debug!("{operation}: {total} resources");
    }

    fn on_resource_start(&mut self, name: &str, kind: ResourceKind) {
        log::debug!("dispatching {name} ({kind})");
        self.in_flight.insert(name.to_string());
        self.refresh();
    }

    fn on_resource_complete(&mut self, name: &str, disposition: &Disposition) {
        self.in_flight.remove(name);
        self.bar.inc(1);
        // Unchanged and absent resources are summarized at the end
        if !matches!(disposition, Disposition::Unchanged | Disposition::Absent) {
            let line = format!("  {} {} {}", ui::marker(disposition), name, disposition.to_string().dimmed());
            self.bar.println(line);
        }
        self.refresh();
    }

    fn on_run_complete(&mut self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}
