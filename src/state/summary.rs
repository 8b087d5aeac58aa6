//! Per-run outcome bookkeeping
//!
//! Iterations never abort on a single bad item. Each item's outcome is
//! recorded here instead and the whole summary is logged once the run ends.

use std::fmt;

/// Outcome of processing one item (a page, a parent, a table row)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was processed; `found` counts what it yielded
    Done { item: String, found: usize },

    /// The item was skipped and the run continued
    Skipped { item: String, reason: String },
}

impl ItemOutcome {
    pub fn item(&self) -> &str {
        match self {
            Self::Done { item, .. } | Self::Skipped { item, .. } => item,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done { item, found } => write!(f, "{}: {} found", item, found),
            Self::Skipped { item, reason } => write!(f, "{}: skipped ({})", item, reason),
        }
    }
}

/// Outcomes collected over one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    name: String,
    outcomes: Vec<ItemOutcome>,
}

impl RunSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_done(&mut self, item: impl Into<String>, found: usize) {
        self.outcomes.push(ItemOutcome::Done {
            item: item.into(),
            found,
        });
    }

    pub fn record_skip(&mut self, item: impl Into<String>, reason: impl ToString) {
        let item = item.into();
        let reason = reason.to_string();
        tracing::debug!("{}: skipping {} ({})", self.name, item, reason);
        self.outcomes.push(ItemOutcome::Skipped { item, reason });
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn done_count(&self) -> usize {
        self.outcomes.len() - self.skipped_count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    /// Logs the totals, then every skipped item
    pub fn log(&self) {
        tracing::info!(
            "{}: {} processed, {} skipped",
            self.name,
            self.done_count(),
            self.skipped_count()
        );
        for outcome in self.skipped() {
            tracing::warn!("{}: {}", self.name, outcome);
        }
    }
}
