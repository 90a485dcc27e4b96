//! Ordered batch execution with running statistics.

use crate::dispatcher::{render_outcome, Dispatcher};
use crate::session::Connector;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub batches_processed: u32,
    pub commands_processed: u32,
    pub commands_failed: u32,
    pub last_batch_time_us: u32,
}

/// Runs batches of command lines in order, one result per line.
///
/// Lines are dispatched strictly sequentially because later commands may rely
/// on instrument state left by earlier ones. The processor itself does no
/// locking: callers sharing one bench between concurrent batches must
/// serialize access to it.
#[derive(Debug)]
pub struct BatchProcessor<C> {
    dispatcher: Dispatcher<C>,
    stats: BatchStats,
}

impl<C: Connector> BatchProcessor<C> {
    pub fn new(connector: C) -> Self {
        Self {
            dispatcher: Dispatcher::new(connector),
            stats: BatchStats::default(),
        }
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn process<S: AsRef<str>>(&mut self, lines: &[S]) -> Vec<String> {
        let started = Instant::now();
        info!("Processing batch of {} command(s)", lines.len());

        let mut failed = 0u32;
        let responses: Vec<String> = lines
            .iter()
            .map(|line| {
                let line: &str = line.as_ref();
                let outcome = self.dispatcher.dispatch(line);
                if outcome.is_err() {
                    failed = failed.saturating_add(1);
                }
                render_outcome(line, outcome)
            })
            .collect();

        debug_assert_eq!(responses.len(), lines.len());

        let elapsed_us = u32::try_from(started.elapsed().as_micros()).unwrap_or(u32::MAX);
        self.stats.batches_processed = self.stats.batches_processed.wrapping_add(1);
        self.stats.commands_processed = self
            .stats
            .commands_processed
            .saturating_add(u32::try_from(lines.len()).unwrap_or(u32::MAX));
        self.stats.commands_failed = self.stats.commands_failed.saturating_add(failed);
        self.stats.last_batch_time_us = elapsed_us;

        info!(
            "Batch complete: {} command(s), {} failed, {}us",
            responses.len(),
            failed,
            elapsed_us
        );
        responses
    }
}
