//! Merges the result and completion feeds into one console stream
//!
//! Aggregation runs in two phases:
//!
//! 1. **Blocking merge.** Wait on whichever feed is ready first, printing
//!    results and counting completions until every host has reported.
//! 2. **Final drain.** Take whatever results are still buffered without
//!    waiting, then stop.
//!
//! A worker enqueues all of its results before its completion signal, but
//! `select!` picks between ready feeds at random, so the last completion can
//! be observed while results are still sitting in the buffer. Phase 2 is
//! what guarantees those are printed.

use crate::dispatcher::Feed;
use crate::error::Result;
use crate::models::{CompletionSignal, ResultRecord};
use std::io::Write;
use tracing::{debug, warn};

/// Counts from one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Result blocks printed
    pub records: usize,
    pub hosts_completed: usize,
}

/// Prints result blocks to a writer as they arrive
pub struct Aggregator<W: Write> {
    out: W,
}

impl<W: Write> Aggregator<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume `feed` until every host has completed and the buffer is empty.
    ///
    /// Only a write failure on the output is an error.
    pub async fn aggregate(&mut self, feed: Feed) -> Result<AggregateSummary> {
        let Feed {
            mut results,
            mut done,
            hosts,
        } = feed;
        let mut summary = AggregateSummary::default();

        let mut working = hosts;
        while working > 0 {
            tokio::select! {
                Some(record) = results.recv() => {
                    self.emit(&record)?;
                    summary.records += 1;
                }
                signal = done.recv() => match signal {
                    Some(CompletionSignal) => {
                        working -= 1;
                        summary.hosts_completed += 1;
                    }
                    None => {
                        warn!(remaining = working, "Completion feed closed before all hosts reported");
                        break;
                    }
                },
            }
        }

        let mut drained = 0;
        while let Ok(record) = results.try_recv() {
            self.emit(&record)?;
            summary.records += 1;
            drained += 1;
        }
        debug!(drained, "Final drain complete");

        Ok(summary)
    }

    /// Print one block, `"<host>:\n<output>"` plus a newline
    fn emit(&mut self, record: &ResultRecord) -> Result<()> {
        writeln!(self.out, "{}", record)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
