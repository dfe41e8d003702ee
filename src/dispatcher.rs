//! Fan-out of host workers

use crate::aggregator::{AggregateSummary, Aggregator};
use crate::error::Result;
use crate::executors::Connector;
use crate::models::{CompletionSignal, ResultRecord, RunConfig};
use crate::worker::run_host;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

/// Receiving side of a launched batch
#[derive(Debug)]
pub struct Feed {
    pub results: mpsc::Receiver<ResultRecord>,
    pub done: mpsc::Receiver<CompletionSignal>,
    /// Number of workers launched, i.e. completion signals to expect
    pub hosts: usize,
}

/// Starts one worker per host
pub struct Dispatcher;

impl Dispatcher {
    /// Spawn a worker for every host in `config` and return immediately.
    ///
    /// The result channel is bounded by `config.result_buffer`; the
    /// completion channel has a slot for every host so that no worker ever
    /// waits to report completion. Must be called inside a Tokio runtime.
    pub fn launch<C: Connector>(config: Arc<RunConfig>, connector: Arc<C>) -> Feed {
        let hosts = config.hosts.len();
        let (results_tx, results) = mpsc::channel(config.result_buffer.max(1));
        let (done_tx, done) = mpsc::channel(hosts.max(1));

        for target in config.hosts.iter().cloned() {
            let span = info_span!("host", host = %target.label);
            tokio::spawn(
                run_host(
                    target,
                    Arc::clone(&config),
                    Arc::clone(&connector),
                    results_tx.clone(),
                    done_tx.clone(),
                )
                .instrument(span),
            );
        }

        debug!(
            hosts,
            commands = config.commands.len(),
            "Launched host workers"
        );

        Feed {
            results,
            done,
            hosts,
        }
    }
}

/// Launch a batch and print its results to `out` until every host is done
pub async fn run_batch<C, W>(
    config: Arc<RunConfig>,
    connector: Arc<C>,
    out: W,
) -> Result<AggregateSummary>
where
    C: Connector,
    W: Write,
{
    let feed = Dispatcher::launch(config, connector);
    Aggregator::new(out).aggregate(feed).await
}
