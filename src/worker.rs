//! Host worker: one connection, the whole command list, in order
//!
//! A worker emits zero or more [`ResultRecord`]s and then exactly one
//! [`CompletionSignal`]. The signal is sent by a drop guard created before
//! anything else, so it fires on every exit path and always after the
//! worker's last result send has completed.

use crate::executors::{Connector, RemoteConnection, RemoteSession};
use crate::models::{CompletionSignal, HostTarget, ResultRecord, RunConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What happened on one host, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostReport {
    pub host: String,
    pub connected: bool,
    pub succeeded: usize,
    pub failed: usize,
    /// Session setup failed and the remaining commands were skipped
    pub aborted: bool,
}

impl HostReport {
    fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Default::default()
        }
    }
}

/// Sends the completion signal when dropped
struct CompletionGuard {
    host: String,
    done: mpsc::Sender<CompletionSignal>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // The completion channel holds one slot per host, so this only fails
        // if the aggregator is gone.
        if let Err(e) = self.done.try_send(CompletionSignal) {
            warn!(host = %self.host, "Completion signal not delivered: {}", e);
        }
    }
}

/// Run every command of `config` against `target`.
///
/// Connection failures end the worker immediately. A session that cannot be
/// opened ends it too, after closing the connection. A failing command is
/// reported and skipped.
pub async fn run_host<C: Connector>(
    target: HostTarget,
    config: Arc<RunConfig>,
    connector: Arc<C>,
    results: mpsc::Sender<ResultRecord>,
    done: mpsc::Sender<CompletionSignal>,
) -> HostReport {
    let label = target.label.clone();
    let _completion = CompletionGuard {
        host: label.clone(),
        done,
    };
    let mut report = HostReport::new(&label);

    let mut connection = match connector
        .connect(&target, &config.credential, config.connect_timeout)
        .await
    {
        Ok(connection) => connection,
        Err(e) => {
            error!(host = %label, "{}", e);
            return report;
        }
    };
    report.connected = true;

    for command in config.commands.iter() {
        let session = match connection.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(host = %label, "{}", e);
                report.aborted = true;
                break;
            }
        };

        match session.output(command).await {
            Ok(output) => {
                report.succeeded += 1;
                let record = ResultRecord {
                    host: label.clone(),
                    output,
                };
                if results.send(record).await.is_err() {
                    warn!(host = %label, "Result feed closed, abandoning remaining commands");
                    break;
                }
            }
            Err(e) => {
                report.failed += 1;
                error!(host = %label, command = %command, "{}", e);
            }
        }
    }

    connection.close().await;
    debug!(host = %label, "Connection released");

    info!(
        host = %label,
        succeeded = report.succeeded,
        failed = report.failed,
        aborted = report.aborted,
        "Host finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::tests::generated_pem;
    use crate::credential::{Credential, PrivateKey};
    use crate::error::{Result, SshFanError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted backend: fails connect, session #n, or commands by name
    #[derive(Default)]
    struct Script {
        refuse_connect: bool,
        fail_session_at: Option<usize>,
        failing_commands: Vec<&'static str>,
        closed: AtomicBool,
        sessions: AtomicUsize,
    }

    struct ScriptConnector(Arc<Script>);
    struct ScriptConnection(Arc<Script>, String);
    struct ScriptSession(Arc<Script>, String);

    #[async_trait]
    impl Connector for ScriptConnector {
        type Connection = ScriptConnection;

        async fn connect(
            &self,
            target: &HostTarget,
            _credential: &Credential,
            _timeout: Duration,
        ) -> Result<ScriptConnection> {
            if self.0.refuse_connect {
                return Err(SshFanError::Connect {
                    host: target.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(ScriptConnection(self.0.clone(), target.to_string()))
        }
    }

    #[async_trait]
    impl RemoteConnection for ScriptConnection {
        type Session = ScriptSession;

        async fn open_session(&mut self) -> Result<ScriptSession> {
            let n = self.0.sessions.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_session_at == Some(n) {
                return Err(SshFanError::Session {
                    host: self.1.clone(),
                    message: "channel refused".to_string(),
                });
            }
            Ok(ScriptSession(self.0.clone(), self.1.clone()))
        }

        async fn close(self) {
            self.0.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteSession for ScriptSession {
        async fn output(self, command: &str) -> Result<String> {
            if self.0.failing_commands.iter().any(|c| *c == command) {
                return Err(SshFanError::Command {
                    host: self.1,
                    command: command.to_string(),
                    exit_code: Some(1),
                    message: "Process exited with status 1".to_string(),
                });
            }
            Ok(format!("{}\n", command))
        }
    }

    fn config(commands: &[&str]) -> Arc<RunConfig> {
        let credential = Credential::new("test", PrivateKey::parse(&generated_pem()).unwrap());
        Arc::new(RunConfig::new(
            vec![HostTarget::new("a", 22)],
            commands.iter().map(|c| c.to_string()).collect(),
            credential,
        ))
    }

    async fn run(
        script: Script,
        commands: &[&str],
    ) -> (HostReport, Vec<ResultRecord>, usize, Arc<Script>) {
        let script = Arc::new(script);
        let (results_tx, mut results_rx) = mpsc::channel(16);
        let (done_tx, mut done_rx) = mpsc::channel(1);

        let report = run_host(
            HostTarget::new("a", 22),
            config(commands),
            Arc::new(ScriptConnector(script.clone())),
            results_tx,
            done_tx,
        )
        .await;

        let mut records = Vec::new();
        while let Ok(record) = results_rx.try_recv() {
            records.push(record);
        }
        let mut signals = 0;
        while done_rx.try_recv().is_ok() {
            signals += 1;
        }

        (report, records, signals, script)
    }

    #[tokio::test]
    async fn test_all_commands_in_order() {
        let (report, records, signals, script) =
            run(Script::default(), &["uptime", "hostname", "id"]).await;

        let outputs: Vec<_> = records.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["uptime\n", "hostname\n", "id\n"]);
        assert!(records.iter().all(|r| r.host == "a"));
        assert_eq!(report.succeeded, 3);
        assert_eq!(signals, 1);
        assert!(script.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connect_failure_completes_without_results() {
        let script = Script {
            refuse_connect: true,
            ..Default::default()
        };
        let (report, records, signals, script) = run(script, &["uptime"]).await;

        assert!(!report.connected);
        assert!(records.is_empty());
        assert_eq!(signals, 1);
        assert_eq!(script.sessions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_command_failure_is_skipped() {
        let script = Script {
            failing_commands: vec!["false"],
            ..Default::default()
        };
        let (report, records, signals, _) = run(script, &["false", "echo ok"]).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].output, "echo ok\n");
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(signals, 1);
    }

    #[tokio::test]
    async fn test_session_failure_stops_host() {
        let script = Script {
            fail_session_at: Some(1),
            ..Default::default()
        };
        let (report, records, signals, script) = run(script, &["one", "two", "three"]).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].output, "one\n");
        assert!(report.aborted);
        assert_eq!(signals, 1);
        assert_eq!(script.sessions.load(Ordering::SeqCst), 2);
        assert!(script.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_command_list() {
        let (report, records, signals, script) = run(Script::default(), &[]).await;

        assert!(report.connected);
        assert!(records.is_empty());
        assert_eq!(signals, 1);
        assert!(script.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closed_result_feed_still_completes() {
        let script = Arc::new(Script::default());
        let (results_tx, results_rx) = mpsc::channel(1);
        let (done_tx, mut done_rx) = mpsc::channel(1);
        drop(results_rx);

        let report = run_host(
            HostTarget::new("a", 22),
            config(&["one", "two"]),
            Arc::new(ScriptConnector(script)),
            results_tx,
            done_tx,
        )
        .await;

        assert_eq!(report.succeeded, 1);
        assert!(done_rx.try_recv().is_ok());
    }
}
