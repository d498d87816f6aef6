//! Helpers shared by the scheduler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use cronwarden_protocols::{ExecutionStatus, Outcome};

use crate::executor::CommandExecutor;

/// Executor that runs nothing. `false` fails, anything else succeeds and
/// echoes the command on stdout.
pub(crate) struct ScriptedExecutor {
    runs: Mutex<Vec<(String, DateTime<Utc>)>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            delay: None,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Make every run take `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.runs.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    /// Start times of every run.
    pub(crate) fn started(&self) -> Vec<DateTime<Utc>> {
        self.runs.lock().iter().map(|(_, t)| *t).collect()
    }

    /// Most runs observed at the same time.
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &str) -> Outcome {
        let started_at = Utc::now();
        self.runs.lock().push((command.to_string(), started_at));

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let failed = command == "false";
        Outcome {
            status: if failed {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Success
            },
            stdout: if failed { String::new() } else { format!("{}\n", command) },
            stderr: String::new(),
            exit_code: Some(if failed { 1 } else { 0 }),
            started_at,
        }
    }
}
