//! Line-oriented operator console on stdin/stdout.
//!
//! Only plumbing: lines typed by the operator are forwarded to the
//! approval runtime, and notices coming back are printed with a
//! timestamp.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RemediationError;
use crate::sandbox::ExecutionResult;
use crate::supervisor::Feature;

/// Something the operator should see.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A proposed action entered the approval queue
    Queued { id: u64, description: String },
    /// A confirmed action (or an ad-hoc run) finished
    Executed {
        description: String,
        outcome: Result<ExecutionResult, RemediationError>,
    },
    /// A periodic unit faulted and is cooling down
    Maintenance {
        feature: Feature,
        message: String,
        resume_in: Duration,
    },
    Resumed(Feature),
    /// Answer to a console command
    Reply(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Queued { id, description } => {
                write!(f, "Pending #{id}: {description} (/show {id}, /confirm {id}, /reject {id})")
            }
            Notice::Executed {
                description,
                outcome: Ok(result),
            } => {
                let verdict = if result.succeeded { "succeeded" } else { "failed" };
                write!(f, "{description}: {verdict}")?;
                if let Some(code) = result.exit_code {
                    write!(f, " (exit {code})")?;
                }
                let output = result.combined_output.trim_end();
                if !output.is_empty() {
                    write!(f, "\n{output}")?;
                }
                Ok(())
            }
            Notice::Executed {
                description,
                outcome: Err(e),
            } => write!(f, "{description}: not run: {e}"),
            Notice::Maintenance {
                feature,
                message,
                resume_in,
            } => write!(
                f,
                "[{feature} ERROR] {message}\n{feature} in maintenance, retrying in {}s",
                resume_in.as_secs()
            ),
            Notice::Resumed(feature) => write!(f, "{feature} resumed"),
            Notice::Reply(text) => f.write_str(text),
        }
    }
}

/// Forwards stdin lines (trimmed, non-empty) until EOF.
pub fn spawn_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line.to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("Cannot read stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

/// Prints notices until every sender is gone.
pub async fn print_notices(mut rx: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = rx.recv().await {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        println!("[{stamp}] {notice}");
    }
}
