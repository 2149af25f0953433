//! # Relation Size Lookup
//!
//! Two [`RelationSizeService`] implementations:
//!
//! - [`StaticSizeService`]: an in-memory location→bytes table, used by tests
//!   and by deployments that preload sizes at startup.
//! - [`ExternalSizeHelper`]: shells out to a helper program that prints the
//!   byte size of a location on stdout. The call runs on a worker thread and
//!   is bounded by a deadline; a slow helper yields a timeout error, never a
//!   stalled rewrite.

use ndpx_core::remote::{RelationSizeService, SizeServiceError};
use std::collections::HashMap;
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// In-memory size table.
#[derive(Debug, Default, Clone)]
pub struct StaticSizeService {
    sizes: HashMap<String, u64>,
}

impl StaticSizeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: u64) {
        self.sizes.insert(location.into(), bytes);
    }
}

impl RelationSizeService for StaticSizeService {
    fn storage_size(&self, location: &str) -> Result<u64, SizeServiceError> {
        self.sizes
            .get(location)
            .copied()
            .ok_or_else(|| SizeServiceError::Unavailable(format!("unknown location {location}")))
    }
}

/// Deadline-bounded external helper.
///
/// Invokes `command args... location` and parses the first whitespace token
/// of stdout as a decimal byte count.
#[derive(Debug, Clone)]
pub struct ExternalSizeHelper {
    command: String,
    args: Vec<String>,
    deadline: Duration,
}

impl ExternalSizeHelper {
    pub fn new(command: impl Into<String>, deadline: Duration) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            deadline,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl RelationSizeService for ExternalSizeHelper {
    fn storage_size(&self, location: &str) -> Result<u64, SizeServiceError> {
        let (tx, rx) = mpsc::channel();
        let command = self.command.clone();
        let args = self.args.clone();
        let loc = location.to_string();
        // The helper runs detached; if it outlives the deadline the thread
        // finishes in the background and the send into the dropped channel
        // is ignored.
        thread::spawn(move || {
            let result = Command::new(&command).args(&args).arg(&loc).output();
            let _ = tx.send(result);
        });

        let output = match rx.recv_timeout(self.deadline) {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!("size helper failed to launch: {err}");
                return Err(SizeServiceError::Unavailable(err.to_string()));
            }
            Err(_) => {
                warn!("size helper exceeded {:?} deadline", self.deadline);
                return Err(SizeServiceError::Timeout(self.deadline));
            }
        };
        if !output.status.success() {
            return Err(SizeServiceError::Unavailable(format!(
                "helper exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = stdout.split_whitespace().next().unwrap_or("");
        let bytes = token.parse::<u64>().map_err(|_| {
            SizeServiceError::Malformed(format!("expected a byte count, got {stdout:?}"))
        })?;
        debug!("size helper reported {bytes} bytes for {location}");
        Ok(bytes)
    }
}
