use std::io::{self, Write};

use serde::Serialize;

use crate::cache::StatusReport;
use crate::retrieval::RetrievalReport;
use crate::sync::{ProgressEvent, ProgressSink, SyncReport};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(result: &SyncReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_retrieval(result: &RetrievalReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Sink for the driver: progress and per-unit warnings go to stderr,
/// keeping stdout clean for the JSON result.
pub struct StderrSink;

impl ProgressSink for StderrSink {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}", event.message);
    }
}
