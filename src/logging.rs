//! Logging holds wrapper functions for logging events.
//! Segment events are emitted from inside the engine; the init functions are
//! for applications embedding it.

use crate::segment::SegmentHeader;
use std::{fs::OpenOptions, io, path::Path, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{event, Level};
use tracing_subscriber::FmtSubscriber;

/// Installs a global subscriber that writes JSON events to a dated log file
/// in `directory`.
pub fn init_events(directory: impl AsRef<Path>) -> Result<(), LoggingError> {
    let file_path = directory.as_ref().join(format!(
        "rudp-{}.log",
        chrono::offset::Local::now().format("%y-%m-%d")
    ));
    let file = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .with_max_level(Level::TRACE)
        .json()
        .finish();
    // set the global default so all events go to the same subscriber and
    // subsequently the same file
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Installs a global subscriber that writes human-readable events to stderr.
pub fn init_stderr_events(level: Level) -> Result<(), LoggingError> {
    let subscriber = FmtSubscriber::builder()
        .with_writer(io::stderr)
        .with_max_level(level)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Which way a segment is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Segment event handler.
/// Used to log every segment sent or received. Captures the following data:
/// direction, flags, seq, ack, header_length, payload_length
pub fn segment_event(direction: Direction, header: &SegmentHeader, payload_length: usize) {
    event!(
        Level::TRACE,
        direction = ?direction,
        flags = ?header.description,
        seq = header.seq,
        ack = header.ack,
        header_length = header.header_length,
        payload_length,
        "segment"
    );
}

#[derive(Debug, ThisError)]
pub enum LoggingError {
    #[error("Could not open the log file: {0}")]
    File(#[from] io::Error),
    #[error("A global subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}
