//! Error types for tlsniff.
//!
//! Only failures at the edges of a run are errors: reading the label table,
//! locating the capture and writing the output tables. Anything that goes wrong
//! inside a single slice or session is logged and the run carries on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Label table or output table could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON rendering failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The capture file does not exist
    #[error("Capture file not found: {path}")]
    CaptureNotFound { path: String },

    /// Neither --folder nor an explicit path names an input
    #[error("No {what} given: pass --folder or the explicit path")]
    MissingInput { what: &'static str },

    /// tshark could not be spawned or its output could not be read
    #[error("Decoding `{filter}` failed: {reason}")]
    Decode { filter: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
