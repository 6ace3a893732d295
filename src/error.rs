//! Error types for resibox
//!
//! Extractor faults are recoverable (the pipeline degrades), normalizer faults
//! abort the request, boundary faults are surfaced with their message.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Photo bytes are not a decodable image
    #[error("Failed to decode photo: {0}")]
    Decode(String),

    /// OCR engine could not run (missing models, engine fault)
    #[error("Text recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    /// Code scanning subsystem fault (not "no codes found")
    #[error("Barcode scan fault: {0}")]
    BarcodeScanFault(String),

    #[error("Actuator unreachable: {0}")]
    ActuatorUnreachable(String),

    #[error("Actuator did not answer within {0:?}")]
    ActuatorTimeout(Duration),

    /// Telegram Bot API errors
    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline did not finish within {0:?}")]
    PipelineTimeout(Duration),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
