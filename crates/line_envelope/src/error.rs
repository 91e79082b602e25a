use std::error::Error as StdError;

use thiserror::Error;

/// Failure while pulling lines out of the byte source.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("line too long (observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})")]
    LineTooLong {
        observed_bytes: usize,
        max_line_bytes: usize,
    },
}

/// Rejection reported by a [`crate::PublishSink`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct PublishError(Box<dyn StdError + Send + Sync + 'static>);

impl PublishError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self(source.into())
    }
}

impl From<std::io::Error> for PublishError {
    fn from(source: std::io::Error) -> Self {
        Self::new(source)
    }
}

/// Reasons a [`crate::Reader::run`] call ends without reaching a clean end of stream.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unable to read input stream: {0}")]
    Input(#[source] ReadError),
    #[error("unable to publish message: {0}")]
    Publish(#[source] PublishError),
}
