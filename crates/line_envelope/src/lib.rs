#![forbid(unsafe_code)]
//! Line-oriented publishing with optional JSON envelopes.
//!
//! A [`Reader`] pulls `\n`-delimited lines from any [`std::io::Read`] and hands each one to a
//! [`PublishSink`]. With wrapping enabled each line is turned into a JSON envelope that
//! carries a per-run sequence number, the reader's identity, and optional timestamp and
//! message id; the run is bracketed by `startup`/`shutdown` envelopes and input failures are
//! reported downstream as error envelopes.

mod capability;
mod config;
mod envelope;
mod error;
mod reader;
mod scanner;

pub use capability::{
    Clock, IdentifierGenerator, PublishSink, SystemClock, UuidGenerator, WriterSink,
};
pub use config::{ReaderConfig, ReaderLimits, RunIdentity};
pub use envelope::{
    BaseMessage, Envelope, ErrorEnvelope, JsonEnvelope, LineEnvelope, MessageType,
};
pub use error::{PublishError, ReadError, RunError};
pub use reader::{Reader, ReaderBuilder, RunState};
