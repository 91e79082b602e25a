use std::io::Write;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PublishError;

/// Destination for every buffer a reader produces.
///
/// Calls are blocking; the buffer is either accepted or rejected before the call returns.
pub trait PublishSink {
    fn publish(&mut self, data: &[u8]) -> Result<(), PublishError>;
}

impl<F> PublishSink for F
where
    F: FnMut(&[u8]) -> Result<(), PublishError>,
{
    fn publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
        self(data)
    }
}

/// Source of envelope timestamps.
pub trait Clock: Send {
    fn now(&self) -> OffsetDateTime;
}

impl<F> Clock for F
where
    F: Fn() -> OffsetDateTime + Send,
{
    fn now(&self) -> OffsetDateTime {
        self()
    }
}

/// Source of per-envelope message ids.
pub trait IdentifierGenerator: Send {
    fn generate(&self) -> String;
}

impl<F> IdentifierGenerator for F
where
    F: Fn() -> String + Send,
{
    fn generate(&self) -> String {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Random v4 UUIDs in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdentifierGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Writes each published buffer as one `\n`-terminated record and flushes it.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PublishSink for WriterSink<W> {
    fn publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
        self.writer.write_all(data)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
