use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::capability::{Clock, IdentifierGenerator, PublishSink};
use crate::config::{ReaderConfig, RunIdentity};
use crate::envelope::{BaseMessage, Envelope, MessageType};
use crate::error::{ReadError, RunError};
use crate::scanner::{LineScanner, ScannedLine};

/// Lifecycle of a [`Reader`] as seen from outside.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RunState {
    NotStarted,
    Running,
    Finished,
}

/// Drives a byte source into a publish sink, one line at a time.
///
/// With wrapping enabled every line becomes a JSON envelope and the run is bracketed by
/// `startup` and `shutdown` markers. Sequence numbers restart at 0 on every run and are
/// consumed by every emitted envelope, including error and lifecycle envelopes.
///
/// [`Reader::run`] holds an internal lock for its whole duration: a second call on the same
/// instance blocks until the first has finished.
pub struct Reader<R, P> {
    config: ReaderConfig,
    state: Mutex<RunState>,
    session: Mutex<Session<R, P>>,
}

struct Session<R, P> {
    source: R,
    sink: P,
    sequencer: Sequencer,
}

struct Sequencer {
    identity: RunIdentity,
    clock: Option<Box<dyn Clock>>,
    ids: Option<Box<dyn IdentifierGenerator>>,
    message_count: u64,
}

impl Sequencer {
    fn next_base(&mut self, message_type: MessageType) -> BaseMessage {
        let sequence = self.message_count;
        self.message_count += 1;
        BaseMessage {
            instance_id: self.identity.instance_id.clone(),
            timestamp: self.clock.as_ref().map(|clock| clock.now()),
            sequence,
            message_type,
            message_id: self
                .ids
                .as_ref()
                .map(|ids| ids.generate())
                .unwrap_or_default(),
            reader_name: self.identity.reader_name.clone(),
        }
    }
}

impl<R, P> Reader<R, P>
where
    R: Read,
    P: PublishSink,
{
    pub fn new(source: R, sink: P, config: ReaderConfig) -> Self {
        ReaderBuilder::new(source, sink).config(config).build()
    }

    pub fn builder(source: R, sink: P) -> ReaderBuilder<R, P> {
        ReaderBuilder::new(source, sink)
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Consumes the source until end of stream, publishing every line.
    ///
    /// Returns an error when the source fails or a line cannot be published. Failures to
    /// publish the `startup`/`shutdown` markers or the input-error envelope are logged and
    /// otherwise ignored.
    pub fn run(&self) -> Result<(), RunError> {
        let mut session = lock(&self.session);
        let _finished = FinishOnDrop::start(&self.state);
        session.run(&self.config)
    }

    pub fn into_parts(self) -> (R, P) {
        let session = self
            .session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (session.source, session.sink)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a run `Running` while alive and `Finished` once dropped, including on unwind.
struct FinishOnDrop<'a> {
    state: &'a Mutex<RunState>,
}

impl<'a> FinishOnDrop<'a> {
    fn start(state: &'a Mutex<RunState>) -> Self {
        *lock(state) = RunState::Running;
        Self { state }
    }
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        *lock(self.state) = RunState::Finished;
    }
}

impl<R, P> Session<R, P>
where
    R: Read,
    P: PublishSink,
{
    fn run(&mut self, config: &ReaderConfig) -> Result<(), RunError> {
        self.sequencer.message_count = 0;
        debug!(
            wrap = config.wrap,
            json_input = config.json_input,
            instance_id = %self.sequencer.identity.instance_id,
            "reader run started"
        );

        if config.wrap {
            let startup = Envelope::lifecycle(
                self.sequencer.next_base(MessageType::Startup),
                MessageType::Startup,
            );
            self.publish_best_effort(&startup);
        }

        let mut published = 0usize;
        let mut read_failure = None;
        for scanned in LineScanner::new(&mut self.source, config.limits.max_line_bytes) {
            match scanned {
                ScannedLine::Line { line_number, bytes } => {
                    let payload = if config.wrap {
                        translate(&mut self.sequencer, config.json_input, &bytes)
                    } else {
                        bytes
                    };
                    if let Err(err) = self.sink.publish(&payload) {
                        warn!(line_number, error = %err, "publish failed; aborting run");
                        return Err(RunError::Publish(err));
                    }
                    published += 1;
                }
                ScannedLine::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                } => {
                    let err = ReadError::LineTooLong {
                        observed_bytes,
                        max_line_bytes,
                    };
                    read_failure = Some((line_number, err));
                    break;
                }
                ScannedLine::IoError {
                    line_number,
                    source,
                } => {
                    read_failure = Some((line_number, ReadError::Io(source)));
                    break;
                }
            }
        }

        if let Some((line_number, err)) = read_failure {
            warn!(line_number, error = %err, published, "input stream failed");
            if config.wrap {
                let notice = Envelope::error(
                    self.sequencer.next_base(MessageType::InputReaderError),
                    MessageType::InputReaderError,
                    None,
                    err.to_string(),
                );
                self.publish_best_effort(&notice);
            }
            return Err(RunError::Input(err));
        }

        if config.wrap {
            let shutdown = Envelope::lifecycle(
                self.sequencer.next_base(MessageType::Shutdown),
                MessageType::Shutdown,
            );
            self.publish_best_effort(&shutdown);
        }

        debug!(published, "reader run finished");
        Ok(())
    }

    fn publish_best_effort(&mut self, envelope: &Envelope) {
        let base = envelope.base();
        if let Err(err) = self.sink.publish(&envelope.to_bytes()) {
            warn!(
                sequence = base.sequence,
                message_type = base.message_type.as_str(),
                error = %err,
                "best-effort publish failed"
            );
        }
    }
}

fn translate(sequencer: &mut Sequencer, json_input: bool, line: &[u8]) -> Vec<u8> {
    let envelope = if json_input {
        Envelope::json_or_error(sequencer.next_base(MessageType::Json), line)
    } else {
        Envelope::line(sequencer.next_base(MessageType::Line), line)
    };
    if let Envelope::Error(rejected) = &envelope {
        warn!(
            sequence = rejected.base.sequence,
            error = %rejected.error,
            "input line is not valid JSON"
        );
    }
    envelope.to_bytes()
}

/// Builder for [`Reader`].
pub struct ReaderBuilder<R, P> {
    source: R,
    sink: P,
    config: ReaderConfig,
    clock: Option<Box<dyn Clock>>,
    ids: Option<Box<dyn IdentifierGenerator>>,
}

impl<R, P> ReaderBuilder<R, P>
where
    R: Read,
    P: PublishSink,
{
    pub fn new(source: R, sink: P) -> Self {
        Self {
            source,
            sink,
            config: ReaderConfig::default(),
            clock: None,
            ids: None,
        }
    }

    /// Replaces the whole configuration, including identity and limits.
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn wrap(mut self, enable: bool) -> Self {
        self.config.wrap = enable;
        self
    }

    pub fn json_input(mut self, enable: bool) -> Self {
        self.config.json_input = enable;
        self
    }

    pub fn identity(mut self, identity: RunIdentity) -> Self {
        self.config.identity = identity;
        self
    }

    pub fn max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.config.limits.max_line_bytes = max_line_bytes;
        self
    }

    /// Stamps every envelope with `clock.now()`. Without a clock, `timestamp` is omitted.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Gives every envelope a fresh id. Without a generator, `id` is omitted.
    pub fn id_generator(mut self, ids: impl IdentifierGenerator + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    pub fn build(self) -> Reader<R, P> {
        let sequencer = Sequencer {
            identity: self.config.identity.clone(),
            clock: self.clock,
            ids: self.ids,
            message_count: 0,
        };
        Reader {
            config: self.config,
            state: Mutex::new(RunState::NotStarted),
            session: Mutex::new(Session {
                source: self.source,
                sink: self.sink,
                sequencer,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::panic::{self, AssertUnwindSafe};

    use serde_json::Value;

    use super::*;
    use crate::config::ReaderLimits;
    use crate::error::PublishError;

    #[derive(Default)]
    struct Recorded(Vec<Vec<u8>>);

    impl PublishSink for Recorded {
        fn publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
            self.0.push(data.to_vec());
            Ok(())
        }
    }

    fn collect(reader: Reader<Cursor<Vec<u8>>, Recorded>) -> Vec<Value> {
        let (_, sink) = reader.into_parts();
        sink.0
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    #[test]
    fn sequence_restarts_on_every_run() {
        let reader = Reader::builder(Cursor::new(b"a\nb\n".to_vec()), Recorded::default())
            .wrap(true)
            .build();
        assert_eq!(reader.state(), RunState::NotStarted);

        reader.run().unwrap();
        assert_eq!(reader.state(), RunState::Finished);
        // The cursor is exhausted, so the second run only brackets an empty stream.
        reader.run().unwrap();

        let sequences: Vec<u64> = collect(reader)
            .iter()
            .map(|value| value["sequence"].as_u64().unwrap())
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn identity_and_generators_reach_every_header() {
        let reader = Reader::builder(Cursor::new(b"x".to_vec()), Recorded::default())
            .wrap(true)
            .identity(RunIdentity::new("instance-1", "reader-a"))
            .id_generator(|| "fixed-id".to_string())
            .build();
        reader.run().unwrap();

        let envelopes = collect(reader);
        assert_eq!(envelopes.len(), 3);
        for envelope in &envelopes {
            assert_eq!(envelope["instanceID"], "instance-1");
            assert_eq!(envelope["name"], "reader-a");
            assert_eq!(envelope["id"], "fixed-id");
            assert!(envelope.get("timestamp").is_none());
        }
    }

    #[test]
    fn oversized_line_is_an_input_failure() {
        let config = ReaderConfig {
            wrap: true,
            limits: ReaderLimits { max_line_bytes: 8 },
            ..ReaderConfig::default()
        };
        let source = Cursor::new(b"short\nmuch too long\n".to_vec());
        let reader = Reader::new(source, Recorded::default(), config);
        assert_eq!(reader.config().limits.max_line_bytes, 8);

        let err = reader.run().unwrap_err();
        assert!(matches!(
            err,
            RunError::Input(ReadError::LineTooLong {
                observed_bytes: 13,
                max_line_bytes: 8
            })
        ));

        let envelopes = collect(reader);
        let types: Vec<&str> = envelopes
            .iter()
            .map(|value| value["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["startup", "line", "Error: Input Reader"]);
        assert!(envelopes[2]["error"]
            .as_str()
            .unwrap()
            .starts_with("line too long"));
    }

    struct PanicsOnce {
        armed: bool,
        published: usize,
    }

    impl PublishSink for PanicsOnce {
        fn publish(&mut self, _: &[u8]) -> Result<(), PublishError> {
            if self.armed {
                self.armed = false;
                panic!("sink exploded");
            }
            self.published += 1;
            Ok(())
        }
    }

    #[test]
    fn panicking_sink_still_finishes_the_run() {
        let sink = PanicsOnce {
            armed: true,
            published: 0,
        };
        let reader = Reader::builder(Cursor::new(b"a\n".to_vec()), sink)
            .wrap(true)
            .build();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| reader.run()));
        assert!(outcome.is_err());
        assert_eq!(reader.state(), RunState::Finished);

        // The reader stays usable after the unwind.
        reader.run().unwrap();
        assert_eq!(reader.state(), RunState::Finished);
        let (_, sink) = reader.into_parts();
        assert_eq!(sink.published, 3);
    }
}
