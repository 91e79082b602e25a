/// Immutable identity stamped on every envelope a reader emits.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RunIdentity {
    pub instance_id: String,
    pub reader_name: String,
}

impl RunIdentity {
    pub fn new(instance_id: impl Into<String>, reader_name: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            reader_name: reader_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReaderLimits {
    /// Longest accepted line, excluding the delimiter. Longer lines fail the read.
    pub max_line_bytes: usize,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ReaderConfig {
    /// Wrap every line in an envelope and emit startup/shutdown markers.
    pub wrap: bool,
    /// Embed wrapped lines as JSON `data` instead of a string `value`.
    pub json_input: bool,
    pub identity: RunIdentity,
    pub limits: ReaderLimits,
}
