use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::{builder::BoolishValueParser, Parser};
use line_envelope::{ReaderConfig, ReaderLimits, RunIdentity};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_NAME: &str = "linecast";

/// Command-line flags. Each one falls back to its environment variable, then to the
/// `--config` file, then to the built-in default.
#[derive(Debug, Parser)]
#[command(name = "linecast")]
#[command(about = "Publish stdin line by line, optionally wrapped in JSON envelopes")]
pub struct Args {
    /// TOML file with `wrap`, `json_input`, `name`, `output` and `max_line_bytes` keys.
    #[arg(long, env = "LINECAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Wrap input in an outer message.
    #[arg(
        long,
        env = "LINECAST_WRAP",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub wrap: Option<bool>,

    /// Treat input records as JSON and embed them without quoting.
    #[arg(
        long = "json",
        env = "LINECAST_JSONINPUT",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub json_input: Option<bool>,

    /// Publisher name carried in every envelope.
    #[arg(long, env = "LINECAST_NAME")]
    pub name: Option<String>,

    /// Append records to this file instead of writing them to stdout.
    #[arg(long, env = "LINECAST_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Longest accepted input line in bytes.
    #[arg(long, env = "LINECAST_MAX_LINE_BYTES")]
    pub max_line_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    wrap: Option<bool>,
    json_input: Option<bool>,
    name: Option<String>,
    output: Option<PathBuf>,
    max_line_bytes: Option<usize>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("max_line_bytes must be greater than zero")]
    ZeroLineLimit,
}

/// Effective configuration after layering flags, environment, file and defaults.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    pub wrap: bool,
    pub json_input: bool,
    pub name: String,
    pub output: Option<PathBuf>,
    pub max_line_bytes: usize,
}

impl Settings {
    pub fn resolve(args: Args) -> Result<Self, SettingsError> {
        let file = match &args.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let max_line_bytes = args
            .max_line_bytes
            .or(file.max_line_bytes)
            .unwrap_or(ReaderLimits::default().max_line_bytes);
        if max_line_bytes == 0 {
            return Err(SettingsError::ZeroLineLimit);
        }

        Ok(Self {
            wrap: args.wrap.or(file.wrap).unwrap_or(false),
            json_input: args.json_input.or(file.json_input).unwrap_or(false),
            name: args
                .name
                .or(file.name)
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            output: args.output.or(file.output),
            max_line_bytes,
        })
    }

    pub fn reader_config(&self, instance_id: String) -> ReaderConfig {
        ReaderConfig {
            wrap: self.wrap,
            json_input: self.json_input,
            identity: RunIdentity::new(instance_id, self.name.clone()),
            limits: ReaderLimits {
                max_line_bytes: self.max_line_bytes,
            },
        }
    }

    pub fn log(&self) {
        let output = self
            .output
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        info!(output = %output, "output");
        info!(wrap = self.wrap, "wrap");
        info!(json_input = self.json_input, "json input");
        info!(name = %self.name, "publisher name");
        info!(max_line_bytes = self.max_line_bytes, "line limit");
    }
}

fn load_file(path: &Path) -> Result<FileConfig, SettingsError> {
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
