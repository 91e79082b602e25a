mod settings;

use std::{
    fs::OpenOptions,
    io::{self, BufWriter, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use line_envelope::{Reader, RunError, SystemClock, UuidGenerator, WriterSink};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use settings::{Args, Settings, SettingsError};

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to open output `{path}`: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Run(#[from] RunError),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "linecast failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let settings = Settings::resolve(args)?;
    settings.log();

    let stdin = io::stdin().lock();
    match &settings.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| Error::Output {
                    path: path.clone(),
                    source,
                })?;
            publish(&settings, stdin, BufWriter::new(file))
        }
        None => publish(&settings, stdin, io::stdout().lock()),
    }
}

fn publish<R: Read, W: Write>(settings: &Settings, source: R, out: W) -> Result<(), Error> {
    let instance_id = Uuid::new_v4().to_string();
    info!(instance_id = %instance_id, "publishing input");

    let reader = Reader::builder(source, WriterSink::new(out))
        .config(settings.reader_config(instance_id))
        .clock(SystemClock)
        .id_generator(UuidGenerator)
        .build();
    reader.run()?;

    info!("input closed");
    Ok(())
}
