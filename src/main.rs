//! Inspector binary for batch payloads.
//!
//! Reads a payload from a file or standard input and prints one line per
//! reader transition.

mod cli;

use std::{
    error::Error,
    fs::File,
    io::{self, Read, Write},
    path::Path,
    process::ExitCode,
};

use batchframe::{
    BatchConfig,
    BatchReaderState,
    BlockingBatchReader,
    HeaderEncoding,
    MessageKind,
};
use clap::Parser;
use url::Url;

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("inspection failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn config(cli: &cli::Cli) -> Result<BatchConfig, Box<dyn Error>> {
    let mut config = BatchConfig::default().with_encoding(match cli.encoding {
        cli::EncodingArg::Utf8 => HeaderEncoding::Utf8,
        cli::EncodingArg::Latin1 => HeaderEncoding::Latin1,
        cli::EncodingArg::Ascii => HeaderEncoding::Ascii,
    });
    if cli.response {
        config = config.with_message_kind(MessageKind::Response);
    }
    if let Some(base) = &cli.base_uri {
        config = config.with_base_uri(Url::parse(base)?);
    }
    if let Some(size) = cli.refill_size {
        config = config.with_refill_size(size);
    }
    Ok(config)
}

fn run(cli: &cli::Cli) -> Result<(), Box<dyn Error>> {
    let input: Box<dyn Read> = match &cli.file {
        Some(path) if path != Path::new("-") => Box::new(File::open(path)?),
        _ => Box::new(io::stdin().lock()),
    };
    let mut reader = BlockingBatchReader::new(input, &cli.boundary, config(cli)?);
    let mut out = io::stdout().lock();
    let mut operations = 0_usize;

    while reader.read()? {
        let indent = if reader.changeset_boundary().is_some() { "  " } else { "" };
        match reader.state() {
            BatchReaderState::Operation => {
                let (label, content_id) = reader
                    .operation()
                    .map(|op| (op.to_string(), op.content_id().map(str::to_owned)))
                    .unwrap_or_default();
                let mut stream = reader.content_stream()?;
                let length = io::copy(&mut stream, &mut io::sink())?;
                stream.dispose()?;
                operations += 1;
                match content_id {
                    Some(id) => writeln!(out, "{indent}{label} [Content-ID {id}] {length} bytes")?,
                    None => writeln!(out, "{indent}{label} {length} bytes")?,
                }
            }
            BatchReaderState::ChangesetStart => writeln!(
                out,
                "changeset {}",
                reader.changeset_boundary().unwrap_or_default()
            )?,
            BatchReaderState::ChangesetEnd => writeln!(out, "end changeset")?,
            _ => {}
        }
    }
    log::info!("batch complete with {operations} operations");
    writeln!(out, "{operations} operations")?;
    Ok(())
}
