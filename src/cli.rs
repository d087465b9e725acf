//! Command line interface for the `batchframe` inspector binary.
//!
//! Kept free of library types so the build script can include it to render
//! the man page.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Header text encodings accepted on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    /// UTF-8.
    #[default]
    Utf8,
    /// ISO-8859-1.
    Latin1,
    /// US-ASCII.
    Ascii,
}

/// Command line arguments for the `batchframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "batchframe",
    version,
    about = "Print the structure of a multipart batch payload"
)]
pub struct Cli {
    /// Payload file; reads standard input when omitted or `-`.
    pub file: Option<PathBuf>,

    /// Outer batch boundary.
    #[arg(short, long)]
    pub boundary: String,

    /// Treat parts as responses rather than requests.
    #[arg(long)]
    pub response: bool,

    /// Encoding of header text.
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,

    /// URI of the batch request, used to resolve relative targets.
    #[arg(long)]
    pub base_uri: Option<String>,

    /// Bytes requested from the input per read.
    #[arg(long)]
    pub refill_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, EncodingArg};

    #[test]
    fn parses_boundary_and_defaults() {
        let cli = Cli::parse_from(["batchframe", "payload.txt", "--boundary", "batch_1"]);
        assert_eq!(cli.boundary, "batch_1");
        assert_eq!(cli.file.as_deref(), Some(std::path::Path::new("payload.txt")));
        assert!(!cli.response);
        assert_eq!(cli.encoding, EncodingArg::Utf8);
    }

    #[test]
    fn parses_response_options() {
        let cli = Cli::parse_from([
            "batchframe",
            "-b",
            "batchresponse_1",
            "--response",
            "--encoding",
            "latin1",
            "--base-uri",
            "http://host/svc/$batch",
        ]);
        assert!(cli.response);
        assert_eq!(cli.file, None);
        assert_eq!(cli.encoding, EncodingArg::Latin1);
        assert_eq!(cli.base_uri.as_deref(), Some("http://host/svc/$batch"));
    }

    #[test]
    fn boundary_is_required() {
        assert!(Cli::try_parse_from(["batchframe", "payload.txt"]).is_err());
    }
}
