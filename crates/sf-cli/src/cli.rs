//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// sf - SAML federation operator tool.
#[derive(Debug, Parser)]
#[command(name = "sf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Metadata commands.
    #[command(subcommand)]
    Metadata(MetadataCommand),

    /// Binding message decoding.
    #[command(subcommand)]
    Decode(DecodeCommand),
}

/// Metadata commands.
#[derive(Debug, Subcommand)]
pub enum MetadataCommand {
    /// Build an authority from its configuration and print its signed metadata.
    Publish {
        /// Federation configuration file (TOML). Falls back to `SF_*`
        /// environment variables when omitted.
        #[arg(short, long, env = "SF_CONFIG")]
        config: Option<PathBuf>,

        /// Register the identity provider role.
        #[arg(long)]
        idp: bool,

        /// Register the service provider role.
        #[arg(long)]
        sp: bool,

        /// Write the document to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Parse a metadata document and summarize it.
    Inspect {
        /// Metadata file.
        file: PathBuf,
    },
}

/// Decode commands.
#[derive(Debug, Subcommand)]
pub enum DecodeCommand {
    /// Decode an HTTP-Redirect URL.
    Redirect {
        /// Full URL including the query string.
        url: String,
    },

    /// Decode an HTTP-POST form value.
    Post {
        /// Base64 `SAMLRequest` or `SAMLResponse` value.
        message: String,

        /// The value came from a `SAMLRequest` field.
        #[arg(long)]
        request: bool,

        /// The `RelayState` field, if any.
        #[arg(long)]
        relay_state: Option<String>,
    },
}
