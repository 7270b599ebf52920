//! # sf-cli
//!
//! Command-line tools for SAML federation operators:
//! - publishing an authority's metadata from its configuration
//! - inspecting partner metadata documents
//! - decoding HTTP-Redirect and HTTP-POST binding messages

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use error::{CliError, CliResult};
