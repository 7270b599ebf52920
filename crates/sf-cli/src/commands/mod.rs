//! Command implementations.

mod decode;
mod metadata;

pub use decode::run_decode;
pub use metadata::{run_metadata, summarize, MetadataSummary};
