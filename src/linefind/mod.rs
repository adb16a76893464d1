/// Line-finder integration module
///
/// This module handles:
/// - Describing a line-finder run for one image (job.rs)
/// - Building the command line and running the external binary (invoker.rs)

pub mod invoker;
pub mod job;

pub use invoker::{Invocation, LineFindError, LineFinder, DEFAULT_LINE_FINDER};
pub use job::{LineFindItem, TimestampSource, UnknownTimestampSource};
