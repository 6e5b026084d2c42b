// Turtle interface for the CrossWing Nav2 base
//
// Provides:
// - Command encoding (radians in the API, degrees on the wire)
// - Filtered line reading of replies, skipping '|' / '+' chatter
// - A blocking client owning one TCP connection

mod client;
pub mod command;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{ConnectOptions, LINE_CHUNK, Result, TurtleClient, TurtleError};
pub use command::{Command, PositionEstimate};
