//! Zenoh driver for the CrossWing Nav2 mobile base.
//!
//! The base is controlled over its line-oriented "turtle" TCP interface.
//! [`turtle`] speaks the protocol, [`odometry`] turns absolute pose samples
//! into continuous odometry, and [`supervisor`] keeps the connection alive
//! without breaking the published trajectory. [`runtime`] wires these to
//! zenoh topics.

pub mod config;
pub mod messages;
pub mod odometry;
pub mod runtime;
pub mod supervisor;
pub mod turtle;
