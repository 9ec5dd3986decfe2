//! # System Interaction Layer
//!
//! Everything that touches a real OS process.
//!
//! ## Modules
//!
//! - **`launcher`**: spawns the adapter with a fully composed environment and
//!   tracks its exit. Owns the child process through a background observer so
//!   that termination requests and exit notification never race.
//! - **`matcher`**: scans the adapter's standard output for a pattern, with a
//!   timeout and end-of-stream detection.
//! - **`output_log`**: passive sinks that receive every output line and the
//!   lifecycle notices.

pub mod launcher;
pub mod matcher;
pub mod output_log;
