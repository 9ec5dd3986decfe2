//! # adapter-launcher
//!
//! Starts a debugger as a TCP debug adapter and waits for it to announce the
//! port it listens on.
//!
//! - **`core`**: pure building blocks (placeholder expansion, environment
//!   composition, platform policy, settings, parameter blob) and the session
//!   coordinator that ties everything together.
//! - **`system`**: everything that touches an OS process (spawning, exit
//!   tracking, output scanning and output mirroring).

pub mod cli;
pub mod constants;
pub mod core;
pub mod system;
