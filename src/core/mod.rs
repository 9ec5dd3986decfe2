// src/core/mod.rs

pub mod environment;
pub mod expander;
pub mod params;
pub mod platform;
pub mod session;
pub mod settings;
