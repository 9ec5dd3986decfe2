// src/constants.rs

//! Fixed names and values shared across the crate.

/// Executable launched when the `executable` setting is absent.
pub const DEFAULT_EXECUTABLE: &str = "lldb";

/// Regex the adapter's stdout is scanned with. Group 1 is the port.
pub const PORT_ANNOUNCEMENT_PATTERN: &str = r"^Listening on port (\d+)\s";

/// Directory (relative to the extension root) holding the adapter scripts.
pub const ADAPTER_MODULE_DIR: &str = "adapter";

/// Directory placed in front of `PATH` on darwin so the system Python is found
/// before any Homebrew one.
pub const DARWIN_SYSTEM_BIN_DIR: &str = "/usr/bin";

/// Name of the search-path environment variable.
pub const PATH_VAR: &str = "PATH";

/// Name of the application directory inside the user's config directory.
pub const APP_CONFIG_DIR: &str = "adapter-launcher";

/// Name of the settings file inside [`APP_CONFIG_DIR`].
pub const SETTINGS_FILENAME: &str = "settings.toml";

/// Log target used for mirrored adapter output and lifecycle notices.
pub const ADAPTER_LOG_TARGET: &str = "adapter";

/// Default handshake timeout used by the command line, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
