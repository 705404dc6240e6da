//! Crate-wide constants for widgetlink.
//!
//! Centralizes the magic numbers of the transport and session layers so
//! the wire format and process exit contract live in one place.
//!
//! # Categories
//!
//! - **Framing**: frame size limits and read buffer sizing
//! - **Connection**: connect retry defaults
//! - **Exit codes**: process exit contract with the host launcher
//! - **Environment**: variable names read by [`crate::config`]

use std::time::Duration;

// ============================================================================
// Framing
// ============================================================================

/// Size of the little-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame payload size (16 MB).
///
/// A larger declared length means the byte stream is out of sync with the
/// framing, which the bridge treats as a broken transport.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Socket read buffer size (64 KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// Connection
// ============================================================================

/// Default number of connection attempts before the session gives up.
///
/// The host usually creates its socket just before spawning the client,
/// so a handful of quick retries covers the startup race.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default delay between connection attempts, in milliseconds.
pub const DEFAULT_CONNECT_RETRY_MS: u64 = 100;

/// Upper bound for a single retry delay.
pub const MAX_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Exit codes
// ============================================================================

/// Exit code after the host asked the client to shut down.
pub const EXIT_SHUTDOWN: i32 = 0;

/// Exit code after the transport broke (socket error, unexpected close).
pub const EXIT_TRANSPORT_LOST: i32 = 2;

// ============================================================================
// Environment
// ============================================================================

/// Path of the host's Unix socket.
pub const ENV_SOCKET: &str = "WIDGETLINK_SOCKET";

/// `env_logger` filter override.
pub const ENV_LOG: &str = "WIDGETLINK_LOG";

/// Log file path; logs go to stderr when unset.
pub const ENV_LOG_FILE: &str = "WIDGETLINK_LOG_FILE";

/// Configuration directory override.
pub const ENV_CONFIG_DIR: &str = "WIDGETLINK_CONFIG_DIR";

/// Default socket file name inside the temp directory.
pub const DEFAULT_SOCKET_NAME: &str = "widgetlink.sock";
