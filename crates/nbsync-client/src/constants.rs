//! Client configuration constants.
//!
//! Defaults for [`ClientConfig`](crate::ClientConfig) live here.

use std::time::Duration;

/// Delay before retrying a failed authentication. Fixed, retried forever.
pub const AUTH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before retrying a batch-table subscription whose id was invalid.
pub const SUBSCRIBE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the status and sync broadcast channels.
///
/// Slow subscribers that fall further behind than this see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Environment variable that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "NBSYNC_CONFIG";
