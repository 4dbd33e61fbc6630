// Queue processor constants (no magic values)
use std::time::Duration;

/// Default interval between ticks (5s)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Sleep duration after a failed tick before trying again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
