//! Project-wide constants.

use std::time::Duration;

/// Default HTTP listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Default engine binary, relative to the working directory.
pub const DEFAULT_ENGINE_BIN: &str = "./nexus-sus-engine/compiler";

/// Token bucket capacity. Sized for a 512MB engine host.
pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 5;

/// One token is added per refill period, up to capacity.
pub const DEFAULT_RATE_LIMIT_REFILL: Duration = Duration::from_millis(200);

/// Delay between an engine exit and the next spawn.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on one query round trip, lock wait included.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(2000);

/// How long the engine gets to exit after `X` before it is killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Table the bulk loader scans.
pub const INDICATOR_TABLE: &str = "indicadores_sus";

/// Format a duration as whole milliseconds for log lines (e.g. "200ms").
pub fn format_millis(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}
