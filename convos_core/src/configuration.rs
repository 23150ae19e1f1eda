use convos_common::time::{Duration, NS_IN_SEC};

/// Interval at which the expiration reaper sweeps.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// Identities younger than this are never reaped, to avoid racing a
/// conversation still being created on them.
pub const IDENTITY_GRACE_NS: i64 = 30 * NS_IN_SEC;

/// Interval between join-request scans on an identity's DM channel.
pub const JOIN_SCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Delay before restarting a conversation stream that ended or errored.
pub const STREAM_RESTART_DELAY: Duration = Duration::from_secs(1);
