//! Key layout for the entities stored by [`SessionCache`](crate::SessionCache)

/// Prefix for session records
pub const SESSION_PREFIX: &str = "session:";

/// Prefix for rate-limit counters
pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// List holding queued notifications
pub const NOTIFICATIONS_KEY: &str = "notifications";

/// Storage key for a session ID
pub(crate) fn session_key(sid: &str) -> String {
    format!("{}{}", SESSION_PREFIX, sid)
}

/// Conventional rate-limit key for a subject (user ID, IP address, route...)
pub fn rate_limit_key(subject: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, subject)
}

/// Glob patterns swept by the maintenance cleanup
pub(crate) fn cleanup_patterns() -> [String; 2] {
    [format!("{}*", SESSION_PREFIX), format!("{}*", RATE_LIMIT_PREFIX)]
}
