/// Application name
pub const APP_NAME: &str = "Rallypoint";

/// Marker prefix for embedded role-update messages
pub const ROLE_UPDATE_MARKER: &str = "ROLE_UPDATE:";

/// Marker prefix for embedded supply-request messages
pub const SUPPLY_REQUEST_MARKER: &str = "SUPPLY_REQUEST:";

/// Marker prefix for embedded emergency-alert messages
pub const EMERGENCY_MARKER: &str = "EMERGENCY:";

/// Prefix carried by every AI-generated reply, used for display and as the
/// loop guard that keeps the responder from answering itself
pub const AI_REPLY_MARKER: &str = "[AI] ";

/// Prefix that introduces a slash command on the local input line
pub const COMMAND_PREFIX: char = '/';

/// Sender name used for locally generated system notices
pub const SYSTEM_SENDER: &str = "system";

/// Retention window for dedup cache entries in seconds
pub const DEDUP_RETENTION_SECS: u64 = 120;

/// Width of the time bucket used to collapse duplicate connection events,
/// in seconds
pub const CONNECTION_BUCKET_SECS: u64 = 5;

/// Width of the time bucket used to debounce AI trigger requests, in seconds
pub const AI_DEBOUNCE_BUCKET_SECS: u64 = 10;

/// Hard cap on distinct dedup cache entries before oldest-first eviction
pub const DEDUP_MAX_ENTRIES: usize = 4096;

/// How many recent messages from the triggering scope are folded into the
/// AI prompt as context
pub const AI_CONTEXT_MESSAGES: usize = 8;
