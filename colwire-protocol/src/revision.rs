//! Protocol revisions at which optional fields appear on the wire.
//!
//! Both sides encode for the lower of the two revisions exchanged in the handshake.

/// The revision this client speaks.
pub const CLIENT_REVISION: u64 = 54405;

pub const MIN_REVISION_WITH_TEMPORARY_TABLES: u64 = 50264;
pub const MIN_REVISION_WITH_TOTAL_ROWS_IN_PROGRESS: u64 = 51554;
pub const MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
pub const MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
pub const MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
pub const MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
pub const MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54372;
pub const MIN_REVISION_WITH_VERSION_PATCH: u64 = 54401;
pub const MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
