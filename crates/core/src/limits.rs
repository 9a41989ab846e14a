//! Size limits for inbound queue messages.
//!
//! Field-level length limits live in the entity catalogue next to each
//! field; these bound the raw message before it is parsed.

use crate::error::{Error, Result};

/// Maximum raw message size in bytes (256KB).
///
/// HR records are flat and small; anything larger is a producer bug.
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;

/// Maximum number of top-level fields in a record.
pub const MAX_RECORD_FIELDS: usize = 512;

/// Maximum length of a normalized identifier.
pub const MAX_ID_LEN: usize = 128;

/// Validates a raw message size before deserialization.
pub fn validate_message_size(raw_bytes: &[u8]) -> Result<()> {
    if raw_bytes.len() > MAX_MESSAGE_BYTES {
        return Err(Error::unclassified(format!(
            "message {}KB exceeds {}KB limit",
            raw_bytes.len() / 1024,
            MAX_MESSAGE_BYTES / 1024
        )));
    }
    Ok(())
}
