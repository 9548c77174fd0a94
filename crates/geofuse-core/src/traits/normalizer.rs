//! Provider response normalizer trait

use crate::record::LocationRecord;

/// Maps one provider's raw response to the common record
///
/// One implementation per known provider response shape. A normalizer must
/// return `Error::Parse` for malformed payloads, provider error payloads and
/// records violating the coordinate invariant; it never guesses values for
/// missing fields.
pub trait Normalizer: Send + Sync {
    /// Normalize a raw response body
    ///
    /// `provider` is the registered provider name; it becomes the record's
    /// `source`.
    fn normalize(&self, provider: &str, raw: &[u8]) -> crate::Result<LocationRecord>;
}
