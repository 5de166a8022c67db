//! Legacy address normalization
//!
//! Device documentation often numbers holding registers from 40001. When more
//! than half of a map uses that numbering it is rewritten to zero-based
//! offsets. Re-applying the rule to an already normalized map is a no-op.

/// Lowest legacy holding-register address
pub const LEGACY_BASE_ZERO: u32 = 40000;

/// Conventional first holding register ("40001")
pub const LEGACY_BASE_ONE: u32 = 40001;

/// Detect the legacy base for a set of addresses, if the map uses one
pub fn detect_legacy_base(addresses: &[u32]) -> Option<u32> {
    if addresses.is_empty() {
        return None;
    }

    let legacy = addresses.iter().filter(|a| **a >= LEGACY_BASE_ZERO).count();
    if legacy * 2 <= addresses.len() {
        return None;
    }

    if addresses.iter().any(|a| *a >= LEGACY_BASE_ONE) {
        Some(LEGACY_BASE_ONE)
    } else {
        Some(LEGACY_BASE_ZERO)
    }
}

/// Rewrite every address at or above the detected base in place
///
/// Returns the base that was subtracted.
pub fn normalize_addresses(addresses: &mut [u32]) -> Option<u32> {
    let base = detect_legacy_base(addresses)?;
    for address in addresses.iter_mut().filter(|a| **a >= base) {
        *address -= base;
    }
    Some(base)
}
