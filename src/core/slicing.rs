//! Bounds checks shared by the unpackers. Merged artifacts store every input's records back to
//! back, with a per-input count array saying how many each one contributed.
use std::ops::Range;

use crate::core::types::ProfileError;

pub(crate) fn check_index(
    array: &'static str,
    index: usize,
    len: usize,
) -> Result<(), ProfileError> {
    if index >= len {
        return Err(ProfileError::IndexOutOfRange { array, index, len });
    }
    Ok(())
}

/// Range of `counts[index]` entries (times `stride`) following everything earlier inputs
/// contributed.
pub(crate) fn window(
    counts: &[u64],
    index: usize,
    stride: u64,
    available: usize,
    array: &'static str,
) -> Result<Range<usize>, ProfileError> {
    let overflow = || ProfileError::decode(format!("{} counts overflow", array));
    let mut start: u64 = 0;
    for count in &counts[..index] {
        start = count
            .checked_mul(stride)
            .and_then(|n| start.checked_add(n))
            .ok_or_else(overflow)?;
    }
    let end = counts[index]
        .checked_mul(stride)
        .and_then(|n| start.checked_add(n))
        .ok_or_else(overflow)?;
    if end > available as u64 {
        return Err(ProfileError::decode(format!(
            "{} holds {} entries but input {} needs {}..{}",
            array, available, index, start, end
        )));
    }
    Ok(start as usize..end as usize)
}
