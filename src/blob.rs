//! Pass-through merging for profiles that should not be interpreted: every blob is stored as is,
//! in input order, and unpacking hands the same bytes back.

use crate::core::types::ProfileError;
pub use crate::proto::profpack::MergedBlobs;

pub fn merge<B: AsRef<[u8]>>(blobs: &[B]) -> MergedBlobs {
    let profiles: Vec<Vec<u8>> = blobs.iter().map(|b| b.as_ref().to_vec()).collect();
    debug!(
        "merged {} opaque profiles, {} bytes",
        profiles.len(),
        profiles.iter().map(Vec::len).sum::<usize>()
    );
    MergedBlobs { profiles }
}

pub fn unpack(merged: &MergedBlobs, index: usize) -> Result<&[u8], ProfileError> {
    merged
        .profiles
        .get(index)
        .map(Vec::as_slice)
        .ok_or(ProfileError::IndexOutOfRange {
            array: "profiles",
            index,
            len: merged.profiles.len(),
        })
}
