//! Merging and unpacking of pprof sampled profiles.
//!
//! Mappings, locations and functions are pooled by content across every input, and each input's
//! samples are stored in order together with how many of them (and of their sample types) it
//! contributed. That is enough to slice any single input back out without decoding the others.

use prost::Message;

use crate::codec;
use crate::core::types::ProfileError;
use crate::proto::pprofs::Profile;

pub mod merger;
pub mod pool;
pub mod unpacker;

pub use crate::proto::profpack::MergedProfile;
pub use self::merger::{merge, ProfileMerger};
pub use self::unpacker::{unpack, ProfileUnpacker};

/// Decodes one pprof profile as written by pprof tooling, gzipped or not.
pub fn decode_profile(raw: &[u8]) -> Result<Profile, ProfileError> {
    let bytes = codec::gunzip_if_compressed(raw)?;
    Ok(Profile::decode(bytes.as_ref())?)
}
