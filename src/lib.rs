//! profpack merges many execution profiles that share a schema into one compact artifact and
//! reconstructs any single input from it on demand.
//!
//! Two profile shapes are supported:
//!
//! * sampled profiles in the pprof schema, whose functions, mappings, locations and strings are
//!   pooled by content so that metadata repeated across inputs is stored once;
//! * goroutine stack dumps in the `debug=1` text format, whose stacks are concatenated and whose
//!   frame strings share one table.
//!
//! A third, opaque path stores pre-encoded blobs side by side without interpreting them.
//!
//! ```no_run
//! use profpack::codec::Artifact;
//! use profpack::sampled::{merge, MergedProfile};
//!
//! # use profpack::proto::pprofs::Profile;
//! # fn example(inputs: Vec<Profile>) -> Result<(), profpack::ProfileError> {
//! let merged = merge(&inputs, &profpack::Config::default())?;
//! let mut bytes = Vec::new();
//! merged.write_compressed(&mut bytes, 6)?;
//!
//! let second = MergedProfile::unpack_raw(&bytes, 1)?;
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod blob;
pub mod codec;
pub mod core;
pub mod proto;
pub mod sampled;
pub mod stackdump;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::codec::{Artifact, Merged};
pub use crate::core::config::{Config, MappingKeyPolicy};
pub use crate::core::types::{ProfileError, ProfileKind};
