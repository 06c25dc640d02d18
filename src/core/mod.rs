pub mod config;
pub(crate) mod slicing;
pub mod strings;
pub mod types;
