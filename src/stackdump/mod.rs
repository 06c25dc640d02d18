//! Goroutine stack dumps: the `debug=1` text parser and writer, and the merger/unpacker pair.
//!
//! Stack dumps are only merged at the string level. Their stacks rarely repeat across captures,
//! so each stack is stored once per input and the function names and filenames its frames
//! reference go into one shared table.

pub mod merger;
pub mod parser;
pub mod unpacker;

pub use crate::proto::profpack::{Frame, MergedStackDump, StackDump, StackTrace};
pub use self::merger::{merge, StackDumpMerger};
pub use self::parser::{parse, parse_stack_dump, write_debug_text};
pub use self::unpacker::{unpack, StackDumpUnpacker};
