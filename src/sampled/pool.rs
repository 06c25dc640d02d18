//! Content-addressed pools for the structural metadata of sampled profiles.
//!
//! Each pool assigns the id `offset + 1` to the first record stored under a key and hands that id
//! back for every later record with the same key. Ids start at 1 so that 0 can keep meaning
//! "absent", as it does in pprof.
use std::fmt::Write;
use std::hash::Hash;

use crate::core::config::MappingKeyPolicy;
use crate::core::strings::FxIndexSet;

const MAPSIZE_ROUNDING: u64 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub name: u64,
    pub system_name: u64,
    pub filename: u64,
    pub start_line: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub start: u64,
    pub limit: u64,
    pub offset: u64,
    /// Interned filename if non-empty, else interned build id, else `None`.
    pub build_id_or_file: Option<u64>,
}

impl MappingKey {
    /// `filename` and `build_id` are ids in the merge session's string table, where 0 is "".
    pub fn new(
        policy: MappingKeyPolicy,
        start: u64,
        limit: u64,
        offset: u64,
        filename: u64,
        build_id: u64,
    ) -> MappingKey {
        let build_id_or_file = match (filename, build_id) {
            (0, 0) => None,
            (0, build_id) => Some(build_id),
            (filename, _) => Some(filename),
        };
        match policy {
            MappingKeyPolicy::Exact => MappingKey {
                start,
                limit,
                offset,
                build_id_or_file,
            },
            MappingKeyPolicy::RoundedSize => {
                let size = limit.saturating_sub(start);
                let size = size.div_ceil(MAPSIZE_ROUNDING).saturating_mul(MAPSIZE_ROUNDING);
                MappingKey {
                    start: 0,
                    limit: size,
                    offset,
                    build_id_or_file,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    /// Pooled mapping id, 0 when the location has no mapping.
    pub mapping_id: u64,
    pub address: u64,
    pub lines: String,
    pub is_folded: bool,
}

impl LocationKey {
    /// `lines` holds (pooled function id, line number) pairs, innermost first. A function id of
    /// 0 means the line has no function.
    pub fn new(mapping_id: u64, address: u64, lines: &[(u64, i64)], is_folded: bool) -> Self {
        LocationKey {
            mapping_id,
            address,
            lines: lines_key(lines),
            is_folded,
        }
    }
}

/// Serializes inline lines as `fn|line|fn|line...`, both in hex. An absent function id is an
/// empty token, so `(0, 10)` and `(1, 10)` serialize to `|a` and `1|a`.
fn lines_key(lines: &[(u64, i64)]) -> String {
    let mut key = String::with_capacity(lines.len() * 8);
    for (i, (function_id, line)) in lines.iter().enumerate() {
        if i > 0 {
            key.push('|');
        }
        if *function_id > 0 {
            let _ = write!(key, "{:x}", function_id);
        }
        key.push('|');
        if *line < 0 {
            key.push('-');
        }
        let _ = write!(key, "{:x}", line.unsigned_abs());
    }
    key
}

/// A deduplication table from content key to pooled id, plus the canonical records in id order.
#[derive(Debug)]
pub struct Pool<K, R> {
    keys: FxIndexSet<K>,
    records: Vec<R>,
}

impl<K: Hash + Eq, R> Default for Pool<K, R> {
    fn default() -> Self {
        Pool {
            keys: FxIndexSet::default(),
            records: Vec::new(),
        }
    }
}

impl<K: Hash + Eq, R> Pool<K, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled id for `key`. The first time a key is seen `make` builds its canonical
    /// record from the newly assigned id. Records already pooled are never touched again.
    pub fn put(&mut self, key: K, make: impl FnOnce(u64) -> R) -> u64 {
        let (offset, inserted) = self.keys.insert_full(key);
        let id = offset as u64 + 1;
        if inserted {
            self.records.push(make(id));
        }
        id
    }

    /// The canonical record pooled under `id`.
    pub fn record(&self, id: u64) -> Option<&R> {
        let offset = usize::try_from(id).ok()?.checked_sub(1)?;
        self.records.get(offset)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}
