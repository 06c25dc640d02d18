use std::hash::BuildHasherDefault;

pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;

/// Deduplicates strings into one table. Id 0 is always the empty string; every other string gets
/// the next unused id the first time it is seen.
#[derive(Debug, Clone)]
pub struct StringInterner {
    strings: FxIndexSet<String>,
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl StringInterner {
    pub fn new() -> Self {
        let mut strings = FxIndexSet::default();
        strings.insert(String::new());
        StringInterner { strings }
    }

    pub fn intern(&mut self, value: &str) -> u64 {
        match self.strings.get_index_of(value) {
            Some(id) => id as u64,
            None => self.strings.insert_full(value.to_owned()).0 as u64,
        }
    }

    /// Number of distinct strings, counting the empty string at id 0.
    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }

    /// Materializes the table in id order.
    pub fn into_table(self) -> Vec<String> {
        self.strings.into_iter().collect()
    }
}

/// Looks up `id` in a materialized string table, as stored in profiles and artifacts.
pub(crate) fn lookup(table: &[String], id: i64) -> Option<&str> {
    usize::try_from(id)
        .ok()
        .and_then(|id| table.get(id))
        .map(String::as_str)
}
