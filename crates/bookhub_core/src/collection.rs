use std::collections::HashMap;

use crate::{Record, RecordKey};

/// Deduplicated, insertion-ordered accumulator of records.
///
/// Entries are never replaced: the first record seen for a key is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    records: Vec<Record>,
    index: HashMap<RecordKey, usize>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Inserts the record unless its key is already present.
    pub fn insert(&mut self, record: Record) -> bool {
        let key = record.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.records.len());
        self.records.push(record);
        true
    }

    /// Folds a candidate batch in place and returns how many records were new.
    pub fn absorb<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let mut inserted = 0;
        for record in candidates {
            if self.insert(record) {
                inserted += 1;
            }
        }
        inserted
    }
}

impl FromIterator<Record> for Collection {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut collection = Collection::new();
        collection.absorb(iter);
        collection
    }
}

/// Pure merge: returns `collection` extended with every candidate whose key is new.
pub fn merge<I>(mut collection: Collection, candidates: I) -> Collection
where
    I: IntoIterator<Item = Record>,
{
    collection.absorb(candidates);
    collection
}
