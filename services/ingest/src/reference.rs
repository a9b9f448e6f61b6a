//! Per-pass reference snapshot.
//!
//! Loaded once at the start of every preview and every commit pass, then
//! read-only while rows are validated. Never cached across passes: data may
//! change between preview and commit, so commit always re-reads.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::entity::EntityType;
use crate::error::Result;
use crate::persistence::{PersistenceStore, ReferenceRecord};

/// Case-folded key used for every lookup in the index.
pub fn lookup_key(value: &str) -> String {
    value.trim().to_uppercase()
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    lookup: HashMap<String, i32>,
    existing_keys: HashSet<String>,
    retired_keys: HashSet<String>,
}

fn key_set(keys: Vec<String>) -> HashSet<String> {
    keys.iter()
        .map(|k| lookup_key(k))
        .filter(|k| !k.is_empty())
        .collect()
}

impl ReferenceIndex {
    pub fn new(references: Vec<ReferenceRecord>, existing_keys: Vec<String>) -> Self {
        Self {
            lookup: references
                .into_iter()
                .map(|r| (lookup_key(&r.key), r.id))
                .collect(),
            existing_keys: key_set(existing_keys),
            retired_keys: HashSet::new(),
        }
    }

    /// Keys of inactive records: not "existing", but not free either.
    pub fn with_retired_keys(mut self, keys: Vec<String>) -> Self {
        self.retired_keys = key_set(keys);
        self
    }

    /// Query the store for active reference records and active business keys.
    pub async fn build(store: &dyn PersistenceStore, entity: EntityType) -> Result<Self> {
        let references = store.active_references(entity).await?;
        let keys = store.active_keys(entity).await?;
        let retired = store.retired_keys(entity).await?;
        let index = Self::new(references, keys).with_retired_keys(retired);
        debug!(
            entity = %entity,
            references = index.lookup.len(),
            existing_keys = index.existing_keys.len(),
            retired_keys = index.retired_keys.len(),
            "reference index built"
        );
        Ok(index)
    }

    /// Identifier for a reference value, compared case-insensitively.
    pub fn resolve(&self, value: &str) -> Option<i32> {
        self.lookup.get(&lookup_key(value)).copied()
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.existing_keys.contains(&lookup_key(key))
    }

    pub fn key_retired(&self, key: &str) -> bool {
        self.retired_keys.contains(&lookup_key(key))
    }
}

/// Business keys already accepted earlier in the same file.
#[derive(Debug, Default)]
pub struct SeenKeys(HashSet<String>);

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key; false if it had already been seen in this pass.
    pub fn insert(&mut self, key: &str) -> bool {
        self.0.insert(lookup_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(&lookup_key(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
