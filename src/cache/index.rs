use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::key::{encode_key, entity_key, Entity, FieldValue};

pub type IdFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Lookup of single entities by a unique key such as an id or a
/// `(streamId, commitHash)` pair. Entities missing a key field are ignored.
pub struct UniqueIndex<T> {
    fields: Vec<&'static str>,
    data: HashMap<String, T>,
    enabled: bool,
}

impl<T: Entity> UniqueIndex<T> {
    pub fn new(fields: Vec<&'static str>) -> Self {
        Self {
            fields,
            data: HashMap::new(),
            enabled: true,
        }
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn invalidate(&mut self) {
        self.data.clear();
    }

    /// Insert or replace `entity`. When the indexed value differs from
    /// `old`'s, the stale key is dropped first.
    pub fn set(&mut self, entity: &T, old: Option<&T>) {
        if !self.enabled {
            return;
        }
        let Some(key) = entity_key(entity, &self.fields) else {
            return;
        };
        if let Some(old_key) = old.and_then(|o| entity_key(o, &self.fields)) {
            if old_key != key {
                self.data.remove(&old_key);
            }
        }
        self.data.insert(key, entity.clone());
    }

    pub fn get(&self, values: &[FieldValue]) -> Option<&T> {
        self.data.get(&encode_key(values))
    }

    pub fn has(&self, values: &[FieldValue]) -> bool {
        self.data.contains_key(&encode_key(values))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Groups of entities sharing a key, e.g. all markers of one stream.
///
/// A group must be seeded with its complete membership via
/// [`GroupIndex::init_group`]. Reading an uninitialized group yields `None`
/// (unknown, as opposed to empty) and writes into it are dropped.
pub struct GroupIndex<T> {
    fields: Vec<&'static str>,
    groups: HashMap<String, BTreeMap<String, T>>,
    id_fn: IdFn<T>,
    enabled: bool,
}

impl<T: Entity> GroupIndex<T> {
    pub fn new(fields: Vec<&'static str>, id_fn: Option<IdFn<T>>) -> Self {
        Self {
            fields,
            groups: HashMap::new(),
            id_fn: id_fn.unwrap_or_else(|| Arc::new(|e: &T| e.id())),
            enabled: true,
        }
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn invalidate(&mut self) {
        self.groups.clear();
    }

    pub fn is_initialized(&self, values: &[FieldValue]) -> bool {
        self.groups.contains_key(&encode_key(values))
    }

    /// Members ordered by identity, or `None` if the group was never initialized.
    pub fn get_group(&self, values: &[FieldValue]) -> Option<Vec<T>> {
        self.groups
            .get(&encode_key(values))
            .map(|group| group.values().cloned().collect())
    }

    /// Add or update `entity` in its group. If `old` sat in a different
    /// group it is removed from there.
    pub fn set(&mut self, entity: &T, old: Option<&T>) {
        if !self.enabled {
            return;
        }
        let key = entity_key(entity, &self.fields);

        if let Some(old) = old {
            let old_key = entity_key(old, &self.fields);
            if old_key.is_some() && old_key != key {
                let old_id = (self.id_fn)(old);
                if let Some(group) = old_key.and_then(|k| self.groups.get_mut(&k)) {
                    group.remove(&old_id);
                }
            }
        }

        if let Some(group) = key.and_then(|k| self.groups.get_mut(&k)) {
            group.insert((self.id_fn)(entity), entity.clone());
        }
    }

    /// Seed a group. A group that is already initialized is left untouched.
    pub fn init_group(&mut self, values: &[FieldValue], entities: &[T]) {
        if !self.enabled {
            return;
        }
        let key = encode_key(values);
        if self.groups.contains_key(&key) {
            return;
        }
        let group = entities
            .iter()
            .map(|e| ((self.id_fn)(e), e.clone()))
            .collect();
        self.groups.insert(key, group);
    }
}
