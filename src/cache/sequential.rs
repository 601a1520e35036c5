use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::error::CacheError;

use super::key::{encode_key, entity_key, Entity, FieldValue};

/// A window `[seq_start, seq_end)` of a sequenced group. Each slot holds the
/// entity with that sequence number, or `None` where the cache has a hole.
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialSlice<T> {
    pub seq_start: u64,
    pub seq_end: u64,
    pub entries: Vec<Option<T>>,
}

impl<T> SequentialSlice<T> {
    fn empty(at: u64) -> Self {
        Self {
            seq_start: at,
            seq_end: at,
            entries: Vec::new(),
        }
    }

    /// Known entities in ascending sequence order.
    pub fn data(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().flatten()
    }

    /// Maximal runs of missing sequence numbers, ascending.
    pub fn gaps(&self) -> Vec<Range<u64>> {
        let mut gaps = Vec::new();
        let mut open: Option<u64> = None;
        for (offset, entry) in self.entries.iter().enumerate() {
            let seq = self.seq_start + offset as u64;
            match (entry, open) {
                (None, None) => open = Some(seq),
                (Some(_), Some(start)) => {
                    gaps.push(start..seq);
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            gaps.push(start..self.seq_end);
        }
        gaps
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }
}

#[derive(Debug)]
struct SequencedGroup<T> {
    data: BTreeMap<u64, T>,
    max_seq: u64,
}

impl<T> SequencedGroup<T> {
    fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            max_seq: 0,
        }
    }

    fn insert(&mut self, seq: u64, entity: T) {
        self.max_seq = self.max_seq.max(seq);
        self.data.insert(seq, entity);
    }
}

/// Groups whose members carry a 1-based sequence number, e.g. posts in a
/// stream. Tracks the highest sequence seen per group so slices and tails can
/// be bounded and their holes reported.
pub struct GroupSequentialIndex<T> {
    fields: Vec<&'static str>,
    seq_field: &'static str,
    groups: HashMap<String, SequencedGroup<T>>,
    enabled: bool,
}

impl<T: Entity> GroupSequentialIndex<T> {
    pub fn new(fields: Vec<&'static str>, seq_field: &'static str) -> Self {
        Self {
            fields,
            seq_field,
            groups: HashMap::new(),
            enabled: true,
        }
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn seq_field(&self) -> &'static str {
        self.seq_field
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

    pub fn max_seq(&self, values: &[FieldValue]) -> Option<u64> {
        self.groups.get(&encode_key(values)).map(|g| g.max_seq)
    }

    fn seq_of(&self, entity: &T) -> Result<u64, CacheError> {
        entity
            .field(self.seq_field)
            .and_then(|v| v.as_seq())
            .ok_or_else(|| CacheError::InvalidSequence {
                id: entity.id(),
                field: self.seq_field.to_string(),
            })
    }

    /// Fails if `set(entity, ..)` would reject the entity: it belongs to an
    /// initialized group but has no usable sequence number.
    pub fn check(&self, entity: &T) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        match entity_key(entity, &self.fields) {
            Some(key) if self.groups.contains_key(&key) => self.seq_of(entity).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Fails if `init_group(values, entities)` would reject any member.
    pub fn check_init(&self, values: &[FieldValue], entities: &[T]) -> Result<(), CacheError> {
        if !self.enabled || self.is_initialized(values) {
            return Ok(());
        }
        entities.iter().try_for_each(|e| self.seq_of(e).map(|_| ()))
    }

    /// Add or update `entity` in its group, if that group is initialized.
    /// A prior version of the entity at another group or sequence is removed.
    /// Nothing changes when the entity is rejected.
    pub fn set(&mut self, entity: &T, old: Option<&T>) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let target = match entity_key(entity, &self.fields) {
            Some(key) if self.groups.contains_key(&key) => Some((key, self.seq_of(entity)?)),
            _ => None,
        };

        if let Some(old) = old {
            if let (Some(old_key), Ok(old_seq)) = (entity_key(old, &self.fields), self.seq_of(old)) {
                let moved = target.as_ref() != Some(&(old_key.clone(), old_seq));
                if moved {
                    if let Some(group) = self.groups.get_mut(&old_key) {
                        group.data.remove(&old_seq);
                    }
                }
            }
        }

        if let Some((key, seq)) = target {
            if let Some(group) = self.groups.get_mut(&key) {
                group.insert(seq, entity.clone());
            }
        }
        Ok(())
    }

    /// Seed a group with whatever members are known. Already initialized
    /// groups are left untouched.
    pub fn init_group(&mut self, values: &[FieldValue], entities: &[T]) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let key = encode_key(values);
        if self.groups.contains_key(&key) {
            return Ok(());
        }
        let mut group = SequencedGroup::new();
        for entity in entities {
            group.insert(self.seq_of(entity)?, entity.clone());
        }
        self.groups.insert(key, group);
        Ok(())
    }

    /// Entries for `[seq_start, seq_end)`, clipped to one past the highest
    /// known sequence. `None` if the group is not initialized.
    pub fn get_group_slice(
        &self,
        values: &[FieldValue],
        seq_start: u64,
        seq_end: u64,
    ) -> Option<SequentialSlice<T>> {
        let group = self.groups.get(&encode_key(values))?;
        let seq_start = seq_start.max(1);
        let seq_end = seq_end.min(group.max_seq + 1);
        if seq_end <= seq_start {
            return Some(SequentialSlice::empty(seq_start));
        }
        let entries = (seq_start..seq_end)
            .map(|seq| group.data.get(&seq).cloned())
            .collect();
        Some(SequentialSlice {
            seq_start,
            seq_end,
            entries,
        })
    }

    /// The last `limit` sequence numbers of the group.
    pub fn get_group_tail(&self, values: &[FieldValue], limit: u64) -> Option<SequentialSlice<T>> {
        let max_seq = self.groups.get(&encode_key(values))?.max_seq;
        let seq_end = max_seq + 1;
        let seq_start = seq_end.saturating_sub(limit).max(1);
        self.get_group_slice(values, seq_start, seq_end)
    }
}
