//! In-memory mirror of server-held entities with lazily populated indexes.
//!
//! An [`EntityCache`] owns any number of indexes, each declared for a field
//! combination together with the async function that fetches entities on a
//! miss. Every write goes through all indexes so they stay consistent.

pub mod index;
pub mod key;
pub mod sequential;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::CacheError;

pub use index::{GroupIndex, IdFn, UniqueIndex};
pub use key::{Criteria, Entity, FieldValue};
pub use sequential::{GroupSequentialIndex, SequentialSlice};

pub type UniqueFetchFn<T> =
    Arc<dyn Fn(Criteria) -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send + Sync>;
pub type GroupFetchFn<T> =
    Arc<dyn Fn(Criteria) -> BoxFuture<'static, anyhow::Result<Vec<T>>> + Send + Sync>;
pub type SliceFetchFn<T> =
    Arc<dyn Fn(Criteria, SliceRequest) -> BoxFuture<'static, anyhow::Result<Vec<T>>> + Send + Sync>;

/// Bounds passed to a sequential fetch function. `seq_end` is exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceRequest {
    pub seq_start: Option<u64>,
    pub seq_end: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Answer from memory only; a miss stays a miss.
    pub avoid_fetch: bool,
}

impl GetOptions {
    pub fn cached_only() -> Self {
        Self { avoid_fetch: true }
    }
}

pub fn unique_fetch<T, F, Fut>(f: F) -> UniqueFetchFn<T>
where
    F: Fn(Criteria) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
{
    Arc::new(move |criteria| f(criteria).boxed())
}

pub fn group_fetch<T, F, Fut>(f: F) -> GroupFetchFn<T>
where
    F: Fn(Criteria) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
{
    Arc::new(move |criteria| f(criteria).boxed())
}

pub fn slice_fetch<T, F, Fut>(f: F) -> SliceFetchFn<T>
where
    F: Fn(Criteria, SliceRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
{
    Arc::new(move |criteria, request| f(criteria, request).boxed())
}

enum IndexSlot<T> {
    Unique {
        index: UniqueIndex<T>,
        fetch: UniqueFetchFn<T>,
    },
    Group {
        index: GroupIndex<T>,
        fetch: GroupFetchFn<T>,
    },
    Sequential {
        index: GroupSequentialIndex<T>,
        fetch: SliceFetchFn<T>,
    },
}

impl<T: Entity> IndexSlot<T> {
    /// Errors exactly when `set(entity, ..)` would.
    fn check(&self, entity: &T) -> Result<(), CacheError> {
        match self {
            IndexSlot::Sequential { index, .. } => index.check(entity),
            _ => Ok(()),
        }
    }

    fn set(&mut self, entity: &T, old: Option<&T>) -> Result<(), CacheError> {
        match self {
            IndexSlot::Unique { index, .. } => index.set(entity, old),
            IndexSlot::Group { index, .. } => index.set(entity, old),
            IndexSlot::Sequential { index, .. } => index.set(entity, old)?,
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        match self {
            IndexSlot::Unique { index, .. } => index.invalidate(),
            IndexSlot::Group { index, .. } => index.invalidate(),
            IndexSlot::Sequential { index, .. } => index.invalidate(),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        match self {
            IndexSlot::Unique { index, .. } => index.set_enabled(enabled),
            IndexSlot::Group { index, .. } => index.set_enabled(enabled),
            IndexSlot::Sequential { index, .. } => index.set_enabled(enabled),
        }
    }
}

/// Declares the indexes of an [`EntityCache`].
pub struct CacheBuilder<T> {
    name: String,
    slots: HashMap<String, IndexSlot<T>>,
}

impl<T: Entity> CacheBuilder<T> {
    pub fn unique(mut self, fields: &[&'static str], fetch: UniqueFetchFn<T>) -> Self {
        self.slots.insert(
            key::encode_fields(fields),
            IndexSlot::Unique {
                index: UniqueIndex::new(fields.to_vec()),
                fetch,
            },
        );
        self
    }

    pub fn group(self, fields: &[&'static str], fetch: GroupFetchFn<T>) -> Self {
        self.group_by(fields, None, fetch)
    }

    /// A group index whose members are ordered by `id_fn` instead of [`Entity::id`].
    pub fn group_by(
        mut self,
        fields: &[&'static str],
        id_fn: Option<IdFn<T>>,
        fetch: GroupFetchFn<T>,
    ) -> Self {
        self.slots.insert(
            key::encode_fields(fields),
            IndexSlot::Group {
                index: GroupIndex::new(fields.to_vec(), id_fn),
                fetch,
            },
        );
        self
    }

    pub fn sequential(
        mut self,
        fields: &[&'static str],
        seq_field: &'static str,
        fetch: SliceFetchFn<T>,
    ) -> Self {
        self.slots.insert(
            key::encode_fields(fields),
            IndexSlot::Sequential {
                index: GroupSequentialIndex::new(fields.to_vec(), seq_field),
                fetch,
            },
        );
        self
    }

    pub fn build(self) -> EntityCache<T> {
        EntityCache {
            name: self.name,
            slots: Mutex::new(self.slots),
        }
    }
}

/// Multi-index cache of `T`. The lock is only held for in-memory work; fetch
/// functions always run with it released, so two concurrent misses on one
/// key may both fetch. Writes are last-write-wins.
pub struct EntityCache<T> {
    name: String,
    slots: Mutex<HashMap<String, IndexSlot<T>>>,
}

impl<T: Entity> EntityCache<T> {
    pub fn builder(name: impl Into<String>) -> CacheBuilder<T> {
        CacheBuilder {
            name: name.into(),
            slots: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, IndexSlot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn no_index(kind: &'static str, criteria: &Criteria) -> CacheError {
        CacheError::NoIndexDeclared {
            kind,
            fields: criteria.fields().join(","),
        }
    }

    /// Look up one entity through the unique index declared for the
    /// criteria's fields, fetching and caching it on a miss.
    pub async fn get(&self, criteria: &Criteria, options: GetOptions) -> Result<Option<T>, CacheError> {
        let started = Instant::now();
        let values = criteria.values();
        let (cached, fetch) = {
            let slots = self.slots();
            match slots.get(&criteria.encoded_fields()) {
                Some(IndexSlot::Unique { index, fetch }) => {
                    (index.get(&values).cloned(), fetch.clone())
                }
                _ => return Err(Self::no_index("unique", criteria)),
            }
        };

        if cached.is_some() || options.avoid_fetch {
            self.trace_lookup("unique", criteria, cached.is_some(), started);
            return Ok(cached);
        }

        let fetched = fetch(criteria.clone()).await.map_err(CacheError::Fetch)?;
        if let Some(entity) = &fetched {
            self.set(entity, None)?;
        }
        self.trace_lookup("unique", criteria, false, started);
        Ok(fetched)
    }

    /// Insert or update an entity in every index. `old` is the previously
    /// cached version, needed to re-key indexes whose fields changed.
    /// A rejected entity is written nowhere.
    pub fn set(&self, entity: &T, old: Option<&T>) -> Result<(), CacheError> {
        let mut slots = self.slots();
        check_all(&slots, std::slice::from_ref(entity), None)?;
        for slot in slots.values_mut() {
            slot.set(entity, old)?;
        }
        Ok(())
    }

    /// Like [`EntityCache::set`] for a batch; either all entities are written
    /// or none.
    pub fn set_many(&self, entities: &[T]) -> Result<(), CacheError> {
        let mut slots = self.slots();
        check_all(&slots, entities, None)?;
        for entity in entities {
            for slot in slots.values_mut() {
                slot.set(entity, None)?;
            }
        }
        Ok(())
    }

    /// Members of a group, fetching and initializing it when unknown. With
    /// `avoid_fetch`, an unknown group yields `None`.
    pub async fn get_group(
        &self,
        criteria: &Criteria,
        options: GetOptions,
    ) -> Result<Option<Vec<T>>, CacheError> {
        let started = Instant::now();
        let values = criteria.values();
        let (cached, fetch) = {
            let slots = self.slots();
            match slots.get(&criteria.encoded_fields()) {
                Some(IndexSlot::Group { index, fetch }) => (index.get_group(&values), fetch.clone()),
                _ => return Err(Self::no_index("group", criteria)),
            }
        };

        if cached.is_some() || options.avoid_fetch {
            self.trace_lookup("group", criteria, cached.is_some(), started);
            return Ok(cached);
        }

        let entities = fetch(criteria.clone()).await.map_err(CacheError::Fetch)?;
        self.init_group(criteria, &entities)?;
        self.trace_lookup("group", criteria, false, started);
        // Served from the index so members come back in id order either way.
        let stored = match self.slots().get(&criteria.encoded_fields()) {
            Some(IndexSlot::Group { index, .. }) => index.get_group(&values),
            _ => None,
        };
        Ok(Some(stored.unwrap_or(entities)))
    }

    /// Seed a group or sequential group with its members. The members are
    /// written through all other indexes as well.
    pub fn init_group(&self, criteria: &Criteria, entities: &[T]) -> Result<(), CacheError> {
        let values = criteria.values();
        let slot_key = criteria.encoded_fields();
        let mut slots = self.slots();
        match slots.get(&slot_key) {
            Some(IndexSlot::Group { .. }) => {}
            Some(IndexSlot::Sequential { index, .. }) => index.check_init(&values, entities)?,
            _ => return Err(Self::no_index("group", criteria)),
        }
        check_all(&slots, entities, Some(&slot_key))?;

        match slots.get_mut(&slot_key) {
            Some(IndexSlot::Group { index, .. }) => index.init_group(&values, entities),
            Some(IndexSlot::Sequential { index, .. }) => index.init_group(&values, entities)?,
            _ => return Err(Self::no_index("group", criteria)),
        }
        for (key, slot) in slots.iter_mut() {
            if *key == slot_key {
                continue;
            }
            for entity in entities {
                slot.set(entity, None)?;
            }
        }
        Ok(())
    }

    /// Entries `[seq_start, seq_end)` of a sequential group. An unknown group
    /// is initialized from the fetch function first; every remaining hole is
    /// then fetched in ascending order before the slice is returned.
    pub async fn get_group_slice(
        &self,
        criteria: &Criteria,
        seq_start: u64,
        seq_end: u64,
    ) -> Result<SequentialSlice<T>, CacheError> {
        let request = SliceRequest {
            seq_start: Some(seq_start),
            seq_end: Some(seq_end),
            limit: None,
        };
        self.sequential_read(criteria, request, |index, values| {
            index.get_group_slice(values, seq_start, seq_end)
        })
        .await
    }

    /// The last `limit` entries of a sequential group, holes filled as in
    /// [`EntityCache::get_group_slice`].
    pub async fn get_group_tail(
        &self,
        criteria: &Criteria,
        limit: u64,
    ) -> Result<SequentialSlice<T>, CacheError> {
        let request = SliceRequest {
            seq_start: None,
            seq_end: None,
            limit: Some(limit),
        };
        self.sequential_read(criteria, request, |index, values| {
            index.get_group_tail(values, limit)
        })
        .await
    }

    async fn sequential_read<F>(
        &self,
        criteria: &Criteria,
        initial: SliceRequest,
        read: F,
    ) -> Result<SequentialSlice<T>, CacheError>
    where
        F: Fn(&GroupSequentialIndex<T>, &[FieldValue]) -> Option<SequentialSlice<T>>,
    {
        let started = Instant::now();
        let values = criteria.values();
        let slot_key = criteria.encoded_fields();
        let read_now = |cache: &Self| -> Result<(Option<SequentialSlice<T>>, SliceFetchFn<T>), CacheError> {
            let slots = cache.slots();
            match slots.get(&slot_key) {
                Some(IndexSlot::Sequential { index, fetch }) => {
                    Ok((read(index, &values), fetch.clone()))
                }
                _ => Err(Self::no_index("sequential", criteria)),
            }
        };

        let (mut slice, fetch) = read_now(self)?;
        let hit = slice.as_ref().is_some_and(SequentialSlice::is_complete);

        if slice.is_none() {
            let entities = fetch(criteria.clone(), initial)
                .await
                .map_err(CacheError::Fetch)?;
            self.init_group(criteria, &entities)?;
            slice = read_now(self)?.0;
        }

        let Some(current) = slice else {
            // index disabled before the group could be seeded
            return Ok(SequentialSlice {
                seq_start: initial.seq_start.unwrap_or(1),
                seq_end: initial.seq_start.unwrap_or(1),
                entries: Vec::new(),
            });
        };

        let gaps = current.gaps();
        if gaps.is_empty() {
            self.trace_lookup("sequential", criteria, hit, started);
            return Ok(current);
        }
        for gap in gaps {
            let request = SliceRequest {
                seq_start: Some(gap.start),
                seq_end: Some(gap.end),
                limit: None,
            };
            tracing::trace!(cache = %self.name, %criteria, start = gap.start, end = gap.end, "filling slice gap");
            let entities = fetch(criteria.clone(), request)
                .await
                .map_err(CacheError::Fetch)?;
            self.set_many(&entities)?;
        }

        self.trace_lookup("sequential", criteria, false, started);
        Ok(read_now(self)?.0.unwrap_or(current))
    }

    /// Clear every index.
    pub fn invalidate(&self) {
        for slot in self.slots().values_mut() {
            slot.invalidate();
        }
    }

    /// Stop (or resume) write propagation into the index declared for
    /// `fields`. Data already cached stays readable.
    pub fn set_enabled(&self, fields: &[&'static str], enabled: bool) -> Result<(), CacheError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&key::encode_fields(fields))
            .ok_or_else(|| CacheError::NoIndexDeclared {
                kind: "any",
                fields: fields.join(","),
            })?;
        slot.set_enabled(enabled);
        Ok(())
    }

    fn trace_lookup(&self, kind: &str, criteria: &Criteria, hit: bool, started: Instant) {
        tracing::debug!(
            cache = %self.name,
            kind,
            %criteria,
            hit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache lookup"
        );
    }
}

fn check_all<T: Entity>(
    slots: &HashMap<String, IndexSlot<T>>,
    entities: &[T],
    skip: Option<&str>,
) -> Result<(), CacheError> {
    for (key, slot) in slots {
        if Some(key.as_str()) == skip {
            continue;
        }
        for entity in entities {
            slot.check(entity)?;
        }
    }
    Ok(())
}
