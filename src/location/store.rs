use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{unique_fetch, Criteria, Entity, EntityCache, FieldValue, GetOptions};
use crate::error::CacheError;

use super::types::LocationsById;

/// Previously recorded marker locations of a file, per commit.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn marker_locations(
        &self,
        team_id: &str,
        stream_id: &str,
        commit_hash: &str,
    ) -> anyhow::Result<LocationsById>;
}

/// All recorded locations of one stream at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerLocations {
    pub team_id: String,
    pub stream_id: String,
    pub commit_hash: String,
    pub locations: LocationsById,
}

impl Entity for MarkerLocations {
    fn id(&self) -> String {
        crate::cache::key::encode_key(&[
            self.stream_id.clone().into(),
            self.commit_hash.clone().into(),
        ])
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "teamId" => Some(self.team_id.clone().into()),
            "streamId" => Some(self.stream_id.clone().into()),
            "commitHash" => Some(self.commit_hash.clone().into()),
            _ => None,
        }
    }
}

const KEY_FIELDS: [&str; 2] = ["streamId", "commitHash"];

fn key(stream_id: &str, commit_hash: &str) -> Criteria {
    Criteria::new()
        .with("streamId", stream_id)
        .with("commitHash", commit_hash)
}

/// [`LocationStore`] that remembers every `(stream, commit)` answer of a
/// remote store for one team.
pub struct CachedLocationStore {
    team_id: String,
    remote: Arc<dyn LocationStore>,
    cache: EntityCache<MarkerLocations>,
}

impl CachedLocationStore {
    pub fn new(team_id: impl Into<String>, remote: Arc<dyn LocationStore>) -> Self {
        let team_id = team_id.into();
        let fetch_team = team_id.clone();
        let fetch_remote = remote.clone();
        let cache = EntityCache::builder("markerLocations")
            .unique(
                &KEY_FIELDS,
                unique_fetch(move |criteria: Criteria| {
                    let team_id = fetch_team.clone();
                    let remote = fetch_remote.clone();
                    async move {
                        let part = |name: &str| {
                            criteria
                                .value(name)
                                .map(ToString::to_string)
                                .unwrap_or_default()
                        };
                        let (stream_id, commit_hash) = (part("streamId"), part("commitHash"));
                        let locations = remote
                            .marker_locations(&team_id, &stream_id, &commit_hash)
                            .await?;
                        Ok::<_, anyhow::Error>(Some(MarkerLocations {
                            team_id,
                            stream_id,
                            commit_hash,
                            locations,
                        }))
                    }
                }),
            )
            .build();
        Self {
            team_id,
            remote,
            cache,
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// Save locations computed locally. Entries already cached for the same
    /// stream and commit are kept unless overwritten by `locations`.
    pub async fn record(
        &self,
        stream_id: &str,
        commit_hash: &str,
        locations: LocationsById,
    ) -> Result<(), CacheError> {
        let old = self
            .cache
            .get(&key(stream_id, commit_hash), GetOptions::cached_only())
            .await?;
        let mut merged = old
            .as_ref()
            .map(|o| o.locations.clone())
            .unwrap_or_default();
        merged.extend(locations);
        let entry = MarkerLocations {
            team_id: self.team_id.clone(),
            stream_id: stream_id.to_string(),
            commit_hash: commit_hash.to_string(),
            locations: merged,
        };
        self.cache.set(&entry, old.as_ref())
    }

    /// Drop everything cached, e.g. on session reset.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

#[async_trait]
impl LocationStore for CachedLocationStore {
    async fn marker_locations(
        &self,
        team_id: &str,
        stream_id: &str,
        commit_hash: &str,
    ) -> anyhow::Result<LocationsById> {
        if team_id != self.team_id {
            tracing::debug!(team_id, cached_team = %self.team_id, "bypassing location cache for other team");
            return self
                .remote
                .marker_locations(team_id, stream_id, commit_hash)
                .await;
        }
        let entry = self
            .cache
            .get(&key(stream_id, commit_hash), GetOptions::default())
            .await?;
        Ok(entry.map(|e| e.locations).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::types::Location;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeRemote {
        calls: AtomicUsize,
        data: HashMap<(String, String), LocationsById>,
    }

    #[async_trait]
    impl LocationStore for FakeRemote {
        async fn marker_locations(
            &self,
            _team_id: &str,
            stream_id: &str,
            commit_hash: &str,
        ) -> anyhow::Result<LocationsById> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .data
                .get(&(stream_id.to_string(), commit_hash.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn remote_with(loc: Location) -> Arc<FakeRemote> {
        let mut remote = FakeRemote::default();
        let mut locations = LocationsById::new();
        locations.insert("m1".into(), loc);
        remote.data.insert(("s1".into(), "c1".into()), locations);
        Arc::new(remote)
    }

    #[tokio::test]
    async fn test_remote_is_asked_once_per_key() {
        let remote = remote_with(Location::new(1, 1, 2, 1));
        let store = CachedLocationStore::new("t1", remote.clone());

        let first = store.marker_locations("t1", "s1", "c1").await.unwrap();
        let second = store.marker_locations("t1", "s1", "c1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["m1"].line_end, 2);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);

        let empty = store.marker_locations("t1", "s1", "c2").await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_record_merges_with_cached_entry() {
        let remote = remote_with(Location::new(1, 1, 2, 1));
        let store = CachedLocationStore::new("t1", remote.clone());
        store.marker_locations("t1", "s1", "c1").await.unwrap();

        let mut more = LocationsById::new();
        more.insert("m2".into(), Location::new(8, 1, 9, 1));
        store.record("s1", "c1", more).await.unwrap();

        let all = store.marker_locations("t1", "s1", "c1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_record_without_cached_entry_is_served_locally() {
        let remote = Arc::new(FakeRemote::default());
        let store = CachedLocationStore::new("t1", remote.clone());
        let mut locs = LocationsById::new();
        locs.insert("m9".into(), Location::new(3, 1, 3, 4));
        store.record("s1", "c7", locs).await.unwrap();

        let got = store.marker_locations("t1", "s1", "c7").await.unwrap();
        assert!(got.contains_key("m9"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_team_bypasses_cache() {
        let remote = remote_with(Location::new(1, 1, 1, 1));
        let store = CachedLocationStore::new("t1", remote.clone());
        store.marker_locations("t2", "s1", "c1").await.unwrap();
        store.marker_locations("t2", "s1", "c1").await.unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);

        store.invalidate();
        store.marker_locations("t1", "s1", "c1").await.unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
    }
}
