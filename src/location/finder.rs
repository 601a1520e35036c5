//! Recomputes marker locations for the current state of a file by walking
//! its commit history back to the newest commit with recorded locations.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::error::DiffError;
use crate::git::types::edits_for_path;
use crate::git::{reverse_edits, Commit, CommitHistory, DiffSource, Edit};

use super::calculator::{CalculateLocationsRequest, LocationCalculator};
use super::log::{FinderLog, TracingLog};
use super::store::LocationStore;
use super::types::{LocationReport, LocationsById, Marker, MissingReason};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The file whose markers are being located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderContext {
    pub team_id: String,
    pub stream_id: String,
    /// Repository-relative path.
    pub file_path: String,
}

pub struct MarkerLocationFinder {
    context: FinderContext,
    history: Arc<dyn CommitHistory>,
    diffs: Arc<dyn DiffSource>,
    store: Arc<dyn LocationStore>,
    calculator: Arc<dyn LocationCalculator>,
    log: Arc<dyn FinderLog>,
    history_limit: usize,
}

impl MarkerLocationFinder {
    pub fn new(
        context: FinderContext,
        history: Arc<dyn CommitHistory>,
        diffs: Arc<dyn DiffSource>,
        store: Arc<dyn LocationStore>,
        calculator: Arc<dyn LocationCalculator>,
    ) -> Self {
        Self {
            context,
            history,
            diffs,
            store,
            calculator,
            log: Arc::new(TracingLog),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn FinderLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn context(&self) -> &FinderContext {
        &self.context
    }

    /// Locations of `markers` at the current commit. Markers that could not
    /// be located are left out of the map.
    pub async fn find_locations_for_current_commit(
        &self,
        markers: &[Marker],
    ) -> Result<LocationsById, DiffError> {
        Ok(self.locate_markers(markers).await?.locations)
    }

    /// Like [`Self::find_locations_for_current_commit`], but also says why
    /// each missing marker is missing.
    ///
    /// History is searched newest first. The first commit with a recorded
    /// location for a marker decides its result; that location is mapped
    /// through the diff from the commit to the current one.
    pub async fn locate_markers(&self, markers: &[Marker]) -> Result<LocationReport, DiffError> {
        let current = self.history.current_commit().await?;
        let path = &self.context.file_path;
        self.log.debug(&format!(
            "locating {} markers in {path} at {}",
            markers.len(),
            current.short_hash()
        ));

        let mut history = match self
            .history
            .commit_history_for_file(path, self.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                self.log.warn(&format!("history for {path} unavailable: {e}"));
                Vec::new()
            }
        };
        let unresolved = self.append_creation_commits(&mut history, markers).await;

        let mut report = LocationReport::default();
        let mut missing: BTreeSet<String> = markers.iter().map(|m| m.id.clone()).collect();

        for commit in &history {
            if missing.is_empty() {
                break;
            }

            let recorded = match self
                .store
                .marker_locations(&self.context.team_id, &self.context.stream_id, &commit.hash)
                .await
            {
                Ok(recorded) => recorded,
                Err(e) => {
                    self.log.warn(&format!(
                        "locations at {} unavailable: {e:#}",
                        commit.short_hash()
                    ));
                    continue;
                }
            };

            let last_known: LocationsById = recorded
                .into_iter()
                .filter(|(id, _)| missing.remove(id))
                .collect();
            self.log.trace(&format!(
                "{}: {} found, {} still missing",
                commit.short_hash(),
                last_known.len(),
                missing.len()
            ));
            if last_known.is_empty() {
                continue;
            }

            if *commit == current {
                merge_new(&mut report.locations, last_known);
                continue;
            }

            let edits = self.edits_between(commit, &current).await;
            if edits.is_empty() {
                merge_new(&mut report.locations, last_known);
                continue;
            }

            let ids: Vec<String> = last_known.keys().cloned().collect();
            match self
                .calculate(&commit.hash, Some(&current.hash), edits, last_known)
                .await
            {
                Ok(calculated) => {
                    for id in ids {
                        if !calculated.contains_key(&id) {
                            report.mark_missing(
                                &id,
                                MissingReason::RecalculationFailed,
                                format!("no location returned from {}", commit.short_hash()),
                            );
                        }
                    }
                    merge_new(&mut report.locations, calculated);
                }
                Err(e) => {
                    self.log.warn(&format!(
                        "recalculation from {} failed: {e:#}",
                        commit.short_hash()
                    ));
                    for id in ids {
                        report.mark_missing(&id, MissingReason::RecalculationFailed, format!("{e:#}"));
                    }
                }
            }
        }

        for id in missing {
            let creation = markers
                .iter()
                .find(|m| m.id == id)
                .map(|m| m.commit_hash_when_created.clone())
                .unwrap_or_default();
            if unresolved.contains(&creation) {
                report.mark_missing(
                    &id,
                    MissingReason::MissingOriginalCommit,
                    format!("commit {creation} is not available locally"),
                );
            } else {
                report.mark_missing(
                    &id,
                    MissingReason::NotFoundInHistory,
                    format!("no recorded location in {} commits", history.len()),
                );
            }
        }

        self.log.debug(&format!(
            "located {} of {} markers",
            report.locations.len(),
            markers.len()
        ));
        Ok(report)
    }

    /// Map `current_commit_locations` onto the unsaved `buffer_text`.
    pub async fn find_locations_for_uncommitted_changes(
        &self,
        current_commit_locations: &LocationsById,
        buffer_text: &str,
    ) -> Result<LocationsById, DiffError> {
        let current = self.history.current_commit().await?;
        let edits = self.buffer_edits(buffer_text).await;

        let mut locations = current_commit_locations.clone();
        if edits.is_empty() {
            return Ok(locations);
        }
        let calculated = self
            .calculate_or_empty(&current.hash, None, edits, current_commit_locations.clone())
            .await;
        locations.extend(calculated);
        Ok(locations)
    }

    /// Map locations expressed against the unsaved buffer back onto the
    /// current commit, by running the buffer diff in reverse.
    pub async fn backtrack_locations_at_current_commit(
        &self,
        dirty_locations: &LocationsById,
        buffer_text: &str,
    ) -> Result<LocationsById, DiffError> {
        let current = self.history.current_commit().await?;
        let reversed = reverse_edits(&self.buffer_edits(buffer_text).await);
        if reversed.is_empty() {
            return Ok(dirty_locations.clone());
        }
        Ok(self
            .calculate_or_empty(&current.hash, None, reversed, dirty_locations.clone())
            .await)
    }

    async fn append_creation_commits(
        &self,
        history: &mut Vec<Commit>,
        markers: &[Marker],
    ) -> HashSet<String> {
        let mut known: HashSet<String> = history.iter().map(|c| c.hash.clone()).collect();
        let mut unresolved = HashSet::new();
        for marker in markers {
            let hash = &marker.commit_hash_when_created;
            if known.contains(hash) || unresolved.contains(hash) {
                continue;
            }
            match self.history.commit(hash).await {
                Ok(Some(commit)) => {
                    known.insert(commit.hash.clone());
                    history.push(commit);
                }
                Ok(None) => {
                    self.log
                        .debug(&format!("creation commit {hash} of {} not found", marker.id));
                    unresolved.insert(hash.clone());
                }
                Err(e) => {
                    self.log.warn(&format!("resolving {hash} failed: {e}"));
                    unresolved.insert(hash.clone());
                }
            }
        }
        unresolved
    }

    async fn edits_between(&self, old: &Commit, new: &Commit) -> Vec<Edit> {
        match self.diffs.diffs_between(old, new).await {
            Ok(deltas) => edits_for_path(&deltas, &self.context.file_path).to_vec(),
            Err(e) => {
                self.log.warn(&format!(
                    "diff {}..{} unavailable, keeping recorded locations: {e}",
                    old.short_hash(),
                    new.short_hash()
                ));
                Vec::new()
            }
        }
    }

    async fn buffer_edits(&self, buffer_text: &str) -> Vec<Edit> {
        match self
            .diffs
            .diff_for_buffer(&self.context.file_path, buffer_text)
            .await
        {
            Ok(delta) => delta.edits,
            Err(e) => {
                self.log.warn(&format!("buffer diff unavailable: {e}"));
                Vec::new()
            }
        }
    }

    async fn calculate(
        &self,
        original_commit_hash: &str,
        new_commit_hash: Option<&str>,
        edits: Vec<Edit>,
        locations: LocationsById,
    ) -> anyhow::Result<LocationsById> {
        self.log.trace(&format!(
            "recalculating {} locations through {} edits",
            locations.len(),
            edits.len()
        ));
        self.calculator
            .calculate_locations(CalculateLocationsRequest {
                team_id: self.context.team_id.clone(),
                stream_id: self.context.stream_id.clone(),
                original_commit_hash: original_commit_hash.to_string(),
                new_commit_hash: new_commit_hash.map(str::to_string),
                edits,
                locations,
            })
            .await
    }

    async fn calculate_or_empty(
        &self,
        original_commit_hash: &str,
        new_commit_hash: Option<&str>,
        edits: Vec<Edit>,
        locations: LocationsById,
    ) -> LocationsById {
        match self
            .calculate(original_commit_hash, new_commit_hash, edits, locations)
            .await
        {
            Ok(calculated) => calculated,
            Err(e) => {
                self.log.warn(&format!("recalculation failed: {e:#}"));
                LocationsById::new()
            }
        }
    }
}

// Earlier commits in the walk win.
fn merge_new(into: &mut LocationsById, found: LocationsById) {
    for (id, location) in found {
        into.entry(id).or_insert(location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Delta;
    use crate::location::calculator::LineShiftCalculator;
    use crate::location::log::{LogLevel, RecordingLog};
    use crate::location::types::Location;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PATH: &str = "src/lib.rs";

    struct FakeHistory {
        current: String,
        history: Vec<String>,
        known: Vec<String>,
    }

    #[async_trait]
    impl CommitHistory for FakeHistory {
        async fn current_commit(&self) -> Result<Commit, DiffError> {
            Ok(Commit::new(&self.current))
        }

        async fn commit(&self, hash: &str) -> Result<Option<Commit>, DiffError> {
            let known = self.known.iter().chain(&self.history).any(|h| h == hash);
            Ok(known.then(|| Commit::new(hash)))
        }

        async fn commit_history_for_file(
            &self,
            _path: &str,
            limit: usize,
        ) -> Result<Vec<Commit>, DiffError> {
            Ok(self.history.iter().take(limit).map(Commit::new).collect())
        }
    }

    #[derive(Default)]
    struct FakeDiffs {
        between: HashMap<(String, String), Vec<Edit>>,
        buffer: Vec<Edit>,
    }

    #[async_trait]
    impl DiffSource for FakeDiffs {
        async fn diffs_between(&self, old: &Commit, new: &Commit) -> Result<Arc<Vec<Delta>>, DiffError> {
            let edits = self
                .between
                .get(&(old.hash.clone(), new.hash.clone()))
                .ok_or_else(|| DiffError::unavailable("no such pair"))?;
            Ok(Arc::new(vec![Delta {
                old_file: PATH.into(),
                new_file: PATH.into(),
                edits: edits.clone(),
            }]))
        }

        async fn diffs_for_commit(&self, _commit: &Commit) -> Result<Arc<Vec<Delta>>, DiffError> {
            Err(DiffError::unavailable("unused"))
        }

        async fn diff_for_buffer(&self, path: &str, _text: &str) -> Result<Delta, DiffError> {
            Ok(Delta {
                old_file: path.into(),
                new_file: path.into(),
                edits: self.buffer.clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        by_commit: HashMap<String, LocationsById>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LocationStore for FakeStore {
        async fn marker_locations(
            &self,
            _team_id: &str,
            _stream_id: &str,
            commit_hash: &str,
        ) -> anyhow::Result<LocationsById> {
            self.asked.lock().unwrap().push(commit_hash.to_string());
            Ok(self.by_commit.get(commit_hash).cloned().unwrap_or_default())
        }
    }

    /// Records requests and answers with line arithmetic, or fails.
    #[derive(Default)]
    struct SpyCalculator {
        requests: Mutex<Vec<CalculateLocationsRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl LocationCalculator for SpyCalculator {
        async fn calculate_locations(
            &self,
            request: CalculateLocationsRequest,
        ) -> anyhow::Result<LocationsById> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                anyhow::bail!("service unavailable");
            }
            LineShiftCalculator.calculate_locations(request).await
        }
    }

    fn insertion(at: u32, count: usize) -> Edit {
        Edit {
            del_start: at,
            add_start: at,
            del_length: 0,
            add_length: count as u32,
            dels: vec![],
            adds: (0..count).map(|i| format!("added {i}")).collect(),
        }
    }

    fn locs(entries: &[(&str, Location)]) -> LocationsById {
        entries
            .iter()
            .map(|(id, l)| (id.to_string(), l.clone()))
            .collect()
    }

    fn history(current: &str, list: &[&str]) -> FakeHistory {
        FakeHistory {
            current: current.into(),
            history: list.iter().map(|s| s.to_string()).collect(),
            known: vec![],
        }
    }

    struct Harness {
        finder: MarkerLocationFinder,
        store: Arc<FakeStore>,
        calc: Arc<SpyCalculator>,
        log: Arc<RecordingLog>,
    }

    fn harness(h: FakeHistory, diffs: FakeDiffs, store: FakeStore, calc: SpyCalculator) -> Harness {
        let store = Arc::new(store);
        let calc = Arc::new(calc);
        let log = Arc::new(RecordingLog::new());
        let finder = MarkerLocationFinder::new(
            FinderContext {
                team_id: "team".into(),
                stream_id: "stream".into(),
                file_path: PATH.into(),
            },
            Arc::new(h),
            Arc::new(diffs),
            store.clone(),
            calc.clone(),
        )
        .with_log(log.clone());
        Harness {
            finder,
            store,
            calc,
            log,
        }
    }

    #[tokio::test]
    async fn test_recalculates_from_newest_recorded_commit() {
        let mut diffs = FakeDiffs::default();
        diffs
            .between
            .insert(("C1".into(), "C3".into()), vec![insertion(5, 2)]);
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C1".into(), locs(&[("m1", Location::new(10, 1, 12, 4))]));

        let h = harness(
            history("C3", &["C3", "C2", "C1", "C0"]),
            diffs,
            store,
            SpyCalculator::default(),
        );
        let markers = vec![Marker::new("m1", "stream", "C0")];
        let found = h.finder.find_locations_for_current_commit(&markers).await.unwrap();

        assert_eq!(found["m1"], Location::new(12, 1, 14, 4));
        let requests = h.calc.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].original_commit_hash, "C1");
        assert_eq!(requests[0].new_commit_hash.as_deref(), Some("C3"));
        assert_eq!(requests[0].team_id, "team");
        assert_eq!(requests[0].edits, vec![insertion(5, 2)]);
        // C0 never needed
        assert_eq!(*h.store.asked.lock().unwrap(), vec!["C3", "C2", "C1"]);
    }

    #[tokio::test]
    async fn test_location_at_current_commit_used_directly() {
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C2".into(), locs(&[("m1", Location::new(3, 1, 3, 9))]));
        let h = harness(
            history("C2", &["C2", "C1"]),
            FakeDiffs::default(),
            store,
            SpyCalculator::default(),
        );
        let found = h
            .finder
            .find_locations_for_current_commit(&[Marker::new("m1", "stream", "C1")])
            .await
            .unwrap();
        assert_eq!(found["m1"], Location::new(3, 1, 3, 9));
        assert!(h.calc.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_commit_in_walk_wins() {
        let mut diffs = FakeDiffs::default();
        diffs.between.insert(("C2".into(), "C3".into()), vec![]);
        diffs
            .between
            .insert(("C1".into(), "C3".into()), vec![insertion(1, 50)]);
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C2".into(), locs(&[("m1", Location::new(7, 1, 7, 2))]));
        store.by_commit.insert(
            "C1".into(),
            locs(&[
                ("m1", Location::new(1, 1, 1, 1)),
                ("m2", Location::new(4, 1, 4, 2)),
            ]),
        );
        let h = harness(
            history("C3", &["C3", "C2", "C1"]),
            diffs,
            store,
            SpyCalculator::default(),
        );
        let markers = vec![
            Marker::new("m1", "stream", "C1"),
            Marker::new("m2", "stream", "C1"),
        ];
        let found = h.finder.find_locations_for_current_commit(&markers).await.unwrap();
        assert_eq!(found["m1"], Location::new(7, 1, 7, 2));
        assert_eq!(found["m2"].line_start, 54);

        let requests = h.calc.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].locations.keys().collect::<Vec<_>>(), vec!["m2"]);
    }

    #[tokio::test]
    async fn test_missing_set_never_grows() {
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C3".into(), locs(&[("a", Location::new(1, 1, 1, 1))]));
        store
            .by_commit
            .insert("C1".into(), locs(&[("b", Location::new(2, 1, 2, 1))]));
        store
            .by_commit
            .insert("C0".into(), locs(&[("c", Location::new(3, 1, 3, 1))]));
        let mut diffs = FakeDiffs::default();
        diffs.between.insert(("C1".into(), "C3".into()), vec![]);
        diffs.between.insert(("C0".into(), "C3".into()), vec![]);

        let h = harness(
            history("C3", &["C3", "C2", "C1", "C0"]),
            diffs,
            store,
            SpyCalculator::default(),
        );
        let markers = vec![
            Marker::new("a", "stream", "C0"),
            Marker::new("b", "stream", "C0"),
            Marker::new("c", "stream", "C0"),
        ];
        let report = h.finder.locate_markers(&markers).await.unwrap();
        assert_eq!(report.locations.len(), 3);
        assert!(report.missing.is_empty());

        let counts: Vec<usize> = h
            .log
            .messages(LogLevel::Trace)
            .iter()
            .filter_map(|m| m.strip_suffix(" still missing"))
            .filter_map(|m| m.rsplit(", ").next())
            .filter_map(|n| n.parse().ok())
            .collect();
        assert_eq!(counts, vec![2, 2, 1, 0]);
        assert!(counts.windows(2).all(|w| w[1] <= w[0]));
    }

    #[tokio::test]
    async fn test_creation_commit_outside_window_is_searched() {
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C0".into(), locs(&[("m1", Location::new(4, 1, 4, 5))]));
        let mut diffs = FakeDiffs::default();
        diffs
            .between
            .insert(("C0".into(), "C9".into()), vec![insertion(1, 1)]);
        let mut h = history("C9", &["C9", "C8"]);
        h.known.push("C0".into());

        let h = harness(h, diffs, store, SpyCalculator::default());
        let found = h
            .finder
            .find_locations_for_current_commit(&[Marker::new("m1", "stream", "C0")])
            .await
            .unwrap();
        assert_eq!(found["m1"].line_start, 5);
    }

    #[tokio::test]
    async fn test_report_explains_missing_markers() {
        let h = harness(
            history("C2", &["C2", "C1"]),
            FakeDiffs::default(),
            FakeStore::default(),
            SpyCalculator::default(),
        );
        let markers = vec![
            Marker::new("lost", "stream", "C1"),
            Marker::new("orphan", "stream", "deadbeef"),
        ];
        let report = h.finder.locate_markers(&markers).await.unwrap();
        assert!(report.locations.is_empty());
        assert_eq!(report.missing["lost"].reason, MissingReason::NotFoundInHistory);
        assert_eq!(
            report.missing["orphan"].reason,
            MissingReason::MissingOriginalCommit
        );
    }

    #[tokio::test]
    async fn test_failed_recalculation_is_not_fatal() {
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C1".into(), locs(&[("m1", Location::new(2, 1, 2, 3))]));
        let mut diffs = FakeDiffs::default();
        diffs
            .between
            .insert(("C1".into(), "C2".into()), vec![insertion(1, 1)]);
        let h = harness(
            history("C2", &["C2", "C1"]),
            diffs,
            store,
            SpyCalculator {
                fail: true,
                ..Default::default()
            },
        );
        let markers = vec![Marker::new("m1", "stream", "C1")];
        let report = h.finder.locate_markers(&markers).await.unwrap();
        assert!(report.locations.is_empty());
        assert_eq!(report.missing["m1"].reason, MissingReason::RecalculationFailed);
        assert!(!h.log.messages(LogLevel::Warn).is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_diff_keeps_recorded_location() {
        let mut store = FakeStore::default();
        store
            .by_commit
            .insert("C1".into(), locs(&[("m1", Location::new(6, 1, 6, 3))]));
        let h = harness(
            history("C2", &["C2", "C1"]),
            FakeDiffs::default(),
            store,
            SpyCalculator::default(),
        );
        let found = h
            .finder
            .find_locations_for_current_commit(&[Marker::new("m1", "stream", "C1")])
            .await
            .unwrap();
        assert_eq!(found["m1"], Location::new(6, 1, 6, 3));
        assert!(h.calc.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_changes_merge_over_input() {
        let diffs = FakeDiffs {
            buffer: vec![insertion(2, 3)],
            ..Default::default()
        };
        let h = harness(
            history("C1", &["C1"]),
            diffs,
            FakeStore::default(),
            SpyCalculator::default(),
        );
        let input = locs(&[
            ("top", Location::new(1, 1, 1, 4)),
            ("low", Location::new(5, 1, 6, 4)),
        ]);
        let out = h
            .finder
            .find_locations_for_uncommitted_changes(&input, "buffer")
            .await
            .unwrap();
        assert_eq!(out["top"], Location::new(1, 1, 1, 4));
        assert_eq!(out["low"], Location::new(8, 1, 9, 4));

        let requests = h.calc.requests.lock().unwrap();
        assert_eq!(requests[0].original_commit_hash, "C1");
        assert_eq!(requests[0].new_commit_hash, None);
    }

    #[tokio::test]
    async fn test_clean_buffer_returns_input() {
        let h = harness(
            history("C1", &["C1"]),
            FakeDiffs::default(),
            FakeStore::default(),
            SpyCalculator::default(),
        );
        let input = locs(&[("m", Location::new(3, 1, 3, 2))]);
        let out = h
            .finder
            .find_locations_for_uncommitted_changes(&input, "same")
            .await
            .unwrap();
        assert_eq!(out, input);
        let back = h
            .finder
            .backtrack_locations_at_current_commit(&input, "same")
            .await
            .unwrap();
        assert_eq!(back, input);
        assert!(h.calc.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backtrack_uses_reversed_edits() {
        let forward = insertion(2, 3);
        let diffs = FakeDiffs {
            buffer: vec![forward.clone()],
            ..Default::default()
        };
        let h = harness(
            history("C1", &["C1"]),
            diffs,
            FakeStore::default(),
            SpyCalculator::default(),
        );
        let dirty = locs(&[("m", Location::new(8, 1, 9, 4))]);
        let out = h
            .finder
            .backtrack_locations_at_current_commit(&dirty, "buffer")
            .await
            .unwrap();
        assert_eq!(out["m"], Location::new(5, 1, 6, 4));

        let requests = h.calc.requests.lock().unwrap();
        assert_eq!(requests[0].edits, vec![forward.reversed()]);
    }

    #[tokio::test]
    async fn test_backtrack_failure_yields_empty_map() {
        let diffs = FakeDiffs {
            buffer: vec![insertion(1, 1)],
            ..Default::default()
        };
        let h = harness(
            history("C1", &["C1"]),
            diffs,
            FakeStore::default(),
            SpyCalculator {
                fail: true,
                ..Default::default()
            },
        );
        let dirty = locs(&[("m", Location::new(2, 1, 2, 1))]);
        let out = h
            .finder
            .backtrack_locations_at_current_commit(&dirty, "buffer")
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
