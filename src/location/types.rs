use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column used for "end of line" when a range end is pulled back onto a
/// preceding line.
pub const MAX_RANGE_VALUE: u32 = 2_147_483_647;

/// An annotation anchored to a line range of a file at the commit it was
/// created on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub stream_id: String,
    pub commit_hash_when_created: String,
}

impl Marker {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            commit_hash_when_created: commit.into(),
        }
    }
}

/// Flags set when recalculation had to trim or drop part of a range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMeta {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub start_was_deleted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end_was_deleted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub entirely_deleted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub content_changed: bool,
}

impl LocationMeta {
    pub fn is_empty(&self) -> bool {
        *self == LocationMeta::default()
    }
}

/// A 1-based line/column range. On the wire this is the array
/// `[lineStart, colStart, lineEnd, colEnd, meta?]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocationArray", into = "LocationArray")]
pub struct Location {
    pub line_start: u32,
    pub col_start: u32,
    pub line_end: u32,
    pub col_end: u32,
    pub meta: Option<LocationMeta>,
}

impl Location {
    pub fn new(line_start: u32, col_start: u32, line_end: u32, col_end: u32) -> Self {
        Self {
            line_start,
            col_start,
            line_end,
            col_end,
            meta: None,
        }
    }

    /// Whole lines `start..=end`.
    pub fn lines(start: u32, end: u32) -> Self {
        Self::new(start, 1, end, MAX_RANGE_VALUE)
    }

    pub fn meta_mut(&mut self) -> &mut LocationMeta {
        self.meta.get_or_insert_with(LocationMeta::default)
    }

    pub fn is_entirely_deleted(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.entirely_deleted)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LocationArray {
    WithMeta(u32, u32, u32, u32, Option<LocationMeta>),
    Plain(u32, u32, u32, u32),
}

impl From<LocationArray> for Location {
    fn from(array: LocationArray) -> Self {
        match array {
            LocationArray::WithMeta(ls, cs, le, ce, meta) => Location {
                line_start: ls,
                col_start: cs,
                line_end: le,
                col_end: ce,
                meta,
            },
            LocationArray::Plain(ls, cs, le, ce) => Location::new(ls, cs, le, ce),
        }
    }
}

impl From<Location> for LocationArray {
    fn from(l: Location) -> Self {
        match l.meta.filter(|m| !m.is_empty()) {
            Some(meta) => LocationArray::WithMeta(l.line_start, l.col_start, l.line_end, l.col_end, Some(meta)),
            None => LocationArray::Plain(l.line_start, l.col_start, l.line_end, l.col_end),
        }
    }
}

pub type LocationsById = BTreeMap<String, Location>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingReason {
    /// The commit the marker was created on cannot be resolved locally.
    MissingOriginalCommit,
    /// No commit in the searched history has a recorded location.
    NotFoundInHistory,
    /// A recorded location exists but mapping it to the current commit failed.
    RecalculationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingLocation {
    pub reason: MissingReason,
    pub details: String,
}

/// Locations found for a set of markers, plus why the others were not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub locations: LocationsById,
    pub missing: BTreeMap<String, MissingLocation>,
}

impl LocationReport {
    pub fn mark_missing(&mut self, id: &str, reason: MissingReason, details: impl Into<String>) {
        self.missing.insert(
            id.to_string(),
            MissingLocation {
                reason,
                details: details.into(),
            },
        );
    }
}
