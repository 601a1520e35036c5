use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::git::Edit;

use super::types::{Location, LocationsById, MAX_RANGE_VALUE};

/// Body of a "calculate locations" call. Without `new_commit_hash` the edits
/// lead to the live buffer rather than to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateLocationsRequest {
    pub team_id: String,
    pub stream_id: String,
    pub original_commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_commit_hash: Option<String>,
    pub edits: Vec<Edit>,
    pub locations: LocationsById,
}

/// Maps locations through a list of edits. Implemented remotely by the
/// collaboration service, or locally by [`LineShiftCalculator`].
#[async_trait]
pub trait LocationCalculator: Send + Sync {
    async fn calculate_locations(
        &self,
        request: CalculateLocationsRequest,
    ) -> anyhow::Result<LocationsById>;
}

/// Pure line arithmetic: no content matching, columns survive unless a range
/// end had to be trimmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineShiftCalculator;

#[async_trait]
impl LocationCalculator for LineShiftCalculator {
    async fn calculate_locations(
        &self,
        request: CalculateLocationsRequest,
    ) -> anyhow::Result<LocationsById> {
        Ok(shift_locations(&request.locations, &request.edits))
    }
}

pub fn shift_locations(locations: &LocationsById, edits: &[Edit]) -> LocationsById {
    let mut sorted = edits.to_vec();
    sorted.sort_by_key(|e| e.del_start);
    locations
        .iter()
        .map(|(id, loc)| (id.clone(), shift_location(loc, &sorted)))
        .collect()
}

enum LineFate<'a> {
    Moved(u32),
    Deleted(&'a Edit),
}

fn map_line(line: u32, edits: &[Edit]) -> LineFate<'_> {
    let mut offset: i64 = 0;
    for edit in edits {
        if line < edit.del_start {
            break;
        }
        if line < edit.del_start + edit.del_length {
            return LineFate::Deleted(edit);
        }
        offset += i64::from(edit.add_length) - i64::from(edit.del_length);
    }
    LineFate::Moved((i64::from(line) + offset).max(1) as u32)
}

fn touches(edit: &Edit, start: u32, end: u32) -> bool {
    if edit.del_length == 0 {
        start < edit.del_start && edit.del_start <= end
    } else {
        edit.del_start <= end && edit.del_start + edit.del_length > start
    }
}

/// `edits` must be ordered by `del_start`.
pub fn shift_location(location: &Location, edits: &[Edit]) -> Location {
    let mut out = location.clone();

    match (
        map_line(location.line_start, edits),
        map_line(location.line_end, edits),
    ) {
        (LineFate::Deleted(a), LineFate::Deleted(b)) if a == b => {
            let line = a.add_start + a.add_length;
            out.line_start = line;
            out.col_start = 1;
            out.line_end = line;
            out.col_end = 1;
            let meta = out.meta_mut();
            meta.start_was_deleted = true;
            meta.end_was_deleted = true;
            meta.entirely_deleted = true;
        }
        (start, end) => {
            match start {
                LineFate::Moved(line) => out.line_start = line,
                LineFate::Deleted(edit) => {
                    out.line_start = edit.add_start + edit.add_length;
                    out.col_start = 1;
                    out.meta_mut().start_was_deleted = true;
                }
            }
            match end {
                LineFate::Moved(line) => out.line_end = line,
                LineFate::Deleted(edit) => {
                    out.line_end = edit.add_start.saturating_sub(1);
                    out.col_end = MAX_RANGE_VALUE;
                    out.meta_mut().end_was_deleted = true;
                }
            }
        }
    }

    if edits
        .iter()
        .any(|e| touches(e, location.line_start, location.line_end))
    {
        out.meta_mut().content_changed = true;
    }
    out
}
