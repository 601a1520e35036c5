use crate::error::DiffError;

use super::types::{Delta, Edit, LineOp, Patch, PatchHunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync,
    Edit,
}

/// Turns a parsed patch into the list of contiguous replaced blocks.
///
/// Two states: `Sync` while walking context lines, `Edit` while collecting
/// adds/dels. Entering `Edit` captures the start lines from the last sync
/// point; returning to `Sync` emits the buffered [`Edit`].
pub struct DeltaBuilder<'a> {
    patch: &'a Patch,
    state: State,
    edits: Vec<Edit>,
    // line numbers of the last sync point
    sync_old: u32,
    sync_new: u32,
    del_start: u32,
    add_start: u32,
    dels: Vec<String>,
    adds: Vec<String>,
}

impl<'a> DeltaBuilder<'a> {
    pub fn new(patch: &'a Patch) -> Self {
        Self {
            patch,
            state: State::Sync,
            edits: Vec::new(),
            sync_old: 0,
            sync_new: 0,
            del_start: 0,
            add_start: 0,
            dels: Vec::new(),
            adds: Vec::new(),
        }
    }

    /// Convenience for `DeltaBuilder::new(patch).build()`.
    pub fn build_delta(patch: &Patch) -> Result<Delta, DiffError> {
        DeltaBuilder::new(patch).build()
    }

    pub fn build(mut self) -> Result<Delta, DiffError> {
        let patch = self.patch;
        for hunk in &patch.hunks {
            self.process_hunk(hunk)?;
        }
        self.transition(State::Sync);
        Ok(Delta {
            old_file: patch.old_file_name.clone(),
            new_file: patch.new_file_name.clone(),
            edits: self.edits,
        })
    }

    fn process_hunk(&mut self, hunk: &PatchHunk) -> Result<(), DiffError> {
        // An edit never spans two hunks.
        self.transition(State::Sync);

        let mut old_line = hunk.old_start;
        let mut new_line = hunk.new_start;
        // A zero-length side names the line *before* the hunk; otherwise the
        // hunk starts on that line and the virtual sync point is one above.
        self.sync_old = seed(hunk.old_start, hunk.old_lines);
        self.sync_new = seed(hunk.new_start, hunk.new_lines);

        for raw in &hunk.lines {
            let Some((op, content)) = LineOp::classify(raw)? else {
                continue;
            };
            match op {
                LineOp::Sync => {
                    self.transition(State::Sync);
                    self.sync_old = old_line;
                    self.sync_new = new_line;
                    old_line += 1;
                    new_line += 1;
                }
                LineOp::Add => {
                    self.transition(State::Edit);
                    self.adds.push(content.to_string());
                    new_line += 1;
                }
                LineOp::Del => {
                    self.transition(State::Edit);
                    self.dels.push(content.to_string());
                    old_line += 1;
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: State) {
        if next == self.state {
            return;
        }
        self.state = next;
        match next {
            State::Edit => {
                self.del_start = self.sync_old + 1;
                self.add_start = self.sync_new + 1;
                self.dels.clear();
                self.adds.clear();
            }
            State::Sync => {
                let dels = std::mem::take(&mut self.dels);
                let adds = std::mem::take(&mut self.adds);
                self.edits.push(Edit {
                    del_start: self.del_start,
                    add_start: self.add_start,
                    del_length: dels.len() as u32,
                    add_length: adds.len() as u32,
                    dels,
                    adds,
                });
            }
        }
    }
}

fn seed(start: u32, count: u32) -> u32 {
    if count == 0 {
        start
    } else {
        start.saturating_sub(1)
    }
}
