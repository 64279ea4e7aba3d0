//! Reordering of a job's displayed document list

use crate::error::{JobError, Result};
use crate::job::DocumentEntry;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A requested change to the order of a job's documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reordering {
    /// New order of the valid documents, as indices into the current valid-only list.
    /// Invalid documents keep their slots.
    Indices(Vec<usize>),
    /// Move one entry of the full displayed list
    Move { from: usize, to: usize },
}

/// Apply `reordering` to `entries`, returning how many entries changed position.
///
/// On error the entries are left untouched.
pub(crate) fn apply(entries: &mut Vec<DocumentEntry>, reordering: &Reordering) -> Result<usize> {
    match reordering {
        Reordering::Indices(order) => apply_indices(entries, order),
        Reordering::Move { from, to } => apply_move(entries, *from, *to),
    }
}

fn apply_indices(entries: &mut Vec<DocumentEntry>, order: &[usize]) -> Result<usize> {
    let slots: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.is_valid())
        .map(|(index, _)| index)
        .collect();
    check_permutation(order, slots.len())?;

    // Full-list source index for each destination index
    let mut sources: Vec<usize> = (0..entries.len()).collect();
    for (slot, &picked) in slots.iter().zip(order) {
        sources[*slot] = slots[picked];
    }
    if sources.iter().enumerate().all(|(dest, src)| dest == *src) {
        return Ok(0);
    }

    let mut taken: Vec<Option<DocumentEntry>> = entries.drain(..).map(Some).collect();
    entries.extend(sources.iter().filter_map(|&src| taken[src].take()));

    Ok(renumber(entries, 0..sources.len()))
}

fn apply_move(entries: &mut Vec<DocumentEntry>, from: usize, to: usize) -> Result<usize> {
    let len = entries.len();
    if from >= len || to >= len {
        return Err(JobError::InvalidOrdering(format!(
            "Cannot move entry {} to {} in a list of {}",
            from, to, len
        )));
    }
    if from == to {
        return Ok(0);
    }

    let entry = entries.remove(from);
    entries.insert(to, entry);
    Ok(renumber(entries, from.min(to)..from.max(to) + 1))
}

fn check_permutation(order: &[usize], len: usize) -> Result<()> {
    if order.len() != len {
        return Err(JobError::InvalidOrdering(format!(
            "Expected {} indices, got {}",
            len,
            order.len()
        )));
    }

    let mut seen = vec![false; len];
    for &index in order {
        match seen.get_mut(index) {
            None => {
                return Err(JobError::InvalidOrdering(format!(
                    "Index {} is out of range (0..{})",
                    index, len
                )));
            }
            Some(true) => {
                return Err(JobError::InvalidOrdering(format!(
                    "Index {} appears more than once",
                    index
                )));
            }
            Some(slot) => *slot = true,
        }
    }
    Ok(())
}

/// Sync `position` with the list index for entries in `range`, returning the number rewritten
pub(crate) fn renumber(entries: &mut [DocumentEntry], range: Range<usize>) -> usize {
    let end = range.end.min(entries.len());
    let mut changed = 0;
    for (index, entry) in entries.iter_mut().enumerate().take(end).skip(range.start) {
        if entry.position != index {
            entry.position = index;
            changed += 1;
        }
    }
    changed
}
