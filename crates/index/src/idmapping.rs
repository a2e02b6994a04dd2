//! Dense partition ids.
//!
//! Index values store a partition as a small integer rather than the full
//! binary payload. Ids are assigned lazily in first-seen order; the
//! canonical payload lives in an append-only arena indexed by id.

use row::BinaryRow;
use std::collections::HashMap;

/// Bidirectional partition payload <-> dense id mapping.
#[derive(Debug, Default)]
pub struct IdMapping {
    by_payload: HashMap<Vec<u8>, u32>,
    payloads: Vec<BinaryRow>,
}

impl IdMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `partition`, assigning the next dense id on
    /// first sight.
    pub fn id_of(&mut self, partition: &BinaryRow) -> u32 {
        if let Some(&id) = self.by_payload.get(partition.as_bytes()) {
            return id;
        }
        let id = self.payloads.len() as u32;
        self.by_payload.insert(partition.as_bytes().to_vec(), id);
        self.payloads.push(partition.clone());
        id
    }

    /// The canonical payload for `id`, if assigned.
    #[must_use]
    pub fn partition_of(&self, id: u32) -> Option<&BinaryRow> {
        self.payloads.get(id as usize)
    }

    /// Number of assigned ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// `true` when no id has been assigned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}
