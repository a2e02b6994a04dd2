//! Drives a sorted record stream through a merge function.

use crate::functions::{MergeFunction, Merger};
use anyhow::Result;
use row::{KeyValue, KvIterator};

/// Reduces an ascending (key, seq) stream to one record per key.
///
/// Pulls from the underlying iterator, feeding every version of the
/// current key into the merge function; when the key changes (or input
/// ends) the merged result is emitted. Records whose merged result is
/// `None` (e.g. every version dropped) produce nothing.
pub struct MergeReader<I: KvIterator> {
    input: I,
    function: MergeFunction,
    /// First record of the next key cluster, read ahead of emission.
    pending: Option<KeyValue>,
    started: bool,
}

impl<I: KvIterator> MergeReader<I> {
    /// Wraps `input`, which must yield ascending (key, seq) order.
    pub fn new(input: I, function: MergeFunction) -> Self {
        Self {
            input,
            function,
            pending: None,
            started: false,
        }
    }

    /// Returns the next merged record, or `None` when the input is
    /// exhausted.
    pub fn next_merged(&mut self) -> Result<Option<KeyValue>> {
        loop {
            // Pull the first record of the next cluster.
            let head = match self.pending.take() {
                Some(kv) => kv,
                None => {
                    if self.started {
                        return Ok(None);
                    }
                    match self.input.advance()? {
                        Some(kv) => kv,
                        None => return Ok(None),
                    }
                }
            };
            self.started = true;

            let cluster_key = head.key.clone();
            self.function.reset();
            self.function.add(head)?;

            // Consume the rest of the cluster.
            loop {
                match self.input.advance()? {
                    Some(kv) if kv.key == cluster_key => self.function.add(kv)?,
                    Some(kv) => {
                        self.pending = Some(kv);
                        break;
                    }
                    None => break,
                }
            }

            if let Some(merged) = self.function.get_result() {
                return Ok(Some(merged));
            }
            // All versions dropped; continue with the next cluster, if
            // one was read ahead.
            if self.pending.is_none() {
                return Ok(None);
            }
        }
    }
}

impl<I: KvIterator> KvIterator for MergeReader<I> {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        self.next_merged()
    }
}
