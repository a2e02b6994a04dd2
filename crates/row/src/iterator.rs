//! The fallible record-iterator seam between storage layers.

use crate::keyvalue::KeyValue;
use anyhow::Result;

/// A pull iterator of [`KeyValue`] records in ascending (key, seq) order.
///
/// This is the seam between the file layer and the merge layer: data file
/// readers, memtable drains, spill runs and concatenated sorted runs all
/// implement it, and [`crate::LoserTree`] consumes any mix of them.
pub trait KvIterator {
    /// Returns the next record, or `None` when exhausted.
    fn advance(&mut self) -> Result<Option<KeyValue>>;
}

/// An in-memory source, mainly for buffers and tests.
pub struct VecIterator {
    items: std::vec::IntoIter<KeyValue>,
}

impl VecIterator {
    /// Wraps records already in ascending (key, seq) order.
    #[must_use]
    pub fn new(items: Vec<KeyValue>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl KvIterator for VecIterator {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        Ok(self.items.next())
    }
}

impl KvIterator for Box<dyn KvIterator + Send> {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        (**self).advance()
    }
}
