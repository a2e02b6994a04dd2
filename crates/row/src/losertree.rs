//! Tournament (loser-tree) k-way merge.
//!
//! For `k` input iterators the tree keeps the current winner at the root
//! and the loser of every internal match in an array of `k` nodes, so one
//! `advance` costs a single leaf-to-root replay: O(log k) comparisons.
//! Records are ordered by (key ascending, seq ascending), with the source
//! index as the final deterministic tie-break, so a downstream merge
//! function observes all versions of one key consecutively.
//!
//! ```text
//!            losers[0] = winner
//!                  │
//!            ┌─────┴─────┐
//!       losers[1]   losers[2..k)      internal matches (store the loser)
//!            │           │
//!        heads[0..k)                  current head record per source
//!            │
//!        sources[0..k)                KvIterator inputs
//! ```

use crate::iterator::KvIterator;
use crate::keyvalue::KeyValue;
use crate::row::compare_binary_rows;
use anyhow::Result;
use std::cmp::Ordering;

/// A k-way merging iterator over sorted [`KvIterator`] sources.
pub struct LoserTree<I: KvIterator> {
    sources: Vec<I>,
    /// Current head record per source; `None` means exhausted (sorts last).
    heads: Vec<Option<KeyValue>>,
    /// Internal match nodes: `losers[0]` is the overall winner, nodes
    /// `1..k` hold the loser of each match.
    losers: Vec<usize>,
    k: usize,
}

impl<I: KvIterator> LoserTree<I> {
    /// Builds the tree, pulling the first record from every source.
    pub fn new(mut sources: Vec<I>) -> Result<Self> {
        let k = sources.len();
        let mut heads = Vec::with_capacity(k);
        for source in &mut sources {
            heads.push(source.advance()?);
        }
        let mut tree = Self {
            sources,
            heads,
            losers: vec![0; k.max(1)],
            k,
        };
        if k > 0 {
            tree.rebuild();
        }
        Ok(tree)
    }

    /// `true` if source `a`'s head record sorts before source `b`'s.
    fn beats(&self, a: usize, b: usize) -> bool {
        match (&self.heads[a], &self.heads[b]) {
            (Some(x), Some(y)) => match compare_binary_rows(&x.key, &y.key) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => match x.seq.cmp(&y.seq) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => a < b,
                },
            },
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => a < b,
        }
    }

    /// Full O(k) bottom-up build. Leaves live at implicit positions
    /// `k..2k`; internal node `n` has children `2n` and `2n+1`.
    fn rebuild(&mut self) {
        let k = self.k;
        if k == 1 {
            self.losers[0] = 0;
            return;
        }
        let mut winners = vec![usize::MAX; 2 * k];
        for j in 0..k {
            winners[k + j] = j;
        }
        for n in (1..k).rev() {
            let (a, b) = (winners[2 * n], winners[2 * n + 1]);
            let (w, l) = if self.beats(a, b) { (a, b) } else { (b, a) };
            winners[n] = w;
            self.losers[n] = l;
        }
        self.losers[0] = winners[1];
    }

    /// Replays the matches on the path from leaf `j` to the root after
    /// leaf `j` received a new head record.
    fn adjust(&mut self, j: usize) {
        if self.k == 1 {
            self.losers[0] = 0;
            return;
        }
        let mut winner = j;
        let mut n = (self.k + j) / 2;
        loop {
            let loser = self.losers[n];
            if self.beats(loser, winner) {
                self.losers[n] = winner;
                winner = loser;
            }
            if n == 1 {
                break;
            }
            n /= 2;
        }
        self.losers[0] = winner;
    }

    /// Pops the next record in (key, seq) order.
    pub fn next_record(&mut self) -> Result<Option<KeyValue>> {
        if self.k == 0 {
            return Ok(None);
        }
        let w = self.losers[0];
        let record = match self.heads[w].take() {
            Some(kv) => kv,
            None => return Ok(None),
        };
        self.heads[w] = self.sources[w].advance()?;
        self.adjust(w);
        Ok(Some(record))
    }
}

impl<I: KvIterator> KvIterator for LoserTree<I> {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        self.next_record()
    }
}
