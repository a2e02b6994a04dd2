//! The merge engines.

use crate::MergeError;
use row::{Datum, KeyValue, Row, RowKind};

/// The per-key reducer contract.
///
/// `add` is called once per version in ascending sequence order;
/// `get_result` yields the reduced record (or `None` when every version
/// was dropped); `reset` prepares the function for the next key.
pub trait Merger {
    fn reset(&mut self);
    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError>;
    fn get_result(&self) -> Option<KeyValue>;
}

/// The closed set of merge engines.
///
/// Dispatch is a plain `match`: the set of engines is part of the table
/// format and is not user-extensible.
#[derive(Debug)]
pub enum MergeFunction {
    Deduplicate(DeduplicateMerge),
    PartialUpdate(PartialUpdateMerge),
    FirstRow(FirstRowMerge),
    Aggregate(AggregateMerge),
}

impl MergeFunction {
    /// The default engine.
    #[must_use]
    pub fn deduplicate() -> Self {
        MergeFunction::Deduplicate(DeduplicateMerge::default())
    }

    /// Partial-update with the given sequence groups.
    #[must_use]
    pub fn partial_update(groups: Vec<SequenceGroup>, ignore_delete: bool) -> Self {
        MergeFunction::PartialUpdate(PartialUpdateMerge::new(groups, ignore_delete))
    }

    /// First-row.
    #[must_use]
    pub fn first_row() -> Self {
        MergeFunction::FirstRow(FirstRowMerge::default())
    }

    /// Aggregate with per-field ops (`None` = last-non-null).
    #[must_use]
    pub fn aggregate(ops: Vec<Option<AggregateOp>>) -> Self {
        MergeFunction::Aggregate(AggregateMerge::new(ops))
    }
}

impl Merger for MergeFunction {
    fn reset(&mut self) {
        match self {
            MergeFunction::Deduplicate(f) => f.reset(),
            MergeFunction::PartialUpdate(f) => f.reset(),
            MergeFunction::FirstRow(f) => f.reset(),
            MergeFunction::Aggregate(f) => f.reset(),
        }
    }

    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError> {
        match self {
            MergeFunction::Deduplicate(f) => f.add(kv),
            MergeFunction::PartialUpdate(f) => f.add(kv),
            MergeFunction::FirstRow(f) => f.add(kv),
            MergeFunction::Aggregate(f) => f.add(kv),
        }
    }

    fn get_result(&self) -> Option<KeyValue> {
        match self {
            MergeFunction::Deduplicate(f) => f.get_result(),
            MergeFunction::PartialUpdate(f) => f.get_result(),
            MergeFunction::FirstRow(f) => f.get_result(),
            MergeFunction::Aggregate(f) => f.get_result(),
        }
    }
}

// ---------------------------------------------------------------- dedup

/// Keeps the version with the highest sequence; at equal sequence a
/// `Delete` beats any additive kind.
#[derive(Debug, Default)]
pub struct DeduplicateMerge {
    latest: Option<KeyValue>,
}

impl Merger for DeduplicateMerge {
    fn reset(&mut self) {
        self.latest = None;
    }

    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError> {
        match &self.latest {
            Some(current)
                if kv.seq < current.seq
                    || (kv.seq == current.seq
                        && current.kind == RowKind::Delete
                        && kv.kind != RowKind::Delete) => {}
            _ => self.latest = Some(kv),
        }
        Ok(())
    }

    fn get_result(&self) -> Option<KeyValue> {
        self.latest.clone()
    }
}

// ------------------------------------------------------------ first-row

/// Keeps the earliest version of a key, dropping everything after it.
#[derive(Debug, Default)]
pub struct FirstRowMerge {
    first: Option<KeyValue>,
}

impl Merger for FirstRowMerge {
    fn reset(&mut self) {
        self.first = None;
    }

    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError> {
        if self.first.is_none() {
            self.first = Some(kv);
        }
        Ok(())
    }

    fn get_result(&self) -> Option<KeyValue> {
        self.first.clone()
    }
}

// -------------------------------------------------------- partial-update

/// One sequence group: `seq_field` gates updates to `fields`.
///
/// A governed field (and the gate itself) only updates when the incoming
/// record's gate value is non-null and not smaller than the accumulated
/// gate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGroup {
    pub seq_field: usize,
    pub fields: Vec<usize>,
}

/// Folds non-null fields of successive versions into an accumulator.
#[derive(Debug)]
pub struct PartialUpdateMerge {
    groups: Vec<SequenceGroup>,
    ignore_delete: bool,
    acc: Option<KeyValue>,
}

impl PartialUpdateMerge {
    #[must_use]
    pub fn new(groups: Vec<SequenceGroup>, ignore_delete: bool) -> Self {
        Self {
            groups,
            ignore_delete,
            acc: None,
        }
    }

    /// Index of the group that governs `field`, if any.
    fn group_of(&self, field: usize) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.seq_field == field || g.fields.contains(&field))
    }

    fn fold(&self, acc: &mut Row, incoming: &Row) {
        // Decide once per group whether this record wins the gate.
        let admitted: Vec<bool> = self
            .groups
            .iter()
            .map(|g| match (incoming.0.get(g.seq_field), acc.0.get(g.seq_field)) {
                (Some(new), Some(old)) => !new.is_null() && (old.is_null() || new >= old),
                _ => false,
            })
            .collect();

        for (i, new_value) in incoming.0.iter().enumerate() {
            if let Some(g) = self.group_of(i) {
                if admitted[g] {
                    // The gate field always takes the admitted value; the
                    // governed fields keep partial-update null semantics.
                    if i == self.groups[g].seq_field || !new_value.is_null() {
                        acc.0[i] = new_value.clone();
                    }
                }
            } else if !new_value.is_null() {
                acc.0[i] = new_value.clone();
            }
        }
    }
}

impl Merger for PartialUpdateMerge {
    fn reset(&mut self) {
        self.acc = None;
    }

    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError> {
        if kv.kind.is_retract() {
            // -U and -D form one retraction pair in a CDC stream; they are
            // accepted (and dropped) together or not at all.
            if self.ignore_delete {
                return Ok(());
            }
            return Err(MergeError::PartialUpdateRetract {
                kind: kv.kind.to_string(),
            });
        }
        match self.acc.take() {
            None => self.acc = Some(kv),
            Some(acc) => {
                let mut row = acc.value.clone();
                self.fold(&mut row, &kv.value);
                self.acc = Some(KeyValue::new(kv.key, kv.seq.max(acc.seq), RowKind::Insert, row));
            }
        }
        Ok(())
    }

    fn get_result(&self) -> Option<KeyValue> {
        self.acc.clone()
    }
}

// ------------------------------------------------------------- aggregate

/// Per-field aggregators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Max,
    Min,
    LastNonNull,
    ListAgg,
}

impl AggregateOp {
    /// Parses the option-map spelling of an aggregator.
    pub fn parse(s: &str) -> Option<AggregateOp> {
        match s {
            "sum" => Some(AggregateOp::Sum),
            "max" => Some(AggregateOp::Max),
            "min" => Some(AggregateOp::Min),
            "last_non_null" | "last_non_null_value" => Some(AggregateOp::LastNonNull),
            "listagg" => Some(AggregateOp::ListAgg),
            _ => None,
        }
    }

    fn fold(self, acc: &Datum, new: &Datum) -> Result<Datum, MergeError> {
        if new.is_null() {
            return Ok(acc.clone());
        }
        if acc.is_null() {
            return Ok(new.clone());
        }
        let out = match self {
            AggregateOp::LastNonNull => new.clone(),
            AggregateOp::Max => {
                if new > acc {
                    new.clone()
                } else {
                    acc.clone()
                }
            }
            AggregateOp::Min => {
                if new < acc {
                    new.clone()
                } else {
                    acc.clone()
                }
            }
            AggregateOp::Sum => match (acc, new) {
                (Datum::Int(a), Datum::Int(b)) => Datum::Int(a.wrapping_add(*b)),
                (Datum::Long(a), Datum::Long(b)) => Datum::Long(a.wrapping_add(*b)),
                (Datum::Double(a), Datum::Double(b)) => Datum::Double(a + b),
                _ => {
                    return Err(MergeError::BadAggregate {
                        op: "sum".to_string(),
                        value: format!("{new:?}"),
                    })
                }
            },
            AggregateOp::ListAgg => match (acc, new) {
                (Datum::Str(a), Datum::Str(b)) => Datum::Str(format!("{a},{b}")),
                _ => {
                    return Err(MergeError::BadAggregate {
                        op: "listagg".to_string(),
                        value: format!("{new:?}"),
                    })
                }
            },
        };
        Ok(out)
    }
}

/// Folds per-column aggregators over a key's version sequence.
///
/// Fields without a configured op default to last-non-null. Retraction
/// records are rejected: these aggregators cannot subtract.
#[derive(Debug)]
pub struct AggregateMerge {
    ops: Vec<Option<AggregateOp>>,
    acc: Option<KeyValue>,
}

impl AggregateMerge {
    #[must_use]
    pub fn new(ops: Vec<Option<AggregateOp>>) -> Self {
        Self { ops, acc: None }
    }

    fn op(&self, field: usize) -> AggregateOp {
        self.ops
            .get(field)
            .copied()
            .flatten()
            .unwrap_or(AggregateOp::LastNonNull)
    }
}

impl Merger for AggregateMerge {
    fn reset(&mut self) {
        self.acc = None;
    }

    fn add(&mut self, kv: KeyValue) -> Result<(), MergeError> {
        if kv.kind.is_retract() {
            return Err(MergeError::AggregateRetract {
                kind: kv.kind.to_string(),
            });
        }
        match self.acc.take() {
            None => self.acc = Some(kv),
            Some(acc) => {
                let mut folded = Vec::with_capacity(acc.value.arity());
                for i in 0..acc.value.arity() {
                    let old = acc.value.field(i);
                    let new = kv.value.0.get(i).unwrap_or(&Datum::Null);
                    folded.push(self.op(i).fold(old, new)?);
                }
                self.acc = Some(KeyValue::new(
                    kv.key,
                    kv.seq.max(acc.seq),
                    RowKind::Insert,
                    Row(folded),
                ));
            }
        }
        Ok(())
    }

    fn get_result(&self) -> Option<KeyValue> {
        self.acc.clone()
    }
}
