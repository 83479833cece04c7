//! Per-query execution state
//!
//! A [`QueryJob`] is the shared state behind one partitioned query: the
//! table lease, the compiled condition, one partial-result slot per
//! task, and the atomic completion counter. The worker that completes
//! the last task runs `combine` and replies to the waiting caller.

use super::database::TableCell;
use super::task::Task;
use crate::query::{AggregateFunc, CompiledCondition, Query, QueryKind, QueryResult};
use crate::table::{Key, Table, Value};
use crate::{LemonError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Rows per task range
pub(crate) const SHARD_SIZE: usize = 100_000;

type SharedTable = ArcRwLockReadGuard<RawRwLock, Table>;
type ExclusiveTable = ArcRwLockWriteGuard<RawRwLock, Table>;

/// Owned table guard held for the lifetime of one query
pub(crate) enum TableGuard {
    Shared(SharedTable),
    Exclusive(ExclusiveTable),
}

/// Query kind with operands resolved against the schema
pub(crate) enum PlannedKind {
    Count,
    Select {
        indices: Vec<usize>,
        fields: Vec<String>,
    },
    Delete,
    Duplicate,
    Update {
        assigns: Vec<(usize, Value)>,
    },
    Aggregate {
        func: AggregateFunc,
        index: usize,
    },
}

impl PlannedKind {
    pub(crate) fn is_destructive(&self) -> bool {
        matches!(self, PlannedKind::Delete | PlannedKind::Update { .. })
    }
}

/// Per-task result handed to combine
pub(crate) enum Partial {
    Count(usize),
    Rows(Vec<(Key, Vec<Value>)>),
    Agg(AggState),
    Failed(LemonError),
}

/// Mergeable aggregate over one field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AggState {
    count: u64,
    sum: i64,
    min: Option<Value>,
    max: Option<Value>,
}

impl AggState {
    pub(crate) fn observe(&mut self, value: Value) {
        self.count += 1;
        self.sum += i64::from(value);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub(crate) fn merge(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            min: merge_extremum(self.min, other.min, Value::min),
            max: merge_extremum(self.max, other.max, Value::max),
        }
    }

    /// Final aggregate value; `None` is the empty aggregate
    pub(crate) fn finish(&self, func: AggregateFunc) -> Option<i64> {
        match func {
            AggregateFunc::Sum => Some(self.sum),
            AggregateFunc::Min => self.min.map(i64::from),
            AggregateFunc::Max => self.max.map(i64::from),
            AggregateFunc::Avg => {
                if self.count == 0 {
                    None
                } else {
                    Some(self.sum / self.count as i64)
                }
            }
        }
    }
}

fn merge_extremum(
    a: Option<Value>,
    b: Option<Value>,
    pick: fn(Value, Value) -> Value,
) -> Option<Value> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

/// Shared state of one in-flight query
pub(crate) struct QueryJob {
    pub(crate) qname: &'static str,
    pub(crate) table_name: String,
    pub(crate) kind: PlannedKind,
    pub(crate) condition: CompiledCondition,
    /// Held from planning until combine; tasks read through it
    pub(crate) lease: RwLock<Option<TableGuard>>,
    total_tasks: usize,
    completed: AtomicUsize,
    aborted: AtomicBool,
    partials: Mutex<Vec<Option<Partial>>>,
    reply: Mutex<Option<Sender<QueryResult>>>,
}

impl QueryJob {
    /// Validate operands, compile the condition, acquire the table
    /// lease and partition the table into tasks.
    ///
    /// Structural errors surface here, before any task is scheduled.
    pub(crate) fn plan(
        cell: Arc<TableCell>,
        query: Query,
    ) -> Result<(Vec<Task>, Receiver<QueryResult>)> {
        let qname = query.qname();
        let destructive = matches!(query.kind, QueryKind::Delete | QueryKind::Update { .. });
        let guard = if destructive {
            TableGuard::Exclusive(cell.write_arc())
        } else {
            TableGuard::Shared(cell.read_arc())
        };
        let table: &Table = match &guard {
            TableGuard::Shared(g) => g,
            TableGuard::Exclusive(g) => g,
        };

        let condition = CompiledCondition::compile(table, &query.condition)?;
        let kind = match query.kind {
            QueryKind::Count => PlannedKind::Count,
            QueryKind::Select { fields } => {
                if fields.is_empty() {
                    return Err(LemonError::InvalidOperand(
                        "SELECT needs at least one field".to_string(),
                    ));
                }
                let indices = fields
                    .iter()
                    .map(|field| table.require_field(field))
                    .collect::<Result<Vec<_>>>()?;
                PlannedKind::Select { indices, fields }
            }
            QueryKind::Delete => PlannedKind::Delete,
            QueryKind::Duplicate => PlannedKind::Duplicate,
            QueryKind::Update { assignments } => {
                if assignments.is_empty() {
                    return Err(LemonError::InvalidOperand(
                        "UPDATE needs at least one assignment".to_string(),
                    ));
                }
                let assigns = assignments
                    .iter()
                    .map(|(field, value)| table.require_field(field).map(|i| (i, *value)))
                    .collect::<Result<Vec<_>>>()?;
                PlannedKind::Update { assigns }
            }
            QueryKind::Aggregate { func, field } => PlannedKind::Aggregate {
                func,
                index: table.require_field(&field)?,
            },
            QueryKind::Insert { .. } | QueryKind::Nop => {
                return Err(LemonError::Internal(
                    "inline query reached the planner".to_string(),
                ))
            }
        };

        // Destructive ranges must not overlap in time; swap-and-pop
        // delete is only sound for a sole writer, so the whole table is
        // one task under the exclusive lease.
        let size = table.len();
        let ranges = if destructive {
            vec![(0, size)]
        } else {
            partition(size)
        };
        let table_name = table.name().to_string();

        let (sender, receiver) = bounded(1);
        let job = Arc::new(QueryJob {
            qname,
            table_name,
            kind,
            condition,
            lease: RwLock::new(Some(guard)),
            total_tasks: ranges.len(),
            completed: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            partials: Mutex::new((0..ranges.len()).map(|_| None).collect()),
            reply: Mutex::new(Some(sender)),
        });
        let tasks = ranges
            .into_iter()
            .enumerate()
            .map(|(index, (begin, end))| Task::new(Arc::clone(&job), index, begin, end))
            .collect();
        Ok((tasks, receiver))
    }

    /// Record a task's partial and, as the last task, combine and reply
    pub(crate) fn complete(&self, index: usize, partial: Partial) {
        {
            let mut partials = self.partials.lock();
            if let Some(slot) = partials.get_mut(index) {
                *slot = Some(partial);
            }
        }
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done == self.total_tasks {
            let result = self.combine();
            if let Some(reply) = self.reply.lock().take() {
                let _ = reply.send(result);
            }
        }
    }

    /// Mark the query aborted and complete the task without running it
    pub(crate) fn abort(&self, index: usize) {
        self.aborted.store(true, Ordering::Release);
        self.complete(index, Partial::Count(0));
    }

    /// Aggregate per-task partials into the final result.
    ///
    /// Happens-after every task completion via the AcqRel counter.
    fn combine(&self) -> QueryResult {
        // Combine must never block on another query's lease (it runs on
        // a worker thread), so the only lock it touches is its own.
        *self.lease.write() = None;

        if self.aborted.load(Ordering::Acquire) {
            return QueryResult::error(self.qname, self.table_name.clone(), &LemonError::Aborted);
        }

        let partials = std::mem::take(&mut *self.partials.lock());
        let mut counter = 0usize;
        let mut agg = AggState::default();
        let mut rows: Vec<(Key, Vec<Value>)> = Vec::new();
        for partial in partials.into_iter().flatten() {
            match partial {
                Partial::Count(n) => counter += n,
                Partial::Rows(mut r) => rows.append(&mut r),
                Partial::Agg(state) => agg = agg.merge(state),
                Partial::Failed(err) => {
                    return QueryResult::error(self.qname, self.table_name.clone(), &err)
                }
            }
        }

        match &self.kind {
            // DUPLICATE's pending buffer is promoted by the caller once
            // this result arrives; the counter is already final.
            PlannedKind::Count
            | PlannedKind::Delete
            | PlannedKind::Duplicate
            | PlannedKind::Update { .. } => QueryResult::RecordCount(counter),
            PlannedKind::Select { fields, .. } => QueryResult::Rows {
                fields: fields.clone(),
                rows,
            },
            PlannedKind::Aggregate { func, .. } => QueryResult::Aggregate(agg.finish(*func)),
        }
    }
}

/// Split `size` rows into consecutive `SHARD_SIZE` ranges; an empty
/// table still yields one empty range so combine has a uniform
/// completion signal.
pub(crate) fn partition(size: usize) -> Vec<(usize, usize)> {
    if size == 0 {
        return vec![(0, 0)];
    }
    let mut ranges = Vec::with_capacity(size.div_ceil(SHARD_SIZE));
    let mut begin = 0;
    while begin < size {
        let end = (begin + SHARD_SIZE).min(size);
        ranges.push((begin, end));
        begin = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_size_preserving() {
        for size in [0, 1, 99_999, 100_000, 100_001, 250_000] {
            let ranges = partition(size);
            assert!(!ranges.is_empty());
            let total: usize = ranges.iter().map(|(b, e)| e - b).sum();
            assert_eq!(total, size, "size {}", size);
            // Ranges are consecutive and in partition order
            let mut expected = 0;
            for &(begin, end) in &ranges {
                assert_eq!(begin, expected);
                assert!(end - begin <= SHARD_SIZE);
                expected = end;
            }
        }
    }

    #[test]
    fn test_partition_boundaries() {
        assert_eq!(partition(0), vec![(0, 0)]);
        assert_eq!(partition(250_000).len(), 3);
        assert_eq!(partition(250_000)[2], (200_000, 250_000));
    }

    #[test]
    fn test_agg_state_merge() {
        let mut a = AggState::default();
        let mut b = AggState::default();
        for v in [3, -1] {
            a.observe(v);
        }
        for v in [7] {
            b.observe(v);
        }
        let merged = a.merge(b);
        assert_eq!(merged.finish(AggregateFunc::Sum), Some(9));
        assert_eq!(merged.finish(AggregateFunc::Min), Some(-1));
        assert_eq!(merged.finish(AggregateFunc::Max), Some(7));
        assert_eq!(merged.finish(AggregateFunc::Avg), Some(3));
    }

    #[test]
    fn test_agg_state_empty() {
        let empty = AggState::default();
        assert_eq!(empty.finish(AggregateFunc::Sum), Some(0));
        assert_eq!(empty.finish(AggregateFunc::Min), None);
        assert_eq!(empty.finish(AggregateFunc::Max), None);
        assert_eq!(empty.finish(AggregateFunc::Avg), None);
        // Merging with an empty side keeps the other side's extrema
        let mut one = AggState::default();
        one.observe(5);
        assert_eq!(empty.merge(one).finish(AggregateFunc::Min), Some(5));
    }

    #[test]
    fn test_agg_sum_wider_than_value() {
        let mut state = AggState::default();
        state.observe(i32::MAX);
        state.observe(i32::MAX);
        assert_eq!(
            state.finish(AggregateFunc::Sum),
            Some(2 * i64::from(i32::MAX))
        );
    }
}
