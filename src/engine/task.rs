//! Task execution
//!
//! A task scans one contiguous row range of one table for one query,
//! accumulating a per-range counter, projection list or aggregate.
//! Ranges are fixed at planning time; a task clamps its end to the
//! current table size and never extends its range.

use super::job::{AggState, Partial, PlannedKind, QueryJob, TableGuard};
use crate::table::Table;
use crate::LemonError;
use std::sync::Arc;

/// A unit of work on one row range `[begin, end)`
pub(crate) struct Task {
    pub(crate) job: Arc<QueryJob>,
    index: usize,
    begin: usize,
    end: usize,
}

impl Task {
    pub(crate) fn new(job: Arc<QueryJob>, index: usize, begin: usize, end: usize) -> Self {
        Self {
            job,
            index,
            begin,
            end,
        }
    }

    /// Execute the range scan and report completion to the owning query
    pub(crate) fn run(self) {
        let partial = if self.job.kind.is_destructive() {
            self.execute_exclusive()
        } else {
            self.execute_shared()
        };
        self.job.complete(self.index, partial);
    }

    /// Report completion without executing (pool shutdown)
    pub(crate) fn abort(self) {
        self.job.abort(self.index);
    }

    fn execute_shared(&self) -> Partial {
        let lease = self.job.lease.read();
        let table: &Table = match lease.as_ref() {
            Some(TableGuard::Shared(guard)) => guard,
            _ => {
                return Partial::Failed(LemonError::Internal(
                    "task ran without a shared table lease".to_string(),
                ))
            }
        };
        let end = self.end.min(table.len());
        let begin = self.begin.min(end);
        let condition = &self.job.condition;

        match &self.job.kind {
            PlannedKind::Count => {
                let mut counter = 0;
                for datum in &table.rows()[begin..end] {
                    if condition.matches_row(datum) {
                        counter += 1;
                    }
                }
                Partial::Count(counter)
            }
            PlannedKind::Select { indices, .. } => {
                let mut out = Vec::new();
                for datum in &table.rows()[begin..end] {
                    if condition.matches_row(datum) {
                        let projected = indices.iter().filter_map(|&i| datum.get(i)).collect();
                        out.push((datum.key().to_string(), projected));
                    }
                }
                Partial::Rows(out)
            }
            PlannedKind::Duplicate => {
                let mut counter = 0;
                for datum in &table.rows()[begin..end] {
                    if condition.matches_row(datum) {
                        table.schedule_duplicate(datum);
                        counter += 1;
                    }
                }
                Partial::Count(counter)
            }
            PlannedKind::Aggregate { index, .. } => {
                let mut agg = AggState::default();
                for datum in &table.rows()[begin..end] {
                    if condition.matches_row(datum) {
                        if let Some(value) = datum.get(*index) {
                            agg.observe(value);
                        }
                    }
                }
                Partial::Agg(agg)
            }
            PlannedKind::Delete | PlannedKind::Update { .. } => Partial::Failed(
                LemonError::Internal("destructive task on a shared lease".to_string()),
            ),
        }
    }

    fn execute_exclusive(&self) -> Partial {
        let mut lease = self.job.lease.write();
        let table: &mut Table = match lease.as_mut() {
            Some(TableGuard::Exclusive(guard)) => guard,
            _ => {
                return Partial::Failed(LemonError::Internal(
                    "destructive task without an exclusive table lease".to_string(),
                ))
            }
        };
        let condition = &self.job.condition;

        match &self.job.kind {
            PlannedKind::Delete => {
                let mut end = self.end.min(table.len());
                let mut i = self.begin;
                let mut counter = 0;
                while i < end {
                    if condition.matches_row(&table.rows()[i]) {
                        if let Err(err) = table.erase_at(i) {
                            return Partial::Failed(err);
                        }
                        counter += 1;
                        // The last row was swapped into slot i; evaluate
                        // it next instead of advancing.
                        end = table.len().min(end);
                    } else {
                        i += 1;
                    }
                }
                Partial::Count(counter)
            }
            PlannedKind::Update { assigns } => {
                let end = self.end.min(table.len());
                let mut counter = 0;
                for i in self.begin..end {
                    if condition.matches_row(&table.rows()[i]) {
                        if let Err(err) = table.update_at(i, assigns) {
                            return Partial::Failed(err);
                        }
                        counter += 1;
                    }
                }
                Partial::Count(counter)
            }
            _ => Partial::Failed(LemonError::Internal(
                "non-destructive task on an exclusive lease".to_string(),
            )),
        }
    }
}
