//! Priority reindexing.
//!
//! Priorities are unique among a user's active (incomplete, non-deleted)
//! tasks. When a task is written at a priority another active task already
//! holds, the colliding task and every task directly above it in an unbroken
//! run are pushed up by one. The walk stops at the first gap, so only the
//! minimal contiguous run moves.
//!
//! ```text
//! before:  1:a  2:b  3:c  5:d        write x at 2
//! after:   1:a  2:x  3:b  4:c  5:d   (d untouched: gap at 4 ended the run)
//! ```
//!
//! The reindexer never opens transactions itself. Callers run
//! [`reindex_on_write`] inside the write transaction that also persists the
//! task row, so the locked read, the shift and the row write commit or roll
//! back together.

use crate::types::Task;
use eyre::{Result, eyre};

/// An active task's position in the priority space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: String,
    pub priority: u32,
}

/// A single priority bump recorded by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub id: String,
    pub from: u32,
    pub to: u32,
}

/// Store operations the reindexer needs.
pub trait PriorityIndex {
    /// Active tasks of `user` with `priority >= from`, excluding `exclude_id`,
    /// sorted ascending by priority.
    ///
    /// The returned rows must stay write-locked until the enclosing
    /// transaction ends.
    fn lock_candidates(&self, user: &str, from: u32, exclude_id: &str) -> Result<Vec<Slot>>;

    /// Apply every shift or none of them.
    fn apply_shifts(&self, shifts: &[Shift]) -> Result<()>;
}

/// Walk `candidates` (ascending) from `priority` and collect the contiguous
/// run that has to move.
pub fn plan_shifts(priority: u32, candidates: &[Slot]) -> Result<Vec<Shift>> {
    let mut next = priority;
    let mut shifts = Vec::new();

    for slot in candidates {
        if slot.priority != next {
            break;
        }
        let to = next
            .checked_add(1)
            .ok_or_else(|| eyre!("priority overflow while shifting task {}", slot.id))?;
        shifts.push(Shift {
            id: slot.id.clone(),
            from: slot.priority,
            to,
        });
        next = to;
    }

    Ok(shifts)
}

/// Make room for `task` at its priority before it is persisted.
///
/// Completed or deleted tasks are outside the uniqueness domain and cause no
/// shift. The task's own id is excluded from the candidates, so an update
/// never shifts the row being written, while a brand-new id excludes nothing.
/// Returns the shifts that were applied.
pub fn reindex_on_write<I>(index: &I, task: &Task) -> Result<Vec<Shift>>
where
    I: PriorityIndex + ?Sized,
{
    if !task.is_active() {
        log::debug!(
            "Skipping reindex for {} (completed={}, deleted={})",
            task.id,
            task.completed,
            task.deleted
        );
        return Ok(Vec::new());
    }

    let candidates = index.lock_candidates(&task.user, task.priority, &task.id)?;
    let shifts = plan_shifts(task.priority, &candidates)?;

    if !shifts.is_empty() {
        index.apply_shifts(&shifts)?;
        log::debug!(
            "Reindexed {} task(s) for user {} to make room at priority {}",
            shifts.len(),
            task.user,
            task.priority
        );
    }

    Ok(shifts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use chrono::Utc;
    use std::cell::RefCell;

    /// In-memory index over (id, user, priority, active) rows.
    #[derive(Default)]
    struct MemIndex {
        rows: RefCell<Vec<(String, String, u32, bool)>>,
        fail_apply: bool,
    }

    impl MemIndex {
        fn with(rows: &[(&str, u32, bool)]) -> Self {
            Self {
                rows: RefCell::new(
                    rows.iter()
                        .map(|(id, p, active)| (id.to_string(), "bruce".to_string(), *p, *active))
                        .collect(),
                ),
                fail_apply: false,
            }
        }

        fn priority_of(&self, id: &str) -> u32 {
            self.rows.borrow().iter().find(|r| r.0 == id).map(|r| r.2).unwrap()
        }
    }

    impl PriorityIndex for MemIndex {
        fn lock_candidates(&self, user: &str, from: u32, exclude_id: &str) -> Result<Vec<Slot>> {
            let mut slots: Vec<Slot> = self
                .rows
                .borrow()
                .iter()
                .filter(|(id, u, p, active)| *active && u == user && *p >= from && id != exclude_id)
                .map(|(id, _, p, _)| Slot {
                    id: id.clone(),
                    priority: *p,
                })
                .collect();
            slots.sort_by_key(|s| s.priority);
            Ok(slots)
        }

        fn apply_shifts(&self, shifts: &[Shift]) -> Result<()> {
            if self.fail_apply {
                return Err(eyre!("disk full"));
            }
            let mut rows = self.rows.borrow_mut();
            for shift in shifts {
                if let Some(row) = rows.iter_mut().find(|r| r.0 == shift.id) {
                    row.2 = shift.to;
                }
            }
            Ok(())
        }
    }

    fn task(id: &str, priority: u32) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            user: "bruce".to_string(),
            title: format!("Task {}", id),
            description: None,
            status: Status::Pending,
            priority,
            completed: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn slots(items: &[(&str, u32)]) -> Vec<Slot> {
        items
            .iter()
            .map(|(id, p)| Slot {
                id: id.to_string(),
                priority: *p,
            })
            .collect()
    }

    #[test]
    fn test_plan_empty_candidates() {
        assert!(plan_shifts(3, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_plan_no_collision() {
        // Nearest candidate sits above the insertion point
        let shifts = plan_shifts(2, &slots(&[("a", 4), ("b", 5)])).unwrap();
        assert!(shifts.is_empty());
    }

    #[test]
    fn test_plan_contiguous_run() {
        let shifts = plan_shifts(2, &slots(&[("b", 2), ("c", 3), ("d", 4)])).unwrap();
        assert_eq!(
            shifts,
            vec![
                Shift {
                    id: "b".into(),
                    from: 2,
                    to: 3
                },
                Shift {
                    id: "c".into(),
                    from: 3,
                    to: 4
                },
                Shift {
                    id: "d".into(),
                    from: 4,
                    to: 5
                },
            ]
        );
    }

    #[test]
    fn test_plan_stops_at_gap() {
        let shifts = plan_shifts(2, &slots(&[("b", 2), ("c", 3), ("e", 5), ("f", 6)])).unwrap();
        let moved: Vec<&str> = shifts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(moved, vec!["b", "c"]);
    }

    #[test]
    fn test_plan_overflow_is_an_error() {
        let result = plan_shifts(u32::MAX, &slots(&[("a", u32::MAX)]));
        assert!(result.is_err());
    }

    #[test]
    fn test_reindex_insert_into_full_range() {
        let index = MemIndex::with(&[("a", 1, true), ("b", 2, true), ("c", 3, true)]);

        let shifts = reindex_on_write(&index, &task("new", 2)).unwrap();

        assert_eq!(shifts.len(), 2);
        assert_eq!(index.priority_of("a"), 1);
        assert_eq!(index.priority_of("b"), 3);
        assert_eq!(index.priority_of("c"), 4);
    }

    #[test]
    fn test_reindex_gap_above_leaves_everything() {
        let index = MemIndex::with(&[("far", 3, true)]);

        let shifts = reindex_on_write(&index, &task("new", 1)).unwrap();

        assert!(shifts.is_empty());
        assert_eq!(index.priority_of("far"), 3);
    }

    #[test]
    fn test_reindex_ignores_inactive_rows() {
        let index = MemIndex::with(&[("a", 1, true), ("done", 2, false)]);

        let shifts = reindex_on_write(&index, &task("new", 2)).unwrap();

        assert!(shifts.is_empty());
        assert_eq!(index.priority_of("done"), 2);
    }

    #[test]
    fn test_reindex_excludes_own_row() {
        // Updating "e" from 5 to 2; its old row must not be treated as a candidate
        let index = MemIndex::with(&[("a", 1, true), ("b", 2, true), ("c", 3, true), ("e", 5, true)]);

        let shifts = reindex_on_write(&index, &task("e", 2)).unwrap();

        let moved: Vec<&str> = shifts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(moved, vec!["b", "c"]);
        assert_eq!(index.priority_of("a"), 1);
    }

    #[test]
    fn test_reindex_skips_completed_task() {
        let index = MemIndex::with(&[("a", 1, true)]);
        let mut incoming = task("new", 1);
        incoming.completed = true;

        let shifts = reindex_on_write(&index, &incoming).unwrap();

        assert!(shifts.is_empty());
        assert_eq!(index.priority_of("a"), 1);
    }

    #[test]
    fn test_reindex_skips_deleted_task() {
        let index = MemIndex::with(&[("a", 1, true)]);
        let mut incoming = task("new", 1);
        incoming.deleted = true;

        assert!(reindex_on_write(&index, &incoming).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_other_user_untouched() {
        let index = MemIndex::with(&[("a", 1, true)]);
        let mut incoming = task("new", 1);
        incoming.user = "alfred".to_string();

        assert!(reindex_on_write(&index, &incoming).unwrap().is_empty());
        assert_eq!(index.priority_of("a"), 1);
    }

    #[test]
    fn test_reindex_propagates_apply_failure() {
        let mut index = MemIndex::with(&[("a", 1, true)]);
        index.fail_apply = true;

        let result = reindex_on_write(&index, &task("new", 1));

        assert!(result.is_err());
        assert_eq!(index.priority_of("a"), 1);
    }

    #[test]
    fn test_reindex_repeated_inserts_stay_dense() {
        let index = MemIndex::default();

        for n in 0..5 {
            let id = format!("t{}", n);
            let incoming = task(&id, 1);
            reindex_on_write(&index, &incoming).unwrap();
            index
                .rows
                .borrow_mut()
                .push((id, "bruce".to_string(), 1, true));
        }

        let mut priorities: Vec<u32> = index.rows.borrow().iter().map(|r| r.2).collect();
        priorities.sort();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
    }
}
