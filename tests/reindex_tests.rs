//! Integration tests for priority reindexing.
//!
//! Exercises the shift protocol end to end through the Store.

mod common;

use common::{TestEnv, USER, active_priorities_for};
use taskmgr::{Status, StoreBuilderExt, TaskChanges, View};

// =============================================================================
// Insert Collisions
// =============================================================================

#[test]
fn test_n_inserts_at_same_priority_are_dense() {
    let mut env = TestEnv::new();

    let tasks: Vec<_> = (0..6).map(|n| env.create_task(&format!("Task {}", n), 3)).collect();

    assert_eq!(env.active_priorities(), vec![3, 4, 5, 6, 7, 8]);
    // Last write wins the slot
    assert_eq!(env.priority_of(&tasks[5]), 3);
    assert_eq!(env.priority_of(&tasks[0]), 8);
}

#[test]
fn test_insert_below_gap_moves_nothing() {
    let mut env = TestEnv::new();

    let far = env.create_task("Far", 4);
    env.create_task("New", 2);

    assert_eq!(env.priority_of(&far), 4);
    assert_eq!(env.active_priorities(), vec![2, 4]);
}

#[test]
fn test_insert_into_full_range() {
    let mut env = TestEnv::new();

    let run = env.create_run(3);
    let new = env.create_task("New", 2);

    assert_eq!(env.priority_of(&run[0]), 1);
    assert_eq!(env.priority_of(&new), 2);
    assert_eq!(env.priority_of(&run[1]), 3);
    assert_eq!(env.priority_of(&run[2]), 4);
    assert_eq!(env.active_priorities(), vec![1, 2, 3, 4]);
}

#[test]
fn test_shift_stops_at_first_gap() {
    let mut env = TestEnv::new();

    let a = env.create_task("A", 2);
    let b = env.create_task("B", 3);
    let far = env.create_task("Far", 6);

    env.create_task("New", 2);

    assert_eq!(env.priority_of(&a), 3);
    assert_eq!(env.priority_of(&b), 4);
    assert_eq!(env.priority_of(&far), 6);
}

#[test]
fn test_run_closing_a_gap_stops_there() {
    let mut env = TestEnv::new();

    // 1,2,4,5: inserting at 1 fills the hole at 3 and leaves 4,5 alone
    let one = env.create_task("One", 1);
    let two = env.create_task("Two", 2);
    let four = env.create_task("Four", 4);
    let five = env.create_task("Five", 5);

    env.create_task("New", 1);

    assert_eq!(env.priority_of(&one), 2);
    assert_eq!(env.priority_of(&two), 3);
    assert_eq!(env.priority_of(&four), 4);
    assert_eq!(env.priority_of(&five), 5);
}

// =============================================================================
// Completed and Deleted Tasks
// =============================================================================

#[test]
fn test_completed_task_does_not_collide() {
    let mut env = TestEnv::new();

    let run = env.create_run(2);
    env.complete(&run[1]);

    let new = env.create_task("New", 2);

    assert_eq!(env.priority_of(&new), 2);
    // Frozen duplicate coexists outside the active domain
    assert_eq!(env.priority_of(&run[1]), 2);
    assert_eq!(env.active_priorities(), vec![1, 2]);
}

#[test]
fn test_completing_triggers_no_shift() {
    let mut env = TestEnv::new();

    let run = env.create_run(4);
    let before: Vec<u32> = run.iter().map(|t| env.priority_of(t)).collect();

    env.complete(&run[1]);

    let after: Vec<u32> = run.iter().map(|t| env.priority_of(t)).collect();
    assert_eq!(before, after);
}

#[test]
fn test_completed_priority_stays_frozen() {
    let mut env = TestEnv::new();

    let done = env.create_task("Done", 3);
    env.complete(&done);

    for n in 0..3 {
        env.create_task(&format!("Task {}", n), 3);
    }

    assert_eq!(env.priority_of(&done), 3);
    env.assert_unique_active();
}

#[test]
fn test_deleted_task_does_not_collide() {
    let mut env = TestEnv::new();

    let gone = env.create_task("Gone", 1);
    env.store.delete(USER, &gone.id).unwrap();

    let new = env.create_task("New", 1);

    assert_eq!(env.priority_of(&new), 1);
    assert_eq!(env.active_priorities(), vec![1]);
}

#[test]
fn test_editing_completed_task_priority_does_not_shift() {
    let mut env = TestEnv::new();

    let run = env.create_run(3);
    env.complete(&run[2]);

    env.store
        .update(USER, &run[2].id, TaskChanges::new().with_priority(1))
        .unwrap();

    assert_eq!(env.priority_of(&run[0]), 1);
    assert_eq!(env.priority_of(&run[1]), 2);
}

#[test]
fn test_reopen_collides_like_an_insert() {
    let mut env = TestEnv::new();

    let run = env.create_run(3);
    env.complete(&run[1]);
    let filler = env.create_task("Filler", 2);

    env.store.reopen(USER, &run[1].id).unwrap();

    assert_eq!(env.priority_of(&run[1]), 2);
    assert_eq!(env.priority_of(&filler), 3);
    assert_eq!(env.priority_of(&run[2]), 4);
    env.assert_unique_active();
}

// =============================================================================
// Updates
// =============================================================================

#[test]
fn test_update_own_priority_up() {
    let mut env = TestEnv::new();

    let run = env.create_run(3);
    let moving = env.create_task("Moving", 5);

    env.store
        .update(USER, &moving.id, TaskChanges::new().with_priority(2))
        .unwrap();

    assert_eq!(env.priority_of(&moving), 2);
    assert_eq!(env.priority_of(&run[0]), 1);
    assert_eq!(env.priority_of(&run[1]), 3);
    assert_eq!(env.priority_of(&run[2]), 4);
}

#[test]
fn test_update_own_priority_down_into_run() {
    let mut env = TestEnv::new();

    let run = env.create_run(4);

    // Move T1 to 3: T3 and T4 shift, T1's old slot stays empty
    env.store
        .update(USER, &run[0].id, TaskChanges::new().with_priority(3))
        .unwrap();

    assert_eq!(env.priority_of(&run[0]), 3);
    assert_eq!(env.priority_of(&run[1]), 2);
    assert_eq!(env.priority_of(&run[2]), 4);
    assert_eq!(env.priority_of(&run[3]), 5);
    assert_eq!(env.active_priorities(), vec![2, 3, 4, 5]);
}

#[test]
fn test_status_change_keeps_priorities() {
    let mut env = TestEnv::new();

    let run = env.create_run(3);
    env.store.set_status(USER, &run[1].id, Status::InProgress).unwrap();

    assert_eq!(env.active_priorities(), vec![1, 2, 3]);
}

// =============================================================================
// Isolation
// =============================================================================

#[test]
fn test_users_have_separate_priority_spaces() {
    let mut env = TestEnv::new();
    env.add_user("alfred");

    env.create_run(3);
    env.store.create("alfred", "Alfred task", 1, None).unwrap();
    env.store.create("alfred", "Alfred urgent", 1, None).unwrap();

    assert_eq!(env.active_priorities(), vec![1, 2, 3]);
    assert_eq!(active_priorities_for(&env.store, "alfred"), vec![1, 2]);
}

#[test]
fn test_builder_goes_through_reindex() {
    let mut env = TestEnv::new();

    let run = env.create_run(2);
    env.store.build(USER, "Built").priority(1).create().unwrap();

    assert_eq!(env.priority_of(&run[0]), 2);
    assert_eq!(env.priority_of(&run[1]), 3);
}

#[test]
fn test_mixed_workload_keeps_uniqueness() {
    let mut env = TestEnv::new();

    let mut ids = Vec::new();
    for n in 0..20u32 {
        let priority = (n * 7) % 5 + 1;
        let task = env.create_task(&format!("Task {}", n), priority);
        ids.push(task.id);

        if n % 4 == 3 {
            env.store.complete(USER, &ids[(n / 2) as usize]).unwrap();
        }
        if n % 6 == 5 {
            env.store
                .update(USER, &ids[n as usize - 1], TaskChanges::new().with_priority(2))
                .ok();
        }
        env.assert_unique_active();
    }

    let all = env.store.list(USER, View::All).unwrap();
    assert_eq!(all.len(), 20);
}
