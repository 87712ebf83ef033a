//! Integration tests for scheduled digests.

mod common;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use common::{TestEnv, USER};
use eyre::{Result, bail};
use taskmgr::Status;
use taskmgr::config::DigestConfig;
use taskmgr::digest::{Email, Mailer, Outbox, run_due};

/// Mailer that rejects every message.
struct Bouncing;

impl Mailer for Bouncing {
    fn send(&mut self, email: &Email) -> Result<()> {
        bail!("mailbox for {} is full", email.to)
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap()
}

fn nine_am() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap()
}

/// One task in each of pending / in progress / completed.
fn seed_tasks(env: &mut TestEnv) {
    env.create_task("Task with title 1", 1);
    let second = env.create_task("Task with title 2", 2);
    env.store.set_status(USER, &second.id, Status::InProgress).unwrap();
    let third = env.create_task("Task with title 3", 3);
    env.complete(&third);
}

#[test]
fn test_due_digest_is_sent_once_per_day() {
    let mut env = TestEnv::new();
    seed_tasks(&mut env);
    env.store.set_schedule(USER, nine_am()).unwrap();

    let mut outbox = Outbox::default();
    let cfg = DigestConfig::default();

    let run = run_due(&mut env.store, &mut outbox, at(9, 2), &cfg).unwrap();
    assert_eq!(run.sent, vec![USER.to_string()]);
    assert_eq!(outbox.sent.len(), 1);

    let email = &outbox.sent[0];
    assert_eq!(email.to, "bruce@wayne.org");
    assert_eq!(email.subject, "Task Report from Task Manager");
    assert_eq!(
        email.body,
        "Hi bruce.\nYour task report is shown below:\nPending:1\nINProgress:1\nCompleted:1"
    );

    // Same day, later run
    let run = run_due(&mut env.store, &mut outbox, at(18, 0), &cfg).unwrap();
    assert!(run.sent.is_empty());
    assert_eq!(outbox.sent.len(), 1);

    // Next day
    run_due(&mut env.store, &mut outbox, at(9, 0) + Duration::days(1), &cfg).unwrap();
    assert_eq!(outbox.sent.len(), 2);
}

#[test]
fn test_digest_not_sent_before_schedule() {
    let mut env = TestEnv::new();
    env.store.set_schedule(USER, nine_am()).unwrap();

    let mut outbox = Outbox::default();
    run_due(&mut env.store, &mut outbox, at(8, 30), &DigestConfig::default()).unwrap();

    assert!(outbox.sent.is_empty());
    assert!(env.store.schedule(USER).unwrap().unwrap().last_sent_at.is_none());
}

#[test]
fn test_users_without_schedule_get_nothing() {
    let mut env = TestEnv::new();
    env.add_user("alfred");
    env.store.set_schedule("alfred", nine_am()).unwrap();

    let mut outbox = Outbox::default();
    run_due(&mut env.store, &mut outbox, at(10, 0), &DigestConfig::default()).unwrap();

    assert_eq!(outbox.sent.len(), 1);
    assert_eq!(outbox.sent[0].to, "alfred@wayne.org");
}

#[test]
fn test_failed_delivery_stays_due() {
    let mut env = TestEnv::new();
    env.store.set_schedule(USER, nine_am()).unwrap();
    let cfg = DigestConfig::default();

    let run = run_due(&mut env.store, &mut Bouncing, at(9, 5), &cfg).unwrap();
    assert_eq!(run.failed, vec![USER.to_string()]);
    assert!(env.store.schedule(USER).unwrap().unwrap().last_sent_at.is_none());

    let mut outbox = Outbox::default();
    let run = run_due(&mut env.store, &mut outbox, at(9, 6), &cfg).unwrap();
    assert_eq!(run.sent, vec![USER.to_string()]);
}

#[test]
fn test_reschedule_same_day_does_not_resend() {
    let mut env = TestEnv::new();
    let cfg = DigestConfig::default();
    let mut outbox = Outbox::default();

    env.store
        .set_schedule(USER, NaiveTime::from_hms_opt(13, 0, 0).unwrap())
        .unwrap();
    run_due(&mut env.store, &mut outbox, at(13, 1), &cfg).unwrap();

    env.store
        .set_schedule(USER, NaiveTime::from_hms_opt(15, 0, 0).unwrap())
        .unwrap();
    run_due(&mut env.store, &mut outbox, at(15, 1), &cfg).unwrap();

    assert_eq!(outbox.sent.len(), 1);
}

#[test]
fn test_reschedule_earlier_same_day_sends() {
    let mut env = TestEnv::new();
    let cfg = DigestConfig::default();
    let mut outbox = Outbox::default();

    // Was 14:00; at 12:00 the user moves it to 13:00
    env.store
        .set_schedule(USER, NaiveTime::from_hms_opt(14, 0, 0).unwrap())
        .unwrap();
    run_due(&mut env.store, &mut outbox, at(12, 0), &cfg).unwrap();
    env.store
        .set_schedule(USER, NaiveTime::from_hms_opt(13, 0, 0).unwrap())
        .unwrap();
    run_due(&mut env.store, &mut outbox, at(13, 2), &cfg).unwrap();

    assert_eq!(outbox.sent.len(), 1);
}

#[test]
fn test_custom_sender_and_subject() {
    let mut env = TestEnv::new();
    env.store.set_schedule(USER, nine_am()).unwrap();
    let cfg = DigestConfig {
        from_address: "reports@wayne.org".to_string(),
        subject: "Your tasks".to_string(),
    };

    let mut outbox = Outbox::default();
    run_due(&mut env.store, &mut outbox, at(9, 0), &cfg).unwrap();

    assert_eq!(outbox.sent[0].from, "reports@wayne.org");
    assert_eq!(outbox.sent[0].subject, "Your tasks");
    assert!(outbox.sent[0].body.contains("Pending:0"));
}
