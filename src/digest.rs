//! Daily task digests.
//!
//! Composition and due-ness only. Delivery is behind the [`Mailer`] trait and
//! nothing here runs on a timer: callers invoke [`run_due`] as often as they
//! like, and a schedule fires at most once per UTC day.

use crate::config::DigestConfig;
use crate::store::Store;
use crate::types::{Schedule, Status};
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A composed digest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: {}", self.to)?;
        writeln!(f, "Subject: {}", self.subject)?;
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}

/// Hands composed digests to whatever delivers them.
pub trait Mailer {
    fn send(&mut self, email: &Email) -> Result<()>;
}

/// Mailer that keeps every message in memory.
#[derive(Debug, Default)]
pub struct Outbox {
    pub sent: Vec<Email>,
}

impl Mailer for Outbox {
    fn send(&mut self, email: &Email) -> Result<()> {
        self.sent.push(email.clone());
        Ok(())
    }
}

/// Build the report for one user from their per-status counts.
pub fn compose(username: &str, email: &str, counts: &HashMap<Status, usize>, cfg: &DigestConfig) -> Email {
    let count = |status: Status| counts.get(&status).copied().unwrap_or(0);

    Email {
        to: email.to_string(),
        from: cfg.from_address.clone(),
        subject: cfg.subject.clone(),
        body: format!(
            "Hi {}.\nYour task report is shown below:\nPending:{}\nINProgress:{}\nCompleted:{}",
            username,
            count(Status::Pending),
            count(Status::InProgress),
            count(Status::Completed)
        ),
    }
}

/// True once today's send time has passed and nothing went out today.
pub fn is_due(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    let fire_at = today.and_time(schedule.time).and_utc();

    if fire_at > now {
        return false;
    }

    match schedule.last_sent_at {
        Some(sent) => sent.date_naive() < today,
        None => true,
    }
}

/// Outcome of one [`run_due`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DigestRun {
    /// Users whose digest was handed off
    pub sent: Vec<String>,
    /// Users whose digest failed; they stay due
    pub failed: Vec<String>,
}

/// Send every due digest through `mailer`.
///
/// A failure for one user is logged and does not stop the others. Only a
/// successful hand-off marks the schedule as sent.
pub fn run_due<M: Mailer + ?Sized>(
    store: &mut Store,
    mailer: &mut M,
    now: DateTime<Utc>,
    cfg: &DigestConfig,
) -> Result<DigestRun> {
    let mut run = DigestRun::default();

    for schedule in store.schedules()? {
        if !is_due(&schedule, now) {
            continue;
        }

        match send_one(store, mailer, &schedule.user, cfg) {
            Ok(()) => {
                store.mark_digest_sent(&schedule.user, now)?;
                log::info!("Sent digest to {}", schedule.user);
                run.sent.push(schedule.user);
            }
            Err(e) => {
                log::warn!("Digest for {} failed: {}", schedule.user, e);
                run.failed.push(schedule.user);
            }
        }
    }

    Ok(run)
}

fn send_one<M: Mailer + ?Sized>(store: &Store, mailer: &mut M, username: &str, cfg: &DigestConfig) -> Result<()> {
    let user = store
        .get_user(username)?
        .ok_or_else(|| eyre!("user {} no longer exists", username))?;
    let counts = store.status_counts(username)?;
    mailer.send(&compose(&user.username, &user.email, &counts, cfg))
}
