//! All / Pending / Ran / Status views
//!
//! Pure functions over a scanner snapshot (ids on disk, ascending) and a
//! ledger snapshot. The migrator takes both snapshots and calls into here.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::ledger::LedgerEntry;

/// Ids on disk without a ledger entry, oldest first
pub fn pending(all: &[String], ran: &[LedgerEntry]) -> Vec<String> {
    let ran: HashSet<&str> = ran.iter().map(|e| e.migration.as_str()).collect();
    all.iter()
        .filter(|id| !ran.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Ran entries in the order `down` reverts them: latest `ran_at` first, ties by id
pub fn revert_order(ran: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let mut entries = ran.to_vec();
    entries.sort_by(|a, b| {
        b.ran_at
            .cmp(&a.ran_at)
            .then_with(|| b.migration.cmp(&a.migration))
    });
    entries
}

/// The id following `last` in `all`
pub fn successor<'a>(all: &'a [String], last: &str) -> Option<&'a String> {
    let position = all.iter().position(|id| id == last)?;
    all.get(position + 1)
}

/// One row of the status view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub id: String,
    pub ran_at: Option<NaiveDateTime>,
}

impl StatusEntry {
    pub fn is_pending(&self) -> bool {
        self.ran_at.is_none()
    }
}

/// Every migration on disk with its state, plus ledger entries with no directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub entries: Vec<StatusEntry>,
    pub orphans: Vec<LedgerEntry>,
}

impl MigrationStatus {
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn ran_count(&self) -> usize {
        self.entries.len() - self.pending_count()
    }
}

pub fn status(all: &[String], ran: &[LedgerEntry]) -> MigrationStatus {
    let on_disk: HashSet<&str> = all.iter().map(String::as_str).collect();
    let ran_at: HashMap<&str, NaiveDateTime> = ran
        .iter()
        .map(|e| (e.migration.as_str(), e.ran_at))
        .collect();

    let entries = all
        .iter()
        .map(|id| StatusEntry {
            id: id.clone(),
            ran_at: ran_at.get(id.as_str()).copied(),
        })
        .collect();

    let mut orphans: Vec<LedgerEntry> = ran
        .iter()
        .filter(|e| !on_disk.contains(e.migration.as_str()))
        .cloned()
        .collect();
    orphans.sort_by(|a, b| a.migration.cmp(&b.migration));

    MigrationStatus { entries, orphans }
}
