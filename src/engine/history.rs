//! Append-only per-version history that deferred account settlement replays against.

use crate::domain::{Accumulator, Position, Version, VersionSnapshot};
use crate::external::OracleVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulator state after processing one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub oracle: OracleVersion,
    pub value: Accumulator,
    pub share: Accumulator,
}

/// Every version the product has processed, plus a snapshot wherever the aggregate
/// settled position changed. Entries are never rewritten.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: BTreeMap<Version, VersionRecord>,
    snapshots: BTreeMap<Version, VersionSnapshot>,
}

impl History {
    /// Start a history at `genesis` with zero accumulators and no exposure.
    pub fn genesis(genesis: OracleVersion) -> Self {
        let mut history = History::default();
        history.append(VersionRecord {
            oracle: genesis,
            value: Accumulator::zero(),
            share: Accumulator::zero(),
        });
        history.append_snapshot(VersionSnapshot {
            version: genesis.version,
            timestamp: genesis.timestamp,
            position: Position::zero(),
        });
        history
    }

    pub fn record(&self, version: Version) -> Option<&VersionRecord> {
        self.records.get(&version)
    }

    pub fn latest(&self) -> Option<&VersionRecord> {
        self.records.values().next_back()
    }

    /// Value accumulator as of `version` (the last processed version at or before it).
    pub fn value_at(&self, version: Version) -> Accumulator {
        self.at_or_before(version)
            .map(|r| r.value)
            .unwrap_or_default()
    }

    pub fn share_at(&self, version: Version) -> Accumulator {
        self.at_or_before(version)
            .map(|r| r.share)
            .unwrap_or_default()
    }

    /// Aggregate settled position in force at `version`.
    pub fn position_at(&self, version: Version) -> Position {
        self.snapshots
            .range(..=version)
            .next_back()
            .map(|(_, s)| s.position)
            .unwrap_or_default()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &VersionSnapshot> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// History as it would read with `staged` appended.
    pub fn view<'a>(&'a self, staged: &'a [VersionRecord]) -> HistoryView<'a> {
        HistoryView {
            base: self,
            staged,
        }
    }

    pub(crate) fn append(&mut self, record: VersionRecord) {
        self.records.entry(record.oracle.version).or_insert(record);
    }

    pub(crate) fn append_snapshot(&mut self, snapshot: VersionSnapshot) {
        self.snapshots.entry(snapshot.version).or_insert(snapshot);
    }

    fn at_or_before(&self, version: Version) -> Option<&VersionRecord> {
        self.records.range(..=version).next_back().map(|(_, r)| r)
    }
}

/// Read-only view over committed history plus records staged by an uncommitted
/// settlement. Staged records are sorted and newer than anything committed.
#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    base: &'a History,
    staged: &'a [VersionRecord],
}

impl<'a> HistoryView<'a> {
    pub fn record(&self, version: Version) -> Option<&'a VersionRecord> {
        match self
            .staged
            .binary_search_by_key(&version, |r| r.oracle.version)
        {
            Ok(idx) => self.staged.get(idx),
            Err(_) => self.base.record(version),
        }
    }

    pub fn value_at(&self, version: Version) -> Accumulator {
        match self.staged_at_or_before(version) {
            Some(record) => record.value,
            None => self.base.value_at(version),
        }
    }

    pub fn share_at(&self, version: Version) -> Accumulator {
        match self.staged_at_or_before(version) {
            Some(record) => record.share,
            None => self.base.share_at(version),
        }
    }

    fn staged_at_or_before(&self, version: Version) -> Option<&'a VersionRecord> {
        let idx = self
            .staged
            .partition_point(|r| r.oracle.version <= version);
        idx.checked_sub(1).and_then(|i| self.staged.get(i))
    }
}
