//! Append-only fact ledger.
//!
//! Facts are never deleted. Retiring a fact appends `(id, reason)` to the
//! retirement log; every query skips retired facts, and the log keeps the
//! full history for auditing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::graph::Triple;

use super::{Fact, FactKind};

/// Identifier of a fact within one [`FactStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactId(pub usize);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a fact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactOrigin {
    /// Emitted by the node classifier.
    Classified,
    /// Derived during resolution from other facts.
    Derived { from: Vec<FactId> },
}

/// A fact with its identity, source triples and origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    pub id: FactId,
    pub fact: Fact,
    /// Graph triples the fact was read from.
    pub sources: BTreeSet<Triple>,
    pub origin: FactOrigin,
}

/// The fact ledger of one compilation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FactStore {
    records: Vec<FactRecord>,
    retirements: Vec<(FactId, String)>,
    #[serde(skip)]
    retired_index: BTreeMap<FactId, usize>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a classified fact.
    pub fn assert<I>(&mut self, fact: Fact, sources: I) -> FactId
    where
        I: IntoIterator<Item = Triple>,
    {
        self.push(fact, sources.into_iter().collect(), FactOrigin::Classified)
    }

    /// Add a fact derived from active facts; it inherits their source triples.
    pub fn derive(&mut self, fact: Fact, from: &[FactId]) -> CompileResult<FactId> {
        let mut sources = BTreeSet::new();
        for id in from {
            sources.extend(self.active(*id)?.sources.iter().cloned());
        }
        Ok(self.push(
            fact,
            sources,
            FactOrigin::Derived {
                from: from.to_vec(),
            },
        ))
    }

    fn push(&mut self, fact: Fact, sources: BTreeSet<Triple>, origin: FactOrigin) -> FactId {
        let id = FactId(self.records.len());
        tracing::trace!(%id, %fact, "fact recorded");
        self.records.push(FactRecord {
            id,
            fact,
            sources,
            origin,
        });
        id
    }

    /// Retire a fact with a reason. Retiring twice is an invariant violation.
    pub fn retire(&mut self, id: FactId, reason: impl Into<String>) -> CompileResult<()> {
        self.active(id)?;
        let reason = reason.into();
        tracing::trace!(%id, %reason, "fact retired");
        self.retired_index.insert(id, self.retirements.len());
        self.retirements.push((id, reason));
        Ok(())
    }

    /// Any fact, active or retired.
    pub fn get(&self, id: FactId) -> CompileResult<&FactRecord> {
        self.records
            .get(id.0)
            .ok_or(CompileError::UnknownFact { id: id.0 })
    }

    /// An active fact; a retired one is an invariant violation.
    pub fn active(&self, id: FactId) -> CompileResult<&FactRecord> {
        let record = self.get(id)?;
        match self.retirement_reason(id) {
            Some(reason) => Err(CompileError::FactRetired {
                id: id.0,
                reason: reason.to_string(),
            }),
            None => Ok(record),
        }
    }

    pub fn is_active(&self, id: FactId) -> bool {
        id.0 < self.records.len() && !self.retired_index.contains_key(&id)
    }

    pub fn retirement_reason(&self, id: FactId) -> Option<&str> {
        self.retired_index
            .get(&id)
            .and_then(|idx| self.retirements.get(*idx))
            .map(|(_, reason)| reason.as_str())
    }

    /// Active facts in insertion order.
    pub fn active_records(&self) -> impl Iterator<Item = &FactRecord> {
        self.records
            .iter()
            .filter(|r| !self.retired_index.contains_key(&r.id))
    }

    /// Active facts of exactly this kind.
    pub fn of_kind(&self, kind: FactKind) -> Vec<&FactRecord> {
        self.active_records()
            .filter(|r| r.fact.kind() == kind)
            .collect()
    }

    /// Active facts whose kind is assignable to `kind`.
    pub fn assignable_to(&self, kind: FactKind) -> Vec<&FactRecord> {
        self.active_records()
            .filter(|r| r.fact.kind().is_assignable_to(kind))
            .collect()
    }

    /// Retired facts with their reasons, in retirement order.
    pub fn retired(&self) -> impl Iterator<Item = (&FactRecord, &str)> {
        self.retirements
            .iter()
            .filter_map(|(id, reason)| self.records.get(id.0).map(|r| (r, reason.as_str())))
    }

    /// Facts derived during resolution.
    pub fn derived(&self) -> impl Iterator<Item = &FactRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.origin, FactOrigin::Derived { .. }))
    }

    pub fn records(&self) -> &[FactRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.records.len() - self.retirements.len()
    }

    pub fn retired_count(&self) -> usize {
        self.retirements.len()
    }
}
