//! In-memory document store.
//!
//! Keeps records in ordered maps keyed by partition and id, behind a
//! `parking_lot::RwLock`. Mirrors the service's status semantics (409 on a
//! duplicate create, not-found on a missing delete) so adapter behaviour can
//! be exercised without an account.
//!
//! Queries are evaluated for the subset the adapter itself produces:
//! `SELECT * FROM <alias>` optionally followed by
//! `WHERE <alias>.<field> = @param` conjuncts joined with `AND`.

use super::{DocumentStore, StoreError, StoreResult};
use crate::query::SqlQuerySpec;
use crate::record::PolicyRecord;
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Partitions = BTreeMap<String, BTreeMap<String, PolicyRecord>>;

#[derive(Debug, Default)]
struct State {
    database_ready: bool,
    container_ready: bool,
    partitions: Partitions,
    recreate_count: usize,
    create_count: usize,
    create_limit: Option<usize>,
}

impl State {
    fn container(&self) -> StoreResult<&Partitions> {
        if !self.container_ready {
            return Err(StoreError::NotFound);
        }
        Ok(&self.partitions)
    }

    fn container_mut(&mut self) -> StoreResult<&mut Partitions> {
        if !self.container_ready {
            return Err(StoreError::NotFound);
        }
        Ok(&mut self.partitions)
    }
}

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all partitions.
    pub fn len(&self) -> usize {
        self.state.read().partitions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored records, ordered by partition then id.
    pub fn records(&self) -> Vec<PolicyRecord> {
        self.state
            .read()
            .partitions
            .values()
            .flat_map(|items| items.values().cloned())
            .collect()
    }

    /// Whether both the database and the container have been created.
    pub fn is_bootstrapped(&self) -> bool {
        let state = self.state.read();
        state.database_ready && state.container_ready
    }

    /// How many times the container has been dropped and recreated.
    pub fn recreate_count(&self) -> usize {
        self.state.read().recreate_count
    }

    /// Makes every create after the first `limit` successful ones fail with a
    /// 503, to simulate a store going away mid-operation. `None` lifts it.
    pub fn set_create_limit(&self, limit: Option<usize>) {
        let mut state = self.state.write();
        state.create_limit = limit;
        state.create_count = 0;
    }
}

impl DocumentStore for MemoryStore {
    fn ensure_database(&self) -> StoreResult<()> {
        self.state.write().database_ready = true;
        Ok(())
    }

    fn ensure_container(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.database_ready {
            return Err(StoreError::NotFound);
        }
        state.container_ready = true;
        Ok(())
    }

    fn recreate_container(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        state.container_mut()?.clear();
        state.recreate_count += 1;
        Ok(())
    }

    fn create_item(&self, record: &PolicyRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        if let Some(limit) = state.create_limit {
            if state.create_count >= limit {
                return Err(StoreError::Status {
                    status: 503,
                    message: "Service unavailable".to_string(),
                });
            }
        }

        let items = state.container_mut()?.entry(record.ptype.clone()).or_default();
        if items.contains_key(&record.id) {
            return Err(StoreError::Status {
                status: 409,
                message: format!("Entity with the specified id already exists: {}", record.id),
            });
        }
        items.insert(record.id.clone(), record.clone());
        state.create_count += 1;
        Ok(())
    }

    fn delete_item(&self, partition: &str, id: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        let removed = state
            .container_mut()?
            .get_mut(partition)
            .and_then(|items| items.remove(id));

        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    fn query_items(
        &self,
        spec: &SqlQuerySpec,
        partition: Option<&str>,
    ) -> StoreResult<Vec<PolicyRecord>> {
        let predicates = compile(spec)?;
        let state = self.state.read();
        let partitions = state.container()?;

        let matches: Vec<PolicyRecord> = partitions
            .iter()
            .filter(|(key, _)| partition.map_or(true, |p| p == key.as_str()))
            .flat_map(|(_, items)| items.values())
            .filter(|record| predicates.iter().all(|p| p.matches(record)))
            .cloned()
            .collect();

        debug!("Memory query '{}' matched {} records", spec.query, matches.len());
        Ok(matches)
    }
}

// ================================================================================================
// QUERY EVALUATION
// ================================================================================================

/// Equality test of one stored field against a bound value.
#[derive(Debug, PartialEq)]
struct Predicate {
    field: String,
    value: String,
}

impl Predicate {
    fn matches(&self, record: &PolicyRecord) -> bool {
        record.field(&self.field) == Some(self.value.as_str())
    }
}

fn compile(spec: &SqlQuerySpec) -> StoreResult<Vec<Predicate>> {
    let unsupported = || StoreError::UnsupportedQuery(spec.query.clone());
    let tokens: Vec<&str> = spec.query.split_whitespace().collect();

    let (alias, rest) = match tokens.as_slice() {
        [select, "*", from, alias, rest @ ..]
            if select.eq_ignore_ascii_case("select") && from.eq_ignore_ascii_case("from") =>
        {
            (*alias, rest)
        }
        _ => return Err(unsupported()),
    };

    let Some((keyword, conditions)) = rest.split_first() else {
        return Ok(Vec::new());
    };
    if !keyword.eq_ignore_ascii_case("where") {
        return Err(unsupported());
    }

    let mut predicates = Vec::new();
    for condition in conditions.split(|token| token.eq_ignore_ascii_case("and")) {
        let [lhs, "=", param] = condition else {
            return Err(unsupported());
        };

        let field = lhs
            .strip_prefix(alias)
            .and_then(|f| f.strip_prefix('.'))
            .filter(|f| PolicyRecord::default().field(f).is_some())
            .ok_or_else(unsupported)?;

        let value = spec
            .parameter(param)
            .and_then(|v| v.as_str())
            .ok_or_else(unsupported)?;

        predicates.push(Predicate {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    Ok(predicates)
}
