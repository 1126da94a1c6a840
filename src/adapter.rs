//! # Policy Adapter
//!
//! Storage side of the enforcement engine: loads rules from the document
//! store into the engine's model and persists rule changes back.
//!
//! One document per rule, partitioned by policy type, with a content-derived
//! id. Adding the same rule twice therefore conflicts instead of duplicating,
//! and removing a rule is a point delete.

use crate::config::AdapterOptions;
use crate::error::{AdapterError, Result};
use crate::model::{Model, PERSISTED_SECTIONS};
use crate::query::{removal_filter, SqlQuerySpec, SELECT_ALL};
use crate::record::{load_policy_line, PolicyRecord};
use crate::store::{ConnectionString, CosmosClient, DocumentStore};
use log::{debug, info, warn};
use std::collections::BTreeSet;

// ================================================================================================
// ENGINE CONTRACT
// ================================================================================================

/// Pluggable policy storage as consumed by the enforcement engine.
///
/// `sec` is the model section (`"p"`, `"g"`) and `ptype` the policy type
/// within it (`"p"`, `"g2"`, ...). Stored records are keyed by `ptype` only.
pub trait Adapter {
    /// Appends every stored rule to `model` and marks the view as complete.
    fn load_policy(&mut self, model: &mut dyn Model) -> Result<()>;

    /// Appends the rules matched by `filter` to `model` and marks the view as
    /// partial, which blocks [`Adapter::save_policy`] until the next full load.
    fn load_filtered_policy(&mut self, model: &mut dyn Model, filter: &SqlQuerySpec) -> Result<()>;

    /// Replaces the stored rules with every rule of sections `p` and `g`.
    fn save_policy(&mut self, model: &dyn Model) -> Result<()>;

    /// Deletes every stored rule.
    fn clear_policy(&mut self) -> Result<()>;

    fn add_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    /// Adds rules one by one, stopping at the first failure. Rules added
    /// before the failure stay stored.
    fn add_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules {
            self.add_policy(sec, ptype, rule)?;
        }
        Ok(())
    }

    fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    /// Removes rules one by one, stopping at the first failure.
    fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules {
            self.remove_policy(sec, ptype, rule)?;
        }
        Ok(())
    }

    /// Removes every `ptype` rule whose fields match `field_values`, where
    /// `field_values[i]` is compared to field `field_index + i` and empty
    /// values match anything.
    fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: isize,
        field_values: &[String],
    ) -> Result<()>;

    /// Whether the last load was a filtered one.
    fn is_filtered(&self) -> bool;
}

// ================================================================================================
// COSMOS ADAPTER
// ================================================================================================

/// Policy adapter over a [`DocumentStore`], by default the Cosmos DB client.
///
/// Calls are blocking and sequential. Mutating calls take `&mut self`; share
/// an adapter across threads behind the caller's own lock.
#[derive(Debug)]
pub struct CosmosAdapter<S: DocumentStore = CosmosClient> {
    store: S,
    filtered: bool,
}

impl CosmosAdapter<CosmosClient> {
    /// Connects to the account at `endpoint` with its base64 master `key`,
    /// creating the configured database and container when missing.
    pub fn new(endpoint: &str, key: &str, options: AdapterOptions) -> Result<Self> {
        let client = CosmosClient::new(endpoint, key, &options)?;
        Self::from_store(client)
    }

    /// Like [`CosmosAdapter::new`], reading endpoint and key from an
    /// `AccountEndpoint=...;AccountKey=...;` connection string.
    pub fn from_connection_string(connection_string: &str, options: AdapterOptions) -> Result<Self> {
        let connection = ConnectionString::parse(connection_string)?;
        let client = CosmosClient::from_connection_string(&connection, &options)?;
        Self::from_store(client)
    }
}

impl<S: DocumentStore> CosmosAdapter<S> {
    /// Wraps an existing store, bootstrapping its database and container.
    ///
    /// Any bootstrap failure is a configuration error: no adapter is returned.
    pub fn from_store(store: S) -> Result<Self> {
        store
            .ensure_database()
            .map_err(|e| AdapterError::bootstrap("Creating database", e))?;
        store
            .ensure_container()
            .map_err(|e| AdapterError::bootstrap("Creating container", e))?;

        Ok(Self {
            store,
            filtered: false,
        })
    }

    /// The underlying document store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_records(&self, spec: &SqlQuerySpec, model: &mut dyn Model) -> Result<usize> {
        // Fetch everything before touching the model so a failed page leaves
        // the model unchanged.
        let records = self.store.query_items(spec, None)?;
        for record in &records {
            load_policy_line(record, model);
        }
        Ok(records.len())
    }

    fn ensure_unfiltered(&self) -> Result<()> {
        if self.filtered {
            return Err(AdapterError::FilteredState);
        }
        Ok(())
    }
}

impl<S: DocumentStore> Adapter for CosmosAdapter<S> {
    fn load_policy(&mut self, model: &mut dyn Model) -> Result<()> {
        let count = self.load_records(&SqlQuerySpec::new(SELECT_ALL), model)?;
        self.filtered = false;
        info!("Loaded {} policy records", count);
        Ok(())
    }

    fn load_filtered_policy(&mut self, model: &mut dyn Model, filter: &SqlQuerySpec) -> Result<()> {
        let count = self.load_records(filter, model)?;
        self.filtered = true;
        info!("Loaded {} policy records with filter '{}'", count, filter.query);
        Ok(())
    }

    /// Drops and recreates the container, then writes every rule.
    ///
    /// Not atomic: if a write fails, the container holds only the rules
    /// written before it (possibly none). Retry the whole save from a
    /// known-good model.
    ///
    /// A rule held more than once by `model` is written once.
    fn save_policy(&mut self, model: &dyn Model) -> Result<()> {
        self.ensure_unfiltered()?;

        let mut seen = BTreeSet::new();
        let records: Vec<PolicyRecord> = PERSISTED_SECTIONS
            .iter()
            .flat_map(|sec| {
                model.policy_types(sec).into_iter().flat_map(move |ptype| {
                    model
                        .get_policy(sec, &ptype)
                        .into_iter()
                        .map(move |rule| PolicyRecord::from_rule(&ptype, &rule))
                })
            })
            .filter(|record| seen.insert(record.id.clone()))
            .collect();

        self.store.recreate_container()?;

        for (written, record) in records.iter().enumerate() {
            if let Err(e) = self.store.create_item(record) {
                warn!(
                    "Saving policy failed after {} of {} rules were written: {}",
                    written,
                    records.len(),
                    e
                );
                return Err(e.into());
            }
        }

        info!("Saved {} policy rules", records.len());
        Ok(())
    }

    fn clear_policy(&mut self) -> Result<()> {
        self.ensure_unfiltered()?;
        self.store.recreate_container()?;
        info!("Cleared all policy rules");
        Ok(())
    }

    fn add_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let record = PolicyRecord::from_rule(ptype, rule);
        self.store.create_item(&record)?;
        debug!("Added {} rule {}", ptype, record.id);
        Ok(())
    }

    fn remove_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let record = PolicyRecord::from_rule(ptype, rule);
        self.store.delete_item(&record.ptype, &record.id)?;
        debug!("Removed {} rule {}", ptype, record.id);
        Ok(())
    }

    fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: isize,
        field_values: &[String],
    ) -> Result<()> {
        let spec = removal_filter(ptype, field_index, field_values);
        let matches = self.store.query_items(&spec, Some(ptype))?;

        for record in &matches {
            self.store.delete_item(&record.ptype, &record.id)?;
        }

        info!("Removed {} {} rules matching filter", matches.len(), ptype);
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}
