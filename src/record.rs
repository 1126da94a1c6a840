//! # Policy Record Module
//!
//! Converts policy rules to the fixed-shape document stored in the container
//! and back again.
//!
//! Stored shape: `{"id", "pType", "v0", ..., "v5"}`, every field a string.
//! Unused value slots hold `""` and are never omitted. The empty string is the
//! "no value" sentinel, and decoding relies on it: a rule ends at the first
//! empty slot.

use crate::model::Model;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of value slots in a stored record.
pub const MAX_FIELDS: usize = 6;

/// Bytes of the SHA-256 digest kept for the record id (128 bits).
const ID_DIGEST_BYTES: usize = 16;

// ================================================================================================
// STORED RECORD
// ================================================================================================

/// A policy rule as persisted in the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: String,
    #[serde(rename = "pType")]
    pub ptype: String,
    #[serde(default)]
    pub v0: String,
    #[serde(default)]
    pub v1: String,
    #[serde(default)]
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
}

impl PolicyRecord {
    /// Builds the record for `rule` under `ptype`.
    ///
    /// Slots past the end of `rule` stay empty. Values beyond the sixth are not
    /// stored but still contribute to the id.
    pub fn from_rule<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Self {
        let mut record = PolicyRecord {
            id: policy_id(ptype, rule),
            ptype: ptype.to_string(),
            ..Default::default()
        };

        for (slot, value) in record.fields_mut().into_iter().zip(rule) {
            *slot = value.as_ref().to_string();
        }

        record
    }

    /// The six value slots in positional order.
    pub fn fields(&self) -> [&str; MAX_FIELDS] {
        [&self.v0, &self.v1, &self.v2, &self.v3, &self.v4, &self.v5]
    }

    fn fields_mut(&mut self) -> [&mut String; MAX_FIELDS] {
        [
            &mut self.v0,
            &mut self.v1,
            &mut self.v2,
            &mut self.v3,
            &mut self.v4,
            &mut self.v5,
        ]
    }

    /// Returns a stored field by its document name (`id`, `pType`, `v0`..`v5`).
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "pType" => Some(&self.ptype),
            "v0" => Some(&self.v0),
            "v1" => Some(&self.v1),
            "v2" => Some(&self.v2),
            "v3" => Some(&self.v3),
            "v4" => Some(&self.v4),
            "v5" => Some(&self.v5),
            _ => None,
        }
    }

    /// Model section for this record: the first character of the policy type.
    pub fn section(&self) -> Option<&str> {
        let first = self.ptype.chars().next()?;
        Some(&self.ptype[..first.len_utf8()])
    }

    /// Rebuilds the rule tuple, stopping at the first empty slot.
    ///
    /// Non-empty values after a gap are dropped without error: `["a", "", "b"]`
    /// decodes to `["a"]`. Records written by [`PolicyRecord::from_rule`] never
    /// contain gaps, so this only affects documents written by other tools.
    pub fn to_rule(&self) -> Vec<String> {
        self.fields()
            .iter()
            .take_while(|value| !value.is_empty())
            .map(|value| value.to_string())
            .collect()
    }
}

/// Content-addressed record id.
///
/// Lowercase hex of the first 128 bits of SHA-256 over
/// `ptype + "," + rule.join(",")`. Identical input always maps to the same id,
/// which is what makes point deletes of a rule possible.
pub fn policy_id<S: AsRef<str>>(ptype: &str, rule: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ptype.as_bytes());
    for value in rule {
        hasher.update(b",");
        hasher.update(value.as_ref().as_bytes());
    }
    let digest = hasher.finalize();

    digest[..ID_DIGEST_BYTES]
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Decodes `record` and appends the rule to `model` under its section.
///
/// Records with an empty policy type or an empty `v0` contribute nothing.
/// Never fails.
pub fn load_policy_line(record: &PolicyRecord, model: &mut dyn Model) {
    let Some(sec) = record.section() else {
        return;
    };

    let rule = record.to_rule();
    if rule.is_empty() {
        return;
    }

    model.add_policy(sec, &record.ptype, rule);
}
