//! # Query Specs
//!
//! Parameterized queries in the Cosmos DB SQL dialect. `SqlQuerySpec` is the
//! wire body of a query request and also the filter object callers hand to
//! `load_filtered_policy`. Parameter placeholders are written `@name`.

use crate::record::MAX_FIELDS;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query that selects every stored record.
pub const SELECT_ALL: &str = "SELECT * FROM c";

/// A named query parameter. `name` includes the leading `@`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Query text plus its parameter bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<QueryParameter>,
}

impl SqlQuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Adds a binding for `@name` style placeholder `name`.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter::new(name, value));
        self
    }

    /// Looks up a binding by placeholder name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Builds the query selecting the records a filtered removal deletes.
///
/// `field_values[i]` applies to slot `v{field_index + i}`. A slot is filtered
/// on only when it falls inside `0..6` and its value is non-empty; empty values
/// mean "any". Values that land before slot 0 (negative `field_index`) are
/// dropped. The policy type is always filtered on.
///
/// ```
/// use cosmos_policy_adapter::query::removal_filter;
///
/// let spec = removal_filter("p", 0, &["", "data1"]);
/// assert_eq!(
///     spec.query,
///     "SELECT * FROM root WHERE root.pType = @pType AND root.v1 = @v1"
/// );
/// ```
pub fn removal_filter<S: AsRef<str>>(
    ptype: &str,
    field_index: isize,
    field_values: &[S],
) -> SqlQuerySpec {
    let mut query = String::from("SELECT * FROM root WHERE root.pType = @pType");
    let mut parameters = vec![QueryParameter::new("@pType", ptype)];

    for slot in 0..MAX_FIELDS {
        let Some(offset) = (slot as isize)
            .checked_sub(field_index)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            continue;
        };
        let Some(value) = field_values.get(offset) else {
            continue;
        };
        let value = value.as_ref();
        if value.is_empty() {
            continue;
        }

        query.push_str(&format!(" AND root.v{slot} = @v{slot}"));
        parameters.push(QueryParameter::new(format!("@v{slot}"), value));
    }

    SqlQuerySpec { query, parameters }
}
