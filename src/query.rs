use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A remote operation: its GraphQL name, persisted query id and the feature
/// switches the endpoint expects alongside the variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub query_id: &'static str,
    pub features: &'static [(&'static str, bool)],
}

impl Operation {
    /// `<query_id>/<name>` path segment under the API base URL.
    pub fn path(&self) -> String {
        format!("{}/{}", self.query_id, self.name)
    }

    pub fn features_json(&self) -> Value {
        Value::Object(
            self.features
                .iter()
                .map(|(name, enabled)| ((*name).to_string(), Value::Bool(*enabled)))
                .collect(),
        )
    }
}

/// Opaque continuation marker. Never inspected locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorToken(String);

impl CursorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation + ordered parameters + optional cursor. Immutable once built;
/// continuing a walk produces a new `Query` via [`Query::with_cursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    operation: Operation,
    params: Map<String, Value>,
    count: Option<usize>,
    cursor: Option<CursorToken>,
}

impl Query {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            params: Map::new(),
            count: None,
            cursor: None,
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Requested page size. Also caps the number of items a page may hold.
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.params.insert("count".to_string(), Value::from(count));
        self.count = Some(count);
        self
    }

    /// Same operation and parameters, positioned at `cursor`.
    #[must_use]
    pub fn with_cursor(&self, cursor: CursorToken) -> Self {
        Self {
            cursor: Some(cursor),
            ..self.clone()
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn requested_count(&self) -> Option<usize> {
        self.count
    }

    pub fn cursor(&self) -> Option<&CursorToken> {
        self.cursor.as_ref()
    }

    /// The `variables` document sent on the wire: the parameters in insertion
    /// order, followed by the cursor when present.
    pub fn variables_json(&self) -> Value {
        let mut variables = self.params.clone();
        if let Some(cursor) = &self.cursor {
            variables.insert("cursor".to_string(), Value::String(cursor.as_str().to_string()));
        }
        Value::Object(variables)
    }
}
