//! Query construction from a source file's directive.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::files::CmsDirective;

/// An entries query: `{ content_type?: string, ...filter }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as URL query parameters. Arrays become comma lists, nulls are dropped.
    pub fn to_params(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(key, value)| param_value(value).map(|v| (key.clone(), v)))
            .collect()
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Query(map)
    }
}

fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(param_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// Build the entries query for a directive.
///
/// `content_type` is only present when the directive names one, so an absent
/// type means "all types" to the API. Filter keys are merged last and win.
pub fn build_query(directive: &CmsDirective) -> Query {
    let mut query = Map::new();
    if let Some(content_type) = &directive.content_type {
        query.insert(
            "content_type".to_string(),
            Value::String(content_type.clone()),
        );
    }
    for (key, value) in &directive.filter {
        query.insert(key.clone(), value.clone());
    }
    Query(query)
}
