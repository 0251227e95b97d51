#![allow(unused)]

//! # contract: the CMS boundary
//!
//! This module defines the entry record returned by the content API and the
//! two traits the plugin talks to:
//!
//! - [`ClientFactory`] builds a client bound to one space and access token.
//! - [`CmsClient`] issues exactly one "list entries" call per invocation.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so consumers can generate deterministic
//!   mocks (`MockCmsClient`, `MockClientFactory`) behind the `test-export-mocks` feature.
//!
//! ## Adding New Backends
//! - Implement [`CmsClient`] for the transport and a [`ClientFactory`] that builds it.
//! - Convert every transport, auth or decode problem into a [`FetchFailure`]; the
//!   plugin contains those per file and never retries.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FetchFailure;
use crate::query::Query;

/// A content record returned by the CMS, in the Delivery API's JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsEntry {
    pub sys: EntrySys,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// System metadata of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySys {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentTypeLink>,
    /// RFC 3339 creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Everything else the API sends (`type`, `space`, `revision`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeLink {
    pub sys: LinkSys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSys {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CmsEntry {
    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn content_type_id(&self) -> Option<&str> {
        self.sys.content_type.as_ref().map(|ct| ct.sys.id.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A client bound to one space, issuing "list entries" calls.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CmsClient: Send + Sync {
    /// Fetch all entries matching `query`. One call, no retries.
    async fn entries(&self, query: Query) -> Result<Vec<CmsEntry>, FetchFailure>;
}

/// Builds (or reuses) a [`CmsClient`] for a space and access token.
///
/// The plugin asks the factory once per source file and passes the client
/// explicitly into that file's processing.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ClientFactory: Send + Sync {
    fn connect(
        &self,
        space_id: &str,
        access_token: &str,
    ) -> Result<Arc<dyn CmsClient>, FetchFailure>;
}
