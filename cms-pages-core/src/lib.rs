#![doc = "cms-pages-core: core logic library for cms-pages."]

//! This crate contains the plugin that augments a static site's in-memory file
//! collection with entries fetched from a headless CMS.
//!
//! # Usage
//! Build a [`synchronise::CmsPlugin`] from [`config::PluginOptions`] and a
//! [`contract::ClientFactory`] (usually [`download::DeliveryClientFactory`]),
//! then call `run` once per build with the host's [`files::FileCollection`].

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod files;
pub mod mapper;
pub mod processor;
pub mod query;
pub mod synchronise;

pub use config::PluginOptions;
pub use error::{BatchError, ConfigurationError, FetchFailure, MalformedEntryError};
pub use files::{FileCollection, FileRecord};
pub use synchronise::{BatchReport, CmsPlugin};
