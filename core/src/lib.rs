//! Client core for the Xibo CMS REST API.
//!
//! # Overview
//! Requests are built as plain `HttpRequest` values and responses parsed
//! from plain `HttpResponse` values; the only I/O seam is the
//! [`Transport`] trait. `UreqTransport` is the production implementation,
//! tests substitute scripted or local ones.
//!
//! # Design
//! - `XiboClient` authenticates with the OAuth2 client-credentials grant and
//!   keeps bearer tokens in a [`TokenCache`] keyed by credential fingerprint.
//! - `request_all_items` walks `start`/`length` pages.
//! - [`resource`] maps (resource, operation) pairs to calls through a static
//!   descriptor table; [`node`] runs those calls once per input item.
//! - Responses are opaque `serde_json::Value`s.

pub mod client;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod multipart;
pub mod node;
pub mod resource;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::XiboClient;
pub use config::ClientConfig;
pub use credential::{Credential, Fingerprint, SecretString};
pub use error::{Result, XiboError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use node::{execute, load_options, ExecuteOptions, NodeError, OptionSource};
pub use resource::{Operation, PreparedCall, Resource};
pub use token::TokenCache;
pub use transport::{Transport, UreqTransport};
pub use types::{BinaryData, Item, MediaUpload, NodeOption, OutputItem};
