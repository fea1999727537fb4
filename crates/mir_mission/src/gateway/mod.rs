//! Remote Object Gateway
//!
//! Typed read/search/create/replace/delete calls against the robot's resource
//! collections. Implementations raise [`MirError::RemoteRejected`] for any
//! status outside the verb's success set and [`MirError::RemoteUnavailable`]
//! for transport failures. No implementation retries.

pub mod http;
pub mod memory;

use mir_protocol::{SearchFilter, SearchRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::error::{MirError, Result};

/// Request verbs and the statuses each accepts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Search,
    Create,
    Replace,
    Delete,
}

impl Verb {
    pub fn method(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Search | Verb::Create => "POST",
            Verb::Replace => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    pub fn accepts(&self, status: u16) -> bool {
        match self {
            Verb::Get | Verb::Search | Verb::Replace => matches!(status, 200 | 201),
            Verb::Create => status == 201,
            Verb::Delete => status == 204,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Untyped gateway over the robot's JSON resources.
///
/// Paths are relative to the API root, e.g. `missions/<guid>/actions`.
pub trait RemoteGateway {
    fn get(&self, path: &str) -> Result<Value>;

    /// `POST <collection>/search`; returns the matching records in remote order.
    fn search(&self, collection: &str, request: &SearchRequest) -> Result<Value>;

    fn create(&self, collection: &str, body: &Value) -> Result<Value>;

    fn replace(&self, resource: &str, body: &Value) -> Result<Value>;

    fn delete(&self, resource: &str) -> Result<()>;
}

impl<G: RemoteGateway + ?Sized> RemoteGateway for &G {
    fn get(&self, path: &str) -> Result<Value> {
        (**self).get(path)
    }

    fn search(&self, collection: &str, request: &SearchRequest) -> Result<Value> {
        (**self).search(collection, request)
    }

    fn create(&self, collection: &str, body: &Value) -> Result<Value> {
        (**self).create(collection, body)
    }

    fn replace(&self, resource: &str, body: &Value) -> Result<Value> {
        (**self).replace(resource, body)
    }

    fn delete(&self, resource: &str) -> Result<()> {
        (**self).delete(resource)
    }
}

impl<G: RemoteGateway + ?Sized> RemoteGateway for std::sync::Arc<G> {
    fn get(&self, path: &str) -> Result<Value> {
        (**self).get(path)
    }

    fn search(&self, collection: &str, request: &SearchRequest) -> Result<Value> {
        (**self).search(collection, request)
    }

    fn create(&self, collection: &str, body: &Value) -> Result<Value> {
        (**self).create(collection, body)
    }

    fn replace(&self, resource: &str, body: &Value) -> Result<Value> {
        (**self).replace(resource, body)
    }

    fn delete(&self, resource: &str) -> Result<()> {
        (**self).delete(resource)
    }
}

/// Typed helpers layered over any [`RemoteGateway`].
pub trait GatewayExt: RemoteGateway {
    fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(path, self.get(path)?)
    }

    fn search_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: Vec<SearchFilter>,
    ) -> Result<Vec<T>> {
        let request = SearchRequest::new(filters);
        decode(collection, self.search(collection, &request)?)
    }

    fn create_as<B: Serialize, T: DeserializeOwned>(&self, collection: &str, body: &B) -> Result<T> {
        let body = encode(collection, body)?;
        decode(collection, self.create(collection, &body)?)
    }

    fn replace_as<B: Serialize, T: DeserializeOwned>(&self, resource: &str, body: &B) -> Result<T> {
        let body = encode(resource, body)?;
        decode(resource, self.replace(resource, &body)?)
    }
}

impl<G: RemoteGateway + ?Sized> GatewayExt for G {}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| MirError::MalformedResponse {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn encode<B: Serialize>(path: &str, body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|source| MirError::Encode {
        path: path.to_string(),
        source,
    })
}
