//! JSON wire protocol between the engine and a repository server
//!
//! Endpoints, relative to the remote URL:
//! - `GET  info/refs`: advertise refs
//! - `POST upload-pack`: objects reachable from `wants` but not `haves`
//! - `POST receive-pack`: store objects, then apply ref updates
//!
//! Objects travel in framed form, base64 encoded.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use histkit_core::engine::{EngineError, Result};
use histkit_core::transport::{AuthCallback, Transport, TransportRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

pub const INFO_REFS: &str = "info/refs";
pub const UPLOAD_PACK: &str = "upload-pack";
pub const RECEIVE_PACK: &str = "receive-pack";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefAdvertisement {
    /// Symbolic target of the remote HEAD
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub refs: BTreeMap<String, ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub wants: Vec<ObjectId>,
    #[serde(default)]
    pub haves: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireObject {
    pub id: ObjectId,
    /// Base64 of the framed object
    pub data: String,
}

impl WireObject {
    pub fn encode(id: ObjectId, framed: &[u8]) -> Self {
        Self {
            id,
            data: STANDARD.encode(framed),
        }
    }

    /// Framed bytes, checked against the announced id
    pub fn decode(&self) -> Result<Vec<u8>> {
        let framed = STANDARD
            .decode(&self.data)
            .map_err(|e| EngineError::Corrupt(format!("Object {}: {}", self.id, e)))?;
        if ObjectId::from_framed(&framed) != self.id {
            return Err(EngineError::Corrupt(format!(
                "Object {} does not match its content",
                self.id
            )));
        }
        Ok(framed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackResponse {
    pub objects: Vec<WireObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    pub name: String,
    /// Expected current value, `None` when creating the ref
    pub old: Option<ObjectId>,
    pub new: ObjectId,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub updates: Vec<RefUpdate>,
    pub objects: Vec<WireObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub ok: bool,
    /// Per-ref outcome (`ok` or the rejection reason)
    pub refs: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// `<url>/<endpoint>`
pub fn endpoint(url: &str, name: &str) -> String {
    format!("{}/{}", url.trim_end_matches('/'), name)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| EngineError::Backend(format!("Failed to encode: {}", e)))
}

pub fn decode<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| EngineError::Corrupt(format!("Invalid {} payload: {}", what, e)))
}

/// Client side of the protocol
pub struct RemoteClient<'a> {
    transport: &'a dyn Transport,
    url: String,
    auth: Option<AuthCallback>,
}

impl<'a> RemoteClient<'a> {
    pub fn new(transport: &'a dyn Transport, url: &str, auth: Option<AuthCallback>) -> Self {
        Self {
            transport,
            url: url.to_string(),
            auth,
        }
    }

    async fn call(&self, request: TransportRequest) -> Result<Vec<u8>> {
        let mut request = request;
        if let Some(auth) = &self.auth {
            let headers = auth(&request.url);
            request = request.with_headers(headers);
        }
        request
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        tracing::debug!("{} {}", request.method, request.url);
        let response = self.transport.request(request).await?.error_for_status()?;
        Ok(response.body.to_vec())
    }

    pub async fn advertise(&self) -> Result<RefAdvertisement> {
        let body = self
            .call(TransportRequest::get(endpoint(&self.url, INFO_REFS)))
            .await?;
        decode(INFO_REFS, &body)
    }

    pub async fn upload_pack(&self, request: &UploadRequest) -> Result<PackResponse> {
        let body = self
            .call(TransportRequest::post(
                endpoint(&self.url, UPLOAD_PACK),
                encode(request)?,
            ))
            .await?;
        decode(UPLOAD_PACK, &body)
    }

    pub async fn receive_pack(&self, request: &ReceiveRequest) -> Result<ReceiveResponse> {
        let body = self
            .call(TransportRequest::post(
                endpoint(&self.url, RECEIVE_PACK),
                encode(request)?,
            ))
            .await?;
        decode(RECEIVE_PACK, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn test_endpoint() {
        assert_eq!(endpoint("http://hub/repo", INFO_REFS), "http://hub/repo/info/refs");
        assert_eq!(endpoint("http://hub/repo/", UPLOAD_PACK), "http://hub/repo/upload-pack");
    }

    #[test]
    fn test_wire_object_rejects_tampering() {
        let framed = Object::Blob(b"abc".to_vec()).frame().unwrap();
        let id = ObjectId::from_framed(&framed);
        let wire = WireObject::encode(id, &framed);
        assert_eq!(wire.decode().unwrap(), framed);

        let other = Object::Blob(b"xyz".to_vec()).frame().unwrap();
        let forged = WireObject {
            id,
            data: STANDARD.encode(&other),
        };
        assert!(forged.decode().is_err());
    }
}
