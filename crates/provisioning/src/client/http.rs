//! HTTP client for the appliance's REST API.

use std::time::Duration;

use async_trait::async_trait;
use common::ResourceId;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ExtentRequest, ExtentSource, InitiatorGroupRequest, PortLinkRequest, PortalRequest,
    ResourceClient, TargetExtentLinkRequest, TargetRequest, VolumeRequest,
};
use crate::error::ClientError;

const API_PREFIX: &str = "api/v2.0";

/// Connection settings for [`HttpResourceClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-request timeout; an expired request fails the step it belongs to.
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`ResourceClient`] that talks to the control plane over its REST API.
#[derive(Debug, Clone)]
pub struct HttpResourceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Body of a successful create response; only the id matters.
#[derive(Debug, Deserialize)]
struct Created {
    id: RemoteId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteId {
    Number(u64),
    Text(String),
}

impl From<RemoteId> for ResourceId {
    fn from(id: RemoteId) -> Self {
        match id {
            RemoteId::Number(n) => ResourceId::from(n),
            RemoteId::Text(s) => ResourceId::from(s),
        }
    }
}

impl HttpResourceClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    #[tracing::instrument(skip(self, body))]
    async fn create(&self, path: &str, body: Value) -> Result<ResourceId, ClientError> {
        let response = self.request(Method::POST, path).json(&body).send().await?;
        let bytes = check(response).await?.bytes().await?;
        let created: Created = serde_json::from_slice(&bytes)?;
        let id = ResourceId::from(created.id);
        tracing::debug!(%id, "resource created");
        Ok(id)
    }

    #[tracing::instrument(skip(self, body))]
    async fn delete(
        &self,
        path: &str,
        id: &ResourceId,
        body: Option<Value>,
    ) -> Result<(), ClientError> {
        let path = format!("{path}/id/{}", encode_segment(id));
        let mut request = self.request(Method::DELETE, &path);
        if let Some(body) = body {
            request = request.json(&body);
        }
        check(request.send().await?).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Characters escaped in an id used as a single path segment; `/` included.
const ID_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_segment(id: &ResourceId) -> String {
    utf8_percent_encode(id.as_str(), ID_SEGMENT).to_string()
}

/// Numeric ids go over the wire as numbers, everything else as strings.
fn wire_id(id: &ResourceId) -> Value {
    match id.as_str().parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id.as_str()),
    }
}

fn volume_body(request: &VolumeRequest) -> Value {
    json!({
        "name": request.full_name(),
        "type": "VOLUME",
        "volsize": request.size_bytes,
    })
}

fn extent_body(request: &ExtentRequest) -> Value {
    let mut body = json!({
        "name": request.name,
        "blocksize": request.blocksize,
        "ro": request.read_only,
        "insecure_tpc": request.insecure_tpc,
        "xen": request.xen,
        "comment": request.comment.clone().unwrap_or_default(),
    });
    match &request.source {
        ExtentSource::Disk { disk } => {
            body["type"] = json!("DISK");
            body["disk"] = json!(disk);
        }
        ExtentSource::File { path, size_bytes } => {
            body["type"] = json!("FILE");
            body["path"] = json!(path);
            body["filesize"] = json!(size_bytes);
        }
    }
    body
}

fn target_body(request: &TargetRequest) -> Value {
    let groups: Vec<Value> = request
        .groups
        .iter()
        .map(|group| {
            json!({
                "portal": wire_id(&group.portal),
                "initiator": group.initiator_group.as_ref().map(wire_id),
                "authmethod": "NONE",
            })
        })
        .collect();

    json!({
        "name": request.name,
        "alias": request.alias,
        "mode": request.mode.as_str(),
        "groups": groups,
    })
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn create_volume(&self, request: VolumeRequest) -> Result<ResourceId, ClientError> {
        self.create("pool/dataset", volume_body(&request)).await
    }

    async fn delete_volume(&self, id: &ResourceId) -> Result<(), ClientError> {
        let options = json!({ "recursive": true, "force": true });
        self.delete("pool/dataset", id, Some(options)).await
    }

    async fn create_extent(&self, request: ExtentRequest) -> Result<ResourceId, ClientError> {
        self.create("iscsi/extent", extent_body(&request)).await
    }

    async fn delete_extent(&self, id: &ResourceId) -> Result<(), ClientError> {
        // [remove backing file, force]
        self.delete("iscsi/extent", id, Some(json!([false, true])))
            .await
    }

    async fn create_portal(&self, request: PortalRequest) -> Result<ResourceId, ClientError> {
        let listen: Vec<Value> = request.listen.iter().map(|ip| json!({ "ip": ip })).collect();
        let body = json!({
            "listen": listen,
            "comment": request.comment.unwrap_or_default(),
        });
        self.create("iscsi/portal", body).await
    }

    async fn delete_portal(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.delete("iscsi/portal", id, None).await
    }

    async fn create_initiator_group(
        &self,
        request: InitiatorGroupRequest,
    ) -> Result<ResourceId, ClientError> {
        let body = json!({
            "initiators": request.allowed_initiators,
            "comment": request.comment.unwrap_or_default(),
        });
        self.create("iscsi/initiator", body).await
    }

    async fn delete_initiator_group(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.delete("iscsi/initiator", id, None).await
    }

    async fn create_target(&self, request: TargetRequest) -> Result<ResourceId, ClientError> {
        self.create("iscsi/target", target_body(&request)).await
    }

    async fn delete_target(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.delete("iscsi/target", id, None).await
    }

    async fn create_target_extent_link(
        &self,
        request: TargetExtentLinkRequest,
    ) -> Result<ResourceId, ClientError> {
        let body = json!({
            "target": wire_id(&request.target),
            "extent": wire_id(&request.extent),
        });
        self.create("iscsi/targetextent", body).await
    }

    async fn delete_target_extent_link(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.delete("iscsi/targetextent", id, None).await
    }

    async fn link_port_to_target(&self, request: PortLinkRequest) -> Result<(), ClientError> {
        let body = json!({
            "port": request.port,
            "target_id": wire_id(&request.target),
            "host_id": request.host_id,
        });
        self.create("fcport", body).await.map(|_| ())
    }
}
