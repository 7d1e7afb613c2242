//! HTTP client for the load balancer controller
//!
//! # Endpoints
//!
//! - `POST /api/{type}` creates an object
//! - `PUT /api/{type}/{uuid}` replaces an object
//! - `DELETE /api/{type}/{uuid}` deletes an object
//! - `GET /api/{type}?name=..` looks an object up by name
//! - `GET /api/{type}?created_by=..&page=..` pages through the inventory
//! - `GET /api/cluster/runtime` reports controller cluster health

use crate::config::RestConfig;
use async_trait::async_trait;
use lb_core::sync::render::{MARKER_CHECKSUM, MARKER_MODEL};
use lb_core::{ClientError, LbObject, LoadBalancerClient, ModelKey, ObjectRef, ObjectType, RemoteObject};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// One page of a collection read
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterRuntime {
    cluster_state: ClusterState,
}

#[derive(Debug, Deserialize)]
struct ClusterState {
    state: String,
}

/// RestClient implements [`LoadBalancerClient`] over the controller's JSON API
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    page_size: u32,
    created_by: String,
}

impl RestClient {
    /// Build a client; `created_by` is the marker this cluster stamps on
    /// every object and the filter for inventory reads
    pub fn new(config: RestConfig, created_by: impl Into<String>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Avi-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|_| ClientError::Decode(format!("invalid API version {:?}", config.api_version)))?,
        );
        headers.insert(
            "X-Avi-Tenant",
            HeaderValue::from_str(&config.tenant)
                .map_err(|_| ClientError::Decode(format!("invalid tenant {:?}", config.tenant)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url,
            username: config.username,
            password: config.password,
            page_size: config.page_size,
            created_by: created_by.into(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    fn collection_url(&self, object_type: ObjectType) -> String {
        format!("{}/api/{}", self.base_url, object_type.api_path())
    }

    fn object_url(&self, object_type: ObjectType, uuid: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, object_type.api_path(), uuid)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(classify_status(status, message))
    }

    async fn json(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        self.send(request)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn write(&self, method: Method, url: String, object: &LbObject) -> Result<RemoteObject, ClientError> {
        debug!("{} {} {}", method, object.object_type, object.name);
        let body = self.json(self.request(method, &url).json(&object.body)).await?;
        let mut remote = parse_remote(object.object_type, &body)?;
        // Responses may omit markers; the body just written carries them.
        if remote.checksum.is_none() {
            remote.checksum = Some(object.checksum.clone());
        }
        if remote.model_key.is_none() {
            remote.model_key = Some(object.model_key.clone());
        }
        Ok(remote)
    }

    async fn list(&self, object_type: ObjectType) -> Result<Vec<RemoteObject>, ClientError> {
        let mut objects = Vec::new();
        let page_size = self.page_size.to_string();
        let mut request = Some(self.request(Method::GET, &self.collection_url(object_type)).query(&[
            ("created_by", self.created_by.as_str()),
            ("page_size", page_size.as_str()),
            ("page", "1"),
        ]));
        while let Some(current) = request.take() {
            let page: Page = serde_json::from_value(self.json(current).await?)
                .map_err(|e| ClientError::Decode(e.to_string()))?;
            for body in &page.results {
                match parse_remote(object_type, body) {
                    Ok(remote) => objects.push(remote),
                    Err(e) => warn!("Skipping unreadable {} in inventory: {}", object_type, e),
                }
            }
            // Later pages come back as complete URLs.
            request = page.next.map(|next| self.request(Method::GET, &next));
        }
        Ok(objects)
    }
}

#[async_trait]
impl LoadBalancerClient for RestClient {
    async fn create(&self, object: &LbObject) -> Result<RemoteObject, ClientError> {
        self.write(Method::POST, self.collection_url(object.object_type), object).await
    }

    async fn update(&self, uuid: &str, object: &LbObject) -> Result<RemoteObject, ClientError> {
        self.write(Method::PUT, self.object_url(object.object_type, uuid), object).await
    }

    async fn delete(&self, object_type: ObjectType, uuid: &str) -> Result<(), ClientError> {
        debug!("DELETE {} {}", object_type, uuid);
        self.send(self.request(Method::DELETE, &self.object_url(object_type, uuid))).await?;
        Ok(())
    }

    async fn get_by_name(&self, object_type: ObjectType, name: &str) -> Result<Option<RemoteObject>, ClientError> {
        let request = self
            .request(Method::GET, &self.collection_url(object_type))
            .query(&[("name", name)]);
        let page: Page = serde_json::from_value(self.json(request).await?)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        page.results
            .first()
            .map(|body| parse_remote(object_type, body))
            .transpose()
    }

    async fn inventory(&self) -> Result<Vec<RemoteObject>, ClientError> {
        let mut objects = Vec::new();
        for object_type in ObjectType::ALL {
            objects.extend(self.list(object_type).await?);
        }
        debug!("Inventory holds {} objects created by {}", objects.len(), self.created_by);
        Ok(objects)
    }

    async fn cluster_active(&self) -> Result<bool, ClientError> {
        let url = format!("{}/api/cluster/runtime", self.base_url);
        let runtime: ClusterRuntime = serde_json::from_value(self.json(self.request(Method::GET, &url)).await?)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let active = runtime.cluster_state.state.starts_with("CLUSTER_UP");
        if !active {
            warn!("Load balancer controller cluster state is {}", runtime.cluster_state.state);
        }
        Ok(active)
    }
}

fn classify_transport(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(e.to_string())
    } else if e.is_decode() {
        ClientError::Decode(e.to_string())
    } else {
        ClientError::Connection(e.to_string())
    }
}

/// Map a failed HTTP status onto the retry-relevant error classes
fn classify_status(status: StatusCode, message: String) -> ClientError {
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::UNAUTHORIZED => ClientError::Server { status: status.as_u16(), message },
        s if s.is_server_error() => ClientError::Server { status: s.as_u16(), message },
        s => ClientError::Rejected { status: s.as_u16(), message },
    }
}

/// Read identity, markers, references and VIP out of an object body
fn parse_remote(object_type: ObjectType, body: &Value) -> Result<RemoteObject, ClientError> {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode(format!("{} without {}", object_type, name)))
    };

    let mut references = Vec::new();
    collect_refs(body, &mut references);
    references.sort();
    references.dedup();

    Ok(RemoteObject {
        object_type: Some(object_type),
        name: field("name")?,
        uuid: field("uuid")?,
        checksum: marker(body, MARKER_CHECKSUM),
        model_key: marker(body, MARKER_MODEL).map(ModelKey::from),
        references,
        vip: body
            .pointer("/vip/0/ip_address/addr")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn marker(body: &Value, key: &str) -> Option<String> {
    body.get("markers")?
        .as_array()?
        .iter()
        .find(|m| m.get("key").and_then(Value::as_str) == Some(key))?
        .pointer("/values/0")?
        .as_str()
        .map(str::to_string)
}

/// Walk every `*_ref`/`*_refs` field, nested ones included
fn collect_refs(value: &Value, out: &mut Vec<ObjectRef>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if key == "tenant_ref" {
                    continue;
                }
                if key.ends_with("_ref") || key.ends_with("_refs") {
                    let urls = match value {
                        Value::String(url) => vec![url.as_str()],
                        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                        _ => Vec::new(),
                    };
                    out.extend(urls.into_iter().filter_map(parse_ref));
                } else {
                    collect_refs(value, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

/// Accepts `/api/{type}?name={name}` and the `.../api/{type}/{uuid}#{name}`
/// form the controller returns
fn parse_ref(url: &str) -> Option<ObjectRef> {
    let path = &url[url.find("/api/")? + "/api/".len()..];
    let type_end = path.find(|c| c == '/' || c == '?' || c == '#').unwrap_or(path.len());
    let object_type = ObjectType::from_api_path(&path[..type_end])?;

    let name = if let Some((_, name)) = url.split_once('#') {
        name
    } else {
        url.split_once("?name=")?.1.split('&').next()?
    };
    (!name.is_empty()).then(|| ObjectRef::new(object_type, name))
}
