//! Node label store backed by the Kubernetes API server
//!
//! Labels are read with `GET /api/v1/nodes/{name}` and replaced with a JSON
//! patch that first tests the resource version of the read, so a concurrent
//! writer turns into a failed update instead of a lost one.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ClusterConfig, TokenSource};
use ht_core::{LabelSet, LabelStore, NodeLabels};
use ht_error::{HwTaggerError, Result};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const JSON_PATCH: &str = "application/json-patch+json";

/// [`LabelStore`] writing the labels of Kubernetes node objects
#[derive(Debug, Clone)]
pub struct NodeLabelStore {
    client: Client,
    server: String,
    token: Option<TokenSource>,
}

impl NodeLabelStore {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .use_rustls_tls();

        if let Some(ca) = &config.ca_pem {
            let certificate = Certificate::from_pem(ca)
                .map_err(|e| HwTaggerError::Credentials(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(pem) = &config.identity_pem {
            let identity = Identity::from_pem(pem).map_err(|e| {
                HwTaggerError::Credentials(format!("invalid client certificate: {}", e))
            })?;
            builder = builder.identity(identity);
        }
        if config.insecure_skip_tls_verify {
            warn!("TLS verification of {} is disabled", config.server);
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| HwTaggerError::Credentials(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: config.server,
            token: config.token,
        })
    }

    /// Discover credentials and build the store
    pub fn discover(kubeconfig: Option<&std::path::Path>) -> Result<Self> {
        Self::new(ClusterConfig::discover(kubeconfig)?)
    }

    fn node_url(&self, host: &str) -> String {
        node_url(&self.server, host)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match &self.token {
            Some(source) => Ok(request.header(AUTHORIZATION, format!("Bearer {}", source.token()?))),
            None => Ok(request),
        }
    }
}

#[async_trait]
impl LabelStore for NodeLabelStore {
    async fn get_labels(&self, host: &str) -> Result<NodeLabels> {
        let url = self.node_url(host);
        debug!("GET {}", url);

        let request = self
            .authorize(self.client.get(&url).header(ACCEPT, "application/json"))
            .map_err(|e| HwTaggerError::label_fetch(host, e))?;
        let response = request
            .send()
            .await
            .map_err(|e| HwTaggerError::label_fetch(host, e))?;
        let response = check_status(response)
            .await
            .map_err(|reason| HwTaggerError::label_fetch(host, reason))?;
        let node: Value = response
            .json()
            .await
            .map_err(|e| HwTaggerError::label_fetch(host, e))?;

        Ok(labels_from_node(&node))
    }

    async fn update_labels(&self, host: &str, labels: NodeLabels) -> Result<()> {
        let url = self.node_url(host);
        let patch = label_patch(&labels);
        debug!("PATCH {}", url);

        let request = self
            .authorize(
                self.client
                    .patch(&url)
                    .header(CONTENT_TYPE, JSON_PATCH)
                    .header(ACCEPT, "application/json")
                    .body(patch.to_string()),
            )
            .map_err(|e| HwTaggerError::label_update(host, e))?;
        let response = request
            .send()
            .await
            .map_err(|e| HwTaggerError::label_update(host, e))?;
        check_status(response)
            .await
            .map_err(|reason| HwTaggerError::label_update(host, reason))?;
        Ok(())
    }
}

/// Pass 2xx responses through, describe anything else
async fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("HTTP {}: {}", status, api_message(&body)))
}

/// The `message` of a Kubernetes Status body, or the raw body
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn node_url(server: &str, host: &str) -> String {
    format!("{}/api/v1/nodes/{}", server.trim_end_matches('/'), host)
}

/// Labels and resource version of a node object
pub fn labels_from_node(node: &Value) -> NodeLabels {
    let metadata = &node["metadata"];
    let labels: LabelSet = metadata["labels"]
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let resource_version = metadata["resourceVersion"].as_str().map(str::to_string);

    NodeLabels {
        labels,
        resource_version,
    }
}

/// JSON patch replacing all labels, guarded by the resource version when known
pub fn label_patch(labels: &NodeLabels) -> Value {
    let mut ops = Vec::new();
    if let Some(version) = &labels.resource_version {
        ops.push(json!({
            "op": "test",
            "path": "/metadata/resourceVersion",
            "value": version,
        }));
    }
    ops.push(json!({
        "op": "add",
        "path": "/metadata/labels",
        "value": labels.labels,
    }));
    Value::Array(ops)
}
