//! Discovery documents describe which HTTP method and path template serve each
//! verb of an API resource. The crate ships a bundled document for Service
//! Management v1; a remote document can be fetched instead and kept in a
//! [`DiscoveryCache`].

use crate::{Endpoint, Error, HttpApiClient};
use parking_lot::Mutex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use url::Url;

const BUNDLED_SERVICEMANAGEMENT_V1: &str = r#"{
    "name": "servicemanagement",
    "version": "v1",
    "rootUrl": "https://servicemanagement.googleapis.com/",
    "servicePath": "",
    "resources": {
        "services": {
            "methods": {
                "list": { "httpMethod": "GET", "path": "v1/services" },
                "get": { "httpMethod": "GET", "path": "v1/services/{serviceName}" },
                "getConfig": { "httpMethod": "GET", "path": "v1/services/{serviceName}/config" },
                "getIamPolicy": { "httpMethod": "POST", "path": "v1/{+resource}:getIamPolicy" }
            }
        }
    }
}"#;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub service_path: String,
    #[serde(default)]
    pub resources: HashMap<String, DiscoveryResource>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveryResource {
    #[serde(default)]
    pub methods: HashMap<String, DiscoveryMethod>,
    #[serde(default)]
    pub resources: HashMap<String, DiscoveryResource>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMethod {
    pub http_method: String,
    pub path: String,
}

impl DiscoveryMethod {
    pub fn method(&self) -> Result<Method, Error> {
        Ok(Method::from_bytes(self.http_method.as_bytes())?)
    }
}

impl DiscoveryDocument {
    pub fn bundled() -> Self {
        serde_json::from_str(BUNDLED_SERVICEMANAGEMENT_V1)
            .expect("bundled discovery document is valid json")
    }

    /// Looks up a resource by its dotted component name (e.g. `services.configs`).
    pub fn resource(&self, component: &str) -> Option<&DiscoveryResource> {
        let mut segments = component.split('.');
        let mut resource = self.resources.get(segments.next()?)?;
        for segment in segments {
            resource = resource.resources.get(segment)?;
        }
        Some(resource)
    }
}

/// Storage for complete discovery documents, as fetched JSON text, keyed by
/// their url.
#[async_trait::async_trait]
pub trait DiscoveryCache: Send + Sync {
    async fn get(&self, url: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, url: &str, content: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryDiscoveryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryDiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DiscoveryCache for InMemoryDiscoveryCache {
    async fn get(&self, url: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(url).cloned())
    }

    async fn set(&self, url: &str, content: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .insert(url.to_string(), content.to_string());
        Ok(())
    }
}

/// Where the discovery document for a repository client comes from.
#[derive(Clone, Default)]
pub struct DiscoverySource {
    url: Option<Url>,
    cache: Option<Arc<dyn DiscoveryCache>>,
}

impl fmt::Debug for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySource")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl DiscoverySource {
    pub fn bundled() -> Self {
        Self::default()
    }

    pub fn remote(url: Url) -> Self {
        Self {
            url: Some(url),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn DiscoveryCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Cache failures are logged and never fail the load.
    pub async fn load(&self, http_client: &HttpApiClient) -> Result<DiscoveryDocument, Error> {
        let Some(url) = &self.url else {
            return Ok(DiscoveryDocument::bundled());
        };

        if let Some(cache) = &self.cache {
            match cache.get(url.as_str()).await {
                Ok(Some(content)) => match serde_json::from_str(&content) {
                    Ok(document) => {
                        tracing::debug!(url = %url, "discovery document served from cache");
                        return Ok(document);
                    }
                    Err(err) => {
                        tracing::warn!(url = %url, "cached discovery document is invalid: {err}")
                    }
                },
                Ok(None) => {}
                Err(err) => tracing::warn!(url = %url, "discovery cache lookup failed: {err:#}"),
            }
        }

        tracing::info!(url = %url, "fetching discovery document");
        let raw = http_client
            .request(&GetDiscoveryDocument { url: url.clone() })
            .await?;
        let document = DiscoveryDocument::deserialize(&raw)?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.set(url.as_str(), &raw.to_string()).await {
                tracing::warn!(url = %url, "cannot store discovery document: {err:#}");
            }
        }

        Ok(document)
    }
}

struct GetDiscoveryDocument {
    url: Url,
}

impl Endpoint for GetDiscoveryDocument {
    type Response = serde_json::Value;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> String {
        self.url.to_string()
    }
}
