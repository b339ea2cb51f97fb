//! Generic building blocks shared by the typed API repositories: client wiring
//! (transport, rate limiting, discovery) and the `list` / `getIamPolicy`
//! capabilities a resource repository opts in to.

pub mod servicemanagement;

use crate::{
    discovery::{DiscoveryCache, DiscoveryDocument, DiscoveryMethod, DiscoverySource},
    rate_limiter::RateLimiterMiddleware,
    serialize_query, Endpoint, Error, HttpApiClient, HttpApiClientConfig,
};
use futures::{stream::BoxStream, Stream, StreamExt};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::{collections::HashMap, fmt, num::NonZeroU32, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use url::Url;

/// Named request parameters. The `body` entry, if any, becomes the request body.
pub type VerbArguments = serde_json::Map<String, Value>;

#[derive(Clone)]
pub struct RepositoryClientConfig {
    /// Allowed requests per `quota_period`. `None` or zero disables rate limiting.
    pub quota_max_calls: Option<u32>,
    /// The time period to track requests over, in seconds.
    pub quota_period: f64,
    pub use_rate_limiter: bool,
    /// Keep fetched discovery documents in `cache`.
    pub cache_discovery: bool,
    pub cache: Option<Arc<dyn DiscoveryCache>>,
    pub root_url: Url,
    /// Remote discovery document. The bundled one is used when `None`.
    pub discovery_url: Option<Url>,
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub access_token: Option<String>,
}

impl Default for RepositoryClientConfig {
    fn default() -> Self {
        Self {
            quota_max_calls: None,
            quota_period: defaults::quota_period(),
            use_rate_limiter: true,
            cache_discovery: false,
            cache: None,
            root_url: defaults::root_url(),
            discovery_url: None,
            http_timeout: defaults::http_timeout(),
            max_retries: 0,
            access_token: None,
        }
    }
}

// The discovery cache does not implement `Debug` and the access token must not be printed.
impl fmt::Debug for RepositoryClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryClientConfig")
            .field("quota_max_calls", &self.quota_max_calls)
            .field("quota_period", &self.quota_period)
            .field("use_rate_limiter", &self.use_rate_limiter)
            .field("cache_discovery", &self.cache_discovery)
            .field("cache", &self.cache.is_some())
            .field("root_url", &self.root_url.as_str())
            .field("discovery_url", &self.discovery_url.as_ref().map(Url::as_str))
            .field("http_timeout", &self.http_timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl RepositoryClientConfig {
    pub fn with_quota(mut self, max_calls: Option<u32>, period: f64) -> Self {
        self.quota_max_calls = max_calls;
        self.quota_period = period;
        self
    }

    pub fn use_rate_limiter(mut self, value: bool) -> Self {
        self.use_rate_limiter = value;
        self
    }

    pub fn cache_discovery(mut self, value: bool, cache: Option<Arc<dyn DiscoveryCache>>) -> Self {
        self.cache_discovery = value;
        self.cache = cache;
        self
    }

    pub fn root_url(mut self, root_url: Url) -> Self {
        self.root_url = root_url;
        self
    }

    pub fn discovery_url(mut self, discovery_url: Option<Url>) -> Self {
        self.discovery_url = discovery_url;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token;
        self
    }

    fn rate_limiter(&self) -> Option<RateLimiterMiddleware> {
        if !self.use_rate_limiter {
            return None;
        }
        let max_calls = self.quota_max_calls.and_then(NonZeroU32::new)?;
        let limiter = Duration::try_from_secs_f64(self.quota_period)
            .ok()
            .and_then(|period| RateLimiterMiddleware::with_period(max_calls, period));
        if limiter.is_none() {
            tracing::warn!(
                quota_period = self.quota_period,
                "invalid quota period, rate limiting is disabled"
            );
        }
        limiter
    }
}

/// Options binding a [`GcpRepository`] to one resource collection of the API.
#[derive(Clone, Copy, Debug)]
pub struct RepositoryOptions {
    /// Dotted resource name in the discovery document, e.g. `services`.
    pub component: &'static str,
    /// Request parameter naming a single resource of the collection.
    pub key_field: &'static str,
    /// Request parameter limiting the page size of `list` calls.
    pub max_results_field: &'static str,
}

pub struct BaseRepositoryClient {
    api_name: &'static str,
    version: &'static str,
    http_client: HttpApiClient,
    rate_limited: bool,
    discovery: DiscoverySource,
    document: OnceCell<DiscoveryDocument>,
}

impl fmt::Debug for BaseRepositoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRepositoryClient")
            .field("api_name", &self.api_name)
            .field("version", &self.version)
            .field("http_client", &self.http_client)
            .field("rate_limited", &self.rate_limited)
            .field("discovery", &self.discovery)
            .finish()
    }
}

impl BaseRepositoryClient {
    pub fn new(
        api_name: &'static str,
        version: &'static str,
        config: RepositoryClientConfig,
    ) -> Result<Self, Error> {
        let mut http_config = HttpApiClientConfig {
            http_timeout: config.http_timeout,
            default_headers: HeaderMap::default(),
            middlewares: vec![],
        };

        if let Some(access_token) = &config.access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {access_token}"))?;
            value.set_sensitive(true);
            http_config.default_headers.insert(AUTHORIZATION, value);
        }

        // Retries are the outer layer, so every attempt passes the rate limiter.
        if config.max_retries > 0 {
            let retry_policy =
                ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
            http_config
                .middlewares
                .push(Arc::new(RetryTransientMiddleware::new_with_policy(
                    retry_policy,
                )));
        }

        let rate_limiter = config.rate_limiter();
        let rate_limited = rate_limiter.is_some();
        if let Some(rate_limiter) = rate_limiter {
            http_config.middlewares.push(Arc::new(rate_limiter));
        }
        tracing::debug!(
            api_name,
            version,
            rate_limited,
            max_calls = ?config.quota_max_calls,
            period = config.quota_period,
            "initializing repository client"
        );

        let discovery = config
            .discovery_url
            .map(DiscoverySource::remote)
            .unwrap_or_else(DiscoverySource::bundled)
            .with_cache(config.cache.filter(|_| config.cache_discovery));

        Ok(Self {
            api_name,
            version,
            http_client: HttpApiClient::new(config.root_url, http_config)?,
            rate_limited,
            discovery,
            document: OnceCell::new(),
        })
    }

    pub fn api_name(&self) -> &str {
        self.api_name
    }

    pub fn version(&self) -> &str {
        self.version
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    async fn discovery_document(&self) -> Result<&DiscoveryDocument, Error> {
        self.document
            .get_or_try_init(|| async {
                let document = self.discovery.load(&self.http_client).await?;
                if document.name != self.api_name || document.version != self.version {
                    tracing::warn!(
                        expected_name = self.api_name,
                        expected_version = self.version,
                        name = %document.name,
                        version = %document.version,
                        "discovery document describes a different api"
                    );
                }
                Ok::<_, Error>(document)
            })
            .await
    }

    /// Builds a repository for one resource collection of the API.
    pub async fn init_repository(&self, options: RepositoryOptions) -> Result<GcpRepository, Error> {
        let document = self.discovery_document().await?;
        let resource = document
            .resource(options.component)
            .ok_or_else(|| Error::UnknownResource(options.component.to_string()))?;

        Ok(GcpRepository {
            http_client: self.http_client.clone(),
            options,
            service_path: document.service_path.clone(),
            methods: resource.methods.clone(),
        })
    }
}

/// Executes the verbs of a single resource collection.
#[derive(Clone, Debug)]
pub struct GcpRepository {
    http_client: HttpApiClient,
    options: RepositoryOptions,
    service_path: String,
    methods: HashMap<String, DiscoveryMethod>,
}

impl GcpRepository {
    pub fn component(&self) -> &str {
        self.options.component
    }

    pub fn key_field(&self) -> &str {
        self.options.key_field
    }

    pub fn max_results_field(&self) -> &str {
        self.options.max_results_field
    }

    pub async fn execute_query(
        &self,
        verb: &str,
        verb_arguments: VerbArguments,
    ) -> Result<Value, Error> {
        let request = self.build_request(verb, verb_arguments)?;
        tracing::debug!(
            component = self.options.component,
            verb,
            path = %request.path,
            "executing query"
        );
        self.http_client.request(&request).await
    }

    /// Lazily walks all pages of `verb`, following `nextPageToken`.
    ///
    /// A page is requested only when the stream is polled; the stream ends after
    /// the first page without a token or after the first error.
    pub fn execute_paged_query<'a>(
        &'a self,
        verb: &'a str,
        verb_arguments: VerbArguments,
    ) -> impl Stream<Item = Result<Value, Error>> + 'a {
        futures::stream::try_unfold(Some(verb_arguments), move |arguments| async move {
            let Some(mut arguments) = arguments else {
                return Ok::<_, Error>(None);
            };
            let page = self.execute_query(verb, arguments.clone()).await?;
            let next_arguments = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(|token| {
                    arguments.insert("pageToken".to_string(), token.into());
                    arguments
                });
            Ok(Some((page, next_arguments)))
        })
    }

    fn build_request(
        &self,
        verb: &str,
        mut verb_arguments: VerbArguments,
    ) -> Result<DiscoveryRequest, Error> {
        let method = self
            .methods
            .get(verb)
            .ok_or_else(|| Error::UnknownMethod {
                component: self.options.component.to_string(),
                verb: verb.to_string(),
            })?;

        let body = verb_arguments.remove("body");
        let template = format!("{}{}", self.service_path, method.path);
        let path = expand_path(&template, &mut verb_arguments)?;
        let query = verb_arguments
            .into_iter()
            .flat_map(|(name, value)| match value {
                Value::Array(values) => values
                    .into_iter()
                    .map(|value| (name.clone(), argument_to_string(value)))
                    .collect(),
                Value::Null => vec![],
                value => vec![(name, argument_to_string(value))],
            })
            .collect();

        Ok(DiscoveryRequest {
            method: method.method()?,
            path,
            query,
            body: body.map(|body| body.to_string()),
        })
    }
}

fn argument_to_string(value: Value) -> String {
    match value {
        Value::String(value) => value,
        value => value.to_string(),
    }
}

/// Substitutes `{name}` (percent-encoded) and `{+name}` (verbatim) placeholders,
/// consuming the used arguments.
fn expand_path(template: &str, arguments: &mut VerbArguments) -> Result<String, Error> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        path.push_str(&rest[..start]);
        let placeholder = &rest[start + 1..start + length];
        let (name, reserved) = match placeholder.strip_prefix('+') {
            Some(name) => (name, true),
            None => (placeholder, false),
        };
        let value = arguments
            .remove(name)
            .filter(|value| !value.is_null())
            .map(argument_to_string)
            .ok_or_else(|| Error::MissingPathParameter(name.to_string()))?;
        if reserved {
            path.push_str(&value);
        } else {
            path.push_str(&urlencoding::encode(&value));
        }
        rest = &rest[start + length + 1..];
    }
    path.push_str(rest);
    Ok(path)
}

#[derive(Debug)]
struct DiscoveryRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<String>,
}

impl Endpoint for DiscoveryRequest {
    type Response = Value;

    fn method(&self) -> Method {
        self.method.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn query(&self) -> Option<String> {
        serialize_query(&self.query)
    }

    fn body(&self) -> Option<String> {
        self.body.clone()
    }
}

/// Access to the underlying [`GcpRepository`] of a typed repository.
pub trait Repository {
    fn repository(&self) -> &GcpRepository;
}

pub trait ListQuery: Repository {
    /// Lists the resources of the collection page by page.
    ///
    /// `max_results` is sent as the page size; without it the server default applies.
    fn list(
        &self,
        verb_arguments: VerbArguments,
        max_results: Option<u32>,
    ) -> BoxStream<'_, Result<Value, Error>> {
        let repository = self.repository();
        let mut arguments = verb_arguments;
        if let Some(max_results) = max_results {
            arguments.insert(
                repository.max_results_field().to_string(),
                max_results.into(),
            );
        }
        repository.execute_paged_query("list", arguments).boxed()
    }
}

#[async_trait::async_trait]
pub trait GetIamPolicyQuery: Repository + Sync {
    /// `resource` is the full resource name, e.g. `services/pubsub.googleapis.com`.
    async fn get_iam_policy(&self, resource: &str) -> Result<Value, Error> {
        let mut arguments = VerbArguments::new();
        arguments.insert("resource".to_string(), resource.into());
        arguments.insert("body".to_string(), Value::Object(Default::default()));
        self.repository()
            .execute_query("getIamPolicy", arguments)
            .await
    }
}

mod defaults {
    use std::{str::FromStr, time::Duration};
    use url::Url;

    pub fn quota_period() -> f64 {
        100.0
    }

    pub fn http_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn root_url() -> Url {
        Url::from_str("https://servicemanagement.googleapis.com/").expect("valid url")
    }
}

pub(crate) use defaults::{http_timeout as default_http_timeout, root_url as default_root_url};
