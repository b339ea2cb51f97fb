use crate::{Endpoint, Error};
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Response,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware};
use serde::Deserialize;
use std::{fmt, sync::Arc, time::Duration};
use url::Url;

#[derive(Clone)]
pub struct HttpApiClientConfig {
    /// The maximum time limit for an API request. If a request takes longer than this, it will be
    /// cancelled.
    pub http_timeout: Duration,
    /// A default set of HTTP headers which will be sent with each API request.
    pub default_headers: HeaderMap,
    /// Middlewares that will process each API request before the request is actually sent.
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Default for HttpApiClientConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            default_headers: HeaderMap::default(),
            middlewares: Vec::new(),
        }
    }
}

// Middlewares do not implement `Debug`, so only their number is shown.
impl fmt::Debug for HttpApiClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiClientConfig")
            .field("http_timeout", &self.http_timeout)
            .field("default_headers", &self.default_headers)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct HttpApiClient {
    base_url: Url,
    http_client: ClientWithMiddleware,
}

impl fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpApiClient {
    pub fn new(base_url: Url, config: HttpApiClientConfig) -> Result<Self, Error> {
        let reqwest_client = reqwest::Client::builder()
            .default_headers(config.default_headers)
            .timeout(config.http_timeout)
            .build()?;

        let mut client_builder = ClientBuilder::new(reqwest_client);
        for middleware in config.middlewares {
            client_builder = client_builder.with_arc(middleware);
        }

        Ok(Self {
            base_url,
            http_client: client_builder.build(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send a request for the specified endpoint and deserialize the JSON response.
    pub async fn request<EndpointType: Endpoint>(
        &self,
        endpoint: &EndpointType,
    ) -> Result<<EndpointType as Endpoint>::Response, Error> {
        let mut request = self
            .http_client
            .request(endpoint.method(), endpoint.url(&self.base_url)?);

        if let Some(headers) = endpoint.headers() {
            request = request.headers(headers);
        }
        if let Some(body) = endpoint.body() {
            request = request
                .header(CONTENT_TYPE, endpoint.content_type().into_owned())
                .body(body);
        }

        let response = request.send().await?;
        self.process_response(response).await
    }

    async fn process_response<T: for<'a> Deserialize<'a>>(
        &self,
        response: Response,
    ) -> Result<T, Error> {
        let status_code = response.status();
        if !status_code.is_success() {
            let message = response.text().await?;
            return Err(Error::InvalidStatusCode {
                status_code,
                message,
            });
        }

        let text = response.text().await?;
        let deserializer = &mut serde_json::Deserializer::from_str(&text);
        Ok(serde_path_to_error::deserialize(deserializer)?)
    }
}
