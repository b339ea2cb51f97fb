use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt::Debug};
use url::Url;

/// Represents a specification for an API call that can be built into an HTTP request and sent.
///
/// If the request succeeds, the call will resolve to a `Response`.
pub trait Endpoint {
    type Response: for<'a> Deserialize<'a> + Debug;

    /// The HTTP Method used for this endpoint (e.g. GET, POST)
    fn method(&self) -> reqwest::Method;

    /// The URL path for this endpoint, relative to the client base url.
    /// An absolute url replaces the base url entirely.
    fn path(&self) -> String;

    /// The url-encoded query string associated with this endpoint. Defaults to `None`.
    #[inline]
    fn query(&self) -> Option<String> {
        None
    }

    /// The set of headers to be sent with request. Defaults to `None`.
    #[inline]
    fn headers(&self) -> Option<reqwest::header::HeaderMap> {
        None
    }

    /// The HTTP body associated with this endpoint. Defaults to `None`.
    #[inline]
    fn body(&self) -> Option<String> {
        None
    }

    /// Builds and returns a formatted full URL, including query, for the endpoint.
    fn url(&self, base_url: &Url) -> Result<Url, url::ParseError> {
        let mut url = base_url.join(&self.path())?;
        url.set_query(self.query().as_deref());
        Ok(url)
    }

    /// If `body` is populated, indicates the body MIME type (defaults to JSON).
    fn content_type(&self) -> Cow<'static, str> {
        Cow::Borrowed("application/json")
    }
}

/// A utility function for serializing parameters into a URL query string.
/// Returns `None` for an empty parameter set so no dangling `?` is produced.
#[inline]
pub fn serialize_query<Q: Serialize>(q: &Q) -> Option<String> {
    serde_urlencoded::to_string(q)
        .ok()
        .filter(|query| !query.is_empty())
}
