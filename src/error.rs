use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("middleware error: {0:#}")]
    Middleware(anyhow::Error),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid status code: {status_code} with message: {message}")]
    InvalidStatusCode {
        status_code: StatusCode,
        message: String,
    },
    #[error("cannot deserialize response: {0}")]
    Deserialization(#[from] serde_path_to_error::Error<serde_json::Error>),
    #[error("cannot decode document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("method '{verb}' is not defined for resource '{component}'")]
    UnknownMethod { component: String, verb: String },
    #[error("path parameter '{0}' is required but was not provided")]
    MissingPathParameter(String),
    #[error("resource '{0}' is not described by the discovery document")]
    UnknownResource(String),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("invalid http method in discovery document: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Middleware(err) => Error::Middleware(err),
            reqwest_middleware::Error::Reqwest(err) => Error::Request(err),
        }
    }
}

/// The single error kind surfaced by [`ServiceManagementClient`](crate::ServiceManagementClient).
///
/// Carries the label of the resource that could not be fetched, the underlying
/// transport error, and optionally the identifier the request was built from.
#[derive(Debug, thiserror::Error)]
#[error("GCP API Error: unable to get {resource_name} from GCP: {source}{}", display_tag(.tag))]
pub struct ApiExecutionError {
    resource_name: String,
    #[source]
    source: Error,
    tag: Option<(String, String)>,
}

impl ApiExecutionError {
    pub fn new(resource_name: impl Into<String>, source: Error) -> Self {
        Self {
            resource_name: resource_name.into(),
            source,
            tag: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag = Some((key.into(), value.into()));
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn cause(&self) -> &Error {
        &self.source
    }

    pub fn tag(&self) -> Option<(&str, &str)> {
        self.tag
            .as_ref()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Status code returned by the API, if the failure was an HTTP-level one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match &self.source {
            Error::InvalidStatusCode { status_code, .. } => Some(*status_code),
            Error::Request(err) => err.status(),
            _ => None,
        }
    }
}

fn display_tag(tag: &Option<(String, String)>) -> String {
    tag.as_ref()
        .map(|(key, value)| format!(" ({key}={value})"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> Error {
        Error::InvalidStatusCode {
            status_code: StatusCode::NOT_FOUND,
            message: "service not found".to_string(),
        }
    }

    #[test]
    fn display_includes_tag() {
        let err = ApiExecutionError::new("serviceConfig", not_found()).with_tag("serviceName", "svcA");
        assert_eq!(
            err.to_string(),
            "GCP API Error: unable to get serviceConfig from GCP: invalid status code: 404 Not Found with message: service not found (serviceName=svcA)"
        );
        assert_eq!(err.tag(), Some(("serviceName", "svcA")));
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn untagged_error_has_no_context() {
        let err = ApiExecutionError::new("", not_found());
        assert_eq!(err.tag(), None);
        assert_eq!(err.resource_name(), "");
        assert!(std::error::Error::source(&err).is_some());
    }
}
