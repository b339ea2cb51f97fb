//! Rate-limited client for the Google Cloud Service Management API.
//!
//! [`ServiceManagementClient`] lists visible, produced and enabled services and
//! fetches service IAM policies and configurations. Requests are executed by a
//! generic [`repository`] layer driven by the API discovery document.

mod client;
mod endpoint;
mod error;
mod http_client;

pub mod discovery;
pub mod pagination;
pub mod rate_limiter;
pub mod repository;
pub mod settings;
pub mod types;

pub use client::ServiceManagementClient;
pub use endpoint::{serialize_query, Endpoint};
pub use error::{ApiExecutionError, Error};
pub use http_client::{HttpApiClient, HttpApiClientConfig};
pub use repository::servicemanagement::{
    ServiceManagementRepositoryClient, ServicesFilter, ServicesRepository,
};
pub use settings::Settings;
pub use types::{ConfigView, ManagedService, Policy, ServiceConfig};

pub use reqwest;
pub use reqwest_middleware;
