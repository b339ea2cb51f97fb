use crate::{
    error::ApiExecutionError,
    pagination::flatten_list_results,
    repository::{
        servicemanagement::{
            ServiceManagementRepositoryClient, ServicesFilter, ServicesRepository, API_NAME,
        },
        GetIamPolicyQuery, RepositoryClientConfig,
    },
    settings::Settings,
    types::{ManagedService, Policy, ServiceConfig},
    Error,
};

/// Read-only access to the Service Management API.
///
/// Every failure is logged and returned as an [`ApiExecutionError`].
#[derive(Debug)]
pub struct ServiceManagementClient {
    repository: ServiceManagementRepositoryClient,
}

impl ServiceManagementClient {
    /// Maximum number of results to fetch per page for paged API calls.
    pub const DEFAULT_MAX_RESULTS: u32 = 100;

    pub fn new(settings: &Settings) -> Result<Self, Error> {
        Self::with_rate_limiter(settings, true)
    }

    /// `use_rate_limiter = false` disables throttling even if a quota is configured.
    pub fn with_rate_limiter(settings: &Settings, use_rate_limiter: bool) -> Result<Self, Error> {
        let (max_calls, quota_period) = settings.rate_limiter_config(API_NAME);

        let config = RepositoryClientConfig::default()
            .with_quota(max_calls, quota_period)
            .use_rate_limiter(use_rate_limiter)
            .cache_discovery(settings.cache_discovery, settings.cache.clone())
            .root_url(settings.root_url.clone())
            .discovery_url(settings.discovery_url.clone())
            .http_timeout(settings.http_timeout)
            .max_retries(settings.max_retries)
            .access_token(settings.access_token.clone());

        Ok(Self {
            repository: ServiceManagementRepositoryClient::new(config)?,
        })
    }

    pub fn repository(&self) -> &ServiceManagementRepositoryClient {
        &self.repository
    }

    /// Gets all APIs that can be enabled, based on the caller's permissions.
    pub async fn get_all_apis(&self) -> Result<Vec<ManagedService>, ApiExecutionError> {
        let flattened_results = self
            .list_services(ServicesFilter::default())
            .await
            .map_err(|err| {
                let api_exception = ApiExecutionError::new("", err);
                tracing::error!("{api_exception}");
                api_exception
            })?;

        tracing::debug!(?flattened_results, "getting all visible APIs");
        Ok(flattened_results)
    }

    /// Gets the APIs produced by a project.
    pub async fn get_produced_apis(
        &self,
        project_id: &str,
    ) -> Result<Vec<ManagedService>, ApiExecutionError> {
        let flattened_results = self
            .list_services(ServicesFilter::producer(project_id))
            .await
            .map_err(|err| {
                let api_exception =
                    ApiExecutionError::new("name", err).with_tag("project_id", project_id);
                tracing::error!(project_id, "{api_exception}");
                api_exception
            })?;

        tracing::debug!(
            project_id,
            ?flattened_results,
            "getting the APIs produced by a project"
        );
        Ok(flattened_results)
    }

    /// Gets the APIs enabled for a project.
    pub async fn get_enabled_apis(
        &self,
        project_id: &str,
    ) -> Result<Vec<ManagedService>, ApiExecutionError> {
        let consumer_id = ServicesRepository::format_project_name(project_id);
        let flattened_results = self
            .list_services(ServicesFilter::consumer(consumer_id))
            .await
            .map_err(|err| {
                let api_exception =
                    ApiExecutionError::new("name", err).with_tag("project_id", project_id);
                tracing::error!(project_id, "{api_exception}");
                api_exception
            })?;

        tracing::debug!(
            project_id,
            ?flattened_results,
            "getting the enabled APIs for a project"
        );
        Ok(flattened_results)
    }

    /// Gets the IAM policy attached to a service.
    ///
    /// Policy inherited from the service's producer project is not included.
    pub async fn get_api_iam_policy(&self, service_name: &str) -> Result<Policy, ApiExecutionError> {
        let name = ServicesRepository::format_service_name(service_name);
        let result = async {
            let policy = self.repository.services().await?.get_iam_policy(&name).await?;
            Ok::<Policy, Error>(serde_json::from_value(policy)?)
        }
        .await
        .map_err(|err| {
            let api_exception = ApiExecutionError::new("serviceIamPolicy", err)
                .with_tag("serviceName", service_name);
            tracing::error!(service_name, "{api_exception}");
            api_exception
        })?;

        tracing::debug!(service_name, ?result, "getting IAM policy for a service");
        Ok(result)
    }

    /// Gets the full service configuration of a service.
    pub async fn get_full_api_configuration(
        &self,
        service_name: &str,
    ) -> Result<ServiceConfig, ApiExecutionError> {
        let result = async {
            self.repository
                .services()
                .await?
                .get_config(service_name, None, None)
                .await
        }
        .await
        .map_err(|err| {
            let api_exception = ApiExecutionError::new("serviceConfig", err)
                .with_tag("serviceName", service_name);
            tracing::error!(service_name, "{api_exception}");
            api_exception
        })?;

        tracing::debug!(service_name, ?result, "getting service config for a service");
        Ok(result)
    }

    async fn list_services(&self, filter: ServicesFilter) -> Result<Vec<ManagedService>, Error> {
        let services = self.repository.services().await?;
        let pages = services.list_services(&filter, Some(Self::DEFAULT_MAX_RESULTS));
        let items = flatten_list_results(pages, "services").await?;
        items
            .into_iter()
            .map(serde_json::from_value::<ManagedService>)
            .collect::<Result<_, _>>()
            .map_err(Error::from)
    }
}
