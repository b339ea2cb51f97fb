use super::{
    BaseRepositoryClient, GcpRepository, GetIamPolicyQuery, ListQuery, Repository,
    RepositoryClientConfig, RepositoryOptions, VerbArguments,
};
use crate::{types::ConfigView, Error};
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::OnceCell;

pub const API_NAME: &str = "servicemanagement";
pub const API_VERSION: &str = "v1";

/// Service Management API repository client.
///
/// The services repository is built on first access and shared afterwards.
#[derive(Debug)]
pub struct ServiceManagementRepositoryClient {
    base: BaseRepositoryClient,
    services: OnceCell<ServicesRepository>,
}

impl ServiceManagementRepositoryClient {
    pub fn new(mut config: RepositoryClientConfig) -> Result<Self, Error> {
        if config.quota_max_calls.unwrap_or_default() == 0 {
            config.use_rate_limiter = false;
        }

        Ok(Self {
            base: BaseRepositoryClient::new(API_NAME, API_VERSION, config)?,
            services: OnceCell::new(),
        })
    }

    pub fn base(&self) -> &BaseRepositoryClient {
        &self.base
    }

    pub async fn services(&self) -> Result<&ServicesRepository, Error> {
        self.services
            .get_or_try_init(|| async {
                self.base
                    .init_repository(ServicesRepository::OPTIONS)
                    .await
                    .map(|repository| ServicesRepository { repository })
            })
            .await
    }
}

/// Filters accepted by `services.list`.
///
/// With neither set, all services visible to the caller are listed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServicesFilter {
    /// Lists the services produced by this project.
    pub producer_project_id: Option<String>,
    /// Lists the services enabled for this consumer, formatted as `project:<id>`.
    pub consumer_id: Option<String>,
}

impl ServicesFilter {
    pub fn producer(project_id: impl Into<String>) -> Self {
        Self {
            producer_project_id: Some(project_id.into()),
            consumer_id: None,
        }
    }

    pub fn consumer(consumer_id: impl Into<String>) -> Self {
        Self {
            producer_project_id: None,
            consumer_id: Some(consumer_id.into()),
        }
    }

    fn to_arguments(&self) -> VerbArguments {
        let mut arguments = VerbArguments::new();
        if let Some(producer_project_id) = &self.producer_project_id {
            arguments.insert(
                "producerProjectId".to_string(),
                producer_project_id.as_str().into(),
            );
        }
        if let Some(consumer_id) = &self.consumer_id {
            arguments.insert("consumerId".to_string(), consumer_id.as_str().into());
        }
        arguments
    }
}

/// Repository of the `services` collection.
///
/// Unlike most collections, `services.list` takes no parent resource; the
/// listing is narrowed by a [`ServicesFilter`] instead.
#[derive(Clone, Debug)]
pub struct ServicesRepository {
    repository: GcpRepository,
}

impl Repository for ServicesRepository {
    fn repository(&self) -> &GcpRepository {
        &self.repository
    }
}

impl ListQuery for ServicesRepository {}

impl GetIamPolicyQuery for ServicesRepository {}

impl ServicesRepository {
    const OPTIONS: RepositoryOptions = RepositoryOptions {
        component: "services",
        key_field: "serviceName",
        max_results_field: "pageSize",
    };

    /// Prefixes `project:` unless already present, as `consumerId` expects.
    pub fn format_project_name(project_id: &str) -> String {
        if project_id.starts_with("project:") {
            project_id.to_string()
        } else {
            format!("project:{project_id}")
        }
    }

    /// Prefixes `services/` unless already present.
    pub fn format_service_name(service_name: &str) -> String {
        if service_name.starts_with("services/") {
            service_name.to_string()
        } else {
            format!("services/{service_name}")
        }
    }

    pub fn list_services(
        &self,
        filter: &ServicesFilter,
        max_results: Option<u32>,
    ) -> BoxStream<'_, Result<Value, Error>> {
        self.list(filter.to_arguments(), max_results)
    }

    /// Gets the service configuration of `resource`, the service name.
    pub async fn get_config(
        &self,
        resource: &str,
        config_id: Option<&str>,
        view: Option<ConfigView>,
    ) -> Result<Value, Error> {
        self.get_config_with_verb(resource, config_id, view, "getConfig")
            .await
    }

    pub async fn get_config_with_verb(
        &self,
        resource: &str,
        config_id: Option<&str>,
        view: Option<ConfigView>,
        verb: &str,
    ) -> Result<Value, Error> {
        let mut arguments = VerbArguments::new();
        arguments.insert(self.repository.key_field().to_string(), resource.into());
        if let Some(config_id) = config_id.filter(|id| !id.is_empty()) {
            arguments.insert("configId".to_string(), config_id.into());
        }
        if let Some(view) = view {
            arguments.insert("view".to_string(), serde_json::to_value(view)?);
        }

        self.repository.execute_query(verb, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::str::FromStr;
    use url::Url;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    async fn repository_client(server: &MockServer) -> ServiceManagementRepositoryClient {
        let config = RepositoryClientConfig::default()
            .root_url(Url::from_str(&server.uri()).unwrap());
        ServiceManagementRepositoryClient::new(config).unwrap()
    }

    #[test]
    fn format_project_name_is_idempotent() {
        for project_id in ["p1", "project:p1", "", "projects/p1"] {
            let formatted = ServicesRepository::format_project_name(project_id);
            assert_eq!(
                ServicesRepository::format_project_name(&formatted),
                formatted
            );
        }
        assert_eq!(ServicesRepository::format_project_name("p1"), "project:p1");
        assert_eq!(
            ServicesRepository::format_project_name("project:p1"),
            "project:p1"
        );
        assert_eq!(
            ServicesRepository::format_project_name("projects/p1"),
            "project:projects/p1"
        );
    }

    #[test]
    fn format_service_name_is_idempotent() {
        for service_name in ["svcA", "services/svcA", "", "pubsub.googleapis.com"] {
            let formatted = ServicesRepository::format_service_name(service_name);
            assert_eq!(
                ServicesRepository::format_service_name(&formatted),
                formatted
            );
        }
        assert_eq!(
            ServicesRepository::format_service_name("svcA"),
            "services/svcA"
        );
        assert_eq!(
            ServicesRepository::format_service_name("services/svcA"),
            "services/svcA"
        );
    }

    #[test]
    fn filter_arguments() {
        assert!(ServicesFilter::default().to_arguments().is_empty());
        assert_eq!(
            Value::Object(ServicesFilter::producer("p1").to_arguments()),
            json!({"producerProjectId": "p1"})
        );
        assert_eq!(
            Value::Object(ServicesFilter::consumer("project:p1").to_arguments()),
            json!({"consumerId": "project:p1"})
        );
    }

    #[test]
    fn rate_limiter_disabled_without_quota() {
        let client = ServiceManagementRepositoryClient::new(RepositoryClientConfig::default())
            .unwrap();
        assert!(!client.base().is_rate_limited());

        let config = RepositoryClientConfig::default().with_quota(Some(0), 100.0);
        let client = ServiceManagementRepositoryClient::new(config).unwrap();
        assert!(!client.base().is_rate_limited());

        let config = RepositoryClientConfig::default().with_quota(Some(25), 100.0);
        let client = ServiceManagementRepositoryClient::new(config).unwrap();
        assert!(client.base().is_rate_limited());
    }

    #[tokio::test]
    async fn services_repository_is_memoized() {
        let client = ServiceManagementRepositoryClient::new(RepositoryClientConfig::default())
            .unwrap();
        let first = client.services().await.unwrap();
        let second = client.services().await.unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn get_config_sends_optional_arguments() {
        let server = MockServer::start().await;
        let document = json!({"name": "svcA", "id": "2024-01-01r0", "title": "Service A"});
        Mock::given(method("GET"))
            .and(path("/v1/services/svcA/config"))
            .and(query_param("configId", "2024-01-01r0"))
            .and(query_param("view", "FULL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&document))
            .expect(1)
            .mount(&server)
            .await;

        let client = repository_client(&server).await;
        let services = client.services().await.unwrap();
        let config = services
            .get_config("svcA", Some("2024-01-01r0"), Some(ConfigView::Full))
            .await
            .unwrap();
        assert_eq!(config, document);
    }

    #[tokio::test]
    async fn get_config_skips_empty_config_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services/svcA/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "svcA"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = repository_client(&server).await;
        let services = client.services().await.unwrap();
        services.get_config("svcA", Some(""), None).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn list_walks_pages_lazily() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("pageToken", "t1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"services": [{"serviceName": "c"}]})),
            )
            .with_priority(1)
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("pageSize", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"serviceName": "a"}, {"serviceName": "b"}],
                "nextPageToken": "t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = repository_client(&server).await;
        let services = client.services().await.unwrap();
        let mut pages = services.list_services(&ServicesFilter::default(), Some(2));
        let first = pages.next().await.unwrap().unwrap();
        assert_eq!(first["nextPageToken"], "t1");
        // the second page is never polled, so it is never requested
    }
}
