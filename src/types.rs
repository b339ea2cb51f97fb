use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A service listed by `services.list`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedService {
    #[serde(default)]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_project_id: Option<String>,
}

/// The service configuration document returned by `services.getConfig`.
pub type ServiceConfig = Value;

/// Which portion of the service configuration should be returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigView {
    Basic,
    Full,
}

/// IAM policy attached to a service.
///
/// Fields not modeled here are kept in `extra`, so the document round-trips unchanged.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_configs: Vec<AuditConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
}

/// A CEL condition attached to a binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expr {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    pub service: String,
    #[serde(default)]
    pub audit_log_configs: Vec<AuditLogConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogConfig {
    pub log_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exempted_members: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserialize_managed_service() {
        let service: ManagedService = serde_json::from_value(json!({
            "serviceName": "pubsub.googleapis.com",
            "producerProjectId": "google.com:cloudpubsub"
        }))
        .unwrap();
        assert_eq!(service.service_name, "pubsub.googleapis.com");
        assert_eq!(
            service.producer_project_id.as_deref(),
            Some("google.com:cloudpubsub")
        );

        let service: ManagedService =
            serde_json::from_value(json!({"serviceName": "orphan.example.com"})).unwrap();
        assert_eq!(service.producer_project_id, None);
    }

    #[test]
    fn policy_keeps_unknown_fields() {
        let document = json!({
            "version": 3,
            "etag": "BwWKmjvelug=",
            "bindings": [{
                "role": "roles/servicemanagement.serviceConsumer",
                "members": ["user:alice@example.com"],
                "condition": {"expression": "request.time < timestamp('2030-01-01T00:00:00Z')"}
            }],
            "auditConfigs": [{
                "service": "allServices",
                "auditLogConfigs": [{"logType": "DATA_READ", "exemptedMembers": ["user:bob@example.com"]}]
            }],
            "kind": "servicemanagement#policy"
        });
        let policy: Policy = serde_json::from_value(document.clone()).unwrap();
        assert_eq!(policy.version, Some(3));
        assert_eq!(policy.bindings[0].members, vec!["user:alice@example.com"]);
        assert_eq!(policy.audit_configs[0].audit_log_configs[0].log_type, "DATA_READ");
        assert_eq!(serde_json::to_value(&policy).unwrap(), document);
    }

    #[test]
    fn config_view_is_screaming_case() {
        assert_eq!(serde_json::to_value(ConfigView::Full).unwrap(), json!("FULL"));
        assert_eq!(serde_json::to_value(ConfigView::Basic).unwrap(), json!("BASIC"));
    }
}
