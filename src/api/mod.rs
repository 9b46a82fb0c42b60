//! The backend's REST operations behind one trait.
//!
//! Everything in `workflow` and `ops` talks to [`CspmApi`], never to HTTP
//! directly. [`client::FalconClient`] is the production implementation; tests
//! substitute in-memory fakes.

pub mod client;

use serde::Serialize;
use serde_json::Value;

use crate::error::{IomError, Result};
use crate::rules::RuleConfig;

pub use client::{Credentials, FalconClient};

/// Upper bound on ids accepted by the id-addressed endpoints.
pub const MAX_IDS_PER_REQUEST: usize = 100;

/// Largest page the rule query endpoint returns.
pub const MAX_RULE_PAGE: usize = 500;

/// Message the schema endpoint uses for resource types it cannot evaluate.
const NOT_FOUND_SIGNAL: &str = "resource not found or unavailable";

/// Status code plus decoded JSON body of one API call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    /// The `resources` array of the body, empty when absent.
    pub fn resources(&self) -> &[Value] {
        self.body
            .get("resources")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First `errors[].message`, falling back to the raw body.
    pub fn error_message(&self) -> String {
        self.body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.body.to_string())
    }

    /// True when the backend answered with its well-formed "not found" rejection.
    pub fn is_not_found_signal(&self) -> bool {
        !self.is_success() && self.error_message().to_lowercase().contains(NOT_FOUND_SIGNAL)
    }

    /// Convert into the `resources` array, or the classified error for a
    /// non-success status.
    pub fn into_resources(self) -> Result<Vec<Value>> {
        if !self.is_success() {
            return Err(IomError::from_status(self.status, self.error_message()));
        }
        match self.body {
            Value::Object(mut map) => match map.remove("resources") {
                Some(Value::Array(items)) => Ok(items),
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(other) => Err(IomError::Internal(format!(
                    "expected 'resources' to be an array, got {other}"
                ))),
            },
            _ => Ok(Vec::new()),
        }
    }

    /// Convert into a list of string identifiers.
    pub fn into_ids(self) -> Result<Vec<String>> {
        Ok(self
            .into_resources()?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

/// Filter / sort / window for the list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ListQuery {
    pub fn new(filter: Option<String>, limit: usize) -> Self {
        Self {
            filter,
            sort: None,
            limit,
            offset: 0,
        }
    }

    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(filter) = &self.filter {
            params.push(("filter", filter.clone()));
        }
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRequest {
    /// Lowercase provider name (`aws`, `azure`, `gcp`, `oci`).
    pub cloud_provider: String,
    pub resource_type: String,
    pub domain: String,
    pub subdomain: String,
}

impl SchemaRequest {
    pub fn iom(cloud_provider: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            cloud_provider: cloud_provider.into(),
            resource_type: resource_type.into(),
            domain: crate::rules::DEFAULT_DOMAIN.into(),
            subdomain: crate::rules::DEFAULT_SUBDOMAIN.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    #[serde(skip)]
    pub cloud_provider: String,
    #[serde(skip)]
    pub resource_type: String,
    pub logic: String,
    pub ids: Vec<String>,
}

/// Body of the create-rule call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    pub domain: String,
    pub subdomain: String,
    pub resource_type: String,
    pub logic: String,
    pub platform: String,
    pub provider: String,
    pub severity: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attack_types: Vec<String>,
    /// Always sent, empty when the document has none.
    pub controls: Vec<Value>,
}

impl From<&RuleConfig> for NewRule {
    fn from(rule: &RuleConfig) -> Self {
        Self {
            name: rule.name.clone(),
            description: rule.description.clone(),
            domain: rule.domain.clone(),
            subdomain: rule.subdomain.clone(),
            resource_type: rule.resource_type.clone(),
            logic: rule.logic.clone(),
            platform: rule.platform.clone(),
            provider: rule.provider.clone(),
            severity: rule.severity.into(),
            alert_info: rule.alert_info.clone(),
            remediation: rule.remediation.clone(),
            attack_types: rule.attack_types.clone(),
            controls: rule.controls.clone(),
        }
    }
}

/// One entry of `rule_logic_list` in an update body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleLogic {
    pub logic: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_info: Option<String>,
}

/// Partial update body; only `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RulePatch {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_logic_list: Option<Vec<RuleLogic>>,
}

impl RulePatch {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Default::default()
        }
    }

    /// Full update derived from a desired-state document.
    pub fn from_config(uuid: impl Into<String>, rule: &RuleConfig) -> Self {
        Self {
            uuid: uuid.into(),
            name: Some(rule.name.clone()),
            description: Some(rule.description.clone()),
            severity: Some(rule.severity.into()),
            alert_info: rule.alert_info.clone(),
            attack_types: (!rule.attack_types.is_empty()).then(|| rule.attack_types.clone()),
            rule_logic_list: Some(vec![RuleLogic {
                logic: rule.logic.clone(),
                platform: rule.platform.clone(),
                remediation_info: rule.remediation.clone(),
            }]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.alert_info.is_none()
            && self.attack_types.is_none()
            && self.rule_logic_list.is_none()
    }
}

/// The external backend. Implementations must be shareable across probe workers.
pub trait CspmApi: Send + Sync {
    fn list_resources(&self, query: &ListQuery) -> Result<ApiResponse>;

    fn get_resource_details(&self, ids: &[String]) -> Result<ApiResponse>;

    fn get_input_schema(&self, request: &SchemaRequest) -> Result<ApiResponse>;

    fn evaluate_logic(&self, request: &EvaluationRequest) -> Result<ApiResponse>;

    fn create_rule(&self, rule: &NewRule) -> Result<ApiResponse>;

    fn list_rules(&self, query: &ListQuery) -> Result<ApiResponse>;

    fn get_rule_details(&self, ids: &[String]) -> Result<ApiResponse>;

    fn update_rule(&self, patch: &RulePatch) -> Result<ApiResponse>;

    fn delete_rules(&self, ids: &[String]) -> Result<ApiResponse>;
}

/// Truncate an id list to what one request accepts.
pub fn capped_ids(ids: &[String]) -> &[String] {
    if ids.len() > MAX_IDS_PER_REQUEST {
        tracing::warn!(
            requested = ids.len(),
            max = MAX_IDS_PER_REQUEST,
            "too many ids for one request, using the first {MAX_IDS_PER_REQUEST}"
        );
        &ids[..MAX_IDS_PER_REQUEST]
    } else {
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resources_extracted_on_success() {
        let resp = ApiResponse::new(200, json!({"resources": ["a", "b"]}));
        assert_eq!(resp.into_ids().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn null_resources_are_empty() {
        let resp = ApiResponse::new(200, json!({"resources": null}));
        assert!(resp.into_resources().unwrap().is_empty());
    }

    #[test]
    fn failure_carries_first_error_message() {
        let resp = ApiResponse::new(
            400,
            json!({"errors": [{"code": 400, "message": "invalid filter"}]}),
        );
        match resp.into_resources() {
            Err(IomError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid filter");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_is_auth_error() {
        let resp = ApiResponse::new(401, json!({"errors": [{"message": "access denied"}]}));
        assert!(matches!(
            resp.into_resources(),
            Err(IomError::Auth { status: 401, .. })
        ));
    }

    #[test]
    fn not_found_signal_detected_case_insensitively() {
        let resp = ApiResponse::new(
            404,
            json!({"errors": [{"message": "Resource Not Found or Unavailable"}]}),
        );
        assert!(resp.is_not_found_signal());
        let ok = ApiResponse::new(200, json!({"resources": []}));
        assert!(!ok.is_not_found_signal());
    }

    #[test]
    fn query_params_include_optional_fields() {
        let mut query = ListQuery::new(Some("rule_origin:'Custom'".into()), 50);
        query.offset = 100;
        let params = query.params();
        assert!(params.contains(&("limit", "50".into())));
        assert!(params.contains(&("offset", "100".into())));
        assert!(params.contains(&("filter", "rule_origin:'Custom'".into())));
        assert!(!params.iter().any(|(k, _)| *k == "sort"));
    }

    #[test]
    fn capped_ids_truncates_to_limit() {
        let ids: Vec<String> = (0..150).map(|i| i.to_string()).collect();
        assert_eq!(capped_ids(&ids).len(), MAX_IDS_PER_REQUEST);
        assert_eq!(capped_ids(&ids[..3]).len(), 3);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(RulePatch::new("id").is_empty());
        let mut patch = RulePatch::new("id");
        patch.severity = Some(0);
        assert!(!patch.is_empty());
    }

    #[test]
    fn new_rule_always_sends_controls() {
        let rule = NewRule {
            name: "n".into(),
            description: "d".into(),
            domain: "CSPM".into(),
            subdomain: "IOM".into(),
            resource_type: "AWS::EC2::Instance".into(),
            logic: "package crowdstrike".into(),
            platform: "AWS".into(),
            provider: "AWS".into(),
            severity: 1,
            alert_info: None,
            remediation: None,
            attack_types: vec![],
            controls: vec![],
        };
        let body = serde_json::to_value(&rule).unwrap();
        assert_eq!(body["controls"], json!([]));
        assert!(body.get("alert_info").is_none());
        assert!(body.get("attack_types").is_none());
    }
}
