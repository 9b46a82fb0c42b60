//! In-memory backend for the command-driver tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::api::{
    ApiResponse, CspmApi, EvaluationRequest, ListQuery, NewRule, RulePatch, SchemaRequest,
};
use crate::error::{IomError, Result};

struct Asset {
    id: String,
    provider: String,
    resource_type: String,
}

#[derive(Default)]
pub struct FakeApi {
    rules: Mutex<Vec<Value>>,
    assets: Vec<Asset>,
    schemas: HashMap<String, Value>,
    rejected_names: Vec<String>,
    delete_failures_after: Option<usize>,
    failing_details: bool,
    next_id: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
    pub evaluations: Mutex<Vec<EvaluationRequest>>,
    pub patches: Mutex<Vec<RulePatch>>,
}

fn ok(resources: Vec<Value>) -> Result<ApiResponse> {
    Ok(ApiResponse::new(200, json!({ "resources": resources })))
}

fn window<T: Clone>(items: &[T], query: &ListQuery) -> Vec<T> {
    items
        .iter()
        .skip(query.offset)
        .take(query.limit)
        .cloned()
        .collect()
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(self, uuid: &str, name: &str, provider: &str, resource_type: &str) -> Self {
        self.rules.lock().unwrap().push(json!({
            "uuid": uuid,
            "name": name,
            "description": format!("{name} description"),
            "provider": provider,
            "severity": 2,
            "logic": "package crowdstrike\ndefault result = \"fail\"\n",
            "resource_types": [{"resource_type": resource_type}],
            "created_at": "2026-01-01T00:00:00Z",
            "created_by": "tester",
        }));
        self
    }

    pub fn with_asset(mut self, id: &str, provider: &str, resource_type: &str) -> Self {
        self.assets.push(Asset {
            id: id.into(),
            provider: provider.into(),
            resource_type: resource_type.into(),
        });
        self
    }

    pub fn with_schema(mut self, resource_type: &str, schema: Value) -> Self {
        self.schemas.insert(resource_type.into(), schema);
        self
    }

    /// Make create calls for `name` fail with HTTP 400.
    pub fn rejecting(mut self, name: &str) -> Self {
        self.rejected_names.push(name.into());
        self
    }

    /// Let the first `n` delete calls succeed and fail the rest with HTTP 500.
    pub fn failing_deletes_after(mut self, n: usize) -> Self {
        self.delete_failures_after = Some(n);
        self
    }

    /// Make resource detail lookups fail with a transient error.
    pub fn failing_details(mut self) -> Self {
        self.failing_details = true;
        self
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r["name"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn matches_filter(asset: &Asset, filter: Option<&str>) -> bool {
        let Some(filter) = filter else { return true };
        filter.split('+').all(|clause| match clause.split_once(':') {
            Some(("cloud_provider", v)) => v.trim_matches('"') == asset.provider,
            Some(("resource_type", v)) => v.trim_matches('"') == asset.resource_type,
            _ => true,
        })
    }
}

impl CspmApi for FakeApi {
    fn list_resources(&self, query: &ListQuery) -> Result<ApiResponse> {
        self.log("list_resources");
        let ids: Vec<Value> = self
            .assets
            .iter()
            .filter(|a| Self::matches_filter(a, query.filter.as_deref()))
            .map(|a| Value::String(a.id.clone()))
            .collect();
        ok(window(&ids, query))
    }

    fn get_resource_details(&self, ids: &[String]) -> Result<ApiResponse> {
        self.log("get_resource_details");
        if self.failing_details {
            return Err(IomError::Transient("connection reset".into()));
        }
        ok(self
            .assets
            .iter()
            .filter(|a| ids.contains(&a.id))
            .map(|a| {
                json!({
                    "resource_id": a.id,
                    "cloud_provider": a.provider,
                    "resource_type": a.resource_type,
                })
            })
            .collect())
    }

    fn get_input_schema(&self, request: &SchemaRequest) -> Result<ApiResponse> {
        self.log("get_input_schema");
        match self.schemas.get(&request.resource_type) {
            Some(Value::Array(items)) => ok(items.clone()),
            _ => Ok(ApiResponse::new(
                404,
                json!({"errors": [{"code": 404, "message": "resource not found or unavailable"}]}),
            )),
        }
    }

    fn evaluate_logic(&self, request: &EvaluationRequest) -> Result<ApiResponse> {
        self.log("evaluate_logic");
        self.evaluations.lock().unwrap().push(request.clone());
        ok(request
            .ids
            .iter()
            .map(|id| json!({"resource_id": id, "evaluation": {"result": "pass"}}))
            .collect())
    }

    fn create_rule(&self, rule: &NewRule) -> Result<ApiResponse> {
        self.log("create_rule");
        if self.rejected_names.contains(&rule.name) {
            return Ok(ApiResponse::new(
                400,
                json!({"errors": [{"code": 400, "message": "rule logic failed to compile"}]}),
            ));
        }
        let uuid = format!("uuid-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = json!({
            "uuid": uuid,
            "name": rule.name,
            "description": rule.description,
            "provider": rule.provider,
            "severity": rule.severity,
            "logic": rule.logic,
            "resource_types": [{"resource_type": rule.resource_type}],
        });
        self.rules.lock().unwrap().push(stored.clone());
        ok(vec![stored])
    }

    fn list_rules(&self, query: &ListQuery) -> Result<ApiResponse> {
        self.log("list_rules");
        let ids: Vec<Value> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["uuid"].clone())
            .collect();
        ok(window(&ids, query))
    }

    fn get_rule_details(&self, ids: &[String]) -> Result<ApiResponse> {
        self.log("get_rule_details");
        let rules = self.rules.lock().unwrap();
        ok(ids
            .iter()
            .filter_map(|id| rules.iter().find(|r| r["uuid"] == id.as_str()).cloned())
            .collect())
    }

    fn update_rule(&self, patch: &RulePatch) -> Result<ApiResponse> {
        self.log("update_rule");
        self.patches.lock().unwrap().push(patch.clone());
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| r["uuid"] == patch.uuid.as_str()) else {
            return Ok(ApiResponse::new(
                404,
                json!({"errors": [{"code": 404, "message": "rule not found"}]}),
            ));
        };
        if let Some(name) = &patch.name {
            rule["name"] = json!(name);
        }
        if let Some(description) = &patch.description {
            rule["description"] = json!(description);
        }
        if let Some(severity) = patch.severity {
            rule["severity"] = json!(severity);
        }
        ok(vec![rule.clone()])
    }

    fn delete_rules(&self, ids: &[String]) -> Result<ApiResponse> {
        let previous = self.count("delete_rules");
        self.log("delete_rules");
        if self.delete_failures_after.is_some_and(|n| previous >= n) {
            return Ok(ApiResponse::new(
                500,
                json!({"errors": [{"code": 500, "message": "boom"}]}),
            ));
        }
        self.rules
            .lock()
            .unwrap()
            .retain(|r| !ids.iter().any(|id| r["uuid"] == id.as_str()));
        ok(ids.iter().map(|id| Value::String(id.clone())).collect())
    }
}
