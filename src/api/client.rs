//! HTTP implementation of [`CspmApi`].
//!
//! One `reqwest` blocking client and one bearer token are shared by every
//! caller, including probe workers running in parallel.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    capped_ids, ApiResponse, CspmApi, EvaluationRequest, ListQuery, NewRule, RulePatch,
    SchemaRequest,
};
use crate::config::ApiConfig;
use crate::error::{IomError, Result};

const TOKEN_PATH: &str = "/oauth2/token";
const RESOURCE_QUERY_PATH: &str = "/cloud-security-assets/queries/resources/v1";
const RESOURCE_ENTITY_PATH: &str = "/cloud-security-assets/entities/resources/v1";
const INPUT_SCHEMA_PATH: &str = "/cloud-policies/combined/rules/input-schema/v1";
const EVALUATION_PATH: &str = "/cloud-policies/entities/evaluation/v1";
const RULE_QUERY_PATH: &str = "/cloud-policies/queries/rules/v1";
const RULE_ENTITY_PATH: &str = "/cloud-policies/entities/rules/v1";

/// Tokens are refreshed this long before the backend expires them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Default sort for resource queries.
const RESOURCE_SORT: &str = "resource_id|asc";

/// API client credentials (OAuth2 client-credentials grant).
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1799
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

pub struct FalconClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl FalconClient {
    pub fn new(config: &ApiConfig, credentials: Credentials) -> Result<Self> {
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(IomError::Config(
                "FALCON_CLIENT_ID and FALCON_CLIENT_SECRET must both be set".into(),
            ));
        }
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| IomError::Config(format!("invalid base URL '{}': {e}", config.base_url)))?;
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("iomctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IomError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            credentials,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| IomError::Config(format!("cannot build URL for {path}: {e}")))
    }

    /// Current bearer token, exchanging credentials when missing or stale.
    fn bearer(&self) -> Result<String> {
        let mut guard = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }
        let token = self.fetch_token()?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    fn fetch_token(&self) -> Result<AccessToken> {
        debug!("requesting access token");
        let response = self
            .http
            .post(self.url(TOKEN_PATH)?)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().unwrap_or_default();
            return Err(match IomError::from_status(status, message) {
                transient @ IomError::Transient(_) => transient,
                IomError::Api { status, message } | IomError::Auth { status, message } => {
                    IomError::Auth { status, message }
                }
                other => other,
            });
        }

        let token: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(token.expires_in);
        Ok(AccessToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .http
            .request(method, self.url(path)?)
            .bearer_auth(self.bearer()?))
    }

    fn execute(&self, builder: RequestBuilder) -> Result<ApiResponse> {
        let response = builder.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(status, "response received");
        Ok(ApiResponse::new(status, body))
    }
}

fn id_params(ids: &[String]) -> Vec<(&'static str, &str)> {
    ids.iter().map(|id| ("ids", id.as_str())).collect()
}

impl CspmApi for FalconClient {
    fn list_resources(&self, query: &ListQuery) -> Result<ApiResponse> {
        let mut params = query.params();
        if query.sort.is_none() {
            params.push(("sort", RESOURCE_SORT.into()));
        }
        self.execute(self.request(Method::GET, RESOURCE_QUERY_PATH)?.query(&params))
    }

    fn get_resource_details(&self, ids: &[String]) -> Result<ApiResponse> {
        let ids = capped_ids(ids);
        self.execute(
            self.request(Method::GET, RESOURCE_ENTITY_PATH)?
                .query(&id_params(ids)),
        )
    }

    fn get_input_schema(&self, request: &SchemaRequest) -> Result<ApiResponse> {
        // The resource type goes through unmodified; reqwest handles the encoding.
        let params = [
            ("domain", request.domain.as_str()),
            ("subdomain", request.subdomain.as_str()),
            ("cloud_provider", request.cloud_provider.as_str()),
            ("resource_type", request.resource_type.as_str()),
        ];
        self.execute(
            self.request(Method::GET, INPUT_SCHEMA_PATH)?
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .query(&params),
        )
    }

    fn evaluate_logic(&self, request: &EvaluationRequest) -> Result<ApiResponse> {
        let body = EvaluationRequest {
            ids: capped_ids(&request.ids).to_vec(),
            ..request.clone()
        };
        let params = [
            ("cloud_provider", request.cloud_provider.as_str()),
            ("resource_type", request.resource_type.as_str()),
        ];
        self.execute(
            self.request(Method::POST, EVALUATION_PATH)?
                .query(&params)
                .json(&body),
        )
    }

    fn create_rule(&self, rule: &NewRule) -> Result<ApiResponse> {
        self.execute(self.request(Method::POST, RULE_ENTITY_PATH)?.json(rule))
    }

    fn list_rules(&self, query: &ListQuery) -> Result<ApiResponse> {
        self.execute(
            self.request(Method::GET, RULE_QUERY_PATH)?
                .query(&query.params()),
        )
    }

    fn get_rule_details(&self, ids: &[String]) -> Result<ApiResponse> {
        self.execute(
            self.request(Method::GET, RULE_ENTITY_PATH)?
                .query(&id_params(ids)),
        )
    }

    fn update_rule(&self, patch: &RulePatch) -> Result<ApiResponse> {
        self.execute(self.request(Method::PATCH, RULE_ENTITY_PATH)?.json(patch))
    }

    fn delete_rules(&self, ids: &[String]) -> Result<ApiResponse> {
        self.execute(
            self.request(Method::DELETE, RULE_ENTITY_PATH)?
                .query(&id_params(ids)),
        )
    }
}
