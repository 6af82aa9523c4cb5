use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::api::CaseApi;
use crate::cases::record::{CaseId, CaseRecord, UpdateCasePayload};
use crate::config::{CaseApiConfig, UpdateMethod};
use crate::error::CaseApiError;

const USER_AGENT: &str = concat!("case-reconcile/", env!("CARGO_PKG_VERSION"));
/// Longest error body kept in [`CaseApiError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// `reqwest`-backed [`CaseApi`].
#[derive(Debug, Clone)]
pub struct HttpCaseApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    update_method: UpdateMethod,
}

impl HttpCaseApi {
    pub fn new(config: &CaseApiConfig) -> Result<Self, CaseApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CaseApiError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            update_method: config.update_method,
        })
    }

    fn case_url(&self, case_id: &CaseId) -> Result<Url, CaseApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CaseApiError::Connection(format!("base URL '{}' cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .push("cases")
            .push(case_id.as_str());
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(
        &self,
        case_id: &CaseId,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CaseApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CaseApiError::NotFound {
                case_id: case_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaseApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(response)
    }
}

fn map_transport_error(err: reqwest::Error) -> CaseApiError {
    if err.is_timeout() {
        CaseApiError::Timeout
    } else if err.is_decode() {
        CaseApiError::Decode(err.to_string())
    } else {
        CaseApiError::Connection(err.to_string())
    }
}

#[async_trait]
impl CaseApi for HttpCaseApi {
    async fn get_case(&self, case_id: &CaseId) -> Result<CaseRecord, CaseApiError> {
        let url = self.case_url(case_id)?;
        tracing::debug!(case_id = %case_id, %url, "Fetching case");
        let response = self.send(case_id, self.client.get(url)).await?;
        response
            .json::<CaseRecord>()
            .await
            .map_err(|e| CaseApiError::Decode(e.to_string()))
    }

    async fn update_case(
        &self,
        case_id: &CaseId,
        payload: &UpdateCasePayload,
    ) -> Result<serde_json::Value, CaseApiError> {
        let url = self.case_url(case_id)?;
        tracing::debug!(
            case_id = %case_id,
            method = self.update_method.as_str(),
            columns = payload.columns.len(),
            with_details = payload.case_details.is_some(),
            "Updating case"
        );
        let request = match self.update_method {
            UpdateMethod::Patch => self.client.patch(url),
            UpdateMethod::Put => self.client.put(url),
        };
        let response = self.send(case_id, request.json(payload)).await?;
        let body = response.text().await.map_err(map_transport_error)?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| CaseApiError::Decode(e.to_string()))
    }
}
