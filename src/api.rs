// The two backend calls this client makes, and the reqwest-backed
// implementation of both.
//
// Timeouts, auth headers and status mapping all live here. The issuer and
// the scanner only ever see Ok/Err.

use crate::config::Config;
use crate::error::ApiError;
use crate::token::{
    CheckInRequest, CheckInResponse, ClassId, ErrorBody, IssueTokenRequest, IssueTokenResponse,
    ScheduleId, ValidityMinutes,
};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Serialize};

#[async_trait(?Send)]
pub trait IssuanceApi {
    async fn issue_token(
        &self,
        class_id: &ClassId,
        schedule_id: &ScheduleId,
        validity: ValidityMinutes,
    ) -> Result<IssueTokenResponse, ApiError>;
}

#[async_trait(?Send)]
pub trait CheckInApi {
    async fn check_in(&self, payload: &str) -> Result<CheckInResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_base_url).map_err(|err| {
            ApiError::InvalidRequest(format!(
                "api_base_url {:?} is not a valid URL: {}",
                config.api_base_url, err
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "api_base_url {:?} can't have a path appended",
                config.api_base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url,
            bearer_token: config.bearer_token.clone(),
        })
    }

    // Each segment is percent-encoded on its own, so an id can never add
    // path levels, a query or a fragment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(%url, "POST");

        let mut request = self.client.post(url.clone()).json(body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            tracing::error!(%url, error = %err, "no response received");
            ApiError::from(err)
        })?;
        Self::handle_response(response).await
    }

    async fn handle_response<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
        let status = response.status();
        tracing::debug!(status = status.as_u16(), url = %response.url(), "response");

        if status.is_success() {
            return Ok(response.json::<R>().await?);
        }

        // Error bodies are { message }, but be forgiving about anything else
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|body| body.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });

        tracing::warn!(status = status.as_u16(), %message, "backend rejected request");
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait(?Send)]
impl IssuanceApi for HttpBackend {
    async fn issue_token(
        &self,
        class_id: &ClassId,
        schedule_id: &ScheduleId,
        validity: ValidityMinutes,
    ) -> Result<IssueTokenResponse, ApiError> {
        let class_id = path_segment(&class_id.0)?;
        let schedule_id = path_segment(&schedule_id.0)?;
        let url = self.endpoint(&["classes", class_id, "schedules", schedule_id, "qr"]);
        self.post_json(
            url,
            &IssueTokenRequest {
                duration_minutes: validity,
            },
        )
        .await
    }
}

#[async_trait(?Send)]
impl CheckInApi for HttpBackend {
    async fn check_in(&self, payload: &str) -> Result<CheckInResponse, ApiError> {
        let url = self.endpoint(&["attendance", "check-in"]);
        self.post_json(url, &CheckInRequest { payload }).await
    }
}

// The URL parser drops "." and ".." segments and strips tabs and newlines,
// so ids like that would silently address a different path.
fn path_segment(id: &str) -> Result<&str, ApiError> {
    let unusable = matches!(id, "" | "." | "..") || id.contains(['\t', '\n', '\r']);
    if unusable {
        return Err(ApiError::InvalidRequest(format!(
            "{:?} can't be used as an id in a request path",
            id
        )));
    }
    Ok(id)
}
