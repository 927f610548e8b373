//! HTTP client for the dashboard backend
//!
//! Every request carries the session's bearer token. Without a token the
//! request is never issued and [`ApiError::Unauthenticated`] is returned.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};

use super::session::AuthSession;
use super::types::{
    AnalysisSummary, AnnotationListResponse, AnnotationRecord, CreateAnnotation,
    DispatchResponse, ExportScope, GsdResponse, ImageListResponse, RoiAnalysisRequest,
    RoiAnalysisResult, UtmInfoResponse,
};
use crate::config::CropLensConfig;
use crate::domain::UtmInfo;

/// Error type for backend operations
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No bearer token in the session; nothing was sent
    #[error("Not authenticated")]
    Unauthenticated,
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),
    /// Connection failed
    #[error("Connection error: {0}")]
    Connection(String),
    /// Request timed out
    #[error("Timeout")]
    Timeout,
    /// Server returned an error status
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },
    /// Failed to parse a JSON response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Failed to decode image bytes
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether a later retry of the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Connection(_) | ApiError::Timeout | ApiError::Http(_) => true,
            ApiError::Server { status, .. } => *status >= 500,
            ApiError::Unauthenticated | ApiError::Parse(_) | ApiError::Decode(_) => false,
        }
    }

    /// Whether the server rejected the token
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::Unauthenticated => true,
            ApiError::Server { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Connection(err.to_string())
        } else if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    session: AuthSession,
}

impl ApiClient {
    pub fn new(config: &CropLensConfig, session: AuthSession) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.session.token().ok_or(ApiError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(request)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self.send(self.client.get(self.url(path)).query(query)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let response = self.send(self.client.post(self.url(path)).json(body)).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ========================================================================
    // Images
    // ========================================================================

    pub async fn list_images(
        &self,
        project_id: Option<i64>,
        skip: u32,
        limit: u32,
    ) -> Result<ImageListResponse, ApiError> {
        let mut query = vec![("skip", skip.to_string()), ("limit", limit.to_string())];
        if let Some(id) = project_id {
            query.push(("project_id", id.to_string()));
        }
        self.get("images/", &query).await
    }

    /// Image bytes, preferring the thumbnail and falling back to the full file
    pub async fn image_bytes(&self, image_id: i64) -> Result<Vec<u8>, ApiError> {
        match self.get_bytes(&format!("images/{image_id}/thumbnail")).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_auth_failure() => Err(e),
            Err(e) => {
                log::debug!("Thumbnail for image {} unavailable ({}), fetching file", image_id, e);
                self.get_bytes(&format!("images/{image_id}/file")).await
            }
        }
    }

    pub async fn gsd(&self, image_id: i64) -> Result<GsdResponse, ApiError> {
        self.get(&format!("images/{image_id}/gsd"), &[]).await
    }

    pub async fn utm_info(&self, image_id: i64) -> Result<UtmInfo, ApiError> {
        let response: UtmInfoResponse = self.get(&format!("images/{image_id}/utm-info"), &[]).await?;
        Ok(response.into())
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    pub async fn list_annotations(&self, image_id: i64) -> Result<Vec<AnnotationRecord>, ApiError> {
        let response: AnnotationListResponse = self
            .get("annotations/", &[("image_id", image_id.to_string())])
            .await?;
        Ok(response.annotations)
    }

    pub async fn create_annotation(
        &self,
        body: &CreateAnnotation,
    ) -> Result<AnnotationRecord, ApiError> {
        self.post("annotations/", body).await
    }

    pub async fn delete_annotation(&self, id: i64) -> Result<(), ApiError> {
        self.send(self.client.delete(self.url(&format!("annotations/{id}"))))
            .await?;
        Ok(())
    }

    pub async fn export_geojson(&self, scope: ExportScope) -> Result<serde_json::Value, ApiError> {
        self.get("annotations/export/geojson", &[scope.query()]).await
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    pub async fn analyze_roi(
        &self,
        image_id: i64,
        request: &RoiAnalysisRequest,
    ) -> Result<RoiAnalysisResult, ApiError> {
        self.post(&format!("images/{image_id}/analyze-roi"), request)
            .await
    }

    pub async fn dispatch_project_analysis(
        &self,
        project_id: i64,
    ) -> Result<DispatchResponse, ApiError> {
        self.post(&format!("projects/{project_id}/analyze"), &serde_json::json!({}))
            .await
    }

    pub async fn analysis_summary(&self, project_id: i64) -> Result<AnalysisSummary, ApiError> {
        self.get(&format!("projects/{project_id}/analysis-summary"), &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token: Option<&str>) -> ApiClient {
        let config = CropLensConfig {
            api_base_url: "http://127.0.0.1:9/api/v1/".into(),
            ..Default::default()
        };
        let mut session = AuthSession::in_memory();
        if let Some(token) = token {
            session.set_token(token).unwrap();
        }
        ApiClient::new(&config, session).unwrap()
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let client = client(None);
        assert_eq!(client.base_url(), "http://127.0.0.1:9/api/v1");
        assert_eq!(client.url("/images/3/gsd"), "http://127.0.0.1:9/api/v1/images/3/gsd");
        assert_eq!(client.url("annotations/"), "http://127.0.0.1:9/api/v1/annotations/");
    }

    #[tokio::test]
    async fn missing_token_short_circuits() {
        let client = client(None);
        let err = client.gsd(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
        let err = client.image_bytes(1).await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn transient_classification() {
        assert!(ApiError::Timeout.is_transient());
        assert!(
            ApiError::Server {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !ApiError::Server {
                status: 404,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            ApiError::Server {
                status: 401,
                message: String::new()
            }
            .is_auth_failure()
        );
        assert!(!ApiError::Decode("bad".into()).is_transient());
    }
}
