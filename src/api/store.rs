//! Backend seams as async traits
//!
//! The editor and the ROI orchestrator only see these traits, so tests can
//! swap the HTTP client for in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use super::client::{ApiClient, ApiError};
use super::types::{
    AnalysisSummary, AnnotationRecord, CreateAnnotation, DispatchResponse, ExportScope,
    GsdResponse, RoiAnalysisRequest, RoiAnalysisResult,
};
use crate::domain::UtmInfo;

/// Annotation CRUD and export
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    async fn list(&self, image_id: i64) -> Result<Vec<AnnotationRecord>, ApiError>;
    async fn create(&self, body: &CreateAnnotation) -> Result<AnnotationRecord, ApiError>;
    async fn delete(&self, id: i64) -> Result<(), ApiError>;
    async fn export_geojson(&self, scope: ExportScope) -> Result<Value, ApiError>;
}

/// ROI analysis, project dispatch and completion summary
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze_roi(
        &self,
        image_id: i64,
        request: &RoiAnalysisRequest,
    ) -> Result<RoiAnalysisResult, ApiError>;
    async fn dispatch_project_analysis(&self, project_id: i64)
    -> Result<DispatchResponse, ApiError>;
    async fn analysis_summary(&self, project_id: i64) -> Result<AnalysisSummary, ApiError>;
}

/// Per-image binary data and metadata
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn image_bytes(&self, image_id: i64) -> Result<Vec<u8>, ApiError>;
    async fn gsd(&self, image_id: i64) -> Result<GsdResponse, ApiError>;
    async fn utm_info(&self, image_id: i64) -> Result<UtmInfo, ApiError>;
}

#[async_trait]
impl AnnotationStore for ApiClient {
    async fn list(&self, image_id: i64) -> Result<Vec<AnnotationRecord>, ApiError> {
        self.list_annotations(image_id).await
    }

    async fn create(&self, body: &CreateAnnotation) -> Result<AnnotationRecord, ApiError> {
        self.create_annotation(body).await
    }

    async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.delete_annotation(id).await
    }

    async fn export_geojson(&self, scope: ExportScope) -> Result<Value, ApiError> {
        ApiClient::export_geojson(self, scope).await
    }
}

#[async_trait]
impl AnalysisBackend for ApiClient {
    async fn analyze_roi(
        &self,
        image_id: i64,
        request: &RoiAnalysisRequest,
    ) -> Result<RoiAnalysisResult, ApiError> {
        ApiClient::analyze_roi(self, image_id, request).await
    }

    async fn dispatch_project_analysis(
        &self,
        project_id: i64,
    ) -> Result<DispatchResponse, ApiError> {
        ApiClient::dispatch_project_analysis(self, project_id).await
    }

    async fn analysis_summary(&self, project_id: i64) -> Result<AnalysisSummary, ApiError> {
        ApiClient::analysis_summary(self, project_id).await
    }
}

#[async_trait]
impl ImageSource for ApiClient {
    async fn image_bytes(&self, image_id: i64) -> Result<Vec<u8>, ApiError> {
        ApiClient::image_bytes(self, image_id).await
    }

    async fn gsd(&self, image_id: i64) -> Result<GsdResponse, ApiError> {
        ApiClient::gsd(self, image_id).await
    }

    async fn utm_info(&self, image_id: i64) -> Result<UtmInfo, ApiError> {
        ApiClient::utm_info(self, image_id).await
    }
}
