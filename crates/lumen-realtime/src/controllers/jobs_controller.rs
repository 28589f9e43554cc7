//! Job submission and listing for the authenticated owner.

use crate::extractors::AuthenticatedOwner;
use crate::responses::{created, ok, ApiResponse, ApiResult, AppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use lumen_core::{JobId, JobSummary};
use lumen_jobs::EnqueueRequest;
use serde::Deserialize;
use uuid::Uuid;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:job_id", get(get_job))
}

/// Body of `POST /jobs`. The owner always comes from the session token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// Caller-assigned id; generated when absent.
    pub job_id: Option<JobId>,
    /// Location of the uploaded file.
    pub input_ref: String,
    /// MIME type or bare `image` / `video`.
    pub media_kind: String,
    /// Display name; defaults to the last segment of `input_ref`.
    pub filename: Option<String>,
}

impl SubmitJobRequest {
    fn into_enqueue(self, owner: AuthenticatedOwner) -> EnqueueRequest {
        let filename = self.filename.unwrap_or_else(|| {
            self.input_ref
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .to_string()
        });
        EnqueueRequest {
            job_id: self
                .job_id
                .unwrap_or_else(|| JobId::from(Uuid::now_v7().to_string())),
            owner_id: owner.0,
            input_ref: self.input_ref,
            media_kind: self.media_kind,
            filename,
        }
    }
}

/// Submits a job. `201` when created, `200` when the id was already known.
pub async fn submit_job(
    State(state): State<AppState>,
    owner: AuthenticatedOwner,
    Json(body): Json<SubmitJobRequest>,
) -> Result<Response, AppError> {
    let outcome = state.jobs.enqueue(body.into_enqueue(owner)).await?;
    if outcome.created {
        Ok(created(outcome.job).into_response())
    } else {
        Ok((StatusCode::OK, Json(ApiResponse::success(outcome.job))).into_response())
    }
}

/// The caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    owner: AuthenticatedOwner,
) -> ApiResult<Vec<JobSummary>> {
    ok(state.jobs.list_jobs(&owner).await?)
}

/// One of the caller's jobs. Other owners' jobs read as not found.
pub async fn get_job(
    State(state): State<AppState>,
    owner: AuthenticatedOwner,
    Path(job_id): Path<String>,
) -> ApiResult<JobSummary> {
    ok(state.jobs.get_job(&owner, &JobId::from(job_id)).await?)
}
