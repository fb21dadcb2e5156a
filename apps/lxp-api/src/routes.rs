use std::convert::Infallible;

use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use time::OffsetDateTime;
use uuid::Uuid;

use lxp_domain::{JobId, JobRequest, SubFunction};
use lxp_retrieval::Evidence;
use lxp_service::{
	Error as ServiceError, FileView, JobReceipt, JobView, VectorstoreDetail, VectorstoreView,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/healthz", get(health))
		.route("/v1/jobs/{id}", get(get_job).post(submit_job))
		.route("/v1/events/jobs/{job_id}", get(job_events))
		.route("/v1/vectorstores", post(create_vectorstore))
		.route("/v1/vectorstores/{id}", get(get_vectorstore))
		.route("/v1/vectorstores/{id}/files", post(upload_file))
		.route("/v1/vectorstores/{id}/index", post(index_vectorstore))
		.route("/v1/vectorstores/{id}/query", post(query_vectorstore))
		.with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
	ok: bool,
	ts: i64,
}

#[derive(Debug, Deserialize)]
pub struct OwnerParams {
	pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
	pub filename: String,
	pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
	pub user_id: String,
	#[serde(default)]
	pub thread_id: Option<Uuid>,
	/// Filenames or file ids to index. Every file when empty.
	#[serde(default)]
	pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
	pub query: String,
	pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
	pub results: Vec<Evidence>,
}

async fn health() -> Json<HealthResponse> {
	Json(HealthResponse { ok: true, ts: OffsetDateTime::now_utc().unix_timestamp() })
}

async fn submit_job(
	State(state): State<AppState>,
	Path(sub_function): Path<String>,
	Json(payload): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobReceipt>), ApiError> {
	let sub_function = sub_function.parse::<SubFunction>().map_err(ServiceError::from)?;
	let receipt = lxp_service::submit_job(
		state.jobs.as_ref(),
		state.tasks.as_ref(),
		sub_function,
		&payload,
	)
	.await?;

	Ok((StatusCode::ACCEPTED, Json(receipt)))
}

async fn get_job(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
	let job_id = parse_job_id(&job_id)?;
	let job = lxp_service::get_job(state.jobs.as_ref(), &job_id).await?;

	Ok(Json(job))
}

async fn job_events(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
	let job_id = parse_job_id(&job_id)?;
	let events = lxp_service::relay(state.results.as_ref(), &job_id, state.bridge).await?;
	let stream = events.map(|event| {
		Ok::<_, Infallible>(Event::default().event(event.name).data(event.body.to_string()))
	});

	Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive).text("keepalive")))
}

async fn create_vectorstore(
	State(state): State<AppState>,
	Query(params): Query<OwnerParams>,
) -> Result<(StatusCode, Json<VectorstoreView>), ApiError> {
	let store =
		lxp_service::create_vectorstore(state.catalog.as_ref(), params.user_id.as_deref()).await?;

	Ok((StatusCode::CREATED, Json(store)))
}

async fn get_vectorstore(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<VectorstoreDetail>, ApiError> {
	let vectorstore_id = parse_vectorstore_id(&id)?;
	let detail = lxp_service::get_vectorstore(state.catalog.as_ref(), vectorstore_id).await?;

	Ok(Json(detail))
}

async fn upload_file(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(params): Query<UploadParams>,
	body: String,
) -> Result<(StatusCode, Json<FileView>), ApiError> {
	let vectorstore_id = parse_vectorstore_id(&id)?;
	let file = lxp_service::upload_file(
		state.catalog.as_ref(),
		vectorstore_id,
		&params.filename,
		params.user_id.as_deref(),
		&body,
	)
	.await?;

	Ok((StatusCode::CREATED, Json(file)))
}

async fn index_vectorstore(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(payload): Json<IndexRequest>,
) -> Result<(StatusCode, Json<JobReceipt>), ApiError> {
	let vectorstore_id = parse_vectorstore_id(&id)?;

	// Missing stores are reported here instead of as a failed job.
	lxp_service::get_vectorstore(state.catalog.as_ref(), vectorstore_id).await?;

	let request = JobRequest {
		user_id: payload.user_id,
		prompt: None,
		vectorstore_id: Some(vectorstore_id.to_string()),
		thread_id: payload.thread_id,
		params: Map::new(),
		files: payload.files,
	};
	let receipt = lxp_service::submit_job(
		state.jobs.as_ref(),
		state.tasks.as_ref(),
		SubFunction::Index,
		&request,
	)
	.await?;

	Ok((StatusCode::ACCEPTED, Json(receipt)))
}

async fn query_vectorstore(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
	let vectorstore_id = parse_vectorstore_id(&id)?;
	let results = lxp_service::query_vectorstore(
		state.catalog.as_ref(),
		state.index.as_ref(),
		vectorstore_id,
		&payload.query,
		payload.top_k.unwrap_or(state.top_k),
	)
	.await?;

	Ok(Json(QueryResponse { results }))
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
	JobId::parse(raw).map_err(|err| ApiError::from(ServiceError::from(err)))
}

fn parse_vectorstore_id(raw: &str) -> Result<Uuid, ApiError> {
	Uuid::parse_str(raw).map_err(|_| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_vectorstore_id",
			format!("{raw:?} is not a valid vectorstore id."),
			None,
		)
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { field, message } => json_error(
				StatusCode::UNPROCESSABLE_ENTITY,
				"invalid_request",
				format!("{field} {message}"),
				Some(vec![field]),
			),
			ServiceError::InvalidJobId { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_job_id", message, None),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message, None),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "conflict", message, None),
			ServiceError::Broker { message } => {
				tracing::error!(error = %message, "Broker request failed.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "broker_unavailable", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage request failed.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", message, None)
			},
			ServiceError::Index { message } => {
				tracing::error!(error = %message, "Vector index request failed.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "index_unavailable", message, None)
			},
			ServiceError::Provider { message } =>
				json_error(StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", message, None),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
