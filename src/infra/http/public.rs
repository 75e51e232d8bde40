use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, PRAGMA},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    application::{dispatch::DispatchRouter, error::HttpError},
    domain::{
        error::DomainError,
        job::{JobEnvelope, JobSubmission, RenderJob},
    },
};

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub router: Arc<DispatchRouter>,
}

pub fn build_router(state: HttpState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/generate-pdf", post(generate_pdf))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateQuery {
    filename: Option<String>,
}

async fn generate_pdf(
    State(state): State<HttpState>,
    Query(query): Query<GenerateQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let submission = match parse_submission(&headers, body, query.filename) {
        Ok(submission) => submission,
        Err(err) => return err.into_response(),
    };

    let job = match RenderJob::try_from(submission) {
        Ok(job) => job,
        Err(err) => return missing_document(err).into_response(),
    };

    match state.router.dispatch(&job).await {
        Ok(pdf) => pdf_response(job.filename(), pdf),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn parse_submission(
    headers: &HeaderMap,
    body: Bytes,
    filename: Option<String>,
) -> Result<JobSubmission, HttpError> {
    if is_json(headers) {
        let envelope: JobEnvelope = serde_json::from_slice(&body).map_err(|err| {
            HttpError::from_error(
                "infra::http::generate_pdf",
                StatusCode::BAD_REQUEST,
                "Invalid JSON body",
                &err,
            )
        })?;
        return Ok(JobSubmission::Envelope(envelope));
    }

    let document = String::from_utf8(body.to_vec()).map_err(|err| {
        HttpError::from_error(
            "infra::http::generate_pdf",
            StatusCode::BAD_REQUEST,
            "Request body must be UTF-8 text",
            &err,
        )
    })?;
    Ok(JobSubmission::Text { document, filename })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn missing_document(err: DomainError) -> HttpError {
    HttpError::from_error(
        "infra::http::generate_pdf",
        StatusCode::BAD_REQUEST,
        "HTML content is required",
        &err,
    )
}

fn pdf_response(filename: &str, pdf: Vec<u8>) -> Response {
    let disposition = format!("inline; filename=\"{}\"", urlencoding::encode(filename));
    let length = pdf.len();

    let mut response = (StatusCode::OK, pdf).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    response
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthBody> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(HealthBody {
        status: "ok",
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_detection_ignores_parameters_and_case() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_json(&headers));

        assert!(!is_json(&HeaderMap::new()));
    }

    #[test]
    fn pdf_response_percent_encodes_filename() {
        let response = pdf_response("rapport final é.pdf", b"%PDF-1.7".to_vec());
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .expect("disposition");
        assert_eq!(
            disposition,
            "inline; filename=\"rapport%20final%20%C3%A9.pdf\""
        );
        assert_eq!(
            response.headers().get(CONTENT_LENGTH),
            Some(&HeaderValue::from(8usize))
        );
    }
}
