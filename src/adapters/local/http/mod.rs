//! HTTP inbound adapter.
//!
//! A thin axum surface over the scheduler: upload a video with its encoding
//! form, poll the job, download the result. The requester is identified by
//! the peer address of the connection.

mod upload;

use crate::adapters::local::fs::remove_quietly;
use crate::application::scheduler::Scheduler;
use crate::domain::dpg::settings::RawEncodeConfig;
use crate::domain::jobs::{JobId, JobStatus, Requester};
use crate::ports::encoder::Encoder;
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

pub use upload::{sanitized_extension, stream_to_file};

pub struct AppState<E> {
    scheduler: Scheduler<E>,
    upload_dir: PathBuf,
    next_upload: AtomicU64,
}

impl<E> AppState<E> {
    pub fn new(scheduler: Scheduler<E>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            upload_dir: upload_dir.into(),
            next_upload: AtomicU64::new(0),
        }
    }
}

pub fn router<E: Encoder + 'static>(state: AppState<E>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(landing::<E>))
        .route("/upload", post(upload_video::<E>))
        .route("/jobs/:id", get(job_status::<E>))
        .route("/jobs/:id/download", get(download::<E>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(Arc::new(state))
}

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            HttpError::NotFound => (StatusCode::NOT_FOUND, "Job not found.").into_response(),
            HttpError::Internal(detail) => {
                error!(%detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.").into_response()
            }
        }
    }
}

/// Job status as clients see it. Server paths never leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusView {
    Queued { position: usize },
    Converting,
    Downloadable { download: String },
    Failed { detail: String },
    NotFound,
}

impl StatusView {
    fn new(id: JobId, status: JobStatus) -> Self {
        match status {
            JobStatus::Queued { position } => StatusView::Queued { position },
            JobStatus::Converting => StatusView::Converting,
            JobStatus::Downloadable { .. } => StatusView::Downloadable {
                download: format!("/jobs/{}/download", id),
            },
            JobStatus::Failed { detail } => StatusView::Failed { detail },
            JobStatus::NotFound => StatusView::NotFound,
        }
    }
}

fn requester_of(peer: SocketAddr) -> Requester {
    Requester::new(peer.ip().to_string())
}

#[derive(Default)]
struct UploadForm {
    raw: RawEncodeConfig,
    source: Option<PathBuf>,
}

async fn read_form<E>(
    app: &AppState<E>,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), HttpError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            if form.source.is_some() {
                return Err(HttpError::BadRequest("Only one file per upload.".to_string()));
            }
            let n = app.next_upload.fetch_add(1, Ordering::Relaxed);
            let file_name = match field.file_name().and_then(sanitized_extension) {
                Some(extension) => format!("{}.{}", n, extension),
                None => n.to_string(),
            };
            let path = app.upload_dir.join(file_name);
            form.source = Some(path.clone());
            stream_to_file(&path, field)
                .await
                .map_err(|e| HttpError::Internal(e.to_string()))?;
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| HttpError::BadRequest(e.body_text()))?;
        let slot = match name.as_str() {
            "fps" => &mut form.raw.fps,
            "dpg" => &mut form.raw.dpg,
            "width" => &mut form.raw.width,
            "height" => &mut form.raw.height,
            "aspect" => &mut form.raw.aspect,
            "quality" => &mut form.raw.quality,
            _ => continue,
        };
        *slot = Some(value);
    }
    Ok(())
}

async fn upload_video<E: Encoder + 'static>(
    State(app): State<Arc<AppState<E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<Redirect, HttpError> {
    let mut form = UploadForm::default();
    if let Err(e) = read_form(&app, &mut multipart, &mut form).await {
        if let Some(source) = &form.source {
            remove_quietly(source).await;
        }
        return Err(e);
    }

    let Some(source) = form.source else {
        return Err(HttpError::BadRequest("No video was uploaded.".to_string()));
    };

    match app
        .scheduler
        .submit(source.clone(), &form.raw, requester_of(peer))
        .await
    {
        Ok(id) => {
            info!(job = %id, %peer, "upload accepted");
            Ok(Redirect::to(&format!("/jobs/{}", id)))
        }
        Err(e) => {
            remove_quietly(&source).await;
            Err(HttpError::BadRequest(e.to_string()))
        }
    }
}

/// Polling a job is what keeps it alive.
async fn job_status<E: Encoder + 'static>(
    State(app): State<Arc<AppState<E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<u64>,
) -> (StatusCode, Json<StatusView>) {
    let id = JobId(id);
    let requester = requester_of(peer);
    let _ = app.scheduler.touch(id, &requester).await;

    let status = StatusView::new(id, app.scheduler.status(id, &requester).await);
    let code = match status {
        StatusView::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    (code, Json(status))
}

async fn download<E: Encoder + 'static>(
    State(app): State<Arc<AppState<E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<u64>,
) -> Result<Response, HttpError> {
    let file = app
        .scheduler
        .fetch_artifact(JobId(id), &requester_of(peer))
        .await
        .map_err(|_| HttpError::NotFound)?;

    let disposition = format!("attachment; filename=\"download{}.dpg\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn landing<E: Encoder + 'static>(State(app): State<Arc<AppState<E>>>) -> Html<String> {
    let waiting = app.scheduler.queue_len().await;

    Html(format!(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>DPG converter</title>
            </head>
            <body>
                <h1>Videos waiting: {}</h1>
                <form action="/upload" method="post" enctype="multipart/form-data">
                    <div><label>Video: <input type="file" name="file"></label></div>
                    <div><label>Frame rate: <input type="number" name="fps" value="15" min="1" max="60"></label></div>
                    <div><label>DPG version: <input type="number" name="dpg" value="4" min="0" max="4"></label></div>
                    <div><label>Width: <input type="number" name="width" value="256" min="1" max="256"></label></div>
                    <div><label>Height: <input type="number" name="height" value="192" min="1" max="192"></label></div>
                    <div><label>Keep aspect ratio: <input type="checkbox" name="aspect" value="on" checked></label></div>
                    <div>
                        <label>Quality:
                            <select name="quality">
                                <option value="low">low</option>
                                <option value="normal" selected>normal</option>
                                <option value="high">high</option>
                            </select>
                        </label>
                    </div>
                    <div><input type="submit" value="Convert"></div>
                </form>
            </body>
        </html>
        "#,
        waiting
    ))
}
