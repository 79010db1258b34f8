use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use csvdrop_core::{FileStore, StoreConfig, StoreError};

/// Application state shared across HTTP handlers
///
/// Holds the `FileStore` bound to the storage root resolved at startup.
#[derive(Clone)]
struct AppState {
    store: FileStore,
}

/// Health check response
#[derive(Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// Successful upload response: `{"data":{"message":"File saved at <path>"}}`
#[derive(Serialize, ToSchema)]
struct UploadRes {
    data: UploadData,
}

#[derive(Serialize, ToSchema)]
struct UploadData {
    message: String,
}

/// Date listing response: `{"data":{"dates":["2024-03-05", ...]}}`
#[derive(Serialize, ToSchema)]
struct DatesRes {
    data: DatesData,
}

#[derive(Serialize, ToSchema)]
struct DatesData {
    dates: Vec<String>,
}

/// File listing response: `{"data":{"files":["report.csv", ...]}}`
#[derive(Serialize, ToSchema)]
struct FilesRes {
    data: FilesData,
}

#[derive(Serialize, ToSchema)]
struct FilesData {
    files: Vec<String>,
}

/// Error response body: `{"detail":"<human-readable message>"}`
#[derive(Serialize, ToSchema)]
struct ErrorRes {
    detail: String,
}

/// Multipart form schema for `/upload` (documentation only)
#[derive(ToSchema)]
#[allow(dead_code)]
struct UploadForm {
    /// CSV file to upload
    #[schema(value_type = String, format = Binary)]
    file: String,
    /// Date the file belongs to (`YYYY-MM-DD`); defaults to today
    file_date: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, upload_file, list_dates, list_files_by_date, download_file),
    components(schemas(
        HealthRes,
        UploadRes,
        UploadData,
        DatesRes,
        DatesData,
        FilesRes,
        FilesData,
        ErrorRes,
        UploadForm
    ))
)]
struct ApiDoc;

/// Main entry point for the csvdrop service
///
/// Starts a single HTTP server exposing the upload, listing and download
/// endpoints, plus Swagger UI at `/swagger-ui`.
///
/// # Environment Variables
/// - `CSVDROP_ADDR`: HTTP server address (default: "0.0.0.0:3000")
/// - `CSVDROP_DATA_DIR`: storage root directory (default: "files")
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("csvdrop=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CSVDROP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("CSVDROP_DATA_DIR").unwrap_or_else(|_| "files".into());

    let config = StoreConfig::new(PathBuf::from(data_dir));
    let store = FileStore::new(&config)?;

    tracing::info!("++ Starting csvdrop on {}", addr);
    tracing::info!("++ Storage root: {}", store.root().display());

    let app = router(store);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the service router around a `FileStore`.
fn router(store: FileStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_file))
        .route("/files/dates", get(list_dates))
        .route("/files/:file_date", get(list_files_by_date))
        .route("/download/:file_date/:filename", get(download_file))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .with_state(AppState { store })
}

/// Maps a storage error onto the HTTP surface.
///
/// `InvalidInput` and `FileNotFound` carry messages safe to show the caller;
/// anything else is an I/O failure that is logged and hidden behind a 500.
fn error_response(err: StoreError) -> (StatusCode, Json<ErrorRes>) {
    let (status, detail) = match &err {
        StoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        StoreError::FileNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!("Storage error: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    };
    (status, Json(ErrorRes { detail }))
}

fn invalid_request(detail: impl Into<String>) -> (StatusCode, Json<ErrorRes>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorRes {
            detail: detail.into(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint
///
/// Used for monitoring and load balancer health checks.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "csvdrop is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadRes),
        (status = 400, description = "Bad extension, bad date or missing file part", body = ErrorRes)
    )
)]
/// Upload a CSV file for a given date
///
/// Accepts a multipart form with a required `file` part (must be named
/// `*.csv`) and an optional `file_date` part (`YYYY-MM-DD`, defaults to
/// today). The file is stored under `<root>/YYYY/MM/DD/`, silently
/// overwriting any previous upload of the same name for that date.
///
/// # Returns
/// * `201` with the absolute storage path on success
/// * `400` if the extension or date is invalid, or the file part is missing
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadRes>), (StatusCode, Json<ErrorRes>)> {
    let mut file: Option<(String, Bytes)> = None;
    let mut file_date: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid_request(format!("malformed multipart request: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| invalid_request(format!("failed to read file part: {e}")))?;
                file = Some((filename, bytes));
            }
            "file_date" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| invalid_request(format!("failed to read file_date part: {e}")))?;
                file_date = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| invalid_request("missing file part"))?;

    let date = match file_date {
        Some(raw) => csvdrop_core::parse_date(&raw).map_err(error_response)?,
        None => Local::now().date_naive(),
    };

    let destination = state
        .store
        .save(date, &filename, &bytes)
        .map_err(error_response)?;

    tracing::info!("Stored {} for {}", filename, date);

    Ok((
        StatusCode::CREATED,
        Json(UploadRes {
            data: UploadData {
                message: format!("File saved at {}", destination.display()),
            },
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/files/dates",
    responses(
        (status = 200, description = "Dates with at least one stored file, ascending", body = DatesRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// List all dates that have at least one stored file
///
/// Walks the storage tree on every call; there is no index to go stale.
async fn list_dates(
    State(state): State<AppState>,
) -> Result<Json<DatesRes>, (StatusCode, Json<ErrorRes>)> {
    let dates = state.store.list_dates().map_err(error_response)?;
    Ok(Json(DatesRes {
        data: DatesData { dates },
    }))
}

#[utoipa::path(
    get,
    path = "/files/{file_date}",
    params(
        ("file_date" = String, Path, description = "Date in YYYY-MM-DD format")
    ),
    responses(
        (status = 200, description = "Filenames stored for the date (empty if none)", body = FilesRes),
        (status = 400, description = "Malformed date", body = ErrorRes)
    )
)]
/// List the files stored for a given date
///
/// A date with no uploads yields an empty list, not an error.
async fn list_files_by_date(
    State(state): State<AppState>,
    Path(file_date): Path<String>,
) -> Result<Json<FilesRes>, (StatusCode, Json<ErrorRes>)> {
    let date = csvdrop_core::parse_date(&file_date).map_err(error_response)?;
    let files = state.store.list_files(date).map_err(error_response)?;
    Ok(Json(FilesRes {
        data: FilesData { files },
    }))
}

#[utoipa::path(
    get,
    path = "/download/{file_date}/{filename}",
    params(
        ("file_date" = String, Path, description = "Date in YYYY-MM-DD format"),
        ("filename" = String, Path, description = "Name of the stored file")
    ),
    responses(
        (status = 200, description = "Raw file bytes with attachment disposition"),
        (status = 400, description = "Malformed date or unsafe filename", body = ErrorRes),
        (status = 404, description = "File not found", body = ErrorRes)
    )
)]
/// Download a single stored file
///
/// The original filename is preserved as the suggested download name via the
/// `Content-Disposition` header.
async fn download_file(
    State(state): State<AppState>,
    Path((file_date, filename)): Path<(String, String)>,
) -> Result<Response, (StatusCode, Json<ErrorRes>)> {
    let date = csvdrop_core::parse_date(&file_date).map_err(error_response)?;
    let bytes = state.store.read(date, &filename).map_err(error_response)?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];

    Ok((headers, bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "csvdrop-test-boundary";

    fn test_app() -> (TempDir, Router) {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::new(temp.path().join("files"));
        let store = FileStore::new(&config).unwrap();
        (temp, router(store))
    }

    fn upload_request(filename: &str, file_date: Option<&str>, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
        if let Some(date) = file_date {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"file_date\"\r\n\r\n{date}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let (_temp, app) = test_app();

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_upload_then_list_files() {
        let (_temp, app) = test_app();

        let response = app
            .clone()
            .oneshot(upload_request("report.csv", Some("2024-03-05"), b"a,b\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        let message = json["data"]["message"].as_str().unwrap();
        assert!(message.starts_with("File saved at "));
        assert!(message.ends_with("2024/03/05/report.csv"));

        let response = app.oneshot(get_request("/files/2024-03-05")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["files"], serde_json::json!(["report.csv"]));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_csv() {
        let (temp, app) = test_app();

        let response = app
            .oneshot(upload_request("data.txt", Some("2024-03-05"), b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains(".csv"));
        // No bucket directory may exist after a rejected upload.
        assert_eq!(
            std::fs::read_dir(temp.path().join("files")).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_malformed_date() {
        let (_temp, app) = test_app();

        let response = app
            .oneshot(upload_request("report.csv", Some("2024-13-40"), b"a,b\n"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let (_temp, app) = test_app();

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; \
             name=\"file_date\"\r\n\r\n2024-03-05\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["detail"], "missing file part");
    }

    #[tokio::test]
    async fn test_upload_defaults_to_today() {
        let (_temp, app) = test_app();

        let response = app
            .clone()
            .oneshot(upload_request("report.csv", None, b"a,b\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let response = app.oneshot(get_request("/files/dates")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["data"]["dates"], serde_json::json!([today]));
    }

    #[tokio::test]
    async fn test_list_dates_sorted_ascending() {
        let (_temp, app) = test_app();

        for date in ["2024-06-15", "2024-01-01"] {
            let response = app
                .clone()
                .oneshot(upload_request("report.csv", Some(date), b"x"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app.oneshot(get_request("/files/dates")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json["data"]["dates"],
            serde_json::json!(["2024-01-01", "2024-06-15"])
        );
    }

    #[tokio::test]
    async fn test_list_files_empty_for_unknown_date() {
        let (_temp, app) = test_app();

        let response = app.oneshot(get_request("/files/2024-03-05")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["files"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_files_malformed_date() {
        let (_temp, app) = test_app();

        let response = app.oneshot(get_request("/files/2024-13-40")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn test_download_roundtrip() {
        let (_temp, app) = test_app();

        app.clone()
            .oneshot(upload_request(
                "report.csv",
                Some("2024-03-05"),
                b"a,b\n1,2\n",
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(get_request("/download/2024-03-05/report.csv"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.csv\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let (_temp, app) = test_app();

        let response = app
            .oneshot(get_request("/download/2024-03-05/missing.csv"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("missing.csv"));
    }

    #[tokio::test]
    async fn test_download_malformed_date() {
        let (_temp, app) = test_app();

        let response = app
            .oneshot(get_request("/download/2024-13-40/report.csv"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let (_temp, app) = test_app();

        for content in [b"old".as_slice(), b"new".as_slice()] {
            let response = app
                .clone()
                .oneshot(upload_request("report.csv", Some("2024-03-05"), content))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(get_request("/download/2024-03-05/report.csv"))
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"new");
    }
}
