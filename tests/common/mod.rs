#![allow(dead_code)]

//! Loopback HTTP server mimicking the screenshot server surface:
//! `POST /login`, `GET /browse/{path}`, `GET /stream/{path}`, `POST /delete`.
//! Paths arrive percent-decoded from the axum extractors, so fixtures are
//! keyed by the decoded path while the rendered listing carries the encoded
//! one - exactly the asymmetry the client has to preserve.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin123";
const SESSION_COOKIE: &str = "session=test-token";

pub struct ImageFixture {
    /// Path as it appears in the listing markup (percent-encoded).
    pub encoded_path: String,
    /// Path after one decode - the form the server is addressed by.
    pub decoded_path: String,
    pub name: String,
    pub size_label: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct ServerState {
    files: Mutex<Vec<ImageFixture>>,
    failing_streams: Mutex<HashSet<String>>,
    stream_delay: Mutex<Duration>,
    refuse_deletes: Mutex<bool>,
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_image(&self, encoded_path: &str, name: &str, size_label: &str, bytes: Vec<u8>) {
        let decoded_path = urlencoding::decode(encoded_path)
            .expect("fixture path must decode")
            .into_owned();
        self.files.lock().unwrap().push(ImageFixture {
            encoded_path: encoded_path.to_string(),
            decoded_path,
            name: name.to_string(),
            size_label: size_label.to_string(),
            bytes,
        });
    }

    /// Make the stream endpoint return 500 for this listing path.
    pub fn fail_stream(&self, encoded_path: &str) {
        let decoded = urlencoding::decode(encoded_path).unwrap().into_owned();
        self.failing_streams.lock().unwrap().insert(decoded);
    }

    pub fn clear_stream_failures(&self) {
        self.failing_streams.lock().unwrap().clear();
    }

    pub fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.lock().unwrap() = delay;
    }

    pub fn set_refuse_deletes(&self, refuse: bool) {
        *self.refuse_deletes.lock().unwrap() = refuse;
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn render_listing(&self) -> String {
        let mut body = String::from(
            "<html><body>\n<h1>Screenshots</h1>\n<div class=\"file-item\" data-type=\"dir\">\n    <a href=\"/browse/archive\">archive</a>\n</div>\n",
        );
        for file in self.files.lock().unwrap().iter() {
            body.push_str(&format!(
                "<div class=\"file-item\" data-type=\"image\">\n    <img class=\"thumb\" src=\"/stream/{path}\" alt=\"{name}\">\n    <div class=\"file-info\">\n        <a href=\"/view/{path}\">{name}</a>\n        <div class=\"file-size\">{size}</div>\n    </div>\n</div>\n",
                path = file.encoded_path,
                name = file.name,
                size = file.size_label,
            ));
        }
        body.push_str("</body></html>");
        body
    }
}

pub struct TestServer {
    pub base_url: String,
    pub state: Arc<ServerState>,
}

pub async fn spawn_server(state: Arc<ServerState>) -> TestServer {
    let app = Router::new()
        .route("/login", post(login))
        .route("/browse/", get(browse_root))
        .route("/browse/*path", get(browse_dir))
        .route("/stream/*path", get(stream))
        .route("/delete", post(delete))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// Tiny valid PNG for stream fixtures.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

//===========
// Handlers
//===========

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct DeleteForm {
    path: String,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(|cookies| cookies.contains(SESSION_COOKIE))
        .unwrap_or(false)
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.username == USERNAME && form.password == PASSWORD {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, format!("{}; Path=/", SESSION_COOKIE))],
            "ok",
        )
            .into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn browse_root(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    render_browse(&state, &headers)
}

async fn browse_dir(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(_path): Path<String>,
) -> Response {
    render_browse(&state, &headers)
}

fn render_browse(state: &ServerState, headers: &HeaderMap) -> Response {
    if !authorized(headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        state.render_listing(),
    )
        .into_response()
}

async fn stream(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let delay = *state.stream_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.failing_streams.lock().unwrap().contains(&path) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let files = state.files.lock().unwrap();
    match files.iter().find(|file| file.decoded_path == path) {
        Some(file) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png")],
            file.bytes.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if *state.refuse_deletes.lock().unwrap() {
        return Json(serde_json::json!({
            "success": false,
            "message": "file is locked"
        }))
        .into_response();
    }

    let mut files = state.files.lock().unwrap();
    let before = files.len();
    files.retain(|file| file.decoded_path != form.path);

    if files.len() < before {
        Json(serde_json::json!({ "success": true })).into_response()
    } else {
        Json(serde_json::json!({
            "success": false,
            "message": "no such file"
        }))
        .into_response()
    }
}
