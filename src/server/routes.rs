use std::io::{Cursor, Read};
use std::sync::Arc;

use log::{debug, error};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::server::multipart::{extract_boundary, extract_file};
use crate::service::classifier::DigitService;
use crate::service::responses::{DrawingRequest, ErrorResponse, Reply};

const INDEX_HTML: &str = include_str!("assets/index.html");

type HttpResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Builds headers from static pairs; every response allows any origin.
fn headers(pairs: &[(&str, &str)]) -> Vec<Header> {
    std::iter::once(("Access-Control-Allow-Origin", "*"))
        .chain(pairs.iter().copied())
        .filter_map(|(k, v)| Header::from_bytes(k.as_bytes(), v.as_bytes()).ok())
        .collect()
}

fn respond_bytes(status: u16, content_type: &str, bytes: Vec<u8>) -> HttpResponse {
    let len = bytes.len();
    Response::new(
        StatusCode(status),
        headers(&[("Content-Type", content_type)]),
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn html_response(body: &str) -> HttpResponse {
    respond_bytes(200, "text/html; charset=utf-8", body.as_bytes().to_vec())
}

pub fn json_response<T: Serialize>(body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => respond_bytes(200, "application/json", bytes),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            respond_bytes(500, "text/plain", b"500 Internal Server Error".to_vec())
        }
    }
}

pub fn not_found() -> HttpResponse {
    respond_bytes(404, "text/plain", b"404 Not Found".to_vec())
}

/// CORS preflight answer.
pub fn no_content() -> HttpResponse {
    Response::new(
        StatusCode(204),
        headers(&[
            ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
            ("Access-Control-Allow-Headers", "*"),
            ("Access-Control-Max-Age", "86400"),
        ]),
        Cursor::new(Vec::new()),
        Some(0),
        None,
    )
}

fn failure(message: impl Into<String>) -> HttpResponse {
    json_response(&ErrorResponse::new(message))
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Routes one request and sends the response.
pub fn dispatch(mut request: Request, service: Arc<DigitService>) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();
    debug!("{} {}", method, path);

    let response = match (&method, path.as_str()) {
        (Method::Options, _) => no_content(),
        (Method::Get, "/") => html_response(INDEX_HTML),
        (Method::Get, "/health") => json_response(&service.health()),
        (Method::Get, "/model-info") => json_response(&service.model_info()),
        (Method::Post, "/predict") => handle_predict(&mut request, &service),
        (Method::Post, "/predict-drawing") => handle_predict_drawing(&mut request, &service),
        _ => not_found(),
    };

    if let Err(e) = request.respond(response) {
        debug!("Client went away before the response to {} {}: {}", method, path, e);
    }
}

fn content_type(request: &Request) -> String {
    request.headers().iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default()
}

/// Reads the body, refusing anything over `limit` bytes.
fn read_body(request: &mut Request, limit: usize) -> Result<Vec<u8>, String> {
    let too_large = || format!("Request body exceeds the {} byte limit", limit);
    if request.body_length().map_or(false, |len| len > limit) {
        return Err(too_large());
    }
    let mut body = Vec::new();
    request.as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| format!("Failed to read request body: {}", e))?;
    if body.len() > limit {
        return Err(too_large());
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

fn handle_predict(request: &mut Request, service: &DigitService) -> HttpResponse {
    let content_type = content_type(request);
    let body = match read_body(request, service.config().max_body_bytes) {
        Ok(body) => body,
        Err(msg) => return failure(msg),
    };

    let Some(boundary) = extract_boundary(&content_type) else {
        return failure("Expected a multipart/form-data upload with a 'file' field");
    };
    let Some(part) = extract_file(&body, &boundary, "file") else {
        return failure("No image file was uploaded");
    };

    let reply = service.classify_upload(part.filename, &part.data);
    log_failure(&reply);
    json_response(&reply)
}

// ---------------------------------------------------------------------------
// POST /predict-drawing
// ---------------------------------------------------------------------------

fn handle_predict_drawing(request: &mut Request, service: &DigitService) -> HttpResponse {
    let body = match read_body(request, service.config().max_body_bytes) {
        Ok(body) => body,
        Err(msg) => return failure(msg),
    };
    let drawing: DrawingRequest = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => return failure(format!("Invalid request body: {}", e)),
    };

    let reply = service.classify_drawing(&drawing.image);
    log_failure(&reply);
    json_response(&reply)
}

fn log_failure<T>(reply: &Reply<T>) {
    if let Reply::Failure(e) = reply {
        debug!("Answering with in-band error: {}", e.error);
    }
}
