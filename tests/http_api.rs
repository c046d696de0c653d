mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tempfile::TempDir;

use digit_mlops::service::{DigitService, ServiceConfig};
use digit_mlops::Network;

/// An untrained but well-formed model on disk.
fn saved_model() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    Network::digit_classifier(&mut StdRng::seed_from_u64(42)).save_json(&path).unwrap();
    (dir, path)
}

fn service_for(model_path: PathBuf) -> Arc<DigitService> {
    Arc::new(DigitService::new(ServiceConfig { model_path, ..Default::default() }))
}

#[test]
fn static_endpoints() {
    let (_dir, path) = saved_model();
    let addr = common::spawn_server(service_for(path));

    let health = common::get(addr, "/health");
    assert_eq!(health.status, 200);
    assert_eq!(health.header("Access-Control-Allow-Origin").as_deref(), Some("*"));
    assert_eq!(
        health.json(),
        json!({ "status": "healthy", "model_loaded": false, "classes": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] })
    );

    let info = common::get(addr, "/model-info").json();
    assert_eq!(info["model_name"], "mnist-digit-classifier");
    assert_eq!(info["input_size"], "28x28 grayscale images");

    let page = common::get(addr, "/");
    assert_eq!(page.status, 200);
    assert!(String::from_utf8_lossy(&page.body).contains("<canvas"));

    assert_eq!(common::get(addr, "/nope").status, 404);

    let preflight = common::request(addr, "OPTIONS", "/predict-drawing", None, &[]);
    assert_eq!(preflight.status, 204);
    assert_eq!(preflight.header("Access-Control-Allow-Origin").as_deref(), Some("*"));
}

#[test]
fn drawing_triggers_lazy_load() {
    let (_dir, path) = saved_model();
    let addr = common::spawn_server(service_for(path));
    assert_eq!(common::get(addr, "/health").json()["model_loaded"], false);

    let body = json!({ "image": common::data_url(&common::drawn_three_png()) });
    let reply = common::post_json(addr, "/predict-drawing", &body);
    assert_eq!(reply.status, 200);
    let value = reply.json();
    assert_eq!(value["success"], true);

    let predicted = value["predicted_digit"].as_u64().unwrap() as usize;
    assert!(predicted < 10);
    let probs: Vec<f64> = value["all_probabilities"].as_array().unwrap()
        .iter().map(|p| p.as_f64().unwrap()).collect();
    common::assert_probability_vector(&probs, predicted);
    assert_eq!(value["confidence"].as_f64().unwrap(), probs[predicted]);

    assert_eq!(common::get(addr, "/health").json()["model_loaded"], true);
}

#[test]
fn upload_returns_keyed_probabilities() {
    let (_dir, path) = saved_model();
    let addr = common::spawn_server(service_for(path));

    let value = common::post_file(addr, "three.png", "image/png", &common::drawn_three_png()).json();
    assert_eq!(value["success"], true);
    assert_eq!(value["filename"], "three.png");
    let map = value["all_probabilities"].as_object().unwrap();
    assert_eq!(map.len(), 10);
    let probs: Vec<f64> = (0..10).map(|d| map[&d.to_string()].as_f64().unwrap()).collect();
    common::assert_probability_vector(&probs, value["predicted_digit"].as_u64().unwrap() as usize);
}

#[test]
fn bad_payloads_are_reported_in_band() {
    let (_dir, path) = saved_model();
    let addr = common::spawn_server(service_for(path));

    let not_image = common::post_file(addr, "notes.txt", "text/plain", b"this is not an image");
    assert_eq!(not_image.status, 200);
    let value = not_image.json();
    assert_eq!(value["success"], false);
    assert!(!value["error"].as_str().unwrap().is_empty());

    let bad_json = common::request(addr, "POST", "/predict-drawing", Some("application/json"), b"{not json");
    assert_eq!(bad_json.status, 200);
    assert_eq!(bad_json.json()["success"], false);

    let bad_base64 = common::post_json(addr, "/predict-drawing", &json!({ "image": "data:image/png;base64,%%%" }));
    assert_eq!(bad_base64.json()["success"], false);

    let no_file = common::request(addr, "POST", "/predict", Some("text/plain"), b"hello");
    assert_eq!(no_file.json()["success"], false);

    // The server is still healthy afterwards.
    assert_eq!(common::get(addr, "/health").status, 200);
}

#[test]
fn missing_model_degrades_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(dir.path().join("absent.json"));
    service.warm_up();
    let addr = common::spawn_server(Arc::clone(&service));

    assert_eq!(common::get(addr, "/health").json()["model_loaded"], false);
    let body = json!({ "image": common::data_url(&common::drawn_three_png()) });
    let value = common::post_json(addr, "/predict-drawing", &body).json();
    assert_eq!(value["success"], false);
    assert!(value["error"].as_str().unwrap().starts_with("Model not loaded: "));
    // Startup attempt plus the lazy retry.
    assert_eq!(service.load_attempts(), 2);
}

#[test]
fn oversized_body_is_refused() {
    let (_dir, path) = saved_model();
    let service = Arc::new(DigitService::new(ServiceConfig {
        model_path: path,
        max_body_bytes: 1024,
        ..Default::default()
    }));
    let addr = common::spawn_server(service);

    let value = common::post_json(addr, "/predict-drawing", &json!({ "image": "A".repeat(4096) })).json();
    assert_eq!(value["success"], false);
    assert!(value["error"].as_str().unwrap().contains("limit"));
}

#[test]
fn concurrent_first_requests_load_once() {
    let (_dir, path) = saved_model();
    let service = service_for(path);
    let addr = common::spawn_server(Arc::clone(&service));
    let body = json!({ "image": common::data_url(&common::drawn_three_png()) });

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let body = body.clone();
            thread::spawn(move || common::post_json(addr, "/predict-drawing", &body).json()["success"] == true)
        })
        .collect();
    assert!(handles.into_iter().all(|h| h.join().unwrap()));
    assert_eq!(service.load_attempts(), 1);
}
