#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use tiny_http::Server;

use digit_mlops::server;
use digit_mlops::service::DigitService;

/// Writes `per_class` synthetic rows for every digit into `<dir>/mnist_full.csv`.
///
/// Digit `d` is a bright horizontal band starting at row `2 * d + 4`, with a
/// little per-row variation so the images are not identical.
pub fn write_digit_csv(dir: &Path, per_class: usize) {
    let mut text = String::from("label");
    for i in 0..784 {
        text.push_str(&format!(",pixel{}", i));
    }
    text.push('\n');

    for row in 0..per_class {
        for digit in 0..10usize {
            text.push_str(&digit.to_string());
            for y in 0..28 {
                for x in 0..28 {
                    let lit = y >= 2 * digit + 4 && y < 2 * digit + 7 && x >= 4 && x < 24;
                    let value = if lit { 200 + (row * 7 + x) % 56 } else { (x + y + row) % 5 };
                    text.push_str(&format!(",{}", value));
                }
            }
            text.push('\n');
        }
    }
    std::fs::write(dir.join("mnist_full.csv"), text).unwrap();
}

fn encode_png(img: RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn fill(img: &mut RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
}

/// A 280x280 canvas with a thick black "3" on white.
pub fn drawn_three_png() -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(280, 280, Rgba([255, 255, 255, 255]));
    fill(&mut img, 80, 200, 50, 70);
    fill(&mut img, 110, 200, 130, 150);
    fill(&mut img, 80, 200, 210, 230);
    fill(&mut img, 180, 200, 50, 230);
    encode_png(img)
}

pub fn white_png() -> Vec<u8> {
    encode_png(RgbaImage::from_pixel(280, 280, Rgba([255, 255, 255, 255])))
}

pub fn data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Serves `service` on an ephemeral local port.
pub fn spawn_server(service: Arc<DigitService>) -> SocketAddr {
    let http = Arc::new(Server::http("127.0.0.1:0").unwrap());
    let addr = http.server_addr().to_ip().unwrap();
    thread::spawn(move || server::run(http, service));
    addr
}

pub struct HttpReply {
    pub status: u16,
    pub headers: String,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_owned())
        })
    }
}

/// Minimal HTTP/1.1 client: one request per connection.
pub fn request(addr: SocketAddr, method: &str, path: &str, content_type: Option<&str>, body: &[u8]) -> HttpReply {
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Length: {}\r\n",
        method, path, addr, body.len()
    );
    if let Some(ct) = content_type {
        head.push_str(&format!("Content-Type: {}\r\n", ct));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();
    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let headers = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = headers.split_whitespace().nth(1).unwrap().parse().unwrap();
    HttpReply { status, headers, body: raw[split + 4..].to_vec() }
}

pub fn get(addr: SocketAddr, path: &str) -> HttpReply {
    request(addr, "GET", path, None, &[])
}

pub fn post_json(addr: SocketAddr, path: &str, body: &serde_json::Value) -> HttpReply {
    request(addr, "POST", path, Some("application/json"), body.to_string().as_bytes())
}

pub fn post_file(addr: SocketAddr, filename: &str, content_type: &str, data: &[u8]) -> HttpReply {
    let boundary = "----digitTestBoundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    let ct = format!("multipart/form-data; boundary={}", boundary);
    request(addr, "POST", "/predict", Some(&ct), &body)
}

/// Checks the shared prediction invariants on a `/predict-drawing` body.
pub fn assert_probability_vector(probs: &[f64], predicted: usize) {
    assert_eq!(probs.len(), 10);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-3);
    let best = probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(probs[predicted], best);
}
