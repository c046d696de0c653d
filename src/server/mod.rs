pub mod multipart;
pub mod routes;

use std::sync::Arc;
use std::thread;

use log::info;
use tiny_http::Server;

use crate::service::classifier::DigitService;

/// Serves requests until the server is dropped or unblocked.
///
/// Each request is dispatched on its own thread so a slow classification
/// does not stall health checks or page loads.
pub fn run(server: Arc<Server>, service: Arc<DigitService>) {
    if let Some(addr) = server.server_addr().to_ip() {
        info!("Listening on http://{}", addr);
    }
    for request in server.incoming_requests() {
        let service = Arc::clone(&service);
        thread::spawn(move || routes::dispatch(request, service));
    }
}
