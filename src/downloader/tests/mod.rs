use super::test_helpers::*;
use super::*;
use crate::error::{DownloadError, Error};
use crate::types::DownloadRequest;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


/// Serve `body` at `route` for every GET, after `delay`
async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body).set_delay(delay))
        .mount(server)
        .await;
}

/// Request for `<server>/<name>` into `dir`
fn request_for(server: &MockServer, name: &str, dir: &std::path::Path) -> DownloadRequest {
    DownloadRequest::new(format!("{}/{}", server.uri(), name), name, dir)
}

/// Record every status event as (task, kind, message)
fn record_status(downloader: &RomDownloader) -> Arc<Mutex<Vec<(TaskId, EventKind, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    downloader.add_status_listener(move |id, kind, msg| {
        seen_clone.lock().unwrap().push((id, kind, msg.to_string()));
    });
    seen
}

fn kinds_for(seen: &Mutex<Vec<(TaskId, EventKind, String)>>, id: TaskId) -> Vec<EventKind> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|(task_id, _, _)| *task_id == id)
        .map(|(_, kind, _)| *kind)
        .collect()
}
