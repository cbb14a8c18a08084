//! Minimal HTTP/1.1 ingress for the three control-plane routes (component C9).
//!
//! The daemon this engine descends from has no HTTP surface of its own, so
//! this module is grounded on the shape of its `Reporter`/egress client
//! turned inside out: a hand-rolled request parser over `std::net::TcpListener`
//! (no async runtime, consistent with the rest of the engine's OS-thread
//! concurrency model) rather than pulling in a web framework for three routes.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    sync::{Arc, OnceLock},
};

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::constants::INGRESS_MAX_BODY;
use crate::downloader::DownloadRequest;
use crate::error::LifecycleError;
use crate::lifecycle::Lifecycle;
use crate::state::StateManager;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap())
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://.+").unwrap())
}

fn md5_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-f0-9]{32}$").unwrap())
}

#[derive(Deserialize)]
struct DownloadBody {
    version: String,
    package_url: String,
    package_name: String,
    package_size: u64,
    package_md5: String,
}

#[derive(Deserialize)]
struct UpdateBody {
    version: String,
}

struct HttpResponse {
    status: u16,
    body: Value,
}

/// Serves the progress/download/update routes on a blocking TCP listener.
pub struct Ingress {
    lifecycle: Arc<Lifecycle>,
    state: Arc<StateManager>,
}

impl Ingress {
    /// Builds an ingress sharing state with the rest of the engine.
    pub fn new(lifecycle: Arc<Lifecycle>, state: Arc<StateManager>) -> Self {
        Self { lifecycle, state }
    }

    /// Binds `0.0.0.0:port` and serves requests forever, one thread per
    /// connection.
    pub fn serve(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!(port, "ingress listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let lifecycle = Arc::clone(&self.lifecycle);
                    let state = Arc::clone(&self.state);
                    std::thread::spawn(move || handle_connection(stream, &lifecycle, &state));
                }
                Err(err) => warn!(error = %err, "failed to accept ingress connection"),
            }
        }
        Ok(())
    }
}

fn handle_connection(mut stream: TcpStream, lifecycle: &Lifecycle, state: &StateManager) {
    let response = match read_request(&stream) {
        Ok((method, path, body)) => route(&method, &path, &body, lifecycle, state),
        Err(err) => {
            debug!(error = %err, "malformed request");
            HttpResponse {
                status: 400,
                body: json!({"code": 400, "msg": format!("malformed request: {err}")}),
            }
        }
    };

    if let Err(err) = write_response(&mut stream, response) {
        warn!(error = %err, "failed to write ingress response");
    }
}

fn read_request(stream: &TcpStream) -> Result<(String, String, Vec<u8>), String> {
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| e.to_string())?);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .map_err(|e| e.to_string())?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or("missing method")?.to_string();
    let path = parts.next().ok_or("missing path")?.to_string();

    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| e.to_string())?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    if content_length > INGRESS_MAX_BODY {
        return Err("request body too large".to_string());
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).map_err(|e| e.to_string())?;
    }

    Ok((method, path, body))
}

fn route(
    method: &str,
    path: &str,
    body: &[u8],
    lifecycle: &Lifecycle,
    state: &StateManager,
) -> HttpResponse {
    match (method, path) {
        ("GET", "/api/v1.0/progress") => progress_response(state),
        ("POST", "/api/v1.0/download") => download_response(body, lifecycle),
        ("POST", "/api/v1.0/update") => update_response(body, lifecycle),
        _ => HttpResponse {
            status: 404,
            body: json!({"code": 404, "msg": "not found"}),
        },
    }
}

fn progress_response(state: &StateManager) -> HttpResponse {
    let status = state.get_status();
    let data = json!({
        "stage": status.stage,
        "progress": status.progress,
        "message": status.message,
        "error": status.error,
    });

    if status.stage == crate::state::Stage::Failed {
        HttpResponse {
            status: 200,
            body: json!({
                "code": 500,
                "msg": "failed",
                "data": data.clone(),
                "stage": status.stage,
                "progress": status.progress,
                "message": status.message,
                "error": status.error,
            }),
        }
    } else {
        HttpResponse {
            status: 200,
            body: json!({"code": 200, "msg": "success", "data": data}),
        }
    }
}

fn download_response(body: &[u8], lifecycle: &Lifecycle) -> HttpResponse {
    let parsed: DownloadBody = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(err) => return bad_request(&err.to_string()),
    };

    if let Err(resp) = validate_download_fields(&parsed) {
        return resp;
    }

    let request = DownloadRequest {
        version: parsed.version,
        package_url: parsed.package_url,
        package_name: parsed.package_name,
        package_size: parsed.package_size,
        package_md5: parsed.package_md5.to_lowercase(),
    };

    match lifecycle.start_download(request) {
        Ok(()) => HttpResponse {
            status: 200,
            body: json!({"code": 200, "msg": "success"}),
        },
        Err(err) => lifecycle_error_response(&err),
    }
}

fn update_response(body: &[u8], lifecycle: &Lifecycle) -> HttpResponse {
    let parsed: UpdateBody = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(err) => return bad_request(&err.to_string()),
    };

    if !version_re().is_match(&parsed.version) {
        return bad_request("version must match ^\\d+\\.\\d+\\.\\d+$");
    }

    match lifecycle.start_update(&parsed.version) {
        Ok(()) => HttpResponse {
            status: 200,
            body: json!({"code": 200, "msg": "success"}),
        },
        Err(err) => lifecycle_error_response(&err),
    }
}

fn validate_download_fields(body: &DownloadBody) -> Result<(), HttpResponse> {
    if !version_re().is_match(&body.version) {
        return Err(bad_request("version must match ^\\d+\\.\\d+\\.\\d+$"));
    }
    if !url_re().is_match(&body.package_url) {
        return Err(bad_request("package_url must be an http(s) URL"));
    }
    if body.package_size == 0 {
        return Err(bad_request("package_size must be greater than 0"));
    }
    if !md5_re().is_match(&body.package_md5.to_lowercase()) {
        return Err(bad_request("package_md5 must be a 32-character hex digest"));
    }
    Ok(())
}

fn bad_request(reason: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: json!({"code": 400, "msg": reason}),
    }
}

fn lifecycle_error_response(err: &LifecycleError) -> HttpResponse {
    match err {
        LifecycleError::Busy { stage, progress } => HttpResponse {
            status: 200,
            body: json!({
                "code": 409,
                "msg": format!("Operation already in progress: {stage:?}"),
                "stage": stage,
                "progress": progress,
            }),
        },
        LifecycleError::Expired => HttpResponse {
            status: 200,
            body: json!({"code": 410, "msg": "Package expired (>24h after verification)"}),
        },
        LifecycleError::NotFound(version) => HttpResponse {
            status: 200,
            body: json!({"code": 404, "msg": format!("no downloaded package matches version '{version}'")}),
        },
    }
}

fn write_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    let payload = serde_json::to_vec(&response.body).unwrap_or_else(|_| b"{}".to_vec());
    let reason = match response.status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Error",
    };
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        payload.len()
    )?;
    stream.write_all(&payload)?;
    stream.flush()?;
    if let Err(err) = stream.shutdown(std::net::Shutdown::Both) {
        debug!(error = %err, "ignoring shutdown error on already-closed stream");
    }
    Ok(())
}
