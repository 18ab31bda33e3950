//! Blocking HTTP/1.1 server for the viewer page, the MJPEG streams and the
//! device command relay.
//!
//! The accept loop runs on its own thread and hands each connection to a
//! fresh thread; a streaming request keeps its thread until the camera source
//! ends or the client goes away. Every response closes the connection.

mod html;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::AppConfig;
use crate::detect::SharedDetector;
use crate::ingest;
use crate::relay::{self, INVALID_DEVICE_MESSAGE};
use crate::stream::{write_multipart, StreamMode, StreamSession, MULTIPART_CONTENT_TYPE};

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 64 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Streams already being served run until
    /// their source ends or their client disconnects.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// State shared by every connection thread. Read-only apart from the
/// detector, which sessions lock per call.
struct AppState {
    cfg: AppConfig,
    detector: SharedDetector,
}

pub struct ApiServer {
    cfg: AppConfig,
    detector: SharedDetector,
}

impl ApiServer {
    pub fn new(cfg: AppConfig, detector: SharedDetector) -> Self {
        Self { cfg, detector }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.server.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = Arc::new(AppState {
            cfg: self.cfg,
            detector: self.detector,
        });
        let join = std::thread::Builder::new()
            .name("vision-api".into())
            .spawn(move || {
                if let Err(err) = run_api(listener, state, shutdown_thread) {
                    log::error!("http server stopped: {}", err);
                }
            })?;

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                let state = state.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("vision-conn-{}", peer))
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &state) {
                            log::warn!("request from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("failed to spawn connection thread for {}: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Index,
    Health,
    Stream(StreamMode),
    SendCommand(&'a str),
    NotFound,
}

impl Route<'_> {
    fn method(&self) -> &'static str {
        match self {
            Route::SendCommand(_) => "POST",
            _ => "GET",
        }
    }
}

fn route(path: &str) -> Route<'_> {
    match path {
        "/" => Route::Index,
        "/health" => Route::Health,
        "/video_feed" | "/video_feed_detection" => Route::Stream(StreamMode::Detection),
        "/video_feed_tracking" => Route::Stream(StreamMode::Tracking),
        _ => match path.strip_prefix("/send_command/") {
            Some(id) if !id.is_empty() && !id.contains('/') => Route::SendCommand(id),
            _ => Route::NotFound,
        },
    }
}

/// Integer path segment of `/send_command/<id>`: ASCII digits only, no sign.
///
/// Ids too large for `u32` still count as numeric and map to `u32::MAX`,
/// which names no device.
fn parse_device_id(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(segment.parse().unwrap_or(u32::MAX))
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    message: String,
}

fn handle_connection(mut stream: TcpStream, state: &AppState) -> Result<()> {
    let request = read_request(&mut stream)?;
    log::debug!("{} {}", request.method, request.path);

    let route = route(&request.path);
    if route == Route::NotFound {
        return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#);
    }
    if request.method != route.method() {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }

    match route {
        Route::Index => {
            let page = html::render_index(state.cfg.server.layout, &state.cfg.devices);
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        Route::Health => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        Route::Stream(mode) => serve_stream(stream, state, mode),
        Route::SendCommand(id) => {
            let Some(device_id) = parse_device_id(id) else {
                return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#);
            };
            let payload: CommandRequest = match serde_json::from_slice(&request.body) {
                Ok(payload) => payload,
                Err(_) => {
                    return write_json_response(&mut stream, 400, r#"{"error":"invalid_json"}"#)
                }
            };
            let command = relay::normalize_command(payload.command.as_deref().unwrap_or(""));
            let message = match state.cfg.devices.endpoint(device_id) {
                Some(endpoint) => {
                    relay::relay_message(endpoint, &command, state.cfg.devices.timeouts)
                }
                None => INVALID_DEVICE_MESSAGE.to_string(),
            };
            let body = serde_json::to_vec(&CommandResponse { message })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        Route::NotFound => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn serve_stream(mut stream: TcpStream, state: &AppState, mode: StreamMode) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        MULTIPART_CONTENT_TYPE
    );
    stream.write_all(header.as_bytes())?;
    stream.flush()?;

    let source = match ingest::open_source(&state.cfg.camera) {
        Ok(source) => source,
        Err(err) => {
            log::warn!("{} stream: failed to open camera: {:#}", mode.label(), err);
            return Ok(());
        }
    };
    let mut session = StreamSession::new(mode, source, state.detector.clone(), &state.cfg.stream);
    if let Err(err) = write_multipart(&mut stream, &mut session) {
        log::info!("{} stream: client went away: {}", mode.label(), err);
    }
    session.close();
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }
    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}
