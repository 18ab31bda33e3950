use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use vision_relay::api::{ApiHandle, ApiServer};
use vision_relay::{AppConfig, DeviceEndpoint, PageLayout, SharedDetector, StubBackend};

const TEST_CAMERA: &str = "stub://test?frames=12&width=64&height=48&fps=200";

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.server.addr = "127.0.0.1:0".to_string();
    cfg.camera.url = TEST_CAMERA.to_string();
    cfg.stream.skip_frames = 1;
    cfg.stream.target_fps = 1000.0;
    cfg
}

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(cfg: AppConfig) -> Result<Self> {
        let detector: SharedDetector = Arc::new(Mutex::new(StubBackend::new()));
        let api_handle = ApiServer::new(cfg, detector).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn request(&self, raw: &str) -> Result<(String, Vec<u8>)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.write_all(raw.as_bytes())?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        let split = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has a header terminator");
        let headers = String::from_utf8_lossy(&response[..split]).into_owned();
        Ok((headers, response[split + 4..].to_vec()))
    }

    fn get(&self, path: &str) -> Result<(String, Vec<u8>)> {
        self.request(&format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"))
    }

    fn post_json(&self, path: &str, body: &str) -> Result<(String, Value)> {
        let (headers, body) = self.request(&format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ))?;
        Ok((headers, serde_json::from_slice(&body)?))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

/// One-shot device that records the command it receives and answers `reply`.
fn fake_device(reply: &'static str) -> Result<(u16, JoinHandle<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let join = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept relay connection");
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).expect("read command");
        stream.write_all(reply.as_bytes()).expect("write reply");
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    Ok((port, join))
}

#[test]
fn health_endpoint_reports_ok() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, body) = api.get("/health")?;
    assert!(headers.contains("200 OK"));
    assert!(String::from_utf8(body)?.contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn index_serves_dual_page_by_default() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, body) = api.get("/")?;
    let page = String::from_utf8(body)?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("text/html"));
    assert!(page.contains(r#"src="/video_feed_detection""#));
    assert!(page.contains(r#"src="/video_feed_tracking""#));
    assert!(page.contains("ESP32 Control Panel"));
    Ok(())
}

#[test]
fn index_serves_single_page_when_configured() -> Result<()> {
    let mut cfg = test_config();
    cfg.server.layout = PageLayout::Single;
    let api = TestApi::new(cfg)?;
    let (_headers, body) = api.get("/")?;
    let page = String::from_utf8(body)?;
    assert_eq!(page.matches("<img").count(), 1);
    assert!(page.contains(r#"src="/video_feed""#));
    Ok(())
}

#[test]
fn unknown_device_id_is_rejected_in_the_message() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, value) = api.post_json("/send_command/3", r#"{"command":"led on"}"#)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(value["message"], "Invalid ESP32 ID.");
    Ok(())
}

#[test]
fn oversized_numeric_device_id_is_rejected_in_the_message() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, value) = api.post_json("/send_command/4294967296", r#"{"command":"x"}"#)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(value["message"], "Invalid ESP32 ID.");

    let (headers, value) = api.post_json("/send_command/+1", r#"{"command":"x"}"#)?;
    assert!(headers.contains("404 Not Found"));
    assert_eq!(value["error"], "not_found");
    Ok(())
}

#[test]
fn command_is_relayed_upper_cased_to_the_device() -> Result<()> {
    let (port, device) = fake_device("ACK")?;
    let mut cfg = test_config();
    cfg.devices.device_1 = DeviceEndpoint::new("127.0.0.1", port);
    let api = TestApi::new(cfg)?;

    let (headers, value) = api.post_json("/send_command/1", r#"{"command":"  led on "}"#)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(value["message"], "Response from 127.0.0.1: ACK");
    assert_eq!(device.join().expect("device thread"), "LED ON\n");
    Ok(())
}

#[test]
fn unreachable_device_is_reported_in_the_message() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let mut cfg = test_config();
    cfg.devices.device_2 = DeviceEndpoint::new("127.0.0.1", port);
    let api = TestApi::new(cfg)?;

    let (headers, value) = api.post_json("/send_command/2", r#"{"command":"ping"}"#)?;
    assert!(headers.contains("200 OK"));
    let message = value["message"].as_str().expect("message string");
    assert!(message.starts_with("Socket error while sending command to 127.0.0.1"));
    Ok(())
}

#[test]
fn malformed_requests_get_error_statuses() -> Result<()> {
    let api = TestApi::new(test_config())?;

    let (headers, body) = api.get("/nope")?;
    assert!(headers.contains("404 Not Found"));
    assert!(String::from_utf8(body)?.contains("not_found"));

    let (headers, _) = api.get("/send_command/1")?;
    assert!(headers.contains("405 Method Not Allowed"));

    let (headers, _) = api.request(
        "POST /video_feed HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n",
    )?;
    assert!(headers.contains("405 Method Not Allowed"));

    let (headers, value) = api.post_json("/send_command/abc", r#"{"command":"x"}"#)?;
    assert!(headers.contains("404 Not Found"));
    assert_eq!(value["error"], "not_found");

    let (headers, value) = api.post_json("/send_command/1", "{not json")?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(value["error"], "invalid_json");
    Ok(())
}

fn count_jpeg_parts(body: &[u8]) -> usize {
    let marker = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8";
    body.windows(marker.len()).filter(|w| *w == marker).count()
}

#[test]
fn detection_stream_emits_multipart_jpegs_until_source_ends() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, body) = api.get("/video_feed_detection")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("multipart/x-mixed-replace; boundary=frame"));
    let parts = count_jpeg_parts(&body);
    assert!(parts >= 1, "expected at least one frame part");
    assert!(parts <= 12);
    Ok(())
}

#[test]
fn tracking_stream_emits_multipart_jpegs() -> Result<()> {
    let api = TestApi::new(test_config())?;
    let (headers, body) = api.get("/video_feed_tracking")?;
    assert!(headers.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(count_jpeg_parts(&body) >= 1);
    Ok(())
}

#[test]
fn stream_with_unopenable_camera_ends_empty() -> Result<()> {
    let mut cfg = test_config();
    cfg.camera.url = "ftp://camera.invalid/video".to_string();
    let api = TestApi::new(cfg)?;
    let (headers, body) = api.get("/video_feed")?;
    assert!(headers.contains("200 OK"));
    assert_eq!(count_jpeg_parts(&body), 0);
    Ok(())
}
