//! Development server.
//!
//! Serves the output folder over HTTP while the watch loop keeps it fresh:
//!
//! - Static file serving from the output folder
//! - Automatic `index.html` resolution for directories
//! - Port auto-retry when the configured one is taken
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Server Thread   │
//! │  (Watch Loop)   │     │  (HTTP Server)   │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//!    Detect changes          Handle requests
//!    Rebuild / clean         Serve files
//!          │                       │
//!          └──────────┬────────────┘
//!                     ▼
//!                 outputs/
//! ```
//!
//! Ctrl+C stops the watch loop and unblocks the server; the server thread is
//! joined before returning.

use crate::{
    build::Builder,
    log,
    utils::category::Role,
    watch::{WatchMessage, watch_blocking},
};
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::{Arc, mpsc::channel},
    thread,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the output folder and rebuild on change until Ctrl+C.
pub fn serve_site(builder: &mut Builder) -> Result<()> {
    let serve = &builder.config().serve;
    let interface: IpAddr = serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", serve.interface))?;

    let (server, addr) = try_bind_port(interface, serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let folders = builder.folders();
    let serve_root = folders.absolute(folders.folder(Role::Output));

    let (tx, rx) = channel();

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    let tx_for_signal = tx.clone();
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
        let _ = tx_for_signal.send(WatchMessage::Shutdown);
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    let server_for_thread = Arc::clone(&server);
    let handle = thread::spawn(move || {
        for request in server_for_thread.incoming_requests() {
            if let Err(e) = handle_request(request, &serve_root) {
                log!("serve"; "request error: {e}");
            }
        }
    });

    let watched = watch_blocking(builder, &tx, &rx);

    server.unblock();
    if handle.join().is_err() {
        log!("serve"; "server thread panicked");
    }
    watched
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Map a request URL onto a file below `serve_root`.
///
/// Resolution order:
/// 1. Exact file match
/// 2. Directory with index.html
///
/// URLs escaping the root resolve to nothing.
fn resolve(serve_root: &Path, url: &str) -> Option<PathBuf> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(url).ok()?;

    // Strip query string (e.g., ?t=123456) before resolving path
    let path_without_query = url_path.split('?').next().unwrap_or_default();
    let request_path = Path::new(path_without_query.trim_matches('/'));

    if request_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let local_path = serve_root.join(request_path);
    if local_path.is_file() {
        return Some(local_path);
    }

    let index_path = local_path.join("index.html");
    index_path.is_file().then_some(index_path)
}

fn handle_request(request: Request, serve_root: &Path) -> Result<()> {
    match resolve(serve_root, request.url()) {
        Some(path) => serve_file(request, &path),
        None => serve_not_found(request),
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type_header(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("invalid header value {value}"))
}

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response =
        Response::from_data(content).with_header(content_type_header(guess_content_type(path))?);

    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let body = "404 Not Found";
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain")?],
        Cursor::new(body),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",

        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        _ => "application/octet-stream",
    }
}
