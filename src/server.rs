//! TCP accept loop and per-connection framing (spec.md §4.8).
//!
//! One task per accepted connection reads until a newline or EOF, scans for
//! the first `{`, and parses exactly one JSON object. The request is handed
//! to the single processor task over `queue::channel`; the reader task never
//! touches `Engine` state directly (SPEC_FULL.md §4.8).

use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::engine::Engine;
use crate::error::{OfsError, OfsErrorCode};
use crate::protocol::{role_str, WireRequest, WireResponse};
use crate::queue::{self, RequestQueueSender};

/// Runs the server forever: binds `port`, spawns the processor task owning
/// `engine`, then accepts connections until the listener itself fails.
pub async fn run(engine: Engine, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {port}");

    let (tx, rx) = queue::channel();
    tokio::spawn(processor_loop(engine, rx));

    loop {
        let (socket, addr) = listener.accept().await?;
        debug!("accepted connection from {addr}");
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, tx).await {
                warn!("connection from {addr} ended with error: {e}");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    tx: RequestQueueSender,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.contains(&b'\n') {
            break;
        }
    }

    let Some(start) = buf.iter().position(|&b| b == b'{') else {
        let resp = WireResponse::plain_error("", "", "no JSON object found in request");
        return write_response(&mut socket, &resp).await;
    };

    let request: Result<WireRequest, _> = serde_json::from_slice(&buf[start..]);
    let request = match request {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed request: {e}");
            let resp = WireResponse::plain_error("", "", &format!("malformed JSON: {e}"));
            return write_response(&mut socket, &resp).await;
        }
    };

    let response = match tx.enqueue(request) {
        Ok(reply_rx) => match reply_rx.await {
            Ok(resp) => resp,
            Err(_) => WireResponse::plain_error("", "", "processor task shut down"),
        },
        Err(dropped) => {
            WireResponse::plain_error(&dropped.operation, &dropped.request_id, "server is shutting down")
        }
    };

    write_response(&mut socket, &response).await
}

async fn write_response(socket: &mut TcpStream, response: &WireResponse) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(response).expect("WireResponse always serializes");
    line.push(b'\n');
    socket.write_all(&line).await
}

/// The sole mutator of `engine`. Never suspends except on the container's
/// blocking I/O and the queue's own `recv` (spec.md §5).
async fn processor_loop(mut engine: Engine, mut rx: queue::RequestQueueReceiver) {
    while let Some(queued) = rx.recv().await {
        let response = dispatch(&mut engine, &queued.request);
        let _ = queued.reply.send(response);
    }
}

const UNAUTHENTICATED_OPERATIONS: &[&str] = &["user_login", "user_logout", "get_error_message"];

fn dispatch(engine: &mut Engine, req: &WireRequest) -> WireResponse {
    debug!("dispatching {} (request_id={})", req.operation, req.request_id);

    if !UNAUTHENTICATED_OPERATIONS.contains(&req.operation.as_str())
        && engine.sessions.find(&req.session_id).is_none()
    {
        return WireResponse::from_error(&req.operation, &req.request_id, &OfsError::InvalidSession);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatch_inner(engine, req)
    }));

    match result {
        Ok(Ok(data)) => WireResponse::success(&req.operation, &req.request_id, data),
        Ok(Err(err)) => WireResponse::from_error(&req.operation, &req.request_id, &err),
        Err(_) => {
            error!("operation {} panicked", req.operation);
            WireResponse::plain_error(&req.operation, &req.request_id, "Unknown server error")
        }
    }
}

fn dispatch_inner(engine: &mut Engine, req: &WireRequest) -> Result<Option<Value>, OfsError> {
    let p = &req.parameters;
    match req.operation.as_str() {
        "user_login" => {
            let username = param_str(p, "username")?;
            let password = param_str(p, "password")?;
            let session = engine.user_login(username, password)?;
            Ok(Some(json!({
                "session_id": session.session_id,
                "username": session.username,
                "role": role_str(session.role_is_admin),
            })))
        }
        "user_logout" => {
            engine.user_logout(&req.session_id)?;
            Ok(None)
        }
        "user_create" => {
            let username = param_str(p, "username")?;
            let password = param_str(p, "password")?;
            let is_admin = param_str(p, "role").unwrap_or("normal") == "admin";
            engine.user_create(username, password, is_admin)?;
            Ok(None)
        }
        "user_delete" => {
            engine.user_delete(param_str(p, "username")?)?;
            Ok(None)
        }
        "user_list" => {
            let users = engine.user_list();
            Ok(Some(json!(users
                .iter()
                .map(|u| json!({
                    "username": u.username,
                    "role": role_str(u.is_admin),
                    "is_active": u.is_active as u8,
                }))
                .collect::<Vec<_>>())))
        }
        "dir_create" => {
            engine.dir_create(param_str(p, "path")?)?;
            Ok(None)
        }
        "dir_delete" => {
            engine.dir_delete(param_str(p, "path")?)?;
            Ok(None)
        }
        "dir_exists" => {
            engine.dir_exists(param_str(p, "path")?)?;
            Ok(None)
        }
        "dir_list" => {
            let entries = engine.dir_list(param_str(p, "path")?)?;
            Ok(Some(json!(entries
                .iter()
                .map(|e| json!({
                    "name": e.name,
                    "type": if e.is_directory { "directory" } else { "file" },
                    "size": e.size,
                }))
                .collect::<Vec<_>>())))
        }
        "file_create" => {
            let path = param_str(p, "path")?;
            let size = param_u64(p, "size").unwrap_or(0);
            let data = p.get("data").and_then(Value::as_str).map(str::as_bytes);
            engine.file_create(path, data, size)?;
            Ok(None)
        }
        "file_delete" => {
            engine.file_delete(param_str(p, "path")?)?;
            Ok(None)
        }
        "file_exists" => {
            engine.file_exists(param_str(p, "path")?)?;
            Ok(None)
        }
        "file_read" => {
            let bytes = engine.file_read(param_str(p, "path")?)?;
            Ok(Some(json!({ "content": String::from_utf8_lossy(&bytes) })))
        }
        "file_edit" => {
            let path = param_str(p, "path")?;
            let data = param_str(p, "data")?;
            let size = param_u64(p, "size").unwrap_or(data.len() as u64);
            let index = p.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
            engine.file_edit(path, data.as_bytes(), size, index)?;
            Ok(None)
        }
        "file_truncate" => {
            engine.file_truncate(param_str(p, "path")?)?;
            Ok(None)
        }
        "file_rename" => {
            engine.file_rename(param_str(p, "old_path")?, param_str(p, "new_path")?)?;
            Ok(None)
        }
        "get_metadata" => {
            let meta = engine.get_metadata(param_str(p, "path")?)?;
            Ok(Some(json!({
                "name": meta.name,
                "size": meta.size,
                "permissions": meta.permissions,
                "blocks_used": meta.blocks_used,
            })))
        }
        "set_permissions" => {
            let path = param_str(p, "path")?;
            let mode = param_u64(p, "permissions")? as u32;
            engine.set_permissions(path, mode)?;
            Ok(None)
        }
        "get_stats" => {
            let stats = engine.get_stats();
            Ok(Some(json!({
                "total_size": stats.total_size,
                "used_space": stats.used_space,
                "free_space": stats.free_space,
                "total_files": stats.total_files,
                "total_directories": stats.total_directories,
                "total_users": stats.total_users,
                "active_sessions": stats.active_sessions,
            })))
        }
        "get_error_message" => {
            let code = p.get("error_code").and_then(Value::as_u64).unwrap_or(0) as i32;
            let message = OfsErrorCode::from_code(code)
                .map(OfsErrorCode::message)
                .unwrap_or("unknown error code");
            Ok(Some(json!({ "message": message })))
        }
        other => Err(OfsError::NotImplemented(format!("unknown operation '{other}'"))),
    }
}

fn param_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, OfsError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| OfsError::InvalidOperation(format!("missing or non-string parameter '{key}'")))
}

fn param_u64(params: &Value, key: &str) -> Result<u64, OfsError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| OfsError::InvalidOperation(format!("missing or non-numeric parameter '{key}'")))
}
