//! Request handlers, one per protocol operation.
//!
//! Each handler normalizes its path, consults the access ledger, and only then
//! touches storage. Ledger misuse surfaces as `403`; denials are returned as
//! ordinary JSON payloads.

use super::session::session_from_headers;
use super::ServerState;
use crate::error::{Result, ShareError};
use crate::ledger::{Grant, DENIED};
use crate::observability;
use crate::protocol::{encode_payload, set_cookie_header};
use crate::storage::normalize;
use crate::types::{AccessMode, Descriptor, DirEntry, FileAttributes, SessionToken};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Query string of a rename request.
#[derive(Debug, Deserialize)]
pub struct RenameTarget {
    pub new: String,
}

pub async fn init_session(State(state): State<ServerState>) -> Result<impl IntoResponse> {
    observability::record_request("init_session");

    let (token, live) = {
        let mut ledger = state.ledger.lock();
        let token = ledger.start_session()?;
        (token, ledger.session_count())
    };
    observability::update_live_sessions(live);
    info!(session = %token, live, "Session opened");

    Ok(([(header::SET_COOKIE, set_cookie_header(&token))], Json(())))
}

/// Ends the caller's session. A missing or unknown cookie is a no-op.
pub async fn close_session(State(state): State<ServerState>, headers: HeaderMap) -> Json<()> {
    observability::record_request("close_session");

    if let Some(token) = session_from_headers(&headers) {
        let (released, live) = {
            let mut ledger = state.ledger.lock();
            let released = ledger.end_session(&token);
            (released, ledger.session_count())
        };
        observability::update_live_sessions(live);
        info!(session = %token, released, live, "Session closed");
    }

    Json(())
}

pub async fn create(
    State(state): State<ServerState>,
    Extension(token): Extension<SessionToken>,
    Path((mode, path)): Path<(u32, String)>,
) -> Result<Json<i64>> {
    observability::record_request("create");
    let path = normalize(&path)?;

    let grant = state.ledger.lock().open_for_write(&token, &path)?;
    let Grant::Granted(fd) = grant else {
        observability::record_denial("create");
        warn!(session = %token, path = %path, "Create denied: path has a writer");
        return Ok(Json(DENIED));
    };

    state.storage.create_truncate(&path, mode)?;
    debug!(session = %token, path = %path, fd, mode, "Created");
    Ok(Json(grant.to_wire()))
}

pub async fn open(
    State(state): State<ServerState>,
    Extension(token): Extension<SessionToken>,
    Path((flags, path)): Path<(i32, String)>,
) -> Result<Json<i64>> {
    observability::record_request("open");
    let path = normalize(&path)?;
    let mode = AccessMode::from_open_flags(flags);

    let grant = state.ledger.lock().open(&token, &path, mode)?;
    match grant {
        Grant::Granted(fd) => debug!(session = %token, path = %path, fd, ?mode, "Opened"),
        Grant::Denied => {
            observability::record_denial("open");
            warn!(session = %token, path = %path, "Open for write denied: path has a writer");
        }
    }

    Ok(Json(grant.to_wire()))
}

pub async fn release(
    State(state): State<ServerState>,
    Extension(token): Extension<SessionToken>,
    Path((fd, path)): Path<(Descriptor, String)>,
) -> Result<Json<()>> {
    observability::record_request("release");
    let path = normalize(&path)?;

    state.ledger.lock().close(&token, fd, &path)?;
    debug!(session = %token, path = %path, fd, "Released");
    Ok(Json(()))
}

/// Returns the bytes as base64, or `null` if the file vanished after open.
pub async fn read(
    State(state): State<ServerState>,
    Extension(token): Extension<SessionToken>,
    Path((fd, size, offset, path)): Path<(Descriptor, u64, u64, String)>,
) -> Result<Json<Option<String>>> {
    observability::record_request("read");
    let path = normalize(&path)?;

    state.ledger.lock().is_valid_handle(&token, fd, &path, false)?;

    let data = state.storage.read_at(&path, size, offset)?;
    match &data {
        Some(bytes) => observability::record_read(bytes.len() as u64),
        None => debug!(session = %token, path = %path, fd, "Read of vanished file"),
    }

    Ok(Json(data.as_deref().map(encode_payload)))
}

pub async fn write(
    State(state): State<ServerState>,
    Extension(token): Extension<SessionToken>,
    Path((fd, offset, path)): Path<(Descriptor, u64, String)>,
    body: Bytes,
) -> Result<Json<usize>> {
    observability::record_request("write");
    let path = normalize(&path)?;

    if !state.ledger.lock().is_valid_handle(&token, fd, &path, true)? {
        observability::record_denial("write");
        return Err(ShareError::AccessDenied(format!(
            "handle {} on {} is read-only",
            fd, path
        )));
    }

    let written = state.storage.write_at(&path, offset, &body)?;
    observability::record_write(written as u64);
    debug!(session = %token, path = %path, fd, offset, written, "Wrote");
    Ok(Json(written))
}

pub async fn getattr(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Json<Option<FileAttributes>>> {
    getattr_at(&state, &path)
}

pub async fn getattr_root(State(state): State<ServerState>) -> Result<Json<Option<FileAttributes>>> {
    getattr_at(&state, "")
}

fn getattr_at(state: &ServerState, path: &str) -> Result<Json<Option<FileAttributes>>> {
    observability::record_request("getattr");
    let path = normalize(path)?;
    Ok(Json(state.storage.stat(&path)?))
}

pub async fn readdir(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Json<Vec<String>>> {
    readdir_at(&state, &path)
}

pub async fn readdir_root(State(state): State<ServerState>) -> Result<Json<Vec<String>>> {
    readdir_at(&state, "")
}

fn readdir_at(state: &ServerState, path: &str) -> Result<Json<Vec<String>>> {
    observability::record_request("readdir");
    let path = normalize(path)?;
    Ok(Json(state.storage.list_dir(&path)?))
}

/// Like `readdir`, with each entry's attributes so listings need no per-entry
/// `getattr`.
pub async fn readdir_plus(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Json<Vec<DirEntry>>> {
    readdir_plus_at(&state, &path)
}

pub async fn readdir_plus_root(State(state): State<ServerState>) -> Result<Json<Vec<DirEntry>>> {
    readdir_plus_at(&state, "")
}

fn readdir_plus_at(state: &ServerState, path: &str) -> Result<Json<Vec<DirEntry>>> {
    observability::record_request("readdir_plus");
    let path = normalize(path)?;
    Ok(Json(state.storage.list_dir_with_attrs(&path)?))
}

pub async fn mkdir(
    State(state): State<ServerState>,
    Path((mode, path)): Path<(u32, String)>,
) -> Result<Json<()>> {
    observability::record_request("mkdir");
    let path = normalize(&path)?;

    state.storage.mkdir(&path, mode)?;
    debug!(path = %path, mode, "Directory created");
    Ok(Json(()))
}

/// Returns `0`, or [`DENIED`] without deleting if any handle is open on the
/// path.
pub async fn unlink(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Json<i64>> {
    observability::record_request("unlink");
    let path = normalize(&path)?;

    // Hold the ledger across the delete so no handle can open in between.
    let target = path.clone();
    let removed = run_blocking(move || {
        let ledger = state.ledger.lock();
        if ledger.is_any_handle_outstanding(&target) {
            return Ok(false);
        }
        state.storage.unlink(&target)?;
        Ok(true)
    })
    .await?;

    if !removed {
        observability::record_denial("unlink");
        warn!(path = %path, "Unlink refused: handles outstanding");
        return Ok(Json(DENIED));
    }
    debug!(path = %path, "Unlinked");
    Ok(Json(0))
}

pub async fn rmdir(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Json<()>> {
    observability::record_request("rmdir");
    let path = normalize(&path)?;

    state.storage.rmdir(&path)?;
    debug!(path = %path, "Directory removed");
    Ok(Json(()))
}

/// Returns `0`, or [`DENIED`] without renaming if any handle is open on
/// either path.
pub async fn rename(
    State(state): State<ServerState>,
    Path(path): Path<String>,
    Query(target): Query<RenameTarget>,
) -> Result<Json<i64>> {
    observability::record_request("rename");
    let from = normalize(&path)?;
    let to = normalize(&target.new)?;

    let (src, dst) = (from.clone(), to.clone());
    let renamed = run_blocking(move || {
        let ledger = state.ledger.lock();
        if ledger.is_any_handle_outstanding(&src) || ledger.is_any_handle_outstanding(&dst) {
            return Ok(false);
        }
        state.storage.rename(&src, &dst)?;
        Ok(true)
    })
    .await?;

    if !renamed {
        observability::record_denial("rename");
        warn!(from = %from, to = %to, "Rename refused: handles outstanding");
        return Ok(Json(DENIED));
    }
    debug!(from = %from, to = %to, "Renamed");
    Ok(Json(0))
}

/// Run a ledger-guarded storage change off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ShareError::Internal(format!("Blocking task failed: {}", e)))?
}
