//! Course content ingest and listing.
//!
//! Media (videos, images, PDFs) is uploaded either as a ZIP bundle that is
//! extracted under the course content dir, or as a single file. Extracted
//! files are served read-only through the `/content` mount.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::auth::CurrentUser;
use crate::courses::{load_accessible, sanitize_file_name};
use crate::error::ApiError;
use crate::models::{AssetEntry, AssetList};
use crate::state::AppState;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/courses/:course_id/media", post(upload_media))
        .route("/api/courses/:course_id/assets", get(list_assets))
}

async fn upload_media(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
    mut mp: Multipart,
) -> Result<Json<AssetList>, ApiError> {
    let (course, is_owner) = load_accessible(&state.db, course_id, &user).await?;
    if !is_owner {
        return Err(ApiError::Forbidden);
    }

    let mut file_name: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("malformed multipart body"))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("malformed multipart body"))?
                    .to_vec(),
            );
        }
    }
    let bytes = bytes.ok_or_else(|| ApiError::bad_request("file is required"))?;

    let out_dir = PathBuf::from(&state.config.data_dir).join(&course.base_path);
    if bytes.starts_with(ZIP_MAGIC) {
        extract_zip_to_dir(&bytes, &out_dir).map_err(ApiError::Internal)?;
    } else {
        let name = file_name
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("file name is required"))
            .and_then(sanitize_file_name)?;
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        tokio::fs::write(out_dir.join(&name), &bytes)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    tracing::info!(course_id = %course_id, "course media ingested");
    Ok(Json(collect_assets(&out_dir, &course.base_path)))
}

async fn list_assets(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<AssetList>, ApiError> {
    let (course, _) = load_accessible(&state.db, course_id, &user).await?;
    let dir = PathBuf::from(&state.config.data_dir).join(&course.base_path);
    Ok(Json(collect_assets(&dir, &course.base_path)))
}

pub fn extract_zip_to_dir(bytes: &[u8], out_dir: &FsPath) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let reader = std::io::Cursor::new(bytes);
    let mut zip = zip::ZipArchive::new(reader)?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        // Entries that would escape the target dir are skipped, not fatal.
        let Some(rel) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            continue;
        };
        let outpath = out_dir.join(rel);
        if file.name().ends_with('/') {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        std::io::copy(&mut file, &mut outfile)?;
    }
    Ok(())
}

fn collect_assets(dir: &FsPath, base_path: &str) -> AssetList {
    let mut assets = Vec::new();
    for entry in WalkDir::new(dir).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        assets.push(AssetEntry {
            content_url: format!("/content/{base_path}/{rel}"),
            path: rel,
        });
    }
    assets.sort_by(|a, b| a.path.cmp(&b.path));
    AssetList { assets }
}
