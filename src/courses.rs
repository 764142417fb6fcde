//! Course authoring: CRUD, sharing, subtitles, translation.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::{
    Course, CreateCourseReq, ShareReq, SubtitleUploadResp, TranslateCourseReq, UpdateCourseReq,
    User,
};
use crate::state::AppState;
use crate::subtitle::{self, SubtitleFormat};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/courses", post(create_course).get(list_courses))
        .route(
            "/api/courses/:course_id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/api/courses/:course_id/share", post(share_course))
        .route(
            "/api/courses/:course_id/share/:user_id",
            delete(unshare_course),
        )
        .route("/api/courses/:course_id/subtitles", post(upload_subtitle))
        .route("/api/courses/:course_id/translate", post(translate_course))
        .route("/api/subtitles/convert", post(convert_subtitle))
}

/// Fetch a course the caller may read. Returns the course and whether the
/// caller owns it. Courses are editable by their owner only.
pub(crate) async fn load_accessible(
    db: &Db,
    course_id: Uuid,
    user: &CurrentUser,
) -> Result<(Course, bool), ApiError> {
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("course"))?;

    let is_owner = course.owner_id == user.id;
    if is_owner || user.role.is_admin() {
        return Ok((course, is_owner));
    }

    let shared: Option<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM course_shares WHERE course_id = $1 AND user_id = $2",
    )
    .bind(course_id)
    .bind(user.id)
    .fetch_optional(db)
    .await?;
    if shared.is_none() {
        return Err(ApiError::Forbidden);
    }
    Ok((course, false))
}

async fn create_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateCourseReq>,
) -> Result<Json<Course>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    req.graph.validate()?;
    let total = req.graph.total_duration_secs();

    let course_id = Uuid::new_v4();
    let base_path = format!("courses/{course_id}");
    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (id, owner_id, title, language, graph, total_duration_secs, base_path)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(user.id)
    .bind(req.title.trim())
    .bind(req.language.as_deref().unwrap_or("en"))
    .bind(sqlx::types::Json(&req.graph))
    .bind(total)
    .bind(&base_path)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(course_id = %course.id, owner = %user.id, "course created");
    Ok(Json(course))
}

async fn list_courses(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Course>>, ApiError> {
    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT c.* FROM courses c
        WHERE c.owner_id = $1
           OR EXISTS (SELECT 1 FROM course_shares s WHERE s.course_id = c.id AND s.user_id = $1)
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<Course>, ApiError> {
    let (course, _) = load_accessible(&state.db, course_id, &user).await?;
    Ok(Json(course))
}

async fn update_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
    Json(req): Json<UpdateCourseReq>,
) -> Result<Json<Course>, ApiError> {
    let (course, is_owner) = load_accessible(&state.db, course_id, &user).await?;
    if !is_owner {
        return Err(ApiError::Forbidden);
    }

    let title = match req.title {
        Some(t) if t.trim().is_empty() => {
            return Err(ApiError::bad_request("title is required"));
        }
        Some(t) => t.trim().to_string(),
        None => course.title,
    };
    let language = req.language.unwrap_or(course.language);
    let (graph, total) = match req.graph {
        Some(graph) => {
            graph.validate()?;
            let total = graph.total_duration_secs();
            (graph, total)
        }
        None => (course.graph.0, course.total_duration_secs),
    };

    let updated = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses
        SET title = $2, language = $3, graph = $4, total_duration_secs = $5, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(&title)
    .bind(&language)
    .bind(sqlx::types::Json(&graph))
    .bind(total)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (course, is_owner) = load_accessible(&state.db, course_id, &user).await?;
    if !is_owner {
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(course_id)
        .execute(&state.db)
        .await?;

    // Content files are best-effort cleanup.
    let dir = std::path::Path::new(&state.config.data_dir).join(&course.base_path);
    let _ = tokio::fs::remove_dir_all(dir).await;

    tracing::info!(course_id = %course_id, "course deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn share_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
    Json(req): Json<ShareReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, is_owner) = load_accessible(&state.db, course_id, &user).await?;
    if !is_owner {
        return Err(ApiError::Forbidden);
    }

    let email = req.email.trim().to_lowercase();
    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if target.id == user.id {
        return Err(ApiError::bad_request("course is already owned by this user"));
    }

    sqlx::query(
        "INSERT INTO course_shares (course_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(course_id)
    .bind(target.id)
    .execute(&state.db)
    .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn unshare_course(
    State(state): State<AppState>,
    Path((course_id, user_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, is_owner) = load_accessible(&state.db, course_id, &user).await?;
    if !is_owner {
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM course_shares WHERE course_id = $1 AND user_id = $2")
        .bind(course_id)
        .bind(user_id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn upload_subtitle(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
    mut mp: Multipart,
) -> Result<Json<SubtitleUploadResp>, ApiError> {
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
    let text = String::from_utf8(bytes)
        .map_err(|_| ApiError::bad_request("subtitle file is not valid UTF-8"))?;

    // Format is decided by content, never by the uploaded name.
    let (format, cues) = subtitle::parse(&text)?;

    let name = match file_name.as_deref() {
        Some(name) => sanitize_file_name(name)?,
        None => format!("subtitles.{}", format.as_str()),
    };
    let rel = format!("subtitles/{name}");
    let dir = std::path::Path::new(&state.config.data_dir)
        .join(&course.base_path)
        .join("subtitles");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    tokio::fs::write(dir.join(&name), text.as_bytes())
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(SubtitleUploadResp {
        format: format.as_str(),
        cues: cues.len(),
        href: rel,
    }))
}

#[derive(Deserialize)]
pub(crate) struct ConvertQuery {
    to: String,
}

async fn convert_subtitle(
    Query(query): Query<ConvertQuery>,
    _user: CurrentUser,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let target = match query.to.as_str() {
        "srt" => SubtitleFormat::Srt,
        "vtt" => SubtitleFormat::Vtt,
        other => {
            return Err(ApiError::bad_request(format!(
                "unsupported target format `{other}`"
            )));
        }
    };
    let converted = subtitle::convert(&body, target)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        converted,
    ))
}

async fn translate_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    user: CurrentUser,
    Json(req): Json<TranslateCourseReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (course, _) = load_accessible(&state.db, course_id, &user).await?;
    let translator = state
        .translator
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("translation is not configured"))?;

    let mut graph = course.graph.0;
    let texts: Vec<String> = graph.nodes.iter().filter_map(|n| n.title.clone()).collect();
    let translated = translator.translate(&texts, &req.language).await?;

    let mut it = translated.into_iter();
    for node in graph.nodes.iter_mut() {
        if node.title.is_some() {
            node.title = it.next();
        }
    }

    Ok(Json(serde_json::json!({
        "language": req.language,
        "graph": graph,
    })))
}

pub(crate) fn sanitize_file_name(name: &str) -> Result<String, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(ApiError::bad_request("invalid file name"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_cannot_escape_the_course_dir() {
        assert!(sanitize_file_name("intro.vtt").is_ok());
        assert!(sanitize_file_name("Safety Briefing.srt").is_ok());
        assert!(sanitize_file_name("../../etc/passwd").is_err());
        assert!(sanitize_file_name("nested/path.vtt").is_err());
        assert!(sanitize_file_name(".hidden").is_err());
        assert!(sanitize_file_name("").is_err());
    }
}
