//! Education session lifecycle and the QR handoff.
//!
//! Starting a session creates an education-history record and issues the two
//! signed handoff tokens: one that lets a mobile browser play the course, one
//! that lets attendees submit verification records. The tokens travel inside
//! URLs rendered as QR codes by the desktop client; a numeric fallback code
//! covers devices that cannot scan.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::courses::load_accessible;
use crate::error::ApiError;
use crate::models::{
    Attendee, EducationHistory, HistoryDetail, HistorySummary, StartSessionReq, StartSessionResp,
};
use crate::state::AppState;
use crate::token::{self, TokenType};

/// Query-string charset: everything a JWT may contain is kept literal,
/// the rest is escaped.
const QUERY_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b'?');

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/:history_id/finish", post(finish_session))
        .route("/api/histories", get(list_histories))
        .route("/api/histories/:history_id", get(get_history))
}

async fn start_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<StartSessionReq>,
) -> Result<Json<StartSessionResp>, ApiError> {
    let (course, _) = load_accessible(&state.db, req.course_id, &user).await?;
    let language = req.language.unwrap_or_else(|| course.language.clone());

    let history = sqlx::query_as::<_, EducationHistory>(
        r#"
        INSERT INTO education_histories (id, course_id, started_by, language)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course.id)
    .bind(user.id)
    .bind(&language)
    .fetch_one(&state.db)
    .await?;

    let session_id = Uuid::new_v4().to_string();
    let learn = state.handoff.issue(
        TokenType::MobileLearn,
        &session_id,
        course.id,
        Some(history.id),
        Some(&language),
        state.config.learn_ttl_minutes,
    )?;
    let verify = state.handoff.issue(
        TokenType::AttendanceVerify,
        &session_id,
        course.id,
        Some(history.id),
        Some(&language),
        state.config.verify_ttl_minutes,
    )?;

    let verify_code = state
        .codes
        .put(&verify.token, (state.config.verify_ttl_minutes * 60) as u64)
        .await?;

    tracing::info!(
        course_id = %course.id,
        history_id = %history.id,
        learn_token = %token::fingerprint(&learn.token),
        verify_token = %token::fingerprint(&verify.token),
        "education session started"
    );

    Ok(Json(StartSessionResp {
        learn_url: handoff_url(&state.config.app_url, "mobile/learn", &learn.token),
        verify_url: handoff_url(&state.config.app_url, "mobile/verify", &verify.token),
        verify_code,
        learn_expires_at_ms: learn.expires_at_ms(),
        verify_expires_at_ms: verify.expires_at_ms(),
        history,
    }))
}

async fn finish_session(
    State(state): State<AppState>,
    Path(history_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<EducationHistory>, ApiError> {
    let history = sqlx::query_as::<_, EducationHistory>(
        "SELECT * FROM education_histories WHERE id = $1",
    )
    .bind(history_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("history"))?;

    // Only the session starter or the course owner may close it.
    let (course, is_owner) = load_accessible(&state.db, history.course_id, &user).await?;
    if history.started_by != user.id && !is_owner {
        return Err(ApiError::Forbidden);
    }

    let updated = sqlx::query_as::<_, EducationHistory>(
        r#"
        UPDATE education_histories
        SET status = 'completed', finished_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(history_id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(history_id = %history_id, course_id = %course.id, "session finished");
    Ok(Json(updated))
}

async fn list_histories(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
    let rows = if user.role.is_admin() {
        sqlx::query_as::<_, HistorySummary>(
            r#"
            SELECT h.*,
                   (SELECT count(*) FROM attendees a WHERE a.history_id = h.id) AS total_attendees
            FROM education_histories h
            ORDER BY h.started_at DESC
            "#,
        )
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, HistorySummary>(
            r#"
            SELECT h.*,
                   (SELECT count(*) FROM attendees a WHERE a.history_id = h.id) AS total_attendees
            FROM education_histories h
            JOIN courses c ON c.id = h.course_id
            WHERE c.owner_id = $1
               OR EXISTS (SELECT 1 FROM course_shares s WHERE s.course_id = c.id AND s.user_id = $1)
            ORDER BY h.started_at DESC
            "#,
        )
        .bind(user.id)
        .fetch_all(&state.db)
        .await?
    };
    Ok(Json(rows))
}

async fn get_history(
    State(state): State<AppState>,
    Path(history_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<HistoryDetail>, ApiError> {
    let history = sqlx::query_as::<_, EducationHistory>(
        "SELECT * FROM education_histories WHERE id = $1",
    )
    .bind(history_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("history"))?;

    load_accessible(&state.db, history.course_id, &user).await?;

    let attendees = sqlx::query_as::<_, Attendee>(
        "SELECT * FROM attendees WHERE history_id = $1 ORDER BY created_at",
    )
    .bind(history_id)
    .fetch_all(&state.db)
    .await?;

    let tally: Vec<(String, i64)> = sqlx::query_as(
        "SELECT nationality, count(*) FROM attendees WHERE history_id = $1 GROUP BY nationality",
    )
    .bind(history_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(HistoryDetail {
        history,
        total_attendees: attendees.len() as i64,
        by_nationality: tally.into_iter().collect(),
        attendees,
    }))
}

fn handoff_url(app_url: &str, path: &str, token: &str) -> String {
    format!(
        "{}/{}?token={}",
        app_url.trim_end_matches('/'),
        path,
        utf8_percent_encode(token, QUERY_ENCODE)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_url_shape() {
        let url = handoff_url("https://edu.example.com/", "mobile/learn", "abc.def.ghi");
        assert_eq!(
            url,
            "https://edu.example.com/mobile/learn?token=abc.def.ghi"
        );
    }

    #[test]
    fn handoff_url_escapes_reserved_chars() {
        let url = handoff_url("https://edu.example.com", "mobile/verify", "a+b=c");
        assert_eq!(
            url,
            "https://edu.example.com/mobile/verify?token=a%2Bb%3Dc"
        );
    }
}
