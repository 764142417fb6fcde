//! Token-gated endpoints for the visitor's mobile browser.
//!
//! Nothing here uses account auth: access is granted by a signed handoff
//! token alone. The token's `type` is checked against the action before
//! anything else happens.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AttendeeAccepted, Course, EducationHistory, ExchangeCodeReq, ExchangeCodeResp, MobileLearnResp,
    MobileVerifyResp, PlaybackStep, SubmitAttendeeReq, TokenQuery,
};
use crate::state::AppState;
use crate::token::{self, HandoffClaims};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mobile/learn", get(mobile_learn))
        .route("/mobile/verify", get(mobile_verify))
        .route("/mobile/verify/attendees", post(submit_attendee))
        .route("/mobile/exchange-code", post(exchange_code))
}

async fn mobile_learn(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<MobileLearnResp>, ApiError> {
    let claims = state.handoff.verify(&query.token)?;
    if !claims.token_type.grants_playback() {
        return Err(ApiError::Forbidden);
    }

    let course = load_course(&state, claims.course_id).await?;
    let steps = playback_steps(&course)?;
    let language = claims
        .language
        .clone()
        .unwrap_or_else(|| course.language.clone());

    tracing::info!(
        course_id = %course.id,
        token = %token::fingerprint(&query.token),
        "mobile playback handoff"
    );

    Ok(Json(MobileLearnResp {
        course_id: course.id,
        history_id: claims.history_id,
        title: course.title,
        language,
        total_duration_secs: course.total_duration_secs,
        steps,
    }))
}

async fn mobile_verify(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<MobileVerifyResp>, ApiError> {
    let claims = state.handoff.verify(&query.token)?;
    if !claims.token_type.grants_submission() {
        return Err(ApiError::Forbidden);
    }
    let history_id = history_id_of(&claims)?;

    let history = load_history(&state, history_id).await?;
    let course = load_course(&state, history.course_id).await?;

    Ok(Json(MobileVerifyResp {
        history_id: history.id,
        course_id: course.id,
        course_title: course.title,
        language: history.language,
    }))
}

async fn submit_attendee(
    State(state): State<AppState>,
    Json(req): Json<SubmitAttendeeReq>,
) -> Result<Json<AttendeeAccepted>, ApiError> {
    let claims = state.handoff.verify(&req.token)?;
    if !claims.token_type.grants_submission() {
        return Err(ApiError::Forbidden);
    }
    let history_id = history_id_of(&claims)?;
    if let Some(body_history) = req.history_id {
        if body_history != history_id {
            return Err(ApiError::bad_request("historyId does not match the token"));
        }
    }

    let missing = missing_fields(&req);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    if !req.consent_given {
        return Err(ApiError::bad_request("consent is required"));
    }

    let history = load_history(&state, history_id).await?;

    // One atomic insert per attendee; concurrent submissions to the same
    // history cannot overwrite each other.
    let attendee_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO attendees
            (id, history_id, name, nationality, language, selfie_url, signature_url,
             gps_lat, gps_lon, device_type, consent_given, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(attendee_id)
    .bind(history.id)
    .bind(req.name.trim())
    .bind(req.nationality.trim())
    .bind(&req.language)
    .bind(req.selfie_url.trim())
    .bind(req.signature_url.trim())
    .bind(req.gps_lat)
    .bind(req.gps_lon)
    .bind(&req.device_type)
    .bind(req.consent_given)
    .bind(req.completed_at.unwrap_or_else(Utc::now))
    .execute(&state.db)
    .await?;

    let total_attendees: i64 =
        sqlx::query_scalar("SELECT count(*) FROM attendees WHERE history_id = $1")
            .bind(history.id)
            .fetch_one(&state.db)
            .await?;

    tracing::info!(
        history_id = %history.id,
        attendee_id = %attendee_id,
        token = %token::fingerprint(&req.token),
        "attendee verification recorded"
    );

    Ok(Json(AttendeeAccepted {
        attendee_id,
        total_attendees,
    }))
}

async fn exchange_code(
    State(state): State<AppState>,
    Json(req): Json<ExchangeCodeReq>,
) -> Result<Json<ExchangeCodeResp>, ApiError> {
    let token = state
        .codes
        .take(req.code.trim())
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid or expired code"))?;
    Ok(Json(ExchangeCodeResp { token }))
}

fn history_id_of(claims: &HandoffClaims) -> Result<Uuid, ApiError> {
    claims
        .history_id
        .ok_or_else(|| ApiError::bad_request("token carries no history"))
}

async fn load_course(state: &AppState, course_id: Uuid) -> Result<Course, ApiError> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("course"))
}

async fn load_history(state: &AppState, history_id: Uuid) -> Result<EducationHistory, ApiError> {
    sqlx::query_as::<_, EducationHistory>("SELECT * FROM education_histories WHERE id = $1")
        .bind(history_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("history"))
}

fn playback_steps(course: &Course) -> Result<Vec<PlaybackStep>, ApiError> {
    let order = course
        .graph
        .0
        .sequence()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored course graph is invalid: {e}")))?;
    let base = &course.base_path;
    Ok(order
        .into_iter()
        .map(|node| PlaybackStep {
            id: node.id.clone(),
            kind: node.kind,
            title: node.title.clone(),
            content_url: node
                .media_href
                .as_deref()
                .map(|href| format!("/content/{base}/{href}")),
            subtitle_url: node
                .subtitle_href
                .as_deref()
                .map(|href| format!("/content/{base}/{href}")),
            duration_secs: node.duration_secs,
        })
        .collect())
}

/// Required-field check; names reported in the mobile wire format.
fn missing_fields(req: &SubmitAttendeeReq) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if req.name.trim().is_empty() {
        missing.push("name");
    }
    if req.nationality.trim().is_empty() {
        missing.push("nationality");
    }
    if req.selfie_url.trim().is_empty() {
        missing.push("selfieUrl");
    }
    if req.signature_url.trim().is_empty() {
        missing.push("signatureUrl");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> SubmitAttendeeReq {
        SubmitAttendeeReq {
            token: "t".into(),
            history_id: None,
            name: "Kim Minsu".into(),
            nationality: "KR".into(),
            language: Some("ko".into()),
            selfie_url: "https://cdn.example.com/selfie.jpg".into(),
            signature_url: "https://cdn.example.com/sig.png".into(),
            gps_lat: Some(37.5665),
            gps_lon: Some(126.978),
            device_type: Some("mobile".into()),
            consent_given: true,
            completed_at: None,
        }
    }

    #[test]
    fn complete_submission_has_no_missing_fields() {
        assert!(missing_fields(&submission()).is_empty());
    }

    #[test]
    fn blank_required_fields_are_reported_by_wire_name() {
        let mut req = submission();
        req.name = "  ".into();
        req.selfie_url = String::new();
        assert_eq!(missing_fields(&req), ["name", "selfieUrl"]);
    }

    #[test]
    fn nationality_and_signature_are_required() {
        let mut req = submission();
        req.nationality = String::new();
        req.signature_url = String::new();
        assert_eq!(missing_fields(&req), ["nationality", "signatureUrl"]);
    }
}
