use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use sqlx::types::Json;
use uuid::Uuid;

use crate::graph::CourseGraph;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub language: String,
    pub graph: Json<CourseGraph>,
    pub total_duration_secs: i32,
    pub base_path: String, // relative to DATA_DIR, e.g. "courses/<uuid>"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One execution of a course; attendee records hang off it.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct EducationHistory {
    pub id: Uuid,
    pub course_id: Uuid,
    pub started_by: Uuid,
    pub language: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Attendee {
    pub id: Uuid,
    pub history_id: Uuid,
    pub name: String,
    pub nationality: String,
    pub language: Option<String>,
    pub selfie_url: String,
    pub signature_url: String,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub device_type: Option<String>,
    pub consent_given: bool,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// --- auth ---

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterReq {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct LoginResp {
    pub token: String,
    pub expires_at_ms: i64,
}

// --- courses ---

#[derive(Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    pub language: Option<String>,
    pub graph: CourseGraph,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpdateCourseReq {
    pub title: Option<String>,
    pub language: Option<String>,
    pub graph: Option<CourseGraph>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ShareReq {
    pub email: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TranslateCourseReq {
    pub language: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct SubtitleUploadResp {
    pub format: &'static str,
    pub cues: usize,
    /// Relative href usable as a node's `subtitle_href`.
    pub href: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct AssetList {
    pub assets: Vec<AssetEntry>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AssetEntry {
    pub path: String,
    pub content_url: String,
}

// --- sessions / handoff ---

#[derive(Deserialize, Debug, Clone)]
pub struct StartSessionReq {
    pub course_id: Uuid,
    pub language: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct StartSessionResp {
    pub history: EducationHistory,
    /// `{app_url}/mobile/learn?token=...` for the playback QR.
    pub learn_url: String,
    /// `{app_url}/mobile/verify?token=...` for the verification QR.
    pub verify_url: String,
    /// Numeric fallback code for devices that cannot scan.
    pub verify_code: String,
    pub learn_expires_at_ms: i64,
    pub verify_expires_at_ms: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct HistorySummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub history: EducationHistory,
    pub total_attendees: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct HistoryDetail {
    #[serde(flatten)]
    pub history: EducationHistory,
    pub total_attendees: i64,
    pub by_nationality: HashMap<String, i64>,
    pub attendees: Vec<Attendee>,
}

// --- mobile ---

#[derive(Deserialize, Debug)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct PlaybackStep {
    pub id: String,
    pub kind: crate::graph::NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i32>,
}

#[derive(Serialize, Debug, Clone)]
pub struct MobileLearnResp {
    pub course_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<Uuid>,
    pub title: String,
    pub language: String,
    pub total_duration_secs: i32,
    pub steps: Vec<PlaybackStep>,
}

#[derive(Serialize, Debug, Clone)]
pub struct MobileVerifyResp {
    pub history_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub language: String,
}

/// Attendee submission from an unauthenticated mobile client. Field names
/// follow the mobile wire format; `completedAt` is epoch milliseconds.
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttendeeReq {
    pub token: String,
    #[serde(default)]
    pub history_id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub selfie_url: String,
    #[serde(default)]
    pub signature_url: String,
    #[serde(default)]
    pub gps_lat: Option<f64>,
    #[serde(default)]
    pub gps_lon: Option<f64>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde_as(as = "Option<TimestampMilliSeconds>")]
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AttendeeAccepted {
    pub attendee_id: Uuid,
    pub total_attendees: i64,
}

#[derive(Deserialize, Debug)]
pub struct ExchangeCodeReq {
    pub code: String,
}

#[derive(Serialize, Debug)]
pub struct ExchangeCodeResp {
    pub token: String,
}
