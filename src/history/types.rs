// Render history DTOs shared by commands and DB helpers.
use super::*;

pub(super) const DATABASE_FILE_NAME: &str = "chart-video-forge-state.sqlite3";
pub(super) const HISTORY_LIMIT: usize = 200;
pub(super) static DB_BOOTSTRAP_STATE: OnceLock<Mutex<bool>> = OnceLock::new();

/// A finished job: either a downloaded background video or an adjusted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEntry {
    pub id: String,
    pub created_at_unix: i64,
    pub kind: String,
    pub source: String,
    pub output_path: String,
    pub format: String,
    pub trim_start: f64,
    pub pad_start: f64,
    pub with_audio: bool,
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewRenderEntry {
    pub(crate) kind: String,
    pub(crate) source: String,
    pub(crate) output_path: String,
    pub(crate) format: String,
    pub(crate) trim_start: f64,
    pub(crate) pad_start: f64,
    pub(crate) with_audio: bool,
    pub(crate) duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderHistoryPayload {
    pub entries: Vec<RenderEntry>,
}

pub(super) fn now_unix_millis() -> Result<i64, String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as i64)
        .map_err(|_| "System clock is before the Unix epoch.".to_string())
}
