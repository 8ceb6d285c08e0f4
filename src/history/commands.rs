// Public Tauri commands for the render history panel.
use super::*;

#[tauri::command]
pub fn get_render_history(app: AppHandle) -> Result<RenderHistoryPayload, String> {
    let connection = open_database(&app)?;
    let entries = load_entries(&connection, HISTORY_LIMIT)?;
    Ok(RenderHistoryPayload { entries })
}

#[tauri::command]
pub fn delete_render_entry(app: AppHandle, entry_id: String) -> Result<bool, String> {
    let trimmed = entry_id.trim();
    if trimmed.is_empty() {
        return Err("Render entry id is missing.".to_string());
    }
    let connection = open_database(&app)?;
    delete_entry(&connection, trimmed)
}

#[tauri::command]
pub fn clear_render_history(app: AppHandle) -> Result<u32, String> {
    let connection = open_database(&app)?;
    clear_entries(&connection)
}

/// Called by the job pipeline once an output file is in place.
pub(crate) fn record_render(app: &AppHandle, entry: NewRenderEntry) -> Result<(), String> {
    let kind = validate_kind(&entry.kind)?;
    let now = now_unix_millis()?;
    let record = RenderEntry {
        id: format!("r_{now}"),
        created_at_unix: now,
        kind,
        source: entry.source,
        output_path: entry.output_path,
        format: entry.format,
        trim_start: entry.trim_start,
        pad_start: entry.pad_start,
        with_audio: entry.with_audio,
        duration_seconds: entry.duration_seconds,
    };
    let connection = open_database(app)?;
    insert_entry(&connection, &record)
}

/// Whether a directory holds at least one recorded output. Lets the
/// file-manager command open song folders outside the fixed app roots.
pub(crate) fn is_recorded_output_dir(app: &AppHandle, target_dir: &Path) -> Result<bool, String> {
    let connection = open_database(app)?;
    output_dir_is_recorded(&connection, target_dir)
}
