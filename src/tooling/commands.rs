// Public Tauri commands exported to the frontend tooling API.
use super::*;
use crate::history;

#[tauri::command]
pub fn get_runtime_tools_settings(app: AppHandle) -> Result<RuntimeToolsSettings, String> {
    load_settings(&app)
}

#[tauri::command]
pub fn save_runtime_tools_settings(
    app: AppHandle,
    settings: RuntimeToolsSettings,
) -> Result<RuntimeToolsSettings, String> {
    save_settings_internal(&app, settings)
}

#[tauri::command]
pub fn get_runtime_tools_status(app: AppHandle) -> Result<RuntimeToolsStatus, String> {
    let settings = load_settings(&app)?;
    Ok(build_runtime_status(&app, settings))
}

#[tauri::command]
pub fn pick_song_folder() -> Result<Option<String>, String> {
    Ok(rfd::FileDialog::new()
        .pick_folder()
        .map(|path| path.to_string_lossy().to_string()))
}

#[tauri::command]
pub fn pick_local_video_file() -> Result<Option<String>, String> {
    Ok(rfd::FileDialog::new()
        .add_filter("WebM Video", &["webm"])
        .add_filter(
            "Video",
            &[
                "mp4", "mov", "mkv", "webm", "m4v", "avi", "wmv", "mpeg", "mpg",
            ],
        )
        .pick_file()
        .map(|path| path.to_string_lossy().to_string()))
}

#[tauri::command]
pub fn pick_cookies_file() -> Result<Option<String>, String> {
    Ok(rfd::FileDialog::new()
        .add_filter("Cookies", &["txt"])
        .pick_file()
        .map(|path| path.to_string_lossy().to_string()))
}

#[tauri::command]
pub fn open_songs_root_dir(app: AppHandle) -> Result<String, String> {
    let settings = load_settings(&app)?;
    let songs_root = resolve_songs_root_dir(&app, &settings)?;
    open_in_file_manager(&songs_root)?;
    Ok(songs_root.to_string_lossy().to_string())
}

#[tauri::command]
pub fn open_path_in_file_manager(app: AppHandle, path: String) -> Result<String, String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("Path is missing.".to_string());
    }
    if trimmed.len() > 1024 {
        return Err("Path is too long.".to_string());
    }

    let candidate = PathBuf::from(trimmed);
    let target = if candidate.is_file() {
        candidate
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| "Failed to resolve file directory.".to_string())?
    } else {
        candidate
    };

    if !target.exists() {
        return Err("Specified path does not exist.".to_string());
    }
    let target = canonicalize_existing_path(&target)?;

    let settings = load_settings(&app)?;
    let songs_root = resolve_songs_root_dir(&app, &settings)?;
    let allowed_roots = [
        canonicalize_existing_path(&songs_root)?,
        canonicalize_existing_path(&app_data_dir(&app)?)?,
        canonicalize_existing_path(&app_config_dir(&app)?)?,
    ];

    // Song folders live wherever the user's game keeps them, so folders of
    // recorded outputs are allowed alongside the fixed roots.
    let allowed = allowed_roots.iter().any(|root| target.starts_with(root))
        || history::is_recorded_output_dir(&app, &target).unwrap_or(false);
    if !allowed {
        return Err(
            "Opening arbitrary paths is not allowed. Only song/app directories are allowed."
                .to_string(),
        );
    }

    open_in_file_manager(&target)?;
    Ok(target.to_string_lossy().to_string())
}

#[tauri::command]
pub async fn probe_local_media(app: AppHandle, path: String) -> Result<Option<f64>, String> {
    tauri::async_runtime::spawn_blocking(move || {
        let settings = load_settings(&app)?;
        let ffprobe = resolve_ffprobe_binary(&app, &settings)
            .map(|(binary, _)| binary)
            .ok_or_else(|| "FFprobe was not found. Install it in Settings.".to_string())?;
        let media_path = PathBuf::from(path.trim());
        if !media_path.exists() || !media_path.is_file() {
            return Err("Media file was not found.".to_string());
        }
        Ok(probe_media_duration_seconds(&ffprobe, &media_path))
    })
    .await
    .map_err(|error| format!("Probe background task failed: {error}"))?
}

#[tauri::command]
pub async fn install_or_update_managed_ytdlp(app: AppHandle) -> Result<ToolStatus, String> {
    let app_for_task = app.clone();
    tauri::async_runtime::spawn_blocking(move || install_managed_ytdlp_sync(app_for_task))
        .await
        .map_err(|error| format!("yt-dlp background task failed: {error}"))?
        .inspect_err(|error| {
            emit_job_progress(&app, "ytdlp", "error", error, None);
        })
}

#[tauri::command]
pub async fn install_or_update_managed_ffmpeg(
    app: AppHandle,
) -> Result<RuntimeToolsStatus, String> {
    let app_for_task = app.clone();
    tauri::async_runtime::spawn_blocking(move || install_managed_ffmpeg_sync(app_for_task))
        .await
        .map_err(|error| format!("FFmpeg background task failed: {error}"))?
        .inspect_err(|error| {
            emit_job_progress(&app, "ffmpeg", "error", error, None);
        })
}

#[tauri::command]
pub async fn produce_background_video(
    app: AppHandle,
    request: ProduceVideoRequest,
) -> Result<ProducedVideoResult, String> {
    let task_key = job_task_key(request.task_id.clone(), "video-produce");
    let app_for_task = app.clone();
    tauri::async_runtime::spawn_blocking(move || {
        produce_background_video_sync(app_for_task, request)
    })
    .await
    .map_err(|error| format!("Background video task failed: {error}"))?
    .inspect_err(|error| {
        emit_job_progress_with_detail(
            &app,
            &task_key,
            "error",
            "Background video job failed.",
            Some(error.clone()),
            None,
        );
    })
}

#[tauri::command]
pub async fn adjust_background_video(
    app: AppHandle,
    request: AdjustVideoRequest,
) -> Result<ProducedVideoResult, String> {
    let task_key = job_task_key(request.task_id.clone(), "video-adjust");
    let app_for_task = app.clone();
    tauri::async_runtime::spawn_blocking(move || {
        adjust_background_video_sync(app_for_task, request)
    })
    .await
    .map_err(|error| format!("Video adjust task failed: {error}"))?
    .inspect_err(|error| {
        emit_job_progress_with_detail(
            &app,
            &task_key,
            "error",
            "Video adjust failed.",
            Some(error.clone()),
            None,
        );
    })
}
