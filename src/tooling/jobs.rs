// Synchronous job flows behind the produce/adjust commands.
use super::*;
use crate::history;

pub(super) fn job_task_key(task_id: Option<String>, fallback: &str) -> String {
    sanitize_optional_path(task_id)
        .ok()
        .flatten()
        .unwrap_or_else(|| fallback.to_string())
}

fn record_completed_render(app: &AppHandle, task: &str, entry: history::NewRenderEntry) {
    if let Err(error) = history::record_render(app, entry) {
        log::warn!("failed to record render history entry: {error}");
        emit_job_log(app, task, &format!("[worker] History entry skipped: {error}"));
    }
}

fn probe_final_duration(
    app: &AppHandle,
    settings: &RuntimeToolsSettings,
    output_path: &Path,
) -> Option<u32> {
    let ffprobe = resolve_ffprobe_binary(app, settings).map(|(path, _)| path)?;
    probe_media_duration_seconds(&ffprobe, output_path)
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(|value| value.round() as u32)
}

pub(super) fn produce_background_video_sync(
    app: AppHandle,
    request: ProduceVideoRequest,
) -> Result<ProducedVideoResult, String> {
    let settings = load_settings(&app)?;
    let task = job_task_key(request.task_id.clone(), "video-produce");

    let url = validate_download_url(&request.url)?.to_string();
    let format = validate_output_format(&request.format)?;
    let (trim_start, pad_start) = validate_trim_pad(request.trim_start, request.pad_start)?;
    let embed_audio = request.embed_audio.unwrap_or(false);
    // MP4 output always carries audio; WebM only when the user asked for it.
    let include_audio = embed_audio || format == "mp4";

    let song_folder_raw = request.song_folder.trim();
    if song_folder_raw.is_empty() {
        return Err("Pick a song folder first.".to_string());
    }
    let song_folder = PathBuf::from(song_folder_raw);
    fs::create_dir_all(&song_folder)
        .map_err(|error| format!("Failed to create song folder: {error}"))?;
    let song_folder = canonicalize_existing_path(&song_folder)?;
    let output_name = normalize_output_name(&request.output_name, &format);
    let output_path = song_folder.join(&output_name);

    let ytdlp_path = resolve_ytdlp_binary(&app, &settings)
        .map(|(path, _)| path)
        .ok_or_else(|| "yt-dlp was not found. Install it in Settings.".to_string())?;
    let ffmpeg_path = resolve_ffmpeg_binary(&app, &settings).map(|(path, _)| path);
    let ffprobe_path = resolve_ffprobe_binary(&app, &settings).map(|(path, _)| path);
    let needs_ffmpeg = format == "webm" || trim_start > 0.0 || pad_start > 0.0;
    if needs_ffmpeg && ffmpeg_path.is_none() {
        return Err("FFmpeg was not found. Install it or configure path in Settings.".to_string());
    }

    emit_job_progress_with_detail(
        &app,
        &task,
        "progress",
        "Preparing background video job...",
        Some(url.clone()),
        Some(0.02),
    );

    let stamp = unix_timestamp()?;
    let temp_dir = std::env::temp_dir();
    let temp_stem = format!("forge-{stamp}");
    let temp_template = temp_dir.join(format!("{temp_stem}.mkv"));
    emit_job_log(
        &app,
        &task,
        &format!("[worker] Temp template: {}", temp_template.display()),
    );

    let cookies_file = resolve_cookies_file(&settings);
    let ffmpeg_location = ffmpeg_path
        .as_ref()
        .and_then(|path| path.parent().map(|parent| parent.to_path_buf()));

    download_media(
        &app,
        MediaDownloadJob {
            ytdlp_binary: &ytdlp_path,
            url: &url,
            output_template: &temp_template,
            include_audio,
            cookies_file: cookies_file.as_deref(),
            ffmpeg_location: ffmpeg_location.as_deref(),
            task: &task,
        },
    )?;

    // The downloader may have picked another container than the template asked for.
    let input_file = if temp_template.exists() {
        temp_template.clone()
    } else {
        let resolved = find_download_artifact(&temp_dir, &temp_stem).ok_or_else(|| {
            format!("Download file not found: {}", temp_template.display())
        })?;
        emit_job_log(
            &app,
            &task,
            &format!("[worker] Using downloaded file: {}", resolved.display()),
        );
        resolved
    };

    let encode_job = EncodeJob {
        ffmpeg_binary: ffmpeg_path.as_deref().unwrap_or(Path::new("ffmpeg")),
        ffprobe_binary: ffprobe_path.as_deref(),
        input_path: &input_file,
        output_path: &output_path,
        trim_start,
        pad_start,
        with_audio: embed_audio,
        task: &task,
    };
    let encode_result = if format == "webm" {
        convert_to_background_webm(&app, &encode_job)
    } else {
        convert_to_mp4(&app, &encode_job)
    };

    // The MP4 fast path moves the temp file; anything left over goes away.
    if input_file.exists() {
        match fs::remove_file(&input_file) {
            Ok(_) => emit_job_log(
                &app,
                &task,
                &format!("[worker] Deleted temp file: {}", input_file.display()),
            ),
            Err(error) => emit_job_log(
                &app,
                &task,
                &format!("[worker] Failed to delete temp file: {error}"),
            ),
        }
    }

    encode_result?;

    let duration_seconds = probe_final_duration(&app, &settings, &output_path);
    record_completed_render(
        &app,
        &task,
        history::NewRenderEntry {
            kind: "download".to_string(),
            source: url.clone(),
            output_path: output_path.to_string_lossy().to_string(),
            format: format.clone(),
            trim_start,
            pad_start,
            with_audio: include_audio,
            duration_seconds,
        },
    );

    emit_job_progress_with_detail(
        &app,
        &task,
        "success",
        &format!("Saved to: {}", output_path.display()),
        Some(output_path.to_string_lossy().to_string()),
        Some(1.0),
    );

    Ok(ProducedVideoResult {
        output_path: output_path.to_string_lossy().to_string(),
        source: url,
        format,
        duration_seconds,
    })
}

pub(super) fn adjust_background_video_sync(
    app: AppHandle,
    request: AdjustVideoRequest,
) -> Result<ProducedVideoResult, String> {
    let settings = load_settings(&app)?;
    let task = job_task_key(request.task_id.clone(), "video-adjust");

    let (trim_start, pad_start) = validate_trim_pad(request.trim_start, request.pad_start)?;
    let keep_audio = request.keep_audio.unwrap_or(false);

    let input_raw = request.input_path.trim();
    if input_raw.is_empty() {
        return Err("Pick an input video file first.".to_string());
    }
    let input_path = PathBuf::from(input_raw);
    if !input_path.exists() || !input_path.is_file() {
        return Err("Input video file was not found.".to_string());
    }
    if !is_allowed_video_file(&input_path) {
        return Err("Unsupported input video format.".to_string());
    }

    let output_path = match sanitize_optional_path(request.output_path)? {
        Some(raw) => {
            let candidate = PathBuf::from(raw);
            let is_webm = candidate
                .extension()
                .and_then(|value| value.to_str())
                .map(|value| value.eq_ignore_ascii_case("webm"))
                .unwrap_or(false);
            if is_webm {
                candidate
            } else {
                candidate.with_extension("webm")
            }
        }
        None => input_path.clone(),
    };

    let ffmpeg_path = resolve_ffmpeg_binary(&app, &settings)
        .map(|(path, _)| path)
        .ok_or_else(|| {
            "FFmpeg was not found. Install it or configure path in Settings.".to_string()
        })?;
    let ffprobe_path = resolve_ffprobe_binary(&app, &settings).map(|(path, _)| path);

    emit_job_progress_with_detail(
        &app,
        &task,
        "progress",
        "Adjusting video...",
        Some(input_path.to_string_lossy().to_string()),
        Some(0.02),
    );

    let encode_job = EncodeJob {
        ffmpeg_binary: &ffmpeg_path,
        ffprobe_binary: ffprobe_path.as_deref(),
        input_path: &input_path,
        output_path: &output_path,
        trim_start,
        pad_start,
        with_audio: keep_audio,
        task: &task,
    };
    adjust_existing_webm(&app, &encode_job)?;

    let final_path = if output_path.exists() {
        output_path.clone()
    } else {
        input_path.clone()
    };
    let duration_seconds = probe_final_duration(&app, &settings, &final_path);
    record_completed_render(
        &app,
        &task,
        history::NewRenderEntry {
            kind: "adjust".to_string(),
            source: input_path.to_string_lossy().to_string(),
            output_path: final_path.to_string_lossy().to_string(),
            format: "webm".to_string(),
            trim_start,
            pad_start,
            with_audio: keep_audio,
            duration_seconds,
        },
    );

    emit_job_progress_with_detail(
        &app,
        &task,
        "success",
        &format!("Saved to: {}", final_path.display()),
        Some(final_path.to_string_lossy().to_string()),
        Some(1.0),
    );

    Ok(ProducedVideoResult {
        output_path: final_path.to_string_lossy().to_string(),
        source: input_path.to_string_lossy().to_string(),
        format: "webm".to_string(),
        duration_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_prefers_the_sanitized_request_id() {
        assert_eq!(
            job_task_key(Some(" video-produce:42 ".to_string()), "video-produce"),
            "video-produce:42"
        );
        assert_eq!(job_task_key(Some("  ".to_string()), "video-produce"), "video-produce");
        assert_eq!(job_task_key(None, "video-adjust"), "video-adjust");
    }
}
