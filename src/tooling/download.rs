// yt-dlp invocation and textual progress parsing for the download stage.
use super::*;

pub(super) struct MediaDownloadJob<'a> {
    pub(super) ytdlp_binary: &'a Path,
    pub(super) url: &'a str,
    pub(super) output_template: &'a Path,
    pub(super) include_audio: bool,
    pub(super) cookies_file: Option<&'a Path>,
    pub(super) ffmpeg_location: Option<&'a Path>,
    pub(super) task: &'a str,
}

/// Streams are capped at 1080p. Without audio only a bare video stream is
/// requested; the silent-WebM path never pays for an audio download.
pub(super) fn ytdlp_format_selector(include_audio: bool) -> &'static str {
    if include_audio {
        "bv*[height<=1080]+ba/b[height<=1080]"
    } else {
        "bv*[height<=1080]/bv*"
    }
}

/// Parses "[download]  45.3% of ~120.5MiB ..." into a 0..1 ratio.
pub(super) fn parse_download_ratio(line: &str) -> Option<f32> {
    let trimmed = line.trim();
    if !trimmed.starts_with("[download]") {
        return None;
    }
    for token in trimmed.split_whitespace() {
        if let Some(raw) = token.strip_suffix('%') {
            let percent = raw.parse::<f32>().ok()?;
            return Some((percent / 100.0).clamp(0.0, 1.0));
        }
    }
    None
}

pub(super) fn is_downloader_error_line(line: &str) -> bool {
    line.contains("ERROR:") || line.contains("Error:")
}

fn handle_downloader_line(
    app: &AppHandle,
    task: &str,
    line: &str,
    last_percent: &mut i32,
    last_error_line: &mut Option<String>,
) {
    emit_job_log(app, task, &format!("[yt-dlp] {line}"));

    if let Some(ratio) = parse_download_ratio(line) {
        let percent = (ratio * 100.0).round() as i32;
        if percent != *last_percent {
            *last_percent = percent;
            // Download occupies the first half of the job bar.
            emit_job_progress(
                app,
                task,
                "progress",
                &format!("Downloading video: {percent}%"),
                Some(ratio * 0.5),
            );
        }
        return;
    }

    let trimmed = line.trim();
    if is_downloader_error_line(trimmed) {
        *last_error_line = Some(trimmed.to_string());
        emit_job_progress_with_detail(
            app,
            task,
            "progress",
            "Downloader reported a problem.",
            Some(trimmed.to_string()),
            None,
        );
    }
}

pub(super) fn download_media(app: &AppHandle, job: MediaDownloadJob<'_>) -> Result<(), String> {
    emit_job_progress(app, job.task, "progress", "Downloading...", Some(0.0));

    let mut command = hidden_command(job.ytdlp_binary);
    command
        .arg("--newline")
        .arg("--no-warnings")
        .arg("--no-playlist")
        .arg("--extractor-args")
        .arg("youtube:player_client=default")
        .arg("-f")
        .arg(ytdlp_format_selector(job.include_audio))
        .arg("-o")
        .arg(job.output_template);

    if let Some(cookies) = job.cookies_file {
        command.arg("--cookies").arg(cookies);
    }
    if let Some(location) = job.ffmpeg_location {
        command.arg("--ffmpeg-location").arg(location);
    }

    command
        .arg(job.url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|error| format!("Failed to start yt-dlp: {error}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "Failed to capture yt-dlp output.".to_string())?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "Failed to capture yt-dlp error output.".to_string())?;

    // Some yt-dlp builds print progress to stdout, others to stderr.
    let stderr_tail: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let app_for_stderr = app.clone();
    let task_for_stderr = job.task.to_string();
    let tail_for_thread = Arc::clone(&stderr_tail);
    let stderr_handle = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut raw_buffer = Vec::<u8>::new();
        let mut last_percent = -1_i32;
        let mut last_error_line: Option<String> = None;
        let mut last_line: Option<String> = None;
        while let Ok(Some(line)) = read_lossy_process_line(&mut reader, &mut raw_buffer) {
            if !line.trim().is_empty() {
                last_line = Some(line.trim().to_string());
            }
            handle_downloader_line(
                &app_for_stderr,
                &task_for_stderr,
                &line,
                &mut last_percent,
                &mut last_error_line,
            );
        }
        if let Ok(mut guard) = tail_for_thread.lock() {
            *guard = last_error_line.or(last_line);
        }
    });

    let mut reader = BufReader::new(stdout);
    let mut raw_buffer = Vec::<u8>::new();
    let mut last_percent = -1_i32;
    let mut last_error_line: Option<String> = None;
    loop {
        match read_lossy_process_line(&mut reader, &mut raw_buffer) {
            Ok(Some(line)) => handle_downloader_line(
                app,
                job.task,
                &line,
                &mut last_percent,
                &mut last_error_line,
            ),
            Ok(None) => break,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stderr_handle.join();
                return Err(format!("Failed to read yt-dlp progress stream: {error}"));
            }
        }
    }

    let status = child
        .wait()
        .map_err(|error| format!("Failed while waiting for yt-dlp to finish: {error}"))?;
    let _ = stderr_handle.join();

    if !status.success() {
        let code = status
            .code()
            .map(|value| value.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let tail = last_error_line.or_else(|| stderr_tail.lock().ok().and_then(|g| g.clone()));
        let message = match tail {
            Some(line) => format!("yt-dlp failed with exit code {code}: {line}"),
            None => format!("yt-dlp failed with exit code {code}"),
        };
        return Err(message);
    }

    emit_job_progress(
        app,
        job.task,
        "progress",
        "Download finished.",
        Some(0.5),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_selector_requests_audio_only_when_asked() {
        assert_eq!(
            ytdlp_format_selector(true),
            "bv*[height<=1080]+ba/b[height<=1080]"
        );
        assert_eq!(ytdlp_format_selector(false), "bv*[height<=1080]/bv*");
    }

    #[test]
    fn download_lines_yield_ratios() {
        assert_eq!(
            parse_download_ratio("[download]  45.3% of ~120.51MiB at 2.31MiB/s"),
            Some(0.453)
        );
        assert_eq!(parse_download_ratio("[download] 100% of 3.00MiB"), Some(1.0));
        assert_eq!(
            parse_download_ratio("[download] Destination: /tmp/forge-1.mkv"),
            None
        );
        assert_eq!(parse_download_ratio("[ExtractAudio] something"), None);
        assert_eq!(parse_download_ratio("plain line"), None);
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        assert_eq!(parse_download_ratio("[download] 103.2% of unknown"), Some(1.0));
    }

    #[test]
    fn error_lines_are_detected() {
        assert!(is_downloader_error_line(
            "ERROR: [youtube] abc: Video unavailable"
        ));
        assert!(!is_downloader_error_line("[download] 10% of 1MiB"));
    }
}
