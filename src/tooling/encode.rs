// ffmpeg transcode pipeline: trim/pad filters, WebM/MP4 profiles, live progress.
use super::*;
use std::ffi::OsString;

pub(super) struct EncodeJob<'a> {
    pub(super) ffmpeg_binary: &'a Path,
    pub(super) ffprobe_binary: Option<&'a Path>,
    pub(super) input_path: &'a Path,
    pub(super) output_path: &'a Path,
    pub(super) trim_start: f64,
    pub(super) pad_start: f64,
    pub(super) with_audio: bool,
    pub(super) task: &'a str,
}

/// Duration the encoded file should end up with, used to scale progress.
/// Zero when the source could not be probed (progress stays indeterminate).
pub(super) fn expected_output_duration(
    original_duration: f64,
    trim_start: f64,
    pad_start: f64,
) -> f64 {
    if original_duration <= 0.0 {
        return 0.0;
    }
    (original_duration - trim_start).max(0.1) + pad_start
}

/// Despite the key name, ffmpeg reports `out_time_ms` in microseconds.
pub(super) fn parse_out_time_seconds(line: &str) -> Option<f64> {
    let raw = line.trim().strip_prefix("out_time_ms=")?;
    let micros = raw.trim().parse::<i64>().ok()?;
    Some(micros as f64 / 1_000_000.0)
}

/// Black leading frames for the video stream, matching silence for audio.
pub(super) fn build_pad_filters(pad_start: f64, with_audio: bool) -> (Vec<String>, Vec<String>) {
    let mut video_filters = Vec::new();
    let mut audio_filters = Vec::new();
    if pad_start > 0.0 {
        video_filters.push(format!("tpad=start_duration={pad_start}:color=black"));
        if with_audio {
            let delay_ms = (pad_start * 1000.0) as i64;
            audio_filters.push(format!("adelay={delay_ms}|{delay_ms}"));
        }
    }
    (video_filters, audio_filters)
}

/// VP8 + optional Vorbis, the profile rhythm-game engines accept as song
/// background video. Returns everything up to (not including) `-y <output>`.
pub(super) fn build_webm_encode_args(
    input_path: &Path,
    trim_start: f64,
    pad_start: f64,
    with_audio: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    // Trim applies to both streams when placed before the input.
    if trim_start > 0.0 {
        args.push("-ss".into());
        args.push(format!("{trim_start}").into());
    }
    args.push("-i".into());
    args.push(input_path.as_os_str().to_os_string());

    args.extend(
        ["-c:v", "libvpx", "-b:v", "6000k", "-g", "30", "-pix_fmt", "yuv420p", "-cpu-used", "4"]
            .into_iter()
            .map(OsString::from),
    );

    if with_audio {
        args.extend(
            ["-c:a", "libvorbis", "-b:a", "192k"]
                .into_iter()
                .map(OsString::from),
        );
    } else {
        args.push("-an".into());
    }

    let (video_filters, audio_filters) = build_pad_filters(pad_start, with_audio);
    if !video_filters.is_empty() {
        args.push("-vf".into());
        args.push(video_filters.join(",").into());
    }
    if !audio_filters.is_empty() {
        args.push("-af".into());
        args.push(audio_filters.join(",").into());
    }

    args
}

/// H.264 + AAC re-encode used when the MP4 output needs trim or pad applied.
pub(super) fn build_mp4_encode_args(
    input_path: &Path,
    trim_start: f64,
    pad_start: f64,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    if trim_start > 0.0 {
        args.push("-ss".into());
        args.push(format!("{trim_start}").into());
    }
    args.push("-i".into());
    args.push(input_path.as_os_str().to_os_string());

    let (video_filters, audio_filters) = build_pad_filters(pad_start, true);
    if !video_filters.is_empty() {
        args.push("-vf".into());
        args.push(video_filters.join(",").into());
    }
    if !audio_filters.is_empty() {
        args.push("-af".into());
        args.push(audio_filters.join(",").into());
    }

    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );

    args
}

/// Runs ffmpeg with `-progress pipe:1` appended and scales `out_time_ms`
/// against the expected duration into the given slice of the job bar.
pub(super) fn run_ffmpeg_with_progress(
    app: &AppHandle,
    task: &str,
    ffmpeg_binary: &Path,
    encode_args: &[OsString],
    output_path: &Path,
    total_duration: f64,
    progress_window: (f32, f32),
) -> Result<(), String> {
    let (window_start, window_end) = progress_window;

    let mut command = hidden_command(ffmpeg_binary);
    command.args(encode_args);
    command
        .arg("-progress")
        .arg("pipe:1")
        .arg("-nostats")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg(output_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    emit_job_progress(app, task, "progress", "Encoding...", Some(window_start));

    let mut child = command
        .spawn()
        .map_err(|error| format!("Failed to start ffmpeg: {error}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "Failed to capture ffmpeg progress stream.".to_string())?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "Failed to capture ffmpeg error stream.".to_string())?;

    let stderr_output: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let app_for_stderr = app.clone();
    let task_for_stderr = task.to_string();
    let output_for_thread = Arc::clone(&stderr_output);
    let stderr_handle = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut raw_buffer = Vec::<u8>::new();
        while let Ok(Some(line)) = read_lossy_process_line(&mut reader, &mut raw_buffer) {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            emit_job_log(&app_for_stderr, &task_for_stderr, &format!("[ffmpeg] {trimmed}"));
            if let Ok(mut guard) = output_for_thread.lock() {
                guard.push_str(trimmed);
                guard.push('\n');
            }
        }
    });

    let mut reader = BufReader::new(stdout);
    let mut raw_buffer = Vec::<u8>::new();
    let mut last_percent = -1_i32;
    loop {
        let line = match read_lossy_process_line(&mut reader, &mut raw_buffer) {
            Ok(Some(value)) => value,
            Ok(None) => break,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stderr_handle.join();
                return Err(format!("Failed to read ffmpeg progress stream: {error}"));
            }
        };

        emit_job_log(app, task, &format!("[ffmpeg] {line}"));

        if let Some(seconds) = parse_out_time_seconds(&line) {
            if total_duration > 0.0 {
                let ratio = (seconds / total_duration).clamp(0.0, 1.0);
                let percent = (ratio * 100.0).round() as i32;
                if percent != last_percent {
                    last_percent = percent;
                    let progress = window_start + (window_end - window_start) * ratio as f32;
                    emit_job_progress(
                        app,
                        task,
                        "progress",
                        &format!("Encoding: {percent}%"),
                        Some(progress),
                    );
                }
            }
        }
    }

    let status = child
        .wait()
        .map_err(|error| format!("Failed while waiting for ffmpeg to finish: {error}"))?;
    let _ = stderr_handle.join();

    // The encode slice of the bar always lands on its end mark.
    emit_job_progress(app, task, "progress", "Encoding finished.", Some(window_end));

    if !status.success() {
        let code = status
            .code()
            .map(|value| value.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let collected = stderr_output
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        return Err(format!(
            "ffmpeg failed (code {code}): {}",
            ffmpeg_error_tail(&collected)
        ));
    }

    Ok(())
}

pub(super) fn ensure_exclusive_trim_pad(trim_start: f64, pad_start: f64) -> Result<(), String> {
    if trim_start > 0.0 && pad_start > 0.0 {
        return Err("Cannot use both trim and pad at the same time.".to_string());
    }
    Ok(())
}

pub(super) fn convert_to_background_webm(app: &AppHandle, job: &EncodeJob<'_>) -> Result<(), String> {
    ensure_exclusive_trim_pad(job.trim_start, job.pad_start)?;

    let original_duration = job
        .ffprobe_binary
        .and_then(|binary| probe_media_duration_seconds(binary, job.input_path))
        .unwrap_or(0.0);
    let total_duration = expected_output_duration(original_duration, job.trim_start, job.pad_start);

    let args = build_webm_encode_args(job.input_path, job.trim_start, job.pad_start, job.with_audio);
    run_ffmpeg_with_progress(
        app,
        job.task,
        job.ffmpeg_binary,
        &args,
        job.output_path,
        total_duration,
        (0.5, 1.0),
    )
}

pub(super) fn convert_to_mp4(app: &AppHandle, job: &EncodeJob<'_>) -> Result<(), String> {
    ensure_exclusive_trim_pad(job.trim_start, job.pad_start)?;

    // Untouched MP4s are moved into place without a re-encode.
    if job.trim_start == 0.0 && job.pad_start == 0.0 {
        move_file(job.input_path, job.output_path)?;
        emit_job_progress(app, job.task, "progress", "File moved into place.", Some(1.0));
        return Ok(());
    }

    let original_duration = job
        .ffprobe_binary
        .and_then(|binary| probe_media_duration_seconds(binary, job.input_path))
        .unwrap_or(0.0);
    let total_duration = expected_output_duration(original_duration, job.trim_start, job.pad_start);

    let args = build_mp4_encode_args(job.input_path, job.trim_start, job.pad_start);
    run_ffmpeg_with_progress(
        app,
        job.task,
        job.ffmpeg_binary,
        &args,
        job.output_path,
        total_duration,
        (0.5, 1.0),
    )
}

/// Rename with a copy fallback; the temp dir and the song folder are often on
/// different filesystems.
pub(super) fn move_file(source: &Path, destination: &Path) -> Result<(), String> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination)
        .map_err(|error| format!("Failed to move file into place: {error}"))?;
    let _ = fs::remove_file(source);
    Ok(())
}

/// Re-runs the WebM pipeline over an existing file. When the output is the
/// input itself, encodes to a timestamped sibling first and renames over it.
pub(super) fn adjust_existing_webm(app: &AppHandle, job: &EncodeJob<'_>) -> Result<(), String> {
    let input_canonical = canonicalize_existing_path(job.input_path)?;
    let in_place = job.input_path == job.output_path
        || (job.output_path.exists()
            && canonicalize_existing_path(job.output_path)
                .map(|resolved| resolved == input_canonical)
                .unwrap_or(false));

    if in_place {
        let stamp = unix_timestamp()?;
        let stem = input_canonical
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("video");
        let temp_output = input_canonical.with_file_name(format!("{stem}.tmp_{stamp}.webm"));
        let temp_job = EncodeJob {
            ffmpeg_binary: job.ffmpeg_binary,
            ffprobe_binary: job.ffprobe_binary,
            input_path: &input_canonical,
            output_path: &temp_output,
            trim_start: job.trim_start,
            pad_start: job.pad_start,
            with_audio: job.with_audio,
            task: job.task,
        };
        convert_to_background_webm(app, &temp_job)?;
        fs::rename(&temp_output, &input_canonical)
            .map_err(|error| format!("Failed to replace original file: {error}"))?;
        return Ok(());
    }

    let direct_job = EncodeJob {
        ffmpeg_binary: job.ffmpeg_binary,
        ffprobe_binary: job.ffprobe_binary,
        input_path: &input_canonical,
        output_path: job.output_path,
        trim_start: job.trim_start,
        pad_start: job.pad_start,
        with_audio: job.with_audio,
        task: job.task,
    };
    convert_to_background_webm(app, &direct_job)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg_strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|value| value.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn expected_duration_accounts_for_trim_and_pad() {
        assert_eq!(expected_output_duration(60.0, 10.0, 0.0), 50.0);
        assert_eq!(expected_output_duration(60.0, 0.0, 3.0), 63.0);
        // Over-trimming still leaves the 0.1s floor.
        assert_eq!(expected_output_duration(5.0, 30.0, 0.0), 0.1);
        assert_eq!(expected_output_duration(0.0, 10.0, 5.0), 0.0);
    }

    #[test]
    fn out_time_lines_parse_as_microseconds() {
        assert_eq!(parse_out_time_seconds("out_time_ms=1500000"), Some(1.5));
        assert_eq!(parse_out_time_seconds("  out_time_ms=0"), Some(0.0));
        assert_eq!(parse_out_time_seconds("out_time_ms=N/A"), None);
        assert_eq!(parse_out_time_seconds("progress=continue"), None);
        assert_eq!(parse_out_time_seconds("frame=25"), None);
    }

    #[test]
    fn pad_filters_cover_video_and_optionally_audio() {
        let (video, audio) = build_pad_filters(2.5, true);
        assert_eq!(video, vec!["tpad=start_duration=2.5:color=black"]);
        assert_eq!(audio, vec!["adelay=2500|2500"]);

        let (video, audio) = build_pad_filters(2.5, false);
        assert_eq!(video.len(), 1);
        assert!(audio.is_empty());

        let (video, audio) = build_pad_filters(0.0, true);
        assert!(video.is_empty());
        assert!(audio.is_empty());
    }

    #[test]
    fn webm_args_use_vp8_and_trim_before_input() {
        let args = arg_strings(&build_webm_encode_args(
            Path::new("/tmp/in.mkv"),
            4.0,
            0.0,
            false,
        ));
        assert_eq!(&args[..2], &["-ss".to_string(), "4".to_string()]);
        assert_eq!(&args[2..4], &["-i".to_string(), "/tmp/in.mkv".to_string()]);
        assert!(args.contains(&"libvpx".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"libvorbis".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn webm_args_embed_vorbis_and_pad_both_streams() {
        let args = arg_strings(&build_webm_encode_args(
            Path::new("/tmp/in.mkv"),
            0.0,
            1.25,
            true,
        ));
        assert_eq!(&args[..2], &["-i".to_string(), "/tmp/in.mkv".to_string()]);
        assert!(args.contains(&"libvorbis".to_string()));
        let vf_index = args.iter().position(|value| value == "-vf").unwrap();
        assert_eq!(args[vf_index + 1], "tpad=start_duration=1.25:color=black");
        let af_index = args.iter().position(|value| value == "-af").unwrap();
        assert_eq!(args[af_index + 1], "adelay=1250|1250");
    }

    #[test]
    fn mp4_args_use_h264_aac_and_faststart() {
        let args = arg_strings(&build_mp4_encode_args(Path::new("/tmp/in.mkv"), 0.0, 2.0));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert!(args.contains(&"adelay=2000|2000".to_string()));
        assert!(!args.contains(&"-ss".to_string()));
    }

    #[test]
    fn combined_trim_and_pad_is_refused() {
        assert!(ensure_exclusive_trim_pad(1.0, 1.0).is_err());
        assert!(ensure_exclusive_trim_pad(1.0, 0.0).is_ok());
        assert!(ensure_exclusive_trim_pad(0.0, 0.0).is_ok());
    }

    #[test]
    fn move_file_relocates_the_payload() {
        let dir = std::env::temp_dir().join(format!("forge-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let source = dir.join("a.bin");
        let destination = dir.join("b.bin");
        fs::write(&source, b"payload").unwrap();
        move_file(&source, &destination).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"payload");
        let _ = fs::remove_dir_all(&dir);
    }
}
