// Managed yt-dlp/ffmpeg installers with release-checksum verification.
use super::*;

pub(super) fn ytdlp_download_url() -> &'static str {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp"
    }
}

pub(super) fn ytdlp_asset_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

pub(super) fn expected_ytdlp_sha256() -> Result<String, String> {
    let manifest = download_text(YTDLP_SHA256SUMS_URL)?;
    parse_sha256_for_asset(&manifest, ytdlp_asset_name())
        .ok_or_else(|| "Failed to find SHA256 for selected yt-dlp binary.".to_string())
}

pub(super) fn expected_ffmpeg_sha256_for_url(candidate_url: &str) -> Result<String, String> {
    if candidate_url == FFMPEG_WINDOWS_ESSENTIALS_URL {
        let payload = download_text(FFMPEG_WINDOWS_ESSENTIALS_SHA256_URL)?;
        return parse_sha256_token(&payload)
            .ok_or_else(|| "Failed to read SHA256 for ffmpeg-release-essentials.zip.".to_string());
    }
    if candidate_url == FFMPEG_WINDOWS_FALLBACK_URL {
        let manifest = download_text(FFMPEG_WINDOWS_FALLBACK_SHA256_URL)?;
        let file_name = Url::parse(candidate_url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(|name| name.to_string()))
            })
            .ok_or_else(|| "Failed to determine fallback FFmpeg archive filename.".to_string())?;
        return parse_sha256_for_asset(&manifest, &file_name)
            .ok_or_else(|| format!("Failed to find SHA256 for {file_name}."));
    }
    Err("Unknown FFmpeg archive source.".to_string())
}

pub(super) fn install_managed_ytdlp_sync(app: AppHandle) -> Result<ToolStatus, String> {
    emit_job_progress(
        &app,
        "ytdlp",
        "progress",
        "Preparing yt-dlp setup...",
        Some(0.03),
    );
    emit_job_progress(
        &app,
        "ytdlp",
        "progress",
        "Verifying yt-dlp release checksum...",
        Some(0.06),
    );
    let expected_sha256 = expected_ytdlp_sha256()?;

    let target_path = managed_ytdlp_path(&app)?;
    let temp_path = target_path.with_extension("tmp");
    download_to_path_with_progress(&app, "ytdlp", ytdlp_download_url(), &temp_path, 0.08, 0.88)?;
    emit_job_progress(
        &app,
        "ytdlp",
        "progress",
        "Validating downloaded yt-dlp integrity...",
        Some(0.91),
    );
    if let Err(error) = verify_download_checksum(&temp_path, &expected_sha256) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    emit_job_progress(
        &app,
        "ytdlp",
        "progress",
        "Applying yt-dlp update...",
        Some(0.94),
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o755);
        fs::set_permissions(&temp_path, perms)
            .map_err(|error| format!("Failed to set yt-dlp permissions: {error}"))?;
    }

    fs::rename(&temp_path, &target_path)
        .map_err(|error| format!("Failed to complete yt-dlp installation: {error}"))?;

    let status = inspect_tool(
        Some((target_path, "managed".to_string())),
        "yt-dlp",
        "--version",
    );
    emit_job_progress(
        &app,
        "ytdlp",
        "success",
        "yt-dlp installed successfully.",
        Some(1.0),
    );
    Ok(status)
}

pub(super) fn extract_ffmpeg_windows_binaries(
    archive_path: &Path,
    ffmpeg_out_path: &Path,
    ffprobe_out_path: &Path,
) -> Result<(), String> {
    let file = fs::File::open(archive_path)
        .map_err(|error| format!("Failed to open ffmpeg archive: {error}"))?;
    let mut archive =
        ZipArchive::new(file).map_err(|error| format!("Failed to read ffmpeg archive: {error}"))?;

    let mut ffmpeg_found = false;
    let mut ffprobe_found = false;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| format!("Failed to read ffmpeg archive entry: {error}"))?;
        if !entry.is_file() {
            continue;
        }

        let normalized_name = entry.name().replace('\\', "/").to_lowercase();
        if normalized_name.ends_with("/bin/ffmpeg.exe") {
            let mut output = fs::File::create(ffmpeg_out_path)
                .map_err(|error| format!("Failed to create ffmpeg.exe: {error}"))?;
            std::io::copy(&mut entry, &mut output)
                .map_err(|error| format!("Failed to extract ffmpeg.exe: {error}"))?;
            ffmpeg_found = true;
            continue;
        }

        if normalized_name.ends_with("/bin/ffprobe.exe") {
            let mut output = fs::File::create(ffprobe_out_path)
                .map_err(|error| format!("Failed to create ffprobe.exe: {error}"))?;
            std::io::copy(&mut entry, &mut output)
                .map_err(|error| format!("Failed to extract ffprobe.exe: {error}"))?;
            ffprobe_found = true;
        }
    }

    if !ffmpeg_found || !ffprobe_found {
        return Err("ffmpeg.exe and ffprobe.exe were not found in the archive.".to_string());
    }

    Ok(())
}

pub(super) fn install_managed_ffmpeg_sync(app: AppHandle) -> Result<RuntimeToolsStatus, String> {
    emit_job_progress(
        &app,
        "ffmpeg",
        "progress",
        "Preparing FFmpeg setup...",
        Some(0.03),
    );

    if !cfg!(target_os = "windows") {
        emit_job_progress(
            &app,
            "ffmpeg",
            "error",
            "Managed FFmpeg setup is currently supported only on Windows.",
            None,
        );
        return Err("Managed FFmpeg setup is supported only on Windows for now.".to_string());
    }

    let ffmpeg_target = managed_ffmpeg_path(&app)?;
    let ffprobe_target = managed_ffprobe_path(&app)?;
    let package_path = managed_tools_dir(&app)?.join("ffmpeg-package.tmp.zip");
    let ffmpeg_temp = ffmpeg_target.with_extension("tmp");
    let ffprobe_temp = ffprobe_target.with_extension("tmp");

    let mut downloaded = false;
    let mut last_error: Option<String> = None;
    for candidate_url in [FFMPEG_WINDOWS_ESSENTIALS_URL, FFMPEG_WINDOWS_FALLBACK_URL] {
        emit_job_progress_with_detail(
            &app,
            "ffmpeg",
            "progress",
            "Verifying FFmpeg archive checksum...",
            Some(candidate_url.to_string()),
            Some(0.06),
        );
        let expected_sha256 = match expected_ffmpeg_sha256_for_url(candidate_url) {
            Ok(value) => value,
            Err(error) => {
                last_error = Some(error);
                continue;
            }
        };
        match download_to_path_with_progress(
            &app,
            "ffmpeg",
            candidate_url,
            &package_path,
            0.08,
            0.78,
        ) {
            Ok(_) => match verify_download_checksum(&package_path, &expected_sha256) {
                Ok(_) => {
                    downloaded = true;
                    break;
                }
                Err(error) => {
                    last_error = Some(error);
                    let _ = fs::remove_file(&package_path);
                    emit_job_progress_with_detail(
                        &app,
                        "ffmpeg",
                        "progress",
                        "Checksum verification failed, trying fallback source...",
                        Some(candidate_url.to_string()),
                        Some(0.12),
                    );
                }
            },
            Err(error) => {
                last_error = Some(error);
                emit_job_progress_with_detail(
                    &app,
                    "ffmpeg",
                    "progress",
                    "Switching to fallback download source...",
                    Some(candidate_url.to_string()),
                    Some(0.1),
                );
            }
        }
    }
    if !downloaded {
        return Err(last_error.unwrap_or_else(|| "Failed to download FFmpeg.".to_string()));
    }

    emit_job_progress(
        &app,
        "ffmpeg",
        "progress",
        "Extracting FFmpeg...",
        Some(0.84),
    );
    extract_ffmpeg_windows_binaries(&package_path, &ffmpeg_temp, &ffprobe_temp)?;

    emit_job_progress(
        &app,
        "ffmpeg",
        "progress",
        "Applying FFmpeg binaries...",
        Some(0.93),
    );

    fs::rename(&ffmpeg_temp, &ffmpeg_target)
        .map_err(|error| format!("Failed to persist ffmpeg.exe: {error}"))?;
    fs::rename(&ffprobe_temp, &ffprobe_target)
        .map_err(|error| format!("Failed to persist ffprobe.exe: {error}"))?;

    if package_path.exists() {
        let _ = fs::remove_file(&package_path);
    }

    let settings = load_settings(&app)?;
    let status = build_runtime_status(&app, settings);
    emit_job_progress(
        &app,
        "ffmpeg",
        "success",
        "FFmpeg and FFprobe installed successfully.",
        Some(1.0),
    );
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ytdlp_asset_matches_platform_binary_name() {
        if cfg!(target_os = "windows") {
            assert_eq!(ytdlp_asset_name(), "yt-dlp.exe");
            assert!(ytdlp_download_url().ends_with("/yt-dlp.exe"));
        } else {
            assert_eq!(ytdlp_asset_name(), "yt-dlp");
            assert!(ytdlp_download_url().ends_with("/yt-dlp"));
        }
    }

    #[test]
    fn unknown_ffmpeg_archive_sources_are_refused() {
        assert!(expected_ffmpeg_sha256_for_url("https://example.com/ffmpeg.zip").is_err());
    }
}
