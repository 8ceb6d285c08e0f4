// ffprobe probing and low-level process/file helpers shared by the job pipeline.
use super::*;

pub(super) fn probe_media_duration_seconds(
    ffprobe_binary: &Path,
    media_path: &Path,
) -> Option<f64> {
    let output = hidden_command(ffprobe_binary)
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(media_path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8_lossy(&output.stdout);
    raw.trim().parse::<f64>().ok()
}

/// Reads one line tolerating both \r and \n terminators and invalid UTF-8.
/// ffmpeg rewrites its status line with bare carriage returns.
pub(super) fn read_lossy_process_line<R: BufRead>(
    reader: &mut R,
    raw_buffer: &mut Vec<u8>,
) -> Result<Option<String>, std::io::Error> {
    raw_buffer.clear();
    loop {
        let mut byte = [0_u8; 1];
        let read = reader.read(&mut byte)?;
        if read == 0 {
            if raw_buffer.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' || byte[0] == b'\r' {
            if raw_buffer.is_empty() {
                continue;
            }
            break;
        }
        raw_buffer.push(byte[0]);
    }
    Ok(Some(String::from_utf8_lossy(raw_buffer).to_string()))
}

pub(super) fn is_allowed_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
        .map(|value| ALLOWED_VIDEO_EXTENSIONS.contains(&value.as_str()))
        .unwrap_or(false)
}

pub(super) fn file_modified_or_epoch(path: &Path) -> SystemTime {
    path.metadata()
        .ok()
        .and_then(|metadata| metadata.modified().ok())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// The downloader is asked for `<stem>.mkv` but may pick another container.
/// Finds the newest `<stem>.*` sibling as the actual artifact.
pub(super) fn find_download_artifact(dir: &Path, stem: &str) -> Option<PathBuf> {
    let prefix = format!("{stem}.");
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|candidate| candidate.is_file())
        .filter(|candidate| {
            candidate
                .file_name()
                .and_then(|value| value.to_str())
                .map(|name| name.starts_with(&prefix))
                .unwrap_or(false)
        })
        .max_by_key(|candidate| file_modified_or_epoch(candidate))
}

/// Collapses the last non-empty stderr lines of a failed ffmpeg run into one
/// message the GUI can show.
pub(super) fn ffmpeg_error_tail(stderr: &str) -> String {
    let tail: Vec<&str> = stderr
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .rev()
        .take(4)
        .collect();
    if tail.is_empty() {
        "no error output".to_string()
    } else {
        let mut ordered = tail;
        ordered.reverse();
        ordered.join(" | ")
    }
}

pub(super) fn unix_timestamp() -> Result<u64, String> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|value| value.as_secs())
        .map_err(|_| "System clock is before the Unix epoch.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn lossy_line_reader_splits_on_cr_and_lf() {
        let data: &[u8] = b"frame=10\rframe=20\nout_time_ms=100\n";
        let mut reader = BufReader::new(data);
        let mut buffer = Vec::new();
        assert_eq!(
            read_lossy_process_line(&mut reader, &mut buffer).unwrap(),
            Some("frame=10".to_string())
        );
        assert_eq!(
            read_lossy_process_line(&mut reader, &mut buffer).unwrap(),
            Some("frame=20".to_string())
        );
        assert_eq!(
            read_lossy_process_line(&mut reader, &mut buffer).unwrap(),
            Some("out_time_ms=100".to_string())
        );
        assert_eq!(read_lossy_process_line(&mut reader, &mut buffer).unwrap(), None);
    }

    #[test]
    fn lossy_line_reader_skips_blank_terminator_runs() {
        let data: &[u8] = b"\r\n\r\nhello\r\n";
        let mut reader = BufReader::new(data);
        let mut buffer = Vec::new();
        assert_eq!(
            read_lossy_process_line(&mut reader, &mut buffer).unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(read_lossy_process_line(&mut reader, &mut buffer).unwrap(), None);
    }

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        assert!(is_allowed_video_file(Path::new("/tmp/clip.WebM")));
        assert!(is_allowed_video_file(Path::new("/tmp/clip.mp4")));
        assert!(!is_allowed_video_file(Path::new("/tmp/clip.txt")));
        assert!(!is_allowed_video_file(Path::new("/tmp/clip")));
    }

    #[test]
    fn error_tail_keeps_the_last_lines_in_order() {
        let stderr = "a\n\nb\nc\nd\ne\n";
        assert_eq!(ffmpeg_error_tail(stderr), "b | c | d | e");
        assert_eq!(ffmpeg_error_tail("  \n"), "no error output");
    }
}
