use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, ProcessError, Result};

/// Container metadata for the first video stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration: f64,
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Probe a video file with ffprobe
pub async fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoInfo> {
    if !path.exists() {
        return Err(MediaError::FileNotFound { path: path.to_path_buf() }.into());
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProcessError::SpawnFailed {
            program: ffprobe.display().to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout)).map_err(|reason| {
        MediaError::ProbeFailed {
            path: path.to_path_buf(),
            reason,
        }
    })?;
    debug!(
        "Probed {:?}: {}x{} @ {:.3} fps, {} frames, {:.2}s",
        path, info.width, info.height, info.fps, info.frame_count, info.duration
    );
    Ok(info)
}

pub(crate) fn parse_probe_output(json: &str) -> std::result::Result<VideoInfo, String> {
    let parsed: FfprobeOutput = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream".to_string())?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| "no usable frame rate".to_string())?;

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    Ok(VideoInfo {
        duration,
        fps,
        frame_count,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Parse `30000/1001` or `25` into frames per second
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [{
            "codec_type": "video",
            "codec_name": "h264",
            "width": 1280,
            "height": 720,
            "nb_frames": "1800",
            "duration": "30.000000",
            "avg_frame_rate": "60/1",
            "r_frame_rate": "60/1"
        }],
        "format": { "duration": "30.040000" }
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(info.frame_count, 1800);
        assert_eq!(info.fps, 60.0);
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_frame_count_estimated_without_nb_frames() {
        let json = r#"{
            "streams": [{ "codec_type": "video", "width": 64, "height": 48,
                          "avg_frame_rate": "0/0", "r_frame_rate": "25/1" }],
            "format": { "duration": "2.0" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.frame_count, 50);
    }

    #[test]
    fn test_rejects_audio_only() {
        let json = r#"{ "streams": [{ "codec_type": "audio" }] }"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_rate() {
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_video(Path::new("ffprobe"), Path::new("/no/such/video.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
