use super::stream::{AudioStream, FromStream, VideoStream};
use serde_json::Value;

/// What the pipeline needs to know about a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    /// `None` when the source has no audio stream at all.
    pub channels: Option<u32>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("prober output is not valid JSON")]
    Unparseable,
    #[error("no usable video stream found")]
    NoVideo,
}

impl MediaInfo {
    /// Reads the output of `ffprobe -show_format -show_streams -print_format json`.
    pub fn from_ffprobe_json(output: &[u8]) -> Result<Self, ProbeError> {
        let v: Value = serde_json::from_slice(output).map_err(|_| ProbeError::Unparseable)?;
        let streams = v
            .get("streams")
            .and_then(Value::as_array)
            .ok_or(ProbeError::Unparseable)?;

        let video = streams
            .iter()
            .find_map(VideoStream::from_stream)
            .ok_or(ProbeError::NoVideo)?;
        let audio = streams.iter().find_map(AudioStream::from_stream);

        let duration = v
            .get("format")
            .and_then(|format| format.get("duration"))
            .into_iter()
            .chain(streams.iter().filter_map(|stream| stream.get("duration")))
            .filter_map(as_seconds)
            .find(|seconds| *seconds > 0.0);

        Ok(MediaInfo {
            frame_rate: video.frame_rate,
            width: video.width,
            height: video.height,
            channels: audio.map(|audio| audio.channels),
            duration,
        })
    }
}

// ffprobe prints durations as strings
fn as_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probe_with_audio() {
        let output = json!({
            "streams": [
                { "codec_type": "video", "avg_frame_rate": "30/1", "width": 320, "height": 240 },
                { "codec_type": "audio", "channels": 2, "duration": "10.005" }
            ],
            "format": { "duration": "10.010000" }
        })
        .to_string();

        let info = MediaInfo::from_ffprobe_json(output.as_bytes()).unwrap();
        assert_eq!(
            info,
            MediaInfo {
                frame_rate: 30,
                width: 320,
                height: 240,
                channels: Some(2),
                duration: Some(10.01),
            }
        );
    }

    #[test]
    fn test_probe_without_audio_reports_absence() {
        let output = json!({
            "streams": [
                { "codec_type": "video", "avg_frame_rate": "24/1", "width": 640, "height": 360 }
            ],
            "format": { "duration": "5.5" }
        })
        .to_string();

        let info = MediaInfo::from_ffprobe_json(output.as_bytes()).unwrap();
        assert_eq!(info.channels, None);
        assert_eq!(info.duration, Some(5.5));
    }

    #[test]
    fn test_probe_duration_falls_back_to_stream() {
        let output = json!({
            "streams": [
                { "codec_type": "video", "avg_frame_rate": "24/1", "width": 640, "height": 360, "duration": "3.0" }
            ],
            "format": { "duration": "N/A" }
        })
        .to_string();

        let info = MediaInfo::from_ffprobe_json(output.as_bytes()).unwrap();
        assert_eq!(info.duration, Some(3.0));
    }

    #[test]
    fn test_probe_failures() {
        assert_eq!(
            MediaInfo::from_ffprobe_json(b""),
            Err(ProbeError::Unparseable)
        );
        assert_eq!(
            MediaInfo::from_ffprobe_json(b"{}"),
            Err(ProbeError::Unparseable)
        );
        let audio_only = json!({ "streams": [{ "codec_type": "audio", "channels": 1 }] }).to_string();
        assert_eq!(
            MediaInfo::from_ffprobe_json(audio_only.as_bytes()),
            Err(ProbeError::NoVideo)
        );
    }
}
