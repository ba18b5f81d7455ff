use serde_json::Value;

pub trait FromStream {
    fn from_stream(stream_data: &Value) -> Option<Self>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    /// Whole frames per second, rounded down.
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl FromStream for VideoStream {
    fn from_stream(stream_data: &Value) -> Option<Self> {
        if stream_data.get("codec_type")?.as_str()? != "video" {
            return None;
        }

        // avg_frame_rate is 0/0 for some raw streams, r_frame_rate is not
        let frame_rate = ["avg_frame_rate", "r_frame_rate"]
            .iter()
            .filter_map(|key| stream_data.get(*key)?.as_str())
            .filter_map(parse_rational)
            .find(|rate| *rate >= 1.0)?;

        Some(VideoStream {
            frame_rate: frame_rate.floor() as u32,
            width: stream_data.get("width")?.as_u64()? as u32,
            height: stream_data.get("height")?.as_u64()? as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub channels: u32,
}

impl FromStream for AudioStream {
    fn from_stream(stream_data: &Value) -> Option<Self> {
        if stream_data.get("codec_type")?.as_str()? != "audio" {
            return None;
        }
        Some(AudioStream {
            channels: stream_data.get("channels")?.as_u64()? as u32,
        })
    }
}

/// Parses ffprobe's `num/den` notation.
pub fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/').unwrap_or((value, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
