//! `MediaTools` backed by the ffmpeg and ffprobe command line programs.

use crate::domain::av::plan::{AudioPlan, VideoPlan};
use crate::domain::dpg::gop::KEYFRAME_INTERVAL;
use crate::domain::dpg::header::AUDIO_SAMPLE_RATE;
use crate::domain::dpg::settings::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::ports::media::MediaTools;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

const AUDIO_BITRATE: &str = "128k";

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run(&self, program: &Path, args: Vec<OsString>) -> io::Result<Output> {
        tracing::debug!(program = %program.display(), ?args, "running external tool");

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} exited with {}",
                program.display(),
                output.status
            )));
        }
        Ok(output)
    }
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, source: &Path) -> io::Result<Vec<u8>> {
        let output = self.run(&self.ffprobe, probe_args(source)).await?;
        Ok(output.stdout)
    }

    async fn encode_video(
        &self,
        source: &Path,
        plan: &VideoPlan,
        output: &Path,
    ) -> io::Result<()> {
        self.run(&self.ffmpeg, video_args(source, plan, output))
            .await
            .map(drop)
    }

    async fn encode_audio(
        &self,
        source: &Path,
        plan: &AudioPlan,
        output: &Path,
    ) -> io::Result<()> {
        self.run(&self.ffmpeg, audio_args(source, plan, output))
            .await
            .map(drop)
    }

    async fn probe_frames(&self, video: &Path) -> io::Result<String> {
        let output = self.run(&self.ffprobe, frame_probe_args(video)).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn extract_frame(&self, video: &Path, at_second: u32, output: &Path) -> io::Result<()> {
        self.run(&self.ffmpeg, extract_frame_args(video, at_second, output))
            .await
            .map(drop)
    }
}

fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}

fn probe_args(source: &Path) -> Vec<OsString> {
    let mut out = args(["-v", "error", "-show_format", "-show_streams", "-print_format", "json"]);
    out.push(source.into());
    out
}

fn frame_probe_args(video: &Path) -> Vec<OsString> {
    let mut out = args([
        "-v",
        "error",
        "-select_streams",
        "v",
        "-show_entries",
        "frame=pkt_pos,pict_type",
        "-print_format",
        "csv",
    ]);
    out.push(video.into());
    out
}

pub(crate) fn video_args(source: &Path, plan: &VideoPlan, output: &Path) -> Vec<OsString> {
    let mut out = args(["-y", "-i"]);
    out.push(source.into());
    out.extend(args([
        "-map".to_string(),
        "0:v:0".to_string(),
        "-an".to_string(),
        "-r".to_string(),
        plan.fps.to_string(),
        "-sws_flags".to_string(),
        "lanczos".to_string(),
        "-vf".to_string(),
        format!(
            "scale={}:{},pad={}:{}:{}:{}",
            plan.width, plan.height, CANVAS_WIDTH, CANVAS_HEIGHT, plan.pad_x, plan.pad_y
        ),
        "-codec:v".to_string(),
        "mpeg1video".to_string(),
        "-b:v".to_string(),
        plan.quality.video_bitrate().to_string(),
        "-g".to_string(),
        KEYFRAME_INTERVAL.to_string(),
        // no scene-cut keyframes, the seek index assumes a fixed interval
        "-sc_threshold".to_string(),
        "1000000000".to_string(),
    ]));
    out.extend(args([
        "-strict",
        "experimental",
        "-mbd",
        "2",
        "-trellis",
        "1",
        "-mpv_flags",
        "+cbp_rd",
        "-mpv_flags",
        "+mv0",
        "-cmp",
        "6",
        "-subcmp",
        "6",
        "-precmp",
        "6",
        "-dia_size",
        "3",
        "-pre_dia_size",
        "3",
        "-last_pred",
        "3",
        "-f",
        "mpeg1video",
    ]));
    out.push(output.into());
    out
}

pub(crate) fn audio_args(source: &Path, plan: &AudioPlan, output: &Path) -> Vec<OsString> {
    let mut out = match plan {
        AudioPlan::Encode { .. } => {
            let mut out = args(["-y", "-i"]);
            out.push(source.into());
            out.extend(args(["-map", "0:a:0", "-vn"]));
            out
        }
        AudioPlan::Silence { seconds } => args([
            "-y".to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("anullsrc=r={}:cl=mono", AUDIO_SAMPLE_RATE),
            "-t".to_string(),
            seconds.to_string(),
        ]),
    };

    let (mode, channels) = match plan {
        AudioPlan::Encode { channels } if *channels >= 2 => ("stereo", 2),
        _ => ("mono", 1),
    };
    out.extend(args([
        "-codec:a".to_string(),
        "libtwolame".to_string(),
        "-ar".to_string(),
        AUDIO_SAMPLE_RATE.to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-mode".to_string(),
        mode.to_string(),
        "-ac".to_string(),
        channels.to_string(),
        "-f".to_string(),
        "mp2".to_string(),
    ]));
    out.push(output.into());
    out
}

fn extract_frame_args(video: &Path, at_second: u32, output: &Path) -> Vec<OsString> {
    let mut out = args(["-y".to_string(), "-ss".to_string(), at_second.to_string(), "-i".to_string()]);
    out.push(video.into());
    out.extend(args(["-frames:v", "1"]));
    out.push(output.into());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dpg::settings::QualityTier;

    fn joined(args: &[OsString]) -> String {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_video_args() {
        let plan = VideoPlan {
            fps: 24,
            width: 256,
            height: 144,
            pad_x: 0,
            pad_y: 24,
            quality: QualityTier::High,
        };
        let line = joined(&video_args(Path::new("in.mp4"), &plan, Path::new("out.mpg")));
        assert!(line.starts_with("-y -i in.mp4 -map 0:v:0 -an -r 24 "));
        assert!(line.contains("-vf scale=256:144,pad=256:192:0:24"));
        assert!(line.contains("-codec:v mpeg1video -b:v 384k -g 10 -sc_threshold 1000000000"));
        assert!(line.ends_with("-f mpeg1video out.mpg"));
    }

    #[test]
    fn test_audio_args_stereo() {
        let line = joined(&audio_args(
            Path::new("in.mp4"),
            &AudioPlan::Encode { channels: 2 },
            Path::new("out.mp2"),
        ));
        assert_eq!(
            line,
            "-y -i in.mp4 -map 0:a:0 -vn -codec:a libtwolame -ar 32000 -b:a 128k -mode stereo -ac 2 -f mp2 out.mp2"
        );
    }

    #[test]
    fn test_audio_args_silence_ignores_source() {
        let line = joined(&audio_args(
            Path::new("in.mp4"),
            &AudioPlan::Silence { seconds: 12.5 },
            Path::new("out.mp2"),
        ));
        assert!(!line.contains("in.mp4"));
        assert!(line.starts_with("-y -f lavfi -i anullsrc=r=32000:cl=mono -t 12.5 "));
        assert!(line.contains("-mode mono -ac 1"));
    }

    #[test]
    fn test_extract_frame_args() {
        let line = joined(&extract_frame_args(Path::new("v.mpg"), 3, Path::new("f.png")));
        assert_eq!(line, "-y -ss 3 -i v.mpg -frames:v 1 f.png");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let tools = FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(tools.probe(Path::new("in.mp4")).await.is_err());
    }
}
