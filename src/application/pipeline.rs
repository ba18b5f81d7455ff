//! The encoding pipeline: probe, transcode video and audio, index, thumbnail,
//! then assemble the container. Stages run strictly one after another.

use crate::adapters::local::fs::file_len;
use crate::domain::av::plan::{AudioPlan, VideoPlan};
use crate::domain::av::probe::MediaInfo;
use crate::domain::dpg::gop::GopIndex;
use crate::domain::dpg::header::{ContainerLayout, Header, Segment, SegmentSizes};
use crate::domain::dpg::settings::EncodeConfig;
use crate::domain::dpg::thumbnail;
use crate::error::{EncodeError, Stage};
use crate::ports::encoder::Encoder;
use crate::ports::media::MediaTools;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// How the seek index is derived from the encoded video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GopStrategy {
    /// Scan the elementary stream for sequence and picture start codes.
    #[default]
    StartCodeScan,
    /// Ask the prober for per-frame picture types and packet positions.
    FrameProbe,
}

pub struct EncodePipeline<T> {
    tools: T,
    gop_strategy: GopStrategy,
}

/// Scratch files of one run, removed with the directory.
struct Workspace {
    _dir: tempfile::TempDir,
    header: PathBuf,
    thumbnail: PathBuf,
    audio: PathBuf,
    video: PathBuf,
    gop: PathBuf,
    frame: PathBuf,
}

impl Workspace {
    fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("dpg-").tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            _dir: dir,
            header: path.join("header.tmp"),
            thumbnail: path.join("thumbnail.tmp"),
            audio: path.join("audio.mp2"),
            video: path.join("video.mpg"),
            gop: path.join("gop.tmp"),
            frame: path.join("frame.png"),
        })
    }

    fn segment(&self, segment: Segment) -> &Path {
        match segment {
            Segment::Header => &self.header,
            Segment::Thumbnail => &self.thumbnail,
            Segment::Audio => &self.audio,
            Segment::Video => &self.video,
            Segment::Gop => &self.gop,
        }
    }
}

impl<T: MediaTools> EncodePipeline<T> {
    pub fn new(tools: T) -> Self {
        Self {
            tools,
            gop_strategy: GopStrategy::default(),
        }
    }

    pub fn with_gop_strategy(mut self, gop_strategy: GopStrategy) -> Self {
        self.gop_strategy = gop_strategy;
        self
    }

    async fn probe(&self, source: &Path) -> Result<MediaInfo, EncodeError> {
        let report = self
            .tools
            .probe(source)
            .await
            .map_err(|e| EncodeError::Probe(e.to_string()))?;
        MediaInfo::from_ffprobe_json(&report).map_err(|e| EncodeError::Probe(e.to_string()))
    }

    async fn build_gop(&self, video: &Path) -> Result<GopIndex, EncodeError> {
        let index = match self.gop_strategy {
            GopStrategy::StartCodeScan => {
                let stream = tokio::fs::read(video)
                    .await
                    .map_err(|_| EncodeError::stage(Stage::Gop))?;
                tokio::task::spawn_blocking(move || GopIndex::scan_start_codes(&stream))
                    .await
                    .map_err(|_| EncodeError::stage(Stage::Gop))?
            }
            GopStrategy::FrameProbe => {
                let csv = self
                    .tools
                    .probe_frames(video)
                    .await
                    .map_err(|_| EncodeError::stage(Stage::Gop))?;
                GopIndex::from_frame_csv(&csv)
            }
        };

        if index.frames == 0 {
            return Err(EncodeError::stage(Stage::Gop));
        }
        Ok(index)
    }

    async fn make_thumbnail(
        &self,
        work: &Workspace,
        frames: u32,
        fps: u32,
    ) -> Result<(), EncodeError> {
        let at_second = thumbnail::sample_second(frames, fps);
        debug!(at_second, "extracting thumbnail frame");

        self.tools
            .extract_frame(&work.video, at_second, &work.frame)
            .await
            .map_err(|_| EncodeError::stage(Stage::Thumbnail))?;
        ensure_output(&work.frame, Stage::Thumbnail).await?;

        let frame_path = work.frame.clone();
        let pixels = tokio::task::spawn_blocking(move || {
            image::open(&frame_path).map(|frame| thumbnail::render(&frame.to_rgb8()))
        })
        .await
        .map_err(|_| EncodeError::stage(Stage::Thumbnail))?
        .map_err(|_| EncodeError::stage(Stage::Thumbnail))?;

        tokio::fs::write(&work.thumbnail, pixels)
            .await
            .map_err(|_| EncodeError::stage(Stage::Thumbnail))?;
        ensure_output(&work.thumbnail, Stage::Thumbnail).await
    }

    async fn run(&self, source: &Path, config: &EncodeConfig) -> Result<(), EncodeError> {
        let work = Workspace::new()?;

        let media = self.probe(source).await?;
        debug!(?media, "probed source");

        let video_plan = VideoPlan::new(config, &media);
        self.tools
            .encode_video(source, &video_plan, &work.video)
            .await
            .map_err(|_| EncodeError::stage(Stage::Video))?;
        ensure_output(&work.video, Stage::Video).await?;

        let audio_plan = AudioPlan::new(config, &media).ok_or_else(|| {
            EncodeError::Pipeline(
                "The video has no audio stream and its length is unknown.".to_string(),
            )
        })?;
        self.tools
            .encode_audio(source, &audio_plan, &work.audio)
            .await
            .map_err(|_| EncodeError::stage(Stage::Audio))?;
        ensure_output(&work.audio, Stage::Audio).await?;

        let index = self.build_gop(&work.video).await?;
        if config.has_gop_index() {
            tokio::fs::write(&work.gop, index.encode())
                .await
                .map_err(|_| EncodeError::stage(Stage::Gop))?;
            ensure_output(&work.gop, Stage::Gop).await?;
        }

        if config.has_thumbnail() {
            self.make_thumbnail(&work, index.frames, video_plan.fps)
                .await?;
        }

        assemble(&work, config, index.frames, video_plan.fps).await
    }
}

#[async_trait]
impl<T: MediaTools> Encoder for EncodePipeline<T> {
    async fn encode(&self, source: &Path, config: &EncodeConfig) -> Result<(), EncodeError> {
        info!(source = %source.display(), version = config.version(), "encoding started");
        let result = self.run(source, config).await;
        match &result {
            Ok(()) => info!(output = %config.output().display(), "encoding finished"),
            Err(e) => info!(error = %e, "encoding failed"),
        }
        result
    }
}

/// Writes the header for the measured segments, then concatenates every
/// segment in container order into the output file.
async fn assemble(
    work: &Workspace,
    config: &EncodeConfig,
    frames: u32,
    fps: u32,
) -> Result<(), EncodeError> {
    let version = config.version();
    let order = Segment::order(version);

    // sizes come from disk, never assumed
    let audio = nonempty_len(&work.audio, Stage::Header).await?;
    let video = nonempty_len(&work.video, Stage::Header).await?;
    let gop = if config.has_gop_index() {
        Some(nonempty_len(&work.gop, Stage::Header).await?)
    } else {
        None
    };
    if config.has_thumbnail() {
        nonempty_len(&work.thumbnail, Stage::Header).await?;
    }

    let layout = ContainerLayout::compute(version, SegmentSizes { audio, video, gop });
    let header = Header::new(layout, frames, fps as u16);
    tokio::fs::write(&work.header, header.encode())
        .await
        .map_err(|_| EncodeError::stage(Stage::Header))?;
    ensure_output(&work.header, Stage::Header).await?;

    let mut out = tokio::fs::File::create(config.output())
        .await
        .map_err(|_| EncodeError::stage(Stage::Final))?;
    for segment in order {
        let mut part = tokio::fs::File::open(work.segment(segment))
            .await
            .map_err(|_| EncodeError::stage(Stage::Final))?;
        tokio::io::copy(&mut part, &mut out)
            .await
            .map_err(|_| EncodeError::stage(Stage::Final))?;
    }
    out.flush()
        .await
        .map_err(|_| EncodeError::stage(Stage::Final))?;

    ensure_output(config.output(), Stage::Final).await
}

async fn nonempty_len(path: &Path, stage: Stage) -> Result<u64, EncodeError> {
    match file_len(path).await {
        Some(len) if len > 0 => Ok(len),
        _ => Err(EncodeError::stage(stage)),
    }
}

/// A stage that leaves a missing or empty file behind has failed, whatever
/// the tool's exit status said.
async fn ensure_output(path: &Path, stage: Stage) -> Result<(), EncodeError> {
    nonempty_len(path, stage).await.map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dpg::header::THUMBNAIL_LEN;
    use crate::domain::dpg::settings::RawEncodeConfig;
    use crate::ports::media::MockMediaTools;
    use image::{Rgb, RgbImage};
    use serde_json::json;
    use tempfile::tempdir;

    fn config(fps: u32, dpg: u8, output: &Path) -> EncodeConfig {
        EncodeConfig::validate(&RawEncodeConfig {
            fps: Some(fps.to_string()),
            dpg: Some(dpg.to_string()),
            width: Some("256".to_string()),
            height: Some("192".to_string()),
            aspect: None,
            quality: None,
        })
        .unwrap()
        .with_output(output)
    }

    fn probe_report(channels: Option<u32>, duration: Option<&str>) -> Vec<u8> {
        let mut streams = vec![json!({
            "codec_type": "video",
            "avg_frame_rate": "30/1",
            "width": 320,
            "height": 240
        })];
        if let Some(channels) = channels {
            streams.push(json!({ "codec_type": "audio", "channels": channels }));
        }
        let mut report = json!({ "streams": streams, "format": {} });
        if let Some(duration) = duration {
            report["format"]["duration"] = json!(duration);
        }
        report.to_string().into_bytes()
    }

    /// MPEG-1 shaped bytes: `sequences` sequence headers with ten pictures each.
    fn mpeg_stream(sequences: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..sequences {
            out.extend_from_slice(&[0x00, 0x00, 0x01, 0xB3, 0x10, 0x00, 0xC0, 0x13]);
            for _ in 0..10 {
                out.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x42, 0x42]);
            }
        }
        out
    }

    fn le32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn tools_writing(video: Vec<u8>, audio_len: usize) -> MockMediaTools {
        let mut tools = MockMediaTools::new();
        tools
            .expect_encode_video()
            .times(1)
            .returning(move |_, _, output| std::fs::write(output, &video));
        tools
            .expect_encode_audio()
            .times(1)
            .returning(move |_, _, output| std::fs::write(output, vec![0x55; audio_len]));
        tools
    }

    #[tokio::test]
    async fn test_dpg0_has_no_gop_or_thumbnail() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("0.dpg");
        let video = mpeg_stream(24);

        let mut tools = MockMediaTools::new();
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("10.0"))));
        let expected_video = video.clone();
        tools
            .expect_encode_video()
            .withf(|_, plan, _| plan.fps == 24 && plan.width == 256 && plan.height == 192)
            .times(1)
            .returning(move |_, _, output| std::fs::write(output, &expected_video));
        tools
            .expect_encode_audio()
            .withf(|_, plan, _| *plan == AudioPlan::Encode { channels: 1 })
            .times(1)
            .returning(|_, _, output| std::fs::write(output, vec![0x55; 500]));
        tools.expect_probe_frames().times(0);
        tools.expect_extract_frame().times(0);

        let pipeline = EncodePipeline::new(tools);
        pipeline
            .encode(Path::new("in.mp4"), &config(24, 0, &output))
            .await
            .unwrap();

        let dpg = std::fs::read(&output).unwrap();
        assert_eq!(&dpg[0..4], b"DPG0");
        assert_eq!(le32(&dpg, 4), 240);
        assert_eq!(&dpg[8..10], &[0, 24]);
        assert_eq!(le32(&dpg, 20), 36);
        assert_eq!(le32(&dpg, 24), 500);
        assert_eq!(le32(&dpg, 28), 536);
        assert_eq!(le32(&dpg, 32), video.len() as u32);
        assert_eq!(dpg.len(), 36 + 500 + video.len());
        assert_eq!(&dpg[536..], &video[..]);
    }

    #[tokio::test]
    async fn test_dpg4_layout_with_thumbnail() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("1.dpg");
        let video = mpeg_stream(15);

        let mut tools = tools_writing(video.clone(), 300);
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("10.0"))));
        tools
            .expect_extract_frame()
            .withf(|_, at_second, _| *at_second == 1)
            .times(1)
            .returning(|_, _, output| {
                RgbImage::from_pixel(320, 240, Rgb([200, 100, 50]))
                    .save(output)
                    .map_err(std::io::Error::other)
            });

        let pipeline = EncodePipeline::new(tools);
        pipeline
            .encode(Path::new("in.mp4"), &config(15, 4, &output))
            .await
            .unwrap();

        let dpg = std::fs::read(&output).unwrap();
        assert_eq!(&dpg[0..4], b"DPG4");
        assert_eq!(le32(&dpg, 4), 150);
        assert_eq!(&dpg[48..52], b"THM0");

        let audio_start = 52 + THUMBNAIL_LEN as usize;
        assert_eq!(le32(&dpg, 20) as usize, audio_start);
        let video_start = audio_start + 300;
        assert_eq!(le32(&dpg, 28) as usize, video_start);
        let gop_start = video_start + video.len();
        assert_eq!(le32(&dpg, 36) as usize, gop_start);
        assert_eq!(le32(&dpg, 40), 15 * 8);
        assert_eq!(dpg.len(), gop_start + 15 * 8);

        let pixel = u16::from_le_bytes([dpg[52], dpg[53]]);
        assert_eq!(pixel, thumbnail::pack_rgb15(200, 100, 50));
        // second GOP record: ten frames in
        assert_eq!(le32(&dpg, gop_start + 8), 10);
    }

    #[tokio::test]
    async fn test_unwritable_thumbnail_fails_thumbnail_stage() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("1.dpg");

        let mut tools = tools_writing(mpeg_stream(15), 300);
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("10.0"))));
        tools
            .expect_extract_frame()
            .times(1)
            .returning(|_, _, output| {
                // a directory where the packed thumbnail should go
                let workspace = output.parent().unwrap();
                std::fs::create_dir(workspace.join("thumbnail.tmp"))?;
                RgbImage::from_pixel(320, 240, Rgb([1, 2, 3]))
                    .save(output)
                    .map_err(std::io::Error::other)
            });

        let pipeline = EncodePipeline::new(tools);
        let err = pipeline
            .encode(Path::new("in.mp4"), &config(15, 4, &output))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Encoding failed at thumbnail stage.");
    }

    #[tokio::test]
    async fn test_silent_track_when_source_has_no_audio() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("2.dpg");

        let mut tools = MockMediaTools::new();
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(None, Some("7.5"))));
        tools
            .expect_encode_video()
            .returning(|_, _, output| std::fs::write(output, mpeg_stream(3)));
        tools
            .expect_encode_audio()
            .withf(|_, plan, _| *plan == AudioPlan::Silence { seconds: 7.5 })
            .times(1)
            .returning(|_, _, output| std::fs::write(output, [1u8; 64]));

        let pipeline = EncodePipeline::new(tools);
        pipeline
            .encode(Path::new("in.mp4"), &config(24, 2, &output))
            .await
            .unwrap();
        assert_eq!(&std::fs::read(&output).unwrap()[0..4], b"DPG2");
    }

    #[tokio::test]
    async fn test_no_audio_and_no_duration_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("3.dpg");

        let mut tools = MockMediaTools::new();
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(None, None)));
        tools
            .expect_encode_video()
            .returning(|_, _, output| std::fs::write(output, mpeg_stream(3)));
        tools.expect_encode_audio().times(0);

        let pipeline = EncodePipeline::new(tools);
        let result = pipeline
            .encode(Path::new("in.mp4"), &config(24, 2, &output))
            .await;
        assert!(matches!(result, Err(EncodeError::Pipeline(_))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_video_fails_video_stage() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("4.dpg");

        let mut tools = MockMediaTools::new();
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(1), Some("1.0"))));
        tools
            .expect_encode_video()
            .returning(|_, _, output| std::fs::write(output, b""));
        tools.expect_encode_audio().times(0);

        let pipeline = EncodePipeline::new(tools);
        let result = pipeline
            .encode(Path::new("in.mp4"), &config(24, 1, &output))
            .await;
        assert!(matches!(
            result,
            Err(EncodeError::Stage { stage: Stage::Video })
        ));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_stage() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("5.dpg");

        let mut tools = MockMediaTools::new();
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("1.0"))));
        tools
            .expect_encode_video()
            .returning(|_, _, output| std::fs::write(output, mpeg_stream(1)));
        tools
            .expect_encode_audio()
            .returning(|_, _, _| Err(std::io::Error::other("exit status: 1")));

        let pipeline = EncodePipeline::new(tools);
        let result = pipeline
            .encode(Path::new("in.mp4"), &config(24, 1, &output))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Encoding failed at audio stage.");
    }

    #[tokio::test]
    async fn test_unreadable_source_is_probe_failure() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("6.dpg");

        let mut tools = MockMediaTools::new();
        tools.expect_probe().returning(|_| Ok(b"not json".to_vec()));
        tools.expect_encode_video().times(0);

        let pipeline = EncodePipeline::new(tools);
        let result = pipeline
            .encode(Path::new("in.mp4"), &config(24, 1, &output))
            .await;
        assert!(matches!(result, Err(EncodeError::Probe(_))));
    }

    #[tokio::test]
    async fn test_stream_without_pictures_fails_gop_stage() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("7.dpg");

        let mut tools = tools_writing(vec![0xFF; 128], 10);
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("1.0"))));

        let pipeline = EncodePipeline::new(tools);
        let result = pipeline
            .encode(Path::new("in.mp4"), &config(24, 0, &output))
            .await;
        assert!(matches!(result, Err(EncodeError::Stage { stage: Stage::Gop })));
    }

    #[tokio::test]
    async fn test_frame_probe_strategy() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().join("8.dpg");

        let mut tools = tools_writing(vec![0xAB; 4000], 10);
        tools
            .expect_probe()
            .returning(|_| Ok(probe_report(Some(2), Some("1.0"))));
        tools
            .expect_probe_frames()
            .times(1)
            .returning(|_| Ok("frame,0,I\nframe,900,P\nframe,1800,P\nframe,2700,I\n".to_string()));

        let pipeline = EncodePipeline::new(tools).with_gop_strategy(GopStrategy::FrameProbe);
        pipeline
            .encode(Path::new("in.mp4"), &config(24, 3, &output))
            .await
            .unwrap();

        let dpg = std::fs::read(&output).unwrap();
        assert_eq!(le32(&dpg, 4), 4);
        assert_eq!(le32(&dpg, 40), 16);
        let gop_start = le32(&dpg, 36) as usize;
        assert_eq!(&dpg[gop_start..], &[0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0x8C, 0x0A, 0, 0]);
    }
}
