//! Mock collaborators and a scratch db layout for pipeline tests.

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use storyreel::RunConfig;
use storyreel::error::{AlignError, MediaError, SynthesisError};
use storyreel::media::{MediaTool, ToolOutput};
use storyreel::subtitle::{Aligner, SubtitleCue, SubtitleTrack};
use storyreel::tts::SpeechSynthesizer;

pub const STYLE: &str = "[Script Info]\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,20\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n";

pub fn wav(seconds: f64) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut out, spec).unwrap();
        for _ in 0..(seconds * 8000.0) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    out.into_inner()
}

/// A db directory with story, title, style template and one background video.
pub struct Fixture {
    pub dir: TempDir,
    pub config: RunConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        let config = RunConfig::from_db(&db, &dir.path().join("output"));
        std::fs::create_dir_all(&config.videos_dir).unwrap();
        std::fs::create_dir_all(&config.images_dir).unwrap();
        std::fs::create_dir_all(config.style_template.parent().unwrap()).unwrap();
        std::fs::write(&config.story_file, "It was late, and the house was quiet.").unwrap();
        std::fs::write(&config.title_file, "The knock").unwrap();
        std::fs::write(&config.style_template, STYLE).unwrap();
        std::fs::write(config.videos_dir.join("bg.mp4"), b"").unwrap();
        Self { dir, config }
    }

    pub fn with_overlay(self) -> Self {
        std::fs::write(self.config.images_dir.join("title.png"), b"").unwrap();
        self
    }

    pub fn without_backgrounds(self) -> Self {
        std::fs::remove_file(self.config.videos_dir.join("bg.mp4")).unwrap();
        self
    }
}

pub struct MockSynthesizer {
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        if self.fail {
            return Err(SynthesisError::Api {
                status: 403,
                body: "permission denied".to_string(),
            });
        }
        Ok(wav(text.len() as f64 / 100.0))
    }
}

/// Returns one cue per entry, in story-audio time.
pub struct MockAligner {
    pub cues: Vec<(f64, f64, &'static str)>,
}

#[async_trait]
impl Aligner for MockAligner {
    async fn align(&self, _audio: &Path, _transcript: &str) -> Result<SubtitleTrack, AlignError> {
        Ok(SubtitleTrack {
            cues: self
                .cues
                .iter()
                .map(|(s, e, t)| SubtitleCue::new(*s, *e, *t))
                .collect(),
        })
    }
}

/// Records every call and touches every output file.
#[derive(Clone, Default)]
pub struct MockMedia {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub title_duration: f64,
    pub whole_duration: f64,
    pub background_duration: f64,
    pub fail_on: Option<&'static str>,
}

impl MockMedia {
    pub fn new(title_duration: f64, whole_duration: f64, background_duration: f64) -> Self {
        Self {
            calls: Arc::default(),
            title_duration,
            whole_duration,
            background_duration,
            fail_on: None,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, detail: String, output: Option<&Path>) -> Result<ToolOutput, MediaError> {
        self.calls.lock().unwrap().push(format!("{} {}", op, detail));
        if self.fail_on == Some(op) {
            return Err(MediaError::from_exit("ffmpeg", Some(1), "Invalid data found when processing input"));
        }
        if let Some(path) = output {
            std::fs::write(path, b"")?;
        }
        Ok(ToolOutput::default())
    }
}

fn name(p: &Path) -> String {
    p.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl MediaTool for MockMedia {
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        end: f64,
        loop_input: bool,
    ) -> Result<ToolOutput, MediaError> {
        let detail = format!("{} {} {:.2} {:.2} loop={}", name(input), name(output), start, end, loop_input);
        self.record("trim", detail, Some(output))
    }

    async fn overlay(
        &self,
        base: &Path,
        image: &Path,
        output: &Path,
        centered: bool,
    ) -> Result<ToolOutput, MediaError> {
        let detail = format!("{} {} {} centered={}", name(base), name(image), name(output), centered);
        self.record("overlay", detail, Some(output))
    }

    async fn concat_videos(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        video_only: bool,
    ) -> Result<ToolOutput, MediaError> {
        let detail = format!("{} {} {} video_only={}", name(first), name(second), name(output), video_only);
        self.record("concat_videos", detail, Some(output))
    }

    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<ToolOutput, MediaError> {
        let names: Vec<String> = inputs.iter().map(|p| name(p)).collect();
        self.record("concat_audio", format!("{} {}", names.join("+"), name(output)), Some(output))
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<ToolOutput, MediaError> {
        let detail = format!("{} {} {}", name(video), name(subtitles), name(output));
        self.record("burn_subtitles", detail, Some(output))
    }

    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<ToolOutput, MediaError> {
        let detail = format!("{} {} {}", name(video), name(audio), name(output));
        self.record("mux_audio", detail, Some(output))
    }

    async fn probe_duration(&self, media: &Path) -> Result<f64, MediaError> {
        self.record("probe", name(media), None)?;
        Ok(match name(media).as_str() {
            "title.wav" => self.title_duration,
            "narration.wav" => self.whole_duration,
            _ => self.background_duration,
        })
    }
}
