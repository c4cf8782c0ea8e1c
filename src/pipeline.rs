//! The production run: narration, subtitles and the final video assembly.
//!
//! A run is strictly sequential. The title audio plays over the intro clip
//! carrying the overlay image, so the subtitle cues (timed against the story
//! audio alone) are pushed back by the title's duration, and the background
//! video is split at that same point.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, Stage};
use crate::error::{PipelineError, Result, Step, StepContext};
use crate::media::MediaTool;
use crate::subtitle::Aligner;
use crate::timestamps;
use crate::tts::SpeechSynthesizer;
use crate::workspace::{self, RunLock};

/// Story and title text of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryInput {
    pub story: String,
    pub title: String,
}

impl StoryInput {
    pub fn new(story: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            story: story.into(),
            title: title.into(),
        }
    }

    /// Reads the story and title files named by `config`. A file is only read
    /// when an enabled stage uses it; otherwise its text is left empty.
    pub async fn load(config: &RunConfig) -> std::io::Result<Self> {
        let needs_story = config.runs(Stage::Audio) || config.runs(Stage::Subtitles);
        let story = read_if(needs_story, &config.story_file).await?;
        let title = read_if(config.runs(Stage::Audio), &config.title_file).await?;
        Ok(Self { story, title })
    }
}

pub struct Pipeline {
    config: RunConfig,
    synthesizer: Box<dyn SpeechSynthesizer>,
    aligner: Box<dyn Aligner>,
    media: Box<dyn MediaTool>,
}

impl Pipeline {
    pub fn new(
        config: RunConfig,
        synthesizer: Box<dyn SpeechSynthesizer>,
        aligner: Box<dyn Aligner>,
        media: Box<dyn MediaTool>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            aligner,
            media,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the enabled stages in order. Returns the output video, or `None`
    /// when the video stage is disabled.
    pub async fn run(&self, input: &StoryInput) -> Result<Option<PathBuf>> {
        let _lock = RunLock::acquire(&self.config.workspace_dir)?;
        info!("Starting production run (stages: {:?})", self.config.stages);

        if self.config.runs(Stage::Audio) {
            self.create_audio(input).await?;
        }
        if self.config.runs(Stage::Subtitles) {
            self.create_subtitles(input).await?;
        }
        if !self.config.runs(Stage::Video) {
            info!("Video stage disabled; workspace left at '{}'", self.config.workspace_dir.display());
            return Ok(None);
        }
        let output = self.create_video().await?;
        info!("Process complete.");
        Ok(Some(output))
    }

    async fn create_audio(&self, input: &StoryInput) -> Result<()> {
        if input.title.trim().is_empty() {
            return Err(PipelineError::EmptyInput("title"));
        }
        if input.story.trim().is_empty() {
            return Err(PipelineError::EmptyInput("story"));
        }
        workspace::reset(&self.config.audio_dir()).step(Step::ResetWorkspace)?;

        info!("Synthesizing title ({} chars)", input.title.len());
        let title = self
            .synthesizer
            .synthesize(&input.title)
            .await
            .step(Step::SynthesizeTitle)?;
        tokio::fs::write(self.config.title_audio(), title)
            .await
            .step(Step::SynthesizeTitle)?;

        info!("Synthesizing story ({} chars)", input.story.len());
        let story = self
            .synthesizer
            .synthesize(&input.story)
            .await
            .step(Step::SynthesizeStory)?;
        tokio::fs::write(self.config.story_audio(), story)
            .await
            .step(Step::SynthesizeStory)?;

        info!("Audio written to '{}'", self.config.audio_dir().display());
        Ok(())
    }

    async fn create_subtitles(&self, input: &StoryInput) -> Result<()> {
        let story_audio = require(self.config.story_audio())?;
        let title_audio = require(self.config.title_audio())?;
        let subtitle_file = self.config.subtitle_file();
        workspace::reset(&self.config.subtitles_dir()).step(Step::ResetWorkspace)?;

        let mut header = tokio::fs::read_to_string(&self.config.style_template)
            .await
            .step(Step::WriteSubtitleHeader)?;
        if !header.is_empty() && !header.ends_with('\n') {
            header.push('\n');
        }
        tokio::fs::write(&subtitle_file, &header)
            .await
            .step(Step::WriteSubtitleHeader)?;

        let track = self
            .aligner
            .align(&story_audio, &input.story)
            .await
            .step(Step::Align)?;
        info!("Aligned {} cues against the story audio", track.cues.len());
        append(&subtitle_file, &track.to_events()).await.step(Step::Align)?;

        let overlay_duration = self
            .media
            .probe_duration(&title_audio)
            .await
            .step(Step::ProbeTitle)?;
        debug!("Shifting subtitles by {:.2}s", overlay_duration);
        let contents = tokio::fs::read_to_string(&subtitle_file)
            .await
            .step(Step::ShiftSubtitles)?;
        tokio::fs::write(&subtitle_file, timestamps::adjust(&contents, overlay_duration))
            .await
            .step(Step::ShiftSubtitles)?;

        info!("Subtitles written to '{}'", subtitle_file.display());
        Ok(())
    }

    async fn create_video(&self) -> Result<PathBuf> {
        let title_audio = require(self.config.title_audio())?;
        let story_audio = require(self.config.story_audio())?;
        let subtitles = require(self.config.subtitle_file())?;

        // Inputs are resolved before any tool runs.
        let background = workspace::pick_background(&self.config.videos_dir, &mut rand::thread_rng())?;
        let overlay = workspace::find_overlay(&self.config.images_dir)?;
        info!("Using background video '{}'", background.display());

        let work = self.config.videos_work_dir();
        workspace::reset(&work).step(Step::ResetWorkspace)?;
        let media = self.media.as_ref();

        let narration = work.join("narration.wav");
        media
            .concat_audio(&[title_audio.clone(), story_audio], &narration)
            .await
            .step(Step::ConcatAudio)?;
        let whole_duration = media.probe_duration(&narration).await.step(Step::ProbeNarration)?;
        let overlay_duration = media.probe_duration(&title_audio).await.step(Step::ProbeTitle)?;
        let source_duration = media
            .probe_duration(&background)
            .await
            .step(Step::ProbeBackground)?;
        info!(
            "Narration {:.2}s, title {:.2}s, background {:.2}s",
            whole_duration, overlay_duration, source_duration
        );

        let loop_input = whole_duration > source_duration;
        if loop_input {
            warn!("Background is shorter than the narration; looping it");
        }

        let intro = work.join("intro.mp4");
        media
            .trim(&background, &intro, 0.0, overlay_duration, loop_input)
            .await
            .step(Step::TrimIntro)?;

        let intro = match overlay {
            Some(image) => {
                let with_overlay = work.join("intro_overlay.mp4");
                media
                    .overlay(&intro, &image, &with_overlay, self.config.centered_overlay)
                    .await
                    .step(Step::Overlay)?;
                with_overlay
            }
            None => {
                warn!(
                    "No overlay image in '{}'; intro has no title card",
                    self.config.images_dir.display()
                );
                intro
            }
        };

        let rest = work.join("rest.mp4");
        media
            .trim(&background, &rest, overlay_duration, whole_duration, loop_input)
            .await
            .step(Step::TrimRest)?;

        let assembled = work.join("assembled.mp4");
        media
            .concat_videos(&intro, &rest, &assembled, true)
            .await
            .step(Step::ConcatVideo)?;

        let subtitled = work.join("subtitled.mp4");
        media
            .burn_subtitles(&assembled, &subtitles, &subtitled)
            .await
            .step(Step::BurnSubtitles)?;

        let output = workspace::next_output_path(&self.config.output_dir).step(Step::MuxAudio)?;
        media
            .mux_audio(&subtitled, &narration, &output)
            .await
            .step(Step::MuxAudio)?;

        info!("Final video written to '{}'", output.display());
        Ok(output)
    }
}

async fn read_if(needed: bool, path: &Path) -> std::io::Result<String> {
    if needed {
        tokio::fs::read_to_string(path).await
    } else {
        Ok(String::new())
    }
}

fn require(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(PipelineError::MissingArtifact(path))
    }
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().append(true).open(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}
