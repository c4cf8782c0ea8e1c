use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Part of a production run that can be enabled on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum Stage {
    Audio,
    Subtitles,
    Video,
}

impl Stage {
    pub fn all() -> BTreeSet<Stage> {
        [Stage::Audio, Stage::Subtitles, Stage::Video].into_iter().collect()
    }
}

/// Everything a run needs to know about its inputs and outputs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub story_file: PathBuf,
    pub title_file: PathBuf,
    pub videos_dir: PathBuf,
    pub images_dir: PathBuf,
    pub style_template: PathBuf,
    pub workspace_dir: PathBuf,
    pub output_dir: PathBuf,
    pub stages: BTreeSet<Stage>,
    pub centered_overlay: bool,
    pub tool_timeout: Option<Duration>,
}

impl RunConfig {
    /// Standard layout under a db directory: `story.txt`, `title.txt`, `videos/`,
    /// `images/`, `subtitles/default.ass` and the `temp/` workspace.
    pub fn from_db(db: &Path, output_dir: &Path) -> Self {
        Self {
            story_file: db.join("story.txt"),
            title_file: db.join("title.txt"),
            videos_dir: db.join("videos"),
            images_dir: db.join("images"),
            style_template: db.join("subtitles").join("default.ass"),
            workspace_dir: db.join("temp"),
            output_dir: output_dir.to_path_buf(),
            stages: Stage::all(),
            centered_overlay: true,
            tool_timeout: Some(Duration::from_secs(600)),
        }
    }

    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.workspace_dir.join("audio")
    }

    pub fn subtitles_dir(&self) -> PathBuf {
        self.workspace_dir.join("subtitles")
    }

    pub fn videos_work_dir(&self) -> PathBuf {
        self.workspace_dir.join("videos")
    }

    pub fn title_audio(&self) -> PathBuf {
        self.audio_dir().join("title.wav")
    }

    pub fn story_audio(&self) -> PathBuf {
        self.audio_dir().join("story.wav")
    }

    pub fn subtitle_file(&self) -> PathBuf {
        self.subtitles_dir().join("subtitles.ass")
    }

    /// Input files and directories that must exist for the enabled stages.
    pub fn required_inputs(&self) -> Vec<&Path> {
        let mut inputs = Vec::new();
        if self.runs(Stage::Audio) || self.runs(Stage::Subtitles) {
            inputs.push(self.story_file.as_path());
        }
        if self.runs(Stage::Audio) {
            inputs.push(self.title_file.as_path());
        }
        if self.runs(Stage::Subtitles) {
            inputs.push(self.style_template.as_path());
        }
        if self.runs(Stage::Video) {
            inputs.push(self.videos_dir.as_path());
        }
        inputs
    }
}
