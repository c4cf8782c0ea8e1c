use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single `ffmpeg`/`ffprobe` invocation.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {code}: {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("could not read a duration from {program} output {output:?}")]
    BadDuration { program: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MediaError {
    /// Builds a `Failed` error from a finished process, keeping only the tail of stderr.
    pub fn from_exit(program: &str, code: Option<i32>, stderr: &str) -> Self {
        let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        MediaError::Failed {
            program: program.to_string(),
            code,
            stderr: tail(stderr, 20),
        }
    }
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("speech service response has no audio content")]
    EmptyAudio,

    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("synthesized audio is not a valid WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("speech engine is not configured: {0}")]
    Configuration(String),

    #[error("TTS engine failed: {0}")]
    Engine(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("aligner failed: {0}")]
    Tool(#[from] MediaError),

    #[error("aligner produced no cues for {0}")]
    NoCues(PathBuf),

    #[error("cannot read audio duration: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Named step of a production run, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResetWorkspace,
    SynthesizeTitle,
    SynthesizeStory,
    WriteSubtitleHeader,
    Align,
    ProbeTitle,
    ShiftSubtitles,
    ConcatAudio,
    ProbeNarration,
    ProbeBackground,
    TrimIntro,
    Overlay,
    TrimRest,
    ConcatVideo,
    BurnSubtitles,
    MuxAudio,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ResetWorkspace => "reset-workspace",
            Step::SynthesizeTitle => "synthesize-title",
            Step::SynthesizeStory => "synthesize-story",
            Step::WriteSubtitleHeader => "write-subtitle-header",
            Step::Align => "align",
            Step::ProbeTitle => "probe-title",
            Step::ShiftSubtitles => "shift-subtitles",
            Step::ConcatAudio => "concat-audio",
            Step::ProbeNarration => "probe-narration",
            Step::ProbeBackground => "probe-background",
            Step::TrimIntro => "trim-intro",
            Step::Overlay => "overlay",
            Step::TrimRest => "trim-rest",
            Step::ConcatVideo => "concat-video",
            Step::BurnSubtitles => "burn-subtitles",
            Step::MuxAudio => "mux-audio",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying cause of a failed step.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Align(#[from] AlignError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("step `{step}` failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: StepFailure,
    },

    #[error("no background video available in {0}")]
    NoBackgroundVideo(PathBuf),

    #[error("expected at most one overlay image in {dir}, found {count}")]
    AmbiguousOverlay { dir: PathBuf, count: usize },

    #[error("{0} text is empty")]
    EmptyInput(&'static str),

    #[error("missing artifact {0}; enable the stage that produces it")]
    MissingArtifact(PathBuf),

    #[error("workspace {0} is in use by another run")]
    Busy(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn step(&self) -> Option<Step> {
        match self {
            PipelineError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Tags a step-level error with the step it happened in.
pub trait StepContext<T> {
    fn step(self, step: Step) -> Result<T>;
}

impl<T, E: Into<StepFailure>> StepContext<T> for std::result::Result<T, E> {
    fn step(self, step: Step) -> Result<T> {
        self.map_err(|e| PipelineError::Step {
            step,
            source: e.into(),
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
