use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{RunConfig, Stage};
use crate::tts::VoiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Google,
    Piper,
}

/// Turns a story and a title into a narrated, subtitled short video.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Directory holding story.txt, title.txt, videos/, images/, subtitles/ and temp/
    #[clap(long, default_value = "./db")]
    pub db: PathBuf,

    #[clap(long, default_value = "./output")]
    pub out: PathBuf,

    /// Stages to run; skipped stages reuse what is already in the workspace
    #[clap(long, value_enum, value_delimiter = ',', default_values = ["audio", "subtitles", "video"])]
    pub stages: Vec<Stage>,

    #[clap(long, value_enum, default_value_t = Engine::Google)]
    pub engine: Engine,

    #[clap(long, env = "GOOGLE_TTS_API_KEY", hide_env_values = true, default_value = "")]
    pub google_api_key: String,

    #[clap(long, default_value = "en-US-Neural2-C")]
    pub voice: String,

    #[clap(long, default_value = "en-US")]
    pub language: String,

    #[clap(long, default_value = "piper")]
    pub piper: String,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: PathBuf,

    /// Forced-alignment command, run as `<cmd> <audio> <transcript> <output.ass>`.
    /// Without it, cue timings are estimated from the narration length.
    #[clap(long)]
    pub aligner: Option<String>,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe: String,

    /// Seconds before an external tool or request is abandoned; 0 disables the limit
    #[clap(long, default_value_t = 600)]
    pub tool_timeout: u64,

    /// Place the overlay image in the top-left corner instead of the center
    #[clap(long)]
    pub overlay_top_left: bool,

    /// Check tools and input layout, then exit
    #[clap(long)]
    pub check: bool,

    #[clap(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn timeout(&self) -> Option<Duration> {
        (self.tool_timeout > 0).then(|| Duration::from_secs(self.tool_timeout))
    }

    pub fn voice_config(&self) -> VoiceConfig {
        let mut config = VoiceConfig::default();
        config.voice.name = self.voice.clone();
        config.voice.language_code = self.language.clone();
        config
    }

    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::from_db(&self.db, &self.out);
        config.stages = self.stages.iter().copied().collect();
        config.centered_overlay = !self.overlay_top_left;
        config.tool_timeout = self.timeout();
        config
    }
}
