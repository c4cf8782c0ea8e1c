use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::wav_duration_seconds;
use crate::error::AlignError;
use crate::media::run_tool;
use crate::timestamps::{format_centis, parse_centis};

const COMMA_PAUSE: f64 = 0.2;
const SENTENCE_END_PAUSE: f64 = 0.4;
const WORD_WEIGHT_ALPHA: f64 = 0.75;

/// One timed subtitle line.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub style: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            style: "Default".to_string(),
        }
    }

    pub fn to_dialogue(&self) -> String {
        format!(
            "Dialogue: 0,{},{},{},,0,0,0,,{}",
            format_seconds(self.start),
            format_seconds(self.end),
            self.style,
            self.text.replace('\n', "\\N")
        )
    }
}

fn format_seconds(secs: f64) -> String {
    format_centis((secs.max(0.0) * 100.0).round() as u64)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    pub cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    /// Dialogue lines, one per cue, each terminated by a newline.
    pub fn to_events(&self) -> String {
        self.cues.iter().map(|c| c.to_dialogue() + "\n").collect()
    }

    /// Reads the `Dialogue:` lines of an ASS document. Other lines are ignored.
    pub fn parse_events(contents: &str) -> Self {
        let cues = contents.lines().filter_map(parse_dialogue).collect();
        Self { cues }
    }
}

fn parse_dialogue(line: &str) -> Option<SubtitleCue> {
    let body = line.trim_start().strip_prefix("Dialogue:")?;
    let fields: Vec<&str> = body.splitn(10, ',').collect();
    if fields.len() < 10 {
        return None;
    }
    Some(SubtitleCue {
        start: parse_centis(fields[1])? as f64 / 100.0,
        end: parse_centis(fields[2])? as f64 / 100.0,
        style: fields[3].trim().to_string(),
        text: fields[9].trim_end_matches('\r').to_string(),
    })
}

/// Produces timed cues for a narration and its transcript.
#[async_trait]
pub trait Aligner: Send + Sync {
    async fn align(&self, audio: &Path, transcript: &str) -> Result<SubtitleTrack, AlignError>;
}

/// Forced-alignment command run as `<program> <audio> <transcript> <output>`.
/// The output is an ASS document whose `Dialogue:` lines are taken as cues.
pub struct ExternalAligner {
    pub program: String,
    pub scratch: PathBuf,
    pub timeout: Option<Duration>,
}

#[async_trait]
impl Aligner for ExternalAligner {
    async fn align(&self, audio: &Path, transcript: &str) -> Result<SubtitleTrack, AlignError> {
        let lab = self.scratch.join("story.lab");
        let out = self.scratch.join("aligned.ass");
        tokio::fs::write(&lab, transcript).await?;

        let args: Vec<String> = [audio, lab.as_path(), out.as_path()]
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        run_tool(&self.program, &args, None, self.timeout).await?;

        let track = SubtitleTrack::parse_events(&tokio::fs::read_to_string(&out).await?);
        if track.cues.is_empty() {
            return Err(AlignError::NoCues(out));
        }
        info!("Aligner produced {} cues", track.cues.len());
        Ok(track)
    }
}

/// Spreads the narration's duration over the transcript's words.
///
/// Commas and sentence ends get a fixed pause. The remaining time is shared
/// between words by `len^0.75`, so longer words stay on screen longer.
pub struct HeuristicAligner;

#[async_trait]
impl Aligner for HeuristicAligner {
    async fn align(&self, audio: &Path, transcript: &str) -> Result<SubtitleTrack, AlignError> {
        let dur = wav_duration_seconds(audio)?;
        debug!("Narration duration: {:.2} seconds", dur);
        Ok(estimate_cues(transcript, dur))
    }
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w[\w'-]*)|([,.!?])").unwrap())
}

pub fn estimate_cues(transcript: &str, dur: f64) -> SubtitleTrack {
    let elements: Vec<&str> = word_re().find_iter(transcript).map(|m| m.as_str()).collect();
    if elements.is_empty() {
        let text = transcript.trim();
        if text.is_empty() {
            return SubtitleTrack::default();
        }
        return SubtitleTrack {
            cues: vec![SubtitleCue::new(0.0, dur, text)],
        };
    }

    let mut total_pause_time = 0.0;
    let mut word_elements = Vec::new();
    for &element in &elements {
        match element {
            "," => total_pause_time += COMMA_PAUSE,
            "." | "!" | "?" => total_pause_time += SENTENCE_END_PAUSE,
            _ => word_elements.push(element),
        }
    }

    // Pauses are dropped if they would not leave room for the words.
    let pause_scale = if total_pause_time > 0.0 && total_pause_time >= dur {
        0.0
    } else {
        1.0
    };
    let word_time_available = (dur - total_pause_time * pause_scale).max(0.0);
    let total_weight: f64 = word_elements
        .iter()
        .map(|w| (w.chars().count() as f64).powf(WORD_WEIGHT_ALPHA))
        .sum();

    let mut cues = Vec::with_capacity(word_elements.len());
    let mut current = 0.0;
    for element in elements {
        match element {
            "," => current += COMMA_PAUSE * pause_scale,
            "." | "!" | "?" => current += SENTENCE_END_PAUSE * pause_scale,
            word => {
                let weight = (word.chars().count() as f64).powf(WORD_WEIGHT_ALPHA);
                let word_duration = if total_weight > 0.0 {
                    word_time_available * weight / total_weight
                } else {
                    0.0
                };
                let end = (current + word_duration).min(dur);
                cues.push(SubtitleCue::new(current, end, word));
                current = end;
            }
        }
    }
    SubtitleTrack { cues }
}
