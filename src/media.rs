//! `ffmpeg`/`ffprobe` invocations used by the assembly pipeline.
//!
//! Every call waits for the child to exit, checks its status and returns the
//! captured output. A non-zero exit becomes [`MediaError::Failed`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::MediaError;

/// Exit code and captured streams of a finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Cuts `[start, end]` seconds out of `input`, video only.
    /// With `loop_input` the source is looped so the range may exceed its length.
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        end: f64,
        loop_input: bool,
    ) -> Result<ToolOutput, MediaError>;

    async fn overlay(
        &self,
        base: &Path,
        image: &Path,
        output: &Path,
        centered: bool,
    ) -> Result<ToolOutput, MediaError>;

    async fn concat_videos(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        video_only: bool,
    ) -> Result<ToolOutput, MediaError>;

    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<ToolOutput, MediaError>;

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<ToolOutput, MediaError>;

    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<ToolOutput, MediaError>;

    async fn probe_duration(&self, media: &Path) -> Result<f64, MediaError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub timeout: Option<Duration>,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
        }
    }

    /// First line of `<tool> -version`, for both tools.
    pub async fn versions(&self) -> Result<(String, String), MediaError> {
        let ffmpeg = run_tool(&self.ffmpeg, &["-version".to_string()], None, self.timeout).await?;
        let ffprobe = run_tool(&self.ffprobe, &["-version".to_string()], None, self.timeout).await?;
        let first = |out: &ToolOutput| out.stdout.lines().next().unwrap_or_default().to_string();
        Ok((first(&ffmpeg), first(&ffprobe)))
    }

    async fn run_ffmpeg(&self, args: Vec<String>, cwd: Option<&Path>) -> Result<ToolOutput, MediaError> {
        run_tool(&self.ffmpeg, &args, cwd, self.timeout).await
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        end: f64,
        loop_input: bool,
    ) -> Result<ToolOutput, MediaError> {
        self.run_ffmpeg(trim_args(input, output, start, end, loop_input), None).await
    }

    async fn overlay(
        &self,
        base: &Path,
        image: &Path,
        output: &Path,
        centered: bool,
    ) -> Result<ToolOutput, MediaError> {
        self.run_ffmpeg(overlay_args(base, image, output, centered), None).await
    }

    async fn concat_videos(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        video_only: bool,
    ) -> Result<ToolOutput, MediaError> {
        self.run_ffmpeg(concat_video_args(first, second, output, video_only), None).await
    }

    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<ToolOutput, MediaError> {
        let list = output.with_extension("txt");
        tokio::fs::write(&list, concat_list(inputs)?).await?;

        match self.run_ffmpeg(concat_audio_args(&list, output, true), None).await {
            Ok(out) => Ok(out),
            Err(MediaError::Failed { stderr, .. }) => {
                warn!("ffmpeg concat with copy failed; retrying with re-encode");
                debug!("copy concat stderr: {}", stderr);
                self.run_ffmpeg(concat_audio_args(&list, output, false), None).await
            }
            Err(e) => Err(e),
        }
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<ToolOutput, MediaError> {
        // The ass filter is given a bare file name and run from the subtitle's
        // directory, so the path needs no filter escaping.
        let dir = subtitles.parent().filter(|p| !p.as_os_str().is_empty());
        let name = subtitles
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| std::io::Error::other(format!("invalid subtitle path {}", subtitles.display())))?;
        let video = std::path::absolute(video)?;
        let output = std::path::absolute(output)?;
        self.run_ffmpeg(burn_args(&video, name, &output), dir).await
    }

    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<ToolOutput, MediaError> {
        self.run_ffmpeg(mux_args(video, audio, output), None).await
    }

    async fn probe_duration(&self, media: &Path) -> Result<f64, MediaError> {
        let out = run_tool(&self.ffprobe, &probe_args(media), None, self.timeout).await?;
        parse_duration(&self.ffprobe, &out.stdout)
    }
}

/// Runs `program` to completion, capturing stdout and stderr.
pub async fn run_tool(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<ToolOutput, MediaError> {
    debug!("Running {} {}", program, args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|source| MediaError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output = wait_with_timeout(program, child, timeout).await?;
    let out = ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !output.status.success() {
        return Err(MediaError::from_exit(program, out.code, &out.stderr));
    }
    Ok(out)
}

/// Waits for `child` to exit. On timeout the child is dropped, which kills it.
pub async fn wait_with_timeout(
    program: &str,
    child: Child,
    timeout: Option<Duration>,
) -> Result<Output, MediaError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(MediaError::Timeout {
                program: program.to_string(),
                seconds: limit.as_secs(),
            }),
        },
        None => Ok(child.wait_with_output().await?),
    }
}

pub fn parse_duration(program: &str, stdout: &str) -> Result<f64, MediaError> {
    stdout
        .trim()
        .lines()
        .next()
        .and_then(|l| l.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::BadDuration {
            program: program.to_string(),
            output: stdout.to_string(),
        })
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn secs(v: f64) -> String {
    format!("{:.3}", v.max(0.0))
}

pub fn trim_args(input: &Path, output: &Path, start: f64, end: f64, loop_input: bool) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    if loop_input {
        args.extend(["-stream_loop".into(), "-1".into()]);
    }
    args.extend([
        "-ss".into(),
        secs(start),
        "-i".into(),
        path_arg(input),
        "-t".into(),
        secs(end - start),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        path_arg(output),
    ]);
    args
}

pub fn overlay_args(base: &Path, image: &Path, output: &Path, centered: bool) -> Vec<String> {
    let position = if centered {
        "(main_w-overlay_w)/2:(main_h-overlay_h)/2"
    } else {
        "0:0"
    };
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(base),
        "-i".into(),
        path_arg(image),
        "-filter_complex".into(),
        format!("[0:v][1:v] overlay={}", position),
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        "0".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        path_arg(output),
    ]
}

pub fn concat_video_args(first: &Path, second: &Path, output: &Path, video_only: bool) -> Vec<String> {
    let filter = if video_only {
        "[0:v][1:v] concat=n=2:v=1:a=0"
    } else {
        "[0:v][0:a][1:v][1:a] concat=n=2:v=1:a=1"
    };
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(first),
        "-i".into(),
        path_arg(second),
        "-filter_complex".into(),
        filter.into(),
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        "18".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        path_arg(output),
    ]
}

/// Concat demuxer list, one `file '<path>'` line per input.
///
/// The demuxer resolves relative entries against the list's own directory,
/// so every entry is written as an absolute path.
pub fn concat_list(inputs: &[PathBuf]) -> std::io::Result<String> {
    let mut list = String::new();
    for input in inputs {
        let path = std::path::absolute(input)?;
        list.push_str(&format!("file '{}'\n", path.to_string_lossy().replace('\'', r"'\''")));
    }
    Ok(list)
}

pub fn concat_audio_args(list: &Path, output: &Path, copy: bool) -> Vec<String> {
    let codec = if copy { ["-c", "copy"] } else { ["-c:a", "pcm_s16le"] };
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list),
        codec[0].into(),
        codec[1].into(),
        path_arg(output),
    ]
}

pub fn burn_args(video: &Path, subtitle_name: &str, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(video),
        "-vf".into(),
        format!("ass={}", subtitle_name),
        "-c:a".into(),
        "copy".into(),
        path_arg(output),
    ]
}

pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(video),
        "-i".into(),
        path_arg(audio),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-shortest".into(),
        path_arg(output),
    ]
}

pub fn probe_args(media: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path_arg(media),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_duration() {
        assert_eq!(parse_duration("ffprobe", "3.456000\n").unwrap(), 3.456);
    }

    #[test]
    fn rejects_unparseable_duration() {
        assert!(matches!(
            parse_duration("ffprobe", "N/A\n"),
            Err(MediaError::BadDuration { .. })
        ));
        assert!(parse_duration("ffprobe", "").is_err());
    }

    #[test]
    fn trim_seeks_and_limits_length() {
        let args = trim_args(Path::new("bg.mp4"), Path::new("rest.mp4"), 3.0, 13.5, false);
        let joined = args.join(" ");
        assert!(joined.contains("-ss 3.000 -i bg.mp4 -t 10.500"));
        assert!(!joined.contains("-stream_loop"));
        assert_eq!(args.last().unwrap(), "rest.mp4");
    }

    #[test]
    fn looping_trim_loops_before_the_input() {
        let args = trim_args(Path::new("bg.mp4"), Path::new("o.mp4"), 0.0, 2.0, true);
        let loop_at = args.iter().position(|a| a == "-stream_loop").unwrap();
        let input_at = args.iter().position(|a| a == "-i").unwrap();
        assert!(loop_at < input_at);
    }

    #[test]
    fn overlay_is_centered_on_request() {
        let centered = overlay_args(Path::new("a.mp4"), Path::new("t.png"), Path::new("o.mp4"), true);
        assert!(centered.contains(&"[0:v][1:v] overlay=(main_w-overlay_w)/2:(main_h-overlay_h)/2".to_string()));
        let corner = overlay_args(Path::new("a.mp4"), Path::new("t.png"), Path::new("o.mp4"), false);
        assert!(corner.contains(&"[0:v][1:v] overlay=0:0".to_string()));
    }

    #[test]
    fn video_only_concat_drops_audio() {
        let args = concat_video_args(Path::new("a.mp4"), Path::new("b.mp4"), Path::new("o.mp4"), true);
        assert!(args.contains(&"[0:v][1:v] concat=n=2:v=1:a=0".to_string()));
    }

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/tmp/title.wav"), PathBuf::from("/tmp/it's.wav")]).unwrap();
        assert_eq!(list, "file '/tmp/title.wav'\nfile '/tmp/it'\\''s.wav'\n");
    }

    #[test]
    fn concat_list_entries_do_not_depend_on_the_list_location() {
        let config = crate::RunConfig::from_db(Path::new("./db"), Path::new("./output"));
        let list = concat_list(&[config.title_audio(), config.story_audio()]).unwrap();
        let cwd = std::env::current_dir().unwrap();

        let entries: Vec<&str> = list.lines().collect();
        assert_eq!(entries.len(), 2);
        for entry in entries {
            let path = Path::new(entry.trim_start_matches("file '").trim_end_matches('\''));
            assert!(path.is_absolute(), "{entry}");
            assert!(path.starts_with(&cwd), "{entry}");
        }
        assert!(list.contains("title.wav'"));
        assert!(list.contains("story.wav'"));
    }

    #[test]
    fn mux_maps_video_and_new_audio() {
        let args = mux_args(Path::new("v.mp4"), Path::new("a.wav"), Path::new("out.mp4")).join(" ");
        assert!(args.contains("-map 0:v:0 -map 1:a:0"));
        assert!(args.contains("-shortest"));
    }

    #[tokio::test]
    async fn slow_tool_is_killed_at_the_timeout() {
        let args = vec!["5".to_string()];
        let err = run_tool("sleep", &args, None, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout { ref program, .. } if program == "sleep"));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run_tool("storyreel-no-such-tool", &[], None, None).await.unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
    }
}
