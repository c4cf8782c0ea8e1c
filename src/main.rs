use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use storyreel::args::{Args, Engine};
use storyreel::media::Ffmpeg;
use storyreel::subtitle::{Aligner, ExternalAligner, HeuristicAligner};
use storyreel::tts::{GoogleTts, PiperTts, SpeechSynthesizer};
use storyreel::{Pipeline, RunConfig, StoryInput};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = args.run_config();
    let media = Ffmpeg::new(&args.ffmpeg, &args.ffprobe, config.tool_timeout);

    if args.check {
        return check(&config, &media).await;
    }

    info!("Starting story video generation pipeline");
    for input in config.required_inputs() {
        if !input.exists() {
            error!("Required input not found: {}", input.display());
            anyhow::bail!("required input not found: {}", input.display());
        }
    }

    let synthesizer: Box<dyn SpeechSynthesizer> = match args.engine {
        Engine::Google => Box::new(
            GoogleTts::new(args.google_api_key.clone(), args.voice_config(), config.tool_timeout)
                .context("cannot set up Google TTS")?,
        ),
        Engine::Piper => Box::new(PiperTts {
            binary: args.piper.clone(),
            model: args.piper_model.clone(),
            scratch: config.workspace_dir.join("piper"),
            timeout: config.tool_timeout,
        }),
    };
    let aligner: Box<dyn Aligner> = match &args.aligner {
        Some(program) => Box::new(ExternalAligner {
            program: program.clone(),
            scratch: config.subtitles_dir(),
            timeout: config.tool_timeout,
        }),
        None => {
            info!("No aligner configured; estimating cue timings");
            Box::new(HeuristicAligner)
        }
    };

    let input = StoryInput::load(&config)
        .await
        .with_context(|| format!("cannot read story/title from {}", args.db.display()))?;
    if !input.story.is_empty() {
        info!("Using story (short preview): {:.200}", input.story.replace('\n', " "));
    }

    let pipeline = Pipeline::new(config, synthesizer, aligner, Box::new(media));
    match pipeline.run(&input).await {
        Ok(Some(output)) => info!("Done: {}", output.display()),
        Ok(None) => info!("Done; no video stage requested"),
        Err(e) => {
            error!("Production run failed: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}

async fn check(config: &RunConfig, media: &Ffmpeg) -> anyhow::Result<()> {
    let mut problems = 0;
    match media.versions().await {
        Ok((ffmpeg, ffprobe)) => {
            info!("{}", ffmpeg);
            info!("{}", ffprobe);
        }
        Err(e) => {
            error!("Media tools unavailable: {}", e);
            problems += 1;
        }
    }
    for input in config.required_inputs() {
        if input.exists() {
            info!("Found {}", input.display());
        } else {
            warn!("Missing {}", input.display());
            problems += 1;
        }
    }
    match storyreel::workspace::find_overlay(&config.images_dir) {
        Ok(Some(image)) => info!("Overlay image: {}", image.display()),
        Ok(None) => warn!("No overlay image; the intro will have no title card"),
        Err(e) => {
            warn!("{}", e);
            problems += 1;
        }
    }
    if problems > 0 {
        anyhow::bail!("{} problem(s) found", problems);
    }
    info!("Everything looks ready.");
    Ok(())
}
