use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;
use voxpipe::audio::listen;
use voxpipe::cli::{Cli, Commands};
use voxpipe::config::Config;
use voxpipe::defaults;
use voxpipe::{
    AudioPlayer, AudioSource, Microphone, RateConvert, SquelchParams, SquelchedSource, WavSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Listen {
            wav,
            device,
            level,
            calibrate,
            play,
        } => {
            run_listen(config, wav.as_deref(), device.as_deref(), level, calibrate, play).await?;
        }
        Commands::Calibrate { device, duration } => {
            run_calibrate(config, device.as_deref(), duration).await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Play { wav } => {
            run_play(&wav).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from the given path, or the default path, applying
/// environment overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// Build the squelched pipeline over the chosen input and report utterances.
async fn run_listen(
    config: Config,
    wav: Option<&Path>,
    device: Option<&str>,
    level_override: Option<f32>,
    calibrate: Duration,
    play: bool,
) -> Result<()> {
    let source: Box<dyn AudioSource> = match wav {
        Some(path) => Box::new(WavSource::new(path)),
        None => Box::new(Microphone::with_device(
            device.or(config.audio.device.as_deref()),
            config.audio.sample_rate,
        )),
    };
    let converted = RateConvert::new(source, defaults::SAMPLE_RATE);

    let params = SquelchParams {
        sample_size: config.squelch.sample_size,
        prefix_chunks: config.squelch.prefix_chunks,
        level: level_override.or(config.squelch.level),
    };
    let mut squelched = SquelchedSource::with_params(converted, params);

    if squelched.level().is_none() {
        println!("Detecting squelch level ({})...", humantime::format_duration(calibrate));
        let level = squelched
            .detect_squelch_level_at(calibrate, config.squelch.percentile)
            .await?;
        println!("Squelch level: {}", format!("{:.5}", level).green());
    }

    if play {
        let player = AudioPlayer::new(defaults::SAMPLE_RATE);
        player.play(&mut squelched).await?;
        return Ok(());
    }

    listen(&mut squelched, async |src| {
        let mut index = 0usize;
        while let Some(mut block) = src.next_block().await? {
            index += 1;
            println!("{} utterance {}", "▶".green(), index);
            let mut samples = 0usize;
            while let Some(chunk) = block.next_chunk().await? {
                samples += chunk.sample_count();
            }
            let secs = samples as f64 / defaults::SAMPLE_RATE as f64;
            println!(
                "  {} {:.2}s of audio ({} samples)",
                "ended:".dimmed(),
                secs,
                samples
            );
        }
        Ok(())
    })
    .await?;
    println!("Source exhausted.");

    Ok(())
}

/// Detect and print a squelch level from the microphone.
async fn run_calibrate(config: Config, device: Option<&str>, duration: Duration) -> Result<()> {
    let mic = Microphone::with_device(
        device.or(config.audio.device.as_deref()),
        config.audio.sample_rate,
    );
    let converted = RateConvert::new(mic, defaults::SAMPLE_RATE);

    let params = SquelchParams {
        sample_size: config.squelch.sample_size,
        prefix_chunks: config.squelch.prefix_chunks,
        level: None,
    };
    let mut squelched = SquelchedSource::with_params(converted, params);

    println!(
        "Listening for {}... stay quiet for ambient calibration.",
        humantime::format_duration(duration)
    );
    let level = squelched
        .detect_squelch_level_at(duration, config.squelch.percentile)
        .await?;
    println!("Squelch level: {}", format!("{:.5}", level).green());
    println!("Persist it with `level = {:.5}` under [squelch] in the config.", level);

    Ok(())
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = voxpipe::audio::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Play a WAV file to the default output device.
async fn run_play(wav: &Path) -> Result<()> {
    let source = WavSource::new(wav);
    let mut converted = RateConvert::new(source, defaults::SAMPLE_RATE);
    let player = AudioPlayer::new(defaults::SAMPLE_RATE);
    player.play(&mut converted).await?;
    Ok(())
}
