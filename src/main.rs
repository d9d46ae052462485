use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use readaloud::espeak_engine::DEFAULT_ESPEAK_PROGRAM;
use readaloud::local_engine::wait_for_voices;
use readaloud::providers::{fallback_models, fetch_catalog, CatalogError, ElevenLabsCatalog};
use readaloud::{
    AudioOutput, ChannelSink, CommandPlayer, EspeakEngine, PlaybackEvent, PlaybackOptions, ProviderKind, ReadAloud,
    Settings, SpeakOutcome,
};

#[derive(Parser)]
#[command(name = "readaloud")]
#[command(about = "Read text aloud with the local voice, OpenAI or ElevenLabs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to <config dir>/readaloud/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the configured provider (local, openai, elevenlabs)
    #[arg(long, global = true, value_parser = parse_provider)]
    provider: Option<ProviderKind>,

    /// Audio player command line; `{file}` and `{rate}` are substituted
    #[arg(long, global = true)]
    player: Option<String>,

    /// espeak-ng executable used for the local voice
    #[arg(long, global = true, default_value = DEFAULT_ESPEAK_PROGRAM)]
    espeak: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak TEXT (or stdin). While speaking, type p, r or s + Enter to
    /// pause, resume or stop.
    Speak { text: Option<String> },
    /// List the local voices
    Voices,
    /// Show the ElevenLabs models and voices for the configured key
    Catalog,
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    Ok(ProviderKind::from_setting(value))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readaloud=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.settings.as_deref())?;
    if let Some(provider) = cli.provider {
        settings.provider = provider;
    }
    let options = PlaybackOptions::default();

    match cli.command {
        Commands::Speak { text } => speak(text, settings, options, cli.player.as_deref(), &cli.espeak).await,
        Commands::Voices => list_voices(&cli.espeak, &options).await,
        Commands::Catalog => show_catalog(&settings, &options).await,
    }
}

async fn speak(
    text: Option<String>,
    settings: Settings,
    options: PlaybackOptions,
    player: Option<&str>,
    espeak: &str,
) -> Result<()> {
    // Stdin carries playback controls only when the text came from the command line.
    let controls_enabled = text.is_some();
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read text from stdin")?;
            buffer
        }
    };

    let output: Arc<dyn AudioOutput> = match player {
        Some(line) => Arc::new(CommandPlayer::from_command_line(line).ok_or_else(|| anyhow!("--player is empty"))?),
        None => Arc::new(CommandPlayer::default()),
    };
    let (sink, mut events) = ChannelSink::channel();
    let app = ReadAloud::new(EspeakEngine::spawn(espeak), output, Arc::new(sink), settings, options)?;

    let mut controls = spawn_control_reader(controls_enabled);
    let speaking = app.speak(&text);
    tokio::pin!(speaking);

    let result = loop {
        tokio::select! {
            result = &mut speaking => break result,
            Some(event) = events.recv() => print_event(&event),
            Some(line) = controls.recv() => handle_control(&app, line.trim()).await,
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    match result.context("Read-aloud failed")? {
        SpeakOutcome::Finished => info!("Done"),
        SpeakOutcome::Superseded => info!("Stopped"),
        SpeakOutcome::NothingToSay => warn!("Nothing to read"),
    }
    Ok(())
}

// A plain thread, so a pending read never holds up runtime shutdown.
fn spawn_control_reader(enabled: bool) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    if enabled {
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    rx
}

async fn handle_control(app: &ReadAloud, command: &str) {
    let outcome = match command {
        "p" | "pause" => app.pause().await,
        "r" | "resume" => app.resume().await,
        "" => app.toggle_pause().await,
        "s" | "stop" => {
            app.stop().await;
            Ok(())
        }
        other => {
            warn!("Unknown control {other:?}; use p, r or s");
            Ok(())
        }
    };
    if let Err(err) = outcome {
        warn!("{command} failed: {err}");
    }
}

fn print_event(event: &PlaybackEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!("Failed to encode event: {err}"),
    }
}

async fn list_voices(espeak: &str, options: &PlaybackOptions) -> Result<()> {
    let engine = EspeakEngine::spawn(espeak);
    let voices = wait_for_voices(&*engine, options.voices_poll_interval, options.voices_timeout).await;
    if voices.is_empty() {
        warn!("No local voices found; is {espeak} installed?");
    }
    for voice in &voices {
        println!("{}", serde_json::to_string(voice).context("Failed to encode voice")?);
    }
    Ok(())
}

async fn show_catalog(settings: &Settings, options: &PlaybackOptions) -> Result<()> {
    let client = options.http_client()?;
    let mut catalog = match fetch_catalog(&client, &options.elevenlabs_base_url, &settings.elevenlabs_api_key).await {
        Ok(catalog) => {
            info!(
                "Loaded {} models and {} voices.",
                catalog.models.len(),
                catalog.voices.len()
            );
            catalog
        }
        Err(err @ CatalogError::MissingApiKey) => {
            info!("{err}");
            ElevenLabsCatalog::default()
        }
        Err(err) => {
            warn!("{err}");
            ElevenLabsCatalog::default()
        }
    };
    if catalog.models.is_empty() {
        catalog.models = fallback_models();
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&catalog).context("Failed to encode catalog")?
    );
    Ok(())
}
