use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voicelink_gateway::api::ApiServer;
use voicelink_gateway::audio::{
    self, CapturePipeline, CpalSink, PLAYBACK_RATE, PlaybackPipeline,
};
use voicelink_gateway::protocol::ClientMessage;
use voicelink_gateway::{Config, client};

/// Voicelink - realtime voice chat gateway for conversational speech models
#[derive(Parser)]
#[command(name = "voicelink", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Directory of static web assets to serve
    #[arg(long, env = "VOICELINK_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Hold a live voice conversation against a running gateway
    Talk {
        /// Gateway WebSocket URL
        #[arg(long, env = "VOICELINK_SERVER", default_value = "ws://127.0.0.1:8080/ws")]
        server: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicelink_gateway=info",
        1 => "info,voicelink_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Talk { server } => Ok(client::run(&server).await?),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let config = Config::from_env(cli.port, cli.static_dir)?;
    tracing::info!(port = config.port, model = %config.model, "starting voicelink gateway");

    let server = ApiServer::new(&config);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    Ok(())
}

/// Test microphone input by watching the encoded frame stream
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut frames) = mpsc::unbounded_channel();
    let mut capture = CapturePipeline::new(tx);
    capture.start()?;

    println!("Device rate: {} Hz, transport rate: 16000 Hz", capture.device_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples: Vec<f32> = Vec::new();
        let mut count = 0usize;
        while let Ok(frame) = frames.try_recv() {
            if let ClientMessage::Audio { data } = frame {
                count += 1;
                samples.extend(audio::pcm16_to_float(&audio::decode_base64(&data)?));
            }
        }

        let energy = calculate_rms(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] frames: {count:3} | RMS: {energy:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    let mut saw_end = false;
    while let Ok(frame) = frames.try_recv() {
        if frame == ClientMessage::AudioEnd {
            saw_end = true;
        }
    }

    println!("\n---");
    if saw_end {
        println!("audio_end emitted on stop — utterance boundary works.");
    }
    println!("If you saw movement in the meter, your mic is working!");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = PlaybackPipeline::new(std::sync::Arc::new(CpalSink::new()));

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), PLAYBACK_RATE);
    playback.enqueue(&audio::float_to_pcm16(&samples));

    while !playback.is_idle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}
