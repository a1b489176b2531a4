//! `captionfuse` CLI - speaker-attributed captions for video files

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use captionfuse::CaptionFormat;

#[derive(Parser)]
#[command(name = "captionfuse")]
#[command(about = "Speaker-attributed closed captions from transcript, diarization and face identity")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/captionfuse/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); `RUST_LOG` takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Caption one or more media files
    Caption {
        /// Media files to caption
        #[arg(required = true)]
        media: Vec<PathBuf>,

        /// Replay saved engine output from DIR instead of running models
        #[arg(long, value_name = "DIR")]
        recorded: Option<PathBuf>,

        /// Known-faces gallery written by `embed-faces`
        #[arg(short, long, value_name = "FILE")]
        gallery: Option<PathBuf>,

        /// Output format (srt, vtt, json)
        #[arg(short, long, default_value = "srt")]
        format: CaptionFormat,

        /// Directory for caption files (default: next to each media file)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Files captioned at the same time
        #[arg(short = 'j', long, default_value = "1")]
        concurrency: usize,

        /// Add [silence] cues for long silences (needs ffmpeg)
        #[arg(long)]
        detect_silence: bool,

        /// Override `min_overlap_fraction`
        #[arg(long)]
        min_overlap_fraction: Option<f64>,

        /// Override `min_cluster_overlap_seconds`
        #[arg(long, value_name = "SECONDS")]
        min_cluster_overlap: Option<f64>,

        /// Override `max_chars_per_line`
        #[arg(long)]
        max_chars_per_line: Option<usize>,

        /// Override the Whisper model (tiny, base, small, medium, large)
        #[arg(long)]
        whisper_model: Option<String>,
    },

    /// Build a known-faces gallery from reference photos
    EmbedFaces {
        /// JSON list of {"name", "image_path"} entries
        input: PathBuf,

        /// Gallery file to write
        #[arg(short, long, default_value = "known_faces.json")]
        output: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Caption {
            media,
            recorded,
            gallery,
            format,
            output_dir,
            concurrency,
            detect_silence,
            min_overlap_fraction,
            min_cluster_overlap,
            max_chars_per_line,
            whisper_model,
        } => {
            let args = cmd::caption::CaptionArgs {
                media,
                recorded,
                gallery,
                format,
                output_dir,
                concurrency,
                detect_silence,
                overrides: cmd::caption::Overrides {
                    min_overlap_fraction,
                    min_cluster_overlap,
                    max_chars_per_line,
                    whisper_model,
                },
            };
            cmd::caption::cmd_caption(args, config_path).await?;
        }
        Commands::EmbedFaces { input, output } => {
            cmd::embed_faces::cmd_embed_faces(&input, &output, config_path).await?;
        }
        Commands::Config => {
            cmd::config::cmd_config(config_path)?;
        }
    }

    Ok(())
}
