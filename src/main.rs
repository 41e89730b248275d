use std::path::{Path, PathBuf};

use anyhow::Context;
use audio_to_midi::analysis::note_intensity::PeakSuppression;
use audio_to_midi::analysis::window_function::WindowFunction;
use audio_to_midi::{load_config, Transcriber, TranscriptionConfig};
use clap::{Args, Parser, Subcommand};

/// Transcribe recorded audio into a Standard MIDI File
#[derive(Parser)]
#[command(name = "audio-to-midi")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a WAV file (`-` reads standard input)
    Transcribe {
        input: PathBuf,

        /// Output MIDI file, defaults to the input name with a .mid extension
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the effective configuration as JSON
    ShowConfig {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args)]
struct Overrides {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    frame_length: Option<usize>,

    #[arg(long)]
    hop: Option<usize>,

    #[arg(long, value_enum)]
    window: Option<WindowFunction>,

    /// log10 of the weakest peak power that still counts
    #[arg(long, allow_negative_numbers = true)]
    cut_ratio: Option<f64>,

    #[arg(long)]
    note_low: Option<u8>,

    #[arg(long)]
    note_high: Option<u8>,

    /// Spectral workers, 0 for one per core
    #[arg(long)]
    threads: Option<usize>,

    /// Resample the input to this rate first
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Clear the falling flanks around every picked peak
    #[arg(long)]
    flank_suppression: bool,

    /// Use nominal bin frequencies instead of phase-corrected ones
    #[arg(long)]
    no_phase_correction: bool,
}

impl Overrides {
    fn resolve(self) -> anyhow::Result<TranscriptionConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
            None => TranscriptionConfig::default(),
        };

        if let Some(frame_length) = self.frame_length {
            config.analysis.frame_length = frame_length;
        }
        if let Some(hop) = self.hop {
            config.analysis.hop_size = Some(hop);
        }
        if let Some(window) = self.window {
            config.analysis.window = window;
        }
        if self.no_phase_correction {
            config.analysis.phase_correction = false;
        }
        if let Some(cut_ratio) = self.cut_ratio {
            config.detection.cut_ratio = cut_ratio;
        }
        if let Some(note_low) = self.note_low {
            config.detection.note_low = note_low;
        }
        if let Some(note_high) = self.note_high {
            config.detection.note_high = note_high;
        }
        if self.flank_suppression {
            config.detection.peak_suppression = PeakSuppression::Flank;
        }
        if let Some(threads) = self.threads {
            config.runtime.threads = threads;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.runtime.sample_rate = Some(sample_rate);
        }

        config.validate()?;
        Ok(config)
    }
}

fn default_output(input: &Path) -> PathBuf {
    if input == Path::new("-") {
        PathBuf::from("out.mid")
    } else {
        input.with_extension("mid")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Transcribe { input, output, overrides } => {
            let config = overrides.resolve()?;
            let output = output.unwrap_or_else(|| default_output(&input));

            log::info!("transcribing {}", input.display());
            let transcriber = Transcriber::new(config)?;
            let transcription = transcriber
                .transcribe_file(&input)
                .with_context(|| format!("transcribing {}", input.display()))?;
            transcription
                .write_midi(&output)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Commands::ShowConfig { overrides } => {
            let config = overrides.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
