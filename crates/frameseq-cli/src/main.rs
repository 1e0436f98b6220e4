//! Command-line interface for frame-counter sequence correction.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use frameseq::{CorrectionConfig, CorrectionEngine, CorrectionKind, CorrectionOutput, Recording};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "frameseq")]
#[command(about = "Repair OCR-read frame-counter sequences against reference timestamps")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Correct one recording.
    Correct(CliCorrectArgs),

    /// Correct several recordings in parallel.
    CorrectBatch(CliBatchArgs),

    /// Print the increment model derived for a recording.
    Model {
        /// Recording JSON (`raw_frame_indices`, `reference_timestamps`).
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        config: CliConfigArgs,
    },

    /// Print the correction-type catalog.
    Types,
}

#[derive(Debug, Clone, Args)]
struct CliCorrectArgs {
    /// Recording JSON (`raw_frame_indices`, `reference_timestamps`).
    #[arg(long)]
    input: PathBuf,

    /// Path to write the correction result (JSON).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliBatchArgs {
    /// Recording JSON files.
    #[arg(long, num_args = 1.., required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for `<input stem>.corrected.json` results.
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliConfigArgs {
    /// Correction config JSON; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Window length for duplicate and pattern detection.
    #[arg(long)]
    window_length: Option<usize>,

    /// Tolerated raw/reference length difference.
    #[arg(long)]
    max_length_slack: Option<usize>,

    /// Fraction of matching positions for a duplicate window, in (0, 1].
    #[arg(long)]
    duplicate_similarity_threshold: Option<f64>,

    /// Legitimate consecutive delta (repeatable). Replaces the derived set.
    #[arg(long = "valid-increment")]
    valid_increments: Vec<i64>,

    /// Raw value meaning "no reading" (repeatable).
    #[arg(long = "sentinel")]
    sentinels: Vec<i64>,
}

impl CliConfigArgs {
    fn to_config(&self) -> CliResult<CorrectionConfig> {
        let mut config = match &self.config {
            Some(path) => read_json::<CorrectionConfig>(path)?,
            None => CorrectionConfig::default(),
        };
        if let Some(v) = self.window_length {
            config.window_length = v;
        }
        if let Some(v) = self.max_length_slack {
            config.max_length_slack = v;
        }
        if let Some(v) = self.duplicate_similarity_threshold {
            config.duplicate_similarity_threshold = v;
        }
        if !self.valid_increments.is_empty() {
            config.valid_increment_set = Some(self.valid_increments.clone());
        }
        config.sentinel_values.extend(self.sentinels.iter().copied());
        config.validate()?;
        Ok(config)
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Correct(args) => run_correct(&args),
        Commands::CorrectBatch(args) => run_correct_batch(&args),
        Commands::Model { input, config } => run_model(&input, &config),
        Commands::Types => run_types(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
        format!("Failed to read {}: {}", path.display(), e).into()
    })?;
    serde_json::from_str(&text).map_err(|e| -> CliError {
        format!("Failed to parse {}: {}", path.display(), e).into()
    })
}

fn log_output(label: &str, out: &CorrectionOutput) {
    tracing::info!(
        "{}: {} frames, {} valid readings, {} corrected{}",
        label,
        out.summary.n_frames,
        out.summary.n_valid_ocr,
        out.summary.n_corrected,
        if out.summary.synthetic_fallback {
            " (synthetic fallback)"
        } else {
            ""
        },
    );
    for (kind, count) in &out.summary.corrections_by_type {
        tracing::info!("  {:<24} {}", kind.as_str(), count);
    }
    for note in &out.summary.notes {
        tracing::warn!("  note: {}", note);
    }
}

// ── correct ────────────────────────────────────────────────────────────

fn run_correct(args: &CliCorrectArgs) -> CliResult<()> {
    tracing::info!("Loading recording: {}", args.input.display());
    let recording: Recording = read_json(&args.input)?;
    let engine = CorrectionEngine::with_config(args.config.to_config()?);

    let out = engine.correct_recording(&recording)?;
    log_output(&args.input.display().to_string(), &out);

    let json = serde_json::to_string_pretty(&out)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

// ── correct-batch ──────────────────────────────────────────────────────

fn run_correct_batch(args: &CliBatchArgs) -> CliResult<()> {
    let engine = CorrectionEngine::with_config(args.config.to_config()?);
    let recordings = args
        .inputs
        .iter()
        .map(|p| read_json::<Recording>(p))
        .collect::<CliResult<Vec<_>>>()?;
    std::fs::create_dir_all(&args.out_dir)?;

    let results = engine.correct_batch(&recordings);
    let mut n_failed = 0usize;
    for (path, result) in args.inputs.iter().zip(results) {
        match result {
            Ok(out) => {
                log_output(&path.display().to_string(), &out);
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "recording".to_string());
                let out_path = args.out_dir.join(format!("{}.corrected.json", stem));
                std::fs::write(&out_path, serde_json::to_string_pretty(&out)?)?;
            }
            Err(e) => {
                n_failed += 1;
                tracing::error!("{}: {}", path.display(), e);
            }
        }
    }

    tracing::info!(
        "Corrected {}/{} recordings into {}",
        args.inputs.len() - n_failed,
        args.inputs.len(),
        args.out_dir.display(),
    );
    if n_failed > 0 {
        return Err(format!("{} recording(s) failed", n_failed).into());
    }
    Ok(())
}

// ── model ──────────────────────────────────────────────────────────────

fn run_model(input: &Path, config: &CliConfigArgs) -> CliResult<()> {
    let recording: Recording = read_json(input)?;
    let engine = CorrectionEngine::with_config(config.to_config()?);
    let model =
        engine.increment_model(&recording.raw_frame_indices, &recording.reference_timestamps)?;

    println!("frameseq increment model");
    println!("  frame rate:          {:.4} Hz", model.frame_rate_hz());
    println!("  duration:            {:.3} s", model.duration_sec());
    println!("  pattern:             {:?}", model.expected_triplet_pattern());
    println!("  valid increments:    {:?}", model.valid_increments());
    println!("  expected increment:  {:.4}", model.expected_increment());
    println!("  source:              {:?}", model.source());
    println!("  support:             {}", model.support());
    Ok(())
}

// ── types ──────────────────────────────────────────────────────────────

fn run_types() -> CliResult<()> {
    println!("frameseq correction types");
    for kind in CorrectionKind::ALL {
        println!("  {:<24} {}", kind.as_str(), kind.description());
    }
    Ok(())
}
