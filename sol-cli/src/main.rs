//! sol-train: train an online linear learner, optionally tuning its
//! hyperparameters with k-fold cross-validation first.

mod logging;

use clap::Parser;
use sol_core::config::{ConfigOverrides, load_config};
use sol_core::{
    DataType, LogContext, Normalization, SolError, TrainingPipeline, TrainingRequest,
    TrainingSummary,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Train an online learner on a dataset file.
#[derive(Parser, Debug)]
#[command(name = "sol-train", version, about, long_about = None)]
struct Cli {
    /// Training data file
    input: PathBuf,

    /// Where to save the trained model
    output: Option<PathBuf>,

    /// Learning algorithm: perceptron, ogd, arow
    #[arg(short, long = "algo")]
    algorithm: Option<String>,

    /// Input encoding: svm, csv, bin
    #[arg(short = 't', long)]
    data_type: Option<DataType>,

    /// Previously saved model to continue training from
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Passes over the training data
    #[arg(short, long)]
    passes: Option<usize>,

    /// Per-sample normalization: none, l1, l2
    #[arg(long = "norm")]
    normalization: Option<Normalization>,

    /// Samples per mini-batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Mini-batches buffered ahead of the learner
    #[arg(long = "buf-size")]
    buffer_depth: Option<usize>,

    /// Ranges to search, as name=start:step:end
    #[arg(long, num_args = 1..)]
    cv: Vec<String>,

    /// Number of cross-validation folds
    #[arg(short = 'f', long = "fold-num")]
    fold_count: Option<usize>,

    /// Fixed learner parameters, as name=value
    #[arg(long, num_args = 1..)]
    params: Vec<String>,

    /// Recompute cross-validation even if cached results exist
    #[arg(long)]
    retrain: bool,

    /// Concurrent cross-validation units
    #[arg(short = 'j', long)]
    cv_workers: Option<usize>,

    /// Root directory for cached cross-validation results
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Log level or filter directives (e.g. info, sol_core=debug)
    #[arg(long)]
    log_level: Option<String>,

    /// JSON log file
    #[arg(long = "log")]
    log_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory searched for .sol/config.toml
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            algorithm: self.algorithm.clone(),
            data_type: self.data_type,
            passes: self.passes,
            normalization: self.normalization,
            batch_size: self.batch_size,
            buffer_depth: self.buffer_depth,
            fold_count: self.fold_count,
            cv: (!self.cv.is_empty()).then(|| self.cv.clone()),
            params: (!self.params.is_empty()).then(|| self.params.clone()),
            retrain: self.retrain.then_some(true),
            cv_workers: self.cv_workers,
            cache_dir: self.cache_dir.clone(),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", failure_line(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    let config = load_config(Some(&workspace), cli.config.as_deref(), &cli.overrides())?;
    let _guard = logging::init(&config.log_level, &config.log_file)?;

    let ctx = LogContext::new(&cli.input.display().to_string());
    tracing::info!(
        parent: ctx.span(),
        run_id = %ctx.run_id(),
        input = %cli.input.display(),
        algorithm = %config.algorithm,
        "Starting training run"
    );

    let request = TrainingRequest {
        input: cli.input,
        output: cli.output,
        warm_start: cli.model,
        config,
    };
    let summary = match TrainingPipeline::new(request).run(&ctx).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(
                parent: ctx.span(),
                stage = e.stage(),
                error = %e,
                "Training run failed"
            );
            return Err(e.into());
        }
    };
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!("dataset:           {} ({} samples)", summary.dataset, summary.samples);
    println!("algorithm:         {} [{}]", summary.algorithm, summary.params);
    if summary.cv_from_cache {
        println!("parameters:        from cached cross-validation");
    }
    println!("training accuracy: {:.4}", summary.accuracy);
    println!("training time:     {:.3} s", summary.elapsed_secs);
    println!("model sparsity:    {:.2}%", summary.sparsity * 100.0);
    if let Some(model) = &summary.model {
        println!("model saved to:    {}", model.path.display());
    }
}

/// One-line failure report naming the stage when the error came from the pipeline.
fn failure_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<SolError>() {
        Some(e) => format!("train failed [{}]: {e}", e.stage()),
        None => format!("train failed: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "sol-train",
            "data/a1a.svm",
            "model.json",
            "-a",
            "arow",
            "-t",
            "csv",
            "-p",
            "3",
            "--norm",
            "l2",
            "-b",
            "64",
            "--buf-size",
            "4",
            "--cv",
            "r=0.5:0.5:2",
            "-f",
            "3",
            "--params",
            "r=1",
            "--retrain",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("data/a1a.svm"));
        assert_eq!(cli.output, Some(PathBuf::from("model.json")));
        let overrides = cli.overrides();
        assert_eq!(overrides.algorithm.as_deref(), Some("arow"));
        assert_eq!(overrides.data_type, Some(DataType::Csv));
        assert_eq!(overrides.passes, Some(3));
        assert_eq!(overrides.normalization, Some(Normalization::L2));
        assert_eq!(overrides.batch_size, Some(64));
        assert_eq!(overrides.buffer_depth, Some(4));
        assert_eq!(overrides.fold_count, Some(3));
        assert_eq!(overrides.cv, Some(vec!["r=0.5:0.5:2".to_string()]));
        assert_eq!(overrides.params, Some(vec!["r=1".to_string()]));
        assert_eq!(overrides.retrain, Some(true));
    }

    #[test]
    fn test_unset_flags_leave_config_alone() {
        let cli = Cli::try_parse_from(["sol-train", "train.svm"]).unwrap();
        let overrides = cli.overrides();
        assert!(overrides.algorithm.is_none());
        assert!(overrides.cv.is_none());
        assert!(overrides.params.is_none());
        assert!(overrides.retrain.is_none());
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_multiple_ranges() {
        let cli = Cli::try_parse_from([
            "sol-train",
            "train.svm",
            "--cv",
            "eta=0.1:0.1:0.3",
            "power_t=0.5:0.5:1",
        ])
        .unwrap();
        assert_eq!(cli.cv.len(), 2);
    }

    #[test]
    fn test_bad_data_type_rejected() {
        assert!(Cli::try_parse_from(["sol-train", "x", "-t", "parquet"]).is_err());
    }

    #[test]
    fn test_failure_line_names_stage() {
        let err = anyhow::Error::from(SolError::invalid_range("eta", "step must not be zero"));
        assert_eq!(
            failure_line(&err),
            "train failed [expansion]: invalid range for 'eta': step must not be zero"
        );
        let other = anyhow::anyhow!("disk on fire");
        assert_eq!(failure_line(&other), "train failed: disk on fire");
    }

    #[test]
    fn test_cli_overrides_win_over_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".sol")).unwrap();
        std::fs::write(
            dir.path().join(".sol/config.toml"),
            "algorithm = \"perceptron\"\npasses = 4\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["sol-train", "train.svm", "-a", "arow"]).unwrap();
        let config = load_config(Some(dir.path()), None, &cli.overrides()).unwrap();
        assert_eq!(config.algorithm, "arow");
        assert_eq!(config.passes, 4);
    }
}
