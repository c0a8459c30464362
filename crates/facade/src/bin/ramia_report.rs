//! Run a range membership audit over precomputed signals and print the
//! privacy-risk summary.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

use ramia::{
    AuditConfig, MembershipMatrix, ModelPair, PairedEnsemble, RangeAuditReport,
    RangeAuditRunner, RangeGroups, SignalMatrix,
};

#[derive(Parser)]
#[command(name = "ramia-report")]
#[command(about = "Range membership-inference audit over precomputed signals", long_about = None)]
struct Cli {
    /// YAML audit configuration (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON file with signals and base membership
    #[arg(long)]
    input: PathBuf,
    /// Write the full report as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Signals over range points plus base-record membership.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditInput {
    /// `signals[model][range_point]`, range points grouped contiguously.
    signals: Vec<Vec<f64>>,
    /// `membership[model][base_record]`.
    membership: Vec<Vec<bool>>,
    /// Overrides `range.sample_size` from the configuration.
    #[serde(default)]
    sample_size: Option<usize>,
    /// Explicit training pairs; interleaved `(2i, 2i + 1)` when omitted.
    #[serde(default)]
    pairs: Option<Vec<ModelPair>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AuditConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AuditConfig::default(),
    };

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let input: AuditInput = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", cli.input.display()))?;
    if let Some(sample_size) = input.sample_size {
        config.range.sample_size = sample_size;
    }

    let num_models = input.membership.len();
    if num_models % 2 != 0 {
        bail!("membership has {num_models} models; trained pairs need an even count");
    }
    let ensemble = match input.pairs {
        Some(pairs) => PairedEnsemble::from_pairs(pairs)?,
        None => PairedEnsemble::interleaved(num_models / 2),
    };
    let base = MembershipMatrix::from_rows(input.membership)?;
    let range_membership = base.repeat_columns(config.range.sample_size)?;
    let signals = SignalMatrix::from_rows(input.signals)?;
    let groups = RangeGroups::from_num_points(signals.num_records(), config.range.sample_size)?;

    let runner = RangeAuditRunner::new(config)?;
    let report = runner.run_on_signals(&signals, &range_membership, &ensemble, &groups)?;
    print_summary(&report);

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("\nReport written to {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &RangeAuditReport) {
    let summary = &report.summary;
    println!(
        "Range audit ({} strategy, {} points per record)",
        report.strategy, report.sample_size
    );
    println!("{:-<60}", "");
    println!(
        "{:>10} {:>8} {:>8} {:>10} {:>16}",
        "experiment", "members", "others", "AUC", "TPR@target FPR"
    );
    for metrics in &summary.experiments {
        println!(
            "{:>10} {:>8} {:>8} {:>10.4} {:>16.4}",
            metrics.experiment,
            metrics.num_members,
            metrics.num_non_members,
            metrics.auc,
            metrics.tpr_at_target_fpr
        );
    }
    for excluded in &summary.excluded {
        println!("{:>10} excluded: {}", excluded.experiment, excluded.reason);
    }
    println!("{:-<60}", "");
    match (summary.mean_auc, summary.mean_tpr_at_target_fpr) {
        (Some(auc), Some(tpr)) => {
            println!(
                "mean AUC {auc:.4} (std {}), mean TPR@{} {tpr:.4} (std {})",
                fmt_std(summary.std_auc),
                summary.target_fpr,
                fmt_std(summary.std_tpr_at_target_fpr)
            );
        }
        _ => println!("no usable experiments"),
    }
    if let Some(pooled) = &summary.pooled {
        let points: Vec<String> = pooled
            .operating_points
            .iter()
            .map(|p| format!("TPR@{}={:.4}", p.fpr, p.tpr))
            .collect();
        println!("pooled AUC {:.4}; {}", pooled.auc, points.join(", "));
    }
}

fn fmt_std(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}
