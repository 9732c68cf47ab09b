use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use capacity_core::AnalysisParameters;
use capacity_layer::{load_comparison, DatasetSettings, InMemoryLayer};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "capacity-cli",
    about = "Compare two layers of hospital-capacity model output."
)]
struct Args {
    /// Feature-set JSON for the left side.
    #[arg(long)]
    left: PathBuf,
    /// Feature-set JSON for the right side.
    #[arg(long)]
    right: PathBuf,
    #[arg(long)]
    left_title: Option<String>,
    #[arg(long)]
    right_title: Option<String>,
    #[arg(long)]
    left_color: Option<String>,
    #[arg(long)]
    right_color: Option<String>,
    /// Analysis parameters JSON; defaults to the stock model schema.
    #[arg(long)]
    params: Option<PathBuf>,
    #[arg(long, default_value = "Hospitalized")]
    variable: String,
    /// Zero-based day index.
    #[arg(long, default_value_t = 0)]
    day: usize,
    /// Report one feature instead of the whole layer.
    #[arg(long)]
    feature: Option<String>,
    /// Print the chart sources as JSON instead of the summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(?args, "parsed arguments");

    let parameters = match &args.params {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read parameters {path:?}"))?;
            serde_json::from_str::<AnalysisParameters>(&data)
                .with_context(|| format!("Invalid parameters in {path:?}"))?
        }
        None => AnalysisParameters::default(),
    };

    let sides = [
        (
            side_settings("left", &args.left, &args.left_title, &args.left_color),
            read_layer(&args.left)?,
        ),
        (
            side_settings("right", &args.right, &args.right_title, &args.right_color),
            read_layer(&args.right)?,
        ),
    ];

    let mut load = load_comparison(Arc::new(parameters), &sides).await;
    for failure in &load.failures {
        eprintln!("{} side failed: {}", failure.side, failure.error);
    }
    if load.index.datasets().next().is_none() {
        anyhow::bail!("neither side could be loaded");
    }

    let index = &mut load.index;

    if args.json {
        let sources = match args.feature.as_deref() {
            Some(feature_id) => index.feature_sources(feature_id)?,
            None => index.default_sources()?,
        };
        println!("{}", serde_json::to_string_pretty(sources)?);
        return Ok(());
    }

    let date = index
        .date_for_day(args.day)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "--".to_string());
    println!(
        "Days: {}\nFirst day: {}\nOverage max: {}\nSelected: {} on day {} ({date})",
        index.days(),
        index
            .first_day()
            .map(|day| day.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "--".to_string()),
        index.overall_overage_max(),
        args.variable,
        args.day,
    );
    if let Some(feature_id) = args.feature.as_deref() {
        let location = index.feature_sources(feature_id)?.location.clone();
        println!("Location: {}", location.unwrap_or_default());
    }

    for summary in index.count_summaries(&args.variable, args.day, args.feature.as_deref())? {
        println!("  {:<6} {:<24} {}", summary.side, summary.title, summary.label());
    }

    Ok(())
}

fn read_layer(path: &Path) -> anyhow::Result<InMemoryLayer> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read layer {path:?}"))?;
    InMemoryLayer::from_json_str(&data).with_context(|| format!("Invalid feature set in {path:?}"))
}

fn side_settings(
    id: &str,
    path: &Path,
    title: &Option<String>,
    color: &Option<String>,
) -> DatasetSettings {
    let title = title.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string())
    });
    let mut settings = DatasetSettings::new(id, title);
    settings.data_color = color.clone();
    settings
}
