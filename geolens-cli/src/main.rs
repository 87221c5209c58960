use std::path::{Path, PathBuf};

use anyhow::Context;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geolens_common::Config;
use geolens_core::{
    distribution_pair, load_dataset, render_report, sample_rows, write_csv, write_geoparquet,
    write_query_csv, Dataset, DistributionPair, QueryGateway, SessionSlot, SessionState,
};

#[derive(Parser)]
#[command(name = "geolens", version, about = "Geospatial dataset QA inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// QA summary of one dataset
    Summary {
        path: PathBuf,
        /// Subsample large datasets before analysis
        #[arg(long)]
        sample: bool,
        /// Emit the QA bundle as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Side-by-side comparison of two datasets
    Compare {
        path1: PathBuf,
        path2: PathBuf,
        /// Subsample large datasets before analysis
        #[arg(long)]
        sample: bool,
        /// Also compare the value distribution of one shared column
        #[arg(long)]
        column: Option<String>,
        #[arg(long)]
        bins: Option<usize>,
        /// Write a markdown snapshot of the comparison to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run SQL against one or two datasets (tables `data1` and `data2`)
    Query {
        path: PathBuf,
        sql: String,
        /// Second dataset, registered as `data2`
        #[arg(long)]
        secondary: Option<PathBuf>,
        /// Write the full result as CSV instead of printing a preview
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Export a dataset as csv, geoparquet, or a markdown report
    Export {
        path: PathBuf,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();
    match cli.command {
        Commands::Summary { path, sample, json } => run_summary(&path, sample, json, &config)?,
        Commands::Compare {
            path1,
            path2,
            sample,
            column,
            bins,
            report,
        } => run_compare(
            &path1,
            &path2,
            sample,
            column.as_deref(),
            bins,
            report.as_deref(),
            &config,
        )?,
        Commands::Query {
            path,
            sql,
            secondary,
            output,
        } => run_query(&path, &sql, secondary.as_deref(), output.as_deref(), &config).await?,
        Commands::Export {
            path,
            format,
            output,
        } => run_export(&path, format.as_deref(), output.as_deref(), &config)?,
    }
    Ok(())
}

/// Loads a dataset, subsampling when it exceeds the configured threshold
/// and `--sample` was given.
fn load_for_analysis(path: &Path, sample: bool, config: &Config) -> anyhow::Result<Dataset> {
    let dataset = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    if dataset.row_count() <= config.qa.large_dataset_rows {
        return Ok(dataset);
    }
    if sample {
        return Ok(sample_rows(&dataset, config.qa.sample_rows, 0)?);
    }
    eprintln!(
        "note: {} rows exceeds the large-dataset threshold ({}); pass --sample to analyze a {}-row subsample",
        dataset.row_count(),
        config.qa.large_dataset_rows,
        config.qa.sample_rows
    );
    Ok(dataset)
}

fn run_summary(path: &Path, sample: bool, json: bool, config: &Config) -> anyhow::Result<()> {
    let dataset = load_for_analysis(path, sample, config)?;
    let warnings = dataset.warnings.clone();
    let name = dataset.name.clone();

    let mut session = SessionState::new();
    session.set(SessionSlot::Primary, dataset);
    let bundle = session.qa(SessionSlot::Primary)?;

    if json {
        println!("{}", serde_json::to_string_pretty(bundle.as_ref())?);
        return Ok(());
    }

    println!("{:<16} {}", "dataset:", name);
    println!("{:<16} {}", "rows:", bundle.row_count);
    println!("{:<16} {}", "columns:", bundle.column_count);
    println!("{:<16} {}", "crs:", bundle.crs);
    println!("{:<16} {:.1} MB", "memory:", bundle.memory_bytes as f64 / 1_048_576.0);
    for warning in &warnings {
        println!("{:<16} {}", "warning:", warning);
    }

    if bundle.missing_by_column.is_empty() {
        println!("{:<16} none", "missing:");
    } else {
        println!("missing values:");
        for m in &bundle.missing_by_column {
            println!("  {:<24} {:>8} ({:.1}%)", m.name, m.null_count, m.percentage);
        }
    }
    if !bundle.constant_columns.is_empty() {
        println!("{:<16} {}", "constant:", bundle.constant_columns.join(", "));
    }
    if let Some(geometry) = &bundle.geometry {
        println!("geometry:");
        println!("  {:<24} {:>8}", "valid", geometry.valid_count);
        println!("  {:<24} {:>8}", "invalid", geometry.invalid_count);
        println!("  {:<24} {:>8}", "empty", geometry.empty_count);
        for tc in &geometry.type_histogram {
            println!("  {:<24} {:>8}", tc.geometry_type, tc.count);
        }
        if let Some(bb) = &geometry.bounding_box {
            println!(
                "  {:<24} [{:.6}, {:.6}, {:.6}, {:.6}]",
                "bounds", bb.min_x, bb.min_y, bb.max_x, bb.max_y
            );
        }
    }
    for u in &bundle.unavailable {
        println!("{:<16} {} ({})", "unavailable:", u.stat, u.reason);
    }
    Ok(())
}

fn run_compare(
    path1: &Path,
    path2: &Path,
    sample: bool,
    column: Option<&str>,
    bins: Option<usize>,
    report_path: Option<&Path>,
    config: &Config,
) -> anyhow::Result<()> {
    let left = load_for_analysis(path1, sample, config)?;
    let right = load_for_analysis(path2, sample, config)?;

    let mut session = SessionState::new();
    session.set(SessionSlot::Primary, left);
    session.set(SessionSlot::Comparison, right);
    let report = session.comparison()?;

    println!("{:<16} {} vs {}", "comparing:", report.left_name, report.right_name);
    println!("{:<16} {}", "common columns:", report.schema.common.len());
    if !report.schema.only_in_left.is_empty() {
        println!(
            "{:<16} {}",
            "left only:",
            report.schema.only_in_left.join(", ")
        );
    }
    if !report.schema.only_in_right.is_empty() {
        println!(
            "{:<16} {}",
            "right only:",
            report.schema.only_in_right.join(", ")
        );
    }
    for (label, side) in [("left", &report.left), ("right", &report.right)] {
        println!("{label}:");
        println!("  {:<16} {}", "rows:", side.row_count);
        println!("  {:<16} {}", "crs:", side.crs);
        println!("  {:<16} {}", "missing cols:", side.missing_by_column.len());
        if let Some(geometry) = &side.geometry {
            println!(
                "  {:<16} {} valid / {} invalid / {} empty",
                "geometry:", geometry.valid_count, geometry.invalid_count, geometry.empty_count
            );
        }
    }

    if let Some(report_path) = report_path {
        std::fs::write(
            report_path,
            render_report(&report.left_name, &report.left, Some(report.as_ref())),
        )?;
        println!("Report written to {}", report_path.display());
    }

    if let Some(column) = column {
        let left = session.dataset(SessionSlot::Primary).cloned();
        let right = session.dataset(SessionSlot::Comparison).cloned();
        if let (Some(left), Some(right)) = (left, right) {
            let bins = bins.unwrap_or(config.qa.histogram_bins);
            let pair = distribution_pair(&left, &right, column, bins, config.qa.frequency_top_n)?;
            print_distribution(column, &pair);
        }
    }
    Ok(())
}

fn print_distribution(column: &str, pair: &DistributionPair) {
    println!("distribution of `{column}`:");
    match pair {
        DistributionPair::Numeric { left, right } => {
            for (label, bins) in [("left", left), ("right", right)] {
                println!("  {label}:");
                for bin in bins {
                    println!("    [{:>12.4}, {:>12.4}) {:>8}", bin.lower, bin.upper, bin.count);
                }
            }
        }
        DistributionPair::Categorical { left, right } => {
            for (label, entries) in [("left", left), ("right", right)] {
                println!("  {label}:");
                for entry in entries {
                    println!(
                        "    {:<24} {:>8} ({:.1}%)",
                        entry.value, entry.count, entry.percentage
                    );
                }
            }
        }
    }
}

async fn run_query(
    path: &Path,
    sql: &str,
    secondary: Option<&Path>,
    output: Option<&Path>,
    config: &Config,
) -> anyhow::Result<()> {
    let gateway = QueryGateway::new();
    let primary = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    gateway.register("data1", &primary)?;
    if let Some(secondary) = secondary {
        let dataset =
            load_dataset(secondary).with_context(|| format!("loading {}", secondary.display()))?;
        gateway.register("data2", &dataset)?;
    }

    let result = gateway.run(sql).await?;
    if let Some(output) = output {
        write_query_csv(&result, output)?;
        println!("{} rows written to {}", result.row_count(), output.display());
        return Ok(());
    }

    let total = result.row_count();
    let preview = preview_batches(&result.batches, config.display.max_rows_preview);
    println!("{}", pretty_format_batches(&preview)?);
    if total > config.display.max_rows_preview {
        println!(
            "({} of {} rows shown; use --output to export all)",
            config.display.max_rows_preview, total
        );
    }
    Ok(())
}

fn preview_batches(batches: &[RecordBatch], max_rows: usize) -> Vec<RecordBatch> {
    let mut remaining = max_rows;
    let mut out = Vec::new();
    for batch in batches {
        if remaining == 0 {
            break;
        }
        if batch.num_rows() <= remaining {
            remaining -= batch.num_rows();
            out.push(batch.clone());
        } else {
            out.push(batch.slice(0, remaining));
            remaining = 0;
        }
    }
    out
}

fn run_export(
    path: &Path,
    format: Option<&str>,
    output: Option<&Path>,
    config: &Config,
) -> anyhow::Result<()> {
    let dataset = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    let format = format.unwrap_or(&config.export.format);
    let extension = match format {
        "csv" => "csv",
        "geoparquet" => "geoparquet",
        "report" => "md",
        other => anyhow::bail!("unknown format: {other} (use csv, geoparquet, or report)"),
    };

    let out_path: PathBuf = match output {
        Some(p) => p.to_owned(),
        None => Path::new(&config.export.output_dir).join(format!("{}.{extension}", dataset.name)),
    };
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match format {
        "csv" => write_csv(&dataset, &out_path)?,
        "geoparquet" => write_geoparquet(&dataset, &out_path)?,
        "report" => {
            let mut session = SessionState::new();
            let name = dataset.name.clone();
            session.set(SessionSlot::Primary, dataset);
            let bundle = session.qa(SessionSlot::Primary)?;
            std::fs::write(&out_path, render_report(&name, &bundle, None))?;
        }
        _ => unreachable!(),
    }
    println!("Exported to {}", out_path.display());
    Ok(())
}
