/// Score a csv batch of leads, print the summary and export the result tables
/// and an importance chart.
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use plotters::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use lead_scoring::explain::FeatureImportance;
use lead_scoring::io::{export_csv, load_leads};
use lead_scoring::usage::TracingUsageSink;
use lead_scoring::{run_with_usage, LeadTable, PipelineConfig, ScoringReport};

/// Features shown in the importance chart.
const CHART_FEATURES: usize = 15;

#[derive(Parser, Debug)]
#[command(name = "lead-scoring")]
#[command(about = "Rank rental CRM leads by predicted quality", long_about = None)]
#[command(version)]
struct Cli {
    /// Csv file with one lead per row
    input: PathBuf,

    /// Pipeline config (yaml); defaults apply to anything left out
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the exported tables and chart
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of leads in the top table
    #[arg(long)]
    top: Option<usize>,

    /// Seed for the split and the forest
    #[arg(long)]
    seed: Option<u64>,

    /// User the usage event is attributed to
    #[arg(long)]
    user: Option<String>,

    /// Skip writing feature_importances.png
    #[arg(long)]
    no_chart: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Draws a horizontal bar chart of the strongest feature importances and saves it to `path`.
/// input: importance table sorted descending
/// logic: keep the first CHART_FEATURES rows; set up PNG backend; build Cartesian chart;
/// label Y ticks with feature names; draw one bar per importance
fn plot_importances(importances: &[FeatureImportance], path: &Path) -> Result<(), Box<dyn Error>> {
    let shown = &importances[..importances.len().min(CHART_FEATURES)];
    let names: Vec<&str> = shown.iter().map(|f| f.feature.as_str()).collect();
    let values: Vec<f64> = shown.iter().map(|f| f.importance).collect();
    let count = shown.len();

    let max_x = values.iter().cloned().fold(0.0_f64, f64::max);
    let x_range = 0.0..(max_x * 1.1).max(1e-6);

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importances", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(260)
        .build_cartesian_2d(x_range, 0..count)?;

    // Most important feature on top
    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| {
            let i = *idx;
            if i < count {
                names[count - 1 - i].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Importance")
        .y_desc("Feature")
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, &v)| {
        let row = count - 1 - i;
        Rectangle::new([(0.0, row), (v, row + 1)], BLUE.mix(0.5).filled())
    }))?;

    root.present()?;
    Ok(())
}

fn print_summary(table: &LeadTable, report: &ScoringReport) {
    let sel = &report.selection;
    println!(
        "Loaded {} leads, {} columns, {} missing cells",
        table.len(),
        table.columns.len(),
        table.missing_cells()
    );
    println!("Scored {} leads", report.scored.len());
    println!(
        "  Hot: {}  Warm: {}  Cold: {}  Avg score: {:.1}",
        report.tiers.hot, report.tiers.warm, report.tiers.cold, report.tiers.average_score
    );
    println!(
        "  Random Forest AUC: {:.4}  Gradient Boosting AUC: {:.4}  -> {}",
        sel.forest_auc, sel.boosted_auc, sel.chosen
    );

    println!("\nTop leads:");
    for (rank, lead) in report.top_leads.iter().enumerate() {
        println!(
            "{:>3}. {:<10} {:<24} {:>6.1} {}",
            rank + 1,
            lead.lead_id.as_deref().unwrap_or("-"),
            lead.name.as_deref().unwrap_or("-"),
            lead.lead_score,
            lead.category
        );
    }

    println!("\nFeature importances:");
    for f in report.importances.iter().take(CHART_FEATURES) {
        println!("{:<40} {:>8.4}", f.feature, f.importance);
    }
}

fn write_outputs(report: &ScoringReport, out_dir: &Path, chart: bool) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(out_dir)?;
    export_csv(out_dir.join("scored_leads.csv"), &report.scored)?;
    export_csv(out_dir.join("top_leads.csv"), &report.top_leads)?;
    export_csv(out_dir.join("feature_importance.csv"), &report.importances)?;
    if chart && !report.importances.is_empty() {
        plot_importances(&report.importances, &out_dir.join("feature_importances.png"))?;
    }
    info!(dir = %out_dir.display(), "wrote outputs");
    Ok(())
}

/// load config and leads, run the pipeline, print and export the results
fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(top) = cli.top {
        config.top_n = top;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    info!(path = %cli.input.display(), "loading leads");
    let table = load_leads(&cli.input)?;

    let report = run_with_usage(&table, &config, &TracingUsageSink, cli.user.as_deref())?;
    print_summary(&table, &report);
    write_outputs(&report, &cli.out_dir, !cli.no_chart)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["lead-scoring", "leads.csv"]);
        assert_eq!(cli.input, PathBuf::from("leads.csv"));
        assert_eq!(cli.out_dir, PathBuf::from("."));
        assert!(cli.config.is_none());
        assert!(!cli.no_chart);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "lead-scoring", "leads.csv", "--top", "5", "--seed", "9", "--user", "asha", "--no-chart", "-v",
        ]);
        assert_eq!(cli.top, Some(5));
        assert_eq!(cli.seed, Some(9));
        assert_eq!(cli.user.as_deref(), Some("asha"));
        assert!(cli.no_chart);
        assert!(cli.verbose);
    }

    #[test]
    fn test_csv_batch_to_exported_tables() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join(format!("lead-scoring-test-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        let input = dir.join("leads.csv");
        let mut f = fs::File::create(&input)?;
        writeln!(f, "lead_id,name,budget_min,budget_max,preferred_area,user_type,bhk,move_in_time,source")?;
        let areas = ["Whitefield", "Hebbal", "HSR Layout", "Whitefield", "Indiranagar"];
        let users = ["Family", "Bachelor", "Working Professionals", "Company Guest"];
        let moves = ["Immediate", "2 Months", "Within 15 Days", "1 Month"];
        let sources = ["Referral", "Google Ads", "Website", "Instagram", "WhatsApp"];
        for i in 0..40usize {
            let lo = 9000 + (i * 389 % 41) * 600;
            writeln!(
                f,
                "L{},Lead {},{},{},{},{},{},{},{}",
                i,
                i,
                lo,
                lo + (i % 5) * 2000,
                areas[i % areas.len()],
                users[(i / 2) % users.len()],
                1 + i % 3,
                moves[(i / 3) % moves.len()],
                sources[(i * 3) % sources.len()]
            )?;
        }
        drop(f);

        let mut config = PipelineConfig::default();
        config.forest.n_trees = 10;
        config.boosting.n_rounds = 10;
        config.top_n = 5;
        let table = load_leads(&input)?;
        let report = run_with_usage(&table, &config, &TracingUsageSink, None)?;
        write_outputs(&report, &dir, false)?;

        let top = fs::read_to_string(dir.join("top_leads.csv"))?;
        assert_eq!(top.lines().count(), 6);
        assert!(top.starts_with("lead_id,name,"));
        let scored = fs::read_to_string(dir.join("scored_leads.csv"))?;
        assert_eq!(scored.lines().count(), 41);
        let importance = fs::read_to_string(dir.join("feature_importance.csv"))?;
        assert!(importance.starts_with("feature,importance"));

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
