use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use survey_dashboard::dashboard::{Dashboard, DashboardConfig};
use survey_dashboard::data::loader::load_file;
use survey_dashboard::data::{FilterSpec, ToExportRows, Value};

#[derive(Parser)]
#[command(name = "survey-dashboard", version, about = "Filter and summarise survey responses")]
struct Cli {
    /// Survey data (.csv, .json or .parquet).
    input: PathBuf,

    /// Sidebar filter, `field=value[,value...]`. Repeatable.
    #[arg(short, long = "filter", value_name = "FIELD=VALUES")]
    filters: Vec<String>,

    /// JSON dashboard definition (defaults to the analyst survey dashboard).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that receives one CSV per panel plus the filtered data.
    #[arg(short, long, default_value = "exports")]
    out_dir: PathBuf,

    /// Print the available filter values and exit.
    #[arg(long)]
    options: bool,

    /// Fail when the filters leave no rows.
    #[arg(long)]
    require_rows: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };
    config.require_rows |= cli.require_rows;
    config.validate()?;
    let dashboard = Dashboard::new(config);

    let dataset = load_file(&cli.input)?;

    if cli.options {
        for (field, values) in dashboard.filter_options(&dataset)? {
            let values: Vec<String> = values.iter().map(Value::to_cell).collect();
            println!("{field}: {}", values.join(", "));
        }
        return Ok(());
    }

    let mut filters = FilterSpec::new();
    for assignment in &cli.filters {
        filters.parse_assignment(assignment)?;
    }

    let report = dashboard.run(&dataset, &filters)?;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    println!(
        "{}: {} of {} responses selected",
        report.title,
        report.filtered.len(),
        report.total_rows
    );

    let data_path = cli.out_dir.join(&report.data_export);
    report.filtered.to_export_rows().write_csv_file(&data_path)?;
    log::info!("Wrote {}", data_path.display());

    for panel in &report.panels {
        match &panel.outcome {
            Ok(table) => {
                let path = cli.out_dir.join(&panel.export_name);
                table.write_csv_file(&path)?;
                log::info!("Wrote {}", path.display());
                match panel.pearson {
                    Some(r) => println!("  {:<50} {} rows, r = {r:.3}", panel.name, table.rows.len()),
                    None => println!("  {:<50} {} rows", panel.name, table.rows.len()),
                }
            }
            Err(e) => println!("  {:<50} unavailable: {e}", panel.name),
        }
    }

    Ok(())
}
