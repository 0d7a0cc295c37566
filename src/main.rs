pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod processing;
pub mod spatial;
pub mod pipeline;
pub mod render;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard page and its upload API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run the pipeline on one occurrence file and print the results
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Darwin Core occurrence file (tab-separated)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Species to show; defaults to the first in alphabetical order
        #[arg(short, long)]
        species: Option<String>,
        /// Write the year chart here (.svg or .png)
        #[arg(long, value_name = "FILE")]
        chart: Option<PathBuf>,
    },
}

fn load_area_index(app_config: &config::AppConfig) -> anyhow::Result<spatial::AreaIndex> {
    let areas = data::load_areas(&app_config.input.areas, &app_config.input.area_code_field)?;
    let index = spatial::AreaIndex::new(areas);
    if index.is_empty() {
        warn!("No protected areas loaded from {:?}", app_config.input.areas);
    } else {
        info!("Indexed {} protected areas", index.len());
    }
    Ok(index)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let areas = load_area_index(&app_config)?;

            server::start_server(app_config, areas).await?;
        }
        Commands::Report { config, input, species, chart } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let areas = load_area_index(&app_config)?;
            let options = pipeline::PipelineOptions::new(app_config.delimiter_byte()?, &app_config.processing);

            let bytes = std::fs::read(input)
                .with_context(|| format!("Failed to read occurrence file: {:?}", input))?;

            let Some(dashboard) = pipeline::run(Some(&bytes[..]), species.as_deref(), &areas, options)? else {
                println!("{:?} is empty, nothing to show", input);
                return Ok(());
            };

            print_report(&dashboard);

            if let Some(path) = chart {
                render::write_year_chart(path, &dashboard.years)?;
            }
        }
    }

    Ok(())
}

fn print_report(dashboard: &types::Dashboard) {
    println!("Especies: {}", dashboard.species_options.join(", "));
    println!(
        "Seleccionada: {} ({} registros)",
        dashboard.selected_species.as_deref().unwrap_or("-"),
        dashboard.total_records
    );
    if dashboard.skipped_dates > 0 {
        println!("Registros omitidos por fecha inválida: {}", dashboard.skipped_dates);
    }

    println!();
    println!("{}", dashboard.table.columns.join("\t"));
    for row in &dashboard.table.rows {
        println!("{}", row.join("\t"));
    }

    println!();
    println!("{}\t{}", render::X_LABEL, render::Y_LABEL);
    for year in &dashboard.years {
        println!("{}\t{}", year.year, year.count);
    }

    println!();
    println!("codigo\tcantidad_registros_presencia");
    for area in &dashboard.areas {
        println!("{}\t{}", area.code, area.count);
    }
}
