use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use seoul_popmap::config::AppConfig;
use seoul_popmap::{data, hexbin, render};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join registered and living population onto district polygons
    Reconcile {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Aggregate fire-safety targets into hexagon bins
    Hexbin {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the tooltip of one district
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Full `adm_nm`, e.g. "서울특별시 종로구 사직동"
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Reconcile { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let result = data::load_reconciliation(&app_config).await?;

            let style = render::DistrictStyle::from_config(&app_config.render)?;
            let collection = render::district_collection(&result.districts, &style)?;

            let layer_path = app_config.output.dir.join("districts.geojson");
            render::write_json(&layer_path, &collection)?;
            let scene_path = app_config.output.dir.join("scene.json");
            render::write_json(&scene_path, &render::Scene::population(&app_config.render))?;

            info!(path = ?layer_path, features = collection.features.len(), "district layer written");
        }
        Commands::Hexbin { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let path = app_config
                .input
                .fire_targets
                .as_ref()
                .ok_or_else(|| anyhow!("input.fire_targets is not configured"))?;

            let points = data::load_fire_targets(path)?;
            let bins = hexbin::aggregate(&points, &app_config.hexbin)?;
            let style = hexbin::BinStyle::new(&bins, &app_config.hexbin)?;
            let collection = hexbin::hexbin_collection(&bins, &style);

            let out = app_config.output.dir.join("fire_targets_hex.geojson");
            render::write_json(&out, &collection)?;
            let scene_path = app_config.output.dir.join("fire_targets_scene.json");
            render::write_json(&scene_path, &render::HexagonScene::fire_targets(&app_config.hexbin))?;
            info!(path = ?out, bins = collection.features.len(), "hexagon layer written");
        }
        Commands::Inspect { config, name } => {
            let app_config = AppConfig::load_from_file(config)?;
            let result = data::load_reconciliation(&app_config).await?;
            let district = result
                .districts
                .iter()
                .find(|d| &d.adm_nm == name)
                .with_context(|| format!("no district named '{name}' in {}", app_config.reconcile.target_province))?;
            println!("{}", render::tooltip(district, app_config.reconcile.aggregate));
        }
    }

    Ok(())
}
