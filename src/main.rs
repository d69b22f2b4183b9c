mod analytics;
mod config;
mod ml;
mod web;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::analytics::{forecast, Forecast};
use crate::config::AppConfig;
use crate::ml::trainer::{self, importance_bars};
use crate::ml::{ModelArtifact, Regressor, SolarFeatures};
use crate::web::{start_dashboard_server, AppState};

#[derive(Parser)]
#[command(name = "solar-forecast")]
#[command(version)]
#[command(about = "Train and serve a solar power generation forecast model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the forest on the historical dataset and write the model artifact
    Train {
        /// Dataset CSV path
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Model artifact output path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of trees in the forest
        #[arg(short, long)]
        trees: Option<usize>,
    },
    /// Serve the forecast dashboard
    Serve {
        /// Dashboard port (default: 8501)
        #[arg(short, long)]
        port: Option<u16>,
        /// Bind address
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one forecast from the command line
    Predict {
        /// Solar radiation (W/m²)
        #[arg(long, default_value_t = 100.0)]
        radiation: f64,
        /// Temperature (°C)
        #[arg(long, default_value_t = 25.0, allow_negative_numbers = true)]
        temperature: f64,
        /// Relative humidity (%)
        #[arg(long, default_value_t = 50.0)]
        humidity: f64,
        /// Wind speed (m/s)
        #[arg(long, default_value_t = 5.0)]
        wind_speed: f64,
        /// Cloud cover (%)
        #[arg(long, default_value_t = 20.0)]
        cloud_cover: f64,
        /// Angle of incidence (°)
        #[arg(long, default_value_t = 30.0)]
        incidence: f64,
        /// Zenith angle (°)
        #[arg(long, default_value_t = 30.0)]
        zenith: f64,
        /// Print the forecast as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show metadata of a trained model artifact
    Inspect {
        /// Model artifact path
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut app_config = AppConfig::load(&cli.config)?;
    init_logging(cli.verbose, app_config.logging.json)?;

    info!("Solar Forecast v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Train { data, output, trees } => {
            if let Some(data) = data {
                app_config.paths.dataset = data;
            }
            if let Some(output) = output {
                app_config.paths.model = output;
            }
            if let Some(trees) = trees {
                app_config.training.forest.n_trees = trees;
            }
            run_training(&app_config)?;
        }
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                app_config.server.port = port;
            }
            if let Some(host) = host {
                app_config.server.host = host;
            }
            run_dashboard(&app_config).await?;
        }
        Commands::Predict {
            radiation,
            temperature,
            humidity,
            wind_speed,
            cloud_cover,
            incidence,
            zenith,
            json,
        } => {
            let inputs = SolarFeatures {
                radiation,
                temperature,
                humidity,
                wind_speed,
                cloud_cover,
                incidence,
                zenith,
            };
            run_prediction(&app_config, inputs, json)?;
        }
        Commands::Inspect { model } => {
            if let Some(model) = model {
                app_config.paths.model = model;
            }
            inspect_model(&app_config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn run_training(app_config: &AppConfig) -> Result<()> {
    let paths = &app_config.paths;
    let training = &app_config.training;
    app_config
        .validate()
        .map_err(|errors| anyhow::anyhow!("Invalid configuration: {}", errors.join(", ")))?;

    info!("Training on {}", paths.dataset.display());
    let artifact = ModelArtifact::new(&paths.model);
    trainer::train(&paths.dataset, &artifact, &training.forest, training.test_fraction)
        .with_context(|| format!("Training failed for dataset {}", paths.dataset.display()))?;

    info!("Model saved to {}", artifact.path().display());
    Ok(())
}

async fn run_dashboard(app_config: &AppConfig) -> Result<()> {
    let artifact = ModelArtifact::new(&app_config.paths.model);
    let model = artifact.load().with_context(|| {
        format!(
            "Could not load model from {}; run `solar-forecast train` first",
            artifact.path().display()
        )
    })?;

    let state = AppState::new(model);
    start_dashboard_server(state, &app_config.server.host, app_config.server.port).await
}

fn run_prediction(app_config: &AppConfig, inputs: SolarFeatures, json: bool) -> Result<()> {
    if !inputs.is_finite() {
        anyhow::bail!("All feature values must be finite numbers");
    }

    let artifact = ModelArtifact::new(&app_config.paths.model);
    let model = artifact
        .load()
        .with_context(|| format!("Could not load model from {}", artifact.path().display()))?;

    let result = forecast(&model, inputs);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_forecast(&result, &model);
    }
    Ok(())
}

fn print_forecast(result: &Forecast, model: &dyn Regressor) {
    let [power, utilization, co2, homes] = result.metrics.display();

    println!();
    println!("Predicted Power:       {}", power);
    println!("Capacity Utilization:  {} ({})", utilization, result.metrics.plant_status.as_str());
    println!("CO2 Saved:             {}", co2);
    println!("Homes Powered:         {}", homes);

    println!();
    println!("Input Parameters:");
    for row in &result.input_table {
        println!("  {:<28} {:>10.2}   optimal {}", row.parameter, row.value, row.optimal_range);
    }

    println!();
    println!("Feature Importance:");
    for line in importance_bars(model, 30) {
        println!("  {}", line);
    }
    if let Some(top) = &result.top_feature {
        println!();
        println!(
            "{} is the most influential factor ({:.1}% of importance).",
            top.label,
            top.importance * 100.0
        );
    }
}

fn inspect_model(app_config: &AppConfig) -> Result<()> {
    let artifact = ModelArtifact::new(&app_config.paths.model);
    let model = artifact
        .load()
        .with_context(|| format!("Could not load model from {}", artifact.path().display()))?;

    let report = &model.report;
    let params = &report.params;
    println!("Artifact:      {}", artifact.path().display());
    println!("Trained at:    {}", model.trained_at.to_rfc3339());
    println!(
        "Forest:        {} trees, max_depth {}, min_samples_leaf {}, seed {}",
        model.forest().n_trees(),
        params.max_depth,
        params.min_samples_leaf,
        params.seed
    );
    println!("Features:      {}", model.schema.columns.join(", "));
    println!("Target:        {}", model.schema.target);
    println!(
        "Samples:       {} train / {} test",
        report.train_samples, report.test_samples
    );
    println!(
        "Held-out:      MAE {:.4}  RMSE {:.4}  R² {:.4}",
        report.mae, report.rmse, report.r2
    );
    println!(
        "Target range:  {:.4} .. {:.4} kW",
        report.target_min, report.target_max
    );

    println!();
    println!("Feature Importance:");
    for line in importance_bars(&model, 30) {
        println!("  {}", line);
    }
    Ok(())
}
