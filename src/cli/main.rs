use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use crop_recommender::{
    config::Config,
    ml::{ModelMetadata, Trainer},
    models::SoilSample,
    telemetry,
};
use reqwest::Client;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crop-cli")]
#[command(about = "Crop Recommender CLI", version, long_about = None)]
struct Cli {
    #[arg(short, long, env = "CROP_ENDPOINT", default_value = "http://127.0.0.1:5000")]
    endpoint: String,

    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the ensemble and write artifacts
    Train {
        /// Read the dataset from a local CSV file
        #[arg(short, long, conflicts_with = "url")]
        dataset: Option<PathBuf>,

        /// Download the dataset from this URL
        #[arg(short, long)]
        url: Option<String>,

        /// Artifact directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for the split and MLP initialisation
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Ask a running server for a recommendation
    Predict {
        /// JSON file holding the payload
        #[arg(short, long, conflicts_with = "soil_type")]
        file: Option<PathBuf>,

        #[command(flatten)]
        sample: SampleArgs,
    },

    /// List soil types the server accepts
    SoilTypes,

    /// Check server health
    Health,
}

#[derive(Args)]
struct SampleArgs {
    #[arg(long)]
    soil_type: Option<String>,
    #[arg(long)]
    soil_depth: Option<f64>,
    #[arg(long)]
    ph: Option<f64>,
    #[arg(long)]
    bulk_density: Option<f64>,
    #[arg(long)]
    ec: Option<f64>,
    #[arg(long)]
    organic_carbon: Option<f64>,
    #[arg(long)]
    moisture_retention: Option<f64>,
    #[arg(long)]
    water_capacity: Option<f64>,
    #[arg(long)]
    infiltration_rate: Option<f64>,
    #[arg(long)]
    clay: Option<f64>,
}

impl SampleArgs {
    fn into_sample(self) -> anyhow::Result<SoilSample> {
        fn need<T>(value: Option<T>, flag: &str) -> anyhow::Result<T> {
            value.with_context(|| format!("--{} is required unless --file is given", flag))
        }

        Ok(SoilSample::from_parts(
            need(self.soil_type, "soil-type")?,
            [
                need(self.soil_depth, "soil-depth")?,
                need(self.ph, "ph")?,
                need(self.bulk_density, "bulk-density")?,
                need(self.ec, "ec")?,
                need(self.organic_carbon, "organic-carbon")?,
                need(self.moisture_retention, "moisture-retention")?,
                need(self.water_capacity, "water-capacity")?,
                need(self.infiltration_rate, "infiltration-rate")?,
                need(self.clay, "clay")?,
            ],
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Train {
            dataset,
            url,
            output,
            seed,
        } => {
            let mut config =
                Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
            telemetry::init_tracing(&config.observability)?;

            if let Some(path) = dataset {
                config.training.dataset_path = Some(path);
            }
            if let Some(url) = url {
                config.training.dataset_path = None;
                config.training.dataset_url = url;
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            let output = output.unwrap_or_else(|| config.artifacts.dir.clone());

            let trainer = Trainer::new(config.training)?;
            let bundle = trainer.run(&output).await?;
            print_summary(&bundle.metadata, &output);
        }

        Commands::Predict { file, sample } => {
            let payload: serde_json::Value = match file {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str(&text)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?
                }
                None => serde_json::to_value(sample.into_sample()?)?,
            };

            let response = client
                .post(format!("{}/predict", cli.endpoint))
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            if !status.is_success() {
                bail!("prediction failed with status {}", status);
            }
        }

        Commands::SoilTypes => {
            let response = client
                .get(format!("{}/soil-types", cli.endpoint))
                .send()
                .await?
                .error_for_status()?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn print_summary(metadata: &ModelMetadata, output: &std::path::Path) {
    println!("Crop Recommender Training");
    println!("=========================");
    println!("Model version:  {}", metadata.version);
    println!("Dataset:        {}", metadata.dataset_source);
    println!("SHA-256:        {}", metadata.dataset_sha256);
    println!(
        "Samples:        {} train / {} validation / {} test",
        metadata.n_training_samples, metadata.n_validation_samples, metadata.n_test_samples
    );
    println!("Crops:          {}", metadata.n_classes);
    println!();
    println!("{:<10} {:>12} {:>10} {:>10}", "model", "validation", "test", "test F1");
    for (name, test) in &metadata.test_metrics {
        let validation = metadata
            .validation_metrics
            .get(name)
            .map(|m| m.accuracy)
            .unwrap_or_default();
        println!(
            "{:<10} {:>12.4} {:>10.4} {:>10.4}",
            name, validation, test.accuracy, test.f1_score
        );
    }
    println!();
    println!("Artifacts written to {}", output.display());
}
