//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use nbeats_core::config::{EnsembleConfig, load_config, workspace_config_path};
use nbeats_core::data::loader::LoaderParams;
use nbeats_core::data::{CsvSeriesSource, SeriesSource, create_loaders};
use nbeats_core::forecast::{ForecastFrame, aggregate_median};
use nbeats_core::training::NbeatsHyperparameters;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Grid { frequency, width } => {
            handle_grid(frequency, width, workspace, config_path).await
        }
        Commands::Loaders { frequency } => handle_loaders(frequency, workspace, config_path).await,
        Commands::Aggregate { frames, output } => handle_aggregate(&frames, &output).await,
        Commands::Config { action } => handle_config(action, workspace, config_path).await,
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<EnsembleConfig> {
    load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn hyperparameters(
    config: &EnsembleConfig,
    frequency: Option<&str>,
) -> anyhow::Result<NbeatsHyperparameters> {
    let frequency = frequency.unwrap_or(config.frequency.as_str());
    Ok(NbeatsHyperparameters::new(frequency, &config.ensemble)?)
}

async fn handle_grid(
    frequency: Option<String>,
    width: usize,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load(workspace, config_path)?;
    let hp = hyperparameters(&config, frequency.as_deref())?;
    print!("{}", hp.models_table(width));
    println!(
        "{} data shapes x {} ensemble members = {} models",
        hp.grid.combinations(),
        hp.ensemble_grid.combinations(),
        hp.n_models()
    );
    Ok(())
}

async fn handle_loaders(
    frequency: Option<String>,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load(workspace, config_path)?;
    let hp = hyperparameters(&config, frequency.as_deref())?;
    let source = CsvSeriesSource::new(&config.data.directory);
    let (series, statics) = source.load(hp.group.name).await?;
    let (series, statics) = (Arc::new(series), Arc::new(statics));

    println!(
        "{}: {} series, {} observations, {} static features",
        hp.group.name,
        series.len(),
        series.n_observations(),
        statics.n_features()
    );
    for row in hp.grid.expand() {
        let params = LoaderParams::from_row(&row)?;
        let loaders = create_loaders(&series, &statics, &params, config.fit.num_workers)?;
        println!(
            "  lookback {:>2} (n_time_in = {:>3}): {} train windows in {} batches, {} test windows",
            hp.lookback_of(params.n_time_in),
            params.n_time_in,
            loaders.train.dataset().len(),
            loaders.train.n_batches(),
            loaders.test.dataset().len()
        );
    }
    Ok(())
}

async fn handle_aggregate(frames: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let frames = frames
        .iter()
        .map(|path| ForecastFrame::read_csv(path))
        .collect::<Result<Vec<_>, _>>()?;
    let forecast = aggregate_median(&frames)?;
    forecast.write_csv(output)?;
    println!(
        "Aggregated {} member forecasts into {} series at {}",
        frames.len(),
        forecast.len(),
        output.display()
    );
    Ok(())
}

async fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let toml_str = toml::to_string_pretty(&EnsembleConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbeats_core::forecast::ForecastRow;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();

        let config_path = workspace.join(".nbeats").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: EnsembleConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, EnsembleConfig::default());
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace_config_path(workspace);
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, "frequency = \"Monthly\"\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content, "frequency = \"Monthly\"\n");
    }

    #[tokio::test]
    async fn test_grid_rejects_unknown_frequency() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Grid {
            frequency: Some("Weekly".into()),
            width: 40,
        };
        let err = handle_command(command, dir.path(), None).await.unwrap_err();
        assert!(err.to_string().contains("not Weekly"));
    }

    #[tokio::test]
    async fn test_aggregate_writes_median() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = [(1, 10.0), (2, 20.0), (3, 60.0)]
            .into_iter()
            .map(|(m, v)| {
                let path = dir.path().join(format!("m_{m}.csv"));
                ForecastFrame {
                    rows: vec![ForecastRow {
                        unique_id: 0,
                        model: format!("m_{m}"),
                        values: vec![v, v + 1.0],
                    }],
                }
                .write_csv(&path)
                .unwrap();
                path
            })
            .collect();
        let output = dir.path().join("ensemble.csv");

        let command = Commands::Aggregate {
            frames: paths,
            output: output.clone(),
        };
        handle_command(command, dir.path(), None).await.unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content, "unique_id,0,1\n0,20,21\n");
    }

    #[tokio::test]
    async fn test_loaders_reads_configured_directory() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("m4");
        std::fs::create_dir_all(data.join("Yearly")).unwrap();
        let mut csv = String::from("unique_id,ds,y\n");
        for t in 0..20 {
            csv.push_str(&format!("Y1,{t},{t}\n"));
        }
        std::fs::write(data.join("Yearly").join("Y_df.csv"), csv).unwrap();

        let mut config = EnsembleConfig::default();
        config.data.directory = data;
        config.ensemble.lookbacks = vec![2];
        let config_file = dir.path().join("sweep.toml");
        std::fs::write(&config_file, toml::to_string_pretty(&config).unwrap()).unwrap();

        let command = Commands::Loaders { frequency: None };
        handle_command(command, dir.path(), Some(&config_file))
            .await
            .unwrap();
    }
}
