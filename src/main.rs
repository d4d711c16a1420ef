use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use ledger_snapshot::rpc::ProviderPool;
use ledger_snapshot::snapshot::{build_registry, SnapshotAssembler, SnapshotRunner};
use ledger_snapshot::types::config::snapshot::SnapshotConfigRaw;

const DEFAULT_CONFIG_PATH: &str = "config/snapshot.json";

#[derive(Debug, PartialEq)]
struct CliArgs {
    config_path: PathBuf,
    /// Snapshot names to run. Empty means every configured snapshot.
    only: Vec<String>,
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut only = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = PathBuf::from(path);
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config_path = PathBuf::from(path);
        } else if arg.starts_with("--") {
            anyhow::bail!("Unknown option {}", arg);
        } else {
            only.push(arg.clone());
        }
    }

    Ok(CliArgs { config_path, only })
}

fn select_assemblers(
    registry: Vec<Box<dyn SnapshotAssembler>>,
    only: &[String],
) -> anyhow::Result<Vec<Box<dyn SnapshotAssembler>>> {
    if only.is_empty() {
        return Ok(registry);
    }

    let unknown: Vec<&String> = only
        .iter()
        .filter(|name| !registry.iter().any(|a| a.name() == name.as_str()))
        .collect();
    anyhow::ensure!(
        unknown.is_empty(),
        "Unknown or unconfigured snapshots {:?} (available: {:?})",
        unknown,
        registry.iter().map(|a| a.name()).collect::<Vec<_>>()
    );

    Ok(registry
        .into_iter()
        .filter(|a| only.iter().any(|name| name == a.name()))
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let raw = SnapshotConfigRaw::load(&args.config_path)?;
    load_required_env_vars(&raw)?;
    let config = raw.resolve(|key| env::var(key).ok())?;

    tracing::info!(
        "Loaded config from {}: {} endpoints, window {:?}, output {}",
        args.config_path.display(),
        config.rpc_urls.len(),
        config.settings.window,
        config.settings.output_dir.display()
    );

    let pool = ProviderPool::from_urls(&config.rpc_urls, config.rate_limit.as_ref())
        .context("failed to build provider pool")?
        .with_retry(config.retry.clone());
    tracing::info!(
        "Provider pool ready: {} connections, max {} retries per request",
        pool.len(),
        pool.retry_config().max_retries
    );

    let assemblers = select_assemblers(build_registry(&config.settings.contracts), &args.only)?;
    anyhow::ensure!(
        !assemblers.is_empty(),
        "No snapshots to run: configure at least one contract address"
    );

    let runner = SnapshotRunner::new(Arc::new(pool), Arc::new(config.settings));
    let report = runner.run(&assemblers).await;

    for path in &report.written {
        tracing::info!("Wrote {}", path.display());
    }

    if !report.is_success() {
        let failed: Vec<&str> = report.failed.iter().map(|(key, _)| key.as_str()).collect();
        anyhow::bail!("{} snapshots failed: {:?}", failed.len(), failed);
    }

    Ok(())
}

/// Loads `.env` when the endpoint variable is not already set.
fn load_required_env_vars(config: &SnapshotConfigRaw) -> anyhow::Result<()> {
    let var = config.rpc_urls_env_var.as_str();
    if env::var(var).is_ok() {
        return Ok(());
    }

    dotenvy::dotenv()
        .with_context(|| format!("Missing env var {} and failed to load .env file", var))?;

    anyhow::ensure!(
        env::var(var).is_ok(),
        "Missing required env var after loading .env: {}",
        var
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_snapshot::snapshot::all_assemblers;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&strings(&["--config", "custom.json", "token", "staking"])).unwrap();
        assert_eq!(
            args,
            CliArgs {
                config_path: PathBuf::from("custom.json"),
                only: vec!["token".to_string(), "staking".to_string()],
            }
        );

        let args = parse_args(&strings(&["--config=other.json"])).unwrap();
        assert_eq!(args.config_path, PathBuf::from("other.json"));
        assert!(args.only.is_empty());

        assert_eq!(
            parse_args(&[]).unwrap().config_path,
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
        assert!(parse_args(&strings(&["--config"])).is_err());
        assert!(parse_args(&strings(&["--decode-only"])).is_err());
    }

    #[test]
    fn test_select_assemblers() {
        let selected = select_assemblers(all_assemblers(), &strings(&["bpd", "token"])).unwrap();
        let mut names: Vec<&str> = selected.iter().map(|a| a.name()).collect();
        names.sort();
        assert_eq!(names, vec!["bpd", "token"]);

        assert_eq!(select_assemblers(all_assemblers(), &[]).unwrap().len(), 7);
        assert!(select_assemblers(all_assemblers(), &strings(&["nope"])).is_err());
    }
}
