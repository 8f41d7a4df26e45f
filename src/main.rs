use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ebuild_autoupdate::apply::{
    Applier, ApplyError, PendingStatus, PendingStore, SqlitePendingStore, stdin_confirm,
};
use ebuild_autoupdate::cache::AnalysisCache;
use ebuild_autoupdate::config::{self, ConfigError, LlmConfig, PackagesConfig};
use ebuild_autoupdate::extract::ExtractionEngine;
use ebuild_autoupdate::fetch::HttpFetcher;
use ebuild_autoupdate::llm::{LlmError, LlmProvider, provider_from_config};
use ebuild_autoupdate::logging;
use ebuild_autoupdate::pipeline::{AnalyzeOptions, Analyzer};
use ebuild_autoupdate::ratelimit::RateLimiter;

#[derive(Parser)]
#[command(name = "ebuild-autoupdate")]
#[command(version, about = "Track upstream releases and bump ebuilds in a Gentoo overlay")]
struct Cli {
    /// Overlay root
    #[arg(long, global = true, default_value = ".")]
    overlay: PathBuf,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for `llm.toml`
#[derive(Args)]
struct LlmArgs {
    #[arg(long, global = true)]
    llm_provider: Option<String>,
    #[arg(long, global = true)]
    llm_model: Option<String>,
    #[arg(long, global = true)]
    llm_base_url: Option<String>,
    /// Environment variable holding the API key
    #[arg(long, global = true)]
    llm_api_key_env: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Find and cache a working extraction schema
    Analyze {
        package: String,
        /// Endpoint to try before discovered sources
        #[arg(long)]
        url: Option<String>,
        /// Guidance for the LLM
        #[arg(long, default_value = "")]
        hint: String,
        /// Ignore the analysis cache
        #[arg(long)]
        force: bool,
    },
    /// Compare overlay versions with upstream and record newer releases
    Check {
        /// Packages to check; defaults to every package in packages.toml
        packages: Vec<String>,
        #[arg(long)]
        force: bool,
    },
    /// Copy the ebuild for a pending update and regenerate its manifest
    Apply {
        package: String,
        /// Run `ebuild clean compile` afterwards
        #[arg(long)]
        build_probe: bool,
    },
    /// List pending updates
    Pending {
        /// pending, validated or failed
        #[arg(long)]
        status: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&config::log_path(), cli.verbose)
        .with_context(|| format!("failed to set up logging in {:?}", config::data_dir()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = config::db_path();
    let ledger: Arc<dyn PendingStore> = Arc::new(
        SqlitePendingStore::open(&db_path)
            .with_context(|| format!("failed to open ledger at {db_path:?}"))?,
    );

    match cli.command {
        Command::Analyze {
            package,
            url,
            hint,
            force,
        } => {
            let analyzer = analyzer(&cli.overlay, &cli.llm, ledger)?;
            let options = AnalyzeOptions { url, hint, force };
            let report = analyzer.analyze(&package, &options).await?;

            for attempt in &report.attempts {
                let outcome = match (&attempt.skipped, &attempt.validation) {
                    (Some(reason), _) => format!("skipped: {reason}"),
                    (None, Some(v)) if v.valid => format!("ok ({})", v.extracted_version),
                    (None, Some(v)) => v
                        .error
                        .as_ref()
                        .map_or_else(|| "invalid".to_string(), |e| e.to_string()),
                    (None, None) => "not tried".to_string(),
                };
                println!("{:<60} {}", attempt.url, outcome);
            }

            match report.schema {
                Some(schema) => {
                    if report.from_cache {
                        println!("(cached)");
                    }
                    println!("{}", serde_json::to_string_pretty(&schema)?);
                }
                None => bail!("no working extraction schema found for {package}"),
            }
        }
        Command::Check { packages, force } => {
            let analyzer = analyzer(&cli.overlay, &cli.llm, ledger)?;
            let packages = if packages.is_empty() {
                analyzer.configured_packages()
            } else {
                packages
            };
            let options = AnalyzeOptions {
                force,
                ..Default::default()
            };

            let mut failures = 0;
            for (package, result) in analyzer.check_all(&packages, &options).await {
                match result {
                    Ok(outcome) if outcome.update_available => println!(
                        "{package}: {} -> {}",
                        outcome.current_version, outcome.upstream_version
                    ),
                    Ok(outcome) => println!("{package}: up to date ({})", outcome.current_version),
                    Err(e) => {
                        failures += 1;
                        println!("{package}: error: {e}");
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} of {} packages failed", packages.len());
            }
        }
        Command::Apply {
            package,
            build_probe,
        } => {
            let applier = Applier::new(&cli.overlay, ledger)
                .with_logs_dir(config::logs_dir())
                .with_confirm(Box::new(stdin_confirm));
            let result = tokio::task::spawn_blocking(move || applier.apply(&package, build_probe))
                .await
                .context("apply task panicked")?;

            for file in &result.version_files {
                println!("check version-specific file: {}", file.display());
            }
            match result.error {
                None => println!(
                    "{}: applied {} -> {}",
                    result.package, result.old_version, result.new_version
                ),
                Some(ApplyError::UserDeclined) => println!(
                    "{}: manifest regenerated, build probe declined",
                    result.package
                ),
                Some(e) => return Err(e).context(format!("failed to apply {}", result.package)),
            }
        }
        Command::Pending { status } => {
            let status = status
                .map(|s| s.parse::<PendingStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            for update in ledger.list(status)? {
                println!(
                    "{:<40} {:>12} -> {:<12} {:<10} {}",
                    update.package,
                    update.current_version,
                    update.new_version,
                    update.status,
                    update.detail.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn analyzer(
    overlay: &std::path::Path,
    llm_args: &LlmArgs,
    ledger: Arc<dyn PendingStore>,
) -> anyhow::Result<Analyzer> {
    let packages = match PackagesConfig::load(overlay) {
        Ok(packages) => packages,
        Err(ConfigError::NotFound(path)) => {
            info!("No package configuration at {:?}", path);
            PackagesConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    packages.validate_all()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending requests");
            ctrl_c.cancel();
        }
    });

    let limiter = Arc::new(RateLimiter::new());
    let mut engine = ExtractionEngine::new(Arc::clone(&limiter)).with_cancellation(cancel.clone());
    if let Some(provider) = llm_provider(llm_args)? {
        engine = engine.with_llm(provider);
    }

    let cache = AnalysisCache::open(&config::db_path())?;
    cache.prune_expired()?;
    let fetcher = HttpFetcher::new(limiter).with_cancellation(cancel);

    Ok(Analyzer::new(overlay, Arc::new(fetcher), Arc::new(engine), Arc::new(cache))
        .with_packages(packages)
        .with_ledger(ledger))
}

fn llm_provider(args: &LlmArgs) -> anyhow::Result<Option<Arc<dyn LlmProvider>>> {
    let mut config = LlmConfig::load(&config::llm_config_path())?;
    let overrides = [
        (&args.llm_provider, &mut config.provider),
        (&args.llm_model, &mut config.model),
        (&args.llm_base_url, &mut config.base_url),
        (&args.llm_api_key_env, &mut config.api_key_env),
    ];
    for (arg, field) in overrides {
        if let Some(value) = arg {
            *field = value.clone();
        }
    }

    match provider_from_config(&config) {
        Ok(provider) => Ok(Some(provider)),
        Err(LlmError::NotConfigured) => {
            info!("No LLM provider configured, AI-assisted extraction disabled");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
