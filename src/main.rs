use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sirocco_core::Config;
use sirocco_core::meter::HeuristicMeter;
use sirocco_core::plan::LlmFragmentJudge;
use sirocco_core::session::SessionRunner;
use sirocco_llm::compatible::CompatibleProvider;
use sirocco_llm::summarize::LlmSummarizer;
use sirocco_tools::{AuditLogger, CompositeExecutor, FileExecutor, ShellExecutor};

#[derive(Debug, Parser)]
#[command(name = "sirocco", version, about = "Budget-controlled agent session runner")]
struct Args {
    /// The task to run to completion.
    task: String,

    /// Path to the TOML configuration file.
    #[arg(long, default_value = "sirocco.toml")]
    config: PathBuf,

    /// Override [session].max_turns from the command line.
    #[arg(long)]
    max_turns: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        tracing::debug!(path = %args.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(max_turns) = args.max_turns {
        config.session.max_turns = max_turns;
    }

    let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "API key env var is empty, provider calls may be rejected"
        );
    }

    let provider = CompatibleProvider::new(
        config.llm.provider.clone(),
        api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
    );
    let summarizer = LlmSummarizer::new(provider.clone());
    let judge = LlmFragmentJudge::new(provider.clone());

    let audit = if config.audit.enabled {
        Some(Arc::new(
            AuditLogger::from_config(&config.audit)
                .await
                .context("opening audit destination")?,
        ))
    } else {
        None
    };

    let mut shell = ShellExecutor::new(&config.tools.shell);
    let mut file = FileExecutor::new(&config.tools.file);
    if let Some(ref logger) = audit {
        shell = shell.with_audit(Arc::clone(logger));
        file = file.with_audit(Arc::clone(logger));
    }
    let tools = CompositeExecutor::new(shell, file);

    let mut runner =
        SessionRunner::new(HeuristicMeter, provider, summarizer, judge, tools, &config);
    if let Some(logger) = audit {
        runner = runner.with_audit(logger);
    }

    let answer = runner.run(&args.task).await?;
    tracing::info!(
        restarts = runner.controller().restart_count(),
        tokens = runner.controller().total_tokens(),
        "session finished"
    );
    println!("{answer}");
    Ok(())
}
