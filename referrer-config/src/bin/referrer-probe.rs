use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use referrer_config::{ConfigLoader, ResolverConfig};
use referrer_core::{
    ReferrerResolver,
    port::scripted::{CompletionScript, PayloadScript, ScriptedConnector},
};
use referrer_model::{AttributionPayload, StatusCode};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "referrer-probe",
    about = "Drive the install-referrer resolver against a scripted service"
)]
struct Cli {
    /// Raw response code the scripted service reports (0 = OK).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    status: i32,
    /// Number of concurrent callers.
    #[arg(long, default_value_t = 3)]
    callers: usize,
    /// Delay before the service reports completion, e.g. "50ms".
    #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration)]
    delay: Duration,
    /// Never report completion (models a dropped service callback).
    #[arg(long)]
    silent: bool,
    /// How the payload read behaves after an OK status.
    #[arg(long, value_enum, default_value = "payload")]
    read: ReadArg,
    /// Referrer string returned on a successful read.
    #[arg(long, default_value = "utm_source=probe&utm_medium=cli")]
    referrer: String,
    /// Per-request timeout; overrides the loaded config.
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    /// Config file; defaults to the environment/search-path lookup.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadArg {
    Payload,
    ConnectionLost,
    Remote,
}

impl Cli {
    fn payload_script(&self) -> PayloadScript {
        match self.read {
            ReadArg::Payload => PayloadScript::Payload(AttributionPayload {
                install_referrer: self.referrer.clone(),
                referrer_click_timestamp_seconds: 1_700_000_000,
                install_begin_timestamp_seconds: 1_700_000_030,
                referrer_click_timestamp_server_seconds: 1_700_000_001,
                install_begin_timestamp_server_seconds: 1_700_000_031,
                install_version: env!("CARGO_PKG_VERSION").to_string(),
                experiment_param: "false".to_string(),
            }),
            ReadArg::ConnectionLost => {
                PayloadScript::ConnectionLost("probe dropped the binder".into())
            }
            ReadArg::Remote => PayloadScript::Remote("probe remote failure".into()),
        }
    }

    fn completion_script(&self) -> CompletionScript {
        if self.silent {
            CompletionScript::Silent
        } else {
            CompletionScript::Delayed {
                status: StatusCode::from_raw(self.status),
                delay: self.delay,
            }
        }
    }

    fn resolver_config(&self) -> Result<ResolverConfig> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::from_env().with_path(path),
            None => ConfigLoader::from_env(),
        };
        let mut config = loader
            .load()
            .context("failed to load resolver config")?
            .config;
        if let Some(timeout) = self.timeout {
            config.request_timeout = Some(timeout);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.resolver_config()?;
    if cli.silent && config.request_timeout.is_none() {
        anyhow::bail!("--silent without a timeout would wait forever; pass --timeout");
    }

    let connector = Arc::new(ScriptedConnector::new(
        cli.completion_script(),
        cli.payload_script(),
    ));
    let resolver = ReferrerResolver::with_config(connector.clone(), config);
    info!(
        "probing resolver: callers={}, status={}",
        cli.callers,
        StatusCode::from_raw(cli.status)
    );

    let tasks: Vec<_> = (0..cli.callers)
        .map(|caller| {
            let resolver = resolver.clone();
            tokio::spawn(async move { (caller, resolver.get_attribution().await) })
        })
        .collect();

    for task in tasks {
        let (caller, result) = task.await.context("caller task panicked")?;
        let line = match result {
            Ok(payload) => json!({ "caller": caller, "ok": payload }),
            Err(err) => json!({
                "caller": caller,
                "error": { "code": err.code(), "message": err.to_failure().message },
            }),
        };
        println!("{line}");
    }

    let stats = connector.stats();
    info!(
        "probe finished: state={:?}, connects={}, reads={}, closes={}",
        resolver.state(),
        stats.connects(),
        stats.reads(),
        stats.closes()
    );
    resolver.shutdown();
    Ok(())
}
