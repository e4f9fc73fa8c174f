// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use rds_collector::{
    catalog::Mode,
    client::build_http_client,
    collector::Collector,
    config::Config,
    credentials::DefaultCredentialsResolver,
    exporter::RdsExporter,
    registry::Registry,
    server::{self, Routes},
    session::{SessionManager, Transport},
    settings::ExporterSettings,
    stats::ExporterStats,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let settings = match ExporterSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid exporter settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", settings.log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Could not parse log level {}: {e}", settings.log_level);
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: ExporterSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load(&settings.config_file)?;
    info!(
        "Loaded {} instances from {}",
        config.instances.len(),
        settings.config_file.display()
    );

    let client = build_http_client(&settings.client_config())
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
    let stats = Arc::new(
        ExporterStats::new().map_err(|e| format!("Failed to create exporter stats: {e}"))?,
    );
    let mut transport = Transport::new(client.clone(), Arc::clone(&stats));
    transport.endpoint_override = settings.endpoint_url.clone();
    transport.trace_requests = settings.log_trace;

    let sessions = Arc::new(SessionManager::new(
        Arc::new(transport),
        Arc::new(DefaultCredentialsResolver::new(client)),
    ));
    let established = sessions.warm_up(&config.instances).await?;
    debug!("Established {established} sessions");

    let mut routes = Routes::new();
    let mut stats_registered = false;
    for mode in settings.metric_types.modes() {
        let exporter = RdsExporter::new(
            &[mode],
            sessions.clone(),
            &config.instances,
            settings.fan_out(),
            Arc::clone(&stats),
        );
        debug!("Describing {} {mode} metrics", exporter.describe().len());

        let mut registry = Registry::new();
        registry.register(Arc::new(exporter))?;
        if !stats_registered {
            registry.register_native(Box::new(stats.as_ref().clone()))?;
            stats_registered = true;
        }
        let path = match mode {
            Mode::Basic => &settings.basic_path,
            Mode::Enhanced => &settings.enhanced_path,
        };
        routes = routes.route(path.clone(), Arc::new(registry));
    }

    let listener = TcpListener::bind(&settings.listen_address).await?;
    let address = listener.local_addr()?;
    for mode in settings.metric_types.modes() {
        match mode {
            Mode::Basic => info!("Basic metrics    : http://{address}{}", settings.basic_path),
            Mode::Enhanced => {
                info!("Enhanced metrics : http://{address}{}", settings.enhanced_path)
            }
        }
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down");
        shutdown.cancel();
    });

    server::serve(listener, Arc::new(routes), cancel).await
}
