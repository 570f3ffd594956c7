#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! An HTTP front end that answers search requests through a dispatch pipeline.
//!
//! Seeker is split into several subcrates that work in collaboration.
//!
//! - [seeker-exchange](../seeker_exchange/index.html)
//! - [seeker-integration-tests](../seeker_integration_tests/index.html)
//! - [seeker-search](../seeker_search/index.html)
//! - [seeker-settings](../seeker_settings/index.html)
//! - [seeker-web](../seeker_web/index.html)

use anyhow::{Context, Result};
use cadence::{BufferedUdpMetricSink, QueuingMetricSink, StatsdClient};
use seeker_settings::{LogFormat, MetricsSettings, Settings};
use seeker_web::PipelineBuilder;
use std::{
    net::{TcpListener, UdpSocket},
    num::NonZeroUsize,
    time::Instant,
};
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Primary entry point
#[actix_rt::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let settings = Settings::load().context("Loading settings")?;
    init_logging(&settings)?;
    log_banner(&settings);

    let metrics_client =
        make_metrics_client(&settings.metrics).context("Setting up the metrics client")?;

    // The listener is bound only after every resource has acknowledged
    // startup and every authority is registered.
    let pipeline = PipelineBuilder::new(&settings, metrics_client.clone())
        .build()
        .await
        .context("Building the dispatch pipeline")?;

    let listener = TcpListener::bind(settings.http.listen).context("Binding port")?;
    let server = seeker_web::run(listener, metrics_client, &pipeline, &settings)
        .context("Starting seeker-web server")?;
    actix_rt::spawn(seeker_web::shutdown_on_signal(
        server.handle(),
        pipeline.health.clone(),
    ));

    tracing::info!(
        r#type = "seeker.started",
        elapsed_ms = started.elapsed().as_millis() as u64,
        listen = %settings.http.listen,
        "started"
    );

    server.await.context("Running seeker-web server")?;
    Ok(())
}

/// Set up logging for Seeker, based on settings and the `RUST_LOG` environment variable.
fn init_logging(settings: &Settings) -> Result<()> {
    LogTracer::init()?;
    let env_filter: EnvFilter = (&settings.logging.levels).into();
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    match settings.logging.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())?;
        }
    }
    Ok(())
}

/// Describe the process and the settings it runs with.
fn log_banner(settings: &Settings) {
    let cpus = std::thread::available_parallelism().map_or(1, usize::from);
    tracing::info!(
        r#type = "seeker.banner",
        version = env!("CARGO_PKG_VERSION"),
        env = %settings.env,
        listen = %settings.http.listen,
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        cpus,
        workers = settings.http.workers.map_or(cpus, NonZeroUsize::get),
        read_timeout = ?settings.http.read_timeout,
        write_timeout = ?settings.http.write_timeout,
        idle_timeout = ?settings.http.idle_timeout,
        host_timeout = ?settings.host.timeout,
        startup_timeout = ?settings.host.startup_timeout,
        "Seeker starting"
    );
}

/// Build the Statsd client metrics are reported through.
///
/// Metrics are buffered and sent from a background thread, so reporting never
/// blocks a request.
fn make_metrics_client(settings: &MetricsSettings) -> Result<StatsdClient> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Binding the metrics socket")?;
    socket
        .set_nonblocking(true)
        .context("Configuring the metrics socket")?;
    let udp_sink = BufferedUdpMetricSink::with_capacity(
        (settings.sink_host.as_str(), settings.sink_port),
        socket,
        settings.max_queue_size_kb * 1024,
    )
    .context("Connecting the metrics sink")?;
    let sink = QueuingMetricSink::from(udp_sink);

    Ok(StatsdClient::builder("seeker", sink)
        .with_error_handler(|error| {
            tracing::warn!(r#type = "seeker.metrics.error", %error, "Could not send metric");
        })
        .build())
}
