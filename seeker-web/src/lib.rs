#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Web server for [Seeker](../seeker/index.html).
//!
//! Two fixed routes answer health probes. Every other request goes to the
//! [`Dispatcher`], which resolves it to an authority and runs it through that
//! authority's exchange chain.

mod dispatcher;
mod errors;
mod health;
mod logging;
mod middleware;
mod pipeline;
mod shutdown;

pub use crate::{
    dispatcher::{Dispatcher, Resolution, RouteTable},
    errors::HandlerError,
    health::Health,
    pipeline::{Pipeline, PipelineBuilder, PipelineError},
    shutdown::{shutdown_on, shutdown_on_signal},
};

use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use cadence::StatsdClient;
use logging::SeekerRootSpanBuilder;
use seeker_settings::Settings;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

/// Run the web server
///
/// The returned server is a `Future` that must either be `.await`ed, or run it
/// as a background task using `tokio::spawn`.
///
/// The pipeline must already be built, so startup has completed before the
/// listener accepts anything. Most of the details from `settings` will be
/// respected, except for those that go into building the listener (the host
/// and port). If you want to respect the settings specified in that object,
/// you must include them in the construction of `listener`.
///
/// The server does not listen for signals itself. Use
/// [`shutdown_on_signal`] with the server's handle to stop it.
///
/// # Errors
///
/// Returns an error if the server cannot be started on the provided listener.
///
/// # Examples
///
/// Run the server in the foreground. This will only return if there is an error
/// that causes the server to shut down, or when it is stopped.
///
/// ```no_run
/// # actix_rt::System::new().block_on(async {
/// use seeker_web::PipelineBuilder;
///
/// let settings = seeker_settings::Settings::load().expect("Failed to load settings");
/// let metrics_client = cadence::StatsdClient::from_sink("seeker", cadence::NopMetricSink);
/// let pipeline = PipelineBuilder::new(&settings, metrics_client.clone())
///     .build()
///     .await
///     .expect("Failed to build pipeline");
/// let listener = std::net::TcpListener::bind(settings.http.listen)
///     .expect("Failed to bind port");
/// let server = seeker_web::run(listener, metrics_client, &pipeline, &settings)
///     .expect("Failed to start server");
/// actix_rt::spawn(seeker_web::shutdown_on_signal(server.handle(), pipeline.health.clone()));
/// server.await.expect("Fatal error while running server");
/// # })
/// ```
pub fn run(
    listener: TcpListener,
    metrics_client: StatsdClient,
    pipeline: &Pipeline,
    settings: &Settings,
) -> Result<Server, std::io::Error> {
    let dispatcher = Data::from(pipeline.dispatcher.clone());
    let health = Data::from(pipeline.health.clone());

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(dispatcher.clone())
            .app_data(health.clone())
            .app_data(metrics_client.clone())
            .wrap(middleware::Metrics)
            .wrap(TracingLogger::<SeekerRootSpanBuilder>::new())
            // Health probes never reach the dispatcher.
            .configure(health::configure)
            .default_service(web::to(dispatcher::dispatch))
    })
    .client_request_timeout(settings.http.read_timeout)
    .keep_alive(settings.http.idle_timeout)
    .shutdown_timeout(settings.http.shutdown_timeout.as_secs())
    .disable_signals()
    .listen(listener)?;

    if let Some(n) = settings.http.workers {
        server = server.workers(n.get());
    }

    Ok(server.run())
}
