//! Tools for running tests

use crate::utils::{logging::LogWatcher, metrics::MetricsWatcher};
use actix_web::dev::ServerHandle;
use reqwest::{redirect, Client, ClientBuilder, RequestBuilder};
use seeker_exchange::access_log::BufferSink;
use seeker_settings::Settings;
use seeker_web::{Health, PipelineBuilder};
use std::{future::Future, net::TcpListener, sync::Arc};
use tracing::instrument::WithSubscriber;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

/// Run a test with a fully configured Seeker server.
///
/// The server will listen on a port assigned arbitrarily by the OS.
///
/// A suite of tools will be passed to the test function in the form of an
/// instance of [`TestingTools`]. It includes an HTTP client configured to use
/// the test server, the access log records the server wrote, and a log
/// collector that can make assertions about logs that were printed.
///
/// # Example
///
/// ```no_run
/// # use seeker_integration_tests::{seeker_test, TestingTools};
/// #[actix_rt::test]
/// async fn a_test() {
///     seeker_test(
///         |settings| settings.debug = false,
///         |TestingTools { test_client, mut log_watcher, .. }| async move {
///             assert!(true) // Test goes here
///         }
///     ).await
/// }
/// ```
///
/// # Panics
/// May panic if tests could not be set up correctly.
pub async fn seeker_test<FSettings, FTest, Fut>(settings_changer: FSettings, test: FTest) -> Fut::Output
where
    FSettings: FnOnce(&mut Settings),
    FTest: FnOnce(TestingTools) -> Fut,
    Fut: Future,
{
    seeker_test_with(settings_changer, |builder| builder, test).await
}

/// Like [`seeker_test`], but `pipeline_changer` can add exchanges, resources,
/// or an auth check to the pipeline before it is built.
///
/// # Panics
/// May panic if tests could not be set up correctly.
pub async fn seeker_test_with<FSettings, FPipeline, FTest, Fut>(
    settings_changer: FSettings,
    pipeline_changer: FPipeline,
    test: FTest,
) -> Fut::Output
where
    FSettings: FnOnce(&mut Settings),
    FPipeline: for<'a> FnOnce(PipelineBuilder<'a>) -> PipelineBuilder<'a>,
    FTest: FnOnce(TestingTools) -> Fut,
    Fut: Future,
{
    let settings = Settings::load_for_tests(settings_changer);

    // Set up logging
    let log_watcher = LogWatcher::default();
    let log_watcher_writer = log_watcher.make_writer();

    let env_filter: tracing_subscriber::EnvFilter = (&settings.logging.levels).into();
    let tracing_subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(move || log_watcher_writer.clone()),
        )
        .with(tracing_subscriber::fmt::layer().pretty().with_test_writer());

    let _tracing_subscriber_guard = tracing::subscriber::set_default(tracing_subscriber);

    // Setup metrics
    let (metrics_watcher, metrics_client) = MetricsWatcher::new_with_client();

    // Build the pipeline
    let access_log = Arc::new(BufferSink::default());
    let builder = PipelineBuilder::new(&settings, metrics_client.clone())
        .access_log_sink(access_log.clone());
    let pipeline = pipeline_changer(builder)
        .build()
        .await
        .expect("Failed to build the pipeline");

    // Run server in the background
    let listener = TcpListener::bind(settings.http.listen).expect("Failed to bind to a port");
    let address = listener
        .local_addr()
        .expect("Listener has no address")
        .to_string();
    let server = seeker_web::run(listener, metrics_client, &pipeline, &settings)
        .expect("Failed to start server");
    let server_handle = server.handle();
    let join_handle = tokio::spawn(server.with_current_subscriber());
    let test_client = TestReqwestClient::new(address);

    // Assemble the tools
    let tools = TestingTools {
        test_client,
        log_watcher,
        metrics_watcher,
        access_log,
        health: pipeline.health.clone(),
        server_handle: server_handle.clone(),
    };
    // Run the test
    let rv = test(tools).await;
    server_handle.stop(false).await;
    join_handle.abort();
    rv
}

/// A set of tools for tests, including mock servers and logging helpers.
///
/// The fields of this struct are marked as non-exhaustive, meaning that any
/// destructuring of this struct will require a `..` "and the rest" entry, even
/// if all present items are named. This makes adding tools in the future easier,
/// since old tests won't need to be rewritten to account for the added tools.
#[non_exhaustive]
pub struct TestingTools {
    /// A wrapper around a `reqwest::client` that automatically uses the Seeker
    /// server under test.
    pub test_client: TestReqwestClient,

    /// To make assertions about logs.
    pub log_watcher: LogWatcher,

    /// To make assertions about metrics.
    pub metrics_watcher: MetricsWatcher,

    /// Every access log line the server wrote.
    pub access_log: Arc<BufferSink>,

    /// The server's health predicates.
    pub health: Arc<Health>,

    /// Controls the running server.
    pub server_handle: ServerHandle,
}

/// A wrapper around a `[reqwest::client]` that automatically sends requests to
/// the test server.
///
/// The client is configured to not follow any redirects.
pub struct TestReqwestClient {
    /// The wrapped client.
    client: Client,

    /// The server address to implicitly use for all requests.
    address: String,
}

impl TestReqwestClient {
    /// Construct a new test client that uses `address` for every request given.
    pub fn new(address: String) -> Self {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::none())
            .build()
            .expect("Could not build test client");
        Self { client, address }
    }

    /// Start building a GET request to the test server with the path specified.
    ///
    /// The path should start with `/`, such as `/health/liveness`.
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    /// Start building a request to the test server with any method.
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        assert!(path.starts_with('/'));
        let url = format!("http://{}{}", &self.address, path);
        self.client.request(method, url)
    }

    /// The address the server listens on.
    pub fn address(&self) -> &str {
        &self.address
    }
}
