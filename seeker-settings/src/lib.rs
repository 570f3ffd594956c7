#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Seeker Settings
//!
//! Configuration is specified in several ways, with later methods overriding earlier ones.
//!
//! 1. A base configuration checked into the repository, in `config/base.yaml`.
//!    This provides the default values for most settings.
//! 2. Per-environment configuration files in the `config` directory. The
//!    environment is selected using the environment variable `SEEKER_ENV`. The
//!    settings for that environment are then loaded from `config/${env}.yaml`, if
//!    it exists. The default environment is "development". A "production"
//!    environment is also provided.
//! 3. A local configuration file not checked into the repository, at
//!    `config/local.yaml`. This file is in `.gitignore` and is safe to use for
//!    local configuration and secrets if desired.
//! 4. Environment variables that begin with `SEEKER_` and use `__` to separate
//!    levels. For example, `Settings::http::workers` can be controlled from the
//!    environment variable `SEEKER_HTTP__WORKERS`.
//! 5. The `PORT` environment variable, which overrides `http.listen`. See
//!    [`listen_address`] for the accepted forms.
//!
//! Tests should use `Settings::load_for_tests` which only reads from
//! `config/base.yaml`, `config/test.yaml`, and `config/local_test.yaml` (if it
//! exists). It does not read from environment variables.

mod authorities;
mod dispatch;
mod logging;

pub use authorities::{AuthoritySettings, FixedConfig, FixedResult, SearchProviderConfig};
pub use dispatch::{DispatchSettings, RouteSettings};
pub use logging::{DirectiveWrapper, LogFormat, LoggingSettings};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    time::Duration,
};

/// Top level settings object for Seeker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// The environment Seeker is running in. Should only be set with the
    /// `SEEKER_ENV` environment variable.
    pub env: String,

    /// Enable additional features to debug the application. This should not be
    /// set to true in production environments.
    pub debug: bool,

    /// Settings for the HTTP server.
    pub http: HttpSettings,

    /// Logging settings.
    pub logging: LoggingSettings,

    /// Metrics settings.
    pub metrics: MetricsSettings,

    /// Settings for the exchange host: the timeout budget applied to every
    /// exchange, and the startup handshake.
    pub host: HostSettings,

    /// How requests are mapped to authorities.
    pub dispatch: DispatchSettings,

    /// The authorities to register, keyed by authority name.
    #[serde(default)]
    pub authorities: HashMap<String, AuthoritySettings>,

    /// Startup messages broadcast to resources before the listener opens.
    #[serde(default)]
    pub startup: StartupSettings,
}

/// Settings for the HTTP server.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpSettings {
    /// The host and port to listen on, such as "127.0.0.1:8080" or "0.0.0.0:80".
    pub listen: SocketAddr,

    /// The number of workers to use. Optional. If no value is provided, the
    /// number of logical cores will be used. Zero is rejected.
    pub workers: Option<NonZeroUsize>,

    /// The largest request body the dispatcher reads, in KiB. Larger bodies
    /// are answered with a 413 and logged.
    pub max_body_kb: usize,

    /// How long a client has to send the request head.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "read_timeout_sec")]
    pub read_timeout: Duration,

    /// How long an idle keep-alive connection is held open.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "idle_timeout_sec")]
    pub idle_timeout: Duration,

    /// The budget for writing a response. actix-web has no per-write deadline,
    /// so this is only reported in the startup banner.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "write_timeout_sec")]
    pub write_timeout: Duration,

    /// How long in-flight requests may take to drain after a termination signal.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "shutdown_timeout_sec")]
    pub shutdown_timeout: Duration,
}

/// Settings for metrics reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// The host to send Statsd metrics to.
    pub sink_host: String,

    /// The port to send Statsd metrics to.
    pub sink_port: u16,

    /// The maximum size of the metrics queue, in kilobytes.
    pub max_queue_size_kb: usize,
}

/// Settings for the exchange host.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostSettings {
    /// The budget for a single exchange, including its intermediaries. An
    /// exchange that runs longer is cancelled and answered with a timeout. If
    /// absent, exchanges are not timed out by the host.
    #[serde_as(as = "Option<DurationMilliSeconds>")]
    #[serde(rename = "timeout_ms", default)]
    pub timeout: Option<Duration>,

    /// How long every resource has to acknowledge its startup message before
    /// the process refuses to start.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "startup_timeout_ms")]
    pub startup_timeout: Duration,
}

/// Startup messages, keyed by resource name.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StartupSettings {
    /// The content sent to each resource. Resources without an entry receive
    /// an empty (null) message.
    #[serde(default)]
    pub resources: HashMap<String, serde_json::Value>,
}

/// Errors from interpreting the `PORT` environment variable.
#[derive(Debug, thiserror::Error)]
#[error("invalid PORT value {0:?}: expected a port, `:port`, or `host:port`")]
pub struct InvalidPort(String);

/// Interpret the value of the `PORT` environment variable as a listen address.
///
/// A bare port (`8080`) or a port with a leading colon (`:8080`) listens on all
/// interfaces. Anything else must be a full socket address.
///
/// # Errors
/// If the value matches none of the accepted forms.
pub fn listen_address(port: &str) -> Result<SocketAddr, InvalidPort> {
    let port = port.trim();
    let bare = port.strip_prefix(':').unwrap_or(port);
    if let Ok(number) = bare.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, number)));
    }
    port.parse().map_err(|_| InvalidPort(port.to_string()))
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    /// If any of the configured values are invalid, or if any of the required
    /// configuration files are missing.
    pub fn load() -> Result<Self, ConfigError> {
        let seeker_env = std::env::var("SEEKER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start off with the base config.
            .add_source(File::with_name("./config/base"))
            // Merge in an environment specific config.
            .set_override("env", seeker_env.as_str())?
            .add_source(File::with_name(&format!("config/{}", seeker_env)).required(false))
            // Add a local configuration file that is `.gitignore`ed.
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables that start with "SEEKER_" and have "__"
            // to separate levels. For example, `SEEKER_HTTP__LISTEN` maps to
            // `Settings::http::listen`.
            .add_source(
                Environment::with_prefix("SEEKER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Self = config.try_deserialize()?;
        settings
            .apply_port(std::env::var("PORT").ok().as_deref())
            .map_err(|error| ConfigError::Message(error.to_string()))?;

        Ok(settings)
    }

    /// Override `http.listen` from the value of the `PORT` environment
    /// variable. An unset or blank value leaves the configured address alone.
    ///
    /// # Errors
    /// If the value is not blank and is not an accepted listen address.
    pub fn apply_port(&mut self, port: Option<&str>) -> Result<(), InvalidPort> {
        match port.map(str::trim) {
            Some(port) if !port.is_empty() => {
                self.http.listen = listen_address(port)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Load settings from configuration files for tests.
    ///
    /// `changer` is a function that can modify the loaded settings before they
    /// are returned.
    ///
    /// # Panics
    /// If the test configuration files cannot be read.
    pub fn load_for_tests<F: FnOnce(&mut Self)>(changer: F) -> Self {
        let config = Config::builder()
            .add_source(File::with_name("../config/base"))
            .set_override("env", "test")
            .expect("Could not set env for tests")
            .add_source(File::with_name("../config/test"))
            .add_source(File::with_name("../config/local_test").required(false))
            .build()
            .expect("Could not load settings for tests");

        let mut settings: Self = config
            .try_deserialize()
            .expect("Could not convert settings");
        changer(&mut settings);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::{listen_address, HttpSettings, Settings};
    use parameterized::parameterized;
    use pretty_assertions::assert_eq;
    use std::{num::NonZeroUsize, time::Duration};

    #[parameterized(
        input = { "8080", ":8080", " 9000 ", "127.0.0.1:3000", "[::1]:80" },
        expected = { "0.0.0.0:8080", "0.0.0.0:8080", "0.0.0.0:9000", "127.0.0.1:3000", "[::1]:80" }
    )]
    fn test_listen_address(input: &str, expected: &str) {
        use pretty_assertions::assert_eq;
        let address = listen_address(input).expect("address should parse");
        assert_eq!(address.to_string(), expected);
    }

    #[parameterized(input = { "", "http", "localhost:", "70000" })]
    fn test_listen_address_invalid(input: &str) {
        assert!(listen_address(input).is_err());
    }

    #[test]
    fn test_settings_load_for_tests() {
        let settings = Settings::load_for_tests(|_| ());
        assert_eq!(settings.env, "test");
        assert_eq!(settings.host.startup_timeout, Duration::from_secs(4));
        assert_eq!(settings.http.read_timeout, Duration::from_secs(15));
        assert_eq!(settings.http.idle_timeout, Duration::from_secs(60));
        assert_eq!(settings.http.write_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_blank_port_keeps_configured_listen() {
        let mut settings = Settings::load_for_tests(|_| ());
        let configured = settings.http.listen;

        for port in [None, Some(""), Some("   ")] {
            settings.apply_port(port).expect("blank PORT is not an error");
            assert_eq!(settings.http.listen, configured, "PORT={:?}", port);
        }

        settings.apply_port(Some("9000")).expect("valid port");
        assert_eq!(settings.http.listen.to_string(), "0.0.0.0:9000");

        assert!(settings.apply_port(Some("http")).is_err());
        assert_eq!(settings.http.listen.to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let http = |workers: serde_json::Value| {
            serde_json::from_value::<HttpSettings>(serde_json::json!({
                "listen": "127.0.0.1:0",
                "workers": workers,
                "max_body_kb": 256,
                "read_timeout_sec": 15,
                "idle_timeout_sec": 60,
                "write_timeout_sec": 300,
                "shutdown_timeout_sec": 10,
            }))
        };

        assert!(http(serde_json::json!(0)).is_err());
        let workers = http(serde_json::json!(2)).expect("two workers").workers;
        assert_eq!(workers.map(NonZeroUsize::get), Some(2));
        assert_eq!(http(serde_json::Value::Null).expect("unset").workers, None);
    }

    #[test]
    fn test_settings_changer() {
        let settings = Settings::load_for_tests(|settings| settings.debug = true);
        assert!(settings.debug);
    }
}
