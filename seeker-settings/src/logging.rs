use anyhow::{bail, Context};
use serde::{de, Deserialize, Serialize};
use std::{ops::AddAssign, str::FromStr};
use tracing_subscriber::{filter::Directive, EnvFilter};

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// The minimum level that logs should be reported at.
    ///
    /// Each entry can be one of `ERROR`, `WARN`, `INFO`, `DEBUG`, or `TRACE` (in
    /// increasing verbosity), with an optional component that specifies the
    /// source of the logs.
    ///
    /// The environment variable `RUST_LOG` is read when settings are loaded, and
    /// its directives are appended after the configured ones, so they win.
    ///
    /// # Examples
    ///
    /// The configurations below are identical
    ///
    /// ```yaml
    /// # config/local.yaml
    /// logging:
    ///   levels:
    ///     - INFO              # default to INFO
    ///     - seeker_web=DEBUG  # noisier logs from the dispatcher
    /// ```
    ///
    /// ```shell
    /// RUST_LOG=INFO,seeker_web=DEBUG
    /// ```
    pub levels: DirectiveWrapper,

    /// The format to output logs in.
    pub format: LogFormat,
}

/// How diagnostic logs are rendered. The access log is unaffected by this
/// setting, it is always one JSON object per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// [`tracing-subscriber`]'s human targeted, pretty format. Includes more
    /// information, Multiple lines per log event.
    Pretty,

    /// Newline delimited JSON. One line per log event.
    Json,

    /// [`tracing-subscriber`]'s default format. One line per log event.
    Compact,
}

/// A validated list of log filter directives.
///
/// Tracing's `Directive` is neither `Clone` nor `Serialize`, so the directives
/// are kept as strings that are known to parse.
///
/// This struct can be deserialized from either a comma separated string of
/// directives (`"INFO,component1=WARN"`), or from a sequence of comma separated
/// strings (`["INFO", "component1=WARN,component2=DEBUG"]`). Config files use
/// sequences, but environment variables are always strings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectiveWrapper(Vec<String>);

impl DirectiveWrapper {
    /// The directives, in the order they are applied.
    pub fn directives(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Serialize for DirectiveWrapper {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(&self.0)
    }
}

impl<'de> Deserialize<'de> for DirectiveWrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// Accepts a string or a sequence of strings.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            /// `"INFO,seeker_web=DEBUG"`
            One(String),
            /// `["INFO", "seeker_web=DEBUG"]`
            Many(Vec<String>),
        }

        let parts = match Raw::deserialize(deserializer)? {
            Raw::One(s) => vec![s],
            Raw::Many(items) => items,
        };

        let mut rv = Self::default();
        for item in parts {
            rv += item
                .parse()
                .map_err(|err: anyhow::Error| de::Error::custom(format!("{item:?}: {err:#}")))?;
        }

        // Directives from RUST_LOG are always respected, and take precedence.
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if !rust_log.trim().is_empty() {
                rv += rust_log.parse().map_err(|err: anyhow::Error| {
                    de::Error::custom(format!("RUST_LOG {rust_log:?}: {err:#}"))
                })?;
            }
        }

        Ok(rv)
    }
}

impl FromStr for DirectiveWrapper {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();

        if let Some(err) = parts.iter().find_map(|p| p.parse::<Directive>().err()) {
            return Err(err).context("valid syntax");
        }

        // Crate names are written with underscores in log targets. A hyphen
        // silently matches nothing.
        if parts.iter().any(|p| p.contains('-')) {
            bail!("log targets must not include hyphens");
        }

        Ok(Self(parts))
    }
}

impl AddAssign for DirectiveWrapper {
    fn add_assign(&mut self, rhs: Self) {
        self.0.extend(rhs.0)
    }
}

impl From<&DirectiveWrapper> for EnvFilter {
    fn from(val: &DirectiveWrapper) -> Self {
        val.directives()
            .filter_map(|directive| directive.parse::<Directive>().ok())
            .fold(EnvFilter::default(), |filter, directive| {
                filter.add_directive(directive)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::DirectiveWrapper;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_comma_separated() {
        let parsed: DirectiveWrapper = "INFO, seeker_web=DEBUG".parse().expect("valid directives");
        assert_eq!(
            parsed.directives().collect::<Vec<_>>(),
            vec!["INFO", "seeker_web=DEBUG"]
        );
    }

    #[test]
    fn test_hyphens_rejected() {
        let parsed: Result<DirectiveWrapper, _> = "seeker-web=DEBUG".parse();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let parsed: Result<DirectiveWrapper, _> = "seeker_web=LOUD".parse();
        assert!(parsed.is_err());
    }
}
