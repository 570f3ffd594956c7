use serde::{Deserialize, Serialize};

/// An authority to register with the host, and the intermediary configuration
/// attached to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthoritySettings {
    /// The traffic class label attached to every access log record for this
    /// authority, such as `internal`, `ingress` or `egress`.
    #[serde(default = "default_traffic")]
    pub traffic: String,

    /// A routing name attached verbatim to every access log record for this
    /// authority. Takes precedence over the dispatcher's rule name.
    #[serde(default)]
    pub route: Option<String>,

    /// The admission rate, in requests per second, enforced in front of this
    /// authority. Only reported in logs. Unset is logged as `-1`.
    #[serde(default)]
    pub rate_limit: Option<f64>,

    /// The admission burst size. Only reported in logs. Unset is logged as
    /// `-1`.
    #[serde(default)]
    pub rate_burst: Option<i32>,

    /// The search provider that answers requests for this authority.
    pub provider: SearchProviderConfig,
}

/// Registrations default to internal traffic.
fn default_traffic() -> String {
    "internal".to_string()
}

/// The search providers that can back an authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchProviderConfig {
    /// Answer every query from a fixed list of results.
    Fixed(FixedConfig),

    /// Answer every query with no results.
    Null,
}

/// Settings for the fixed search provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedConfig {
    /// The results to match queries against.
    pub results: Vec<FixedResult>,
}

/// A single configured search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedResult {
    /// The title of the result. Queries match against this.
    pub title: String,

    /// Where the result points.
    pub url: String,

    /// A short description.
    #[serde(default)]
    pub snippet: String,
}
