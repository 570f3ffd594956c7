use serde::{Deserialize, Serialize};

/// How inbound requests are mapped to authorities.
///
/// Resolution is deterministic: the longest matching route prefix wins, then
/// a first path segment that names a registered authority, then the default
/// authority. Requests that match none of these are answered with a 404.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Path prefix routing rules.
    pub routes: Vec<RouteSettings>,

    /// The authority that handles requests no route or authority segment
    /// matched. Must name a registered authority if set.
    pub default_authority: Option<String>,
}

/// A single routing rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteSettings {
    /// The logical name of the rule, reported as `route` in the access log.
    pub name: String,

    /// The path prefix this rule matches, on path segment boundaries. `/search`
    /// matches `/search` and `/search/more`, but not `/searching`.
    pub prefix: String,

    /// The registered authority requests are sent to.
    pub authority: String,

    /// The calling application this rule serves, reported as `from`.
    #[serde(default)]
    pub from: Option<String>,

    /// The target identifier reported as `route-to`. Defaults to the authority.
    #[serde(default)]
    pub to: Option<String>,

    /// The traffic split weight reported as `route-percent`, from 0 to 100.
    #[serde(default = "default_percent")]
    pub percent: u8,
}

/// Rules without a split send all their traffic to one target.
fn default_percent() -> u8 {
    100
}
