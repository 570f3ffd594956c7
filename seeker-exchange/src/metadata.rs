//! Provenance, routing, and controller metadata attached to an exchange.
//!
//! Routing and controller decisions are made elsewhere. They are carried here
//! so that the access log can report them.

use crate::status::Status;
use std::time::Duration;

/// Where a request came from.
///
/// `region`, `zone`, `sub_zone`, `app` and `instance_id` are reserved and not
/// populated yet. They are omitted from access log records while unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// The host the request was addressed to.
    pub host: String,
    /// Reserved.
    pub region: Option<String>,
    /// Reserved.
    pub zone: Option<String>,
    /// Reserved.
    pub sub_zone: Option<String>,
    /// Reserved. Reported as `from` in the access log.
    pub app: Option<String>,
    /// Reserved.
    pub instance_id: Option<String>,
}

/// The routing decision made while resolving a request to an authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    /// The logical name of the rule that matched.
    pub route: String,
    /// The calling application the rule was declared for. Empty if the rule
    /// does not name one.
    pub from: String,
    /// The target identifier the rule selected.
    pub to: String,
    /// The traffic split weight of the selected target, from 0 to 100.
    pub percent: u8,
    /// How the request was resolved.
    pub code: RoutingCode,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            route: String::new(),
            from: String::new(),
            to: String::new(),
            percent: 0,
            code: RoutingCode::Unrouted,
        }
    }
}

/// The outcome of routing, reported as `rc` in the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingCode {
    /// The request did not pass through the dispatcher.
    Unrouted,
    /// A route rule or an authority path segment matched.
    Matched,
    /// Nothing matched, and the default authority answered.
    Default,
    /// Nothing matched and there is no default authority.
    NoMatch,
}

impl RoutingCode {
    /// The short code written to the access log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrouted => "",
            Self::Matched => "OK",
            Self::Default => "DF",
            Self::NoMatch => "NM",
        }
    }
}

/// Admission and timeout policy in front of an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Controller {
    /// The time budget for the exchange. `None` if no budget applies.
    pub timeout: Option<Duration>,
    /// Requests admitted per second. `None` means unbounded. `Some(0.0)` means
    /// no traffic is admitted.
    pub rate_limit: Option<f64>,
    /// The admission burst size. `None` means unbounded. `Some(0)` means no
    /// traffic is admitted.
    pub rate_burst: Option<i32>,
    /// What the controller decided for this request.
    pub code: ControllerCode,
}

impl Controller {
    /// This policy, annotated with the decision that produced `status`.
    #[must_use]
    pub fn decided(&self, status: &Status) -> Self {
        let code = if status.is_deadline_exceeded() {
            ControllerCode::Timeout
        } else {
            ControllerCode::Completed
        };
        Self {
            code,
            ..self.clone()
        }
    }
}

/// The controller decision, reported as `cc` in the access log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerCode {
    /// The exchange ran to completion.
    #[default]
    Completed,
    /// The exchange was cancelled by the host timeout.
    Timeout,
}

impl ControllerCode {
    /// The short code written to the access log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "",
            Self::Timeout => "TO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Controller, ControllerCode};
    use crate::Status;
    use std::time::Duration;

    #[test]
    fn test_controller_decided() {
        let policy = Controller {
            timeout: Some(Duration::from_secs(3)),
            rate_limit: Some(0.0),
            ..Controller::default()
        };

        let decided = policy.decided(&Status::deadline_exceeded());
        assert_eq!(decided.code, ControllerCode::Timeout);
        assert_eq!(decided.rate_limit, Some(0.0));

        let decided = policy.decided(&Status::backend("refused"));
        assert_eq!(decided.code, ControllerCode::Completed);
    }
}
