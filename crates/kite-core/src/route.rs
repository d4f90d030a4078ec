//! Connector-qualified addresses.
//!
//! A [`Route`] names exactly one reachable endpoint: one Telegram chat, one
//! WebSocket session. It is a two-part value; the `"<connector>:<raw>"` string
//! form only exists at the system boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KiteError;

/// Stable short identifier of a connector, such as `tg` or `ws`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Create a connector id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is empty or contains `:`.
    pub fn new(id: impl Into<String>) -> Result<Self, KiteError> {
        let id = id.into();
        if id.is_empty() {
            return Err(KiteError::validation("Connector id cannot be empty"));
        }
        if id.contains(':') {
            return Err(KiteError::validation("Connector id cannot contain ':'"));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConnectorId {
    type Error = KiteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ConnectorId> for String {
    fn from(id: ConnectorId) -> Self {
        id.0
    }
}

/// Address of one endpoint behind one connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Route {
    connector: ConnectorId,
    raw: String,
}

impl Route {
    /// Create a route.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the connector id is invalid or the raw
    /// token is empty.
    pub fn new(connector: impl Into<String>, raw: impl Into<String>) -> Result<Self, KiteError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(KiteError::validation("Route token cannot be empty"));
        }
        Ok(Self {
            connector: ConnectorId::new(connector)?,
            raw,
        })
    }

    /// Create a route for an already validated connector.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the raw token is empty.
    pub fn with_connector(connector: ConnectorId, raw: impl Into<String>) -> Result<Self, KiteError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(KiteError::validation("Route token cannot be empty"));
        }
        Ok(Self { connector, raw })
    }

    #[must_use]
    pub fn connector(&self) -> &ConnectorId {
        &self.connector
    }

    /// The connector-native token, such as a chat id or a session id.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connector, self.raw)
    }
}

impl FromStr for Route {
    type Err = KiteError;

    /// Parse `"<connector>:<raw>"`, splitting at the first `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (connector, raw) = s
            .split_once(':')
            .ok_or_else(|| KiteError::validation(format!("Invalid route: {s}")))?;
        Self::new(connector, raw)
    }
}

impl TryFrom<String> for Route {
    type Error = KiteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_display_and_parse() {
        let route = Route::new("tg", "-100123").unwrap();
        assert_eq!(route.to_string(), "tg:-100123");
        assert_eq!("tg:-100123".parse::<Route>().unwrap(), route);
    }

    #[test]
    fn test_route_splits_at_first_colon() {
        let route: Route = "ws:session:abc".parse().unwrap();
        assert_eq!(route.connector().as_str(), "ws");
        assert_eq!(route.raw(), "session:abc");
    }

    #[test]
    fn test_invalid_routes() {
        assert!("no-separator".parse::<Route>().is_err());
        assert!(":raw".parse::<Route>().is_err());
        assert!("tg:".parse::<Route>().is_err());
        assert!(ConnectorId::new("a:b").is_err());
    }

    #[test]
    fn test_route_serde_as_string() {
        let route = Route::new("ws", "conn-1").unwrap();
        let json = serde_json::to_string(&route).unwrap();
        assert_eq!(json, "\"ws:conn-1\"");
        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back, route);
    }
}
