//! Rate limit key generation.

use serde::{Deserialize, Serialize};

/// How a request is mapped to a rate limit key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// One key per route, shared by every caller.
    #[default]
    Route,
    /// One key per route and client address.
    Client,
}

/// A key that uniquely identifies a rate-limited entity.
///
/// The key is composed of the route and, optionally, the client identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// The route this key belongs to
    pub route: String,
    /// Client identity, when limiting per client
    pub client: Option<String>,
}

impl LimitKey {
    /// Key shared by all callers of `route`.
    pub fn route(route: &str) -> Self {
        Self {
            route: route.to_string(),
            client: None,
        }
    }

    /// Key scoped to one client of `route`.
    pub fn client(route: &str, client: &str) -> Self {
        Self {
            route: route.to_string(),
            client: Some(client.to_string()),
        }
    }

    /// Build a key for `route` according to `strategy`.
    ///
    /// `client` is only called when the strategy needs a client identity.
    pub fn for_strategy<F>(strategy: KeyStrategy, route: &str, client: F) -> Self
    where
        F: FnOnce() -> String,
    {
        match strategy {
            KeyStrategy::Route => Self::route(route),
            KeyStrategy::Client => Self::client(route, &client()),
        }
    }

    /// Convert the key to its string representation.
    pub fn to_string_key(&self) -> String {
        match &self.client {
            Some(client) => format!("{}|{}", self.route, client),
            None => self.route.clone(),
        }
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
