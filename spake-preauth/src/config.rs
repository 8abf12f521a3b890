//! Exchange configuration.

use serde::{Deserialize, Serialize};

/// Settings for one side of the exchange.
///
/// Loading these from a profile or file is left to the embedding
/// application; [`SpakeConfig::from_profile_values`] accepts the raw
/// relation values as they appear in a krb5 profile.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpakeConfig {
    /// Permitted group names, in preference order.
    ///
    /// `None` selects the role default: `edwards25519` for clients and no
    /// groups for a KDC, which must opt in explicitly.
    pub groups: Option<Vec<String>>,

    /// Group the KDC challenges with before hearing the client's support
    /// list. Must be one of the permitted groups; ignored by clients.
    pub challenge_group: Option<String>,

    /// Authentication indicators granted when a KDC verifies a response.
    pub auth_indicators: Vec<String>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

impl SpakeConfig {
    /// Build a configuration from profile relation values.
    ///
    /// `groups` is a whitespace or comma separated list of group names.
    /// Each entry of `indicators` may itself hold several indicators.
    pub fn from_profile_values(
        groups: Option<&str>,
        challenge_group: Option<&str>,
        indicators: &[&str],
    ) -> Self {
        SpakeConfig {
            groups: groups.map(split_list),
            challenge_group: challenge_group
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            auth_indicators: indicators
                .iter()
                .flat_map(|value| split_list(value))
                .collect(),
        }
    }

    /// Permit exactly `groups`.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Send an optimistic challenge for `group`.
    pub fn with_challenge_group(mut self, group: impl Into<String>) -> Self {
        self.challenge_group = Some(group.into());
        self
    }

    /// Grant `indicator` on successful verification.
    pub fn with_auth_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.auth_indicators.push(indicator.into());
        self
    }
}
