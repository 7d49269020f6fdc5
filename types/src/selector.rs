//! Transaction selectors.
//!
//! A selector names the asset and the route a transfer takes. The custody
//! network identifies every transaction kind by its selector string:
//!
//! - `BTC/toEthereum`: lock on the asset's native chain, mint on Ethereum.
//! - `BTC/fromEthereum`: burn on Ethereum, release on the native chain.
//! - `BTC/fromSolanaToEthereum`: burn on Solana, mint on Ethereum.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Which half of the lock/mint, burn/release pair a session performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Mint,
    Burn,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::Burn => "burn",
        }
    }
}

/// The chain pair a selector routes between.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// From the asset's native chain to `chain`.
    To(String),
    /// From `chain` back to the asset's native chain.
    From(String),
    /// Between two chains, neither of which is native to the asset.
    FromTo { from: String, to: String },
}

/// An asset plus its route.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector {
    asset: String,
    route: Route,
}

impl Selector {
    pub fn new(asset: impl Into<String>, route: Route) -> Result<Self, TypesError> {
        let selector = Self {
            asset: asset.into(),
            route,
        };
        selector.validate()?;
        Ok(selector)
    }

    /// Build a selector from the asset, both chain names and where the asset
    /// is native.
    pub fn for_transfer(
        asset: &str,
        from_chain: &str,
        to_chain: &str,
        native_to_from: bool,
        native_to_to: bool,
    ) -> Result<Self, TypesError> {
        let route = if native_to_from {
            Route::To(to_chain.to_string())
        } else if native_to_to {
            Route::From(from_chain.to_string())
        } else {
            Route::FromTo {
                from: from_chain.to_string(),
                to: to_chain.to_string(),
            }
        };
        Self::new(asset, route)
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Mints route to a chain; `FromTo` selectors mint on their `to` chain.
    pub fn is_mint(&self) -> bool {
        matches!(self.route, Route::To(_) | Route::FromTo { .. })
    }

    /// Burns route from a chain; `FromTo` selectors burn on their `from` chain.
    pub fn is_burn(&self) -> bool {
        matches!(self.route, Route::From(_) | Route::FromTo { .. })
    }

    /// The selector string the destination contract sees when it checks the
    /// sHash: `FromTo` routes collapse to `ASSET/toCHAIN`.
    pub fn to_contract_form(&self) -> String {
        match &self.route {
            Route::FromTo { to, .. } => format!("{}/to{}", self.asset, to),
            _ => self.to_string(),
        }
    }

    fn validate(&self) -> Result<(), TypesError> {
        let valid_asset =
            !self.asset.is_empty() && self.asset.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid_asset {
            return Err(TypesError::InvalidSelector(format!(
                "invalid asset {:?}",
                self.asset
            )));
        }
        let chains: Vec<&str> = match &self.route {
            Route::To(c) | Route::From(c) => vec![c],
            Route::FromTo { from, to } => vec![from, to],
        };
        for chain in chains {
            if !is_chain_name(chain) {
                return Err(TypesError::InvalidSelector(format!(
                    "invalid chain {chain:?}"
                )));
            }
        }
        Ok(())
    }
}

fn is_chain_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Find the `To` that separates the two chains in `SolanaToEthereum`.
fn split_from_to(rest: &str) -> Option<(&str, &str)> {
    let bytes = rest.as_bytes();
    (1..bytes.len().saturating_sub(2))
        .find(|&i| &bytes[i..i + 2] == b"To" && bytes[i + 2].is_ascii_uppercase())
        .map(|i| (&rest[..i], &rest[i + 2..]))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Route::To(chain) => write!(f, "{}/to{}", self.asset, chain),
            Route::From(chain) => write!(f, "{}/from{}", self.asset, chain),
            Route::FromTo { from, to } => write!(f, "{}/from{}To{}", self.asset, from, to),
        }
    }
}

impl FromStr for Selector {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidSelector(s.to_string());
        let (asset, route) = s.split_once('/').ok_or_else(invalid)?;

        let route = if let Some(chain) = route.strip_prefix("from") {
            match split_from_to(chain) {
                Some((from, to)) => Route::FromTo {
                    from: from.to_string(),
                    to: to.to_string(),
                },
                None => Route::From(chain.to_string()),
            }
        } else if let Some(chain) = route.strip_prefix("to") {
            Route::To(chain.to_string())
        } else {
            return Err(invalid());
        };

        Self::new(asset, route).map_err(|_| invalid())
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
