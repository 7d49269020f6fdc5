//! Custody-network transaction status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Lifecycle status of a transaction inside the custody network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// The network has not seen the transaction.
    Nil,
    /// Waiting for source-chain confirmations.
    Confirming,
    /// Confirmed, queued for execution.
    Pending,
    /// Being executed (signature generation in progress).
    Executing,
    /// Execution failed; the output carries a revert reason.
    Reverted,
    /// Executed; the output is final.
    Done,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Confirming => "confirming",
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Reverted => "reverted",
            Self::Done => "done",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Reverted)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nil" => Ok(Self::Nil),
            "confirming" => Ok(Self::Confirming),
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "reverted" => Ok(Self::Reverted),
            "done" => Ok(Self::Done),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for status in [
            TxStatus::Nil,
            TxStatus::Confirming,
            TxStatus::Pending,
            TxStatus::Executing,
            TxStatus::Reverted,
            TxStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<TxStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn only_done_and_reverted_are_final() {
        assert!(TxStatus::Done.is_final());
        assert!(TxStatus::Reverted.is_final());
        assert!(!TxStatus::Executing.is_final());
        assert!(!TxStatus::Nil.is_final());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("finished".parse::<TxStatus>().is_err());
    }
}
