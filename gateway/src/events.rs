//! Progress notifications and awaitable operations.
//!
//! Long-running steps report progress on the session's broadcast channel
//! and deliver their result through a separate awaitable handle.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use bridge_chains::{ChainProgress, Confirmations, DepositKey};
use bridge_types::TxStatus;

use crate::record::{ErrorRecord, TransactionState};
use crate::GatewayError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    DepositDetected(DepositKey),
    DepositRemoved(DepositKey),
    StateChanged {
        key: DepositKey,
        state: TransactionState,
    },
    /// Emitted on every confirmation poll.
    Confirmations {
        key: DepositKey,
        confirmations: Confirmations,
    },
    /// Custody-network status seen while waiting for a signature.
    NetworkStatus { key: DepositKey, status: TxStatus },
    Destination {
        key: DepositKey,
        progress: ChainProgress,
    },
    Errored { key: DepositKey, error: ErrorRecord },
}

impl SessionEvent {
    pub fn key(&self) -> &DepositKey {
        match self {
            Self::DepositDetected(key) | Self::DepositRemoved(key) => key,
            Self::StateChanged { key, .. }
            | Self::Confirmations { key, .. }
            | Self::NetworkStatus { key, .. }
            | Self::Destination { key, .. }
            | Self::Errored { key, .. } => key,
        }
    }
}

/// A step running in the background.
///
/// `progress` receives session events from the moment the operation was
/// started; `wait` resolves with the step's result.
pub struct Operation<T> {
    pub progress: broadcast::Receiver<SessionEvent>,
    result: JoinHandle<Result<T, GatewayError>>,
}

impl<T> Operation<T> {
    pub(crate) fn new(
        progress: broadcast::Receiver<SessionEvent>,
        result: JoinHandle<Result<T, GatewayError>>,
    ) -> Self {
        Self { progress, result }
    }

    pub async fn wait(self) -> Result<T, GatewayError> {
        self.result
            .await
            .map_err(|e| GatewayError::Task(e.to_string()))?
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_finished()
    }
}
