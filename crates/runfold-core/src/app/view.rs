//! AggregateView - 集約状態のライブビュー
//!
//! `watch::Receiver` の薄いラッパーです。呼び出し側はブロックせずに
//! `current()` で最新の状態を読めます。

use tokio::sync::watch;

use crate::domain::{AggregateState, AggregateStatus, InvocationId};

use super::aggregator::AggregatorError;

/// Live, continuously updated view of the aggregate state.
///
/// Always shows the aggregator's current invocation. When the key set
/// changes, the view switches to the new state.
#[derive(Debug, Clone)]
pub struct AggregateView {
    rx: watch::Receiver<AggregateState>,
}

impl AggregateView {
    pub(crate) fn new(mut rx: watch::Receiver<AggregateState>) -> Self {
        // 既存の値は「見た」扱いにして、changed() が次の更新だけを待つようにする
        rx.borrow_and_update();
        Self { rx }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> AggregateState {
        self.rx.borrow().clone()
    }

    pub fn status(&self) -> AggregateStatus {
        self.rx.borrow().status()
    }

    pub fn is_loading(&self) -> bool {
        self.rx.borrow().is_loading()
    }

    pub fn invocation(&self) -> InvocationId {
        self.rx.borrow().invocation()
    }

    /// Wait for the next state update.
    pub async fn changed(&mut self) -> Result<(), AggregatorError> {
        self.rx.changed().await.map_err(|_| AggregatorError::Closed)
    }

    /// Wait until the current invocation has no outstanding fetches and
    /// return that state.
    pub async fn settled(&mut self) -> Result<AggregateState, AggregatorError> {
        let state = self
            .rx
            .wait_for(|state| !state.is_loading())
            .await
            .map_err(|_| AggregatorError::Closed)?;
        Ok(state.clone())
    }
}
