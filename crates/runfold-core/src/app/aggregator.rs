//! RunArtifactsAggregator - run ごとの fetch を fan-out して 1 つの状態に畳み込む
//!
//! # フロー
//! 1. `observe(ids)` で key 集合を受け取る（順序・重複は無視）
//! 2. 集合が前回と違えば新しい invocation を開始し、key ごとに fetch を 1 本 spawn
//! 3. fetch の settlement を merge loop が 1 件ずつ状態に反映
//! 4. 全 key が settle したら `is_loading = false`
//!
//! # 並行性
//! - 状態を書き換えるのは merge loop タスクだけ（ロック不要）
//! - 呼び出し側からのコマンドは mpsc、fetch の結果は JoinSet 経由で merge loop に届く
//! - settlement には invocation ID のタグが付いていて、古いものは捨てる
//! - 置き換えられた invocation の fetch はキャンセルせず、最後まで走らせて無視する

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::domain::{
    AggregateState, ApplyResult, FetchError, FetchOutcome, InvocationId, RunId, RunKeySet,
};
use crate::ports::{ArtifactFetcher, Clock, IdGenerator};

use super::builder::AggregatorBuilder;
use super::config::AggregatorConfig;
use super::view::AggregateView;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorError {
    #[error("aggregator is shut down")]
    Closed,
}

/// Multi-key artifact aggregator.
///
/// # 使用例
/// ```ignore
/// let aggregator = RunArtifactsAggregator::new(Arc::new(fetcher));
/// let mut view = aggregator.observe(["run-1", "run-2"]).await?;
/// let state = view.settled().await?;
/// ```
pub struct RunArtifactsAggregator {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<AggregateState>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RunArtifactsAggregator {
    /// Aggregator with default config. Must be called inside a tokio runtime.
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        AggregatorBuilder::new(fetcher).spawn()
    }

    pub fn builder(fetcher: Arc<dyn ArtifactFetcher>) -> AggregatorBuilder {
        AggregatorBuilder::new(fetcher)
    }

    pub(crate) fn spawn(
        fetcher: Arc<dyn ArtifactFetcher>,
        config: AggregatorConfig,
        clock: Arc<dyn Clock>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        // observe 前はどの run も見ていない空の状態
        let initial = AggregateState::new(
            id_generator.generate_invocation_id(),
            clock.now(),
            RunKeySet::new(),
        );
        let (state_tx, state_rx) = watch::channel(initial);
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let merge_loop = MergeLoop {
            fetcher,
            config,
            clock,
            id_generator,
            state_tx,
            current_keys: None,
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
        };
        let join = tokio::spawn(merge_loop.run(cmd_rx, shutdown_rx));

        Self {
            cmd_tx,
            state_rx,
            shutdown_tx,
            join,
        }
    }

    /// Observe a sequence of run ids.
    ///
    /// A new key set (by membership) starts a new invocation. The same set
    /// again is a no-op: no fetch is issued and the state is kept. Returns
    /// once the resulting invocation is visible in the view.
    pub async fn observe<I, T>(&self, ids: I) -> Result<AggregateView, AggregatorError>
    where
        I: IntoIterator<Item = T>,
        T: Into<RunId>,
    {
        let keys: RunKeySet = ids.into_iter().collect();
        let (reply, rx) = oneshot::channel();
        self.send(Command::Observe { keys, reply }).await?;
        rx.await.map_err(|_| AggregatorError::Closed)?;
        Ok(self.view())
    }

    /// Start a new invocation for the current key set, fetching every key
    /// again.
    pub async fn refresh(&self) -> Result<AggregateView, AggregatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Refresh { reply }).await?;
        rx.await.map_err(|_| AggregatorError::Closed)?;
        Ok(self.view())
    }

    /// View of whatever invocation is current.
    pub fn view(&self) -> AggregateView {
        AggregateView::new(self.state_rx.clone())
    }

    /// Request shutdown without waiting.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the merge loop, abort outstanding fetch tasks and wait for the
    /// loop to exit. Existing views keep the last published state.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            warn!(error = %e, "runfold.aggregator.join_failed");
        }
    }

    async fn send(&self, cmd: Command) -> Result<(), AggregatorError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AggregatorError::Closed)
    }
}

enum Command {
    Observe {
        keys: RunKeySet,
        reply: oneshot::Sender<InvocationId>,
    },
    Refresh {
        reply: oneshot::Sender<InvocationId>,
    },
}

/// Result of one fetch task, tagged with the invocation that issued it.
struct Settlement {
    invocation: InvocationId,
    run_id: RunId,
    outcome: FetchOutcome,
}

/// Single owner of the aggregate state.
struct MergeLoop {
    fetcher: Arc<dyn ArtifactFetcher>,
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    state_tx: watch::Sender<AggregateState>,

    /// Key set of the current invocation (`None` before the first observe).
    current_keys: Option<RunKeySet>,

    tasks: JoinSet<Settlement>,

    /// Which invocation/key a fetch task belongs to, for tasks that die
    /// without returning a settlement.
    in_flight: HashMap<task::Id, (InvocationId, RunId)>,
}

impl MergeLoop {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // Err = aggregator dropped
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
            }
        }

        let outstanding = self.tasks.len();
        self.tasks.shutdown().await;
        debug!(outstanding, "runfold.aggregator.stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Observe { keys, reply } => {
                if self.current_keys.as_ref() != Some(&keys) {
                    self.start_invocation(keys);
                } else {
                    debug!(
                        invocation = %self.current_invocation(),
                        "runfold.invocation.unchanged"
                    );
                }
                let _ = reply.send(self.current_invocation());
            }
            Command::Refresh { reply } => {
                let keys = self.current_keys.clone().unwrap_or_default();
                self.start_invocation(keys);
                let _ = reply.send(self.current_invocation());
            }
        }
    }

    fn current_invocation(&self) -> InvocationId {
        self.state_tx.borrow().invocation()
    }

    fn start_invocation(&mut self, keys: RunKeySet) {
        let invocation = self.id_generator.generate_invocation_id();
        let state = AggregateState::new(invocation, self.clock.now(), keys.clone());
        self.state_tx.send_replace(state);

        info!(%invocation, keys = keys.len(), "runfold.invocation.started");
        if keys.is_empty() {
            info!(%invocation, settled = 0, failed = false, "runfold.invocation.settled");
        }

        // cap は invocation ごと（置き換えられた fetch の permit を待たない）
        let limiter = self
            .config
            .max_concurrent_fetches
            .map(|n| Arc::new(Semaphore::new(n)));
        for run_id in keys.iter() {
            self.spawn_fetch(invocation, run_id.clone(), limiter.clone());
        }
        self.current_keys = Some(keys);
    }

    fn spawn_fetch(
        &mut self,
        invocation: InvocationId,
        run_id: RunId,
        limiter: Option<Arc<Semaphore>>,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let path = self.config.artifact_path.clone();
        let task_run_id = run_id.clone();

        let handle = self.tasks.spawn(async move {
            // semaphore は閉じないので Err にはならない
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            let outcome = fetcher
                .list_artifacts(&task_run_id, path.as_deref())
                .await
                .into();
            Settlement {
                invocation,
                run_id: task_run_id,
                outcome,
            }
        });

        debug!(%invocation, run_id = %run_id, "runfold.fetch.issued");
        self.in_flight.insert(handle.id(), (invocation, run_id));
    }

    fn handle_joined(&mut self, joined: Result<(task::Id, Settlement), JoinError>) {
        match joined {
            Ok((id, settlement)) => {
                self.in_flight.remove(&id);
                self.settle(settlement);
            }
            Err(err) => {
                let Some((invocation, run_id)) = self.in_flight.remove(&err.id()) else {
                    return;
                };
                if err.is_panic() {
                    warn!(%invocation, run_id = %run_id, "runfold.fetch.panicked");
                    let cause = FetchError::Aborted(format!("fetch task for {run_id} panicked"));
                    self.settle(Settlement {
                        invocation,
                        run_id,
                        outcome: FetchOutcome::Failure(cause),
                    });
                } else {
                    debug!(%invocation, run_id = %run_id, "runfold.fetch.cancelled");
                }
            }
        }
    }

    fn settle(&mut self, settlement: Settlement) {
        let Settlement {
            invocation,
            run_id,
            outcome,
        } = settlement;

        if invocation != self.current_invocation() {
            debug!(%invocation, run_id = %run_id, "runfold.fetch.stale");
            return;
        }

        let kind = outcome.kind();
        let mut result = ApplyResult::UnknownKey;
        let mut finished = None;
        self.state_tx.send_if_modified(|state| {
            result = state.apply(run_id.clone(), outcome);
            if result.is_applied() && !state.is_loading() {
                finished = Some((state.settled_count(), state.error().is_some()));
            }
            result.is_applied()
        });

        match result {
            ApplyResult::Stored | ApplyResult::ErrorRecorded | ApplyResult::ErrorDropped => {
                debug!(%invocation, run_id = %run_id, ?kind, ?result, "runfold.fetch.settled");
            }
            ApplyResult::UnknownKey | ApplyResult::AlreadySettled => {
                warn!(%invocation, run_id = %run_id, ?result, "runfold.fetch.ignored");
            }
        }

        if let Some((settled, failed)) = finished {
            info!(%invocation, settled, failed, "runfold.invocation.settled");
        }
    }
}
