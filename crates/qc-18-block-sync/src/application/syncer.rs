//! # Syncer
//!
//! Control loop owning `SyncProgress` and driving per-height work through
//! the worker pool.
//!
//! ## Actor Model
//!
//! ```text
//! SyncerHandle ──Command──► mpsc ──► run_loop (owns SyncProgress)
//!      ▲                                │  select!: shutdown │ command │ tick
//!      └──────── oneshot reply ─────────┘
//!                                       │ sync(): try_add(work(h)) for
//!                                       ▼       h in current+1..=highest
//!                                     Pool ──► fetch ──► validate ──► store
//! ```
//!
//! Progress is never shared behind a lock; every read and write is a
//! command answered by the loop.
//!
//! ## Backpressure
//!
//! Scheduling stops at the first height the pool rejects. The remaining
//! heights are picked up by a later pass (next tick or next command), so
//! the loop never blocks on the pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quantum_telemetry::{
    SYNC_CURRENT_HEIGHT, SYNC_FETCH_FAILURES, SYNC_HIGHEST_HEIGHT, SYNC_POOL_REJECTIONS,
    SYNC_VALIDATION_FAILURES,
};
use shared_types::PeerAddress;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::pool::Pool;
use super::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::config::{ConfigError, SyncConfig};
use crate::domain::{check_progress_update, SyncError, SyncInfo, SyncProgress, SyncResponse};
use crate::ports::{BlockFetcher, BlockStore, BlockValidator, SyncApi};

enum Command {
    SetTarget {
        height: u64,
        peers: Vec<PeerAddress>,
        reply: oneshot::Sender<()>,
    },
    Progress {
        reply: oneshot::Sender<SyncProgress>,
    },
}

/// Everything a worker needs to sync one height.
pub(crate) struct WorkContext {
    fetcher: Arc<dyn BlockFetcher>,
    validator: Arc<dyn BlockValidator>,
    store: Arc<dyn BlockStore>,
    retry_interval: Duration,
    shutdown: ShutdownSignal,
}

impl WorkContext {
    /// Sync `height` until it is stored or shutdown fires.
    pub(crate) async fn work(&self, height: u64, peers: Vec<PeerAddress>) {
        let info = SyncInfo::new(height, peers);
        let mut attempt: u32 = 0;

        loop {
            if self.already_stored(height) {
                trace!("[qc-18] Block {} already stored", height);
                return;
            }

            let response = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                response = self.attempt(&info, attempt) => response,
            };

            match response.error {
                None => {
                    trace!("[qc-18] Block {} synced after {} attempts", height, attempt + 1);
                    return;
                }
                Some(e) => record_failure(height, attempt, &e),
            }

            attempt = attempt.saturating_add(1);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    fn already_stored(&self, height: u64) -> bool {
        match self.store.exists_block_by_height(height) {
            Ok(exists) => exists,
            Err(e) => {
                warn!(height, error = %e, "[qc-18] Existence check failed, syncing anyway");
                false
            }
        }
    }

    async fn attempt(&self, info: &SyncInfo, attempt: u32) -> SyncResponse {
        let fetched = match self.fetcher.fetch_attempt(info, attempt).await {
            Ok(fetched) => fetched,
            Err(e) => return SyncResponse::failure(info.clone(), e),
        };
        match self.validator.validate(&fetched).await {
            Ok(()) => SyncResponse::success(fetched),
            Err(e) => SyncResponse::failure(info.clone(), e),
        }
    }
}

fn record_failure(height: u64, attempt: u32, error: &SyncError) {
    if error.is_fetch_failure() {
        SYNC_FETCH_FAILURES
            .with_label_values(&[error.metric_reason()])
            .inc();
    } else {
        SYNC_VALIDATION_FAILURES.inc();
    }

    if error.is_not_found() {
        debug!(height, attempt, "[qc-18] Block not yet available: {}", error);
    } else {
        warn!(height, attempt, "[qc-18] Block sync attempt failed: {}", error);
    }
}

/// Block sync orchestrator.
pub struct Syncer {
    config: SyncConfig,
    context: Arc<WorkContext>,
    pool: Pool,
    trigger: ShutdownTrigger,
    loop_exited: ShutdownTrigger,
    started: AtomicBool,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl Syncer {
    /// Build the syncer and spawn its worker pool.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: SyncConfig,
        fetcher: Arc<dyn BlockFetcher>,
        validator: Arc<dyn BlockValidator>,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (trigger, shutdown) = shutdown_channel();
        let (loop_exited, _) = shutdown_channel();
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);

        let context = Arc::new(WorkContext {
            fetcher,
            validator,
            store,
            retry_interval: config.retry_interval(),
            shutdown,
        });

        Ok(Self {
            pool: Pool::new(config.pool_size),
            config,
            context,
            trigger,
            loop_exited,
            started: AtomicBool::new(false),
            commands_tx,
            commands_rx: Mutex::new(Some(commands_rx)),
        })
    }

    /// Cloneable API handle for other tasks.
    pub fn handle(&self) -> SyncerHandle {
        SyncerHandle {
            commands: self.commands_tx.clone(),
            shutdown: self.trigger.subscribe(),
        }
    }

    /// Run the control loop until `stop` is called.
    ///
    /// Fails with `SyncError::Stopped` if the loop already ran or the
    /// syncer was stopped before starting.
    pub async fn start(&self) -> Result<(), SyncError> {
        let commands = self.commands_rx.lock().take().ok_or(SyncError::Stopped)?;
        self.started.store(true, Ordering::SeqCst);

        self.run_loop(commands).await;
        self.loop_exited.fire();
        Ok(())
    }

    /// Cancel all in-flight work, wait for the loop, then finish the pool.
    ///
    /// No pool worker is alive once this returns. Calling it again is a
    /// no-op.
    pub async fn stop(&self) {
        info!("[qc-18] Stopping block sync");
        self.trigger.fire();
        self.commands_rx.lock().take();

        if self.started.load(Ordering::SeqCst) {
            self.loop_exited.subscribe().cancelled().await;
        }
        self.pool.finish().await;
        info!("[qc-18] Block sync stopped");
    }

    async fn run_loop(&self, mut commands: mpsc::Receiver<Command>) {
        let shutdown = self.trigger.subscribe();
        let mut progress = SyncProgress::default();
        let mut target_peers: Vec<PeerAddress> = Vec::new();
        let mut caught_up = true;

        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "[qc-18] Block sync loop started (pool size {})",
            self.pool.size()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::SetTarget { height, peers, reply }) => {
                        let raised = progress.raise_highest(height);
                        let _ = reply.send(());
                        if raised {
                            info!(
                                "[qc-18] Sync target raised to {} ({} peers)",
                                height,
                                peers.len()
                            );
                            SYNC_HIGHEST_HEIGHT.set(height as f64);
                            target_peers = peers;
                            self.sync(&mut progress, &target_peers, &mut caught_up);
                        }
                    }
                    Some(Command::Progress { reply }) => {
                        let _ = reply.send(progress);
                    }
                    None => break,
                },
                _ = ticker.tick() => self.sync(&mut progress, &target_peers, &mut caught_up),
            }
        }

        info!(
            "[qc-18] Block sync loop exited at {}/{}",
            progress.current_block, progress.highest_block
        );
    }

    /// One scheduling pass.
    fn sync(&self, progress: &mut SyncProgress, peers: &[PeerAddress], caught_up: &mut bool) {
        let before = *progress;

        match self.context.store.latest_block() {
            Ok(Some(block)) => {
                if progress.raise_current(block.height) {
                    debug!("[qc-18] Local store advanced to {}", block.height);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "[qc-18] Failed to read latest stored block"),
        }

        if progress.current_block >= progress.highest_block {
            if !*caught_up {
                info!("[qc-18] All heights up to {} scheduled", progress.highest_block);
            }
            *caught_up = true;
            SYNC_CURRENT_HEIGHT.set(progress.current_block as f64);
            return;
        }

        if *caught_up {
            progress.starting_block = progress.current_block;
            *caught_up = false;
            info!(
                "[qc-18] Syncing blocks {}..={}",
                progress.current_block + 1,
                progress.highest_block
            );
        }

        let mut accepted = progress.current_block;
        for height in progress.current_block + 1..=progress.highest_block {
            let context = self.context.clone();
            let peers = peers.to_vec();
            if !self
                .pool
                .try_add(async move { context.work(height, peers).await })
            {
                SYNC_POOL_REJECTIONS.inc();
                debug!("[qc-18] Pool saturated, deferring heights from {}", height);
                break;
            }
            accepted = height;
        }
        progress.raise_current(accepted);
        SYNC_CURRENT_HEIGHT.set(progress.current_block as f64);

        debug_assert!(check_progress_update(&before, progress));
    }
}

/// Cloneable handle to a running `Syncer`.
#[derive(Clone)]
pub struct SyncerHandle {
    commands: mpsc::Sender<Command>,
    shutdown: ShutdownSignal,
}

impl SyncerHandle {
    async fn round_trip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        if self.shutdown.is_shutdown() {
            return Err(SyncError::Stopped);
        }
        let (reply, response) = oneshot::channel();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(SyncError::Stopped),
            sent = self.commands.send(build(reply)) => sent.map_err(|_| SyncError::Stopped)?,
        }
        tokio::select! {
            biased;
            answer = response => answer.map_err(|_| SyncError::Stopped),
            _ = self.shutdown.cancelled() => Err(SyncError::Stopped),
        }
    }
}

#[async_trait]
impl SyncApi for SyncerHandle {
    async fn set_sync_target_block(
        &self,
        height: u64,
        peers: Vec<PeerAddress>,
    ) -> Result<(), SyncError> {
        self.round_trip(|reply| Command::SetTarget {
            height,
            peers,
            reply,
        })
        .await
    }

    async fn sync_progress(&self) -> Result<SyncProgress, SyncError> {
        self.round_trip(|reply| Command::Progress { reply }).await
    }
}
