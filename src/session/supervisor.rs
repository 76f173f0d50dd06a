//! Connect, resubscribe, and reset sequencing.
//!
//! # Status transitions
//!
//! ```text
//! Uninitialized ─► Connecting ⇄ Waiting
//!                      │
//!                      ▼ (transport open + resubscribed)
//!                  Connected ─► Disconnected ─► Lost ─► Connecting ...
//!                                     │
//!                                     └──────► Closed (close / retries exhausted)
//! Connecting ─► Error (non-retryable setup failure; connect may be called again)
//! ```
//!
//! `connect` and `reset` are idempotent: a call made while one of them is in
//! flight returns without doing anything. Both flags live under the
//! lifecycle lock, so at most one transport connect runs at a time.
//!
//! Both entry points return boxed futures. They spawn each other, and the
//! explicit `Send` bound keeps that cycle type-checkable.

use std::sync::Arc;

use crate::codec::MessageCodec;
use crate::error::SessionError;
use crate::protocol::FrameAssembler;
use crate::pump::{self, PumpExit};
use crate::stats::SessionStats;
use crate::status::ConnectionStatus;
use crate::transport::{BoxFuture, Connection};

use super::shared::{ActiveConnection, SessionCore};
use super::Requester;

/// How one connect sequence ended.
enum ConnectOutcome {
    /// Transport open, subscriptions confirmed.
    Connected,
    /// The connection dropped during resubscription; start over.
    Abandoned,
    /// A phase used up its attempt budget.
    Exhausted { phase: &'static str, attempts: u32 },
    /// Non-retryable setup failure.
    Failed(SessionError),
    /// The session is closing.
    Shutdown,
}

impl<C: MessageCodec> SessionCore<C> {
    /// Run one connect sequence unless one is already underway.
    pub(crate) fn connect(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            {
                let mut life = self.lifecycle.lock();
                if life.connecting || life.resetting || life.closing || life.active.is_some() {
                    tracing::debug!(
                        connecting = life.connecting,
                        resetting = life.resetting,
                        closing = life.closing,
                        "Connect ignored"
                    );
                    return;
                }
                if self.status.get().is_terminal() {
                    return;
                }
                life.connecting = true;
            }

            let outcome = self.run_connect().await;
            self.lifecycle.lock().connecting = false;

            match outcome {
                ConnectOutcome::Connected | ConnectOutcome::Shutdown => {}
                ConnectOutcome::Abandoned => {
                    tracing::info!(uri = %self.uri, "Connection lost during resubscription, starting over");
                    tokio::spawn(self.clone().connect());
                }
                ConnectOutcome::Exhausted { phase, attempts } => {
                    let error = SessionError::RetriesExhausted { attempts };
                    tracing::error!(uri = %self.uri, phase, %error, "Giving up, closing session");
                    self.clone().reset(true, None).await;
                }
                ConnectOutcome::Failed(error) => {
                    tracing::error!(uri = %self.uri, %error, "Connect failed with unrecoverable error");
                    self.status.transition(ConnectionStatus::Error);
                }
            }
        })
    }

    async fn run_connect(self: &Arc<Self>) -> ConnectOutcome {
        let generation = match self.open_transport().await {
            Ok(generation) => generation,
            Err(outcome) => return outcome,
        };

        // Fresh budget for the second phase
        if let Some(outcome) = self.resubscribe(generation).await {
            return outcome;
        }

        let mut life = self.lifecycle.lock();
        let current = life
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if life.closing {
            return ConnectOutcome::Shutdown;
        }
        if !current {
            return ConnectOutcome::Abandoned;
        }

        if life.ever_connected {
            SessionStats::incr(&self.stats.reconnects);
        }
        life.ever_connected = true;
        self.status.transition(ConnectionStatus::Connected);
        tracing::info!(uri = %self.uri, generation, "Session connected");
        ConnectOutcome::Connected
    }

    /// Connect phase: open the transport and start the pumps.
    async fn open_transport(self: &Arc<Self>) -> Result<u64, ConnectOutcome> {
        let mut attempts = 0u32;

        loop {
            if self.is_closing() {
                return Err(ConnectOutcome::Shutdown);
            }
            self.status.transition(ConnectionStatus::Connecting);
            SessionStats::incr(&self.stats.connect_attempts);
            tracing::debug!(uri = %self.uri, attempt = attempts + 1, "Opening transport");

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ConnectOutcome::Shutdown),
                result = self.connector.connect(&self.uri) => result,
            };

            match result {
                Ok(connection) => {
                    return self.install(connection).ok_or(ConnectOutcome::Shutdown);
                }
                Err(e) if !e.is_retryable() => return Err(ConnectOutcome::Failed(e)),
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(uri = %self.uri, attempt = attempts, error = %e, "Connect attempt failed");
                    if self.config.retries_exhausted(attempts) {
                        return Err(ConnectOutcome::Exhausted {
                            phase: "connect",
                            attempts,
                        });
                    }
                    self.status.transition(ConnectionStatus::Waiting);
                    if !self.pause().await {
                        return Err(ConnectOutcome::Shutdown);
                    }
                }
            }
        }
    }

    /// Resubscribe phase. `None` means every subscription was confirmed.
    async fn resubscribe(self: &Arc<Self>, generation: u64) -> Option<ConnectOutcome> {
        let provider = self.subscriptions.clone()?;
        let requester = Requester::new(self.clone());
        let mut attempts = 0u32;

        loop {
            if self.is_closing() {
                return Some(ConnectOutcome::Shutdown);
            }
            if !self.is_current(generation) {
                return Some(ConnectOutcome::Abandoned);
            }

            let error = match provider.resubscribe(&requester).await {
                Ok(()) => return None,
                Err(e) => e,
            };
            if error.is_connection_lost() {
                return Some(ConnectOutcome::Abandoned);
            }

            attempts += 1;
            tracing::warn!(uri = %self.uri, attempt = attempts, %error, "Resubscription failed");
            if self.config.retries_exhausted(attempts) {
                return Some(ConnectOutcome::Exhausted {
                    phase: "resubscribe",
                    attempts,
                });
            }
            if !self.pause().await {
                return Some(ConnectOutcome::Shutdown);
            }
        }
    }

    /// Wait out the reconnect delay. `false` if the session started closing.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.config.reconnect_delay) => true,
        }
    }

    /// Make `connection` the active one and spawn its pumps.
    ///
    /// Returns the new generation, or `None` if the session started closing
    /// while the transport was opening.
    fn install(self: &Arc<Self>, connection: Connection) -> Option<u64> {
        let mut life = self.lifecycle.lock();
        if life.closing {
            tracing::debug!("Session closing, dropping fresh connection");
            return None;
        }

        life.generation += 1;
        let generation = life.generation;
        let cancel = self.shutdown.child_token();
        let Connection { sink, stream } = connection;

        let send_pump = {
            let core = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let exit = pump::run_send_pump(sink, &core.outbound, &cancel, &core.stats).await;
                core.on_pump_exit("send", generation, exit);
            })
        };

        let receive_pump = {
            let core = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let assembler = FrameAssembler::new(core.config.max_message_size);
                let exit = pump::run_receive_pump(stream, assembler, &cancel, &core.stats, |message| {
                    core.dispatch(message)
                })
                .await;
                core.on_pump_exit("receive", generation, exit);
            })
        };

        life.active = Some(ActiveConnection {
            generation,
            cancel,
            send_pump,
            receive_pump,
        });
        tracing::debug!(uri = %self.uri, generation, "Transport open, pumps started");
        Some(generation)
    }

    fn on_pump_exit(self: &Arc<Self>, pump: &'static str, generation: u64, exit: PumpExit) {
        if !exit.needs_reset() {
            tracing::trace!(pump, generation, "Pump stopped");
            return;
        }
        match &exit {
            PumpExit::Failed(error) => {
                tracing::warn!(pump, generation, %error, "Pump failed, resetting connection")
            }
            _ => tracing::info!(pump, generation, "Remote closed connection, resetting"),
        }

        if !self.is_current(generation) {
            tracing::debug!(pump, generation, "Stale pump, ignoring");
            return;
        }
        // Never inline: reset awaits this task's handle
        tokio::spawn(self.clone().reset(false, Some(generation)));
    }

    /// Tear the active connection down.
    ///
    /// With `stopping` the session ends in `Closed`; otherwise it goes to
    /// `Lost` and a reconnect is scheduled. With `expected`, the reset only
    /// runs if that generation is still installed.
    pub(crate) fn reset(self: Arc<Self>, stopping: bool, expected: Option<u64>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let active = {
                let mut life = self.lifecycle.lock();
                if stopping {
                    life.closing = true;
                }
                if life.resetting {
                    tracing::debug!("Reset already in progress");
                    return;
                }
                if let Some(generation) = expected {
                    let current = life
                        .active
                        .as_ref()
                        .is_some_and(|active| active.generation == generation);
                    if !current {
                        tracing::debug!(generation, "Reset for a replaced connection, ignoring");
                        return;
                    }
                }
                life.resetting = true;
                life.active.take()
            };

            if stopping {
                self.shutdown.cancel();
            }

            if let Some(active) = active {
                tracing::debug!(generation = active.generation, "Stopping pumps");
                active.cancel.cancel();
                for (name, handle) in [("send", active.send_pump), ("receive", active.receive_pump)] {
                    if let Err(e) = handle.await {
                        tracing::error!(pump = name, error = %e, "Pump task panicked");
                    }
                }
            }

            let dropped = self.outbound.clear();
            let failed = self.registry.fail_all(|| SessionError::ConnectionLost);
            if dropped > 0 || failed > 0 {
                tracing::info!(dropped, failed, "Connection reset discarded in-flight work");
            }

            self.status.transition(ConnectionStatus::Disconnected);

            // Settle the status before a connect can start
            let reconnect = {
                let mut life = self.lifecycle.lock();
                life.resetting = false;
                if life.closing {
                    // A close may have arrived while this reset was running
                    self.shutdown.cancel();
                    self.status.transition(ConnectionStatus::Closed);
                } else {
                    self.status.transition(ConnectionStatus::Lost);
                }
                !life.closing
            };

            if reconnect {
                tokio::spawn(self.clone().connect());
            }
        })
    }
}
