//! `RaceSessionActor` - the single run-loop behind the event channel.
//!
//! The actor owns the [`EventHub`], the [`RaceDirectory`] and the
//! [`Countdown`]. Every inbound event, countdown tick and roster mutation
//! is one message on this mailbox, so handlers never overlap and no
//! in-process state needs a lock.
//!
//! # Starting a race
//!
//! 1. Take the smallest pending id (`NoRacesAvailable` if none)
//! 2. Snapshot its roster; fewer than two drivers is `InsufficientDrivers`
//!    and the race stays pending
//! 3. Claim it by removing it from the directory. If the store reports it
//!    was already gone, retry once with the new next id
//! 4. Broadcast `race:data`, then `remove:race`, then start the countdown
//!
//! Errors go only to the requester as `race:error`.
//!
//! # Countdown scheduling
//!
//! The first tick runs inline when the countdown starts. Each tick that
//! leaves time on the clock spawns one sleeper which posts
//! `Tick { generation }` back to this mailbox a second later. Restarting or
//! cancelling bumps the generation and cancels the sleeper's token, so a
//! late tick from an earlier run is ignored.

use super::connection::ConnectionActorHandle;
use super::messages::{SessionMessage, SessionState};
use super::metrics::{ActorType, MailboxMonitor};
use crate::config::Config;
use crate::countdown::{Countdown, Generation, Tick};
use crate::directory::RaceDirectory;
use crate::errors::{RcError, MIN_DRIVERS_TO_START};
use crate::hub::{events, AccessCodes, ConnectionId, Envelope, EventHub, FlagState, Publish, RoleSet};
use crate::observability::metrics;
use crate::roster::{Driver, RosterSnapshot};

use chrono::{DateTime, Utc};
use common::types::{CarNumber, RaceId};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Session mailbox capacity.
const SESSION_CHANNEL_BUFFER: usize = 1024;

/// Interval between countdown ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Claim attempts per start request.
const START_ATTEMPTS: usize = 2;

/// Settings the session actor needs from the service configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub access_codes: AccessCodes,
    pub dev_mode: bool,
    pub race_duration_secs: u64,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            access_codes: config.access_codes.clone(),
            dev_mode: config.dev_mode,
            race_duration_secs: config.race_duration(),
        }
    }
}

/// Handle to the `RaceSessionActor`.
#[derive(Clone, Debug)]
pub struct RaceSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RaceSessionHandle {
    async fn send(&self, message: SessionMessage) -> Result<(), RcError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, RcError>>) -> SessionMessage,
    ) -> Result<T, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Register a WebSocket connection with its initial roles.
    ///
    /// Returns once the connection is in the hub and has been greeted.
    pub async fn connect(
        &self,
        connection: ConnectionActorHandle,
        roles: RoleSet,
    ) -> Result<(), RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Connect {
            connection,
            roles,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RcError> {
        self.send(SessionMessage::Disconnect { connection_id }).await
    }

    /// Forward a text frame received from a client.
    pub async fn inbound(&self, connection_id: ConnectionId, text: String) -> Result<(), RcError> {
        self.send(SessionMessage::Inbound {
            connection_id,
            text,
        })
        .await
    }

    /// Start the next pending race, returning the roster that was broadcast.
    pub async fn start_race(&self) -> Result<RosterSnapshot, RcError> {
        self.request(|respond_to| SessionMessage::StartRace { respond_to })
            .await
    }

    pub async fn finish_race(&self) -> Result<(), RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::FinishRace { respond_to: tx })
            .await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn register_race(&self, race_id: RaceId) -> Result<(), RcError> {
        self.request(|respond_to| SessionMessage::RegisterRace {
            race_id,
            respond_to,
        })
        .await
    }

    pub async fn list_races(&self) -> Result<Vec<RaceId>, RcError> {
        self.request(|respond_to| SessionMessage::ListRaces { respond_to })
            .await
    }

    /// Drivers of a pending race in display order.
    pub async fn roster(&self, race_id: RaceId) -> Result<Vec<Driver>, RcError> {
        self.request(|respond_to| SessionMessage::Roster {
            race_id,
            respond_to,
        })
        .await
    }

    pub async fn add_driver(
        &self,
        race_id: RaceId,
        name: String,
        car: Option<u8>,
    ) -> Result<CarNumber, RcError> {
        self.request(|respond_to| SessionMessage::AddDriver {
            race_id,
            name,
            car,
            respond_to,
        })
        .await
    }

    pub async fn update_driver(
        &self,
        race_id: RaceId,
        name: String,
        car: u8,
    ) -> Result<CarNumber, RcError> {
        self.request(|respond_to| SessionMessage::UpdateDriver {
            race_id,
            name,
            car,
            respond_to,
        })
        .await
    }

    pub async fn remove_driver(&self, race_id: RaceId, name: String) -> Result<bool, RcError> {
        self.request(|respond_to| SessionMessage::RemoveDriver {
            race_id,
            name,
            respond_to,
        })
        .await
    }

    pub async fn delete_race(&self, race_id: RaceId) -> Result<bool, RcError> {
        self.request(|respond_to| SessionMessage::DeleteRace {
            race_id,
            respond_to,
        })
        .await
    }

    pub async fn state(&self) -> Result<SessionState, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::GetState { respond_to: tx }).await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the actor: every connection is closed and the countdown stops.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The race session run-loop.
pub struct RaceSessionActor {
    receiver: mpsc::Receiver<SessionMessage>,
    /// Weak so the mailbox still closes once every handle is gone.
    tick_sender: mpsc::WeakSender<SessionMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    hub: EventHub,
    directory: RaceDirectory,
    countdown: Countdown,
    /// Cancels the pending sleeper of the current countdown run.
    tick_token: Option<CancellationToken>,
    race_duration_secs: u64,
    flag: FlagState,
    current_race: Option<RosterSnapshot>,
    race_started_at: Option<DateTime<Utc>>,
}

impl RaceSessionActor {
    /// Spawn the session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        directory: RaceDirectory,
        settings: SessionSettings,
        cancel_token: CancellationToken,
    ) -> (RaceSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Session, "race-session"));

        let actor = Self {
            receiver,
            tick_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
            hub: EventHub::new(settings.access_codes, settings.dev_mode),
            directory,
            countdown: Countdown::new(),
            tick_token: None,
            race_duration_secs: settings.race_duration_secs,
            flag: FlagState::NoFlag,
            current_race: None,
            race_started_at: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RaceSessionHandle {
            sender,
            cancel_token,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "rc.actor.session")]
    async fn run(mut self) {
        info!(
            target: "rc.actor.session",
            dev_mode = self.hub.dev_mode(),
            race_duration_secs = self.race_duration_secs,
            "RaceSessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "rc.actor.session", "RaceSessionActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        debug!(target: "rc.actor.session", "RaceSessionActor channel closed, exiting");
                        break;
                    };
                    self.mailbox.record_dequeue();
                    self.handle_message(message).await;
                }
            }
        }

        self.shutdown();

        info!(
            target: "rc.actor.session",
            messages_processed = self.mailbox.messages_processed(),
            pending = self.mailbox.current_depth(),
            peak_depth = self.mailbox.peak_depth(),
            "RaceSessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Connect {
                connection,
                roles,
                respond_to,
            } => {
                self.hub.register(connection, roles);
                let _ = respond_to.send(());
            }

            SessionMessage::Disconnect { connection_id } => {
                self.hub.unregister(connection_id);
            }

            SessionMessage::Inbound {
                connection_id,
                text,
            } => {
                self.handle_inbound(connection_id, &text).await;
            }

            SessionMessage::Tick { generation } => {
                self.handle_tick(generation);
            }

            SessionMessage::StartRace { respond_to } => {
                let result = self.handle_start_race().await;
                if let Err(e) = &result {
                    record_start_failure(e);
                }
                let _ = respond_to.send(result);
            }

            SessionMessage::FinishRace { respond_to } => {
                self.handle_finish_race();
                let _ = respond_to.send(());
            }

            SessionMessage::RegisterRace {
                race_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.register(race_id).await);
            }

            SessionMessage::ListRaces { respond_to } => {
                let _ = respond_to.send(self.directory.list_pending().await);
            }

            SessionMessage::Roster {
                race_id,
                respond_to,
            } => {
                let result = self
                    .directory
                    .load(race_id)
                    .await
                    .map(|race| race.drivers().to_vec());
                let _ = respond_to.send(result);
            }

            SessionMessage::AddDriver {
                race_id,
                name,
                car,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.add_driver(race_id, &name, car).await);
            }

            SessionMessage::UpdateDriver {
                race_id,
                name,
                car,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.update_driver(race_id, &name, car).await);
            }

            SessionMessage::RemoveDriver {
                race_id,
                name,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.remove_driver(race_id, &name).await);
            }

            SessionMessage::DeleteRace {
                race_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.remove(race_id).await);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    async fn handle_inbound(&mut self, from: ConnectionId, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(target: "rc.actor.session", connection_id = %from, error = %e, "Ignoring malformed frame");
                return;
            }
        };

        let Publish::Broadcast(envelope) = self.hub.publish(from, envelope) else {
            return;
        };

        match envelope.event.as_str() {
            events::START_RACE => {
                if let Err(e) = self.handle_start_race().await {
                    record_start_failure(&e);
                    self.report_error(from, &e);
                }
            }
            events::FINISH_RACE => self.handle_finish_race(),
            events::FLAG_SWAP => {
                if let Some(flag) = envelope
                    .data
                    .and_then(|d| serde_json::from_value::<FlagState>(d).ok())
                {
                    self.flag = flag;
                }
            }
            events::LAP_RECORDED => {
                let car_name = envelope
                    .data
                    .as_ref()
                    .and_then(|d| d.get("carName"))
                    .map_or_else(String::new, |v| {
                        v.as_str().map_or_else(|| v.to_string(), str::to_owned)
                    });
                info!(target: "rc.actor.session", car_name = %car_name, "Lap recorded");
            }
            _ => {}
        }
    }

    async fn handle_start_race(&mut self) -> Result<RosterSnapshot, RcError> {
        for attempt in 1..=START_ATTEMPTS {
            let race_id = self
                .directory
                .next_pending_id()
                .await?
                .ok_or(RcError::NoRacesAvailable)?;

            let snapshot = self.directory.snapshot(race_id).await?;
            if snapshot.drivers.len() < MIN_DRIVERS_TO_START {
                return Err(RcError::InsufficientDrivers {
                    race_id,
                    count: snapshot.drivers.len(),
                });
            }

            if !self.directory.remove(race_id).await? {
                warn!(
                    target: "rc.actor.session",
                    race_id = %race_id,
                    attempt = attempt,
                    "Race was claimed before this start, retrying"
                );
                continue;
            }

            self.broadcast(Envelope::with_payload(events::RACE_DATA, &snapshot));
            self.broadcast(Ok(Envelope::bare(events::REMOVE_RACE)));

            info!(
                target: "rc.actor.session",
                race_id = %race_id,
                drivers = snapshot.drivers.len(),
                "Race started"
            );
            metrics::record_race_started();

            self.current_race = Some(snapshot.clone());
            self.race_started_at = Some(Utc::now());
            self.start_countdown();

            return Ok(snapshot);
        }

        Err(RcError::NoRacesAvailable)
    }

    /// Idempotent: safe whatever the countdown state.
    fn handle_finish_race(&mut self) {
        self.stop_countdown();
        self.flag = FlagState::Finished;
        self.broadcast_flag(FlagState::Finished);
        info!(target: "rc.actor.session", "Race finished by race control");
    }

    fn start_countdown(&mut self) {
        self.stop_countdown();
        let generation = self.countdown.start(self.race_duration_secs);
        self.tick_token = Some(self.cancel_token.child_token());
        debug!(
            target: "rc.actor.session",
            generation = generation.get(),
            duration_secs = self.race_duration_secs,
            "Countdown started"
        );
        self.handle_tick(generation);
    }

    fn stop_countdown(&mut self) {
        self.countdown.cancel();
        if let Some(token) = self.tick_token.take() {
            token.cancel();
        }
    }

    fn handle_tick(&mut self, generation: Generation) {
        match self.countdown.tick(generation) {
            Tick::Stale => {
                debug!(target: "rc.actor.session", generation = generation.get(), "Ignoring stale tick");
            }
            Tick::Remaining(seconds) => {
                metrics::record_countdown_tick();
                self.broadcast(Ok(Envelope::new(events::COUNTDOWN, Some(Value::from(seconds)))));
                self.schedule_tick(generation);
            }
            Tick::Finished => {
                metrics::record_countdown_tick();
                self.broadcast(Ok(Envelope::new(events::COUNTDOWN, Some(Value::from(0)))));
                self.broadcast(Ok(Envelope::bare(events::FINISH_RACE)));
                self.flag = FlagState::Finished;
                self.broadcast_flag(FlagState::Finished);
                if let Some(token) = self.tick_token.take() {
                    token.cancel();
                }
                info!(target: "rc.actor.session", "Countdown finished");
            }
        }
    }

    fn schedule_tick(&self, generation: Generation) {
        let Some(token) = self.tick_token.clone() else {
            return;
        };
        let sender = self.tick_sender.clone();
        let mailbox = Arc::clone(&self.mailbox);

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(TICK_INTERVAL) => {
                    post_tick(&sender, &mailbox, generation).await;
                }
            }
        });
    }

    fn broadcast_flag(&mut self, flag: FlagState) {
        self.broadcast(Ok(Envelope::new(
            events::FLAG_SWAP,
            Some(Value::from(flag.as_str())),
        )));
    }

    fn broadcast(&mut self, envelope: Result<Envelope, RcError>) {
        if let Err(e) = envelope.and_then(|envelope| self.hub.broadcast(&envelope)) {
            error!(target: "rc.actor.session", error = %e, "Failed to broadcast event");
        }
    }

    fn report_error(&mut self, to: ConnectionId, err: &RcError) {
        info!(
            target: "rc.actor.session",
            connection_id = %to,
            code = err.error_code(),
            "Start request rejected"
        );
        let envelope = Envelope::new(
            events::RACE_ERROR,
            Some(serde_json::json!({ "message": err.client_message() })),
        );
        if let Err(e) = self.hub.send_to(to, &envelope) {
            error!(target: "rc.actor.session", error = %e, "Failed to report error");
        }
    }

    fn state(&self) -> SessionState {
        SessionState {
            connections: self.hub.connection_count(),
            dev_mode: self.hub.dev_mode(),
            countdown_status: self.countdown.status(),
            remaining_seconds: self.countdown.remaining(),
            flag: self.flag,
            current_race: self.current_race.clone(),
            race_started_at: self.race_started_at,
        }
    }

    fn shutdown(&mut self) {
        self.stop_countdown();
        self.hub.close_all();
    }
}

/// Queue a countdown tick, counting it like any other mailbox message.
async fn post_tick(
    sender: &mpsc::WeakSender<SessionMessage>,
    mailbox: &MailboxMonitor,
    generation: Generation,
) {
    let Some(sender) = sender.upgrade() else {
        return;
    };
    if sender.send(SessionMessage::Tick { generation }).await.is_ok() {
        mailbox.record_enqueue();
    }
}

/// Count a rejected start; storage and internal failures are logged in full.
fn record_start_failure(err: &RcError) {
    metrics::record_race_start_rejected(err.error_code());
    match err {
        RcError::Storage(e) => {
            error!(target: "rc.storage", error = %e, "Race start failed on storage");
        }
        RcError::Internal(e) => {
            error!(target: "rc.internal", error = %e, "Race start failed");
        }
        _ => {}
    }
}
