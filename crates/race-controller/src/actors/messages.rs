//! Message types for the race session actor.

use super::connection::ConnectionActorHandle;
use crate::countdown::{CountdownStatus, Generation};
use crate::errors::RcError;
use crate::hub::{ConnectionId, FlagState, RoleSet};
use crate::roster::{Driver, RosterSnapshot};
use chrono::{DateTime, Utc};
use common::types::{CarNumber, RaceId};
use serde::Serialize;
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<Result<T, RcError>>;

/// Messages accepted by `RaceSessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// A WebSocket client connected.
    Connect {
        connection: ConnectionActorHandle,
        roles: RoleSet,
        respond_to: oneshot::Sender<()>,
    },

    /// A WebSocket client went away.
    Disconnect { connection_id: ConnectionId },

    /// A text frame arrived from a client.
    Inbound {
        connection_id: ConnectionId,
        text: String,
    },

    /// Scheduled countdown tick.
    Tick { generation: Generation },

    /// Start the next pending race.
    StartRace { respond_to: Reply<RosterSnapshot> },

    /// Stop the countdown and raise the finished flag.
    FinishRace { respond_to: oneshot::Sender<()> },

    RegisterRace {
        race_id: RaceId,
        respond_to: Reply<()>,
    },

    ListRaces { respond_to: Reply<Vec<RaceId>> },

    Roster {
        race_id: RaceId,
        respond_to: Reply<Vec<Driver>>,
    },

    AddDriver {
        race_id: RaceId,
        name: String,
        car: Option<u8>,
        respond_to: Reply<CarNumber>,
    },

    UpdateDriver {
        race_id: RaceId,
        name: String,
        car: u8,
        respond_to: Reply<CarNumber>,
    },

    RemoveDriver {
        race_id: RaceId,
        name: String,
        respond_to: Reply<bool>,
    },

    DeleteRace {
        race_id: RaceId,
        respond_to: Reply<bool>,
    },

    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Point-in-time view of the race session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connections: usize,
    pub dev_mode: bool,
    pub countdown_status: CountdownStatus,
    pub remaining_seconds: u64,
    pub flag: FlagState,
    pub current_race: Option<RosterSnapshot>,
    pub race_started_at: Option<DateTime<Utc>>,
}
