//! Event Hub - broadcast fabric for every connected station.
//!
//! Every accepted event is re-broadcast verbatim to all connections,
//! publisher included. Control events (`start:race`, `finish:race`,
//! `flag:swap`) are only accepted from connections holding the
//! race-control role unless dev mode is on. Denied events are dropped
//! silently; access denial is never reported back to the publisher.
//!
//! The hub is owned by the session actor and is never shared, so no
//! locking is needed.
//!
//! # Wire format
//!
//! Text frames carrying `{"event": "<name>", "data": <json>}`. `data` is
//! omitted for events without a payload.

use crate::actors::{ConnectionActorHandle, DeliveryError};
use crate::errors::RcError;
use crate::observability::metrics;
use common::secret::{codes_match, SecretString};
use common::types::Role;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Wire event names.
pub mod events {
    pub const START_RACE: &str = "start:race";
    pub const FINISH_RACE: &str = "finish:race";
    pub const FLAG_SWAP: &str = "flag:swap";
    pub const LAP_RECORDED: &str = "lap-recorded";
    pub const RACE_DATA: &str = "race:data";
    pub const REMOVE_RACE: &str = "remove:race";
    pub const COUNTDOWN: &str = "countdown";
    pub const RACE_ERROR: &str = "race:error";
    pub const DEV_MODE: &str = "devMode";
    pub const ROLE_SUBSCRIBE: &str = "role:subscribe";

    /// Every name the controller knows about.
    pub const KNOWN: [&str; 10] = [
        START_RACE,
        FINISH_RACE,
        FLAG_SWAP,
        LAP_RECORDED,
        RACE_DATA,
        REMOVE_RACE,
        COUNTDOWN,
        RACE_ERROR,
        DEV_MODE,
        ROLE_SUBSCRIBE,
    ];
}

/// The role an inbound event requires, if any.
#[must_use]
pub fn required_role(event: &str) -> Option<Role> {
    match event {
        events::START_RACE | events::FINISH_RACE | events::FLAG_SWAP => Some(Role::RaceControl),
        _ => None,
    }
}

/// Opaque identifier of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    /// `None` only when the key is absent; an explicit `null` is kept.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    #[must_use]
    pub fn new(event: &str, data: Option<Value>) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// An event with no payload.
    #[must_use]
    pub fn bare(event: &str) -> Self {
        Self::new(event, None)
    }

    /// An event whose payload is any serializable value.
    ///
    /// # Errors
    ///
    /// `RcError::Internal` if the payload cannot be represented as JSON.
    pub fn with_payload<T: Serialize>(event: &str, payload: &T) -> Result<Self, RcError> {
        let data = serde_json::to_value(payload)
            .map_err(|e| RcError::Internal(format!("payload encode failed: {e}")))?;
        Ok(Self::new(event, Some(data)))
    }

    /// Parse an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the frame is not an envelope.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn encode(&self) -> Result<Arc<str>, RcError> {
        serde_json::to_string(self)
            .map(Arc::from)
            .map_err(|e| RcError::Internal(format!("event encode failed: {e}")))
    }
}

/// Flag shown on the track displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Safe,
    Danger,
    Hazard,
    #[serde(rename = "none")]
    NoFlag,
    Finished,
}

impl FlagState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FlagState::Safe => "safe",
            FlagState::Danger => "danger",
            FlagState::Hazard => "hazard",
            FlagState::NoFlag => "none",
            FlagState::Finished => "finished",
        }
    }
}

/// Roles granted to one connection or HTTP session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    const fn bit(role: Role) -> u8 {
        match role {
            Role::FrontDesk => 1,
            Role::RaceControl => 1 << 1,
            Role::LapLineTracker => 1 << 2,
        }
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= Self::bit(role);
    }

    #[must_use]
    pub const fn contains(&self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = Self::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

/// Per-role access codes.
#[derive(Clone)]
pub struct AccessCodes {
    front_desk: SecretString,
    race_control: SecretString,
    lap_line_tracker: SecretString,
}

impl AccessCodes {
    #[must_use]
    pub fn new(
        front_desk: SecretString,
        race_control: SecretString,
        lap_line_tracker: SecretString,
    ) -> Self {
        Self {
            front_desk,
            race_control,
            lap_line_tracker,
        }
    }

    /// Whether `code` is the configured access code for `role`.
    #[must_use]
    pub fn verify(&self, role: Role, code: &str) -> bool {
        let expected = match role {
            Role::FrontDesk => &self.front_desk,
            Role::RaceControl => &self.race_control,
            Role::LapLineTracker => &self.lap_line_tracker,
        };
        codes_match(expected, code)
    }
}

impl fmt::Debug for AccessCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCodes")
            .field("front_desk", &"[REDACTED]")
            .field("race_control", &"[REDACTED]")
            .field("lap_line_tracker", &"[REDACTED]")
            .finish()
    }
}

/// Payload of `role:subscribe`.
#[derive(Debug, Deserialize)]
struct RoleSubscription {
    role: String,
    code: String,
}

/// What the hub did with an inbound event.
#[derive(Debug, PartialEq)]
pub enum Publish {
    /// Broadcast to every connection; the caller may act on it.
    Broadcast(Envelope),
    /// Publisher lacks the required role.
    Dropped,
    /// Handled by the hub itself (role subscription).
    Consumed,
}

struct Subscriber {
    handle: ConnectionActorHandle,
    roles: RoleSet,
}

/// Connection registry and fan-out.
pub struct EventHub {
    subscribers: HashMap<ConnectionId, Subscriber>,
    access_codes: AccessCodes,
    dev_mode: bool,
}

impl EventHub {
    #[must_use]
    pub fn new(access_codes: AccessCodes, dev_mode: bool) -> Self {
        Self {
            subscribers: HashMap::new(),
            access_codes,
            dev_mode,
        }
    }

    #[must_use]
    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn roles(&self, id: ConnectionId) -> Option<RoleSet> {
        self.subscribers.get(&id).map(|s| s.roles)
    }

    /// Add a connection with its initial roles and greet it with `devMode`.
    pub fn register(&mut self, handle: ConnectionActorHandle, roles: RoleSet) {
        let id = handle.connection_id();
        self.subscribers.insert(id, Subscriber { handle, roles });
        metrics::set_connections_active(self.subscribers.len());

        info!(
            target: "rc.hub",
            connection_id = %id,
            roles = ?roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "Connection registered"
        );

        let greeting = Envelope::new(
            events::DEV_MODE,
            Some(serde_json::json!({ "isDevMode": self.dev_mode })),
        );
        if let Err(e) = self.send_to(id, &greeting) {
            warn!(target: "rc.hub", connection_id = %id, error = %e, "Failed to greet connection");
        }
    }

    /// Remove a connection and stop its actor. Returns `false` if unknown.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };
        subscriber.handle.cancel();
        metrics::set_connections_active(self.subscribers.len());
        info!(target: "rc.hub", connection_id = %id, "Connection unregistered");
        true
    }

    /// Grant `role` to a connection if `code` matches. Emits nothing.
    pub fn subscribe_role(&mut self, id: ConnectionId, role: Role, code: &str) -> bool {
        if !self.access_codes.verify(role, code) {
            debug!(target: "rc.hub", connection_id = %id, role = %role, "Role subscription denied");
            return false;
        }
        let Some(subscriber) = self.subscribers.get_mut(&id) else {
            return false;
        };
        subscriber.roles.insert(role);
        info!(target: "rc.hub", connection_id = %id, role = %role, "Role granted");
        true
    }

    /// Whether a connection may publish `event`.
    #[must_use]
    pub fn authorize(&self, id: ConnectionId, event: &str) -> bool {
        if self.dev_mode {
            return true;
        }
        match required_role(event) {
            None => true,
            Some(role) => self
                .subscribers
                .get(&id)
                .is_some_and(|s| s.roles.contains(role)),
        }
    }

    /// Accept an inbound event from a connection.
    ///
    /// `role:subscribe` is consumed. Anything else is broadcast if the
    /// publisher is authorized, otherwise dropped.
    pub fn publish(&mut self, from: ConnectionId, envelope: Envelope) -> Publish {
        if envelope.event == events::ROLE_SUBSCRIBE {
            self.handle_role_subscribe(from, envelope.data);
            return Publish::Consumed;
        }

        if !self.authorize(from, &envelope.event) {
            metrics::record_event_dropped(&envelope.event);
            debug!(
                target: "rc.hub",
                connection_id = %from,
                event = %envelope.event,
                "Dropping control event from connection without role"
            );
            return Publish::Dropped;
        }

        if let Err(e) = self.broadcast(&envelope) {
            warn!(target: "rc.hub", event = %envelope.event, error = %e, "Broadcast failed");
        }
        Publish::Broadcast(envelope)
    }

    /// Deliver an event to every connection. Returns the delivery count.
    ///
    /// Connections that are closed or not draining are dropped.
    ///
    /// # Errors
    ///
    /// `RcError::Internal` if the event cannot be encoded.
    pub fn broadcast(&mut self, envelope: &Envelope) -> Result<usize, RcError> {
        let frame = envelope.encode()?;

        let mut failed = Vec::new();
        for (id, subscriber) in &self.subscribers {
            if let Err(e) = subscriber.handle.try_deliver(Arc::clone(&frame)) {
                failed.push((*id, e));
            }
        }

        for (id, e) in &failed {
            self.prune(*id, *e);
        }

        metrics::record_event_broadcast(&envelope.event);
        debug!(
            target: "rc.hub",
            event = %envelope.event,
            delivered = self.subscribers.len(),
            "Event broadcast"
        );
        Ok(self.subscribers.len())
    }

    /// Deliver an event to one connection. Returns `false` if the
    /// connection is gone.
    ///
    /// # Errors
    ///
    /// `RcError::Internal` if the event cannot be encoded.
    pub fn send_to(&mut self, id: ConnectionId, envelope: &Envelope) -> Result<bool, RcError> {
        let Some(subscriber) = self.subscribers.get(&id) else {
            return Ok(false);
        };
        let frame = envelope.encode()?;
        match subscriber.handle.try_deliver(frame) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.prune(id, e);
                Ok(false)
            }
        }
    }

    /// Close every connection.
    pub fn close_all(&mut self) {
        for (_, subscriber) in self.subscribers.drain() {
            subscriber.handle.cancel();
        }
        metrics::set_connections_active(0);
    }

    fn prune(&mut self, id: ConnectionId, reason: DeliveryError) {
        warn!(target: "rc.hub", connection_id = %id, reason = %reason, "Pruning connection");
        self.unregister(id);
    }

    fn handle_role_subscribe(&mut self, from: ConnectionId, data: Option<Value>) {
        let Some(request) = data.and_then(|d| serde_json::from_value::<RoleSubscription>(d).ok())
        else {
            debug!(target: "rc.hub", connection_id = %from, "Malformed role subscription");
            return;
        };
        match request.role.parse::<Role>() {
            Ok(role) => {
                self.subscribe_role(from, role, &request.code);
            }
            Err(e) => {
                debug!(target: "rc.hub", connection_id = %from, error = %e, "Role subscription for unknown role");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ConnectionActor;
    use axum::extract::ws::Message;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    struct Client {
        id: ConnectionId,
        written: fmpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        async fn next_envelope(&mut self) -> Envelope {
            loop {
                if let Message::Text(text) = self.written.next().await.unwrap() {
                    return Envelope::parse(&text).unwrap();
                }
            }
        }

        async fn next_event(&mut self) -> String {
            self.next_envelope().await.event
        }
    }

    fn codes() -> AccessCodes {
        AccessCodes::new(
            SecretString::from("fd-code"),
            SecretString::from("rc-code"),
            SecretString::from("llt-code"),
        )
    }

    /// Connect a client and consume its `devMode` greeting.
    async fn connect(hub: &mut EventHub, roles: RoleSet) -> Client {
        let (sink, written) = fmpsc::unbounded::<Message>();
        let id = ConnectionId::new();
        let (handle, _task) = ConnectionActor::spawn(id, sink, CancellationToken::new());
        hub.register(handle, roles);

        let mut client = Client { id, written };
        assert_eq!(client.next_event().await, events::DEV_MODE);
        client
    }

    #[test]
    fn test_envelope_wire_shape() {
        let bare = serde_json::to_value(Envelope::bare(events::REMOVE_RACE)).unwrap();
        assert_eq!(bare, serde_json::json!({ "event": "remove:race" }));

        let parsed = Envelope::parse(r#"{"event":"flag:swap","data":"danger"}"#).unwrap();
        assert_eq!(parsed.data, Some(Value::from("danger")));

        let no_data = Envelope::parse(r#"{"event":"start:race"}"#).unwrap();
        assert_eq!(no_data.data, None);
    }

    #[test]
    fn test_explicit_null_data_survives_reencode() {
        let raw = r#"{"event":"lap-recorded","data":null}"#;
        let parsed = Envelope::parse(raw).unwrap();
        assert_eq!(parsed.data, Some(Value::Null));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), raw);
    }

    #[test]
    fn test_flag_state_wire_names() {
        assert_eq!(serde_json::to_value(FlagState::NoFlag).unwrap(), "none");
        assert_eq!(
            serde_json::from_value::<FlagState>(Value::from("hazard")).unwrap(),
            FlagState::Hazard
        );
        assert!(serde_json::from_value::<FlagState>(Value::from("purple")).is_err());
    }

    #[test]
    fn test_role_set() {
        let mut roles = RoleSet::empty();
        assert!(roles.is_empty());
        roles.insert(Role::RaceControl);
        assert!(roles.contains(Role::RaceControl));
        assert!(!roles.contains(Role::FrontDesk));

        let all: RoleSet = Role::ALL.into_iter().collect();
        assert_eq!(all.iter().count(), 3);
    }

    #[test]
    fn test_access_codes_verify_and_redact() {
        let codes = codes();
        assert!(codes.verify(Role::RaceControl, "rc-code"));
        assert!(!codes.verify(Role::RaceControl, "fd-code"));
        assert!(!format!("{codes:?}").contains("rc-code"));
    }

    #[test]
    fn test_required_roles() {
        assert_eq!(required_role("start:race"), Some(Role::RaceControl));
        assert_eq!(required_role("flag:swap"), Some(Role::RaceControl));
        assert_eq!(required_role("lap-recorded"), None);
    }

    #[tokio::test]
    async fn test_new_connection_gets_dev_mode_only() {
        let mut hub = EventHub::new(codes(), true);
        let mut first = connect(&mut hub, RoleSet::empty()).await;

        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (handle, _task) = ConnectionActor::spawn(ConnectionId::new(), sink, CancellationToken::new());
        hub.register(handle, RoleSet::empty());

        let Message::Text(greeting) = written.next().await.unwrap() else {
            unreachable!("greeting is a text frame");
        };
        assert_eq!(
            serde_json::from_str::<Value>(&greeting).unwrap(),
            serde_json::json!({ "event": "devMode", "data": { "isDevMode": true } })
        );

        // The first client saw nothing from the second registration.
        hub.broadcast(&Envelope::bare("ping")).unwrap();
        assert_eq!(first.next_event().await, "ping");
    }

    #[tokio::test]
    async fn test_publish_echoes_to_everyone_including_sender() {
        let mut hub = EventHub::new(codes(), false);
        let mut sender = connect(&mut hub, RoleSet::empty()).await;
        let mut other = connect(&mut hub, RoleSet::empty()).await;

        let envelope = Envelope::new(
            events::LAP_RECORDED,
            Some(serde_json::json!({ "carName": "7" })),
        );
        let outcome = hub.publish(sender.id, envelope.clone());
        assert_eq!(outcome, Publish::Broadcast(envelope.clone()));

        assert_eq!(sender.next_envelope().await, envelope);
        assert_eq!(other.next_envelope().await, envelope);
    }

    #[tokio::test]
    async fn test_null_payload_is_relayed_as_null() {
        let mut hub = EventHub::new(codes(), false);
        let sender = connect(&mut hub, RoleSet::empty()).await;
        let mut other = connect(&mut hub, RoleSet::empty()).await;

        let envelope = Envelope::parse(r#"{"event":"lap-recorded","data":null}"#).unwrap();
        assert!(matches!(
            hub.publish(sender.id, envelope),
            Publish::Broadcast(_)
        ));

        loop {
            if let Message::Text(text) = other.written.next().await.unwrap() {
                assert_eq!(text, r#"{"event":"lap-recorded","data":null}"#);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_control_event_without_role_is_dropped() {
        let mut hub = EventHub::new(codes(), false);
        let mut sender = connect(&mut hub, RoleSet::empty()).await;

        let outcome = hub.publish(
            sender.id,
            Envelope::new(events::FLAG_SWAP, Some(Value::from("danger"))),
        );
        assert_eq!(outcome, Publish::Dropped);

        // Nothing was queued: the next frame is the marker.
        hub.broadcast(&Envelope::bare("marker")).unwrap();
        assert_eq!(sender.next_event().await, "marker");
    }

    #[tokio::test]
    async fn test_role_subscribe_grants_and_is_not_broadcast() {
        let mut hub = EventHub::new(codes(), false);
        let mut client = connect(&mut hub, RoleSet::empty()).await;

        let wrong = Envelope::new(
            events::ROLE_SUBSCRIBE,
            Some(serde_json::json!({ "role": "race-control", "code": "nope" })),
        );
        assert_eq!(hub.publish(client.id, wrong), Publish::Consumed);
        assert!(!hub.authorize(client.id, events::START_RACE));

        let right = Envelope::new(
            events::ROLE_SUBSCRIBE,
            Some(serde_json::json!({ "role": "race-control", "code": "rc-code" })),
        );
        assert_eq!(hub.publish(client.id, right), Publish::Consumed);
        assert!(hub.authorize(client.id, events::START_RACE));

        hub.broadcast(&Envelope::bare("marker")).unwrap();
        assert_eq!(client.next_event().await, "marker");
    }

    #[tokio::test]
    async fn test_dev_mode_disables_role_checks() {
        let mut hub = EventHub::new(codes(), true);
        let client = connect(&mut hub, RoleSet::empty()).await;
        assert!(hub.authorize(client.id, events::FINISH_RACE));
    }

    #[tokio::test]
    async fn test_session_roles_carry_over() {
        let mut hub = EventHub::new(codes(), false);
        let roles: RoleSet = [Role::RaceControl].into_iter().collect();
        let client = connect(&mut hub, roles).await;
        assert!(hub.authorize(client.id, events::FLAG_SWAP));
    }

    #[tokio::test]
    async fn test_closed_connection_is_pruned() {
        let mut hub = EventHub::new(codes(), false);
        let client = connect(&mut hub, RoleSet::empty()).await;
        let _keep = connect(&mut hub, RoleSet::empty()).await;
        assert_eq!(hub.connection_count(), 2);

        // Dropping the receiver makes the actor's next write fail.
        drop(client.written);
        hub.broadcast(&Envelope::bare("first")).unwrap();
        tokio::task::yield_now().await;
        for _ in 0..50 {
            if hub.broadcast(&Envelope::bare("ping")).unwrap() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.roles(client.id).is_none());
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_false() {
        let mut hub = EventHub::new(codes(), false);
        assert!(!hub.unregister(ConnectionId::new()));
    }
}
