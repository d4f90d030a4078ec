//! Event listeners.

use kite_core::{Connectors, EventBus};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::history::History;

/// Log every event published on `bus` until the bus is dropped.
pub fn spawn_event_log(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&*event) {
                    Ok(body) => debug!(
                        event = event.name(),
                        channel = %event.channel_name(),
                        %body,
                        "Event"
                    ),
                    Err(e) => warn!(event = event.name(), error = %e, "Event not serializable"),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event log lagging behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Event log stopped");
    })
}

/// Keep `history` in step with the events on `bus` until the bus is dropped.
///
/// A member that reconnects is sent its latest `replay_limit` messages
/// through `connectors`; zero turns replay off.
pub fn spawn_history(
    bus: &EventBus,
    history: Arc<History>,
    connectors: Arc<Connectors>,
    replay_limit: usize,
) -> JoinHandle<()> {
    let mut events = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    history.apply(&event);

                    let deliveries = history.replay(&event, replay_limit);
                    if deliveries.is_empty() {
                        continue;
                    }
                    let reports = connectors.deliver(deliveries).await;
                    let failed = reports.iter().filter(|r| !r.is_delivered()).count();
                    debug!(
                        channel = %event.channel_name(),
                        replayed = reports.len(),
                        failed,
                        "History replayed"
                    );
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "History lagging behind, messages not recorded");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("History listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use kite_core::{
        ChannelName, Connector, ConnectorId, DeliveryError, Direction, Event, MemberId, Route,
    };
    use kite_protocol::{MessagePayload, Payload, PlaintextMessage};
    use tokio::sync::mpsc;

    struct Forwarding {
        id: ConnectorId,
        tx: mpsc::UnboundedSender<(Route, Payload)>,
    }

    #[async_trait]
    impl Connector for Forwarding {
        fn id(&self) -> &ConnectorId {
            &self.id
        }

        async fn dispatch(&self, route: &Route, payload: &Payload) -> Result<(), DeliveryError> {
            self.tx
                .send((route.clone(), payload.clone()))
                .map_err(|_| DeliveryError::Unreachable(route.clone()))
        }
    }

    fn channel() -> ChannelName {
        ChannelName::new("support_desk").unwrap()
    }

    fn routed(id: &str) -> Event {
        Event::MessageRouted {
            channel: channel(),
            member: MemberId::new("guest").unwrap(),
            direction: Direction::GuestToHost,
            request: MessagePayload::Plaintext(PlaintextMessage {
                message_id: id.to_string(),
                text: format!("text of {id}"),
                timestamp: Utc::now() - Duration::seconds(1),
                in_reply_to: None,
            }),
            responses: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_history_listener_replays_on_reconnect() {
        let bus = EventBus::with_capacity(16);
        let history = Arc::new(History::new(10));
        let connectors = Arc::new(Connectors::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        connectors.register(Arc::new(Forwarding {
            id: ConnectorId::new("tg").unwrap(),
            tx,
        }));
        let handle = spawn_history(&bus, history.clone(), connectors, 1);

        let route = Route::new("tg", "42").unwrap();
        bus.publish(routed("m1"));
        bus.publish(routed("m2"));
        bus.publish(Event::MemberConnected {
            channel_name: channel(),
            member_id: MemberId::new("guest").unwrap(),
            route: route.clone(),
        });

        let (to, payload) = rx.recv().await.unwrap();
        assert_eq!(to, route);
        assert!(matches!(payload, Payload::Plaintext(m) if m.message_id == "m2"));

        bus.publish(Event::ChannelDropped {
            channel_name: channel(),
        });
        drop(bus);
        handle.await.unwrap();

        assert!(history
            .find(&channel(), &MemberId::new("guest").unwrap(), "m1")
            .is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_log_stops_with_bus() {
        let bus = EventBus::with_capacity(4);
        let handle = spawn_event_log(&bus);
        assert_eq!(bus.listener_count(), 1);

        bus.publish(Event::ChannelDropped {
            channel_name: ChannelName::new("support_desk").unwrap(),
        });
        drop(bus);

        handle.await.unwrap();
    }
}
