//! End-to-end relay flow across two connectors.

use async_trait::async_trait;
use chrono::Utc;
use kite_core::{
    Command, Connector, ConnectorId, DeliveryError, InMemoryChannels, Locale, MemberId, Route,
};
use kite_protocol::{MessageAck, MessagePayload, Payload, PlaintextMessage};
use kite_relay::{listener, Config, Relay};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Connector that forwards every delivery into a channel.
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

/// Connector whose endpoints are all gone.
struct Closed {
    id: ConnectorId,
    attempts: Mutex<usize>,
}

#[async_trait]
impl Connector for Closed {
    fn id(&self) -> &ConnectorId {
        &self.id
    }

    async fn dispatch(&self, route: &Route, _payload: &Payload) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        Err(DeliveryError::Unreachable(route.clone()))
    }
}

type Inbox = mpsc::UnboundedReceiver<(Route, Payload)>;

fn forwarding(id: &str) -> (Arc<Forwarding>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(Forwarding {
        id: ConnectorId::new(id).unwrap(),
        tx,
    });
    (connector, rx)
}

fn command(route: &Route, member: &str, line: &str) -> Command {
    Command::execute(
        route.clone(),
        Locale::En,
        MemberId::new(member).unwrap(),
        None,
        line,
    )
    .unwrap()
}

fn message(route: &Route, member: &str, id: &str, in_reply_to: Option<String>) -> Command {
    Command::RouteMessage {
        origin: route.clone(),
        locale: Locale::En,
        member_id: MemberId::new(member).unwrap(),
        payload: MessagePayload::Plaintext(PlaintextMessage {
            message_id: id.to_string(),
            text: format!("text of {id}"),
            timestamp: Utc::now(),
            in_reply_to,
        }),
        to_member: None,
    }
}

async fn next(inbox: &mut Inbox) -> (Route, Payload) {
    timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("no delivery in time")
        .expect("connector closed")
}

#[tokio::test]
async fn test_conversation_across_connectors() {
    let relay = Relay::new(InMemoryChannels::new(), &Config::default());
    let (tg, mut tg_inbox) = forwarding("tg");
    let (ws, mut ws_inbox) = forwarding("ws");
    relay.register(tg);
    relay.register(ws);
    let log = listener::spawn_event_log(relay.events());

    let host = Route::new("tg", "100").unwrap();
    let guest = Route::new("ws", "session-7").unwrap();

    relay.submit(command(&host, "operator", "/host support_desk")).await;
    let (_, created) = next(&mut tg_inbox).await;
    assert!(matches!(created, Payload::Notification(_)));

    relay.submit(command(&guest, "visitor", "/join support_desk")).await;
    let (to, _) = next(&mut ws_inbox).await;
    assert_eq!(to, guest);
    let (to, _) = next(&mut tg_inbox).await;
    assert_eq!(to, host);

    // Guest writes; the host sees a relay-assigned message id.
    let reports = relay.submit(message(&guest, "visitor", "v-1", None)).await;
    assert!(reports.iter().all(|r| r.is_delivered()));
    let (to, inbound) = next(&mut tg_inbox).await;
    assert_eq!(to, host);
    let outbound_id = match inbound {
        Payload::Plaintext(m) => {
            assert_eq!(m.text, "text of v-1");
            assert_eq!(m.in_reply_to, None);
            m.message_id
        }
        other => panic!("Expected plaintext, got {:?}", other),
    };

    // Telegram confirms delivery to the host; the guest learns about it.
    let delivered_at = Utc::now();
    relay
        .submit(Command::Acknowledge {
            origin: host.clone(),
            locale: Locale::En,
            ack: MessageAck {
                message_id: outbound_id.clone(),
                destination_message_id: "tg-555".to_string(),
                delivered_at,
            },
        })
        .await;
    let (to, ack) = next(&mut ws_inbox).await;
    assert_eq!(to, guest);
    assert_eq!(ack, Payload::ack("v-1", outbound_id.clone(), delivered_at));

    // Host replies to that message.
    relay
        .submit(message(&host, "operator", "h-1", Some(outbound_id)))
        .await;
    let (to, reply) = next(&mut ws_inbox).await;
    assert_eq!(to, guest);
    match reply {
        Payload::Plaintext(m) => {
            assert_eq!(m.text, "text of h-1");
            assert_eq!(m.in_reply_to.as_deref(), Some("v-1"));
        }
        other => panic!("Expected plaintext, got {:?}", other),
    }

    drop(relay);
    log.await.unwrap();
}

#[tokio::test]
async fn test_failed_delivery_does_not_undo_routing() {
    let relay = Relay::new(InMemoryChannels::new(), &Config::default());
    let (tg, mut tg_inbox) = forwarding("tg");
    let ws = Arc::new(Closed {
        id: ConnectorId::new("ws").unwrap(),
        attempts: Mutex::new(0),
    });
    relay.register(tg);
    relay.register(ws.clone());

    let host = Route::new("tg", "100").unwrap();
    let guest = Route::new("ws", "session-7").unwrap();
    relay.submit(command(&host, "operator", "/host support_desk")).await;
    let reports = relay.submit(command(&guest, "visitor", "/join support_desk")).await;

    // The joining guest's socket is gone, the host still hears about it.
    assert_eq!(reports.len(), 2);
    assert!(!reports[0].is_delivered());
    assert!(reports[1].is_delivered());
    assert_eq!(*ws.attempts.lock().unwrap(), 1);

    next(&mut tg_inbox).await;
    let (to, _) = next(&mut tg_inbox).await;
    assert_eq!(to, host);
}

#[tokio::test]
async fn test_reconnecting_guest_gets_history() {
    let mut config = Config::default();
    config.metrics.enabled = false;
    kite_relay::init(&config).unwrap();

    let relay = Relay::new(InMemoryChannels::new(), &config);
    let (tg, mut tg_inbox) = forwarding("tg");
    let (ws, mut ws_inbox) = forwarding("ws");
    relay.register(tg);
    relay.register(ws);
    let listeners = relay.spawn_listeners();
    assert_eq!(listeners.len(), 2);

    let host = Route::new("tg", "100").unwrap();
    let first = Route::new("ws", "session-7").unwrap();
    relay.submit(command(&host, "operator", "/host support_desk")).await;
    relay.submit(command(&first, "visitor", "/join support_desk")).await;
    next(&mut ws_inbox).await;

    relay.submit(message(&first, "visitor", "v-1", None)).await;
    let (_, inbound) = next(&mut tg_inbox).await;
    let outbound_id = inbound_id(inbound);
    relay
        .submit(message(&host, "operator", "h-1", Some(outbound_id)))
        .await;
    next(&mut ws_inbox).await;

    relay.submit(command(&first, "visitor", "/leave")).await;
    next(&mut ws_inbox).await;

    // Same guest, new socket.
    let second = Route::new("ws", "session-8").unwrap();
    relay.submit(command(&second, "visitor", "/join support_desk")).await;

    let mut replayed = Vec::new();
    let mut notices = 0;
    for _ in 0..3 {
        let (to, payload) = next(&mut ws_inbox).await;
        assert_eq!(to, second);
        match payload {
            Payload::Plaintext(m) => replayed.push(m.message_id),
            Payload::Notification(_) => notices += 1,
            other => panic!("Unexpected {:?}", other),
        }
    }
    replayed.sort();
    assert_eq!(replayed, ["h-1", "v-1"]);
    assert_eq!(notices, 1);

    drop(relay);
    for handle in listeners {
        handle.await.unwrap();
    }
}

fn inbound_id(payload: Payload) -> String {
    match payload {
        Payload::Plaintext(m) => m.message_id,
        other => panic!("Expected plaintext, got {:?}", other),
    }
}
