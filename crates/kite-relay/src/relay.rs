//! The relay facade used by connectors.
//!
//! A connector turns inbound traffic into a [`Command`] and calls
//! [`Relay::submit`]. The relay runs it through the router, publishes the
//! resulting events and hands the deliveries to the registered connectors.

use kite_core::{
    Channels, Command, Connector, Connectors, DeliveryReport, Dispatch, Event, EventBus, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::history::History;
use crate::listener;
use crate::metrics;

/// Router, connectors and event bus wired together.
pub struct Relay<R> {
    router: Router<R>,
    connectors: Arc<Connectors>,
    events: EventBus,
    history: Option<Arc<History>>,
    replay_limit: usize,
}

impl<R: Channels> Relay<R> {
    /// Create a relay over `channels` configured by `config`.
    #[must_use]
    pub fn new(channels: R, config: &Config) -> Self {
        let history = config
            .history
            .enabled
            .then(|| Arc::new(History::new(config.history.capacity)));
        Self {
            router: Router::with_config(channels, config.router_config()),
            connectors: Arc::new(Connectors::new()),
            events: EventBus::with_capacity(config.events.capacity),
            history,
            replay_limit: config.history.replay_limit,
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router<R> {
        &self.router
    }

    #[must_use]
    pub fn connectors(&self) -> &Arc<Connectors> {
        &self.connectors
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a connector for its route prefix.
    pub fn register(&self, connector: Arc<dyn Connector>) {
        self.connectors.register(connector);
    }

    /// Message history, unless disabled in the configuration.
    #[must_use]
    pub fn history(&self) -> Option<&Arc<History>> {
        self.history.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.events.subscribe()
    }

    /// Start the background event listeners: the event log and, if enabled,
    /// the message history.
    ///
    /// They stop once the relay is dropped.
    pub fn spawn_listeners(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![listener::spawn_event_log(&self.events)];
        if let Some(history) = &self.history {
            handles.push(listener::spawn_history(
                &self.events,
                history.clone(),
                self.connectors.clone(),
                self.replay_limit,
            ));
        }
        handles
    }

    /// Handle one command end to end.
    ///
    /// Errors become an `ErrorResponse` to the command's origin, so the
    /// returned reports always describe what reached the connectors.
    pub async fn submit(&self, command: Command) -> Vec<DeliveryReport> {
        let started = Instant::now();
        let kind = command.kind();
        metrics::record_command(kind);

        let (dispatch, err) = self.router.handle_detailed(command).await;
        if let Some(err) = &err {
            metrics::record_error(err);
        }

        let Dispatch { deliveries, events } = dispatch;
        for event in &events {
            match event {
                Event::MessageRouted { direction, .. } => metrics::record_routed(*direction),
                Event::ChannelDropped { .. } => metrics::record_channel_dropped(),
                _ => {}
            }
        }
        self.events.publish_all(events);

        let reports = self.connectors.deliver(deliveries).await;
        metrics::record_deliveries(&reports);

        let elapsed = started.elapsed();
        metrics::record_latency(elapsed.as_secs_f64());
        debug!(
            command = kind,
            deliveries = reports.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Command submitted"
        );

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kite_core::{ConnectorId, DeliveryError, InMemoryChannels, Locale, MemberId, Route};
    use kite_protocol::Payload;
    use std::sync::Mutex;

    struct Outbox {
        id: ConnectorId,
        sent: Mutex<Vec<(Route, Payload)>>,
    }

    #[async_trait]
    impl Connector for Outbox {
        fn id(&self) -> &ConnectorId {
            &self.id
        }

        async fn dispatch(&self, route: &Route, payload: &Payload) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((route.clone(), payload.clone()));
            Ok(())
        }
    }

    fn relay() -> (Relay<InMemoryChannels>, Arc<Outbox>) {
        let relay = Relay::new(InMemoryChannels::new(), &Config::default());
        let outbox = Arc::new(Outbox {
            id: ConnectorId::new("tg").unwrap(),
            sent: Mutex::new(Vec::new()),
        });
        relay.register(outbox.clone());
        (relay, outbox)
    }

    fn text(raw: &str, member: &str, line: &str) -> Command {
        Command::execute(
            Route::new("tg", raw).unwrap(),
            Locale::En,
            MemberId::new(member).unwrap(),
            None,
            line,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_publishes_and_delivers() {
        let (relay, outbox) = relay();
        let mut events = relay.subscribe();

        let reports = relay.submit(text("100", "host", "/host support_desk")).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_delivered());

        assert_eq!(events.recv().await.unwrap().name(), "channel_created");
        assert_eq!(events.recv().await.unwrap().name(), "member_created");
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_goes_back_to_origin() {
        let (relay, outbox) = relay();

        let reports = relay.submit(text("100", "host", "/join missing_channel")).await;
        assert_eq!(reports.len(), 1);

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent[0].0, Route::new("tg", "100").unwrap());
        assert!(matches!(&sent[0].1, Payload::Error(e) if e.code == 404));
    }

    #[tokio::test]
    async fn test_history_can_be_disabled() {
        let mut config = Config::default();
        config.history.enabled = false;
        let relay = Relay::new(InMemoryChannels::new(), &config);
        assert!(relay.history().is_none());

        let listeners = relay.spawn_listeners();
        assert_eq!(listeners.len(), 1);
        drop(relay);
        for handle in listeners {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unregistered_connector_is_reported() {
        let (relay, _outbox) = relay();
        let command = Command::execute(
            Route::new("ws", "session-1").unwrap(),
            Locale::En,
            MemberId::new("visitor").unwrap(),
            None,
            "/help",
        )
        .unwrap();

        let reports = relay.submit(command).await;
        assert!(matches!(
            reports[0].result,
            Err(DeliveryError::UnknownConnector(_))
        ));
    }
}
