//! Connector abstraction and delivery fan-out.
//!
//! A connector is a transport adapter (Telegram, WebSocket, ...). The router
//! never talks to connectors directly: it returns [`Delivery`] values and the
//! caller hands them to [`Connectors::deliver`].

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use kite_protocol::Payload;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::route::{ConnectorId, Route};

/// Delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No connector is registered for the route's prefix.
    #[error("No connector registered for {0}")]
    UnknownConnector(ConnectorId),

    /// The endpoint is gone, such as a closed socket or a blocked bot.
    #[error("Route {0} is unreachable")]
    Unreachable(Route),

    /// Transport-specific failure.
    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// A transport adapter that can deliver payloads to its routes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable short identifier, the prefix of every route this connector serves.
    fn id(&self) -> &ConnectorId;

    /// Deliver one payload to one route.
    ///
    /// Failures are reported, not retried; retry policy belongs to the
    /// connector.
    async fn dispatch(&self, route: &Route, payload: &Payload) -> Result<(), DeliveryError>;
}

/// One payload addressed to one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub route: Route,
    pub payload: Payload,
}

impl Delivery {
    #[must_use]
    pub fn new(route: Route, payload: Payload) -> Self {
        Self { route, payload }
    }
}

/// Outcome of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub route: Route,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryReport {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Registry of connectors keyed by id.
#[derive(Default)]
pub struct Connectors {
    connectors: DashMap<ConnectorId, Arc<dyn Connector>>,
}

impl Connectors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector, replacing any previous one with the same id.
    pub fn register(&self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        let id = connector.id().clone();
        info!(connector = %id, "Connector registered");
        self.connectors.insert(id, connector)
    }

    pub fn unregister(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>> {
        self.connectors.remove(id).map(|(_, c)| c)
    }

    #[must_use]
    pub fn get(&self, id: &ConnectorId) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).map(|c| Arc::clone(c.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Deliver every payload concurrently.
    ///
    /// Each delivery succeeds or fails on its own; the reports come back in
    /// the order of `deliveries`.
    pub async fn deliver(&self, deliveries: Vec<Delivery>) -> Vec<DeliveryReport> {
        let sends = deliveries.into_iter().map(|delivery| {
            let connector = self.get(delivery.route.connector());
            async move {
                let result = match connector {
                    Some(connector) => connector.dispatch(&delivery.route, &delivery.payload).await,
                    None => Err(DeliveryError::UnknownConnector(
                        delivery.route.connector().clone(),
                    )),
                };
                match &result {
                    Ok(()) => debug!(route = %delivery.route, "Delivered"),
                    Err(e) => warn!(route = %delivery.route, error = %e, "Delivery failed"),
                }
                DeliveryReport {
                    route: delivery.route,
                    result,
                }
            }
        });

        join_all(sends).await
    }
}

impl std::fmt::Debug for Connectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connectors")
            .field(
                "ids",
                &self
                    .connectors
                    .iter()
                    .map(|e| e.key().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        id: ConnectorId,
        sent: Mutex<Vec<(Route, Payload)>>,
        fail_on: Option<String>,
    }

    impl Recording {
        fn new(id: &str, fail_on: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectorId::new(id).unwrap(),
                sent: Mutex::new(Vec::new()),
                fail_on: fail_on.map(str::to_string),
            })
        }
    }

    #[async_trait]
    impl Connector for Recording {
        fn id(&self) -> &ConnectorId {
            &self.id
        }

        async fn dispatch(&self, route: &Route, payload: &Payload) -> Result<(), DeliveryError> {
            if self.fail_on.as_deref() == Some(route.raw()) {
                return Err(DeliveryError::Unreachable(route.clone()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((route.clone(), payload.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let tg = Recording::new("tg", Some("blocked"));
        let connectors = Connectors::new();
        connectors.register(tg.clone());

        let payload = Payload::plaintext("m", "hi");
        let reports = connectors
            .deliver(vec![
                Delivery::new(Route::new("tg", "1").unwrap(), payload.clone()),
                Delivery::new(Route::new("tg", "blocked").unwrap(), payload.clone()),
                Delivery::new(Route::new("ws", "s1").unwrap(), payload.clone()),
                Delivery::new(Route::new("tg", "2").unwrap(), payload.clone()),
            ])
            .await;

        assert_eq!(reports.len(), 4);
        assert!(reports[0].is_delivered());
        assert!(matches!(
            reports[1].result,
            Err(DeliveryError::Unreachable(_))
        ));
        assert!(matches!(
            reports[2].result,
            Err(DeliveryError::UnknownConnector(_))
        ));
        assert!(reports[3].is_delivered());
        assert_eq!(tg.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_register_replaces() {
        let connectors = Connectors::new();
        assert!(connectors.register(Recording::new("tg", None)).is_none());
        assert!(connectors.register(Recording::new("tg", None)).is_some());
        assert_eq!(connectors.len(), 1);

        let id = ConnectorId::new("tg").unwrap();
        assert!(connectors.unregister(&id).is_some());
        assert!(connectors.is_empty());
    }
}
