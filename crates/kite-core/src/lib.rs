//! # kite-core
//!
//! Channel model, command interpreter and message correlation for the Kite
//! chat relay.
//!
//! A channel has one host and any number of guests. Guest messages go to the
//! host; host replies find their way back to the right guest through the
//! host's table of unanswered messages.
//!
//! - **Route** - Connector-qualified endpoint address
//! - **Channel** / **Member** - Aggregates and their invariants
//! - **Command** / **Event** - Router input and output
//! - **Router** - Interprets commands and computes deliveries
//! - **Channels** - Repository contract, with an in-memory implementation
//! - **Connectors** - Delivery fan-out to transport adapters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Command  ┌─────────────┐  save/find  ┌─────────────┐
//! │  Connector  │──────────▶│   Router    │────────────▶│  Channels   │
//! └─────────────┘           └─────────────┘             └─────────────┘
//!        ▲                     │        │
//!        │      Deliveries     │        │ Events
//!        └─────────────────────┘        ▼
//!                                ┌─────────────┐
//!                                │  EventBus   │
//!                                └─────────────┘
//! ```

pub mod channel;
pub mod command;
pub mod connector;
pub mod correlation;
pub mod error;
pub mod event;
pub mod ids;
pub mod l10n;
pub mod lock;
pub mod member;
pub mod repository;
pub mod route;
pub mod router;

pub use channel::{validate_channel_name, Channel, ChannelName, PendingAck};
pub use command::{parse_command, Command};
pub use connector::{Connector, Connectors, Delivery, DeliveryError, DeliveryReport};
pub use correlation::Correlations;
pub use error::{KiteError, Result};
pub use event::{Direction, Event, EventBus};
pub use l10n::Locale;
pub use member::{Member, MemberId, Unanswered};
pub use repository::{ChannelUpdate, Channels, InMemoryChannels};
pub use route::{ConnectorId, Route};
pub use router::{Dispatch, Router, RouterConfig};
