//! Commands connectors hand to the router.
//!
//! Commands are inert data. Each one carries the route it arrived on and the
//! locale of the member behind that route.

use kite_protocol::{MessageAck, MessagePayload};

use crate::channel::ChannelName;
use crate::l10n::Locale;
use crate::member::MemberId;
use crate::route::Route;

/// A unit of work for the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Forward a member message to the other side of its channel.
    RouteMessage {
        origin: Route,
        locale: Locale,
        member_id: MemberId,
        payload: MessagePayload,
        /// Explicit recipient, used by hosts that pick a guest directly.
        to_member: Option<MemberId>,
    },

    /// A textual command typed by a user, such as `/join support_desk`.
    ExecuteCommand {
        origin: Route,
        locale: Locale,
        member_id: MemberId,
        member_name: Option<String>,
        /// Lowercased command name without the leading `/`.
        command: String,
        args: Option<String>,
    },

    Info {
        origin: Route,
        locale: Locale,
        member_id: MemberId,
    },

    HostChannel {
        origin: Route,
        locale: Locale,
        channel_name: ChannelName,
        host_id: MemberId,
        host_name: Option<String>,
    },

    DropChannel {
        origin: Route,
        locale: Locale,
        host_id: MemberId,
    },

    Join {
        origin: Route,
        locale: Locale,
        channel_name: ChannelName,
        member_id: MemberId,
        member_name: Option<String>,
    },

    Leave {
        origin: Route,
        locale: Locale,
    },

    /// The recipient's connector confirmed delivery of a routed message.
    Acknowledge {
        origin: Route,
        locale: Locale,
        ack: MessageAck,
    },
}

impl Command {
    /// Build an [`Command::ExecuteCommand`] from raw user text.
    ///
    /// Returns `None` when the text holds no command name.
    #[must_use]
    pub fn execute(
        origin: Route,
        locale: Locale,
        member_id: MemberId,
        member_name: Option<String>,
        text: &str,
    ) -> Option<Self> {
        let (command, args) = parse_command(text)?;
        Some(Command::ExecuteCommand {
            origin,
            locale,
            member_id,
            member_name,
            command,
            args,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &Route {
        match self {
            Command::RouteMessage { origin, .. }
            | Command::ExecuteCommand { origin, .. }
            | Command::Info { origin, .. }
            | Command::HostChannel { origin, .. }
            | Command::DropChannel { origin, .. }
            | Command::Join { origin, .. }
            | Command::Leave { origin, .. }
            | Command::Acknowledge { origin, .. } => origin,
        }
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        match self {
            Command::RouteMessage { locale, .. }
            | Command::ExecuteCommand { locale, .. }
            | Command::Info { locale, .. }
            | Command::HostChannel { locale, .. }
            | Command::DropChannel { locale, .. }
            | Command::Join { locale, .. }
            | Command::Leave { locale, .. }
            | Command::Acknowledge { locale, .. } => *locale,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Command::RouteMessage { .. } => "route_message",
            Command::ExecuteCommand { .. } => "execute_command",
            Command::Info { .. } => "info",
            Command::HostChannel { .. } => "host_channel",
            Command::DropChannel { .. } => "drop_channel",
            Command::Join { .. } => "join",
            Command::Leave { .. } => "leave",
            Command::Acknowledge { .. } => "acknowledge",
        }
    }
}

/// Split user text into a lowercased command name and its argument.
///
/// Accepts an optional leading `/` and a Telegram `@botname` suffix:
/// `/Join@kite_bot support_desk` gives `("join", Some("support_desk"))`.
#[must_use]
pub fn parse_command(text: &str) -> Option<(String, Option<String>)> {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    let command = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if command.is_empty() {
        return None;
    }

    let args = (!rest.is_empty()).then(|| rest.to_string());
    Some((command, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/join support_desk"),
            Some(("join".to_string(), Some("support_desk".to_string())))
        );
        assert_eq!(
            parse_command("  /Host@kite_bot   support_desk  "),
            Some(("host".to_string(), Some("support_desk".to_string())))
        );
        assert_eq!(parse_command("leave"), Some(("leave".to_string(), None)));
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_command_accessors() {
        let origin = Route::new("tg", "100").unwrap();
        let cmd = Command::execute(
            origin.clone(),
            Locale::Uk,
            MemberId::new("100").unwrap(),
            None,
            "/info",
        )
        .unwrap();

        assert_eq!(cmd.origin(), &origin);
        assert_eq!(cmd.locale(), Locale::Uk);
        assert_eq!(cmd.kind(), "execute_command");
    }
}
