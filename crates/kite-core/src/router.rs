//! The Kite router.
//!
//! The router interprets commands, keeps channel and member state through a
//! [`Channels`] repository and works out who receives what. It performs no
//! network I/O: deliveries and events come back as data.
//!
//! Commands on the same channel are serialized through [`ChannelLocks`];
//! every command persists with a single repository call.

use chrono::Utc;
use kite_protocol::codec::{self, MAX_PAYLOAD_SIZE};
use kite_protocol::{MessageAck, MessagePayload, Payload, Severity};
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelName, PendingAck};
use crate::command::Command;
use crate::connector::Delivery;
use crate::error::{KiteError, Result};
use crate::event::{Direction, Event};
use crate::ids::generate_message_id;
use crate::l10n::{self, Locale};
use crate::lock::ChannelLocks;
use crate::member::{Member, MemberId};
use crate::repository::{ChannelUpdate, Channels};
use crate::route::Route;

/// Telegram deep-link prefix for hosting, as in `/start host__support_desk`.
const HOST_LINK_PREFIX: &str = "host__";

/// Telegram deep-link prefix for joining, as in `/start join__support_desk`.
const JOIN_LINK_PREFIX: &str = "join__";

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Unanswered guest messages remembered per host.
    pub unanswered_capacity: usize,
    /// Deliveries awaiting acknowledgement remembered per channel.
    pub pending_ack_capacity: usize,
    /// Public chat page; when set, new hosts get a link to their channel.
    pub channel_url: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            unanswered_capacity: 256,
            pending_ack_capacity: 1024,
            channel_url: None,
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub deliveries: Vec<Delivery>,
    pub events: Vec<Event>,
}

impl Dispatch {
    /// A dispatch with a single delivery and no events.
    #[must_use]
    pub fn reply(route: Route, payload: Payload) -> Self {
        Self {
            deliveries: vec![Delivery::new(route, payload)],
            events: Vec::new(),
        }
    }

    fn deliver(&mut self, route: Route, payload: Payload) {
        self.deliveries.push(Delivery::new(route, payload));
    }

    fn notify(&mut self, route: Route, text: impl Into<String>, severity: Severity) {
        self.deliver(route, Payload::notification(text, severity));
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Result of interpreting a textual command.
enum Interpreted {
    Command(Command),
    Reply(Payload),
}

/// The central router.
pub struct Router<R> {
    channels: R,
    locks: ChannelLocks,
    config: RouterConfig,
}

impl<R: Channels> Router<R> {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new(channels: R) -> Self {
        Self::with_config(channels, RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(channels: R, config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            channels,
            locks: ChannelLocks::new(),
            config,
        }
    }

    #[must_use]
    pub fn channels(&self) -> &R {
        &self.channels
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Handle a command on behalf of a connector.
    ///
    /// Never fails: an error becomes a single `ErrorResponse` delivered back
    /// to the command's origin.
    pub async fn handle(&self, command: Command) -> Dispatch {
        self.handle_detailed(command).await.0
    }

    /// Like [`Router::handle`], but also returns the error the reply was
    /// built from, if any.
    pub async fn handle_detailed(&self, command: Command) -> (Dispatch, Option<KiteError>) {
        let origin = command.origin().clone();
        let kind = command.kind();

        match self.dispatch(command).await {
            Ok(dispatch) => (dispatch, None),
            Err(err) => {
                match &err {
                    KiteError::Internal(_) => {
                        error!(command = kind, route = %origin, error = %err, "Command failed")
                    }
                    _ => warn!(command = kind, route = %origin, error = %err, "Command rejected"),
                }
                (Dispatch::reply(origin, err.to_payload()), Some(err))
            }
        }
    }

    /// Execute a command.
    ///
    /// # Errors
    ///
    /// Returns a validation, conflict, not found or routing error when the
    /// command cannot be carried out; nothing is persisted in that case.
    pub async fn dispatch(&self, command: Command) -> Result<Dispatch> {
        let command = match command {
            Command::ExecuteCommand {
                origin,
                locale,
                member_id,
                member_name,
                command,
                args,
            } => match self.interpret(
                origin.clone(),
                locale,
                member_id,
                member_name,
                &command,
                args.as_deref(),
            )? {
                Interpreted::Command(command) => command,
                Interpreted::Reply(payload) => return Ok(Dispatch::reply(origin, payload)),
            },
            other => other,
        };

        debug!(command = command.kind(), route = %command.origin(), "Dispatching");

        match self.lock_key(&command).await? {
            Some(name) => {
                let _guard = self.locks.lock(&name).await;
                self.execute(command, Some(&name)).await
            }
            None => self.execute(command, None).await,
        }
    }

    fn interpret(
        &self,
        origin: Route,
        locale: Locale,
        member_id: MemberId,
        member_name: Option<String>,
        command: &str,
        args: Option<&str>,
    ) -> Result<Interpreted> {
        let host = |channel_name: ChannelName, host_id, host_name| {
            Interpreted::Command(Command::HostChannel {
                origin: origin.clone(),
                locale,
                channel_name,
                host_id,
                host_name,
            })
        };
        let join = |channel_name: ChannelName, member_id, member_name| {
            Interpreted::Command(Command::Join {
                origin: origin.clone(),
                locale,
                channel_name,
                member_id,
                member_name,
            })
        };

        let interpreted = match command {
            "help" => Interpreted::Reply(Payload::notification(l10n::help(locale), Severity::None)),
            "info" => Interpreted::Command(Command::Info {
                origin: origin.clone(),
                locale,
                member_id,
            }),
            "host" => host(channel_arg(args)?, member_id, member_name),
            "join" => join(channel_arg(args)?, member_id, member_name),
            "leave" => Interpreted::Command(Command::Leave {
                origin: origin.clone(),
                locale,
            }),
            "drop" => Interpreted::Command(Command::DropChannel {
                origin: origin.clone(),
                locale,
                host_id: member_id,
            }),
            "start" => match args {
                None => {
                    Interpreted::Reply(Payload::notification(l10n::help(locale), Severity::None))
                }
                Some(link) => {
                    if let Some(name) = link.strip_prefix(HOST_LINK_PREFIX) {
                        host(deep_link_channel(name)?, member_id, member_name)
                    } else if let Some(name) = link.strip_prefix(JOIN_LINK_PREFIX) {
                        join(deep_link_channel(name)?, member_id, member_name)
                    } else {
                        join(ChannelName::new(link)?, member_id, member_name)
                    }
                }
            },
            other => Interpreted::Reply(Payload::error(l10n::unknown_command(locale, other), 400)),
        };

        Ok(interpreted)
    }

    /// Channel a command mutates, resolved before locking.
    async fn lock_key(&self, command: &Command) -> Result<Option<ChannelName>> {
        let key = match command {
            Command::HostChannel { channel_name, .. } | Command::Join { channel_name, .. } => {
                Some(channel_name.clone())
            }
            Command::DropChannel { host_id, .. } => self
                .channels
                .find_hosted_by(host_id)
                .await?
                .map(|c| c.name),
            Command::Leave { origin, .. }
            | Command::RouteMessage { origin, .. }
            | Command::Acknowledge { origin, .. } => self
                .channels
                .find_member_by_connection(origin)
                .await?
                .map(|m| m.channel_name),
            Command::Info { .. } | Command::ExecuteCommand { .. } => None,
        };
        Ok(key)
    }

    async fn execute(&self, command: Command, locked: Option<&ChannelName>) -> Result<Dispatch> {
        match command {
            Command::HostChannel {
                origin,
                locale,
                channel_name,
                host_id,
                host_name,
            } => {
                self.host_channel(origin, locale, channel_name, host_id, host_name)
                    .await
            }
            Command::DropChannel {
                origin,
                locale,
                host_id,
            } => self.drop_channel(origin, locale, host_id, locked).await,
            Command::Join {
                origin,
                locale,
                channel_name,
                member_id,
                member_name,
            } => {
                self.join(origin, locale, channel_name, member_id, member_name)
                    .await
            }
            Command::Leave { origin, locale } => self.leave(origin, locale, locked).await,
            Command::RouteMessage {
                origin,
                member_id,
                payload,
                to_member,
                ..
            } => {
                self.route_message(origin, member_id, payload, to_member, locked)
                    .await
            }
            Command::Acknowledge { origin, ack, .. } => {
                self.acknowledge(origin, ack, locked).await
            }
            Command::Info {
                origin,
                locale,
                member_id,
            } => self.info(origin, locale, member_id).await,
            Command::ExecuteCommand { command, .. } => Err(KiteError::validation(format!(
                "Command /{command} cannot be nested"
            ))),
        }
    }

    async fn host_channel(
        &self,
        origin: Route,
        locale: Locale,
        channel_name: ChannelName,
        host_id: MemberId,
        host_name: Option<String>,
    ) -> Result<Dispatch> {
        let mut dispatch = Dispatch::default();

        match self.channels.find_by_name(&channel_name).await? {
            Some(mut channel) if channel.is_hosted_by(&host_id) => {
                let mut host = self
                    .channels
                    .find_member(&channel_name, &host_id)
                    .await?
                    .ok_or_else(|| {
                        KiteError::internal(format!("host of channel {channel_name} is missing"))
                    })?;
                host.connect(origin.clone());
                if let Some(name) = host_name.filter(|n| !n.trim().is_empty()) {
                    host.user_name = name;
                }
                host.unanswered.set_capacity(self.config.unanswered_capacity);
                channel
                    .pending_acks
                    .set_capacity(self.config.pending_ack_capacity);

                let channel = self
                    .channels
                    .save(ChannelUpdate::new(channel, vec![host]))
                    .await?;
                info!(channel = %channel_name, route = %origin, "Channel rehosted");

                dispatch.emit(Event::ChannelUpdated { channel });
                dispatch.notify(
                    origin,
                    l10n::channel_rehosted(locale, channel_name.as_str()),
                    Severity::Ok,
                );
            }
            Some(_) => return Err(KiteError::conflict("Channel name is already taken")),
            None => {
                if self.channels.find_hosted_by(&host_id).await?.is_some() {
                    return Err(KiteError::conflict("You cannot host more than one channel"));
                }
                self.ensure_route_free(&origin).await?;

                let channel = Channel::new(
                    channel_name.clone(),
                    host_id.clone(),
                    self.config.pending_ack_capacity,
                );
                let host = Member::host(
                    host_id,
                    channel_name.clone(),
                    host_name,
                    origin.clone(),
                    self.config.unanswered_capacity,
                );

                let channel = self
                    .channels
                    .save(ChannelUpdate::new(channel, vec![host.clone()]))
                    .await?;
                info!(channel = %channel_name, host = %host.id, "Channel created");

                dispatch.emit(Event::ChannelCreated { channel });
                dispatch.emit(Event::MemberCreated { member: host });
                dispatch.notify(
                    origin,
                    l10n::channel_created(
                        locale,
                        channel_name.as_str(),
                        self.config.channel_url.as_deref(),
                    ),
                    Severity::Ok,
                );
            }
        }

        Ok(dispatch)
    }

    async fn drop_channel(
        &self,
        origin: Route,
        locale: Locale,
        host_id: MemberId,
        locked: Option<&ChannelName>,
    ) -> Result<Dispatch> {
        let channel = self
            .channels
            .find_hosted_by(&host_id)
            .await?
            .ok_or_else(|| KiteError::not_found("You don't host any channels to drop"))?;
        ensure_locked(locked, &channel.name)?;

        let members = self.channels.delete(&channel.name).await?;
        info!(channel = %channel.name, members = members.len(), "Channel dropped");

        let mut dispatch = Dispatch::default();
        dispatch.emit(Event::ChannelDropped {
            channel_name: channel.name.clone(),
        });
        for member in &members {
            dispatch.emit(Event::MemberDeleted {
                channel_name: channel.name.clone(),
                member_id: member.id.clone(),
            });
            if let (false, Some(route)) = (member.is_host, member.connection.clone()) {
                dispatch.notify(
                    route,
                    l10n::channel_closed(locale, channel.name.as_str()),
                    Severity::Warn,
                );
            }
        }
        dispatch.notify(
            origin,
            l10n::channel_dropped(locale, channel.name.as_str()),
            Severity::Ok,
        );

        Ok(dispatch)
    }

    async fn join(
        &self,
        origin: Route,
        locale: Locale,
        channel_name: ChannelName,
        member_id: MemberId,
        member_name: Option<String>,
    ) -> Result<Dispatch> {
        let mut channel = self
            .channels
            .find_by_name(&channel_name)
            .await?
            .ok_or_else(|| KiteError::not_found(format!("Channel {channel_name} not found")))?;

        if channel.is_hosted_by(&member_id) {
            return Err(KiteError::conflict(format!(
                "You are the host of channel {channel_name} and cannot join it"
            )));
        }
        if let Some(bound) = self.channels.find_member_by_connection(&origin).await? {
            if bound.channel_name != channel_name || bound.id != member_id {
                return Err(KiteError::conflict(format!(
                    "You are already in channel {}, /leave it first",
                    bound.channel_name
                )));
            }
        }

        let host = self
            .channels
            .find_member(&channel_name, &channel.host_id)
            .await?;

        let mut dispatch = Dispatch::default();
        let member = match self.channels.find_member(&channel_name, &member_id).await? {
            Some(mut member) => {
                member.connect(origin.clone());
                if let Some(name) = member_name.filter(|n| !n.trim().is_empty()) {
                    member.user_name = name;
                }
                self.channels
                    .save(ChannelUpdate::new(channel, vec![member.clone()]))
                    .await?;
                debug!(channel = %channel_name, member = %member.id, "Member reconnected");
                member
            }
            None => {
                let member = Member::guest(member_id, channel_name.clone(), member_name, origin.clone());
                channel.add_member(member.id.clone());
                self.channels
                    .save(ChannelUpdate::new(channel, vec![member.clone()]))
                    .await?;
                info!(channel = %channel_name, member = %member.id, "Member joined");
                dispatch.emit(Event::MemberCreated {
                    member: member.clone(),
                });
                member
            }
        };

        dispatch.emit(Event::MemberConnected {
            channel_name: channel_name.clone(),
            member_id: member.id.clone(),
            route: origin.clone(),
        });
        dispatch.notify(
            origin,
            l10n::you_joined(locale, channel_name.as_str()),
            Severity::Ok,
        );
        if let Some(route) = host.and_then(|h| h.connection) {
            dispatch.notify(
                route,
                l10n::guest_joined(locale, &member.user_name, channel_name.as_str()),
                Severity::None,
            );
        }

        Ok(dispatch)
    }

    async fn leave(
        &self,
        origin: Route,
        locale: Locale,
        locked: Option<&ChannelName>,
    ) -> Result<Dispatch> {
        let Some(mut member) = self.channels.find_member_by_connection(&origin).await? else {
            return Ok(Dispatch::reply(
                origin,
                Payload::notification(l10n::not_joined(locale), Severity::Warn),
            ));
        };
        ensure_locked(locked, &member.channel_name)?;

        let channel = self.load_channel(&member.channel_name).await?;
        let host = if member.is_host {
            None
        } else {
            self.channels
                .find_member(&channel.name, &channel.host_id)
                .await?
        };

        member.disconnect();
        self.channels
            .save(ChannelUpdate::new(channel, vec![member.clone()]))
            .await?;
        info!(channel = %member.channel_name, member = %member.id, "Member left");

        let mut dispatch = Dispatch::default();
        dispatch.emit(Event::MemberDisconnected {
            channel_name: member.channel_name.clone(),
            member_id: member.id.clone(),
            route: origin.clone(),
        });
        dispatch.notify(
            origin,
            l10n::you_left(locale, member.channel_name.as_str()),
            Severity::Ok,
        );
        if let Some(route) = host.and_then(|h| h.connection) {
            dispatch.notify(
                route,
                l10n::guest_left(locale, &member.user_name, member.channel_name.as_str()),
                Severity::None,
            );
        }

        Ok(dispatch)
    }

    async fn route_message(
        &self,
        origin: Route,
        member_id: MemberId,
        payload: MessagePayload,
        to_member: Option<MemberId>,
        locked: Option<&ChannelName>,
    ) -> Result<Dispatch> {
        let sender = self
            .channels
            .find_member_by_connection(&origin)
            .await?
            .ok_or_else(|| KiteError::not_found("You are not joined to any channel"))?;
        ensure_locked(locked, &sender.channel_name)?;

        if sender.id != member_id {
            return Err(KiteError::conflict(format!(
                "You need to /join {}",
                sender.channel_name
            )));
        }

        let channel = self.load_channel(&sender.channel_name).await?;
        if sender.is_host {
            self.route_to_guest(channel, sender, payload, to_member).await
        } else {
            self.route_to_host(channel, sender, payload).await
        }
    }

    async fn route_to_host(
        &self,
        mut channel: Channel,
        mut guest: Member,
        payload: MessagePayload,
    ) -> Result<Dispatch> {
        let offline = || {
            KiteError::not_found(format!(
                "Host of channel {} is not connected",
                channel.name
            ))
        };
        let mut host = self
            .channels
            .find_member(&channel.name, &channel.host_id)
            .await?
            .ok_or_else(offline)?;
        let route = host.connection.clone().ok_or_else(offline)?;

        let outbound_id = generate_message_id();
        let outbound: Payload = payload
            .clone()
            .with_message_id(outbound_id.clone())
            .with_in_reply_to(None)
            .into();
        ensure_deliverable(&outbound)?;

        host.record_unanswered(outbound_id.clone(), guest.id.clone(), payload.message_id());
        host.peer = Some(guest.id.clone());
        guest.touch(payload.message_id(), Utc::now());
        channel.track_delivery(
            outbound_id.clone(),
            PendingAck {
                sender: guest.id.clone(),
                sender_message_id: payload.message_id().to_string(),
                recipient: host.id.clone(),
            },
        );

        let channel_name = channel.name.clone();
        self.channels
            .save(ChannelUpdate::new(channel, vec![host, guest.clone()]))
            .await?;
        debug!(
            channel = %channel_name,
            guest = %guest.id,
            message = %outbound_id,
            "Routed guest message to host"
        );

        Ok(routed(
            channel_name,
            guest.id,
            Direction::GuestToHost,
            payload,
            Delivery::new(route, outbound),
        ))
    }

    async fn route_to_guest(
        &self,
        mut channel: Channel,
        mut host: Member,
        payload: MessagePayload,
        to_member: Option<MemberId>,
    ) -> Result<Dispatch> {
        let (guest_id, reply_to) = if let Some(to) = to_member {
            (to, None)
        } else if let Some(reference) = payload.in_reply_to() {
            let unanswered = host.resolve_reply(reference).ok_or_else(|| {
                KiteError::routing(format!(
                    "Message {reference} cannot be delivered: its sender is unknown"
                ))
            })?;
            (unanswered.guest.clone(), Some(unanswered.message_id.clone()))
        } else {
            let peer = host.peer.clone().ok_or_else(|| {
                KiteError::routing("Nobody to deliver to yet: no guest has written")
            })?;
            (peer, None)
        };

        if channel.is_hosted_by(&guest_id) {
            return Err(KiteError::routing("You cannot send a message to yourself"));
        }
        let guest = self
            .channels
            .find_member(&channel.name, &guest_id)
            .await?
            .ok_or_else(|| {
                KiteError::routing(format!(
                    "{guest_id} is not a member of channel {}",
                    channel.name
                ))
            })?;
        let route = guest
            .connection
            .clone()
            .ok_or_else(|| KiteError::routing(format!("{} is offline", guest.user_name)))?;

        let outbound_id = generate_message_id();
        let outbound: Payload = payload
            .clone()
            .with_message_id(outbound_id.clone())
            .with_in_reply_to(reply_to)
            .into();
        ensure_deliverable(&outbound)?;

        host.peer = Some(guest.id.clone());
        host.touch(payload.message_id(), Utc::now());
        channel.track_delivery(
            outbound_id.clone(),
            PendingAck {
                sender: host.id.clone(),
                sender_message_id: payload.message_id().to_string(),
                recipient: guest.id.clone(),
            },
        );

        let channel_name = channel.name.clone();
        self.channels
            .save(ChannelUpdate::new(channel, vec![host]))
            .await?;
        debug!(
            channel = %channel_name,
            guest = %guest.id,
            message = %outbound_id,
            "Routed host message to guest"
        );

        Ok(routed(
            channel_name,
            guest.id,
            Direction::HostToGuest,
            payload,
            Delivery::new(route, outbound),
        ))
    }

    async fn acknowledge(
        &self,
        origin: Route,
        ack: MessageAck,
        locked: Option<&ChannelName>,
    ) -> Result<Dispatch> {
        let mut recipient = self
            .channels
            .find_member_by_connection(&origin)
            .await?
            .ok_or_else(|| KiteError::not_found("You are not joined to any channel"))?;
        ensure_locked(locked, &recipient.channel_name)?;

        let mut channel = self.load_channel(&recipient.channel_name).await?;
        let pending = channel.take_pending(&ack.message_id).ok_or_else(|| {
            KiteError::routing(format!("Message {} is not awaiting delivery", ack.message_id))
        })?;
        if pending.recipient != recipient.id {
            return Err(KiteError::routing(format!(
                "Message {} was not delivered to you",
                ack.message_id
            )));
        }

        recipient.touch(ack.message_id.clone(), ack.delivered_at);
        let sender = self
            .channels
            .find_member(&channel.name, &pending.sender)
            .await?;
        self.channels
            .save(ChannelUpdate::new(channel, vec![recipient]))
            .await?;

        let mut dispatch = Dispatch::default();
        if let Some(route) = sender.and_then(|s| s.connection) {
            dispatch.deliver(
                route,
                Payload::ack(pending.sender_message_id, ack.message_id, ack.delivered_at),
            );
        }
        Ok(dispatch)
    }

    async fn info(&self, origin: Route, locale: Locale, member_id: MemberId) -> Result<Dispatch> {
        let member = match self.channels.find_member_by_connection(&origin).await? {
            Some(member) => Some(member),
            None => match self.channels.find_hosted_by(&member_id).await? {
                Some(channel) => self.channels.find_member(&channel.name, &member_id).await?,
                None => None,
            },
        };

        let text = match member {
            Some(m) if m.is_host => {
                let channel = self.load_channel(&m.channel_name).await?;
                l10n::info_host(
                    locale,
                    &m.user_name,
                    m.channel_name.as_str(),
                    channel.guests().count(),
                )
            }
            Some(m) => l10n::info_guest(locale, &m.user_name, m.channel_name.as_str()),
            None => l10n::info_anonymous(locale).to_string(),
        };

        Ok(Dispatch::reply(
            origin,
            Payload::notification(text, Severity::None),
        ))
    }

    /// Fail with a route-conflict if `route` already backs a member.
    async fn ensure_route_free(&self, route: &Route) -> Result<()> {
        match self.channels.find_member_by_connection(route).await? {
            Some(bound) => Err(KiteError::conflict(format!(
                "You are already in channel {}, /leave it first",
                bound.channel_name
            ))),
            None => Ok(()),
        }
    }

    async fn load_channel(&self, name: &ChannelName) -> Result<Channel> {
        self.channels
            .find_by_name(name)
            .await?
            .ok_or_else(|| KiteError::internal(format!("member references missing channel {name}")))
    }
}

fn routed(
    channel: ChannelName,
    guest: MemberId,
    direction: Direction,
    request: MessagePayload,
    delivery: Delivery,
) -> Dispatch {
    Dispatch {
        deliveries: vec![delivery.clone()],
        events: vec![Event::MessageRouted {
            channel,
            member: guest,
            direction,
            request,
            responses: vec![delivery],
        }],
    }
}

/// Refuse messages whose encoded form could not be read back by a peer.
fn ensure_deliverable(payload: &Payload) -> Result<()> {
    let size = codec::encode(payload)
        .map_err(|e| KiteError::internal(format!("cannot encode message: {e}")))?
        .len();
    if size > MAX_PAYLOAD_SIZE {
        return Err(KiteError::validation(format!(
            "Message is too large: {size} bytes, at most {MAX_PAYLOAD_SIZE} allowed"
        )));
    }
    Ok(())
}

/// The channel resolved under the lock must be the one that was locked.
fn ensure_locked(locked: Option<&ChannelName>, actual: &ChannelName) -> Result<()> {
    match locked {
        Some(name) if name == actual => Ok(()),
        _ => Err(KiteError::conflict(
            "Channel was modified concurrently, please retry",
        )),
    }
}

fn channel_arg(args: Option<&str>) -> Result<ChannelName> {
    let name = args
        .and_then(|a| a.split_whitespace().next())
        .ok_or_else(|| KiteError::validation("Channel name is required"))?;
    ChannelName::new(name)
}

fn deep_link_channel(name: &str) -> Result<ChannelName> {
    if name.contains("__") {
        return Err(KiteError::validation(
            "Joining on behalf of another member is not supported",
        ));
    }
    ChannelName::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryChannels;

    fn route(raw: &str) -> Route {
        Route::new("tg", raw).unwrap()
    }

    fn id(s: &str) -> MemberId {
        MemberId::new(s).unwrap()
    }

    fn text(origin: &str, member: &str, line: &str) -> Command {
        Command::execute(route(origin), Locale::En, id(member), None, line).unwrap()
    }

    fn only_notification(dispatch: &Dispatch) -> (&Route, &str, Severity) {
        assert_eq!(dispatch.deliveries.len(), 1, "{:?}", dispatch.deliveries);
        match &dispatch.deliveries[0].payload {
            Payload::Notification(n) => (&dispatch.deliveries[0].route, &n.text, n.severity),
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_help_and_start_without_args() {
        let router = Router::new(InMemoryChannels::new());

        for line in ["/help", "/start"] {
            let dispatch = router.dispatch(text("1", "1", line)).await.unwrap();
            let (to, body, _) = only_notification(&dispatch);
            assert_eq!(to, &route("1"));
            assert_eq!(body, l10n::help(Locale::En));
        }
    }

    #[tokio::test]
    async fn test_unknown_command_is_localized_error() {
        let router = Router::new(InMemoryChannels::new());
        let cmd = Command::execute(route("1"), Locale::Uk, id("1"), None, "/frobnicate").unwrap();

        let dispatch = router.dispatch(cmd).await.unwrap();
        assert_eq!(
            dispatch.deliveries[0].payload,
            Payload::error(l10n::unknown_command(Locale::Uk, "frobnicate"), 400)
        );
    }

    #[tokio::test]
    async fn test_textual_host_and_join() {
        let router = Router::new(InMemoryChannels::new());

        let created = router
            .dispatch(text("100", "host", "/host support_desk"))
            .await
            .unwrap();
        assert!(matches!(created.events[0], Event::ChannelCreated { .. }));

        let joined = router
            .dispatch(text("200", "guest", "/start join__support_desk"))
            .await
            .unwrap();
        assert!(joined
            .events
            .iter()
            .any(|e| matches!(e, Event::MemberCreated { .. })));
        assert_eq!(joined.deliveries.len(), 2);
    }

    #[tokio::test]
    async fn test_start_host_link() {
        let router = Router::new(InMemoryChannels::new());
        let dispatch = router
            .dispatch(text("100", "host", "/start host__support_desk"))
            .await
            .unwrap();
        assert!(matches!(dispatch.events[0], Event::ChannelCreated { .. }));
    }

    #[tokio::test]
    async fn test_join_as_other_member_rejected() {
        let router = Router::new(InMemoryChannels::new());
        let err = router
            .dispatch(text("200", "guest", "/start join__support_desk__victim"))
            .await
            .unwrap_err();
        assert!(matches!(err, KiteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_channel_argument() {
        let router = Router::new(InMemoryChannels::new());
        let err = router
            .dispatch(text("100", "host", "/host"))
            .await
            .unwrap_err();
        assert_eq!(err, KiteError::validation("Channel name is required"));
    }

    #[tokio::test]
    async fn test_leave_when_not_joined_is_warning() {
        let router = Router::new(InMemoryChannels::new());
        let dispatch = router
            .dispatch(text("300", "nobody", "/leave"))
            .await
            .unwrap();
        let (_, body, severity) = only_notification(&dispatch);
        assert_eq!(body, l10n::not_joined(Locale::En));
        assert_eq!(severity, Severity::Warn);
    }

    #[tokio::test]
    async fn test_info_anonymous() {
        let router = Router::new(InMemoryChannels::new());
        let dispatch = router
            .dispatch(text("300", "nobody", "/info"))
            .await
            .unwrap();
        let (_, body, _) = only_notification(&dispatch);
        assert_eq!(body, l10n::info_anonymous(Locale::En));
    }

    #[tokio::test]
    async fn test_handle_converts_errors() {
        let router = Router::new(InMemoryChannels::new());
        let dispatch = router
            .handle(text("300", "nobody", "/join missing_channel"))
            .await;

        assert!(dispatch.events.is_empty());
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(dispatch.deliveries[0].route, route("300"));
        assert!(matches!(
            &dispatch.deliveries[0].payload,
            Payload::Error(e) if e.code == 404
        ));
    }

    #[tokio::test]
    async fn test_handle_detailed_reports_error() {
        let router = Router::new(InMemoryChannels::new());

        let (dispatch, err) = router
            .handle_detailed(text("300", "nobody", "/drop"))
            .await;
        assert!(matches!(err, Some(KiteError::NotFound(_))));
        assert!(matches!(
            &dispatch.deliveries[0].payload,
            Payload::Error(e) if e.code == 404
        ));

        let (_, err) = router.handle_detailed(text("300", "nobody", "/help")).await;
        assert!(err.is_none());
    }

    #[test]
    fn test_oversize_payload_not_deliverable() {
        assert!(ensure_deliverable(&Payload::plaintext("m", "hello")).is_ok());

        let err = ensure_deliverable(&Payload::plaintext("m", "a".repeat(MAX_PAYLOAD_SIZE)))
            .unwrap_err();
        assert!(matches!(err, KiteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_channel_link_in_created_notice() {
        let config = RouterConfig {
            channel_url: Some("https://kite.example/chat".to_string()),
            ..RouterConfig::default()
        };
        let router = Router::with_config(InMemoryChannels::new(), config);
        let dispatch = router
            .dispatch(text("100", "host", "/host support_desk"))
            .await
            .unwrap();
        let (_, body, _) = only_notification(&dispatch);
        assert!(body.ends_with("https://kite.example/chat?c=support_desk"));
    }
}
