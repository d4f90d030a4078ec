//! User-facing texts.
//!
//! Error reasons that travel inside `KiteError` are English only; command
//! replies and notifications follow the member's locale.

use serde::{Deserialize, Serialize};

/// Supported locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Uk,
}

impl Locale {
    /// Pick a locale from a language tag such as `uk-UA` or `en_US`.
    ///
    /// Unknown languages fall back to English.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let lang = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "uk" | "ua" => Locale::Uk,
            _ => Locale::En,
        }
    }

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Uk => "uk",
        }
    }
}

const HELP_EN: &str = "\
This bot relays messages between a support channel and its clients.

/host channel - set up this chat as the host of a support channel
/drop - close the channel you host
/join channel - start a conversation with a support channel
/leave - leave the current channel
/info - show your current channel

Channel names contain only letters, digits, '-' and '_' and are 8 to 32 characters long.

Host messages go to the client who wrote last. Reply to a message to answer a specific client.";

const HELP_UK: &str = "\
Цей бот пересилає повідомлення між каналом підтримки та його клієнтами.

/host канал - зробити цей чат хостом каналу підтримки
/drop - закрити канал, яким ви керуєте
/join канал - почати розмову з каналом підтримки
/leave - вийти з поточного каналу
/info - показати ваш поточний канал

Назва каналу містить лише літери, цифри, '-' та '_' і має довжину від 8 до 32 символів.

Повідомлення хоста надходять клієнту, який писав останнім. Відповідайте на повідомлення, щоб звернутися до конкретного клієнта.";

#[must_use]
pub fn help(locale: Locale) -> &'static str {
    match locale {
        Locale::En => HELP_EN,
        Locale::Uk => HELP_UK,
    }
}

pub fn unknown_command(locale: Locale, command: &str) -> String {
    match locale {
        Locale::En => format!("Unknown command /{command}. Use /help to see what is available"),
        Locale::Uk => format!("Невідома команда /{command}. Скористайтеся /help, щоб побачити доступні"),
    }
}

pub fn channel_created(locale: Locale, channel: &str, url: Option<&str>) -> String {
    let link = url
        .map(|u| format!("\n{u}?c={channel}"))
        .unwrap_or_default();
    match locale {
        Locale::En => format!("Created channel {channel}{link}"),
        Locale::Uk => format!("Створено канал {channel}{link}"),
    }
}

pub fn channel_rehosted(locale: Locale, channel: &str) -> String {
    match locale {
        Locale::En => format!("Messages for channel {channel} will be sent here from now on"),
        Locale::Uk => format!("Відтепер повідомлення каналу {channel} надходитимуть сюди"),
    }
}

pub fn channel_dropped(locale: Locale, channel: &str) -> String {
    match locale {
        Locale::En => format!("You dropped channel {channel}"),
        Locale::Uk => format!("Ви закрили канал {channel}"),
    }
}

pub fn channel_closed(locale: Locale, channel: &str) -> String {
    match locale {
        Locale::En => format!("Channel {channel} was closed by its host"),
        Locale::Uk => format!("Канал {channel} закрито хостом"),
    }
}

pub fn you_joined(locale: Locale, channel: &str) -> String {
    match locale {
        Locale::En => format!("You joined channel {channel}"),
        Locale::Uk => format!("Ви приєдналися до каналу {channel}"),
    }
}

pub fn guest_joined(locale: Locale, user: &str, channel: &str) -> String {
    match locale {
        Locale::En => format!("{user} joined channel {channel}"),
        Locale::Uk => format!("{user} приєднався до каналу {channel}"),
    }
}

pub fn you_left(locale: Locale, channel: &str) -> String {
    match locale {
        Locale::En => format!("You left channel {channel}"),
        Locale::Uk => format!("Ви вийшли з каналу {channel}"),
    }
}

pub fn guest_left(locale: Locale, user: &str, channel: &str) -> String {
    match locale {
        Locale::En => format!("#{user} left channel {channel}"),
        Locale::Uk => format!("#{user} вийшов з каналу {channel}"),
    }
}

#[must_use]
pub fn not_joined(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "You are not joined to any channel",
        Locale::Uk => "Ви не приєднані до жодного каналу",
    }
}

pub fn info_host(locale: Locale, user: &str, channel: &str, guests: usize) -> String {
    match locale {
        Locale::En => format!(
            "Hello {user}!\n\nYou are the host of the channel {channel}.\nGuests: {guests}"
        ),
        Locale::Uk => format!("Вітаємо, {user}!\n\nВи хост каналу {channel}.\nГостей: {guests}"),
    }
}

pub fn info_guest(locale: Locale, user: &str, channel: &str) -> String {
    match locale {
        Locale::En => format!("Hello {user}!\n\nYou are the member of the channel {channel}."),
        Locale::Uk => format!("Вітаємо, {user}!\n\nВи учасник каналу {channel}."),
    }
}

#[must_use]
pub fn info_anonymous(locale: Locale) -> &'static str {
    match locale {
        Locale::En => {
            "You don't have any channels at the moment.\n\
             To join one, use /join channelName.\n\
             For more information about possible actions, use /help."
        }
        Locale::Uk => {
            "Наразі у вас немає каналів.\n\
             Щоб приєднатися, скористайтеся /join назваКаналу.\n\
             Докладніше про можливі дії: /help."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_from_tag() {
        assert_eq!(Locale::from_tag("uk"), Locale::Uk);
        assert_eq!(Locale::from_tag("uk-UA"), Locale::Uk);
        assert_eq!(Locale::from_tag("UA"), Locale::Uk);
        assert_eq!(Locale::from_tag("en_US"), Locale::En);
        assert_eq!(Locale::from_tag("de"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn test_help_is_localized() {
        assert_ne!(help(Locale::En), help(Locale::Uk));
        assert!(help(Locale::En).contains("/host"));
        assert!(help(Locale::Uk).contains("/host"));
    }

    #[test]
    fn test_channel_link() {
        assert_eq!(
            channel_created(Locale::En, "support_desk", None),
            "Created channel support_desk"
        );
        assert_eq!(
            channel_created(Locale::En, "support_desk", Some("https://kite.example")),
            "Created channel support_desk\nhttps://kite.example?c=support_desk"
        );
    }
}
