//! Declarative command table and prefix autocomplete.

use rallypoint_shared::constants::COMMAND_PREFIX;

/// One entry in the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Primary name including the prefix, e.g. `/join`.
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Argument hint for help and usage messages.
    pub arg_hint: Option<&'static str>,
    pub description: &'static str,
}

impl CommandSpec {
    /// Usage line shown when a command is invoked with too few arguments.
    pub fn usage(&self) -> String {
        match self.arg_hint {
            Some(hint) => format!("usage: {} {hint}", self.name),
            None => format!("usage: {}", self.name),
        }
    }

    fn matches_token(&self, token: &str) -> bool {
        self.name == token || self.aliases.contains(&token)
    }

    fn matches_prefix(&self, partial: &str) -> bool {
        let partial = partial.to_ascii_lowercase();
        self.name.starts_with(&partial)
            || self
                .aliases
                .iter()
                .any(|alias| alias.starts_with(&partial))
    }
}

/// Commands available everywhere.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "/ai",
        aliases: &["/ask"],
        arg_hint: Some("<prompt>"),
        description: "ask the AI assistant in the current scope",
    },
    CommandSpec {
        name: "/block",
        aliases: &[],
        arg_hint: Some("<nickname>"),
        description: "drop all messages from a peer",
    },
    CommandSpec {
        name: "/clear",
        aliases: &[],
        arg_hint: None,
        description: "clear messages in the current scope",
    },
    CommandSpec {
        name: "/emergency",
        aliases: &["/sos"],
        arg_hint: Some("<message>"),
        description: "broadcast an emergency alert to everyone",
    },
    CommandSpec {
        name: "/fav",
        aliases: &[],
        arg_hint: Some("<nickname>"),
        description: "mark a peer as favorite",
    },
    CommandSpec {
        name: "/help",
        aliases: &["/h"],
        arg_hint: None,
        description: "list available commands",
    },
    CommandSpec {
        name: "/join",
        aliases: &["/j"],
        arg_hint: Some("<channel>"),
        description: "join a channel and switch to it",
    },
    CommandSpec {
        name: "/msg",
        aliases: &["/m", "/w"],
        arg_hint: Some("<nickname> [message]"),
        description: "start or continue a private conversation",
    },
    CommandSpec {
        name: "/respond",
        aliases: &[],
        arg_hint: None,
        description: "toggle automatic AI replies",
    },
    CommandSpec {
        name: "/role",
        aliases: &[],
        arg_hint: Some("<scout|medic|leader|helper|analyst>"),
        description: "announce your coordination role",
    },
    CommandSpec {
        name: "/status",
        aliases: &[],
        arg_hint: None,
        description: "show peers, channels, and local settings",
    },
    CommandSpec {
        name: "/supply",
        aliases: &[],
        arg_hint: Some("<item>"),
        description: "broadcast a supply request",
    },
    CommandSpec {
        name: "/unblock",
        aliases: &[],
        arg_hint: Some("<nickname>"),
        description: "stop dropping messages from a peer",
    },
    CommandSpec {
        name: "/unfav",
        aliases: &[],
        arg_hint: Some("<nickname>"),
        description: "remove a peer from favorites",
    },
    CommandSpec {
        name: "/who",
        aliases: &["/online"],
        arg_hint: None,
        description: "list connected peers and their roles",
    },
];

/// Commands that only exist while a channel context holds.
pub const CHANNEL_COMMANDS: &[CommandSpec] = &[CommandSpec {
    name: "/leave",
    aliases: &["/part"],
    arg_hint: None,
    description: "leave the current channel",
}];

fn table(in_channel: bool) -> impl Iterator<Item = &'static CommandSpec> {
    COMMANDS
        .iter()
        .chain(CHANNEL_COMMANDS.iter().filter(move |_| in_channel))
}

/// Look up a command by its exact (case-sensitive) first token.
pub fn find(token: &str, in_channel: bool) -> Option<&'static CommandSpec> {
    table(in_channel).find(|spec| spec.matches_token(token))
}

/// Prefix autocomplete over names and aliases, case-insensitive, sorted by
/// primary name. Empty unless the input starts with the command prefix.
pub fn suggest(partial: &str, in_channel: bool) -> Vec<&'static CommandSpec> {
    if !partial.starts_with(COMMAND_PREFIX) {
        return Vec::new();
    }
    let mut matches: Vec<&'static CommandSpec> = table(in_channel)
        .filter(|spec| spec.matches_prefix(partial))
        .collect();
    matches.sort_by_key(|spec| spec.name);
    matches
}
