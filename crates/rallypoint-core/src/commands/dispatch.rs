//! Slash-command parsing and dispatch.
//!
//! The dispatcher recognizes input beginning with the command prefix,
//! routes the first whitespace-delimited token through the registry, and
//! executes the handler synchronously against the chat state. Handlers
//! never fail: bad syntax becomes a usage notice, unresolved nicknames an
//! explanatory notice. The only asynchronous hand-off is `/ai`, which is
//! returned to the engine as a prompt for the AI responder.

use chrono::Utc;
use tracing::debug;

use rallypoint_shared::constants::COMMAND_PREFIX;
use rallypoint_shared::protocol::{self, RoleUpdate};
use rallypoint_shared::types::{Message, PeerId, Role, Scope};

use crate::commands::registry::{self, CommandSpec, CHANNEL_COMMANDS, COMMANDS};
use crate::state::ChatState;

/// Text to hand to the transport, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub text: String,
    pub mentions: Vec<String>,
    /// `None` broadcasts on the public main scope.
    pub scope: Option<String>,
}

impl Outbound {
    fn broadcast(text: String) -> Self {
        Self {
            text,
            mentions: Vec::new(),
            scope: None,
        }
    }
}

/// Result of one dispatch call.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Whether the input was consumed as a command. `false` means the line
    /// is ordinary chat and the caller should send it as such.
    pub handled: bool,
    pub outbound: Vec<Outbound>,
    /// Prompt for the AI responder when `/ai` was invoked.
    pub ai_prompt: Option<String>,
}

impl DispatchOutcome {
    fn unhandled() -> Self {
        Self::default()
    }

    fn handled() -> Self {
        Self {
            handled: true,
            ..Self::default()
        }
    }
}

/// Parses and executes local slash commands.
pub struct CommandDispatcher {
    local_peer: PeerId,
    local_nickname: String,
}

impl CommandDispatcher {
    pub fn new(local_peer: PeerId, local_nickname: &str) -> Self {
        Self {
            local_peer,
            local_nickname: local_nickname.to_string(),
        }
    }

    /// Execute one line of user input against the chat state.
    pub fn dispatch(&self, state: &mut ChatState, raw: &str) -> DispatchOutcome {
        let input = raw.trim();
        if !input.starts_with(COMMAND_PREFIX) {
            return DispatchOutcome::unhandled();
        }

        let mut parts = input.split_whitespace();
        let token = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let in_channel = matches!(state.active_scope, Scope::Channel(_));
        let Some(spec) = registry::find(token, in_channel) else {
            debug!(token, "Unknown command");
            self.notify(state, &format!("unknown command: {token}"));
            return DispatchOutcome::handled();
        };

        match spec.name {
            "/join" => self.cmd_join(state, spec, &args),
            "/leave" => self.cmd_leave(state),
            "/msg" => self.cmd_msg(state, spec, &args),
            "/who" => self.cmd_who(state),
            "/clear" => self.cmd_clear(state),
            "/block" => self.cmd_set_blocked(state, spec, &args, true),
            "/unblock" => self.cmd_set_blocked(state, spec, &args, false),
            "/fav" => self.cmd_set_favorite(state, spec, &args, true),
            "/unfav" => self.cmd_set_favorite(state, spec, &args, false),
            "/role" => self.cmd_role(state, spec, &args),
            "/supply" => self.cmd_supply(state, spec, &args),
            "/emergency" => self.cmd_emergency(state, spec, &args),
            "/status" => self.cmd_status(state),
            "/ai" => self.cmd_ai(state, spec, &args),
            "/respond" => self.cmd_respond(state),
            "/help" => self.cmd_help(state, in_channel),
            other => {
                // Registry and handler table drifted; consume the input
                // rather than leaking it into chat.
                debug!(command = other, "Command without handler");
                self.notify(state, &format!("unknown command: {other}"));
                DispatchOutcome::handled()
            }
        }
    }

    /// Autocomplete suggestions for a partial input line.
    pub fn suggest(&self, state: &ChatState, partial: &str) -> Vec<&'static CommandSpec> {
        let in_channel = matches!(state.active_scope, Scope::Channel(_));
        registry::suggest(partial, in_channel)
    }

    // --- Handlers ---

    fn cmd_join(&self, state: &mut ChatState, spec: &CommandSpec, args: &[&str]) -> DispatchOutcome {
        let Some(channel) = args.first() else {
            return self.usage(state, spec);
        };
        let channel = channel.trim_start_matches('#');
        if channel.is_empty() {
            return self.usage(state, spec);
        }
        let newly = state.join_channel(channel);
        state.active_scope = Scope::Channel(channel.to_string());
        let note = if newly { "joined" } else { "switched to" };
        self.notify(state, &format!("{note} #{channel}"));
        DispatchOutcome::handled()
    }

    fn cmd_leave(&self, state: &mut ChatState) -> DispatchOutcome {
        if let Scope::Channel(channel) = state.active_scope.clone() {
            state.leave_channel(&channel);
            state.active_scope = Scope::Main;
            self.notify(state, &format!("left #{channel}"));
        }
        DispatchOutcome::handled()
    }

    fn cmd_msg(&self, state: &mut ChatState, spec: &CommandSpec, args: &[&str]) -> DispatchOutcome {
        let Some(nickname) = args.first() else {
            return self.usage(state, spec);
        };
        let Some(peer) = self.resolve(state, nickname) else {
            return DispatchOutcome::handled();
        };

        state.active_scope = Scope::Private(peer.clone());
        let text = args[1..].join(" ");
        if text.is_empty() {
            self.notify(state, &format!("private conversation with {nickname}"));
            return DispatchOutcome::handled();
        }

        let message = Message::outgoing(
            &self.local_nickname,
            self.local_peer.clone(),
            &text,
            &state.active_scope,
        );
        state.add_message(message, Some(&peer));
        DispatchOutcome {
            handled: true,
            outbound: vec![Outbound {
                text,
                mentions: vec![nickname.to_string()],
                scope: Some(peer.0.clone()),
            }],
            ai_prompt: None,
        }
    }

    fn cmd_who(&self, state: &mut ChatState) -> DispatchOutcome {
        let peers = state.connected_peers();
        if peers.is_empty() {
            self.notify(state, "nobody else is online");
            return DispatchOutcome::handled();
        }
        let mut lines = vec![format!("{} peer(s) online:", peers.len())];
        for peer in peers {
            let nickname = state
                .nickname_of(&peer)
                .unwrap_or_else(|| peer.short())
                .to_string();
            let role = state.role_of(&peer);
            let mut line = format!("  {nickname} [{role}]");
            if let Some(fingerprint) = state.fingerprint_of(&peer) {
                line.push_str(&format!(" ({fingerprint})"));
            }
            if state.is_favorite(&peer) {
                line.push_str(" *");
            }
            if state.is_blocked(&peer) {
                line.push_str(" (blocked)");
            }
            lines.push(line);
        }
        self.notify(state, &lines.join("\n"));
        DispatchOutcome::handled()
    }

    fn cmd_clear(&self, state: &mut ChatState) -> DispatchOutcome {
        let scope = state.active_scope.clone();
        state.clear_scope(&scope);
        DispatchOutcome::handled()
    }

    fn cmd_set_blocked(
        &self,
        state: &mut ChatState,
        spec: &CommandSpec,
        args: &[&str],
        blocked: bool,
    ) -> DispatchOutcome {
        let Some(nickname) = args.first() else {
            return self.usage(state, spec);
        };
        let Some(peer) = self.resolve(state, nickname) else {
            return DispatchOutcome::handled();
        };
        state.set_blocked(&peer, blocked);
        let verb = if blocked { "blocked" } else { "unblocked" };
        self.notify(state, &format!("{verb} {nickname}"));
        DispatchOutcome::handled()
    }

    fn cmd_set_favorite(
        &self,
        state: &mut ChatState,
        spec: &CommandSpec,
        args: &[&str],
        favorite: bool,
    ) -> DispatchOutcome {
        let Some(nickname) = args.first() else {
            return self.usage(state, spec);
        };
        let Some(peer) = self.resolve(state, nickname) else {
            return DispatchOutcome::handled();
        };
        state.set_favorite(&peer, favorite);
        let verb = if favorite {
            "added to favorites"
        } else {
            "removed from favorites"
        };
        self.notify(state, &format!("{nickname} {verb}"));
        DispatchOutcome::handled()
    }

    fn cmd_role(&self, state: &mut ChatState, spec: &CommandSpec, args: &[&str]) -> DispatchOutcome {
        let Some(name) = args.first() else {
            return self.usage(state, spec);
        };
        let Some(role) = Role::from_wire(name) else {
            self.notify(
                state,
                &format!("unknown role {name:?}, expected one of: {}", Role::assignable().join(", ")),
            );
            return DispatchOutcome::handled();
        };

        let timestamp = Utc::now().timestamp_millis();
        state.apply_role_update(RoleUpdate {
            peer_id: self.local_peer.clone(),
            role,
            timestamp,
        });

        // Every role has a standing channel of the same name.
        let channel = role.as_wire();
        state.join_channel(channel);
        self.notify(state, &format!("you are now {role}, joined #{channel}"));

        DispatchOutcome {
            handled: true,
            outbound: vec![Outbound::broadcast(protocol::encode_role_update(
                &self.local_peer,
                role,
                timestamp,
            ))],
            ai_prompt: None,
        }
    }

    fn cmd_supply(&self, state: &mut ChatState, spec: &CommandSpec, args: &[&str]) -> DispatchOutcome {
        if args.is_empty() {
            return self.usage(state, spec);
        }
        let item = args.join(" ");
        self.notify(state, &format!("supply request broadcast: {item}"));
        DispatchOutcome {
            handled: true,
            outbound: vec![Outbound::broadcast(protocol::encode_supply_request(
                &self.local_peer,
                &item,
                Utc::now().timestamp_millis(),
            ))],
            ai_prompt: None,
        }
    }

    fn cmd_emergency(
        &self,
        state: &mut ChatState,
        spec: &CommandSpec,
        args: &[&str],
    ) -> DispatchOutcome {
        if args.is_empty() {
            return self.usage(state, spec);
        }
        let message = args.join(" ");
        let role = state.role_of(&self.local_peer);
        self.notify(state, &format!("emergency alert broadcast: {message}"));
        DispatchOutcome {
            handled: true,
            outbound: vec![Outbound::broadcast(protocol::encode_emergency(
                &self.local_peer,
                role,
                &message,
                Utc::now().timestamp_millis(),
            ))],
            ai_prompt: None,
        }
    }

    fn cmd_status(&self, state: &mut ChatState) -> DispatchOutcome {
        let role = state.role_of(&self.local_peer);
        let channels = state.joined_channels();
        let summary = format!(
            "you: {} [{role}] | peers online: {} | channels: {} | auto-respond: {} | scope: {}",
            self.local_nickname,
            state.connected_peers().len(),
            if channels.is_empty() {
                "none".to_string()
            } else {
                channels.join(", ")
            },
            if state.auto_respond { "on" } else { "off" },
            state.active_scope,
        );
        self.notify(state, &summary);
        DispatchOutcome::handled()
    }

    fn cmd_ai(&self, state: &mut ChatState, spec: &CommandSpec, args: &[&str]) -> DispatchOutcome {
        if args.is_empty() {
            return self.usage(state, spec);
        }
        DispatchOutcome {
            handled: true,
            outbound: Vec::new(),
            ai_prompt: Some(args.join(" ")),
        }
    }

    fn cmd_respond(&self, state: &mut ChatState) -> DispatchOutcome {
        state.auto_respond = !state.auto_respond;
        let setting = if state.auto_respond { "enabled" } else { "disabled" };
        self.notify(state, &format!("AI auto-respond {setting}"));
        DispatchOutcome::handled()
    }

    fn cmd_help(&self, state: &mut ChatState, in_channel: bool) -> DispatchOutcome {
        let mut lines = vec!["commands:".to_string()];
        let specs = COMMANDS
            .iter()
            .chain(CHANNEL_COMMANDS.iter().filter(|_| in_channel));
        for spec in specs {
            let hint = spec.arg_hint.unwrap_or("");
            lines.push(format!("  {} {hint} - {}", spec.name, spec.description));
        }
        self.notify(state, &lines.join("\n"));
        DispatchOutcome::handled()
    }

    // --- Helpers ---

    fn notify(&self, state: &mut ChatState, content: &str) {
        let scope = state.active_scope.clone();
        state.add_system_message(content, &scope);
    }

    fn resolve(&self, state: &mut ChatState, nickname: &str) -> Option<PeerId> {
        match state.resolve_nickname(nickname) {
            Some(peer) => Some(peer),
            None => {
                self.notify(state, &format!("no peer named {nickname:?} is online"));
                None
            }
        }
    }

    fn usage(&self, state: &mut ChatState, spec: &CommandSpec) -> DispatchOutcome {
        self.notify(state, &spec.usage());
        DispatchOutcome::handled()
    }
}
