//! Terminal rendering: ANSI colors, profile glyphs, and every line format
//! the server writes to clients.
//!
//! All functions return complete strings; multi-line payloads carry their own
//! trailing newline, prompts deliberately do not.

use crate::common::time::format_time_ago;

pub const RESET: &str = "\x1b[0m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";
pub const WHITE: &str = "\x1b[37m";
pub const BOLD: &str = "\x1b[1m";

/// Glyph assigned to every fresh session.
pub const DEFAULT_GLYPH: &str = "[@_@]";

/// Selectable profile glyphs, keyed by the name given to `/sp`.
pub const GLYPHS: &[(&str, &str)] = &[
    ("default", "[@_@]"),
    ("cat", "(=^･^=)"),
    ("dog", "(ᵔᴥᵔ)"),
    ("cool", "(⌐■_■)"),
    ("bear", "ʕ•ᴥ•ʔ"),
    ("happy", "(◕‿◕)"),
    ("star", "☆彡"),
    ("fire", "(🔥)"),
    ("alien", "[👽]"),
    ("robot", "[▪‿▪]"),
    ("love", "(♥‿♥)"),
    ("wink", "(^_~)"),
    ("dead", "(x_x)"),
    ("shrug", "¯\\_(ツ)_/¯"),
    ("music", "♪(┌・。・)┌"),
    ("ninja", "[忍]"),
    ("king", "(♔‿♔)"),
    ("queen", "(♕‿♕)"),
    ("devil", "(ψ｀∇´)ψ"),
    ("angel", "(◕ᴗ◕✿)"),
    ("sleep", "(-.-)zzZ"),
    ("cry", "(╥﹏╥)"),
    ("laugh", "(≧▽≦)"),
    ("angry", "(╬ಠ益ಠ)"),
    ("confused", "(・_・ヾ"),
    ("shocked", "(°ロ°)"),
    ("peace", "(✌ﾟ∀ﾟ)☞"),
    ("skull", "[☠]"),
    ("heart", "[❤]"),
    ("coffee", "c[_]"),
    ("pizza", "[🍕]"),
    ("ghost", "(ー'`ー)"),
    ("fox", "ᓚᘏᗢ"),
    ("owl", "(◉Θ◉)"),
    ("penguin", "(°<°)"),
    ("frog", "( ･ั﹏･ั)"),
    ("bunny", "(\\(•ᴗ•)/)"),
    ("snake", "~>°)~~~"),
    ("dino", "<コ:彡"),
    ("wizard", "⊂(◉‿◉)つ"),
    ("pirate", "(✪‿✪)ノ"),
    ("nerd", "(⌐□_□)"),
    ("party", "ヽ(^o^)ノ"),
    ("think", "(¬‿¬)"),
    ("flex", "ᕦ(ò_óˇ)ᕤ"),
    ("dance", "┏(･o･)┛"),
    ("flip", "(ノಠ益ಠ)ノ彡┻━┻"),
];

/// Look up a glyph by its `/sp` name.
pub fn glyph(name: &str) -> Option<&'static str> {
    GLYPHS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, pic)| *pic)
}

/// Chat message as delivered to lobby members: glyph, sender, age stamp,
/// then the text on an indented arrow line.
pub fn chat_message(glyph: &str, username: &str, text: &str, sent_at: i64, now: i64) -> String {
    let time_ago = format_time_ago(sent_at, now);
    format!(
        "{YELLOW}{glyph} {username}{RESET} [{WHITE}{time_ago}{RESET}]\n  {CYAN}╰─>{RESET} {text}\n"
    )
}

/// Lobby-scoped service announcement.
pub fn lobby_notice(text: &str) -> String {
    format!("{BLUE}{BOLD}[LOBBY] {RESET}{text}\n")
}

pub fn joined_announcement(username: &str) -> String {
    format!("{GREEN}{username}{RESET} has joined the lobby")
}

pub fn left_announcement(username: &str) -> String {
    format!("{RED}{username}{RESET} has left the lobby")
}

/// Inline error shown only to the offending client.
pub fn error_line(text: &str) -> String {
    format!("{RED}{text}\n{RESET}")
}

pub fn success_line(text: &str) -> String {
    format!("{GREEN}{text}\n{RESET}")
}

/// Rate-limit warning, prefixed with the warning sign.
pub fn rate_warning(text: &str) -> String {
    format!("{RED}⚠ {text}{RESET}\n")
}

/// Username prompt; no trailing newline so input happens on the same line.
pub fn username_prompt() -> String {
    format!("{YELLOW}Enter your username: {RESET}")
}

pub fn goodbye() -> String {
    format!("{YELLOW}Disconnecting from server. Goodbye!\n{RESET}")
}

pub fn shutdown_notice() -> String {
    format!("{YELLOW}Server is shutting down. Goodbye!\n{RESET}")
}

pub fn welcome_banner() -> String {
    let banner = "
╔══════════════════════════════════════╗
║   WELCOME TO THE CHAT SERVER         ║
║                                      ║
║   Type /help to get started          ║
╚══════════════════════════════════════╝

";
    format!("{CYAN}{banner}{RESET}")
}

pub fn help_text() -> String {
    let mut msg = format!("{CYAN}\n=== Available Commands ===\n{RESET}");
    msg.push_str("  /users  - Show users in current lobby\n");
    msg.push_str("  /lobbies - List all lobbies\n");
    msg.push_str("  /create <name> [password] <desc> - Create new lobby\n");
    msg.push_str("  /join <name> [password] - Join a lobby\n");
    msg.push_str("  /sp <name> - Set profile picture\n");
    msg.push_str("  /sp list - List available profile pictures\n");
    msg.push_str("  /msg <user> <message> - Send private message\n");
    msg.push_str("  /tag <user> <message> - Tag someone in lobby\n");
    msg.push_str("  /ai <question> - Ask AI a question\n");
    msg.push_str("  /ai clear - Clear AI conversation history\n");
    msg.push_str("  /setai <prompt> - Set custom AI prompt for lobby (creator only)\n");
    msg.push_str("  /showai - Show current lobby's AI prompt\n");
    msg.push_str("  /quit   - Disconnect from server\n\n");
    msg
}

/// DM as seen by the recipient.
pub fn dm_to_target(sender: &str, text: &str) -> String {
    format!(
        "{MAGENTA}[DM]{RESET} {CYAN}{sender}{RESET} {MAGENTA}—»{RESET} You\n  {CYAN}╰─>{RESET} {text}\n"
    )
}

/// DM echo as seen by the sender.
pub fn dm_to_sender(target: &str, text: &str) -> String {
    format!(
        "{MAGENTA}[DM]{RESET} You {MAGENTA}—»{RESET} {CYAN}{target}{RESET}\n  {CYAN}╰─>{RESET} {text}\n"
    )
}

/// Tag message broadcast to the whole lobby.
pub fn tag_broadcast(glyph: &str, sender: &str, target: &str, text: &str) -> String {
    format!(
        "{YELLOW}{glyph} {CYAN}{sender} {MAGENTA}@{target}{RESET}\n  {CYAN}╰─>{RESET} {text}\n"
    )
}

/// Extra notification pushed to the tagged user.
pub fn tag_notification(sender: &str) -> String {
    format!("{MAGENTA}✦ {sender} tagged you{RESET}\n")
}

pub fn ai_thinking() -> String {
    format!("{MAGENTA}[AI] Thinking...\n{RESET}")
}

pub fn ai_question_announcement(username: &str, question: &str) -> String {
    format!("{CYAN}{username}{RESET} asked AI: {question}")
}

pub fn ai_response_announcement(username: &str, reply: &str) -> String {
    format!("{MAGENTA}[AI Response to {username}]{RESET}\n{reply}")
}

/// Roster of the caller's current lobby.
pub fn user_list(lobby: &str, users: &[(String, String)]) -> String {
    let mut msg = format!(
        "{CYAN}\n=== Users in '{lobby}' ({count}) ===\n{RESET}",
        count = users.len()
    );
    for (glyph, username) in users {
        msg.push_str(&format!("  {glyph} {WHITE}{username}{RESET}\n"));
    }
    msg.push('\n');
    msg
}

/// One row of the `/lobbies` listing.
pub struct LobbyListing {
    pub name: String,
    pub is_private: bool,
    pub has_custom_ai: bool,
    pub creator: String,
    pub description: String,
    pub member_count: usize,
}

pub fn lobby_list(lobbies: &[LobbyListing]) -> String {
    let mut msg = format!(
        "{CYAN}\n=== Available Lobbies ({count}) ===\n\n{RESET}",
        count = lobbies.len()
    );
    for lobby in lobbies {
        let privacy = if lobby.is_private { "private" } else { "public" };
        let ai_status = if lobby.has_custom_ai {
            "custom AI"
        } else {
            "default AI"
        };
        let description = if lobby.description.is_empty() {
            "No description"
        } else {
            &lobby.description
        };
        msg.push_str(&format!("{WHITE}Lobby: {name}{RESET}\n", name = lobby.name));
        msg.push_str(&format!(
            "  Privacy: {privacy} | AI: {ai_status} | Users: {count} | Created by: {creator}\n",
            count = lobby.member_count,
            creator = lobby.creator
        ));
        msg.push_str(&format!("  Description: {description}\n\n"));
    }
    msg
}

/// `/showai` output: the lobby's effective AI prompt.
pub fn ai_prompt_display(lobby: &str, custom_prompt: Option<&str>) -> String {
    let mut msg = format!("{CYAN}\n=== AI Prompt for '{lobby}' ===\n{RESET}");
    match custom_prompt {
        Some(prompt) => msg.push_str(&format!("{prompt}\n\n")),
        None => msg.push_str("(default personality)\n\n"),
    }
    msg
}

pub fn glyph_list() -> String {
    let mut msg = format!("{CYAN}\n=== Available Profile Pictures ===\n{RESET}");
    msg.push_str(&format!("{YELLOW}Usage: /sp <name>\n\n{RESET}"));
    for (name, pic) in GLYPHS {
        msg.push_str(&format!("  {WHITE}{name:<10}{RESET} → {pic}\n"));
    }
    msg.push('\n');
    msg
}
