//! Fixed server → client lines.
//!
//! Everything the relay says on the wire is built here so the session and
//! router stay free of string literals.

/// Usage help sent after a successful registration.
pub const INSTRUCTIONS: [&str; 5] = [
    "1. Type your message to broadcast it to everyone.",
    "2. Use '/send <username1,username2> <message>' to send to specific users.",
    "3. Use '/exclude <username1,username2> <message>' to broadcast excluding specific users.",
    "4. Use '/banned' to query banned phrases.",
    "5. Type 'exit' to disconnect.",
];

pub const SEND_USAGE: &str = "Usage: /send <username1,username2> <message>";
pub const EXCLUDE_USAGE: &str = "Usage: /exclude <username1,username2> <message>";

pub const EMPTY_MESSAGE: &str = "Cannot send an empty message. Please type something.";
pub const BLOCKED_BROADCAST: &str = "Your message contains a banned phrase and will not be broadcast.";
pub const BLOCKED_DIRECT: &str = "Your message contains a banned phrase and will not be sent.";
pub const SHUTTING_DOWN: &str = "Server is shutting down.";

pub fn prompt(server_name: &str) -> String {
    format!("Welcome to {server_name}. Please provide your username:")
}

pub fn name_taken(name: &str) -> String {
    format!("Username {name} is already taken. Disconnecting.")
}

pub fn connected_clients(names: &[String]) -> String {
    format!("Connected clients: {}", names.join(", "))
}

pub fn joined(name: &str) -> String {
    format!("{name} has entered the chat.")
}

pub fn left(name: &str) -> String {
    format!("{name} has left the chat.")
}

pub fn chat(sender: &str, text: &str) -> String {
    format!("{sender}: {text}")
}

pub fn private(sender: &str, text: &str) -> String {
    format!("{sender} (private): {text}")
}

pub fn not_found(name: &str, available: &[String]) -> String {
    format!("User {name} not found. Available clients: {}", available.join(", "))
}

pub fn banned_phrases(phrases: &[String]) -> String {
    if phrases.is_empty() {
        "Banned phrases: none".into()
    } else {
        format!("Banned phrases: {}", phrases.join(", "))
    }
}
