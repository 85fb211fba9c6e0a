//! Multi-room chat server for the terminal.
//!
//! Clients connect over plain TCP with a line-oriented protocol (netcat is a
//! perfectly good client), pick a username, land in the `general` lobby and
//! chat. Lobbies can be created on the fly, made private with a password and
//! given their own AI personality.

// layers
pub mod ai;
pub mod domain;
pub mod server;

// shared library
pub mod common;
