//! Plain-text rendering of views for the command-line client.

pub mod views;
