//! Folio: a blog client that renders a bootstrap snapshot first and hands
//! off to a live, normalized entity cache with optimistic mutations.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
