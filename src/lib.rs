//! Remote-session gateway for GPU pod admin consoles.
//!
//! Browser clients connect over WebSocket and subscribe to per-pod log
//! tails, periodic resource samples, and interactive shells. Each
//! subscription is a session backed by its own SSH transport; the registry
//! in [`session`] guarantees at most one live session per (kind, pod,
//! client) and full teardown on every disconnect path.

pub mod config;
pub mod gateway;
pub mod pods;
pub mod session;
pub mod ssh;
