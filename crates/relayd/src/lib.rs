//! Chat relay daemon - session registry, message router and TCP server
//!
//! This crate provides the core infrastructure for the relay daemon:
//! - `registry` - Session registry actor, the single owner of who is connected
//! - `router` - Turns parsed commands into deliveries on peers' queues
//! - `outbound` - Bounded per-session queues and their socket writers
//! - `server` - TCP accept loop, connection handlers and presence notices
//! - `session_log` - Per-session append-only log files
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        relayd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   RelayServer   │     │     RegistryActor           │   │
//! │  │  (TcpListener)  │     │  (session state owner)      │   │
//! │  └────────┬────────┘     └──────────────▲──────┬───────┘   │
//! │           │ connections                 │      │ events    │
//! │           ▼                             │      ▼           │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ConnectionHandler│────▶│  Router / presence notifier │   │
//! │  │  (per client)   │     │                             │   │
//! │  └────────▲────────┘     └──────────────┬──────────────┘   │
//! │           │ writer task                 │ send_timeout     │
//! │           └─────────── Outbound queues ◀┘                  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod outbound;
pub mod registry;
pub mod router;
pub mod server;
pub mod session_log;
