//! Pond broker - in-memory append-only store for access-log datagrams
//!
//! Producers push binary log datagrams in over a framed TCP protocol;
//! consumers run filtered queries that replay history and, in follow mode,
//! stay attached for live records. This crate is the server side:
//!
//! ```text
//! INJECT_LOG_RECORD
//!     │
//!     ▼
//! Database ◄─── ring of Records, id + time indexes
//!     │  │
//!     │  └──► append listeners (one-shot, re-registered per append)
//!     ▼
//! Selection ◄── Cursor + Filter, per committed query
//!     │
//!     ▼
//! Connection ◄─ query state machine, outbound buffer with backpressure
//!     │
//!     ▼
//! LOG_RECORD / END / ERROR frames
//! ```
//!
//! # Design
//!
//! - **Stable ids**: every record gets a monotonic 64-bit id; the live set
//!   is always the contiguous interval `[min_id, max_id]`, so cursors
//!   survive ring eviction by id arithmetic alone
//! - **At-most-once**: a cursor tracks the last id it has seen; eviction
//!   repair (`fix_deleted`) and follow-mode resumption both scan strictly
//!   past it
//! - **No polling**: a follow query parks by registering a one-shot append
//!   listener; the next append hands it the new record directly

mod config;
mod connection;
mod cursor;
mod database;
mod error;
mod filter;
mod record;
mod selection;
mod server;

pub use config::BrokerConfig;
pub use cursor::Cursor;
pub use database::{AppendSink, Database, DatabaseStats, ListenerToken};
pub use error::BrokerError;
pub use filter::{Filter, StatusFilter};
pub use record::Record;
pub use selection::Selection;
pub use server::PondServer;

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
