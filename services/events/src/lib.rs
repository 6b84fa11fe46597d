//! Event and attendance management
//!
//! Users create events, join and leave them, tag them and browse them. The
//! core components ([`EventStore`], [`AttendanceRegistry`], [`TagIndex`] and
//! [`QueryEngine`]) share one injected [`Storage`] handle; the HTTP surface in
//! [`routes`] is a thin layer over them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use events::storage::{Storage, memory::MemoryStorage};
//! use events::state::EventServices;
//!
//! let storage = Storage::new(Arc::new(MemoryStorage::new()), Duration::from_secs(5));
//! let services = EventServices::new(storage);
//! ```

pub mod attendance;
pub mod error;
pub mod event_store;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod state;
pub mod storage;
pub mod tags;

pub use attendance::AttendanceRegistry;
pub use error::{ApiError, EventError, EventResult, StorageError, StorageResult};
pub use event_store::EventStore;
pub use query::QueryEngine;
pub use storage::{EventStorage, Storage};
pub use tags::TagIndex;
