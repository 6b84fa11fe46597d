//! Storage port for the event core
//!
//! [`EventStorage`] is the single persistence interface the components talk
//! to. Every mutating method is one atomic unit on the backing store, and every
//! read returns a consistent snapshot of the events it touches. Three adapters
//! implement it:
//!
//! - [`postgres::PostgresStorage`]: relational tables, row locks, snapshot transactions
//! - [`redis::RedisStorage`]: one JSON document per event, compare-and-swap writes
//! - [`memory::MemoryStorage`]: in-process documents with per-event writer locks
//!
//! The trait returns boxed futures so it can be used as `Arc<dyn EventStorage>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::settings::{Settings, StorageBackend};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Attendance, Event, EventChanges, NewUser, User, UserProfile};
use crate::query::filters::EventQuery;

pub mod document;
pub mod memory;
pub mod postgres;
pub mod redis;

/// Boxed future returned by every port method
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// One attendance together with the attending user's display fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub attendance: Attendance,
    pub user: UserProfile,
}

/// Everything known about one event, read at a single instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub event: Event,
    pub creator: UserProfile,
    /// Tags in insertion order
    pub tags: Vec<String>,
    /// Attendance records of any status
    pub roster: Vec<RosterEntry>,
}

impl EventSnapshot {
    pub fn active(&self) -> impl Iterator<Item = &RosterEntry> {
        self.roster.iter().filter(|entry| entry.attendance.is_active())
    }

    pub fn active_entry(&self, user_id: Uuid) -> Option<&RosterEntry> {
        self.active().find(|entry| entry.user.id == user_id)
    }
}

/// An event persisted together with its founding attendance and tags
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event: Event,
    pub founder: Attendance,
    pub tags: Vec<String>,
}

/// Result of the conditional attendance insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(Attendance),
    AlreadyJoined,
    Full,
    EventMissing,
}

/// Result of an attendance deactivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    NotAttending,
    /// The creator's attendance cannot be removed
    CreatorPinned,
    EventMissing,
}

/// Result of an event update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Event),
    CapacityBelowAttendance { attendees: u32 },
    EventMissing,
}

/// Persistence interface shared by all adapters
pub trait EventStorage: Send + Sync {
    /// Short adapter name for logs
    fn backend_name(&self) -> &'static str;

    /// Register a user; a taken email is a [`StorageError::Conflict`]
    fn insert_user(&self, user: NewUser) -> StorageFuture<'_, User>;

    fn find_user(&self, user_id: Uuid) -> StorageFuture<'_, Option<User>>;

    /// Persist event, founding attendance and tags as one unit
    fn insert_event(&self, new_event: NewEvent) -> StorageFuture<'_, Event>;

    fn find_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<Event>>;

    /// Apply column changes and optionally replace the tag set as one unit
    ///
    /// A capacity change is refused when it would drop below the number of
    /// active attendances.
    fn update_event(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        tags: Option<Vec<String>>,
        updated_at: DateTime<Utc>,
    ) -> StorageFuture<'_, UpdateOutcome>;

    /// Remove the event with its tags and attendances; false if absent
    fn delete_event(&self, event_id: Uuid) -> StorageFuture<'_, bool>;

    /// Insert `attendance` if the user is not attending and a seat is free
    ///
    /// The capacity check and the insert are one atomic unit per event.
    fn join(&self, attendance: Attendance) -> StorageFuture<'_, JoinOutcome>;

    /// Deactivate the user's active attendance
    fn leave(&self, event_id: Uuid, user_id: Uuid) -> StorageFuture<'_, LeaveOutcome>;

    /// Swap the whole tag set; false if the event is absent
    fn replace_tags(&self, event_id: Uuid, tags: Vec<String>) -> StorageFuture<'_, bool>;

    /// Tags in insertion order; `None` if the event is absent
    fn tags_for(&self, event_id: Uuid) -> StorageFuture<'_, Option<Vec<String>>>;

    fn load_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<EventSnapshot>>;

    /// Filtered, ordered, paginated snapshots
    fn query_events(&self, query: EventQuery) -> StorageFuture<'_, Vec<EventSnapshot>>;

    fn health_check(&self) -> StorageFuture<'_, bool>;

    /// Release connections at shutdown
    fn close(&self) -> StorageFuture<'_, ()>;
}

/// Injected storage handle with a bound on every call
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn EventStorage>,
    timeout: Duration,
}

impl Storage {
    pub fn new(backend: Arc<dyn EventStorage>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &dyn EventStorage {
        self.backend.as_ref()
    }

    /// Await a port call, failing with [`StorageError::Timeout`] past the bound
    pub async fn bounded<T>(&self, call: StorageFuture<'_, T>) -> StorageResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.backend.backend_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Storage call timed out"
                );
                Err(StorageError::Timeout(self.timeout))
            }
        }
    }

    pub async fn health_check(&self) -> StorageResult<bool> {
        self.bounded(self.backend.health_check()).await
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.bounded(self.backend.close()).await
    }
}

/// Open the adapter selected in the settings
pub async fn connect(settings: &Settings) -> StorageResult<Arc<dyn EventStorage>> {
    let backend: Arc<dyn EventStorage> = match settings.storage.backend {
        StorageBackend::Postgres => {
            Arc::new(postgres::PostgresStorage::connect(&settings.database).await?)
        }
        StorageBackend::Redis => Arc::new(
            redis::RedisStorage::connect(&settings.redis, settings.storage.cas_retries).await?,
        ),
        StorageBackend::Memory => Arc::new(memory::MemoryStorage::new()),
    };

    info!(backend = backend.backend_name(), "Storage backend ready");
    Ok(backend)
}
