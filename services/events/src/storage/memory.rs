//! In-process document adapter
//!
//! Each event lives in its own slot holding an immutable document. Writers
//! serialize on the slot's mutex and publish a fresh document, so readers
//! always clone a complete version and never observe a half-applied write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Attendance, Event, EventChanges, NewUser, User, UserProfile};
use crate::query::filters::EventQuery;
use crate::storage::document::EventDocument;
use crate::storage::{
    EventSnapshot, EventStorage, JoinOutcome, LeaveOutcome, NewEvent, StorageFuture,
    UpdateOutcome,
};

struct EventSlot {
    writer: Mutex<()>,
    /// `None` once the event is deleted
    current: RwLock<Option<Arc<EventDocument>>>,
}

impl EventSlot {
    fn new(document: EventDocument) -> Self {
        Self {
            writer: Mutex::new(()),
            current: RwLock::new(Some(Arc::new(document))),
        }
    }

    async fn read(&self) -> Option<Arc<EventDocument>> {
        self.current.read().await.clone()
    }

    /// Run `change` on a private copy and publish it
    ///
    /// Returns `None` if the event is gone.
    async fn mutate<T>(&self, change: impl FnOnce(&mut EventDocument) -> T) -> Option<T> {
        let _guard = self.writer.lock().await;
        let mut draft = EventDocument::clone(self.read().await?.as_ref());
        let result = change(&mut draft);
        *self.current.write().await = Some(Arc::new(draft));
        Some(result)
    }
}

/// Storage adapter backed by process memory
#[derive(Default)]
pub struct MemoryStorage {
    events: RwLock<HashMap<Uuid, Arc<EventSlot>>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, event_id: Uuid) -> Option<Arc<EventSlot>> {
        self.events.read().await.get(&event_id).cloned()
    }

    async fn document(&self, event_id: Uuid) -> Option<Arc<EventDocument>> {
        self.slot(event_id).await?.read().await
    }

    async fn profiles(&self, ids: impl IntoIterator<Item = Uuid>) -> HashMap<Uuid, UserProfile> {
        let users = self.users.read().await;
        ids.into_iter()
            .filter_map(|id| users.get(&id).map(|u| (id, u.profile())))
            .collect()
    }

    async fn snapshot(&self, document: Arc<EventDocument>) -> StorageResult<EventSnapshot> {
        let profiles = self.profiles(document.user_ids()).await;
        EventDocument::clone(&document).into_snapshot(&profiles)
    }
}

impl EventStorage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn insert_user(&self, user: NewUser) -> StorageFuture<'_, User> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            if users
                .values()
                .any(|u| u.email.to_lowercase() == user.email.to_lowercase())
            {
                return Err(StorageError::Conflict(format!(
                    "email {} is already registered",
                    user.email
                )));
            }

            let record = User {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                avatar: user.avatar,
                created_at: Utc::now(),
            };
            users.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn find_user(&self, user_id: Uuid) -> StorageFuture<'_, Option<User>> {
        Box::pin(async move { Ok(self.users.read().await.get(&user_id).cloned()) })
    }

    fn insert_event(&self, new_event: NewEvent) -> StorageFuture<'_, Event> {
        Box::pin(async move {
            let event = new_event.event.clone();
            let mut events = self.events.write().await;
            if events.contains_key(&event.id) {
                return Err(StorageError::Conflict(format!("event {} already exists", event.id)));
            }
            events.insert(event.id, Arc::new(EventSlot::new(EventDocument::from(new_event))));
            Ok(event)
        })
    }

    fn find_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<Event>> {
        Box::pin(async move { Ok(self.document(event_id).await.map(|d| d.event.clone())) })
    }

    fn update_event(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        tags: Option<Vec<String>>,
        updated_at: DateTime<Utc>,
    ) -> StorageFuture<'_, UpdateOutcome> {
        Box::pin(async move {
            let Some(slot) = self.slot(event_id).await else {
                return Ok(UpdateOutcome::EventMissing);
            };
            Ok(slot
                .mutate(|doc| doc.update(&changes, tags.as_deref(), updated_at))
                .await
                .unwrap_or(UpdateOutcome::EventMissing))
        })
    }

    fn delete_event(&self, event_id: Uuid) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let Some(slot) = self.slot(event_id).await else {
                return Ok(false);
            };

            let _guard = slot.writer.lock().await;
            let existed = slot.current.write().await.take().is_some();
            self.events.write().await.remove(&event_id);
            Ok(existed)
        })
    }

    fn join(&self, attendance: Attendance) -> StorageFuture<'_, JoinOutcome> {
        Box::pin(async move {
            let Some(slot) = self.slot(attendance.event_id).await else {
                return Ok(JoinOutcome::EventMissing);
            };
            Ok(slot
                .mutate(|doc| doc.join(attendance))
                .await
                .unwrap_or(JoinOutcome::EventMissing))
        })
    }

    fn leave(&self, event_id: Uuid, user_id: Uuid) -> StorageFuture<'_, LeaveOutcome> {
        Box::pin(async move {
            let Some(slot) = self.slot(event_id).await else {
                return Ok(LeaveOutcome::EventMissing);
            };
            Ok(slot
                .mutate(|doc| doc.leave(user_id))
                .await
                .unwrap_or(LeaveOutcome::EventMissing))
        })
    }

    fn replace_tags(&self, event_id: Uuid, tags: Vec<String>) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let Some(slot) = self.slot(event_id).await else {
                return Ok(false);
            };
            Ok(slot.mutate(|doc| doc.tags = tags).await.is_some())
        })
    }

    fn tags_for(&self, event_id: Uuid) -> StorageFuture<'_, Option<Vec<String>>> {
        Box::pin(async move { Ok(self.document(event_id).await.map(|d| d.tags.clone())) })
    }

    fn load_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<EventSnapshot>> {
        Box::pin(async move {
            match self.document(event_id).await {
                Some(document) => Ok(Some(self.snapshot(document).await?)),
                None => Ok(None),
            }
        })
    }

    fn query_events(&self, query: EventQuery) -> StorageFuture<'_, Vec<EventSnapshot>> {
        Box::pin(async move {
            let slots: Vec<Arc<EventSlot>> = self.events.read().await.values().cloned().collect();

            let mut snapshots = Vec::with_capacity(slots.len());
            for slot in slots {
                if let Some(document) = slot.read().await {
                    snapshots.push(self.snapshot(document).await?);
                }
            }

            Ok(query.select(snapshots))
        })
    }

    fn health_check(&self) -> StorageFuture<'_, bool> {
        Box::pin(async { Ok(true) })
    }

    fn close(&self) -> StorageFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
