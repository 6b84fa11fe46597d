//! Event lifecycle: create, update, delete
//!
//! Only the creator may modify or delete an event. Creation writes the event,
//! the creator's attendance and the tag set in one storage call.

use chrono::{Local, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::attendance::AttendanceRegistry;
use crate::error::{EventError, EventResult};
use crate::models::{Event, EventChanges, EventDraft, EventPatch};
use crate::storage::{NewEvent, Storage, UpdateOutcome};
use crate::tags::TagIndex;

/// Smallest accepted capacity
pub const MIN_CAPACITY: u32 = 1;

/// Largest accepted capacity
pub const MAX_CAPACITY: u32 = 1000;

/// Creates, updates and deletes events
#[derive(Clone)]
pub struct EventStore {
    storage: Storage,
}

impl EventStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Create an event owned by `creator_id`, who also becomes its first attendee
    pub async fn create(&self, draft: EventDraft, creator_id: Uuid) -> EventResult<Event> {
        let backend = self.storage.backend();

        if self
            .storage
            .bounded(backend.find_user(creator_id))
            .await?
            .is_none()
        {
            return Err(EventError::user_not_found(creator_id));
        }

        let starts_at = NaiveDateTime::new(draft.date, draft.time);
        if starts_at < Local::now().naive_local() {
            return Err(EventError::InvalidDate);
        }

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            date: draft.date,
            time: draft.time,
            location: draft.location,
            image: draft.image.filter(|url| !url.is_empty()),
            capacity: draft.capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
            creator_id,
            created_at: now,
            updated_at: now,
        };
        let new_event = NewEvent {
            founder: AttendanceRegistry::founding_attendance(event.id, creator_id),
            tags: TagIndex::normalize(draft.tags),
            event,
        };

        let event = self.storage.bounded(backend.insert_event(new_event)).await?;
        info!(event_id = %event.id, %creator_id, "Event created");
        Ok(event)
    }

    /// Apply a partial update; only the creator may do so
    pub async fn update(
        &self,
        event_id: Uuid,
        patch: EventPatch,
        requester_id: Uuid,
    ) -> EventResult<Event> {
        let backend = self.storage.backend();
        self.authorize(event_id, requester_id).await?;

        if patch.is_empty() {
            return Err(EventError::NoUpdates);
        }

        let tags = patch.tags.map(TagIndex::normalize);
        let changes = EventChanges {
            name: patch.name,
            description: patch.description,
            date: patch.date,
            time: patch.time,
            location: patch.location,
            image: patch
                .image
                .map(|url| if url.is_empty() { None } else { Some(url) }),
            capacity: patch
                .capacity
                .map(|capacity| capacity.clamp(MIN_CAPACITY, MAX_CAPACITY)),
        };
        let capacity = changes.capacity;

        let outcome = self
            .storage
            .bounded(backend.update_event(event_id, changes, tags, Utc::now()))
            .await?;

        match outcome {
            UpdateOutcome::Updated(event) => {
                info!(%event_id, "Event updated");
                Ok(event)
            }
            UpdateOutcome::CapacityBelowAttendance { attendees } => {
                Err(EventError::CapacityBelowAttendance {
                    capacity: capacity.unwrap_or_default(),
                    attendees,
                })
            }
            UpdateOutcome::EventMissing => Err(EventError::event_not_found(event_id)),
        }
    }

    /// Delete an event with its attendances and tags; only the creator may do so
    pub async fn delete(&self, event_id: Uuid, requester_id: Uuid) -> EventResult<()> {
        self.authorize(event_id, requester_id).await?;

        let deleted = self
            .storage
            .bounded(self.storage.backend().delete_event(event_id))
            .await?;
        if !deleted {
            return Err(EventError::event_not_found(event_id));
        }

        info!(%event_id, "Event deleted");
        Ok(())
    }

    async fn authorize(&self, event_id: Uuid, requester_id: Uuid) -> EventResult<Event> {
        let event = self
            .storage
            .bounded(self.storage.backend().find_event(event_id))
            .await?
            .ok_or_else(|| EventError::event_not_found(event_id))?;

        if event.creator_id != requester_id {
            warn!(%event_id, %requester_id, "Refused modification by non-creator");
            return Err(EventError::Unauthorized);
        }

        Ok(event)
    }
}
