//! Attendance registry
//!
//! Joining and leaving events. The capacity check and the insert are delegated
//! to the storage port as one conditional write, so concurrent joins on a
//! nearly full event can never overbook it.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EventError, EventResult};
use crate::models::Attendance;
use crate::storage::{JoinOutcome, LeaveOutcome, Storage};

/// Manages event attendance
#[derive(Clone)]
pub struct AttendanceRegistry {
    storage: Storage,
}

impl AttendanceRegistry {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The creator's attendance, written together with a new event
    pub fn founding_attendance(event_id: Uuid, creator_id: Uuid) -> Attendance {
        Attendance::joined(event_id, creator_id, Utc::now())
    }

    /// Join an event
    ///
    /// Users are never removed, so resolving the joiner ahead of the
    /// conditional write keeps every roster entry resolvable.
    pub async fn join(&self, event_id: Uuid, user_id: Uuid) -> EventResult<Attendance> {
        let backend = self.storage.backend();
        self.storage
            .bounded(backend.find_user(user_id))
            .await?
            .ok_or_else(|| EventError::user_not_found(user_id))?;

        let attendance = Attendance::joined(event_id, user_id, Utc::now());

        let outcome = self
            .storage
            .bounded(backend.join(attendance))
            .await?;

        match outcome {
            JoinOutcome::Joined(attendance) => {
                info!(%event_id, %user_id, attendance_id = %attendance.id, "User joined event");
                Ok(attendance)
            }
            JoinOutcome::AlreadyJoined => Err(EventError::AlreadyJoined),
            JoinOutcome::Full => {
                debug!(%event_id, %user_id, "Join refused, event is full");
                Err(EventError::EventFull)
            }
            JoinOutcome::EventMissing => Err(EventError::event_not_found(event_id)),
        }
    }

    /// Leave an event
    pub async fn leave(&self, event_id: Uuid, user_id: Uuid) -> EventResult<()> {
        let outcome = self
            .storage
            .bounded(self.storage.backend().leave(event_id, user_id))
            .await?;

        match outcome {
            LeaveOutcome::Left => {
                info!(%event_id, %user_id, "User left event");
                Ok(())
            }
            LeaveOutcome::NotAttending => Err(EventError::NotAttending),
            LeaveOutcome::CreatorPinned => Err(EventError::CreatorCannotLeave),
            LeaveOutcome::EventMissing => Err(EventError::event_not_found(event_id)),
        }
    }
}
