//! Event document shared by the document-oriented adapters
//!
//! An event, its tag set and its attendances live in one value, so a single
//! atomic write of the document is a single atomic write of all three. The
//! Redis and in-memory adapters differ only in how they make that write
//! atomic; the state transitions are defined once here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Attendance, AttendanceStatus, Event, EventChanges, UserProfile};
use crate::storage::{EventSnapshot, JoinOutcome, LeaveOutcome, NewEvent, RosterEntry, UpdateOutcome};

/// Event with embedded tags and attendances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    pub event: Event,
    pub tags: Vec<String>,
    pub attendees: Vec<Attendance>,
}

impl From<NewEvent> for EventDocument {
    fn from(new_event: NewEvent) -> Self {
        Self {
            event: new_event.event,
            tags: new_event.tags,
            attendees: vec![new_event.founder],
        }
    }
}

impl EventDocument {
    pub fn active_count(&self) -> u32 {
        self.attendees.iter().filter(|a| a.is_active()).count() as u32
    }

    fn active_position(&self, user_id: Uuid) -> Option<usize> {
        self.attendees
            .iter()
            .position(|a| a.user_id == user_id && a.is_active())
    }

    /// Add an active attendance if the user is absent and a seat is free
    ///
    /// A cancelled record for the same user is replaced, keeping one record
    /// per (event, user).
    pub fn join(&mut self, attendance: Attendance) -> JoinOutcome {
        if self.active_position(attendance.user_id).is_some() {
            return JoinOutcome::AlreadyJoined;
        }

        if self.active_count() >= self.event.capacity {
            return JoinOutcome::Full;
        }

        self.attendees.retain(|a| a.user_id != attendance.user_id);
        self.attendees.push(attendance.clone());
        JoinOutcome::Joined(attendance)
    }

    pub fn leave(&mut self, user_id: Uuid) -> LeaveOutcome {
        if user_id == self.event.creator_id {
            return LeaveOutcome::CreatorPinned;
        }

        match self.active_position(user_id) {
            Some(index) => {
                self.attendees[index].status = AttendanceStatus::Cancelled;
                LeaveOutcome::Left
            }
            None => LeaveOutcome::NotAttending,
        }
    }

    pub fn update(
        &mut self,
        changes: &EventChanges,
        tags: Option<&[String]>,
        updated_at: DateTime<Utc>,
    ) -> UpdateOutcome {
        let attendees = self.active_count();
        if let Some(capacity) = changes.capacity {
            if capacity < attendees {
                return UpdateOutcome::CapacityBelowAttendance { attendees };
            }
        }

        changes.apply_to(&mut self.event);
        if let Some(tags) = tags {
            self.tags = tags.to_vec();
        }
        self.event.updated_at = updated_at;
        UpdateOutcome::Updated(self.event.clone())
    }

    /// Creator and every attendee, for profile lookups
    pub fn user_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.event.creator_id];
        ids.extend(self.attendees.iter().map(|a| a.user_id));
        ids.sort();
        ids.dedup();
        ids
    }

    /// Resolve user references into a snapshot
    pub fn into_snapshot(self, users: &HashMap<Uuid, UserProfile>) -> StorageResult<EventSnapshot> {
        let lookup = |id: Uuid| {
            users.get(&id).cloned().ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "event {} references unknown user {}",
                    self.event.id, id
                ))
            })
        };

        let creator = lookup(self.event.creator_id)?;
        let roster = self
            .attendees
            .iter()
            .map(|attendance| {
                Ok(RosterEntry {
                    user: lookup(attendance.user_id)?,
                    attendance: attendance.clone(),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(EventSnapshot {
            event: self.event,
            creator,
            tags: self.tags,
            roster,
        })
    }
}
