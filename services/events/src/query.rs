//! Read side: listings, event detail and per-user views
//!
//! Every method issues a single storage read and derives its aggregates
//! (attendee counts, tag lists, creator fields) from the returned snapshots,
//! so a view never mixes data from two different instants.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::error::{EventError, EventResult};
use crate::models::{
    ActivityItem, ActivityKind, AttendeeView, CreatorView, EventDetail, EventSummary,
    JoinedEventSummary, UserOverview, UserStats,
};
use crate::storage::{EventSnapshot, Storage};

pub mod filters;

use filters::{EventFilters, EventQuery, Pagination};

/// Entries taken from each of the created and joined feeds
pub const RECENT_PER_KIND: usize = 5;
/// Length of the merged activity feed
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Denormalized listing entry for one snapshot
pub fn summarize(snapshot: &EventSnapshot) -> EventSummary {
    let event = &snapshot.event;
    EventSummary {
        id: event.id,
        name: event.name.clone(),
        description: event.description.clone(),
        date: event.date,
        time: event.time,
        location: event.location.clone(),
        image: event.image.clone(),
        capacity: event.capacity,
        attendee_count: snapshot.active().count() as u32,
        creator_name: snapshot.creator.name.clone(),
        creator_id: snapshot.creator.id,
        tags: snapshot.tags.clone(),
        created_at: event.created_at,
        updated_at: event.updated_at,
    }
}

/// Full view of one snapshot as seen by `requester`
pub fn detail(snapshot: &EventSnapshot, requester: Option<Uuid>) -> EventDetail {
    let mut attendees: Vec<AttendeeView> = snapshot
        .active()
        .map(|entry| AttendeeView {
            id: entry.user.id,
            name: entry.user.name.clone(),
            avatar: entry.user.avatar.clone(),
            joined_at: entry.attendance.joined_at,
        })
        .collect();
    attendees.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));

    EventDetail {
        summary: summarize(snapshot),
        creator: CreatorView {
            id: snapshot.creator.id,
            name: snapshot.creator.name.clone(),
            email: snapshot.creator.email.clone(),
        },
        is_attending: requester.is_some_and(|user_id| snapshot.active_entry(user_id).is_some()),
        attendees_list: attendees,
    }
}

/// Counters over the snapshots of every event `user_id` actively attends
///
/// A creator always attends their own events, so these snapshots cover the
/// created ones too.
fn stats_from(user_id: Uuid, attended: &[EventSnapshot]) -> UserStats {
    let connections: HashSet<Uuid> = attended
        .iter()
        .flat_map(|snapshot| snapshot.active())
        .map(|entry| entry.user.id)
        .filter(|id| *id != user_id)
        .collect();

    UserStats {
        events_created: attended
            .iter()
            .filter(|s| s.event.creator_id == user_id)
            .count() as u32,
        events_joined: attended.len() as u32,
        connections: connections.len() as u32,
    }
}

/// Latest created events merged with latest joins of other users' events
fn activity_from(user_id: Uuid, attended: &[EventSnapshot]) -> Vec<ActivityItem> {
    let item = |kind, snapshot: &EventSnapshot, timestamp| ActivityItem {
        kind,
        event_id: snapshot.event.id,
        event_name: snapshot.event.name.clone(),
        timestamp,
    };

    let mut created: Vec<ActivityItem> = attended
        .iter()
        .filter(|s| s.event.creator_id == user_id)
        .map(|s| item(ActivityKind::Created, s, s.event.created_at))
        .collect();
    let mut joined: Vec<ActivityItem> = attended
        .iter()
        .filter(|s| s.event.creator_id != user_id)
        .filter_map(|s| {
            let entry = s.active_entry(user_id)?;
            Some(item(ActivityKind::Joined, s, entry.attendance.joined_at))
        })
        .collect();

    let newest_first = |a: &ActivityItem, b: &ActivityItem| {
        b.timestamp.cmp(&a.timestamp).then(a.event_id.cmp(&b.event_id))
    };
    created.sort_by(newest_first);
    joined.sort_by(newest_first);
    created.truncate(RECENT_PER_KIND);
    joined.truncate(RECENT_PER_KIND);

    let mut feed = created;
    feed.append(&mut joined);
    feed.sort_by(newest_first);
    feed.truncate(RECENT_ACTIVITY_LIMIT);
    feed
}

/// Answers read requests from storage snapshots
#[derive(Clone)]
pub struct QueryEngine {
    storage: Storage,
}

impl QueryEngine {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn read(&self, query: EventQuery) -> EventResult<Vec<EventSnapshot>> {
        let snapshots = self
            .storage
            .bounded(self.storage.backend().query_events(query))
            .await?;
        Ok(snapshots)
    }

    /// Filtered listing ordered by date and time
    pub async fn list(
        &self,
        filters: EventFilters,
        page: Pagination,
    ) -> EventResult<Vec<EventSummary>> {
        let snapshots = self.read(EventQuery::listing(filters, page)).await?;
        debug!(count = snapshots.len(), "Listed events");
        Ok(snapshots.iter().map(summarize).collect())
    }

    /// One event with creator and roster
    pub async fn get(&self, event_id: Uuid, requester: Option<Uuid>) -> EventResult<EventDetail> {
        let snapshot = self
            .storage
            .bounded(self.storage.backend().load_event(event_id))
            .await?
            .ok_or_else(|| EventError::event_not_found(event_id))?;

        Ok(detail(&snapshot, requester))
    }

    /// Events created by the user, newest first
    pub async fn created_by(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> EventResult<Vec<EventSummary>> {
        let snapshots = self.read(EventQuery::created_by(user_id, page)).await?;
        Ok(snapshots.iter().map(summarize).collect())
    }

    /// Events the user attends, most recently joined first
    pub async fn joined_by(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> EventResult<Vec<JoinedEventSummary>> {
        let snapshots = self.read(EventQuery::joined_by(user_id, page)).await?;

        Ok(snapshots
            .iter()
            .filter_map(|snapshot| {
                let entry = snapshot.active_entry(user_id)?;
                Some(JoinedEventSummary {
                    summary: summarize(snapshot),
                    joined_at: entry.attendance.joined_at,
                })
            })
            .collect())
    }

    async fn attended_by(&self, user_id: Uuid) -> EventResult<Vec<EventSnapshot>> {
        self.read(EventQuery::joined_by(user_id, Pagination::unbounded()))
            .await
    }

    /// Activity counters for one user
    pub async fn user_stats(&self, user_id: Uuid) -> EventResult<UserStats> {
        let attended = self.attended_by(user_id).await?;
        Ok(stats_from(user_id, &attended))
    }

    /// Up to ten recent creations and joins, newest first
    pub async fn recent_activity(&self, user_id: Uuid) -> EventResult<Vec<ActivityItem>> {
        let attended = self.attended_by(user_id).await?;
        Ok(activity_from(user_id, &attended))
    }

    /// Counters and activity feed from one read
    pub async fn overview(&self, user_id: Uuid) -> EventResult<UserOverview> {
        let attended = self.attended_by(user_id).await?;
        Ok(UserOverview {
            stats: stats_from(user_id, &attended),
            recent_activity: activity_from(user_id, &attended),
        })
    }
}
