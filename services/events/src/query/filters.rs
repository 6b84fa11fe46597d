//! Listing filters, ordering and pagination
//!
//! These types travel through the storage port. The relational adapter
//! translates them into SQL; the document adapters evaluate them here with
//! [`EventQuery::select`], so every backend answers a listing the same way.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::storage::EventSnapshot;

/// Independently optional listing filters, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventFilters {
    /// Case-insensitive substring of name, description or location
    pub search: Option<String>,
    /// Exact, case-sensitive tag
    pub tag: Option<String>,
    /// Case-insensitive substring of location
    pub location: Option<String>,
    /// Exact calendar date
    pub date: Option<NaiveDate>,
}

impl EventFilters {
    /// Blank text filters are treated as absent; others are kept verbatim
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        Self {
            search: keep(self.search),
            tag: keep(self.tag),
            location: keep(self.location),
            date: self.date,
        }
    }

    pub fn matches(&self, snapshot: &EventSnapshot) -> bool {
        let event = &snapshot.event;

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = [&event.name, &event.description, &event.location]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        if let Some(tag) = &self.tag {
            if !snapshot.tags.iter().any(|t| t == tag) {
                return false;
            }
        }

        if let Some(location) = &self.location {
            if !event
                .location
                .to_lowercase()
                .contains(&location.to_lowercase())
            {
                return false;
            }
        }

        if let Some(date) = self.date {
            if event.date != date {
                return false;
            }
        }

        true
    }
}

/// Offset pagination applied after filtering and ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// `None` returns every remaining row
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    /// Page from raw request values; the limit is clamped into 1..=100
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: Some(
                limit
                    .unwrap_or(Self::DEFAULT_LIMIT)
                    .clamp(1, Self::MAX_LIMIT),
            ),
            offset: offset.unwrap_or(0),
        }
    }

    /// Every row, used by aggregate reads
    pub fn unbounded() -> Self {
        Self {
            limit: None,
            offset: 0,
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let rows = items.into_iter().skip(self.offset as usize);
        match self.limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Which events a query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    All,
    CreatedBy(Uuid),
    /// Events the user actively attends
    JoinedBy(Uuid),
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    /// date, time, then creation
    Schedule,
    /// creation time, newest first
    NewestFirst,
    /// the given user's join time, most recent first
    LatestJoinedBy(Uuid),
}

/// Complete read request handed to the storage port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub filters: EventFilters,
    pub scope: EventScope,
    pub order: EventOrder,
    pub page: Pagination,
}

impl EventQuery {
    /// Public listing ordered by schedule
    pub fn listing(filters: EventFilters, page: Pagination) -> Self {
        Self {
            filters: filters.normalized(),
            scope: EventScope::All,
            order: EventOrder::Schedule,
            page,
        }
    }

    pub fn created_by(user_id: Uuid, page: Pagination) -> Self {
        Self {
            filters: EventFilters::default(),
            scope: EventScope::CreatedBy(user_id),
            order: EventOrder::NewestFirst,
            page,
        }
    }

    pub fn joined_by(user_id: Uuid, page: Pagination) -> Self {
        Self {
            filters: EventFilters::default(),
            scope: EventScope::JoinedBy(user_id),
            order: EventOrder::LatestJoinedBy(user_id),
            page,
        }
    }

    pub fn matches(&self, snapshot: &EventSnapshot) -> bool {
        let in_scope = match self.scope {
            EventScope::All => true,
            EventScope::CreatedBy(user_id) => snapshot.event.creator_id == user_id,
            EventScope::JoinedBy(user_id) => snapshot.active_entry(user_id).is_some(),
        };

        in_scope && self.filters.matches(snapshot)
    }

    pub fn compare(&self, a: &EventSnapshot, b: &EventSnapshot) -> Ordering {
        let (ea, eb) = (&a.event, &b.event);
        let primary = match self.order {
            EventOrder::Schedule => ea
                .date
                .cmp(&eb.date)
                .then(ea.time.cmp(&eb.time))
                .then(ea.created_at.cmp(&eb.created_at)),
            EventOrder::NewestFirst => eb.created_at.cmp(&ea.created_at),
            EventOrder::LatestJoinedBy(user_id) => {
                let joined_at =
                    |s: &EventSnapshot| s.active_entry(user_id).map(|e| e.attendance.joined_at);
                joined_at(b).cmp(&joined_at(a))
            }
        };

        primary.then(ea.id.cmp(&eb.id))
    }

    /// Filter, order and paginate in memory
    pub fn select(&self, snapshots: Vec<EventSnapshot>) -> Vec<EventSnapshot> {
        let mut selected: Vec<EventSnapshot> =
            snapshots.into_iter().filter(|s| self.matches(s)).collect();
        selected.sort_by(|a, b| self.compare(a, b));
        self.page.apply(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps_limit() {
        assert_eq!(Pagination::new(None, None).limit, Some(50));
        assert_eq!(Pagination::new(Some(0), None).limit, Some(1));
        assert_eq!(Pagination::new(Some(500), Some(3)).limit, Some(100));
        assert_eq!(Pagination::new(Some(500), Some(3)).offset, 3);
    }

    #[test]
    fn test_pagination_apply() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Pagination::new(Some(3), Some(2)).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Pagination::new(Some(5), Some(8)).apply(items.clone()), vec![8, 9]);
        assert_eq!(Pagination::unbounded().apply(items).len(), 10);
    }

    #[test]
    fn test_blank_filters_are_dropped() {
        let filters = EventFilters {
            search: Some("  ".to_string()),
            tag: Some(String::new()),
            location: Some(" Istanbul ".to_string()),
            date: None,
        }
        .normalized();

        assert_eq!(filters.search, None);
        assert_eq!(filters.tag, None);
        assert_eq!(filters.location.as_deref(), Some(" Istanbul "));
    }
}
