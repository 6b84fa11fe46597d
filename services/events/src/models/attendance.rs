//! Attendance model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attendance status
///
/// `Pending` is reserved; nothing in the service produces it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Joined,
    Pending,
    Cancelled,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Joined => "joined",
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(AttendanceStatus::Joined),
            "pending" => Ok(AttendanceStatus::Pending),
            "cancelled" => Ok(AttendanceStatus::Cancelled),
            other => Err(format!("unknown attendance status `{}`", other)),
        }
    }
}

/// One user's attendance record for one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
    pub joined_at: DateTime<Utc>,
}

impl Attendance {
    /// Fresh active attendance
    pub fn joined(event_id: Uuid, user_id: Uuid, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            status: AttendanceStatus::Joined,
            joined_at,
        }
    }

    /// Only active attendances count toward capacity
    pub fn is_active(&self) -> bool {
        self.status == AttendanceStatus::Joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            AttendanceStatus::Joined,
            AttendanceStatus::Pending,
            AttendanceStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<AttendanceStatus>(), Ok(status));
        }
        assert!("left".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn test_only_joined_is_active() {
        let mut attendance = Attendance::joined(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert!(attendance.is_active());

        attendance.status = AttendanceStatus::Cancelled;
        assert!(!attendance.is_active());
    }
}
