//! Domain models and view payloads

pub mod attendance;
pub mod event;
pub mod user;

pub use attendance::{Attendance, AttendanceStatus};
pub use event::{
    ActivityItem, ActivityKind, AttendeeView, CreatorView, Event, EventChanges, EventDetail,
    EventDraft, EventPatch, EventSummary, JoinedEventSummary, UserOverview, UserStats,
};
pub use user::{NewUser, Principal, User, UserProfile};
