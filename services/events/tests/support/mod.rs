//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use events::models::{Event, EventDraft, NewUser, User};
use events::state::EventServices;
use events::storage::{Storage, memory::MemoryStorage};

pub struct Harness {
    pub storage: Storage,
    pub services: EventServices,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Storage::new(Arc::new(MemoryStorage::new()), Duration::from_secs(5));
        Self {
            services: EventServices::new(storage.clone()),
            storage,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.storage
            .backend()
            .insert_user(NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
                password_hash: "$argon2id$test".to_string(),
                avatar: Some(format!("https://example.com/{}.png", name.to_lowercase())),
            })
            .await
            .expect("user insert")
    }

    pub async fn event(&self, creator: &User, draft: EventDraft) -> Event {
        self.services
            .events
            .create(draft, creator.id)
            .await
            .expect("event create")
    }
}

/// A valid draft scheduled `days_ahead` days from today
pub fn draft(name: &str, days_ahead: i64, capacity: u32) -> EventDraft {
    EventDraft {
        name: name.to_string(),
        description: format!("{} for everyone who wants to come", name),
        date: (Local::now() + chrono::Duration::days(days_ahead)).date_naive(),
        time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
        location: "Moda, Istanbul".to_string(),
        image: None,
        capacity,
        tags: Vec::new(),
    }
}
