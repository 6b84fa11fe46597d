//! Application state shared across handlers

use std::sync::Arc;

use crate::attendance::AttendanceRegistry;
use crate::event_store::EventStore;
use crate::middleware::JwtVerifier;
use crate::query::QueryEngine;
use crate::storage::{EventStorage, Storage};
use crate::tags::TagIndex;

/// The event core components, all sharing one storage handle
#[derive(Clone)]
pub struct EventServices {
    pub events: EventStore,
    pub attendance: AttendanceRegistry,
    pub tags: TagIndex,
    pub query: QueryEngine,
}

impl EventServices {
    pub fn new(storage: Storage) -> Self {
        Self {
            events: EventStore::new(storage.clone()),
            attendance: AttendanceRegistry::new(storage.clone()),
            tags: TagIndex::new(storage.clone()),
            query: QueryEngine::new(storage),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: EventServices,
    pub storage: Storage,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(storage: Storage, jwt: JwtVerifier) -> Self {
        Self {
            services: EventServices::new(storage.clone()),
            storage,
            jwt: Arc::new(jwt),
        }
    }

    pub fn backend(&self) -> &dyn EventStorage {
        self.storage.backend()
    }
}
