//! Redis document adapter
//!
//! Every event is one JSON document under `{prefix}:event:{id}` and the set
//! `{prefix}:events` indexes them. Writes read the document, apply the change
//! locally and publish it with a compare-and-swap script, retrying when another
//! writer got there first. Listings read all documents with a single `MGET`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::cache::{RedisConfig, RedisPool};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Attendance, Event, EventChanges, NewUser, User, UserProfile};
use crate::query::filters::EventQuery;
use crate::storage::document::EventDocument;
use crate::storage::{
    EventSnapshot, EventStorage, JoinOutcome, LeaveOutcome, NewEvent, StorageFuture,
    UpdateOutcome,
};

/// Stored form of a user, keeping the credential hash the API view hides
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            name: record.name,
            email: record.email,
            password_hash: record.password_hash,
            avatar: record.avatar,
            created_at: record.created_at,
        }
    }
}

/// Storage adapter backed by Redis documents
pub struct RedisStorage {
    pool: RedisPool,
    prefix: String,
    cas_retries: u32,
}

impl RedisStorage {
    pub async fn connect(config: &RedisConfig, cas_retries: u32) -> StorageResult<Self> {
        let pool = RedisPool::new(config).await?;
        Ok(Self {
            pool,
            prefix: config.key_prefix.clone(),
            cas_retries,
        })
    }

    fn event_key(&self, event_id: Uuid) -> String {
        format!("{}:event:{}", self.prefix, event_id)
    }

    fn event_index(&self) -> String {
        format!("{}:events", self.prefix)
    }

    fn user_key(&self, user_id: Uuid) -> String {
        format!("{}:user:{}", self.prefix, user_id)
    }

    fn email_key(&self, email: &str) -> String {
        format!("{}:user-email:{}", self.prefix, email.to_lowercase())
    }

    /// Apply `change` to the stored document with optimistic concurrency
    ///
    /// Returns `None` when the document does not exist. A document that keeps
    /// moving under us for `cas_retries` attempts yields a conflict.
    async fn mutate<T>(
        &self,
        event_id: Uuid,
        mut change: impl FnMut(&mut EventDocument) -> T,
    ) -> StorageResult<Option<T>> {
        let key = self.event_key(event_id);

        for attempt in 1..=self.cas_retries {
            let Some(current) = self.pool.get(&key).await? else {
                return Ok(None);
            };

            let mut document: EventDocument = serde_json::from_str(&current)?;
            let result = change(&mut document);
            let next = serde_json::to_string(&document)?;

            if next == current || self.pool.compare_and_swap(&key, &current, &next).await? {
                return Ok(Some(result));
            }

            debug!(%event_id, attempt, "Event document changed concurrently, retrying");
        }

        warn!(%event_id, retries = self.cas_retries, "Gave up writing contended event document");
        Err(StorageError::Conflict(format!(
            "event {} was modified concurrently",
            event_id
        )))
    }

    async fn document(&self, event_id: Uuid) -> StorageResult<Option<EventDocument>> {
        match self.pool.get(&self.event_key(event_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn profiles(&self, ids: &[Uuid]) -> StorageResult<HashMap<Uuid, UserProfile>> {
        let keys: Vec<String> = ids.iter().map(|id| self.user_key(*id)).collect();
        let mut profiles = HashMap::with_capacity(ids.len());
        for raw in self.pool.get_many(&keys).await?.into_iter().flatten() {
            let user = User::from(serde_json::from_str::<UserRecord>(&raw)?);
            profiles.insert(user.id, user.profile());
        }
        Ok(profiles)
    }

    async fn snapshots(&self, documents: Vec<EventDocument>) -> StorageResult<Vec<EventSnapshot>> {
        let mut ids: Vec<Uuid> = documents.iter().flat_map(|d| d.user_ids()).collect();
        ids.sort();
        ids.dedup();

        let profiles = self.profiles(&ids).await?;
        documents
            .into_iter()
            .map(|d| d.into_snapshot(&profiles))
            .collect()
    }
}

impl EventStorage for RedisStorage {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    fn insert_user(&self, user: NewUser) -> StorageFuture<'_, User> {
        Box::pin(async move {
            let record = UserRecord {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                avatar: user.avatar,
                created_at: Utc::now(),
            };
            let value = serde_json::to_string(&record)?;

            let inserted = self
                .pool
                .insert_unique(
                    &self.user_key(record.id),
                    &value,
                    &self.email_key(&record.email),
                    &record.id.to_string(),
                )
                .await?;
            if !inserted {
                return Err(StorageError::Conflict(format!(
                    "email {} is already registered",
                    record.email
                )));
            }

            Ok(User::from(record))
        })
    }

    fn find_user(&self, user_id: Uuid) -> StorageFuture<'_, Option<User>> {
        Box::pin(async move {
            match self.pool.get(&self.user_key(user_id)).await? {
                Some(raw) => Ok(Some(User::from(serde_json::from_str::<UserRecord>(&raw)?))),
                None => Ok(None),
            }
        })
    }

    fn insert_event(&self, new_event: NewEvent) -> StorageFuture<'_, Event> {
        Box::pin(async move {
            let event = new_event.event.clone();
            let value = serde_json::to_string(&EventDocument::from(new_event))?;

            let inserted = self
                .pool
                .insert_indexed(
                    &self.event_key(event.id),
                    &value,
                    &self.event_index(),
                    &event.id.to_string(),
                )
                .await?;
            if !inserted {
                return Err(StorageError::Conflict(format!("event {} already exists", event.id)));
            }

            Ok(event)
        })
    }

    fn find_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<Event>> {
        Box::pin(async move { Ok(self.document(event_id).await?.map(|d| d.event)) })
    }

    fn update_event(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        tags: Option<Vec<String>>,
        updated_at: DateTime<Utc>,
    ) -> StorageFuture<'_, UpdateOutcome> {
        Box::pin(async move {
            let outcome = self
                .mutate(event_id, |doc| doc.update(&changes, tags.as_deref(), updated_at))
                .await?;
            Ok(outcome.unwrap_or(UpdateOutcome::EventMissing))
        })
    }

    fn delete_event(&self, event_id: Uuid) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let key = self.event_key(event_id);
            let index = self.event_index();
            let member = event_id.to_string();

            for _ in 0..self.cas_retries {
                let Some(current) = self.pool.get(&key).await? else {
                    return Ok(false);
                };
                if self
                    .pool
                    .delete_indexed(&key, &current, &index, &member)
                    .await?
                {
                    return Ok(true);
                }
            }

            Err(StorageError::Conflict(format!(
                "event {} was modified concurrently",
                event_id
            )))
        })
    }

    fn join(&self, attendance: Attendance) -> StorageFuture<'_, JoinOutcome> {
        Box::pin(async move {
            let outcome = self
                .mutate(attendance.event_id, |doc| doc.join(attendance.clone()))
                .await?;
            Ok(outcome.unwrap_or(JoinOutcome::EventMissing))
        })
    }

    fn leave(&self, event_id: Uuid, user_id: Uuid) -> StorageFuture<'_, LeaveOutcome> {
        Box::pin(async move {
            let outcome = self.mutate(event_id, |doc| doc.leave(user_id)).await?;
            Ok(outcome.unwrap_or(LeaveOutcome::EventMissing))
        })
    }

    fn replace_tags(&self, event_id: Uuid, tags: Vec<String>) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let outcome = self
                .mutate(event_id, |doc| doc.tags = tags.clone())
                .await?;
            Ok(outcome.is_some())
        })
    }

    fn tags_for(&self, event_id: Uuid) -> StorageFuture<'_, Option<Vec<String>>> {
        Box::pin(async move { Ok(self.document(event_id).await?.map(|d| d.tags)) })
    }

    fn load_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<EventSnapshot>> {
        Box::pin(async move {
            let Some(document) = self.document(event_id).await? else {
                return Ok(None);
            };
            Ok(self.snapshots(vec![document]).await?.pop())
        })
    }

    fn query_events(&self, query: EventQuery) -> StorageFuture<'_, Vec<EventSnapshot>> {
        Box::pin(async move {
            let keys: Vec<String> = self
                .pool
                .members(&self.event_index())
                .await?
                .into_iter()
                .map(|member| format!("{}:event:{}", self.prefix, member))
                .collect();

            // Documents deleted between SMEMBERS and MGET come back empty.
            let documents = self
                .pool
                .get_many(&keys)
                .await?
                .into_iter()
                .flatten()
                .map(|raw| serde_json::from_str::<EventDocument>(&raw))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(query.select(self.snapshots(documents).await?))
        })
    }

    fn health_check(&self) -> StorageFuture<'_, bool> {
        Box::pin(async move { Ok(self.pool.health_check().await?) })
    }

    fn close(&self) -> StorageFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> RedisStorage {
        RedisStorage::connect(
            &RedisConfig {
                url: "redis://localhost:6379".to_string(),
                key_prefix: "events-unit".to_string(),
            },
            5,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_key_layout() {
        let storage = storage().await;
        let id = Uuid::nil();

        assert_eq!(
            storage.event_key(id),
            "events-unit:event:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(storage.event_index(), "events-unit:events");
        assert_eq!(
            storage.email_key("Ayse@Example.com"),
            "events-unit:user-email:ayse@example.com"
        );
    }

    #[test]
    fn test_user_record_keeps_password_hash() {
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: "Mehmet Kaya".to_string(),
            email: "mehmet@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            avatar: None,
            created_at: Utc::now(),
        };

        let raw = serde_json::to_string(&record).unwrap();
        let user = User::from(serde_json::from_str::<UserRecord>(&raw).unwrap());
        assert_eq!(user.password_hash, "$argon2id$stub");
    }
}
