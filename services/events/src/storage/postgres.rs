//! PostgreSQL adapter
//!
//! Writes run in a transaction that first locks the event row, so every
//! mutation of one event (join, leave, update, tag replacement) is serialized
//! on that lock. Reads run in a read-only `REPEATABLE READ` transaction and see
//! events, tags and rosters as of one instant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::database::{self, DatabaseConfig};
use common::error::DatabaseError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    Attendance, AttendanceStatus, Event, EventChanges, NewUser, User, UserProfile,
};
use crate::query::filters::{EventOrder, EventQuery, EventScope};
use crate::storage::{
    EventSnapshot, EventStorage, JoinOutcome, LeaveOutcome, NewEvent, RosterEntry,
    StorageFuture, UpdateOutcome,
};

const EVENT_COLUMNS: &str = "e.id, e.name, e.description, e.event_date, e.event_time, \
     e.location, e.image, e.capacity, e.creator_id, e.created_at, e.updated_at";

const CREATOR_COLUMNS: &str =
    "u.name AS creator_name, u.email AS creator_email, u.avatar AS creator_avatar";

fn query_err(err: sqlx::Error) -> StorageError {
    StorageError::Database(DatabaseError::Query(err))
}

/// Like [`query_err`], but a unique violation becomes a conflict
fn insert_err(err: sqlx::Error) -> StorageError {
    let err = DatabaseError::Query(err);
    if err.is_unique_violation() {
        StorageError::Conflict(err.to_string())
    } else {
        StorageError::Database(err)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(query_err)
}

fn capacity_to_db(capacity: u32) -> StorageResult<i32> {
    i32::try_from(capacity)
        .map_err(|_| StorageError::Corrupt(format!("capacity {} out of range", capacity)))
}

fn event_from_row(row: &PgRow) -> StorageResult<Event> {
    let capacity: i32 = column(row, "capacity")?;
    Ok(Event {
        id: column(row, "id")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        date: column(row, "event_date")?,
        time: column(row, "event_time")?,
        location: column(row, "location")?,
        image: column(row, "image")?,
        capacity: u32::try_from(capacity)
            .map_err(|_| StorageError::Corrupt(format!("negative capacity {}", capacity)))?,
        creator_id: column(row, "creator_id")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn creator_from_row(row: &PgRow) -> StorageResult<UserProfile> {
    Ok(UserProfile {
        id: column(row, "creator_id")?,
        name: column(row, "creator_name")?,
        email: column(row, "creator_email")?,
        avatar: column(row, "creator_avatar")?,
    })
}

fn user_from_row(row: &PgRow) -> StorageResult<User> {
    Ok(User {
        id: column(row, "id")?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        avatar: column(row, "avatar")?,
        created_at: column(row, "created_at")?,
    })
}

fn roster_entry_from_row(row: &PgRow) -> StorageResult<RosterEntry> {
    let status: String = column(row, "status")?;
    let user_id: Uuid = column(row, "user_id")?;
    Ok(RosterEntry {
        attendance: Attendance {
            id: column(row, "id")?,
            event_id: column(row, "event_id")?,
            user_id,
            status: status.parse().map_err(StorageError::Corrupt)?,
            joined_at: column(row, "joined_at")?,
        },
        user: UserProfile {
            id: user_id,
            name: column(row, "name")?,
            email: column(row, "email")?,
            avatar: column(row, "avatar")?,
        },
    })
}

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Replace the tag rows of one event inside `tx`
async fn write_tags(
    tx: &mut Transaction<'static, Postgres>,
    event_id: Uuid,
    tags: &[String],
) -> StorageResult<()> {
    sqlx::query("DELETE FROM event_tags WHERE event_id = $1")
        .bind(event_id)
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;

    if tags.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO event_tags (event_id, position, tag) ");
    builder.push_values(tags.iter().enumerate(), |mut row, (position, tag)| {
        row.push_bind(event_id)
            .push_bind(position as i16)
            .push_bind(tag.clone());
    });
    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;
    Ok(())
}

/// Attach tags and rosters to event rows read in the same transaction
async fn assemble(
    tx: &mut Transaction<'static, Postgres>,
    rows: Vec<PgRow>,
) -> StorageResult<Vec<EventSnapshot>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut snapshots = rows
        .iter()
        .map(|row| {
            Ok(EventSnapshot {
                event: event_from_row(row)?,
                creator: creator_from_row(row)?,
                tags: Vec::new(),
                roster: Vec::new(),
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    let ids: Vec<Uuid> = snapshots.iter().map(|s| s.event.id).collect();
    let position: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let tag_rows = sqlx::query(
        r#"
        SELECT event_id, tag
        FROM event_tags
        WHERE event_id = ANY($1)
        ORDER BY event_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(query_err)?;

    for row in &tag_rows {
        let event_id: Uuid = column(row, "event_id")?;
        if let Some(&i) = position.get(&event_id) {
            snapshots[i].tags.push(column(row, "tag")?);
        }
    }

    let roster_rows = sqlx::query(
        r#"
        SELECT a.id, a.event_id, a.user_id, a.status, a.joined_at, u.name, u.email, u.avatar
        FROM event_attendees a
        JOIN users u ON u.id = a.user_id
        WHERE a.event_id = ANY($1)
        ORDER BY a.joined_at, a.id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(query_err)?;

    for row in &roster_rows {
        let entry = roster_entry_from_row(row)?;
        if let Some(&i) = position.get(&entry.attendance.event_id) {
            snapshots[i].roster.push(entry);
        }
    }

    Ok(snapshots)
}

/// Storage adapter backed by PostgreSQL
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Open the pool and bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = database::init_pool(config).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Database migrations applied");

        Ok(Self { pool })
    }

    async fn begin(&self) -> StorageResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(query_err)
    }

    async fn begin_snapshot(&self) -> StorageResult<Transaction<'static, Postgres>> {
        let mut tx = self.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        Ok(tx)
    }

    /// Build the event listing statement for `query`
    fn listing(query: &EventQuery) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder
            .push(EVENT_COLUMNS)
            .push(", ")
            .push(CREATOR_COLUMNS)
            .push(" FROM events e JOIN users u ON u.id = e.creator_id WHERE TRUE");

        match query.scope {
            EventScope::All => {}
            EventScope::CreatedBy(user_id) => {
                builder.push(" AND e.creator_id = ").push_bind(user_id);
            }
            EventScope::JoinedBy(user_id) => {
                builder
                    .push(
                        " AND EXISTS (SELECT 1 FROM event_attendees m \
                         WHERE m.event_id = e.id AND m.status = 'joined' AND m.user_id = ",
                    )
                    .push_bind(user_id)
                    .push(")");
            }
        }

        let filters = &query.filters;
        if let Some(search) = &filters.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (e.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR e.description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR e.location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(tag) = &filters.tag {
            builder
                .push(" AND EXISTS (SELECT 1 FROM event_tags t WHERE t.event_id = e.id AND t.tag = ")
                .push_bind(tag.clone())
                .push(")");
        }
        if let Some(location) = &filters.location {
            builder
                .push(" AND e.location ILIKE ")
                .push_bind(like_pattern(location));
        }
        if let Some(date) = filters.date {
            builder.push(" AND e.event_date = ").push_bind(date);
        }

        match query.order {
            EventOrder::Schedule => {
                builder.push(" ORDER BY e.event_date, e.event_time, e.created_at, e.id");
            }
            EventOrder::NewestFirst => {
                builder.push(" ORDER BY e.created_at DESC, e.id");
            }
            EventOrder::LatestJoinedBy(user_id) => {
                builder
                    .push(
                        " ORDER BY (SELECT j.joined_at FROM event_attendees j \
                         WHERE j.event_id = e.id AND j.status = 'joined' AND j.user_id = ",
                    )
                    .push_bind(user_id)
                    .push(") DESC NULLS LAST, e.id");
            }
        }

        if let Some(limit) = query.page.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }
        builder
            .push(" OFFSET ")
            .push_bind(i64::from(query.page.offset));

        builder
    }
}

impl EventStorage for PostgresStorage {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn insert_user(&self, user: NewUser) -> StorageFuture<'_, User> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                INSERT INTO users (id, name, email, password_hash, avatar)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, name, email, password_hash, avatar, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.avatar)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_err)?;

            user_from_row(&row)
        })
    }

    fn find_user(&self, user_id: Uuid) -> StorageFuture<'_, Option<User>> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                SELECT id, name, email, password_hash, avatar, created_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;

            row.as_ref().map(user_from_row).transpose()
        })
    }

    fn insert_event(&self, new_event: NewEvent) -> StorageFuture<'_, Event> {
        Box::pin(async move {
            let NewEvent {
                event,
                founder,
                tags,
            } = new_event;
            let mut tx = self.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO events (id, name, description, event_date, event_time, location,
                                    image, capacity, creator_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(event.id)
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.date)
            .bind(event.time)
            .bind(&event.location)
            .bind(&event.image)
            .bind(capacity_to_db(event.capacity)?)
            .bind(event.creator_id)
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(insert_err)?;

            sqlx::query(
                r#"
                INSERT INTO event_attendees (id, event_id, user_id, status, joined_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(founder.id)
            .bind(founder.event_id)
            .bind(founder.user_id)
            .bind(founder.status.as_str())
            .bind(founder.joined_at)
            .execute(&mut *tx)
            .await
            .map_err(insert_err)?;

            write_tags(&mut tx, event.id, &tags).await?;
            tx.commit().await.map_err(query_err)?;

            Ok(event)
        })
    }

    fn find_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<Event>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {} FROM events e WHERE e.id = $1", EVENT_COLUMNS))
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_err)?;

            row.as_ref().map(event_from_row).transpose()
        })
    }

    fn update_event(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        tags: Option<Vec<String>>,
        updated_at: DateTime<Utc>,
    ) -> StorageFuture<'_, UpdateOutcome> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            let locked = sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;
            if locked.is_none() {
                return Ok(UpdateOutcome::EventMissing);
            }

            if let Some(capacity) = changes.capacity {
                let attendees: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM event_attendees WHERE event_id = $1 AND status = 'joined'",
                )
                .bind(event_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_err)?;

                if i64::from(capacity) < attendees {
                    return Ok(UpdateOutcome::CapacityBelowAttendance {
                        attendees: attendees as u32,
                    });
                }
            }

            let mut builder = QueryBuilder::<Postgres>::new("UPDATE events AS e SET updated_at = ");
            builder.push_bind(updated_at);
            if let Some(name) = changes.name {
                builder.push(", name = ").push_bind(name);
            }
            if let Some(description) = changes.description {
                builder.push(", description = ").push_bind(description);
            }
            if let Some(date) = changes.date {
                builder.push(", event_date = ").push_bind(date);
            }
            if let Some(time) = changes.time {
                builder.push(", event_time = ").push_bind(time);
            }
            if let Some(location) = changes.location {
                builder.push(", location = ").push_bind(location);
            }
            if let Some(image) = changes.image {
                builder.push(", image = ").push_bind(image);
            }
            if let Some(capacity) = changes.capacity {
                builder
                    .push(", capacity = ")
                    .push_bind(capacity_to_db(capacity)?);
            }
            builder
                .push(" WHERE e.id = ")
                .push_bind(event_id)
                .push(" RETURNING ")
                .push(EVENT_COLUMNS);

            let row = builder
                .build()
                .fetch_one(&mut *tx)
                .await
                .map_err(query_err)?;
            let event = event_from_row(&row)?;

            if let Some(tags) = tags {
                write_tags(&mut tx, event_id, &tags).await?;
            }
            tx.commit().await.map_err(query_err)?;

            Ok(UpdateOutcome::Updated(event))
        })
    }

    fn delete_event(&self, event_id: Uuid) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            for statement in [
                "DELETE FROM event_tags WHERE event_id = $1",
                "DELETE FROM event_attendees WHERE event_id = $1",
            ] {
                sqlx::query(statement)
                    .bind(event_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_err)?;
            }

            let deleted = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(event_id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?
                .rows_affected();
            tx.commit().await.map_err(query_err)?;

            Ok(deleted > 0)
        })
    }

    fn join(&self, attendance: Attendance) -> StorageFuture<'_, JoinOutcome> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            let capacity: Option<i32> =
                sqlx::query_scalar("SELECT capacity FROM events WHERE id = $1 FOR UPDATE")
                    .bind(attendance.event_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
            let Some(capacity) = capacity else {
                return Ok(JoinOutcome::EventMissing);
            };

            let status: Option<String> = sqlx::query_scalar(
                "SELECT status FROM event_attendees WHERE event_id = $1 AND user_id = $2",
            )
            .bind(attendance.event_id)
            .bind(attendance.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;
            if status.as_deref() == Some(AttendanceStatus::Joined.as_str()) {
                return Ok(JoinOutcome::AlreadyJoined);
            }

            let attendees: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM event_attendees WHERE event_id = $1 AND status = 'joined'",
            )
            .bind(attendance.event_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_err)?;
            if attendees >= i64::from(capacity) {
                return Ok(JoinOutcome::Full);
            }

            sqlx::query(
                r#"
                INSERT INTO event_attendees (id, event_id, user_id, status, joined_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (event_id, user_id) DO UPDATE
                SET id = EXCLUDED.id, status = EXCLUDED.status, joined_at = EXCLUDED.joined_at
                WHERE event_attendees.status <> 'joined'
                "#,
            )
            .bind(attendance.id)
            .bind(attendance.event_id)
            .bind(attendance.user_id)
            .bind(attendance.status.as_str())
            .bind(attendance.joined_at)
            .execute(&mut *tx)
            .await
            .map_err(insert_err)?;
            tx.commit().await.map_err(query_err)?;

            Ok(JoinOutcome::Joined(attendance))
        })
    }

    fn leave(&self, event_id: Uuid, user_id: Uuid) -> StorageFuture<'_, LeaveOutcome> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            let creator: Option<Uuid> =
                sqlx::query_scalar("SELECT creator_id FROM events WHERE id = $1 FOR UPDATE")
                    .bind(event_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
            match creator {
                None => return Ok(LeaveOutcome::EventMissing),
                Some(creator) if creator == user_id => return Ok(LeaveOutcome::CreatorPinned),
                Some(_) => {}
            }

            let cancelled = sqlx::query(
                r#"
                UPDATE event_attendees SET status = 'cancelled'
                WHERE event_id = $1 AND user_id = $2 AND status = 'joined'
                "#,
            )
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?
            .rows_affected();
            tx.commit().await.map_err(query_err)?;

            Ok(if cancelled > 0 {
                LeaveOutcome::Left
            } else {
                LeaveOutcome::NotAttending
            })
        })
    }

    fn replace_tags(&self, event_id: Uuid, tags: Vec<String>) -> StorageFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.begin().await?;

            let locked = sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;
            if locked.is_none() {
                return Ok(false);
            }

            write_tags(&mut tx, event_id, &tags).await?;
            tx.commit().await.map_err(query_err)?;
            Ok(true)
        })
    }

    fn tags_for(&self, event_id: Uuid) -> StorageFuture<'_, Option<Vec<String>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT t.tag
                FROM events e
                LEFT JOIN event_tags t ON t.event_id = e.id
                WHERE e.id = $1
                ORDER BY t.position
                "#,
            )
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;

            if rows.is_empty() {
                return Ok(None);
            }

            let mut tags = Vec::with_capacity(rows.len());
            for row in &rows {
                let tag: Option<String> = column(row, "tag")?;
                tags.extend(tag);
            }
            Ok(Some(tags))
        })
    }

    fn load_event(&self, event_id: Uuid) -> StorageFuture<'_, Option<EventSnapshot>> {
        Box::pin(async move {
            let mut tx = self.begin_snapshot().await?;

            let rows = sqlx::query(&format!(
                "SELECT {}, {} FROM events e JOIN users u ON u.id = e.creator_id WHERE e.id = $1",
                EVENT_COLUMNS, CREATOR_COLUMNS
            ))
            .bind(event_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;

            let snapshot = assemble(&mut tx, rows).await?.pop();
            tx.commit().await.map_err(query_err)?;
            Ok(snapshot)
        })
    }

    fn query_events(&self, query: EventQuery) -> StorageFuture<'_, Vec<EventSnapshot>> {
        Box::pin(async move {
            let mut tx = self.begin_snapshot().await?;

            let rows = Self::listing(&query)
                .build()
                .fetch_all(&mut *tx)
                .await
                .map_err(query_err)?;

            let snapshots = assemble(&mut tx, rows).await?;
            tx.commit().await.map_err(query_err)?;
            Ok(snapshots)
        })
    }

    fn health_check(&self) -> StorageFuture<'_, bool> {
        Box::pin(async move { Ok(database::health_check(&self.pool).await?) })
    }

    fn close(&self) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            self.pool.close().await;
            Ok(())
        })
    }
}
