//! Creating, updating, tagging and deleting events

mod support;

use chrono::{Local, NaiveTime};
use support::{Harness, draft};
use events::EventError;
use events::models::EventPatch;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test]
async fn test_create_makes_creator_first_attendee() {
    let harness = Harness::new();
    let creator = harness.user("Aylin").await;

    let mut new_event = draft("Tech Talk", 7, 40);
    new_event.tags = vec![" Tech ".into(), "Talks".into(), "Tech".into(), "".into()];
    let event = harness.event(&creator, new_event).await;

    let detail = harness.services.query.get(event.id, Some(creator.id)).await.unwrap();
    assert_eq!(detail.summary.attendee_count, 1);
    assert!(detail.is_attending);
    assert_eq!(detail.attendees_list.len(), 1);
    assert_eq!(detail.attendees_list[0].id, creator.id);
    assert_eq!(detail.creator.id, creator.id);
    assert_eq!(detail.summary.tags, vec!["Tech".to_string(), "Talks".to_string()]);
}

#[tokio::test]
async fn test_create_rejects_unknown_creator() {
    let harness = Harness::new();
    let ghost = Uuid::new_v4();

    let err = assert_err!(harness.services.events.create(draft("Ghost Party", 3, 5), ghost).await);
    assert!(matches!(err, EventError::NotFound { id, .. } if id == ghost));
}

#[tokio::test]
async fn test_create_rejects_past_date() {
    let harness = Harness::new();
    let creator = harness.user("Burak").await;

    let err = assert_err!(
        harness
            .services
            .events
            .create(draft("Yesterday's News", -1, 5), creator.id)
            .await
    );
    assert!(matches!(err, EventError::InvalidDate));

    let mut earlier_today = draft("Breakfast", 0, 5);
    earlier_today.date = Local::now().date_naive();
    earlier_today.time = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    if Local::now().time() > earlier_today.time {
        let err = assert_err!(harness.services.events.create(earlier_today, creator.id).await);
        assert!(matches!(err, EventError::InvalidDate));
    }
}

#[tokio::test]
async fn test_create_clamps_capacity() {
    let harness = Harness::new();
    let creator = harness.user("Cem").await;

    let huge = harness.event(&creator, draft("Stadium Concert", 20, 50_000)).await;
    assert_eq!(huge.capacity, 1000);

    let tiny = harness.event(&creator, draft("Solo Hike", 20, 0)).await;
    assert_eq!(tiny.capacity, 1);
}

#[tokio::test]
async fn test_update_by_non_creator_is_unauthorized() {
    let harness = Harness::new();
    let creator = harness.user("Defne").await;
    let intruder = harness.user("Emre").await;
    let event = harness.event(&creator, draft("Picnic", 4, 12)).await;

    let patch = EventPatch {
        name: Some("Hijacked".to_string()),
        ..Default::default()
    };
    let err = assert_err!(harness.services.events.update(event.id, patch, intruder.id).await);
    assert!(matches!(err, EventError::Unauthorized));

    let err = assert_err!(harness.services.events.delete(event.id, intruder.id).await);
    assert!(matches!(err, EventError::Unauthorized));

    let detail = harness.services.query.get(event.id, None).await.unwrap();
    assert_eq!(detail.summary.name, "Picnic");
}

#[tokio::test]
async fn test_empty_patch_has_no_updates() {
    let harness = Harness::new();
    let creator = harness.user("Fatma").await;
    let event = harness.event(&creator, draft("Movie Night", 4, 12)).await;

    let err = assert_err!(
        harness
            .services
            .events
            .update(event.id, EventPatch::default(), creator.id)
            .await
    );
    assert!(matches!(err, EventError::NoUpdates));
}

#[tokio::test]
async fn test_update_checks_existence_then_ownership_then_content() {
    let harness = Harness::new();
    let creator = harness.user("Gizem").await;
    let other = harness.user("Hakan").await;
    let event = harness.event(&creator, draft("Karaoke", 4, 12)).await;

    let err = assert_err!(
        harness
            .services
            .events
            .update(Uuid::new_v4(), EventPatch::default(), creator.id)
            .await
    );
    assert!(matches!(err, EventError::NotFound { .. }));

    let err = assert_err!(
        harness
            .services
            .events
            .update(event.id, EventPatch::default(), other.id)
            .await
    );
    assert!(matches!(err, EventError::Unauthorized));
}

#[tokio::test]
async fn test_partial_update_changes_only_given_fields() {
    let harness = Harness::new();
    let creator = harness.user("Irmak").await;
    let mut new_event = draft("Salsa Class", 6, 20);
    new_event.image = Some("https://example.com/salsa.jpg".to_string());
    new_event.tags = vec!["Dance".to_string()];
    let event = harness.event(&creator, new_event).await;

    let patch = EventPatch {
        location: Some("Karaköy, Istanbul".to_string()),
        time: NaiveTime::from_hms_opt(20, 30, 0),
        ..Default::default()
    };
    let updated = assert_ok!(harness.services.events.update(event.id, patch, creator.id).await);

    assert_eq!(updated.location, "Karaköy, Istanbul");
    assert_eq!(updated.time, NaiveTime::from_hms_opt(20, 30, 0).unwrap());
    assert_eq!(updated.name, event.name);
    assert_eq!(updated.image, event.image);
    assert!(updated.updated_at >= event.updated_at);
    assert_eq!(
        harness.services.tags.for_event(event.id).await.unwrap(),
        vec!["Dance".to_string()]
    );
}

#[tokio::test]
async fn test_empty_image_clears_it() {
    let harness = Harness::new();
    let creator = harness.user("Kaan").await;
    let mut new_event = draft("Gallery Opening", 6, 20);
    new_event.image = Some("https://example.com/gallery.jpg".to_string());
    let event = harness.event(&creator, new_event).await;

    let patch = EventPatch {
        image: Some(String::new()),
        ..Default::default()
    };
    let updated = assert_ok!(harness.services.events.update(event.id, patch, creator.id).await);
    assert_eq!(updated.image, None);
}

#[tokio::test]
async fn test_update_replaces_tag_set() {
    let harness = Harness::new();
    let creator = harness.user("Lale").await;
    let mut new_event = draft("Code Retreat", 9, 20);
    new_event.tags = vec!["Tech".to_string(), "Workshop".to_string()];
    let event = harness.event(&creator, new_event).await;

    let patch = EventPatch {
        tags: Some(vec![
            "Rust".into(),
            "rust".into(),
            "Rust".into(),
            "a".into(),
            "b".into(),
            "c".into(),
            "d".into(),
        ]),
        ..Default::default()
    };
    assert_ok!(harness.services.events.update(event.id, patch, creator.id).await);

    let tags = harness.services.tags.for_event(event.id).await.unwrap();
    assert_eq!(tags, vec!["Rust", "rust", "a", "b", "c"]);
}

#[tokio::test]
async fn test_capacity_cannot_drop_below_attendance() {
    let harness = Harness::new();
    let creator = harness.user("Melis").await;
    let guest = harness.user("Nazlı").await;
    let event = harness.event(&creator, draft("Escape Room", 5, 6)).await;
    assert_ok!(harness.services.attendance.join(event.id, guest.id).await);

    let patch = EventPatch {
        capacity: Some(1),
        ..Default::default()
    };
    let err = assert_err!(harness.services.events.update(event.id, patch, creator.id).await);
    assert!(matches!(
        err,
        EventError::CapacityBelowAttendance {
            capacity: 1,
            attendees: 2
        }
    ));

    let patch = EventPatch {
        capacity: Some(2),
        ..Default::default()
    };
    let updated = assert_ok!(harness.services.events.update(event.id, patch, creator.id).await);
    assert_eq!(updated.capacity, 2);

    let late = harness.user("Onur").await;
    let err = assert_err!(harness.services.attendance.join(event.id, late.id).await);
    assert!(matches!(err, EventError::EventFull));
}

#[tokio::test]
async fn test_delete_cascades() {
    let harness = Harness::new();
    let creator = harness.user("Pınar").await;
    let guest = harness.user("Rıza").await;
    let mut new_event = draft("Farewell Party", 8, 30);
    new_event.tags = vec!["Party".to_string()];
    let event = harness.event(&creator, new_event).await;
    assert_ok!(harness.services.attendance.join(event.id, guest.id).await);

    assert_ok!(harness.services.events.delete(event.id, creator.id).await);

    let err = assert_err!(harness.services.query.get(event.id, None).await);
    assert!(matches!(err, EventError::NotFound { .. }));
    let err = assert_err!(harness.services.tags.for_event(event.id).await);
    assert!(matches!(err, EventError::NotFound { .. }));

    let joined = harness
        .services
        .query
        .joined_by(guest.id, Default::default())
        .await
        .unwrap();
    assert!(joined.is_empty());
    let err = assert_err!(harness.services.events.delete(event.id, creator.id).await);
    assert!(matches!(err, EventError::NotFound { .. }));
}

#[tokio::test]
async fn test_tag_index_replace_and_missing_event() {
    let harness = Harness::new();
    let creator = harness.user("Sena").await;
    let event = harness.event(&creator, draft("Film Screening", 8, 30)).await;

    let stored = harness
        .services
        .tags
        .replace(event.id, vec!["Film".into(), "  Cinema  ".into(), "".into()])
        .await
        .unwrap();
    assert_eq!(stored, vec!["Film", "Cinema"]);
    assert_eq!(harness.services.tags.for_event(event.id).await.unwrap(), stored);

    let err = assert_err!(harness.services.tags.replace(Uuid::new_v4(), vec!["x".into()]).await);
    assert!(matches!(err, EventError::NotFound { .. }));
}
