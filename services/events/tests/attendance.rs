//! Join and leave behaviour, including concurrent joins on a nearly full event

mod support;

use support::{Harness, draft};
use events::EventError;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_fill_remaining_slots_exactly() {
    let harness = Harness::new();
    let creator = harness.user("Host").await;
    // The creator holds one of the three seats.
    let event = harness.event(&creator, draft("Sunset Yoga", 7, 3)).await;

    let mut guests = Vec::new();
    for name in ["Guest One", "Guest Two", "Guest Three"] {
        guests.push(harness.user(name).await);
    }

    let handles: Vec<_> = guests
        .iter()
        .map(|guest| {
            let attendance = harness.services.attendance.clone();
            let (event_id, user_id) = (event.id, guest.id);
            tokio::spawn(async move { attendance.join(event_id, user_id).await })
        })
        .collect();

    let mut joined = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.expect("join task") {
            Ok(_) => joined += 1,
            Err(EventError::EventFull) => full += 1,
            Err(other) => panic!("unexpected join error: {other:?}"),
        }
    }

    assert_eq!((joined, full), (2, 1));
    let detail = harness.services.query.get(event.id, None).await.unwrap();
    assert_eq!(detail.summary.attendee_count, detail.summary.capacity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_concurrent_joins_never_overbook() {
    let harness = Harness::new();
    let creator = harness.user("Organizer").await;
    let event = harness.event(&creator, draft("Street Food Tour", 3, 6)).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let guest = harness.user(&format!("Walker {i}")).await;
        let attendance = harness.services.attendance.clone();
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            attendance.join(event_id, guest.id).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("join task") {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, EventError::EventFull), "{err:?}"),
        }
    }

    assert_eq!(successes, 5);
    let detail = harness.services.query.get(event.id, None).await.unwrap();
    assert_eq!(detail.summary.attendee_count, 6);
    assert_eq!(detail.attendees_list.len(), 6);
}

#[tokio::test]
async fn test_join_leave_join_creates_fresh_attendance() {
    let harness = Harness::new();
    let creator = harness.user("Deniz").await;
    let guest = harness.user("Ece").await;
    let event = harness.event(&creator, draft("Book Club", 10, 10)).await;
    let attendance = &harness.services.attendance;

    let first = assert_ok!(attendance.join(event.id, guest.id).await);
    assert_ok!(attendance.leave(event.id, guest.id).await);
    let second = assert_ok!(attendance.join(event.id, guest.id).await);

    assert_ne!(first.id, second.id);
    assert!(second.joined_at >= first.joined_at);

    let detail = harness.services.query.get(event.id, Some(guest.id)).await.unwrap();
    assert!(detail.is_attending);
    assert_eq!(detail.summary.attendee_count, 2);
}

#[tokio::test]
async fn test_joining_twice_is_rejected() {
    let harness = Harness::new();
    let creator = harness.user("Kerem").await;
    let guest = harness.user("Leyla").await;
    let event = harness.event(&creator, draft("Chess Meetup", 5, 10)).await;
    let attendance = &harness.services.attendance;

    assert_ok!(attendance.join(event.id, guest.id).await);
    let err = assert_err!(attendance.join(event.id, guest.id).await);
    assert!(matches!(err, EventError::AlreadyJoined));

    let err = assert_err!(attendance.join(event.id, creator.id).await);
    assert!(matches!(err, EventError::AlreadyJoined));
}

#[tokio::test]
async fn test_leave_without_join_leaves_state_unchanged() {
    let harness = Harness::new();
    let creator = harness.user("Mert").await;
    let stranger = harness.user("Nil").await;
    let event = harness.event(&creator, draft("Pottery Class", 5, 8)).await;

    let before = harness.services.query.get(event.id, None).await.unwrap();
    let err = assert_err!(harness.services.attendance.leave(event.id, stranger.id).await);
    assert!(matches!(err, EventError::NotAttending));

    let after = harness.services.query.get(event.id, None).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_creator_cannot_leave_own_event() {
    let harness = Harness::new();
    let creator = harness.user("Oya").await;
    let event = harness.event(&creator, draft("Hackathon", 14, 50)).await;

    let err = assert_err!(harness.services.attendance.leave(event.id, creator.id).await);
    assert!(matches!(err, EventError::CreatorCannotLeave));

    let detail = harness.services.query.get(event.id, Some(creator.id)).await.unwrap();
    assert!(detail.is_attending);
    assert_eq!(detail.summary.attendee_count, 1);
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let harness = Harness::new();
    let user = harness.user("Pelin").await;
    let missing = Uuid::new_v4();

    let err = assert_err!(harness.services.attendance.join(missing, user.id).await);
    assert!(matches!(err, EventError::NotFound { id, .. } if id == missing));

    let err = assert_err!(harness.services.attendance.leave(missing, user.id).await);
    assert!(matches!(err, EventError::NotFound { .. }));
}

#[tokio::test]
async fn test_full_event_accepts_join_after_a_leave() {
    let harness = Harness::new();
    let creator = harness.user("Rana").await;
    let first = harness.user("Selin").await;
    let second = harness.user("Tuna").await;
    let event = harness.event(&creator, draft("Wine Tasting", 2, 2)).await;
    let attendance = &harness.services.attendance;

    assert_ok!(attendance.join(event.id, first.id).await);
    let err = assert_err!(attendance.join(event.id, second.id).await);
    assert!(matches!(err, EventError::EventFull));

    assert_ok!(attendance.leave(event.id, first.id).await);
    assert_ok!(attendance.join(event.id, second.id).await);
}

#[tokio::test]
async fn test_unknown_user_cannot_join() {
    let harness = Harness::new();
    let creator = harness.user("Ufuk").await;
    let event = harness.event(&creator, draft("Board Games", 6, 10)).await;
    let ghost = Uuid::new_v4();

    let err = assert_err!(harness.services.attendance.join(event.id, ghost).await);
    assert!(matches!(err, EventError::NotFound { id, .. } if id == ghost));

    let detail = assert_ok!(harness.services.query.get(event.id, None).await);
    assert_eq!(detail.summary.attendee_count, 1);
    let listed = assert_ok!(
        harness
            .services
            .query
            .list(Default::default(), Default::default())
            .await
    );
    assert_eq!(listed.len(), 1);
}
