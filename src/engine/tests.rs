use super::*;
use crate::limits::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::NaiveDate;

const TIMEOUT: Duration = Duration::from_secs(2);

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("billet_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn stay(a: &str, b: &str) -> Stay {
    Stay::new(d(a), d(b)).unwrap()
}

fn house_details(name: &str) -> GuestHouseDetails {
    GuestHouseDetails {
        name: name.into(),
        location: "Hilltop".into(),
        ..GuestHouseDetails::default()
    }
}

fn guest(name: &str, gender: Gender) -> Guest {
    Guest {
        name: name.into(),
        email: format!("{}@example.org", name.to_lowercase()),
        phone: "555-0100".into(),
        gender,
        participant_id: None,
    }
}

fn candidate(room_id: Ulid, name: &str, gender: Gender, from: &str, to: &str) -> BookingCandidate {
    BookingCandidate {
        room_id,
        guest: guest(name, gender),
        event_id: Some(7),
        check_in: d(from),
        check_out: d(to),
    }
}

/// Engine with one active guest house holding one room of `capacity`.
async fn engine_with_room(name: &str, capacity: u32) -> (Engine, Ulid, Ulid) {
    let engine = Engine::new(test_wal_path(name), TIMEOUT).unwrap();
    let house = engine.create_guest_house(house_details("Main")).await.unwrap();
    let room = engine
        .create_room(house.id, "101", capacity, RoomDetails::default())
        .await
        .unwrap();
    (engine, house.id, room.id)
}

async fn book_ok(engine: &Engine, c: BookingCandidate) -> Allocation {
    match engine.book(c).await.unwrap() {
        BookingOutcome::Booked(a) => a,
        BookingOutcome::Rejected(r) => panic!("expected booking, got {r:?}"),
    }
}

async fn book_rejected(engine: &Engine, c: BookingCandidate) -> Rejection {
    match engine.book(c).await.unwrap() {
        BookingOutcome::Booked(a) => panic!("expected rejection, got {a:?}"),
        BookingOutcome::Rejected(r) => r,
    }
}

// ── Room Registry ────────────────────────────────────────

#[tokio::test]
async fn create_guest_house_and_room() {
    let (engine, house_id, room_id) = engine_with_room("create_room.wal", 3).await;

    let house = engine.get_guest_house(house_id).await.unwrap();
    assert!(house.active);
    assert_eq!(house.rooms.len(), 1);

    let room = engine.get_room(room_id).await.unwrap();
    assert_eq!(room.room_number, "101");
    assert_eq!(room.capacity, 3);
    assert_eq!(room.room_type, RoomType::Shared);
    assert!(room.active);
}

#[tokio::test]
async fn duplicate_room_number_rejected() {
    let (engine, house_id, _) = engine_with_room("dup_room.wal", 1).await;
    let err = engine
        .create_room(house_id, " 101 ", 2, RoomDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRoomNumber { .. }));

    // Same number in another guest house is fine.
    let other = engine.create_guest_house(house_details("Annex")).await.unwrap();
    engine
        .create_room(other.id, "101", 2, RoomDetails::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn room_input_validation() {
    let (engine, house_id, _) = engine_with_room("room_input.wal", 1).await;
    assert!(matches!(
        engine.create_room(house_id, "  ", 1, RoomDetails::default()).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.create_room(house_id, "102", 0, RoomDetails::default()).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine
            .create_room(house_id, "103", MAX_ROOM_CAPACITY + 1, RoomDetails::default())
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        engine.create_room(Ulid::new(), "104", 1, RoomDetails::default()).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.create_guest_house(house_details("   ")).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn deactivating_guest_house_deactivates_rooms() {
    let (engine, house_id, room_id) = engine_with_room("house_cascade.wal", 2).await;
    let second = engine
        .create_room(house_id, "102", 1, RoomDetails::default())
        .await
        .unwrap();

    let house = engine
        .update_guest_house(house_id, GuestHouseUpdate::active(false))
        .await
        .unwrap();
    assert!(!house.active);
    assert!(house.rooms.iter().all(|r| !r.active));
    assert!(engine.list_active_rooms(house_id).await.unwrap().is_empty());

    let r = book_rejected(
        &engine,
        candidate(second.id, "Ann", Gender::Female, "2025-05-01", "2025-05-02"),
    )
    .await;
    assert_eq!(r, Rejection::RoomInactive);

    // New rooms and room re-activation are refused while the house is off.
    assert!(matches!(
        engine.create_room(house_id, "103", 1, RoomDetails::default()).await,
        Err(EngineError::GuestHouseInactive(_))
    ));
    assert!(matches!(
        engine.set_room_active(room_id, true).await,
        Err(EngineError::GuestHouseInactive(_))
    ));

    // Re-activating the house leaves rooms off until enabled one by one.
    let house = engine
        .update_guest_house(house_id, GuestHouseUpdate::active(true))
        .await
        .unwrap();
    assert!(house.active);
    assert!(house.rooms.iter().all(|r| !r.active));
    let room = engine.set_room_active(room_id, true).await.unwrap();
    assert!(room.active);
}

#[tokio::test]
async fn guest_house_deactivation_is_all_or_nothing() {
    let engine = Engine::new(test_wal_path("house_cascade_busy.wal"), Duration::from_millis(50)).unwrap();
    let house = engine.create_guest_house(house_details("Main")).await.unwrap();
    let first = engine
        .create_room(house.id, "1", 2, RoomDetails::default())
        .await
        .unwrap();
    let second = engine
        .create_room(house.id, "2", 2, RoomDetails::default())
        .await
        .unwrap();

    let guard = engine.store.get_room(&second.id).unwrap().write_owned().await;
    let err = engine
        .update_guest_house(
            house.id,
            GuestHouseUpdate {
                name: Some("Renamed".into()),
                active: Some(false),
                ..GuestHouseUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    drop(guard);

    let after = engine.get_guest_house(house.id).await.unwrap();
    assert!(after.active);
    assert_eq!(after.details.name, "Main");
    assert!(engine.get_room(first.id).await.unwrap().active);
    assert!(engine.get_room(second.id).await.unwrap().active);

    let house = engine
        .update_guest_house(house.id, GuestHouseUpdate::active(false))
        .await
        .unwrap();
    assert!(!house.active);
    assert!(house.rooms.iter().all(|r| !r.active));
}

#[tokio::test]
async fn update_guest_house_details() {
    let (engine, house_id, _) = engine_with_room("house_update.wal", 1).await;
    let update = GuestHouseUpdate {
        name: Some(" Main Lodge ".into()),
        contact_person: Some("Ruth".into()),
        ..GuestHouseUpdate::default()
    };
    let house = engine.update_guest_house(house_id, update).await.unwrap();
    let mut expected = house_details("Main Lodge");
    expected.contact_person = Some("Ruth".into());
    assert_eq!(house.details, expected);
    assert!(house.active);

    // Fields left out keep their stored value.
    let house = engine
        .update_guest_house(
            house_id,
            GuestHouseUpdate {
                phone: Some("555-0199".into()),
                ..GuestHouseUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(house.details.name, "Main Lodge");
    assert_eq!(house.details.contact_person.as_deref(), Some("Ruth"));
    assert_eq!(house.details.phone.as_deref(), Some("555-0199"));

    assert!(matches!(
        engine
            .update_guest_house(
                house_id,
                GuestHouseUpdate {
                    name: Some("  ".into()),
                    ..GuestHouseUpdate::default()
                },
            )
            .await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.update_guest_house(Ulid::new(), GuestHouseUpdate::active(false)).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_rooms_active_only() {
    let (engine, house_id, room_id) = engine_with_room("list_rooms.wal", 1).await;
    engine
        .create_room(house_id, "102", 2, RoomDetails::default())
        .await
        .unwrap();
    engine.set_room_active(room_id, false).await.unwrap();

    assert_eq!(engine.list_rooms(house_id, false).await.unwrap().len(), 2);
    let active = engine.list_rooms(house_id, true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].room_number, "102");
    assert_eq!(engine.list_guest_houses().await.unwrap().len(), 1);
}

#[tokio::test]
async fn set_room_active_is_idempotent() {
    let (engine, _, room_id) = engine_with_room("room_toggle.wal", 1).await;
    let before = engine.wal_appends_since_compact().await;
    engine.set_room_active(room_id, true).await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, before);

    engine.set_room_active(room_id, false).await.unwrap();
    engine.set_room_active(room_id, false).await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, before + 1);
}

#[tokio::test]
async fn room_update_changes_details_and_type() {
    let (engine, _, room_id) = engine_with_room("room_update.wal", 1).await;
    let room = engine
        .update_room(
            room_id,
            RoomUpdate {
                name: Some("Garden view".into()),
                capacity: Some(2),
                facilities: Some(BTreeSet::from(["fan".to_string(), "desk".to_string()])),
                ..RoomUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(room.name.as_deref(), Some("Garden view"));
    assert_eq!(room.capacity, 2);
    assert_eq!(room.room_type, RoomType::Double);
    assert_eq!(room.facilities.len(), 2);

    let room = engine
        .update_room(
            room_id,
            RoomUpdate {
                name: Some(String::new()),
                ..RoomUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(room.name, None);
}

#[tokio::test]
async fn capacity_cannot_drop_below_peak() {
    let (engine, _, room_id) = engine_with_room("capacity_guard.wal", 3).await;
    book_ok(&engine, candidate(room_id, "A", Gender::Male, "2025-06-01", "2025-06-04")).await;
    book_ok(&engine, candidate(room_id, "B", Gender::Male, "2025-06-02", "2025-06-03")).await;
    // Overlaps the first two in range but never shares a night with B.
    book_ok(&engine, candidate(room_id, "C", Gender::Male, "2025-06-03", "2025-06-06")).await;
    assert_eq!(engine.peak_occupancy(room_id).await.unwrap(), 2);

    let err = engine
        .update_room(
            room_id,
            RoomUpdate {
                capacity: Some(1),
                ..RoomUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::CapacityBelowOccupancy { capacity: 1, peak: 2 });

    let room = engine
        .update_room(
            room_id,
            RoomUpdate {
                capacity: Some(2),
                ..RoomUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(room.capacity, 2);
}

// ── Allocation Service ───────────────────────────────────

#[tokio::test]
async fn booking_lifecycle() {
    let (engine, house_id, room_id) = engine_with_room("booking_lifecycle.wal", 1).await;

    let a = book_ok(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-03")).await;
    assert_eq!(a.room_id, room_id);
    assert_eq!(a.guest_house_id, house_id);
    assert_eq!(a.status, AllocationStatus::Active);
    assert_eq!(engine.get_allocation(a.id).await.unwrap(), a);

    let snap = engine.occupancy(room_id, stay("2025-03-02", "2025-03-04")).await.unwrap();
    assert_eq!(snap.occupant_count, 1);
    assert_eq!(snap.remaining(), 0);

    let r = book_rejected(&engine, candidate(room_id, "Bea", Gender::Female, "2025-03-02", "2025-03-04")).await;
    assert_eq!(r, Rejection::RoomFull);

    let cancelled = engine.cancel(a.id).await.unwrap();
    assert_eq!(cancelled.status, AllocationStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    book_ok(&engine, candidate(room_id, "Bea", Gender::Female, "2025-03-02", "2025-03-04")).await;
}

#[tokio::test]
async fn same_day_turnover_is_allowed() {
    let (engine, _, room_id) = engine_with_room("turnover.wal", 1).await;
    book_ok(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-03")).await;
    book_ok(&engine, candidate(room_id, "Bob", Gender::Male, "2025-03-03", "2025-03-05")).await;
    book_ok(&engine, candidate(room_id, "Cy", Gender::Other, "2025-02-27", "2025-03-01")).await;
    assert_eq!(engine.peak_occupancy(room_id).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_dates_rejected_before_anything_else() {
    let (engine, _, room_id) = engine_with_room("bad_dates.wal", 1).await;
    engine.set_room_active(room_id, false).await.unwrap();
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-03", "2025-03-03")).await;
    assert_eq!(r, Rejection::InvalidDateRange);
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-04", "2025-03-03")).await;
    assert_eq!(r, Rejection::InvalidDateRange);
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-03")).await;
    assert_eq!(r, Rejection::RoomInactive);
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let (engine, _, _) = engine_with_room("unknown_room.wal", 1).await;
    let err = engine
        .book(candidate(Ulid::new(), "Ann", Gender::Female, "2025-03-01", "2025-03-02"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn overlong_stay_is_refused() {
    let (engine, _, room_id) = engine_with_room("long_stay.wal", 1).await;
    let err = engine
        .book(candidate(room_id, "Ann", Gender::Female, "2025-01-01", "2026-06-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test]
async fn shared_room_keeps_one_gender_per_night() {
    // Shared room of 3: a female request over male nights is refused while
    // another male is accepted.
    let (engine, _, room_id) = engine_with_room("gender_shared.wal", 3).await;
    book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2025-03-01", "2025-03-05")).await;

    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-04", "2025-03-06")).await;
    assert_eq!(r, Rejection::GenderConflict);

    book_ok(&engine, candidate(room_id, "Ben", Gender::Male, "2025-03-02", "2025-03-04")).await;
    // After the male guests leave, the room is free for anyone.
    book_ok(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-05", "2025-03-07")).await;

    let genders = engine
        .occupant_genders(room_id, stay("2025-03-01", "2025-03-05"))
        .await
        .unwrap();
    assert_eq!(genders, BTreeSet::from([Gender::Male]));
    assert_eq!(engine.occupant_count(room_id, stay("2025-03-01", "2025-03-08")).await.unwrap(), 3);
}

#[tokio::test]
async fn double_room_gender_then_capacity_sequence() {
    let (engine, _, room_id) = engine_with_room("gender_double_sequence.wal", 2).await;
    book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2025-03-01", "2025-03-03")).await;
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-02", "2025-03-04")).await;
    assert_eq!(r, Rejection::GenderConflict);
    book_ok(&engine, candidate(room_id, "Ben", Gender::Male, "2025-03-02", "2025-03-04")).await;
    let r = book_rejected(&engine, candidate(room_id, "Cal", Gender::Male, "2025-03-02", "2025-03-03")).await;
    assert_eq!(r, Rejection::RoomFull);
    assert_eq!(engine.peak_occupancy(room_id).await.unwrap(), 2);
}

#[tokio::test]
async fn unspecified_gender_shares_with_anyone() {
    let (engine, _, room_id) = engine_with_room("gender_wildcard.wal", 3).await;
    book_ok(&engine, candidate(room_id, "Kim", Gender::Unspecified, "2025-03-01", "2025-03-05")).await;
    book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2025-03-01", "2025-03-05")).await;
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-02")).await;
    assert_eq!(r, Rejection::GenderConflict);
    book_ok(&engine, candidate(room_id, "Sam", Gender::Unspecified, "2025-03-01", "2025-03-02")).await;
}

#[tokio::test]
async fn double_room_applies_gender_rule() {
    let (engine, _, room_id) = engine_with_room("gender_double.wal", 2).await;
    book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2025-03-01", "2025-03-03")).await;
    let r = book_rejected(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-02", "2025-03-03")).await;
    assert_eq!(r, Rejection::GenderConflict);
}

#[tokio::test]
async fn allocation_cap_counts_only_active_stays() {
    let (engine, _, room_id) = engine_with_room("allocation_cap.wal", 1).await;
    let template = book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2030-01-01", "2030-01-02")).await;
    {
        let mut room = engine.store.get_room(&room_id).unwrap().write_owned().await;
        room.allocations.clear();
        for _ in 0..MAX_ALLOCATIONS_PER_ROOM {
            let mut filler = template.clone();
            filler.id = Ulid::new();
            filler.status = AllocationStatus::Cancelled;
            room.allocations.push(filler);
        }
    }

    // Cancelled stays do not count toward the cap.
    let kept = book_ok(&engine, candidate(room_id, "Ben", Gender::Male, "2025-02-01", "2025-02-03")).await;

    {
        let mut room = engine.store.get_room(&room_id).unwrap().write_owned().await;
        for a in room.allocations.iter_mut().filter(|a| a.id != kept.id) {
            a.status = AllocationStatus::Active;
        }
    }

    // Bad dates are still reported as such on a room at the cap.
    let r = book_rejected(&engine, candidate(room_id, "Cal", Gender::Male, "2025-04-03", "2025-04-01")).await;
    assert_eq!(r, Rejection::InvalidDateRange);
    let err = engine
        .book(candidate(room_id, "Cal", Gender::Male, "2025-04-01", "2025-04-03"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (engine, _, room_id) = engine_with_room("cancel_idem.wal", 1).await;
    let a = book_ok(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-03")).await;

    let first = engine.cancel(a.id).await.unwrap();
    let appends = engine.wal_appends_since_compact().await;
    let second = engine.cancel(a.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.wal_appends_since_compact().await, appends);

    assert!(matches!(
        engine.cancel(Ulid::new()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn inactive_room_keeps_existing_allocations() {
    let (engine, _, room_id) = engine_with_room("inactive_keeps.wal", 2).await;
    let a = book_ok(&engine, candidate(room_id, "Ann", Gender::Female, "2025-03-01", "2025-03-03")).await;
    engine.set_room_active(room_id, false).await.unwrap();

    assert_eq!(engine.get_allocation(a.id).await.unwrap().status, AllocationStatus::Active);
    let r = book_rejected(&engine, candidate(room_id, "Bea", Gender::Female, "2025-03-05", "2025-03-06")).await;
    assert_eq!(r, Rejection::RoomInactive);
    // Cancelling still works on an inactive room.
    engine.cancel(a.id).await.unwrap();
}

#[tokio::test]
async fn list_allocations_filters_and_orders() {
    let (engine, house_id, room_id) = engine_with_room("list_allocs.wal", 2).await;
    let other = engine
        .create_room(house_id, "102", 1, RoomDetails::default())
        .await
        .unwrap();

    let late = book_ok(&engine, candidate(room_id, "Al", Gender::Male, "2025-04-10", "2025-04-12")).await;
    let early = book_ok(&engine, candidate(room_id, "Bo", Gender::Male, "2025-04-01", "2025-04-03")).await;
    let mut c = candidate(other.id, "Cy", Gender::Female, "2025-04-05", "2025-04-06");
    c.event_id = Some(99);
    let elsewhere = book_ok(&engine, c).await;
    engine.cancel(late.id).await.unwrap();

    let all = engine.list_allocations(&AllocationFilter::default()).await.unwrap();
    let ids: Vec<Ulid> = all.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![early.id, elsewhere.id, late.id]);

    let active = engine
        .list_allocations(&AllocationFilter {
            status: Some(AllocationStatus::Active),
            ..AllocationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let by_room = engine
        .list_allocations(&AllocationFilter {
            room_id: Some(other.id),
            ..AllocationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_room.len(), 1);
    assert_eq!(by_room[0].id, elsewhere.id);

    let by_event = engine
        .list_allocations(&AllocationFilter {
            event_id: Some(7),
            ..AllocationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_event.len(), 2);

    let by_house = engine
        .list_allocations(&AllocationFilter {
            guest_house_id: Some(Ulid::new()),
            ..AllocationFilter::default()
        })
        .await
        .unwrap();
    assert!(by_house.is_empty());
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_on_single_room_admit_one() {
    let (engine, _, room_id) = engine_with_room("race_single.wal", 1).await;
    let engine = Arc::new(engine);

    let n = 16;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.book(candidate(room_id, &format!("G{i}"), Gender::Male, "2025-07-01", "2025-07-04"))
                .await
        }));
    }

    let mut booked = 0;
    let mut full = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            BookingOutcome::Booked(_) => booked += 1,
            BookingOutcome::Rejected(Rejection::RoomFull) => full += 1,
            BookingOutcome::Rejected(other) => panic!("unexpected rejection {other:?}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(full, n - 1);
    assert_eq!(engine.peak_occupancy(room_id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_genders_never_share_a_night() {
    let (engine, _, room_id) = engine_with_room("race_gender.wal", 4).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..24 {
        let eng = engine.clone();
        let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
        let from = format!("2025-08-{:02}", 1 + (i % 5));
        let to = format!("2025-08-{:02}", 3 + (i % 5));
        handles.push(tokio::spawn(async move {
            eng.book(candidate(room_id, &format!("G{i}"), gender, &from, &to)).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let active = engine
        .list_allocations(&AllocationFilter {
            status: Some(AllocationStatus::Active),
            ..AllocationFilter::default()
        })
        .await
        .unwrap();
    assert!(engine.peak_occupancy(room_id).await.unwrap() <= 4);
    for a in &active {
        for b in &active {
            if a.stay.overlaps(&b.stay) {
                assert!(a.guest.gender.is_compatible_with(b.guest.gender));
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_rooms_book_in_parallel() {
    let engine = Arc::new(Engine::new(test_wal_path("parallel_rooms.wal"), TIMEOUT).unwrap());
    let house = engine.create_guest_house(house_details("Main")).await.unwrap();
    let mut rooms = Vec::new();
    for i in 0..8 {
        let r = engine
            .create_room(house.id, &format!("{}", 200 + i), 1, RoomDetails::default())
            .await
            .unwrap();
        rooms.push(r.id);
    }

    let mut handles = Vec::new();
    for room_id in rooms.clone() {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.book(candidate(room_id, "G", Gender::Female, "2025-09-01", "2025-09-02")).await
        }));
    }
    for h in handles {
        assert!(matches!(h.await.unwrap().unwrap(), BookingOutcome::Booked(_)));
    }
    assert_eq!(
        engine.list_allocations(&AllocationFilter::default()).await.unwrap().len(),
        rooms.len()
    );
}

#[tokio::test]
async fn held_room_lock_reports_busy() {
    let engine = Engine::new(test_wal_path("busy.wal"), Duration::from_millis(50)).unwrap();
    let house = engine.create_guest_house(house_details("Main")).await.unwrap();
    let room = engine
        .create_room(house.id, "101", 1, RoomDetails::default())
        .await
        .unwrap();

    let guard = engine.store.get_room(&room.id).unwrap().write_owned().await;
    let err = engine
        .book(candidate(room.id, "Ann", Gender::Female, "2025-03-01", "2025-03-02"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Busy(room.id));
    assert!(err.is_retryable());
    drop(guard);

    book_ok(&engine, candidate(room.id, "Ann", Gender::Female, "2025-03-01", "2025-03-02")).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_guest_house_updates_keep_both_fields() {
    let (engine, house_id, _) = engine_with_room("house_update_race.wal", 1).await;
    let engine = Arc::new(engine);

    for i in 0..20 {
        let phone = {
            let eng = engine.clone();
            tokio::spawn(async move {
                let update = GuestHouseUpdate {
                    phone: Some(format!("555-{i:04}")),
                    ..GuestHouseUpdate::default()
                };
                eng.update_guest_house(house_id, update).await
            })
        };
        let email = {
            let eng = engine.clone();
            tokio::spawn(async move {
                let update = GuestHouseUpdate {
                    email: Some(format!("desk{i}@example.org")),
                    ..GuestHouseUpdate::default()
                };
                eng.update_guest_house(house_id, update).await
            })
        };
        phone.await.unwrap().unwrap();
        email.await.unwrap().unwrap();

        let house = engine.get_guest_house(house_id).await.unwrap();
        assert_eq!(house.details.phone, Some(format!("555-{i:04}")));
        assert_eq!(house.details.email, Some(format!("desk{i}@example.org")));
    }
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_registry_and_allocations() {
    let path = test_wal_path("replay.wal");
    let (house_id, room_id, kept, cancelled) = {
        let engine = Engine::new(path.clone(), TIMEOUT).unwrap();
        let house = engine.create_guest_house(house_details("Main")).await.unwrap();
        let room = engine
            .create_room(house.id, "101", 2, RoomDetails::default())
            .await
            .unwrap();
        let kept = book_ok(&engine, candidate(room.id, "Al", Gender::Male, "2025-03-01", "2025-03-03")).await;
        let gone = book_ok(&engine, candidate(room.id, "Bo", Gender::Male, "2025-03-01", "2025-03-03")).await;
        engine.cancel(gone.id).await.unwrap();
        engine.set_room_active(room.id, false).await.unwrap();
        (house.id, room.id, kept, gone.id)
    };

    let engine = Engine::new(path, TIMEOUT).unwrap();
    let house = engine.get_guest_house(house_id).await.unwrap();
    assert_eq!(house.rooms.len(), 1);
    let room = engine.get_room(room_id).await.unwrap();
    assert!(!room.active);
    assert_eq!(engine.get_allocation(kept.id).await.unwrap(), kept);
    assert_eq!(
        engine.get_allocation(cancelled).await.unwrap().status,
        AllocationStatus::Cancelled
    );
    assert_eq!(engine.occupant_count(room_id, stay("2025-03-01", "2025-03-03")).await.unwrap(), 1);

    // Room numbers survive replay too.
    assert!(matches!(
        engine.create_room(house_id, "101", 1, RoomDetails::default()).await,
        Err(EngineError::DuplicateRoomNumber { .. })
    ));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    let (room_id, alloc_id) = {
        let engine = Engine::new(path.clone(), TIMEOUT).unwrap();
        let house = engine.create_guest_house(house_details("Main")).await.unwrap();
        let room = engine
            .create_room(house.id, "101", 2, RoomDetails::default())
            .await
            .unwrap();
        for _ in 0..5 {
            engine.set_room_active(room.id, false).await.unwrap();
            engine.set_room_active(room.id, true).await.unwrap();
        }
        let a = book_ok(&engine, candidate(room.id, "Al", Gender::Male, "2025-03-01", "2025-03-03")).await;
        let b = book_ok(&engine, candidate(room.id, "Bo", Gender::Male, "2025-03-02", "2025-03-04")).await;
        engine.cancel(b.id).await.unwrap();

        assert!(engine.wal_appends_since_compact().await >= 14);
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        (room.id, a.id)
    };

    let engine = Engine::new(path, TIMEOUT).unwrap();
    let room = engine.get_room(room_id).await.unwrap();
    assert!(room.active);
    let all = engine.list_allocations(&AllocationFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(engine.get_allocation(alloc_id).await.unwrap().status, AllocationStatus::Active);
    // Everything after compaction is 4 events: house, room, two allocations.
    assert_eq!(engine.wal_appends_since_compact().await, 4);
}

#[tokio::test]
async fn group_commit_survives_concurrent_creates() {
    let path = test_wal_path("group_commit.wal");
    let engine = Arc::new(Engine::new(path.clone(), TIMEOUT).unwrap());
    let house = engine.create_guest_house(house_details("Main")).await.unwrap();

    let n = 20;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        let house_id = house.id;
        handles.push(tokio::spawn(async move {
            eng.create_room(house_id, &format!("R{i}"), 1, RoomDetails::default())
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list_rooms(house.id, false).await.unwrap().len(), n);

    let engine2 = Engine::new(path, TIMEOUT).unwrap();
    assert_eq!(engine2.list_rooms(house.id, false).await.unwrap().len(), n);
}
