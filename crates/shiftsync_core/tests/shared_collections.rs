use shiftsync_core::config::BroadcastConfig;
use shiftsync_core::db::open_db_in_memory;
use shiftsync_core::repo::shift_type_repo::{upsert_category, upsert_position_type};
use shiftsync_core::sync::broadcast::DropReason;
use shiftsync_core::{
    CacheStatus, CollectionId, DesiredPosition, DesiredShiftType, DesiredTime, EngineConfig,
    EventAction, EventBroadcaster, LiveCache, ReconcileError, RoleItem, RoleService,
    ShiftTypeInfo, ShiftTypeService, ShiftVolunteerItem, SignupService, SignupServiceError,
    SqliteRoleRepository, SqliteShiftTypeRepository, SqliteSignupRepository, SubscriptionFilter,
    ValidationIssue,
};
use rusqlite::Connection;

fn sorted_names(items: &[RoleItem]) -> Vec<(String, bool)> {
    let mut names: Vec<(String, bool)> = items
        .iter()
        .map(|item| (item.name.clone(), item.display))
        .collect();
    names.sort();
    names
}

#[test]
fn second_viewer_cache_converges_on_the_roster() {
    let conn = open_db_in_memory().unwrap();
    let broadcaster = EventBroadcaster::new(BroadcastConfig::default());
    let editor = broadcaster
        .subscribe(SubscriptionFilter::only(CollectionId::roles()))
        .unwrap();
    let viewer = broadcaster
        .subscribe(SubscriptionFilter::only(CollectionId::roles()))
        .unwrap();
    let service = RoleService::new(
        SqliteRoleRepository::try_new(&conn).unwrap(),
        broadcaster.clone(),
    );

    service.create_role("Lead", None).unwrap();
    while viewer.try_recv().is_ok() {}
    while editor.try_recv().is_ok() {}
    let seq = broadcaster.current_seq(CollectionId::roles()).unwrap();
    let mut cache = LiveCache::new(CollectionId::roles(), service.list_roles().unwrap(), seq);

    service.create_role("Support", Some(editor.id())).unwrap();
    service.toggle_display("Lead", Some(editor.id())).unwrap();
    service.create_role("Runner", Some(editor.id())).unwrap();
    service.remove_role("Runner", Some(editor.id())).unwrap();

    let mut actions = Vec::new();
    while let Ok(event) = viewer.try_recv() {
        actions.push(event.action);
        cache.apply(&event).unwrap();
    }
    assert!(editor.try_recv().is_err());
    assert_eq!(
        actions,
        vec![
            EventAction::Add,
            EventAction::Update,
            EventAction::Add,
            EventAction::Remove,
        ]
    );
    assert_eq!(cache.status(), CacheStatus::Fresh);
    assert_eq!(
        sorted_names(cache.items()),
        sorted_names(&service.list_roles().unwrap())
    );
    assert_eq!(
        sorted_names(cache.items()),
        vec![("Lead".to_string(), false), ("Support".to_string(), true)]
    );
}

#[test]
fn non_ascii_case_pairs_stay_distinct_in_db_and_cache() {
    let conn = open_db_in_memory().unwrap();
    let broadcaster = EventBroadcaster::new(BroadcastConfig::default());
    let viewer = broadcaster
        .subscribe(SubscriptionFilter::only(CollectionId::roles()))
        .unwrap();
    let service = RoleService::new(
        SqliteRoleRepository::try_new(&conn).unwrap(),
        broadcaster.clone(),
    );
    let mut cache = LiveCache::new(CollectionId::roles(), Vec::new(), 0);

    service.create_role("Équipe", None).unwrap();
    service.create_role("équipe", None).unwrap();
    service.remove_role("équipe", None).unwrap();

    while let Ok(event) = viewer.try_recv() {
        cache.apply(&event).unwrap();
    }
    assert_eq!(cache.status(), CacheStatus::Fresh);
    assert_eq!(
        sorted_names(cache.items()),
        sorted_names(&service.list_roles().unwrap())
    );
    assert_eq!(
        sorted_names(cache.items()),
        vec![("Équipe".to_string(), true)]
    );
}

#[test]
fn lagging_viewer_is_dropped_and_recovers_by_refetch() {
    let conn = open_db_in_memory().unwrap();
    let broadcaster = EventBroadcaster::new(BroadcastConfig {
        max_subscribers: 4,
        queue_depth: 1,
    });
    let viewer = broadcaster.subscribe(SubscriptionFilter::All).unwrap();
    let service = RoleService::new(
        SqliteRoleRepository::try_new(&conn).unwrap(),
        broadcaster.clone(),
    );
    let mut cache = LiveCache::new(CollectionId::roles(), Vec::new(), 0);

    service.create_role("Lead", None).unwrap();
    service.create_role("Support", None).unwrap();
    service.create_role("Runner", None).unwrap();

    while let Ok(event) = viewer.try_recv() {
        cache.apply(&event).unwrap();
    }
    assert_eq!(viewer.drop_reason(), Some(DropReason::SubscriberLagged));
    assert_eq!(cache.items().len(), 1);
    cache.mark_stale();
    assert!(cache.needs_refetch());

    let seq = broadcaster.current_seq(CollectionId::roles()).unwrap();
    cache.reset(service.list_roles().unwrap(), seq);
    assert_eq!(cache.status(), CacheStatus::Fresh);
    assert_eq!(cache.items().len(), 3);
    assert_eq!(cache.last_seq(), 3);
}

/// Returns `(shift_time_id, shift_position_id)` of a fresh one-slot shift.
fn seed_shift(conn: &Connection) -> (i64, i64) {
    upsert_category(conn, 1, "Operations").unwrap();
    upsert_position_type(conn, 10, "Lead", None).unwrap();
    let service = ShiftTypeService::new(
        SqliteShiftTypeRepository::try_new(conn).unwrap(),
        EngineConfig::default(),
    );
    let created = service
        .create(&ShiftTypeInfo {
            name: "Gate".to_string(),
            details: String::new(),
            category_id: Some(1),
            is_core: false,
            is_off_playa: false,
        })
        .unwrap();
    service
        .reconcile(
            created.id,
            &DesiredShiftType {
                expected_version: created.version,
                information: created.info.clone(),
                positions: vec![DesiredPosition {
                    position_type_id: 10,
                    total_slots: 2,
                    wap_points: 0,
                }],
                times: vec![DesiredTime {
                    id: None,
                    start_time: "2024-08-26T09:00:00".to_string(),
                    end_time: "2024-08-26T12:00:00".to_string(),
                    instance: String::new(),
                    notes: String::new(),
                }],
            },
        )
        .unwrap();
    let snapshot = service.read(created.id).unwrap().unwrap();
    (snapshot.times[0].id, snapshot.positions[0].id)
}

fn volunteer(time_id: i64, position_id: i64, volunteer_id: &str) -> ShiftVolunteerItem {
    ShiftVolunteerItem {
        volunteer_id: volunteer_id.to_string(),
        shift_time_id: time_id,
        shift_position_id: position_id,
        display_name: format!("Burner {volunteer_id}"),
    }
}

#[test]
fn signup_events_are_scoped_to_their_shift_time() {
    let conn = open_db_in_memory().unwrap();
    let (time_id, position_id) = seed_shift(&conn);
    let broadcaster = EventBroadcaster::new(BroadcastConfig::default());
    let same_time = broadcaster
        .subscribe(SubscriptionFilter::only(CollectionId::shift_volunteers(time_id)))
        .unwrap();
    let other_time = broadcaster
        .subscribe(SubscriptionFilter::only(CollectionId::shift_volunteers(
            time_id + 1,
        )))
        .unwrap();
    let service = SignupService::new(
        SqliteSignupRepository::try_new(&conn).unwrap(),
        broadcaster.clone(),
    );
    let mut cache: LiveCache<ShiftVolunteerItem> =
        LiveCache::new(CollectionId::shift_volunteers(time_id), Vec::new(), 0);

    service
        .add(&volunteer(time_id, position_id, "v1"), None)
        .unwrap();
    service
        .add(&volunteer(time_id, position_id, "v2"), None)
        .unwrap();
    service.remove(time_id, "v1", None).unwrap();

    while let Ok(event) = same_time.try_recv() {
        cache.apply(&event).unwrap();
    }
    assert!(other_time.try_recv().is_err());
    assert_eq!(cache.items(), service.list(time_id).unwrap().as_slice());
    assert_eq!(cache.items()[0].volunteer_id, "v2");
}

#[test]
fn signup_rules_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let (time_id, position_id) = seed_shift(&conn);
    let service = SignupService::new(
        SqliteSignupRepository::try_new(&conn).unwrap(),
        EventBroadcaster::new(BroadcastConfig::default()),
    );

    service
        .add(&volunteer(time_id, position_id, "v1"), None)
        .unwrap();
    assert!(matches!(
        service.add(&volunteer(time_id, position_id, "v1"), None),
        Err(SignupServiceError::AlreadySignedUp(_))
    ));
    assert!(matches!(
        service.add(&volunteer(time_id, position_id + 100, "v2"), None),
        Err(SignupServiceError::SlotUnavailable { .. })
    ));
    assert!(matches!(
        service.add(&volunteer(time_id, position_id, "  "), None),
        Err(SignupServiceError::InvalidVolunteer)
    ));
    assert!(matches!(
        service.remove(time_id, "nobody", None),
        Err(SignupServiceError::NotSignedUp(_))
    ));

    service.remove(time_id, "v1", None).unwrap();
    service
        .add(&volunteer(time_id, position_id, "v1"), None)
        .unwrap();
    assert_eq!(service.list(time_id).unwrap().len(), 1);
}

#[test]
fn times_and_positions_with_signups_cannot_be_removed() {
    let conn = open_db_in_memory().unwrap();
    let (time_id, position_id) = seed_shift(&conn);
    let shift_type_id: i64 = conn
        .query_row(
            "SELECT shift_type_id FROM shift_times WHERE id = ?1;",
            [time_id],
            |row| row.get(0),
        )
        .unwrap();
    let signups = SignupService::new(
        SqliteSignupRepository::try_new(&conn).unwrap(),
        EventBroadcaster::new(BroadcastConfig::default()),
    );
    let shifts = ShiftTypeService::new(
        SqliteShiftTypeRepository::try_new(&conn).unwrap(),
        EngineConfig::default(),
    );
    signups
        .add(&volunteer(time_id, position_id, "v1"), None)
        .unwrap();

    let snapshot = shifts.read(shift_type_id).unwrap().unwrap();
    let mut emptied = DesiredShiftType::from_snapshot(&snapshot);
    emptied.positions.clear();
    emptied.times.clear();
    assert!(matches!(
        shifts.reconcile(shift_type_id, &emptied),
        Err(ReconcileError::ValidationFailed(ValidationIssue::ChildHasSignups {
            collection: "positions",
            id,
        })) if id == position_id
    ));

    let mut without_time = DesiredShiftType::from_snapshot(&snapshot);
    without_time.times.clear();
    assert!(matches!(
        shifts.reconcile(shift_type_id, &without_time),
        Err(ReconcileError::ValidationFailed(ValidationIssue::ChildHasSignups {
            collection: "times",
            id,
        })) if id == time_id
    ));

    let unchanged = shifts.read(shift_type_id).unwrap().unwrap();
    assert_eq!(unchanged, snapshot);
    assert_eq!(signups.list(time_id).unwrap().len(), 1);

    signups.remove(time_id, "v1", None).unwrap();
    shifts.reconcile(shift_type_id, &emptied).unwrap();
    let after = shifts.read(shift_type_id).unwrap().unwrap();
    assert!(after.positions.is_empty());
    assert!(after.times.is_empty());
}
