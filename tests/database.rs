use chrono::{TimeDelta, Timelike, Utc};
use sqlx::{Pool, Postgres};

use grubana_map::{
    aggregator::{PingQuota, QuotaDecision},
    database::{ApplicationUpdate, Database},
    errors::GrubanaError,
    geo::Coordinate,
    map::{FeedRecord, MapQuery},
    models::{ApplicationStatus, KitchenType, Ping, TruckLocation, VendorApplication},
    visibility::VisibilityPolicy,
};

fn ping(id: &str, user: &str, age: TimeDelta) -> Ping {
    Ping {
        ping_id: id.to_string(),
        user_id: user.to_string(),
        username: user.to_string(),
        coordinate: Coordinate {
            lat: 30.2672,
            lng: -97.7431,
        },
        cuisine_type: "bbq".to_string(),
        timestamp: Utc::now().with_nanosecond(0).unwrap() - age,
        address: None,
    }
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = false)]
async fn test_upsert_truck(pool: Pool<Postgres>) {
    let db = Database::new(pool.clone()).await.unwrap();

    let now = Utc::now().with_nanosecond(0).unwrap();
    let mut truck = TruckLocation {
        id: "owner-1".to_string(),
        coordinate: Coordinate {
            lat: 30.2672,
            lng: -97.7431,
        },
        is_live: true,
        visible: true,
        last_active: now,
        session_start_time: now - TimeDelta::hours(1),
        kitchen_type: KitchenType::Trailer,
        truck_name: "Smoke Signals".to_string(),
        cuisine: "bbq".to_string(),
    };
    db.upsert_truck(&truck).await.expect("Failed to insert truck");

    truck.is_live = false;
    truck.visible = false;
    db.upsert_truck(&truck).await.expect("Failed to update truck");

    let stored: (i64, bool) =
        sqlx::query_as("SELECT COUNT(*), bool_or(is_live) FROM truck_locations WHERE id = $1")
            .bind("owner-1")
            .fetch_one(&pool)
            .await
            .expect("Failed to query truck");
    assert_eq!(stored, (1, false));

    let state = db.load_state(now).await.unwrap();
    assert_eq!(state.truck("owner-1"), Some(&truck));
    let view = state.view(&VisibilityPolicy::default(), &MapQuery::at(now));
    assert!(view.trucks.is_empty());
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = false)]
async fn test_submit_ping_enforces_quota(pool: Pool<Postgres>) {
    let db = Database::new(pool.clone()).await.unwrap();
    let quota = PingQuota::default();
    let now = Utc::now();

    for (i, age) in [3, 2, 1].into_iter().enumerate() {
        let p = ping(&format!("p{i}"), "cust", TimeDelta::hours(age));
        let decision = db.submit_ping(&p, &quota, now).await.unwrap();
        assert!(decision.is_accepted(), "ping {i} rejected");
    }

    let fourth = ping("p3", "cust", TimeDelta::zero());
    match db.submit_ping(&fourth, &quota, now).await.unwrap() {
        QuotaDecision::Rejected { recent, .. } => assert_eq!(recent.len(), 3),
        other => panic!("expected rejection, got {other:?}"),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pings WHERE user_id = $1")
        .bind("cust")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);

    // Redelivery of a stored ping is not counted against itself
    let again = ping("p2", "cust", TimeDelta::hours(1));
    assert!(db.submit_ping(&again, &quota, now).await.unwrap().is_accepted());

    let other_user = ping("q0", "someone-else", TimeDelta::zero());
    assert!(db
        .submit_ping(&other_user, &quota, now)
        .await
        .unwrap()
        .is_accepted());
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = false)]
async fn test_application_status_flow(pool: Pool<Postgres>) {
    let db = Database::new(pool).await.unwrap();

    let application = VendorApplication {
        id: "app-1".to_string(),
        event_id: "e-1".to_string(),
        business_name: "Rolling Ramen".to_string(),
        contact_email: "ramen@example.com".to_string(),
        equipment_type: Some("cart".to_string()),
        status: ApplicationStatus::Pending,
    };
    assert!(db
        .process_record(&FeedRecord::Application(application.clone()))
        .await
        .unwrap());
    assert!(!db.create_application(&application).await.unwrap());

    let updated = db
        .update_application_status("app-1", ApplicationStatus::Waitlisted)
        .await
        .unwrap();
    assert_eq!(updated.status, ApplicationStatus::Waitlisted);

    db.update_application_status("app-1", ApplicationStatus::Rejected)
        .await
        .unwrap();
    let err = db
        .update_application_status("app-1", ApplicationStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, GrubanaError::InvalidTransition { .. }));
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = false)]
async fn test_record_application_applies_organizer_decision(pool: Pool<Postgres>) {
    let db = Database::new(pool.clone()).await.unwrap();

    let mut application = VendorApplication {
        id: "app-2".to_string(),
        event_id: "e-1".to_string(),
        business_name: "Churro Cart".to_string(),
        contact_email: "churros@example.com".to_string(),
        equipment_type: None,
        status: ApplicationStatus::Pending,
    };
    assert_eq!(
        db.record_application(&application).await.unwrap(),
        ApplicationUpdate::Created
    );
    // Redelivered creation record
    assert_eq!(
        db.record_application(&application).await.unwrap(),
        ApplicationUpdate::Unchanged
    );

    application.status = ApplicationStatus::Approved;
    match db.record_application(&application).await.unwrap() {
        ApplicationUpdate::StatusChanged(updated) => {
            assert_eq!(updated.status, ApplicationStatus::Approved)
        }
        other => panic!("expected status change, got {other:?}"),
    }
    assert_eq!(
        db.record_application(&application).await.unwrap(),
        ApplicationUpdate::Unchanged
    );

    let stored: String =
        sqlx::query_scalar("SELECT status FROM vendor_applications WHERE id = $1")
            .bind("app-2")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, "approved");

    application.status = ApplicationStatus::Waitlisted;
    let err = db.record_application(&application).await.unwrap_err();
    assert!(matches!(err, GrubanaError::InvalidTransition { .. }));

    // A late pending copy does not reopen a decided application
    application.status = ApplicationStatus::Pending;
    assert!(!db
        .process_record(&FeedRecord::Application(application))
        .await
        .unwrap());
}
