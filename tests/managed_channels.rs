//! Managed-channel persistence: numbering, soft deletion, history

mod common;

use chrono::{Duration, Utc};
use common::test_database;
use teamarr::database::managed_channels::NewManagedChannel;
use teamarr::models::SyncStatus;

fn new_channel(number: i64, event_id: &'static str) -> NewManagedChannel<'static> {
    NewManagedChannel {
        event_group_id: 1,
        dispatcharr_channel_id: 100 + number,
        dispatcharr_uuid: None,
        dispatcharr_stream_id: 77,
        channel_number: number,
        channel_name: "Giants @ Cowboys",
        espn_event_id: event_id,
        event_date: None,
        scheduled_delete_at: None,
        logo_id: None,
    }
}

#[tokio::test]
async fn test_channel_number_allocation_is_monotonic() {
    let db = test_database().await;

    assert_eq!(db.next_channel_number(1, 5000).await.unwrap(), 5000);

    db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    assert_eq!(db.next_channel_number(1, 5000).await.unwrap(), 5001);

    db.insert_managed_channel(new_channel(5001, "e2")).await.unwrap();
    assert_eq!(db.next_channel_number(1, 5000).await.unwrap(), 5002);

    // A second group allocates independently from its own start
    assert_eq!(db.next_channel_number(2, 6000).await.unwrap(), 6000);
}

#[tokio::test]
async fn test_numbers_of_undeleted_channels_are_never_reused() {
    let db = test_database().await;

    let first = db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    db.insert_managed_channel(new_channel(5001, "e2")).await.unwrap();

    // Deleting a lower-numbered channel never hands its number back
    // while a higher undeleted channel exists
    db.mark_managed_channel_deleted(first).await.unwrap();
    assert_eq!(db.next_channel_number(1, 5000).await.unwrap(), 5002);
}

#[tokio::test]
async fn test_soft_delete_hides_channel_from_lookups() {
    let db = test_database().await;

    let id = db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    assert!(db.get_managed_channel_by_event("e1", 1).await.unwrap().is_some());

    db.mark_managed_channel_deleted(id).await.unwrap();
    assert!(db.get_managed_channel_by_event("e1", 1).await.unwrap().is_none());

    // The row itself survives with deleted_at set
    let row = db.get_managed_channel(id).await.unwrap().unwrap();
    assert!(row.deleted_at.is_some());
}

#[tokio::test]
async fn test_pending_deletion_listing() {
    let db = test_database().await;

    let mut due = new_channel(5000, "e1");
    let past = Utc::now() - Duration::minutes(5);
    due.scheduled_delete_at = Some(past);
    db.insert_managed_channel(due).await.unwrap();

    let mut not_due = new_channel(5001, "e2");
    not_due.scheduled_delete_at = Some(Utc::now() + Duration::days(1));
    db.insert_managed_channel(not_due).await.unwrap();

    db.insert_managed_channel(new_channel(5002, "e3")).await.unwrap();

    let pending = db.list_channels_pending_deletion().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].channel_number, 5000);
}

#[tokio::test]
async fn test_duplicate_detection() {
    let db = test_database().await;

    db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    db.insert_managed_channel(new_channel(5001, "e1")).await.unwrap();
    db.insert_managed_channel(new_channel(5002, "e2")).await.unwrap();

    let duplicates = db.list_duplicate_events(None).await.unwrap();
    assert_eq!(duplicates.len(), 1);
    let (event_id, group_id, count) = &duplicates[0];
    assert_eq!(event_id, "e1");
    assert_eq!(*group_id, 1);
    assert_eq!(*count, 2);
}

#[tokio::test]
async fn test_sync_status_and_history_log() {
    let db = test_database().await;

    let id = db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    db.update_sync_status(id, SyncStatus::Drifted, Some("channel_number: expected 5000, got 5002"))
        .await
        .unwrap();

    let row = db.get_managed_channel(id).await.unwrap().unwrap();
    assert_eq!(row.sync_status, SyncStatus::Drifted);

    db.log_channel_history(id, "modified", Some("reconciliation"), Some("drift corrected"))
        .await
        .unwrap();
    db.log_channel_history(id, "verified", Some("reconciliation"), None)
        .await
        .unwrap();

    let history = db.get_channel_history(id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    // Newest first
    assert_eq!(history[0].change_type, "verified");
    assert_eq!(history[1].change_type, "modified");
}

#[tokio::test]
async fn test_uuid_backfill_roundtrip() {
    let db = test_database().await;

    let id = db.insert_managed_channel(new_channel(5000, "e1")).await.unwrap();
    db.update_dispatcharr_uuid(id, "uuid-abc").await.unwrap();

    let row = db.get_managed_channel(id).await.unwrap().unwrap();
    assert_eq!(row.dispatcharr_uuid.as_deref(), Some("uuid-abc"));
}
