//! Fingerprint cache behavior across generation runs

mod common;

use std::sync::atomic::Ordering;

use common::{final_event, lions_bears, service_with, test_database, StaticProvider};
use teamarr::matching::{DetectionTier, StreamMatchCache};

#[tokio::test]
async fn test_cache_hit_skips_fuzzy_matching() {
    let db = test_database().await;
    let cache = StreamMatchCache::new(db.clone());

    let event = lions_bears();
    let provider = StaticProvider::single("nfl", vec![event.clone()]);
    let service = service_with(provider.clone());

    // Pre-seed the cache as a prior run would have
    cache
        .set(1, "77", "Lions vs Bears", &event, 1)
        .await
        .expect("cache write");

    let hit = cache
        .lookup(&service, 1, "77", "Lions vs Bears", 2)
        .await
        .expect("lookup")
        .expect("cache hit");

    assert!(hit.matched);
    assert!(hit.from_cache);
    assert_eq!(hit.detection_tier, Some(DetectionTier::Cache));
    assert_eq!(hit.event.as_ref().unwrap().id, "401547");
    // The cache tier performs zero scoreboard fetches (only the
    // single-event dynamic refresh)
    assert_eq!(provider.scoreboard_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_hit_refreshes_dynamic_fields() {
    let db = test_database().await;
    let cache = StreamMatchCache::new(db.clone());

    // Snapshot cached while the game was scheduled
    let stale = lions_bears();
    cache.set(1, "77", "Lions vs Bears", &stale, 1).await.unwrap();

    // The provider now reports the game final with scores
    let fresh = final_event(lions_bears(), 17, 24);
    let provider = StaticProvider::single("nfl", vec![fresh]);
    let service = service_with(provider);

    let hit = cache
        .lookup(&service, 1, "77", "Lions vs Bears", 2)
        .await
        .unwrap()
        .unwrap();

    let event = hit.event.unwrap();
    assert!(event.status.is_final());
    assert_eq!(event.home_score, Some(17));
    assert_eq!(event.away_score, Some(24));
    // Static fields reused verbatim from the snapshot
    assert_eq!(event.name, "Detroit Lions at Chicago Bears");
}

#[tokio::test]
async fn test_cache_miss_for_different_fingerprint() {
    let db = test_database().await;
    let cache = StreamMatchCache::new(db.clone());
    let service = service_with(StaticProvider::single("nfl", vec![lions_bears()]));

    cache
        .set(1, "77", "Lions vs Bears", &lions_bears(), 1)
        .await
        .unwrap();

    // Different group, stream id, or name all miss
    assert!(cache
        .lookup(&service, 2, "77", "Lions vs Bears", 2)
        .await
        .unwrap()
        .is_none());
    assert!(cache
        .lookup(&service, 1, "78", "Lions vs Bears", 2)
        .await
        .unwrap()
        .is_none());
    assert!(cache
        .lookup(&service, 1, "77", "Lions @ Bears", 2)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_generation_stamping_and_eviction() {
    let db = test_database().await;
    let cache = StreamMatchCache::new(db.clone());
    let service = service_with(StaticProvider::single("nfl", vec![lions_bears()]));

    cache
        .set(1, "77", "Lions vs Bears", &lions_bears(), 5)
        .await
        .unwrap();

    // A lookup at generation 12 touches the entry forward
    cache
        .lookup(&service, 1, "77", "Lions vs Bears", 12)
        .await
        .unwrap()
        .unwrap();

    // Sweeping at generation 20 with a 10-run window keeps it
    let evicted = cache.evict_stale(20, 10).await.unwrap();
    assert_eq!(evicted, 0);
    assert!(cache.get(1, "77", "Lions vs Bears").await.unwrap().is_some());

    // A much later sweep evicts it
    let evicted = cache.evict_stale(40, 10).await.unwrap();
    assert_eq!(evicted, 1);
    assert!(cache.get(1, "77", "Lions vs Bears").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cached_event_id_matches_entry() {
    let db = test_database().await;
    let cache = StreamMatchCache::new(db.clone());
    let service = service_with(StaticProvider::single("nfl", vec![lions_bears()]));

    cache
        .set(1, "77", "Lions vs Bears", &lions_bears(), 1)
        .await
        .unwrap();

    let entry = cache.get(1, "77", "Lions vs Bears").await.unwrap().unwrap();
    let hit = cache
        .lookup(&service, 1, "77", "Lions vs Bears", 2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.event.unwrap().id, entry.event_id);
}
