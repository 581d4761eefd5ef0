mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use amdl::{AcquireService, SongCodec, UserContext};
use catalog_parser::{Protection, TrackMetadata};
use common::*;
use futures::future::join_all;

fn numbered(n: u32) -> TrackMetadata {
    TrackMetadata::from_parts(
        Some(format!("Song {n}")),
        Some("Artist".into()),
        Some("Album".into()),
        Some(n),
    )
}

#[tokio::test]
async fn concurrency_is_capped_by_the_service() {
    let mut catalog = FakeCatalog::default()
        .with_variant(aac_variant("https://cdn.music.example/a.mp4", Protection::Unprotected));
    for n in 1..=6 {
        catalog = catalog.with_track(&n.to_string(), numbered(n));
    }
    let fetcher = FakeFetcher {
        delay: Some(Duration::from_millis(100)),
        ..FakeFetcher::default()
    };
    let h = Harness::new(SongCodec::Aac, catalog, fetcher);
    let service = AcquireService::new(h.pipeline.clone(), 2);

    let urls: Vec<String> = (1..=6).map(|n| url_for(&n.to_string())).collect();
    let results = join_all(
        urls.iter()
            .map(|url| service.acquire(url, UserContext::new("tester"))),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.fetcher.calls(), 6);
    assert!(h.fetcher.max_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.output_files().len(), 6);
    assert_eq!(service.active(), 0);
}

#[tokio::test]
async fn zero_cap_still_makes_progress() {
    let catalog = FakeCatalog::default()
        .with_track("1", scenario_metadata())
        .with_variant(aac_variant("https://cdn.music.example/a.mp4", Protection::Unprotected));
    let h = Harness::new(SongCodec::Aac, catalog, FakeFetcher::default());
    let service = AcquireService::new(h.pipeline.clone(), 0);

    assert_eq!(service.max_concurrent(), 1);
    let track = service
        .acquire(SCENARIO_URL, UserContext::new("tester"))
        .await
        .unwrap();
    assert!(track.path.is_file());
}

#[tokio::test]
async fn in_flight_duplicates_are_coalesced_when_enabled() {
    let catalog = FakeCatalog::default()
        .with_track("1", scenario_metadata())
        .with_variant(aac_variant(
            "https://cdn.music.example/a.mp4",
            Protection::Header("AAAAW3Bzc2g=".into()),
        ));
    let fetcher = FakeFetcher {
        delay: Some(Duration::from_millis(100)),
        ..FakeFetcher::protected()
    };
    let h = Harness::build(
        SongCodec::Aac,
        catalog,
        fetcher,
        FakeKeys::default(),
        FakeEngine::default(),
        |settings| settings.dedupe_in_flight = true,
    );
    let service = AcquireService::new(h.pipeline.clone(), 4);

    let results = join_all(
        (0..3).map(|i| service.acquire(SCENARIO_URL, UserContext::new(format!("user-{i}")))),
    )
    .await;

    let tracks: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.engine.calls(), 1);
    assert_eq!(tracks.iter().filter(|t| t.cache_hit).count(), 2);
    assert!(tracks.windows(2).all(|w| w[0].path == w[1].path));
    assert!(h.temp_entries().is_empty());
}

#[tokio::test]
async fn failures_come_back_through_the_service() {
    let catalog = FakeCatalog::default().with_track("1", scenario_metadata());
    let h = Harness::new(SongCodec::Aac, catalog, FakeFetcher::default());
    let service = AcquireService::new(h.pipeline.clone(), 1);

    let err = service
        .acquire(SCENARIO_URL, UserContext::new("tester"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "select");
    assert!(h.output_files().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uncoalesced_duplicates_all_install_the_same_file() {
    let catalog = FakeCatalog::default()
        .with_track("1", scenario_metadata())
        .with_variant(aac_variant(
            "https://cdn.music.example/a.mp4",
            Protection::Header("AAAAW3Bzc2g=".into()),
        ));
    let fetcher = FakeFetcher {
        delay: Some(Duration::from_millis(20)),
        ..FakeFetcher::protected()
    };
    let h = Harness::new(SongCodec::Aac, catalog, fetcher);
    let service = AcquireService::new(h.pipeline.clone(), 8);

    let results = join_all(
        (0..8).map(|i| service.acquire(SCENARIO_URL, UserContext::new(format!("user-{i}")))),
    )
    .await;

    let tracks: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(tracks.windows(2).all(|w| w[0].path == w[1].path));
    assert_eq!(h.output_files(), vec![tracks[0].path.clone()]);

    let mut expected = DECRYPTED_PREFIX.to_vec();
    expected.extend_from_slice(PAYLOAD);
    assert_eq!(std::fs::read(&tracks[0].path).unwrap(), expected);
    assert!(h.temp_entries().is_empty());
}
