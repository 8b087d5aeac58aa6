//! Integration tests for the discovery runs
//!
//! These tests use wiremock to stand in for the statistics site and run
//! the discoveries end-to-end against temporary directories.

use crate::common::{create_test_config, event_page, events_listing, fighter_index};
use octagon_harvest::crawler::{Discoverer, EntityKind};
use octagon_harvest::state::DiscoveryCheckpoint;
use octagon_harvest::storage::{read_url_list, write_url_list};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Three event pages with two fights each
async fn mount_event_pages(server: &MockServer) {
    let base_url = server.uri();
    for (event, fights) in [("1", ["1a", "1b"]), ("2", ["2a", "2b"]), ("3", ["3a", "3b"])] {
        Mock::given(method("GET"))
            .and(path(format!("/event-details/{}", event)))
            .respond_with(html(event_page(&base_url, &fights)))
            .mount(server)
            .await;
    }
}

fn event_urls(base_url: &str) -> Vec<String> {
    (1..=3)
        .map(|n| format!("{}/event-details/{}", base_url, n))
        .collect()
}

fn fight_url(base_url: &str, id: &str) -> String {
    format!("{}/fight-details/{}", base_url, id)
}

fn all_fight_urls(base_url: &str) -> HashSet<String> {
    ["1a", "1b", "2a", "2b", "3a", "3b"]
        .iter()
        .map(|id| fight_url(base_url, id))
        .collect()
}

#[tokio::test]
async fn test_fight_discovery_single_pass() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.found, 6);
    assert!(report.written);
    let written = read_url_list(&discoverer.url_list_path(EntityKind::Fight)).unwrap();
    assert_eq!(written.len(), 6);
    assert_eq!(
        written.into_iter().collect::<HashSet<_>>(),
        all_fight_urls(&base_url)
    );

    let checkpoint = discoverer.checkpoint_store().load().unwrap().unwrap();
    assert_eq!(checkpoint.cursor, 3);
    assert_eq!(checkpoint.collected.len(), 6);
    assert!(checkpoint.is_complete());
}

#[tokio::test]
async fn test_fight_discovery_resumes_from_checkpoint() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Parents before the cursor must not be fetched again
    for event in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path(format!("/event-details/{}", event)))
            .respond_with(html(event_page(&base_url, &["xx"])))
            .expect(0)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/event-details/3"))
        .respond_with(html(event_page(&base_url, &["3a", "3b"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    let parents = event_urls(&base_url);
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &parents).unwrap();

    // Interrupted after the second event page
    let mut interrupted = DiscoveryCheckpoint::fresh(&parents);
    interrupted.cursor = 2;
    interrupted.collected = ["1a", "1b", "2a", "2b"]
        .iter()
        .map(|id| fight_url(&base_url, id))
        .collect();
    discoverer.checkpoint_store().save(&interrupted).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.links.len(), 6);
    let written = read_url_list(&discoverer.url_list_path(EntityKind::Fight)).unwrap();
    assert_eq!(
        written.into_iter().collect::<HashSet<_>>(),
        all_fight_urls(&base_url)
    );
    assert_eq!(discoverer.checkpoint_store().load().unwrap().unwrap().cursor, 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_periodic_checkpoint() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // The third event page hangs once, long enough to interrupt the run
    Mock::given(method("GET"))
        .and(path("/event-details/3"))
        .respond_with(
            html(event_page(&base_url, &["3a", "3b"])).set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&base_url, dir.path());
    config.discovery.checkpoint_every = 2;
    let discoverer = Discoverer::new(config).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    let interrupted =
        tokio::time::timeout(Duration::from_secs(1), discoverer.discover_fights()).await;
    assert!(interrupted.is_err());
    assert!(!discoverer.url_list_path(EntityKind::Fight).exists());

    let checkpoint = discoverer.checkpoint_store().load().unwrap().unwrap();
    assert_eq!(checkpoint.cursor, 2);
    assert_eq!(checkpoint.collected.len(), 4);
    assert_eq!(
        checkpoint.collected.iter().cloned().collect::<HashSet<_>>(),
        ["1a", "1b", "2a", "2b"]
            .iter()
            .map(|id| fight_url(&base_url, id))
            .collect()
    );

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.links.len(), 6);
    let written = read_url_list(&discoverer.url_list_path(EntityKind::Fight)).unwrap();
    assert_eq!(
        written.into_iter().collect::<HashSet<_>>(),
        all_fight_urls(&base_url)
    );
    assert!(discoverer.checkpoint_store().load().unwrap().unwrap().is_complete());
}

#[tokio::test]
async fn test_finished_checkpoint_starts_over() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    discoverer.discover_fights().await.unwrap();
    let second = discoverer.discover_fights().await.unwrap();

    // A full second pass, not an empty resume
    assert_eq!(second.found, 6);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_fight_discovery_excludes_known_fights() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base_url, dir.path());
    fs::create_dir_all(&config.paths.raw_dir).unwrap();
    fs::write(
        config.paths.raw_dir.join("ufc_fight_data.csv"),
        format!(
            "event_name,referee,fight_url\nUFC 1,Herb Dean,{}\nUFC 1,Marc Goddard,{}\n",
            fight_url(&base_url, "1a"),
            fight_url(&base_url, "2b")
        ),
    )
    .unwrap();

    let discoverer = Discoverer::new(config).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.found, 6);
    let written = read_url_list(&discoverer.url_list_path(EntityKind::Fight)).unwrap();
    assert_eq!(written.len(), 4);
    assert!(!written.contains(&fight_url(&base_url, "1a")));
    assert!(!written.contains(&fight_url(&base_url, "2b")));
}

#[tokio::test]
async fn test_no_new_urls_leaves_list_untouched() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base_url, dir.path());
    let mut table = String::from("fight_url\n");
    for url in all_fight_urls(&base_url) {
        table.push_str(&url);
        table.push('\n');
    }
    fs::create_dir_all(&config.paths.raw_dir).unwrap();
    fs::write(config.paths.raw_dir.join("ufc_fight_data.csv"), table).unwrap();

    let discoverer = Discoverer::new(config).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();
    let previous = vec![fight_url(&base_url, "old")];
    let fight_list = discoverer.url_list_path(EntityKind::Fight);
    write_url_list(&fight_list, &previous).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert!(!report.written);
    assert!(report.links.is_empty());
    assert_eq!(read_url_list(&fight_list).unwrap(), previous);
}

#[tokio::test]
async fn test_failing_event_page_is_skipped() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/event-details/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.links.len(), 4);
    assert_eq!(report.summary.skipped_count(), 1);
    assert_eq!(report.summary.done_count(), 2);
    let skipped: Vec<_> = report.summary.skipped().map(|o| o.item().to_string()).collect();
    assert_eq!(skipped, vec![format!("{}/event-details/2", base_url)]);
    assert_eq!(discoverer.checkpoint_store().load().unwrap().unwrap().cursor, 3);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/event-details/3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_event_pages(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    write_url_list(&discoverer.url_list_path(EntityKind::Event), &event_urls(&base_url)).unwrap();

    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.links.len(), 6);
    assert_eq!(report.summary.skipped_count(), 0);
}

#[tokio::test]
async fn test_event_discovery() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/statistics/events/completed"))
        .and(query_param("page", "all"))
        .respond_with(html(events_listing(&base_url, &["e1", "e2", "e3"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base_url, dir.path());
    fs::create_dir_all(&config.paths.raw_dir).unwrap();
    fs::write(
        config.paths.raw_dir.join("ufc_event_data.csv"),
        format!("event_name,event_url\nUFC e1,{}/event-details/e1\n", base_url),
    )
    .unwrap();

    let discoverer = Discoverer::new(config).unwrap();
    let report = discoverer.discover(EntityKind::Event).await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(
        read_url_list(&discoverer.url_list_path(EntityKind::Event)).unwrap(),
        vec![
            format!("{}/event-details/e2", base_url),
            format!("{}/event-details/e3", base_url),
        ]
    );
}

#[tokio::test]
async fn test_fighter_discovery_visits_every_letter() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/statistics/fighters"))
        .and(query_param("char", "a"))
        .respond_with(html(fighter_index(&base_url, &["p1", "p2"])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/statistics/fighters"))
        .respond_with(html(fighter_index(&base_url, &[])))
        .expect(25)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    let report = discoverer.discover(EntityKind::Fighter).await.unwrap();

    assert_eq!(report.summary.done_count(), 26);
    assert_eq!(
        read_url_list(&discoverer.url_list_path(EntityKind::Fighter)).unwrap(),
        vec![
            format!("{}/fighter-details/p1", base_url),
            format!("{}/fighter-details/p2", base_url),
        ]
    );
}

#[tokio::test]
async fn test_discover_all_continues_after_failed_run() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Empty listing: no events, so the fight run has no event list
    Mock::given(method("GET"))
        .and(path("/statistics/events/completed"))
        .respond_with(html(events_listing(&base_url, &[])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/statistics/fighters"))
        .respond_with(html(fighter_index(&base_url, &["p1"])))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let discoverer = Discoverer::new(create_test_config(&base_url, dir.path())).unwrap();
    let results = discoverer.discover_all().await;

    assert_eq!(results.len(), 3);
    let events = results[0].as_ref().unwrap();
    assert!(!events.written);
    assert_eq!(events.summary.skipped_count(), 1);
    assert!(results[1].is_err());
    let fighters = results[2].as_ref().unwrap();
    assert_eq!(fighters.links.len(), 1);
}
