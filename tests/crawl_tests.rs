//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small catalog and run the full
//! fetch, extract and ingest cycle end-to-end against in-memory storage.

mod common;

use common::{
    coordinator, listing_html, memory_storage, mount_book, mount_page, mount_slow_book, test_config,
    Book,
};
use shelfwatch::scheduler::CrawlScheduler;
use shelfwatch::storage::{ChangeType, ItemStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog() -> (Book, Book, Book) {
    (
        Book::new("a-light-in-the-attic_1000", "A Light in the Attic", "Poetry", 51.77),
        Book::new("tipping-the-velvet_999", "Tipping the Velvet", "Historical Fiction", 53.74),
        Book::new("soumission_998", "Soumission", "Fiction", 50.10),
    )
}

/// Two listing pages: a and b on the first, c on the second
async fn mount_two_page_catalog(server: &MockServer, a: &Book, b: &Book, c: &Book) {
    Mock::given(method("GET"))
        .and(path("/catalogue/page-1.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_html(&[a, b], Some("page-2.html"))),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[c], None)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_two_page_listing_visits_each_page_once() {
    let server = MockServer::start().await;
    let (a, b, c) = catalog();
    mount_two_page_catalog(&server, &a, &b, &c).await;
    for book in [&a, &b, &c] {
        mount_book(&server, book).await;
    }

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.items_inserted, 3);
    assert_eq!(report.items_failed, 0);
    assert!(!report.stopped);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_items().unwrap(), 3);

    let stored = storage
        .get_item_by_url(&format!("{}{}", server.uri(), a.path()))
        .unwrap()
        .expect("item a stored");
    assert_eq!(stored.record.fields.name, "A Light in the Attic");
    assert_eq!(stored.record.fields.category.as_deref(), Some("Poetry"));
    assert_eq!(stored.record.fields.price_excl_tax, 51.77);
    assert_eq!(stored.record.fields.rating, 3);
    assert_eq!(
        stored.record.fields.image_url,
        Some(format!("{}/media/{}.jpg", server.uri(), a.slug))
    );
}

#[tokio::test]
async fn test_recrawl_is_idempotent() {
    let server = MockServer::start().await;
    let (a, b, c) = catalog();
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a, &b], Some("page-2.html"))).await;
    mount_page(&server, "/catalogue/page-2.html", listing_html(&[&c], None)).await;
    for book in [&a, &b, &c] {
        mount_book(&server, book).await;
    }

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let coordinator = coordinator(&config, &storage);

    let first = coordinator.run(&config.crawler.start_url).await;
    let second = coordinator.run(&config.crawler.start_url).await;

    assert_eq!(first.items_inserted, 3);
    assert_eq!(second.items_inserted, 0);
    assert_eq!(second.items_unchanged, 3);
    assert_eq!(second.pages_visited, 2);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_items().unwrap(), 3);
    assert_eq!(storage.count_changes(ChangeType::New).unwrap(), 3);
    assert_eq!(storage.count_changes(ChangeType::Updated).unwrap(), 0);
}

#[tokio::test]
async fn test_price_change_logs_one_update() {
    let server = MockServer::start().await;
    let (a, mut b, _) = catalog();
    let listing = listing_html(&[&a, &b], None);
    mount_page(&server, "/catalogue/page-1.html", listing.clone()).await;
    mount_book(&server, &a).await;
    mount_book(&server, &b).await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let coordinator = coordinator(&config, &storage);
    coordinator.run(&config.crawler.start_url).await;

    // The site changes the price of b between crawls
    server.reset().await;
    b.price = 49.99;
    mount_page(&server, "/catalogue/page-1.html", listing).await;
    mount_book(&server, &a).await;
    mount_book(&server, &b).await;

    let report = coordinator.run(&config.crawler.start_url).await;
    assert_eq!(report.items_updated, 1);
    assert_eq!(report.items_unchanged, 1);

    let storage = storage.lock().unwrap();
    let stored = storage
        .get_item_by_url(&format!("{}{}", server.uri(), b.path()))
        .unwrap()
        .expect("item b stored");
    assert_eq!(stored.record.fields.price_excl_tax, 49.99);

    let changes = storage.changes_for_item(stored.id).unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::New);
    assert_eq!(changes[1].change_type, ChangeType::Updated);
    assert_eq!(
        changes[1].details,
        serde_json::json!({
            "price_excl_tax": {"old": 53.74, "new": 49.99},
            "price_incl_tax": {"old": 53.74, "new": 49.99},
        })
    );
}

#[tokio::test]
async fn test_failing_item_is_isolated() {
    let server = MockServer::start().await;
    let (a, b, c) = catalog();
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a, &b, &c], None)).await;
    mount_book(&server, &a).await;
    mount_book(&server, &c).await;
    Mock::given(method("GET"))
        .and(path(b.path()))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    assert_eq!(report.items_inserted, 2);
    assert_eq!(report.items_failed, 1);
    assert_eq!(storage.lock().unwrap().count_items().unwrap(), 2);
}

#[tokio::test]
async fn test_unextractable_item_is_counted_as_failed() {
    let server = MockServer::start().await;
    let (a, b, _) = catalog();
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a, &b], None)).await;
    mount_book(&server, &a).await;
    mount_page(&server, &b.path(), "<html><body>Gone</body></html>".to_string()).await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_failed, 1);
}

#[tokio::test]
async fn test_failing_listing_page_ends_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-1.html"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.items_processed(), 0);
}

#[tokio::test]
async fn test_pagination_cycle_terminates() {
    let server = MockServer::start().await;
    let (a, b, _) = catalog();
    // page-2 links back to page-1
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a], Some("page-2.html"))).await;
    mount_page(&server, "/catalogue/page-2.html", listing_html(&[&b, &a], Some("page-1.html#top"))).await;
    mount_book(&server, &a).await;
    mount_book(&server, &b).await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    assert_eq!(report.pages_visited, 2);
    // a is linked from both pages but only processed once
    assert_eq!(report.items_processed(), 2);
}

#[tokio::test]
async fn test_stop_requested_before_run() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let coordinator = coordinator(&config, &storage);

    coordinator.stop_handle().request_stop();
    let report = coordinator.run(&config.crawler.start_url).await;

    assert!(report.stopped);
    assert_eq!(report.pages_visited, 0);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_concurrency_caps_items_in_flight() {
    let server = MockServer::start().await;
    let books: Vec<Book> = [
        ("shelf-one_1", "Shelf One"),
        ("shelf-two_2", "Shelf Two"),
        ("shelf-three_3", "Shelf Three"),
        ("shelf-four_4", "Shelf Four"),
        ("shelf-five_5", "Shelf Five"),
        ("shelf-six_6", "Shelf Six"),
    ]
    .into_iter()
    .map(|(slug, name)| Book::new(slug, name, "Poetry", 10.0))
    .collect();
    let refs: Vec<&Book> = books.iter().collect();

    mount_page(&server, "/catalogue/page-1.html", listing_html(&refs, None)).await;
    let delay = Duration::from_millis(200);
    for book in &books {
        mount_slow_book(&server, book, delay, 1).await;
    }

    let mut config = test_config(&server.uri(), ":memory:");
    config.crawler.concurrency = 2;
    let storage = memory_storage();

    let started = Instant::now();
    let report = coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(report.items_inserted, 6);
    // Six slow items two at a time take at least three delays
    assert!(elapsed >= delay * 3, "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_stop_during_run_lets_in_flight_items_finish() {
    let server = MockServer::start().await;
    let (a, b, c) = catalog();
    mount_page(
        &server,
        "/catalogue/page-1.html",
        listing_html(&[&a, &b, &c], Some("page-2.html")),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/page-2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[], None)))
        .expect(0)
        .mount(&server)
        .await;

    let delay = Duration::from_millis(300);
    mount_slow_book(&server, &a, delay, 1).await;
    mount_slow_book(&server, &b, delay, 0).await;
    mount_slow_book(&server, &c, delay, 0).await;

    let mut config = test_config(&server.uri(), ":memory:");
    config.crawler.concurrency = 1;
    let storage = memory_storage();
    let coordinator = Arc::new(coordinator(&config, &storage));

    let running = {
        let coordinator = Arc::clone(&coordinator);
        let start_url = config.crawler.start_url.clone();
        tokio::spawn(async move { coordinator.run(&start_url).await })
    };

    // a is in flight, b waits for the only slot
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.stop_handle().request_stop();
    let report = running.await.unwrap();

    assert!(report.stopped);
    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.items_inserted, 1);
    assert_eq!(report.items_processed(), 1);
    assert_eq!(storage.lock().unwrap().count_items().unwrap(), 1);

    // The stop is permanent for this coordinator
    let again = coordinator.run(&config.crawler.start_url).await;
    assert!(again.stopped);
    assert_eq!(again.pages_visited, 0);
}

#[tokio::test]
async fn test_raw_html_is_kept_when_configured() {
    let server = MockServer::start().await;
    let (a, _, _) = catalog();
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a], None)).await;
    mount_book(&server, &a).await;

    let mut config = test_config(&server.uri(), ":memory:");
    config.crawler.store_raw_html = true;
    let storage = memory_storage();
    coordinator(&config, &storage)
        .run(&config.crawler.start_url)
        .await;

    let storage = storage.lock().unwrap();
    let stored = storage
        .get_item_by_url(&format!("{}{}", server.uri(), a.path()))
        .unwrap()
        .expect("item stored");
    assert_eq!(stored.record.raw_html, Some(a.detail_html()));
}

#[tokio::test]
async fn test_scheduler_runs_until_shutdown() {
    let server = MockServer::start().await;
    let (a, _, _) = catalog();
    mount_page(&server, "/catalogue/page-1.html", listing_html(&[&a], None)).await;
    mount_book(&server, &a).await;

    let config = test_config(&server.uri(), ":memory:");
    let storage = memory_storage();
    let coordinator = Arc::new(coordinator(&config, &storage));

    let (tx, rx) = watch::channel(false);
    let scheduler = CrawlScheduler::new(
        Arc::clone(&coordinator),
        config.crawler.start_url.clone(),
        Duration::from_millis(100),
        true,
    );
    let handle = tokio::spawn(scheduler.run(rx));

    tokio::time::sleep(Duration::from_millis(350)).await;
    tx.send(true).unwrap();
    let runs = handle.await.unwrap();

    assert!(runs >= 2, "expected at least two runs, got {}", runs);
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_items().unwrap(), 1);
    assert_eq!(storage.count_changes(ChangeType::New).unwrap(), 1);
}
