//! Shared fixtures for the integration tests
//!
//! Builds catalog markup in the shape the extractor expects and mounts it on
//! a wiremock server.

#![allow(dead_code)]

use shelfwatch::config::{
    ApiConfig, BucketBackend, Config, CrawlerConfig, ScheduleConfig, StorageConfig,
    UserAgentConfig,
};
use shelfwatch::crawler::{build_coordinator, Coordinator};
use shelfwatch::storage::SqliteStorage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "devkey123";

/// A catalog item as served by the mock site
#[derive(Debug, Clone)]
pub struct Book {
    pub slug: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub price: f64,
    pub rating: &'static str,
    pub reviews: u32,
}

impl Book {
    pub fn new(slug: &'static str, name: &'static str, category: &'static str, price: f64) -> Self {
        Self {
            slug,
            name,
            category,
            price,
            rating: "Three",
            reviews: 0,
        }
    }

    /// Path of the detail page relative to the server root
    pub fn path(&self) -> String {
        format!("/catalogue/{}/index.html", self.slug)
    }

    pub fn detail_html(&self) -> String {
        format!(
            r#"<html><body>
<ul class="breadcrumb">
  <li><a href="../../index.html">Home</a></li>
  <li><a href="../category/books_1/index.html">Books</a></li>
  <li><a href="../category/books/x/index.html">{category}</a></li>
  <li class="active">{name}</li>
</ul>
<div class="carousel-inner"><div class="item active"><img src="../../media/{slug}.jpg" /></div></div>
<div class="product_main">
  <h1>{name}</h1>
  <p class="star-rating {rating}"></p>
</div>
<div id="product_description"><h2>Product Description</h2></div>
<p>About {name}.</p>
<table class="table table-striped">
  <tr><th>Price (excl. tax)</th><td>£{price:.2}</td></tr>
  <tr><th>Price (incl. tax)</th><td>£{price:.2}</td></tr>
  <tr><th>Availability</th><td>In stock (5 available)</td></tr>
  <tr><th>Number of reviews</th><td>{reviews}</td></tr>
</table>
</body></html>"#,
            category = self.category,
            name = self.name,
            slug = self.slug,
            rating = self.rating,
            price = self.price,
            reviews = self.reviews,
        )
    }
}

/// Listing page markup linking to `books`, optionally with a next link
pub fn listing_html(books: &[&Book], next: Option<&str>) -> String {
    let articles: String = books
        .iter()
        .map(|book| {
            format!(
                r#"<li><article class="product_pod"><h3><a href="{}/index.html">{}</a></h3></article></li>"#,
                book.slug, book.name
            )
        })
        .collect();

    let pager = match next {
        Some(href) => format!(r#"<ul class="pager"><li class="next"><a href="{}">next</a></li></ul>"#, href),
        None => String::new(),
    };

    format!(
        r#"<html><body><ol class="row">{}</ol>{}</body></html>"#,
        articles, pager
    )
}

pub async fn mount_page(server: &MockServer, page_path: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

pub async fn mount_book(server: &MockServer, book: &Book) {
    mount_page(server, &book.path(), book.detail_html()).await;
}

/// Serves `book` only after `delay`, expecting exactly `expected` requests
pub async fn mount_slow_book(server: &MockServer, book: &Book, delay: Duration, expected: u64) {
    Mock::given(method("GET"))
        .and(path(book.path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(book.detail_html())
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// Configuration pointing the crawler at `base_url`, tuned for fast tests
pub fn test_config(base_url: &str, database_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            start_url: format!("{}/catalogue/page-1.html", base_url),
            concurrency: 4,
            max_retries: 2,
            timeout_secs: 5,
            retry_base_delay_ms: 10,
            store_raw_html: false,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
        },
        api: ApiConfig {
            bind: "127.0.0.1:0".to_string(),
            api_keys: vec![API_KEY.to_string()],
            rate_limit_capacity: 100,
            refill_period_secs: 3600,
            bucket_ttl_secs: 7200,
        },
        storage: StorageConfig {
            database_path: database_path.to_string(),
            bucket_backend: BucketBackend::Memory,
        },
        schedule: ScheduleConfig::default(),
    }
}

pub fn memory_storage() -> Arc<Mutex<SqliteStorage>> {
    Arc::new(Mutex::new(
        SqliteStorage::new_in_memory().expect("in-memory database"),
    ))
}

pub fn coordinator(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
) -> Coordinator<SqliteStorage> {
    build_coordinator(config, Arc::clone(storage)).expect("coordinator")
}
