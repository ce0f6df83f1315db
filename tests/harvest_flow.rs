//! End-to-end harvest scenarios over scripted DOM timelines.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use threadharvest::browser::fake::{cards, FakeDriver, FakePage};
use threadharvest::models::{ReplyScrapeOptions, ScrapeStage};
use threadharvest::progress::{self, ProgressChannel};
use threadharvest::scrape::HarvestCallbacks;
use threadharvest::storage::MemoryStore;
use threadharvest::{Orchestrator, ScrapeMethod};

/// Record emission order through the optional callbacks.
fn order_recorder() -> (Arc<Mutex<Vec<String>>>, HarvestCallbacks) {
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let roots = order.clone();
    let replies = order.clone();
    let callbacks = HarvestCallbacks {
        on_root_post: Some(Box::new(move |root| {
            roots.lock().unwrap().push(format!("root:{}", root.id));
            Ok(())
        })),
        on_reply: Some(Box::new(move |reply| {
            replies.lock().unwrap().push(format!("reply:{}", reply.id));
            Ok(())
        })),
    };
    (order, callbacks)
}

#[tokio::test(start_paused = true)]
async fn account_harvest_emits_roots_before_their_replies() {
    let page = FakePage::new();
    page.push_cards_for(
        "x.com/demo",
        cards(&[
            ("A", "post a", "Demo@demo", 100.0),
            ("B", "post b", "Demo@demo", 200.0),
            ("C", "post c", "Demo@demo", 300.0),
        ]),
    );
    for root in ["A", "B", "C"] {
        let reply_ids: Vec<String> = (1..=5).map(|n| format!("{root}{n}")).collect();
        let batch = cards(&[
            (root, "root text", "Demo@demo", 10.0),
            (reply_ids[0].as_str(), "r1", "U1@u1", 100.0),
            (reply_ids[1].as_str(), "r2", "U2@u2", 200.0),
            (reply_ids[2].as_str(), "r3", "U3@u3", 300.0),
            (reply_ids[3].as_str(), "r4", "U4@u4", 400.0),
            (reply_ids[4].as_str(), "r5", "U5@u5", 500.0),
        ]);
        page.push_cards_for(&format!("status/{root}"), batch);
    }

    let driver = Arc::new(FakeDriver::new());
    driver.push_page(page.clone());
    let store = Arc::new(MemoryStore::new());
    let (order, callbacks) = order_recorder();

    let orchestrator = Orchestrator::new(store.clone(), store.clone())
        .with_driver(driver)
        .with_callbacks(callbacks);
    let outcome = orchestrator
        .scrape_account("demo", 3, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.method, "browser");
    assert_eq!(outcome.posts_found, 3);
    assert_eq!(outcome.replies_found, 15);

    // Every root is observed before any of its replies.
    let order = order.lock().unwrap().clone();
    for root in ["A", "B", "C"] {
        let root_at = order
            .iter()
            .position(|e| e == &format!("root:{root}"))
            .expect("root emitted");
        for n in 1..=5 {
            let reply_at = order
                .iter()
                .position(|e| e == &format!("reply:{root}{n}"))
                .expect("reply emitted");
            assert!(root_at < reply_at, "root {root} after reply {root}{n}");
        }
    }

    let mut root_ids: Vec<String> = store.root_posts().into_iter().map(|r| r.id).collect();
    root_ids.sort();
    assert_eq!(root_ids, vec!["A", "B", "C"]);
    for root in ["A", "B", "C"] {
        assert_eq!(store.replies_for_root(root).len(), 5);
    }

    let progress = ProgressChannel::global()
        .get(&progress::account_key("demo"))
        .expect("terminal progress");
    assert_eq!(progress.stage, ScrapeStage::Complete);
    assert_eq!(progress.posts_found, 3);
    assert_eq!(progress.replies_found, 15);

    assert!(page.is_closed(), "page released after the run");
}

#[tokio::test(start_paused = true)]
async fn single_post_harvest_happy_path() {
    let root_id = "1728108619189874825";
    let page = FakePage::new();
    page.push_cards(cards(&[
        (root_id, "root text", "Root Author@rootauthor", 10.0),
        ("9001", "R1", "A@a", 100.0),
        ("9002", "R2", "B@b", 200.0),
    ]));

    let driver = Arc::new(FakeDriver::new());
    driver.push_page(page.clone());
    let store = Arc::new(MemoryStore::new());

    let orchestrator = Orchestrator::new(store.clone(), store.clone()).with_driver(driver);
    let outcome = orchestrator
        .scrape_root_post(root_id, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!((outcome.posts_found, outcome.replies_found), (1, 2));

    let replies = store.replies_for_root(root_id);
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.reply_to == root_id));
    assert!(page.is_closed());
}

#[tokio::test(start_paused = true)]
async fn login_wall_terminates_with_reconfigure_message() {
    let root_id = "4242424242";
    let page = FakePage::new();
    page.push_cards(cards(&[(root_id, "root", "R@r", 10.0)]));
    page.set_body_text("Sign in to X\nView 12 replies");

    let driver = Arc::new(FakeDriver::new());
    driver.push_page(page.clone());
    let store = Arc::new(MemoryStore::new());
    // A bundle without auth_token cannot pass the wall.
    threadharvest::config::ConfigStore::set(
        store.as_ref(),
        "X_COOKIES",
        r#"[{"name":"ct0","value":"abc"}]"#,
        None,
    )
    .await
    .unwrap();

    let orchestrator = Orchestrator::new(store.clone(), store.clone()).with_driver(driver);
    let outcome = orchestrator
        .scrape_root_post(root_id, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap_or_default().contains("X_COOKIES"));
    assert_eq!(outcome.replies_found, 0);
    assert_eq!(store.reply_count(), 0);

    let progress = ProgressChannel::global()
        .get(&progress::tweet_key(root_id))
        .expect("terminal progress");
    assert_eq!(progress.stage, ScrapeStage::Error);
}

#[tokio::test(start_paused = true)]
async fn recommendation_cutoff_bounds_collected_roots() {
    let page = FakePage::new();
    page.set_cutoff(350.0);
    page.push_cards_for(
        "x.com/cutoffdemo",
        cards(&[
            ("A", "post a", "Demo@cutoffdemo", 100.0),
            ("B", "post b", "Demo@cutoffdemo", 200.0),
            ("C", "post c", "Demo@cutoffdemo", 300.0),
            ("X", "recommended", "Other@other", 400.0),
            ("Y", "recommended", "Other@other", 500.0),
        ]),
    );
    for root in ["A", "B", "C"] {
        page.push_cards_for(
            &format!("status/{root}"),
            cards(&[(root, "root text", "Demo@cutoffdemo", 10.0)]),
        );
    }

    let driver = Arc::new(FakeDriver::new());
    driver.push_page(page.clone());
    let store = Arc::new(MemoryStore::new());

    let orchestrator = Orchestrator::new(store.clone(), store.clone()).with_driver(driver);
    let outcome = orchestrator
        .scrape_account("cutoffdemo", 10, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.posts_found, 3, "recommendations must not be harvested");
    assert!(store.root_post("X").is_none());
    assert!(store.root_post("Y").is_none());
}

#[tokio::test(start_paused = true)]
async fn wall_clock_timeout_preserves_state_and_releases_resources() {
    let page = FakePage::new();
    page.hang_on_goto();

    let driver = Arc::new(FakeDriver::new());
    driver.push_page(page.clone());
    let store = Arc::new(MemoryStore::new());

    let orchestrator = Orchestrator::new(store.clone(), store.clone())
        .with_driver(driver.clone())
        .with_wall_clock(Duration::from_millis(500));
    let outcome = orchestrator
        .scrape_root_post("blocked-post", ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap_or_default().contains("timed out"));

    let progress = ProgressChannel::global()
        .get(&progress::tweet_key("blocked-post"))
        .expect("terminal progress");
    assert_eq!(progress.stage, ScrapeStage::Error);

    // The cancelled harvest never reached its own close; the orchestrator
    // tears the browser down instead.
    assert!(driver.opened_pages().iter().all(|p| p.is_closed()));
}

// ---------------------------------------------------------------------------
// API fallback, against a local mock of the scraping-API endpoints.
// ---------------------------------------------------------------------------

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve the three actor endpoints: run submission, run status, dataset
/// items. Every response closes the connection.
async fn spawn_apify_mock(items: serde_json::Value) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let items = items.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 65536];
                let mut read = 0;
                loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) => break,
                        Ok(n) => {
                            read += n;
                            if let Some(end) = find_subslice(&buf[..read], b"\r\n\r\n") {
                                let headers = String::from_utf8_lossy(&buf[..end]);
                                let content_length = headers
                                    .lines()
                                    .find_map(|line| {
                                        let (name, value) = line.split_once(':')?;
                                        name.eq_ignore_ascii_case("content-length")
                                            .then(|| value.trim().parse::<usize>().ok())
                                            .flatten()
                                    })
                                    .unwrap_or(0);
                                if read >= end + 4 + content_length {
                                    break;
                                }
                            }
                            if read == buf.len() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }

                let request = String::from_utf8_lossy(&buf[..read]);
                let body = if request.contains("/acts/") {
                    r#"{"data":{"id":"run-1","defaultDatasetId":"ds-1","status":"RUNNING"}}"#
                        .to_string()
                } else if request.contains("/actor-runs/") {
                    r#"{"data":{"id":"run-1","status":"SUCCEEDED","defaultDatasetId":"ds-1"}}"#
                        .to_string()
                } else {
                    items.to_string()
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/v2")
}

#[tokio::test]
async fn browser_launch_failure_falls_back_to_the_api_client() {
    let root_id = "5150";
    let items = json!([
        {
            "id": root_id,
            "conversationId": root_id,
            "text": "the root post",
            "createdAt": "2024-11-20T08:30:00Z",
            "likeCount": 40,
            "author": { "id": "u1", "name": "Root Author", "userName": "rootauthor" },
        },
        {
            "id": "5151",
            "conversationId": root_id,
            "inReplyToStatusId": root_id,
            "text": "first reply",
            "createdAt": "2024-11-20T08:31:00Z",
            "author": { "id": "u2", "name": "One", "userName": "one" },
        },
        {
            "id": "5152",
            "conversationId": root_id,
            "text": "second reply",
            "createdAt": "2024-11-20T08:32:00Z",
            "author": { "id": "u3", "name": "Two", "userName": "two" },
        },
        // A quote-repost from another conversation: dropped.
        {
            "id": "9999",
            "conversationId": "9999",
            "text": "quoting this",
            "author": { "id": "u4", "name": "Stray", "userName": "stray" },
        },
    ]);
    let base_url = spawn_apify_mock(items).await;

    let store = Arc::new(MemoryStore::new());
    threadharvest::config::ConfigStore::set(store.as_ref(), "APIFY_TOKEN", "test-token", None)
        .await
        .unwrap();

    let driver = Arc::new(FakeDriver::failing_launch(
        "Failed to launch browser: spawn ENOENT",
    ));
    let orchestrator = Orchestrator::new(store.clone(), store.clone())
        .with_driver(driver)
        .with_apify_base_url(base_url);

    let outcome = orchestrator
        .scrape_root_post(root_id, ReplyScrapeOptions::default(), ScrapeMethod::Auto)
        .await;

    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.method, "api");
    assert_eq!((outcome.posts_found, outcome.replies_found), (1, 2));

    let replies = store.replies_for_root(root_id);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].reply_to, root_id);
    // The stray quote never reached the store.
    assert!(store.replies_for_root("9999").is_empty());
    assert_eq!(store.root_post(root_id).unwrap().like_count, 40);
}

#[tokio::test]
async fn api_mode_without_token_is_a_config_error() {
    let store = Arc::new(MemoryStore::new());
    let driver = Arc::new(FakeDriver::new());
    let orchestrator = Orchestrator::new(store.clone(), store.clone()).with_driver(driver);

    let outcome = orchestrator
        .scrape_root_post("77", ReplyScrapeOptions::default(), ScrapeMethod::Api)
        .await;

    assert!(!outcome.success);
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("APIFY_TOKEN"));
}
