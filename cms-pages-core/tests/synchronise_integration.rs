use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cms_pages_core::contract::{
    ClientFactory, CmsClient, CmsEntry, MockClientFactory, MockCmsClient,
};
use cms_pages_core::error::{BatchError, ConfigurationError, FetchFailure};
use cms_pages_core::files::{FileCollection, FileRecord};
use cms_pages_core::query::Query;
use cms_pages_core::synchronise::{CmsPlugin, FileOutcome, FileState};
use cms_pages_core::PluginOptions;
use serde_json::{json, Value};

fn entry(id: &str, content_type: &str, subject: &str, category: &str) -> CmsEntry {
    serde_json::from_value(json!({
        "sys": {
            "id": id,
            "contentType": { "sys": { "id": content_type } },
            "createdAt": "2021-01-01T00:00:00Z"
        },
        "fields": {
            "body": format!("body of {id}"),
            "subject": subject,
            "category": { "fields": { "title": category } }
        }
    }))
    .expect("valid entry fixture")
}

fn source(metadata: Value) -> FileRecord {
    FileRecord::with_metadata(
        "source body",
        metadata.as_object().cloned().expect("metadata fixture must be an object"),
    )
}

fn options() -> PluginOptions {
    PluginOptions::with_access_token("test-token")
}

/// A factory whose clients all return `entries`.
fn factory_returning(entries: Vec<CmsEntry>) -> MockClientFactory {
    let mut factory = MockClientFactory::new();
    factory
        .expect_connect()
        .returning(move |_space_id: &str, _token: &str| {
            let entries = entries.clone();
            let mut client = MockCmsClient::new();
            client
                .expect_entries()
                .times(1)
                .returning(move |_query: Query| Ok(entries.clone()));
            Ok(Arc::new(client) as Arc<dyn CmsClient>)
        });
    factory
}

#[tokio::test]
async fn files_without_directive_pass_through_untouched() {
    let mut files = FileCollection::new();
    files.insert("index.md".into(), source(json!({ "title": "Home" })));
    files.insert("about.md".into(), FileRecord::new("about"));
    let before = files.clone();

    let mut factory = MockClientFactory::new();
    factory.expect_connect().never();

    let plugin = CmsPlugin::new(options(), factory).expect("options are valid");
    let report = plugin.run(&mut files).await.expect("batch should succeed");

    assert_eq!(files, before);
    assert!(report.files.is_empty());
}

#[tokio::test]
async fn fetched_entry_becomes_a_file() {
    let mut files = FileCollection::new();
    files.insert(
        "blog.md".into(),
        source(json!({ "contentful": { "space_id": "abc", "content_type": "post" } })),
    );

    let mut factory = MockClientFactory::new();
    factory
        .expect_connect()
        .withf(|space_id: &str, token: &str| space_id == "abc" && token == "test-token")
        .times(1)
        .returning(|_: &str, _: &str| {
            let mut client = MockCmsClient::new();
            client
                .expect_entries()
                .withf(|query: &Query| {
                    serde_json::to_value(query).ok() == Some(json!({ "content_type": "post" }))
                })
                .times(1)
                .returning(|_| {
                    Ok(vec![serde_json::from_value(json!({
                        "sys": {
                            "id": "42",
                            "contentType": { "sys": { "id": "post" } },
                            "createdAt": "2021-01-01T00:00:00Z"
                        },
                        "fields": {
                            "body": "hi",
                            "subject": "Hello",
                            "category": { "fields": { "title": "News" } }
                        }
                    }))
                    .expect("valid entry fixture")])
                });
            Ok(Arc::new(client) as Arc<dyn CmsClient>)
        });

    let plugin = CmsPlugin::new(options(), factory).unwrap();
    let report = plugin.run(&mut files).await.expect("batch should succeed");

    let post = files.get("post-42.html").expect("post-42.html should be synthesised");
    assert_eq!(post.contents, b"hi".to_vec());
    assert_eq!(post.metadata["title"], json!("Hello"));
    assert_eq!(post.metadata["collection"], json!("News"));
    assert_eq!(post.metadata["date"], json!("01-01-2021"));
    assert_eq!(post.metadata["id"], json!("42"));
    assert_eq!(post.metadata["contentType"], json!("post"));

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].state(), FileState::Done);
    assert_eq!(report.files[0].keys(), ["post-42.html".to_string()]);
    assert_eq!(report.synthesized_count(), 1);

    let block = &files["blog.md"].metadata["contentful"];
    assert_eq!(block["entries"].as_array().map(Vec::len), Some(1));
    assert_eq!(block["entries"][0]["title"], json!("Hello"));
    assert_eq!(block["entries"][0]["contents"], json!("hi"));
    assert_eq!(block["entries"][0]["contentType"], json!("post"));
    assert_eq!(block["contentTypes"]["post"].as_array().map(Vec::len), Some(1));
    assert_eq!(block["contentTypes"]["post"][0]["contents"], json!("hi"));
    assert!(block.get("content_types").is_none());
}

#[tokio::test]
async fn missing_space_id_aborts_before_any_fetch() {
    let mut files = FileCollection::new();
    files.insert(
        "a-good.md".into(),
        source(json!({ "contentful": { "space_id": "abc" } })),
    );
    files.insert(
        "b-broken.md".into(),
        source(json!({ "contentful": { "content_type": "post" } })),
    );
    let before = files.clone();

    let mut factory = MockClientFactory::new();
    factory.expect_connect().never();

    let plugin = CmsPlugin::new(options(), factory).unwrap();
    let err = plugin.run(&mut files).await.unwrap_err();

    match err {
        BatchError::Configuration(ConfigurationError::MissingSpaceId { file }) => {
            assert_eq!(file, "b-broken.md")
        }
        other => panic!("expected MissingSpaceId, got {other:?}"),
    }
    assert_eq!(files, before, "collection must be unchanged");
}

#[test]
fn missing_access_token_fails_construction() {
    let factory = MockClientFactory::new();
    let result = CmsPlugin::new(PluginOptions::default(), factory);
    assert!(matches!(result, Err(ConfigurationError::MissingAccessToken)));
}

#[tokio::test]
async fn fetch_failure_is_contained_to_its_file() {
    let mut files = FileCollection::new();
    files.insert(
        "down.md".into(),
        source(json!({ "contentful": { "space_id": "down" } })),
    );
    files.insert(
        "up.md".into(),
        source(json!({ "contentful": { "space_id": "up", "content_type": "post" } })),
    );
    files.insert("plain.md".into(), FileRecord::new("plain"));

    let mut factory = MockClientFactory::new();
    factory
        .expect_connect()
        .times(2)
        .returning(|space_id: &str, _: &str| {
            let mut client = MockCmsClient::new();
            if space_id == "down" {
                client
                    .expect_entries()
                    .returning(|_| Err(FetchFailure::new("connection reset by peer")));
            } else {
                client
                    .expect_entries()
                    .returning(|_| Ok(vec![entry("1", "post", "First", "News")]));
            }
            Ok(Arc::new(client) as Arc<dyn CmsClient>)
        });

    let plugin = CmsPlugin::new(options(), factory).unwrap();
    let report = plugin.run(&mut files).await.expect("fetch failures are contained");

    assert_eq!(report.files.len(), 2);
    let down = &report.files[0];
    assert_eq!(down.source, "down.md");
    assert_eq!(down.state(), FileState::Errored);
    assert_eq!(
        down.outcome,
        FileOutcome::FetchFailed {
            message: "connection reset by peer".to_string()
        }
    );
    assert_eq!(report.failed_fetches().count(), 1);

    assert_eq!(files.len(), 4, "three sources plus one synthesised file");
    assert!(files.contains_key("post-1.html"));

    let block = &files["down.md"].metadata["contentful"];
    assert_eq!(block["entries"], json!([]));
    assert_eq!(block["contentTypes"], json!({}));
}

#[tokio::test]
async fn factory_failure_is_contained_like_a_fetch_failure() {
    let mut files = FileCollection::new();
    files.insert(
        "blog.md".into(),
        source(json!({ "contentful": { "space_id": "abc" } })),
    );

    let mut factory = MockClientFactory::new();
    factory
        .expect_connect()
        .returning(|_: &str, _: &str| Err(FetchFailure::new("tls setup failed")));

    let plugin = CmsPlugin::new(options(), factory).unwrap();
    let report = plugin.run(&mut files).await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(report.files[0].state(), FileState::Errored);
}

#[tokio::test]
async fn rerunning_overwrites_instead_of_duplicating() {
    let mut files = FileCollection::new();
    files.insert(
        "blog.md".into(),
        source(json!({ "contentful": { "space_id": "abc", "entry_template": "post.html" } })),
    );

    let entries = vec![
        entry("1", "post", "First", "News"),
        entry("2", "post", "Second", "News"),
    ];
    let plugin = CmsPlugin::new(options(), factory_returning(entries)).unwrap();

    plugin.run(&mut files).await.unwrap();
    let after_first = files.len();
    plugin.run(&mut files).await.unwrap();

    assert_eq!(after_first, 3);
    assert_eq!(files.len(), after_first);
    assert_eq!(files["post-1.html"].metadata["template"], json!("post.html"));
    assert_eq!(
        files["blog.md"].metadata["contentful"]["entries"]
            .as_array()
            .map(Vec::len),
        Some(2),
        "directive listing is rebuilt, not appended"
    );
}

#[tokio::test]
async fn same_key_from_two_sources_is_last_write_wins() {
    let mut files = FileCollection::new();
    files.insert(
        "one.md".into(),
        source(json!({ "contentful": { "space_id": "abc" } })),
    );
    files.insert(
        "two.md".into(),
        source(json!({ "contentful": { "space_id": "abc" } })),
    );

    let plugin = CmsPlugin::new(
        options(),
        factory_returning(vec![entry("1", "post", "First", "News")]),
    )
    .unwrap();
    let report = plugin.run(&mut files).await.unwrap();

    assert_eq!(report.synthesized_count(), 2);
    assert_eq!(files.len(), 3);
    assert!(files.contains_key("post-1.html"));
}

#[tokio::test]
async fn malformed_entries_are_skipped_and_reported() {
    let mut files = FileCollection::new();
    files.insert(
        "blog.md".into(),
        source(json!({ "contentful": { "space_id": "abc" } })),
    );

    let uncategorised: CmsEntry = serde_json::from_value(json!({
        "sys": {
            "id": "bad",
            "contentType": { "sys": { "id": "post" } },
            "createdAt": "2021-01-01T00:00:00Z"
        },
        "fields": { "body": "no category" }
    }))
    .unwrap();

    let plugin = CmsPlugin::new(
        options(),
        factory_returning(vec![uncategorised, entry("good", "post", "Good", "News")]),
    )
    .unwrap();
    let report = plugin.run(&mut files).await.expect("malformed entries are contained");

    assert!(files.contains_key("post-good.html"));
    assert!(!files.contains_key("post-bad.html"));
    assert_eq!(report.malformed_count(), 1);
    assert_eq!(report.files[0].malformed[0].entry_id, "bad");
    assert_eq!(report.files[0].keys(), ["post-good.html".to_string()]);
}

struct SlowClient {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl CmsClient for SlowClient {
    async fn entries(&self, _query: Query) -> Result<Vec<CmsEntry>, FetchFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct SlowFactory {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ClientFactory for SlowFactory {
    fn connect(&self, _space_id: &str, _token: &str) -> Result<Arc<dyn CmsClient>, FetchFailure> {
        Ok(Arc::new(SlowClient {
            in_flight: self.in_flight.clone(),
            peak: self.peak.clone(),
        }))
    }
}

fn five_sources() -> FileCollection {
    (0..5)
        .map(|i| {
            (
                format!("page-{i}.md"),
                source(json!({ "contentful": { "space_id": format!("space-{i}") } })),
            )
        })
        .collect()
}

#[tokio::test]
async fn concurrency_option_bounds_in_flight_fetches() {
    let mut files = five_sources();
    let options = PluginOptions {
        concurrency: Some(2),
        ..options()
    };
    let plugin = CmsPlugin::new(options, SlowFactory::default()).unwrap();
    let report = plugin.run(&mut files).await.unwrap();

    assert_eq!(report.files.len(), 5);
    assert_eq!(plugin.factory().peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fetches_are_unbounded_by_default() {
    let mut files = five_sources();
    let plugin = CmsPlugin::new(options(), SlowFactory::default()).unwrap();
    plugin.run(&mut files).await.unwrap();

    assert_eq!(plugin.factory().peak.load(Ordering::SeqCst), 5);
}
