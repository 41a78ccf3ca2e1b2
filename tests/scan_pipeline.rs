//! End-to-end scan pipeline tests
//!
//! Drives the whole crawl against wiremock-backed targets:
//! - fetch classification feeding the record (online, blocked, erroring)
//! - multi-channel detection on realistic casino markup
//! - coverage, issue, and risk classification
//! - document assembly and the JSON output contract

use assert_json_diff::assert_json_include;
use serde_json::json;
use std::sync::Arc;

use reelscan::acquisition::AccessStatus;
use reelscan::catalog::{CrawlTarget, GameCatalog};
use reelscan::classify::{CoverageTier, RiskLevel};
use reelscan::config::ScanConfig;
use reelscan::orchestrator::Orchestrator;
use reelscan::progress::{self, ScanEventKind};
use reelscan::report::{CasinoRecord, ScanDocument};

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fixtures ──

fn catalog() -> GameCatalog {
    serde_json::from_value(json!({
        "provider": "Triple Cherry",
        "games": [
            {"title": "Goal Crash"},
            {"title": "Wild Safari"},
            {"title": "Pirate Gold"},
            {"title": "Lucky Sevens"},
            {"title": "Dragon Vault"},
            {"title": "Neon Nights"}
        ]
    }))
    .unwrap()
}

fn fleet_config() -> ScanConfig {
    let mut config = ScanConfig::default();
    config.fetch.timeout_secs = 2;
    config.fetch.retry_attempts = 2;
    config.fetch.retry_delay_ms = 5;
    config.fetch.rate_limit_delay_ms = 0;
    config.crawl.parallel_workers = 3;
    config
}

fn target(name: &str, url: &str) -> CrawlTarget {
    CrawlTarget {
        name: name.to_string(),
        url: url.to_string(),
        region: "EU".to_string(),
        country: "Malta".to_string(),
        priority: "high".to_string(),
    }
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn record<'a>(doc: &'a ScanDocument, name: &str) -> &'a CasinoRecord {
    doc.results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no record for {name}"))
}

/// Homepage with the catalog in plain sight: visible titles, deep links,
/// provider credit in the footer.
fn rich_homepage() -> &'static str {
    r#"<html><head><title>Alpha Casino</title></head><body>
      <h1>Play the best slots</h1>
      <ul class="games">
        <li><a href="/games/goal-crash">Goal Crash</a></li>
        <li><a href="/games/wild-safari">Wild Safari</a></li>
        <li><a href="/games/pirate-gold">Pirate Gold</a></li>
        <li><a href="/games/lucky-sevens">Lucky Sevens</a></li>
        <li><a href="/games/dragon-vault">Dragon Vault</a></li>
        <li><a href="/games/neon-nights">Neon Nights</a></li>
      </ul>
      <footer>Powered by Triple Cherry and other providers</footer>
    </body></html>"#
}

/// Homepage whose catalog only exists inside an embedded script blob.
fn script_only_homepage() -> &'static str {
    r#"<html><body>
      <h1>Welcome to Gamma Casino</h1>
      <p>Spin to win big tonight.</p>
      <script>
        window.__state = {"games": ["Goal Crash", "Wild Safari", "Pirate Gold"]};
      </script>
      <footer>Powered by Triple Cherry</footer>
    </body></html>"#
}

/// Homepage with nothing detectable on it.
fn bland_homepage() -> &'static str {
    r#"<html><body>
      <h1>Welcome to Delta Casino</h1>
      <p>Join today for generous welcome offers and daily tournaments.</p>
    </body></html>"#
}

// ── Pipeline Tests ──

/// Test: a mixed fleet produces one correctly classified record per target.
#[tokio::test]
async fn test_mixed_fleet_end_to_end() {
    let server = MockServer::start().await;
    serve(&server, "/alpha", rich_homepage()).await;
    Mock::given(method("GET"))
        .and(path("/beta"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    serve(&server, "/gamma", script_only_homepage()).await;

    let targets = vec![
        target("Alpha Casino", &format!("{}/alpha", server.uri())),
        target("Beta Casino", &format!("{}/beta", server.uri())),
        target("Gamma Casino", &format!("{}/gamma", server.uri())),
    ];

    let orchestrator = Orchestrator::new(Arc::new(fleet_config()), &catalog());
    let doc = orchestrator.crawl(&targets).await.unwrap();

    assert_eq!(doc.metadata.target_count, 3);
    assert_eq!(doc.metadata.catalog_size, 6);
    assert_eq!(doc.results.len(), 3);

    // Alpha: everything visible on the homepage, clean detection.
    let alpha = record(&doc, "Alpha Casino");
    assert_eq!(alpha.access_status, AccessStatus::Online);
    assert!(alpha.found);
    assert_eq!(alpha.detected_entities.len(), 6);
    assert_eq!(alpha.coverage_category, CoverageTier::Strong);
    assert_eq!(alpha.risk_level, RiskLevel::Low);
    assert!(alpha.issues.is_empty(), "issues: {:?}", alpha.issues);
    assert!(alpha.provider_mention);
    assert!(alpha
        .deep_links
        .get("Goal Crash")
        .is_some_and(|u| u.ends_with("/games/goal-crash")));
    assert!(alpha
        .evidence
        .iter()
        .any(|e| e.contains("Detected using: visible_text")));
    assert!(alpha.evidence.iter().any(|e| e.contains("triple cherry")));
    assert_eq!(alpha.pages_scanned, 1);

    // Beta: blocked outright, nothing detected, top of the risk ladder.
    let beta = record(&doc, "Beta Casino");
    assert_eq!(beta.access_status, AccessStatus::Blocked);
    assert!(!beta.found);
    assert!(beta.detected_entities.is_empty());
    assert_eq!(beta.risk_level, RiskLevel::High);
    assert!(beta
        .issues
        .iter()
        .any(|i| i.to_lowercase().contains("access issue")));
    assert!(beta
        .notes
        .iter()
        .any(|n| n.contains("Could not access website: blocked")));

    // Gamma: catalog only in script state, no anchors to link to.
    let gamma = record(&doc, "Gamma Casino");
    assert_eq!(gamma.access_status, AccessStatus::Online);
    assert!(gamma.found);
    assert_eq!(gamma.coverage_category, CoverageTier::Moderate);
    assert!(gamma
        .evidence
        .iter()
        .any(|e| e.contains("Detected using: script_tags")));
    assert!(gamma.deep_links.is_empty());
    assert!(gamma
        .issues
        .iter()
        .any(|i| i.to_lowercase().contains("no direct links")));
    assert_eq!(gamma.risk_level, RiskLevel::Medium);
}

/// Test: the emitted JSON carries exactly the documented fields and spellings.
#[tokio::test]
async fn test_document_json_contract() {
    let server = MockServer::start().await;
    serve(&server, "/alpha", rich_homepage()).await;

    let url = format!("{}/alpha", server.uri());
    let targets = vec![target("Alpha Casino", &url)];
    let orchestrator = Orchestrator::new(Arc::new(fleet_config()), &catalog());
    let doc = orchestrator.crawl(&targets).await.unwrap();

    let actual = serde_json::to_value(&doc).unwrap();
    assert_json_include!(
        actual: actual.clone(),
        expected: json!({
            "metadata": {
                "target_count": 1,
                "catalog_size": 6,
            },
            "results": [{
                "url": url,
                "name": "Alpha Casino",
                "region": "EU",
                "country": "Malta",
                "access_status": "online",
                "found": "yes",
                "provider_mention": true,
                "pages_scanned": 1,
                "coverage_category": "strong",
                "risk_level": "low",
            }]
        })
    );

    let meta_keys: Vec<&str> = actual["metadata"]
        .as_object()
        .unwrap()
        .keys()
        .map(|k| k.as_str())
        .collect();
    assert_eq!(meta_keys.len(), 3);
    assert!(meta_keys.contains(&"scan_timestamp"));

    let mut keys: Vec<&str> = actual["results"][0]
        .as_object()
        .unwrap()
        .keys()
        .map(|k| k.as_str())
        .collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "access_status",
            "country",
            "coverage_category",
            "deep_links",
            "detected_entities",
            "evidence",
            "found",
            "issues",
            "name",
            "notes",
            "pages_scanned",
            "provider_mention",
            "region",
            "risk_level",
            "timestamp",
            "url",
        ]
    );
}

/// Test: an empty homepage is rescued by the subpage sweep, with the extra
/// page counted and the rescue noted.
#[tokio::test]
async fn test_subpage_fallback_rescues_empty_homepage() {
    let server = MockServer::start().await;
    serve(&server, "/", bland_homepage()).await;
    serve(
        &server,
        "/games",
        r#"<html><body>
          <a href="/games/goal-crash">Goal Crash</a>
          <a href="/games/wild-safari">Wild Safari</a>
        </body></html>"#,
    )
    .await;

    let targets = vec![target("Delta Casino", &server.uri())];
    let orchestrator = Orchestrator::new(Arc::new(fleet_config()), &catalog());
    let doc = orchestrator.crawl(&targets).await.unwrap();

    let delta = record(&doc, "Delta Casino");
    assert!(delta.found);
    assert_eq!(delta.pages_scanned, 2, "homepage plus the yielding subpage");
    assert_eq!(delta.detected_entities.len(), 2);
    assert_eq!(delta.coverage_category, CoverageTier::Partial);
    assert!(delta
        .evidence
        .iter()
        .any(|e| e.contains("Detected using: subpage_scan")));
    assert!(delta
        .notes
        .iter()
        .any(|n| n.contains("Catalog entities found only on subpages")));
    assert!(delta
        .deep_links
        .get("Goal Crash")
        .is_some_and(|u| u.ends_with("/games/goal-crash")));
}

/// Test: when the fixed subpaths yield nothing the search probe runs, using
/// the provider term as the query.
#[tokio::test]
async fn test_search_probe_is_last_resort() {
    let server = MockServer::start().await;
    serve(&server, "/", bland_homepage()).await;
    // No /games page; the probe endpoint is the only source of evidence.
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "triple cherry"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
              <div class="results"><a href="/game/goal-crash">Goal Crash</a></div>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = fleet_config();
    config.detection.subpage_paths = vec!["/games".to_string()];

    let targets = vec![target("Echo Casino", &server.uri())];
    let orchestrator = Orchestrator::new(Arc::new(config), &catalog());
    let doc = orchestrator.crawl(&targets).await.unwrap();

    let echo = record(&doc, "Echo Casino");
    assert!(echo.found);
    assert_eq!(echo.pages_scanned, 2, "homepage plus the probe page");
    assert!(echo
        .notes
        .iter()
        .any(|n| n.contains("Catalog entities surfaced via search probe")));
    assert!(echo
        .evidence
        .iter()
        .any(|e| e.contains("Detected using: subpage_scan")));
}

/// Test: persistent server errors exhaust the retry budget but are not
/// classed as access issues.
#[tokio::test]
async fn test_server_errors_exhaust_retries_without_access_issue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let targets = vec![target("Foxtrot Casino", &server.uri())];
    let orchestrator = Orchestrator::new(Arc::new(fleet_config()), &catalog());
    let doc = orchestrator.crawl(&targets).await.unwrap();

    let foxtrot = record(&doc, "Foxtrot Casino");
    assert_eq!(foxtrot.access_status, AccessStatus::HttpError(500));
    assert!(!foxtrot.found);
    assert!(foxtrot.issues.is_empty(), "issues: {:?}", foxtrot.issues);
    assert_eq!(foxtrot.risk_level, RiskLevel::None);
    assert!(foxtrot
        .notes
        .iter()
        .any(|n| n.contains("Could not access website: http_error_500")));
}

/// Test: the broadcast stream brackets the run and covers every target.
#[tokio::test]
async fn test_progress_events_trace_the_run() {
    let server = MockServer::start().await;
    serve(&server, "/alpha", rich_homepage()).await;
    serve(&server, "/gamma", script_only_homepage()).await;

    let targets = vec![
        target("Alpha Casino", &format!("{}/alpha", server.uri())),
        target("Gamma Casino", &format!("{}/gamma", server.uri())),
    ];

    let (tx, mut rx) = progress::channel();
    let orchestrator = Orchestrator::new(Arc::new(fleet_config()), &catalog()).with_progress(tx);
    orchestrator.crawl(&targets).await.unwrap();

    let mut events = Vec::new();
    loop {
        use tokio::sync::broadcast::error::TryRecvError;
        match rx.try_recv() {
            Ok(ev) => events.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    assert!(matches!(
        events.first().map(|e| &e.event),
        Some(ScanEventKind::RunStarted {
            target_count: 2,
            catalog_size: 6
        })
    ));
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(ScanEventKind::RunFinished { records: 2, .. })
    ));

    let started = events
        .iter()
        .filter(|e| matches!(e.event, ScanEventKind::TargetStarted { .. }))
        .count();
    let finished = events
        .iter()
        .filter(|e| matches!(e.event, ScanEventKind::TargetFinished { .. }))
        .count();
    assert_eq!(started, 2);
    assert_eq!(finished, 2);

    // Sequence numbers never repeat, even with units finishing concurrently.
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(seqs.len(), sorted.len(), "sequence numbers must be unique");
}
