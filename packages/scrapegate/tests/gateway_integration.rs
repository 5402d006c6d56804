//! End-to-end tests for the admission pipeline.
//!
//! These drive `AdmissionGateway::handle` with mock rendering and robots
//! fetching, and check the properties operators rely on:
//! 1. Blacklisted and robots-disallowed targets never reach the renderer
//! 2. Repeated blacklist attempts ban the caller
//! 3. Rate caps hold per caller and per domain
//! 4. Credits are never oversold and failed scrapes are refunded

use futures::future::join_all;
use scrapegate::{
    testing::{
        fixtures::{ARTICLE_HTML, LISTING_HTML},
        MockRenderer, StaticRobotsFetcher,
    },
    AdmissionGateway, BanState, CreditStatus, Disposition, ExtractionEngine, GatewayConfig,
    JsonFileStore, LegalityConfig, RenderError, ScrapeRequest, Severity, Tier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const CALLER: &str = "203.0.113.50";

/// Gateway over a mock renderer; robots fetches are unthrottled for tests.
fn setup(renderer: MockRenderer, robots: StaticRobotsFetcher) -> AdmissionGateway {
    let config = GatewayConfig::default().with_legality(LegalityConfig {
        robots_fetches_per_second: 10_000,
        ..LegalityConfig::default()
    });
    AdmissionGateway::builder(
        config,
        Arc::new(ExtractionEngine::new(renderer)),
        Arc::new(robots),
    )
    .build()
}

#[tokio::test]
async fn test_blacklisted_subdomain_denied_without_render() {
    let renderer = MockRenderer::new().with_page("https://shop.amazon.com/deals", ARTICLE_HTML);
    let gw = setup(renderer.clone(), StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_bl", Tier::Basic);

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://shop.amazon.com/deals", &token, Tier::Basic))
        .await;

    assert_eq!(response.disposition, Disposition::DeniedAtLegality);
    assert_eq!(response.status_code, 400);
    assert!(response.error.as_ref().unwrap().message.contains("blacklisted"));
    assert_eq!(response.credit_status, CreditStatus::NotCharged);
    assert_eq!(response.credits.remaining, 10);
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn test_robots_disallow_denied() {
    let renderer = MockRenderer::new().with_page("https://blog.example/post", ARTICLE_HTML);
    let robots = StaticRobotsFetcher::new().with_robots("blog.example", "User-agent: *\nDisallow: /\n");
    let gw = setup(renderer.clone(), robots);
    let token = gw.issue_credits("pay_robots", Tier::Basic);

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://blog.example/post", &token, Tier::Basic))
        .await;

    assert_eq!(response.disposition, Disposition::DeniedAtLegality);
    assert!(response.error.unwrap().message.contains("robots.txt"));
    assert_eq!(gw.balance(&token).unwrap().used_credits, 0);
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn test_three_blacklist_attempts_ban_caller() {
    let renderer = MockRenderer::new().with_page("https://news.example.com/a", ARTICLE_HTML);
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_ban", Tier::Basic);

    for target in [
        "https://www.facebook.com/profile",
        "https://m.facebook.com/",
        "https://shop.amazon.com/",
    ] {
        let response = gw
            .handle(CALLER, ScrapeRequest::new(target, &token, Tier::Basic))
            .await;
        assert_eq!(response.disposition, Disposition::DeniedAtLegality);
    }

    assert_eq!(gw.ban_state(CALLER), BanState::Banned);

    // A perfectly legal request is now refused outright
    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic))
        .await;
    assert_eq!(response.disposition, Disposition::DeniedAtBan);
    assert_eq!(response.status_code, 403);
    assert_eq!(response.credits.remaining, 10);

    let incidents = gw.recent_incidents(20).await;
    assert!(incidents
        .iter()
        .any(|i| i.severity == Severity::High && i.reason.contains("banned after 3 blacklist violations")));
}

#[tokio::test]
async fn test_unban_restores_access() {
    let renderer = MockRenderer::new().with_page("https://news.example.com/a", ARTICLE_HTML);
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_unban", Tier::Basic);

    gw.ban(CALLER, "manual review").await;
    let denied = gw
        .handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic))
        .await;
    assert_eq!(denied.status_code, 403);

    assert!(gw.unban(CALLER).await);
    let allowed = gw
        .handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic))
        .await;
    assert!(allowed.success);
}

#[tokio::test]
async fn test_caller_cap_denies_101st_request() {
    let mut renderer = MockRenderer::new();
    for i in 0..=100 {
        renderer = renderer.with_page(format!("https://site{i}.example/"), LISTING_HTML);
    }
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_cap", Tier::Custom);

    for i in 0..100 {
        let response = gw
            .handle(
                CALLER,
                ScrapeRequest::new(format!("https://site{i}.example/"), &token, Tier::Custom),
            )
            .await;
        assert!(response.success, "request {i} failed: {:?}", response.error);
    }

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://site100.example/", &token, Tier::Custom))
        .await;
    assert_eq!(response.disposition, Disposition::DeniedAtRate);
    assert_eq!(response.status_code, 429);
    assert!(response.error.unwrap().reset_time.is_some());

    // Another caller is unaffected
    let other = gw.issue_credits("pay_other", Tier::Basic);
    let response = gw
        .handle("198.51.100.1", ScrapeRequest::new("https://site100.example/", &other, Tier::Basic))
        .await;
    assert!(response.success);
}

#[tokio::test]
async fn test_unfunded_requests_still_count_toward_caller_cap() {
    let robots = Arc::new(StaticRobotsFetcher::new());
    let config = GatewayConfig::default().with_legality(LegalityConfig {
        robots_fetches_per_second: 10_000,
        ..LegalityConfig::default()
    });
    let gw = AdmissionGateway::builder(
        config,
        Arc::new(ExtractionEngine::new(MockRenderer::new())),
        robots.clone(),
    )
    .build();

    for i in 0..100 {
        let response = gw
            .handle(
                CALLER,
                ScrapeRequest::new(format!("https://site{i}.example/"), format!("sg_forged_{i}"), Tier::Basic),
            )
            .await;
        assert_eq!(response.disposition, Disposition::DeniedAtCredit, "request {i}");
        assert_eq!(response.status_code, 402);
    }
    let fetched = robots.fetch_count();

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://site100.example/", "sg_forged_100", Tier::Basic))
        .await;
    assert_eq!(response.disposition, Disposition::DeniedAtRate);
    assert_eq!(response.status_code, 429);
    assert_eq!(robots.fetch_count(), fetched);

    // Refused for lack of credit, not for misbehaving
    assert_eq!(gw.limiter().ban_state(CALLER), BanState::Clean);
}

#[tokio::test]
async fn test_domain_cap_is_independent() {
    let renderer = MockRenderer::new()
        .with_page("https://busy.example/", LISTING_HTML)
        .with_page("https://quiet.example/", LISTING_HTML);
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_domain", Tier::Premium);

    for _ in 0..50 {
        assert!(
            gw.handle(CALLER, ScrapeRequest::new("https://busy.example/", &token, Tier::Premium))
                .await
                .success
        );
    }
    let second = gw.issue_credits("pay_domain_2", Tier::Premium);
    for _ in 0..10 {
        assert!(
            gw.handle(CALLER, ScrapeRequest::new("https://busy.example/", &second, Tier::Premium))
                .await
                .success
        );
    }

    let denied = gw
        .handle(CALLER, ScrapeRequest::new("https://busy.example/", &second, Tier::Premium))
        .await;
    assert_eq!(denied.disposition, Disposition::DeniedAtRate);

    let elsewhere = gw
        .handle(CALLER, ScrapeRequest::new("https://quiet.example/", &second, Tier::Premium))
        .await;
    assert!(elsewhere.success);
}

#[tokio::test]
async fn test_basic_tier_allows_exactly_ten_scrapes() {
    let renderer = MockRenderer::new().with_page("https://news.example.com/a", ARTICLE_HTML);
    let gw = setup(renderer.clone(), StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_ten", Tier::Basic);

    for expected in (0..10).rev() {
        let response = gw
            .handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic))
            .await;
        assert!(response.success);
        assert_eq!(response.credits.remaining, expected);
    }

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic))
        .await;
    assert_eq!(response.disposition, Disposition::DeniedAtCredit);
    assert_eq!(response.status_code, 402);
    assert_eq!(response.credits.remaining, 0);
    assert_eq!(renderer.calls().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_oversell() {
    let renderer = MockRenderer::new()
        .with_page("https://news.example.com/a", ARTICLE_HTML)
        .with_delay(Duration::from_millis(20));
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_race", Tier::Basic);

    let requests = (0..30).map(|i| {
        let gw = gw.clone();
        let token = token.clone();
        async move {
            gw.handle(
                &format!("192.0.2.{i}"),
                ScrapeRequest::new("https://news.example.com/a", token, Tier::Basic),
            )
            .await
        }
    });
    let responses = join_all(requests).await;

    let succeeded = responses.iter().filter(|r| r.success).count();
    let out_of_credit = responses
        .iter()
        .filter(|r| r.disposition == Disposition::DeniedAtCredit)
        .count();

    assert_eq!(succeeded, 10);
    assert_eq!(out_of_credit, 20);

    let account = gw.balance(&token).unwrap();
    assert_eq!(account.used_credits, account.total_credits);
}

#[tokio::test]
async fn test_failed_extraction_refunds_and_audits() {
    let renderer = MockRenderer::new().with_failure(
        "https://news.example.com/slow",
        RenderError::Timeout {
            url: "https://news.example.com/slow".into(),
            timeout_ms: 30_000,
        },
    );
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_refund", Tier::Premium);

    let response = gw
        .handle(CALLER, ScrapeRequest::new("https://news.example.com/slow", &token, Tier::Premium))
        .await;

    assert_eq!(response.disposition, Disposition::SettledFailureRefunded);
    assert_eq!(response.credit_status, CreditStatus::Refunded);
    assert_eq!(response.credits.remaining, 100);

    let audit = gw.recent_requests(5).await;
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert_eq!(audit[0].error_kind.as_deref(), Some("timeout"));
    assert_eq!(audit[0].credit_status, CreditStatus::Refunded);

    let stats = gw.stats().await;
    assert_eq!(stats.credits.credits_consumed, 2);
    assert_eq!(stats.credits.credits_refunded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_still_refunds() {
    let renderer = MockRenderer::new()
        .with_page("https://news.example.com/a", ARTICLE_HTML)
        .with_delay(Duration::from_secs(10));
    let gw = setup(renderer, StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_cancel", Tier::Basic);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        gw.handle(CALLER, ScrapeRequest::new("https://news.example.com/a", &token, Tier::Basic)),
    )
    .await;
    assert!(abandoned.is_err());

    // Let the detached settlement finish
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(gw.balance(&token).unwrap().remaining(), 10);
    let audit = gw.recent_requests(1).await;
    assert_eq!(audit[0].error_kind.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_ten_failures_ban_caller() {
    let gw = setup(MockRenderer::new(), StaticRobotsFetcher::new());
    let token = gw.issue_credits("pay_fail", Tier::Custom);

    for i in 0..10 {
        let response = gw
            .handle(CALLER, ScrapeRequest::new(format!("https://gone{i}.example/"), &token, Tier::Custom))
            .await;
        assert_eq!(response.disposition, Disposition::SettledFailureRefunded);
    }

    assert_eq!(gw.ban_state(CALLER), BanState::Banned);
    assert_eq!(gw.balance(&token).unwrap().used_credits, 0);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(assert_ok!(JsonFileStore::open(dir.path()).await));
        let gw = AdmissionGateway::builder(
            GatewayConfig::default(),
            Arc::new(ExtractionEngine::new(MockRenderer::new())),
            Arc::new(StaticRobotsFetcher::new()),
        )
        .with_store(store)
        .build();

        assert!(gw.add_to_blacklist("leaky.example").await);
        gw.ban(CALLER, "credential stuffing").await;
    }

    let store = Arc::new(assert_ok!(JsonFileStore::open(dir.path()).await));
    let gw = AdmissionGateway::builder(
        GatewayConfig::default(),
        Arc::new(ExtractionEngine::new(MockRenderer::new())),
        Arc::new(StaticRobotsFetcher::new()),
    )
    .with_store(store)
    .build();

    let report = gw.restore().await;
    assert_eq!(report.blacklist_entries, 1);
    assert_eq!(report.incidents, 1);

    let decision = gw.legality().check_legality("https://cdn.leaky.example/x").await;
    assert!(!decision.allowed);
}
