//! Integration tests for eoka-pilot against the bundled test page.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test integration -- --ignored

use eoka_pilot::driver::{Driver, EokaDriver, Locator, Session};
use eoka_pilot::{Config, FailureKind, Status, Workflow};

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

fn config() -> Config {
    let mut config = Config::default();
    config.browser.headless = true;
    config.workflow.max_attempts = 1;
    config
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn locators_on_test_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let config = config();
    let sites = eoka_pilot::SiteDirectory::default();
    let session = EokaDriver::new(config.browser.clone())
        .open()
        .await
        .expect("Failed to open session");
    session
        .goto(sites.test_page())
        .await
        .expect("Failed to navigate");

    let by_placeholder = session
        .find(&Locator::Placeholder("search".into()))
        .await
        .expect("probe failed")
        .expect("search input not found");
    assert_eq!(by_placeholder.selector, "#search-input");

    let by_label = session
        .find(&Locator::Label("search".into()))
        .await
        .expect("probe failed")
        .expect("labelled input not found");
    assert_eq!(by_label.selector, "#search-input");

    let button = session
        .find(&Locator::role_named("button", "login"))
        .await
        .expect("probe failed")
        .expect("login button not found");
    assert_eq!(button.selector, "#loginBtn");

    // Hidden elements never match.
    let hidden = session
        .find(&Locator::VisibleText("Dashboard".into()))
        .await
        .expect("probe failed");
    assert!(hidden.is_none());

    session.close().await.expect("Failed to close session");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn login_flow_passes() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let workflow = Workflow::from_config(&config()).expect("Failed to build workflow");
    let report = workflow
        .run("open the test page and log in with admin and admin123 then verify 'Login Successful'")
        .await;

    assert_eq!(report.status, Status::Pass, "{}", report);
    assert_eq!(report.steps.len(), 5);
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn verify_waits_for_delayed_text() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let workflow = Workflow::from_config(&config()).expect("Failed to build workflow");
    let report = workflow.run("open the test page and verify Welcome").await;

    assert_eq!(report.status, Status::Pass, "{}", report);
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn search_submits_query() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let workflow = Workflow::from_config(&config()).expect("Failed to build workflow");
    let report = workflow
        .run("open the test page, search for keyboards and verify 'Results for keyboards'")
        .await;

    assert_eq!(report.status, Status::Pass, "{}", report);
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn missing_element_fails_with_screenshot() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let mut config = config();
    config.timeouts.element = 200;
    let workflow = Workflow::from_config(&config).expect("Failed to build workflow");
    let report = workflow.run("open the test page and click Checkout").await;

    assert_eq!(report.status, Status::Fail);
    let failed = report.first_failure().expect("no failed step");
    assert_eq!(failed.failure, Some(FailureKind::NotFound));
    assert!(failed.diagnostic.is_some());
}
