//! Issue, pay, publish and expire against a live node.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::NETWORK;
use super::{MockNetwork, TestHarness};
use chrono::{TimeDelta, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use swm_node::config::{DateResolution, PaymentConfig, PaymentOptionConfig};
use swm_node::payment::PaymentInfo;
use swm_node::storage::Marker;
use swm_node::ticket::PaymentOption;
use swm_node::wire::parse_accept_network;
use swm_node::{Envelope, NodeConfig, NodeEvent, PaymentNetwork, PublishOutcome};
use tokio_test::assert_ok;

const FOO_MD5: &str = "acbd18db4cc2f85cedef654fccc4a4d8";

fn option(network: &str, address: &str) -> PaymentOptionConfig {
    PaymentOptionConfig {
        network: network.to_string(),
        address: Some(address.to_string()),
        key: None,
        amount: 100,
    }
}

#[tokio::test]
async fn test_underpayment_then_payment_publishes() {
    let harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let issued = harness.issue("foo.txt", &[]).await.expect("issue");
    let id = issued.envelope.id.clone();
    assert_eq!(issued.ticket.content.digest, FOO_MD5);
    assert_eq!(
        issued.ticket.content.uri,
        format!("https://example.test/snapshot/{FOO_MD5}/foo.txt")
    );
    assert_eq!(
        issued.ticket.payment,
        Some(PaymentOption {
            network: NETWORK.to_string(),
            address: harness.network().address(),
            amount: 100,
        })
    );

    harness
        .network()
        .queue_payment(PaymentInfo::new(vec![id.clone()], 50));
    let report = harness.poll().await;
    assert_eq!(report.observations, 1);
    assert_eq!(report.accepted, 0);
    assert!(!harness.published_file(FOO_MD5, "foo.txt").exists());

    harness
        .network()
        .queue_payment(PaymentInfo::new(vec![id.clone()], 150));
    let report = harness.poll().await;
    assert_eq!(report.accepted, 1);

    let published = harness.published_file(FOO_MD5, "foo.txt");
    let fetched = std::fs::read(published).expect("published content");
    assert!(issued.ticket.content.verify_digest(&fetched));
    assert!(harness.store().is_archived(&id, Marker::Done).await);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_client_preference_selects_network() {
    let harness = TestHarness::setup_with_payment(PaymentConfig::List(vec![
        option("X", "addrX"),
        option("Y", "addrY"),
    ]))
    .await
    .expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let default = harness.issue("foo.txt", &[]).await.expect("issue");
    assert_eq!(default.ticket.payment.unwrap().network, "X");

    let preferred = harness.issue("foo.txt", &["Z", "Y", "X"]).await.expect("issue");
    assert_eq!(preferred.ticket.payment.unwrap().network, "Y");

    let header = parse_accept_network(Some("Z, W"));
    let preference: Vec<&str> = header.iter().map(String::as_str).collect();
    let informational = harness.issue("foo.txt", &preference).await.expect("issue");
    assert!(informational.ticket.payment.is_none());
    assert!(informational.envelope.signature.is_none());

    // An unpriced ticket cannot be paid for.
    harness.network().queue_payment(PaymentInfo::new(
        vec![informational.envelope.id.clone()],
        1_000,
    ));
    assert_eq!(harness.poll().await.accepted, 0);
    assert!(harness
        .store()
        .load(&informational.envelope.id)
        .await
        .expect("load")
        .is_some());
}

#[tokio::test]
async fn test_truncated_dates_share_one_envelope() {
    let harness = TestHarness::setup_with(|config| {
        config.date_resolution = Some(DateResolution::Hour);
    })
    .await
    .expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let hour = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
    let first = harness
        .issuer()
        .issue_at("foo.txt", &[], hour + TimeDelta::minutes(5))
        .await
        .expect("first");
    let second = harness
        .issuer()
        .issue_at("foo.txt", &[], hour + TimeDelta::minutes(40))
        .await
        .expect("second");

    assert_eq!(first.envelope.id, second.envelope.id);
    assert_eq!(first.ticket.date, hour);
    assert_eq!(harness.network().sign_calls(), 1);
    assert_eq!(harness.store().active_ids().await.expect("list").len(), 1);
}

#[tokio::test]
async fn test_ticket_expires_after_validity() {
    let harness = TestHarness::setup_with(|config| config.validity_secs = 10)
        .await
        .expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let issued_at = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
    let issued = harness
        .issuer()
        .issue_at("foo.txt", &[], issued_at)
        .await
        .expect("issue");
    let id = issued.envelope.id;

    let lifecycle = harness.lifecycle();
    let early = issued_at + TimeDelta::seconds(5);
    let late = issued_at + TimeDelta::seconds(15);
    assert!(!lifecycle.is_expired_at(&id, early).await.expect("t+5"));
    assert_eq!(lifecycle.sweep_expired_at(early).await.expired, 0);

    assert!(lifecycle.is_expired_at(&id, late).await.expect("t+15"));
    assert_eq!(lifecycle.sweep_expired_at(late).await.expired, 1);
    assert!(harness.store().is_archived(&id, Marker::Expired).await);

    // A late payment finds nothing to publish.
    harness
        .network()
        .queue_payment(PaymentInfo::new(vec![id], 100));
    assert_eq!(harness.poll().await.accepted, 0);
    assert!(!harness.published_file(FOO_MD5, "foo.txt").exists());
}

#[tokio::test]
async fn test_payment_for_expired_unswept_ticket_is_refused() {
    let harness = TestHarness::setup_with(|config| config.validity_secs = 10)
        .await
        .expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let issued = harness
        .issuer()
        .issue_at("foo.txt", &[], Utc::now() - TimeDelta::seconds(60))
        .await
        .expect("issue");
    let id = issued.envelope.id;
    assert!(harness.lifecycle().is_expired(&id).await.expect("expired"));

    harness
        .network()
        .queue_payment(PaymentInfo::new(vec![id.clone()], 100));
    let report = harness.poll().await;
    assert_eq!(report.accepted, 0);
    assert_eq!(report.sweep.expired, 1);
    assert!(!harness.published_file(FOO_MD5, "foo.txt").exists());
    assert!(!harness.store().is_archived(&id, Marker::Done).await);
    assert!(harness.store().is_archived(&id, Marker::Expired).await);
}

#[tokio::test]
async fn test_reissued_expired_ticket_expires_cleanly() {
    let harness = TestHarness::setup_with(|config| {
        config.validity_secs = 10;
        config.date_resolution = Some(DateResolution::Hour);
    })
    .await
    .expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let hour = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
    let first = harness
        .issuer()
        .issue_at("foo.txt", &[], hour)
        .await
        .expect("issue");
    let id = first.envelope.id;
    let sweep = harness
        .lifecycle()
        .sweep_expired_at(hour + TimeDelta::seconds(15))
        .await;
    assert_eq!(sweep.expired, 1);

    let again = harness
        .issuer()
        .issue_at("foo.txt", &[], hour + TimeDelta::minutes(30))
        .await
        .expect("reissue");
    assert_eq!(again.envelope.id, id);
    assert!(harness.store().staging_path(&id).exists());

    let sweep = harness
        .lifecycle()
        .sweep_expired_at(hour + TimeDelta::minutes(31))
        .await;
    assert_eq!(sweep.expired, 1);
    assert_eq!(sweep.failed, 0);
    assert!(!harness.store().staging_path(&id).exists());
    assert!(harness.store().load(&id).await.expect("load").is_none());
    assert!(harness.store().active_ids().await.expect("list").is_empty());
}

#[tokio::test]
async fn test_reissue_after_publish_restages() {
    let harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");

    let now = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
    let issued = harness
        .issuer()
        .issue_at("foo.txt", &[], now)
        .await
        .expect("issue");
    assert_eq!(
        harness.lifecycle().publish(&issued.envelope.id).await.expect("publish"),
        PublishOutcome::Published
    );

    let again = harness
        .issuer()
        .issue_at("foo.txt", &[], now)
        .await
        .expect("reissue");
    assert_eq!(again.envelope.id, issued.envelope.id);
    assert!(harness.store().staging_path(&again.envelope.id).join("foo.txt").exists());
    assert_eq!(harness.network().sign_calls(), 2);
}

#[tokio::test]
async fn test_concurrent_publish_has_one_winner() {
    let harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");
    let id = harness.issue("foo.txt", &[]).await.expect("issue").envelope.id;

    let lifecycle = harness.lifecycle();
    let (a, b) = tokio::join!(lifecycle.publish(&id), lifecycle.publish(&id));
    let mut outcomes = vec![a.expect("a"), b.expect("b")];
    outcomes.sort_by_key(|outcome| *outcome == PublishOutcome::Published);
    assert_eq!(
        outcomes,
        vec![PublishOutcome::AlreadyPublished, PublishOutcome::Published]
    );
    assert!(harness.published_file(FOO_MD5, "foo.txt").exists());
}

#[tokio::test]
async fn test_two_keys_same_content_converge() {
    let harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");
    harness.write_content("copy/foo.txt", b"foo").expect("write");

    let a = harness.issue("foo.txt", &[]).await.expect("issue a");
    let b = harness.issue("copy/foo.txt", &[]).await.expect("issue b");
    assert_ne!(a.envelope.id, b.envelope.id);

    for id in [&a.envelope.id, &b.envelope.id] {
        harness
            .network()
            .queue_payment(PaymentInfo::new(vec![id.clone()], 100));
    }
    let report = harness.poll().await;
    assert_eq!(report.accepted, 2);
    assert!(harness.store().is_archived(&a.envelope.id, Marker::Done).await);
    assert!(harness.store().is_archived(&b.envelope.id, Marker::Done).await);
    assert!(!harness.store().staging_path(&b.envelope.id).exists());
}

#[tokio::test]
async fn test_client_verifies_wire_envelope() {
    let harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");
    let issued = harness.issue("foo.txt", &[]).await.expect("issue");

    let headers: HashMap<String, String> = issued
        .envelope
        .to_headers()
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    let received = Envelope::from_headers(|name: &str| {
        headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    })
    .expect("parse");

    assert_eq!(received.id, issued.envelope.id);
    let ticket = received.ticket().expect("ticket");
    let address = ticket.payment.as_ref().expect("priced").address.clone();
    assert!(received.verify(harness.network(), &address));

    let impostor = MockNetwork::new(NETWORK, "other-key");
    assert!(!received.verify(&impostor, &impostor.address()));
    assert!(impostor.derive_address("").is_err());
}

#[tokio::test]
async fn test_missing_content_is_not_found() {
    let harness = TestHarness::setup().await.expect("setup");
    let err = harness.issue("nope.txt", &[]).await.unwrap_err();
    assert!(err.is_not_found());
    let err = harness.issue("/etc/passwd", &[]).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_running_node_publishes_pushed_payment() {
    let mut harness = TestHarness::setup().await.expect("setup");
    harness.write_content("foo.txt", b"foo").expect("write");
    let id = harness.issue("foo.txt", &[]).await.expect("issue").envelope.id;

    harness.start();
    tokio::time::timeout(Duration::from_secs(5), harness.wait_for_subscription())
        .await
        .expect("subscribed");
    assert_ok!(harness
        .network()
        .push_payment(PaymentInfo::new(vec![id.clone()], 100)));

    let published = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match harness.events().recv().await {
                Ok(NodeEvent::ContentPublished { id: paid, digest }) => break (paid, digest),
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("published in time");

    assert_eq!(published, (id, FOO_MD5.to_string()));
    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_config_file_roundtrip_builds_node() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config = NodeConfig {
        content_root: dir.path().join("content"),
        working_root: dir.path().join("work"),
        published_root: dir.path().join("public"),
        date_resolution: Some(DateResolution::Minute),
        payment: PaymentConfig::List(vec![option("X", "addrX")]),
        ..NodeConfig::default()
    };
    let path = dir.path().join("swm.toml");
    config.to_file(&path).expect("save");

    let loaded = NodeConfig::from_file(&path).expect("load");
    assert_eq!(loaded.payment, config.payment);
    assert_eq!(loaded.date_resolution, Some(DateResolution::Minute));

    let node = swm_node::NodeBuilder::new(loaded).build().await.expect("build");
    assert_eq!(node.issuer().options().iter().count(), 1);
}
