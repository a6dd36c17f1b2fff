//! End-to-end test of the sync, mutation, ledger, backup, and compliance
//! flows over the HTTP surface.
//!
//! Runs fully in process: the in-memory store and the fake authority stand
//! in for PostgreSQL and the cloud API, so no external services are
//! required.

use std::collections::BTreeMap;
use std::sync::Arc;

use nsguard::blob::FsVault;
use nsguard::cloud::{CloudObservation, FakeCloud};
use nsguard::config::AppConfig;
use nsguard::models::rule::{Direction, Rule, RuleAccess, RuleSet};
use nsguard::services::compliance::ComplianceWeights;
use nsguard::services::locks::GroupLocks;
use nsguard::store::MemoryStore;
use nsguard::AppState;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    cloud: Arc<FakeCloud>,
    _vault_dir: tempfile::TempDir,
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        cloud_api_base_url: "http://localhost:1".to_string(),
        cloud_api_token: "test-token".to_string(),
        cloud_subscription_id: "sub-test".to_string(),
        cloud_tenant_id: None,
        cloud_api_timeout_secs: 5,
        snapshot_vault_dir: "./unused".to_string(),
        compliance_partial_credit: 0.5,
    }
}

/// Spin up the full Axum app on a random port with in-process fakes,
/// returning the base URL and handles to the fakes.
async fn start_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let cloud = Arc::new(FakeCloud::new());
    let vault_dir = tempfile::tempdir().expect("tempdir");

    let state = AppState {
        store,
        cloud: cloud.clone(),
        vault: Arc::new(FsVault::new(vault_dir.path())),
        locks: GroupLocks::new(),
        weights: ComplianceWeights::default(),
        config: test_config(),
    };

    let app = nsguard::routes::router().with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        base: format!("http://{addr}"),
        cloud,
        _vault_dir: vault_dir,
    }
}

fn rule(name: &str, priority: i32, port: &str) -> Rule {
    Rule {
        name: name.to_string(),
        priority,
        direction: Direction::Inbound,
        access: RuleAccess::Allow,
        protocol: "tcp".to_string(),
        source_port_range: "*".to_string(),
        destination_port_range: port.to_string(),
        source_address_prefix: Some("10.0.0.0/8".to_string()),
        source_address_prefixes: Vec::new(),
        destination_address_prefix: Some("*".to_string()),
        destination_address_prefixes: Vec::new(),
        description: None,
        etag: None,
        provisioning_state: None,
    }
}

fn observation(external_id: &str, rules: Vec<Rule>, tags: &[(&str, &str)]) -> CloudObservation {
    CloudObservation {
        external_id: external_id.to_string(),
        name: "nsg-web".to_string(),
        resource_group: "rg-platform".to_string(),
        region: "westeurope".to_string(),
        subscription_id: "sub-test".to_string(),
        tenant_id: None,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<String, String>>(),
        rules: RuleSet::new(rules, vec![]),
    }
}

fn rule_input(name: &str, priority: i32, port: &str) -> Value {
    json!({
        "name": name,
        "priority": priority,
        "direction": "inbound",
        "access": "allow",
        "protocol": "Tcp",
        "source_port_range": "*",
        "destination_port_range": port,
        "source_address_prefix": "10.0.0.0/8",
        "destination_address_prefix": "*"
    })
}

async fn get_json(client: &Client, url: &str) -> Value {
    let resp = client.get(url).send().await.expect("request");
    assert_eq!(resp.status(), StatusCode::OK, "GET {url}");
    resp.json().await.expect("json body")
}

#[tokio::test]
async fn full_engine_flow() {
    let server = start_server().await;
    let client = Client::new();

    server
        .cloud
        .seed(observation("ext-1", vec![rule("allow-https", 100, "443")], &[]))
        .await;

    // First listing mirrors the group and writes the create entry.
    let body = get_json(&client, &format!("{}/api/v1/nsgs", server.base)).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["external_id"], "ext-1");
    assert_eq!(items[0]["stale"], false);
    let group_id = items[0]["id"].as_str().expect("group id").to_string();

    // Create a golden rule template with one extra expectation.
    let resp = client
        .post(format!("{}/api/v1/golden-rules", server.base))
        .json(&json!({
            "name": "web-baseline",
            "description": "baseline for web tier",
            "rules": [rule_input("allow-https", 100, "443"), rule_input("allow-ssh", 110, "22")],
            "created_by": "admin"
        }))
        .send()
        .await
        .expect("create golden rule");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    let golden_id = body["data"]["id"].as_str().expect("golden id").to_string();

    // One of two template rules present: half credit, high risk.
    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/compliance/{golden_id}",
            server.base
        ))
        .send()
        .await
        .expect("score");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["score"], 50.0);
    assert_eq!(body["data"]["risk_level"], "high");
    assert_eq!(body["data"]["missing_rules"][0], "allow-ssh");

    // Bring the group up to the template.
    let resp = client
        .put(format!("{}/api/v1/nsgs/{group_id}/rules", server.base))
        .json(&json!({
            "actor": "ops",
            "rules": [rule_input("allow-https", 100, "443"), rule_input("allow-ssh", 110, "22")]
        }))
        .send()
        .await
        .expect("update rules");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["degraded"], false);
    assert_eq!(body["data"]["change"]["change_type"], "update");
    assert_eq!(body["data"]["change"]["can_rollback"], true);

    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/compliance/{golden_id}",
            server.base
        ))
        .send()
        .await
        .expect("score again");
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["score"], 100.0);
    assert_eq!(body["data"]["risk_level"], "low");

    // Snapshot the compliant configuration.
    let resp = client
        .post(format!("{}/api/v1/nsgs/{group_id}/backups", server.base))
        .json(&json!({"name": "compliant", "actor": "ops"}))
        .send()
        .await
        .expect("backup");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    let backup_id = body["data"]["id"].as_str().expect("backup id").to_string();

    // Drift away from the template, then restore the snapshot.
    let resp = client
        .put(format!("{}/api/v1/nsgs/{group_id}/rules", server.base))
        .json(&json!({
            "actor": "ops",
            "rules": [rule_input("allow-https", 100, "443")]
        }))
        .send()
        .await
        .expect("drift");
    assert_eq!(resp.status(), StatusCode::OK);

    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["inbound_rules"].as_array().expect("rules").len(), 1);

    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/backups/{backup_id}/restore",
            server.base
        ))
        .json(&json!({"actor": "ops"}))
        .send()
        .await
        .expect("restore");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["change"]["change_type"], "restore");
    let restore_change_id = body["data"]["change"]["id"]
        .as_str()
        .expect("change id")
        .to_string();

    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["inbound_rules"].as_array().expect("rules").len(), 2);

    // The ledger reads newest first and holds the whole history.
    let body = get_json(
        &client,
        &format!("{}/api/v1/nsgs/{group_id}/changes?limit=10", server.base),
    )
    .await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .expect("changes")
        .iter()
        .map(|c| c["change_type"].as_str().expect("type"))
        .collect();
    assert_eq!(kinds, vec!["restore", "update", "backup", "update", "create"]);

    // Undo the restore, then verify the undo is terminal.
    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/changes/{restore_change_id}/rollback",
            server.base
        ))
        .json(&json!({"actor": "ops"}))
        .send()
        .await
        .expect("rollback");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["change"]["change_type"], "rollback");
    assert_eq!(body["data"]["change"]["can_rollback"], false);
    let rollback_change_id = body["data"]["change"]["id"]
        .as_str()
        .expect("change id")
        .to_string();

    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["inbound_rules"].as_array().expect("rules").len(), 1);

    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/changes/{rollback_change_id}/rollback",
            server.base
        ))
        .json(&json!({"actor": "ops"}))
        .send()
        .await
        .expect("rollback of rollback");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["code"], "NOT_ROLLBACKABLE");
}

#[tokio::test]
async fn authority_failures_degrade_reads_and_abort_writes() {
    let server = start_server().await;
    let client = Client::new();

    server
        .cloud
        .seed(observation("ext-1", vec![rule("allow-https", 100, "443")], &[]))
        .await;

    let body = get_json(&client, &format!("{}/api/v1/nsgs", server.base)).await;
    let group_id = body["data"]["items"][0]["id"]
        .as_str()
        .expect("group id")
        .to_string();

    // A rejected apply aborts with no ledger entry and no mirror change.
    server.cloud.set_fail_apply(true).await;
    let resp = client
        .put(format!("{}/api/v1/nsgs/{group_id}/rules", server.base))
        .json(&json!({"actor": "ops", "rules": [rule_input("allow-ssh", 110, "22")]}))
        .send()
        .await
        .expect("update rules");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["code"], "EXTERNAL_APPLY_FAILED");

    let body = get_json(
        &client,
        &format!("{}/api/v1/nsgs/{group_id}/changes", server.base),
    )
    .await;
    assert_eq!(body["data"].as_array().expect("changes").len(), 1);

    // A failed refresh serves the last-synced copy, flagged stale.
    server.cloud.set_fail_fetch(true).await;
    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["stale"], true);
    assert_eq!(body["data"]["inbound_rules"][0]["name"], "allow-https");

    // A failed listing serves the mirror, flagged stale.
    server.cloud.set_fail_list(true).await;
    let body = get_json(&client, &format!("{}/api/v1/nsgs", server.base)).await;
    assert_eq!(body["data"]["items"][0]["stale"], true);

    // Recovery clears the flag on the next read.
    server.cloud.set_fail_fetch(false).await;
    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["stale"], false);
}

#[tokio::test]
async fn resync_replaces_tags_wholesale() {
    let server = start_server().await;
    let client = Client::new();

    let rules = vec![rule("allow-https", 100, "443")];
    server
        .cloud
        .seed(observation("ext-1", rules.clone(), &[("env", "prod"), ("team", "net")]))
        .await;

    let body = get_json(&client, &format!("{}/api/v1/nsgs", server.base)).await;
    let group_id = body["data"]["items"][0]["id"]
        .as_str()
        .expect("group id")
        .to_string();
    assert_eq!(
        body["data"]["items"][0]["tags"],
        json!({"env": "prod", "team": "net"})
    );

    // The authority drops one tag and rewrites the other.
    server
        .cloud
        .seed(observation("ext-1", rules, &[("env", "staging")]))
        .await;

    let body = get_json(&client, &format!("{}/api/v1/nsgs/{group_id}", server.base)).await;
    assert_eq!(body["data"]["tags"], json!({"env": "staging"}));
}

#[tokio::test]
async fn bad_requests_map_to_the_error_envelope() {
    let server = start_server().await;
    let client = Client::new();

    server
        .cloud
        .seed(observation("ext-1", vec![rule("allow-https", 100, "443")], &[]))
        .await;
    let body = get_json(&client, &format!("{}/api/v1/nsgs", server.base)).await;
    let group_id = body["data"]["items"][0]["id"]
        .as_str()
        .expect("group id")
        .to_string();

    // Invalid rule payload.
    let resp = client
        .put(format!("{}/api/v1/nsgs/{group_id}/rules", server.base))
        .json(&json!({"actor": "ops", "rules": [rule_input("allow-ssh", 0, "22")]}))
        .send()
        .await
        .expect("update rules");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["data"].is_null());

    // Unknown group.
    let resp = client
        .get(format!(
            "{}/api/v1/nsgs/00000000-0000-0000-0000-000000000000",
            server.base
        ))
        .send()
        .await
        .expect("get unknown");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // Unknown backup on a known group.
    let resp = client
        .post(format!(
            "{}/api/v1/nsgs/{group_id}/backups/00000000-0000-0000-0000-000000000000/restore",
            server.base
        ))
        .json(&json!({"actor": "ops"}))
        .send()
        .await
        .expect("restore unknown backup");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
