//! Acceptance tests against a real Controller.
//!
//! These tests need a reachable Controller and admin credentials:
//!
//!   APPGATE_ADDRESS=https://controller:8443/admin \
//!   APPGATE_USERNAME=admin APPGATE_PASSWORD=... \
//!   cargo test -p appgate-sdp-control --test controller_acceptance -- --ignored
//!
//! They create entities named `acc-test-*` and remove them again.

use appgate_sdp_auth::{ProviderConfig, ENV_ADDRESS};
use appgate_sdp_control::ProviderService;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn configured() -> Option<ProviderService> {
    if std::env::var(ENV_ADDRESS).is_err() {
        eprintln!("{ENV_ADDRESS} not set, skipping");
        return None;
    }
    let service = ProviderService::with_defaults();
    service
        .configure(ProviderConfig::new("").with_process_env())
        .unwrap();
    Some(service)
}

fn attrs(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
#[ignore = "requires a Controller"]
async fn site_lifecycle() {
    let Some(service) = configured() else { return };
    let name = format!("acc-test-site-{}", std::process::id());

    let created = service
        .create(
            "appgatesdp_site",
            &attrs(json!({"name": name, "short_name": "acc", "tags": ["acc-test"]})),
            CancellationToken::new(),
        )
        .await;
    assert!(created.is_ok(), "{:?}", created.diagnostics);
    let state = created.value.unwrap();

    let looked_up = service
        .read_data_source(
            "appgatesdp_site",
            &attrs(json!({"site_name": name})),
            CancellationToken::new(),
        )
        .await;
    assert_eq!(looked_up.value.unwrap()["site_id"], state["id"]);

    let mut planned = state.clone();
    planned.insert("short_name".to_string(), json!("acc2"));
    let updated = service
        .update("appgatesdp_site", &state, &planned, CancellationToken::new())
        .await;
    assert_eq!(updated.value.unwrap().unwrap()["short_name"], "acc2");

    let deleted = service
        .delete("appgatesdp_site", &planned, CancellationToken::new())
        .await;
    assert!(deleted.is_ok(), "{:?}", deleted.diagnostics);

    let gone = service
        .read("appgatesdp_site", &planned, CancellationToken::new())
        .await;
    assert_eq!(gone.value, Some(None));
}

#[tokio::test]
#[ignore = "requires a Controller"]
async fn builtin_local_provider_is_readable() {
    let Some(service) = configured() else { return };
    let found = service
        .read_data_source(
            "appgatesdp_identity_provider",
            &attrs(json!({"identity_provider_name": "local"})),
            CancellationToken::new(),
        )
        .await;
    assert!(found.is_ok(), "{:?}", found.diagnostics);
}
