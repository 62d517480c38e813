use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use modelhub::{
    hub, BroadcastPolicy, Collection, Hub, HubClient, MemoryStore, ModelStore, Reconciler, Record,
};
use serde_json::json;
use tokio::time::{sleep, timeout};

fn reserve_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn record(fields: serde_json::Value) -> Record {
    serde_json::from_value(fields).expect("record literal")
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok()
}

/// Full lifecycle: a seeded hub, two clients joining, a reset bringing
/// both up to date, then interleaved mutations from both sides ending in
/// identical membership everywhere, including the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_clients_converge_through_a_full_session() -> Result<()> {
    let port = reserve_port()?;
    let store = Arc::new(MemoryStore::new());
    store.seed([
        record(json!({ "id": 1, "name": "alpha" })),
        record(json!({ "id": 2, "name": "beta" })),
    ]);
    let hub_handle = Arc::new(Hub::new(store.clone()));

    let serve_hub = hub_handle.clone();
    tokio::spawn(async move {
        let _ = hub::serve(port, serve_hub, BroadcastPolicy::Everyone).await;
    });
    sleep(Duration::from_millis(150)).await;
    let url = format!("ws://127.0.0.1:{}/ws", port);

    let reconciler_a = Reconciler::default();
    let coll_a = Arc::new(Collection::new());
    reconciler_a.attach(coll_a.clone());
    let client_a = HubClient::connect(&url, reconciler_a).await?;

    let reconciler_b = Reconciler::default();
    let coll_b = Arc::new(Collection::new());
    reconciler_b.attach(coll_b.clone());
    let client_b = HubClient::connect(&url, reconciler_b).await?;

    // Bring every observer to the seeded snapshot.
    let snapshot = store.find_models().await?;
    hub_handle.reset_items(&snapshot);
    assert!(eventually(|| coll_a.len() == 2 && coll_b.len() == 2).await);

    // A creates, B updates A's record, A destroys a seeded one.
    let created = client_a.create(&record(json!({ "name": "gamma" }))).await?;
    let created_id = created.id().cloned().expect("assigned id");

    let mut rename = Record::new();
    rename.set_id(created_id.clone());
    rename.set("name", "gamma-2");
    client_b.update(&rename).await?;

    client_a.destroy(&record(json!({ "id": 2 }))).await?;

    assert!(
        eventually(|| {
            let renamed = |c: &Collection| {
                c.get(&created_id)
                    .map(|r| r.get("name") == Some(&json!("gamma-2")))
                    .unwrap_or(false)
            };
            coll_a.len() == 2
                && coll_b.len() == 2
                && !coll_a.contains(&json!(2))
                && !coll_b.contains(&json!(2))
                && renamed(&coll_a)
                && renamed(&coll_b)
        })
        .await,
        "collections converged: a={:?} b={:?}",
        coll_a.records(),
        coll_b.records()
    );

    // Both caches agree with the authoritative store.
    let final_store: Vec<Record> = store.find_models().await?;
    assert_eq!(coll_a.records().len(), final_store.len());
    for record in final_store {
        let id = record.id().cloned().unwrap();
        assert!(coll_a.contains(&id));
        assert!(coll_b.contains(&id));
    }

    Ok(())
}

/// A client that vanishes mid-session must not leave in-flight calls
/// unresolved, and the remaining clients keep syncing.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_resolves_pending_and_leaves_others_healthy() -> Result<()> {
    let port = reserve_port()?;
    let hub_handle = Arc::new(Hub::new(Arc::new(MemoryStore::new())));

    let serve_hub = hub_handle.clone();
    tokio::spawn(async move {
        let _ = hub::serve(port, serve_hub, BroadcastPolicy::Everyone).await;
    });
    sleep(Duration::from_millis(150)).await;
    let url = format!("ws://127.0.0.1:{}/ws", port);

    let doomed = HubClient::connect(&url, Reconciler::default()).await?;
    doomed.close();
    assert!(eventually(|| doomed.is_closed()).await);
    let err = doomed.create(&record(json!({ "name": "late" }))).await;
    assert!(err.is_err(), "calls after close must fail, not hang");

    let reconciler = Reconciler::default();
    let coll = Arc::new(Collection::new());
    reconciler.attach(coll.clone());
    let survivor = HubClient::connect(&url, reconciler).await?;
    survivor.create(&record(json!({ "name": "x" }))).await?;
    assert!(eventually(|| coll.len() == 1).await);

    Ok(())
}
