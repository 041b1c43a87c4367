//! Integration tests for flushing a `DeferredCommands` ledger with
//! `RavenLinkClient::save_changes`.

use raven_link::{
    handler_fn, CommandData, CommandType, DeferredCommands, ErrorKind, IdTypeAndName, PatchRequest,
    RavenLinkError, SubscriptionBatch,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;

use common::{wait_until, worker_options, Behavior, FakeDatabase};

fn order(company: &str) -> serde_json::Value {
    json!({
        "Company": company,
        "@metadata": { "@collection": "Orders" },
    })
}

#[tokio::test]
async fn test_save_changes_flushes_in_order() {
    let db = FakeDatabase::start().await;
    let client = db.client();
    db.put_document("orders/old", "Orders", order("companies/9"));

    let mut ledger = DeferredCommands::new();
    ledger
        .defer_all([
            CommandData::put("orders/1", order("companies/1"), None).unwrap(),
            CommandData::put("orders/2", order("companies/2"), None).unwrap(),
            CommandData::delete("orders/old", None).unwrap(),
        ])
        .unwrap();

    let results = client.save_changes(&mut ledger).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["@id"], "orders/1");
    assert_eq!(results[2]["Type"], "DELETE");
    assert!(!ledger.has_changes());

    assert_eq!(db.document("orders/1").unwrap()["Company"], "companies/1");
    assert_eq!(
        db.document("orders/2").unwrap()["@metadata"]["@collection"],
        "Orders"
    );
    assert!(db.document("orders/old").is_none());

    let request = db.requests().pop().unwrap();
    let types: Vec<&str> = request.body.as_ref().unwrap()["Commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["Type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["PUT", "PUT", "DELETE"]);
}

#[tokio::test]
async fn test_empty_ledger_sends_nothing() {
    let db = FakeDatabase::start().await;
    let client = db.client();

    let mut ledger = DeferredCommands::new();
    let results = client.save_changes(&mut ledger).await.unwrap();
    assert!(results.is_empty());
    assert!(db.requests().is_empty());
}

#[tokio::test]
async fn test_failed_save_keeps_ledger() {
    let db = FakeDatabase::start_with(Behavior {
        failing_saves: 1,
        ..Behavior::default()
    })
    .await;
    let client = db.client();

    let mut ledger = DeferredCommands::new();
    ledger
        .defer(CommandData::put("orders/1", order("companies/1"), None).unwrap())
        .unwrap();
    ledger
        .defer(CommandData::patch("orders/2", PatchRequest::new("this.Freight = 10"), None).unwrap())
        .unwrap();

    let err = client.save_changes(&mut ledger).await.unwrap_err();
    assert!(matches!(err, RavenLinkError::ServerError { status_code: 500, .. }));
    assert_eq!(ledger.number_of_commands(), 2);
    assert!(db.document("orders/1").is_none());

    // nothing is retried automatically; a second call succeeds
    client.save_changes(&mut ledger).await.unwrap();
    assert!(!ledger.has_changes());
    assert!(db.document("orders/1").is_some());
}

#[tokio::test]
async fn test_concurrency_conflict_rejects_whole_batch() {
    let db = FakeDatabase::start().await;
    let client = db.client();
    let current = db.put_document("orders/1", "Orders", order("companies/1"));

    let mut ledger = DeferredCommands::new();
    ledger
        .defer(CommandData::put("orders/2", order("companies/2"), None).unwrap())
        .unwrap();
    ledger
        .defer(CommandData::put("orders/1", order("companies/3"), Some("A:999".into())).unwrap())
        .unwrap();

    let err = client.save_changes(&mut ledger).await.unwrap_err();
    assert!(matches!(err, RavenLinkError::ServerError { status_code: 409, .. }));
    assert!(db.document("orders/2").is_none());
    assert_eq!(ledger.number_of_commands(), 2);

    // replace the stale command with one carrying the current change vector
    ledger.clear();
    ledger
        .defer(CommandData::put("orders/1", order("companies/3"), Some(current)).unwrap())
        .unwrap();
    client.save_changes(&mut ledger).await.unwrap();
    assert_eq!(db.document("orders/1").unwrap()["Company"], "companies/3");
}

#[tokio::test]
async fn test_conflicting_commands_never_reach_the_server() {
    let db = FakeDatabase::start().await;
    let client = db.client();

    let mut ledger = DeferredCommands::new();
    ledger
        .defer(CommandData::attachment_put("orders/1", "invoice.pdf", None, None).unwrap())
        .unwrap();
    let err = ledger
        .defer(CommandData::delete("orders/1", None).unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeferredCommandConflict);
    assert!(!ledger.contains(&IdTypeAndName::create("orders/1", CommandType::Delete, None)));

    // redundant delete of an attachment whose document is going away
    let mut other = DeferredCommands::new();
    other
        .defer(CommandData::delete("orders/2", None).unwrap())
        .unwrap();
    assert!(!other
        .defer(CommandData::attachment_delete("orders/2", "invoice.pdf", None).unwrap())
        .unwrap());

    client.save_changes(&mut ledger).await.unwrap();
    client.save_changes(&mut other).await.unwrap();
    let sent: Vec<usize> = db
        .requests()
        .iter()
        .map(|r| r.body.as_ref().unwrap()["Commands"].as_array().unwrap().len())
        .collect();
    assert_eq!(sent, vec![1, 1]);
}

#[tokio::test]
async fn test_saved_documents_reach_subscription() {
    let db = FakeDatabase::start().await;
    let client = db.client();
    let name = client
        .subscriptions()
        .create_for_collection("Orders")
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let worker = client
        .subscriptions()
        .get_subscription_worker(worker_options(&name))
        .unwrap();
    worker.run({
        let seen = seen.clone();
        handler_fn(move |batch: Arc<SubscriptionBatch>| {
            let seen = seen.clone();
            async move {
                for item in batch.items() {
                    seen.lock().unwrap().push(item.id().to_string());
                }
            }
        })
    });

    let mut ledger = DeferredCommands::new();
    ledger
        .defer(CommandData::put("orders/1", order("companies/1"), None).unwrap())
        .unwrap();
    ledger
        .defer(CommandData::put("companies/1", json!({ "Name": "Acme" }), None).unwrap())
        .unwrap();
    client.save_changes(&mut ledger).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || !seen.lock().unwrap().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["orders/1".to_string()]);
}
