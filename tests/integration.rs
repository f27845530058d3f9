//! Crate-level integration tests that exercise a `Client` end-to-end
//! against an in-process fake server rather than a live cluster. Each
//! test stands up its own `FakeServer` so tests never share a listening
//! port.

mod support;

use std::time::Duration;

use docflux::operation::Find;
use docflux::{Client, ClientOptions, Namespace};

use support::fake_server::FakeServer;

fn client_for(server: &FakeServer) -> Client {
    let options = ClientOptions::builder()
        .hosts(vec![server.address.parse().expect("fake server address")])
        .heartbeat_frequency(Duration::from_millis(20))
        .max_wait_time(Duration::from_secs(5))
        .build();
    Client::with_options(options).expect("client construction never fails synchronously")
}

#[test]
fn find_against_a_fake_standalone_returns_its_canned_document() {
    let server = FakeServer::start();
    let client = client_for(&server);

    let namespace = Namespace::new("appdb", "widgets");
    let cursor = client
        .find(Find::new(namespace, bson::doc! {}))
        .expect("find against a reachable standalone succeeds");
    let documents: Vec<bson::Document> = cursor.collect::<Result<_, _>>().expect("no cursor errors");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_str("name").unwrap(), "widget");
    client.shutdown();
}

#[test]
fn insert_with_default_write_concern_chains_a_get_last_error() {
    let server = FakeServer::start();
    let client = client_for(&server);

    let namespace = Namespace::new("appdb", "widgets");
    let result = client
        .insert(namespace, vec![bson::doc! { "x": 1 }])
        .expect("insert against a reachable standalone succeeds");

    assert_eq!(result.inserted_count, 1);
    client.shutdown();
}

#[test]
fn insert_operation_splits_into_exactly_one_batch_for_a_small_document_set() {
    let server = FakeServer::start();
    let client = client_for(&server);

    let namespace = Namespace::new("appdb", "widgets");
    let documents = vec![bson::doc! { "x": 1 }, bson::doc! { "x": 2 }, bson::doc! { "x": 3 }];
    let result = client
        .insert(namespace, documents)
        .expect("small inserts never need batching");

    assert_eq!(result.inserted_count, 3);
    client.shutdown();
}

#[test]
fn drop_collection_swallows_ns_not_found_from_the_server() {
    let server = FakeServer::start();
    let client = client_for(&server);

    let namespace = Namespace::new("appdb", "never-created");
    client
        .drop_collection(&namespace)
        .expect("a missing-collection drop is swallowed, not surfaced");
    client.shutdown();
}

#[test]
fn run_command_round_trips_an_administrative_command() {
    let server = FakeServer::start();
    let client = client_for(&server);

    let reply = client
        .run_command("admin", bson::doc! { "ping": 1 }, Default::default())
        .expect("ping succeeds against a reachable standalone");
    assert_eq!(reply.get_f64("ok").unwrap(), 1.0);
    client.shutdown();
}

#[test]
fn server_descriptions_reports_the_fake_standalone_as_ok_once_discovered() {
    let server = FakeServer::start();
    let client = client_for(&server);

    // Force discovery to complete by running an operation that blocks on
    // server selection, then check the published snapshot.
    let namespace = Namespace::new("appdb", "widgets");
    client
        .find(Find::new(namespace, bson::doc! {}))
        .expect("find forces discovery to complete");

    let descriptions = client.server_descriptions();
    assert_eq!(descriptions.len(), 1);
    assert!(descriptions[0].ok);
    assert_eq!(descriptions[0].server_type, docflux::ServerType::Standalone);
    client.shutdown();
}
