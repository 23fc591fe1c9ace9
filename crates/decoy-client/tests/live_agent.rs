//! End-to-end tests against a real Mountebank-compatible agent.
//!
//! These spawn the agent executable from `node_modules/.bin/mb`, so they are
//! ignored by default. Run them with `cargo test -- --ignored` after
//! `npm install mountebank`.

use std::time::Duration;

use decoy_client::{
    FieldPredicate, HttpResponse, Imposter, MockServer, Predicate, Proxy, RecordedRequest,
    Response, ServerOptions, Stub,
};
use serial_test::serial;

fn start_server() -> (MockServer, tempfile::TempDir) {
    let data_dir = tempfile::tempdir().expect("temp dir for the agent's persistence directory");
    let server = MockServer::start(
        &ServerOptions::default()
            .with_port(2525)
            .with_startup_timeout(Duration::from_secs(10))
            .with_data_dir(data_dir.path()),
    )
    .expect("mountebank must be installed and startable");
    (server, data_dir)
}

#[test]
#[serial]
#[ignore = "requires the mountebank executable at node_modules/.bin/mb"]
fn scoped_imposters_are_torn_down_on_exit() {
    let (server, _data_dir) = start_server();
    let controller = server.controller();

    {
        let scope = controller
            .scoped(vec![Imposter::single(Stub::default())])
            .expect("attach");
        assert_eq!(controller.running_ports().len(), 1);
        assert!(scope.get(0).expect("tracked imposter").is_attached());
    }

    // The scope has dropped: nothing tracked locally, nothing left remotely.
    assert!(controller.running_ports().is_empty());
    assert!(controller.query_all().expect("query all").is_empty());
    server.close();
}

#[test]
#[serial]
#[ignore = "requires the mountebank executable at node_modules/.bin/mb"]
fn stub_mutations_resync_local_state() {
    let (server, _data_dir) = start_server();
    let controller = server.controller();

    let mut imposter = Imposter::single(Stub::default());
    controller.attach(&mut imposter).expect("attach");

    let stub = Stub::matching(
        Predicate::Field(FieldPredicate::path("/extra")),
        Response::Http(HttpResponse::with_body("extra")),
    );
    controller
        .add_stub(&mut imposter, &stub, None)
        .expect("add stub");
    assert_eq!(imposter.stubs.len(), 2, "local list reflects remote state");

    controller.delete_stub(&mut imposter, 0).expect("delete stub");
    assert_eq!(imposter.stubs.len(), 1);

    controller.detach(&mut imposter).expect("detach");
    assert!(!imposter.is_attached());
    server.close();
}

#[test]
#[serial]
#[ignore = "requires the mountebank executable at node_modules/.bin/mb"]
fn recorded_requests_reconstruct_as_http_records() {
    let (server, _data_dir) = start_server();
    let controller = server.controller();

    let mut imposter = Imposter::single(Stub::matching(
        Predicate::Field(FieldPredicate::path("/test")),
        Response::Http(HttpResponse::with_body("sausages")),
    ));
    controller.attach(&mut imposter).expect("attach");

    let url = imposter.url().expect("attached");
    let body = reqwest::blocking::get(format!("{url}/test"))
        .and_then(|response| response.text())
        .expect("request against the imposter");
    assert_eq!(body, "sausages");

    let requests = controller
        .get_actual_requests(&imposter)
        .expect("recorded requests");
    match requests.as_slice() {
        [RecordedRequest::Http(request)] => {
            assert_eq!(request.method, "GET");
            assert_eq!(request.path, "/test");
        }
        other => panic!("expected one http record, got {other:?}"),
    }

    controller.detach(&mut imposter).expect("detach");
    server.close();
}

#[test]
#[serial]
#[ignore = "requires the mountebank executable at node_modules/.bin/mb"]
fn replayable_snapshot_strips_proxies() {
    let (server, _data_dir) = start_server();
    let controller = server.controller();

    let mut imposter = Imposter::new(vec![
        Stub::matching(
            Predicate::Field(FieldPredicate::path("/static")),
            Response::Http(HttpResponse::with_body("static")),
        ),
        Stub::new(
            Vec::new(),
            vec![Response::Proxy(Proxy::new("http://localhost:9999"))],
        ),
    ]);
    controller.attach(&mut imposter).expect("attach");

    let snapshot = controller.replayable_snapshot().expect("snapshot");
    assert!(snapshot.iter().all(|imposter| imposter
        .stubs
        .iter()
        .all(|stub| stub
            .responses
            .iter()
            .all(|response| !matches!(response, Response::Proxy(_))))));

    controller.detach(&mut imposter).expect("detach");
    server.close();
}

#[test]
#[serial]
#[ignore = "requires the mountebank executable at node_modules/.bin/mb"]
fn second_server_on_the_same_port_is_rejected_while_the_first_runs() {
    let (server, _data_dir) = start_server();

    let err = MockServer::start(&ServerOptions::default().with_port(2525))
        .expect_err("port already owned in this process");
    assert!(matches!(
        err,
        decoy_client::ServerError::PortInUse(2525)
    ));

    // The first server is unaffected by the rejected second start.
    assert!(server.controller().query_all().is_ok());
    server.close();
}
