use std::time::Duration;

use httpmock::prelude::*;
use printrelay::{
    application::render::{PeerRender, RenderFailure},
    domain::{job::RenderJob, target::PeerTarget},
    infra::peer::HttpPeerClient,
};
use url::Url;

fn peer(server: &MockServer, name: &str) -> PeerTarget {
    let address = Url::parse(&server.url("/generate-pdf")).expect("mock url");
    PeerTarget::new(name, address)
}

#[tokio::test]
async fn posts_job_as_json_and_returns_body_bytes() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/generate-pdf")
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "document": "<h1>Hi</h1>",
                    "filename": "hi.pdf"
                }));
            then.status(200)
                .header("content-type", "application/pdf")
                .body("%PDF-1.7 remote");
        })
        .await;

    let client = HttpPeerClient::new(None).expect("client");
    let job = RenderJob::new("<h1>Hi</h1>", Some("hi.pdf".into())).expect("job");

    let bytes = client
        .render(&job, &peer(&server, "east"))
        .await
        .expect("peer render");

    mock.assert_async().await;
    assert_eq!(bytes, b"%PDF-1.7 remote");
}

#[tokio::test]
async fn non_success_status_maps_to_peer_http_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate-pdf");
            then.status(500)
                .header("content-type", "application/json")
                .body(r#"{"error":"Failed to generate PDF"}"#);
        })
        .await;

    let client = HttpPeerClient::new(None).expect("client");
    let job = RenderJob::new("<p>x</p>", None).expect("job");

    let err = client
        .render(&job, &peer(&server, "east"))
        .await
        .expect_err("500 is a failure");

    match err {
        RenderFailure::PeerHttp { target, status } => {
            assert_eq!(target, "east");
            assert_eq!(status, 500);
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_peer_maps_to_transport_failure() {
    let client = HttpPeerClient::new(Some(Duration::from_secs(5))).expect("client");
    let job = RenderJob::new("<p>x</p>", None).expect("job");
    // Port 9 (discard) on loopback is closed on test machines.
    let target = PeerTarget::new(
        "gone",
        Url::parse("http://127.0.0.1:9/generate-pdf").expect("url"),
    );

    let err = client
        .render(&job, &target)
        .await
        .expect_err("connection refused");

    assert!(matches!(err, RenderFailure::PeerTransport { ref target, .. } if target == "gone"));
}

#[tokio::test]
async fn request_timeout_maps_to_transport_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate-pdf");
            then.status(200).delay(Duration::from_secs(3)).body("%PDF");
        })
        .await;

    let client = HttpPeerClient::new(Some(Duration::from_millis(200))).expect("client");
    let job = RenderJob::new("<p>x</p>", None).expect("job");

    let err = client
        .render(&job, &peer(&server, "slow"))
        .await
        .expect_err("times out");
    assert!(matches!(err, RenderFailure::PeerTransport { .. }));
}
