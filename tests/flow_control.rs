//! Exercises backpressure when the peer advertises a reduced per-stream
//! send window: a large request body must be split into DATA frames that
//! respect it, and must resume only once a WINDOW_UPDATE replenishes it.

mod support;

use bytes::Bytes;
use http::Method;
use tokio::io::DuplexStream;

use h2tunnel::h2proto::SettingCode;
use h2tunnel::{ByteStream, Origin, Scheme, SendRequest, Url};

fn origin() -> Origin {
    Origin { scheme: Scheme::Https, host: Bytes::from_static(b"flow.test"), port: 443 }
}

fn url(path: &str) -> Url {
    let o = origin();
    Url::new(o.scheme, o.host, o.port, Bytes::copy_from_slice(path.as_bytes()))
}

const REDUCED_WINDOW: u32 = 16_384;
const BODY_LEN: usize = 50_000;

#[tokio::test]
async fn a_reduced_peer_window_throttles_a_large_body_until_a_window_update_arrives() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(1 << 20);
    let client = SendRequest::new(origin(), client_io);

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;

        // The codec snapshots the peer's initial window into a stream's send
        // window at stream-creation time, never retroactively: this has to
        // land before the body-bearing request's stream exists, so a
        // bodyless warm-up request is used to force the client to read (and
        // ack) it first.
        support::write_settings(&mut server, &[(SettingCode::InitialWindowSize as u16, REDUCED_WINDOW)]).await;

        let warm_up = support::read_frame(&mut server).await;
        assert_eq!(warm_up.kind, support::FRAME_HEADERS);
        support::write_response_headers(&mut server, warm_up.stream_id, 200, true, &[]).await;

        let ack = support::read_frame(&mut server).await;
        assert_eq!(ack.kind, support::FRAME_SETTINGS);
        assert_eq!(ack.flags & 0x1, 0x1, "client should ack the narrowed-window settings frame");

        let headers = support::read_frame(&mut server).await;
        assert_eq!(headers.kind, support::FRAME_HEADERS);
        assert_ne!(headers.flags & support::FLAG_END_STREAM, support::FLAG_END_STREAM, "a body-bearing request must not end its own HEADERS frame");

        let mut received = Vec::new();
        let mut replenished = false;
        loop {
            let frame = support::read_frame(&mut server).await;
            assert_eq!(frame.kind, support::FRAME_DATA);
            if received.is_empty() {
                assert_eq!(frame.payload.len(), REDUCED_WINDOW as usize, "the first DATA frame should be capped at the narrowed window");
            }
            received.extend_from_slice(&frame.payload);
            if !replenished {
                support::write_window_update(&mut server, headers.stream_id, BODY_LEN as u32).await;
                replenished = true;
            }
            if frame.flags & support::FLAG_END_STREAM != 0 {
                break;
            }
        }
        assert_eq!(received.len(), BODY_LEN);

        support::write_response_headers(&mut server, headers.stream_id, 200, true, &[]).await;
        server
    });

    let warm_up = client.request(Method::GET, url("/warmup"), Vec::new(), ByteStream::empty(), Default::default()).await.unwrap();
    assert_eq!(warm_up.status, 200);

    let headers = vec![(http::header::CONTENT_LENGTH, http::HeaderValue::from_str(&BODY_LEN.to_string()).unwrap())];
    let body = ByteStream::from_bytes(vec![b'x'; BODY_LEN]);
    let response = client.request(Method::POST, url("/upload"), headers, body, Default::default()).await.unwrap();
    assert_eq!(response.status, 200);

    server_task.await.unwrap();
}
