//! Exercises `SendRequest` end to end over an in-memory duplex transport,
//! with a hand-rolled peer on the other end playing the server role.

mod support;

use http::Method;
use tokio::io::DuplexStream;

use h2tunnel::{ByteStream, Origin, Scheme, SendRequest, Url};

fn origin() -> Origin {
    Origin { scheme: Scheme::Https, host: bytes::Bytes::from_static(b"example.test"), port: 443 }
}

fn url(path: &str) -> Url {
    let o = origin();
    Url::new(o.scheme, o.host, o.port, bytes::Bytes::copy_from_slice(path.as_bytes()))
}

#[tokio::test]
async fn simple_request_receives_status_and_body() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(8192);
    let client = SendRequest::new(origin(), client_io);

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        let headers = support::read_frame(&mut server).await;
        assert_eq!(headers.kind, support::FRAME_HEADERS);
        assert_eq!(headers.flags & support::FLAG_END_STREAM, support::FLAG_END_STREAM, "a bodyless GET should carry END_STREAM on its HEADERS frame");

        let fields = support::decode_field_names(&headers.payload);
        assert!(fields.iter().any(|(n, v)| n.as_ref() == b":path" && v.as_ref() == b"/hello"));

        support::write_response_headers(&mut server, headers.stream_id, 200, false, &[(b"x-served-by", b"fake-server")]).await;
        support::write_data(&mut server, headers.stream_id, b"hello world", true).await;
        server
    });

    let response = client
        .request(Method::GET, url("/hello"), Vec::new(), ByteStream::empty(), Default::default())
        .await
        .expect("request should succeed");

    assert_eq!(response.status, 200);
    assert!(response.headers.iter().any(|(n, v)| n.as_str() == "x-served-by" && v == "fake-server"));

    let mut body = response.body;
    let chunk = body.next_chunk().await.unwrap().expect("body chunk");
    assert_eq!(&chunk[..], b"hello world");
    assert!(body.next_chunk().await.unwrap().is_none());

    server_task.await.unwrap();
}

#[tokio::test]
async fn headers_only_response_ends_the_stream_immediately() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(8192);
    let client = SendRequest::new(origin(), client_io);

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        let headers = support::read_frame(&mut server).await;
        support::write_response_headers(&mut server, headers.stream_id, 204, true, &[]).await;
        server
    });

    let response = client
        .request(Method::DELETE, url("/thing/1"), Vec::new(), ByteStream::empty(), Default::default())
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    let mut body = response.body;
    assert!(body.next_chunk().await.unwrap().is_none());

    server_task.await.unwrap();
}

#[tokio::test]
async fn request_body_is_chunked_and_flow_controlled() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(1 << 20);
    let client = SendRequest::new(origin(), client_io);

    let payload = vec![b'x'; 4096];
    let sent = payload.clone();

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        let headers = support::read_frame(&mut server).await;
        assert_eq!(headers.kind, support::FRAME_HEADERS);
        assert_ne!(headers.flags & support::FLAG_END_STREAM, support::FLAG_END_STREAM);

        let mut received = Vec::new();
        loop {
            let frame = support::read_frame(&mut server).await;
            assert_eq!(frame.kind, support::FRAME_DATA);
            received.extend_from_slice(&frame.payload);
            if frame.flags & support::FLAG_END_STREAM != 0 {
                break;
            }
        }
        assert_eq!(received, sent);

        support::write_response_headers(&mut server, headers.stream_id, 200, true, &[]).await;
        server
    });

    let headers = vec![(http::header::CONTENT_LENGTH, http::HeaderValue::from_str(&payload.len().to_string()).unwrap())];
    let body = ByteStream::from_bytes(payload);
    let response = client.request(Method::POST, url("/upload"), headers, body, Default::default()).await.unwrap();
    assert_eq!(response.status, 200);

    server_task.await.unwrap();
}

#[tokio::test]
async fn a_reset_stream_surfaces_as_a_protocol_error() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(8192);
    let client = SendRequest::new(origin(), client_io);

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        let headers = support::read_frame(&mut server).await;
        support::write_rst_stream(&mut server, headers.stream_id, 0x2 /* INTERNAL_ERROR */).await;
        server
    });

    let result = client.request(Method::GET, url("/boom"), Vec::new(), ByteStream::empty(), Default::default()).await;
    assert!(matches!(result, Err(h2tunnel::Error::Protocol(_))));
    assert!(client.is_closed());

    server_task.await.unwrap();
}

#[tokio::test]
async fn sequential_requests_reuse_the_same_connection() {
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(8192);
    let client = SendRequest::new(origin(), client_io);

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        for _ in 0..2 {
            let headers = support::read_frame(&mut server).await;
            support::write_response_headers(&mut server, headers.stream_id, 200, true, &[]).await;
        }
        server
    });

    let first = client.request(Method::GET, url("/one"), Vec::new(), ByteStream::empty(), Default::default()).await.unwrap();
    assert_eq!(first.status, 200);
    let second = client.request(Method::GET, url("/two"), Vec::new(), ByteStream::empty(), Default::default()).await.unwrap();
    assert_eq!(second.status, 200);

    assert!(!client.is_closed());
    server_task.await.unwrap();
}

#[tokio::test]
async fn authority_carries_an_explicit_port_when_not_the_scheme_default() {
    let origin = h2tunnel::Origin { scheme: h2tunnel::Scheme::Https, host: bytes::Bytes::from_static(b"example.org"), port: 8443 };
    let (client_io, mut server): (DuplexStream, DuplexStream) = tokio::io::duplex(8192);
    let client = SendRequest::new(origin.clone(), client_io);

    let target = h2tunnel::Url::new(origin.scheme, origin.host, origin.port, bytes::Bytes::from_static(b"/x"));

    let server_task = tokio::spawn(async move {
        support::consume_handshake(&mut server).await;
        let headers = support::read_frame(&mut server).await;
        let fields = support::decode_field_names(&headers.payload);
        assert!(fields.iter().any(|(n, v)| n.as_ref() == b":authority" && v.as_ref() == b"example.org:8443"));
        support::write_response_headers(&mut server, headers.stream_id, 200, true, &[]).await;
        server
    });

    let response = client.request(Method::GET, target, Vec::new(), ByteStream::empty(), Default::default()).await.unwrap();
    assert_eq!(response.status, 200);

    server_task.await.unwrap();
}
