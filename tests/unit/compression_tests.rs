use caldav_core::common::compression::{ContentEncoding, compress_payload};
use bytes::Bytes;

#[tokio::test]
async fn identity_round_trips_unchanged() {
    let data = Bytes::from("Hello, world!");
    let compressed = compress_payload(data.clone(), ContentEncoding::Identity)
        .await
        .expect("identity compression should succeed");
    assert_eq!(compressed, data);
}

#[tokio::test]
async fn gzip_shrinks_repetitive_data() {
    let data = Bytes::from(vec![b'A'; 10_000]);
    let compressed = compress_payload(data.clone(), ContentEncoding::Gzip)
        .await
        .expect("gzip compression should succeed");
    assert!(compressed.len() < data.len());
}

#[tokio::test]
async fn brotli_shrinks_repetitive_data() {
    let data = Bytes::from(vec![b'B'; 10_000]);
    let compressed = compress_payload(data.clone(), ContentEncoding::Br)
        .await
        .expect("brotli compression should succeed");
    assert!(compressed.len() < data.len());
}

#[tokio::test]
async fn zstd_shrinks_repetitive_data() {
    let data = Bytes::from(vec![b'C'; 10_000]);
    let compressed = compress_payload(data.clone(), ContentEncoding::Zstd)
        .await
        .expect("zstd compression should succeed");
    assert!(compressed.len() < data.len());
}
