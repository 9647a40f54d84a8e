//! HTTP fetcher behaviour against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use memedoc::config::FetchConfig;
use memedoc::error::{FetchError, ItemFailure};
use memedoc::extract::{extract_from_url, ImageHashExtractor};
use memedoc::fetch::{Fetcher, HttpFetcher};

fn fetcher(config: FetchConfig) -> HttpFetcher {
    HttpFetcher::new(&config, 4).unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(24, 24, |x, y| image::Rgb([(x * 10) as u8, (y * 10) as u8, 0]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[tokio::test]
async fn fetches_body_with_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/meme.png"))
        .and(header("user-agent", "MemeDoc/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetcher(FetchConfig::default())
        .fetch(&format!("{}/meme.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, png_bytes());
}

#[tokio::test]
async fn non_200_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher(FetchConfig::default())
        .fetch(&format!("{}/gone.png", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Status(404));
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.png"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = fetcher(FetchConfig::default())
        .fetch(&format!("{}/empty.png", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::EmptyBody);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_bytes: 1024,
        ..FetchConfig::default()
    };
    let err = fetcher(config)
        .fetch(&format!("{}/huge.png", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::TooLarge { limit: 1024 });
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = FetchConfig {
        timeout_secs: 1,
        ..FetchConfig::default()
    };
    let err = fetcher(config)
        .fetch(&format!("{}/slow.png", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout);
}

#[tokio::test]
async fn extract_from_url_fingerprints_remote_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/meme.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/text.png"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
        .mount(&server)
        .await;

    let http = fetcher(FetchConfig::default());
    let extractor = Arc::new(ImageHashExtractor::default());

    let fp = extract_from_url(&http, extractor.clone(), &format!("{}/meme.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(fp.hashes.len(), 4);

    let err = extract_from_url(&http, extractor, &format!("{}/text.png", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ItemFailure::Extraction(_)));
}
