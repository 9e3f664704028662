//! `TranslationClient` against the in-process HTTP stub.

mod common;

use secrecy::SecretString;

use common::server::{StubMode, StubServer};
use doctrans::config::TranslatorConfig;
use doctrans::translation::{TranslateError, Translator};
use doctrans::TranslationClient;

fn client(server: &StubServer) -> TranslationClient {
    TranslationClient::new(&TranslatorConfig::new(server.base_url.clone()), None).unwrap()
}

#[tokio::test]
async fn translate_success() {
    let server = StubServer::start(StubMode::Prefix);

    let translated = client(&server).translate("Hello", "es").await.unwrap();

    assert_eq!(translated, "[es] Hello");
    let request = server.last_request().unwrap();
    assert_eq!(request["q"], "Hello");
    assert_eq!(request["source"], "auto");
    assert_eq!(request["format"], "text");
}

#[tokio::test]
async fn api_key_is_sent() {
    let server = StubServer::start(StubMode::Prefix);
    let client = TranslationClient::new(
        &TranslatorConfig::new(server.base_url.clone()),
        Some(SecretString::from("s3cret".to_string())),
    )
    .unwrap();

    client.translate("Hello", "de").await.unwrap();

    assert_eq!(server.last_request().unwrap()["api_key"], "s3cret");
}

#[tokio::test]
async fn server_error_maps_to_service_error() {
    let server = StubServer::start(StubMode::ServerError);

    let err = client(&server).translate("Hello", "es").await.unwrap_err();

    assert_eq!(
        err,
        TranslateError::Service {
            status: 500,
            body: "translation backend crashed".to_string(),
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn long_text_is_sent_in_chunks() {
    let server = StubServer::start(StubMode::Prefix);
    let mut config = TranslatorConfig::new(server.base_url.clone());
    config.max_chunk_chars = 12;
    let client = TranslationClient::new(&config, None).unwrap();

    let translated = client
        .translate("first line\nsecond line\nthird", "fr")
        .await
        .unwrap();

    assert_eq!(server.requests(), 3);
    assert_eq!(translated, "[fr] first line\n[fr] second line\n[fr] third");
}

#[tokio::test]
async fn languages_are_listed() {
    let server = StubServer::start(StubMode::Prefix);

    let languages = client(&server).languages().await.unwrap();

    let codes: Vec<&str> = languages.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, vec!["en", "es", "de"]);
    assert_eq!(languages[1].name, "Spanish");
    assert_eq!(server.requests(), 0);
}
