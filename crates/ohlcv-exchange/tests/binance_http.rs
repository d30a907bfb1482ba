//! Binance 커넥터 HTTP 동작 테스트 (mockito).

use mockito::{Matcher, Server};
use ohlcv_core::Timeframe;
use ohlcv_exchange::{
    BinanceClient, BinanceConfig, CandleFetcher, ExchangeError, FailureKind, RateGate,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn client(config: BinanceConfig, url: String) -> BinanceClient {
    BinanceClient::new(
        config.with_base_url(url).with_timeout_secs(5),
        Arc::new(RateGate::unlimited("binance")),
    )
    .unwrap()
}

const KLINES: &str = r#"[
  [1673222400000, "17100.00", "17200.50", "17050.00", "17150.25", "321.5", 1673225999999, "0", 100, "0", "0", "0"],
  [1673226000000, "17150.25", "17180.00", "17120.00", "17170.00", "210.0", 1673229599999, "0", 80, "0", "0", "0"]
]"#;

#[tokio::test]
async fn test_fetch_spot_klines() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "1h".into()),
            Matcher::UrlEncoded("startTime".into(), "1673218800000".into()),
            Matcher::UrlEncoded("limit".into(), "202".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(KLINES)
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    let candles = client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 1_673_218_800_000, 202)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].timestamp_ms(), 1_673_222_400_000);
    assert_eq!(candles[0].open, dec!(17100.00));
    assert_eq!(candles[0].high, dec!(17200.50));
    assert_eq!(candles[0].close, dec!(17150.25));
    assert_eq!(candles[1].volume, dec!(210.0));
    assert!(candles.iter().all(|c| c.sequence_id.is_none()));
}

#[tokio::test]
async fn test_fetch_futures_klines() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = client(BinanceConfig::usd_m(), server.url());
    let candles = client
        .fetch_candles("ETHUSDT", Timeframe::Day, 0, 10)
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(candles.is_empty());
}

#[tokio::test]
async fn test_limit_capped_per_market() {
    let mut server = Server::new_async().await;
    let spot = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let futures = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::UrlEncoded("limit".into(), "1500".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let spot_client = client(BinanceConfig::spot(), server.url());
    assert_eq!(spot_client.max_limit(), 1000);
    spot_client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 0, 5000)
        .await
        .unwrap();

    let futures_client = client(BinanceConfig::usd_m(), server.url());
    assert_eq!(futures_client.max_limit(), 1500);
    futures_client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 0, 5000)
        .await
        .unwrap();

    spot.assert_async().await;
    futures.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"code":-1003,"msg":"Too many requests"}"#)
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    let err = client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::RateLimited));
    assert_eq!(err.classify(), FailureKind::RateLimited);
}

#[tokio::test]
async fn test_invalid_symbol_is_fatal() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    let err = client
        .fetch_candles("XXXUSDT", Timeframe::Hour, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::SymbolNotFound(_)));
    assert_eq!(err.classify(), FailureKind::Fatal);
}

#[tokio::test]
async fn test_server_error_is_connection_class() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    let err = client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::ExchangeUnavailable(_)));
    assert_eq!(err.classify(), FailureKind::Connection);
}

#[tokio::test]
async fn test_malformed_payload_is_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"unexpected": true}"#)
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    let err = client
        .fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::ParseError(_)));
}

#[tokio::test]
async fn test_spot_system_status() {
    let mut server = Server::new_async().await;
    let normal = server
        .mock("GET", "/sapi/v1/system/status")
        .with_status(200)
        .with_body(r#"{"status":0,"msg":"normal"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(BinanceConfig::spot(), server.url());
    assert!(client.test_connection().await.is_ok());
    normal.assert_async().await;
    normal.remove_async().await;

    server
        .mock("GET", "/sapi/v1/system/status")
        .with_status(200)
        .with_body(r#"{"status":1,"msg":"system maintenance"}"#)
        .create_async()
        .await;
    assert!(matches!(
        client.test_connection().await,
        Err(ExchangeError::ExchangeUnavailable(_))
    ));
}

#[tokio::test]
async fn test_futures_ping() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/ping")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let client = client(BinanceConfig::usd_m(), server.url());
    assert!(client.test_connection().await.is_ok());
    mock.assert_async().await;
}
