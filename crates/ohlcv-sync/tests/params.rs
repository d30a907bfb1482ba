//! 파라미터 트리 로딩 테스트.

use chrono::{DateTime, Utc};
use ohlcv_core::{AppConfig, AssetClass, CoreError, Timeframe};
use ohlcv_sync::{select_tickers, ParamsTree};
use std::fs;
use std::path::Path;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_tree(root: &Path) {
    write(
        &root.join("main.json"),
        r#"{
            "tickers": [],
            "storage": { "root_dir": "db" },
            "sync": { "rows_per_window": 150 }
        }"#,
    );
    write(
        &root.join("exchanges/binance/exchange.json"),
        r#"{ "enable": true, "name": "binance", "rate_limit_ms": 250 }"#,
    );
    write(
        &root.join("exchanges/binance/tickers/btc.json"),
        r#"[
            {
                "exchange_name": "binance", "asset_type": "spot",
                "coin": "BTC", "coin_ref": "USDT", "timeframe": "1h",
                "start_date": { "year": 2023, "month": 1, "day": 1 },
                "end_date": { "year": 2023, "month": 1, "day": 9 }
            },
            {
                "exchange_name": "binance", "asset_type": "spot",
                "coin": "BTC", "coin_ref": "USDT", "timeframe": "4h"
            }
        ]"#,
    );
    write(
        &root.join("exchanges/binance/tickers/eth_perp.json"),
        r#"{
            "exchange_name": "binance", "asset_type": "futureperp",
            "coin": "ETH", "coin_ref": "USDT", "timeframe": "1m"
        }"#,
    );
    write(
        &root.join("exchanges/bitfinex/exchange.json"),
        r#"{ "enable": false, "name": "bitfinex" }"#,
    );
    write(
        &root.join("exchanges/bitfinex/tickers/btc.json"),
        r#"{
            "exchange_name": "bitfinex", "asset_type": "spot",
            "coin": "BTC", "coin_ref": "USDT", "timeframe": "1d"
        }"#,
    );
}

#[test]
fn test_load_tree_and_select_all() {
    let dir = tempfile::tempdir().unwrap();
    sample_tree(dir.path());
    let tree = ParamsTree::new(dir.path());

    let config = AppConfig::load(tree.main_config_path()).unwrap();
    assert_eq!(config.sync.rows_per_window, 150);
    assert!(config.tickers.is_empty());

    let exchanges = tree.load_exchanges().unwrap();
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges[0].settings.name, "binance");
    assert_eq!(exchanges[0].settings.rate_limit_ms, Some(250));
    assert_eq!(exchanges[0].tickers.len(), 3);
    assert!(!exchanges[1].settings.enable);

    let selection = select_tickers(&exchanges, &[]);
    let keys: Vec<String> = selection.specs.iter().map(|s| s.id.key()).collect();
    assert_eq!(
        keys,
        vec!["binance_spot_BTC_USDT_1h", "binance_perpetual_ETH_USDT_1m"]
    );

    let btc = &selection.specs[0];
    assert_eq!(btc.start, Some(ts("2023-01-01T00:00:00Z")));
    assert_eq!(btc.end, Some(ts("2023-01-09T23:00:00Z")));
    assert_eq!(selection.specs[1].id.asset_class, AssetClass::Perpetual);
    assert_eq!(selection.specs[1].id.timeframe, Timeframe::Minute);

    assert_eq!(selection.rejected.len(), 1);
    assert!(matches!(
        selection.rejected[0].1,
        CoreError::UnsupportedTimeframe(_)
    ));
    assert!(selection.missing.is_empty());
}

#[test]
fn test_select_named_tickers_reports_missing() {
    let dir = tempfile::tempdir().unwrap();
    sample_tree(dir.path());
    let exchanges = ParamsTree::new(dir.path()).load_exchanges().unwrap();

    let wanted = vec![
        "binance_spot_BTC_USDT_1h".to_string(),
        "bitfinex_spot_BTC_USDT_1d".to_string(),
        "kraken_spot_BTC_USD_1h".to_string(),
    ];
    let selection = select_tickers(&exchanges, &wanted);

    assert_eq!(selection.specs.len(), 1);
    assert_eq!(selection.specs[0].id.key(), "binance_spot_BTC_USDT_1h");
    assert!(selection.rejected.is_empty());
    // 비활성 거래소의 티커도 찾지 못한 것으로 보고
    assert_eq!(
        selection.missing,
        vec!["bitfinex_spot_BTC_USDT_1d", "kraken_spot_BTC_USD_1h"]
    );
}

#[test]
fn test_missing_exchanges_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let tree = ParamsTree::new(dir.path());
    assert!(tree.load_exchanges().unwrap().is_empty());

    // main.json이 없으면 기본값
    let config = AppConfig::load(tree.main_config_path()).unwrap();
    assert_eq!(config.sync.rows_per_window, 200);
}

#[test]
fn test_malformed_descriptor_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("exchanges/binance/exchange.json"),
        r#"{ "name": "binance" }"#,
    );
    write(
        &dir.path().join("exchanges/binance/tickers/bad.json"),
        r#"{ "exchange_name": "binance" }"#,
    );
    let err = ParamsTree::new(dir.path()).load_exchanges().unwrap_err();
    assert!(matches!(err, ohlcv_sync::ParamsError::Json { .. }));
}
