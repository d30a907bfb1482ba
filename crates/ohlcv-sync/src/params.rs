//! 파라미터 트리 로딩.
//!
//! ```text
//! <params>/
//! ├── main.json                          (AppConfig)
//! └── exchanges/
//!     └── <name>/
//!         ├── exchange.json              { "enable": true, "name": "binance", ... }
//!         └── tickers/*.json             기술자 하나 또는 배열
//! ```
//!
//! 기술자 검증 실패는 해당 티커만 제외하고 나머지는 계속 진행합니다.

use crate::error::ParamsError;
use chrono::{DateTime, Duration, Utc};
use ohlcv_core::{date_from_ymd, offset, AssetClass, CoreError, TickerId, Timeframe};
use ohlcv_exchange::ExchangeSettings;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 연-월-일 날짜.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateSpec {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DateSpec {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// 해당 날짜 00:00 UTC.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, CoreError> {
        date_from_ymd(self.year, self.month, self.day)
    }
}

/// 티커 기술자 (`tickers/*.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct TickerDescriptor {
    pub exchange_name: String,
    pub asset_type: String,
    /// 기준 코인
    pub coin: String,
    /// 호가 코인
    pub coin_ref: String,
    pub timeframe: String,
    #[serde(default)]
    pub start_date: Option<DateSpec>,
    #[serde(default)]
    pub end_date: Option<DateSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorFile {
    Many(Vec<TickerDescriptor>),
    One(TickerDescriptor),
}

/// 검증된 티커 사양.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerSpec {
    pub id: TickerId,
    /// 요청 시작 (정렬됨)
    pub start: Option<DateTime<Utc>>,
    /// 요청 종료 (포함, 정렬됨)
    pub end: Option<DateTime<Utc>>,
}

impl TickerSpec {
    pub fn new(id: TickerId) -> Self {
        Self {
            id,
            start: None,
            end: None,
        }
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }
}

impl TickerDescriptor {
    /// 검증 전 표시용 키.
    pub fn raw_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.exchange_name.to_lowercase(),
            self.asset_type.to_lowercase(),
            self.coin.to_uppercase(),
            self.coin_ref.to_uppercase(),
            self.timeframe
        )
    }

    /// 기술자를 검증하고 사양으로 변환합니다.
    ///
    /// 종료 날짜는 그 날 전체를 포함합니다. 예를 들어 시간봉의 종료 날짜
    /// 2023-01-09는 2023-01-09T23:00을 마지막 틱으로 합니다.
    ///
    /// # Errors
    /// - 지원하지 않는 타임프레임 / 자산 유형
    /// - 2010년 이전 또는 존재하지 않는 날짜
    /// - 시작 날짜가 종료 날짜보다 늦음
    pub fn validate(&self) -> Result<TickerSpec, CoreError> {
        let timeframe: Timeframe = self.timeframe.parse()?;
        let asset_class: AssetClass = self.asset_type.parse()?;
        let id = TickerId::new(
            &self.exchange_name,
            &self.coin,
            &self.coin_ref,
            asset_class,
            timeframe,
        );

        let start = self.start_date.map(|d| d.to_datetime()).transpose()?;
        let end_day = self.end_date.map(|d| d.to_datetime()).transpose()?;

        if let (Some(start), Some(end)) = (start, end_day) {
            if start > end {
                return Err(CoreError::InvalidRange { start, end });
            }
        }
        let end = end_day.map(|day| offset(day + Duration::days(1), -1, timeframe));

        Ok(TickerSpec { id, start, end })
    }
}

/// 거래소 하나의 파라미터.
#[derive(Debug, Clone)]
pub struct ExchangeParams {
    pub settings: ExchangeSettings,
    pub tickers: Vec<TickerDescriptor>,
}

/// 티커 선택 결과.
#[derive(Debug, Default)]
pub struct TickerSelection {
    /// 실행할 티커
    pub specs: Vec<TickerSpec>,
    /// 검증에 실패한 티커 (표시용 키, 에러)
    pub rejected: Vec<(String, CoreError)>,
    /// 설정에는 있지만 파라미터 트리에 없는 키
    pub missing: Vec<String>,
}

/// 파라미터 디렉터리.
#[derive(Debug, Clone)]
pub struct ParamsTree {
    root: PathBuf,
}

impl ParamsTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn main_config_path(&self) -> PathBuf {
        self.root.join("main.json")
    }

    /// `exchanges/*` 아래의 모든 거래소 설정과 티커 기술자를 읽습니다.
    ///
    /// `exchanges` 디렉터리가 없으면 빈 목록을 반환합니다.
    pub fn load_exchanges(&self) -> Result<Vec<ExchangeParams>, ParamsError> {
        let dir = self.root.join("exchanges");
        if !dir.is_dir() {
            warn!(path = %dir.display(), "거래소 디렉터리가 없습니다");
            return Ok(Vec::new());
        }

        let mut exchanges = Vec::new();
        for path in sorted_entries(&dir)? {
            if !path.is_dir() {
                continue;
            }
            let exchange_file = path.join("exchange.json");
            if !exchange_file.is_file() {
                debug!(path = %path.display(), "exchange.json 없음, 건너뜀");
                continue;
            }
            let settings: ExchangeSettings = read_json(&exchange_file)?;

            let mut tickers = Vec::new();
            let tickers_dir = path.join("tickers");
            if tickers_dir.is_dir() {
                for file in sorted_entries(&tickers_dir)? {
                    if file.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match read_json::<DescriptorFile>(&file)? {
                        DescriptorFile::One(d) => tickers.push(d),
                        DescriptorFile::Many(ds) => tickers.extend(ds),
                    }
                }
            }

            debug!(exchange = %settings.name, tickers = tickers.len(), "거래소 파라미터 로드");
            exchanges.push(ExchangeParams { settings, tickers });
        }
        Ok(exchanges)
    }
}

/// 실행할 티커를 고릅니다.
///
/// `wanted`가 비어 있으면 활성 거래소의 모든 티커를 선택합니다.
/// 비활성 거래소의 티커는 제외됩니다.
pub fn select_tickers(exchanges: &[ExchangeParams], wanted: &[String]) -> TickerSelection {
    let wanted_set: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let mut selection = TickerSelection::default();
    let mut found: HashSet<String> = HashSet::new();

    for exchange in exchanges.iter().filter(|e| e.settings.enable) {
        for descriptor in &exchange.tickers {
            let raw_key = descriptor.raw_key();
            match descriptor.validate() {
                Ok(spec) => {
                    let key = spec.id.key();
                    if !wanted_set.is_empty() && !wanted_set.contains(key.as_str()) {
                        continue;
                    }
                    if found.insert(key) {
                        selection.specs.push(spec);
                    }
                }
                Err(e) => {
                    if wanted_set.is_empty() || wanted_set.contains(raw_key.as_str()) {
                        found.insert(raw_key.clone());
                        selection.rejected.push((raw_key, e));
                    }
                }
            }
        }
    }

    selection.missing = wanted
        .iter()
        .filter(|key| !found.contains(key.as_str()))
        .cloned()
        .collect();
    selection
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ParamsError> {
    let io_err = |source| ParamsError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ParamsError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ParamsError::Json {
        path: path.to_path_buf(),
        source,
    })
}
