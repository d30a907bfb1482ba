//! OHLCV 동기화 CLI.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ohlcv_core::{init_logging, AppConfig, Clock, SystemClock, Timeframe};
use ohlcv_exchange::{AdapterRegistry, ExchangeSettings};
use ohlcv_store::{CandleStore, SqliteCandleStore};
use ohlcv_sync::{select_tickers, ParamsError, ParamsTree, Runner, SyncPhase, TickerSelection};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ohlcv-sync")]
#[command(about = "Windowed incremental OHLCV candle synchronizer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 파라미터 디렉터리 (main.json, exchanges/)
    #[arg(long, default_value = "params", global = true)]
    params_dir: PathBuf,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// 파라미터 트리에 없는 티커가 설정되어 있으면 실패
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 설정된 모든 티커를 Ctrl-C까지 동기화
    Run,

    /// 지원하는 거래소, 자산 유형, 통화쌍, 타임프레임 출력
    List,

    /// 설정된 티커의 저장된 체크포인트 출력
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let params = ParamsTree::new(&cli.params_dir);
    let config = AppConfig::load(params.main_config_path())
        .with_context(|| format!("설정 로드 실패: {}", params.main_config_path().display()))?;

    let mut log_config = config.logging.to_log_config();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        log_config.format = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let exchanges = params.load_exchanges()?;
    let settings: Vec<ExchangeSettings> = exchanges.iter().map(|e| e.settings.clone()).collect();
    let registry = Arc::new(AdapterRegistry::from_settings(&settings)?);
    tracing::debug!(exchanges = ?registry.exchanges(), adapters = registry.len(), "어댑터 등록 완료");

    match cli.command {
        Commands::List => {
            for adapter in registry.iter() {
                let pairs: Vec<String> = adapter
                    .supported_pairs()
                    .iter()
                    .map(|(b, q)| format!("{}/{}", b, q))
                    .collect();
                let timeframes: Vec<&str> = Timeframe::ALL.iter().map(|tf| tf.code()).collect();
                println!(
                    "{:<10} {:<10} pairs=[{}] timeframes=[{}]",
                    adapter.exchange(),
                    adapter.asset_class(),
                    pairs.join(", "),
                    timeframes.join(", ")
                );
            }
        }
        Commands::Status => {
            let selection = selected(&exchanges, &config.tickers, cli.strict)?;
            let store = SqliteCandleStore::from_config(&config.storage);
            for spec in &selection.specs {
                let checkpoint = store.last_checkpoint(&spec.id).await?;
                let first = store.load_rows(&spec.id, None, 1).await?;
                match (first.first(), checkpoint.last_ts, checkpoint.last_id) {
                    (Some(first), Some(ts), Some(id)) => println!(
                        "{:<32} first_ts={} last_ts={} last_id={}",
                        spec.id.key(),
                        first.open_time.to_rfc3339(),
                        ts.to_rfc3339(),
                        id
                    ),
                    _ => println!("{:<32} (empty)", spec.id.key()),
                }
            }
        }
        Commands::Run => {
            let selection = selected(&exchanges, &config.tickers, cli.strict)?;
            if selection.specs.is_empty() {
                bail!("동기화할 티커가 없습니다");
            }

            let store: Arc<dyn CandleStore> = Arc::new(SqliteCandleStore::from_config(&config.storage));
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let runner = Runner::new(registry, store, clock, config.sync.clone());

            let token = CancellationToken::new();
            let signal_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("종료 신호 수신, 진행 중인 저장을 마치고 종료합니다");
                    signal_token.cancel();
                }
            });

            tracing::info!(tickers = selection.specs.len(), "OHLCV 동기화 시작");
            let reports = runner.run(&selection.specs, token).await;

            let blocked = reports.iter().filter(|r| r.phase == SyncPhase::Blocked).count();
            let done = reports.iter().filter(|r| r.phase == SyncPhase::Done).count();
            tracing::info!(
                total = reports.len(),
                done,
                blocked,
                "OHLCV 동기화 종료"
            );
        }
    }

    Ok(())
}

/// 설정된 티커를 고르고 문제를 보고합니다.
fn selected(
    exchanges: &[ohlcv_sync::ExchangeParams],
    wanted: &[String],
    strict: bool,
) -> anyhow::Result<TickerSelection> {
    let selection = select_tickers(exchanges, wanted);

    for (key, e) in &selection.rejected {
        tracing::error!(ticker = %key, "티커 기술자 검증 실패: {}", e);
    }
    if !selection.missing.is_empty() {
        if strict {
            return Err(ParamsError::UnknownTickers(selection.missing.clone()).into());
        }
        tracing::warn!(missing = ?selection.missing, "파라미터 트리에 없는 티커는 건너뜁니다");
    }
    Ok(selection)
}
