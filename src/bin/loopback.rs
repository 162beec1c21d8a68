//! PCP 루프백 데모
//!
//! 인메모리 채널 셋으로 연결된 두 세션 사이에서 블롭을 전송하고 결과를 검증한다.
//! - `--corrupt` 비율만큼 청크 패킷의 비트를 뒤집어 재요청 경로를 확인
//!
//! 사용법:
//!   cargo run --release --bin pcp-loopback -- [OPTIONS]
//!
//! 예시:
//!   # 10MB 테스트 데이터, 채널 4개
//!   cargo run --release --bin pcp-loopback -- --size 10 --channels 4
//!
//!   # 파일 전송 + 5% 손상
//!   cargo run --release --bin pcp-loopback -- -f photo.jpg -o copy.jpg --corrupt 0.05

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pcp::channel::{MemoryEndpoint, Tamper};
use pcp::packet::{self, HEADER_LEN};
use pcp::{memory_link_with, Blob, Config, Session, WireMessage};

/// 데모 설정
struct LoopbackConfig {
    file_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    size_mb: usize,
    corrupt_ratio: f64,
    timeout: Duration,
    config: Config,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            output_path: None,
            size_mb: 1,
            corrupt_ratio: 0.0,
            timeout: Duration::from_secs(60),
            config: Config::default(),
        }
    }
}

fn parse_args() -> LoopbackConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = LoopbackConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.file_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--size" => {
                if i + 1 < args.len() {
                    config.size_mb = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--channels" | "-c" => {
                if i + 1 < args.len() {
                    config.config.channel_count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.config.chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--corrupt" => {
                if i + 1 < args.len() {
                    config.corrupt_ratio = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("유효한 숫자 필요");
                    config.timeout = Duration::from_secs(secs);
                    i += 1;
                }
            }
            "--unstable" => {
                let channel_count = config.config.channel_count;
                config.config = Config {
                    channel_count,
                    ..Config::unstable_network()
                };
            }
            "--help" | "-h" => {
                println!(
                    r#"PCP Loopback - Parallel Chunk Protocol 루프백 데모

인메모리 채널로 연결된 송신/수신 세션 사이에서 데이터를 전송하고 검증
- 청크를 채널 셋에 라운드로빈 분배
- 체크섬 불일치 청크는 누락 재요청으로 복구

사용법:
  cargo run --release --bin pcp-loopback -- [OPTIONS]

옵션:
  -f, --file <PATH>       전송할 파일 (없으면 테스트 데이터 생성)
  -o, --output <PATH>     수신 결과 저장 경로
  --size <MB>             테스트 데이터 크기 (기본: 1)
  -c, --channels <N>      병렬 채널 수 (기본: 4)
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 65536)
  --corrupt <RATIO>       첫 전송에서 손상시킬 청크 비율 0.0~1.0 (기본: 0)
  --timeout <SECS>        전체 전송 제한 시간 (기본: 60)
  --unstable              불안정 네트워크 프리셋 사용
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
"#
                );
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    config
}

/// 첫 전송에서 `ratio` 비율의 청크 패킷 페이로드 비트를 뒤집는 훅
///
/// 재전송된 패킷은 건드리지 않는다.
fn corrupting_tamper(ratio: f64) -> Tamper {
    let touched: Arc<Mutex<HashSet<u16>>> = Arc::new(Mutex::new(HashSet::new()));

    Arc::new(move |_channel: usize, message: WireMessage| {
        let WireMessage::Binary(bytes) = &message else {
            return Some(message);
        };
        let Ok(decoded) = packet::decode(bytes.clone()) else {
            return Some(message);
        };
        if decoded.payload.is_empty() || !touched.lock().insert(decoded.index) {
            return Some(message);
        }
        if !rand::thread_rng().gen_bool(ratio) {
            return Some(message);
        }

        let mut raw = bytes.to_vec();
        raw[HEADER_LEN] ^= 0x01;
        Some(WireMessage::Binary(Bytes::from(raw)))
    })
}

/// 루프백 전송 실행, 수신측이 조립한 데이터 반환
async fn transfer(
    file_name: &str,
    data: Bytes,
    opts: &LoopbackConfig,
) -> Result<Bytes, Box<dyn std::error::Error>> {
    let config = opts.config.clone();
    let tamper = (opts.corrupt_ratio > 0.0).then(|| corrupting_tamper(opts.corrupt_ratio.min(1.0)));
    let (a, b) = memory_link_with(config.channel_count, tamper, None);

    let mut sender = Session::new(config.clone(), a.channel_set())?;
    let mut receiver = Session::new(config.clone(), b.channel_set())?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Result<Bytes, String>>();
    let complete_tx = done_tx.clone();
    receiver.on_complete(move |data: Bytes, name: &str| {
        info!("수신 완료 콜백: {} ({} bytes)", name, data.len());
        let _ = complete_tx.send(Ok(data));
    });
    let failed_tx = done_tx.clone();
    receiver.on_failed(move |e: &pcp::Error| {
        let _ = failed_tx.send(Err(e.to_string()));
    });
    receiver.on_progress(|sample| {
        info!(
            "수신 {:.1}% | {:.2} MB/s | ETA {:.1}s",
            sample.percentage,
            sample.speed / 1_000_000.0,
            sample.time_remaining
        );
    });
    sender.on_failed(move |e: &pcp::Error| {
        let _ = done_tx.send(Err(e.to_string()));
    });

    let MemoryEndpoint {
        channels: a_channels,
        inbox: a_inbox,
    } = a;
    let MemoryEndpoint {
        channels: b_channels,
        inbox: b_inbox,
    } = b;

    let receiving = tokio::spawn(async move {
        let result = receiver.run(b_inbox).await;
        (receiver, result)
    });

    let blob = Blob::new(file_name, "application/octet-stream", data, &config)?;
    sender.begin_send(blob).await?;
    info!("송신 통계: {}", sender.send_stats().summary());

    // 완료 이후 들어오는 재요청 처리
    let sending = tokio::spawn(async move {
        let result = sender.run(a_inbox).await;
        (sender, result)
    });

    let outcome = tokio::time::timeout(opts.timeout, done_rx.recv()).await;

    for channel in a_channels.iter().chain(b_channels.iter()) {
        channel.close();
    }
    let (receiver, _) = receiving.await?;
    let (sender, _) = sending.await?;

    info!("수신 통계: {}", receiver.receive_stats().summary());
    info!(
        "재전송: {} chunks, 채널별 분포: {:?}",
        sender.send_stats().retransmitted_chunks,
        sender.send_stats().chunk_distribution()
    );

    match outcome {
        Ok(Some(Ok(data))) => Ok(data),
        Ok(Some(Err(e))) => Err(e.into()),
        Ok(None) => Err("세션이 결과 없이 종료됨".into()),
        Err(_) => Err(format!("제한 시간 초과 ({:?})", opts.timeout).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = parse_args();
    opts.config.validate()?;

    info!("PCP Loopback starting...");
    info!("Channels: {}", opts.config.channel_count);
    info!("Chunk size: {} bytes", opts.config.chunk_size);
    info!("Corrupt ratio: {:.1}%", opts.corrupt_ratio * 100.0);

    // 전송할 데이터 준비
    let (file_name, data) = if let Some(path) = &opts.file_path {
        info!("Loading file: {:?}", path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blob".to_string());
        (name, Bytes::from(std::fs::read(path)?))
    } else {
        info!("Using test data ({}MB)", opts.size_mb);
        let mut data = vec![0u8; opts.size_mb * 1024 * 1024];
        rand::thread_rng().fill_bytes(&mut data);
        ("test-data.bin".to_string(), Bytes::from(data))
    };

    info!("Data size: {} bytes", data.len());

    let received = transfer(&file_name, data.clone(), &opts).await?;

    if received != data {
        return Err(format!(
            "검증 실패: 보낸 {} bytes, 받은 {} bytes",
            data.len(),
            received.len()
        )
        .into());
    }
    info!("검증 완료: {} bytes 일치", received.len());

    if let Some(path) = &opts.output_path {
        std::fs::write(path, &received)?;
        info!("Saved to: {:?}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(channels: usize, chunk_size: usize, corrupt_ratio: f64) -> LoopbackConfig {
        LoopbackConfig {
            corrupt_ratio,
            timeout: Duration::from_secs(30),
            config: Config {
                channel_count: channels,
                chunk_size,
                repair_interval_ms: 200,
                ..Config::default()
            },
            ..LoopbackConfig::default()
        }
    }

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let mut data = vec![0u8; 200_000];
        rand::thread_rng().fill_bytes(&mut data);
        let data = Bytes::from(data);

        let received = transfer("round.bin", data.clone(), &opts(3, 4096, 0.0))
            .await
            .unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_loopback_recovers_corruption() {
        let data: Bytes = (0..50_000u32).map(|i| (i % 241) as u8).collect::<Vec<u8>>().into();

        let received = transfer("corrupt.bin", data.clone(), &opts(4, 1000, 1.0))
            .await
            .unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_output_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.bin");
        let data = Bytes::from_static(b"parallel chunk protocol loopback");

        let received = transfer("small.bin", data.clone(), &opts(2, 8, 0.0))
            .await
            .unwrap();
        std::fs::write(&path, &received).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), data.as_ref());
    }
}
