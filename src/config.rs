//! 프로토콜 설정

use std::time::Duration;

use crate::packet::MAX_CHUNKS;
use crate::{Error, Result, DEFAULT_CHANNEL_COUNT, DEFAULT_CHUNK_SIZE};

/// PCP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    /// 클수록 프레이밍 오버헤드는 줄고 호출 오버헤드는 늘어남
    pub chunk_size: usize,

    /// 병렬 채널 수
    pub channel_count: usize,

    /// 백프레셔 재개 지점 (바이트)
    /// 채널 버퍼가 이 값을 넘으면 송신을 멈추고, 이 값 이하로 내려오면 재개
    pub low_water_threshold_bytes: usize,

    /// 누락 청크 재요청 최대 횟수
    pub max_repair_retries: u32,

    /// 진행률 샘플링 간격 (밀리초)
    pub progress_sample_interval_ms: u64,

    /// 드레인 단계 폴링 간격 (밀리초)
    pub drain_poll_interval_ms: u64,

    /// 채널 오픈 대기 타임아웃 (밀리초)
    pub open_timeout_ms: u64,

    /// 재요청 후 재검사까지 대기 (밀리초)
    pub repair_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_count: DEFAULT_CHANNEL_COUNT,
            low_water_threshold_bytes: 1024 * 1024, // 1MB
            max_repair_retries: 3,
            progress_sample_interval_ms: 100,       // 100ms
            drain_poll_interval_ms: 10,
            open_timeout_ms: 10_000,                // 10초
            repair_interval_ms: 1_000,              // 1초
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 총 청크 수 계산 (`ceil(size / chunk_size)`)
    pub fn total_chunks(&self, size: usize) -> usize {
        size.div_ceil(self.chunk_size)
    }

    /// 청크 수가 인덱스 폭(16비트)에 들어가는지 확인
    pub fn check_chunk_count(&self, size: usize) -> Result<usize> {
        let total_chunks = self.total_chunks(size);
        if total_chunks > MAX_CHUNKS {
            return Err(Error::ChunkCountOverflow {
                total_chunks,
                max: MAX_CHUNKS,
            });
        }
        Ok(total_chunks)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.channel_count == 0 {
            return Err(Error::InvalidConfig("channel_count는 0보다 커야 함".into()));
        }
        if self.progress_sample_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "progress_sample_interval_ms는 0보다 커야 함".into(),
            ));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("drain_poll_interval_ms는 0보다 커야 함".into()));
        }
        if self.repair_interval_ms == 0 {
            return Err(Error::InvalidConfig("repair_interval_ms는 0보다 커야 함".into()));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_sample_interval_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn repair_interval(&self) -> Duration {
        Duration::from_millis(self.repair_interval_ms)
    }

    /// 저지연용 설정 (작은 청크, 낮은 버퍼)
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 16 * 1024,                  // 16KB
            channel_count: 2,
            low_water_threshold_bytes: 256 * 1024,  // 256KB
            max_repair_retries: 3,
            progress_sample_interval_ms: 100,
            drain_poll_interval_ms: 5,
            open_timeout_ms: 5_000,
            repair_interval_ms: 300,
        }
    }

    /// 고처리량용 설정
    pub fn high_throughput() -> Self {
        Self {
            chunk_size: 256 * 1024,                 // 256KB
            channel_count: 8,
            low_water_threshold_bytes: 4 * 1024 * 1024, // 4MB
            max_repair_retries: 3,
            progress_sample_interval_ms: 250,
            drain_poll_interval_ms: 10,
            open_timeout_ms: 10_000,
            repair_interval_ms: 1_000,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 32 * 1024,                  // 작은 청크
            channel_count: 4,
            low_water_threshold_bytes: 512 * 1024,
            max_repair_retries: 8,                  // 재요청 여유
            progress_sample_interval_ms: 200,
            drain_poll_interval_ms: 20,
            open_timeout_ms: 30_000,
            repair_interval_ms: 2_000,
        }
    }
}
