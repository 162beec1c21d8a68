//! 진행률 계산
//!
//! 바이트/시간 샘플을 속도와 남은 시간으로 변환한다. 송신/수신 양쪽에서 공용.

use std::time::Duration;

use tokio::time::Instant;

use crate::chunk::BlobDescriptor;

/// 진행률 샘플 (다음 샘플이 나오면 대체됨)
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub file_name: String,
    pub file_size: u64,
    pub bytes_transferred: u64,

    /// 0.0 ~ 100.0
    pub percentage: f64,

    /// bytes/sec
    pub speed: f64,

    /// 남은 시간 (초), 속도를 모르면 0
    pub time_remaining: f64,
}

/// (시각, 누적 바이트) 측정점
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pub at: Instant,
    pub bytes: u64,
}

/// 두 측정점으로 샘플 계산
///
/// 경과 시간은 최소 `min_interval`로 간주해 0으로 나누지 않는다.
pub fn compute_sample(
    file_name: &str,
    file_size: u64,
    previous: Mark,
    current: Mark,
    min_interval: Duration,
) -> ProgressSample {
    let elapsed = current
        .at
        .saturating_duration_since(previous.at)
        .max(min_interval)
        .max(Duration::from_millis(1));
    let delta = current.bytes.saturating_sub(previous.bytes);
    let speed = delta as f64 / elapsed.as_secs_f64();

    let percentage = if file_size == 0 {
        100.0
    } else {
        (current.bytes as f64 * 100.0 / file_size as f64).min(100.0)
    };

    let remaining = file_size.saturating_sub(current.bytes);
    let time_remaining = if speed > 0.0 {
        remaining as f64 / speed
    } else {
        0.0
    };

    ProgressSample {
        file_name: file_name.to_string(),
        file_size,
        bytes_transferred: current.bytes,
        percentage,
        speed,
        time_remaining,
    }
}

/// 샘플링 간격으로 제한된 진행률 측정기
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    file_name: String,
    file_size: u64,
    interval: Duration,
    last: Mark,
}

impl ProgressMeter {
    pub fn new(descriptor: &BlobDescriptor, interval: Duration) -> Self {
        Self::starting_at(descriptor, interval, Instant::now())
    }

    pub fn starting_at(descriptor: &BlobDescriptor, interval: Duration, at: Instant) -> Self {
        Self {
            file_name: descriptor.file_name.clone(),
            file_size: descriptor.file_size,
            interval,
            last: Mark { at, bytes: 0 },
        }
    }

    /// 간격이 지났으면 샘플 생성
    pub fn sample(&mut self, bytes: u64) -> Option<ProgressSample> {
        self.sample_at(bytes, Instant::now())
    }

    pub fn sample_at(&mut self, bytes: u64, now: Instant) -> Option<ProgressSample> {
        if now.saturating_duration_since(self.last.at) < self.interval {
            return None;
        }
        Some(self.force_at(bytes, now))
    }

    /// 간격과 무관하게 샘플 생성 (완료 시점)
    pub fn finish(&mut self, bytes: u64) -> ProgressSample {
        self.force_at(bytes, Instant::now())
    }

    fn force_at(&mut self, bytes: u64, now: Instant) -> ProgressSample {
        let current = Mark { at: now, bytes };
        let sample = compute_sample(
            &self.file_name,
            self.file_size,
            self.last,
            current,
            self.interval,
        );
        self.last = current;
        sample
    }
}
