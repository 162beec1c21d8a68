//! 전송 통계

use std::time::Duration;

use tokio::time::Instant;

/// 채널별 통계
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    /// 채널 인덱스
    pub index: usize,

    /// 송수신 청크 수
    pub chunks: u64,

    /// 송수신 페이로드 바이트
    pub bytes: u64,

    /// 채널이 닫혀 버려진 송신 수
    pub dropped: u64,
}

/// 전체 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 총 페이로드 바이트
    pub total_bytes: u64,

    /// 총 청크 수 (재전송 포함)
    pub total_chunks: u64,

    /// 재전송 청크 수
    pub retransmitted_chunks: u64,

    /// 중복 수신 청크 수
    pub duplicate_chunks: u64,

    /// 체크섬 불일치로 버린 패킷 수
    pub corrupted_packets: u64,

    /// 헤더보다 짧아 버린 패킷 수
    pub undecodable_packets: u64,

    /// 파싱 실패한 컨트롤 메시지 수
    pub malformed_messages: u64,

    /// 재요청 횟수
    pub repair_requests: u64,

    /// 닫힌 채널로 인해 다른 채널로 돌린 송신 수
    pub degraded_sends: u64,

    /// 채널별 통계
    pub channel_stats: Vec<ChannelStats>,
}

impl TransferStats {
    pub fn new(channel_count: usize) -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
            total_chunks: 0,
            retransmitted_chunks: 0,
            duplicate_chunks: 0,
            corrupted_packets: 0,
            undecodable_packets: 0,
            malformed_messages: 0,
            repair_requests: 0,
            degraded_sends: 0,
            channel_stats: (0..channel_count)
                .map(|index| ChannelStats {
                    index,
                    ..ChannelStats::default()
                })
                .collect(),
        }
    }

    /// 청크 기록
    pub fn record_chunk(&mut self, channel: usize, bytes: usize) {
        self.total_chunks += 1;
        self.total_bytes += bytes as u64;

        if let Some(stat) = self.channel_stats.get_mut(channel) {
            stat.chunks += 1;
            stat.bytes += bytes as u64;
        }
    }

    /// 버려진 송신 기록
    pub fn record_dropped(&mut self, channel: usize) {
        self.degraded_sends += 1;
        if let Some(stat) = self.channel_stats.get_mut(channel) {
            stat.dropped += 1;
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 채널별 청크 분포
    pub fn chunk_distribution(&self) -> Vec<u64> {
        self.channel_stats.iter().map(|s| s.chunks).collect()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {} | Bytes: {} | Throughput: {:.2} MB/s | Retransmitted: {} | Corrupted: {} | Repairs: {} | Degraded: {}",
            self.elapsed().as_secs_f64(),
            self.total_chunks,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.retransmitted_chunks,
            self.corrupted_packets,
            self.repair_requests,
            self.degraded_sends,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(1)
    }
}
