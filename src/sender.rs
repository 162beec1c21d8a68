//! 송신 파이프라인
//!
//! - 메타데이터 → 청크 → 드레인 → 완료 순서로 진행
//! - 청크는 채널 셋에 라운드로빈 분배, 닫힌 채널은 건너뜀
//! - 원본 블롭은 세션 동안 유지하여 재요청 시 같은 인코딩 경로로 재전송

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::Blob;
use crate::flow::{FlowController, SendOutcome};
use crate::message::{ControlMessage, WireMessage};
use crate::multipath::{ChannelSet, CONTROL_CHANNEL};
use crate::observer::Observers;
use crate::packet::{ChunkIndex, HEADER_LEN};
use crate::progress::ProgressMeter;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 송신 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    Idle,
    AwaitingChannelsOpen,
    SendingMetadata,
    SendingChunks,
    Draining,
    SendingCompletion,
    Done,
    Failed,
}

/// 송신자
pub struct Sender {
    /// 설정
    config: Config,

    /// 채널 셋
    channels: ChannelSet,

    /// 백프레셔 게이트
    flow: FlowController,

    /// 재전송용 원본
    blob: Option<Blob>,

    /// 현재 단계
    phase: SenderPhase,

    /// 전송 통계
    stats: TransferStats,
}

impl Sender {
    /// 새 송신자 생성
    pub fn new(config: Config, channels: ChannelSet) -> Self {
        Self {
            flow: FlowController::new(config.low_water_threshold_bytes),
            stats: TransferStats::new(channels.len()),
            config,
            channels,
            blob: None,
            phase: SenderPhase::Idle,
        }
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn blob(&self) -> Option<&Blob> {
        self.blob.as_ref()
    }

    /// 실패 표시
    pub fn mark_failed(&mut self) {
        self.phase = SenderPhase::Failed;
    }

    /// 보유 데이터 해제
    pub fn reset(&mut self) {
        self.blob = None;
        self.phase = SenderPhase::Idle;
    }

    /// 채널이 하나라도 열릴 때까지 대기
    pub async fn await_channels(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.phase = SenderPhase::AwaitingChannelsOpen;
        self.channels
            .wait_any_open(self.config.open_timeout(), cancel)
            .await
    }

    /// 메타데이터 전송 (모든 청크보다 먼저)
    pub async fn send_metadata(&mut self, blob: Blob, cancel: &CancellationToken) -> Result<()> {
        self.phase = SenderPhase::SendingMetadata;
        self.stats = TransferStats::new(self.channels.len());

        let descriptor = blob.descriptor().clone();
        self.blob = Some(blob);

        info!(
            "전송 시작: {} ({} bytes, {} chunks, {} channels)",
            descriptor.file_name,
            descriptor.file_size,
            descriptor.total_chunks,
            self.channels.open_count()
        );

        self.send_control(&ControlMessage::FileMetadata(descriptor), cancel)
            .await
    }

    /// 모든 청크 전송
    pub async fn send_chunks(
        &mut self,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.phase = SenderPhase::SendingChunks;

        let blob = self.blob.clone().ok_or(Error::InvalidState {
            from: crate::SessionState::Idle,
            to: crate::SessionState::Active,
        })?;
        let mut meter = ProgressMeter::new(blob.descriptor(), self.config.progress_interval());
        let mut sent_bytes = 0u64;

        for i in 0..blob.total_chunks() {
            let index = i as ChunkIndex;
            let Some(packet) = blob.encode_chunk(index) else {
                continue;
            };
            let payload_len = packet.len() - HEADER_LEN;

            let channel = self.send_packet(i, packet, cancel).await?;
            self.stats.record_chunk(channel, payload_len);
            sent_bytes += payload_len as u64;

            if let Some(sample) = meter.sample(sent_bytes) {
                observers.progress(&sample);
            }
        }

        observers.progress(&meter.finish(sent_bytes));
        debug!("청크 전송 완료: {} chunks", blob.total_chunks());
        Ok(())
    }

    /// 모든 채널 버퍼가 빌 때까지 대기
    ///
    /// 완료 메시지가 청크 바이트보다 먼저 나가지 않게 한다.
    pub async fn drain(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.phase = SenderPhase::Draining;

        loop {
            if self.channels.open_count() == 0 {
                return Err(Error::ChannelUnavailable);
            }
            if self.channels.all_drained() {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                _ = tokio::time::sleep(self.config.drain_poll_interval()) => {}
            }
        }
    }

    /// 완료 메시지 전송
    pub async fn send_completion(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.phase = SenderPhase::SendingCompletion;
        self.send_control(&ControlMessage::FileComplete, cancel).await?;
        self.phase = SenderPhase::Done;

        info!("송신 완료: {}", self.stats.summary());
        Ok(())
    }

    /// 재요청 처리
    ///
    /// 요청된 인덱스를 원본에서 다시 잘라 컨트롤 채널로 재전송한다.
    pub async fn handle_repair_request(
        &mut self,
        indices: &[ChunkIndex],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(blob) = self.blob.clone() else {
            warn!("보유한 블롭 없음, 재요청 무시: {} chunks", indices.len());
            return Ok(());
        };

        info!(
            "재요청 수신: {} chunks ({})",
            indices.len(),
            blob.descriptor().file_name
        );

        for &index in indices {
            let Some(packet) = blob.encode_chunk(index) else {
                warn!("범위 밖 청크 재요청: index={}", index);
                continue;
            };
            let payload_len = packet.len() - HEADER_LEN;

            let channel = self.send_packet(CONTROL_CHANNEL, packet, cancel).await?;
            self.stats.record_chunk(channel, payload_len);
            self.stats.retransmitted_chunks += 1;
        }

        Ok(())
    }

    /// 패킷 하나를 `slot`에 해당하는 채널로 전송, 닫혔으면 다음 채널로
    ///
    /// 실제로 사용한 채널 인덱스 반환
    async fn send_packet(
        &mut self,
        slot: usize,
        packet: Bytes,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        for attempt in 0..self.channels.len() {
            let channel = self
                .channels
                .pick_for(slot + attempt)
                .cloned()
                .ok_or(Error::ChannelUnavailable)?;

            let message = WireMessage::Binary(packet.clone());
            match self.flow.send(channel.as_ref(), message, cancel).await? {
                SendOutcome::Sent => return Ok(channel.index()),
                SendOutcome::Dropped => {
                    self.stats.record_dropped(channel.index());
                    warn!(
                        "채널 {} 사용 불가, 남은 채널 {}개로 계속",
                        channel.index(),
                        self.channels.open_count()
                    );
                }
            }
        }

        Err(Error::ChannelUnavailable)
    }

    /// 컨트롤 메시지 전송
    async fn send_control(
        &mut self,
        message: &ControlMessage,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let wire = message.to_wire()?;

        for _ in 0..self.channels.len() {
            let channel = self
                .channels
                .control()
                .cloned()
                .ok_or(Error::ChannelUnavailable)?;

            match self.flow.send(channel.as_ref(), wire.clone(), cancel).await? {
                SendOutcome::Sent => {
                    debug!("컨트롤 전송: {} (채널 {})", message.kind(), channel.index());
                    return Ok(());
                }
                SendOutcome::Dropped => self.stats.record_dropped(channel.index()),
            }
        }

        Err(Error::ChannelUnavailable)
    }
}
