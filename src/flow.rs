//! 채널별 백프레셔
//!
//! 채널 송신 버퍼가 임계값을 넘으면 드레인 알림이 올 때까지 송신자를 멈춘다.
//! 전송 속도보다 빠르게 쌓아 메모리가 무한히 늘어나는 것을 막는 유일한 지점이다.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::message::WireMessage;
use crate::{Error, Result};

/// 송신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 채널에 넘김
    Sent,

    /// 채널이 닫혀 버림 (치명적이지 않음)
    Dropped,
}

/// 백프레셔 게이트
#[derive(Debug, Clone)]
pub struct FlowController {
    low_water: usize,
}

impl FlowController {
    pub fn new(low_water_threshold_bytes: usize) -> Self {
        Self {
            low_water: low_water_threshold_bytes,
        }
    }

    pub fn low_water(&self) -> usize {
        self.low_water
    }

    /// 버퍼가 임계값 이하가 될 때까지 기다린 뒤 송신
    ///
    /// 대기 후 채널이 닫혀 있으면 경고만 남기고 `SendOutcome::Dropped`.
    /// 취소되면 `Error::Aborted`.
    pub async fn send(
        &self,
        channel: &dyn Channel,
        message: WireMessage,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome> {
        let mut status = channel.status();
        let buffered = status.borrow().buffered_amount;

        if buffered > self.low_water {
            debug!(
                "채널 {} 백프레셔: buffered={} > {}",
                channel.index(),
                buffered,
                self.low_water
            );

            let low_water = self.low_water;
            let drained = async {
                status
                    .wait_for(|s| s.buffered_amount <= low_water || !s.is_open())
                    .await
                    .is_ok()
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                _ = drained => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        if !channel.is_open() {
            warn!("채널 {} 닫힘, 송신 생략 ({} bytes)", channel.index(), message.len());
            return Ok(SendOutcome::Dropped);
        }

        match channel.send(message) {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) => {
                warn!("채널 {} 송신 실패: {}", channel.index(), e);
                Ok(SendOutcome::Dropped)
            }
        }
    }
}
