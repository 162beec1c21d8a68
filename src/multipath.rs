//! 멀티패스 채널 셋
//!
//! 여러 채널에 청크를 라운드로빈으로 분배한다. 채널 0은 컨트롤 채널로,
//! 메타데이터/완료/재요청 메시지는 여기로만 나간다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::{Error, Result};

/// 컨트롤 채널 인덱스
pub const CONTROL_CHANNEL: usize = 0;

/// 세션이 소유하는 순서 있는 채널 목록
#[derive(Clone)]
pub struct ChannelSet {
    channels: Vec<Arc<dyn Channel>>,
}

impl ChannelSet {
    pub fn new(channels: Vec<Arc<dyn Channel>>) -> Self {
        Self { channels }
    }

    /// 전체 채널 수
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn Channel>> {
        self.channels.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Channel>> {
        self.channels.iter()
    }

    /// 열린 채널 수
    pub fn open_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_open()).count()
    }

    /// 컨트롤 메시지용 채널
    ///
    /// 채널 0이 닫혔으면 첫 번째 열린 채널로 대체
    pub fn control(&self) -> Option<&Arc<dyn Channel>> {
        self.pick_for(CONTROL_CHANNEL)
    }

    /// `slot`번째 송신에 쓸 채널 (`slot mod n`, 닫힌 채널은 건너뜀)
    pub fn pick_for(&self, slot: usize) -> Option<&Arc<dyn Channel>> {
        let n = self.channels.len();
        (0..n)
            .map(|k| &self.channels[(slot + k) % n])
            .find(|c| c.is_open())
    }

    /// 열린 채널의 송신 버퍼가 모두 비었는지
    pub fn all_drained(&self) -> bool {
        self.channels
            .iter()
            .filter(|c| c.is_open())
            .all(|c| c.buffered_amount() == 0)
    }

    /// 열린 채널들의 버퍼 합계
    pub fn buffered_total(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| c.is_open())
            .map(|c| c.buffered_amount())
            .sum()
    }

    /// 채널이 하나라도 열릴 때까지 대기
    ///
    /// 모든 채널이 닫히거나 타임아웃이면 `Error::ChannelUnavailable`
    pub async fn wait_any_open(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.open_count() > 0 {
            return Ok(());
        }
        if self.channels.is_empty() {
            return Err(Error::ChannelUnavailable);
        }

        debug!("채널 오픈 대기: {} 채널", self.channels.len());

        let mut waiters = JoinSet::new();
        for channel in &self.channels {
            let mut status = channel.status();
            waiters.spawn(async move {
                status
                    .wait_for(|s| s.is_open() || s.is_closed())
                    .await
                    .map(|s| s.is_open())
                    .unwrap_or(false)
            });
        }

        let any_opened = async {
            while let Some(joined) = waiters.join_next().await {
                if matches!(joined, Ok(true)) {
                    return true;
                }
            }
            false
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Aborted),
            _ = tokio::time::sleep(timeout) => {
                warn!("채널 오픈 타임아웃: {:?}", timeout);
                Err(Error::ChannelUnavailable)
            }
            opened = any_opened => {
                if opened {
                    info!("채널 오픈: {}/{}", self.open_count(), self.channels.len());
                    Ok(())
                } else {
                    Err(Error::ChannelUnavailable)
                }
            }
        }
    }
}
