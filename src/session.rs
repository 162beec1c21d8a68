//! 전송 세션 (한쪽 엔드포인트)
//!
//! 채널 셋 하나를 소유하고 송신 파이프라인과 수신 조립기를 함께 구동한다.
//! 수신 메시지, 재검사 타이머, 취소를 하나의 루프에서 처리한다.

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Inbox;
use crate::chunk::Blob;
use crate::message::{ControlMessage, Inbound, WireMessage};
use crate::multipath::ChannelSet;
use crate::observer::Observers;
use crate::progress::ProgressSample;
use crate::receiver::{Assembly, Receiver};
use crate::sender::Sender;
use crate::state::SessionState;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 전송 세션
pub struct Session {
    config: Config,
    channels: ChannelSet,
    state: SessionState,
    sender: Sender,
    receiver: Receiver,
    observers: Observers,
    cancel: CancellationToken,
}

impl Session {
    /// 새 세션 생성
    pub fn new(config: Config, channels: ChannelSet) -> Result<Self> {
        config.validate()?;
        if channels.is_empty() {
            return Err(Error::ChannelUnavailable);
        }
        if channels.len() != config.channel_count {
            return Err(Error::InvalidConfig(format!(
                "채널 수 불일치: channel_count={}, 채널 셋 {}개",
                config.channel_count,
                channels.len()
            )));
        }

        let sender = Sender::new(config.clone(), channels.clone());
        let mut receiver = Receiver::new(config.clone(), channels.clone());
        receiver.listen();

        Ok(Self {
            config,
            channels,
            state: SessionState::Idle,
            sender,
            receiver,
            observers: Observers::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// 송신 통계
    pub fn send_stats(&self) -> &TransferStats {
        self.sender.stats()
    }

    /// 수신 통계
    pub fn receive_stats(&self) -> &TransferStats {
        self.receiver.stats()
    }

    /// 외부 중단용 토큰
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn on_progress(&mut self, callback: impl FnMut(&ProgressSample) + Send + 'static) {
        self.observers.set_progress(Box::new(callback));
    }

    pub fn on_complete(&mut self, callback: impl FnMut(Bytes, &str) + Send + 'static) {
        self.observers.set_complete(Box::new(callback));
    }

    pub fn on_failed(&mut self, callback: impl FnMut(&Error) + Send + 'static) {
        self.observers.set_failed(Box::new(callback));
    }

    /// 블롭 송신
    ///
    /// 채널 대기 → 메타데이터 → 청크 → 드레인 → 완료 메시지 순서로 진행한다.
    /// 치명적 에러면 세션은 Failed로 전이하고 에러를 돌려준다.
    pub async fn begin_send(&mut self, blob: Blob) -> Result<()> {
        self.set_state(SessionState::Negotiating)?;

        match self.run_send(blob).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run_send(&mut self, blob: Blob) -> Result<()> {
        let cancel = self.cancel.clone();

        self.sender.await_channels(&cancel).await?;
        self.set_state(SessionState::Active)?;

        self.sender.send_metadata(blob, &cancel).await?;
        self.sender.send_chunks(&mut self.observers, &cancel).await?;

        self.set_state(SessionState::Draining)?;
        self.sender.drain(&cancel).await?;
        self.sender.send_completion(&cancel).await?;

        self.set_state(SessionState::Complete)
    }

    /// 수신 메시지 처리
    ///
    /// 패킷 단위 에러는 로그만 남기고 `Ok`. 세션을 끝내는 에러만 반환한다.
    pub async fn on_packet(&mut self, channel: usize, message: WireMessage) -> Result<()> {
        if self.state.is_terminal() {
            debug!("종료된 세션, 메시지 폐기: 채널 {} ({:?})", channel, self.state);
            return Ok(());
        }

        let inbound = match Inbound::parse(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("채널 {} 메시지 폐기: {}", channel, e);
                let stats = self.receiver.stats_mut();
                match e {
                    Error::Decode { .. } => stats.undecodable_packets += 1,
                    _ => stats.malformed_messages += 1,
                }
                return Ok(());
            }
        };

        let cancel = self.cancel.clone();
        let result = match inbound {
            Inbound::Control(ControlMessage::FileMetadata(descriptor)) => {
                if let Err(e) = self.set_state(SessionState::Active) {
                    warn!("메타데이터 무시: {}", e);
                    return Ok(());
                }
                self.receiver
                    .on_metadata(descriptor, &mut self.observers, &cancel)
                    .await
            }
            Inbound::Control(ControlMessage::FileComplete) => {
                self.receiver
                    .on_complete_signal(&mut self.observers, &cancel)
                    .await
            }
            Inbound::Control(ControlMessage::RequestMissingChunks { indices }) => self
                .sender
                .handle_repair_request(&indices, &cancel)
                .await
                .map(|()| Assembly::Pending),
            Inbound::Chunk(packet) => {
                self.receiver
                    .on_chunk(channel, packet, &mut self.observers, &cancel)
                    .await
            }
        };

        self.settle(result)
    }

    /// 재검사 시각 도달
    pub async fn on_repair_timer(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let cancel = self.cancel.clone();
        let result = self
            .receiver
            .on_repair_timer(&mut self.observers, &cancel)
            .await;
        self.settle(result)
    }

    /// 수신 루프
    ///
    /// 수신함이 닫히거나 취소되거나 세션이 종료 상태가 되면 끝난다.
    pub async fn run(&mut self, mut inbox: Inbox) -> Result<()> {
        let cancel = self.cancel.clone();

        loop {
            if self.state.is_terminal() {
                return Ok(());
            }

            let deadline = self.receiver.repair_deadline();

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.shutdown();
                    return Ok(());
                }
                received = inbox.recv() => match received {
                    Some((channel, message)) => self.on_packet(channel, message).await?,
                    None => {
                        debug!("수신함 닫힘, 세션 루프 종료");
                        return Ok(());
                    }
                },
                _ = repair_timer(deadline) => self.on_repair_timer().await?,
            }
        }
    }

    /// 세션 중단
    ///
    /// 보유한 청크와 블롭을 해제하고 재검사를 멈춘다. 이후 패킷은 받지 않는다.
    pub fn abort(&mut self) {
        self.cancel.cancel();
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.state != SessionState::Aborted {
            info!("세션 중단 ({:?})", self.state);
        }
        self.sender.reset();
        self.receiver.reset();
        self.state = SessionState::Aborted;
    }

    /// 조립 결과 반영
    fn settle(&mut self, result: Result<Assembly>) -> Result<()> {
        match result {
            Ok(Assembly::Delivered { .. }) => self.set_state(SessionState::Complete),
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(self.fail(e)),
            Err(e) => {
                warn!("패킷 처리 실패 (계속 진행): {}", e);
                Ok(())
            }
        }
    }

    /// 치명적 에러 처리
    fn fail(&mut self, error: Error) -> Error {
        if matches!(error, Error::Aborted) {
            self.shutdown();
            return error;
        }

        warn!("전송 실패: {}", error);
        self.sender.reset();
        self.sender.mark_failed();
        self.receiver.reset();
        if let Ok(next) = self.state.transition(SessionState::Failed) {
            self.state = next;
        }
        self.observers.failed(&error);
        error
    }

    fn set_state(&mut self, next: SessionState) -> Result<()> {
        self.state = self.state.transition(next)?;
        Ok(())
    }
}

async fn repair_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
