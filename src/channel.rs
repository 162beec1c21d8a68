//! 전송 채널 추상화
//!
//! 채널은 순서를 보장하는 메시지 단위 양방향 전송로다. 연결 수립은 외부에서
//! 담당하고, 여기서는 상태와 송신 버퍼 크기만 관찰한다.
//!
//! 버퍼가 줄어들 때마다 `watch` 값이 갱신되며, 이것이 "임계값 이하로 드레인됨"
//! 알림 역할을 한다.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::WireMessage;
use crate::{Error, Result};

/// 채널 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// 관찰 가능한 채널 상태 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ChannelState,

    /// 아직 전송로로 빠져나가지 않은 바이트
    pub buffered_amount: usize,
}

impl ChannelStatus {
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// 다시 열릴 수 없는 상태
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ChannelState::Closing | ChannelState::Closed)
    }
}

/// 전송 채널
pub trait Channel: Send + Sync {
    /// 채널 셋 내 위치
    fn index(&self) -> usize;

    /// 메시지를 전송로에 넘긴다 (대기하지 않음)
    ///
    /// 닫힌 채널이면 `Error::ChannelUnavailable`
    fn send(&self, message: WireMessage) -> Result<()>;

    /// 상태 구독
    fn status(&self) -> watch::Receiver<ChannelStatus>;

    /// 현재 상태
    fn current(&self) -> ChannelStatus {
        let status = self.status();
        let current = *status.borrow();
        current
    }

    fn is_open(&self) -> bool {
        self.current().is_open()
    }

    fn buffered_amount(&self) -> usize {
        self.current().buffered_amount
    }
}

/// 인프로세스 채널
///
/// 보낸 메시지는 꺼내갈 때까지 송신 버퍼에 남아 `buffered_amount`에 잡힌다.
/// 테스트와 루프백 데모에서 사용.
pub struct MemoryChannel {
    index: usize,
    status: watch::Sender<ChannelStatus>,
    outbound: Mutex<VecDeque<WireMessage>>,
    ready: Notify,
}

impl MemoryChannel {
    /// 새 채널 생성 (Connecting 상태)
    pub fn new(index: usize) -> Arc<Self> {
        let (status, _) = watch::channel(ChannelStatus {
            state: ChannelState::Connecting,
            buffered_amount: 0,
        });

        Arc::new(Self {
            index,
            status,
            outbound: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
        })
    }

    /// 채널 열기
    pub fn open(&self) {
        self.status.send_modify(|s| {
            if s.state == ChannelState::Connecting {
                s.state = ChannelState::Open;
            }
        });
    }

    /// 채널 닫기 (버퍼 폐기)
    pub fn close(&self) {
        self.outbound.lock().clear();
        self.status.send_modify(|s| {
            s.state = ChannelState::Closed;
            s.buffered_amount = 0;
        });
        self.ready.notify_one();
        debug!("채널 {} 닫힘", self.index);
    }

    /// 송신 버퍼에서 메시지 하나 꺼내기
    pub fn pop_outbound(&self) -> Option<WireMessage> {
        let message = self.outbound.lock().pop_front()?;
        let len = message.len();
        self.status
            .send_modify(|s| s.buffered_amount = s.buffered_amount.saturating_sub(len));
        Some(message)
    }

    /// 다음 메시지 대기, 닫히면 None
    pub async fn next_outbound(&self) -> Option<WireMessage> {
        loop {
            let notified = self.ready.notified();
            if let Some(message) = self.pop_outbound() {
                return Some(message);
            }
            if self.status.borrow().is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// 송신 버퍼에 남은 메시지 수
    pub fn queued(&self) -> usize {
        self.outbound.lock().len()
    }
}

impl Channel for MemoryChannel {
    fn index(&self) -> usize {
        self.index
    }

    fn send(&self, message: WireMessage) -> Result<()> {
        if !self.status.borrow().is_open() {
            return Err(Error::ChannelUnavailable);
        }

        let len = message.len();
        self.outbound.lock().push_back(message);
        self.status.send_modify(|s| s.buffered_amount += len);
        self.ready.notify_one();
        Ok(())
    }

    fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }
}

/// 수신 메시지 (채널 인덱스, 메시지)
pub type Inbox = mpsc::Receiver<(usize, WireMessage)>;

/// 펌프 중간에서 메시지를 변조/폐기하는 훅
///
/// None을 반환하면 메시지를 버린다.
pub type Tamper = Arc<dyn Fn(usize, WireMessage) -> Option<WireMessage> + Send + Sync>;

/// 채널의 송신 버퍼를 상대편 수신함으로 옮기는 태스크
pub fn spawn_pump(
    channel: Arc<MemoryChannel>,
    inbox: mpsc::Sender<(usize, WireMessage)>,
    tamper: Option<Tamper>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let index = channel.index();
        while let Some(message) = channel.next_outbound().await {
            let message = match &tamper {
                Some(tamper) => match (tamper.as_ref())(index, message) {
                    Some(message) => message,
                    None => continue,
                },
                None => message,
            };

            if inbox.send((index, message)).await.is_err() {
                break;
            }
        }
        debug!("채널 {} 펌프 종료", index);
    })
}

/// 링크 한쪽 끝
pub struct MemoryEndpoint {
    /// 이쪽에서 보내는 채널들
    pub channels: Vec<Arc<MemoryChannel>>,

    /// 상대편이 보낸 메시지 수신함
    pub inbox: Inbox,
}

impl MemoryEndpoint {
    /// `ChannelSet`으로 변환
    pub fn channel_set(&self) -> crate::multipath::ChannelSet {
        crate::multipath::ChannelSet::new(
            self.channels
                .iter()
                .map(|c| c.clone() as Arc<dyn Channel>)
                .collect(),
        )
    }

    /// 모든 채널 닫기
    pub fn close_all(&self) {
        for channel in &self.channels {
            channel.close();
        }
    }
}

/// 메시지 수신함 용량
const INBOX_CAPACITY: usize = 1024;

/// 두 엔드포인트를 `count`개의 열린 채널로 연결
pub fn memory_link(count: usize) -> (MemoryEndpoint, MemoryEndpoint) {
    memory_link_with(count, None, None)
}

/// 방향별 변조 훅을 지정해 연결 (a → b, b → a)
pub fn memory_link_with(
    count: usize,
    a_to_b: Option<Tamper>,
    b_to_a: Option<Tamper>,
) -> (MemoryEndpoint, MemoryEndpoint) {
    let (a_tx, a_inbox) = mpsc::channel(INBOX_CAPACITY);
    let (b_tx, b_inbox) = mpsc::channel(INBOX_CAPACITY);

    let a_channels: Vec<_> = (0..count).map(MemoryChannel::new).collect();
    let b_channels: Vec<_> = (0..count).map(MemoryChannel::new).collect();

    for channel in &a_channels {
        spawn_pump(channel.clone(), b_tx.clone(), a_to_b.clone());
        channel.open();
    }
    for channel in &b_channels {
        spawn_pump(channel.clone(), a_tx.clone(), b_to_a.clone());
        channel.open();
    }

    (
        MemoryEndpoint {
            channels: a_channels,
            inbox: a_inbox,
        },
        MemoryEndpoint {
            channels: b_channels,
            inbox: b_inbox,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_buffered_amount_tracking() {
        let channel = MemoryChannel::new(0);
        assert!(matches!(
            channel.send(WireMessage::Text("x".into())),
            Err(Error::ChannelUnavailable)
        ));

        channel.open();
        channel.send(WireMessage::Binary(Bytes::from(vec![0u8; 10]))).unwrap();
        channel.send(WireMessage::Text("hello".into())).unwrap();
        assert_eq!(channel.buffered_amount(), 15);
        assert_eq!(channel.queued(), 2);

        assert!(matches!(channel.pop_outbound(), Some(WireMessage::Binary(_))));
        assert_eq!(channel.buffered_amount(), 5);

        channel.close();
        assert_eq!(channel.buffered_amount(), 0);
        assert!(channel.pop_outbound().is_none());
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_memory_link_preserves_order() {
        let (a, mut b) = memory_link(2);

        for i in 0..5u8 {
            a.channels[1]
                .send(WireMessage::Binary(Bytes::from(vec![i])))
                .unwrap();
        }

        for i in 0..5u8 {
            let (index, message) = b.inbox.recv().await.unwrap();
            assert_eq!(index, 1);
            assert_eq!(message, WireMessage::Binary(Bytes::from(vec![i])));
        }
    }

    #[tokio::test]
    async fn test_tamper_drops_messages() {
        let drop_binary: Tamper = Arc::new(|_, message| match message {
            WireMessage::Binary(_) => None,
            other => Some(other),
        });
        let (a, mut b) = memory_link_with(1, Some(drop_binary), None);

        a.channels[0]
            .send(WireMessage::Binary(Bytes::from_static(b"lost")))
            .unwrap();
        a.channels[0].send(WireMessage::Text("kept".into())).unwrap();

        let (_, message) = b.inbox.recv().await.unwrap();
        assert_eq!(message, WireMessage::Text("kept".into()));
    }
}
