//! 수신 조립기
//!
//! - 채널 간 순서가 섞여 도착하는 청크를 인덱스로 저장
//! - 체크섬 불일치 패킷은 버리고 누락으로 취급
//! - 저장소가 가득 차거나 완료 메시지가 오면 조립 시도
//! - 누락이 있으면 제한된 횟수만큼 재요청

use std::collections::HashMap;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{BlobDescriptor, ChunkStore};
use crate::flow::{FlowController, SendOutcome};
use crate::message::ControlMessage;
use crate::multipath::{ChannelSet, CONTROL_CHANNEL};
use crate::observer::Observers;
use crate::packet::{ChunkIndex, ChunkPacket};
use crate::progress::ProgressMeter;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 수신 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    Idle,
    ExpectingMetadata,
    Receiving,
    RequestingRepair,
    Reconstructing,
    Delivered,
    Failed,
}

/// 조립 시도 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// 아직 진행 중 (청크 대기 또는 재요청 중)
    Pending,

    /// 이번 호출에서 전달 완료
    Delivered { file_name: String, size: usize },

    /// 이미 전달됨 (중복 트리거)
    AlreadyDelivered,
}

/// 수신자
pub struct Receiver {
    /// 설정
    config: Config,

    /// 재요청 송신용 채널 셋
    channels: ChannelSet,

    /// 백프레셔 게이트
    flow: FlowController,

    /// 현재 전송 디스크립터
    descriptor: Option<BlobDescriptor>,

    /// 청크 저장소
    store: ChunkStore,

    /// 메타데이터보다 먼저 도착한 청크 (인덱스 → 도착 채널, 페이로드)
    early: HashMap<ChunkIndex, (usize, Bytes)>,

    /// 재요청 횟수
    repair_retries: u32,

    /// 전달 1회 보장 플래그
    delivered: bool,

    /// 다음 재검사 시각
    repair_deadline: Option<Instant>,

    /// 현재 단계
    phase: ReceiverPhase,

    /// 진행률 측정기
    progress: Option<ProgressMeter>,

    /// 수신 통계
    stats: TransferStats,
}

impl Receiver {
    /// 새 수신자 생성
    pub fn new(config: Config, channels: ChannelSet) -> Self {
        Self {
            flow: FlowController::new(config.low_water_threshold_bytes),
            stats: TransferStats::new(channels.len()),
            config,
            channels,
            descriptor: None,
            store: ChunkStore::new(),
            early: HashMap::new(),
            repair_retries: 0,
            delivered: false,
            repair_deadline: None,
            phase: ReceiverPhase::Idle,
            progress: None,
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    pub fn descriptor(&self) -> Option<&BlobDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn repair_retries(&self) -> u32 {
        self.repair_retries
    }

    /// 재검사 예약 시각
    pub fn repair_deadline(&self) -> Option<Instant> {
        self.repair_deadline
    }

    /// 메타데이터 대기 시작
    pub fn listen(&mut self) {
        if self.phase == ReceiverPhase::Idle {
            self.phase = ReceiverPhase::ExpectingMetadata;
        }
    }

    /// 보유 데이터 해제, 재검사 해제
    pub fn reset(&mut self) {
        self.store.clear();
        self.early.clear();
        self.descriptor = None;
        self.repair_deadline = None;
        self.progress = None;
        self.phase = ReceiverPhase::Idle;
    }

    /// 메타데이터 수신
    ///
    /// 선도착 청크만으로 저장소가 다 차면 (빈 블롭 포함) 완료 메시지를 기다리지
    /// 않고 바로 조립한다.
    pub async fn on_metadata(
        &mut self,
        descriptor: BlobDescriptor,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<Assembly> {
        info!(
            "수신 시작: {} ({} bytes, {} chunks)",
            descriptor.file_name, descriptor.file_size, descriptor.total_chunks
        );

        self.store.clear();
        self.repair_retries = 0;
        self.delivered = false;
        self.repair_deadline = None;
        self.stats = TransferStats::new(self.channels.len());
        self.progress = Some(ProgressMeter::new(
            &descriptor,
            self.config.progress_interval(),
        ));

        // 메타데이터보다 먼저 다른 채널로 도착한 청크 반영
        let total = descriptor.total_chunks as usize;
        let early = std::mem::take(&mut self.early);
        let buffered = early.len();
        for (index, (channel, payload)) in early {
            if (index as usize) < total {
                self.stats.record_chunk(channel, payload.len());
                self.store.insert(index, payload);
            }
        }
        if buffered > 0 {
            debug!("선도착 청크 {}/{}개 반영", self.store.len(), buffered);
        }

        self.descriptor = Some(descriptor);
        self.phase = ReceiverPhase::Receiving;

        if self.store.is_complete(total) {
            return self.attempt_reconstruction(observers, cancel).await;
        }
        Ok(Assembly::Pending)
    }

    /// 청크 패킷 수신
    pub async fn on_chunk(
        &mut self,
        channel: usize,
        packet: ChunkPacket,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<Assembly> {
        if let Err(e) = packet.verify() {
            warn!("채널 {} 패킷 폐기: {}", channel, e);
            self.stats.corrupted_packets += 1;
            return Ok(Assembly::Pending);
        }

        let total = match (self.phase, &self.descriptor) {
            (ReceiverPhase::Receiving | ReceiverPhase::RequestingRepair, Some(descriptor)) => {
                descriptor.total_chunks as usize
            }
            (ReceiverPhase::Idle | ReceiverPhase::ExpectingMetadata, _) => {
                self.early.insert(packet.index, (channel, packet.payload));
                return Ok(Assembly::Pending);
            }
            // 다음 전송의 청크가 메타데이터를 앞지른 경우. 컨트롤 채널의 청크는
            // 이전 전송의 재전송이고, 새 전송 청크는 그 채널에서 메타데이터 뒤에 온다.
            (ReceiverPhase::Delivered | ReceiverPhase::Failed, _)
                if channel != CONTROL_CHANNEL =>
            {
                self.early.insert(packet.index, (channel, packet.payload));
                return Ok(Assembly::Pending);
            }
            _ => {
                debug!(
                    "진행 중인 전송 없음, 청크 폐기: index={} ({:?})",
                    packet.index, self.phase
                );
                return Ok(Assembly::Pending);
            }
        };

        if packet.index as usize >= total {
            warn!("범위 밖 청크 폐기: index={} (total {})", packet.index, total);
            return Ok(Assembly::Pending);
        }

        let len = packet.payload.len();
        if self.store.insert(packet.index, packet.payload) {
            self.stats.record_chunk(channel, len);
        } else {
            self.stats.duplicate_chunks += 1;
        }

        let received = self.store.bytes();
        if let Some(sample) = self.progress.as_mut().and_then(|p| p.sample(received)) {
            observers.progress(&sample);
        }

        if self.store.is_complete(total) {
            return self.attempt_reconstruction(observers, cancel).await;
        }

        Ok(Assembly::Pending)
    }

    /// 완료 메시지 수신
    pub async fn on_complete_signal(
        &mut self,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<Assembly> {
        if self.descriptor.is_none() && !self.delivered {
            warn!("메타데이터 없이 완료 메시지 수신, 무시");
            return Ok(Assembly::Pending);
        }
        self.attempt_reconstruction(observers, cancel).await
    }

    /// 재검사 시각 도달
    pub async fn on_repair_timer(
        &mut self,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<Assembly> {
        self.repair_deadline = None;
        if self.descriptor.is_none() {
            return Ok(Assembly::Pending);
        }
        debug!("재검사: {} 번째 시도 후", self.repair_retries);
        self.attempt_reconstruction(observers, cancel).await
    }

    /// 조립 시도
    ///
    /// 모두 모였으면 순서대로 조립해 한 번만 전달한다. 모자라면 재요청 한도 안에서
    /// 누락 인덱스를 요청하고, 한도를 넘으면 `Error::IncompleteTransfer`.
    pub async fn attempt_reconstruction(
        &mut self,
        observers: &mut Observers,
        cancel: &CancellationToken,
    ) -> Result<Assembly> {
        if self.delivered {
            return Ok(Assembly::AlreadyDelivered);
        }
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(Assembly::Pending);
        };
        let total = descriptor.total_chunks as usize;

        let assembled = if self.store.is_complete(total) {
            self.store.assemble(total)
        } else {
            None
        };

        if let Some(data) = assembled {
            self.phase = ReceiverPhase::Reconstructing;

            if data.len() as u64 != descriptor.file_size {
                warn!(
                    "조립 크기 불일치: {} bytes (선언 {} bytes)",
                    data.len(),
                    descriptor.file_size
                );
            }

            self.delivered = true;
            self.repair_deadline = None;
            if let Some(progress) = self.progress.as_mut() {
                observers.progress(&progress.finish(data.len() as u64));
            }
            self.store.clear();
            self.phase = ReceiverPhase::Delivered;

            info!(
                "수신 완료: {} ({} bytes) | {}",
                descriptor.file_name,
                data.len(),
                self.stats.summary()
            );

            let size = data.len();
            observers.complete(data, &descriptor.file_name);
            return Ok(Assembly::Delivered {
                file_name: descriptor.file_name,
                size,
            });
        }

        let missing = self.store.missing_indices(total);

        if self.repair_retries >= self.config.max_repair_retries {
            warn!(
                "재요청 한도 초과: {} ({} chunks 누락, {}회 시도)",
                descriptor.file_name,
                missing.len(),
                self.repair_retries
            );
            self.store.clear();
            self.descriptor = None;
            self.repair_deadline = None;
            self.phase = ReceiverPhase::Failed;
            return Err(Error::IncompleteTransfer {
                missing: missing.len(),
            });
        }

        self.repair_retries += 1;
        if !missing.is_empty() {
            self.request_missing(missing, cancel).await?;
        }
        self.repair_deadline = Some(Instant::now() + self.config.repair_interval());

        Ok(Assembly::Pending)
    }

    /// 누락 청크 재요청 전송
    async fn request_missing(
        &mut self,
        indices: Vec<ChunkIndex>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.phase = ReceiverPhase::RequestingRepair;
        info!(
            "누락 청크 재요청: {} chunks ({}/{})",
            indices.len(),
            self.repair_retries,
            self.config.max_repair_retries
        );

        let wire = ControlMessage::RequestMissingChunks { indices }.to_wire()?;
        let channel = self
            .channels
            .control()
            .cloned()
            .ok_or(Error::ChannelUnavailable)?;

        match self.flow.send(channel.as_ref(), wire, cancel).await? {
            SendOutcome::Sent => self.stats.repair_requests += 1,
            SendOutcome::Dropped => self.stats.record_dropped(channel.index()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use rand::seq::SliceRandom;

    use crate::channel::{Channel, MemoryChannel};
    use crate::chunk::Blob;
    use crate::message::Inbound;
    use crate::packet;

    struct Fixture {
        upstream: Arc<MemoryChannel>,
        receiver: Receiver,
        observers: Observers,
        delivered: Arc<Mutex<Vec<(Bytes, String)>>>,
        cancel: CancellationToken,
    }

    fn fixture(config: Config) -> Fixture {
        let channels: Vec<_> = (0..3).map(MemoryChannel::new).collect();
        channels.iter().for_each(|c| c.open());
        let upstream = channels[0].clone();
        let set = ChannelSet::new(
            channels
                .into_iter()
                .map(|c| c as Arc<dyn Channel>)
                .collect(),
        );

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let mut observers = Observers::new();
        observers.set_complete(Box::new(move |data: Bytes, name: &str| {
            sink.lock().push((data, name.to_string()));
        }));

        let mut receiver = Receiver::new(config, set);
        receiver.listen();

        Fixture {
            upstream,
            receiver,
            observers,
            delivered,
            cancel: CancellationToken::new(),
        }
    }

    fn blob(len: usize, config: &Config) -> Blob {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        Blob::new("data.bin", "application/octet-stream", Bytes::from(data), config).unwrap()
    }

    fn packet_for(blob: &Blob, index: ChunkIndex) -> ChunkPacket {
        packet::decode(blob.encode_chunk(index).unwrap()).unwrap()
    }

    fn upstream_requests(channel: &MemoryChannel) -> Vec<Vec<ChunkIndex>> {
        std::iter::from_fn(|| channel.pop_outbound())
            .filter_map(|m| match Inbound::parse(m) {
                Ok(Inbound::Control(ControlMessage::RequestMissingChunks { indices })) => {
                    Some(indices)
                }
                _ => None,
            })
            .collect()
    }

    impl Fixture {
        async fn feed(&mut self, packet: ChunkPacket) -> Result<Assembly> {
            self.receiver
                .on_chunk(1, packet, &mut self.observers, &self.cancel)
                .await
        }

        async fn metadata(&mut self, descriptor: BlobDescriptor) -> Result<Assembly> {
            self.receiver
                .on_metadata(descriptor, &mut self.observers, &self.cancel)
                .await
        }

        async fn feed_on(&mut self, channel: usize, packet: ChunkPacket) -> Result<Assembly> {
            self.receiver
                .on_chunk(channel, packet, &mut self.observers, &self.cancel)
                .await
        }

        async fn complete(&mut self) -> Result<Assembly> {
            self.receiver
                .on_complete_signal(&mut self.observers, &self.cancel)
                .await
        }
    }

    #[tokio::test]
    async fn test_assembles_in_any_order() {
        let config = Config {
            chunk_size: 100,
            ..Config::default()
        };
        let blob = blob(2_345, &config);

        let mut order: Vec<ChunkIndex> = (0..blob.total_chunks() as ChunkIndex).collect();
        order.shuffle(&mut rand::thread_rng());

        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        let mut last = Assembly::Pending;
        for index in order {
            last = f.feed(packet_for(&blob, index)).await.unwrap();
        }

        assert!(matches!(last, Assembly::Delivered { size: 2_345, .. }));
        let expected: Vec<u8> = (0..2_345).map(|i| (i * 7 % 256) as u8).collect();
        let delivered = f.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.as_ref(), expected.as_slice());
        assert_eq!(delivered[0].1, "data.bin");
    }

    #[tokio::test]
    async fn test_delivers_exactly_once() {
        let config = Config {
            chunk_size: 10,
            ..Config::default()
        };
        let blob = blob(30, &config);
        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        // 완료 메시지가 마지막 청크보다 먼저 도착
        f.feed(packet_for(&blob, 0)).await.unwrap();
        f.feed(packet_for(&blob, 1)).await.unwrap();
        assert_eq!(f.complete().await.unwrap(), Assembly::Pending);

        let result = f.feed(packet_for(&blob, 2)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { .. }));

        assert_eq!(f.complete().await.unwrap(), Assembly::AlreadyDelivered);
        f.feed(packet_for(&blob, 2)).await.unwrap();
        assert_eq!(f.delivered.lock().len(), 1);
        assert_eq!(f.receiver.phase(), ReceiverPhase::Delivered);
    }

    #[tokio::test]
    async fn test_corrupted_packet_becomes_missing() {
        let config = Config {
            chunk_size: 4,
            ..Config::default()
        };
        let blob = blob(12, &config);
        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        let mut raw = blob.encode_chunk(1).unwrap().to_vec();
        raw[packet::HEADER_LEN] ^= 0x01;
        let corrupted = packet::decode(Bytes::from(raw)).unwrap();

        f.feed(packet_for(&blob, 0)).await.unwrap();
        f.feed(corrupted).await.unwrap();
        f.feed(packet_for(&blob, 2)).await.unwrap();

        assert_eq!(f.receiver.stats().corrupted_packets, 1);
        assert!(!f.receiver.store().contains(1));

        f.complete().await.unwrap();
        assert_eq!(upstream_requests(&f.upstream), vec![vec![1]]);

        let result = f.feed(packet_for(&blob, 1)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_gap_repair_cycle() {
        let config = Config {
            chunk_size: 10,
            max_repair_retries: 3,
            ..Config::default()
        };
        let blob = blob(80, &config);
        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        for index in 0..8 {
            if index != 2 && index != 5 {
                f.feed(packet_for(&blob, index)).await.unwrap();
            }
        }
        assert_eq!(f.complete().await.unwrap(), Assembly::Pending);
        assert_eq!(f.receiver.phase(), ReceiverPhase::RequestingRepair);
        assert!(f.receiver.repair_deadline().is_some());
        assert_eq!(upstream_requests(&f.upstream), vec![vec![2, 5]]);

        f.feed(packet_for(&blob, 5)).await.unwrap();
        let result = f.feed(packet_for(&blob, 2)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 80, .. }));
        assert!(f.receiver.repair_deadline().is_none());
        assert_eq!(f.receiver.repair_retries(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let config = Config {
            chunk_size: 10,
            max_repair_retries: 2,
            ..Config::default()
        };
        let blob = blob(80, &config);
        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        for index in [0, 1, 3, 4, 6, 7] {
            f.feed(packet_for(&blob, index)).await.unwrap();
        }

        assert_eq!(f.complete().await.unwrap(), Assembly::Pending);
        let again = f
            .receiver
            .on_repair_timer(&mut f.observers, &f.cancel)
            .await
            .unwrap();
        assert_eq!(again, Assembly::Pending);

        let result = f
            .receiver
            .on_repair_timer(&mut f.observers, &f.cancel)
            .await;
        assert!(matches!(result, Err(Error::IncompleteTransfer { missing: 2 })));
        assert_eq!(f.receiver.phase(), ReceiverPhase::Failed);
        assert!(f.receiver.store().is_empty());
        assert!(f.delivered.lock().is_empty());

        // 한도 이후에는 재요청 없음
        assert_eq!(upstream_requests(&f.upstream).len(), 2);
    }

    #[tokio::test]
    async fn test_chunks_before_metadata() {
        let config = Config {
            chunk_size: 10,
            ..Config::default()
        };
        let blob = blob(25, &config);
        let mut f = fixture(config);

        // 다른 채널로 메타데이터보다 먼저 도착
        f.feed(packet_for(&blob, 2)).await.unwrap();
        f.feed(packet_for(&blob, 1)).await.unwrap();
        f.metadata(blob.descriptor().clone()).await.unwrap();
        assert_eq!(f.receiver.store().len(), 2);

        let result = f.feed(packet_for(&blob, 0)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 25, .. }));
    }

    #[tokio::test]
    async fn test_new_metadata_resets_state() {
        let config = Config {
            chunk_size: 10,
            max_repair_retries: 1,
            ..Config::default()
        };
        let first = blob(30, &config);
        let mut f = fixture(config.clone());
        f.metadata(first.descriptor().clone()).await.unwrap();
        f.feed(packet_for(&first, 0)).await.unwrap();
        f.complete().await.unwrap();
        assert_eq!(f.receiver.repair_retries(), 1);

        let second = blob(20, &config);
        f.metadata(second.descriptor().clone()).await.unwrap();
        assert!(f.receiver.store().is_empty());
        assert_eq!(f.receiver.repair_retries(), 0);
        assert!(f.receiver.repair_deadline().is_none());

        f.feed(packet_for(&second, 0)).await.unwrap();
        let result = f.feed(packet_for(&second, 1)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 20, .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_index_ignored() {
        let config = Config {
            chunk_size: 10,
            ..Config::default()
        };
        let blob = blob(20, &config);
        let mut f = fixture(config);
        f.metadata(blob.descriptor().clone()).await.unwrap();

        let stray = packet::decode(packet::encode(9, b"stray")).unwrap();
        f.feed(stray).await.unwrap();
        assert!(f.receiver.store().is_empty());
    }

    #[tokio::test]
    async fn test_empty_blob_delivered_on_metadata() {
        let config = Config::default();
        let blob = blob(0, &config);
        let mut f = fixture(config);

        let result = f.metadata(blob.descriptor().clone()).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 0, .. }));

        let delivered = f.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_all_chunks_before_metadata() {
        let config = Config {
            chunk_size: 10,
            ..Config::default()
        };
        let blob = blob(20, &config);
        let mut f = fixture(config);

        f.feed_on(2, packet_for(&blob, 1)).await.unwrap();
        f.feed_on(1, packet_for(&blob, 0)).await.unwrap();

        // 완료 메시지 없이도 메타데이터 시점에 전달
        let result = f.metadata(blob.descriptor().clone()).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 20, .. }));
        assert_eq!(f.delivered.lock().len(), 1);
        assert_eq!(f.complete().await.unwrap(), Assembly::AlreadyDelivered);
    }

    #[tokio::test]
    async fn test_early_chunks_keep_channel_stats() {
        let config = Config {
            chunk_size: 10,
            ..Config::default()
        };
        let blob = blob(40, &config);
        let mut f = fixture(config);

        f.feed_on(1, packet_for(&blob, 1)).await.unwrap();
        f.feed_on(2, packet_for(&blob, 2)).await.unwrap();
        f.metadata(blob.descriptor().clone()).await.unwrap();
        f.feed_on(0, packet_for(&blob, 0)).await.unwrap();
        f.feed_on(1, packet_for(&blob, 3)).await.unwrap();

        let stats = f.receiver.stats();
        assert_eq!(stats.chunk_distribution(), vec![1, 2, 1]);
        assert_eq!(stats.chunk_distribution().iter().sum::<u64>(), stats.total_chunks);
        assert_eq!(stats.total_bytes, 40);
    }

    #[tokio::test]
    async fn test_next_transfer_chunk_before_metadata() {
        let config = Config {
            chunk_size: 10,
            max_repair_retries: 0,
            ..Config::default()
        };
        let first = blob(20, &config);
        let second = Blob::new(
            "second.bin",
            "",
            Bytes::from((0..30u8).rev().collect::<Vec<u8>>()),
            &config,
        )
        .unwrap();
        let mut f = fixture(config);

        f.metadata(first.descriptor().clone()).await.unwrap();
        f.feed_on(0, packet_for(&first, 0)).await.unwrap();
        f.feed_on(1, packet_for(&first, 1)).await.unwrap();
        assert_eq!(f.receiver.phase(), ReceiverPhase::Delivered);

        // 이전 전송의 늦은 재전송 (컨트롤 채널)은 다음 전송에 섞이지 않음
        f.feed_on(0, packet_for(&first, 1)).await.unwrap();
        // 다음 전송 청크가 다른 채널로 메타데이터를 앞지름
        f.feed_on(2, packet_for(&second, 1)).await.unwrap();

        f.metadata(second.descriptor().clone()).await.unwrap();
        assert_eq!(f.receiver.store().len(), 1);
        assert!(f.receiver.store().contains(1));

        f.feed_on(0, packet_for(&second, 0)).await.unwrap();
        let result = f.feed_on(1, packet_for(&second, 2)).await.unwrap();
        assert!(matches!(result, Assembly::Delivered { size: 30, .. }));

        let delivered = f.delivered.lock();
        assert_eq!(delivered.len(), 2);
        let expected: Vec<u8> = (0..30u8).rev().collect();
        assert_eq!(delivered[1].0.as_ref(), expected.as_slice());
    }
}
