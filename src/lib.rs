//! # PCP (Parallel Chunk Protocol)
//!
//! 순서 보장 메시지 채널 여러 개 위에서 동작하는 청크 전송 프로토콜
//!
//! ## 핵심 특징
//! - **병렬 채널**: 청크를 채널 셋에 라운드로빈으로 분배
//! - **체크섬 프레이밍**: 3바이트 헤더 (인덱스 + XOR 체크섬)
//! - **누락 재요청**: 빠진 인덱스만 골라 재전송, 재시도 한도 있음
//! - **백프레셔**: 채널 버퍼가 임계값 아래로 내려올 때까지 송신 대기
//! - **진행률 보고**: 처리율과 남은 시간 추정

pub mod channel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod flow;
pub mod message;
pub mod multipath;
pub mod observer;
pub mod packet;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod state;
pub mod stats;

pub use channel::{memory_link, memory_link_with, Channel, ChannelState, ChannelStatus, MemoryChannel};
pub use chunk::{Blob, BlobDescriptor, ChunkStore};
pub use config::Config;
pub use error::{Error, Result};
pub use flow::{FlowController, SendOutcome};
pub use message::{ControlMessage, WireMessage};
pub use multipath::ChannelSet;
pub use observer::Observers;
pub use packet::{ChunkIndex, ChunkPacket};
pub use progress::ProgressSample;
pub use receiver::Receiver;
pub use sender::Sender;
pub use session::Session;
pub use state::SessionState;
pub use stats::TransferStats;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// 기본 병렬 채널 수
pub const DEFAULT_CHANNEL_COUNT: usize = 4;
