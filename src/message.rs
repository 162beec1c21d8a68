//! 프로토콜 메시지 정의
//!
//! 전송 메시지 단위에서 컨트롤과 청크를 구분한다.
//! - 컨트롤 메시지: 항상 텍스트 프레임 (JSON, `type` 태그)
//! - 청크 패킷: 항상 바이너리 프레임 ([`crate::packet`])

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::chunk::BlobDescriptor;
use crate::packet::{self, ChunkIndex, ChunkPacket};
use crate::{Error, Result};

/// 채널 위를 오가는 메시지 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// 텍스트 프레임 (컨트롤 메시지)
    Text(String),

    /// 바이너리 프레임 (청크 패킷)
    Binary(Bytes),
}

impl WireMessage {
    /// 채널 버퍼에서 차지하는 바이트 수
    pub fn len(&self) -> usize {
        match self {
            WireMessage::Text(text) => text.len(),
            WireMessage::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_control(&self) -> bool {
        matches!(self, WireMessage::Text(_))
    }
}

/// 컨트롤 메시지
///
/// 지정된 컨트롤 채널(채널 0)로만 전송된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// 전송 시작 알림, 모든 청크보다 먼저 전송
    FileMetadata(BlobDescriptor),

    /// 모든 청크 송신 완료
    FileComplete,

    /// 누락 청크 재전송 요청 (수신측 → 송신측)
    RequestMissingChunks { indices: Vec<ChunkIndex> },
}

impl ControlMessage {
    /// 텍스트 프레임으로 직렬화
    pub fn to_wire(&self) -> Result<WireMessage> {
        Ok(WireMessage::Text(serde_json::to_string(self)?))
    }

    /// 텍스트 프레임에서 역직렬화
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::MalformedControlMessage(e.to_string()))
    }

    /// 로그용 이름
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::FileMetadata(_) => "file-metadata",
            ControlMessage::FileComplete => "file-complete",
            ControlMessage::RequestMissingChunks { .. } => "request-missing-chunks",
        }
    }
}

/// 수신 메시지 분류 결과
#[derive(Debug, Clone)]
pub enum Inbound {
    Control(ControlMessage),
    Chunk(ChunkPacket),
}

impl Inbound {
    /// 프레임 종류로 컨트롤/청크를 구분해 파싱
    pub fn parse(message: WireMessage) -> Result<Self> {
        match message {
            WireMessage::Text(text) => ControlMessage::from_text(&text).map(Inbound::Control),
            WireMessage::Binary(bytes) => packet::decode(bytes).map(Inbound::Chunk),
        }
    }
}
