//! 에러 타입 정의

use thiserror::Error;

use crate::state::SessionState;

/// PCP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 직렬화 에러: {0}")]
    Json(#[from] serde_json::Error),

    #[error("사용 가능한 채널 없음")]
    ChannelUnavailable,

    #[error("체크섬 불일치: index={index}, expected {expected:02X}, got {got:02X}")]
    ChecksumMismatch { index: u16, expected: u8, got: u8 },

    #[error("전송 미완료: 재요청 한도 초과, missing_chunks={missing}")]
    IncompleteTransfer { missing: usize },

    #[error("잘못된 컨트롤 메시지: {0}")]
    MalformedControlMessage(String),

    #[error("패킷 디코드 실패: {len} bytes (헤더 {} bytes 미만)", crate::packet::HEADER_LEN)]
    Decode { len: usize },

    #[error("청크 수 초과: {total_chunks} > {max}")]
    ChunkCountOverflow { total_chunks: usize, max: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("유효하지 않은 상태 전이: {from:?} -> {to:?}")]
    InvalidState { from: SessionState, to: SessionState },

    #[error("전송 중단됨")]
    Aborted,
}

impl Error {
    /// 세션 전체를 종료시키는 에러인지 여부
    ///
    /// 패킷 단위 에러(체크섬, 디코드, 컨트롤 메시지 파싱)는 로컬에서 복구되고
    /// 재요청 사이클로 흡수된다.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ChannelUnavailable | Error::IncompleteTransfer { .. } | Error::Aborted
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
