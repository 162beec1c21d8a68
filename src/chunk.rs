//! 블롭, 청크, 청크 저장소
//!
//! - Blob: 송신측 원본 데이터 + 디스크립터
//! - Chunk: 인덱스로 식별되는 고정 크기 조각 (마지막만 짧을 수 있음)
//! - ChunkStore: 수신측 인덱스 → 페이로드 맵

use std::collections::HashMap;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::packet::{self, ChunkIndex};
use crate::{Config, Result};

/// 전송 대상 식별 정보
///
/// `file-metadata` 컨트롤 메시지의 본문이기도 하다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDescriptor {
    /// 논리 이름
    pub file_name: String,

    /// 전체 크기 (바이트)
    pub file_size: u64,

    /// 콘텐츠 종류 (MIME 등)
    pub file_type: String,

    /// 총 청크 수
    pub total_chunks: u32,
}

/// 송신측 원본 블롭
///
/// 세션 동안 유지되어 재전송 요청 시 같은 경로로 다시 자른다.
#[derive(Debug, Clone)]
pub struct Blob {
    descriptor: BlobDescriptor,
    data: Bytes,
    chunk_size: usize,
}

impl Blob {
    /// 새 블롭 생성
    ///
    /// 청크 수가 16비트 인덱스 폭을 넘으면 `Error::ChunkCountOverflow`.
    pub fn new(
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        data: Bytes,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let total_chunks = config.check_chunk_count(data.len())?;

        Ok(Self {
            descriptor: BlobDescriptor {
                file_name: file_name.into(),
                file_size: data.len() as u64,
                file_type: file_type.into(),
                total_chunks: total_chunks as u32,
            },
            data,
            chunk_size: config.chunk_size,
        })
    }

    pub fn descriptor(&self) -> &BlobDescriptor {
        &self.descriptor
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn total_chunks(&self) -> usize {
        self.descriptor.total_chunks as usize
    }

    /// 청크 바이트 범위 `[i*chunk_size, min((i+1)*chunk_size, size))`
    pub fn chunk_range(&self, index: ChunkIndex) -> Option<Range<usize>> {
        let index = index as usize;
        if index >= self.total_chunks() {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.data.len());
        Some(start..end)
    }

    /// 청크 페이로드 (복사 없는 슬라이스)
    pub fn chunk(&self, index: ChunkIndex) -> Option<Bytes> {
        self.chunk_range(index).map(|range| self.data.slice(range))
    }

    /// 인코딩된 청크 패킷
    ///
    /// 최초 전송과 재전송 모두 이 경로를 사용한다.
    pub fn encode_chunk(&self, index: ChunkIndex) -> Option<Bytes> {
        self.chunk_range(index)
            .map(|range| packet::encode(index, &self.data[range]))
    }
}

/// 수신측 청크 저장소
///
/// 체크섬을 통과한 청크만 들어온다.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkIndex, Bytes>,

    /// 저장된 페이로드 총 바이트
    bytes: u64,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 삽입 (같은 인덱스는 덮어쓰기)
    ///
    /// 새 인덱스였으면 true
    pub fn insert(&mut self, index: ChunkIndex, payload: Bytes) -> bool {
        let len = payload.len() as u64;
        match self.chunks.insert(index, payload) {
            Some(previous) => {
                self.bytes = self.bytes - previous.len() as u64 + len;
                false
            }
            None => {
                self.bytes += len;
                true
            }
        }
    }

    pub fn get(&self, index: ChunkIndex) -> Option<Bytes> {
        self.chunks.get(&index).cloned()
    }

    pub fn contains(&self, index: ChunkIndex) -> bool {
        self.chunks.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 저장된 바이트 수
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// `[0, total_chunks)` 중 누락된 인덱스
    pub fn missing_indices(&self, total_chunks: usize) -> Vec<ChunkIndex> {
        (0..total_chunks)
            .map(|i| i as ChunkIndex)
            .filter(|index| !self.chunks.contains_key(index))
            .collect()
    }

    /// 완료 여부
    pub fn is_complete(&self, total_chunks: usize) -> bool {
        self.chunks.len() == total_chunks
    }

    /// 인덱스 순서로 조립
    ///
    /// 누락 청크가 있으면 None
    pub fn assemble(&self, total_chunks: usize) -> Option<Bytes> {
        let mut data = BytesMut::with_capacity(self.bytes as usize);
        for i in 0..total_chunks {
            let chunk = self.chunks.get(&(i as ChunkIndex))?;
            data.extend_from_slice(chunk);
        }
        Some(data.freeze())
    }

    /// 저장소 비우기
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }
}
