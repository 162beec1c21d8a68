//! 청크 패킷 코덱
//!
//! 바이너리 프레임 구조 (리틀 엔디안):
//!
//! ```text
//! byte 0-1 : chunk index (u16)
//! byte 2   : payload XOR 체크섬
//! byte 3.. : payload
//! ```
//!
//! 체크섬은 단순 XOR 폴드로, 우발적 손상을 잡기 위한 것이며 변조 방지는 하지 않는다.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 청크 인덱스 (16비트)
pub type ChunkIndex = u16;

/// 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 3;

/// 인덱스 폭으로 표현 가능한 최대 청크 수
pub const MAX_CHUNKS: usize = ChunkIndex::MAX as usize + 1;

/// 바이트 단위 XOR 체크섬
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc ^ b)
}

/// 청크 패킷 인코딩
pub fn encode(index: ChunkIndex, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u16_le(index);
    buf.put_u8(checksum(payload));
    buf.put_slice(payload);
    buf.freeze()
}

/// 디코드된 청크 패킷
#[derive(Debug, Clone)]
pub struct ChunkPacket {
    /// 청크 인덱스
    pub index: ChunkIndex,

    /// 헤더에 실린 체크섬
    pub checksum: u8,

    /// 페이로드 (원본 버퍼의 슬라이스)
    pub payload: Bytes,
}

impl ChunkPacket {
    /// 체크섬 검증
    pub fn is_valid(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// 체크섬 검증 후 에러로 변환
    pub fn verify(&self) -> Result<()> {
        let got = checksum(&self.payload);
        if got != self.checksum {
            return Err(Error::ChecksumMismatch {
                index: self.index,
                expected: self.checksum,
                got,
            });
        }
        Ok(())
    }
}

/// 청크 패킷 디코딩
///
/// 헤더보다 짧은 버퍼는 `Error::Decode`. 체크섬 불일치는 에러가 아니라
/// `ChunkPacket::is_valid()`로 확인한다.
pub fn decode(bytes: Bytes) -> Result<ChunkPacket> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Decode { len: bytes.len() });
    }

    let index = u16::from_le_bytes([bytes[0], bytes[1]]);
    let checksum = bytes[2];
    let payload = bytes.slice(HEADER_LEN..);

    Ok(ChunkPacket {
        index,
        checksum,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = encode(0x0102, &[0x0F, 0xF0, 0x01]);

        assert_eq!(packet.len(), HEADER_LEN + 3);
        // 리틀 엔디안 인덱스
        assert_eq!(packet[0], 0x02);
        assert_eq!(packet[1], 0x01);
        assert_eq!(packet[2], 0x0F ^ 0xF0 ^ 0x01);
        assert_eq!(&packet[HEADER_LEN..], &[0x0F, 0xF0, 0x01]);
    }

    #[test]
    fn test_encode_decode() {
        let payload: Vec<u8> = (0..=255).collect();
        let packet = decode(encode(4242, &payload)).unwrap();

        assert_eq!(packet.index, 4242);
        assert!(packet.is_valid());
        assert!(packet.verify().is_ok());
        assert_eq!(packet.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_empty_payload() {
        let packet = decode(encode(7, &[])).unwrap();
        assert_eq!(packet.index, 7);
        assert!(packet.payload.is_empty());
        assert!(packet.is_valid());
    }

    #[test]
    fn test_short_buffer_is_decode_error() {
        for len in 0..HEADER_LEN {
            let result = decode(Bytes::from(vec![0u8; len]));
            assert!(matches!(result, Err(Error::Decode { len: l }) if l == len));
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let payload: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(37)).collect();
        let encoded = encode(1, &payload);

        for byte in HEADER_LEN..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = encoded.to_vec();
                corrupted[byte] ^= 1 << bit;

                let packet = decode(Bytes::from(corrupted)).unwrap();
                assert!(!packet.is_valid(), "byte {} bit {} 미검출", byte, bit);
                assert!(matches!(
                    packet.verify(),
                    Err(Error::ChecksumMismatch { index: 1, .. })
                ));
            }
        }
    }

    #[test]
    fn test_max_index() {
        let packet = decode(encode(u16::MAX, b"last")).unwrap();
        assert_eq!(packet.index, u16::MAX);
        assert_eq!(MAX_CHUNKS, 65536);
    }
}
