//! 패킷 와이어 포맷
//!
//! 모든 정수 필드는 big-endian.
//!
//! ```text
//!  0        1                 5        7                11
//! +--------+-----------------+--------+-----------------+-----------...
//! |  type  |  sequence_num   | length |    checksum     |  payload
//! +--------+-----------------+--------+-----------------+-----------...
//! ```
//!
//! checksum은 CRC-32(type ‖ sequence_num ‖ length ‖ payload).

use bytes::Bytes;

use crate::{Error, Result, HEADER_SIZE};

// 헤더 필드 오프셋
const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_LEN: usize = 5;
const OFF_CHECKSUM: usize = 7;

/// 패킷 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// 세션 시작 요청
    Syn = 0,

    /// 시퀀스 번호 확인 응답
    Ack = 1,

    /// 파일 청크
    Data = 2,

    /// 스트림 종료
    Fin = 3,

    /// 중단 통보 (페이로드는 UTF-8 사유)
    Error = 4,
}

impl PacketType {
    /// 상대가 ACK를 기다리는 요청성 패킷인지
    pub fn expects_ack(self) -> bool {
        !matches!(self, PacketType::Ack)
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::Syn => "SYN",
            PacketType::Ack => "ACK",
            PacketType::Data => "DATA",
            PacketType::Fin => "FIN",
            PacketType::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Syn),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::Data),
            3 => Ok(PacketType::Fin),
            4 => Ok(PacketType::Error),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 디코딩된 패킷
///
/// 체크섬은 와이어에만 존재하며 디코딩 시 검증 후 버려짐.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub sequence_num: u32,
    pub payload: Bytes,
}

impl Packet {
    /// 새 패킷 생성
    pub fn new(packet_type: PacketType, sequence_num: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            sequence_num,
            payload: payload.into(),
        }
    }

    /// 빈 페이로드의 ACK
    pub fn ack(sequence_num: u32) -> Self {
        Self::new(PacketType::Ack, sequence_num, Bytes::new())
    }

    /// 페이로드 길이
    pub fn payload_length(&self) -> usize {
        self.payload.len()
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.payload.len();
        if len > u16::MAX as usize {
            return Err(Error::PayloadTooLarge {
                len,
                max: u16::MAX as usize,
            });
        }

        let mut buf = vec![0u8; HEADER_SIZE + len];
        buf[OFF_TYPE] = self.packet_type as u8;
        buf[OFF_SEQ..OFF_LEN].copy_from_slice(&self.sequence_num.to_be_bytes());
        buf[OFF_LEN..OFF_CHECKSUM].copy_from_slice(&(len as u16).to_be_bytes());
        buf[HEADER_SIZE..].copy_from_slice(&self.payload);

        let crc = checksum(&buf[..OFF_CHECKSUM], &buf[HEADER_SIZE..]);
        buf[OFF_CHECKSUM..HEADER_SIZE].copy_from_slice(&crc.to_be_bytes());

        Ok(buf)
    }

    /// 바이트에서 역직렬화
    ///
    /// 체크섬은 받은 바이트 그대로 계산하므로 헤더/페이로드 어디든 비트가
    /// 바뀌면 길이나 타입 검사 전에 [`Error::ChecksumMismatch`]가 됨.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::TooShort { len: bytes.len() });
        }

        let got = u32::from_be_bytes([
            bytes[OFF_CHECKSUM],
            bytes[OFF_CHECKSUM + 1],
            bytes[OFF_CHECKSUM + 2],
            bytes[OFF_CHECKSUM + 3],
        ]);
        let expected = checksum(&bytes[..OFF_CHECKSUM], &bytes[HEADER_SIZE..]);
        if expected != got {
            return Err(Error::ChecksumMismatch { expected, got });
        }

        let declared = u16::from_be_bytes([bytes[OFF_LEN], bytes[OFF_LEN + 1]]) as usize;
        let actual = bytes.len() - HEADER_SIZE;
        if declared != actual {
            return Err(Error::LengthMismatch { declared, actual });
        }

        let packet_type = PacketType::try_from(bytes[OFF_TYPE])?;
        let sequence_num = u32::from_be_bytes([
            bytes[OFF_SEQ],
            bytes[OFF_SEQ + 1],
            bytes[OFF_SEQ + 2],
            bytes[OFF_SEQ + 3],
        ]);

        Ok(Self {
            packet_type,
            sequence_num,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }
}

/// CRC-32 over header fields (체크섬 제외) + payload
fn checksum(header_fields: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_fields);
    hasher.update(payload);
    hasher.finalize()
}
