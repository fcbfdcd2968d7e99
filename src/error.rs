//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// SWFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("파일 저장 실패: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("패킷이 너무 짧음: {len} bytes")]
    TooShort { len: usize },

    #[error("페이로드 길이 불일치: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("알 수 없는 패킷 타입: {0}")]
    UnknownPacketType(u8),

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("페이로드 초과: {len} bytes (최대 {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("상대방이 전송을 중단함: {0}")]
    PeerAbort(String),

    #[error("재시도 횟수 초과: seq={sequence_num}, attempts={attempts}")]
    RetryExhausted { sequence_num: u32, attempts: u32 },

    #[error("원본 파일 없음: {0}")]
    SourceMissing(PathBuf),

    #[error("유효하지 않은 요청: {0}")]
    InvalidRequest(String),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("시퀀스 번호 소진")]
    SequenceOverflow,
}

impl Error {
    /// 형식 오류 (짧은 데이터그램, 길이 불일치, 알 수 없는 타입)
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::TooShort { .. } | Error::LengthMismatch { .. } | Error::UnknownPacketType(_)
        )
    }

    /// 무결성 오류 (체크섬 불일치)
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Error::ChecksumMismatch { .. })
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
