//! 프로토콜 설정
//!
//! 모든 값은 고정이며 협상되지 않음. 양쪽이 호환되는 값을 써야 불필요한
//! 타임아웃이 생기지 않음.

use std::time::Duration;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, HEADER_SIZE};

/// 업로드 수신 파일 접두사 (응답자측)
pub const DEFAULT_UPLOAD_PREFIX: &str = "server_";

/// 다운로드 수신 파일 접두사 (요청자측)
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "client_";

/// SWFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// DATA 패킷당 페이로드 크기 (바이트)
    pub chunk_size: usize,

    /// 시도당 응답 대기 타임아웃 (밀리초)
    pub timeout_ms: u64,

    /// 최대 시도 횟수
    pub max_retries: u32,

    /// 응답자가 업로드를 저장할 때 붙이는 접두사
    pub upload_prefix: String,

    /// 요청자가 다운로드를 저장할 때 붙이는 접두사
    pub download_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE, // 4KB
            timeout_ms: 2000,               // 2초
            max_retries: 5,
            upload_prefix: DEFAULT_UPLOAD_PREFIX.to_string(),
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 버퍼 크기 (청크 + 헤더)
    pub fn recv_buffer_size(&self) -> usize {
        self.chunk_size + HEADER_SIZE
    }

    /// 시도당 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "chunk_size는 1..={} 범위여야 함: {}",
                u16::MAX,
                self.chunk_size
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout_ms는 0일 수 없음".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries는 0일 수 없음".into()));
        }
        Ok(())
    }

    /// 저지연 LAN용 설정
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 8192,
            timeout_ms: 200,
            max_retries: 5,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 1024,  // 작은 청크
            timeout_ms: 1000,
            max_retries: 10,
            ..Self::default()
        }
    }

    /// 프로필 이름으로 설정 선택
    pub fn from_profile(name: &str) -> Result<Self> {
        match name {
            "default" => Ok(Self::default()),
            "low-latency" => Ok(Self::low_latency()),
            "unstable" => Ok(Self::unstable_network()),
            other => Err(Error::InvalidConfig(format!("알 수 없는 프로필: {}", other))),
        }
    }
}
