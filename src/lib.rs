//! # SWFT (Stop-and-Wait File Transfer)
//!
//! UDP 기반 stop-and-wait 신뢰 전송 파일 프로토콜
//!
//! ## 핵심 특징
//! - **고정 헤더 + CRC-32**: 헤더와 페이로드 전체 무결성 검증
//! - **Stop-and-wait ARQ**: 미확인 패킷은 항상 하나, 타임아웃 시 재전송
//! - **중복/역순 억제**: 시퀀스 번호 기반으로 중복 DATA는 재ACK만, 적용하지 않음
//! - **세션 수명주기**: SYN → DATA* → FIN, 실패 시 ERROR로 중단 통보
//! - **순차 처리**: 응답자는 한 번에 한 세션만 처리
//!
//! ```text
//!  Requester ──SYN "UPLOAD|a.txt"──▶ Responder
//!            ◀────────ACK 0─────────
//!            ──DATA 1──▶ ◀──ACK 1──
//!            ──DATA n──▶ ◀──ACK n──
//!            ──FIN n+1─▶ ◀─ACK n+1─
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod request;
pub mod requester;
pub mod responder;
pub mod session;
pub mod simulator;
pub mod stats;
pub mod storage;

pub use config::Config;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use packet::{Packet, PacketType};
pub use request::{Action, Request};
pub use requester::Requester;
pub use responder::{Responder, Served};
pub use session::{Direction, Session, SessionState};
pub use stats::{TransferReport, TransferStats};

/// 고정 헤더 크기 (바이트)
/// type(1) + sequence_num(4) + payload_length(2) + checksum(4)
pub const HEADER_SIZE: usize = 11;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// 기본 응답자 포트
pub const DEFAULT_PORT: u16 = 9999;
