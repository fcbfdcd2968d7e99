//! 전송 통계

use std::time::{Duration, Instant};

use crate::session::Direction;

/// 엔드포인트별 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 송신 패킷 수 (재전송, ACK 포함)
    pub packets_sent: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 송신 ACK 수
    pub acks_sent: u64,

    /// 재ACK한 중복/지난 패킷 수
    pub duplicates: u64,

    /// 디코딩 실패로 버린 데이터그램 수
    pub malformed: u64,

    /// 다른 주소에서 온 데이터그램 수
    pub foreign: u64,

    /// 대기 타임아웃 수
    pub timeouts: u64,

    /// 확인된 페이로드 바이트
    pub payload_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_sent: 0,
            retransmissions: 0,
            acks_sent: 0,
            duplicates: 0,
            malformed: 0,
            foreign: 0,
            timeouts: 0,
            payload_bytes: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmission_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }

    /// 통계 리셋
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} MB/s | Sent: {} | Retx: {} ({:.1}%) | Dups: {} | Malformed: {} | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.payload_bytes,
            self.throughput() / 1_000_000.0,
            self.packets_sent,
            self.retransmissions,
            self.retransmission_rate() * 100.0,
            self.duplicates,
            self.malformed,
            self.timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 성공한 세션 결과
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// 전송 방향
    pub direction: Direction,

    /// 확인된 DATA/FIN 패킷 수
    pub packets: u32,

    /// 전송된 파일 바이트
    pub bytes: u64,

    /// FIN의 시퀀스 번호
    pub final_sequence: u32,

    /// 엔드포인트 통계 스냅샷
    pub stats: TransferStats,
}

impl std::fmt::Display for TransferReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} bytes in {} packets ({})",
            self.direction,
            self.bytes,
            self.packets,
            self.stats.summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmission_rate() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmission_rate(), 0.0);

        stats.packets_sent = 8;
        stats.retransmissions = 2;
        assert!((stats.retransmission_rate() - 0.25).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.packets_sent, 0);
        assert!(stats.summary().contains("Retx: 0"));
    }
}
