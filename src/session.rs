//! 전송 세션 (stop-and-wait 상태 머신)
//!
//! 두 방향, 두 역할이 하나의 상태 머신을 공유함:
//! - 송신: 업로드하는 요청자, 다운로드를 제공하는 응답자
//! - 수신: 다운로드하는 요청자, 업로드를 받는 응답자
//!
//! ```text
//! AwaitingFirst ──첫 DATA 확인──▶ Transferring ──FIN──▶ Finalizing ──▶ Succeeded
//!       │                              │                    │
//!       └──────────────────────────────┴────────────────────┴──▶ Failed
//! ```
//!
//! 실패한 세션은 재개하지 않음. 전체 전송을 처음부터 다시 요청해야 함.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::endpoint::{Endpoint, Inbound};
use crate::packet::PacketType;
use crate::stats::TransferReport;
use crate::{Error, Result};

/// SYN 시퀀스 번호
pub const SYN_SEQUENCE: u32 = 0;

/// 첫 DATA/FIN 시퀀스 번호
pub const FIRST_DATA_SEQUENCE: u32 = 1;

const REASON_INTERRUPTED: &str = "Transfer interrupted";
const REASON_FINALIZE: &str = "Failed to finalize transfer";

/// 전송 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Send => f.write_str("sent"),
            Direction::Receive => f.write_str("received"),
        }
    }
}

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 아직 DATA가 확인되지 않음
    AwaitingFirst,

    /// DATA 교환 중
    Transferring,

    /// FIN 교환 중
    Finalizing,

    Succeeded,

    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// 한 방향 전송 세션
pub struct Session<'a> {
    endpoint: &'a mut Endpoint,
    direction: Direction,
    state: SessionState,

    /// 송신: 다음에 보낼 시퀀스, 수신: 기다리는 시퀀스
    seq: u32,

    /// 수신측 연속 타임아웃 수
    retries: u32,

    /// 확인된 DATA/FIN 수
    packets: u32,

    /// 확인된 파일 바이트
    bytes: u64,
}

impl<'a> Session<'a> {
    /// 송신 세션
    pub fn sender(endpoint: &'a mut Endpoint) -> Self {
        Self::new(endpoint, Direction::Send)
    }

    /// 수신 세션
    pub fn receiver(endpoint: &'a mut Endpoint) -> Self {
        Self::new(endpoint, Direction::Receive)
    }

    fn new(endpoint: &'a mut Endpoint, direction: Direction) -> Self {
        Self {
            endpoint,
            direction,
            state: SessionState::AwaitingFirst,
            seq: FIRST_DATA_SEQUENCE,
            retries: 0,
            packets: 0,
            bytes: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 현재 시퀀스 번호
    pub fn sequence_num(&self) -> u32 {
        self.seq
    }

    /// 확인된 파일 바이트
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            trace!("session {:?} -> {:?} (seq={})", self.state, next, self.seq);
            self.state = next;
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.seq = self.seq.checked_add(1).ok_or(Error::SequenceOverflow)?;
        Ok(())
    }

    fn report(&self) -> TransferReport {
        TransferReport {
            direction: self.direction,
            packets: self.packets,
            bytes: self.bytes,
            final_sequence: self.seq,
            stats: self.endpoint.stats().clone(),
        }
    }

    /// 세션 실패 처리
    ///
    /// 상대가 먼저 중단한 경우가 아니면 best-effort ERROR를 보냄.
    async fn fail(&mut self, err: Error) -> Error {
        warn!(
            "Transfer with {} failed at seq {}: {}",
            self.endpoint.peer(),
            self.seq,
            err
        );

        if !matches!(err, Error::PeerAbort(_)) {
            let finalizing = self.state == SessionState::Finalizing;
            let reason = if finalizing && self.direction == Direction::Send {
                REASON_FINALIZE
            } else {
                REASON_INTERRUPTED
            };
            self.endpoint.send_abort(self.seq, reason).await;
        }

        self.transition(SessionState::Failed);
        err
    }

    /// 소스를 청크로 나눠 DATA로 보내고 FIN으로 종료
    pub async fn send_from<R>(&mut self, source: &mut R) -> Result<TransferReport>
    where
        R: AsyncRead + Unpin,
    {
        debug_assert_eq!(self.direction, Direction::Send);
        info!("Sending to {}...", self.endpoint.peer());

        match self.send_loop(source).await {
            Ok(()) => {
                self.transition(SessionState::Succeeded);
                info!(
                    "Sent {} bytes in {} packets to {}",
                    self.bytes,
                    self.packets,
                    self.endpoint.peer()
                );
                Ok(self.report())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn send_loop<R>(&mut self, source: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; self.endpoint.config().chunk_size];

        loop {
            let len = read_chunk(source, &mut chunk).await?;
            if len == 0 {
                break;
            }

            self.endpoint
                .send_reliable(PacketType::Data, self.seq, chunk[..len].to_vec())
                .await?;

            self.transition(SessionState::Transferring);
            self.packets += 1;
            self.bytes += len as u64;
            self.endpoint.stats_mut().payload_bytes += len as u64;
            debug!("chunk {} acknowledged ({} bytes)", self.seq, len);

            self.advance()?;
        }

        self.transition(SessionState::Finalizing);
        self.endpoint
            .send_reliable(PacketType::Fin, self.seq, Bytes::new())
            .await?;
        self.packets += 1;
        Ok(())
    }

    /// DATA를 순서대로 받아 싱크에 쓰고 FIN에서 종료
    pub async fn receive_into<W>(&mut self, sink: &mut W) -> Result<TransferReport>
    where
        W: AsyncWrite + Unpin,
    {
        debug_assert_eq!(self.direction, Direction::Receive);
        info!("Receiving from {}...", self.endpoint.peer());

        match self.receive_loop(sink).await {
            Ok(()) => {
                self.transition(SessionState::Succeeded);
                info!(
                    "Received {} bytes in {} packets from {}",
                    self.bytes,
                    self.packets,
                    self.endpoint.peer()
                );
                Ok(self.report())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn receive_loop<W>(&mut self, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let timeout = self.endpoint.config().timeout();
        let max_retries = self.endpoint.config().max_retries;
        let mut deadline = Instant::now() + timeout;

        loop {
            let packet = match self.endpoint.recv_until(deadline).await? {
                Some(Inbound::Packet(packet)) => packet,
                Some(Inbound::Ignored) => continue,
                None => {
                    self.retries += 1;
                    if self.retries >= max_retries {
                        warn!("Max retries reached waiting for chunk {}", self.seq);
                        return Err(Error::RetryExhausted {
                            sequence_num: self.seq,
                            attempts: self.retries,
                        });
                    }

                    // 멈춘 송신자에게 마지막 확인 시퀀스를 다시 알려줌
                    if self.seq > FIRST_DATA_SEQUENCE {
                        warn!(
                            "Timeout waiting for chunk {}, re-acknowledging {}",
                            self.seq,
                            self.seq - 1
                        );
                        self.endpoint.send_ack(self.seq - 1).await?;
                    }
                    deadline = Instant::now() + timeout;
                    continue;
                }
            };
            deadline = Instant::now() + timeout;

            // ACK 자체는 확인 대상이 아님
            if !packet.packet_type.expects_ack() {
                continue;
            }

            if packet.packet_type == PacketType::Error {
                self.endpoint.send_ack(packet.sequence_num).await?;
                let reason = String::from_utf8_lossy(&packet.payload).into_owned();
                warn!("Received error from {}: {}", self.endpoint.peer(), reason);
                return Err(Error::PeerAbort(reason));
            }

            if packet.sequence_num < self.seq {
                // 상대가 우리 ACK를 잃고 재전송함
                trace!("duplicate {} seq={}", packet.packet_type, packet.sequence_num);
                self.endpoint.stats_mut().duplicates += 1;
                self.endpoint.send_ack(packet.sequence_num).await?;
                continue;
            }

            match packet.packet_type {
                PacketType::Data if packet.sequence_num == self.seq => {
                    sink.write_all(&packet.payload).await?;
                    self.endpoint.send_ack(self.seq).await?;

                    self.transition(SessionState::Transferring);
                    self.packets += 1;
                    self.bytes += packet.payload.len() as u64;
                    self.endpoint.stats_mut().payload_bytes += packet.payload.len() as u64;
                    self.retries = 0;
                    self.advance()?;
                }
                PacketType::Fin if packet.sequence_num == self.seq => {
                    self.transition(SessionState::Finalizing);
                    sink.flush().await?;
                    self.endpoint.send_ack(self.seq).await?;
                    self.packets += 1;
                    return Ok(());
                }
                _ => {
                    // 앞선 패킷 유실로 생긴 공백: 확인도 적용도 하지 않음
                    trace!(
                        "ignoring {} seq={} (expected {})",
                        packet.packet_type,
                        packet.sequence_num,
                        self.seq
                    );
                }
            }
        }
    }
}

/// EOF가 아니면 버퍼를 끝까지 채움
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_chunk_fills_across_short_reads() {
        let data: Vec<u8> = (0..10).collect();
        let (first, second) = data.split_at(3);
        let mut source = tokio::io::AsyncReadExt::chain(first, second);

        let mut buf = [0u8; 8];
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 8);
        assert_eq!(&buf[..], &data[..8]);
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 2);
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Succeeded.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Finalizing.is_terminal());
        assert!(!SessionState::AwaitingFirst.is_terminal());
    }
}
