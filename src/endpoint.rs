//! 엔드포인트 (소켓 + 고정 피어 + 신뢰 송신)
//!
//! - 피어 주소는 생성 시 고정되며 바뀌지 않음
//! - 다른 주소에서 온 데이터그램은 에러가 아니라 무시
//! - 타임아웃 규칙: 대기 데드라인은 (재)전송 시점에 정해지고, 무시된
//!   데이터그램(다른 주소, 디코딩 실패, 시퀀스 불일치)은 데드라인을 늘리지도
//!   시도를 소모하지도 않음. 데드라인 만료만 시도 하나를 소모함.
//! - 더 낮은 시퀀스의 패킷은 기본적으로 버림. 예외는 첫 패킷(시퀀스 1)을
//!   보내는 중 아직 어떤 ACK도 받지 못했을 때의 SYN 재전송 하나뿐임

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::packet::{Packet, PacketType};
use crate::session::{FIRST_DATA_SEQUENCE, SYN_SEQUENCE};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 피어로부터의 한 번의 수신 결과
#[derive(Debug)]
pub(crate) enum Inbound {
    /// 피어가 보낸 정상 패킷
    Packet(Packet),

    /// 다른 주소, 디코딩 실패 등으로 버린 데이터그램
    Ignored,
}

/// ICMP unreachable로 인한 수신 에러 (데이터그램 하나를 버린 것으로 취급)
pub(crate) fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
    )
}

/// 하나의 피어와 통신하는 엔드포인트
pub struct Endpoint {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    config: Config,
    stats: TransferStats,
    buf: Vec<u8>,

    /// 피어가 우리 패킷을 한 번이라도 확인했는지
    peer_acked: bool,
}

impl Endpoint {
    /// 기존 소켓으로 엔드포인트 생성
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr, config: Config) -> Self {
        let buf = vec![0u8; config.recv_buffer_size()];
        Self {
            socket,
            peer,
            config,
            stats: TransferStats::new(),
            buf,
            peer_acked: false,
        }
    }

    /// 새 소켓을 바인딩하고 엔드포인트 생성
    pub async fn bind(local_addr: SocketAddr, peer: SocketAddr, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        Ok(Self::new(Arc::new(socket), peer, config))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 전송 통계
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// 패킷 한 번 전송 (확인 없음)
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode()?;
        self.socket.send_to(&bytes, self.peer).await?;
        self.stats.packets_sent += 1;
        trace!(
            "-> {} {} seq={} len={}",
            self.peer,
            packet.packet_type,
            packet.sequence_num,
            packet.payload_length()
        );
        Ok(())
    }

    /// ACK 전송
    pub async fn send_ack(&mut self, sequence_num: u32) -> Result<()> {
        self.send_packet(&Packet::ack(sequence_num)).await?;
        self.stats.acks_sent += 1;
        Ok(())
    }

    /// `deadline`까지 데이터그램 하나를 기다림. `None`이면 타임아웃
    pub(crate) async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Inbound>> {
        let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) if is_transient(&e) => {
                debug!("수신 에러 무시: {}", e);
                return Ok(Some(Inbound::Ignored));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                self.stats.timeouts += 1;
                return Ok(None);
            }
        };

        if from != self.peer {
            self.stats.foreign += 1;
            trace!("다른 주소의 데이터그램 무시: {}", from);
            return Ok(Some(Inbound::Ignored));
        }

        match Packet::decode(&self.buf[..len]) {
            Ok(packet) => {
                trace!(
                    "<- {} {} seq={} len={}",
                    from,
                    packet.packet_type,
                    packet.sequence_num,
                    packet.payload_length()
                );
                Ok(Some(Inbound::Packet(packet)))
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!("잘못된 패킷 수신 ({}): {}", from, e);
                Ok(Some(Inbound::Ignored))
            }
        }
    }

    /// 패킷을 보내고 같은 시퀀스의 ACK를 받을 때까지 재전송
    ///
    /// - ACK → `Ok(())`
    /// - ERROR → [`Error::PeerAbort`] (재시도하지 않음)
    /// - `max_retries`번 전송 후에도 응답 없음 → [`Error::RetryExhausted`]
    ///
    /// 첫 패킷을 보내는 동안 피어가 SYN을 재전송하면 (SYN ACK 유실) SYN을
    /// 다시 확인함. 그 밖의 낮은 시퀀스 패킷은 확인하지 않음: 이전 세션이
    /// 끝난 뒤 같은 주소에서 시작된 새 세션일 수 있음.
    pub async fn send_reliable(
        &mut self,
        packet_type: PacketType,
        sequence_num: u32,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let packet = Packet::new(packet_type, sequence_num, payload);
        let bytes = packet.encode()?;
        let max_retries = self.config.max_retries;

        for attempt in 1..=max_retries {
            self.socket.send_to(&bytes, self.peer).await?;
            self.stats.packets_sent += 1;
            if attempt > 1 {
                self.stats.retransmissions += 1;
            }

            let deadline = Instant::now() + self.config.timeout();
            while let Some(inbound) = self.recv_until(deadline).await? {
                let reply = match inbound {
                    Inbound::Packet(reply) => reply,
                    Inbound::Ignored => continue,
                };

                if reply.sequence_num == sequence_num {
                    match reply.packet_type {
                        PacketType::Ack => {
                            self.peer_acked = true;
                            return Ok(());
                        }
                        PacketType::Error => {
                            let reason = String::from_utf8_lossy(&reply.payload).into_owned();
                            warn!("Received error from {}: {}", self.peer, reason);
                            return Err(Error::PeerAbort(reason));
                        }
                        _ => {}
                    }
                } else if self.is_lost_syn_ack(&reply, sequence_num) {
                    self.stats.duplicates += 1;
                    self.send_ack(SYN_SEQUENCE).await?;
                } else {
                    trace!(
                        "ignoring {} seq={} while awaiting ACK {}",
                        reply.packet_type,
                        reply.sequence_num,
                        sequence_num
                    );
                }
            }

            warn!(
                "Attempt {}/{} failed for {} seq {}",
                attempt, max_retries, packet_type, sequence_num
            );
        }

        Err(Error::RetryExhausted {
            sequence_num,
            attempts: max_retries,
        })
    }

    fn is_lost_syn_ack(&self, reply: &Packet, sending: u32) -> bool {
        !self.peer_acked
            && sending == FIRST_DATA_SEQUENCE
            && reply.packet_type == PacketType::Syn
            && reply.sequence_num == SYN_SEQUENCE
    }

    /// 중단 통보 (best-effort, 실패해도 무시)
    pub async fn send_abort(&mut self, sequence_num: u32, reason: &str) {
        warn!(
            "Aborting transfer with {} at seq {}: {}",
            self.peer, sequence_num, reason
        );
        if let Err(e) = self
            .send_reliable(PacketType::Error, sequence_num, reason.to_string())
            .await
        {
            debug!("중단 통보 실패 (무시): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icmp_errors_are_transient() {
        let reset = std::io::Error::from(ErrorKind::ConnectionReset);
        let refused = std::io::Error::from(ErrorKind::ConnectionRefused);
        let denied = std::io::Error::from(ErrorKind::PermissionDenied);

        assert!(is_transient(&reset));
        assert!(is_transient(&refused));
        assert!(!is_transient(&denied));
    }
}
