//! 손실 네트워크 시뮬레이터
//!
//! 요청자와 응답자 사이에 두는 UDP 릴레이. 시드 고정 RNG로 손실/중복을
//! 주입하고, 방향별로 관찰한 패킷을 타입별로 셈.
//!
//! ```text
//!  Requester ──▶ LossyRelay ──▶ Responder
//!            ◀──            ◀──
//! ```
//!
//! 응답자 입장에서 피어 주소는 릴레이 주소가 됨.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::endpoint::is_transient;
use crate::packet::{Packet, PacketType};
use crate::Result;

/// 장애 모델
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// 패킷 손실 확률 (0.0 ~ 1.0)
    pub loss_rate: f64,

    /// 패킷 중복 확률 (0.0 ~ 1.0)
    pub duplicate_rate: f64,

    /// RNG 시드
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        // 장애 없음 (투명 릴레이)
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl FaultConfig {
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }
}

/// 릴레이가 관찰한 패킷 수
#[derive(Debug, Clone, Default)]
pub struct RelayCounts {
    /// 요청자 → 응답자 방향, 타입별
    pub upstream: HashMap<PacketType, u64>,

    /// 응답자 → 요청자 방향, 타입별
    pub downstream: HashMap<PacketType, u64>,

    /// 버린 패킷 수
    pub dropped: u64,

    /// 중복 전달한 패킷 수
    pub duplicated: u64,
}

impl RelayCounts {
    pub fn upstream_of(&self, packet_type: PacketType) -> u64 {
        self.upstream.get(&packet_type).copied().unwrap_or(0)
    }

    pub fn downstream_of(&self, packet_type: PacketType) -> u64 {
        self.downstream.get(&packet_type).copied().unwrap_or(0)
    }
}

/// 장애 주입 릴레이
pub struct LossyRelay {
    local_addr: SocketAddr,
    counts: Arc<Mutex<RelayCounts>>,
    task: JoinHandle<()>,
}

impl LossyRelay {
    /// `upstream`(응답자)으로 전달하는 릴레이 시작
    pub async fn start(upstream: SocketAddr, faults: FaultConfig) -> Result<Self> {
        let bind_addr: SocketAddr = match upstream {
            SocketAddr::V4(_) => (Ipv4Addr::LOCALHOST, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::LOCALHOST, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;
        let counts = Arc::new(Mutex::new(RelayCounts::default()));

        let task = tokio::spawn(relay_loop(socket, upstream, faults, counts.clone()));
        debug!("relay {} -> {}", local_addr, upstream);

        Ok(Self {
            local_addr,
            counts,
            task,
        })
    }

    /// 요청자가 접속할 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 지금까지의 관찰 결과
    pub fn counts(&self) -> RelayCounts {
        self.counts.lock().clone()
    }
}

impl Drop for LossyRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn relay_loop(
    socket: UdpSocket,
    upstream: SocketAddr,
    faults: FaultConfig,
    counts: Arc<Mutex<RelayCounts>>,
) {
    let mut rng = StdRng::seed_from_u64(faults.seed);
    let loss_rate = faults.loss_rate.clamp(0.0, 1.0);
    let duplicate_rate = faults.duplicate_rate.clamp(0.0, 1.0);
    let mut client: Option<SocketAddr> = None;
    let mut buf = vec![0u8; 65535];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                debug!("relay stopped: {}", e);
                return;
            }
        };

        let (dest, to_upstream) = if from == upstream {
            match client {
                Some(client) => (client, false),
                None => continue,
            }
        } else {
            client = Some(from);
            (upstream, true)
        };

        let datagram = &buf[..len];
        let dropped = rng.gen_bool(loss_rate);
        let duplicated = !dropped && rng.gen_bool(duplicate_rate);

        {
            let mut counts = counts.lock();
            if let Ok(packet) = Packet::decode(datagram) {
                let by_type = if to_upstream {
                    &mut counts.upstream
                } else {
                    &mut counts.downstream
                };
                *by_type.entry(packet.packet_type).or_insert(0) += 1;
            }
            if dropped {
                counts.dropped += 1;
            }
            if duplicated {
                counts.duplicated += 1;
            }
        }

        if dropped {
            trace!("relay dropped {} bytes to {}", len, dest);
            continue;
        }

        let copies = if duplicated { 2 } else { 1 };
        for _ in 0..copies {
            if socket.send_to(datagram, dest).await.is_err() {
                break;
            }
        }
    }
}
