//! 응답자 (서버측 디스패치 루프)
//!
//! - 유휴 상태에서는 타임아웃 없이 SYN을 기다림
//! - SYN을 받으면 그 주소를 피어로 고정한 새 엔드포인트를 만들고 ACK
//! - 요청에 맞는 세션을 끝까지 실행한 뒤 다시 유휴 상태로
//! - 한 번에 한 세션만 처리 (세션 중에는 다른 SYN을 받지 않음)
//! - 유휴 상태에서 SYN 외의 패킷은 무시. 단, 직전 업로드 피어가 FIN을
//!   재전송하면 (마지막 ACK 유실) 다시 ACK함
//! - 송신 실패나 ICMP로 인한 수신 에러는 루프를 끝내지 않음

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::endpoint::{is_transient, Endpoint};
use crate::packet::{Packet, PacketType};
use crate::request::{Action, Request};
use crate::session::{Session, SYN_SEQUENCE};
use crate::stats::TransferReport;
use crate::storage::{self, StagedFile};
use crate::{Config, Error, Result};

const REASON_NOT_FOUND: &str = "File not found";
const REASON_MALFORMED: &str = "Malformed request";

/// 처리한 세션 하나의 결과
#[derive(Debug)]
pub struct Served {
    /// 요청자 주소
    pub peer: SocketAddr,

    /// 파싱된 요청 (파싱 실패 시 `None`)
    pub request: Option<Request>,

    /// 세션 결과
    pub outcome: Result<TransferReport>,
}

/// 파일 제공 응답자
pub struct Responder {
    socket: Arc<UdpSocket>,
    config: Config,
    storage_root: PathBuf,
    buf: Vec<u8>,

    /// 직전에 완료된 업로드의 (피어, FIN 시퀀스)
    last_upload: Option<(SocketAddr, u32)>,
}

impl Responder {
    /// 소켓 바인딩
    pub async fn bind(
        bind_addr: SocketAddr,
        config: Config,
        storage_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(bind_addr).await?;
        let buf = vec![0u8; config.recv_buffer_size()];

        Ok(Self {
            socket: Arc::new(socket),
            config,
            storage_root: storage_root.into(),
            buf,
            last_upload: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// 종료 없이 계속 처리
    pub async fn run(&mut self) -> Result<()> {
        info!("Responder listening on {}", self.local_addr()?);
        loop {
            self.serve_next().await?;
        }
    }

    /// `shutdown`이 완료될 때까지 처리
    ///
    /// 진행 중인 세션도 함께 취소되며, 반환 후 소켓은 응답자와 함께 해제됨.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Responder shutting down");
                Ok(())
            }
        }
    }

    /// 데이터그램 하나를 기다려 처리
    ///
    /// SYN이 아니면 `None`. 세션 실패와 송신 실패는 [`Served::outcome`]으로
    /// 전달되고, ICMP 외의 수신 소켓 에러만 `Err`로 반환됨.
    pub async fn serve_next(&mut self) -> Result<Option<Served>> {
        let (len, peer) = match self.socket.recv_from(&mut self.buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                debug!("유휴 상태 수신 에러 무시: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let syn = match Packet::decode(&self.buf[..len]) {
            Ok(packet) if packet.packet_type == PacketType::Syn => packet,
            Ok(packet) => {
                if packet.packet_type == PacketType::Fin
                    && self.last_upload == Some((peer, packet.sequence_num))
                {
                    debug!("FIN 재전송 재확인 ({}, seq={})", peer, packet.sequence_num);
                    self.reacknowledge_fin(peer, packet.sequence_num).await;
                } else {
                    debug!(
                        "유휴 상태에서 {} 무시 (from {}, seq={})",
                        packet.packet_type, peer, packet.sequence_num
                    );
                }
                return Ok(None);
            }
            Err(e) => {
                warn!("Received malformed packet from {}: {}", peer, e);
                return Ok(None);
            }
        };

        let parsed = Request::parse(&syn.payload);

        let mut endpoint = Endpoint::new(self.socket.clone(), peer, self.config.clone());
        if let Err(e) = endpoint.send_ack(syn.sequence_num).await {
            warn!("Failed to acknowledge request from {}: {}", peer, e);
            return Ok(Some(Served {
                peer,
                request: parsed.ok(),
                outcome: Err(e),
            }));
        }

        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                warn!("잘못된 요청 ({}): {}", peer, e);
                endpoint.send_abort(SYN_SEQUENCE, REASON_MALFORMED).await;
                return Ok(Some(Served {
                    peer,
                    request: None,
                    outcome: Err(e),
                }));
            }
        };

        info!(
            "Received {} request for '{}' from {}",
            request.action, request.filename, peer
        );

        self.last_upload = None;
        let outcome = match request.action {
            Action::Upload => self.accept_upload(&mut endpoint, &request.filename).await,
            Action::Download => self.serve_download(&mut endpoint, &request.filename).await,
        };

        match &outcome {
            Ok(report) => {
                info!("Session with {} complete: {}", peer, report);
                if request.action == Action::Upload {
                    self.last_upload = Some((peer, report.final_sequence));
                }
            }
            Err(e) => warn!("Session with {} failed: {}", peer, e),
        }

        Ok(Some(Served {
            peer,
            request: Some(request),
            outcome,
        }))
    }

    async fn reacknowledge_fin(&self, peer: SocketAddr, sequence_num: u32) {
        let sent = match Packet::ack(sequence_num).encode() {
            Ok(ack) => self.socket.send_to(&ack, peer).await.map(|_| ()),
            Err(e) => {
                warn!("ACK 인코딩 실패: {}", e);
                return;
            }
        };
        if let Err(e) = sent {
            warn!("Failed to re-acknowledge FIN from {}: {}", peer, e);
        }
    }

    /// 업로드 수신: `<upload_prefix><name>`으로 저장
    async fn accept_upload(
        &self,
        endpoint: &mut Endpoint,
        filename: &str,
    ) -> Result<TransferReport> {
        let target = match storage::namespaced(&self.config.upload_prefix, filename) {
            Ok(name) => self.storage_root.join(name),
            Err(e) => {
                endpoint.send_abort(SYN_SEQUENCE, REASON_MALFORMED).await;
                return Err(e);
            }
        };

        let mut staged = match StagedFile::create(&target) {
            Ok(staged) => staged,
            Err(e) => {
                endpoint.send_abort(SYN_SEQUENCE, "Cannot store file").await;
                return Err(e);
            }
        };

        let report = Session::receiver(endpoint)
            .receive_into(staged.writer())
            .await?;
        let path = staged.commit().await?;
        info!("File '{}' received as {:?}", filename, path);
        Ok(report)
    }

    /// 다운로드 제공: 저장소의 파일을 전송
    async fn serve_download(
        &self,
        endpoint: &mut Endpoint,
        filename: &str,
    ) -> Result<TransferReport> {
        let path = match storage::resolve_within(&self.storage_root, filename) {
            Ok(path) => path,
            Err(e) => {
                endpoint.send_abort(SYN_SEQUENCE, REASON_NOT_FOUND).await;
                return Err(e);
            }
        };

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {:?} not found, aborting download", path);
                endpoint.send_abort(SYN_SEQUENCE, REASON_NOT_FOUND).await;
                return Err(Error::SourceMissing(path));
            }
            Err(e) => {
                endpoint.send_abort(SYN_SEQUENCE, REASON_NOT_FOUND).await;
                return Err(e.into());
            }
        };

        Session::sender(endpoint).send_from(&mut file).await
    }
}
