//! 요청자 (클라이언트측 드라이버)
//!
//! SYN으로 요청을 보내고, 확인되면 업로드는 송신 세션, 다운로드는 수신
//! 세션을 실행함.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::packet::PacketType;
use crate::request::{Action, Request};
use crate::session::{Session, SYN_SEQUENCE};
use crate::stats::{TransferReport, TransferStats};
use crate::storage::{self, StagedFile};
use crate::{Config, Error, Result};

const REASON_NOT_FOUND: &str = "File not found";
const REASON_UNREADABLE: &str = "File not readable";

/// 한 응답자에 대한 요청자
pub struct Requester {
    endpoint: Endpoint,
}

impl Requester {
    /// 서버 주소와 같은 주소 체계의 임시 포트에 바인딩
    pub async fn connect(server_addr: SocketAddr, config: Config) -> Result<Self> {
        let local: SocketAddr = match server_addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        Self::bind(local, server_addr, config).await
    }

    /// 지정한 로컬 주소에 바인딩
    pub async fn bind(
        local_addr: SocketAddr,
        server_addr: SocketAddr,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = Endpoint::bind(local_addr, server_addr, config).await?;
        Ok(Self { endpoint })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.endpoint.peer()
    }

    /// 누적 전송 통계
    pub fn stats(&self) -> &TransferStats {
        self.endpoint.stats()
    }

    /// 요청 실행. 업로드는 `local_dir/<filename>`을 읽고, 다운로드는
    /// `local_dir/<download_prefix><filename>`에 씀.
    pub async fn request(
        &mut self,
        request: &Request,
        local_dir: &Path,
    ) -> Result<TransferReport> {
        match request.action {
            Action::Upload => {
                let source = local_dir.join(&request.filename);
                self.upload_as(&source, &request.filename).await
            }
            Action::Download => self.download(&request.filename, local_dir).await,
        }
    }

    /// 로컬 파일을 같은 이름(마지막 경로 요소)으로 업로드
    pub async fn upload(&mut self, path: impl AsRef<Path>) -> Result<TransferReport> {
        let path = path.as_ref();
        let remote_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidRequest(format!("파일 이름 없음: {:?}", path)))?
            .to_string();
        self.upload_as(path, &remote_name).await
    }

    /// 로컬 파일을 `remote_name`으로 업로드
    pub async fn upload_as(
        &mut self,
        path: impl AsRef<Path>,
        remote_name: &str,
    ) -> Result<TransferReport> {
        let path = path.as_ref();
        self.open(&Request::new(Action::Upload, remote_name)).await?;

        // SYN 이후, 바이트 전송 전에 존재 여부 확인
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {:?} not found, aborting upload", path);
                self.endpoint.send_abort(SYN_SEQUENCE, REASON_NOT_FOUND).await;
                return Err(Error::SourceMissing(path.to_path_buf()));
            }
            Err(e) => {
                self.endpoint.send_abort(SYN_SEQUENCE, REASON_UNREADABLE).await;
                return Err(e.into());
            }
        };

        info!(
            "Uploading {:?} to {} as '{}'",
            path,
            self.server_addr(),
            remote_name
        );
        Session::sender(&mut self.endpoint).send_from(&mut file).await
    }

    /// 원격 파일을 `dest_dir/<download_prefix><name>`으로 다운로드
    pub async fn download(
        &mut self,
        remote_name: &str,
        dest_dir: impl AsRef<Path>,
    ) -> Result<TransferReport> {
        let prefix = &self.endpoint.config().download_prefix;
        let target: PathBuf = dest_dir
            .as_ref()
            .join(storage::namespaced(prefix, remote_name)?);
        let mut staged = StagedFile::create(&target)?;

        self.open(&Request::new(Action::Download, remote_name)).await?;

        info!("Downloading '{}' from {}", remote_name, self.server_addr());
        let report = Session::receiver(&mut self.endpoint)
            .receive_into(staged.writer())
            .await?;
        let path = staged.commit().await?;
        info!("File '{}' downloaded as {:?}", remote_name, path);
        Ok(report)
    }

    /// SYN 전송. 실패하면 세션 없이 종료
    async fn open(&mut self, request: &Request) -> Result<()> {
        if let Err(e) = self
            .endpoint
            .send_reliable(PacketType::Syn, SYN_SEQUENCE, request.to_payload())
            .await
        {
            warn!("Failed to send request to {}: {}", self.server_addr(), e);
            return Err(e);
        }
        Ok(())
    }
}
