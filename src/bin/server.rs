//! SWFT 서버 (응답자) - Stop-and-Wait File Transfer
//!
//! 요청을 하나씩 순서대로 처리
//! - UPLOAD: `server_<name>`으로 저장
//! - DOWNLOAD: 저장소 디렉터리의 파일을 전송
//!
//! 사용법:
//!   cargo run --release --bin swft-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin swft-server -- --bind 0.0.0.0:9999 --dir ./files

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use swft::{Config, Responder, DEFAULT_PORT};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    storage_root: PathBuf,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            storage_root: PathBuf::from("."),
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind" | "-b", Some(v)) => {
                config.bind_addr = v.parse()?;
                i += 1;
            }
            ("--port" | "-p", Some(v)) => {
                config.bind_addr.set_port(v.parse()?);
                i += 1;
            }
            ("--dir" | "-d", Some(v)) => {
                config.storage_root = PathBuf::from(v);
                i += 1;
            }
            ("--profile", Some(v)) => {
                config.config = Config::from_profile(v)?;
                i += 1;
            }
            ("--chunk-size", Some(v)) => {
                config.config.chunk_size = v.parse()?;
                i += 1;
            }
            ("--timeout-ms", Some(v)) => {
                config.config.timeout_ms = v.parse()?;
                i += 1;
            }
            ("--max-retries", Some(v)) => {
                config.config.max_retries = v.parse()?;
                i += 1;
            }
            ("--help" | "-h", _) => {
                println!(
                    r#"SWFT Server - Stop-and-Wait File Transfer 서버

UDP 위 stop-and-wait 신뢰 전송 파일 서버
- 한 번에 하나의 세션만 처리
- 업로드는 server_<파일명>으로 저장

사용법:
  cargo run --release --bin swft-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:9999)
  -p, --port <PORT>       바인드 포트만 변경
  -d, --dir <PATH>        저장소 디렉터리 (기본: .)
  --profile <NAME>        default | low-latency | unstable
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 4096)
  --timeout-ms <MS>       시도당 타임아웃 (기본: 2000)
  --max-retries <N>       최대 시도 횟수 (기본: 5)
  -h, --help              이 도움말 출력

환경 변수:
  RUST_LOG                로그 필터 (기본: info)
"#
                );
                std::process::exit(0);
            }
            (flag, None) if flag.starts_with('-') => {
                return Err(format!("{} 옵션에 값이 필요함", flag).into());
            }
            _ => {}
        }
        i += 1;
    }

    config.config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server_config = parse_args()?;

    info!("SWFT Server starting...");
    info!("Bind address: {}", server_config.bind_addr);
    info!("Storage root: {:?}", server_config.storage_root);
    info!("Chunk size: {} bytes", server_config.config.chunk_size);
    info!(
        "Timeout: {} ms x {} attempts",
        server_config.config.timeout_ms, server_config.config.max_retries
    );

    let mut responder = Responder::bind(
        server_config.bind_addr,
        server_config.config,
        server_config.storage_root,
    )
    .await?;

    responder
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
