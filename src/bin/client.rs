//! SWFT 클라이언트 (요청자) - Stop-and-Wait File Transfer
//!
//! 파일 하나를 업로드하거나 다운로드하고 종료
//!
//! 사용법:
//!   cargo run --release --bin swft-client -- [OPTIONS] <UPLOAD|DOWNLOAD> <FILE>
//!
//! 예시:
//!   # 업로드 (서버에 server_report.pdf로 저장됨)
//!   cargo run --release --bin swft-client -- -s 192.168.1.100:9999 UPLOAD report.pdf
//!
//!   # 다운로드 (client_report.pdf로 저장됨)
//!   cargo run --release --bin swft-client -- -s 192.168.1.100:9999 DOWNLOAD report.pdf

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use swft::{Action, Config, Requester, DEFAULT_PORT};

/// 클라이언트 설정
struct ClientConfig {
    server: String,
    dest_dir: PathBuf,
    action: Option<Action>,
    filename: Option<String>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            dest_dir: PathBuf::from("."),
            action: None,
            filename: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--server" | "-s", Some(v)) => {
                config.server = v.clone();
                i += 1;
            }
            ("--dir" | "-d", Some(v)) => {
                config.dest_dir = PathBuf::from(v);
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
                    r#"SWFT Client - Stop-and-Wait File Transfer 클라이언트

사용법:
  cargo run --release --bin swft-client -- [OPTIONS] <UPLOAD|DOWNLOAD> <FILE>

옵션:
  -s, --server <HOST:PORT>  서버 주소 (기본: 127.0.0.1:9999)
  -d, --dir <PATH>          다운로드 저장 디렉터리 (기본: .)
  --profile <NAME>          default | low-latency | unstable
  --chunk-size <SIZE>       청크 크기 바이트 (기본: 4096)
  --timeout-ms <MS>         시도당 타임아웃 (기본: 2000)
  --max-retries <N>         최대 시도 횟수 (기본: 5)
  -h, --help                이 도움말 출력

환경 변수:
  RUST_LOG                  로그 필터 (기본: info)
"#
                );
                std::process::exit(0);
            }
            (flag, None) if flag.starts_with('-') => {
                return Err(format!("{} 옵션에 값이 필요함", flag).into());
            }
            (positional, _) => {
                if config.action.is_none() {
                    config.action = Some(positional.parse()?);
                } else if config.filename.is_none() {
                    config.filename = Some(positional.to_string());
                } else {
                    return Err(format!("알 수 없는 인자: {}", positional).into());
                }
            }
        }
        i += 1;
    }

    config.config.validate()?;
    Ok(config)
}

/// `HOST:PORT` 해석 (첫 번째 주소 사용)
async fn resolve(server: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    if let Ok(addr) = server.parse() {
        return Ok(addr);
    }
    tokio::net::lookup_host(server)
        .await?
        .next()
        .ok_or_else(|| format!("주소를 찾을 수 없음: {}", server).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client_config = parse_args()?;
    let (action, filename) = match (client_config.action, client_config.filename) {
        (Some(action), Some(filename)) => (action, filename),
        _ => return Err("사용법: swft-client [OPTIONS] <UPLOAD|DOWNLOAD> <FILE>".into()),
    };

    let server_addr = resolve(&client_config.server).await?;

    info!("SWFT Client starting...");
    info!("Server: {}", server_addr);
    info!("Chunk size: {} bytes", client_config.config.chunk_size);

    let mut requester = Requester::connect(server_addr, client_config.config).await?;

    let result = match action {
        Action::Upload => requester.upload(&filename).await,
        Action::Download => requester.download(&filename, &client_config.dest_dir).await,
    };

    match result {
        Ok(report) => {
            info!("{} '{}' complete", action, filename);
            info!("  {}", report);
            Ok(())
        }
        Err(e) => {
            error!("{} '{}' failed: {}", action, filename, e);
            std::process::exit(1);
        }
    }
}
