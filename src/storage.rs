//! 로컬 파일 소스/싱크
//!
//! 수신 데이터는 대상 디렉터리의 임시 파일에 쓰고, 세션이 성공했을 때만
//! 최종 이름으로 옮김. 실패하거나 중단된 세션은 출력 파일을 남기지 않음.

use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Error, Result};

/// 성공 시에만 최종 경로에 나타나는 파일
pub struct StagedFile {
    temp: NamedTempFile,
    file: File,
    target: PathBuf,
}

impl StagedFile {
    /// `target`과 같은 디렉터리에 임시 파일 생성
    pub fn create(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".swft-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        let file = File::from_std(temp.as_file().try_clone()?);

        debug!("staging {:?} at {:?}", target, temp.path());
        Ok(Self { temp, file, target })
    }

    /// 데이터를 쓸 핸들
    pub fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// 최종 경로
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// 최종 경로로 확정
    pub async fn commit(self) -> Result<PathBuf> {
        let Self {
            temp,
            mut file,
            target,
        } = self;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp.persist(&target)?;
        Ok(target)
    }
}

/// 역할 접두사가 붙은 파일 이름 (마지막 경로 요소 기준)
pub fn namespaced(prefix: &str, name: &str) -> Result<String> {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidRequest(format!("파일 이름 없음: {:?}", name)))?;
    Ok(format!("{}{}", prefix, base))
}

/// `root` 밖으로 나가지 않는 상대 경로만 허용
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let mut has_normal = false;

    for component in relative.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidRequest(format!(
                    "허용되지 않는 경로: {:?}",
                    name
                )))
            }
        }
    }

    if !has_normal {
        return Err(Error::InvalidRequest(format!("파일 이름 없음: {:?}", name)));
    }

    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_uses_final_component() {
        assert_eq!(namespaced("server_", "a.txt").unwrap(), "server_a.txt");
        assert_eq!(namespaced("client_", "dir/sub/b.bin").unwrap(), "client_b.bin");
        assert!(namespaced("client_", "..").is_err());
        assert!(namespaced("client_", "").is_err());
    }

    #[test]
    fn test_resolve_within_rejects_escape() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_within(root, "docs/a.txt").unwrap(),
            root.join("docs/a.txt")
        );
        assert!(resolve_within(root, "../etc/passwd").is_err());
        assert!(resolve_within(root, "/etc/passwd").is_err());
        assert!(resolve_within(root, ".").is_err());
    }

    #[tokio::test]
    async fn test_staged_file_appears_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");

        let mut staged = StagedFile::create(&target).unwrap();
        assert_eq!(staged.target(), target.as_path());
        staged.writer().write_all(b"hello").await.unwrap();
        assert!(!target.exists());

        let path = staged.commit().await.unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_dropped_staged_file_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");

        {
            let mut staged = StagedFile::create(&target).unwrap();
            staged.writer().write_all(b"partial").await.unwrap();
        }

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
