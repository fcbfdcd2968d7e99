//! 세션 시작 요청 (SYN 페이로드)
//!
//! 형식: `"<ACTION>|<FILENAME>"`, 구분자는 정확히 하나.

use std::str::FromStr;

use bytes::Bytes;

use crate::{Error, Result};

const DELIMITER: char = '|';

/// 요청 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 요청자 → 응답자
    Upload,

    /// 응답자 → 요청자
    Download,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Upload => "UPLOAD",
            Action::Download => "DOWNLOAD",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UPLOAD" => Ok(Action::Upload),
            "DOWNLOAD" => Ok(Action::Download),
            other => Err(Error::InvalidRequest(format!("알 수 없는 동작: {}", other))),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SYN으로 전달되는 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    pub filename: String,
}

impl Request {
    pub fn new(action: Action, filename: impl Into<String>) -> Self {
        Self {
            action,
            filename: filename.into(),
        }
    }

    /// SYN 페이로드로 직렬화
    pub fn to_payload(&self) -> Bytes {
        Bytes::from(format!("{}{}{}", self.action, DELIMITER, self.filename))
    }

    /// SYN 페이로드 파싱
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| Error::InvalidRequest("UTF-8이 아닌 요청".into()))?;

        let mut parts = text.split(DELIMITER);
        let (action, filename) = match (parts.next(), parts.next(), parts.next()) {
            (Some(action), Some(filename), None) => (action, filename),
            _ => {
                return Err(Error::InvalidRequest(format!(
                    "구분자 '{}'는 정확히 하나여야 함: {:?}",
                    DELIMITER, text
                )))
            }
        };

        if filename.is_empty() {
            return Err(Error::InvalidRequest("파일 이름 없음".into()));
        }

        Ok(Self {
            action: action.parse()?,
            filename: filename.to_string(),
        })
    }
}
