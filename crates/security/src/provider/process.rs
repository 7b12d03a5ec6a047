//! 외부 CLI 실행 헬퍼
//!
//! snyk, npm 같은 CLI는 취약점을 찾으면 종료 코드 1로 끝나면서도 stdout에 JSON을 남깁니다.
//! 호출자가 지정한 종료 코드만 "데이터 있음"으로 취급합니다.

use std::path::Path;

use pinkeeper_core::error::ProviderError;
use serde_json::Value;
use tokio::process::Command;

/// stderr 보고 최대 길이
const MAX_STDERR_LEN: usize = 512;

/// 외부 명령 정의
pub(crate) struct JsonCommand<'a> {
    pub provider: &'a str,
    pub binary: &'a str,
    pub args: &'a [&'a str],
    pub dir: &'a Path,
    pub envs: Vec<(&'a str, String)>,
    /// 데이터가 있는 것으로 인정하는 종료 코드
    pub data_exit_codes: &'a [i32],
}

impl JsonCommand<'_> {
    /// 명령을 실행하고 stdout을 JSON으로 파싱합니다.
    ///
    /// 반환된 future가 drop되면 (타임아웃) 자식 프로세스도 종료됩니다.
    pub async fn run(&self) -> Result<Value, ProviderError> {
        let mut cmd = Command::new(self.binary);
        cmd.args(self.args)
            .current_dir(self.dir)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null());
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::MissingBinary {
                    provider: self.provider.to_owned(),
                    binary: self.binary.to_owned(),
                }
            } else {
                ProviderError::Request {
                    provider: self.provider.to_owned(),
                    reason: format!("failed to spawn {}: {e}", self.binary),
                }
            }
        })?;

        let code = output.status.code();
        let carries_data = code.is_some_and(|c| self.data_exit_codes.contains(&c));
        if !carries_data {
            return Err(ProviderError::NonZeroExit {
                provider: self.provider.to_owned(),
                code,
                stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        tracing::debug!(
            provider = self.provider,
            code = ?code,
            stdout_bytes = output.stdout.len(),
            "external scanner finished"
        );

        serde_json::from_slice(&output.stdout).map_err(|e| ProviderError::InvalidResponse {
            provider: self.provider.to_owned(),
            reason: format!("stdout is not JSON: {e}"),
        })
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_STDERR_LEN) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}
