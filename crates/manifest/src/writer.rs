//! Manifest 쓰기 — 스테이징 후 원자적 교체
//!
//! 모든 manifest를 먼저 메모리에서 렌더링([`stage`])하고, 계획 단계가 끝난 뒤
//! [`ManifestWriter::commit_all`]에서 순차적으로 기록합니다.
//! 각 파일은 같은 디렉토리의 임시 파일에 쓴 다음 rename으로 교체되므로
//! 디스크의 manifest는 완전히 갱신되었거나 손대지 않은 상태 중 하나입니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use pinkeeper_core::metrics as m;
use tracing::{debug, info};

use crate::edits::ManifestEdits;
use crate::error::ManifestError;
use crate::manifest::{Manifest, ManifestId};

/// 렌더링이 끝난 쓰기 대기 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    pub manifest: ManifestId,
    pub path: PathBuf,
    /// 렌더링된 전체 파일 내용
    pub rendered: String,
    /// 원본과 의미상 다른지 여부
    pub changed: bool,
}

/// 편집을 적용하고 렌더링합니다. 파일 시스템에는 접근하지 않습니다.
///
/// 편집 결과가 원본 JSON과 같으면 `changed = false`이며 기록 대상에서 제외됩니다.
pub fn stage(manifest: &Manifest, edits: &ManifestEdits) -> Result<StagedWrite, ManifestError> {
    let updated = edits.apply(manifest.value());
    let changed = &updated != manifest.value();
    let rendered = manifest.render(&updated)?;
    Ok(StagedWrite {
        manifest: manifest.id().clone(),
        path: manifest.path().to_path_buf(),
        rendered,
        changed,
    })
}

/// Manifest 기록기
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestWriter;

impl ManifestWriter {
    pub fn new() -> Self {
        Self
    }

    /// 스테이징된 파일 하나를 원자적으로 기록합니다 (동기 I/O).
    ///
    /// 변경이 없으면 아무것도 하지 않고 `Ok(false)`를 반환합니다.
    pub fn commit(&self, staged: &StagedWrite) -> Result<bool, ManifestError> {
        if !staged.changed {
            debug!(manifest = %staged.manifest, "manifest unchanged, skipping write");
            return Ok(false);
        }
        write_atomic(&staged.path, staged.rendered.as_bytes()).map_err(|(persist, source)| {
            let path = staged.manifest.to_string();
            if persist {
                ManifestError::Persist { path, source }
            } else {
                ManifestError::Stage { path, source }
            }
        })?;
        metrics::counter!(m::MANIFESTS_WRITTEN_TOTAL).increment(1);
        info!(manifest = %staged.manifest, "manifest written");
        Ok(true)
    }

    /// 모든 스테이징 항목을 하나씩 기록합니다.
    ///
    /// 한 manifest의 실패는 다른 manifest의 기록을 막지 않습니다.
    pub async fn commit_all(
        &self,
        staged: Vec<StagedWrite>,
    ) -> Result<Vec<(ManifestId, Result<bool, ManifestError>)>, ManifestError> {
        let writer = *self;
        tokio::task::spawn_blocking(move || {
            staged
                .iter()
                .map(|s| (s.manifest.clone(), writer.commit(s)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ManifestError::Join(e.to_string()))
    }
}

/// 임시 파일에 쓰고 rename으로 교체합니다.
///
/// 실패 시 `(persist 단계 여부, 원인)`을 반환합니다.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), (bool, std::io::Error)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| (false, e))?;
    tmp.write_all(contents).map_err(|e| (false, e))?;
    tmp.as_file().sync_all().map_err(|e| (false, e))?;

    if let Ok(metadata) = std::fs::metadata(path) {
        // 원본 권한 유지
        std::fs::set_permissions(tmp.path(), metadata.permissions()).map_err(|e| (false, e))?;
    }

    tmp.persist(path).map_err(|e| (true, e.error))?;
    Ok(())
}
