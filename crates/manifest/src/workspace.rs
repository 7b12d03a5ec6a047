//! Workspace 탐색 — workspace 지정을 manifest 경로 목록으로 확장
//!
//! 지정 방식은 세 가지입니다.
//!
//! - [`WorkspaceSpec::RootOnly`]: 루트 manifest만
//! - [`WorkspaceSpec::Globs`]: 명시적 glob 목록
//! - [`WorkspaceSpec::Auto`]: 루트 manifest의 `workspaces` 선언 사용, 없으면 루트만
//!
//! 확장은 `walkdir`로 루트를 순회하며 (심볼릭 링크 미추적, `node_modules` 제외)
//! 디렉토리 상대 경로를 `globset`으로 매칭합니다.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use pinkeeper_core::config::DepPaths;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::ManifestError;
use crate::manifest::{MANIFEST_FILE, Manifest, rel_path_slash};

/// 순회에서 제외하는 디렉토리 이름
const PRUNED_DIRS: [&str; 2] = ["node_modules", ".git"];

/// workspace 지정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceSpec {
    /// 루트 manifest만
    RootOnly,
    /// 명시적 glob 목록
    Globs(Vec<String>),
    /// 루트 manifest의 `workspaces` 선언에서 자동 탐지
    Auto,
}

impl WorkspaceSpec {
    /// 설정값에서 지정 방식을 만듭니다. 지정이 없으면 루트만 사용합니다.
    pub fn from_dep_paths(dep_paths: Option<&DepPaths>) -> Self {
        match dep_paths {
            None => Self::RootOnly,
            Some(DepPaths::Workspace) => Self::Auto,
            Some(DepPaths::Globs(globs)) => Self::Globs(globs.clone()),
        }
    }
}

/// 탐색 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkspace {
    /// 루트 manifest 경로
    pub root: PathBuf,
    /// workspace member manifest 경로 (정렬, 중복 제거)
    pub members: Vec<PathBuf>,
    /// 매칭 결과가 없는 glob 등 경고
    pub warnings: Vec<String>,
}

impl ResolvedWorkspace {
    /// 루트를 첫 번째로 하는 전체 manifest 경로
    pub fn manifests(&self) -> Vec<PathBuf> {
        std::iter::once(self.root.clone())
            .chain(self.members.iter().cloned())
            .collect()
    }
}

/// Workspace 탐색기
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    root_dir: PathBuf,
    ignore: Vec<String>,
}

impl WorkspaceResolver {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ignore: Vec::new(),
        }
    }

    /// 확장 후 제외할 glob을 추가합니다.
    pub fn with_ignore(mut self, ignore: impl IntoIterator<Item = String>) -> Self {
        self.ignore.extend(ignore);
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// workspace 지정을 manifest 경로 목록으로 확장합니다 (동기 I/O).
    ///
    /// # Errors
    ///
    /// glob 또는 ignore 패턴이 잘못되면 [`ManifestError::InvalidGlob`]을 반환합니다.
    pub fn resolve(
        &self,
        spec: &WorkspaceSpec,
        root: &Manifest,
    ) -> Result<ResolvedWorkspace, ManifestError> {
        let globs = match spec {
            WorkspaceSpec::RootOnly => Vec::new(),
            WorkspaceSpec::Globs(globs) => globs.clone(),
            WorkspaceSpec::Auto => match root.workspaces() {
                Some(globs) => globs,
                None => {
                    info!(
                        manifest = %root.id(),
                        "no workspaces declared in root manifest, using root only"
                    );
                    Vec::new()
                }
            },
        };

        let mut resolved = ResolvedWorkspace {
            root: root.path().to_path_buf(),
            members: Vec::new(),
            warnings: Vec::new(),
        };
        if globs.is_empty() {
            return Ok(resolved);
        }

        // `!pattern`은 ignore로 취급
        let (negated, positive): (Vec<String>, Vec<String>) =
            globs.into_iter().partition(|g| g.starts_with('!'));
        let mut ignore_patterns = self.ignore.clone();
        ignore_patterns.extend(negated.into_iter().map(|g| g[1..].to_owned()));

        let patterns = positive
            .iter()
            .map(|g| MemberPattern::compile(g))
            .collect::<Result<Vec<_>, _>>()?;
        let ignore = compile_globset(&ignore_patterns)?;

        let mut hits = vec![0usize; patterns.len()];
        let mut members = Vec::new();
        for entry in WalkDir::new(&self.root_dir)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_pruned(e))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };
            let Ok(rel) = entry.path().strip_prefix(&self.root_dir) else {
                continue;
            };
            let rel = rel_path_slash(rel);
            let file_type = entry.file_type();

            let manifest_path = if file_type.is_dir() {
                let candidate = entry.path().join(MANIFEST_FILE);
                if !candidate.is_file() {
                    continue;
                }
                candidate
            } else if file_type.is_file() && entry.file_name() == MANIFEST_FILE {
                entry.path().to_path_buf()
            } else {
                continue;
            };

            let mut matched = false;
            for (idx, pattern) in patterns.iter().enumerate() {
                if pattern.matches(&rel, file_type.is_dir()) {
                    hits[idx] += 1;
                    matched = true;
                }
            }
            if !matched {
                continue;
            }

            let manifest_rel = if file_type.is_dir() {
                format!("{rel}/{MANIFEST_FILE}")
            } else {
                rel.clone()
            };
            if ignore.is_match(&rel) || ignore.is_match(&manifest_rel) {
                debug!(path = %manifest_rel, "workspace member ignored");
                continue;
            }
            if manifest_path == resolved.root {
                continue;
            }
            members.push(manifest_path);
        }

        for (pattern, count) in patterns.iter().zip(&hits) {
            if *count == 0 {
                let msg = format!("workspace glob '{}' matched no package.json", pattern.raw);
                warn!(pattern = %pattern.raw, "workspace glob matched no package.json");
                resolved.warnings.push(msg);
            }
        }

        members.sort();
        members.dedup();
        debug!(members = members.len(), "workspace resolved");
        resolved.members = members;
        Ok(resolved)
    }
}

/// member 매칭 패턴
#[derive(Debug, Clone)]
struct MemberPattern {
    raw: String,
    matcher: GlobMatcher,
    /// `.../package.json`으로 끝나는 패턴은 파일을 직접 매칭
    targets_file: bool,
}

impl MemberPattern {
    fn compile(raw: &str) -> Result<Self, ManifestError> {
        let normalized = normalize(raw);
        let targets_file = normalized == MANIFEST_FILE
            || normalized.ends_with(&format!("/{MANIFEST_FILE}"));
        Ok(Self {
            raw: raw.to_owned(),
            matcher: build_glob(raw, &normalized)?.compile_matcher(),
            targets_file,
        })
    }

    fn matches(&self, rel: &str, is_dir: bool) -> bool {
        is_dir != self.targets_file && self.matcher.is_match(rel)
    }
}

fn normalize(pattern: &str) -> String {
    pattern
        .trim()
        .trim_start_matches("./")
        .trim_end_matches('/')
        .to_owned()
}

fn build_glob(raw: &str, normalized: &str) -> Result<globset::Glob, ManifestError> {
    GlobBuilder::new(normalized)
        .literal_separator(true)
        .build()
        .map_err(|e| ManifestError::InvalidGlob {
            pattern: raw.to_owned(),
            reason: e.kind().to_string(),
        })
}

fn compile_globset(globs: &[String]) -> Result<GlobSet, ManifestError> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        builder.add(build_glob(g, &normalize(g))?);
    }
    builder.build().map_err(|e| ManifestError::InvalidGlob {
        pattern: globs.join(", "),
        reason: e.to_string(),
    })
}

fn is_pruned(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && PRUNED_DIRS
            .iter()
            .any(|name| entry.file_name() == std::ffi::OsStr::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestId;

    fn write(dir: &Path, rel: &str, text: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    fn load_root(dir: &Path, text: &str) -> Manifest {
        let path = write(dir, "package.json", text);
        Manifest::parse(ManifestId::new("package.json"), path, text, true).unwrap()
    }

    fn rels(dir: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| rel_path_slash(p.strip_prefix(dir).unwrap()))
            .collect()
    }

    #[test]
    fn root_only_returns_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::RootOnly, &root)
            .unwrap();
        assert!(ws.members.is_empty());
        assert_eq!(ws.manifests(), vec![root.path().to_path_buf()]);
    }

    #[test]
    fn auto_reads_workspaces_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), r#"{"workspaces": ["packages/*"]}"#);
        write(dir.path(), "packages/b/package.json", "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        write(dir.path(), "packages/a/nested/package.json", "{}");
        std::fs::create_dir_all(dir.path().join("packages/empty")).unwrap();

        let ws = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::Auto, &root)
            .unwrap();
        assert_eq!(
            rels(dir.path(), &ws.members),
            vec!["packages/a/package.json", "packages/b/package.json"]
        );
        assert!(ws.warnings.is_empty());
    }

    #[test]
    fn auto_without_declaration_falls_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::Auto, &root)
            .unwrap();
        assert!(ws.members.is_empty());
    }

    #[test]
    fn node_modules_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        write(dir.path(), "packages/a/node_modules/dep/package.json", "{}");
        write(dir.path(), "node_modules/x/package.json", "{}");

        let ws = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::Globs(vec!["**".to_owned()]), &root)
            .unwrap();
        assert_eq!(rels(dir.path(), &ws.members), vec!["packages/a/package.json"]);
    }

    #[test]
    fn zero_match_glob_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "apps/web/package.json", "{}");
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(
                &WorkspaceSpec::Globs(vec!["apps/*".to_owned(), "libs/*".to_owned()]),
                &root,
            )
            .unwrap();
        assert_eq!(ws.members.len(), 1);
        assert_eq!(ws.warnings.len(), 1);
        assert!(ws.warnings[0].contains("libs/*"));
    }

    #[test]
    fn invalid_glob_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        let err = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::Globs(vec!["packages/[".to_owned()]), &root)
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidGlob { .. }));
    }

    #[test]
    fn ignore_and_negated_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        write(dir.path(), "packages/legacy/package.json", "{}");
        write(dir.path(), "packages/tmp/package.json", "{}");

        let ws = WorkspaceResolver::new(dir.path())
            .with_ignore(vec!["packages/legacy".to_owned()])
            .resolve(
                &WorkspaceSpec::Globs(vec!["./packages/*/".to_owned(), "!packages/tmp".to_owned()]),
                &root,
            )
            .unwrap();
        assert_eq!(rels(dir.path(), &ws.members), vec!["packages/a/package.json"]);
    }

    #[test]
    fn pattern_targeting_package_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "tools/cli/package.json", "{}");
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(
                &WorkspaceSpec::Globs(vec!["tools/*/package.json".to_owned()]),
                &root,
            )
            .unwrap();
        assert_eq!(rels(dir.path(), &ws.members), vec!["tools/cli/package.json"]);
    }

    #[test]
    fn overlapping_globs_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "packages/a/package.json", "{}");
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(
                &WorkspaceSpec::Globs(vec!["packages/*".to_owned(), "packages/a".to_owned()]),
                &root,
            )
            .unwrap();
        assert_eq!(ws.members.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = load_root(dir.path(), "{}");
        write(dir.path(), "real/a/package.json", "{}");
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real/a"), dir.path().join("packages/a"))
            .unwrap();
        let ws = WorkspaceResolver::new(dir.path())
            .resolve(&WorkspaceSpec::Globs(vec!["packages/*".to_owned()]), &root)
            .unwrap();
        assert!(ws.members.is_empty());
    }

    #[test]
    fn spec_from_dep_paths() {
        assert_eq!(WorkspaceSpec::from_dep_paths(None), WorkspaceSpec::RootOnly);
        assert_eq!(
            WorkspaceSpec::from_dep_paths(Some(&DepPaths::Workspace)),
            WorkspaceSpec::Auto
        );
    }
}
