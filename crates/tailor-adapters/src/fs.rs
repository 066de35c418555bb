//! Project filesystem access: scanning into a file map, path policy, and
//! atomic writes.

use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tailor_core::{FileMap, FileType, ProjectFile};
use walkdir::WalkDir;

/// Files larger than this are left out of the file map.
pub const MAX_SCAN_FILE_BYTES: u64 = 512 * 1024;

const IGNORED_DIRS: [&str; 10] = [
    "node_modules",
    "dist",
    "build",
    "coverage",
    "target",
    "vendor",
    "out",
    ".next",
    ".git",
    ".tailor",
];

const IGNORED_FILES: [&str; 3] = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("absolute paths are not allowed: {0}")]
    AbsolutePath(String),

    #[error("path escapes the project root: {0}")]
    EscapesRoot(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// How relative paths from the pipeline are turned into disk paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathPolicy {
    /// Reject absolute paths, `..` components and anything outside the root
    #[default]
    Confined,
    /// Join relative paths onto the root without further checks
    Unrestricted,
}

#[derive(Debug, Clone)]
pub struct ProjectFs {
    root: PathBuf,
    policy: PathPolicy,
}

impl ProjectFs {
    pub fn new(root: impl Into<PathBuf>, policy: PathPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn a project-relative path into a disk path under the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FsError> {
        let candidate = Path::new(relative);
        match self.policy {
            PathPolicy::Unrestricted => {
                if candidate.is_absolute() {
                    Ok(candidate.to_path_buf())
                } else {
                    Ok(self.root.join(candidate))
                }
            }
            PathPolicy::Confined => {
                if candidate.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
                    return Err(FsError::AbsolutePath(relative.to_string()));
                }
                let mut resolved = self.root.clone();
                for component in candidate.components() {
                    match component {
                        Component::Normal(part) => resolved.push(part),
                        Component::CurDir => {}
                        Component::ParentDir => {
                            return Err(FsError::EscapesRoot(relative.to_string()))
                        }
                        Component::RootDir | Component::Prefix(_) => {
                            return Err(FsError::AbsolutePath(relative.to_string()))
                        }
                    }
                }
                // Symlinked parents can still point outside the root.
                if let (Ok(root), Some(Ok(parent))) = (
                    self.root.canonicalize(),
                    resolved.parent().filter(|p| p.exists()).map(Path::canonicalize),
                ) {
                    if !parent.starts_with(&root) {
                        return Err(FsError::EscapesRoot(relative.to_string()));
                    }
                }
                Ok(resolved)
            }
        }
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// Write atomically, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf, FsError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
        }
        write_atomic(&path, content).map_err(|e| FsError::io(&path, e))?;
        Ok(path)
    }

    /// Walk the project and load every recognised file.
    ///
    /// Directory traversal is sequential; file reads fan out over rayon.
    /// Unreadable or oversized files are skipped, not reported.
    pub fn scan(&self) -> Result<FileMap, FsError> {
        if !self.root.is_dir() {
            return Err(FsError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "project root is not a directory"),
            ));
        }

        let paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_path(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| is_scannable(path))
            .collect();

        let files: Vec<ProjectFile> = paths
            .par_iter()
            .filter_map(|path| {
                let metadata = fs::metadata(path).ok()?;
                if metadata.len() > MAX_SCAN_FILE_BYTES {
                    return None;
                }
                let content = fs::read_to_string(path).ok()?;
                Some(ProjectFile::new(&self.root, path, content))
            })
            .collect();

        tracing::debug!(root = %self.root.display(), files = files.len(), "scanned project");

        Ok(files
            .into_iter()
            .map(|file| (file.relative_path.clone(), file))
            .collect())
    }

    /// Scan on the blocking pool.
    pub async fn scan_async(&self) -> Result<FileMap, FsError> {
        let project = self.clone();
        match tokio::task::spawn_blocking(move || project.scan()).await {
            Ok(result) => result,
            Err(err) => Err(FsError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
            )),
        }
    }
}

fn is_ignored_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    IGNORED_DIRS.contains(&name) || (name.starts_with('.') && path.is_dir())
}

fn is_scannable(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    !IGNORED_FILES.contains(&name) && FileType::from_path(path) != FileType::Other
}

/// Write content atomically by writing to a temp file first, then renaming.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp_path = path.with_file_name(format!(".{}.tailor-tmp", file_name));
    replace_via_temp(&tmp_path, path, |file| file.write_all(content.as_bytes()))
}

/// The temp file is removed whenever creating, filling, or renaming it fails.
fn replace_via_temp(
    tmp_path: &Path,
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let result = fs::File::create(tmp_path)
        .and_then(|mut file| fill(&mut file))
        .and_then(|()| fs::rename(tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, ProjectFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs_root = dir.path().to_path_buf();
        fs::create_dir_all(fs_root.join("src/pages")).unwrap();
        fs::create_dir_all(fs_root.join("node_modules/react")).unwrap();
        fs::write(fs_root.join("src/App.tsx"), "export default function App() {}\n").unwrap();
        fs::write(fs_root.join("src/pages/Signup.tsx"), "export default function Signup() {}\n").unwrap();
        fs::write(fs_root.join("src/index.css"), "body {}\n").unwrap();
        fs::write(fs_root.join("node_modules/react/index.js"), "module.exports = {}\n").unwrap();
        fs::write(fs_root.join("package-lock.json"), "{}\n").unwrap();
        fs::write(fs_root.join("logo.png"), [0u8, 1, 2]).unwrap();
        (dir, ProjectFs::new(fs_root, PathPolicy::Confined))
    }

    #[test]
    fn scan_keys_by_relative_path_and_skips_ignored() {
        let (_dir, project) = project();
        let files = project.scan().unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["src/App.tsx", "src/index.css", "src/pages/Signup.tsx"]);
        assert!(files["src/App.tsx"].is_main_file);
        assert!(!files["src/pages/Signup.tsx"].is_main_file);
    }

    #[test]
    fn scan_is_repeatable() {
        let (_dir, project) = project();
        assert_eq!(project.scan().unwrap(), project.scan().unwrap());
    }

    #[test]
    fn confined_policy_rejects_escapes() {
        let (_dir, project) = project();
        assert!(matches!(project.resolve("../etc/passwd"), Err(FsError::EscapesRoot(_))));
        assert!(matches!(project.resolve("/etc/passwd"), Err(FsError::AbsolutePath(_))));
        assert!(project.resolve("src/./pages/About.tsx").is_ok());
    }

    #[test]
    fn unrestricted_policy_joins_relative_paths() {
        let (dir, _) = project();
        let open = ProjectFs::new(dir.path(), PathPolicy::Unrestricted);
        assert_eq!(
            open.resolve("src/pages/About.tsx").unwrap(),
            dir.path().join("src/pages/About.tsx")
        );
    }

    #[test]
    fn write_creates_parents_and_leaves_no_temp_file() {
        let (dir, project) = project();
        project.write("src/components/new/Card.tsx", "export const Card = 1;\n").unwrap();
        let written = dir.path().join("src/components/new/Card.tsx");
        assert_eq!(fs::read_to_string(&written).unwrap(), "export const Card = 1;\n");
        let leftovers: Vec<_> = fs::read_dir(written.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tailor-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_write_removes_the_partial_temp_file() {
        let (dir, _) = project();
        let target = dir.path().join("src/App.tsx");
        let tmp = dir.path().join("src/.App.tsx.tailor-tmp");

        let err = replace_via_temp(&tmp, &target, |file| {
            file.write_all(b"export default fun")?;
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "no space left on device");
        assert!(!tmp.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "export default function App() {}\n");
    }

    #[test]
    fn missing_root_is_an_error() {
        let project = ProjectFs::new("/definitely/not/here", PathPolicy::Confined);
        assert!(project.scan().is_err());
    }
}
