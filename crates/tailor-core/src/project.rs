//! Project files as seen by the modification pipeline.

use crate::parser::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Session file map keyed by project-relative, forward-slash path.
///
/// A `BTreeMap` keeps iteration order stable, so every pass over the map
/// (candidate ranking, scoring, summaries) is independent of insertion order.
pub type FileMap = BTreeMap<String, ProjectFile>;

/// Extension-derived tag for a project file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Tsx,
    Jsx,
    TypeScript,
    JavaScript,
    Css,
    Json,
    Html,
    Markdown,
    Other,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "tsx" => FileType::Tsx,
            "jsx" => FileType::Jsx,
            "ts" | "mts" | "cts" => FileType::TypeScript,
            "js" | "mjs" | "cjs" => FileType::JavaScript,
            "css" | "scss" | "sass" | "less" => FileType::Css,
            "json" => FileType::Json,
            "html" | "htm" => FileType::Html,
            "md" | "mdx" => FileType::Markdown,
            _ => FileType::Other,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(FileType::from_extension)
            .unwrap_or(FileType::Other)
    }

    /// Whether the structural parser understands this file.
    pub fn is_source(&self) -> bool {
        self.dialect().is_some()
    }

    pub fn dialect(&self) -> Option<Dialect> {
        match self {
            FileType::Tsx => Some(Dialect::Tsx),
            FileType::TypeScript => Some(Dialect::TypeScript),
            FileType::Jsx | FileType::JavaScript => Some(Dialect::JavaScript),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileType::Tsx => "tsx",
            FileType::Jsx => "jsx",
            FileType::TypeScript => "ts",
            FileType::JavaScript => "js",
            FileType::Css => "css",
            FileType::Json => "json",
            FileType::Html => "html",
            FileType::Markdown => "md",
            FileType::Other => "other",
        }
    }
}

/// Stems that mark an entrypoint or root composition file.
const MAIN_FILE_STEMS: [&str; 4] = ["App", "main", "index", "_app"];

/// A project file loaded into the session file map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub content: String,
    pub line_count: usize,
    pub file_type: FileType,
    pub is_main_file: bool,
}

impl ProjectFile {
    /// Build a file entry from an absolute path inside `root`.
    pub fn new(root: &Path, path: &Path, content: String) -> Self {
        let relative_path = relative_path_string(path, root);
        let file_type = FileType::from_path(path);
        let is_main_file = file_type.is_source() && is_main_file_path(&relative_path);
        Self {
            path: path.to_path_buf(),
            line_count: count_lines(&content),
            relative_path,
            content,
            file_type,
            is_main_file,
        }
    }

    /// Replace the content after a successful disk write.
    pub fn update_content(&mut self, content: String) {
        self.line_count = count_lines(&content);
        self.content = content;
    }

    pub fn file_stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    /// Root composition files are the `App.*` entrypoints that own the route table.
    pub fn is_root_composition(&self) -> bool {
        self.is_main_file && self.file_stem() == "App"
    }
}

pub fn count_lines(content: &str) -> usize {
    content.lines().count()
}

/// Project-relative path with forward slashes, whatever the host separator.
pub fn relative_path_string(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Entrypoints live at the project root or directly under `src/`.
pub fn is_main_file_path(relative_path: &str) -> bool {
    let segments: Vec<&str> = relative_path.split('/').collect();
    let (dir_ok, file) = match segments.as_slice() {
        [file] => (true, *file),
        ["src", file] => (true, *file),
        _ => (false, ""),
    };
    if !dir_ok {
        return false;
    }
    let stem = file.split('.').next().unwrap_or_default();
    MAIN_FILE_STEMS.contains(&stem)
}

/// Pick the file that owns routing for the project, if any.
pub fn root_composition_file(files: &FileMap) -> Option<&ProjectFile> {
    files
        .values()
        .find(|file| file.is_root_composition())
        .or_else(|| {
            files
                .values()
                .find(|file| file.is_main_file && file.content.contains("<Route"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/work/app");
        let path = root.join("src").join("pages").join("Signup.tsx");
        assert_eq!(relative_path_string(&path, root), "src/pages/Signup.tsx");
    }

    #[test]
    fn main_files_are_detected_only_at_root_or_src() {
        assert!(is_main_file_path("src/App.tsx"));
        assert!(is_main_file_path("index.js"));
        assert!(is_main_file_path("src/main.jsx"));
        assert!(!is_main_file_path("src/pages/index.tsx"));
        assert!(!is_main_file_path("src/Application.tsx"));
    }

    #[test]
    fn stylesheets_are_never_main_files() {
        let root = Path::new("/p");
        let file = ProjectFile::new(root, &root.join("src/index.css"), "body {}".to_string());
        assert_eq!(file.file_type, FileType::Css);
        assert!(!file.is_main_file);
    }

    #[test]
    fn update_content_refreshes_line_count() {
        let root = Path::new("/p");
        let mut file = ProjectFile::new(root, &root.join("src/App.tsx"), "a\nb\n".to_string());
        assert_eq!(file.line_count, 2);
        file.update_content("a\nb\nc\nd".to_string());
        assert_eq!(file.line_count, 4);
        assert!(file.is_root_composition());
    }
}
