//! Glob-based source selection.
//!
//! Globs use gitignore syntax relative to the project root, and a leading `!`
//! excludes. Output paths are relative to the glob base: the leading
//! directories of a glob before its first wildcard.

use std::path::{Component, Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use walkdir::WalkDir;

use crate::config::ConfigError;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// A file selected by a [`SourceSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,

    /// Path relative to its glob base
    pub relative: PathBuf,
}

/// A compiled list of include/exclude globs.
#[derive(Debug, Clone)]
pub struct SourceSet {
    root: PathBuf,
    bases: Vec<PathBuf>,
    matcher: Override,
}

impl SourceSet {
    /// Compile `globs` relative to `root`.
    pub fn new(root: &Path, globs: &[String]) -> Result<Self, ConfigError> {
        let mut builder = OverrideBuilder::new(root);
        for glob in globs {
            builder.add(glob).map_err(|e| ConfigError::InvalidGlob {
                glob: glob.clone(),
                message: e.to_string(),
            })?;
        }
        let matcher = builder.build().map_err(|e| ConfigError::InvalidGlob {
            glob: globs.join(", "),
            message: e.to_string(),
        })?;

        let mut bases: Vec<PathBuf> = Vec::new();
        for glob in globs.iter().filter(|g| !g.starts_with('!')) {
            let base = glob_base(glob);
            if !bases.iter().any(|b| base.starts_with(b)) {
                bases.retain(|b| !b.starts_with(&base));
                bases.push(base);
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            bases,
            matcher,
        })
    }

    /// Base directories walked for files, relative to the root.
    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Whether a project-relative file path is selected.
    pub fn matches(&self, relative: &Path) -> bool {
        self.matcher.matched(relative, false).is_whitelist()
    }

    /// Whether an absolute path under the root is selected.
    pub fn matches_path(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.root) {
            Ok(relative) => self.matches(relative),
            Err(_) => false,
        }
    }

    /// Every selected file, sorted by path.
    pub fn files(&self) -> Vec<SourceFile> {
        let mut files = Vec::new();

        for base in &self.bases {
            let dir = self.root.join(base);
            if !dir.is_dir() {
                tracing::debug!("Source directory {} does not exist", dir.display());
                continue;
            }

            for entry in WalkDir::new(&dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(project_relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if !self.matches(project_relative) {
                    continue;
                }

                let relative = path.strip_prefix(&dir).unwrap_or(path).to_path_buf();
                files.push(SourceFile {
                    path: path.to_path_buf(),
                    relative,
                });
            }
        }

        files
    }
}

/// The directory part of a glob before its first wildcard.
///
/// A glob without wildcards names a file, so its base is the parent.
pub fn glob_base(glob: &str) -> PathBuf {
    let glob = glob.trim_start_matches('!').trim_start_matches("./");
    let path = Path::new(glob);

    let mut base = PathBuf::new();
    let mut wildcard = false;
    for component in path.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        if part.to_string_lossy().contains(GLOB_META) {
            wildcard = true;
            break;
        }
        base.push(part);
    }

    if wildcard {
        base
    } else {
        base.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn globs(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn computes_glob_base() {
        assert_eq!(glob_base("src/assets/images/**/*"), PathBuf::from("src/assets/images"));
        assert_eq!(glob_base("./src/data/**/*.{json,yml}"), PathBuf::from("src/data"));
        assert_eq!(glob_base("src/assets/styles/main.scss"), PathBuf::from("src/assets/styles"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("!src/templates/layouts/**"), PathBuf::from("src/templates/layouts"));
    }

    #[test]
    fn excludes_negated_globs() {
        let temp = tempdir().unwrap();
        let set = SourceSet::new(
            temp.path(),
            &globs(&[
                "src/templates/**/*",
                "!src/templates/layouts/**",
                "!src/templates/components/**",
            ]),
        )
        .unwrap();

        assert!(set.matches(Path::new("src/templates/index.html")));
        assert!(set.matches(Path::new("src/templates/docs/intro.md")));
        assert!(!set.matches(Path::new("src/templates/layouts/default.html")));
        assert!(!set.matches(Path::new("src/templates/components/forms/button.html")));
        assert!(!set.matches(Path::new("src/data/site.json")));
    }

    #[test]
    fn matches_brace_alternatives() {
        let temp = tempdir().unwrap();
        let set = SourceSet::new(temp.path(), &globs(&["src/data/**/*.{json,yml}"])).unwrap();

        assert!(set.matches(Path::new("src/data/site.json")));
        assert!(set.matches(Path::new("src/data/nested/nav.yml")));
        assert!(!set.matches(Path::new("src/data/notes.txt")));
    }

    #[test]
    fn lists_files_relative_to_base() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "src/templates/index.html");
        touch(temp.path(), "src/templates/docs/intro.md");
        touch(temp.path(), "src/templates/layouts/default.html");

        let set = SourceSet::new(
            temp.path(),
            &globs(&["src/templates/**/*", "!src/templates/layouts/**"]),
        )
        .unwrap();

        let relative: Vec<PathBuf> = set.files().into_iter().map(|f| f.relative).collect();

        assert_eq!(
            relative,
            vec![PathBuf::from("docs/intro.md"), PathBuf::from("index.html")]
        );
    }

    #[test]
    fn missing_base_yields_no_files() {
        let temp = tempdir().unwrap();
        let set = SourceSet::new(temp.path(), &globs(&["src/assets/fonts/**/*"])).unwrap();

        assert!(set.files().is_empty());
    }

    #[test]
    fn matches_absolute_paths_under_root() {
        let temp = tempdir().unwrap();
        let set = SourceSet::new(temp.path(), &globs(&["src/assets/styles/**/*"])).unwrap();

        assert!(set.matches_path(&temp.path().join("src/assets/styles/_vars.scss")));
        assert!(!set.matches_path(Path::new("/elsewhere/src/assets/styles/a.scss")));
    }
}
