//! Module specifier resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::BundleError;

/// Resolves import specifiers to files on disk.
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(["", ".js", ".jsx", ".html"])
    }
}

impl Resolver {
    /// Create a resolver trying `extensions` in order. `""` means the
    /// specifier as written.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve `specifier` as imported from the file `importer`.
    ///
    /// The result is canonicalized so one file always maps to one path.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf, BundleError> {
        let dir = importer.parent().unwrap_or(Path::new("."));

        let found = if is_relative(specifier) {
            self.resolve_file(&dir.join(specifier))
        } else {
            self.resolve_package(specifier, dir)
        };

        found
            .and_then(|path| fs::canonicalize(&path).ok())
            .ok_or_else(|| BundleError::Unresolved {
                specifier: specifier.to_string(),
                importer: importer.display().to_string(),
            })
    }

    /// Try the path itself, each extension, then `index` files.
    fn resolve_file(&self, base: &Path) -> Option<PathBuf> {
        for ext in &self.extensions {
            let candidate = with_suffix(base, ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if base.is_dir() {
            for ext in self.extensions.iter().filter(|e| !e.is_empty()) {
                let candidate = base.join(format!("index{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        None
    }

    /// Look up a bare specifier in `node_modules`, walking up from `dir`.
    fn resolve_package(&self, specifier: &str, dir: &Path) -> Option<PathBuf> {
        let (package, subpath) = split_package(specifier);

        for ancestor in dir.ancestors() {
            let package_dir = ancestor.join("node_modules").join(package);
            if !package_dir.is_dir() {
                continue;
            }

            if let Some(subpath) = subpath {
                return self.resolve_file(&package_dir.join(subpath));
            }

            let main = package_main(&package_dir).unwrap_or_else(|| "index".to_string());
            return self
                .resolve_file(&package_dir.join(&main))
                .or_else(|| self.resolve_file(&package_dir.join("index")));
        }

        None
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Append `suffix` to the final path component (`a/b` + `.js` = `a/b.js`).
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `Some("sub/path")`).
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let boundary = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };

    match boundary {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

/// The `main` field of a package's `package.json`.
fn package_main(package_dir: &Path) -> Option<String> {
    let manifest = fs::read_to_string(package_dir.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    json.get("main")?.as_str().map(|s| s.trim_start_matches("./").to_string())
}
