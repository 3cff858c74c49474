//! Build configuration.
//!
//! A [`PipelineConfig`] is built once at startup from defaults, an optional
//! `kiln.toml`, and the development flag, then shared read-only by every task.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::sources::SourceSet;

/// Default config file name.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid glob '{glob}': {message}")]
    InvalidGlob { glob: String, message: String },

    #[error("Invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Page templates.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    /// View globs
    pub src: Vec<String>,
    pub dest: PathBuf,
    pub watch: Vec<String>,
    pub layouts: Vec<String>,
    pub partials: Vec<String>,
    pub data: Vec<String>,
    /// Layout for views that do not name one
    pub default_layout: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            src: strings(&[
                "src/templates/**/*",
                "!src/templates/layouts/**",
                "!src/templates/components/**",
            ]),
            dest: PathBuf::new(),
            watch: strings(&["src/templates/**/*", "src/data/**/*.json"]),
            layouts: strings(&["src/templates/layouts/*"]),
            partials: strings(&["src/templates/components/**/*"]),
            data: strings(&["src/data/**/*.{json,yml}"]),
            default_layout: "default".to_string(),
        }
    }
}

/// Script bundle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Entry module
    pub src: PathBuf,
    pub dest: PathBuf,
    pub watch: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src/assets/scripts/main.js"),
            dest: PathBuf::from("assets/scripts"),
            watch: strings(&["src/assets/scripts/**/*"]),
        }
    }
}

/// Stylesheets.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Entry stylesheet (`.scss`, `.sass` or `.css`)
    pub src: PathBuf,
    pub dest: PathBuf,
    pub watch: Vec<String>,
    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,
    /// Extra directories searched by `@use` and `@import`
    pub include_paths: Vec<PathBuf>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src/assets/styles/main.scss"),
            dest: PathBuf::from("assets/styles"),
            watch: strings(&["src/assets/styles/**/*"]),
            browsers: strings(&["last 1 version"]),
            include_paths: vec![PathBuf::from("node_modules")],
        }
    }
}

/// Images.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub src: Vec<String>,
    pub dest: PathBuf,
    pub watch: Vec<String>,
    /// JPEG re-encode quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            src: strings(&["src/assets/images/**/*"]),
            dest: PathBuf::from("assets/images"),
            watch: strings(&["src/assets/images/**/*"]),
            jpeg_quality: 85,
        }
    }
}

/// Fonts, copied as-is.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FontsConfig {
    pub src: Vec<String>,
    pub dest: PathBuf,
    pub watch: Vec<String>,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            src: strings(&["src/assets/fonts/**/*"]),
            dest: PathBuf::from("assets/fonts"),
            watch: strings(&["src/assets/fonts/**/*"]),
        }
    }
}

/// Development server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Open a browser once the server is listening
    pub open: bool,
    /// Quiet period before a batch of file events triggers a rebuild
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
            debounce_ms: 100,
        }
    }
}

/// The complete build configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project root; every relative path and glob resolves against it
    #[serde(skip)]
    pub root: PathBuf,

    /// Development mode
    #[serde(skip)]
    pub dev: bool,

    /// Output root, removed by `clean`. Category `dest` paths resolve
    /// inside it.
    pub dest: PathBuf,

    /// Show a desktop notification when the script bundle fails
    pub notify: bool,

    pub templates: TemplatesConfig,
    pub scripts: ScriptsConfig,
    pub styles: StylesConfig,
    pub images: ImagesConfig,
    pub fonts: FontsConfig,
    pub server: ServerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dev: false,
            dest: PathBuf::from("dist"),
            notify: true,
            templates: TemplatesConfig::default(),
            scripts: ScriptsConfig::default(),
            styles: StylesConfig::default(),
            images: ImagesConfig::default(),
            fonts: FontsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration for the project at `root`.
    ///
    /// `config_file` is resolved against `root` when relative. A missing file
    /// yields the defaults; a malformed one is an error.
    pub fn load(root: &Path, config_file: &Path, dev: bool) -> Result<Self, ConfigError> {
        let path = root.join(config_file);

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let config = Self::from_toml(&content).map_err(|message| ConfigError::Parse {
                path: path.display().to_string(),
                message,
            })?;
            tracing::info!("Loaded config from {}", path.display());
            config
        } else {
            tracing::debug!("No {} found, using defaults", path.display());
            Self::default()
        };

        config.root = root.to_path_buf();
        config.dev = dev;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document over the defaults.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Check every glob compiles and every setting is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let glob_lists = [
            &self.templates.src,
            &self.templates.watch,
            &self.templates.layouts,
            &self.templates.partials,
            &self.templates.data,
            &self.scripts.watch,
            &self.styles.watch,
            &self.images.src,
            &self.images.watch,
            &self.fonts.src,
            &self.fonts.watch,
        ];
        for globs in glob_lists {
            SourceSet::new(&self.root, globs)?;
        }

        let category_dests = [
            ("templates.dest", &self.templates.dest),
            ("scripts.dest", &self.scripts.dest),
            ("styles.dest", &self.styles.dest),
            ("images.dest", &self.images.dest),
            ("fonts.dest", &self.fonts.dest),
        ];
        for (key, dest) in category_dests {
            let inside = dest
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !inside {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    message: format!(
                        "{} must be a relative path inside {}",
                        dest.display(),
                        self.dest.display()
                    ),
                });
            }
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "images.jpeg_quality".to_string(),
                message: format!("{} is not within 1-100", self.images.jpeg_quality),
            });
        }

        Ok(())
    }

    /// Resolve a project-relative path.
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Resolve a category destination inside the output root.
    pub fn output(&self, category_dest: &Path) -> PathBuf {
        let dest = self.path(&self.dest);
        if category_dest.as_os_str().is_empty() {
            dest
        } else {
            dest.join(category_dest)
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
