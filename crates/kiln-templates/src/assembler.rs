//! Page assembly from views, layouts, partials and data files.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{context, AutoEscape, Environment, Value};
use serde::Serialize;

use crate::frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};
use crate::helpers::register_helpers;

/// Template name prefix for layouts, keeping them apart from partials.
const LAYOUT_PREFIX: &str = "@layout/";

/// A template source file discovered by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    /// Path on disk
    pub path: PathBuf,

    /// Path relative to the glob base it was found under
    pub relative: PathBuf,
}

impl TemplateSource {
    pub fn new(path: impl Into<PathBuf>, relative: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            relative: relative.into(),
        }
    }
}

/// Options controlling assembly.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Layout used by views without a `layout` key
    pub default_layout: String,

    /// Log failing views and keep going instead of aborting
    pub log_errors: bool,

    /// Exposed to templates as `dev`
    pub dev: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            default_layout: "default".to_string(),
            log_errors: false,
            dev: false,
        }
    }
}

/// A rendered page ready to be written.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// View the page was rendered from
    pub source: PathBuf,

    /// Output path relative to the destination directory
    pub relative: PathBuf,

    /// Final HTML
    pub html: String,
}

/// A partial, listed for templates under `components`.
#[derive(Debug, Clone, Serialize)]
struct ComponentInfo {
    name: String,
    path: String,
    page: Frontmatter,
}

/// Errors that can occur while assembling pages.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid front matter in {path}: {source}")]
    Frontmatter {
        path: String,
        #[source]
        source: FrontmatterError,
    },

    #[error("Invalid data file {path}: {message}")]
    Data { path: String, message: String },

    #[error("Layout '{layout}' not found (used by {path})")]
    MissingLayout { layout: String, path: String },

    #[error("Failed to register template {name}: {message}")]
    Register { name: String, message: String },

    #[error("Failed to render {path}: {message}")]
    Render { path: String, message: String },
}

/// Composes views into layouts with partials and data in scope.
pub struct Assembler {
    env: Environment<'static>,
    options: AssemblerOptions,
    layouts: HashSet<String>,
    components: Vec<ComponentInfo>,
    data: BTreeMap<String, serde_json::Value>,
}

impl Assembler {
    /// Create an assembler with helpers registered and nothing loaded.
    pub fn new(options: AssemblerOptions) -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        register_helpers(&mut env);

        Self {
            env,
            options,
            layouts: HashSet::new(),
            components: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Register layouts, keyed by file stem.
    pub fn load_layouts(&mut self, sources: &[TemplateSource]) -> Result<usize, TemplateError> {
        for source in sources {
            let content = read_source(&source.path)?;
            let (_, body) = parse_frontmatter(&source.path, &content)?;
            let name = file_stem(&source.path);

            self.add_template(format!("{LAYOUT_PREFIX}{name}"), body.to_string())?;
            self.layouts.insert(name);
        }

        tracing::debug!("Loaded {} layouts", sources.len());
        Ok(sources.len())
    }

    /// Register partials by stem and by relative path without extension.
    pub fn load_partials(&mut self, sources: &[TemplateSource]) -> Result<usize, TemplateError> {
        for source in sources {
            let content = read_source(&source.path)?;
            let (page, body) = parse_frontmatter(&source.path, &content)?;

            let name = file_stem(&source.path);
            let path = source
                .relative
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");

            if path != name {
                self.add_template(path.clone(), body.to_string())?;
            }
            if self.env.get_template(&name).is_ok() {
                tracing::warn!("Partial '{}' is defined more than once, last one wins", name);
            }
            self.add_template(name.clone(), body.to_string())?;

            self.components.push(ComponentInfo { name, path, page });
        }

        tracing::debug!("Loaded {} partials", sources.len());
        Ok(sources.len())
    }

    /// Load JSON and YAML data files, keyed by file stem.
    pub fn load_data(&mut self, sources: &[TemplateSource]) -> Result<usize, TemplateError> {
        for source in sources {
            let content = read_source(&source.path)?;
            let ext = source
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");

            let value: serde_json::Value = match ext {
                "json" => serde_json::from_str(&content).map_err(|e| TemplateError::Data {
                    path: source.path.display().to_string(),
                    message: e.to_string(),
                })?,
                "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| TemplateError::Data {
                    path: source.path.display().to_string(),
                    message: e.to_string(),
                })?,
                _ => {
                    tracing::debug!("Skipping data file {}", source.path.display());
                    continue;
                }
            };

            self.data.insert(file_stem(&source.path), value);
        }

        Ok(self.data.len())
    }

    /// Render every view.
    ///
    /// With `log_errors` set, failing views are logged and skipped; otherwise
    /// the first failure is returned.
    pub fn render_views(&self, views: &[TemplateSource]) -> Result<Vec<RenderedPage>, TemplateError> {
        let mut pages = Vec::with_capacity(views.len());

        for view in views {
            match self.render_view(view) {
                Ok(page) => pages.push(page),
                Err(e) if self.options.log_errors => {
                    tracing::error!("{}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(pages)
    }

    /// Render a single view into its layout.
    pub fn render_view(&self, view: &TemplateSource) -> Result<RenderedPage, TemplateError> {
        let display = view.path.display().to_string();
        let content = read_source(&view.path)?;
        let (page, body) = parse_frontmatter(&view.path, &content)?;

        let page_value = Value::from_serialize(&page);
        let data = Value::from_serialize(&self.data);
        let components = Value::from_serialize(&self.components);

        let name = view.relative.to_string_lossy().replace('\\', "/");
        let mut rendered = self
            .env
            .render_named_str(
                &name,
                body,
                context! {
                    page => &page_value,
                    data => &data,
                    components => &components,
                    dev => self.options.dev,
                },
            )
            .map_err(|e| render_error(&display, e))?;

        if is_markdown(&view.path) {
            rendered = render_markdown(&rendered);
        }

        let html = match self.resolve_layout(&page, &display)? {
            Some(layout) => {
                let template = self
                    .env
                    .get_template(&format!("{LAYOUT_PREFIX}{layout}"))
                    .map_err(|e| render_error(&display, e))?;
                template
                    .render(context! {
                        body => Value::from_safe_string(rendered),
                        page => &page_value,
                        data => &data,
                        components => &components,
                        dev => self.options.dev,
                    })
                    .map_err(|e| render_error(&display, e))?
            }
            None => rendered,
        };

        Ok(RenderedPage {
            source: view.path.clone(),
            relative: view.relative.with_extension("html"),
            html,
        })
    }

    /// Pick the layout for a view.
    ///
    /// An explicit layout must exist; a missing default layout leaves the
    /// view unwrapped.
    fn resolve_layout(&self, page: &Frontmatter, path: &str) -> Result<Option<String>, TemplateError> {
        match &page.layout {
            Some(layout) if self.layouts.contains(layout) => Ok(Some(layout.clone())),
            Some(layout) => Err(TemplateError::MissingLayout {
                layout: layout.clone(),
                path: path.to_string(),
            }),
            None if self.layouts.contains(&self.options.default_layout) => {
                Ok(Some(self.options.default_layout.clone()))
            }
            None => {
                tracing::debug!("No default layout, rendering {} unwrapped", path);
                Ok(None)
            }
        }
    }

    fn add_template(&mut self, name: String, source: String) -> Result<(), TemplateError> {
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| TemplateError::Register {
                name,
                message: e.to_string(),
            })
    }
}

fn read_source(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|e| TemplateError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn parse_frontmatter<'a>(path: &Path, content: &'a str) -> Result<(Frontmatter, &'a str), TemplateError> {
    extract_frontmatter(content).map_err(|source| TemplateError::Frontmatter {
        path: path.display().to_string(),
        source,
    })
}

fn render_error(path: &str, e: minijinja::Error) -> TemplateError {
    TemplateError::Render {
        path: path.to_string(),
        message: format!("{e:#}"),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

/// Markdown to HTML.
fn render_markdown(content: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    let parser = Parser::new_ext(content, options);

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) -> TemplateSource {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        let name = Path::new(relative).file_name().unwrap();
        TemplateSource::new(path.clone(), PathBuf::from(name))
    }

    fn assembler_with_layout(root: &Path) -> Assembler {
        let mut assembler = Assembler::new(AssemblerOptions::default());
        let layout = write(
            root,
            "layouts/default.html",
            "<html><title>{{ page.title }}</title><body>{{ body }}</body></html>",
        );
        assembler.load_layouts(&[layout]).unwrap();
        assembler
    }

    #[test]
    fn wraps_view_in_default_layout() {
        let temp = tempdir().unwrap();
        let assembler = assembler_with_layout(temp.path());
        let view = write(temp.path(), "views/index.html", "---\ntitle: Home\n---\n<p>Hi</p>");

        let page = assembler.render_view(&view).unwrap();

        assert_eq!(page.relative, PathBuf::from("index.html"));
        assert_eq!(
            page.html,
            "<html><title>Home</title><body><p>Hi</p></body></html>"
        );
    }

    #[test]
    fn includes_partials_by_name_and_path() {
        let temp = tempdir().unwrap();
        let mut assembler = assembler_with_layout(temp.path());

        let path = temp.path().join("components/forms/button.html");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<button>{{ label }}</button>").unwrap();
        assembler
            .load_partials(&[TemplateSource::new(path, "forms/button.html")])
            .unwrap();

        let view = write(
            temp.path(),
            "views/page.html",
            r#"{% with label = "Go" %}{% include "button" %}{% include dynamicPartial("forms/button") %}{% endwith %}"#,
        );

        let page = assembler.render_view(&view).unwrap();

        assert!(page.html.contains("<button>Go</button><button>Go</button>"));
    }

    #[test]
    fn exposes_data_files() {
        let temp = tempdir().unwrap();
        let mut assembler = assembler_with_layout(temp.path());
        let json = write(temp.path(), "data/site.json", r#"{"name": "Kiln"}"#);
        let yaml = write(temp.path(), "data/nav.yml", "- Home\n- About\n");
        assembler.load_data(&[json, yaml]).unwrap();

        let view = write(
            temp.path(),
            "views/index.html",
            "{{ data.site.name }}:{% for item in data.nav %}{{ item }};{% endfor %}",
        );

        let page = assembler.render_view(&view).unwrap();

        assert!(page.html.contains("Kiln:Home;About;"));
    }

    #[test]
    fn renders_markdown_views() {
        let temp = tempdir().unwrap();
        let assembler = assembler_with_layout(temp.path());
        let view = write(temp.path(), "views/notes.md", "# {{ plus(1, 1) }} notes");

        let page = assembler.render_view(&view).unwrap();

        assert_eq!(page.relative, PathBuf::from("notes.html"));
        assert!(page.html.contains("<h1>2 notes</h1>"));
    }

    #[test]
    fn unknown_layout_is_an_error() {
        let temp = tempdir().unwrap();
        let assembler = assembler_with_layout(temp.path());
        let view = write(temp.path(), "views/index.html", "---\nlayout: wide\n---\nx");

        let result = assembler.render_view(&view);

        assert!(matches!(result, Err(TemplateError::MissingLayout { .. })));
    }

    #[test]
    fn missing_default_layout_leaves_view_unwrapped() {
        let temp = tempdir().unwrap();
        let assembler = Assembler::new(AssemblerOptions::default());
        let view = write(temp.path(), "views/index.html", "<p>bare</p>");

        let page = assembler.render_view(&view).unwrap();

        assert_eq!(page.html, "<p>bare</p>");
    }

    #[test]
    fn logs_and_skips_failing_views_when_requested() {
        let temp = tempdir().unwrap();
        let good = write(temp.path(), "views/good.html", "ok");
        let bad = write(temp.path(), "views/bad.html", "{% if %}");

        let strict = Assembler::new(AssemblerOptions::default());
        assert!(strict.render_views(&[good.clone(), bad.clone()]).is_err());

        let lenient = Assembler::new(AssemblerOptions {
            log_errors: true,
            ..Default::default()
        });
        let pages = lenient.render_views(&[good, bad]).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].html, "ok");
    }
}
