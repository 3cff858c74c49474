//! Module graph construction and bundle emission.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_sourcemap::{SourceMap, SourceMapBuilder};
use oxc_span::SourceType;

use crate::module::{analyze, html_module, ModuleAnalysis, Segment};
use crate::resolve::Resolver;
use crate::BundleError;

/// Options for a single bundle.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Entry module
    pub entry: PathBuf,

    /// Paths in module banners are shown relative to this directory
    pub root: PathBuf,

    /// Development build: `__DEV__` is true, output is not minified and
    /// carries an inline source map
    pub dev: bool,
}

/// A finished bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Bundle source
    pub code: String,

    /// Every module included, by id
    pub modules: Vec<PathBuf>,
}

/// Every error hit while bundling.
#[derive(Debug)]
pub struct BundleFailure {
    pub errors: Vec<BundleError>,
}

impl fmt::Display for BundleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for BundleFailure {}

impl From<BundleError> for BundleFailure {
    fn from(error: BundleError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// One module in the graph.
#[derive(Debug)]
struct ModuleRecord {
    path: PathBuf,
    source: String,
    kind: ModuleKind,
    deps: HashMap<String, usize>,
}

#[derive(Debug)]
enum ModuleKind {
    Script(ModuleAnalysis),
    Html,
}

/// Bundles a module graph into one script.
#[derive(Debug, Clone)]
pub struct Bundler {
    options: BundleOptions,
    resolver: Resolver,
}

impl Bundler {
    /// Create a bundler with the default resolver.
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            resolver: Resolver::default(),
        }
    }

    /// Walk the graph from the entry and emit the bundle.
    ///
    /// Errors from every module are collected before failing.
    pub fn bundle(&self) -> Result<Bundle, BundleFailure> {
        let entry = fs::canonicalize(&self.options.entry).map_err(|e| BundleError::Read {
            path: self.options.entry.display().to_string(),
            message: e.to_string(),
        })?;

        let mut modules: Vec<ModuleRecord> = vec![load_module(&entry)?];
        let mut ids: HashMap<PathBuf, usize> = HashMap::from([(entry, 0)]);
        let mut errors = Vec::new();

        let mut index = 0;
        while index < modules.len() {
            let specifiers = match &modules[index].kind {
                ModuleKind::Script(analysis) => analysis.specifiers(),
                ModuleKind::Html => Vec::new(),
            };

            for specifier in specifiers {
                let importer = modules[index].path.clone();
                let resolved = match self.resolver.resolve(&specifier, &importer) {
                    Ok(path) => path,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };

                let id = match ids.get(&resolved) {
                    Some(id) => *id,
                    None => match load_module(&resolved) {
                        Ok(record) => {
                            let id = modules.len();
                            tracing::debug!("Module {} = {}", id, resolved.display());
                            ids.insert(resolved, id);
                            modules.push(record);
                            id
                        }
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    },
                };
                modules[index].deps.insert(specifier, id);
            }

            index += 1;
        }

        if !errors.is_empty() {
            return Err(BundleFailure { errors });
        }

        let (code, placed) = self.emit(&modules);
        let code = if self.options.dev {
            let map = self.source_map(&code, &modules, &placed);
            format!("{code}//# sourceMappingURL={}\n", map.to_data_url())
        } else {
            minify(&code)?
        };

        Ok(Bundle {
            code,
            modules: modules.into_iter().map(|m| m.path).collect(),
        })
    }

    /// Emit the bundle, returning it with each module's body offset and
    /// unchanged segments.
    fn emit(&self, modules: &[ModuleRecord]) -> (String, Vec<(usize, Vec<Segment>)>) {
        let mut out = String::new();
        let mut placed = Vec::with_capacity(modules.len());
        out.push_str("(function () {\n");
        out.push_str(&format!("var __DEV__ = {};\n", self.options.dev));
        out.push_str("var __kiln_modules = [\n");

        for (id, module) in modules.iter().enumerate() {
            let (body, segments) = match &module.kind {
                ModuleKind::Script(analysis) => {
                    let rendered = analysis.render(&module.source, &module.deps);
                    (rendered.code, rendered.segments)
                }
                ModuleKind::Html => (html_module(&module.source), Vec::new()),
            };
            let name = self.display_name(&module.path);

            out.push_str(&format!("/* {id}: {} */\n", name.replace("*/", "*\\/")));
            out.push_str("function (module, exports, __kiln_require) {\n");
            placed.push((out.len(), segments));
            out.push_str(&body);
            out.push_str("\n},\n");
        }

        out.push_str("];\n");
        out.push_str(RUNTIME);
        out.push_str("__kiln_require(0);\n");
        out.push_str("})();\n");
        (out, placed)
    }

    /// Map every line of unchanged module code back to its source.
    fn source_map(
        &self,
        code: &str,
        modules: &[ModuleRecord],
        placed: &[(usize, Vec<Segment>)],
    ) -> SourceMap {
        let mut builder = SourceMapBuilder::default();
        let out_lines = LineIndex::new(code);

        for (module, (body_start, segments)) in modules.iter().zip(placed) {
            let source_id = builder
                .set_source_and_content(&self.display_name(&module.path), &module.source);
            let src_lines = LineIndex::new(&module.source);

            for segment in segments {
                let copied = &module.source[segment.src_start..segment.src_start + segment.len];
                let line_starts = std::iter::once(0).chain(
                    copied
                        .match_indices('\n')
                        .map(|(i, _)| i + 1)
                        .filter(|i| *i < segment.len),
                );

                for offset in line_starts {
                    let (dst_line, dst_col) =
                        out_lines.position(code, body_start + segment.out_start + offset);
                    let (src_line, src_col) =
                        src_lines.position(&module.source, segment.src_start + offset);
                    builder.add_token(dst_line, dst_col, src_line, src_col, Some(source_id), None);
                }
            }
        }

        builder.into_sourcemap()
    }

    /// Module path relative to the project root, for banners and maps.
    fn display_name(&self, path: &Path) -> String {
        let root = fs::canonicalize(&self.options.root).unwrap_or_default();
        path.strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string()
            .replace('\\', "/")
    }
}

/// Byte offsets of line starts, for line and column lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    /// Zero-based line and UTF-16 column of a byte offset.
    fn position(&self, text: &str, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|start| *start <= offset) - 1;
        let column = text[self.starts[line]..offset].encode_utf16().count();
        (line as u32, column as u32)
    }
}

fn load_module(path: &Path) -> Result<ModuleRecord, BundleError> {
    let source = fs::read_to_string(path).map_err(|e| BundleError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let is_html = path.extension().and_then(|e| e.to_str()) == Some("html");
    let kind = if is_html {
        ModuleKind::Html
    } else {
        ModuleKind::Script(analyze(path, &source)?)
    };

    Ok(ModuleRecord {
        path: path.to_path_buf(),
        source,
        kind,
        deps: HashMap::new(),
    })
}

/// Reprint the bundle without whitespace.
fn minify(code: &str) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();

    if let Some(error) = ret.errors.first() {
        return Err(BundleError::Minify(error.to_string()));
    }

    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .build(&ret.program)
        .code)
}

const RUNTIME: &str = r#"var __kiln_cache = {};
function __kiln_require(id) {
  var cached = __kiln_cache[id];
  if (cached) return cached.exports;
  var module = __kiln_cache[id] = { exports: {} };
  __kiln_modules[id].call(module.exports, module, module.exports, __kiln_require);
  return module.exports;
}
__kiln_require.r = function (exports) {
  Object.defineProperty(exports, "__esModule", { value: true });
};
__kiln_require.d = function (exports, getters) {
  for (var key in getters) {
    Object.defineProperty(exports, key, { enumerable: true, get: getters[key] });
  }
};
__kiln_require.e = function (exports, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || Object.prototype.hasOwnProperty.call(exports, key)) return;
    Object.defineProperty(exports, key, {
      enumerable: true,
      get: function () { return source[key]; }
    });
  });
};
__kiln_require.n = function (m) {
  return m && m.__esModule ? m["default"] : m;
};
"#;
