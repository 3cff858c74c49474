//! Per-module analysis and rewriting.
//!
//! ES module syntax is lowered to the bundle runtime: exports become getters
//! registered with `__kiln_require.d`, imports become `var` bindings read
//! from `__kiln_require(id)`, and `require("...")` calls are renumbered.

use std::collections::HashMap;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPattern, BindingPatternKind, CallExpression, Declaration,
    ExportDefaultDeclarationKind, Expression, ImportDeclarationSpecifier, ModuleExportName,
    Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::BundleError;

const DEFAULT_LOCAL: &str = "__kiln_default";

/// A binding introduced by an import declaration.
#[derive(Debug, Clone, PartialEq)]
enum ImportBinding {
    Default(String),
    Named { imported: String, local: String },
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq)]
struct ImportRecord {
    specifier: String,
    bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq)]
enum ExportRecord {
    /// `export { local as exported }` and exported declarations
    Local { exported: String, local: String },
    /// `export { imported as exported } from "x"`; `imported: None` is `* as`
    From {
        specifier: String,
        imported: Option<String>,
        exported: String,
    },
    /// `export * from "x"`
    Star { specifier: String },
}

/// A byte-range replacement in the original source.
#[derive(Debug, Clone, PartialEq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// A run of rendered code copied unchanged from the original source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Byte offset in the rendered body
    pub out_start: usize,
    /// Byte offset in the original source
    pub src_start: usize,
    pub len: usize,
}

/// A module body rewritten for the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub code: String,
    /// Unchanged runs, in output order
    pub segments: Vec<Segment>,
}

/// What a module imports and exports, detached from the parser's arena.
#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    /// Whether the module uses ES module syntax
    pub is_esm: bool,
    imports: Vec<ImportRecord>,
    exports: Vec<ExportRecord>,
    requires: Vec<(usize, usize, String)>,
    edits: Vec<Edit>,
}

impl ModuleAnalysis {
    /// Every specifier this module depends on, in first-seen order.
    pub fn specifiers(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let from_imports = self.imports.iter().map(|i| i.specifier.as_str());
        let from_exports = self.exports.iter().filter_map(|e| match e {
            ExportRecord::From { specifier, .. } | ExportRecord::Star { specifier } => {
                Some(specifier.as_str())
            }
            ExportRecord::Local { .. } => None,
        });
        let from_requires = self.requires.iter().map(|(_, _, s)| s.as_str());

        for specifier in from_imports.chain(from_exports).chain(from_requires) {
            if !seen.iter().any(|s: &String| s == specifier) {
                seen.push(specifier.to_string());
            }
        }
        seen
    }

    /// Rewrite `source` into a module body for the runtime.
    ///
    /// `ids` maps every specifier from [`Self::specifiers`] to a module id.
    pub fn render(&self, source: &str, ids: &HashMap<String, usize>) -> Rendered {
        let id = |specifier: &str| ids.get(specifier).copied().unwrap_or(usize::MAX);
        let mut out = String::new();

        if self.is_esm {
            out.push_str("__kiln_require.r(exports);\n");
        }

        let getters: Vec<String> = self
            .exports
            .iter()
            .filter_map(|e| match e {
                ExportRecord::Local { exported, local } => Some(getter(exported, local)),
                ExportRecord::From {
                    specifier,
                    imported: Some(imported),
                    exported,
                } => Some(getter(
                    exported,
                    &format!("__kiln_m{}[{}]", id(specifier), quote(imported)),
                )),
                ExportRecord::From {
                    specifier,
                    imported: None,
                    exported,
                } => Some(getter(exported, &format!("__kiln_m{}", id(specifier)))),
                ExportRecord::Star { .. } => None,
            })
            .collect();
        if !getters.is_empty() {
            out.push_str("__kiln_require.d(exports, {\n");
            for g in getters {
                out.push_str("  ");
                out.push_str(&g);
                out.push_str(",\n");
            }
            out.push_str("});\n");
        }

        let mut declared: Vec<usize> = Vec::new();
        let mut declare = |out: &mut String, specifier: &str| {
            let module_id = id(specifier);
            if !declared.contains(&module_id) {
                declared.push(module_id);
                out.push_str(&format!(
                    "var __kiln_m{module_id} = __kiln_require({module_id});\n"
                ));
            }
            module_id
        };

        for export in &self.exports {
            match export {
                ExportRecord::From { specifier, .. } => {
                    declare(&mut out, specifier);
                }
                ExportRecord::Star { specifier } => {
                    let module_id = declare(&mut out, specifier);
                    out.push_str(&format!("__kiln_require.e(exports, __kiln_m{module_id});\n"));
                }
                ExportRecord::Local { .. } => {}
            }
        }

        for import in &self.imports {
            let module_id = declare(&mut out, &import.specifier);
            for binding in &import.bindings {
                let line = match binding {
                    ImportBinding::Default(local) => {
                        format!("var {local} = __kiln_require.n(__kiln_m{module_id});\n")
                    }
                    ImportBinding::Named { imported, local } => {
                        format!("var {local} = __kiln_m{module_id}[{}];\n", quote(imported))
                    }
                    ImportBinding::Namespace(local) => {
                        format!("var {local} = __kiln_m{module_id};\n")
                    }
                };
                out.push_str(&line);
            }
        }

        let mut edits: Vec<Edit> = self.edits.clone();
        edits.extend(self.requires.iter().map(|(start, end, specifier)| Edit {
            start: *start,
            end: *end,
            text: format!("__kiln_require({})", id(specifier)),
        }));
        edits.sort_by_key(|e| (e.start, e.end));

        let prefix = out.len();
        let (body, segments) = apply_edits(source, &edits);
        out.push_str(&body);

        Rendered {
            code: out,
            segments: segments
                .into_iter()
                .map(|segment| Segment {
                    out_start: segment.out_start + prefix,
                    ..segment
                })
                .collect(),
        }
    }
}

/// Parse a module and record its imports, exports and rewrites.
pub fn analyze(path: &Path, source: &str) -> Result<ModuleAnalysis, BundleError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
    let ret = Parser::new(&allocator, source, source_type).parse();

    if let Some(error) = ret.errors.first() {
        return Err(BundleError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        });
    }

    let mut analysis = ModuleAnalysis::default();

    for stmt in &ret.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if decl.import_kind.is_type() {
                    continue;
                }
                analysis.is_esm = true;
                let bindings = decl
                    .specifiers
                    .iter()
                    .flatten()
                    .map(|s| match s {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            ImportBinding::Default(s.local.name.to_string())
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            ImportBinding::Namespace(s.local.name.to_string())
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding::Named {
                            imported: export_name(&s.imported),
                            local: s.local.name.to_string(),
                        },
                    })
                    .collect();
                analysis.imports.push(ImportRecord {
                    specifier: decl.source.value.to_string(),
                    bindings,
                });
                remove(&mut analysis, decl.span.start, decl.span.end);
            }

            Statement::ExportNamedDeclaration(decl) => {
                analysis.is_esm = true;
                if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration) {
                        analysis.exports.push(ExportRecord::Local {
                            exported: name.clone(),
                            local: name,
                        });
                    }
                    // Strip only the `export` keyword.
                    analysis.edits.push(Edit {
                        start: decl.span.start as usize,
                        end: declaration.span().start as usize,
                        text: String::new(),
                    });
                    continue;
                }

                for spec in &decl.specifiers {
                    let exported = export_name(&spec.exported);
                    let local = export_name(&spec.local);
                    let record = match &decl.source {
                        Some(source) => ExportRecord::From {
                            specifier: source.value.to_string(),
                            imported: Some(local),
                            exported,
                        },
                        None => ExportRecord::Local { exported, local },
                    };
                    analysis.exports.push(record);
                }
                remove(&mut analysis, decl.span.start, decl.span.end);
            }

            Statement::ExportAllDeclaration(decl) => {
                analysis.is_esm = true;
                let specifier = decl.source.value.to_string();
                let record = match &decl.exported {
                    Some(name) => ExportRecord::From {
                        specifier,
                        imported: None,
                        exported: export_name(name),
                    },
                    None => ExportRecord::Star { specifier },
                };
                analysis.exports.push(record);
                remove(&mut analysis, decl.span.start, decl.span.end);
            }

            Statement::ExportDefaultDeclaration(decl) => {
                analysis.is_esm = true;
                let inner = decl.declaration.span();
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                let is_declaration = matches!(
                    decl.declaration,
                    ExportDefaultDeclarationKind::FunctionDeclaration(_)
                        | ExportDefaultDeclarationKind::ClassDeclaration(_)
                );

                let local = match named {
                    Some(name) => {
                        analysis.edits.push(Edit {
                            start: decl.span.start as usize,
                            end: inner.start as usize,
                            text: String::new(),
                        });
                        name
                    }
                    None => {
                        analysis.edits.push(Edit {
                            start: decl.span.start as usize,
                            end: inner.start as usize,
                            text: format!("var {DEFAULT_LOCAL} = "),
                        });
                        if is_declaration {
                            analysis.edits.push(Edit {
                                start: inner.end as usize,
                                end: inner.end as usize,
                                text: ";".to_string(),
                            });
                        }
                        DEFAULT_LOCAL.to_string()
                    }
                };
                analysis.exports.push(ExportRecord::Local {
                    exported: "default".to_string(),
                    local,
                });
            }

            _ => {}
        }
    }

    let mut collector = RequireCollector::default();
    collector.visit_program(&ret.program);
    analysis.requires = collector.requires;

    Ok(analysis)
}

/// Module body for an `.html` file: its contents as the default export.
pub fn html_module(source: &str) -> String {
    format!(
        "__kiln_require.r(exports);\nexports.default = {};\n",
        serde_json::Value::String(source.to_string())
    )
}

/// Collects `require("...")` calls with a single string literal argument.
#[derive(Default)]
struct RequireCollector {
    requires: Vec<(usize, usize, String)>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        let is_require =
            matches!(&call.callee, Expression::Identifier(id) if id.name == "require");
        if is_require && call.arguments.len() == 1 {
            if let Argument::StringLiteral(literal) = &call.arguments[0] {
                self.requires.push((
                    call.span.start as usize,
                    call.span.end as usize,
                    literal.value.to_string(),
                ));
            }
        }
        walk::walk_call_expression(self, call);
    }
}

fn remove(analysis: &mut ModuleAnalysis, start: u32, end: u32) {
    analysis.edits.push(Edit {
        start: start as usize,
        end: end as usize,
        text: String::new(),
    });
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

/// Names bound by an exported declaration.
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                pattern_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(f) => {
            if let Some(id) = &f.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(c) => {
            if let Some(id) = &c.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn pattern_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                pattern_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                pattern_names(element, names);
            }
            if let Some(rest) = &array.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => pattern_names(&assign.left, names),
    }
}

fn getter(exported: &str, expression: &str) -> String {
    format!("{}: function () {{ return {expression}; }}", quote(exported))
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn apply_edits(source: &str, edits: &[Edit]) -> (String, Vec<Segment>) {
    let mut out = String::with_capacity(source.len());
    let mut segments = Vec::new();
    let mut cursor = 0;

    let mut copy = |out: &mut String, start: usize, end: usize| {
        if end > start {
            segments.push(Segment {
                out_start: out.len(),
                src_start: start,
                len: end - start,
            });
            out.push_str(&source[start..end]);
        }
    };

    for edit in edits {
        if edit.start < cursor {
            // Overlaps an earlier edit.
            continue;
        }
        copy(&mut out, cursor, edit.start);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    copy(&mut out, cursor, source.len());
    (out, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs.iter().map(|(s, i)| (s.to_string(), *i)).collect()
    }

    #[test]
    fn collects_specifiers_in_order() {
        let source = r#"
import a from "./a";
import { b } from "./b";
export * from "./c";
const d = require('./d');
import again from "./a";
"#;
        let analysis = analyze(Path::new("main.js"), source).unwrap();

        assert_eq!(analysis.specifiers(), vec!["./a", "./b", "./c", "./d"]);
        assert!(analysis.is_esm);
    }

    #[test]
    fn rewrites_imports_to_bindings() {
        let source = "import def, { x as y } from './dep';\nimport * as ns from './dep';\nconsole.log(def, y, ns);\n";
        let analysis = analyze(Path::new("main.js"), source).unwrap();

        let out = analysis.render(source, &ids(&[("./dep", 1)])).code;

        assert_eq!(
            out,
            "__kiln_require.r(exports);\n\
             var __kiln_m1 = __kiln_require(1);\n\
             var def = __kiln_require.n(__kiln_m1);\n\
             var y = __kiln_m1[\"x\"];\n\
             var ns = __kiln_m1;\n\
             \n\nconsole.log(def, y, ns);\n"
        );
    }

    #[test]
    fn rewrites_exports_to_getters() {
        let source = "export const a = 1, { b } = { b: 2 };\nexport function f() {}\nconst c = 3;\nexport { c as see };\n";
        let analysis = analyze(Path::new("mod.js"), source).unwrap();

        let out = analysis.render(source, &HashMap::new()).code;

        assert!(out.contains("\"a\": function () { return a; }"));
        assert!(out.contains("\"see\": function () { return c; }"));
        assert!(out.contains("const a = 1, { b } = { b: 2 };"));
        assert!(out.contains("\nfunction f() {}"));
        assert!(!out.contains("export "));
    }

    #[test]
    fn rewrites_default_exports() {
        let source = "export default function () { return 1; }\n";
        let out = analyze(Path::new("a.js"), source)
            .unwrap()
            .render(source, &HashMap::new())
            .code;
        assert!(out.contains("var __kiln_default = function () { return 1; };"));
        assert!(out.contains("\"default\": function () { return __kiln_default; }"));

        let source = "export default class Widget {}\n";
        let out = analyze(Path::new("b.js"), source)
            .unwrap()
            .render(source, &HashMap::new())
            .code;
        assert!(out.contains("class Widget {}"));
        assert!(out.contains("\"default\": function () { return Widget; }"));

        let source = "export default 40 + 2;\n";
        let out = analyze(Path::new("c.js"), source)
            .unwrap()
            .render(source, &HashMap::new())
            .code;
        assert!(out.contains("var __kiln_default = 40 + 2;"));
    }

    #[test]
    fn rewrites_reexports() {
        let source = "export { x as y } from './dep';\nexport * from './all';\nexport * as ns from './dep';\n";
        let analysis = analyze(Path::new("index.js"), source).unwrap();

        let out = analysis.render(source, &ids(&[("./dep", 2), ("./all", 3)])).code;

        assert!(out.contains("\"y\": function () { return __kiln_m2[\"x\"]; }"));
        assert!(out.contains("\"ns\": function () { return __kiln_m2; }"));
        assert!(out.contains("__kiln_require.e(exports, __kiln_m3);"));
        assert_eq!(out.matches("var __kiln_m2 = ").count(), 1);
    }

    #[test]
    fn renumbers_require_calls() {
        let source = "var a = require(\"./a\");\nvar b = obj.require('./b');\n";
        let analysis = analyze(Path::new("cjs.js"), source).unwrap();

        assert!(!analysis.is_esm);
        assert_eq!(analysis.specifiers(), vec!["./a"]);

        let out = analysis.render(source, &ids(&[("./a", 4)])).code;

        assert!(out.starts_with("var a = __kiln_require(4);"));
        assert!(out.contains("obj.require('./b')"));
    }

    #[test]
    fn ignores_require_in_comments_and_strings() {
        let source = "// legacy: require('./old-widget')\n\
                      /* require(\"./gone\") */\n\
                      const s = \"require('./x')\";\n\
                      const t = `require('./y')`;\n\
                      const dep = require('./dep');\n";
        let analysis = analyze(Path::new("main.js"), source).unwrap();

        assert_eq!(analysis.specifiers(), vec!["./dep"]);

        let out = analysis.render(source, &ids(&[("./dep", 7)])).code;

        assert!(out.contains("// legacy: require('./old-widget')"));
        assert!(out.contains("const s = \"require('./x')\";"));
        assert!(out.contains("const t = `require('./y')`;"));
        assert!(out.contains("const dep = __kiln_require(7);"));
    }

    #[test]
    fn finds_nested_require_calls() {
        let source = "if (x) { load(require('./a')); }\nrequire(name);\nrequire('./b', 1);\n";
        let analysis = analyze(Path::new("main.js"), source).unwrap();

        assert_eq!(analysis.specifiers(), vec!["./a"]);
    }

    #[test]
    fn records_unchanged_segments() {
        let source = "import a from './a';\nconsole.log(a);\n";
        let rendered = analyze(Path::new("main.js"), source)
            .unwrap()
            .render(source, &ids(&[("./a", 1)]));

        let tail = rendered.segments.last().unwrap();
        assert_eq!(
            &rendered.code[tail.out_start..tail.out_start + tail.len],
            &source[tail.src_start..tail.src_start + tail.len]
        );
        assert_eq!(&source[tail.src_start..], "\nconsole.log(a);\n");
    }

    #[test]
    fn reports_parse_errors() {
        let err = analyze(Path::new("bad.js"), "const = ;").unwrap_err();

        assert!(matches!(err, BundleError::Parse { .. }));
    }

    #[test]
    fn html_modules_export_their_source() {
        let out = html_module("<p class=\"x\">hi</p>\n");

        assert!(out.contains(r#"exports.default = "<p class=\"x\">hi</p>\n";"#));
    }
}
