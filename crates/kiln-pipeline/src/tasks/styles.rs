//! Stylesheet compilation.
//!
//! SCSS is compiled with grass, then lightningcss adds vendor prefixes for
//! the configured browsers and minifies outside dev mode. Every stylesheet
//! carries an inline source map.
//!
//! grass emits no source maps, so for SCSS entries the map points into the
//! compiled CSS, which is embedded as the source content.

use std::fs;
use std::path::Path;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::config::PipelineConfig;
use crate::tasks::{write_output, TaskError};

/// Compile the entry stylesheet into `styles.dest` as `<stem>.css`.
pub fn styles(config: &PipelineConfig) -> Result<usize, TaskError> {
    let cfg = &config.styles;
    let entry = config.path(&cfg.src);

    if !entry.is_file() {
        tracing::debug!("No stylesheet at {}, skipping", entry.display());
        return Ok(0);
    }

    let css = compile_sass(config, &entry).inspect_err(|e| tracing::error!("{}", e))?;
    let css = process_css(&css, &cfg.src, &config.root, &cfg.browsers, !config.dev)
        .inspect_err(|e| tracing::error!("{}", e))?;

    let stem = entry
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());
    let output = config.output(&cfg.dest).join(format!("{stem}.css"));
    write_output(&output, css)?;

    tracing::debug!("Wrote {}", output.display());
    Ok(1)
}

fn compile_sass(config: &PipelineConfig, entry: &Path) -> Result<String, TaskError> {
    let is_plain_css = entry.extension().and_then(|e| e.to_str()) == Some("css");
    if is_plain_css {
        return fs::read_to_string(entry).map_err(|e| TaskError::io(entry, e));
    }

    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    for dir in &config.styles.include_paths {
        options = options.load_path(config.path(dir));
    }

    grass::from_path(entry, &options).map_err(|e| TaskError::Style {
        path: entry.display().to_string(),
        message: e.to_string(),
    })
}

/// Prefix for `browsers`, optionally minify, and append an inline source map.
///
/// `path` names the source in the map, relative to `root`.
fn process_css(
    css: &str,
    path: &Path,
    root: &Path,
    browsers: &[String],
    minify: bool,
) -> Result<String, TaskError> {
    let style_error = |message: String| TaskError::Style {
        path: path.display().to_string(),
        message,
    };

    let browsers = Browsers::from_browserslist(browsers)
        .map_err(|e| style_error(format!("Invalid browser query: {}", e)))?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut source_map = SourceMap::new(&root.to_string_lossy());
    let source = root.join(path);
    source_map.add_source(&source.to_string_lossy());
    source_map
        .set_source_content(0, css)
        .map_err(|e| style_error(format!("Source map error: {}", e)))?;

    let mut stylesheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: path.display().to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| style_error(format!("CSS parse error: {}", e)))?;

    stylesheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| style_error(format!("CSS transform error: {}", e)))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            targets,
            source_map: Some(&mut source_map),
            ..PrinterOptions::default()
        })
        .map_err(|e| style_error(format!("CSS print error: {}", e)))?;

    let url = source_map
        .to_data_url(None)
        .map_err(|e| style_error(format!("Source map error: {}", e)))?;

    Ok(format!("{}\n/*# sourceMappingURL={} */\n", result.code.trim_end(), url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{config, write};
    use tempfile::tempdir;

    #[test]
    fn compiles_scss_with_partials() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/assets/styles/_vars.scss", "$accent: #ff0000;\n");
        write(
            temp.path(),
            "src/assets/styles/main.scss",
            "@use 'vars';\n.nav { a { color: vars.$accent; } }\n",
        );

        assert_eq!(styles(&config(temp.path(), true)).unwrap(), 1);

        let css = fs::read_to_string(temp.path().join("dist/assets/styles/main.css")).unwrap();
        assert!(css.contains(".nav a"));
        assert!(css.contains("red") || css.contains("#f00") || css.contains("#ff0000"));
    }

    #[test]
    fn resolves_include_paths() {
        let temp = tempdir().unwrap();
        write(temp.path(), "node_modules/kit/_base.scss", "body { margin: 0; }\n");
        write(temp.path(), "src/assets/styles/main.scss", "@import 'kit/base';\n");

        styles(&config(temp.path(), true)).unwrap();

        let css = fs::read_to_string(temp.path().join("dist/assets/styles/main.css")).unwrap();
        assert!(css.contains("margin: 0"));
    }

    #[test]
    fn prefixes_for_configured_browsers() {
        let css = process_css(
            ".a { user-select: none; }",
            Path::new("main.css"),
            Path::new("/project"),
            &["safari 10".to_string()],
            false,
        )
        .unwrap();

        assert!(css.contains("-webkit-user-select"));
    }

    #[test]
    fn minifies_outside_dev_mode() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "src/assets/styles/main.scss",
            ".a {\n  color: red;\n}\n\n.b {\n  color: blue;\n}\n",
        );

        styles(&config(temp.path(), false)).unwrap();

        let css = fs::read_to_string(temp.path().join("dist/assets/styles/main.css")).unwrap();
        let (code, map) = css.split_once("\n/*# sourceMappingURL=").unwrap();
        assert!(!code.contains('\n'));
        assert!(code.contains(".a{color:red}"));
        assert!(map.starts_with("data:application/json"));
    }

    #[test]
    fn appends_inline_source_map() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/assets/styles/main.scss", ".a { color: red; }\n");

        styles(&config(temp.path(), true)).unwrap();

        let css = fs::read_to_string(temp.path().join("dist/assets/styles/main.css")).unwrap();
        let url = css
            .split("/*# sourceMappingURL=data:application/json;charset=utf-8;base64,")
            .nth(1)
            .unwrap();
        assert!(url.trim_end().ends_with("*/"));
        assert!(css.starts_with(".a"));
    }

    #[test]
    fn skips_missing_entry() {
        let temp = tempdir().unwrap();

        assert_eq!(styles(&config(temp.path(), false)).unwrap(), 0);
        assert!(!temp.path().join("dist/assets/styles").exists());
    }

    #[test]
    fn reports_compile_errors() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/assets/styles/main.scss", ".a { color: $missing; }\n");

        let err = styles(&config(temp.path(), true)).unwrap_err();

        assert!(matches!(err, TaskError::Style { .. }));
        assert!(!temp.path().join("dist/assets/styles/main.css").exists());
    }
}
