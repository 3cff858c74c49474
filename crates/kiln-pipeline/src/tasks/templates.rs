//! Page assembly task.

use kiln_templates::{Assembler, AssemblerOptions, TemplateSource};

use crate::config::PipelineConfig;
use crate::sources::SourceSet;
use crate::tasks::{write_output, TaskError};

/// Render every view into `templates.dest`.
///
/// In dev mode a failing view is logged and skipped so one broken page does
/// not take down the rest of the site.
pub fn templates(config: &PipelineConfig) -> Result<usize, TaskError> {
    let cfg = &config.templates;

    let mut assembler = Assembler::new(AssemblerOptions {
        default_layout: cfg.default_layout.clone(),
        log_errors: config.dev,
        dev: config.dev,
    });

    assembler.load_layouts(&select(config, &cfg.layouts)?)?;
    assembler.load_partials(&select(config, &cfg.partials)?)?;
    assembler.load_data(&select(config, &cfg.data)?)?;

    let views = select(config, &cfg.src)?;
    let pages = assembler.render_views(&views)?;

    let dest = config.output(&cfg.dest);
    for page in &pages {
        write_output(&dest.join(&page.relative), &page.html)?;
    }

    tracing::debug!("Rendered {} of {} views", pages.len(), views.len());
    Ok(pages.len())
}

fn select(config: &PipelineConfig, globs: &[String]) -> Result<Vec<TemplateSource>, TaskError> {
    let set = SourceSet::new(&config.root, globs)?;
    Ok(set
        .files()
        .into_iter()
        .map(|file| TemplateSource::new(file.path, file.relative))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{config, write};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn site(root: &std::path::Path) {
        write(
            root,
            "src/templates/layouts/default.html",
            "<html><title>{{ data.site.name }}</title><body>{{ body }}</body></html>",
        );
        write(root, "src/templates/components/button.html", "<button>{{ label }}</button>");
        write(root, "src/data/site.json", r#"{"name": "Kiln"}"#);
        write(
            root,
            "src/templates/index.html",
            "{% with label = \"Go\" %}{% include \"button\" %}{% endwith %}",
        );
        write(root, "src/templates/docs/intro.md", "# Intro\n");
    }

    #[test]
    fn renders_views_into_dest() {
        let temp = tempdir().unwrap();
        site(temp.path());

        let written = templates(&config(temp.path(), false)).unwrap();

        assert_eq!(written, 2);
        let index = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
        assert_eq!(
            index,
            "<html><title>Kiln</title><body><button>Go</button></body></html>"
        );
        let intro = fs::read_to_string(temp.path().join("dist/docs/intro.html")).unwrap();
        assert!(intro.contains("<h1>Intro</h1>"));
        assert!(!temp.path().join("dist/layouts").exists());
        assert!(!temp.path().join("dist/components").exists());
    }

    #[test]
    fn dev_mode_skips_broken_views() {
        let temp = tempdir().unwrap();
        site(temp.path());
        write(temp.path(), "src/templates/broken.html", "{% if %}");

        assert!(templates(&config(temp.path(), false)).is_err());

        let written = templates(&config(temp.path(), true)).unwrap();
        assert_eq!(written, 2);
        assert!(!temp.path().join("dist/broken.html").exists());
    }
}
