//! Scaffold a new project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Files written by `init`, relative to the project root. The config file is
/// written separately under its configured name.
const SCAFFOLD: &[(&str, &str)] = &[
    ("src/templates/layouts/default.html", DEFAULT_LAYOUT),
    ("src/templates/components/nav.html", DEFAULT_NAV),
    ("src/templates/index.html", DEFAULT_INDEX),
    ("src/templates/about.md", DEFAULT_ABOUT),
    ("src/data/site.json", DEFAULT_SITE_DATA),
    ("src/assets/scripts/main.js", DEFAULT_MAIN_JS),
    ("src/assets/scripts/greeting.js", DEFAULT_GREETING_JS),
    ("src/assets/styles/main.scss", DEFAULT_MAIN_SCSS),
    ("src/assets/styles/_variables.scss", DEFAULT_VARIABLES_SCSS),
];

/// Directories created empty.
const DIRECTORIES: &[&str] = &["src/assets/images", "src/assets/fonts"];

/// Run the init command.
///
/// Existing files are left alone unless `yes` is set.
pub fn run(root: &Path, config_file: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing kiln project in {}...", root.display());

    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create {}", root.display()))?;

    write_file(&root.join(config_file), DEFAULT_CONFIG, yes)?;

    for (relative, content) in SCAFFOLD {
        write_file(&root.join(relative), content, yes)?;
    }

    for dir in DIRECTORIES {
        let path = root.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'kiln serve' to start the development server.");

    Ok(())
}

fn write_file(path: &Path, content: &str, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        tracing::warn!("{} already exists. Use --yes to overwrite.", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Created {}", path.display());
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Kiln configuration
#
# Every key is optional. Paths and globs are relative to this file's
# directory; a leading "!" in a glob excludes.

# Output directory, removed before each build. Every category's dest
# below is relative to it.
dest = "dist"

# Desktop notification when the script bundle fails
# notify = true

[templates]
# src = ["src/templates/**/*", "!src/templates/layouts/**", "!src/templates/components/**"]
# dest = ""
# layouts = ["src/templates/layouts/*"]
# partials = ["src/templates/components/**/*"]
# data = ["src/data/**/*.{json,yml}"]
# default_layout = "default"

[scripts]
# src = "src/assets/scripts/main.js"
# dest = "assets/scripts"

[styles]
# src = "src/assets/styles/main.scss"
# dest = "assets/styles"
browsers = ["last 1 version"]
# include_paths = ["node_modules"]

[images]
# src = ["src/assets/images/**/*"]
# dest = "assets/images"
jpeg_quality = 85

[fonts]
# src = ["src/assets/fonts/**/*"]
# dest = "assets/fonts"

[server]
# host = "127.0.0.1"
port = 3000
# open = true
# debounce_ms = 100
"#;

const DEFAULT_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ default(page.title, data.site.name) }}</title>
  <link rel="stylesheet" href="/assets/styles/main.css">
</head>
<body>
  {% include "nav" %}
  <main>
    {{ body }}
  </main>
  <script src="/assets/scripts/main.js"></script>
</body>
</html>
"#;

const DEFAULT_NAV: &str = r#"<nav>
  <a href="/">{{ data.site.name }}</a>
  {% for link in data.site.links %}
  <a href="{{ link.href }}">{{ link.title }}</a>
  {% endfor %}
</nav>
"#;

const DEFAULT_INDEX: &str = r#"---
title: Home
---
<h1>{{ data.site.name }}</h1>
<p>{{ data.site.tagline }}</p>
{% if dev %}<p><small>Development build</small></p>{% endif %}
"#;

const DEFAULT_ABOUT: &str = r#"---
title: About
---
# About

This page is written in **Markdown** and wrapped in the default layout.
"#;

const DEFAULT_SITE_DATA: &str = r#"{
  "name": "My Site",
  "tagline": "Built with kiln.",
  "links": [
    { "title": "About", "href": "/about.html" }
  ]
}
"#;

const DEFAULT_MAIN_JS: &str = r#"import { greet } from './greeting';

if (__DEV__) {
  console.log(greet('developer'));
}
"#;

const DEFAULT_GREETING_JS: &str = r#"export function greet(name) {
  return 'Hello, ' + name + '!';
}
"#;

const DEFAULT_MAIN_SCSS: &str = r#"@use 'variables' as *;

body {
  margin: 0;
  font-family: $font-stack;
  color: $text;
}

nav {
  display: flex;
  gap: 1rem;
  padding: 1rem;
  background: $accent;

  a {
    color: white;
  }
}

main {
  max-width: 48rem;
  margin: 0 auto;
  padding: 1rem;
}
"#;

const DEFAULT_VARIABLES_SCSS: &str = r#"$font-stack: system-ui, sans-serif;
$text: #222;
$accent: #b5451b;
"#;
