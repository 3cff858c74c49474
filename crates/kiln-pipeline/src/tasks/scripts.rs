//! Script bundling task.

use kiln_bundler::{BundleOptions, Bundler};

use crate::config::PipelineConfig;
use crate::desktop;
use crate::tasks::{write_output, TaskError};

/// Bundle the entry module into `scripts.dest` as `<entry stem>.js`.
pub fn scripts(config: &PipelineConfig) -> Result<usize, TaskError> {
    let entry = config.path(&config.scripts.src);
    let bundler = Bundler::new(BundleOptions {
        entry: entry.clone(),
        root: config.root.clone(),
        dev: config.dev,
    });

    let bundle = bundler.bundle().inspect_err(|failure| {
        for error in &failure.errors {
            tracing::error!("{}", error);
            if config.notify {
                desktop::notify("JS Build Error", &error.to_string());
            }
        }
    })?;

    let stem = entry
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());
    let output = config.output(&config.scripts.dest).join(format!("{stem}.js"));
    write_output(&output, &bundle.code)?;

    tracing::debug!(
        "Bundled {} modules into {}",
        bundle.modules.len(),
        output.display()
    );
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{config, write};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_bundle_named_after_entry() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "src/assets/scripts/main.js",
            "import { greet } from './greet';\ngreet();\n",
        );
        write(
            temp.path(),
            "src/assets/scripts/greet.js",
            "export function greet() { console.log('hi'); }\n",
        );

        assert_eq!(scripts(&config(temp.path(), true)).unwrap(), 1);

        let code = fs::read_to_string(temp.path().join("dist/assets/scripts/main.js")).unwrap();
        assert!(code.contains("console.log('hi')"));
        assert!(code.contains("var __DEV__ = true;"));
    }

    #[test]
    fn reports_missing_imports() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/assets/scripts/main.js", "import './nope';\n");

        let err = scripts(&config(temp.path(), true)).unwrap_err();

        assert!(matches!(err, TaskError::Bundle(_)));
        assert!(!temp.path().join("dist/assets/scripts/main.js").exists());
    }
}
