//! Script module bundler for kiln.
//!
//! Resolves a module graph from a single entry file, rewrites ES module syntax
//! into a small runtime, and emits one self-contained bundle.

pub mod bundle;
pub mod module;
pub mod resolve;

pub use bundle::{Bundle, BundleFailure, BundleOptions, Bundler};
pub use module::{analyze, ModuleAnalysis};
pub use resolve::Resolver;

/// Errors that can occur while bundling.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Cannot resolve '{specifier}' from {importer}")]
    Unresolved { specifier: String, importer: String },

    #[error("Failed to minify bundle: {0}")]
    Minify(String),
}
