//! Template assembler for kiln.
//!
//! Composes pages from views, layouts, partials and data files, with a fixed
//! set of helper functions registered on every environment.

pub mod assembler;
pub mod frontmatter;
pub mod helpers;

pub use assembler::{Assembler, AssemblerOptions, RenderedPage, TemplateError, TemplateSource};
pub use frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};
pub use helpers::register_helpers;
