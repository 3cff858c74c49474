//! Front matter extraction for views and partials.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// YAML front matter at the top of a template file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Frontmatter {
    /// Layout to render the view into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,

    /// Every other key, exposed to templates as `page.<key>`
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

/// Extract front matter from a template source.
///
/// Returns the parsed front matter and the remaining body after the block.
/// Sources without a leading `---` have empty front matter.
pub fn extract_frontmatter(source: &str) -> Result<(Frontmatter, &str), FrontmatterError> {
    let trimmed = source.trim_start();

    if !trimmed.starts_with("---") {
        return Ok((Frontmatter::default(), source));
    }

    let after_open = &trimmed[3..];
    let Some(close_pos) = after_open.find("\n---") else {
        return Err(FrontmatterError::Unclosed);
    };

    let yaml_content = after_open[..close_pos].trim();
    let remaining = &after_open[close_pos + 4..];
    // Drop the rest of the closing fence line.
    let remaining = match remaining.find('\n') {
        Some(pos) => &remaining[pos + 1..],
        None => "",
    };

    if yaml_content.is_empty() {
        return Ok((Frontmatter::default(), remaining));
    }

    let frontmatter: Frontmatter = serde_yaml::from_str(yaml_content)
        .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    Ok((frontmatter, remaining))
}

/// Errors that can occur when parsing front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed front matter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in front matter: {0}")]
    InvalidYaml(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_layout_and_fields() {
        let source = "---\nlayout: wide\ntitle: About us\norder: 2\n---\n<h1>About</h1>\n";

        let (fm, body) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.layout.as_deref(), Some("wide"));
        assert_eq!(
            fm.fields.get("title"),
            Some(&serde_yaml::Value::String("About us".to_string()))
        );
        assert_eq!(body, "<h1>About</h1>\n");
    }

    #[test]
    fn passes_through_plain_templates() {
        let source = "<p>{{ page.title }}</p>";

        let (fm, body) = extract_frontmatter(source).unwrap();

        assert_eq!(fm, Frontmatter::default());
        assert_eq!(body, source);
    }

    #[test]
    fn accepts_empty_block() {
        let (fm, body) = extract_frontmatter("---\n---\nbody").unwrap();

        assert!(fm.layout.is_none());
        assert_eq!(body, "body");
    }

    #[test]
    fn errors_on_unclosed_block() {
        let result = extract_frontmatter("---\ntitle: Test\n<p>no fence</p>");

        assert!(matches!(result, Err(FrontmatterError::Unclosed)));
    }

    #[test]
    fn errors_on_invalid_yaml() {
        let result = extract_frontmatter("---\ntitle: [broken\n---\n");

        assert!(matches!(result, Err(FrontmatterError::InvalidYaml(_))));
    }
}
