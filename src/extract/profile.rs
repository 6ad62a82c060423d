//! Site-specific body extraction.
//!
//! A [`SiteProfile`] says where a site keeps its article body and how the
//! body should be stored: the anchor's whole subtree, or only selected
//! descendants (usually the `<p>` elements), as plain text or as markup.

use serde::{Deserialize, Serialize};

use super::{Node, Predicate, extract_subtree};
use crate::error::ExtractError;
use crate::utils::normalize_whitespace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// Whitespace-normalized text, one line per selected element.
    #[default]
    Text,
    /// Rendered markup, one line per selected element.
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Predicate path to the element holding the article.
    pub selector: Vec<Predicate>,
    /// When set, only these descendants of the anchor make up the body.
    #[serde(default)]
    pub paragraphs: Option<Predicate>,
    #[serde(default)]
    pub format: BodyFormat,
}

impl SiteProfile {
    pub fn new(selector: Vec<Predicate>) -> Self {
        Self {
            selector,
            paragraphs: None,
            format: BodyFormat::default(),
        }
    }

    pub fn with_paragraphs(mut self, paragraphs: Predicate) -> Self {
        self.paragraphs = Some(paragraphs);
        self
    }

    pub fn with_format(mut self, format: BodyFormat) -> Self {
        self.format = format;
        self
    }

    /// Extract the article body from a downloaded page.
    pub fn extract_body(&self, html: &[u8]) -> Result<String, ExtractError> {
        let anchor = extract_subtree(html, &self.selector)?;
        let parts: Vec<&Node> = match &self.paragraphs {
            Some(pred) => anchor.descendants(pred),
            None => vec![&anchor],
        };

        let lines: Vec<String> = parts
            .into_iter()
            .map(|node| match self.format {
                BodyFormat::Text => normalize_whitespace(&node.text()),
                BodyFormat::Html => node.render(),
            })
            .filter(|line| !line.is_empty())
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &[u8] = br#"<html><body>
        <div id="singlePage">
          <h2>Lead   text</h2>
          <p>Erster
             Absatz.</p>
          <div class="ad"><p></p></div>
          <p>Zweiter <a href="/x">Absatz</a>.</p>
        </div></body></html>"#;

    fn tagi() -> SiteProfile {
        SiteProfile::new(vec![Predicate::Id("singlePage".to_string())])
            .with_paragraphs(Predicate::Tag("p".to_string()))
    }

    #[test]
    fn test_paragraph_text() {
        assert_eq!(
            tagi().extract_body(PAGE).unwrap(),
            "Erster Absatz.\nZweiter Absatz."
        );
    }

    #[test]
    fn test_paragraph_html() {
        let body = tagi().with_format(BodyFormat::Html).extract_body(PAGE).unwrap();
        assert!(body.starts_with("<p>Erster"));
        assert!(body.ends_with("</p>\n<p></p>\n<p>Zweiter <a href=\"/x\">Absatz</a>.</p>"));
    }

    #[test]
    fn test_whole_anchor_text() {
        let profile = SiteProfile::new(vec![Predicate::Id("singlePage".to_string())]);
        assert_eq!(
            profile.extract_body(PAGE).unwrap(),
            "Lead text Erster Absatz. Zweiter Absatz."
        );
    }

    #[test]
    fn test_missing_anchor_propagates() {
        let profile = SiteProfile::new(vec![Predicate::Class("article".to_string())]);
        assert!(matches!(
            profile.extract_body(PAGE),
            Err(ExtractError::AnchorNotFound { .. })
        ));
    }

    #[test]
    fn test_profile_from_yaml() {
        let profile: SiteProfile =
            serde_yaml::from_str("selector: ['#singlePage']\nparagraphs: p\nformat: html\n").unwrap();
        assert_eq!(profile, tagi().with_format(BodyFormat::Html));
    }
}
