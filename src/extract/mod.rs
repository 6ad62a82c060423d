//! Streaming extraction of one section of an HTML page.
//!
//! News pages are large and almost all of their markup is irrelevant; the
//! article body lives under a single well-known element. [`extract_subtree`]
//! walks the page once with a [`Tokenizer`], comparing start tags against a
//! [`Predicate`] path, and only materializes the subtree of the element the
//! last predicate matches (the *anchor*). Nothing before the anchor and
//! nothing after its closing tag is ever stored.
//!
//! # Predicate paths
//!
//! A path is a descendant chain: predicate `n + 1` is only searched inside
//! the element matched by predicate `n`. When that element closes without a
//! match, the search falls back to predicate `n` again. The scan keeps the
//! tag names of the open elements and, per matched predicate, the stack
//! height its element was opened at; the elements themselves are never
//! stored.
//!
//! # Malformed markup
//!
//! Tree construction is best-effort, and the scan before the anchor follows
//! the same rules. An end tag that closes an element deeper in the stack
//! implicitly closes the elements above it; an end tag that matches no open
//! element is ignored. Both are logged at debug level and never abort the
//! extraction.

pub mod node;
pub mod predicate;
pub mod profile;
pub mod tokenizer;

pub use node::{Content, Node};
pub use predicate::Predicate;
pub use profile::{BodyFormat, SiteProfile};
pub use tokenizer::{Attribute, Token, Tokenizer};

use tracing::debug;

use crate::error::ExtractError;

/// Locate the anchor of `path` in `html` and return its subtree.
///
/// # Errors
///
/// - [`ExtractError::AnchorNotFound`] if the input ends (or cannot be
///   tokenized) before every predicate of the path has matched
/// - [`ExtractError::TruncatedDocument`] if the input ends before the
///   anchor's closing tag
pub fn extract_subtree(html: &[u8], path: &[Predicate]) -> Result<Node, ExtractError> {
    let Some(last) = path.len().checked_sub(1) else {
        return Err(ExtractError::AnchorNotFound {
            predicate: "<empty path>".to_string(),
        });
    };

    let mut tokens = Tokenizer::new(html);
    // Tag names of the elements open at the current position.
    let mut open: Vec<String> = Vec::new();
    // Height of `open` at which each matched (non-final) predicate's element was opened.
    let mut scopes: Vec<usize> = Vec::with_capacity(last);

    while let Some(Ok(token)) = tokens.next() {
        match token {
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                let predicate = &path[scopes.len()];
                let matched = predicate.matches(&name, &attrs);
                if matched && scopes.len() == last {
                    let anchor = Node::new(name, attrs);
                    if self_closing {
                        return Ok(anchor);
                    }
                    return build_subtree(&mut tokens, anchor);
                }
                if !self_closing {
                    if matched {
                        scopes.push(open.len());
                    }
                    open.push(name);
                }
            }
            Token::EndTag { name } => {
                let Some(pos) = open.iter().rposition(|tag| *tag == name) else {
                    debug!(tag = %name, "ignoring end tag without open element");
                    continue;
                };
                if pos + 1 != open.len() {
                    debug!(tag = %name, implicitly_closed = open.len() - pos - 1, "mismatched end tag");
                }
                open.truncate(pos);
                while scopes.last().is_some_and(|&height| height >= open.len()) {
                    scopes.pop();
                }
            }
            Token::Text(_) | Token::Comment(_) | Token::Doctype(_) => {}
        }
    }

    Err(ExtractError::AnchorNotFound {
        predicate: path[scopes.len()].to_string(),
    })
}

/// Consume tokens until `anchor` is closed, building its subtree.
fn build_subtree(tokens: &mut Tokenizer<'_>, anchor: Node) -> Result<Node, ExtractError> {
    let mut stack = vec![anchor];

    for token in tokens {
        let Ok(token) = token else {
            break;
        };
        match token {
            Token::StartTag {
                name,
                attrs,
                self_closing: true,
            } => {
                if let Some(top) = stack.last_mut() {
                    top.push_element(Node::new(name, attrs));
                }
            }
            Token::StartTag { name, attrs, .. } => stack.push(Node::new(name, attrs)),
            Token::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&text);
                }
            }
            Token::EndTag { name } => {
                let Some(open) = stack.iter().rposition(|node| node.name == name) else {
                    debug!(tag = %name, "ignoring end tag without open element");
                    continue;
                };
                if open + 1 != stack.len() {
                    let top = stack.last().map(|n| n.name.as_str()).unwrap_or_default();
                    debug!(tag = %name, open = %top, implicitly_closed = stack.len() - open - 1, "mismatched end tag");
                }
                while stack.len() > open {
                    let Some(node) = stack.pop() else { break };
                    match stack.last_mut() {
                        Some(parent) => parent.push_element(node),
                        None => return Ok(node),
                    }
                }
            }
            Token::Comment(_) | Token::Doctype(_) => {}
        }
    }

    Err(ExtractError::TruncatedDocument { open: stack.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(predicates: &[&str]) -> Vec<Predicate> {
        predicates.iter().map(|p| p.parse().unwrap()).collect()
    }

    fn paragraphs(node: &Node) -> Vec<String> {
        node.descendants(&Predicate::Tag("p".to_string()))
            .into_iter()
            .map(Node::text)
            .collect()
    }

    #[test]
    fn test_extracts_paragraphs_in_order() {
        let html = br#"<div id="x"><p>Hello</p><p>World</p></div>"#;
        let node = extract_subtree(html, &path(&["#x"])).unwrap();
        assert_eq!(paragraphs(&node), vec!["Hello", "World"]);
    }

    #[test]
    fn test_missing_anchor_is_reported() {
        let html = br#"<div id="y"><p>Hello</p></div>"#;
        let err = extract_subtree(html, &path(&["#x"])).unwrap_err();
        assert_eq!(
            err,
            ExtractError::AnchorNotFound {
                predicate: "#x".to_string()
            }
        );
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(matches!(
            extract_subtree(b"<p>x</p>", &[]),
            Err(ExtractError::AnchorNotFound { .. })
        ));
    }

    #[test]
    fn test_only_anchor_subtree_is_materialized() {
        let html = br#"<html><body><nav><p>menu</p></nav>
            <div class="article main"><h1>Title</h1><p>Body</p></div>
            <footer><p>footer</p></footer></body></html>"#;
        let node = extract_subtree(html, &path(&[".article"])).unwrap();
        assert_eq!(node.name, "div");
        assert_eq!(node.text(), "TitleBody");
        assert_eq!(node.render(), r#"<div class="article main"><h1>Title</h1><p>Body</p></div>"#);
    }

    #[test]
    fn test_descendant_path() {
        let html = br#"<div class="teaser"><p>teaser</p></div>
            <div id="content"><section><p class="lead">Lead</p></section></div>"#;
        let node = extract_subtree(html, &path(&["#content", "p"])).unwrap();
        assert_eq!(node.text(), "Lead");
    }

    #[test]
    fn test_path_falls_back_when_scope_closes() {
        let html = br#"<div class="box"><span>no</span></div>
            <div class="box"><span>no</span><em>yes</em></div>"#;
        let node = extract_subtree(html, &path(&[".box", "em"])).unwrap();
        assert_eq!(node.text(), "yes");
    }

    #[test]
    fn test_stray_end_tag_before_anchor_keeps_scope_open() {
        let html = br#"<div id="content">x</span><p>Lead</p></div>"#;
        let node = extract_subtree(html, &path(&["#content", "p"])).unwrap();
        assert_eq!(node.name, "p");
        assert_eq!(node.text(), "Lead");
    }

    #[test]
    fn test_unclosed_child_does_not_leak_scope() {
        let html = br#"<div class="box"><p>a</div><em>outside</em>"#;
        assert_eq!(
            extract_subtree(html, &path(&[".box", "em"])).unwrap_err(),
            ExtractError::AnchorNotFound {
                predicate: ".box".to_string()
            }
        );
    }

    #[test]
    fn test_unclosed_paragraphs_inside_scope() {
        let html = br#"<div id="main"><p>one<p>two<div class="body"><p>text</div></div>"#;
        let node = extract_subtree(html, &path(&["#main", ".body"])).unwrap();
        assert_eq!(node.text(), "text");
    }

    #[test]
    fn test_nested_element_of_same_tag_closes_correctly() {
        let html = b"<div id=a><div>inner</div>tail</div><div>after</div>";
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "innertail");
    }

    #[test]
    fn test_void_elements_do_not_swallow_siblings() {
        let html = b"<div id=a>one<br>two<img src=x.png>three</div>";
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "onetwothree");
        assert_eq!(node.elements().count(), 2);
    }

    #[test]
    fn test_self_closing_anchor() {
        let node = extract_subtree(br#"<p><img id="pic" src="a.jpg"></p>"#, &path(&["#pic"])).unwrap();
        assert_eq!(node.attr("src"), Some("a.jpg"));
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_stray_end_tag_is_ignored() {
        let html = b"<div id=a>one</span>two</div>three";
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "onetwo");
    }

    #[test]
    fn test_unclosed_children_are_closed_by_anchor_end() {
        let html = b"<div id=a><p>one<p>two</div><p>outside</p>";
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "onetwo");
    }

    #[test]
    fn test_truncated_document() {
        let html = b"<div id=a><p>one</p><p>two";
        assert_eq!(
            extract_subtree(html, &path(&["#a"])).unwrap_err(),
            ExtractError::TruncatedDocument { open: 2 }
        );
    }

    #[test]
    fn test_tokenizer_error_inside_anchor_is_truncation() {
        let html = b"<div id=a><p>one</p><p class=\"broken";
        assert!(matches!(
            extract_subtree(html, &path(&["#a"])),
            Err(ExtractError::TruncatedDocument { .. })
        ));
    }

    #[test]
    fn test_comments_and_scripts_are_skipped() {
        let html = br#"<!DOCTYPE html><!-- <div id="a">fake</div> -->
            <script>var s = '<div id="a">fake</div>';</script>
            <div id="a">real</div>"#;
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "real");
    }

    #[test]
    fn test_entities_in_body() {
        let html = b"<div id=a>Z&uuml;rich &amp; Genf</div>";
        let node = extract_subtree(html, &path(&["#a"])).unwrap();
        assert_eq!(node.text(), "Zürich & Genf");
        assert_eq!(node.render(), r#"<div id="a">Zürich &amp; Genf</div>"#);
    }
}
