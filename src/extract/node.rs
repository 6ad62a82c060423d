//! The minimal element tree materialized for an extracted subtree.
//!
//! Children are owned by their parent and there are no parent links. All
//! traversals (rendering, text collection, searching and dropping) use an
//! explicit stack, so arbitrarily deep markup cannot exhaust the call stack.

use std::fmt::Write as _;

use super::predicate::Predicate;
use super::tokenizer::{Attribute, is_void_element};

/// A child of an element, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Element(Node),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Content>,
}

enum Step<'n> {
    Open(&'n Node),
    Close(&'n Node),
    Text(&'n str),
}

impl Node {
    pub fn new(name: impl Into<String>, attrs: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attrs,
            children: Vec::new(),
        }
    }

    /// Value of the first attribute called `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Append text, merging it with a directly preceding text child.
    pub fn push_text(&mut self, text: &str) {
        if let Some(Content::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Content::Text(text.to_string()));
        }
    }

    pub fn push_element(&mut self, node: Node) {
        self.children.push(Content::Element(node));
    }

    /// Direct element children.
    pub fn elements(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|c| match c {
            Content::Element(node) => Some(node),
            Content::Text(_) => None,
        })
    }

    /// All text content, depth first in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.walk(|step| {
            if let Step::Text(text) = step {
                out.push_str(text);
            }
        });
        out
    }

    /// Serialize the subtree back to markup.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.walk(|step| match step {
            Step::Open(node) => {
                out.push('<');
                out.push_str(&node.name);
                for attr in &node.attrs {
                    let _ = write!(out, " {}=\"{}\"", attr.name, escape(&attr.value, true));
                }
                out.push('>');
            }
            Step::Close(node) => {
                if !is_void_element(&node.name) {
                    let _ = write!(out, "</{}>", node.name);
                }
            }
            Step::Text(text) => out.push_str(&escape(text, false)),
        });
        out
    }

    /// The first node in pre-order (starting with `self`) matching `pred`.
    pub fn descendant(&self, pred: &Predicate) -> Option<&Node> {
        self.preorder().find(|node| pred.matches_node(node))
    }

    /// Every node in pre-order (starting with `self`) matching `pred`.
    pub fn descendants(&self, pred: &Predicate) -> Vec<&Node> {
        self.preorder().filter(|node| pred.matches_node(node)).collect()
    }

    fn preorder(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.elements().collect::<Vec<_>>().into_iter().rev());
            Some(node)
        })
    }

    fn walk<'n>(&'n self, mut visit: impl FnMut(Step<'n>)) {
        let mut stack = vec![Step::Open(self)];
        while let Some(step) = stack.pop() {
            if let Step::Open(node) = step {
                stack.push(Step::Close(node));
                for child in node.children.iter().rev() {
                    stack.push(match child {
                        Content::Element(child) => Step::Open(child),
                        Content::Text(text) => Step::Text(text),
                    });
                }
            }
            visit(step);
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Content::Element(mut node) = child {
                pending.append(&mut node.children);
            }
        }
    }
}

fn escape(text: &str, in_attribute: bool) -> std::borrow::Cow<'_, str> {
    let needs_escape = text
        .chars()
        .any(|c| matches!(c, '&' | '<' | '>') || (in_attribute && c == '"'));
    if !needs_escape {
        return std::borrow::Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    std::borrow::Cow::Owned(out)
}
