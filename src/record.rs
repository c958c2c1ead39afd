//
// record.rs
// Bundle-Pseudonymizer-rs
//
// In-memory subtree of one top-level bundle entry, the builder that accumulates it from parse events, and entry classification.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;

/// Resource types that trigger a transform. Everything else passes through untouched.
pub const RECOGNIZED_RESOURCES: [&str; 2] = ["Patient", "Encounter"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Patient,
    Encounter,
    PassThrough,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Patient => "Patient",
            Self::Encounter => "Encounter",
            Self::PassThrough => "pass-through",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One XML element with its attributes (in source order) and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the attribute value in place, keeping its position; appends it when absent.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// All descendants reached by following `path` child by child, in document order.
    pub fn find_all<'a>(&'a self, path: &[&str]) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_path(path, &mut found);
        found
    }

    fn collect_path<'a>(&'a self, path: &[&str], found: &mut Vec<&'a Element>) {
        let Some((head, rest)) = path.split_first() else {
            found.push(self);
            return;
        };
        for child in self.child_elements().filter(|el| el.name == *head) {
            child.collect_path(rest, found);
        }
    }

    /// First element along `path` in document order.
    pub fn first_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        for child in self.children.iter_mut() {
            if let Node::Element(el) = child {
                if el.name == *head {
                    if let Some(found) = el.first_mut(rest) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Pre-order search (self included) for the first element whose name is in `names`.
    pub fn find_first(&self, names: &[&str]) -> Option<&Element> {
        if names.contains(&self.name.as_str()) {
            return Some(self);
        }
        self.child_elements().find_map(|el| el.find_first(names))
    }

    pub fn find_first_mut(&mut self, names: &[&str]) -> Option<&mut Element> {
        if names.contains(&self.name.as_str()) {
            return Some(self);
        }
        for child in self.children.iter_mut() {
            if let Node::Element(el) = child {
                if let Some(found) = el.find_first_mut(names) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Drops every direct child element called `name`; returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, Node::Element(el) if el.name == name));
        before - self.children.len()
    }
}

/// Decides the entry kind from the first recognized resource tag in the subtree.
pub fn classify(record: &Element) -> RecordKind {
    match record.find_first(&RECOGNIZED_RESOURCES).map(|el| el.name.as_str()) {
        Some("Patient") => RecordKind::Patient,
        Some("Encounter") => RecordKind::Encounter,
        _ => RecordKind::PassThrough,
    }
}

/// Accumulates the events of exactly one entry into an `Element` tree.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    stack: Vec<Element>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_building(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn open(&mut self, element: Element) {
        if let Some(parent) = self.stack.last_mut() {
            drop_blank_tail(parent);
        }
        self.stack.push(element);
    }

    /// Appends text to the innermost open element, merging with a preceding text node.
    pub fn text(&mut self, text: &str) {
        let Some(current) = self.stack.last_mut() else {
            return;
        };
        match current.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(text),
            _ => current.children.push(Node::Text(text.to_string())),
        }
    }

    /// Closes the innermost element. Returns the finished entry once its outermost element closes.
    pub fn close(&mut self) -> Option<Element> {
        let mut finished = self.stack.pop()?;
        drop_blank_tail(&mut finished);
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Element(finished));
                None
            }
            None => Some(finished),
        }
    }
}

// Whitespace-only text between elements is layout, not content.
fn drop_blank_tail(element: &mut Element) {
    if matches!(element.children.last(), Some(Node::Text(text)) if text.trim().is_empty()) {
        element.children.pop();
    }
}
