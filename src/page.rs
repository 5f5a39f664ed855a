use std::collections::{BTreeSet, HashMap};

use ego_tree::{NodeId, NodeRef, Tree};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    #[error("no element matches `{0}`")]
    NoMatch(String),
}

/// Attributes this crate is allowed to write on host elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Marker {
    Processed,
    Hidden,
    Approved,
}

impl Marker {
    pub fn attribute(&self) -> &'static str {
        match self {
            Marker::Processed => "data-clarity-processed",
            Marker::Hidden => "data-clarity-hidden",
            Marker::Approved => "data-clarity-approved",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: Option<NodeId>,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct Overlay {
    display_none: bool,
    markers: BTreeSet<Marker>,
}

/// In-memory host document.
///
/// The parsed tree is owned by the host and only grows or loses subtrees
/// through `append_html` / `remove`. Writes made by the filter (the `display`
/// style and the marker attributes) live in a per-node overlay so the host's
/// own attributes are never rewritten.
pub struct Page {
    html: Html,
    base_url: Option<Url>,
    overlay: HashMap<NodeId, Overlay>,
}

impl Page {
    /// A document that has not produced a `<body>` yet.
    pub fn blank() -> Self {
        Self {
            html: Html::new_document(),
            base_url: None,
            overlay: HashMap::new(),
        }
    }

    pub fn parse(document: &str) -> Self {
        Self {
            html: Html::parse_document(document),
            base_url: None,
            overlay: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Replaces the whole document. Node ids from the previous document are
    /// meaningless afterwards.
    pub fn load(&mut self, document: &str) {
        self.html = Html::parse_document(document);
        self.overlay.clear();
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements()
            .find(|el| el.value().name() == "body")
            .map(|el| el.id())
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Attached elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> {
        self.elements().filter(move |el| selector.matches(el))
    }

    pub fn query(&self, css: &str) -> Result<Vec<NodeId>, PageError> {
        let selector =
            Selector::parse(css).map_err(|_| PageError::InvalidSelector(css.to_string()))?;
        Ok(self.select(&selector).map(|el| el.id()).collect())
    }

    pub fn text(&self, id: NodeId) -> String {
        self.element(id)
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.value().attr(name))
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let Some(node) = self.html.tree.get(id) else {
            return false;
        };
        let top = node.ancestors().last().map(|n| n.id()).unwrap_or(id);
        top == self.html.tree.root().id()
    }

    pub fn set_display_none(&mut self, id: NodeId, hidden: bool) {
        self.overlay.entry(id).or_default().display_none = hidden;
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.overlay
            .get(&id)
            .map(|overlay| overlay.display_none)
            .unwrap_or(false)
    }

    pub fn set_marker(&mut self, id: NodeId, marker: Marker, on: bool) {
        let overlay = self.overlay.entry(id).or_default();
        if on {
            overlay.markers.insert(marker);
        } else {
            overlay.markers.remove(&marker);
        }
    }

    pub fn has_marker(&self, id: NodeId, marker: Marker) -> bool {
        self.overlay
            .get(&id)
            .map(|overlay| overlay.markers.contains(&marker))
            .unwrap_or(false)
    }

    pub fn clear_marker(&mut self, marker: Marker) {
        for overlay in self.overlay.values_mut() {
            overlay.markers.remove(&marker);
        }
    }

    /// Effective inline style as the browser would see it after our writes.
    pub fn style(&self, id: NodeId) -> String {
        let host = self.attr(id, "style").unwrap_or_default().trim().to_string();
        if !self.is_hidden(id) {
            return host;
        }
        if host.is_empty() {
            "display: none".to_string()
        } else {
            format!("{}; display: none", host.trim_end_matches(';'))
        }
    }

    /// Parses `fragment` and appends its top-level nodes under `parent`.
    pub fn append_html(&mut self, parent: NodeId, fragment: &str) -> Option<MutationRecord> {
        self.html.tree.get(parent)?;
        let source = Html::parse_fragment(fragment);
        let Some(container) = source
            .tree
            .root()
            .children()
            .find(|node| node.value().is_element())
        else {
            return Some(MutationRecord {
                target: Some(parent),
                ..MutationRecord::default()
            });
        };

        let added = container
            .children()
            .filter_map(|child| graft(&mut self.html.tree, parent, child))
            .collect();
        Some(MutationRecord {
            target: Some(parent),
            added,
            removed: Vec::new(),
        })
    }

    /// Appends under the first element matching `css`.
    pub fn append_to(&mut self, css: &str, fragment: &str) -> Result<MutationRecord, PageError> {
        let parent = self
            .query(css)?
            .into_iter()
            .next()
            .ok_or_else(|| PageError::NoMatch(css.to_string()))?;
        self.append_html(parent, fragment)
            .ok_or_else(|| PageError::NoMatch(css.to_string()))
    }

    pub fn remove(&mut self, id: NodeId) -> Option<MutationRecord> {
        if id == self.html.tree.root().id() || !self.is_attached(id) {
            return None;
        }
        let parent = self.html.tree.get(id)?.parent().map(|p| p.id());
        self.html.tree.get_mut(id)?.detach();
        Some(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        })
    }

    pub fn remove_matching(&mut self, css: &str) -> Result<Vec<MutationRecord>, PageError> {
        let ids = self.query(css)?;
        Ok(ids.into_iter().filter_map(|id| self.remove(id)).collect())
    }

    /// Drops overlay entries for nodes the host has discarded.
    pub fn forget_detached(&mut self) -> usize {
        let before = self.overlay.len();
        let detached: Vec<NodeId> = self
            .overlay
            .keys()
            .copied()
            .filter(|id| !self.is_attached(*id))
            .collect();
        for id in detached {
            self.overlay.remove(&id);
        }
        before - self.overlay.len()
    }
}

fn graft(tree: &mut Tree<Node>, parent: NodeId, source: NodeRef<'_, Node>) -> Option<NodeId> {
    let id = {
        let mut parent = tree.get_mut(parent)?;
        parent.append(source.value().clone()).id()
    };
    for child in source.children() {
        graft(tree, id, child);
    }
    Some(id)
}
