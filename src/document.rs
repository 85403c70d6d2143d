use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::rules::NodeMatcher;

/// Mutable parse tree of a fetched page.
pub struct Document {
    dom: RcDom,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Self { dom }
    }

    /// All elements matching `matcher`, in document order.
    pub fn select(&self, matcher: &NodeMatcher) -> Vec<Element> {
        let mut found = Vec::new();
        collect_matches(&self.dom.document, matcher, &mut found);
        found
    }

    /// Points every `<meta>` charset declaration at UTF-8, the encoding
    /// [`Document::to_html`] produces. Returns how many were changed.
    pub fn declare_utf8(&self) -> usize {
        let mut changed = 0;
        for meta in self.select(&NodeMatcher::new(Some("meta")).present("charset")) {
            changed += usize::from(meta.set_attr("charset", "utf-8"));
        }
        let content_type = NodeMatcher::new(Some("meta")).present("http-equiv").present("content");
        for meta in self.select(&content_type) {
            let is_content_type = meta
                .attr("http-equiv")
                .map_or(false, |v| v.trim().eq_ignore_ascii_case("content-type"));
            if is_content_type {
                changed += usize::from(meta.set_attr("content", "text/html; charset=utf-8"));
            }
        }
        changed
    }

    pub fn to_html(&self) -> io::Result<String> {
        let mut out = Vec::new();
        let document: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut out, &document, SerializeOpts::default())?;
        String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn collect_matches(node: &Handle, matcher: &NodeMatcher, found: &mut Vec<Element>) {
    if let NodeData::Element { name, attrs, .. } = &node.data {
        let attrs = attrs.borrow();
        if matcher.matches(&name.local, |wanted| find_attr(&attrs, wanted)) {
            found.push(Element {
                handle: node.clone(),
            });
        }
    }
    for child in node.children.borrow().iter() {
        collect_matches(child, matcher, found);
    }
}

fn find_attr(attrs: &[Attribute], wanted: &str) -> Option<String> {
    attrs
        .iter()
        .find(|attr| &*attr.name.local == wanted)
        .map(|attr| attr.value.to_string())
}

/// Handle to one element node of a [`Document`].
#[derive(Clone)]
pub struct Element {
    handle: Handle,
}

impl Element {
    /// Stable identity of the node for the lifetime of the document.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.handle) as usize
    }

    pub fn name(&self) -> String {
        match &self.handle.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            _ => String::new(),
        }
    }

    pub fn attr(&self, wanted: &str) -> Option<String> {
        self.attrs().and_then(|attrs| find_attr(&attrs.borrow(), wanted))
    }

    /// Replaces the value of an existing attribute. Returns false if the
    /// element has no such attribute.
    pub fn set_attr(&self, wanted: &str, value: &str) -> bool {
        let Some(attrs) = self.attrs() else {
            return false;
        };
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == wanted) {
            Some(attr) => {
                attr.value = StrTendril::from(value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attr(&self, wanted: &str) {
        if let Some(attrs) = self.attrs() {
            attrs
                .borrow_mut()
                .retain(|attr| &*attr.name.local != wanted);
        }
    }

    fn attrs(&self) -> Option<&RefCell<Vec<Attribute>>> {
        match &self.handle.data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }
}
