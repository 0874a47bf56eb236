//! Decorator / DOM indirection registry.
//!
//! Node variants hold no rendering logic; hosts register callbacks here per
//! variant and the node model calls through at decoration time. A kind with
//! no registered callback decorates to `None`, so the same model runs
//! headless (e.g. for server-side conversion). One registry per editor
//! instance, constructor-injected, never a process-wide singleton.

use crate::dom::Element;
use crate::node::{Node, NodeKey, NodeKind, NodeKindTag};
use std::collections::BTreeMap;

/// Host-facing rendering output.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoration {
    pub classes: Vec<String>,
    pub element: Element,
}

pub type RenderFn = Box<dyn Fn(&Node) -> Decoration>;
pub type DomFactoryFn = Box<dyn Fn(&Node) -> Element>;

#[derive(Default)]
pub struct DecoratorRegistry {
    renderers: BTreeMap<NodeKindTag, RenderFn>,
    dom_factories: BTreeMap<NodeKindTag, DomFactoryFn>,
    /// Media decoration is cache-sensitive: recomputed only when the node's
    /// dirty flag was set by a setter.
    media_cache: BTreeMap<NodeKey, Element>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_renderer(
        &mut self,
        tag: NodeKindTag,
        renderer: impl Fn(&Node) -> Decoration + 'static,
    ) {
        self.renderers.insert(tag, Box::new(renderer));
    }

    pub fn register_dom_factory(
        &mut self,
        tag: NodeKindTag,
        factory: impl Fn(&Node) -> Element + 'static,
    ) {
        self.dom_factories.insert(tag, Box::new(factory));
    }

    pub fn has_renderer(&self, tag: NodeKindTag) -> bool {
        self.renderers.contains_key(&tag)
    }

    /// Rendering callback dispatch; `None` when the host registered nothing
    /// for this kind.
    pub fn decorate(&self, node: &Node) -> Option<Decoration> {
        self.renderers.get(&node.kind.tag()).map(|render| render(node))
    }

    /// DOM factory dispatch. Media output is memoized per node instance.
    pub fn dom_for(&mut self, node: &mut Node) -> Option<Element> {
        let factory = self.dom_factories.get(&node.kind.tag())?;
        let media_dirty = match &mut node.kind {
            NodeKind::Media(media) => Some(media.take_dirty()),
            _ => None,
        };
        match media_dirty {
            Some(false) => {
                if let Some(cached) = self.media_cache.get(&node.key) {
                    return Some(cached.clone());
                }
                let element = factory(node);
                self.media_cache.insert(node.key, element.clone());
                Some(element)
            }
            Some(true) => {
                let element = factory(node);
                self.media_cache.insert(node.key, element.clone());
                Some(element)
            }
            None => Some(factory(node)),
        }
    }

    /// Drops any memoized output for a destroyed node.
    pub fn invalidate(&mut self, key: NodeKey) {
        self.media_cache.remove(&key);
    }
}
