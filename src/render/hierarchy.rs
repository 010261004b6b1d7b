//! The inheritance chain of one render.
//!
//! Index 0 is the template the render started from; each `extends` pushes its
//! parent after the current position. Block resolution moves the cursor up
//! ([`Hierarchy::ascend`]) and back down ([`Hierarchy::descend`]); every ascend is
//! paired with a descend.

use std::sync::Arc;

use crate::template::Template;

#[derive(Debug, Clone)]
pub struct Hierarchy {
    chain: Vec<Arc<Template>>,
    current: usize,
}

impl Hierarchy {
    pub fn new(root: Arc<Template>) -> Self {
        Self {
            chain: vec![root],
            current: 0,
        }
    }

    /// A chain with `child` below `parent`, used for embedding.
    pub fn with_parent(child: Arc<Template>, parent: Arc<Template>) -> Self {
        Self {
            chain: vec![child, parent],
            current: 0,
        }
    }

    /// Record `parent` as the ancestor of the current template, dropping any
    /// ancestors recorded before.
    pub fn push_ancestor(&mut self, parent: Arc<Template>) {
        self.chain.truncate(self.current + 1);
        self.chain.push(parent);
    }

    pub fn current(&self) -> Option<&Arc<Template>> {
        self.chain.get(self.current)
    }

    pub fn parent(&self) -> Option<&Arc<Template>> {
        self.chain.get(self.current + 1)
    }

    pub fn child(&self) -> Option<&Arc<Template>> {
        self.current.checked_sub(1).and_then(|i| self.chain.get(i))
    }

    pub fn ascend(&mut self) {
        self.current += 1;
    }

    pub fn descend(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Return the cursor to the template the render started from.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}
