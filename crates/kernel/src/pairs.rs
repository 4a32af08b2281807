use std::collections::BTreeSet;
use stepsim_common::{LinkId, LinkRef};

use crate::error::InitError;
use crate::project::ContactParams;

/// A registered collidable link-pair. Immutable once registered.
///
/// Links are stored in normalized order (`a < b`) so the same two links
/// always produce the same key regardless of how the project listed them.
#[derive(Debug, Clone)]
pub struct LinkPair<G> {
    pub a: LinkId,
    pub b: LinkId,
    pub names: (LinkRef, LinkRef),
    pub params: ContactParams,
    pub geometry: G,
}

impl<G> LinkPair<G> {
    pub fn new(
        a: (LinkId, LinkRef),
        b: (LinkId, LinkRef),
        params: ContactParams,
        geometry: G,
    ) -> Self {
        let (first, second) = if b.0 < a.0 { (b, a) } else { (a, b) };
        Self {
            a: first.0,
            b: second.0,
            names: (first.1, second.1),
            params,
            geometry,
        }
    }

    pub fn key(&self) -> (LinkId, LinkId) {
        (self.a, self.b)
    }

    pub fn label(&self) -> String {
        format!("{}<->{}", self.names.0, self.names.1)
    }
}

fn normalized(a: LinkId, b: LinkId) -> (LinkId, LinkId) {
    if b < a { (b, a) } else { (a, b) }
}

/// Ordered set of link-pairs; iteration order is registration order.
#[derive(Debug)]
pub struct PairRegistry<G> {
    pairs: Vec<LinkPair<G>>,
    keys: BTreeSet<(LinkId, LinkId)>,
}

impl<G> PairRegistry<G> {
    pub fn new() -> Self {
        Self {
            pairs: Vec::new(),
            keys: BTreeSet::new(),
        }
    }

    /// Check that `a`/`b` can be registered: distinct links, not already present.
    pub fn admit(&self, a: LinkId, b: LinkId, label: &str) -> Result<(), InitError> {
        if a == b {
            return Err(InitError::SelfPair(label.to_string()));
        }
        if self.keys.contains(&normalized(a, b)) {
            return Err(InitError::DuplicatePair(label.to_string()));
        }
        Ok(())
    }

    /// Register a pair, returning its index.
    pub fn insert(&mut self, pair: LinkPair<G>) -> Result<usize, InitError> {
        self.admit(pair.a, pair.b, &pair.label())?;
        self.keys.insert(pair.key());
        self.pairs.push(pair);
        Ok(self.pairs.len() - 1)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LinkPair<G>> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<G> Default for PairRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}
