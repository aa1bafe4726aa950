//! Provider and consumer capabilities of chain nodes.
//!
//! A chain is pull-based: a consumer asks its upstream provider for the
//! current texture, and the provider recomputes only when something it
//! depends on changed since it last produced output.  Nodes are shared
//! as [`SharedProvider`] handles so a session can keep mutating a node
//! while a downstream consumer holds it as input.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::FilterResult;
use crate::texture::{Texture, TextureKind};

/// Identifier of a node, unique within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Something that can hand out a current texture.
pub trait TextureProvider {
    fn node_id(&self) -> NodeId;

    /// Shape of the textures this provider produces.
    fn output_kind(&self) -> TextureKind;

    /// The output reflecting all upstream and parameter state as of this
    /// call, recomputing first when [`Self::is_dirty`] is true.
    fn current_texture(&mut self) -> FilterResult<Arc<Texture>>;

    /// Whether the next [`Self::current_texture`] call has work to do.
    fn is_dirty(&self) -> bool;

    /// Incremented every time the provider's output changes.
    fn revision(&self) -> u64;

    /// Whether this provider is `id` or pulls from it, directly or
    /// transitively.
    fn depends_on(&self, id: NodeId) -> bool {
        self.node_id() == id
    }
}

/// Something that pulls from one upstream provider.
pub trait TextureConsumer<'ctx> {
    /// Connect `provider` as the input.  Always marks the consumer dirty.
    fn set_input(&mut self, provider: SharedProvider<'ctx>) -> FilterResult<()>;
}

/// Shared handle to a provider; nodes and the session may both hold one.
pub type SharedProvider<'ctx> = Rc<RefCell<dyn TextureProvider + 'ctx>>;

/// Dirty/upstream snapshot of a provider as seen by its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamState {
    pub dirty: bool,
    pub revision: u64,
}

impl UpstreamState {
    /// Snapshot `provider`.  A provider that is mutably borrowed is in
    /// the middle of a pull and is reported dirty.
    pub fn of(provider: &SharedProvider<'_>) -> Self {
        match provider.try_borrow() {
            Ok(p) => Self {
                dirty: p.is_dirty(),
                revision: p.revision(),
            },
            Err(_) => Self {
                dirty: true,
                revision: u64::MAX,
            },
        }
    }
}

/// Validity of a node's cached output.
///
/// The cached texture is valid when the node has not been locally
/// invalidated since its last recomputation, its upstream is clean, and
/// the upstream revision is the one that recomputation consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    stale: bool,
    consumed_upstream: Option<u64>,
    revision: u64,
}

impl Default for Freshness {
    fn default() -> Self {
        Self::new()
    }
}

impl Freshness {
    /// Nothing computed yet, so dirty.
    pub fn new() -> Self {
        Self {
            stale: true,
            consumed_upstream: None,
            revision: 0,
        }
    }

    /// Local change: parameters, input connection or image contents.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_dirty(&self, upstream: Option<UpstreamState>) -> bool {
        if self.stale {
            return true;
        }
        match upstream {
            Some(up) => up.dirty || self.consumed_upstream != Some(up.revision),
            None => false,
        }
    }

    /// Record a successful recomputation that consumed `upstream_revision`.
    pub fn mark_clean(&mut self, upstream_revision: Option<u64>) {
        self.stale = false;
        self.consumed_upstream = upstream_revision;
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(dirty: bool, revision: u64) -> Option<UpstreamState> {
        Some(UpstreamState { dirty, revision })
    }

    #[test]
    fn starts_dirty_and_cleans_after_recompute() {
        let mut freshness = Freshness::new();
        assert!(freshness.is_dirty(None));
        assert_eq!(freshness.revision(), 0);

        freshness.mark_clean(None);
        assert!(!freshness.is_dirty(None));
        assert_eq!(freshness.revision(), 1);
    }

    #[test]
    fn every_mutation_dirties_until_next_recompute() {
        let mut freshness = Freshness::new();
        freshness.mark_clean(Some(3));
        for _ in 0..5 {
            freshness.invalidate();
            assert!(freshness.is_dirty(up(false, 3)));
            freshness.mark_clean(Some(3));
            assert!(!freshness.is_dirty(up(false, 3)));
        }
        assert_eq!(freshness.revision(), 6);
    }

    #[test]
    fn dirty_upstream_propagates() {
        let mut freshness = Freshness::new();
        freshness.mark_clean(Some(1));
        assert!(freshness.is_dirty(up(true, 1)));
    }

    #[test]
    fn newer_upstream_revision_dirties_even_when_upstream_is_clean() {
        // Upstream was pulled by someone else and recomputed.
        let mut freshness = Freshness::new();
        freshness.mark_clean(Some(1));
        assert!(freshness.is_dirty(up(false, 2)));
        freshness.mark_clean(Some(2));
        assert!(!freshness.is_dirty(up(false, 2)));
    }

    #[test]
    fn revisions_chain_through_three_nodes() {
        let (mut a, mut b, mut c) = (Freshness::new(), Freshness::new(), Freshness::new());
        let state = |f: &Freshness, upstream: Option<UpstreamState>| UpstreamState {
            dirty: f.is_dirty(upstream),
            revision: f.revision(),
        };
        a.mark_clean(None);
        b.mark_clean(Some(a.revision()));
        c.mark_clean(Some(b.revision()));
        let b_state = state(&b, Some(state(&a, None)));
        assert!(!c.is_dirty(Some(b_state)));

        a.invalidate();
        let a_state = state(&a, None);
        let b_state = state(&b, Some(a_state));
        assert!(b_state.dirty);
        assert!(c.is_dirty(Some(b_state)));
    }
}
