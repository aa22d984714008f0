//! Script contexts.
//!
//! A [`ScriptContext`] is one embedded script environment (typically one per
//! running resource). It owns the [`IdentityCache`] for that environment.
//! The runtime only tracks contexts weakly: dropping the last handle tears
//! the context down and detaches every proxy it handed out.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::identity::IdentityCache;

/// Identifier of a script context, unique within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

pub(crate) struct ContextInner {
    id: ContextId,
    resource: Option<String>,
    cache: IdentityCache,
    torn_down: AtomicBool,
}

impl ContextInner {
    pub(crate) fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    fn teardown(&self) -> bool {
        let first = !self.torn_down.swap(true, Ordering::AcqRel);
        self.cache.clear();
        first
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.cache.clear();
    }
}

/// Handle to a script context. Clones share the same context.
#[derive(Clone)]
pub struct ScriptContext {
    inner: Arc<ContextInner>,
}

impl ScriptContext {
    pub(crate) fn new(id: ContextId, resource: Option<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                resource,
                cache: IdentityCache::new(),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Returns the name of the resource backing this context, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.inner.resource.as_deref()
    }

    /// Returns the proxy cache of this context.
    #[must_use]
    pub fn cache(&self) -> &IdentityCache {
        &self.inner.cache
    }

    /// Returns true once the context has been torn down.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Detaches every proxy of this context and marks it torn down.
    ///
    /// Returns false if it was already torn down.
    pub fn teardown(&self) -> bool {
        self.inner.teardown()
    }

    pub(crate) fn teardown_inner(inner: &ContextInner) -> bool {
        inner.teardown()
    }
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("id", &self.inner.id)
            .field("resource", &self.inner.resource)
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}
