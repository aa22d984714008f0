//! Native entity identity and per-context proxy caching.
//!
//! Scripts never touch native entities directly. They hold [`Proxy`] objects
//! that wrap a script-side payload and remember which [`EntityId`] they stand
//! for. Each script context owns an [`IdentityCache`] guaranteeing that one
//! native entity maps to at most one live proxy in that context, so identity
//! comparisons in scripts behave.
//!
//! The cache only holds weak references: when the script side drops every
//! clone of a proxy, its entry is dead and gets pruned on a later access.
//! When the native entity goes away, [`IdentityCache::invalidate`] detaches the
//! proxy and every further read through it fails with
//! [`ResourceError::StaleHandle`].
//!
//! # Example
//!
//! ```
//! use keystone_resource::identity::{EntityId, EntityKind, IdentityCache};
//!
//! let cache = IdentityCache::new();
//! let entity = EntityId::new(EntityKind::Vehicle, 12);
//!
//! let first = cache.get_or_create(entity, |id| format!("vehicle {}", id.id()));
//! let second = cache.get_or_create(entity, |_| String::new());
//! assert!(first.ptr_eq(&second));
//!
//! cache.invalidate(entity);
//! assert!(first.is_detached());
//! assert!(first.payload::<String>().is_err());
//! ```

use core::any::Any;
use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::ResourceError;
use crate::registry::ResourceId;

// ─────────────────────────────────────────────────────────────────────────────
// EntityKind / EntityId
// ─────────────────────────────────────────────────────────────────────────────

/// Type tag of a native entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// A running resource instance.
    Resource,
    /// A connected player.
    Player,
    /// A vehicle.
    Vehicle,
    /// A collision shape.
    ColShape,
    /// A map blip.
    Blip,
    /// A world object.
    Object,
    /// A voice channel.
    VoiceChannel,
    /// A checkpoint.
    Checkpoint,
    /// An engine-specific kind not covered above.
    Other(u16),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Resource => f.write_str("resource"),
            EntityKind::Player => f.write_str("player"),
            EntityKind::Vehicle => f.write_str("vehicle"),
            EntityKind::ColShape => f.write_str("colshape"),
            EntityKind::Blip => f.write_str("blip"),
            EntityKind::Object => f.write_str("object"),
            EntityKind::VoiceChannel => f.write_str("voice_channel"),
            EntityKind::Checkpoint => f.write_str("checkpoint"),
            EntityKind::Other(tag) => write!(f, "other({tag})"),
        }
    }
}

/// Identity of a native entity: type tag plus engine-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    kind: EntityKind,
    id: u32,
}

impl EntityId {
    /// Creates an entity id.
    #[must_use]
    pub const fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }

    /// The entity standing for a registered resource's running instance.
    #[must_use]
    pub fn resource(id: ResourceId) -> Self {
        Self::new(EntityKind::Resource, id.get())
    }

    /// Returns the type tag.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the engine-assigned id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxy
// ─────────────────────────────────────────────────────────────────────────────

type Payload = Box<dyn Any + Send + Sync>;

pub(crate) struct ProxyInner {
    entity: EntityId,
    detached: AtomicBool,
    payload: Payload,
}

/// Script-visible handle bound to one native entity in one context.
///
/// Cloning a proxy clones the handle, not the object: clones compare equal
/// and share detachment.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    fn new(entity: EntityId, payload: Payload) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                entity,
                detached: AtomicBool::new(false),
                payload,
            }),
        }
    }

    /// Returns the entity this proxy stands for.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.inner.entity
    }

    /// Returns true once the native entity has been invalidated.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// Fails with [`ResourceError::StaleHandle`] if the proxy is detached.
    pub fn ensure_attached(&self) -> Result<(), ResourceError> {
        if self.is_detached() {
            return Err(ResourceError::StaleHandle {
                entity: self.entity(),
            });
        }
        Ok(())
    }

    /// Returns the script-side payload if it has type `T`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::StaleHandle`] if the proxy is detached.
    pub fn payload<T: Any>(&self) -> Result<Option<&T>, ResourceError> {
        self.ensure_attached()?;
        Ok(self.inner.payload.downcast_ref::<T>())
    }

    /// Returns true if both handles refer to the same proxy object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn detach(&self) {
        self.inner.detached.store(true, Ordering::Release);
    }

    fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<ProxyInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("entity", &self.entity())
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProxyFactories
// ─────────────────────────────────────────────────────────────────────────────

type ProxyFactory = Box<dyn Fn(EntityId) -> Payload + Send + Sync>;

/// Proxy constructors keyed by entity kind.
///
/// The script binding registers one constructor per kind it can represent;
/// [`IdentityCache::get_or_create_with`] dispatches on the entity's kind.
#[derive(Default)]
pub struct ProxyFactories {
    factories: HashMap<EntityKind, ProxyFactory>,
}

impl ProxyFactories {
    /// Creates an empty factory table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor for `kind`, replacing any previous one.
    pub fn register<T, F>(&mut self, kind: EntityKind, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(EntityId) -> T + Send + Sync + 'static,
    {
        self.factories
            .insert(kind, Box::new(move |entity: EntityId| Box::new(factory(entity)) as Payload));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<T, F>(mut self, kind: EntityKind, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(EntityId) -> T + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// Returns true if a constructor is registered for `kind`.
    #[must_use]
    pub fn supports(&self, kind: EntityKind) -> bool {
        self.factories.contains_key(&kind)
    }

    fn create(&self, entity: EntityId) -> Result<Payload, ResourceError> {
        self.factories
            .get(&entity.kind())
            .map(|factory| factory(entity))
            .ok_or(ResourceError::UnsupportedEntity(entity.kind()))
    }
}

impl fmt::Debug for ProxyFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityCache
// ─────────────────────────────────────────────────────────────────────────────

const MIN_PRUNE_THRESHOLD: usize = 64;

struct Entries {
    map: HashMap<EntityId, Weak<ProxyInner>>,
    /// Dead entries are swept once the map grows past this.
    prune_at: usize,
}

impl Entries {
    fn prune(&mut self) -> usize {
        let before = self.map.len();
        self.map.retain(|_, weak| weak.strong_count() > 0);
        self.prune_at = (self.map.len() * 2).max(MIN_PRUNE_THRESHOLD);
        before - self.map.len()
    }
}

/// Per-context map from native entity to its live proxy.
///
/// All operations take a short internal lock. Factories run under that lock,
/// which is what makes creation atomic with insertion; a factory must not
/// call back into the same cache.
pub struct IdentityCache {
    entries: Mutex<Entries>,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                prune_at: MIN_PRUNE_THRESHOLD,
            }),
        }
    }
}

impl IdentityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live proxy for `entity`, creating it with `factory` on a miss.
    ///
    /// `factory` is invoked at most once per miss and never for a hit.
    pub fn get_or_create<T, F>(&self, entity: EntityId, factory: F) -> Proxy
    where
        T: Any + Send + Sync,
        F: FnOnce(EntityId) -> T,
    {
        let created: Result<Proxy, core::convert::Infallible> =
            self.get_or_insert_with(entity, |entity| Ok(Box::new(factory(entity)) as Payload));
        match created {
            Ok(proxy) => proxy,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_create`](Self::get_or_create), dispatching on the entity kind.
    ///
    /// # Errors
    ///
    /// [`ResourceError::UnsupportedEntity`] if `factories` has no constructor
    /// for the entity's kind. Nothing is inserted in that case.
    pub fn get_or_create_with(
        &self,
        entity: EntityId,
        factories: &ProxyFactories,
    ) -> Result<Proxy, ResourceError> {
        self.get_or_insert_with(entity, |entity| factories.create(entity))
    }

    fn get_or_insert_with<E>(
        &self,
        entity: EntityId,
        make: impl FnOnce(EntityId) -> Result<Payload, E>,
    ) -> Result<Proxy, E> {
        let mut entries = self.entries.lock();

        if let Some(proxy) = entries.map.get(&entity).and_then(Proxy::upgrade)
            && !proxy.is_detached()
        {
            tracing::trace!(%entity, "identity cache hit");
            return Ok(proxy);
        }

        if entries.map.len() >= entries.prune_at {
            let pruned = entries.prune();
            tracing::debug!(pruned, "pruned dead proxy entries");
        }

        let proxy = Proxy::new(entity, make(entity)?);
        entries.map.insert(entity, proxy.downgrade());
        tracing::debug!(%entity, "identity cache miss, proxy created");
        Ok(proxy)
    }

    /// Returns the live proxy for `entity` without creating one.
    #[must_use]
    pub fn lookup(&self, entity: EntityId) -> Option<Proxy> {
        let mut entries = self.entries.lock();
        match entries.map.get(&entity).map(Proxy::upgrade) {
            Some(Some(proxy)) if !proxy.is_detached() => Some(proxy),
            Some(_) => {
                entries.map.remove(&entity);
                None
            }
            None => None,
        }
    }

    /// Detaches the proxy for `entity` and forgets it.
    ///
    /// Returns true if a live proxy was detached.
    pub fn invalidate(&self, entity: EntityId) -> bool {
        let removed = self.entries.lock().map.remove(&entity);
        match removed.as_ref().and_then(Proxy::upgrade) {
            Some(proxy) => {
                proxy.detach();
                true
            }
            None => false,
        }
    }

    /// Detaches and forgets every proxy in the cache.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().map.drain().collect();
        for (_, weak) in drained {
            if let Some(proxy) = Proxy::upgrade(&weak) {
                proxy.detach();
            }
        }
    }

    /// Removes entries whose proxy was dropped by the script side.
    pub fn prune(&self) -> usize {
        self.entries.lock().prune()
    }

    /// Returns the number of live proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns true if no live proxy is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCache")
            .field("live", &self.len())
            .finish()
    }
}
