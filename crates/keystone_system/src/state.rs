//! Typed state storage.
//!
//! [`States`] maps a Rust type to at most one value of that type. The server
//! keeps two of them: a global store for configuration and metadata that is
//! frozen once plugins are built, and a mutable store plugins use among
//! themselves during the build phase.
//!
//! Each value sits behind its own `RwLock`, and access goes through RAII
//! guards. Borrow conflicts are reported instead of blocking, so a plugin
//! that forgets to drop a guard gets an error rather than a deadlock.

use core::any::{Any, TypeId};
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type BoxedState = Box<dyn Any + Send + Sync>;

/// Errors that can occur while accessing stored state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// No value of the requested type is stored.
    #[error("state not found: {0}")]
    NotFound(&'static str),

    /// The value is borrowed in a conflicting mode.
    #[error("state already borrowed: {0}")]
    BorrowConflict(&'static str),
}

/// Container of typed values.
///
/// # Example
///
/// ```
/// use keystone_system::state::States;
///
/// struct PlayerCap(u32);
///
/// let mut states = States::new();
/// states.insert(PlayerCap(64));
///
/// {
///     let mut cap = states.get_mut::<PlayerCap>().unwrap();
///     cap.0 = 128;
/// }
///
/// assert_eq!(states.get::<PlayerCap>().unwrap().0, 128);
/// ```
#[derive(Default)]
pub struct States {
    storage: HashMap<TypeId, RwLock<BoxedState>>,
}

impl States {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.storage
            .insert(TypeId::of::<T>(), RwLock::new(Box::new(value)))
            .and_then(|old| old.into_inner().downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Returns `true` if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.storage.contains_key(&TypeId::of::<T>())
    }

    /// Borrows the value of type `T` immutably.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotFound`] if no value of that type exists
    /// - [`StateError::BorrowConflict`] if it is currently borrowed mutably
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<StateRef<'_, T>, StateError> {
        let type_name = core::any::type_name::<T>();
        let guard = self
            .storage
            .get(&TypeId::of::<T>())
            .ok_or(StateError::NotFound(type_name))?
            .try_read()
            .ok_or(StateError::BorrowConflict(type_name))?;

        Ok(StateRef {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Borrows the value of type `T` mutably.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotFound`] if no value of that type exists
    /// - [`StateError::BorrowConflict`] if it is currently borrowed at all
    pub fn get_mut<T: Send + Sync + 'static>(&self) -> Result<StateRefMut<'_, T>, StateError> {
        let type_name = core::any::type_name::<T>();
        let guard = self
            .storage
            .get(&TypeId::of::<T>())
            .ok_or(StateError::NotFound(type_name))?
            .try_write()
            .ok_or(StateError::BorrowConflict(type_name))?;

        Ok(StateRefMut {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Removes and returns the value of type `T`.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.storage
            .remove(&TypeId::of::<T>())
            .and_then(|entry| entry.into_inner().downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Removes every stored value.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

/// RAII guard for shared access to a stored value.
pub struct StateRef<'a, T> {
    guard: RwLockReadGuard<'a, BoxedState>,
    _marker: core::marker::PhantomData<&'a T>,
}

impl<T: 'static> core::ops::Deref for StateRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Entries are keyed by `TypeId::of::<T>()`, so the downcast cannot fail.
        self.guard
            .downcast_ref::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}

/// RAII guard for exclusive access to a stored value.
pub struct StateRefMut<'a, T> {
    guard: RwLockWriteGuard<'a, BoxedState>,
    _marker: core::marker::PhantomData<&'a mut T>,
}

impl<T: 'static> core::ops::Deref for StateRefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard
            .downcast_ref::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}

impl<T: 'static> core::ops::DerefMut for StateRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .downcast_mut::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}
