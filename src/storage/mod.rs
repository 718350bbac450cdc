// src/storage/mod.rs

//! Per-run typed data slots shared between handlers.
//!
//! A [`Storage<T>`] is only a handle: cloning it yields the same slot. Each
//! running group that lists the storage creates its own *instance* when it
//! starts and destroys it when it ends, so two concurrent runs never see each
//! other's data.
//!
//! Exactly one instance per storage can be *active* at a time. The engine
//! activates the instances of the current scope (and every enclosing scope)
//! around each handler call, which is how a closure that captured the handle
//! reaches the data of the right run:
//!
//! ```ignore
//! let counter = Storage::<usize>::new();
//! let c = counter.clone();
//! let recipe = group![
//!     &counter,
//!     on_group_done(move || println!("{:?}", c.get())),
//! ];
//! ```
//!
//! Reading a storage with no active instance is a usage error: it is logged
//! and the accessor returns `None`.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use tracing::{debug, error};

/// Operations the engine needs on a storage whose value type it doesn't know.
pub(crate) trait StorageBase {
    fn key(&self) -> usize;
    fn type_name(&self) -> &'static str;
    fn create_instance(&self) -> usize;
    fn destroy_instance(&self, id: usize);
    fn activate(&self, id: usize) -> bool;
    fn deactivate(&self);
    fn is_active(&self) -> bool;
}

struct StorageInner<T> {
    constructor: Box<dyn Fn() -> T>,
    instances: RefCell<HashMap<usize, Rc<RefCell<T>>>>,
    active: Cell<usize>,
    next_id: Cell<usize>,
}

impl<T: 'static> StorageInner<T> {
    fn slot_key(&self) -> usize {
        self as *const Self as *const () as usize
    }

    fn active_instance(&self) -> Option<Rc<RefCell<T>>> {
        let id = self.active.get();
        if id == 0 {
            error!(
                storage = self.slot_key(),
                value_type = type_name::<T>(),
                "storage accessed outside of any scope that owns it"
            );
            return None;
        }
        self.instance(id)
    }

    fn instance(&self, id: usize) -> Option<Rc<RefCell<T>>> {
        let found = self.instances.borrow().get(&id).cloned();
        if found.is_none() {
            error!(storage = self.slot_key(), id, "storage instance does not exist");
        }
        found
    }
}

impl<T: 'static> StorageBase for StorageInner<T> {
    fn key(&self) -> usize {
        self.slot_key()
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    // Create and destroy while an instance is active are usage errors. They are
    // logged and still carried out rather than skipped: the caller always gets
    // a usable id and its instance is always released.
    fn create_instance(&self) -> usize {
        if self.active.get() != 0 {
            error!(
                storage = self.slot_key(),
                active = self.active.get(),
                "creating a storage instance while another one is active"
            );
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let value = (self.constructor)();
        self.instances
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(value)));
        debug!(storage = self.slot_key(), id, "storage instance created");
        id
    }

    fn destroy_instance(&self, id: usize) {
        if self.active.get() != 0 {
            error!(
                storage = self.slot_key(),
                active = self.active.get(),
                "destroying a storage instance while another one is active"
            );
        }
        let removed = self.instances.borrow_mut().remove(&id);
        match removed {
            Some(value) => {
                // Dropped outside of the map borrow so a destructor may touch
                // the storage again.
                drop(value);
                debug!(storage = self.slot_key(), id, "storage instance destroyed");
            }
            None => error!(storage = self.slot_key(), id, "destroying unknown storage instance"),
        }
    }

    fn activate(&self, id: usize) -> bool {
        let current = self.active.get();
        if current != 0 {
            error!(
                storage = self.slot_key(),
                active = current,
                requested = id,
                "storage already has an active instance; activation rejected"
            );
            return false;
        }
        if !self.instances.borrow().contains_key(&id) {
            error!(storage = self.slot_key(), id, "activating unknown storage instance");
            return false;
        }
        self.active.set(id);
        true
    }

    fn deactivate(&self) {
        self.active.set(0);
    }

    fn is_active(&self) -> bool {
        self.active.get() != 0
    }
}

/// Typed handle to a per-run data slot.
pub struct Storage<T: 'static> {
    inner: Rc<StorageInner<T>>,
}

impl<T: 'static> Clone for Storage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Storage<T> {
    /// Storage whose instances start as `T::default()`.
    pub fn new() -> Self {
        Self::with_constructor(T::default)
    }
}

impl<T: Default + 'static> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Storage<T> {
    /// Storage whose instances are built by `constructor`, once per run.
    pub fn with_constructor(constructor: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(StorageInner {
                constructor: Box::new(constructor),
                instances: RefCell::new(HashMap::new()),
                active: Cell::new(0),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Type-erased handle, as stored in group descriptions.
    pub fn handle(&self) -> StorageHandle {
        StorageHandle(self.inner.clone())
    }

    /// Create a fresh instance and return its id (never 0).
    pub fn create_instance(&self) -> usize {
        StorageBase::create_instance(&*self.inner)
    }

    pub fn destroy_instance(&self, id: usize) {
        StorageBase::destroy_instance(&*self.inner, id)
    }

    /// Make `id` the current instance.
    ///
    /// Rejected (returns `false`) while another instance is active.
    pub fn activate(&self, id: usize) -> bool {
        StorageBase::activate(&*self.inner, id)
    }

    pub fn deactivate(&self) {
        StorageBase::deactivate(&*self.inner)
    }

    pub fn is_active(&self) -> bool {
        StorageBase::is_active(&*self.inner)
    }

    pub fn active_id(&self) -> Option<usize> {
        match self.inner.active.get() {
            0 => None,
            id => Some(id),
        }
    }

    /// Number of live instances across all runs.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.borrow().len()
    }

    /// Borrow the active instance.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let instance = self.inner.active_instance()?;
        let value = borrow_or_log(&instance, self.inner.slot_key())?;
        Some(f(&value))
    }

    /// Mutably borrow the active instance.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let instance = self.inner.active_instance()?;
        let mut value = borrow_mut_or_log(&instance, self.inner.slot_key())?;
        Some(f(&mut value))
    }

    /// Replace the active instance's value. Returns `false` when nothing is active.
    pub fn set(&self, value: T) -> bool {
        self.with_mut(|slot| *slot = value).is_some()
    }

    pub(crate) fn with_instance<R>(&self, id: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        let instance = self.inner.instance(id)?;
        let value = borrow_or_log(&instance, self.inner.slot_key())?;
        Some(f(&value))
    }

    pub(crate) fn with_instance_mut<R>(&self, id: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let instance = self.inner.instance(id)?;
        let mut value = borrow_mut_or_log(&instance, self.inner.slot_key())?;
        Some(f(&mut value))
    }
}

impl<T: Clone + 'static> Storage<T> {
    /// Clone of the active instance's value.
    pub fn get(&self) -> Option<T> {
        self.with(T::clone)
    }
}

impl<T: 'static> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("key", &self.inner.slot_key())
            .field("type", &type_name::<T>())
            .field("active", &self.inner.active.get())
            .finish()
    }
}

fn borrow_or_log<T>(cell: &RefCell<T>, key: usize) -> Option<std::cell::Ref<'_, T>> {
    match cell.try_borrow() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(storage = key, "storage value is already mutably borrowed");
            None
        }
    }
}

fn borrow_mut_or_log<T>(cell: &RefCell<T>, key: usize) -> Option<std::cell::RefMut<'_, T>> {
    match cell.try_borrow_mut() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(storage = key, "storage value is already borrowed");
            None
        }
    }
}

/// Type-erased storage handle; equality is identity of the underlying slot.
#[derive(Clone)]
pub struct StorageHandle(Rc<dyn StorageBase>);

impl StorageHandle {
    pub fn key(&self) -> usize {
        self.0.key()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub(crate) fn create_instance(&self) -> usize {
        self.0.create_instance()
    }

    pub(crate) fn destroy_instance(&self, id: usize) {
        self.0.destroy_instance(id)
    }

    pub(crate) fn activate(&self, id: usize) -> bool {
        self.0.activate(id)
    }

    pub(crate) fn deactivate(&self) {
        self.0.deactivate()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.is_active()
    }
}

impl PartialEq for StorageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for StorageHandle {}

impl Hash for StorageHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("key", &self.key())
            .field("type", &self.type_name())
            .finish()
    }
}

impl<T: 'static> From<&Storage<T>> for StorageHandle {
    fn from(storage: &Storage<T>) -> Self {
        storage.handle()
    }
}
