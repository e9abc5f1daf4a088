use crate::error::{BridgeError, Result};
use crate::exception::ExceptionTranslator;
use crate::runtime::{Fault, RawHandle, Runtime};
use crate::thread::ThreadContext;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

/// An opaque, copyable name for an object living in the Java VM.
///
/// A `NativeRef` is one lease on a registry slot. Two `NativeRef`s are equal iff they name the
/// same Java object of the same VM, whichever lease they carry.
#[derive(Debug, Clone, Copy)]
pub struct NativeRef {
    vm: u64,
    slot: u64,
    lease: u64,
}

impl NativeRef {
    pub fn vm_id(&self) -> u64 {
        self.vm
    }
}

impl PartialEq for NativeRef {
    fn eq(&self, other: &Self) -> bool {
        self.vm == other.vm && self.slot == other.slot
    }
}

impl Eq for NativeRef {}

impl Hash for NativeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.vm.hash(state);
        self.slot.hash(state);
    }
}

#[derive(Debug)]
struct Slot {
    global: RawHandle,
    identity: i32,
    leases: HashSet<u64>,
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: HashMap<u64, Slot>,
    by_identity: HashMap<i32, Vec<u64>>,
    next_slot: u64,
    next_lease: u64,
    leases: usize,
    /// Globals whose last lease went away on a thread that is not attached.
    pending_deletes: Vec<RawHandle>,
    invalidated: bool,
}

impl RegistryState {
    fn lease(&mut self, vm: u64, slot: u64) -> Result<NativeRef> {
        let entry = self.slots.get_mut(&slot).ok_or(BridgeError::StaleReference)?;
        self.next_lease += 1;
        let lease = self.next_lease;
        entry.leases.insert(lease);
        self.leases += 1;
        Ok(NativeRef { vm, slot, lease })
    }
}

/// Tracks every global reference the bridge holds into one Java VM.
///
/// Registering the same Java object twice yields equal [`NativeRef`s](struct.NativeRef.html)
/// backed by a single global reference, deleted exactly once when its last lease is released.
pub struct ReferenceRegistry {
    vm: u64,
    runtime: Arc<dyn Runtime>,
    state: Mutex<RegistryState>,
}

impl fmt::Debug for ReferenceRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReferenceRegistry")
            .field("vm", &self.vm)
            .field("live", &self.live_count())
            .finish()
    }
}

impl ReferenceRegistry {
    pub(crate) fn new(vm: u64, runtime: Arc<dyn Runtime>) -> Self {
        ReferenceRegistry {
            vm,
            runtime,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Promote a local reference to a registered global one.
    ///
    /// The local reference is consumed, whether registration succeeds or not. Fails with
    /// [`ResourceExhausted`](enum.BridgeError.html#variant.ResourceExhausted) when the VM can't
    /// allocate a global reference, in which case nothing is registered.
    pub fn register(&self, context: &ThreadContext, local: RawHandle) -> Result<NativeRef> {
        let result = self.register_local(context, local);
        self.runtime.delete_local_ref(local);
        result
    }

    fn register_local(&self, context: &ThreadContext, local: RawHandle) -> Result<NativeRef> {
        context.verify(self.vm)?;
        let mut state = self.state.lock();
        if state.invalidated {
            return Err(BridgeError::VmShutDown);
        }
        self.flush_pending(&mut state);
        let identity = self
            .runtime
            .identity_hash(local)
            .map_err(|fault| self.fault(context, fault))?;
        let existing = state
            .by_identity
            .get(&identity)
            .and_then(|slots| {
                slots.iter().cloned().find(|slot| {
                    self.runtime
                        .is_same_object(state.slots[slot].global, local)
                })
            });
        if let Some(slot) = existing {
            return state.lease(self.vm, slot);
        }
        let global = self.runtime.new_global_ref(local).map_err(|fault| match fault {
            Fault::OutOfMemory => BridgeError::ResourceExhausted(
                "the Java VM can't allocate another global reference".to_owned(),
            ),
            fault => self.fault(context, fault),
        })?;
        state.next_slot += 1;
        let slot = state.next_slot;
        state.slots.insert(
            slot,
            Slot {
                global,
                identity,
                leases: HashSet::new(),
            },
        );
        state.by_identity.entry(identity).or_default().push(slot);
        state.lease(self.vm, slot)
    }

    /// Release one lease. Releasing a lease twice, or a reference of another VM, does nothing.
    pub fn release(&self, reference: NativeRef) {
        if reference.vm != self.vm {
            debug!(vm = self.vm, other = reference.vm, "ignoring a reference of another VM");
            return;
        }
        let mut state = self.state.lock();
        let emptied = match state.slots.get_mut(&reference.slot) {
            Some(slot) => {
                if !slot.leases.remove(&reference.lease) {
                    return;
                }
                slot.leases.is_empty()
            }
            None => return,
        };
        state.leases -= 1;
        if !emptied {
            return;
        }
        if let Some(slot) = state.slots.remove(&reference.slot) {
            if let Some(slots) = state.by_identity.get_mut(&slot.identity) {
                slots.retain(|other| *other != reference.slot);
                if slots.is_empty() {
                    state.by_identity.remove(&slot.identity);
                }
            }
            if self.runtime.is_current_thread_attached() {
                self.flush_pending(&mut state);
                self.runtime.delete_global_ref(slot.global);
            } else {
                debug!(vm = self.vm, "deferring a global reference delete to an attached thread");
                state.pending_deletes.push(slot.global);
            }
        }
    }

    /// The global reference behind a live lease.
    pub fn resolve(&self, reference: NativeRef) -> Result<RawHandle> {
        self.resolve_locked(&self.state.lock(), reference)
    }

    fn resolve_locked(&self, state: &RegistryState, reference: NativeRef) -> Result<RawHandle> {
        match state.slots.get(&reference.slot) {
            Some(slot) if reference.vm == self.vm && slot.leases.contains(&reference.lease) => {
                Ok(slot.global)
            }
            _ => Err(BridgeError::StaleReference),
        }
    }

    /// A new lease on the same object. Fails with
    /// [`StaleReference`](enum.BridgeError.html#variant.StaleReference) once `reference` is released.
    pub fn duplicate(&self, reference: NativeRef) -> Result<NativeRef> {
        let mut state = self.state.lock();
        self.resolve_locked(&state, reference)?;
        state.lease(self.vm, reference.slot)
    }

    pub fn is_live(&self, reference: NativeRef) -> bool {
        self.resolve(reference).is_ok()
    }

    /// Number of outstanding leases.
    pub fn live_count(&self) -> usize {
        self.state.lock().leases
    }

    /// Number of distinct objects held.
    pub fn object_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Delete deferred global references. The current thread must be attached.
    pub(crate) fn flush(&self) {
        if self.runtime.is_current_thread_attached() {
            self.flush_pending(&mut self.state.lock());
        }
    }

    fn flush_pending(&self, state: &mut RegistryState) {
        for global in state.pending_deletes.drain(..) {
            self.runtime.delete_global_ref(global);
        }
    }

    /// Drop every slot, making all outstanding `NativeRef`s stale. Returns the number of leases
    /// invalidated. Global references are deleted when the current thread is attached.
    pub(crate) fn invalidate_all(&self) -> usize {
        let mut state = self.state.lock();
        state.invalidated = true;
        let invalidated = state.leases;
        let attached = self.runtime.is_current_thread_attached();
        let slots: Vec<Slot> = state.slots.drain().map(|(_, slot)| slot).collect();
        if attached {
            self.flush_pending(&mut state);
            for slot in &slots {
                self.runtime.delete_global_ref(slot.global);
            }
        } else {
            state.pending_deletes.clear();
        }
        state.by_identity.clear();
        state.leases = 0;
        if invalidated > 0 {
            warn!(vm = self.vm, references = invalidated, "invalidated live references");
        }
        invalidated
    }

    fn fault(&self, context: &ThreadContext, fault: Fault) -> BridgeError {
        ExceptionTranslator::detached(&*self.runtime).fault(context, fault)
    }
}

/// A host-side owner of one [`NativeRef`](struct.NativeRef.html) lease.
///
/// Cloning takes a new lease; dropping releases it.
pub struct JavaObject {
    reference: NativeRef,
    registry: Arc<ReferenceRegistry>,
}

impl JavaObject {
    /// Take ownership of `reference`'s lease.
    pub fn new(reference: NativeRef, registry: Arc<ReferenceRegistry>) -> Self {
        JavaObject {
            reference,
            registry,
        }
    }

    pub fn native_ref(&self) -> NativeRef {
        self.reference
    }

    /// Give up ownership of the lease without releasing it.
    pub fn into_native_ref(self) -> NativeRef {
        let object = ManuallyDrop::new(self);
        // Safe because `object` is never used or dropped again.
        drop(unsafe { ptr::read(&object.registry) });
        object.reference
    }

    pub fn is_live(&self) -> bool {
        self.registry.is_live(self.reference)
    }

    /// Binary name of the object's class.
    pub fn class_name(&self, context: &ThreadContext) -> Result<String> {
        context.verify(self.registry.vm)?;
        let global = self.registry.resolve(self.reference)?;
        self.registry
            .runtime
            .class_name(global)
            .map_err(|fault| self.registry.fault(context, fault))
    }

    /// Whether the object is an instance of a class, given by binary or internal name.
    pub fn is_instance_of(&self, context: &ThreadContext, class_name: &str) -> Result<bool> {
        context.verify(self.registry.vm)?;
        let global = self.registry.resolve(self.reference)?;
        self.registry
            .runtime
            .is_instance_of(global, &crate::java_string::to_internal_name(class_name))
            .map_err(|fault| self.registry.fault(context, fault))
    }
}

impl Clone for JavaObject {
    fn clone(&self) -> Self {
        // A stale object clones into another stale object.
        let reference = self
            .registry
            .duplicate(self.reference)
            .unwrap_or_else(|_| self.reference);
        JavaObject::new(reference, self.registry.clone())
    }
}

impl Drop for JavaObject {
    fn drop(&mut self) {
        self.registry.release(self.reference);
    }
}

impl PartialEq for JavaObject {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for JavaObject {}

impl Hash for JavaObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}

impl fmt::Debug for JavaObject {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("JavaObject")
            .field("reference", &self.reference)
            .finish()
    }
}
