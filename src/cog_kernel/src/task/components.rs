//! Reusable pieces that can be selected to assemble a task control block.
//!
//! Each component owns the storage for one capability. A concrete TCB embeds
//! the components it wants and implements the corresponding traits from the
//! parent module by delegating to them.
use core::marker::PhantomData;

use crate::{
    globals::SharedStackBinding,
    task::{EventHandler, StackRegion},
    utils::{Init, KernelCell},
};

/// Shared stack support.
///
/// Both accessors forward to the process-wide shared stack pointer bound
/// through `B`, so every TCB embedding this component aliases the same
/// storage. Used by event-style TCBs whose one-shot handlers run on one
/// stack.
pub struct SharedStackCell<B> {
    _binding: PhantomData<B>,
}

impl<B: SharedStackBinding> SharedStackCell<B> {
    pub fn stack_pointer(&self) -> *mut u8 {
        B::shared_stack().get()
    }

    pub fn set_stack_pointer(&self, stack_pointer: *mut u8) {
        B::shared_stack().set(stack_pointer);
    }
}

impl<B> Init for SharedStackCell<B> {
    const INIT: Self = Self {
        _binding: PhantomData,
    };
}

/// Dedicated, non-recyclable stack support: the TCB records the current
/// stack pointer and nothing else. The kernel never reclaims the memory.
pub struct DedicatedStackCell {
    stack_pointer: KernelCell<*mut u8>,
}

impl DedicatedStackCell {
    pub fn stack_pointer(&self) -> *mut u8 {
        self.stack_pointer.get()
    }

    pub fn set_stack_pointer(&self, stack_pointer: *mut u8) {
        self.stack_pointer.set(stack_pointer);
    }
}

impl Init for DedicatedStackCell {
    const INIT: Self = Self {
        stack_pointer: KernelCell::new(core::ptr::null_mut()),
    };
}

/// Dedicated recyclable stack support: in addition to the current stack
/// pointer, the TCB records the owning allocation so the kernel can release
/// it when the task finishes.
pub struct RecyclableStackCell {
    stack_pointer: KernelCell<*mut u8>,
    region: KernelCell<StackRegion>,
}

impl RecyclableStackCell {
    pub fn stack_pointer(&self) -> *mut u8 {
        self.stack_pointer.get()
    }

    pub fn set_stack_pointer(&self, stack_pointer: *mut u8) {
        self.stack_pointer.set(stack_pointer);
    }

    pub fn region(&self) -> StackRegion {
        self.region.get()
    }

    pub fn set_region(&self, region: StackRegion) {
        self.region.set(region);
    }
}

impl Init for RecyclableStackCell {
    const INIT: Self = Self {
        stack_pointer: KernelCell::new(core::ptr::null_mut()),
        region: KernelCell::new(StackRegion::INIT),
    };
}

/// Unique numeric identifier support.
pub struct NumericIdCell<I> {
    identifier: KernelCell<I>,
}

impl<I: Copy> NumericIdCell<I> {
    pub fn get(&self) -> I {
        self.identifier.get()
    }

    pub fn set(&self, identifier: I) {
        self.identifier.set(identifier);
    }
}

impl<I: Init> Init for NumericIdCell<I> {
    const INIT: Self = Self {
        identifier: KernelCell::new(I::INIT),
    };
}

/// Priority level support.
pub struct PriorityCell<P> {
    priority: KernelCell<P>,
}

impl<P: Copy> PriorityCell<P> {
    pub fn get(&self) -> P {
        self.priority.get()
    }

    pub fn set(&self, priority: P) {
        self.priority.set(priority);
    }
}

impl<P: Init> Init for PriorityCell<P> {
    const INIT: Self = Self {
        priority: KernelCell::new(P::INIT),
    };
}

/// Explicit task state support.
pub struct StateCell<S> {
    state: KernelCell<S>,
}

impl<S: Copy> StateCell<S> {
    pub fn get(&self) -> S {
        self.state.get()
    }

    pub fn set(&self, state: S) {
        self.state.set(state);
    }
}

impl<S: Init> Init for StateCell<S> {
    const INIT: Self = Self {
        state: KernelCell::new(S::INIT),
    };
}

/// Event handler storage for an event-style TCB.
pub struct EventHandlerCell {
    handler: KernelCell<EventHandler>,
}

impl EventHandlerCell {
    pub const fn new(handler: EventHandler) -> Self {
        Self {
            handler: KernelCell::new(handler),
        }
    }

    pub fn get(&self) -> EventHandler {
        self.handler.get()
    }

    pub fn set(&self, handler: EventHandler) {
        self.handler.set(handler);
    }
}

impl Init for EventHandlerCell {
    const INIT: Self = Self::new(unregistered_event_handler);
}

fn unregistered_event_handler() {
    panic!("an event with no registered handler was dispatched");
}
