//! The task constraint vocabulary and the component library used to assemble
//! concrete task control blocks.
//!
//! A task control block (TCB) is an open record: a concrete kernel declares
//! precisely the capability subset its execution model needs by implementing
//! the traits below, usually by delegating to the reusable storage cells in
//! [`components`]. Service routines, injectors, and the context switcher are
//! generic over these capabilities and never name a concrete TCB type.
use core::fmt;

use num_traits::Unsigned;

use crate::{context::SyscallValue, utils::Init};

pub mod components;

/// The signature of a one-shot event handler.
pub type EventHandler = fn();

/// A contiguous stack allocation.
///
/// `base` is the lowest address of the allocation and the only address that
/// is valid for deallocation; the initial stack pointer of a descending
/// stack is [`top`](Self::top).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackRegion {
    pub base: *mut u8,
    pub len: usize,
}

impl StackRegion {
    /// The address one past the end of the allocation.
    pub fn top(&self) -> *mut u8 {
        self.base.wrapping_add(self.len)
    }

    pub fn is_null(&self) -> bool {
        self.base.is_null()
    }
}

impl Init for StackRegion {
    const INIT: Self = Self {
        base: core::ptr::null_mut(),
        len: 0,
    };
}

/// A task control block that provides read and write access to its current
/// stack pointer.
///
/// For shared-stack TCBs both accessors forward to the process-wide shared
/// stack pointer, so every such TCB aliases the same storage.
pub trait StackAccess {
    /// The current top of the task's stack.
    fn stack_pointer(&self) -> *mut u8;

    fn set_stack_pointer(&self, stack_pointer: *mut u8);
}

/// A task control block that records the stack allocation it owns, so the
/// kernel can reclaim the memory when the task finishes.
pub trait PrivateStackAccess: StackAccess {
    fn private_stack(&self) -> StackRegion;

    fn set_private_stack(&self, region: StackRegion);
}

/// A task control block through which the kernel can service a system call:
/// sequential access to the caller's argument list and write access to the
/// kernel return value.
///
/// Argument reads are stateful. The first invocation returns the first
/// argument, the second invocation the second one, and so on; reads are not
/// repeatable. Multi-word values consume as many words as they declare.
pub trait SyscallAccess {
    /// Pops the next raw argument word off the calling context.
    fn next_syscall_word(&self) -> usize;

    fn set_kernel_return_value(&self, value: isize);

    /// Reads the next argument, decoded as `A`.
    fn syscall_argument<A: SyscallValue>(&self) -> A
    where
        Self: Sized,
    {
        A::read_from(self)
    }
}

/// A task control block that carries a numeric unique identifier, e.g. a
/// task, thread, or process id.
///
/// The TCB may choose any unsigned integral type to store the identifier
/// internally, e.g. 4 bits if fewer than 16 tasks can coexist on the system.
pub trait UniquelyIdentifiable {
    type Identifier: Unsigned + Copy;

    fn unique_identifier(&self) -> Self::Identifier;

    fn set_unique_identifier(&self, identifier: Self::Identifier);
}

/// A task control block that is prioritizable by a mutable priority level.
pub trait Prioritizable {
    type Priority: Ord + Copy + fmt::Debug;

    fn priority(&self) -> Self::Priority;

    fn set_priority(&self, priority: Self::Priority);
}

/// A task control block that tracks an explicit task state, e.g. free,
/// ready, or blocked.
pub trait ExplicitState {
    type State: Copy;

    fn state(&self) -> Self::State;

    fn set_state(&self, state: Self::State);
}

/// A task control block that carries the handler function of an event.
pub trait EventHandlerAccess {
    fn handler(&self) -> EventHandler;

    fn set_handler(&self, handler: EventHandler);
}
