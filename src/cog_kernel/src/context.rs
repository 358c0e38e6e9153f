//! Execution contexts: the saved CPU state of an interrupted task.
//!
//! When the context switcher re-enters the kernel, the interrupted task's
//! stack pointer refers to a self-describing record of its CPU state. The
//! format of that record is architecture-specific; the core only needs the
//! small window defined by [`ExecutionContext`] to service system calls.
use core::mem;

use crate::task::{EventHandler, StackRegion, SyscallAccess};

/// System call support an execution context must provide.
pub trait ExecutionContext {
    /// Reads the register that stores the service identifier.
    fn service_identifier(&self) -> u32;

    /// Pops the next raw word off the argument list.
    ///
    /// Advances a cursor stored in the context; reads are not repeatable.
    fn next_syscall_word(&self) -> usize;

    /// Writes the register that carries the kernel return value back to the
    /// caller.
    fn set_kernel_return_value(&self, value: isize);
}

/// Views the execution context a task's stack pointer refers to.
///
/// # Safety
///
/// `stack_pointer` must point at a live, correctly aligned context of type
/// `C`, as left by the context switcher on kernel entry or synthesized by an
/// architecture context builder.
pub unsafe fn context_at<'a, C: ExecutionContext>(stack_pointer: *mut u8) -> &'a C {
    debug_assert!(!stack_pointer.is_null());

    // Safety: upheld by the caller
    unsafe { &*stack_pointer.cast::<C>() }
}

/// A value that can be decoded from a task's sequential system call
/// argument stream.
///
/// Decoding consumes one word per `next_syscall_word` call; a multi-word
/// value documents the order in which it consumes its words.
pub trait SyscallValue: Sized {
    fn read_from<T: SyscallAccess>(task: &T) -> Self;
}

impl SyscallValue for usize {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        task.next_syscall_word()
    }
}

impl SyscallValue for u32 {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        task.next_syscall_word() as u32
    }
}

impl SyscallValue for *mut u8 {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        task.next_syscall_word() as *mut u8
    }
}

impl SyscallValue for *const u8 {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        task.next_syscall_word() as *const u8
    }
}

impl SyscallValue for EventHandler {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        let word = task.next_syscall_word();

        // Safety: argument words holding a handler are written by the
        // user-mode syscall stubs from a function pointer of this exact type.
        unsafe { mem::transmute::<usize, EventHandler>(word) }
    }
}

/// Decoded from two consecutive words: the base address, then the length.
impl SyscallValue for StackRegion {
    fn read_from<T: SyscallAccess>(task: &T) -> Self {
        let base = task.next_syscall_word() as *mut u8;
        let len = task.next_syscall_word();

        Self { base, len }
    }
}
