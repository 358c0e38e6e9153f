//! The context switcher contract.
use crate::task::StackAccess;

/// Saves and restores CPU state across the kernel boundary.
///
/// The switcher is architecture-specific and provided by the kernel
/// integrator; the core requires only this contract. It is the single
/// suspension point in the dispatcher loop: every other operation in the
/// loop is non-blocking and bounded.
pub trait ContextSwitcher {
    /// The type of runnable task on the system, typically the task control
    /// block. Must provide full access to its stack pointer.
    type Task: StackAccess + 'static;

    /// The value produced when control re-enters the kernel, describing why
    /// it was entered, e.g. the trap number on x86. Equal values name the
    /// same service routine.
    type ServiceIdentifier;

    /// Switches from `prev` to `next` and exits the kernel.
    ///
    /// Saves `prev`'s CPU state so that `prev.stack_pointer()` afterwards
    /// refers to a self-describing execution context, then restores `next`'s
    /// state from `next.stack_pointer()`. Returns only when a trap, fault,
    /// or interrupt re-enters the kernel; on that return path `next` has
    /// become the interrupted task.
    fn switch_task(
        prev: &'static Self::Task,
        next: &'static Self::Task,
    ) -> Self::ServiceIdentifier;
}
