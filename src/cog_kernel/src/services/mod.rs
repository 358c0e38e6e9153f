//! Kernel service routines.
//!
//! Routines are generic functions with the uniform shape
//! `fn(&'static Task) -> &'static Task`; a monomorphized instance coerces to
//! [`crate::dispatcher::ServiceRoutine`] and can be stored in a routine
//! mapper. They reach kernel-wide singletons through the
//! [`crate::globals`] bindings, so their signatures stay uniform.
//!
//! Soft failures are reported through the caller's kernel return value and
//! the caller is returned as the next task; fatal conditions do not return.

pub mod event;
pub mod thread;

/// Kernel return value reported to a caller whose request succeeded.
///
/// Routines do not write this value explicitly: a fresh system call context
/// carries it by default, so only failure paths touch the register. This
/// keeps kernel-invoked uses (whose caller has no system call context) safe
/// as long as they cannot fail.
pub const KERNEL_RETURN_SUCCESS: isize = 0;

/// Kernel return value reported to a caller whose request failed.
pub const KERNEL_RETURN_FAILURE: isize = -1;

/// Service routine invoked when the service identifier cannot be recognized.
///
/// Fatal: an unknown identifier means the trap vector and the routine mapper
/// disagree, and no task can meaningfully run next. Mappers should log the
/// offending identifier before routing here.
pub fn unknown_service<Task: 'static>(_task: &'static Task) -> &'static Task {
    log::error!("unknown kernel service identifier");

    panic!("unknown kernel service identifier");
}
