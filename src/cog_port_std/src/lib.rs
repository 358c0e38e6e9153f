#![doc = include_str!("./lib.md")]
#![deny(unsafe_op_in_unsafe_fn)]

use std::{any::Any, panic};

use cog_kernel::task::StackRegion;

pub mod builders;
mod cpu;
pub mod frame;
pub mod syscall;
pub mod task;

pub use self::cpu::{CpuBinding, HostedContextSwitcher, HostedCpu};

// Service identifier assignments of this port's "trap vector".
pub const SERVICE_SET_EVENT_HANDLER: u32 = 1;
pub const SERVICE_SEND_EVENT: u32 = 2;
pub const SERVICE_EVENT_HANDLER_RETURN: u32 = 3;
pub const SERVICE_CREATE_THREAD: u32 = 4;
pub const SERVICE_FINISH_THREAD: u32 = 5;
pub const SERVICE_SHUTDOWN: u32 = 6;

/// Raised by the simulator when user code panics, so the kernel fails loudly
/// instead of waiting forever. Map it to an unknown-service routine.
pub const SERVICE_USER_PANIC: u32 = 7;

/// The panic payload [`shutdown_service`] unwinds the dispatcher with.
pub struct ShutdownRequested;

/// Service routine that stops the dispatcher.
///
/// The dispatcher loop has no exit, so stopping it is modeled the same way a
/// real kernel powers off: control never comes back. Here that is an unwind
/// with a distinguished payload, which [`run`] converts into a normal
/// return.
pub fn shutdown_service<Task: 'static>(_task: &'static Task) -> &'static Task {
    log::debug!("shutdown requested");

    panic::panic_any(ShutdownRequested);
}

/// Runs a kernel until it shuts down.
///
/// Returns `Ok(())` when the body unwinds with [`ShutdownRequested`]; any
/// other unwind (a halted dispatcher, a failed assertion) is handed back to
/// the caller.
pub fn run<F: FnOnce()>(body: F) -> Result<(), Box<dyn Any + Send>> {
    match panic::catch_unwind(panic::AssertUnwindSafe(body)) {
        Ok(()) => Ok(()),
        Err(payload) if payload.is::<ShutdownRequested>() => Ok(()),
        Err(payload) => Err(payload),
    }
}

/// Allocates a stack with a stable address for the lifetime of the process.
pub fn leak_stack(len: usize) -> StackRegion {
    let base = Box::leak(vec![0u8; len].into_boxed_slice()).as_mut_ptr();

    StackRegion { base, len }
}

/// Initializes logging for a test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
