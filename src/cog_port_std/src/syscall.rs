//! User-mode system call stubs.
//!
//! On a real target these would be trap instructions; here they hand control
//! to the kernel thread through the simulated CPU. Each stub packs its
//! arguments into words in declaration order, leaves a syscall frame on the
//! calling activation's stack, and either suspends until the kernel
//! dispatches the activation again or lets the activation end.
use cog_kernel::{services::event::EventHandlerReturnPoint, task::EventHandler};

use crate::{
    cpu::{current_cpu, current_stack_pointer},
    frame::{self, SyscallFrame},
    SERVICE_CREATE_THREAD, SERVICE_EVENT_HANDLER_RETURN, SERVICE_SEND_EVENT,
    SERVICE_SET_EVENT_HANDLER, SERVICE_SHUTDOWN,
};

/// Raises a service and suspends the calling activation until the kernel
/// schedules it again. Returns the kernel return value.
pub fn syscall(identifier: u32, args: &[usize]) -> isize {
    let cpu = current_cpu();
    let sequence = cpu.allocate_sequence();

    // Safety: the frame goes onto the calling activation's own stack
    let frame_addr = unsafe {
        frame::push(
            current_stack_pointer(),
            SyscallFrame::new(identifier, sequence, args),
        )
    };

    cpu.raise_and_wait(identifier, frame_addr as usize, sequence);

    // Safety: the frame is still alive; the kernel wrote the return value
    // while this activation was suspended
    unsafe { &*frame_addr.cast::<SyscallFrame>() }.return_value()
}

/// Raises a service without suspending: the calling activation is over and
/// will never be resumed.
pub(crate) fn raise_exit(identifier: u32, args: &[usize]) {
    let cpu = current_cpu();
    let sequence = cpu.allocate_sequence();

    // Safety: the frame goes onto the calling activation's own stack
    let frame_addr = unsafe {
        frame::push(
            current_stack_pointer(),
            SyscallFrame::new(identifier, sequence, args),
        )
    };

    cpu.raise(identifier, frame_addr as usize);
}

/// Stores `handler` as the handler of `event`.
pub fn set_event_handler(event: usize, handler: EventHandler) -> isize {
    syscall(SERVICE_SET_EVENT_HANDLER, &[event, handler as usize])
}

/// Sends an event. Depending on the kernel's scheduling policy, the handler
/// may preempt the caller before this returns.
pub fn send_event(event: usize) -> isize {
    syscall(SERVICE_SEND_EVENT, &[event])
}

/// Creates a new thread. The argument words must match the kernel's
/// configured initializer list, one argument per initializer, in declaration
/// order.
pub fn create_thread(args: &[usize]) -> isize {
    syscall(SERVICE_CREATE_THREAD, args)
}

/// Asks the kernel to stop dispatching. The calling activation never
/// resumes.
pub fn shutdown() -> ! {
    raise_exit(SERVICE_SHUTDOWN, &[]);

    loop {
        std::thread::park();
    }
}

/// The private system call issued by the event handler trampoline when a
/// one-shot handler completes.
pub struct HostedEventHandlerReturn;

impl EventHandlerReturnPoint for HostedEventHandlerReturn {
    fn event_handler_return(old_stack_pointer: *mut u8) {
        raise_exit(SERVICE_EVENT_HANDLER_RETURN, &[old_stack_pointer as usize]);
    }
}
