//! Architecture context builders for the simulated CPU.
use cog_kernel::task::{EventHandlerAccess, StackAccess};
use cog_kernel::services::{event::TrampolineContextBuilder, thread::ThreadContextBuilder};

use crate::frame::{self, EntryFrame, TrampolineFrame};

/// Synthesizes the return frame that bootstraps a one-shot event handler.
///
/// The frame carries the next task's handler and the interrupted task's
/// current stack pointer; running it enters the event handler trampoline,
/// which restores that pointer when the handler completes.
pub struct HostedTrampolineBuilder;

impl<Task> TrampolineContextBuilder<Task> for HostedTrampolineBuilder
where
    Task: StackAccess + EventHandlerAccess + 'static,
{
    fn build(prev: &'static Task, next: &'static Task) {
        let old_stack_pointer = prev.stack_pointer();

        // Safety: the shared stack has room below its current top
        let frame_addr = unsafe {
            frame::push(
                next.stack_pointer(),
                TrampolineFrame::new(next.handler(), old_stack_pointer),
            )
        };

        next.set_stack_pointer(frame_addr);

        log::trace!(
            "trampoline frame at {frame_addr:p} preserves the stack pointer {old_stack_pointer:p}"
        );
    }
}

/// Writes the initial execution context of a thread: an entry frame at the
/// top of its freshly assigned stack.
pub struct HostedThreadBuilder;

impl<Task: StackAccess + 'static> ThreadContextBuilder<Task> for HostedThreadBuilder {
    fn build(task: &'static Task, entry_point: *const u8) {
        // Safety: an earlier initializer assigned a stack with room for the
        // frame
        let frame_addr = unsafe {
            frame::push(task.stack_pointer(), EntryFrame::new(entry_point as usize))
        };

        task.set_stack_pointer(frame_addr);
    }
}

/// Bootstraps a task that exists before the dispatcher starts, e.g. the idle
/// task: writes an entry frame for `entry` below the task's current stack
/// pointer.
pub fn prepare_entry_context<Task: StackAccess + 'static>(task: &'static Task, entry: fn()) {
    HostedThreadBuilder::build(task, entry as *const u8);
}
