//! Concrete task control blocks assembled for the simulator.
use cog_kernel::{
    context::context_at,
    globals::{SharedStackBinding, TaskController},
    task::{
        components::{
            EventHandlerCell, NumericIdCell, PriorityCell, RecyclableStackCell, SharedStackCell,
            StateCell,
        },
        EventHandler, EventHandlerAccess, ExplicitState, PrivateStackAccess, Prioritizable,
        StackAccess, StackRegion, SyscallAccess, UniquelyIdentifiable,
    },
    utils::Init,
    ExecutionContext,
};

use crate::frame::SyscallFrame;

/// The control block of a one-shot event handler task.
///
/// All event tasks of a kernel share one stack, so the stack component
/// aliases the process-wide shared stack pointer bound to `K`.
pub struct EventTaskCb<K: 'static> {
    stack: SharedStackCell<K>,
    priority: PriorityCell<u32>,
    handler: EventHandlerCell,
}

impl<K: 'static> Init for EventTaskCb<K> {
    const INIT: Self = Self {
        stack: Init::INIT,
        priority: Init::INIT,
        handler: Init::INIT,
    };
}

impl<K: SharedStackBinding + 'static> StackAccess for EventTaskCb<K> {
    fn stack_pointer(&self) -> *mut u8 {
        self.stack.stack_pointer()
    }

    fn set_stack_pointer(&self, stack_pointer: *mut u8) {
        self.stack.set_stack_pointer(stack_pointer);
    }
}

impl<K: 'static> Prioritizable for EventTaskCb<K> {
    type Priority = u32;

    fn priority(&self) -> u32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: u32) {
        self.priority.set(priority);
    }
}

impl<K: 'static> EventHandlerAccess for EventTaskCb<K> {
    fn handler(&self) -> EventHandler {
        self.handler.get()
    }

    fn set_handler(&self, handler: EventHandler) {
        self.handler.set(handler);
    }
}

impl<K: SharedStackBinding + 'static> SyscallAccess for EventTaskCb<K> {
    fn next_syscall_word(&self) -> usize {
        // Safety: on kernel entry the switcher leaves the stack pointer at
        // the caller's syscall frame
        unsafe { context_at::<SyscallFrame>(self.stack_pointer()) }.next_syscall_word()
    }

    fn set_kernel_return_value(&self, value: isize) {
        // Safety: as above
        unsafe { context_at::<SyscallFrame>(self.stack_pointer()) }.set_kernel_return_value(value);
    }
}

/// Pool occupancy state of a task control block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskSt {
    Free,
    Live,
}

impl Init for TaskSt {
    const INIT: Self = TaskSt::Free;
}

/// The control block of a thread with a dedicated, recyclable stack.
pub struct ThreadTaskCb {
    stack: RecyclableStackCell,
    identifier: NumericIdCell<u32>,
    priority: PriorityCell<u32>,
    state: StateCell<TaskSt>,
}

impl Init for ThreadTaskCb {
    const INIT: Self = Self {
        stack: Init::INIT,
        identifier: Init::INIT,
        priority: Init::INIT,
        state: Init::INIT,
    };
}

impl StackAccess for ThreadTaskCb {
    fn stack_pointer(&self) -> *mut u8 {
        self.stack.stack_pointer()
    }

    fn set_stack_pointer(&self, stack_pointer: *mut u8) {
        self.stack.set_stack_pointer(stack_pointer);
    }
}

impl PrivateStackAccess for ThreadTaskCb {
    fn private_stack(&self) -> StackRegion {
        self.stack.region()
    }

    fn set_private_stack(&self, region: StackRegion) {
        self.stack.set_region(region);
    }
}

impl UniquelyIdentifiable for ThreadTaskCb {
    type Identifier = u32;

    fn unique_identifier(&self) -> u32 {
        self.identifier.get()
    }

    fn set_unique_identifier(&self, identifier: u32) {
        self.identifier.set(identifier);
    }
}

impl Prioritizable for ThreadTaskCb {
    type Priority = u32;

    fn priority(&self) -> u32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: u32) {
        self.priority.set(priority);
    }
}

impl ExplicitState for ThreadTaskCb {
    type State = TaskSt;

    fn state(&self) -> TaskSt {
        self.state.get()
    }

    fn set_state(&self, state: TaskSt) {
        self.state.set(state);
    }
}

impl SyscallAccess for ThreadTaskCb {
    fn next_syscall_word(&self) -> usize {
        // Safety: on kernel entry the switcher leaves the stack pointer at
        // the caller's syscall frame
        unsafe { context_at::<SyscallFrame>(self.stack_pointer()) }.next_syscall_word()
    }

    fn set_kernel_return_value(&self, value: isize) {
        // Safety: as above
        unsafe { context_at::<SyscallFrame>(self.stack_pointer()) }.set_kernel_return_value(value);
    }
}

/// A fixed-capacity task controller that allocates by occupancy state.
pub struct PooledTaskController<Task, const N: usize> {
    pool: [Task; N],
}

impl<Task: Init, const N: usize> Init for PooledTaskController<Task, N> {
    const INIT: Self = Self {
        pool: [Task::INIT; N],
    };
}

impl<Task, const N: usize> TaskController for PooledTaskController<Task, N>
where
    Task: ExplicitState<State = TaskSt> + 'static,
{
    type Task = Task;

    fn allocate(&'static self) -> Option<&'static Task> {
        let task = self.pool.iter().find(|task| task.state() == TaskSt::Free)?;

        task.set_state(TaskSt::Live);

        log::trace!("allocated the task control block at {task:p}");

        Some(task)
    }

    fn release(&'static self, task: &'static Task) {
        debug_assert!(self.pool.iter().any(|candidate| core::ptr::eq(candidate, task)));

        task.set_state(TaskSt::Free);

        log::trace!("released the task control block at {task:p}");
    }
}
