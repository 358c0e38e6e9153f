//! The event-driven execution model.
//!
//! Event handlers are one-shot: each runs to completion on the shared stack
//! without blocking, bootstrapped by [`event_handler_trampoline`], which
//! hands control back to the kernel when the handler returns. The
//! dispatcher's code injectors synthesize the trampoline frame right before
//! the switch, so the service routines stay free of context preparation.
use core::ptr;

use crate::{
    dispatcher::CodeInjector,
    globals::SchedulerBinding,
    scheduler::{TaskCreationHandler, TaskTerminationHandler},
    services::KERNEL_RETURN_FAILURE,
    task::{EventHandler, EventHandlerAccess, Prioritizable, StackAccess, SyscallAccess},
    utils::Init,
};

/// A fixed-capacity table mapping each event to the task-like control block
/// that carries its handler.
///
/// Event numbers are dense unsigned integers in `[0, NUM_EVENTS)`. Entries
/// persist for the lifetime of their slot; registering an event only swaps
/// the handler function.
pub struct TableBasedEventController<Task, const NUM_EVENTS: usize> {
    tasks: [Task; NUM_EVENTS],
}

impl<Task: EventHandlerAccess, const NUM_EVENTS: usize>
    TableBasedEventController<Task, NUM_EVENTS>
{
    /// Stores `handler` as the handler of `event`.
    ///
    /// Panics if `event` is out of range; syscall-facing wrappers validate
    /// first (see [`set_event_handler`]).
    pub fn register_event(&self, event: usize, handler: EventHandler) {
        self.tasks[event].set_handler(handler);
    }

    /// Returns a stable reference to the control block of `event`.
    pub fn registered_event(&self, event: usize) -> &Task {
        &self.tasks[event]
    }
}

impl<Task: Init, const NUM_EVENTS: usize> Init for TableBasedEventController<Task, NUM_EVENTS> {
    const INIT: Self = Self {
        tasks: [Task::INIT; NUM_EVENTS],
    };
}

/// Binds the event table so the event-driven service routines can look up
/// and register handler control blocks.
pub trait EventTableBinding: SchedulerBinding {
    /// The number of event slots; valid events are `0..NUM_EVENTS`.
    const NUM_EVENTS: usize;

    fn event_task(event: usize) -> &'static Self::Task;

    fn register_event(event: usize, handler: EventHandler);
}

/// Service routine that handles the request of sending an event.
///
/// Reads the event number from the caller's argument list and notifies the
/// scheduler that a new schedulable unit exists. The scheduler is
/// authoritative over whether the event preempts the caller immediately.
///
/// The event number is validated in debug builds only; in release builds an
/// out-of-range event is the caller's contract violation.
pub fn send_event<K>(task: &'static K::Task) -> &'static K::Task
where
    K: EventTableBinding,
    K::Task: SyscallAccess,
    K::Scheduler: TaskCreationHandler<K::Task>,
{
    let event: usize = task.syscall_argument();

    debug_assert!(event < K::NUM_EVENTS, "event number {event} out of range");

    log::trace!("task at {task:p} raised event {event}");

    K::scheduler().on_task_created(task, K::event_task(event))
}

/// Service routine that handles a task whose event handler has finished.
///
/// Restores the task's stack pointer from the saved value passed by the
/// trampoline (for shared-stack TCBs this restores the process-wide shared
/// stack pointer), then notifies the scheduler that the task has finished.
pub fn event_handler_return<K>(task: &'static K::Task) -> &'static K::Task
where
    K: SchedulerBinding,
    K::Task: SyscallAccess + StackAccess,
    K::Scheduler: TaskTerminationHandler<K::Task>,
{
    let old_stack_pointer: *mut u8 = task.syscall_argument();

    task.set_stack_pointer(old_stack_pointer);

    log::trace!("task stack pointer restored to {old_stack_pointer:p}");

    K::scheduler().on_task_finished(task)
}

/// Service routine that registers an event handler on behalf of the caller.
///
/// Reads the event number and the handler from the caller's argument list.
/// An out-of-range event is a soft failure: the kernel return value is set
/// to the failure sentinel and the caller keeps running.
pub fn set_event_handler<K>(task: &'static K::Task) -> &'static K::Task
where
    K: EventTableBinding,
    K::Task: SyscallAccess,
{
    let event: usize = task.syscall_argument();
    let handler: EventHandler = task.syscall_argument();

    if event >= K::NUM_EVENTS {
        log::error!("cannot register a handler for out-of-range event {event}");

        task.set_kernel_return_value(KERNEL_RETURN_FAILURE);

        return task;
    }

    K::register_event(event, handler);

    task
}

/// The user-mode system call through which a finished event handler returns
/// control to the kernel. Implemented by the kernel integrator on top of its
/// trap mechanism.
pub trait EventHandlerReturnPoint {
    fn event_handler_return(old_stack_pointer: *mut u8);
}

/// Bootstraps a one-shot event handler.
///
/// The synthesized trampoline frame enters this routine with the user
/// handler and the stack pointer saved at preemption time. Calling the
/// handler first and raising the event-handler-return system call second is
/// what guarantees that every handler releases the shared stack back to the
/// kernel.
pub fn event_handler_trampoline<P: EventHandlerReturnPoint>(
    handler: EventHandler,
    old_stack_pointer: *mut u8,
) {
    handler();

    P::event_handler_return(old_stack_pointer);
}

/// Writes a trampoline frame for an event handler that is selected to run.
///
/// Architecture-specific and provided by the kernel integrator: the builder
/// synthesizes, on the next task's stack, a return frame that enters
/// [`event_handler_trampoline`] with `next`'s handler and `prev`'s current
/// stack pointer, then records the frame in `next`'s stack pointer.
pub trait TrampolineContextBuilder<Task: 'static> {
    fn build(prev: &'static Task, next: &'static Task);
}

/// A code injector that sets up the execution context, if necessary, for a
/// **preemptive** event handler that is selected to run.
///
/// The context is built iff the next task has a strictly higher priority
/// than the interrupted one: only a higher-priority handler may preempt a
/// lower one. An equal- or lower-priority `next` either continues or resumes
/// from a previously saved context.
pub struct PreemptiveEventTrampolineInjector<Builder> {
    _builder: core::marker::PhantomData<Builder>,
}

impl<Task, Builder> CodeInjector<Task> for PreemptiveEventTrampolineInjector<Builder>
where
    Task: Prioritizable + EventHandlerAccess + 'static,
    Builder: TrampolineContextBuilder<Task>,
{
    fn inject(prev: &'static Task, next: &'static Task) {
        if next.priority() > prev.priority() {
            log::trace!("the next event handler has a higher priority than the previous one");

            Builder::build(prev, next);
        }
    }
}

/// A code injector that sets up the execution context, if necessary, for a
/// **cooperative** event handler that is selected to run.
///
/// The context is built iff the next task is not identically the interrupted
/// one: a new handler never preempts the running one, so a change of task
/// always means a fresh one-shot activation.
pub struct CooperativeEventTrampolineInjector<Builder> {
    _builder: core::marker::PhantomData<Builder>,
}

impl<Task, Builder> CodeInjector<Task> for CooperativeEventTrampolineInjector<Builder>
where
    Task: Prioritizable + EventHandlerAccess + 'static,
    Builder: TrampolineContextBuilder<Task>,
{
    fn inject(prev: &'static Task, next: &'static Task) {
        if !ptr::eq(prev, next) {
            log::trace!("the next event handler is not the same as the previous one");

            Builder::build(prev, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        task::components::{EventHandlerCell, PriorityCell, SharedStackCell},
        utils::KernelCell,
    };
    use std::cell::RefCell;

    struct Kern;

    crate::bind_shared_stack!(impl SharedStackBinding for Kern);

    struct EventCb {
        stack: SharedStackCell<Kern>,
        priority: PriorityCell<u32>,
        handler: EventHandlerCell,
    }

    impl Init for EventCb {
        const INIT: Self = Self {
            stack: Init::INIT,
            priority: Init::INIT,
            handler: Init::INIT,
        };
    }

    impl StackAccess for EventCb {
        fn stack_pointer(&self) -> *mut u8 {
            self.stack.stack_pointer()
        }

        fn set_stack_pointer(&self, stack_pointer: *mut u8) {
            self.stack.set_stack_pointer(stack_pointer);
        }
    }

    impl Prioritizable for EventCb {
        type Priority = u32;

        fn priority(&self) -> u32 {
            self.priority.get()
        }

        fn set_priority(&self, priority: u32) {
            self.priority.set(priority);
        }
    }

    impl EventHandlerAccess for EventCb {
        fn handler(&self) -> EventHandler {
            self.handler.get()
        }

        fn set_handler(&self, handler: EventHandler) {
            self.handler.set(handler);
        }
    }

    thread_local! {
        static BUILT: RefCell<Vec<(usize, usize)>> = RefCell::new(Vec::new());
    }

    struct RecordingBuilder;

    impl TrampolineContextBuilder<EventCb> for RecordingBuilder {
        fn build(prev: &'static EventCb, next: &'static EventCb) {
            BUILT.with(|b| {
                b.borrow_mut()
                    .push((prev as *const _ as usize, next as *const _ as usize))
            });
        }
    }

    fn built_frames() -> usize {
        BUILT.with(|b| {
            let n = b.borrow().len();
            b.borrow_mut().clear();
            n
        })
    }

    fn handler_x() {}
    fn handler_y() {}

    #[test]
    fn table_registration_leaves_other_slots_alone() {
        static TABLE: TableBasedEventController<EventCb, 4> = Init::INIT;

        let before: Vec<usize> = (0..4)
            .map(|e| TABLE.registered_event(e).handler() as usize)
            .collect();

        TABLE.register_event(2, handler_x);

        assert_eq!(TABLE.registered_event(2).handler() as usize, handler_x as usize);
        for e in [0, 1, 3] {
            assert_eq!(TABLE.registered_event(e).handler() as usize, before[e]);
        }

        TABLE.register_event(2, handler_y);
        assert_eq!(TABLE.registered_event(2).handler() as usize, handler_y as usize);
    }

    #[test]
    fn preemptive_injector_builds_iff_priority_is_higher() {
        static LOW: EventCb = Init::INIT;
        static HIGH: EventCb = Init::INIT;
        LOW.set_priority(1);
        HIGH.set_priority(3);

        type Injector = PreemptiveEventTrampolineInjector<RecordingBuilder>;

        Injector::inject(&LOW, &HIGH);
        assert_eq!(built_frames(), 1);

        Injector::inject(&HIGH, &LOW);
        assert_eq!(built_frames(), 0);

        Injector::inject(&HIGH, &HIGH);
        assert_eq!(built_frames(), 0);
    }

    #[test]
    fn cooperative_injector_builds_iff_task_changes() {
        static FIRST: EventCb = Init::INIT;
        static SECOND: EventCb = Init::INIT;
        // Equal priorities: identity, not priority, is the gate.
        FIRST.set_priority(1);
        SECOND.set_priority(1);

        type Injector = CooperativeEventTrampolineInjector<RecordingBuilder>;

        Injector::inject(&FIRST, &FIRST);
        assert_eq!(built_frames(), 0);

        Injector::inject(&FIRST, &SECOND);
        assert_eq!(built_frames(), 1);
    }

    thread_local! {
        static TRAMPOLINE_TRACE: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    struct RecordingReturnPoint;

    impl EventHandlerReturnPoint for RecordingReturnPoint {
        fn event_handler_return(old_stack_pointer: *mut u8) {
            TRAMPOLINE_TRACE
                .with(|t| t.borrow_mut().push(format!("return {old_stack_pointer:p}")));
        }
    }

    fn traced_handler() {
        TRAMPOLINE_TRACE.with(|t| t.borrow_mut().push("handler".to_string()));
    }

    #[test]
    fn trampoline_calls_handler_then_returns_saved_stack() {
        event_handler_trampoline::<RecordingReturnPoint>(traced_handler, 0x7000 as *mut u8);

        let trace = TRAMPOLINE_TRACE.with(|t| t.borrow().clone());
        assert_eq!(trace, ["handler", "return 0x7000"]);
    }

    // A miniature kernel wiring the routines to recording collaborators.

    struct RoutineKern;

    crate::bind_shared_stack!(impl SharedStackBinding for RoutineKern);

    struct SyscallCb {
        stack: SharedStackCell<RoutineKern>,
        handler: EventHandlerCell,
        args: KernelCell<[usize; 8]>,
        len: KernelCell<usize>,
        cursor: KernelCell<usize>,
        return_value: KernelCell<isize>,
    }

    impl SyscallCb {
        fn feed(&self, words: &[usize]) {
            let mut args = [0; 8];
            args[..words.len()].copy_from_slice(words);
            self.args.set(args);
            self.len.set(words.len());
            self.cursor.set(0);
        }
    }

    impl Init for SyscallCb {
        const INIT: Self = Self {
            stack: Init::INIT,
            handler: Init::INIT,
            args: Init::INIT,
            len: Init::INIT,
            cursor: Init::INIT,
            return_value: Init::INIT,
        };
    }

    impl StackAccess for SyscallCb {
        fn stack_pointer(&self) -> *mut u8 {
            self.stack.stack_pointer()
        }

        fn set_stack_pointer(&self, stack_pointer: *mut u8) {
            self.stack.set_stack_pointer(stack_pointer);
        }
    }

    impl EventHandlerAccess for SyscallCb {
        fn handler(&self) -> EventHandler {
            self.handler.get()
        }

        fn set_handler(&self, handler: EventHandler) {
            self.handler.set(handler);
        }
    }

    impl SyscallAccess for SyscallCb {
        fn next_syscall_word(&self) -> usize {
            let cursor = self.cursor.get();
            assert!(cursor < self.len.get(), "argument stream exhausted");
            self.cursor.set(cursor + 1);
            self.args.get()[cursor]
        }

        fn set_kernel_return_value(&self, value: isize) {
            self.return_value.set(value);
        }
    }

    thread_local! {
        static SCHEDULED: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    struct RecordingScheduler;

    impl TaskCreationHandler<SyscallCb> for RecordingScheduler {
        fn on_task_created(
            &self,
            current: &'static SyscallCb,
            new_task: &'static SyscallCb,
        ) -> &'static SyscallCb {
            SCHEDULED.with(|s| {
                s.borrow_mut().push(format!(
                    "created {:p} {:p}",
                    current as *const SyscallCb, new_task as *const SyscallCb
                ))
            });
            new_task
        }
    }

    impl TaskTerminationHandler<SyscallCb> for RecordingScheduler {
        fn on_task_finished(&self, current: &'static SyscallCb) -> &'static SyscallCb {
            SCHEDULED.with(|s| {
                s.borrow_mut()
                    .push(format!("finished {:p}", current as *const SyscallCb))
            });
            current
        }
    }

    crate::bind_task_scheduler! {
        impl SchedulerBinding for RoutineKern {
            type Task = SyscallCb;
            type Scheduler = RecordingScheduler;
            const INIT: RecordingScheduler = RecordingScheduler;
        }
    }

    static EVENT_TABLE: TableBasedEventController<SyscallCb, 4> = Init::INIT;

    impl EventTableBinding for RoutineKern {
        const NUM_EVENTS: usize = 4;

        fn event_task(event: usize) -> &'static SyscallCb {
            EVENT_TABLE.registered_event(event)
        }

        fn register_event(event: usize, handler: EventHandler) {
            EVENT_TABLE.register_event(event, handler);
        }
    }

    #[test]
    fn send_event_forwards_the_table_entry_to_the_scheduler() {
        static CALLER: SyscallCb = Init::INIT;
        CALLER.feed(&[3]);
        SCHEDULED.with(|s| s.borrow_mut().clear());

        let next = send_event::<RoutineKern>(&CALLER);

        assert!(ptr::eq(next, EVENT_TABLE.registered_event(3)));
        let expected = format!(
            "created {:p} {:p}",
            &CALLER as *const SyscallCb,
            EVENT_TABLE.registered_event(3) as *const SyscallCb
        );
        assert_eq!(SCHEDULED.with(|s| s.borrow().clone()), [expected]);
    }

    #[test]
    fn handler_return_restores_stack_and_notifies_scheduler() {
        static FINISHED: SyscallCb = Init::INIT;
        FINISHED.set_stack_pointer(0x100 as *mut u8);
        FINISHED.feed(&[0x9000]);
        SCHEDULED.with(|s| s.borrow_mut().clear());

        let next = event_handler_return::<RoutineKern>(&FINISHED);

        assert!(ptr::eq(next, &FINISHED));
        assert_eq!(FINISHED.stack_pointer(), 0x9000 as *mut u8);
        assert_eq!(
            SCHEDULED.with(|s| s.borrow().clone()),
            [format!("finished {:p}", &FINISHED as *const SyscallCb)]
        );
    }

    #[test]
    fn set_event_handler_rejects_out_of_range_events() {
        static CALLER: SyscallCb = Init::INIT;
        CALLER.feed(&[17, handler_x as usize]);

        let next = set_event_handler::<RoutineKern>(&CALLER);

        assert!(ptr::eq(next, &CALLER));
        assert_eq!(CALLER.return_value.get(), KERNEL_RETURN_FAILURE);
    }

    #[test]
    fn set_event_handler_registers_in_range_events() {
        static CALLER: SyscallCb = Init::INIT;
        CALLER.feed(&[1, handler_y as usize]);

        let next = set_event_handler::<RoutineKern>(&CALLER);

        assert!(ptr::eq(next, &CALLER));
        assert_eq!(
            EVENT_TABLE.registered_event(1).handler() as usize,
            handler_y as usize
        );
    }
}
