//! End-to-end scenarios for the cooperative event-driven execution model.
//!
//! Each scenario assembles a complete kernel: event-style TCBs sharing one
//! stack, a cooperative scheduler, a routine mapper over the port's service
//! identifiers, and the cooperative trampoline injector. The "user programs"
//! are host functions driven by the simulated CPU.
use std::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayVec;
use cog_kernel::{
    dispatcher::{CodeInjector, Dispatcher, ServiceRoutine, ServiceRoutineMapper},
    globals::SharedStackBinding,
    scheduler::{TaskCreationHandler, TaskTerminationHandler},
    services,
    services::event::{
        CooperativeEventTrampolineInjector, EventTableBinding, TableBasedEventController,
    },
    task::{EventHandler, EventHandlerAccess as _},
    utils::Init,
};
use cog_port_std::{
    builders::{prepare_entry_context, HostedTrampolineBuilder},
    syscall,
    task::EventTaskCb,
    HostedContextSwitcher,
};

/// A run-to-completion scheduler: a new event only runs immediately when the
/// idle task raised it; otherwise it queues behind the running handler.
struct CoopScheduler<Task: 'static> {
    idle: &'static Task,
    queue: spin::Mutex<ArrayVec<&'static Task, 8>>,
}

impl<Task: 'static> CoopScheduler<Task> {
    const fn new(idle: &'static Task) -> Self {
        Self {
            idle,
            queue: spin::Mutex::new(ArrayVec::new_const()),
        }
    }
}

impl<Task: 'static> TaskCreationHandler<Task> for CoopScheduler<Task> {
    fn on_task_created(&self, current: &'static Task, new_task: &'static Task) -> &'static Task {
        if core::ptr::eq(current, self.idle) {
            new_task
        } else {
            self.queue.lock().push(new_task);
            current
        }
    }
}

impl<Task: 'static> TaskTerminationHandler<Task> for CoopScheduler<Task> {
    fn on_task_finished(&self, _current: &'static Task) -> &'static Task {
        let mut queue = self.queue.lock();

        if queue.is_empty() {
            self.idle
        } else {
            queue.remove(0)
        }
    }
}

mod single_event {
    use super::*;

    struct Kern;

    cog_kernel::bind_shared_stack!(impl SharedStackBinding for Kern);
    cog_port_std::bind_hosted_cpu!(impl CpuBinding for Kern);

    type Tcb = EventTaskCb<Kern>;

    static IDLE: Tcb = Init::INIT;
    static EVENTS: TableBasedEventController<Tcb, 8> = Init::INIT;

    cog_kernel::bind_task_scheduler! {
        impl SchedulerBinding for Kern {
            type Task = Tcb;
            type Scheduler = CoopScheduler<Tcb>;
            const INIT: CoopScheduler<Tcb> = CoopScheduler::new(&IDLE);
        }
    }

    impl EventTableBinding for Kern {
        const NUM_EVENTS: usize = 8;

        fn event_task(event: usize) -> &'static Tcb {
            EVENTS.registered_event(event)
        }

        fn register_event(event: usize, handler: EventHandler) {
            EVENTS.register_event(event, handler);
        }
    }

    struct Mapper;

    impl ServiceRoutineMapper for Mapper {
        type Task = Tcb;
        type ServiceIdentifier = u32;

        fn map(identifier: &u32) -> ServiceRoutine<Tcb> {
            match *identifier {
                cog_port_std::SERVICE_SET_EVENT_HANDLER => {
                    services::event::set_event_handler::<Kern>
                }
                cog_port_std::SERVICE_SEND_EVENT => services::event::send_event::<Kern>,
                cog_port_std::SERVICE_EVENT_HANDLER_RETURN => {
                    services::event::event_handler_return::<Kern>
                }
                cog_port_std::SERVICE_SHUTDOWN => cog_port_std::shutdown_service,
                other => {
                    log::error!("unknown service identifier {other}");
                    services::unknown_service
                }
            }
        }
    }

    /// Records the shared stack pointer at the top of every dispatcher
    /// iteration, before the trampoline injector runs.
    struct SpObserver;

    impl CodeInjector<Tcb> for SpObserver {
        fn inject(_prev: &'static Tcb, _next: &'static Tcb) {
            OBSERVED.lock().push(Kern::shared_stack().get() as usize);
        }
    }

    static OBSERVED: spin::Mutex<Vec<usize>> = spin::Mutex::new(Vec::new());
    static HANDLED: AtomicUsize = AtomicUsize::new(0);
    static ROUND: AtomicUsize = AtomicUsize::new(0);

    fn handler_five() {
        HANDLED.fetch_add(1, Ordering::SeqCst);
    }

    fn idle_main() {
        match ROUND.fetch_add(1, Ordering::SeqCst) {
            0 => {
                assert_eq!(syscall::set_event_handler(5, handler_five), 0);
                assert_eq!(HANDLED.load(Ordering::SeqCst), 0);

                // Never returns: the handler runs, and the scheduler then
                // starts a fresh idle activation.
                syscall::send_event(5);
                unreachable!("the suspended idle activation is abandoned");
            }
            _ => {
                assert_eq!(HANDLED.load(Ordering::SeqCst), 1);
                syscall::shutdown();
            }
        }
    }

    #[test]
    fn one_shot_handler_runs_and_releases_the_shared_stack() {
        cog_port_std::init_logging();

        let stack = cog_port_std::leak_stack(16 * 1024);
        Kern::shared_stack().set(stack.top());
        IDLE.set_handler(idle_main);
        prepare_entry_context(&IDLE, idle_main);

        type Switcher = HostedContextSwitcher<Kern, Tcb>;
        type Injectors = (
            SpObserver,
            CooperativeEventTrampolineInjector<HostedTrampolineBuilder>,
        );

        let mut dispatcher: Dispatcher<Switcher, Mapper, Injectors> =
            Dispatcher::new(&IDLE, &IDLE);

        assert!(cog_port_std::run(|| dispatcher.dispatch()).is_ok());

        assert_eq!(ROUND.load(Ordering::SeqCst), 2);
        assert_eq!(HANDLED.load(Ordering::SeqCst), 1);

        // Iterations observed: bootstrap, idle resumed after registering,
        // handler dispatch, fresh idle after the handler returned. The
        // handler's frame was unwound: the shared stack pointer is exactly
        // what it was when the handler was injected.
        let observed = OBSERVED.lock();
        assert_eq!(observed.len(), 4);
        assert!(observed[0] > observed[1]);
        assert_eq!(observed[3], observed[2]);
    }
}

mod run_to_completion {
    use super::*;

    struct Kern;

    cog_kernel::bind_shared_stack!(impl SharedStackBinding for Kern);
    cog_port_std::bind_hosted_cpu!(impl CpuBinding for Kern);

    type Tcb = EventTaskCb<Kern>;

    static IDLE: Tcb = Init::INIT;
    static EVENTS: TableBasedEventController<Tcb, 4> = Init::INIT;

    cog_kernel::bind_task_scheduler! {
        impl SchedulerBinding for Kern {
            type Task = Tcb;
            type Scheduler = CoopScheduler<Tcb>;
            const INIT: CoopScheduler<Tcb> = CoopScheduler::new(&IDLE);
        }
    }

    impl EventTableBinding for Kern {
        const NUM_EVENTS: usize = 4;

        fn event_task(event: usize) -> &'static Tcb {
            EVENTS.registered_event(event)
        }

        fn register_event(event: usize, handler: EventHandler) {
            EVENTS.register_event(event, handler);
        }
    }

    struct Mapper;

    impl ServiceRoutineMapper for Mapper {
        type Task = Tcb;
        type ServiceIdentifier = u32;

        fn map(identifier: &u32) -> ServiceRoutine<Tcb> {
            match *identifier {
                cog_port_std::SERVICE_SET_EVENT_HANDLER => {
                    services::event::set_event_handler::<Kern>
                }
                cog_port_std::SERVICE_SEND_EVENT => services::event::send_event::<Kern>,
                cog_port_std::SERVICE_EVENT_HANDLER_RETURN => {
                    services::event::event_handler_return::<Kern>
                }
                cog_port_std::SERVICE_SHUTDOWN => cog_port_std::shutdown_service,
                other => {
                    log::error!("unknown service identifier {other}");
                    services::unknown_service
                }
            }
        }
    }

    static TRACE: spin::Mutex<Vec<&'static str>> = spin::Mutex::new(Vec::new());
    static ROUND: AtomicUsize = AtomicUsize::new(0);

    fn trace(entry: &'static str) {
        TRACE.lock().push(entry);
    }

    fn first_handler() {
        trace("first:enter");

        // The second event queues behind this handler instead of preempting
        // it, and this call returns right away.
        assert_eq!(syscall::send_event(2), 0);

        trace("first:exit");
    }

    fn second_handler() {
        trace("second");
    }

    fn idle_main() {
        match ROUND.fetch_add(1, Ordering::SeqCst) {
            0 => {
                syscall::set_event_handler(1, first_handler);
                syscall::set_event_handler(2, second_handler);
                syscall::send_event(1);
                unreachable!("the suspended idle activation is abandoned");
            }
            _ => {
                assert_eq!(*TRACE.lock(), ["first:enter", "first:exit", "second"]);
                syscall::shutdown();
            }
        }
    }

    #[test]
    fn a_running_handler_completes_before_the_next_one_starts() {
        cog_port_std::init_logging();

        let stack = cog_port_std::leak_stack(16 * 1024);
        Kern::shared_stack().set(stack.top());
        IDLE.set_handler(idle_main);
        prepare_entry_context(&IDLE, idle_main);

        type Switcher = HostedContextSwitcher<Kern, Tcb>;
        type Injectors = (CooperativeEventTrampolineInjector<HostedTrampolineBuilder>,);

        let mut dispatcher: Dispatcher<Switcher, Mapper, Injectors> =
            Dispatcher::new(&IDLE, &IDLE);

        assert!(cog_port_std::run(|| dispatcher.dispatch()).is_ok());

        assert_eq!(*TRACE.lock(), ["first:enter", "first:exit", "second"]);
    }
}

mod unknown_service {
    use super::*;

    struct Kern;

    cog_kernel::bind_shared_stack!(impl SharedStackBinding for Kern);
    cog_port_std::bind_hosted_cpu!(impl CpuBinding for Kern);

    type Tcb = EventTaskCb<Kern>;

    static IDLE: Tcb = Init::INIT;

    struct Mapper;

    impl ServiceRoutineMapper for Mapper {
        type Task = Tcb;
        type ServiceIdentifier = u32;

        fn map(identifier: &u32) -> ServiceRoutine<Tcb> {
            match *identifier {
                cog_port_std::SERVICE_SHUTDOWN => cog_port_std::shutdown_service,
                other => {
                    log::error!("unknown service identifier {other}");
                    services::unknown_service
                }
            }
        }
    }

    struct IterationCounter;

    impl CodeInjector<Tcb> for IterationCounter {
        fn inject(_prev: &'static Tcb, _next: &'static Tcb) {
            ITERATIONS.fetch_add(1, Ordering::SeqCst);
        }
    }

    static ITERATIONS: AtomicUsize = AtomicUsize::new(0);

    fn idle_main() {
        syscall::syscall(0xDEAD, &[]);
        unreachable!("the kernel halts on an unknown service identifier");
    }

    #[test]
    fn an_unknown_identifier_halts_the_dispatcher() {
        cog_port_std::init_logging();

        let stack = cog_port_std::leak_stack(16 * 1024);
        Kern::shared_stack().set(stack.top());
        prepare_entry_context(&IDLE, idle_main);

        type Switcher = HostedContextSwitcher<Kern, Tcb>;

        let mut dispatcher: Dispatcher<Switcher, Mapper, (IterationCounter,)> =
            Dispatcher::new(&IDLE, &IDLE);

        let outcome = cog_port_std::run(|| dispatcher.dispatch());

        let payload = outcome.expect_err("the dispatcher must halt");
        assert_eq!(
            payload.downcast_ref::<&str>(),
            Some(&"unknown kernel service identifier")
        );

        // The dispatcher never reached a second iteration
        assert_eq!(ITERATIONS.load(Ordering::SeqCst), 1);
    }
}
