//! The kernel dispatcher: the front desk for all system calls, hardware
//! interrupts, and exceptions.
//!
//! The dispatcher relies on the context switcher for both the kernel entry
//! and exit points. It uses the service identifier returned by
//! [`ContextSwitcher::switch_task`] to invoke the corresponding service
//! routine: the routine mapper turns the identifier into a plain function
//! pointer that consumes the interrupted task and produces the non-null next
//! task. The dispatcher then switches to that task and the cycle repeats.
//!
//! Service routines in [`crate::services`] are generic functions; a
//! monomorphized instance coerces to [`ServiceRoutine`], so a mapper is
//! usually a single `match` over identifiers.
use core::marker::PhantomData;

use crate::switcher::ContextSwitcher;

/// A kernel service routine: handles one request on behalf of the
/// interrupted task and returns the task selected to run next.
///
/// Routines never return "nothing"; a routine that cannot produce a next
/// task (e.g. [`crate::services::unknown_service`]) must not return at all.
pub type ServiceRoutine<Task> = fn(&'static Task) -> &'static Task;

/// Maps a service identifier to the routine that handles it.
///
/// The mapping is a static function, so it is stateless by construction; it
/// must also be deterministic: the same identifier always maps to the same
/// routine. Identifiers outside the mapper's domain must be routed to an
/// explicit unknown-service routine rather than an arbitrary pointer.
pub trait ServiceRoutineMapper {
    /// The type of task handled by the kernel service routines.
    type Task: 'static;

    type ServiceIdentifier;

    fn map(identifier: &Self::ServiceIdentifier) -> ServiceRoutine<Self::Task>;
}

/// Code injected before a task is switched to run, i.e. before each
/// invocation of [`ContextSwitcher::switch_task`].
///
/// Injectors bridge policy-free dispatching with model-specific context
/// preparation: they observe the `(prev, next)` pair exactly as it will be
/// handed to the switcher, so they can perform last-mile work such as
/// synthesizing a trampoline frame for an event handler without polluting
/// the service routines.
///
/// A tuple of injectors is itself an injector whose members run in
/// declaration order; `()` injects nothing.
pub trait CodeInjector<Task: 'static> {
    fn inject(prev: &'static Task, next: &'static Task);
}

impl<Task: 'static> CodeInjector<Task> for () {
    #[inline]
    fn inject(_prev: &'static Task, _next: &'static Task) {}
}

macro_rules! impl_code_injector_for_tuple {
    ( $( ( $($name:ident),+ ) ),* $(,)? ) => {$(
        impl<Task: 'static, $($name: CodeInjector<Task>),+> CodeInjector<Task> for ($($name,)+) {
            #[inline]
            fn inject(prev: &'static Task, next: &'static Task) {
                $( $name::inject(prev, next); )+
            }
        }
    )*};
}

impl_code_injector_for_tuple! {
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
}

/// The kernel dispatcher loop.
///
/// Each iteration runs the configured injectors, hands the CPU to the next
/// task through the switcher, and services the request that eventually
/// re-enters the kernel. The loop is the single serialization point for
/// kernel work: at most one service routine and at most one injector
/// pipeline execute at any time within a dispatcher instance.
pub struct Dispatcher<Switcher: ContextSwitcher, Mapper, Injectors = ()> {
    /// The task that is interrupted (by a system call, hardware interrupt,
    /// exception, ...)
    prev: &'static Switcher::Task,

    /// The task that is selected to run
    next: &'static Switcher::Task,

    _marker: PhantomData<(Mapper, Injectors)>,
}

impl<Switcher, Mapper, Injectors> Dispatcher<Switcher, Mapper, Injectors>
where
    Switcher: ContextSwitcher,
    Mapper: ServiceRoutineMapper<
        Task = Switcher::Task,
        ServiceIdentifier = Switcher::ServiceIdentifier,
    >,
    Injectors: CodeInjector<Switcher::Task>,
{
    /// Creates a dispatcher with the initial tasks.
    ///
    /// If the system supports an idle task, pass it to `prev` to assume that
    /// it was running before entering the kernel, and pass the first task
    /// that will run on the system to `next`.
    pub const fn new(prev: &'static Switcher::Task, next: &'static Switcher::Task) -> Self {
        Self {
            prev,
            next,
            _marker: PhantomData,
        }
    }

    /// Runs the dispatcher loop. Never returns.
    pub fn dispatch(&mut self) -> ! {
        loop {
            // Perform code injections
            Injectors::inject(self.prev, self.next);

            // Switch the task and exit the kernel
            // When the call returns, we are back in the kernel
            let identifier = Switcher::switch_task(self.prev, self.next);

            // The task that just trapped into the kernel
            self.prev = self.next;

            // Invoke the kernel service routine
            self.next = Mapper::map(&identifier)(self.prev);
        }
    }
}
