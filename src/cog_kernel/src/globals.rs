//! Kernel-wide singletons and the binder that makes them reachable from
//! stateless service routines.
//!
//! Service routines have the uniform shape `fn(&'static Task) -> &'static
//! Task`, so the scheduler, the task controller, and the shared stack
//! pointer cannot be threaded through their signatures. Instead the
//! integrator binds them to a marker type via the traits below; routines are
//! generic over that marker and reach the singletons through type-indexed
//! static accessors. Each binding is process-wide, initialized before the
//! first dispatch, and immutable thereafter.
//!
//! The [`bind_task_scheduler!`], [`bind_task_controller!`], and
//! [`bind_shared_stack!`] macros generate the impls together with the
//! backing `static` storage.
use crate::utils::{Init, KernelCell};

/// Process-wide storage for the current top of the stack all event handlers
/// share.
pub struct SharedStack(KernelCell<*mut u8>);

impl SharedStack {
    pub fn get(&self) -> *mut u8 {
        self.0.get()
    }

    pub fn set(&self, stack_pointer: *mut u8) {
        self.0.set(stack_pointer);
    }
}

impl Init for SharedStack {
    const INIT: Self = Self(KernelCell::new(core::ptr::null_mut()));
}

/// The owner of task control block storage.
///
/// The controller owns the TCBs; the scheduler and the dispatcher only hold
/// non-owning references into its pool.
pub trait TaskController {
    type Task: 'static;

    /// Hands out a free task control block, or `None` when the pool is
    /// exhausted.
    fn allocate(&'static self) -> Option<&'static Self::Task>;

    /// Returns a task control block to the pool.
    fn release(&'static self, task: &'static Self::Task);
}

/// Binds the current task scheduler.
///
/// On a single-core system the accessor returns a global; on a multi-core
/// system it may return the scheduler attached to the interrupted processor.
pub trait SchedulerBinding {
    /// The type of runnable task on the system.
    type Task: 'static;

    type Scheduler: 'static;

    fn scheduler() -> &'static Self::Scheduler;
}

/// Binds the current task controller.
pub trait TaskControllerBinding {
    type Controller: 'static;

    fn task_controller() -> &'static Self::Controller;
}

/// Binds the shared task stack pointer.
///
/// Required only when tasks on the system share one stack; see the
/// shared-stack TCB component.
pub trait SharedStackBinding {
    fn shared_stack() -> &'static SharedStack;
}

/// Declares a global task scheduler and binds it to a kernel marker type.
///
/// ```ignore
/// cog_kernel::bind_task_scheduler! {
///     impl SchedulerBinding for Kern {
///         type Task = EventTaskCb<Kern>;
///         type Scheduler = CoopScheduler;
///         const INIT: CoopScheduler = CoopScheduler::new();
///     }
/// }
/// ```
#[macro_export]
macro_rules! bind_task_scheduler {
    (
        impl SchedulerBinding for $kernel:ty {
            type Task = $task:ty;
            type Scheduler = $scheduler:ty;
            const INIT: $scheduler2:ty = $init:expr;
        }
    ) => {
        impl $crate::globals::SchedulerBinding for $kernel {
            type Task = $task;
            type Scheduler = $scheduler;

            fn scheduler() -> &'static Self::Scheduler {
                static SCHEDULER: $scheduler = $init;
                &SCHEDULER
            }
        }
    };
}

/// Declares a global task controller and binds it to a kernel marker type.
#[macro_export]
macro_rules! bind_task_controller {
    (
        impl TaskControllerBinding for $kernel:ty {
            type Controller = $controller:ty;
            const INIT: $controller2:ty = $init:expr;
        }
    ) => {
        impl $crate::globals::TaskControllerBinding for $kernel {
            type Controller = $controller;

            fn task_controller() -> &'static Self::Controller {
                static CONTROLLER: $controller = $init;
                &CONTROLLER
            }
        }
    };
}

/// Declares the shared task stack pointer and binds it to a kernel marker
/// type.
#[macro_export]
macro_rules! bind_shared_stack {
    (impl SharedStackBinding for $kernel:ty) => {
        impl $crate::globals::SharedStackBinding for $kernel {
            fn shared_stack() -> &'static $crate::globals::SharedStack {
                static SHARED_STACK: $crate::globals::SharedStack =
                    <$crate::globals::SharedStack as $crate::utils::Init>::INIT;
                &SHARED_STACK
            }
        }
    };
}
