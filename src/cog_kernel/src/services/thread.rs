//! The thread-based execution model.
//!
//! Threads are created through a pipeline of initializers: each initializer
//! declares its argument type and applies one step to the freshly allocated
//! task control block. The pipeline is composed at compile time as a tuple,
//! so a kernel assembles exactly the creation semantics it wants, e.g.
//! `(AllocateDedicatedRecyclableStack, SetupExecutionContext<Builder>,
//! AssignUniqueIdentifier, AssignPriority)`.
//!
//! The pipeline folds over the initializers with `&&`: the first one that
//! returns `false` aborts the creation, no later initializer runs, and the
//! caller observes the failure sentinel. Initializers that cannot fail
//! always return `true`, and the compiler elides their checks.
use core::marker::PhantomData;

use alloc::alloc::Layout;

use crate::{
    context::SyscallValue,
    globals::{SchedulerBinding, TaskController, TaskControllerBinding},
    scheduler::{TaskCreationHandler, TaskTerminationHandler},
    services::KERNEL_RETURN_FAILURE,
    task::{
        PrivateStackAccess, Prioritizable, StackAccess, StackRegion, SyscallAccess,
        UniquelyIdentifiable,
    },
    utils::Init,
};

/// Alignment of every stack the kernel allocates or releases.
pub const STACK_ALIGN: usize = 16;

/// A unit step of the thread creation pipeline.
pub trait TaskInitializer<Task: 'static> {
    /// The argument this step consumes.
    type Arg;

    /// Applies this step to the new task. Returning `false` aborts the
    /// pipeline and fails the creation.
    fn apply(task: &'static Task, arg: Self::Arg) -> bool;
}

/// An ordered list of task initializers, encoded as a tuple.
///
/// `apply_all` runs every step strictly in declaration order and
/// short-circuits on the first failure.
pub trait TaskInitializerList<Task: 'static> {
    /// One argument per initializer, in declaration order.
    type Args;

    fn apply_all(task: &'static Task, args: Self::Args) -> bool;
}

/// An initializer list whose arguments can be read from the calling task's
/// system call argument stream.
///
/// The stream is stateful, so the reads must be sequenced explicitly: one
/// binding per initializer, strictly in declaration order. Expanding them as
/// function call arguments would leave the order unspecified and is
/// forbidden.
pub trait SyscallTaskInitializerList<Task: 'static>: TaskInitializerList<Task> {
    fn read_args<Caller: SyscallAccess>(caller: &Caller) -> Self::Args;
}

impl<Task: 'static> TaskInitializerList<Task> for () {
    type Args = ();

    fn apply_all(_task: &'static Task, _args: ()) -> bool {
        true
    }
}

impl<Task: 'static> SyscallTaskInitializerList<Task> for () {
    fn read_args<Caller: SyscallAccess>(_caller: &Caller) -> () {}
}

macro_rules! impl_task_initializer_list {
    ( $( ( $( $name:ident $arg:ident ),+ ) ),* $(,)? ) => {$(
        impl<Task: 'static, $($name: TaskInitializer<Task>),+> TaskInitializerList<Task>
            for ($($name,)+)
        {
            type Args = ($($name::Arg,)+);

            fn apply_all(task: &'static Task, args: Self::Args) -> bool {
                let ($($arg,)+) = args;

                true $( && $name::apply(task, $arg) )+
            }
        }

        impl<Task: 'static, $($name: TaskInitializer<Task>),+> SyscallTaskInitializerList<Task>
            for ($($name,)+)
        where
            $($name::Arg: SyscallValue),+
        {
            fn read_args<Caller: SyscallAccess>(caller: &Caller) -> Self::Args {
                $( let $arg = caller.syscall_argument::<$name::Arg>(); )+

                ($($arg,)+)
            }
        }
    )*};
}

impl_task_initializer_list! {
    (A a),
    (A a, B b),
    (A a, B b, C c),
    (A a, B b, C c, D d),
    (A a, B b, C c, D d, E e),
    (A a, B b, C c, D d, E e, F f),
}

/// Allocates a dedicated stack for the task dynamically and leaves the stack
/// pointer at its top.
///
/// The kernel does not track the allocation, so the memory is never
/// reclaimed; use this when the new task is known to never terminate.
pub struct AllocateDedicatedStack;

impl<Task: StackAccess + 'static> TaskInitializer<Task> for AllocateDedicatedStack {
    type Arg = usize;

    fn apply(task: &'static Task, stack_size: usize) -> bool {
        match allocate_stack(stack_size) {
            Some(region) => {
                task.set_stack_pointer(region.top());
                true
            }
            None => false,
        }
    }
}

/// Allocates a dedicated recyclable stack for the task dynamically.
///
/// Records the allocation in the task control block so that the teardown
/// pipeline can release it; pair this with [`ReleaseDedicatedStack`] in the
/// finalizer list of [`finish_thread`].
pub struct AllocateDedicatedRecyclableStack;

impl<Task: PrivateStackAccess + 'static> TaskInitializer<Task>
    for AllocateDedicatedRecyclableStack
{
    type Arg = usize;

    fn apply(task: &'static Task, stack_size: usize) -> bool {
        match allocate_stack(stack_size) {
            Some(region) => {
                task.set_private_stack(region);
                task.set_stack_pointer(region.top());
                true
            }
            None => false,
        }
    }
}

/// Assigns a pre-allocated stack to the task and leaves the stack pointer at
/// its top.
///
/// The memory remains owned by the caller; the kernel records the region but
/// must not be asked to release it.
pub struct AssignDedicatedStack;

impl<Task: PrivateStackAccess + 'static> TaskInitializer<Task> for AssignDedicatedStack {
    type Arg = StackRegion;

    fn apply(task: &'static Task, region: StackRegion) -> bool {
        task.set_private_stack(region);
        task.set_stack_pointer(region.top());

        true
    }
}

/// Writes a valid execution context to the task's stack given the thread
/// entry point. Architecture-specific and provided by the kernel integrator.
pub trait ThreadContextBuilder<Task: 'static> {
    fn build(task: &'static Task, entry_point: *const u8);
}

/// Sets up the execution context for the task by invoking the architecture
/// context builder with the entry point.
///
/// A stack must have been assigned by an earlier initializer.
pub struct SetupExecutionContext<Builder> {
    _builder: PhantomData<Builder>,
}

impl<Task, Builder> TaskInitializer<Task> for SetupExecutionContext<Builder>
where
    Task: StackAccess + 'static,
    Builder: ThreadContextBuilder<Task>,
{
    type Arg = *const u8;

    fn apply(task: &'static Task, entry_point: *const u8) -> bool {
        debug_assert!(
            !task.stack_pointer().is_null(),
            "no stack is assigned to the given task"
        );

        Builder::build(task, entry_point);

        true
    }
}

/// Assigns a unique identifier to the task.
pub struct AssignUniqueIdentifier;

impl<Task: UniquelyIdentifiable + 'static> TaskInitializer<Task> for AssignUniqueIdentifier {
    type Arg = Task::Identifier;

    fn apply(task: &'static Task, identifier: Task::Identifier) -> bool {
        task.set_unique_identifier(identifier);

        true
    }
}

/// Assigns a priority level to the task.
pub struct AssignPriority;

impl<Task: Prioritizable + 'static> TaskInitializer<Task> for AssignPriority {
    type Arg = Task::Priority;

    fn apply(task: &'static Task, priority: Task::Priority) -> bool {
        task.set_priority(priority);

        true
    }
}

fn allocate_stack(stack_size: usize) -> Option<StackRegion> {
    let layout = Layout::from_size_align(stack_size, STACK_ALIGN).ok()?;

    if layout.size() == 0 {
        return None;
    }

    // Safety: the layout has a non-zero size
    let base = unsafe { alloc::alloc::alloc(layout) };

    if base.is_null() {
        log::error!("failed to allocate a {stack_size}-byte stack");

        return None;
    }

    log::trace!("allocated stack starts at {base:p}, length = {stack_size} bytes");

    Some(StackRegion {
        base,
        len: stack_size,
    })
}

/// Service routine that creates a new thread with arguments supplied by the
/// kernel.
///
/// Useful for creating threads at kernel initialization time. Allocation
/// failure and initializer rejection are soft failures: the new TCB (if any)
/// is released, the caller's kernel return value becomes the failure
/// sentinel, the caller stays the next task, and the scheduler is not
/// consulted. Kernel-startup callers without a system call context must only
/// issue requests that cannot fail.
pub fn create_thread<K, I>(
    caller: &'static K::Task,
    args: I::Args,
) -> &'static K::Task
where
    K: SchedulerBinding + TaskControllerBinding,
    K::Controller: TaskController<Task = K::Task>,
    K::Scheduler: TaskCreationHandler<K::Task>,
    K::Task: SyscallAccess,
    I: TaskInitializerList<K::Task>,
{
    let controller = K::task_controller();

    // Guard: allocate a task control block
    let Some(new_task) = controller.allocate() else {
        log::error!("failed to allocate a task control block");

        caller.set_kernel_return_value(KERNEL_RETURN_FAILURE);

        return caller;
    };

    // Guard: initialize the task control block
    if !I::apply_all(new_task, args) {
        log::error!("failed to initialize the task control block");

        controller.release(new_task);

        caller.set_kernel_return_value(KERNEL_RETURN_FAILURE);

        return caller;
    }

    // A new task has been created; notify the scheduler
    K::scheduler().on_task_created(caller, new_task)
}

/// Service routine that creates a new thread with arguments read from the
/// calling task's system call argument list, one per initializer, strictly
/// in declaration order.
pub fn create_thread_from_syscall<K, I>(caller: &'static K::Task) -> &'static K::Task
where
    K: SchedulerBinding + TaskControllerBinding,
    K::Controller: TaskController<Task = K::Task>,
    K::Scheduler: TaskCreationHandler<K::Task>,
    K::Task: SyscallAccess,
    I: SyscallTaskInitializerList<K::Task>,
{
    let args = I::read_args(caller);

    create_thread::<K, I>(caller, args)
}

/// A unit step of the thread teardown pipeline.
pub trait TaskFinalizer<Task: 'static> {
    fn finalize(task: &'static Task);
}

/// An ordered list of task finalizers, encoded as a tuple; members run in
/// declaration order.
pub trait TaskFinalizerList<Task: 'static> {
    fn finalize_all(task: &'static Task);
}

impl<Task: 'static> TaskFinalizerList<Task> for () {
    fn finalize_all(_task: &'static Task) {}
}

macro_rules! impl_task_finalizer_list {
    ( $( ( $($name:ident),+ ) ),* $(,)? ) => {$(
        impl<Task: 'static, $($name: TaskFinalizer<Task>),+> TaskFinalizerList<Task>
            for ($($name,)+)
        {
            fn finalize_all(task: &'static Task) {
                $( $name::finalize(task); )+
            }
        }
    )*};
}

impl_task_finalizer_list! {
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
}

/// Releases the dedicated stack recorded in the task control block.
///
/// Only the recorded allocation base is valid for deallocation; the current
/// stack pointer is not. A task with no recorded region is left alone.
pub struct ReleaseDedicatedStack;

impl<Task: PrivateStackAccess + 'static> TaskFinalizer<Task> for ReleaseDedicatedStack {
    fn finalize(task: &'static Task) {
        let region = task.private_stack();

        if region.is_null() || region.len == 0 {
            return;
        }

        if let Ok(layout) = Layout::from_size_align(region.len, STACK_ALIGN) {
            log::trace!("releasing stack at {:p}, length = {} bytes", region.base, region.len);

            // Safety: the region was allocated by `allocate_stack` with the
            // same layout
            unsafe { alloc::alloc::dealloc(region.base, layout) };
        }

        task.set_private_stack(StackRegion::INIT);
        task.set_stack_pointer(core::ptr::null_mut());
    }
}

/// Service routine that retires the current thread.
///
/// Runs the configured finalizers in declaration order, returns the task
/// control block to the controller, and asks the scheduler for the next
/// task.
pub fn finish_thread<K, F>(task: &'static K::Task) -> &'static K::Task
where
    K: SchedulerBinding + TaskControllerBinding,
    K::Controller: TaskController<Task = K::Task>,
    K::Scheduler: TaskTerminationHandler<K::Task>,
    F: TaskFinalizerList<K::Task>,
{
    log::trace!("task at {task:p} has finished");

    F::finalize_all(task);

    K::task_controller().release(task);

    K::scheduler().on_task_finished(task)
}
