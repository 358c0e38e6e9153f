//! The simulated CPU.
//!
//! A real context switcher saves registers and returns through a trap
//! vector. Here, each user-mode activation runs on its own host thread, and
//! the kernel thread parks while user code executes. The handoff protocol
//! keeps the single-CPU invariant: at any instant exactly one of the kernel
//! thread and one user thread is runnable.
use std::{
    cell::Cell,
    marker::PhantomData,
    mem,
    sync::{Condvar, Mutex},
    thread,
};

use cog_kernel::{services::event::event_handler_trampoline, switcher::ContextSwitcher, task::StackAccess};

use crate::{
    frame::{
        self, EntryFrame, SyscallFrame, TrampolineFrame, ENTRY_FRAME_MAGIC, SYSCALL_FRAME_MAGIC,
        TRAMPOLINE_FRAME_MAGIC,
    },
    syscall::{self, HostedEventHandlerReturn},
    SERVICE_FINISH_THREAD, SERVICE_USER_PANIC,
};

thread_local! {
    static CURRENT_CPU: Cell<Option<&'static HostedCpu>> = Cell::new(None);
    static CURRENT_SP: Cell<usize> = Cell::new(0);
}

/// The CPU of the current user thread.
///
/// Panics when called from a thread that is not simulating user mode, i.e.
/// when a user-mode syscall stub is invoked from kernel or test code.
pub(crate) fn current_cpu() -> &'static HostedCpu {
    CURRENT_CPU
        .with(|cpu| cpu.get())
        .expect("not running in simulated user mode")
}

pub(crate) fn current_stack_pointer() -> *mut u8 {
    CURRENT_SP.with(|sp| sp.get()) as *mut u8
}

struct CpuState {
    /// The service raised by the running user thread: the identifier and the
    /// address of the syscall frame describing it.
    pending: Option<(u32, usize)>,

    /// Sequence numbers of suspended activations the kernel has dispatched
    /// again.
    resumable: Vec<u64>,

    next_sequence: u64,
}

/// One simulated CPU. Bind one per kernel with [`crate::bind_hosted_cpu!`].
pub struct HostedCpu {
    state: Mutex<CpuState>,
    kernel_cv: Condvar,
    user_cv: Condvar,
}

impl HostedCpu {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(CpuState {
                pending: None,
                resumable: Vec::new(),
                next_sequence: 0,
            }),
            kernel_cv: Condvar::new(),
            user_cv: Condvar::new(),
        }
    }

    pub(crate) fn allocate_sequence(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_sequence += 1;
        state.next_sequence
    }

    /// User side: announces a raised service and returns immediately. The
    /// calling activation is over; nothing will ever resume it.
    pub(crate) fn raise(&self, identifier: u32, frame_addr: usize) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.pending.is_none());
        state.pending = Some((identifier, frame_addr));
        self.kernel_cv.notify_all();
    }

    /// User side: announces a raised service and parks until the kernel
    /// dispatches this activation again.
    pub(crate) fn raise_and_wait(&self, identifier: u32, frame_addr: usize, sequence: u64) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.pending.is_none());
        state.pending = Some((identifier, frame_addr));
        self.kernel_cv.notify_all();

        loop {
            if let Some(index) = state.resumable.iter().position(|&seq| seq == sequence) {
                state.resumable.swap_remove(index);
                return;
            }
            state = self.user_cv.wait(state).unwrap();
        }
    }

    /// Kernel side: enters the context `next_stack_pointer` refers to, then
    /// parks until user code re-enters the kernel. Returns the raised
    /// service identifier and the frame address of the new context.
    pub(crate) fn run_until_service(
        &'static self,
        next_stack_pointer: *mut u8,
    ) -> (u32, *mut u8) {
        // Safety: the stack pointer of a dispatched task refers to a frame
        // written by a context builder or left behind by a syscall stub
        let magic = unsafe { frame::magic_at(next_stack_pointer) };

        match magic {
            ENTRY_FRAME_MAGIC => {
                // Safety: magic says so
                let entry = unsafe { &*next_stack_pointer.cast::<EntryFrame>() }.entry;

                self.spawn_activation(next_stack_pointer as usize, move || {
                    // Safety: the entry word was written from a `fn()` by the
                    // context builder or the thread creation syscall stub
                    let entry: fn() = unsafe { mem::transmute(entry) };

                    entry();

                    // An entry function that returns retires its thread
                    syscall::raise_exit(SERVICE_FINISH_THREAD, &[]);
                });
            }

            TRAMPOLINE_FRAME_MAGIC => {
                // Safety: magic says so
                let frame = unsafe { &*next_stack_pointer.cast::<TrampolineFrame>() };
                let handler = frame.handler;
                let old_stack_pointer = frame.old_stack_pointer as usize;

                self.spawn_activation(next_stack_pointer as usize, move || {
                    event_handler_trampoline::<HostedEventHandlerReturn>(
                        handler,
                        old_stack_pointer as *mut u8,
                    );
                });
            }

            SYSCALL_FRAME_MAGIC => {
                // Resuming a suspended activation
                // Safety: magic says so
                let sequence = unsafe { &*next_stack_pointer.cast::<SyscallFrame>() }.sequence;

                let mut state = self.state.lock().unwrap();
                state.resumable.push(sequence);
                self.user_cv.notify_all();
            }

            other => panic!("malformed context frame (magic {other:#010x})"),
        }

        let mut state = self.state.lock().unwrap();
        while state.pending.is_none() {
            state = self.kernel_cv.wait(state).unwrap();
        }
        let (identifier, frame_addr) = state.pending.take().unwrap();

        (identifier, frame_addr as *mut u8)
    }

    fn spawn_activation(&'static self, stack_pointer: usize, body: impl FnOnce() + Send + 'static) {
        thread::spawn(move || {
            CURRENT_CPU.with(|cpu| cpu.set(Some(self)));
            CURRENT_SP.with(|sp| sp.set(stack_pointer));

            let signal = PanicSignal { cpu: self };
            body();
            mem::forget(signal);
        });
    }
}

/// Converts a panic in simulated user code into a service, so the kernel
/// fails loudly instead of parking forever.
struct PanicSignal {
    cpu: &'static HostedCpu,
}

impl Drop for PanicSignal {
    fn drop(&mut self) {
        if let Ok(mut state) = self.cpu.state.lock() {
            state.pending = Some((SERVICE_USER_PANIC, 0));
            self.cpu.kernel_cv.notify_all();
        }
    }
}

/// Binds the simulated CPU a kernel runs on.
pub trait CpuBinding {
    fn cpu() -> &'static HostedCpu;
}

/// Declares a simulated CPU and binds it to a kernel marker type.
#[macro_export]
macro_rules! bind_hosted_cpu {
    (impl CpuBinding for $kernel:ty) => {
        impl $crate::CpuBinding for $kernel {
            fn cpu() -> &'static $crate::HostedCpu {
                static CPU: $crate::HostedCpu = $crate::HostedCpu::new();
                &CPU
            }
        }
    };
}

/// The context switcher of the simulated CPU.
///
/// Switching "restores" the next task by running the frame its stack pointer
/// refers to, and "saves" the interrupted task by recording the frame of the
/// service that re-entered the kernel in its stack pointer.
pub struct HostedContextSwitcher<K, Task> {
    _marker: PhantomData<(K, Task)>,
}

impl<K, Task> ContextSwitcher for HostedContextSwitcher<K, Task>
where
    K: CpuBinding + 'static,
    Task: StackAccess + 'static,
{
    type Task = Task;
    type ServiceIdentifier = u32;

    fn switch_task(prev: &'static Task, next: &'static Task) -> u32 {
        log::trace!(
            "switching from the task at {:p} to the task at {:p}",
            prev,
            next
        );

        let (identifier, frame_addr) = K::cpu().run_until_service(next.stack_pointer());

        // `next` is the task that just trapped back into the kernel
        next.set_stack_pointer(frame_addr);

        log::trace!("kernel entered with service identifier {identifier}");

        identifier
    }
}
