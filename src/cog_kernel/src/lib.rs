#![doc = include_str!("./lib.md")]
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod context;
pub mod dispatcher;
pub mod globals;
pub mod scheduler;
pub mod services;
pub mod switcher;
pub mod task;
pub mod utils;

pub use self::{
    context::{ExecutionContext, SyscallValue},
    dispatcher::{CodeInjector, Dispatcher, ServiceRoutine, ServiceRoutineMapper},
    globals::{SchedulerBinding, SharedStackBinding, TaskController, TaskControllerBinding},
    scheduler::{TaskCreationHandler, TaskTerminationHandler},
    switcher::ContextSwitcher,
    task::{EventHandler, StackRegion},
    utils::Init,
};
