//! Scheduler callback contracts.
//!
//! The scheduling policy lives outside the core. Service routines only need
//! the two notification surfaces below; whatever task a callback returns is
//! the next task the dispatcher hands to the context switcher. A callback
//! must never return "nothing": if no other work exists, it returns the
//! idle task.

/// Notified when a new schedulable unit enters the system, either a freshly
/// created thread or an event that was sent.
pub trait TaskCreationHandler<Task: 'static> {
    /// Decides what runs next. Returning `new_task` makes the new unit
    /// preempt the current one immediately; returning `current` defers it.
    fn on_task_created(
        &self,
        current: &'static Task,
        new_task: &'static Task,
    ) -> &'static Task;
}

/// Notified when the current schedulable unit has finished.
pub trait TaskTerminationHandler<Task: 'static> {
    fn on_task_finished(&self, current: &'static Task) -> &'static Task;
}
