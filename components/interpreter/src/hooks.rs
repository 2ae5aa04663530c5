//! Host collaborators polled by the dispatch loop.

use core_types::Backtrace;

/// Debugger attachment.
///
/// The loop polls [`should_stop`](DebuggerHooks::should_stop) between
/// instructions, never inside one. When it answers `true` the loop reports
/// the current backtrace through
/// [`breakpoint_hit`](DebuggerHooks::breakpoint_hit) and then continues.
pub trait DebuggerHooks {
    /// Whether execution should pause before the next instruction.
    fn should_stop(&mut self) -> bool;

    /// Called when execution pauses.
    fn breakpoint_hit(&mut self, backtrace: &Backtrace);

    /// Receives a backtrace requested through
    /// [`VmContext::send_backtrace`](crate::VmContext::send_backtrace).
    fn send_backtrace(&mut self, backtrace: &Backtrace);
}

/// Host callback polled every `stop_check_interval` instructions; returning
/// `true` terminates the running script.
pub type StopCallback = Box<dyn FnMut() -> bool>;
