//! Task/interrupt rendezvous
//!
//! A transfer monitor owns a one-shot completion slot. The interrupt
//! handler fills the slot and then calls [`Waiter::notify`]; the task
//! suspends in [`Waiter::wait_until`] until the slot reports itself
//! filled. The waiter only decides *how* the task sleeps.

use crate::arch::cortex_m;

/// Suspend-until-predicate primitive shared by a task and interrupt handlers
pub trait Waiter {
    /// Block the caller until `ready` returns true
    ///
    /// `ready` is re-evaluated after every wakeup. Implementations must
    /// not lose a [`notify`](Waiter::notify) that happens between an
    /// evaluation of `ready` and going to sleep.
    fn wait_until(&self, ready: &dyn Fn() -> bool);

    /// Wake the task blocked in [`wait_until`](Waiter::wait_until)
    ///
    /// Called from interrupt context after the completion slot is filled.
    fn notify(&self);
}

impl<W: Waiter + ?Sized> Waiter for &W {
    fn wait_until(&self, ready: &dyn Fn() -> bool) {
        (**self).wait_until(ready)
    }

    fn notify(&self) {
        (**self).notify()
    }
}

/// Sleep on the Cortex-M event register
///
/// Exception entry sets the event register, so an interrupt that fills the
/// slot after the check but before `wfe` makes `wfe` fall through and the
/// check runs again.
#[derive(Debug, Default, Clone, Copy)]
pub struct WfeWaiter;

impl Waiter for WfeWaiter {
    fn wait_until(&self, ready: &dyn Fn() -> bool) {
        while !ready() {
            cortex_m::wait_for_event();
        }
    }

    fn notify(&self) {
        cortex_m::send_event();
    }
}
