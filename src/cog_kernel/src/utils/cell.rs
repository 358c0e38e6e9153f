use core::cell::Cell;

use crate::utils::Init;

/// Like [`Cell`], but implements `Sync`.
///
/// Task control blocks and other kernel objects live in `static` storage and
/// are reached through `&'static` references, yet their fields are mutated by
/// service routines and injectors. Within one dispatcher instance the kernel
/// is single-threaded: at most one service routine or injector pipeline runs
/// at any time, and the only suspension point is the context switcher, which
/// transfers control wholesale to user mode.
///
/// # Safety
///
/// All reads and writes must happen from the kernel's serialized section of
/// the owning dispatcher instance. Sharing one `KernelCell` between multiple
/// dispatcher instances is not permitted.
#[repr(transparent)]
pub struct KernelCell<T>(Cell<T>);

unsafe impl<T> Sync for KernelCell<T> {}

impl<T> core::fmt::Debug for KernelCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KernelCell").finish_non_exhaustive()
    }
}

impl<T> KernelCell<T> {
    pub const fn new(x: T) -> Self {
        Self(Cell::new(x))
    }

    pub fn set(&self, value: T) {
        self.0.set(value);
    }

    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }
}

impl<T: Copy> KernelCell<T> {
    pub fn get(&self) -> T {
        self.0.get()
    }
}

impl<T: Init> Init for KernelCell<T> {
    const INIT: Self = Self::new(T::INIT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_replace() {
        let cell = KernelCell::new(1u32);
        assert_eq!(cell.get(), 1);
        cell.set(2);
        assert_eq!(cell.replace(3), 2);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn init_is_zero() {
        let cell: KernelCell<usize> = Init::INIT;
        assert_eq!(cell.get(), 0);
    }
}
