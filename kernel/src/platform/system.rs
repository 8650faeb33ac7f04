// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interface to the processor's system control and fault reporting.

/// Width of a single data access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessWidth {
    Byte,
    Halfword,
    Word,
}

impl AccessWidth {
    pub const fn bytes(self) -> usize {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Halfword => 2,
            AccessWidth::Word => 4,
        }
    }
}

/// What the processor recorded about the current bus fault.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BusFaultStatus {
    /// The stacked program counter points at the faulting instruction.
    pub precise: bool,
    /// Faulting data address, if the hardware captured one.
    pub address: Option<usize>,
}

/// Narrow view of the processor registers the monitor touches.
pub trait SystemControl {
    /// Enable the memory-management, bus and usage fault exceptions so they
    /// are not escalated to hard faults.
    fn enable_fault_handlers(&self);

    /// Disable write buffering so that bus faults on stores are precise.
    fn disable_write_buffer(&self);

    /// Raw value of the interrupt program status register.
    fn active_exception(&self) -> u32;

    /// Current value of the unprivileged (process) stack pointer.
    fn process_stack_pointer(&self) -> usize;

    fn bus_fault_status(&self) -> BusFaultStatus;

    /// Acknowledge the current bus fault before resuming box code.
    fn clear_bus_fault_status(&self);
}

/// Loads performed with monitor privileges on behalf of box code.
pub trait PrivilegedBus {
    /// Read `width` bytes at `address`, zero-extended.
    ///
    /// ## Safety
    ///
    /// `address` must be naturally aligned for `width` and name memory or a
    /// device register that can be read without side effects the caller has
    /// not authorized.
    unsafe fn read(&self, address: usize, width: AccessWidth) -> u32;
}
