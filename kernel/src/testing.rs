// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Simulated hardware for unit tests.

use core::cell::{Cell, RefCell};
use core::fmt;
use core::ptr::NonNull;
use std::collections::BTreeMap;
use std::vec::Vec;

use crate::acl::AclEntry;
use crate::halt::{Halt, HaltKind};
use crate::memory_map::MemoryArea;
use crate::platform::frame::{ExceptionFrame, FrameValidator};
use crate::platform::mpu::MPU;
use crate::platform::system::{AccessWidth, BusFaultStatus, PrivilegedBus, SystemControl};
use crate::region_table::AclTable;

pub(crate) const GENERAL_AREAS: [MemoryArea; 2] = [
    MemoryArea::new("FLASH", 0x0000_0000, 0x0010_0000),
    MemoryArea::new("SRAM", 0x1FFF_0000, 0x2003_0000),
];

pub(crate) const PERIPHERAL_AREAS: [MemoryArea; 1] =
    [MemoryArea::new("AIPS", 0x4000_0000, 0x4010_0000)];

pub(crate) const MEMORY_MAP: [MemoryArea; 3] =
    [GENERAL_AREAS[0], GENERAL_AREAS[1], PERIPHERAL_AREAS[0]];

/// Protection unit that records what it was asked to enforce.
pub(crate) struct SimMpu {
    slots: usize,
    configured: RefCell<Vec<AclEntry>>,
    calls: Cell<usize>,
    violation: Cell<bool>,
    enabled: Cell<bool>,
}

impl SimMpu {
    pub(crate) fn new(slots: usize) -> SimMpu {
        SimMpu {
            slots,
            configured: RefCell::new(Vec::new()),
            calls: Cell::new(0),
            violation: Cell::new(false),
            enabled: Cell::new(false),
        }
    }

    pub(crate) fn enforced(&self) -> Vec<AclEntry> {
        self.configured.borrow().clone()
    }

    pub(crate) fn configure_calls(&self) -> usize {
        self.calls.get()
    }

    pub(crate) fn set_violation(&self, violation: bool) {
        self.violation.set(violation);
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled.get()
    }
}

impl MPU for SimMpu {
    fn enable_app_mpu(&self) {
        self.enabled.set(true);
    }

    fn disable_app_mpu(&self) {
        self.enabled.set(false);
    }

    fn number_total_regions(&self) -> usize {
        self.slots
    }

    fn configure_mpu(&self, regions: &[AclEntry]) {
        assert!(regions.len() <= self.slots);
        *self.configured.borrow_mut() = regions.to_vec();
        self.calls.set(self.calls.get() + 1);
    }

    fn security_violation(&self) -> bool {
        self.violation.get()
    }

    fn clear_security_violation(&self) {
        self.violation.set(false);
    }
}

pub(crate) struct SimSystem {
    pub(crate) ipsr: Cell<u32>,
    pub(crate) psp: Cell<usize>,
    pub(crate) bus_fault: Cell<BusFaultStatus>,
    pub(crate) faults_enabled: Cell<bool>,
    pub(crate) write_buffer_disabled: Cell<bool>,
    pub(crate) bus_fault_cleared: Cell<bool>,
}

impl SimSystem {
    pub(crate) fn new() -> SimSystem {
        SimSystem {
            ipsr: Cell::new(0),
            psp: Cell::new(0x2000_7F00),
            bus_fault: Cell::new(BusFaultStatus::default()),
            faults_enabled: Cell::new(false),
            write_buffer_disabled: Cell::new(false),
            bus_fault_cleared: Cell::new(false),
        }
    }
}

impl SystemControl for SimSystem {
    fn enable_fault_handlers(&self) {
        self.faults_enabled.set(true);
    }

    fn disable_write_buffer(&self) {
        self.write_buffer_disabled.set(true);
    }

    fn active_exception(&self) -> u32 {
        self.ipsr.get()
    }

    fn process_stack_pointer(&self) -> usize {
        self.psp.get()
    }

    fn bus_fault_status(&self) -> BusFaultStatus {
        self.bus_fault.get()
    }

    fn clear_bus_fault_status(&self) {
        self.bus_fault_cleared.set(true);
    }
}

/// Little-endian byte-addressed memory; unset bytes read as zero.
pub(crate) struct SimBus {
    memory: RefCell<BTreeMap<usize, u8>>,
    reads: Cell<usize>,
}

impl SimBus {
    pub(crate) fn new() -> SimBus {
        SimBus {
            memory: RefCell::new(BTreeMap::new()),
            reads: Cell::new(0),
        }
    }

    pub(crate) fn write(&self, address: usize, bytes: &[u8]) {
        let mut memory = self.memory.borrow_mut();
        for (i, byte) in bytes.iter().enumerate() {
            memory.insert(address + i, *byte);
        }
    }

    pub(crate) fn write_u16(&self, address: usize, value: u16) {
        self.write(address, &value.to_le_bytes());
    }

    pub(crate) fn write_u32(&self, address: usize, value: u32) {
        self.write(address, &value.to_le_bytes());
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl PrivilegedBus for SimBus {
    unsafe fn read(&self, address: usize, width: AccessWidth) -> u32 {
        self.reads.set(self.reads.get() + 1);
        let memory = self.memory.borrow();
        (0..width.bytes()).fold(0, |value, i| {
            let byte = memory.get(&(address + i)).copied().unwrap_or(0);
            value | (u32::from(byte) << (8 * i))
        })
    }
}

/// Hands out a frame owned by the test.
pub(crate) struct SimValidator {
    frame: Cell<Option<NonNull<ExceptionFrame>>>,
    pub(crate) seen: Cell<Option<(u32, usize)>>,
}

impl SimValidator {
    pub(crate) fn new() -> SimValidator {
        SimValidator {
            frame: Cell::new(None),
            seen: Cell::new(None),
        }
    }

    pub(crate) fn trust(&self, frame: &mut ExceptionFrame) {
        self.frame.set(Some(NonNull::from(frame)));
    }
}

unsafe impl FrameValidator for SimValidator {
    fn validate_frame(&self, exc_return: u32, sp: usize) -> Option<NonNull<ExceptionFrame>> {
        self.seen.set(Some((exc_return, sp)));
        self.frame.get()
    }
}

/// Turns a halt into a panic carrying the kind, for `should_panic` tests.
pub(crate) struct PanicHalt;

impl Halt for PanicHalt {
    fn halt(&self, kind: HaltKind, diagnostic: fmt::Arguments<'_>) -> ! {
        panic!("halt {:?}: {}", kind, diagnostic)
    }
}

pub(crate) fn general_table(mpu: &SimMpu) -> AclTable<'_, SimMpu> {
    AclTable::new(mpu, &GENERAL_AREAS, &[])
}

pub(crate) fn peripheral_table(mpu: &SimMpu) -> AclTable<'_, SimMpu> {
    AclTable::new(mpu, &PERIPHERAL_AREAS, &[])
}
