// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! ARM System Control Block
//!
//! <http://infocenter.arm.com/help/topic/com.arm.doc.dui0553a/CIHFDJCA.html>

use core::ptr;

use kernel::platform::system::{AccessWidth, BusFaultStatus, PrivilegedBus, SystemControl};
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

use crate::support;

register_structs! {
    /// System Control Block fault registers, starting at CPUID.
    ScbRegisters {
        (0x00 => cpuid: ReadOnly<u32>),
        (0x04 => icsr: ReadWrite<u32>),
        (0x08 => vtor: ReadWrite<u32>),
        (0x0C => aircr: ReadWrite<u32>),
        (0x10 => scr: ReadWrite<u32>),
        (0x14 => ccr: ReadWrite<u32>),
        (0x18 => shpr: [ReadWrite<u32>; 3]),
        (0x24 => shcsr: ReadWrite<u32, SystemHandlerControlAndState::Register>),
        (0x28 => cfsr: ReadWrite<u32, ConfigurableFaultStatus::Register>),
        (0x2C => hfsr: ReadWrite<u32>),
        (0x30 => dfsr: ReadWrite<u32>),
        (0x34 => mmfar: ReadWrite<u32>),
        (0x38 => bfar: ReadWrite<u32>),
        (0x3C => @END),
    }
}

#[repr(C)]
struct AuxiliaryControlRegisters {
    actlr: ReadWrite<u32, AuxiliaryControl::Register>,
}

register_bitfields![u32,
    SystemHandlerControlAndState [
        USGFAULTENA OFFSET(18) NUMBITS(1) [],
        BUSFAULTENA OFFSET(17) NUMBITS(1) [],
        MEMFAULTENA OFFSET(16) NUMBITS(1) []
    ],

    ConfigurableFaultStatus [
        /// BFAR holds a valid fault address.
        BFARVALID OFFSET(15) NUMBITS(1) [],
        LSPERR OFFSET(13) NUMBITS(1) [],
        STKERR OFFSET(12) NUMBITS(1) [],
        UNSTKERR OFFSET(11) NUMBITS(1) [],
        IMPRECISERR OFFSET(10) NUMBITS(1) [],
        /// The stacked PC points at the instruction that caused the fault.
        PRECISERR OFFSET(9) NUMBITS(1) [],
        IBUSERR OFFSET(8) NUMBITS(1) [],
        /// Bus fault status byte, write one to clear.
        BFSR OFFSET(8) NUMBITS(8) []
    ],

    AuxiliaryControl [
        /// Disables write buffer use during default memory map accesses, so
        /// every bus fault on a store is precise.
        DISDEFWBUF OFFSET(1) NUMBITS(1) []
    ]
];

const SCB: StaticRef<ScbRegisters> = unsafe { StaticRef::new(0xE000ED00 as *const ScbRegisters) };

const SCNSCB: StaticRef<AuxiliaryControlRegisters> =
    unsafe { StaticRef::new(0xE000E008 as *const AuxiliaryControlRegisters) };

/// The processor core as seen by the monitor.
pub struct CortexM {
    scb: StaticRef<ScbRegisters>,
    scnscb: StaticRef<AuxiliaryControlRegisters>,
}

impl CortexM {
    pub const unsafe fn new() -> CortexM {
        CortexM {
            scb: SCB,
            scnscb: SCNSCB,
        }
    }
}

impl SystemControl for CortexM {
    fn enable_fault_handlers(&self) {
        self.scb.shcsr.modify(
            SystemHandlerControlAndState::USGFAULTENA::SET
                + SystemHandlerControlAndState::BUSFAULTENA::SET
                + SystemHandlerControlAndState::MEMFAULTENA::SET,
        );
    }

    fn disable_write_buffer(&self) {
        self.scnscb.actlr.modify(AuxiliaryControl::DISDEFWBUF::SET);
    }

    fn active_exception(&self) -> u32 {
        support::ipsr()
    }

    fn process_stack_pointer(&self) -> usize {
        support::psp()
    }

    fn bus_fault_status(&self) -> BusFaultStatus {
        let cfsr = self.scb.cfsr.extract();
        BusFaultStatus {
            precise: cfsr.is_set(ConfigurableFaultStatus::PRECISERR),
            address: if cfsr.is_set(ConfigurableFaultStatus::BFARVALID) {
                Some(self.scb.bfar.get() as usize)
            } else {
                None
            },
        }
    }

    fn clear_bus_fault_status(&self) {
        // Write-one-to-clear: leave the other status bytes untouched.
        self.scb
            .cfsr
            .write(ConfigurableFaultStatus::BFSR.val(0xFF));
    }
}

impl PrivilegedBus for CortexM {
    unsafe fn read(&self, address: usize, width: AccessWidth) -> u32 {
        match width {
            AccessWidth::Byte => u32::from(ptr::read_volatile(address as *const u8)),
            AccessWidth::Halfword => u32::from(ptr::read_volatile(address as *const u16)),
            AccessWidth::Word => ptr::read_volatile(address as *const u32),
        }
    }
}
