// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! System memory protection unit (SYSMPU) of the Kinetis K64.
//!
//! The SYSMPU sits on the crossbar slave ports and checks every access
//! against a set of region descriptors, granting it if any valid descriptor
//! does. Descriptor 0 is the background region covering the whole address
//! space; its range is fixed, and enabling the backend takes away user access
//! through it for the core's masters. Box entries use descriptors 1 and up. A denied access terminates with a bus error and
//! latches the slave port in CESR.SPERR, which is how a protection violation
//! is told apart from a plain bus error.

use kernel::platform::mpu;
use kernel::utilities::registers::interfaces::{Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;
use kernel::{AclEntry, AclFlags};

register_structs! {
    SysMpuRegisters {
        (0x000 => cesr: ReadWrite<u32, ControlErrorStatus::Register>),
        (0x004 => _reserved0),
        /// Error address and detail registers, one pair per slave port.
        (0x010 => ear_edr: [ReadOnly<u32>; 10]),
        (0x038 => _reserved1),
        (0x400 => rgd: [RegionDescriptor; NUM_DESCRIPTORS]),
        (0x4C0 => _reserved2),
        (0x800 => rgdaac: [ReadWrite<u32, Word2::Register>; NUM_DESCRIPTORS]),
        (0x830 => @END),
    },

    RegionDescriptor {
        (0x0 => word0: ReadWrite<u32, Word0::Register>),
        (0x4 => word1: ReadWrite<u32, Word1::Register>),
        (0x8 => word2: ReadWrite<u32, Word2::Register>),
        (0xC => word3: ReadWrite<u32, Word3::Register>),
        (0x10 => @END),
    }
}

register_bitfields![u32,
    ControlErrorStatus [
        /// Slave port error: one bit per slave port, write one to clear.
        SPERR OFFSET(27) NUMBITS(5) [],
        HRL OFFSET(16) NUMBITS(4) [],
        NSP OFFSET(12) NUMBITS(4) [],
        NRGD OFFSET(8) NUMBITS(4) [
            Eight = 0,
            Twelve = 1,
            Sixteen = 2
        ],
        VLD OFFSET(0) NUMBITS(1) []
    ],

    Word0 [
        SRTADDR OFFSET(5) NUMBITS(27) []
    ],

    Word1 [
        /// Inclusive end address; the low five bits read as ones.
        ENDADDR OFFSET(5) NUMBITS(27) []
    ],

    Word2 [
        M1PE OFFSET(11) NUMBITS(1) [],
        M1SM OFFSET(9) NUMBITS(2) [
            ReadWriteExecute = 0,
            ReadExecute = 1,
            ReadWrite = 2,
            SameAsUser = 3
        ],
        M1UM OFFSET(6) NUMBITS(3) [],
        M0PE OFFSET(5) NUMBITS(1) [],
        M0SM OFFSET(3) NUMBITS(2) [
            ReadWriteExecute = 0,
            ReadExecute = 1,
            ReadWrite = 2,
            SameAsUser = 3
        ],
        /// User mode rights: read (bit 2), write (bit 1), execute (bit 0).
        M0UM OFFSET(0) NUMBITS(3) []
    ],

    Word3 [
        PID OFFSET(24) NUMBITS(8) [],
        PIDMASK OFFSET(16) NUMBITS(8) [],
        VLD OFFSET(0) NUMBITS(1) []
    ]
];

/// Region descriptors implemented on the K64.
const NUM_DESCRIPTORS: usize = 12;

/// Descriptor reserved for the monitor's background region.
const RESERVED_DESCRIPTORS: usize = 1;

const SYSMPU_BASE: StaticRef<SysMpuRegisters> =
    unsafe { StaticRef::new(0x4000_D000 as *const SysMpuRegisters) };

/// Rights of the background descriptor given its current RGDAAC0 value:
/// no user access for the core's code and system bus masters, full
/// supervisor access. Other masters keep what they had.
fn background_access(current: u32) -> u32 {
    (Word2::M0UM.val(0)
        + Word2::M0SM::ReadWriteExecute
        + Word2::M0PE::CLEAR
        + Word2::M1UM.val(0)
        + Word2::M1SM::ReadWriteExecute
        + Word2::M1PE::CLEAR)
        .modify(current)
}

/// User mode rights in the MxUM encoding.
fn user_mode_bits(flags: AclFlags) -> u32 {
    let mut bits = 0;
    if flags.contains(AclFlags::UREAD) {
        bits |= 0b100;
    }
    if flags.contains(AclFlags::UWRITE) {
        bits |= 0b010;
    }
    if flags.contains(AclFlags::UEXECUTE) {
        bits |= 0b001;
    }
    bits
}

/// The four descriptor words enforcing `entry` for the core's code and
/// system bus masters. Supervisor code keeps full access.
fn descriptor_words(entry: &AclEntry) -> [u32; 4] {
    let user = user_mode_bits(entry.flags());
    let word0 = Word0::SRTADDR.val(entry.start() as u32 >> 5);
    let word1 = Word1::ENDADDR.val((entry.end() - 1) as u32 >> 5);
    let word2 = Word2::M0UM.val(user)
        + Word2::M0SM::ReadWriteExecute
        + Word2::M1UM.val(user)
        + Word2::M1SM::ReadWriteExecute;
    let word3 = Word3::VLD::SET;
    [word0.into(), word1.into(), word2.into(), word3.into()]
}

pub struct SysMpu {
    registers: StaticRef<SysMpuRegisters>,
}

impl SysMpu {
    pub const unsafe fn new() -> SysMpu {
        SysMpu {
            registers: SYSMPU_BASE,
        }
    }

    fn descriptors(&self) -> usize {
        let implemented = match self.registers.cesr.read_as_enum(ControlErrorStatus::NRGD) {
            Some(ControlErrorStatus::NRGD::Value::Sixteen) => 16,
            Some(ControlErrorStatus::NRGD::Value::Twelve) => 12,
            _ => 8,
        };
        implemented.min(NUM_DESCRIPTORS)
    }
}

impl mpu::MPU for SysMpu {
    fn enable_app_mpu(&self) {
        let background = &self.registers.rgdaac[0];
        background.set(background_access(background.get()));
        // SPERR is write-one-to-clear; writing zero keeps pending errors.
        self.registers.cesr.write(ControlErrorStatus::VLD::SET);
    }

    fn disable_app_mpu(&self) {
        self.registers.cesr.write(ControlErrorStatus::VLD::CLEAR);
    }

    fn number_total_regions(&self) -> usize {
        self.descriptors() - RESERVED_DESCRIPTORS
    }

    fn configure_mpu(&self, regions: &[AclEntry]) {
        let descriptors = &self.registers.rgd[RESERVED_DESCRIPTORS..self.descriptors()];
        let mut regions = regions.iter();
        for rgd in descriptors {
            match regions.next() {
                Some(entry) => {
                    let [word0, word1, word2, word3] = descriptor_words(entry);
                    // Writing words 0 to 2 invalidates the descriptor, so VLD
                    // goes last.
                    rgd.word0.set(word0);
                    rgd.word1.set(word1);
                    rgd.word2.set(word2);
                    rgd.word3.set(word3);
                }
                None => rgd.word3.write(Word3::VLD::CLEAR),
            }
        }
    }

    fn security_violation(&self) -> bool {
        self.registers.cesr.read(ControlErrorStatus::SPERR) != 0
    }

    fn clear_security_violation(&self) {
        self.registers
            .cesr
            .write(ControlErrorStatus::SPERR.val(0x1F) + ControlErrorStatus::VLD::SET);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::acl::Owner;
    use kernel::BoxId;

    fn acl(start: usize, size: usize, flags: AclFlags) -> AclEntry {
        AclEntry::new(Owner::Box(BoxId::new(2).unwrap()), start, size, flags).unwrap()
    }

    #[test]
    fn stack_descriptor() {
        let words = descriptor_words(&acl(0x2000_1000, 0x400, AclFlags::STACK));
        assert_eq!(words[0], 0x2000_1000);
        assert_eq!(words[1], 0x2000_13E0);
        // rw- for M0 and M1, supervisor rwx.
        assert_eq!(words[2], (0b110 << 6) | 0b110);
        assert_eq!(words[3], 1);
    }

    #[test]
    fn background_descriptor_is_supervisor_only() {
        // Reset value: every master has full rights.
        assert_eq!(background_access(0x0061_F7DF), 0x0061_F000);
        // Process identifier checks are dropped for the core.
        assert_eq!(background_access(0x0000_0820), 0);
    }

    #[test]
    fn user_rights_encoding() {
        assert_eq!(user_mode_bits(AclFlags::UXSR), 0b101);
        assert_eq!(user_mode_bits(AclFlags::SRW), 0);
        assert_eq!(user_mode_bits(AclFlags::URW | AclFlags::UEXECUTE), 0b111);
    }
}
