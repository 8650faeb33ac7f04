// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! AIPS-Lite peripheral bridge access control.
//!
//! Each of the two bridges maps 128 peripheral slots of 4 KiB. Every slot
//! has a nibble in one of the PACR registers; setting its SP bit restricts
//! the slot to supervisor accesses. The backend grants a box user access to
//! every slot an active ACL covers completely. Slots an ACL only partly
//! covers stay supervisor-only, so accesses to them fault and are decided by
//! emulation against the exact ACL range.

use core::cell::Cell;

use kernel::platform::mpu;
use kernel::utilities::registers::interfaces::Writeable;
use kernel::utilities::registers::{register_structs, ReadWrite};
use kernel::utilities::StaticRef;
use kernel::{AclEntry, AclFlags};

register_structs! {
    AipsRegisters {
        /// Master privilege register.
        (0x00 => mpra: ReadWrite<u32>),
        (0x04 => _reserved0),
        (0x20 => pacr_a_d: [ReadWrite<u32>; 4]),
        (0x30 => _reserved1),
        (0x40 => pacr_e_p: [ReadWrite<u32>; 12]),
        (0x70 => @END),
    }
}

const AIPS0_BASE: StaticRef<AipsRegisters> =
    unsafe { StaticRef::new(0x4000_0000 as *const AipsRegisters) };
const AIPS1_BASE: StaticRef<AipsRegisters> =
    unsafe { StaticRef::new(0x4008_0000 as *const AipsRegisters) };

pub const AIPS_START: usize = 0x4000_0000;
pub const AIPS_END: usize = 0x4010_0000;
pub const SLOT_SIZE: usize = 0x1000;

const BRIDGES: usize = 2;
const SLOTS_PER_BRIDGE: usize = 128;
const SLOTS_PER_REGISTER: usize = 8;
const REGISTERS_PER_BRIDGE: usize = SLOTS_PER_BRIDGE / SLOTS_PER_REGISTER;

/// Supervisor protect: user accesses to the slot are refused.
const PACR_SP: u32 = 0b0100;
/// Write protect: writes to the slot are refused.
const PACR_WP: u32 = 0b0010;

/// Contents of every PACR register of both bridges.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PacrImage {
    registers: [[u32; REGISTERS_PER_BRIDGE]; BRIDGES],
}

impl PacrImage {
    /// Every slot supervisor-only.
    pub const LOCKED: PacrImage = PacrImage {
        registers: [[0x4444_4444; REGISTERS_PER_BRIDGE]; BRIDGES],
    };

    /// No restriction on any slot.
    pub const OPEN: PacrImage = PacrImage {
        registers: [[0; REGISTERS_PER_BRIDGE]; BRIDGES],
    };

    /// Bridge, register index and bit shift of the nibble controlling the
    /// slot at `address`.
    fn locate(address: usize) -> Option<(usize, usize, u32)> {
        if !(AIPS_START..AIPS_END).contains(&address) {
            return None;
        }
        let slot = (address - AIPS_START) / SLOT_SIZE;
        let bridge = slot / SLOTS_PER_BRIDGE;
        let index = slot % SLOTS_PER_BRIDGE;
        let shift = 28 - 4 * (index % SLOTS_PER_REGISTER) as u32;
        Some((bridge, index / SLOTS_PER_REGISTER, shift))
    }

    pub fn slot(&self, address: usize) -> Option<u32> {
        let (bridge, register, shift) = Self::locate(address)?;
        Some((self.registers[bridge][register] >> shift) & 0xF)
    }

    fn set_slot(&mut self, address: usize, bits: u32) {
        if let Some((bridge, register, shift)) = Self::locate(address) {
            let value = &mut self.registers[bridge][register];
            *value = (*value & !(0xF << shift)) | (bits << shift);
        }
    }

    /// Open the slots `entry` covers completely to user code.
    pub fn grant(&mut self, entry: &AclEntry) {
        let flags = entry.flags();
        if !flags.contains(AclFlags::UREAD) {
            return;
        }
        let bits = if flags.contains(AclFlags::UWRITE) {
            0
        } else {
            PACR_WP
        };
        let first = entry.start().next_multiple_of(SLOT_SIZE);
        let mut slot = first;
        while slot
            .checked_add(SLOT_SIZE)
            .is_some_and(|end| end <= entry.end())
        {
            self.set_slot(slot, bits);
            slot += SLOT_SIZE;
        }
    }
}

/// Both AIPS-Lite bridges as one protection domain.
pub struct Aips {
    bridges: [StaticRef<AipsRegisters>; BRIDGES],
    image: Cell<PacrImage>,
}

impl Aips {
    pub const unsafe fn new() -> Aips {
        Aips {
            bridges: [AIPS0_BASE, AIPS1_BASE],
            image: Cell::new(PacrImage::LOCKED),
        }
    }

    fn write_image(&self, image: &PacrImage) {
        for (bridge, values) in self.bridges.iter().zip(image.registers.iter()) {
            let (low, high) = values.split_at(4);
            for (register, value) in bridge.pacr_a_d.iter().zip(low) {
                register.set(*value);
            }
            for (register, value) in bridge.pacr_e_p.iter().zip(high) {
                register.set(*value);
            }
        }
    }
}

impl mpu::MPU for Aips {
    fn enable_app_mpu(&self) {
        self.write_image(&self.image.get());
    }

    fn disable_app_mpu(&self) {
        self.write_image(&PacrImage::OPEN);
    }

    /// Slot control is a bitmap, so every staged entry is enforced.
    fn number_total_regions(&self) -> usize {
        usize::MAX
    }

    fn configure_mpu(&self, regions: &[AclEntry]) {
        let mut image = PacrImage::LOCKED;
        for entry in regions {
            image.grant(entry);
        }
        self.image.set(image);
        self.write_image(&image);
    }
}
