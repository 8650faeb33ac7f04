// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Peripheral implementations for the NXP Kinetis K64F MCU.
//!
//! General memory is protected by the SYSMPU and peripheral space by the
//! AIPS-Lite bridges; both are driven through one region table each.

#![no_std]

pub mod aips;
pub mod memory_map;
pub mod sysmpu;

use cortexm::{CortexM, ExcReturnValidator};
use kernel::region_table::AclTable;

pub use crate::aips::Aips;
pub use crate::sysmpu::SysMpu;

pub type PeripheralTable = AclTable<'static, Aips>;
pub type GeneralTable = AclTable<'static, SysMpu>;

/// Protection hardware of the chip.
pub struct K64f {
    pub aips: Aips,
    pub sysmpu: SysMpu,
    pub core: CortexM,
    pub validator: ExcReturnValidator,
}

impl K64f {
    pub const unsafe fn new() -> K64f {
        K64f {
            aips: Aips::new(),
            sysmpu: SysMpu::new(),
            core: CortexM::new(),
            validator: ExcReturnValidator,
        }
    }

    /// Region table for peripheral ACLs.
    pub fn peripheral_table(&'static self) -> PeripheralTable {
        AclTable::new(&self.aips, &memory_map::PERIPHERAL_AREAS, &[])
    }

    /// Region table for general memory ACLs, with the firmware image readable
    /// by every box.
    pub fn general_table(&'static self) -> GeneralTable {
        AclTable::new(
            &self.sysmpu,
            &memory_map::GENERAL_AREAS,
            &memory_map::GENERAL_DEFAULTS,
        )
    }
}
