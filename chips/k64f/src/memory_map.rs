// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Address space of the MK64FN1M0 (1 MiB flash, 256 KiB SRAM).

use kernel::memory_map::MemoryArea;
use kernel::{AclEntry, AclFlags};

use crate::aips::{AIPS_END, AIPS_START};

pub const FLASH: MemoryArea = MemoryArea::new("FLASH", 0x0000_0000, 0x0010_0000);
pub const SRAM_L: MemoryArea = MemoryArea::new("SRAM_L", 0x1FFF_0000, 0x2000_0000);
pub const SRAM_U: MemoryArea = MemoryArea::new("SRAM_U", 0x2000_0000, 0x2003_0000);
pub const AIPS0: MemoryArea = MemoryArea::new("AIPS0", AIPS_START, 0x4008_0000);
pub const AIPS1: MemoryArea = MemoryArea::new("AIPS1", 0x4008_0000, AIPS_END);
pub const GPIO: MemoryArea = MemoryArea::new("GPIO", 0x400F_F000, 0x4010_0000);
pub const SRAM_BITBAND: MemoryArea = MemoryArea::new("SRAM_BITBAND", 0x2200_0000, 0x2400_0000);
pub const PERIPHERAL_BITBAND: MemoryArea =
    MemoryArea::new("PERIPHERAL_BITBAND", 0x4200_0000, 0x4400_0000);
pub const PPB: MemoryArea = MemoryArea::new("PPB", 0xE000_0000, 0xE010_0000);

/// Every named area, for diagnostics. More specific areas come first.
pub const MEMORY_MAP: [MemoryArea; 9] = [
    FLASH,
    SRAM_L,
    SRAM_U,
    SRAM_BITBAND,
    GPIO,
    AIPS0,
    AIPS1,
    PERIPHERAL_BITBAND,
    PPB,
];

/// Ranges enforced by the SYSMPU. The two SRAM halves are contiguous and
/// one ACL may span both.
pub const GENERAL_AREAS: [MemoryArea; 2] = [
    FLASH,
    MemoryArea::new("SRAM", SRAM_L.start, SRAM_U.end),
];

/// Ranges enforced by the AIPS-Lite bridges.
pub const PERIPHERAL_AREAS: [MemoryArea; 1] = [MemoryArea::new("AIPS", AIPS_START, AIPS_END)];

/// Every box may read and execute the firmware image.
pub const GENERAL_DEFAULTS: [AclEntry; 1] =
    [AclEntry::for_all_boxes(FLASH.start, FLASH.end - FLASH.start, AclFlags::UXSR)];

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::memory_map;

    #[test]
    fn names_prefer_specific_areas() {
        assert_eq!(memory_map::name_of(&MEMORY_MAP, 0x400F_F040), "GPIO");
        assert_eq!(memory_map::name_of(&MEMORY_MAP, 0x4003_8000), "AIPS0");
        assert_eq!(memory_map::name_of(&MEMORY_MAP, 0x1FFF_8000), "SRAM_L");
        assert_eq!(memory_map::name_of(&MEMORY_MAP, 0x4270_0000), "PERIPHERAL_BITBAND");
        assert_eq!(memory_map::name_of(&MEMORY_MAP, 0x6000_0000), "unknown");
    }

    #[test]
    fn sram_halves_form_one_general_area() {
        assert!(GENERAL_AREAS[1].contains_range(0x1FFF_FF00, 0x200));
        assert!(!GENERAL_AREAS.iter().any(|a| a.contains(AIPS_START)));
        assert!(PERIPHERAL_AREAS[0].contains_range(0x4008_1000, 0x1000));
    }
}
