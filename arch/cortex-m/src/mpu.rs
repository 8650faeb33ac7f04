// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Implementation of the memory protection unit for the Cortex-M3, Cortex-M4
//! and Cortex-M7 (ARMv7-M PMSA).
//!
//! Each ACL the region table stages is encoded into one hardware region:
//! either an exact power-of-two region, or a larger aligned region with only
//! the subregions covering the ACL enabled. ACLs that fit neither shape are
//! left out of the hardware and reported.

use core::cell::Cell;
use core::cmp;
use core::fmt;

use kernel::platform::mpu::{self, Permissions};
use kernel::utilities::registers::interfaces::{Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, FieldValue, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;
use kernel::AclEntry;

/// MPU Registers for the Cortex-M3, Cortex-M4 and Cortex-M7 families
/// Described in section 4.5 of
/// <http://infocenter.arm.com/help/topic/com.arm.doc.dui0553a/DUI0553A_cortex_m4_dgug.pdf>
#[repr(C)]
struct MpuRegisters {
    /// Indicates whether the MPU is present and, if so, how many regions it
    /// supports.
    pub mpu_type: ReadOnly<u32, Type::Register>,

    /// The control register:
    ///   * Enables the MPU (bit 0).
    ///   * Enables MPU in hard-fault, non-maskable interrupt (NMI).
    ///   * Enables the default memory map background region in privileged mode.
    pub ctrl: ReadWrite<u32, Control::Register>,

    /// Selects the region number (zero-indexed) referenced by the region base
    /// address and region attribute and size registers.
    pub rnr: ReadWrite<u32, RegionNumber::Register>,

    /// Defines the base address of the currently selected MPU region.
    pub rbar: ReadWrite<u32, RegionBaseAddress::Register>,

    /// Defines the region size and memory attributes of the selected MPU
    /// region. The bits are defined as in 4.5.5 of the Cortex-M4 user guide.
    pub rasr: ReadWrite<u32, RegionAttributes::Register>,
}

register_bitfields![u32,
    Type [
        /// The number of MPU instructions regions supported. Always reads 0.
        IREGION OFFSET(16) NUMBITS(8) [],
        /// The number of data regions supported. If this field reads-as-zero the
        /// processor does not implement an MPU
        DREGION OFFSET(8) NUMBITS(8) [],
        /// Indicates whether the processor support unified (0) or separate
        /// (1) instruction and data regions.
        SEPARATE OFFSET(0) NUMBITS(1) []
    ],

    Control [
        /// Enables privileged software access to the default
        /// memory map
        PRIVDEFENA OFFSET(2) NUMBITS(1) [],
        /// Enables the operation of MPU during hard fault, NMI,
        /// and FAULTMASK handlers
        HFNMIENA OFFSET(1) NUMBITS(1) [],
        /// Enables the MPU
        ENABLE OFFSET(0) NUMBITS(1) []
    ],

    RegionNumber [
        REGION OFFSET(0) NUMBITS(8) []
    ],

    RegionBaseAddress [
        /// Base address of the currently selected MPU region.
        ADDR OFFSET(5) NUMBITS(27) [],
        /// MPU Region Number valid bit.
        VALID OFFSET(4) NUMBITS(1) [
            /// Use the base address specified in Region Number Register (RNR)
            UseRNR = 0,
            /// Use the value of the REGION field in this register (RBAR)
            UseRBAR = 1
        ],
        /// Specifies which MPU region to set if VALID is set to 1.
        REGION OFFSET(0) NUMBITS(4) []
    ],

    RegionAttributes [
        /// Enables instruction fetches/execute permission
        XN OFFSET(28) NUMBITS(1) [
            Enable = 0,
            Disable = 1
        ],
        /// Defines access permissions
        AP OFFSET(24) NUMBITS(3) [
            //                                 Privileged  Unprivileged
            //                                 Access      Access
            NoAccess = 0b000,               // --          --
            PrivilegedOnly = 0b001,         // RW          --
            UnprivilegedReadOnly = 0b010,   // RW          R-
            ReadWrite = 0b011,              // RW          RW
            Reserved = 0b100,               // undef       undef
            PrivilegedOnlyReadOnly = 0b101, // R-          --
            ReadOnly = 0b110,               // R-          R-
            ReadOnlyAlias = 0b111           // R-          R-
        ],
        /// Subregion disable bits
        SRD OFFSET(8) NUMBITS(8) [],
        /// Specifies the region size, being 2^(SIZE+1) (minimum 3)
        SIZE OFFSET(1) NUMBITS(5) [],
        /// Enables the region
        ENABLE OFFSET(0) NUMBITS(1) []
    ]
];

const MPU_BASE_ADDRESS: StaticRef<MpuRegisters> =
    unsafe { StaticRef::new(0xE000ED90 as *const MpuRegisters) };

/// Smallest region that can be split into subregions.
const MIN_SUBREGION_REGION: usize = 256;

/// Largest region size expressible in RASR.SIZE on a 32-bit bus.
const MAX_REGION_SIZE: usize = 1 << 31;

/// State related to the real physical MPU.
///
/// There should only be one instantiation of this object as it represents
/// real hardware.
pub struct MPU<const NUM_REGIONS: usize> {
    /// MMIO reference to MPU registers.
    registers: StaticRef<MpuRegisters>,
    /// Number of ACLs the last configuration could not encode.
    skipped: Cell<usize>,
}

impl<const NUM_REGIONS: usize> MPU<NUM_REGIONS> {
    /// Regions that exist on the part and are managed here, given
    /// `TYPE.DREGION`. Slots past it must never be selected.
    const fn usable_regions(dregion: usize) -> usize {
        if dregion < NUM_REGIONS {
            dregion
        } else {
            NUM_REGIONS
        }
    }

    pub const unsafe fn new() -> Self {
        Self {
            registers: MPU_BASE_ADDRESS,
            skipped: Cell::new(0),
        }
    }

    // Function useful for boards where the bootloader sets up some
    // MPU configuration that conflicts with the monitor's configuration:
    pub unsafe fn clear_mpu(&self) {
        self.registers.ctrl.write(Control::ENABLE::CLEAR);
    }

    /// ACLs left out of the hardware by the last `configure_mpu`.
    pub fn skipped(&self) -> usize {
        self.skipped.get()
    }

    fn write_region(&self, region: &CortexMRegion) {
        self.registers.rbar.write(region.base_address());
        self.registers.rasr.write(region.attributes());
    }
}

/// Struct storing configuration for a Cortex-M MPU region.
#[derive(Copy, Clone)]
pub struct CortexMRegion {
    /// Accessible start and size, if the region is set.
    location: Option<(usize, usize)>,
    region_number: usize,
    base_address: FieldValue<u32, RegionBaseAddress::Register>,
    attributes: FieldValue<u32, RegionAttributes::Register>,
}

impl CortexMRegion {
    fn new(
        logical_start: usize,
        logical_size: usize,
        region_start: usize,
        region_size: usize,
        region_num: usize,
        subregions: Option<(usize, usize)>,
        permissions: Option<Permissions>,
    ) -> CortexMRegion {
        // Determine access and execute permissions
        let (access, execute) = match permissions {
            Some(Permissions::ReadWriteExecute) => (
                RegionAttributes::AP::ReadWrite,
                RegionAttributes::XN::Enable,
            ),
            Some(Permissions::ReadWriteOnly) => (
                RegionAttributes::AP::ReadWrite,
                RegionAttributes::XN::Disable,
            ),
            Some(Permissions::ReadExecuteOnly) => (
                RegionAttributes::AP::UnprivilegedReadOnly,
                RegionAttributes::XN::Enable,
            ),
            Some(Permissions::ReadOnly) => (
                RegionAttributes::AP::UnprivilegedReadOnly,
                RegionAttributes::XN::Disable,
            ),
            Some(Permissions::ExecuteOnly) => (
                RegionAttributes::AP::PrivilegedOnly,
                RegionAttributes::XN::Enable,
            ),
            None => (
                RegionAttributes::AP::PrivilegedOnly,
                RegionAttributes::XN::Disable,
            ),
        };

        // Base address register
        let base_address = RegionBaseAddress::ADDR.val((region_start as u32) >> 5)
            + RegionBaseAddress::VALID::UseRBAR
            + RegionBaseAddress::REGION.val(region_num as u32);

        let size_value = region_size.trailing_zeros() - 1;

        // Attributes register
        let mut attributes = RegionAttributes::ENABLE::SET
            + RegionAttributes::SIZE.val(size_value)
            + access
            + execute;

        // If using subregions, add a subregion mask. The mask is a 8-bit
        // bitfield where `0` indicates that the corresponding subregion is enabled.
        // To compute the mask, we start with all subregions disabled and enable
        // the ones in the inclusive range [min_subregion, max_subregion].
        if let Some((min_subregion, max_subregion)) = subregions {
            let mask = (min_subregion..=max_subregion).fold(u8::MAX, |res, i| {
                // Enable subregions bit by bit (1 ^ 1 == 0)
                res ^ (1 << i)
            });
            attributes += RegionAttributes::SRD.val(u32::from(mask));
        }

        Self {
            location: Some((logical_start, logical_size)),
            region_number: region_num,
            base_address,
            attributes,
        }
    }

    fn empty(region_num: usize) -> CortexMRegion {
        CortexMRegion {
            location: None,
            region_number: region_num,
            base_address: RegionBaseAddress::VALID::UseRBAR
                + RegionBaseAddress::REGION.val(region_num as u32),
            attributes: RegionAttributes::ENABLE::CLEAR,
        }
    }

    /// Encode `entry` into hardware region `region_num`, or `None` if no
    /// region shape covers exactly the entry.
    pub fn from_acl(entry: &AclEntry, region_num: usize) -> Option<CortexMRegion> {
        let start = entry.start();
        let size = entry.size();
        let permissions = Permissions::from_flags(entry.flags());
        if size < 32 {
            return None;
        }

        if size.is_power_of_two() && start % size == 0 {
            return Some(CortexMRegion::new(
                start,
                size,
                start,
                size,
                region_num,
                None,
                permissions,
            ));
        }

        // Find an aligned region whose subregions tile the entry exactly.
        let mut region_size = cmp::max(size, MIN_SUBREGION_REGION).checked_next_power_of_two()?;
        while region_size <= MAX_REGION_SIZE {
            let subregion_size = region_size / 8;
            let region_start = start & !(region_size - 1);
            let offset = start - region_start;
            if offset % subregion_size == 0
                && size % subregion_size == 0
                && offset + size <= region_size
            {
                let first = offset / subregion_size;
                let last = first + size / subregion_size - 1;
                return Some(CortexMRegion::new(
                    start,
                    size,
                    region_start,
                    region_size,
                    region_num,
                    Some((first, last)),
                    permissions,
                ));
            }
            region_size = region_size.checked_mul(2)?;
        }
        None
    }

    pub fn region_num(&self) -> usize {
        self.region_number
    }

    pub fn is_set(&self) -> bool {
        self.location.is_some()
    }

    fn base_address(&self) -> FieldValue<u32, RegionBaseAddress::Register> {
        self.base_address
    }

    fn attributes(&self) -> FieldValue<u32, RegionAttributes::Register> {
        self.attributes
    }
}

impl fmt::Display for CortexMRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\r\n Cortex-M Region {}", self.region_number)?;
        if let Some((start, size)) = self.location {
            let access_bits = self.attributes.read(RegionAttributes::AP);
            write!(
                f,
                "\r\n  Region: [{:#010X}:{:#010X}], length: {} bytes; ({:#x})",
                start,
                start + size,
                size,
                access_bits,
            )?;
            let subregion_bits = self.attributes.read(RegionAttributes::SRD);
            if subregion_bits != 0 {
                write!(f, "\r\n  Disabled sub-regions: {:#010b}", subregion_bits)?;
            }
        } else {
            write!(f, "\r\n  Region: Unused")?;
        }
        write!(f, "\r\n")
    }
}

impl<const NUM_REGIONS: usize> mpu::MPU for MPU<NUM_REGIONS> {
    fn enable_app_mpu(&self) {
        self.registers
            .ctrl
            .write(Control::ENABLE::SET + Control::HFNMIENA::CLEAR + Control::PRIVDEFENA::SET);
    }

    fn disable_app_mpu(&self) {
        self.registers.ctrl.write(Control::ENABLE::CLEAR);
    }

    fn number_total_regions(&self) -> usize {
        Self::usable_regions(self.registers.mpu_type.read(Type::DREGION) as usize)
    }

    fn configure_mpu(&self, regions: &[AclEntry]) {
        self.disable_app_mpu();

        let mut skipped = 0;
        let mut slots = 0..self.number_total_regions();
        for entry in regions {
            let Some(slot) = slots.next() else {
                skipped += 1;
                continue;
            };
            match CortexMRegion::from_acl(entry, slot) {
                Some(region) => self.write_region(&region),
                None => {
                    log::warn!("MPU cannot encode {}", entry);
                    self.write_region(&CortexMRegion::empty(slot));
                    skipped += 1;
                }
            }
        }
        // cannot have stale regions
        for slot in slots {
            self.write_region(&CortexMRegion::empty(slot));
        }
        self.skipped.set(skipped);

        self.enable_app_mpu();
    }
}
