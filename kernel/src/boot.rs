// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Bring-up of the protection hardware.

use crate::acl::{self, BoxId};
use crate::capabilities::MemoryProtectionCapability;
use crate::config::STACK_BAND_SIZE;
use crate::halt::{self, Halt, VmpuError};
use crate::layout::{BoxConfig, BoxLayoutAllocator};
use crate::platform::system::SystemControl;
use crate::region_table::RegionTable;
use crate::vmpu::Vmpu;

/// Initialize the monitor, halting on failure.
///
/// Must run once, privileged, before any box code and before any ACL is
/// added.
pub fn init<P, G, S, H>(
    vmpu: &Vmpu<'_, P, G, S, H>,
    config: &BoxConfig,
    capability: &dyn MemoryProtectionCapability,
) -> BoxLayoutAllocator
where
    P: RegionTable,
    G: RegionTable,
    S: SystemControl,
    H: Halt,
{
    match try_init(vmpu, config, capability) {
        Ok(layout) => layout,
        Err(err) => halt::halt_on(vmpu.halt(), err),
    }
}

pub fn try_init<P, G, S, H>(
    vmpu: &Vmpu<'_, P, G, S, H>,
    config: &BoxConfig,
    _capability: &dyn MemoryProtectionCapability,
) -> Result<BoxLayoutAllocator, VmpuError>
where
    P: RegionTable,
    G: RegionTable,
    S: SystemControl,
    H: Halt,
{
    let system = vmpu.system();
    system.enable_fault_handlers();
    // Imprecise bus faults cannot be attributed to an instruction.
    system.disable_write_buffer();

    vmpu.peripheral().init().map_err(VmpuError::Rejected)?;
    vmpu.general().init().map_err(VmpuError::Rejected)?;
    // The main box runs on general memory until its first switch.
    vmpu.general()
        .activate(BoxId::MAIN)
        .map_err(|code| VmpuError::SwitchFailed {
            dst: BoxId::MAIN,
            code,
        })?;

    let base = acl::round_up(config.reserved_end)
        .and_then(|end| end.checked_add(STACK_BAND_SIZE))
        .ok_or(VmpuError::ArenaExhausted)?;

    log::info!(
        "reserved {:#010X}..{:#010X}, box arena at {:#010X}",
        config.reserved_start,
        config.reserved_end,
        base
    );
    Ok(BoxLayoutAllocator::new(base))
}
