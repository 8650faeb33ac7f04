// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Box ACL facade and switch coordinator.
//!
//! `Vmpu` owns references to the two region tables and is the only place that
//! decides which of them an ACL goes to, and the only place that switches them.
//! Every operation has a `try_` form returning the error and a plain form that
//! halts the system on error.

use crate::acl::{self, Access, AclEntry, AclFlags, AclKind, BoxId};
use crate::config::CONFIG;
use crate::errorcode::ErrorCode;
use crate::halt::{self, Halt, VmpuError};
use crate::memory_map::{self, MemoryArea};
use crate::platform::system::SystemControl;
use crate::region_table::RegionTable;

/// Fill level of both tables, taken by [`Vmpu::mark`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mark {
    peripheral: usize,
    general: usize,
}

pub struct Vmpu<'a, P: RegionTable, G: RegionTable, S: SystemControl, H: Halt> {
    peripheral: &'a P,
    general: &'a G,
    system: &'a S,
    halt: &'a H,
    /// Used for diagnostics only.
    memory_map: &'a [MemoryArea],
}

impl<'a, P: RegionTable, G: RegionTable, S: SystemControl, H: Halt> Vmpu<'a, P, G, S, H> {
    pub fn new(
        peripheral: &'a P,
        general: &'a G,
        system: &'a S,
        halt: &'a H,
        memory_map: &'a [MemoryArea],
    ) -> Self {
        Self {
            peripheral,
            general,
            system,
            halt,
            memory_map,
        }
    }

    pub fn peripheral(&self) -> &'a P {
        self.peripheral
    }

    pub fn general(&self) -> &'a G {
        self.general
    }

    pub fn system(&self) -> &'a S {
        self.system
    }

    pub fn halt(&self) -> &'a H {
        self.halt
    }

    /// Register an ACL for `box_id`, halting the system if it is rejected.
    pub fn acl_add(&self, box_id: u8, start: usize, size: usize, flags: AclFlags) {
        if let Err(err) = self.try_acl_add(box_id, start, size, flags) {
            halt::halt_on(self.halt, err);
        }
    }

    pub fn try_acl_add(
        &self,
        box_id: u8,
        start: usize,
        size: usize,
        flags: AclFlags,
    ) -> Result<(), VmpuError> {
        let id = BoxId::new(usize::from(box_id))
            .ok_or(VmpuError::BoxOutOfRange(usize::from(box_id)))?;

        if !acl::is_aligned(start) {
            return Err(VmpuError::UnalignedStart(start));
        }

        let size = if flags.contains(AclFlags::SIZE_ROUND_DOWN) {
            acl::round_down(size)
        } else if flags.contains(AclFlags::SIZE_ROUND_UP) {
            acl::round_up(size).ok_or(VmpuError::Rejected(ErrorCode::Unaligned))?
        } else {
            size
        };

        if CONFIG.debug_acls {
            log::debug!(
                "\t@{:#010X} size={:06} acl={:#06X} [{}]",
                start,
                size,
                flags.bits(),
                memory_map::name_of(self.memory_map, start)
            );
        }

        let result = match flags.kind() {
            AclKind::Peripheral => self.peripheral.add(id, start, size, flags),
            AclKind::General => self.general.add(id, start, size, flags),
        };
        result.map_err(|code| match code {
            ErrorCode::UnhandledArea => VmpuError::UnhandledArea,
            code => VmpuError::Rejected(code),
        })
    }

    /// Switch the enforced ACLs from `src` to `dst`, halting on failure.
    pub fn switch(&self, src: BoxId, dst: BoxId) {
        if let Err(err) = self.try_switch(src, dst) {
            halt::halt_on(self.halt, err);
        }
    }

    /// Activate `dst` in both tables as one step.
    ///
    /// If the general table fails, the peripheral table is put back to the box
    /// it enforced before, or programmed empty if there was none, so the two
    /// tables never disagree once this returns. `src` is only used for
    /// tracing.
    pub fn try_switch(&self, src: BoxId, dst: BoxId) -> Result<(), VmpuError> {
        if CONFIG.trace_switches {
            log::trace!("switch box {} -> {}", src, dst);
        }

        let previous = self.peripheral.active_box();
        self.peripheral
            .activate(dst)
            .map_err(|code| VmpuError::SwitchFailed { dst, code })?;

        if let Err(code) = self.general.activate(dst) {
            match previous {
                Some(previous) => {
                    if let Err(rollback) = self.peripheral.activate(previous) {
                        log::error!(
                            "peripheral rollback to box {} failed [{}]",
                            previous,
                            rollback
                        );
                        self.peripheral.deactivate();
                    }
                }
                None => self.peripheral.deactivate(),
            }
            return Err(VmpuError::SwitchFailed { dst, code });
        }
        Ok(())
    }

    /// Load the ACLs of a box at bring-up, halting on failure.
    pub fn load_box(&self, box_id: u8) {
        if let Err(err) = self.try_load_box(box_id) {
            halt::halt_on(self.halt, err);
        }
    }

    /// Only the main box can be loaded. Boot already activated its general
    /// memory, so that half only changes if ACLs were added for it since.
    pub fn try_load_box(&self, box_id: u8) -> Result<(), VmpuError> {
        if box_id != 0 {
            return Err(VmpuError::LoadNotImplemented(box_id));
        }
        let id = BoxId::MAIN;
        self.try_switch(id, id)?;
        log::info!("box {} loaded", id);
        Ok(())
    }

    /// The box whose code is running.
    pub fn active_box(&self) -> Option<BoxId> {
        self.general
            .active_box()
            .or_else(|| self.peripheral.active_box())
    }

    /// The ACL of `box_id` granting `access` to `[address, address + len)`,
    /// looked up in the table responsible for `address`.
    pub fn lookup(
        &self,
        box_id: BoxId,
        address: usize,
        len: usize,
        access: Access,
    ) -> Option<AclEntry> {
        if self.peripheral.handles(address) {
            self.peripheral.lookup(box_id, address, len, access)
        } else {
            self.general.lookup(box_id, address, len, access)
        }
    }

    pub fn security_violation(&self) -> bool {
        self.peripheral.security_violation() || self.general.security_violation()
    }

    pub fn clear_security_violation(&self) {
        self.peripheral.clear_security_violation();
        self.general.clear_security_violation();
    }

    /// Current fill level of both tables.
    pub fn mark(&self) -> Mark {
        Mark {
            peripheral: self.peripheral.mark(),
            general: self.general.mark(),
        }
    }

    /// Drop every ACL added to either table since `mark`.
    pub fn rollback(&self, mark: Mark) {
        self.peripheral.truncate(mark.peripheral);
        self.general.truncate(mark.general);
    }
}
