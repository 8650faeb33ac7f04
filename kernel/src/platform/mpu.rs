// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interface for configuring one memory protection domain.

use crate::acl::{AclEntry, AclFlags};

/// Unprivileged access rights, in the form most protection units encode them.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Permissions {
    ReadWriteExecute,
    ReadWriteOnly,
    ReadExecuteOnly,
    ReadOnly,
    ExecuteOnly,
}

impl Permissions {
    /// The unprivileged rights granted by `flags`, or `None` if box code gets
    /// no access at all.
    pub fn from_flags(flags: AclFlags) -> Option<Permissions> {
        let r = flags.contains(AclFlags::UREAD);
        let w = flags.contains(AclFlags::UWRITE);
        let x = flags.contains(AclFlags::UEXECUTE);
        match (r, w, x) {
            (true, true, true) => Some(Permissions::ReadWriteExecute),
            (true, true, false) => Some(Permissions::ReadWriteOnly),
            (true, false, true) => Some(Permissions::ReadExecuteOnly),
            (true, false, false) => Some(Permissions::ReadOnly),
            (false, _, true) => Some(Permissions::ExecuteOnly),
            // Write-only is not expressible; treat it as no access.
            (false, _, false) => None,
        }
    }
}

/// The generic trait that particular memory protection unit implementations
/// need to implement.
///
/// One implementation drives one protection domain, e.g. the peripheral
/// bridge or the system MPU. It has a small, fixed number of hardware slots;
/// the region table decides which entries go into them.
pub trait MPU {
    /// Enables the MPU for box code.
    ///
    /// This function must enable the permission restrictions on the various
    /// regions protected by the MPU. Once it returns, box code can reach no
    /// memory of the domain until `configure_mpu` grants some.
    fn enable_app_mpu(&self);

    /// Disables the MPU for box code.
    fn disable_app_mpu(&self);

    /// Returns the number of slots available for box and default entries.
    fn number_total_regions(&self) -> usize;

    /// Configures the MPU with the provided entries.
    ///
    /// Every slot beyond `regions.len()` must be left disabled, so that an
    /// implementation never enforces entries of a box that is not active.
    /// Memory not covered by a configured entry must be inaccessible to box
    /// code.
    fn configure_mpu(&self, regions: &[AclEntry]);

    /// Whether the hardware flagged the last bus fault as an access rights
    /// violation rather than a plain bus error.
    fn security_violation(&self) -> bool {
        false
    }

    /// Forget a violation flagged for a bus fault that has been handled.
    fn clear_security_violation(&self) {}
}

/// Implement default MPU trait for unit: a domain without protection hardware.
/// Nothing is ever programmed, so every access by box code is decided by fault
/// emulation.
impl MPU for () {
    fn enable_app_mpu(&self) {}

    fn disable_app_mpu(&self) {}

    fn number_total_regions(&self) -> usize {
        0
    }

    fn configure_mpu(&self, _regions: &[AclEntry]) {}
}
