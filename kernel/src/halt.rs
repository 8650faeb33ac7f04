// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Fatal conditions and the primitive that stops the system.
//!
//! There is no partial-degradation mode: every error the monitor detects ends
//! in [`Halt::halt`], which never returns. The only exception is a permitted
//! bus access that can be emulated, which is not an error at all.

use core::fmt;

use thiserror::Error;

use crate::acl::BoxId;
use crate::errorcode::ErrorCode;

/// The kind of a fatal condition, reported by the halt primitive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HaltKind {
    /// A setup-time call received malformed input, or an internal invariant
    /// was violated.
    SanityCheckFailed,
    /// An access or request is not permitted.
    NotAllowed,
    /// The operation only exists as a stub on this hardware.
    NotImplemented,
    FaultMemManage,
    FaultBus,
    FaultUsage,
    FaultHard,
    FaultDebug,
}

impl HaltKind {
    /// Stable numeric code of the kind, e.g. the number of blinks of a status
    /// LED.
    pub const fn code(self) -> u8 {
        match self {
            HaltKind::FaultMemManage => 1,
            HaltKind::FaultBus => 2,
            HaltKind::FaultUsage => 3,
            HaltKind::FaultHard => 4,
            HaltKind::FaultDebug => 5,
            HaltKind::NotAllowed => 6,
            HaltKind::SanityCheckFailed => 7,
            HaltKind::NotImplemented => 8,
        }
    }
}

impl fmt::Display for HaltKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The system-wide fatal-halt primitive.
///
/// Implementations typically signal the kind on an indicator and spin forever.
pub trait Halt {
    fn halt(&self, kind: HaltKind, diagnostic: fmt::Arguments<'_>) -> !;
}

/// Failures of monitor operations.
///
/// Each variant maps to exactly one [`HaltKind`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum VmpuError {
    #[error("box ID out of range ({0})")]
    BoxOutOfRange(usize),

    #[error("ACL start address is not aligned [{0:#010X}]")]
    UnalignedStart(usize),

    #[error("main box requested context ({context}) or stack ({stack}) memory")]
    MainBoxAllocation { context: usize, stack: usize },

    #[error("box {0} already has a stack")]
    BoxAlreadySetUp(BoxId),

    #[error("box memory arena exhausted")]
    ArenaExhausted,

    #[error("ACL in unhandled memory area")]
    UnhandledArea,

    #[error("ACL sanity check failed [{0}]")]
    Rejected(ErrorCode),

    #[error("box switch to {dst} failed [{code}]")]
    SwitchFailed { dst: BoxId, code: ErrorCode },

    #[error("currently only box 0 can be loaded (requested {0})")]
    LoadNotImplemented(u8),
}

impl VmpuError {
    /// The halt kind reported when this error stops the system.
    pub const fn halt_kind(&self) -> HaltKind {
        match self {
            VmpuError::BoxOutOfRange(_)
            | VmpuError::UnalignedStart(_)
            | VmpuError::MainBoxAllocation { .. }
            | VmpuError::BoxAlreadySetUp(_)
            | VmpuError::ArenaExhausted
            | VmpuError::Rejected(_)
            | VmpuError::SwitchFailed { .. } => HaltKind::SanityCheckFailed,
            VmpuError::UnhandledArea => HaltKind::NotAllowed,
            VmpuError::LoadNotImplemented(_) => HaltKind::NotImplemented,
        }
    }
}

/// Stop the system because of `err`.
pub fn halt_on<H: Halt + ?Sized>(halt: &H, err: VmpuError) -> ! {
    log::error!("halting: {}", err);
    halt.halt(err.halt_kind(), format_args!("{}", err))
}
