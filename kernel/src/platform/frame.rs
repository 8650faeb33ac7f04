// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! The hardware exception stack frame.

use core::fmt;
use core::ptr::NonNull;

/// Registers pushed by the processor on exception entry, in stacking order.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// ICI/IT bits of the stacked xPSR.
const XPSR_IT_MASK: u32 = 0x0600_FC00;

impl ExceptionFrame {
    /// Stacked value of general purpose register `reg`, if it is part of the
    /// frame.
    pub fn register(&self, reg: u8) -> Option<u32> {
        match reg {
            0 => Some(self.r0),
            1 => Some(self.r1),
            2 => Some(self.r2),
            3 => Some(self.r3),
            12 => Some(self.r12),
            14 => Some(self.lr),
            _ => None,
        }
    }

    /// Overwrite stacked register `reg`. Returns `false` if `reg` is not part
    /// of the frame.
    pub fn set_register(&mut self, reg: u8, value: u32) -> bool {
        let slot = match reg {
            0 => &mut self.r0,
            1 => &mut self.r1,
            2 => &mut self.r2,
            3 => &mut self.r3,
            12 => &mut self.r12,
            14 => &mut self.lr,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Whether the interrupted instruction sits inside an IT block, in which
    /// case the PC cannot simply be advanced.
    pub fn in_it_block(&self) -> bool {
        self.xpsr & XPSR_IT_MASK != 0
    }
}

impl fmt::Display for ExceptionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\r\n  r0: {:#010X} r1: {:#010X} r2: {:#010X} r3: {:#010X}\
             \r\n  r12: {:#010X} lr: {:#010X} pc: {:#010X} xpsr: {:#010X}",
            self.r0, self.r1, self.r2, self.r3, self.r12, self.lr, self.pc, self.xpsr
        )
    }
}

/// Supplies the exception frame the monitor may trust.
///
/// ## Safety
///
/// A returned pointer must reference a valid, exclusively accessible
/// `ExceptionFrame` for the remainder of the current exception.
pub unsafe trait FrameValidator {
    /// Returns the frame stacked for an exception entered with `exc_return`
    /// while the unprivileged stack pointer was `sp`, or `None` if the frame
    /// cannot be trusted.
    fn validate_frame(&self, exc_return: u32, sp: usize) -> Option<NonNull<ExceptionFrame>>;
}
