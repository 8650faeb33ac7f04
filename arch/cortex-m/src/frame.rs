// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Trusted access to the exception frame of box code.

use core::mem;
use core::ptr::NonNull;

use kernel::platform::frame::{ExceptionFrame, FrameValidator};

/// Return to thread mode on the process stack, basic frame.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;
/// Return to thread mode on the process stack, extended (FPU) frame.
pub const EXC_RETURN_THREAD_PSP_FP: u32 = 0xFFFF_FFED;

/// Accepts only frames stacked by thread-mode code on the process stack.
///
/// A frame stacked on the main stack belongs to the monitor itself; a fault
/// there is never emulated.
pub struct ExcReturnValidator;

unsafe impl FrameValidator for ExcReturnValidator {
    fn validate_frame(&self, exc_return: u32, sp: usize) -> Option<NonNull<ExceptionFrame>> {
        if exc_return != EXC_RETURN_THREAD_PSP && exc_return != EXC_RETURN_THREAD_PSP_FP {
            return None;
        }
        if sp % mem::align_of::<ExceptionFrame>() != 0 {
            return None;
        }
        NonNull::new(sp as *mut ExceptionFrame)
    }
}
