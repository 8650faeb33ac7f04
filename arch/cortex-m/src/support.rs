// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Special register access.

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline(always)]
/// Interrupt program status register.
pub fn ipsr() -> u32 {
    let ipsr: u32;
    unsafe {
        core::arch::asm!(
            "mrs {}, ipsr",
            out(reg) ipsr,
            options(nomem, nostack, preserves_flags)
        );
    }
    ipsr
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline(always)]
/// Process (unprivileged) stack pointer.
pub fn psp() -> usize {
    let psp: usize;
    unsafe {
        core::arch::asm!(
            "mrs {}, psp",
            out(reg) psp,
            options(nomem, nostack, preserves_flags)
        );
    }
    psp
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub fn ipsr() -> u32 {
    unimplemented!()
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub fn psp() -> usize {
    unimplemented!()
}
