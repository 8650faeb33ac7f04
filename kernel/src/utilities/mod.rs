// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Utility functions and macros provided by the kernel crate.

mod static_ref;

pub use self::static_ref::StaticRef;

/// Re-export the tock-register-interface library.
pub mod registers {
    pub use tock_registers::fields::{Field, FieldValue};
    pub use tock_registers::interfaces;
    pub use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
    pub use tock_registers::{register_bitfields, register_structs};
    pub use tock_registers::{LocalRegisterCopy, RegisterLongName};
}

/// Create an object with the given capability.
///
/// ```ignore
/// use kernel::capabilities::MemoryProtectionCapability;
/// use kernel::create_capability;
///
/// let cap = create_capability!(MemoryProtectionCapability);
/// ```
///
/// This helper macro cannot be called from `#![forbid(unsafe_code)]` crates,
/// and is used by trusted board code to obtain a capability that it can pass
/// to the monitor.
#[macro_export]
macro_rules! create_capability {
    ($T:ty $(,)?) => {{
        #[allow(dead_code)]
        struct Cap;
        #[allow(unsafe_code)]
        unsafe impl $T for Cap {}
        Cap
    }};
}
