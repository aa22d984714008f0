//! Resource lifecycle and script object identity for embedded game servers.
//!

pub use keystone_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use keystone_internal::prelude::*;
}
