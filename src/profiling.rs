//! Profiling support via Tracy.
//!
//! Enabled with the `profiling` Cargo feature:
//!
//! ```bash
//! cargo test --features profiling
//! ```
//!
//! When profiling is disabled (the default), all macros compile to no-ops with
//! zero runtime overhead.
//!
//! ```ignore
//! use gpu_upload::profiling::{profile_scope, profile_plot};
//!
//! fn upload() {
//!     profile_scope!("upload");
//!     profile_plot!("upload_ring_pending_bytes", pending);
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, plot as tracy_plot, span};

/// Create a profiling span for the current scope.
///
/// The span automatically ends when the scope exits.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Plot a value over time in Tracy.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

pub use profile_plot;
pub use profile_scope;
