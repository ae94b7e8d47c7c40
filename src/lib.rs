pub mod navigation;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a navigation statistic every 100 ticks when `perf_stats` is enabled.
///
/// `$tick` is anything with a `.0: u64` field (normally [`SimTick`](navigation::SimTick)).
/// Without the feature the macro expands to nothing and its arguments are
/// never evaluated.
///
/// ```ignore
/// profile_log!(tick, "[FLOW_FIELD] {} layers rebuilt", rebuilt);
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {
        if $tick.0 % 100 == 0 {
            bevy::log::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {};
}
