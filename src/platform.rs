//! Platform abstraction layer for kernel operations.
//!
//! This module provides an abstraction over platform-specific operations
//! (time, CPU ID, CPU count) to allow testing in user space. A kernel port
//! supplies its own `PlatformOps` implementation behind the same interface.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Platform operations trait.
///
/// Abstracts over kernel-specific operations to enable mock testing.
pub trait PlatformOps {
    /// Get current monotonic time in nanoseconds.
    fn time_ns() -> u64;

    /// Get current CPU ID.
    fn cpu_id() -> u32;

    /// Get the number of online CPUs.
    fn cpu_count() -> u32;
}

// =============================================================================
// Mock Implementation (test environment / user-space simulation)
// =============================================================================

/// Mock time value for testing.
static MOCK_TIME_NS: AtomicU64 = AtomicU64::new(1_000_000_000); // 1 second

/// Mock CPU ID for testing.
static MOCK_CPU_ID: AtomicU32 = AtomicU32::new(0);

/// Mock CPU count for testing.
static MOCK_CPU_COUNT: AtomicU32 = AtomicU32::new(4);

/// Mock platform operations for testing.
pub struct MockPlatform;

impl PlatformOps for MockPlatform {
    fn time_ns() -> u64 {
        MOCK_TIME_NS.load(Ordering::Relaxed)
    }

    fn cpu_id() -> u32 {
        MOCK_CPU_ID.load(Ordering::Relaxed)
    }

    fn cpu_count() -> u32 {
        MOCK_CPU_COUNT.load(Ordering::Relaxed)
    }
}

/// Set mock time for testing.
pub fn set_mock_time(ns: u64) {
    MOCK_TIME_NS.store(ns, Ordering::Relaxed);
}

/// Advance mock time by given nanoseconds.
pub fn advance_mock_time(ns: u64) {
    MOCK_TIME_NS.fetch_add(ns, Ordering::Relaxed);
}

/// Set mock CPU ID for testing.
pub fn set_mock_cpu_id(id: u32) {
    MOCK_CPU_ID.store(id, Ordering::Relaxed);
}

/// Set mock CPU count for testing.
///
/// Per-CPU structures capture the CPU count at creation time, so this must
/// be called before the stores or channels under test are created.
pub fn set_mock_cpu_count(count: u32) {
    MOCK_CPU_COUNT.store(count.max(1), Ordering::Relaxed);
}

// =============================================================================
// Platform Type Alias
// =============================================================================

/// The active platform implementation.
pub type Platform = MockPlatform;

// =============================================================================
// Convenience Functions
// =============================================================================

/// Get current time in nanoseconds.
#[inline]
pub fn time_ns() -> u64 {
    Platform::time_ns()
}

/// Get current CPU ID.
#[inline]
pub fn cpu_id() -> u32 {
    Platform::cpu_id()
}

/// Get the number of online CPUs.
#[inline]
pub fn cpu_count() -> u32 {
    Platform::cpu_count()
}

// =============================================================================
// Tests
// =============================================================================
