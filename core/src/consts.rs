//! Tunable constants for the BlockScript core: arena page size, string pool
//! slot capacity, stack frame sentinel, and the default cycle/time budgets,
//! named here rather than hardcoded throughout the other modules.

/// Number of elements held per page in an [`crate::alloc::Arena`] before a
/// new page is appended.
pub const ARENA_PAGE_LEN: usize = 128;

/// Soft cap on identifier/string length enforced by the [`crate::strings`]
/// pool. Exceeding this is a compile error, not a panic -- unlike the
/// original C++ slab (which asserts), user-triggerable conditions should
/// never panic in this implementation.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Page size (in bytes) that the VM's stack RAM grows by.
pub const STACK_PAGE_SIZE: usize = 512;

/// Magic value written into every stack frame header. A mismatch on frame
/// teardown indicates stack corruption and is a fatal bug in the VM or
/// canonizer, never a user-triggerable error.
pub const FRAME_SENTINEL: u32 = 0xB10C_5C17;

/// Default maximum number of instructions a single [`crate::machine::Vm`]
/// run is allowed to execute before it's considered a runaway script.
pub const DEFAULT_MAX_CYCLE_COUNT: usize = 1_000_000;

/// Default wall-clock budget (milliseconds) for a single host-initiated
/// call, checked periodically during `Vm::run`. Only enforced in debug
/// builds, so a development build can catch a runaway script without
/// penalizing a release build's performance.
pub const DEFAULT_TIME_BUDGET_MS: u64 = 4_000;

/// How many instructions the VM executes between wall-clock samples, when
/// the time-budget guard is enabled.
pub const TIME_BUDGET_SAMPLE_INTERVAL: usize = 4_096;
