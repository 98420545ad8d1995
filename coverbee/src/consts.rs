//! Register and frame conventions of the kernel VM.

use coverbee_asm::RegisterId;

/// Register count, `R0..R10`.
pub const VM_REGISTER_COUNT: usize = 11;

/// Return-value register, clobbered by helper calls.
pub const REG_RET: RegisterId = 0;

/// First argument register; arguments live in `R1..R5`.
pub const REG_ARG_BASE: RegisterId = 1;

/// First callee-preserved register.
pub const REG_SAVED_BASE: RegisterId = 6;

/// Last callee-preserved register.
pub const REG_SAVED_LAST: RegisterId = 9;

/// Frame pointer; never written.
pub const REG_FP: RegisterId = 10;

/// Width of one stack slot, in bytes.
pub const STACK_SLOT_LEN: i32 = 8;

/// Stack bytes available to a single frame.
pub const STACK_LEN: i32 = 512;

/// Maximum number of byte-code function arguments.
pub const MAX_FUNC_ARGS: usize = 5;

/// Id of the map-lookup helper.
pub const HELPER_MAP_LOOKUP: i32 = 1;

/// Name of the shared coverage map.
pub const COVERAGE_MAP_NAME: &str = "coverbee_covermap";

/// Width of one block counter in the coverage map value, in bytes.
pub const COUNTER_LEN: usize = 2;
