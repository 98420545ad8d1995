/// Register ID type
pub type RegisterId = u8;

/// Register value type
pub type Word = u64;

/// Wire representation of a single instruction slot
pub type RawInstruction = u64;
