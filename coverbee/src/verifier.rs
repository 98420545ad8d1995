//! Parsing of the kernel verifier's textual diagnostic.
//!
//! The diagnostic is consumed line-oriented into a stream of [`Statement`]
//! values. Statements and the states they embed render back to the original
//! text modulo whitespace, so nothing the kernel reports is lost.

mod parse;
mod state;
mod statement;
mod value;

pub use parse::{parse_log, parse_state};
pub use state::{
    Liveness, RegisterEntry, SlotByte, SlotValue, StackEntry, StateEntry, VerifierState,
};
pub use statement::{
    BackTrack, LoggedInstruction, PrecisionTarget, Statement, VerifierStats,
};
pub use value::{Attr, AttrValue, BaseType, Contents, RegisterValue, Tnum, TypeModifier};
