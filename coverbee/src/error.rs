//! Error variants of the instrumentation pipeline.

use crate::consts::STACK_LEN;
use crate::loader::LoadError;

use std::io;
use thiserror::Error;

/// Errors produced while instrumenting a collection or collecting counters.
///
/// Malformed verifier-log lines are not errors: the parser degrades them to
/// [`crate::verifier::Statement::Unknown`] and keeps going. Everything below
/// propagates upward unrecovered; a program is either fully rewritten or
/// wholly reported as failed.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Trial or final load of the collection failed.
    #[error("loading collection: {0}")]
    Load(#[from] LoadError),

    /// A discovered function entry has no declared parameter count;
    /// instrumenting it would corrupt the frame.
    #[error("no parameter metadata for function `{0}`")]
    MissingFunctionInfo(String),

    /// A jump targets a raw offset or label outside the program.
    #[error("jump at raw offset {offset} targets unknown label `{label}`")]
    UnresolvedReference {
        /// Raw offset of the jump instruction.
        offset: usize,
        /// The label that did not resolve.
        label: String,
    },

    /// The reserved counter slots would fall outside the addressable stack.
    #[error("program `{program}` needs {needed} bytes of stack for counter slots, {STACK_LEN} available")]
    StackExhausted {
        /// Program being instrumented.
        program: String,
        /// Frame bytes required including the reserved slots.
        needed: i32,
    },

    /// A program's type must be resolved before loading.
    #[error("program `{0}` has unspecified type")]
    UnspecifiedProgramType(String),

    /// The trial load produced no diagnostic for a program.
    #[error("no verifier log for program `{0}`")]
    MissingVerifierLog(String),

    /// Reading the coverage map back failed.
    #[error("coverage map i/o")]
    MapIo(#[source] io::Error),

    /// Block-list (de)serialization failed.
    #[error("block list serialization")]
    BlockList(#[from] serde_json::Error),
}
