//! Source-level code coverage for kernel-resident byte-code programs.
//!
//! The crate rewrites compiled VM programs so that every basic block
//! increments a 16-bit counter in a shared coverage map, without disturbing
//! the original register or stack usage. Liveness facts are recovered from
//! the textual diagnostic the kernel verifier emits during a trial load:
//!
//! 1. [`verifier`] parses the diagnostic into a stream of statements;
//! 2. [`merger`] folds the stream into per-instruction register/stack
//!    observations;
//! 3. [`cfg`] splits each program into basic blocks linked by symbolic jump
//!    labels;
//! 4. [`instrument`] splices counter updates and per-function map lookups
//!    into the blocks, reusing only registers and slots proven dead.
//!
//! [`driver`] ties the pipeline together on top of the [`loader`]
//! collaborator that owns object parsing and kernel interaction.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod blocklist;
pub mod cfg;
pub mod consts;
pub mod driver;
pub mod error;
pub mod instrument;
pub mod loader;
pub mod merger;
pub mod verifier;

#[doc(no_inline)]
pub use coverbee_asm;

pub mod prelude {
    //! Required implementations for full functionality

    #[doc(no_inline)]
    pub use coverbee_asm::{Instruction, JumpKind, Opcode, OpcodeClass, RegisterId};

    pub use crate::{
        blocklist::{BlockList, ProfileBlock},
        cfg::{build_blocks, Block},
        driver::{instrument_collection, InstrumentedCollection, InstrumentedProgram},
        error::CoverageError,
        instrument::{instrument_program, resolve_references, FrameLayout},
        loader::{CollectionLoader, LoadError, LoadOptions, LoadedCollection, ProgramSpec, ProgramType},
        merger::{merge_statements, MergedState},
        verifier::{parse_log, Statement, VerifierState},
    };
}
