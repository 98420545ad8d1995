//! The pipeline tying parser, merger, CFG, and engine together.
//!
//! The collaborator is invoked twice: a trial load obtains every program's
//! verifier diagnostic, then the rewritten collection is handed back for
//! the real load. Between the two, each program is parsed, merged, split
//! into blocks, and instrumented; block indices are assigned globally
//! across the collection so all programs share one counter array.

use crate::blocklist::{coverage_map_spec, BlockList, CoverageMapSpec};
use crate::cfg::{self, Block};
use crate::consts::COVERAGE_MAP_NAME;
use crate::error::CoverageError;
use crate::instrument;
use crate::loader::{trial_load, CollectionLoader, LoadedCollection, ProgramSpec, ProgramType};
use crate::merger;
use crate::verifier;

use tracing::debug;

/// One rewritten program.
#[derive(Debug, Clone)]
pub struct InstrumentedProgram {
    /// The specification carrying the rewritten instruction stream, ready
    /// for the final load.
    pub spec: ProgramSpec,
    /// The program's blocks; indices are collection-global and name the
    /// counter slots in the coverage map.
    pub blocks: Vec<Block>,
}

/// A rewritten collection and the coverage-map parameters it requires.
#[derive(Debug, Clone)]
pub struct InstrumentedCollection {
    /// Rewritten programs in input order.
    pub programs: Vec<InstrumentedProgram>,
    /// Total block count across the collection.
    pub block_count: usize,
}

impl InstrumentedCollection {
    /// The coverage-map contract for this collection.
    pub fn map_spec(&self) -> CoverageMapSpec {
        coverage_map_spec(self.block_count)
    }

    /// A block list with no debug-info attribution yet: one empty inner
    /// array per block. Source-line attribution is the renderer's concern.
    pub fn empty_block_list(&self) -> BlockList {
        vec![Vec::new(); self.block_count]
    }
}

/// Instrument every program of a collection.
///
/// Fails on the first program that cannot be instrumented; a program is
/// never partially rewritten.
pub fn instrument_collection<L: CollectionLoader>(
    loader: &mut L,
    programs: &[ProgramSpec],
) -> Result<InstrumentedCollection, CoverageError> {
    for spec in programs {
        if spec.program_type == ProgramType::Unspecified {
            return Err(CoverageError::UnspecifiedProgramType(spec.name.clone()));
        }
    }

    let trial = trial_load(loader, programs)?;
    let result = instrument_from_logs(&trial, programs);
    trial.close();

    let collection = result?;
    debug!(
        programs = collection.programs.len(),
        blocks = collection.block_count,
        "instrumented collection"
    );

    Ok(collection)
}

fn instrument_from_logs<C: LoadedCollection>(
    trial: &C,
    programs: &[ProgramSpec],
) -> Result<InstrumentedCollection, CoverageError> {
    let mut instrumented = Vec::with_capacity(programs.len());
    let mut block_count = 0usize;

    for spec in programs {
        let log = trial
            .verifier_log(&spec.name)
            .ok_or_else(|| CoverageError::MissingVerifierLog(spec.name.clone()))?;

        let statements = verifier::parse_log(log);
        let merged = merger::merge_statements(&statements);

        let mut instructions = spec.instructions.clone();
        if let Some(first) = instructions.first_mut() {
            if first.symbol().is_none() {
                first.set_symbol(spec.name.clone());
            }
        }

        let mut blocks = cfg::build_blocks(instructions)?;
        for block in &mut blocks {
            block.index += block_count;
        }

        let mut rewritten = instrument::instrument_program(
            &mut blocks,
            &merged,
            &spec.name,
            &spec.func_params,
            COVERAGE_MAP_NAME,
        )?;
        instrument::resolve_references(&mut rewritten)?;

        block_count += blocks.len();

        let mut rewritten_spec = spec.clone();
        rewritten_spec.instructions = rewritten;
        instrumented.push(InstrumentedProgram {
            spec: rewritten_spec,
            blocks,
        });
    }

    Ok(InstrumentedCollection {
        programs: instrumented,
        block_count,
    })
}
