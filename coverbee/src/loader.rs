//! The collaborator seam towards the object parser and kernel loader.
//!
//! Object-file parsing, relocation, and the load syscalls live outside this
//! crate; the pipeline only needs a way to load a collection of program
//! specifications and read back each program's verifier diagnostic. The
//! trial load runs at the highest log level and retries with a larger
//! buffer while the kernel reports that the diagnostic did not fit.

use coverbee_asm::Instruction;

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Default verifier log buffer for the first trial-load attempt.
pub const DEFAULT_LOG_SIZE: usize = 1 << 20;

/// Attempts before giving up on growing the log buffer.
pub const TRIAL_LOAD_ATTEMPTS: usize = 5;

/// errno-like code reported when the verifier log buffer is too small.
pub const ENOSPC: i32 = 28;

/// Verifier log level and buffer size for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Verifier log level, `0..=2`.
    pub log_level: u32,
    /// Verifier log buffer size in bytes.
    pub log_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            log_level: 0,
            log_size: DEFAULT_LOG_SIZE,
        }
    }
}

/// A failed load, carrying the errno-like code the loader reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (os error {errno})")]
pub struct LoadError {
    /// errno-like code.
    pub errno: i32,
    /// Human-readable description, typically ending in verifier output.
    pub message: String,
}

impl LoadError {
    /// Construct from a code and description.
    pub fn new(errno: i32, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }

    /// `true` when a larger log buffer may succeed.
    pub fn is_no_space(&self) -> bool {
        self.errno == ENOSPC
    }
}

/// Program type, mapped from the object section name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProgramType {
    /// Not yet resolved; must not reach the loader.
    #[default]
    Unspecified,
    /// `socket` sections.
    SocketFilter,
    /// `kprobe` sections.
    Kprobe,
    /// `kretprobe` sections.
    Kretprobe,
    /// `tc`/`classifier` sections.
    SchedCls,
    /// `action` sections.
    SchedAct,
    /// `tracepoint` sections.
    Tracepoint,
    /// `raw_tracepoint` sections.
    RawTracepoint,
    /// `xdp` sections.
    Xdp,
    /// `perf_event` sections.
    PerfEvent,
    /// `cgroup_skb` sections.
    CgroupSkb,
    /// `cgroup/sock` sections.
    CgroupSock,
    /// `sockops` sections.
    SockOps,
    /// `sk_skb` sections.
    SkSkb,
    /// `sk_msg` sections.
    SkMsg,
    /// `lsm` sections.
    Lsm,
}

/// Fixed section-prefix lexicon, matched longest-prefix so `kretprobe`
/// never resolves as `kprobe` plus garbage.
const SECTION_PREFIXES: &[(&str, ProgramType)] = &[
    ("socket", ProgramType::SocketFilter),
    ("kretprobe", ProgramType::Kretprobe),
    ("kprobe", ProgramType::Kprobe),
    ("classifier", ProgramType::SchedCls),
    ("tc", ProgramType::SchedCls),
    ("action", ProgramType::SchedAct),
    ("raw_tracepoint", ProgramType::RawTracepoint),
    ("raw_tp", ProgramType::RawTracepoint),
    ("tracepoint", ProgramType::Tracepoint),
    ("tp", ProgramType::Tracepoint),
    ("xdp", ProgramType::Xdp),
    ("perf_event", ProgramType::PerfEvent),
    ("cgroup_skb", ProgramType::CgroupSkb),
    ("cgroup/sock", ProgramType::CgroupSock),
    ("sockops", ProgramType::SockOps),
    ("sk_skb", ProgramType::SkSkb),
    ("sk_msg", ProgramType::SkMsg),
    ("lsm", ProgramType::Lsm),
];

impl ProgramType {
    /// Resolve a section name against the lexicon.
    pub fn from_section(section: &str) -> Self {
        SECTION_PREFIXES
            .iter()
            .filter(|(prefix, _)| section.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, program_type)| *program_type)
            .unwrap_or_default()
    }
}

/// Everything the loader needs for one program.
#[derive(Debug, Clone, Default)]
pub struct ProgramSpec {
    /// Program name; also the symbol of its first instruction.
    pub name: String,
    /// Resolved program type.
    pub program_type: ProgramType,
    /// License string attached at load time.
    pub license: String,
    /// The program's instructions.
    pub instructions: Vec<Instruction>,
    /// Declared parameter count per function entry symbol.
    pub func_params: BTreeMap<String, usize>,
}

/// A loaded collection of programs holding kernel resources.
pub trait LoadedCollection {
    /// The verifier diagnostic of one program, by name.
    fn verifier_log(&self, program: &str) -> Option<&str>;

    /// Release kernel resources.
    fn close(self);
}

/// The external VM-loader library.
pub trait CollectionLoader {
    /// Handle to a loaded collection.
    type Collection: LoadedCollection;

    /// Load the given specifications, observing `opts`.
    fn load(
        &mut self,
        programs: &[ProgramSpec],
        opts: &LoadOptions,
    ) -> Result<Self::Collection, LoadError>;
}

/// Load at the verbose log level, quadrupling the log buffer on a no-space
/// error up to [`TRIAL_LOAD_ATTEMPTS`] times. Any other error surfaces
/// as-is.
pub fn trial_load<L: CollectionLoader>(
    loader: &mut L,
    programs: &[ProgramSpec],
) -> Result<L::Collection, LoadError> {
    let mut opts = LoadOptions {
        log_level: 2,
        log_size: DEFAULT_LOG_SIZE,
    };

    for attempt in 1..TRIAL_LOAD_ATTEMPTS {
        match loader.load(programs, &opts) {
            Ok(collection) => return Ok(collection),
            Err(error) if error.is_no_space() => {
                debug!(
                    attempt,
                    log_size = opts.log_size,
                    "verifier log did not fit, growing buffer"
                );
                opts.log_size *= 4;
            }
            Err(error) => return Err(error),
        }
    }

    loader.load(programs, &opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_lexicon_longest_prefix() {
        assert_eq!(ProgramType::from_section("xdp"), ProgramType::Xdp);
        assert_eq!(ProgramType::from_section("xdp/ingress"), ProgramType::Xdp);
        assert_eq!(
            ProgramType::from_section("kretprobe/tcp_connect"),
            ProgramType::Kretprobe
        );
        assert_eq!(
            ProgramType::from_section("kprobe/tcp_connect"),
            ProgramType::Kprobe
        );
        assert_eq!(ProgramType::from_section("tc"), ProgramType::SchedCls);
        assert_eq!(
            ProgramType::from_section("tracepoint/syscalls/sys_enter"),
            ProgramType::Tracepoint
        );
        assert_eq!(
            ProgramType::from_section(".text"),
            ProgramType::Unspecified
        );
    }

    #[test]
    fn no_space_detection() {
        assert!(LoadError::new(ENOSPC, "log truncated").is_no_space());
        assert!(!LoadError::new(22, "invalid argument").is_no_space());
    }
}
