//! Persisting the block list and reading counters back.
//!
//! The block list is a JSON array with one inner array per coverage-map
//! block index; each inner entry describes a source line range using the
//! fixed whole-line conventions. Blocks with no debug-info origin serialize
//! as empty inner arrays.

use crate::consts::{COUNTER_LEN, COVERAGE_MAP_NAME};
use crate::error::CoverageError;

use serde::{Deserialize, Serialize};
use std::io;

/// Fixed start column marking whole-line coverage.
pub const WHOLE_LINE_START_COL: u32 = 2;

/// Fixed end column marking whole-line coverage.
pub const WHOLE_LINE_END_COL: u32 = 2000;

/// Fixed statement count marking whole-line coverage.
pub const WHOLE_LINE_NUM_STMT: u32 = 1;

/// One source line range attributed to a basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBlock {
    /// Source file path.
    #[serde(rename = "Filename")]
    pub filename: String,
    /// First covered line.
    #[serde(rename = "StartLine")]
    pub start_line: u32,
    /// Start column; fixed at [`WHOLE_LINE_START_COL`].
    #[serde(rename = "StartCol")]
    pub start_col: u32,
    /// Last covered line.
    #[serde(rename = "EndLine")]
    pub end_line: u32,
    /// End column; fixed at [`WHOLE_LINE_END_COL`].
    #[serde(rename = "EndCol")]
    pub end_col: u32,
    /// Statement count; fixed at [`WHOLE_LINE_NUM_STMT`].
    #[serde(rename = "NumStmt")]
    pub num_stmt: u32,
    /// Execution count, filled in at collection time.
    #[serde(rename = "Count")]
    pub count: u64,
}

impl ProfileBlock {
    /// A whole-line range with a zero count.
    pub fn whole_lines(filename: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            filename: filename.into(),
            start_line,
            start_col: WHOLE_LINE_START_COL,
            end_line,
            end_col: WHOLE_LINE_END_COL,
            num_stmt: WHOLE_LINE_NUM_STMT,
            count: 0,
        }
    }
}

/// The persisted block list; the outer index is the coverage-map block
/// index.
pub type BlockList = Vec<Vec<ProfileBlock>>;

/// Serialize a block list as JSON.
pub fn write_block_list<W: io::Write>(writer: W, list: &BlockList) -> Result<(), CoverageError> {
    serde_json::to_writer(writer, list)?;
    Ok(())
}

/// Deserialize a block list from JSON.
pub fn read_block_list<R: io::Read>(reader: R) -> Result<BlockList, CoverageError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Parameters of the shared coverage map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageMapSpec {
    /// Map name.
    pub name: &'static str,
    /// Key size in bytes.
    pub key_size: u32,
    /// Number of entries.
    pub max_entries: u32,
    /// Value size in bytes.
    pub value_size: u32,
}

/// The map contract for a collection with `block_count` blocks: a
/// single-entry array whose value is a contiguous run of 16-bit counters.
pub fn coverage_map_spec(block_count: usize) -> CoverageMapSpec {
    CoverageMapSpec {
        name: COVERAGE_MAP_NAME,
        key_size: 4,
        max_entries: 1,
        value_size: (COUNTER_LEN * (block_count + 1)) as u32,
    }
}

/// Host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// Probe the host byte order at runtime.
pub fn host_byte_order() -> ByteOrder {
    let probe = 1u16.to_ne_bytes();
    if probe[0] == 1 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

/// Decode the coverage-map value into per-block counters, honoring the
/// probed host byte order. A trailing odd byte is ignored.
pub fn decode_counters(value: &[u8]) -> Vec<u16> {
    let order = host_byte_order();

    value
        .chunks_exact(COUNTER_LEN)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            match order {
                ByteOrder::Little => u16::from_le_bytes(pair),
                ByteOrder::Big => u16::from_be_bytes(pair),
            }
        })
        .collect()
}

/// Reads the raw coverage-map value; implemented by the map collaborator.
pub trait CounterSource {
    /// The value bytes stored under `key`.
    fn read_value(&mut self, key: u32) -> io::Result<Vec<u8>>;
}

/// Read the counters back through the collaborator, key `0`.
pub fn collect_counters<S: CounterSource>(source: &mut S) -> Result<Vec<u16>, CoverageError> {
    let value = source.read_value(0).map_err(CoverageError::MapIo)?;
    Ok(decode_counters(&value))
}

/// Fill each block's ranges with its collected counter.
pub fn apply_counters(list: &mut BlockList, counters: &[u16]) {
    for (index, ranges) in list.iter_mut().enumerate() {
        let count = counters.get(index).copied().unwrap_or(0);
        for range in ranges {
            range.count = u64::from(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let mut list: BlockList = vec![
            vec![ProfileBlock::whole_lines("sample.c", 10, 14)],
            vec![],
        ];
        apply_counters(&mut list, &[7]);

        let json = serde_json::to_string(&list).expect("json");
        assert_eq!(
            json,
            "[[{\"Filename\":\"sample.c\",\"StartLine\":10,\"StartCol\":2,\"EndLine\":14,\"EndCol\":2000,\"NumStmt\":1,\"Count\":7}],[]]"
        );

        let back = read_block_list(json.as_bytes()).expect("list");
        assert_eq!(back, list);
    }

    #[test]
    fn map_contract() {
        let spec = coverage_map_spec(3);
        assert_eq!(spec.name, "coverbee_covermap");
        assert_eq!(spec.key_size, 4);
        assert_eq!(spec.max_entries, 1);
        assert_eq!(spec.value_size, 8);
    }

    #[test]
    fn counters_decode_in_native_order() {
        let counters = [1u16, 513, u16::MAX];
        let mut bytes = Vec::new();
        for counter in counters {
            bytes.extend_from_slice(&counter.to_ne_bytes());
        }

        assert_eq!(decode_counters(&bytes), counters.to_vec());
    }

    #[test]
    fn counters_read_back_through_the_source() {
        struct FixedSource(Vec<u8>);

        impl CounterSource for FixedSource {
            fn read_value(&mut self, key: u32) -> io::Result<Vec<u8>> {
                assert_eq!(key, 0);
                Ok(self.0.clone())
            }
        }

        let mut source = FixedSource(
            [3u16, 0, 9]
                .iter()
                .flat_map(|counter| counter.to_ne_bytes())
                .collect(),
        );
        let counters = collect_counters(&mut source).expect("counters");
        assert_eq!(counters, vec![3, 0, 9]);
    }

    #[test]
    fn map_read_failures_are_wrapped() {
        struct BrokenSource;

        impl CounterSource for BrokenSource {
            fn read_value(&mut self, _key: u32) -> io::Result<Vec<u8>> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
            }
        }

        match collect_counters(&mut BrokenSource) {
            Err(CoverageError::MapIo(error)) => {
                assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_counters_zero_out() {
        let mut list: BlockList = vec![
            vec![ProfileBlock::whole_lines("a.c", 1, 2)],
            vec![ProfileBlock::whole_lines("a.c", 3, 4)],
        ];
        apply_counters(&mut list, &[5]);

        assert_eq!(list[0][0].count, 5);
        assert_eq!(list[1][0].count, 0);
    }
}
