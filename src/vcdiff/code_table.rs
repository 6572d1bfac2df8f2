// VCDIFF default code table (RFC 3284, Section 5.6).
//
// Only the default table is supported; deltas that ship their own table
// (VCD_CODETABLE) are rejected while parsing the file header.

use std::sync::LazyLock;

/// Number of COPY address modes in the default cache: SELF, HERE, 4 NEAR, 3 SAME.
pub const COPY_MODES: u8 = 9;

/// Smallest COPY size that has a dedicated opcode.
const MIN_MATCH: u8 = 4;

/// First COPY mode addressed through the SAME cache.
const FIRST_SAME_MODE: u8 = 6;

/// Kind of one half of an opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstructionType {
    #[default]
    Noop,
    Add,
    Run,
    /// COPY with the given address mode (0..COPY_MODES).
    Copy(u8),
}

/// One half of a code table entry. A `size` of zero means the real size
/// follows as a varint in the instruction section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalfInstruction {
    pub kind: InstructionType,
    pub size: u8,
}

/// A single opcode: one or two instructions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub first: HalfInstruction,
    pub second: HalfInstruction,
}

impl CodeTableEntry {
    const fn single(kind: InstructionType, size: u8) -> Self {
        Self {
            first: HalfInstruction { kind, size },
            second: HalfInstruction {
                kind: InstructionType::Noop,
                size: 0,
            },
        }
    }

    const fn double(
        kind1: InstructionType,
        size1: u8,
        kind2: InstructionType,
        size2: u8,
    ) -> Self {
        Self {
            first: HalfInstruction {
                kind: kind1,
                size: size1,
            },
            second: HalfInstruction {
                kind: kind2,
                size: size2,
            },
        }
    }

    /// The non-NOOP halves of this opcode, in execution order.
    pub fn halves(&self) -> impl Iterator<Item = HalfInstruction> {
        [self.first, self.second]
            .into_iter()
            .filter(|half| half.kind != InstructionType::Noop)
    }
}

pub type CodeTable = [CodeTableEntry; 256];

/// Build the default RFC 3284 code table.
///
/// Layout:
///   0         RUN, size from stream
///   1..=18    ADD, sizes 0, 1..=17
///   19..=162  COPY, for each mode: size 0 then 4..=18
///   163..=246 ADD(1..=4) + COPY(4..=6 for SELF/HERE/NEAR, 4 for SAME)
///   247..=255 COPY(4) + ADD(1), one per mode
pub fn build_default_code_table() -> CodeTable {
    use InstructionType::{Add, Copy, Run};

    let mut table = [CodeTableEntry::default(); 256];
    let mut idx = 0usize;
    let mut push = |entry: CodeTableEntry| {
        table[idx] = entry;
        idx += 1;
    };

    push(CodeTableEntry::single(Run, 0));
    for size in 0..=17 {
        push(CodeTableEntry::single(Add, size));
    }

    for mode in 0..COPY_MODES {
        push(CodeTableEntry::single(Copy(mode), 0));
        for size in MIN_MATCH..=18 {
            push(CodeTableEntry::single(Copy(mode), size));
        }
    }

    for mode in 0..COPY_MODES {
        let copy_max = if mode < FIRST_SAME_MODE { 6 } else { MIN_MATCH };
        for add_size in 1..=4 {
            for copy_size in MIN_MATCH..=copy_max {
                push(CodeTableEntry::double(Add, add_size, Copy(mode), copy_size));
            }
        }
    }

    for mode in 0..COPY_MODES {
        push(CodeTableEntry::double(Copy(mode), MIN_MATCH, Add, 1));
    }

    debug_assert_eq!(idx, 256, "code table must have exactly 256 entries");
    table
}

/// The lazily built default code table.
pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_default_code_table);
    &TABLE
}
