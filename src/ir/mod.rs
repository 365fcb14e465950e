//! Trace IR: types, opcodes, instructions, values and traces
//!
//! The IR is a typed, opcode-tagged instruction set in SSA form. Each
//! instruction produces at most one [`SsaTmp`] (labels may define several),
//! and every temporary carries a [`Type`] from a closed, bit-packed lattice.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`types`] | The type lattice |
//! | [`opcode`] | The instruction catalog and opcode queries |
//! | [`extra`] | Opcode-specific payloads and constant handles |
//! | [`instruction`], [`tmp`] | Instructions and SSA temporaries |
//! | [`typecheck`] | Destination typing, operand contracts, member-op effects |
//! | [`factory`] | The arena owning instructions and temporaries |
//! | [`trace`] | Traces, blocks and block-level passes |

pub mod extra;
pub mod factory;
pub mod instruction;
pub mod opcode;
pub mod print;
pub mod tmp;
pub mod trace;
pub mod typecheck;
pub mod types;

pub use extra::{
    ArrayId, ClassId, ConstData, ConstValue, ExtraData, ExtraKind, FuncId, LabelData, LocalId, MarkerData,
    NamedEntityId, RawMemSlot, StrId, Tca,
};
pub use factory::{GenArg, InstBuilder, IrFactory, StringTable};
pub use instruction::{InstId, Instruction, Label, RegSet};
pub use opcode::{cmp_op_types_may_reenter, DestRule, ExitKind, OpFlags, OpInfo, Opcode, SrcCheck, SrcContract, OPCODE_TABLE};
pub use print::{InstDisplay, TmpDisplay};
pub use tmp::{PhysReg, SpillInfo, SsaTmp, TmpId};
pub use trace::{
    build_blocks, check_cfg, number_instructions, remove_dead_instructions, Block, CfgError, Trace, TraceDisplay,
    TraceIndex,
};
pub use typecheck::{
    assert_operand_types, check_operand_types, output_type, vector_operands, KeyType, OperandTypeError, VectorEffects,
};
pub use types::{DataType, ParseTypeError, Type};
