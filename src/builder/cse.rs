//! Common-subexpression tables
//!
//! Entries are keyed by everything that makes two instructions compute the
//! same value: opcode, type parameter, sources, extra data and branch
//! target. Killing a table drops every entry.

use crate::ir::{ExtraData, Instruction, Label, Opcode, TmpId, Type};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CseKey {
    op: Opcode,
    type_param: Type,
    srcs: Vec<TmpId>,
    extra: Option<ExtraData>,
    taken: Option<Label>,
}

impl CseKey {
    fn of(inst: &Instruction) -> Self {
        Self {
            op: inst.op(),
            type_param: inst.type_param(),
            srcs: inst.srcs().to_vec(),
            extra: inst.extra().copied(),
            taken: inst.taken(),
        }
    }
}

/// Values of previously emitted pure instructions
#[derive(Debug, Default)]
pub struct CseHash {
    map: FxHashMap<CseKey, TmpId>,
}

impl CseHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, inst: &Instruction) -> Option<TmpId> {
        self.map.get(&CseKey::of(inst)).copied()
    }

    /// Records the destination of a committed instruction.
    pub fn insert(&mut self, inst: &Instruction) {
        let Some(dst) = inst.dst() else {
            return;
        };
        self.map.insert(CseKey::of(inst), dst);
    }

    /// Invalidates every entry, as after a call.
    pub fn kill(&mut self) {
        self.map.clear();
    }

    /// Resets the table before a replay.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_ir;
    use crate::ir::{ConstData, IrFactory};

    #[test]
    fn test_lookup_kill_and_clear() {
        let mut factory = IrFactory::with_operand_checks(true);
        let c1 = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(1i64));
        let c2 = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(2i64));

        let mut table = CseHash::new();
        table.insert(factory.inst(c1));
        assert_eq!(table.lookup(factory.inst(c1)), factory.inst(c1).dst());
        assert_eq!(table.lookup(factory.inst(c2)), None);
        assert_eq!(table.len(), 1);

        table.kill();
        assert_eq!(table.lookup(factory.inst(c1)), None);
        assert!(table.is_empty());

        table.insert(factory.inst(c2));
        assert_eq!(table.len(), 1);
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_kill_frees_entries() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut table = CseHash::new();
        for round in 0..4i64 {
            for v in 0..8i64 {
                let c = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(round * 8 + v));
                table.insert(factory.inst(c));
            }
            assert_eq!(table.len(), 8);
            table.kill();
            assert_eq!(table.map.len(), 0);
        }
    }

    #[test]
    fn test_key_includes_type_param() {
        let mut factory = IrFactory::with_operand_checks(true);
        let a = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(0i64));
        let b = gen_ir!(factory, Opcode::DefConst, Type::BOOL, ConstData::new(false));
        let mut table = CseHash::new();
        table.insert(factory.inst(a));
        assert_eq!(table.lookup(factory.inst(b)), None);
    }
}
