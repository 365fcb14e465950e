//! Traces, basic blocks, and the small passes that run over them
//!
//! A [`Trace`] is a linear list of instruction ids that starts with its
//! label. The main trace owns its exit traces; exits never have exits of
//! their own. Instructions stay in the factory, a trace only orders them.
//!
//! [`build_blocks`] splits the main trace and its exits into basic blocks
//! and orders them in reverse post-order, which is the order every other
//! pass here walks.

use super::factory::IrFactory;
use super::instruction::{InstId, Label};
use super::opcode::Opcode;
use super::tmp::TmpId;
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// A single-entry, linear sequence of instructions
#[derive(Debug, Clone)]
pub struct Trace {
    bc_off: u32,
    is_main: bool,
    instructions: Vec<InstId>,
    exits: Vec<Trace>,
}

impl Trace {
    pub fn new(label: Label, bc_off: u32, is_main: bool) -> Self {
        Self {
            bc_off,
            is_main,
            instructions: vec![label.inst()],
            exits: Vec::new(),
        }
    }

    pub fn label(&self) -> Label {
        Label(self.instructions[0])
    }

    /// Bytecode offset this trace starts at.
    pub fn bc_off(&self) -> u32 {
        self.bc_off
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub fn instructions(&self) -> &[InstId] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn append(&mut self, inst: InstId) {
        self.instructions.push(inst);
    }

    /// Inserts `inst` right after the label.
    pub fn prepend(&mut self, inst: InstId) {
        self.instructions.insert(1, inst);
    }

    /// Moves the whole instruction list out, label included.
    pub(crate) fn take_instructions(&mut self) -> Vec<InstId> {
        std::mem::take(&mut self.instructions)
    }

    pub fn exits(&self) -> &[Trace] {
        &self.exits
    }

    pub fn add_exit(&mut self, exit: Trace) -> &mut Trace {
        debug_assert!(!exit.is_main, "a main trace cannot be an exit");
        self.exits.push(exit);
        let last = self.exits.len() - 1;
        &mut self.exits[last]
    }

    pub fn exit(&self, label: Label) -> Option<&Trace> {
        self.exits.iter().find(|t| t.label() == label)
    }

    pub fn exit_mut(&mut self, label: Label) -> Option<&mut Trace> {
        self.exits.iter_mut().find(|t| t.label() == label)
    }

    /// The trace at `index`, as used by [`Block::trace`].
    pub fn at(&self, index: TraceIndex) -> &Trace {
        match index {
            TraceIndex::Main => self,
            TraceIndex::Exit(i) => &self.exits[i],
        }
    }

    fn at_mut(&mut self, index: TraceIndex) -> &mut Trace {
        match index {
            TraceIndex::Main => self,
            TraceIndex::Exit(i) => &mut self.exits[i],
        }
    }

    /// This trace followed by its exits.
    pub fn traces(&self) -> impl Iterator<Item = (TraceIndex, &Trace)> {
        std::iter::once((TraceIndex::Main, self))
            .chain(self.exits.iter().enumerate().map(|(i, t)| (TraceIndex::Exit(i), t)))
    }

    /// Every instruction of this trace, then of each exit.
    pub fn all_instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.traces().flat_map(|(_, t)| t.instructions.iter().copied())
    }

    pub fn block_insts(&self, block: &Block) -> &[InstId] {
        &self.at(block.trace).instructions[block.range.clone()]
    }

    pub fn display<'a>(&'a self, factory: &'a IrFactory) -> TraceDisplay<'a> {
        TraceDisplay { factory, trace: self }
    }
}

/// Position of a trace relative to its main trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceIndex {
    Main,
    Exit(usize),
}

/// A maximal straight-line range of one trace's instructions.
///
/// Successor 0 is the fall-through block, successor 1 the branch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    trace: TraceIndex,
    range: Range<usize>,
    post_id: usize,
    is_join: bool,
    succ: [Option<usize>; 2],
}

impl Block {
    pub fn trace(&self) -> TraceIndex {
        self.trace
    }

    /// Instruction positions within the owning trace.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Post-order number; higher means earlier.
    pub fn post_id(&self) -> usize {
        self.post_id
    }

    /// Two or more predecessors.
    pub fn is_join(&self) -> bool {
        self.is_join
    }

    pub fn next(&self) -> Option<usize> {
        self.succ[0]
    }

    pub fn taken(&self) -> Option<usize> {
        self.succ[1]
    }

    /// Successor positions in the block list.
    pub fn succs(&self) -> impl Iterator<Item = usize> + '_ {
        self.succ.iter().flatten().copied()
    }
}

struct RawBlock {
    trace: TraceIndex,
    range: Range<usize>,
    succ: [Option<usize>; 2],
}

/// Splits the main trace and its exits into blocks, connects them, and
/// returns the blocks reachable from the main trace's label in reverse
/// post-order.
pub fn build_blocks(main: &Trace, factory: &IrFactory) -> Vec<Block> {
    let mut raw: Vec<RawBlock> = Vec::new();
    let mut label_block: FxHashMap<InstId, usize> = FxHashMap::default();

    for (index, trace) in main.traces() {
        let first = raw.len();
        let mut start = 0;
        for (pos, iid) in trace.instructions.iter().enumerate() {
            let inst = factory.inst(*iid);
            if inst.op() == Opcode::DefLabel && pos > start {
                raw.push(RawBlock { trace: index, range: start..pos, succ: [None; 2] });
                start = pos;
            }
            if inst.op() == Opcode::DefLabel {
                label_block.insert(*iid, raw.len());
            }
            if inst.is_control_flow() || inst.is_terminal() {
                raw.push(RawBlock { trace: index, range: start..pos + 1, succ: [None; 2] });
                start = pos + 1;
            }
        }
        if start < trace.instructions.len() {
            raw.push(RawBlock { trace: index, range: start..trace.instructions.len(), succ: [None; 2] });
        }
        let last = raw.len();
        for b in first..last {
            let inst = factory.inst(trace.instructions[raw[b].range.end - 1]);
            if !inst.is_terminal() && b + 1 < last {
                raw[b].succ[0] = Some(b + 1);
            }
        }
    }
    // Branch targets are resolved once every label is known.
    for b in 0..raw.len() {
        let inst = factory.inst(main.at(raw[b].trace).instructions[raw[b].range.end - 1]);
        if let Some(label) = inst.taken() {
            raw[b].succ[1] = label_block.get(&label.inst()).copied();
        }
    }

    let post = post_order(&raw);
    let mut position = vec![None; raw.len()];
    for (rpo, b) in post.iter().rev().enumerate() {
        position[*b] = Some(rpo);
    }
    let mut preds = vec![0usize; raw.len()];
    for b in &post {
        for s in raw[*b].succ.iter().flatten() {
            preds[*s] += 1;
        }
    }
    let n = post.len();
    post.iter()
        .rev()
        .enumerate()
        .map(|(rpo, b)| {
            let r = &raw[*b];
            Block {
                trace: r.trace,
                range: r.range.clone(),
                post_id: n - 1 - rpo,
                is_join: preds[*b] >= 2,
                succ: [r.succ[0].and_then(|s| position[s]), r.succ[1].and_then(|s| position[s])],
            }
        })
        .collect()
}

fn post_order(raw: &[RawBlock]) -> Vec<usize> {
    let mut order = Vec::with_capacity(raw.len());
    if raw.is_empty() {
        return order;
    }
    let mut visited = vec![false; raw.len()];
    // (block, next successor slot to visit)
    let mut stack = vec![(0usize, 0usize)];
    visited[0] = true;
    while let Some((b, slot)) = stack.pop() {
        if slot < 2 {
            stack.push((b, slot + 1));
            if let Some(s) = raw[b].succ[slot] {
                if !visited[s] {
                    visited[s] = true;
                    stack.push((s, 0));
                }
            }
        } else {
            order.push(b);
        }
    }
    order
}

/// Drops unreachable exit traces, then gives every remaining instruction a
/// linear id in block order and records use counts and last uses of every
/// temporary.
pub fn number_instructions(main: &mut Trace, factory: &mut IrFactory) -> Vec<Block> {
    let blocks = build_blocks(main, factory);
    let mut reached = vec![false; main.exits.len()];
    for block in &blocks {
        if let TraceIndex::Exit(i) = block.trace {
            reached[i] = true;
        }
    }
    let before = main.exits.len();
    let mut i = 0;
    main.exits.retain(|_| {
        let keep = reached[i];
        i += 1;
        keep
    });
    let blocks = if main.exits.len() != before {
        debug!(target: "hhir::trace", removed = before - main.exits.len(), "dropped unreachable exits");
        build_blocks(main, factory)
    } else {
        blocks
    };

    for block in &blocks {
        for iid in main.block_insts(block).to_vec() {
            for src in factory.inst(iid).srcs().to_vec() {
                let tmp = factory.tmp_mut(src);
                tmp.set_use_count(0);
                tmp.set_last_use_id(0);
            }
        }
    }

    let mut next_id = 0u32;
    for block in &blocks {
        for iid in main.block_insts(block).to_vec() {
            factory.inst_mut(iid).set_id(next_id);
            let srcs = factory.inst(iid).srcs().to_vec();
            for src in srcs {
                let tmp = factory.tmp_mut(src);
                tmp.inc_use_count();
                tmp.set_last_use_id(next_id);
            }
            next_id += 1;
        }
    }
    blocks
}

/// SSA property violations found by [`check_cfg`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    #[error("{tmp} is defined more than once (again by {inst})")]
    Redefined { tmp: TmpId, inst: InstId },

    #[error("{tmp} is used by {inst} before it is defined")]
    UseBeforeDef { tmp: TmpId, inst: InstId },
}

/// Checks that each temporary is defined once and before every use, walking
/// blocks in reverse post-order. Constants defined outside the trace count
/// as always available.
pub fn check_cfg(main: &Trace, factory: &IrFactory) -> Result<(), CfgError> {
    let blocks = build_blocks(main, factory);
    let mut defined = vec![false; factory.num_tmps()];
    for block in &blocks {
        for iid in main.block_insts(block) {
            let inst = factory.inst(*iid);
            for src in inst.srcs() {
                let linked_const = factory.producer(*src).op() == Opcode::DefConst;
                if !defined[src.index()] && !linked_const {
                    return Err(CfgError::UseBeforeDef { tmp: *src, inst: *iid });
                }
            }
            for dst in inst.dst().iter().chain(inst.dsts()) {
                if defined[dst.index()] {
                    return Err(CfgError::Redefined { tmp: *dst, inst: *iid });
                }
                defined[dst.index()] = true;
            }
        }
    }
    Ok(())
}

/// Removes every instruction that is neither essential nor feeds, directly
/// or transitively, an essential one. Returns the number removed.
pub fn remove_dead_instructions(main: &mut Trace, factory: &IrFactory) -> usize {
    let mut live = vec![false; factory.num_insts()];
    let mut worklist: Vec<InstId> = main
        .all_instructions()
        .filter(|iid| factory.inst(*iid).is_essential())
        .collect();
    for iid in &worklist {
        live[iid.index()] = true;
    }
    while let Some(iid) = worklist.pop() {
        for src in factory.inst(iid).srcs() {
            let producer = factory.tmp(*src).inst();
            if !live[producer.index()] {
                live[producer.index()] = true;
                worklist.push(producer);
            }
        }
    }

    let mut removed = 0;
    let indices: Vec<TraceIndex> = main.traces().map(|(i, _)| i).collect();
    for index in indices {
        let trace = main.at_mut(index);
        let before = trace.instructions.len();
        trace.instructions.retain(|iid| live[iid.index()]);
        removed += before - trace.instructions.len();
    }
    debug!(target: "hhir::trace", removed, "dead code removal");
    removed
}

/// Text form of a trace and its exits
pub struct TraceDisplay<'a> {
    factory: &'a IrFactory,
    trace: &'a Trace,
}

impl TraceDisplay<'_> {
    fn fmt_one(&self, trace: &Trace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for iid in &trace.instructions {
            let inst = self.factory.inst(*iid);
            if inst.op() != Opcode::DefLabel {
                f.write_str("  ")?;
            }
            writeln!(f, "{}", self.factory.display(inst))?;
        }
        Ok(())
    }
}

impl fmt::Display for TraceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_one(self.trace, f)?;
        for exit in &self.trace.exits {
            writeln!(f, "-------- exit at bc {} --------", exit.bc_off)?;
            self.fmt_one(exit, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_ir;
    use crate::ir::{ConstData, Type};

    fn int_const(factory: &mut IrFactory, v: i64) -> TmpId {
        let iid = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(v));
        factory.inst(iid).dst().unwrap()
    }

    /// label; a = Add; JmpZero a -> exit; ExitTrace
    /// exit: label; ExitSlow
    fn branchy(factory: &mut IrFactory) -> (Trace, TmpId) {
        let mut main = Trace::new(factory.def_label(None, 0), 0, true);
        let one = int_const(factory, 1);
        let two = int_const(factory, 2);
        let sum = gen_ir!(factory, Opcode::OpAdd, Type::INT, one, two);
        main.append(sum);
        let sum = factory.inst(sum).dst().unwrap();

        let mut exit = Trace::new(factory.def_label(None, 0), 10, false);
        exit.append(gen_ir!(factory, Opcode::ExitSlow, sum));
        let exit_label = exit.label();
        main.add_exit(exit);

        main.append(gen_ir!(factory, Opcode::JmpZero, exit_label, sum));
        main.append(gen_ir!(factory, Opcode::ExitTrace, sum));
        (main, sum)
    }

    #[test]
    fn test_blocks_and_successors() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (main, _) = branchy(&mut factory);
        let blocks = build_blocks(&main, &factory);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].trace(), TraceIndex::Main);
        assert_eq!(blocks[0].range(), 0..3);
        assert_eq!(blocks[0].succs().count(), 2);
        assert!(blocks.iter().all(|b| !b.is_join()));
        let exit = blocks.iter().find(|b| b.trace() == TraceIndex::Exit(0)).unwrap();
        assert_eq!(exit.succs().count(), 0);
        assert_eq!(blocks[0].post_id(), 2);
    }

    #[test]
    fn test_numbering_drops_unreachable_exits() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (mut main, sum) = branchy(&mut factory);
        let orphan = Trace::new(factory.def_label(None, 0), 20, false);
        main.add_exit(orphan);
        assert_eq!(main.exits().len(), 2);

        let blocks = number_instructions(&mut main, &mut factory);
        assert_eq!(main.exits().len(), 1);
        let ids: Vec<u32> = blocks
            .iter()
            .flat_map(|b| main.block_insts(b).to_vec())
            .map(|iid| factory.inst(iid).id())
            .collect();
        assert_eq!(ids, (0..ids.len() as u32).collect::<Vec<_>>());
        assert_eq!(factory.tmp(sum).use_count(), 3);
    }

    #[test]
    fn test_renumbering_recounts_uses() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (mut main, sum) = branchy(&mut factory);
        number_instructions(&mut main, &mut factory);
        let last_use = factory.tmp(sum).last_use_id();
        number_instructions(&mut main, &mut factory);
        assert_eq!(factory.tmp(sum).use_count(), 3);
        assert_eq!(factory.tmp(sum).last_use_id(), last_use);
    }

    #[test]
    fn test_check_cfg() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (mut main, sum) = branchy(&mut factory);
        assert_eq!(check_cfg(&main, &factory), Ok(()));

        let mov = factory.mov(sum, sum);
        main.prepend(mov);
        assert!(matches!(check_cfg(&main, &factory), Err(CfgError::UseBeforeDef { .. })));
    }

    #[test]
    fn test_remove_dead_instructions() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (mut main, sum) = branchy(&mut factory);
        let unused = gen_ir!(factory, Opcode::OpMul, Type::INT, sum, sum);
        main.prepend(unused);
        assert_eq!(remove_dead_instructions(&mut main, &factory), 1);
        assert!(!main.instructions().contains(&unused));
        assert_eq!(main.len(), 4);
    }

    #[test]
    fn test_display() {
        let mut factory = IrFactory::with_operand_checks(true);
        let (main, _) = branchy(&mut factory);
        let text = main.display(&factory).to_string();
        assert!(text.starts_with("(0) DefLabel L0:\n  (3) t2:Int = OpAdd<Int> t0:Int, t1:Int\n"));
        assert!(text.contains("-------- exit at bc 10 --------\n(4) DefLabel L1:\n"));
    }
}
