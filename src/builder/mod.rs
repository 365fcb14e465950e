//! Trace construction
//!
//! A [`TraceBuilder`] turns a stream of VM-level operations into one main
//! [`Trace`] plus its exit traces. Every instruction goes through the same
//! pipeline before it is committed:
//!
//! 1. copy propagation of its sources,
//! 2. a CSE lookup (constants and other pure instructions use separate tables),
//! 3. the [`simplifier`],
//! 4. commit: clone into the arena, link into the trace, update the
//!    [`TrackedState`].
//!
//! The `gen_*` helpers in [`helpers`](self) thread the implicit frame and
//! stack pointers and pick opcodes; callers normally use those rather than
//! [`gen_ir!`](crate::gen_ir) directly.

mod cse;
mod helpers;
pub mod simplifier;
mod stack;
mod state;

pub use cse::CseHash;
pub use stack::{get_stack_value, StackValue};
pub use state::{LocalState, TrackedState};

use crate::config::JitConfig;
use crate::gen_ir;
use crate::ir::{
    assert_operand_types, ConstData, ConstValue, ExitKind, FuncId, InstBuilder, InstId, Instruction, IrFactory, Label,
    LocalId, Opcode, TmpId, Trace, Type,
};
use tracing::{debug, trace};

/// The function a trace is built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub id: FuncId,
    /// Names of the function's locals, indexed by local id
    pub local_names: Vec<String>,
}

impl FuncInfo {
    pub fn new(id: FuncId) -> Self {
        Self {
            id,
            local_names: Vec::new(),
        }
    }

    pub fn with_locals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn local_name(&self, id: LocalId) -> Option<&str> {
        self.local_names.get(id.index()).map(String::as_str)
    }
}

/// Whether [`TraceBuilder::optimize_inst`] commits a copy of the
/// instruction or the arena instruction it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloneMode {
    Clone,
    UseInst(InstId),
}

pub struct TraceBuilder {
    factory: IrFactory,
    config: JitConfig,
    func: FuncInfo,
    initial_bc_off: u32,
    trace: Trace,
    state: TrackedState,
    cur_func: TmpId,
    cse_hash: CseHash,
    const_table: CseHash,
    enable_cse: bool,
    enable_simplification: bool,
    /// Depth of nested `gen` calls, for trace output
    depth: usize,
}

/// The destination of an instruction that must produce one.
#[track_caller]
fn value(result: Option<TmpId>) -> TmpId {
    match result {
        Some(tmp) => tmp,
        None => panic!("instruction produced no value"),
    }
}

impl TraceBuilder {
    /// Starts a main trace at `bc_off` whose stack pointer sits `sp_offset`
    /// cells above the frame pointer.
    pub fn new(func: FuncInfo, bc_off: u32, sp_offset: i32, config: JitConfig) -> Self {
        assert!(sp_offset >= 0, "negative initial stack offset: {}", sp_offset);
        let mut factory = IrFactory::with_operand_checks(config.check_operand_types);
        let label = factory.def_label(Some(func.id), 0);
        let trace = Trace::new(label, bc_off, true);

        let cur_func = gen_ir!(factory, Opcode::DefConst, Type::FUNC, ConstData::new(func.id));
        let mut const_table = CseHash::new();
        if config.cse_enabled() {
            const_table.insert(factory.inst(cur_func));
        }
        let cur_func = value(factory.inst(cur_func).dst());

        let mut tb = Self {
            factory,
            func,
            initial_bc_off: bc_off,
            trace,
            state: TrackedState::new(sp_offset),
            cur_func,
            cse_hash: CseHash::new(),
            const_table,
            enable_cse: config.cse_enabled(),
            enable_simplification: config.simplification_enabled(),
            config,
            depth: 0,
        };
        tb.gen_def_fp();
        tb.gen_def_sp(sp_offset);
        debug!(target: "hhir::builder", func = %tb.func.id, bc_off, sp_offset, "trace started");
        tb
    }

    // ==================== Accessors ====================

    pub fn factory(&self) -> &IrFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut IrFactory {
        &mut self.factory
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn func(&self) -> &FuncInfo {
        &self.func
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn state(&self) -> &TrackedState {
        &self.state
    }

    /// The `DefConst` holding the current function.
    pub fn cur_func(&self) -> TmpId {
        self.cur_func
    }

    pub fn sp(&self) -> TmpId {
        match self.state.sp() {
            Some(sp) => sp,
            None => panic!("stack pointer is not defined"),
        }
    }

    pub fn fp(&self) -> TmpId {
        match self.state.fp() {
            Some(fp) => fp,
            None => panic!("frame pointer is not defined"),
        }
    }

    pub fn sp_offset(&self) -> i32 {
        self.state.sp_offset()
    }

    pub fn local_type(&self, id: LocalId) -> Option<Type> {
        self.state.local_type(id)
    }

    pub fn local_value(&self, id: LocalId) -> Option<TmpId> {
        self.state.local_value(id)
    }

    pub fn is_this_available(&self) -> bool {
        self.state.is_this_available()
    }

    pub fn set_this_available(&mut self) {
        self.state.set_this_available();
    }

    pub fn set_enable_cse(&mut self, enable: bool) {
        self.enable_cse = enable;
    }

    pub fn set_enable_simplification(&mut self, enable: bool) {
        self.enable_simplification = enable;
    }

    /// Finishes building and hands out the trace and the arena owning its
    /// instructions.
    pub fn into_parts(self) -> (Trace, IrFactory) {
        (self.trace, self.factory)
    }

    // ==================== The pipeline ====================

    /// Checks and optimizes a transient instruction, committing it if it
    /// survives. Returns its value, or the value that replaced it.
    pub fn gen_inst(&mut self, inst: Instruction) -> Option<TmpId> {
        if self.factory.checks_operand_types() {
            assert_operand_types(&inst, &self.factory);
        }
        self.optimize_inst(inst, CloneMode::Clone)
    }

    fn optimize_inst(&mut self, inst: Instruction, mode: CloneMode) -> Option<TmpId> {
        self.depth += 1;
        let result = self.optimize_inst_nested(inst, mode);
        self.depth -= 1;
        result
    }

    fn optimize_inst_nested(&mut self, mut inst: Instruction, mode: CloneMode) -> Option<TmpId> {
        let depth = self.depth;
        trace!(target: "hhir::builder", depth, "{}", self.factory.display(&inst));

        simplifier::copy_prop(&self.factory, &mut inst);

        if self.enable_cse && self.factory.can_cse(&inst) {
            if let Some(tmp) = self.cse_table(inst.op()).lookup(&inst) {
                trace!(target: "hhir::cse", depth, op = %inst.op(), tmp = %tmp, "cse hit");
                return Some(tmp);
            }
        }

        if self.enable_simplification {
            if let Some(tmp) = simplifier::simplify(self, &mut inst) {
                return Some(tmp);
            }
            if inst.op() == Opcode::Nop {
                return None;
            }
        }

        let iid = match mode {
            CloneMode::Clone => self.factory.clone_inst(&inst),
            CloneMode::UseInst(iid) => {
                *self.factory.inst_mut(iid) = inst;
                iid
            }
        };
        self.append_instruction(iid);
        let inst = self.factory.inst(iid);
        if inst.has_dst() {
            inst.dst()
        } else {
            None
        }
    }

    fn cse_table(&mut self, op: Opcode) -> &mut CseHash {
        if op == Opcode::DefConst {
            &mut self.const_table
        } else {
            &mut self.cse_hash
        }
    }

    /// Links a committed instruction into the trace and applies its effects
    /// to the tracked state. `Nop` and `DefConst` are never linked.
    fn append_instruction(&mut self, iid: InstId) {
        let op = self.factory.inst(iid).op();
        if op != Opcode::Nop && op != Opcode::DefConst {
            self.trace.append(iid);
        }
        let inst = self.factory.inst(iid).clone();
        if self.state.update(&inst, &mut self.factory, &self.config.calling_convention) {
            self.cse_hash.kill();
        }
        if self.enable_cse && self.factory.can_cse(&inst) {
            self.cse_table(op).insert(&inst);
        }
    }

    /// Forgets all tracked state and non-constant CSE entries.
    fn clear_tracked_state(&mut self) {
        self.cse_hash.clear();
        self.state.clear();
        debug!(target: "hhir::builder", "tracked state cleared");
    }

    /// Replays the main trace through the pipeline from a clean state.
    ///
    /// An instruction whose replay yields a different value gets a `Mov`
    /// rebinding its old destination to that value.
    pub fn optimize_trace(&mut self) {
        self.enable_cse = self.config.cse_enabled();
        self.enable_simplification = self.config.simplification_enabled();
        if !self.enable_cse && !self.enable_simplification {
            return;
        }
        let instructions = self.trace.take_instructions();
        debug!(target: "hhir::builder", count = instructions.len(), "replaying trace");
        self.clear_tracked_state();

        for iid in instructions {
            let inst = self.factory.inst(iid).clone();
            let dst = inst.dst();
            let Some(result) = self.optimize_inst(inst, CloneMode::UseInst(iid)) else {
                continue;
            };
            if let Some(dst) = dst {
                if dst != result && self.factory.ty(dst) != Type::NONE {
                    let mov = self.factory.mov(dst, result);
                    self.append_instruction(mov);
                }
            }
        }
    }

    // ==================== Exits ====================

    /// Adds an empty exit trace anchored at `bc_off`.
    pub fn make_exit_trace(&mut self, bc_off: u32) -> Label {
        let label = self.factory.def_label(Some(self.func.id), 0);
        self.trace.add_exit(Trace::new(label, bc_off, false));
        debug!(target: "hhir::builder", bc_off, label = self.factory.label_id(label), "exit trace");
        label
    }

    /// Commits `inst` straight into an exit trace, bypassing the pipeline.
    fn append_to_exit(&mut self, exit: Label, inst: Instruction) -> Option<TmpId> {
        let iid = self.factory.gen_inst(inst);
        match self.trace.exit_mut(exit) {
            Some(trace) => trace.append(iid),
            None => panic!("L{} is not an exit trace", self.factory.label_id(exit)),
        }
        self.factory.inst(iid).dst()
    }

    /// Builds an exit trace that leaves the trace at `bc_off`.
    ///
    /// `opnds` are spilled first, after popping `stack_deficit` cells. A
    /// `NormalCc` exit also records where the not-taken path resumes.
    pub fn gen_exit_trace(
        &mut self,
        bc_off: u32,
        stack_deficit: i32,
        opnds: &[TmpId],
        kind: ExitKind,
        not_taken_bc_off: Option<u32>,
    ) -> Label {
        let exit = self.make_exit_trace(bc_off);
        let stack_off = self.sp_offset() + opnds.len() as i32 - stack_deficit;
        self.gen_marker(bc_off, stack_off);

        let mut sp = self.sp();
        if !opnds.is_empty() || stack_deficit != 0 {
            let deficit = self.gen_def_const(i64::from(stack_deficit));
            let mut srcs = vec![sp, deficit];
            srcs.extend_from_slice(opnds);
            let mut builder = InstBuilder::new(Opcode::SpillStack);
            builder.arg(srcs);
            sp = value(self.append_to_exit(exit, builder.finish()));
        }

        let pc = self.gen_def_const(i64::from(bc_off));
        let mut srcs = vec![self.cur_func, pc, sp, self.fp()];
        match (kind, not_taken_bc_off) {
            (ExitKind::NormalCc, Some(not_taken)) => srcs.push(self.gen_def_const(i64::from(not_taken))),
            (ExitKind::NormalCc, None) => panic!("a NormalCc exit needs a not-taken offset"),
            (_, None) => {}
            (_, Some(_)) => panic!("only NormalCc exits take a not-taken offset"),
        }
        let mut builder = InstBuilder::new(kind.opcode());
        builder.arg(srcs);
        self.append_to_exit(exit, builder.finish());
        exit
    }

    /// Exit taken when a guard at the start of the trace fails.
    pub fn gen_exit_guard_failure(&mut self, bc_off: u32) -> Label {
        let exit = self.make_exit_trace(bc_off);
        let stack_off = self.sp_offset();
        self.gen_marker(bc_off, stack_off);
        let pc = self.gen_def_const(i64::from(bc_off));
        let srcs = vec![self.cur_func, pc, self.sp(), self.fp()];
        let mut builder = InstBuilder::new(ExitKind::GuardFailure.opcode());
        builder.arg(srcs);
        self.append_to_exit(exit, builder.finish());
        exit
    }

    /// Exit to a slow path. An exit back to the trace's first bytecode makes
    /// no progress and is marked as such.
    pub fn get_exit_slow_trace(&mut self, bc_off: u32, stack_deficit: i32, opnds: &[TmpId]) -> Label {
        let kind = if bc_off == self.initial_bc_off {
            ExitKind::SlowNoProgress
        } else {
            ExitKind::Slow
        };
        self.gen_exit_trace(bc_off, stack_deficit, opnds, kind, None)
    }

    /// Ends the main trace, continuing at `next_pc`.
    pub fn gen_trace_end(&mut self, next_pc: u32) {
        let pc = self.gen_def_const(i64::from(next_pc));
        let (func, sp, fp) = (self.cur_func, self.sp(), self.fp());
        gen_ir!(self, ExitKind::Normal.opcode(), func, pc, sp, fp);
    }

    // ==================== Control flow ====================

    /// Builds a diamond inside the main trace.
    ///
    /// `branch` emits a conditional jump to the label it is given; `next`
    /// and `taken` emit the two arms and return their values. Returns the
    /// merged value, typed as the union of both arms. CSE is off while the
    /// arms are built.
    pub fn if_else<B, N, T>(&mut self, branch: B, next: N, taken: T) -> TmpId
    where
        B: FnOnce(&mut Self, Label),
        N: FnOnce(&mut Self) -> TmpId,
        T: FnOnce(&mut Self) -> TmpId,
    {
        let func = Some(self.func.id);
        let taken_label = self.factory.def_label(func, 0);
        let done_label = self.factory.def_label(func, 1);
        let saved_cse = self.enable_cse;
        self.enable_cse = false;

        branch(self, taken_label);
        let v1 = next(self);
        gen_ir!(self, Opcode::Jmp, done_label, v1);
        self.append_instruction(taken_label.inst());
        let v2 = taken(self);
        gen_ir!(self, Opcode::Jmp, done_label, v2);
        self.append_instruction(done_label.inst());

        self.enable_cse = saved_cse;
        let result = self.factory.inst(done_label.inst()).dsts()[0];
        let merged = Type::union_of(self.factory.ty(v1), self.factory.ty(v2));
        self.factory.tmp_mut(result).retype(merged);
        result
    }

    // ==================== Constants ====================

    pub fn gen_def_const<T: ConstValue>(&mut self, value: T) -> TmpId {
        let ty = value.const_type();
        self::value(gen_ir!(self, Opcode::DefConst, ty, ConstData::new(value)))
    }

    /// A constant of a type with a single value, such as `Uninit`.
    pub fn gen_def_const_of_type(&mut self, ty: Type) -> TmpId {
        self::value(gen_ir!(self, Opcode::DefConst, ty, ConstData::from_raw(0)))
    }

    /// A constant that may be loaded from memory instead of encoded inline.
    pub fn gen_ld_const<T: ConstValue>(&mut self, value: T) -> TmpId {
        let ty = value.const_type();
        self::value(gen_ir!(self, Opcode::LdConst, ty, ConstData::new(value)))
    }

    /// An interned static string constant.
    pub fn gen_def_const_str(&mut self, s: &str) -> TmpId {
        let id = self.factory.intern(s);
        self.gen_def_const(id)
    }
}
