//! Arena factory for instructions and SSA temporaries
//!
//! The factory owns every [`Instruction`] and [`SsaTmp`] of one compilation
//! unit. Both live in index-addressed pools: ids are handed out in increasing
//! order and nothing is freed until the factory is dropped.
//!
//! Instructions are built from heterogeneous argument lists with
//! [`gen_ir!`](crate::gen_ir). Each argument is routed by its Rust type: a
//! [`Type`] becomes the type parameter, a [`Label`] the branch target, extra
//! data the payload, and [`TmpId`]s (single, slices or vectors) the sources.
//! Sources come last.

use super::extra::{ConstData, ConstValue, ExtraData, FuncId, LabelData, LocalId, MarkerData, StrId};
use super::instruction::{InstId, Instruction, Label};
use super::opcode::{cmp_op_types_may_reenter, OpFlags, Opcode};
use super::print::{InstDisplay, TmpDisplay};
use super::tmp::{SsaTmp, TmpId};
use super::typecheck::{assert_operand_types, output_type};
use super::types::Type;
use string_interner::{DefaultStringInterner, DefaultSymbol, Symbol};
use tracing::trace;

/// Builds one transient instruction from `gen_ir!` arguments.
pub struct InstBuilder {
    inst: Instruction,
    saw_srcs: bool,
}

impl InstBuilder {
    pub fn new(op: Opcode) -> Self {
        Self {
            inst: Instruction::new(op),
            saw_srcs: false,
        }
    }

    pub fn arg<A: GenArg>(&mut self, arg: A) -> &mut Self {
        arg.apply(self);
        self
    }

    fn non_src(&mut self) -> &mut Instruction {
        debug_assert!(!self.saw_srcs, "sources must come last in {}", self.inst.op());
        &mut self.inst
    }

    fn src(&mut self, tmp: TmpId) {
        self.saw_srcs = true;
        self.inst.append_src(tmp);
    }

    pub fn finish(self) -> Instruction {
        self.inst
    }
}

/// An argument accepted by [`gen_ir!`](crate::gen_ir).
pub trait GenArg {
    fn apply(self, builder: &mut InstBuilder);
}

impl GenArg for Type {
    fn apply(self, builder: &mut InstBuilder) {
        builder.non_src().set_type_param(self);
    }
}

impl GenArg for Label {
    fn apply(self, builder: &mut InstBuilder) {
        builder.non_src().set_taken(Some(self));
    }
}

impl GenArg for Option<Label> {
    fn apply(self, builder: &mut InstBuilder) {
        builder.non_src().set_taken(self);
    }
}

impl GenArg for ExtraData {
    fn apply(self, builder: &mut InstBuilder) {
        builder.non_src().set_extra(self);
    }
}

impl GenArg for LocalId {
    fn apply(self, builder: &mut InstBuilder) {
        ExtraData::Local(self).apply(builder);
    }
}

impl GenArg for ConstData {
    fn apply(self, builder: &mut InstBuilder) {
        ExtraData::Const(self).apply(builder);
    }
}

impl GenArg for MarkerData {
    fn apply(self, builder: &mut InstBuilder) {
        ExtraData::Marker(self).apply(builder);
    }
}

impl GenArg for TmpId {
    fn apply(self, builder: &mut InstBuilder) {
        builder.src(self);
    }
}

impl GenArg for &[TmpId] {
    fn apply(self, builder: &mut InstBuilder) {
        builder.saw_srcs = true;
        for tmp in self {
            builder.src(*tmp);
        }
    }
}

impl GenArg for &Vec<TmpId> {
    fn apply(self, builder: &mut InstBuilder) {
        self.as_slice().apply(builder);
    }
}

impl GenArg for Vec<TmpId> {
    fn apply(self, builder: &mut InstBuilder) {
        self.as_slice().apply(builder);
    }
}

/// Builds an instruction from a heterogeneous argument list and hands it to
/// `$sink.gen_inst(..)`.
///
/// ```ignore
/// let sum = gen_ir!(tb, Opcode::OpAdd, Type::INT, a, b);
/// ```
#[macro_export]
macro_rules! gen_ir {
    ($sink:expr, $op:expr $(, $arg:expr)* $(,)?) => {{
        let mut builder = $crate::ir::InstBuilder::new($op);
        $( builder.arg($arg); )*
        $sink.gen_inst(builder.finish())
    }};
}

/// Interned static strings
#[derive(Debug, Default)]
pub struct StringTable {
    interner: DefaultStringInterner,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StrId {
        StrId(self.interner.get_or_intern(s).to_usize() as u32)
    }

    pub fn resolve(&self, id: StrId) -> Option<&str> {
        DefaultSymbol::try_from_usize(id.0 as usize).and_then(|sym| self.interner.resolve(sym))
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

/// Owner of all instructions and temporaries of one compilation unit
#[derive(Debug)]
pub struct IrFactory {
    insts: Vec<Instruction>,
    tmps: Vec<SsaTmp>,
    next_label_id: u32,
    strings: StringTable,
    check_operand_types: bool,
}

impl IrFactory {
    pub fn new() -> Self {
        Self::with_operand_checks(cfg!(debug_assertions))
    }

    /// A factory that checks (or skips checking) every generated
    /// instruction against its catalog contract.
    pub fn with_operand_checks(check_operand_types: bool) -> Self {
        Self {
            insts: Vec::new(),
            tmps: Vec::new(),
            next_label_id: 0,
            strings: StringTable::new(),
            check_operand_types,
        }
    }

    pub fn checks_operand_types(&self) -> bool {
        self.check_operand_types
    }

    /// Checks a transient instruction and commits it to the arena.
    pub fn gen_inst(&mut self, inst: Instruction) -> InstId {
        if self.check_operand_types {
            assert_operand_types(&inst, self);
        }
        self.clone_inst(&inst)
    }

    /// Copies `inst` into the arena under a fresh id. Single-destination
    /// instructions get a fresh destination typed from the catalog.
    pub fn clone_inst(&mut self, inst: &Instruction) -> InstId {
        let iid = self.commit(inst.clone());
        if self.insts[iid.index()].has_dst() {
            let ty = output_type(&self.insts[iid.index()], self);
            let dst = self.new_tmp(iid, ty);
            self.insts[iid.index()].set_dst(Some(dst));
        }
        iid
    }

    fn commit(&mut self, mut inst: Instruction) -> InstId {
        let iid = InstId(self.insts.len() as u32);
        inst.set_iid(iid);
        inst.set_dst(None);
        inst.set_dsts(Vec::new());
        trace!(target: "hhir::factory", iid = iid.0, op = %inst.op(), "commit");
        self.insts.push(inst);
        iid
    }

    pub(crate) fn new_tmp(&mut self, inst: InstId, ty: Type) -> TmpId {
        let id = TmpId(self.tmps.len() as u32);
        self.tmps.push(SsaTmp::new(id, inst, ty));
        id
    }

    /// Defines a new label with `num_dsts` join values of unknown type.
    pub fn def_label(&mut self, func: Option<FuncId>, num_dsts: usize) -> Label {
        let label_id = self.next_label_id;
        self.next_label_id += 1;
        let mut inst = Instruction::new(Opcode::DefLabel);
        inst.set_extra(ExtraData::Label(LabelData { label_id, func }));
        let iid = self.commit(inst);
        let dsts = (0..num_dsts).map(|_| self.new_tmp(iid, Type::NONE)).collect();
        self.insts[iid.index()].set_dsts(dsts);
        Label(iid)
    }

    /// A `Mov` that rebinds an existing temporary `dst` to `src`.
    pub fn mov(&mut self, dst: TmpId, src: TmpId) -> InstId {
        let mut inst = Instruction::new(Opcode::Mov);
        inst.append_src(src);
        let iid = self.commit(inst);
        self.insts[iid.index()].set_dst(Some(dst));
        self.tmps[dst.index()].set_inst(iid);
        iid
    }

    // ==================== Access ====================

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.insts[id.index()]
    }

    pub fn tmp(&self, id: TmpId) -> &SsaTmp {
        &self.tmps[id.index()]
    }

    pub fn tmp_mut(&mut self, id: TmpId) -> &mut SsaTmp {
        &mut self.tmps[id.index()]
    }

    pub fn ty(&self, tmp: TmpId) -> Type {
        self.tmps[tmp.index()].ty()
    }

    /// The instruction producing `tmp`.
    pub fn producer(&self, tmp: TmpId) -> &Instruction {
        self.inst(self.tmp(tmp).inst())
    }

    pub fn label_id(&self, label: Label) -> u32 {
        self.inst(label.inst()).label_data().map_or(0, |d| d.label_id)
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn num_tmps(&self) -> usize {
        self.tmps.len()
    }

    pub fn num_labels(&self) -> usize {
        self.next_label_id as usize
    }

    pub fn tmps(&self) -> impl Iterator<Item = &SsaTmp> {
        self.tmps.iter()
    }

    // ==================== Constants ====================

    pub fn is_const(&self, tmp: TmpId) -> bool {
        matches!(self.producer(tmp).op(), Opcode::DefConst | Opcode::LdConst)
    }

    pub fn const_data(&self, tmp: TmpId) -> Option<ConstData> {
        if self.is_const(tmp) {
            self.producer(tmp).const_data()
        } else {
            None
        }
    }

    pub fn const_value<T: ConstValue>(&self, tmp: TmpId) -> Option<T> {
        self.const_data(tmp).map(|c| c.get::<T>())
    }

    /// Constant integer value of an Int or Bool constant.
    pub fn int_val(&self, tmp: TmpId) -> Option<i64> {
        let ty = self.ty(tmp);
        if ty.subtype_of(Type::INT) {
            self.const_value::<i64>(tmp)
        } else if ty.subtype_of(Type::BOOL) {
            self.const_value::<bool>(tmp).map(i64::from)
        } else {
            None
        }
    }

    pub fn dbl_val(&self, tmp: TmpId) -> Option<f64> {
        if self.ty(tmp).subtype_of(Type::DBL) {
            self.const_value::<f64>(tmp)
        } else {
            None
        }
    }

    // ==================== Queries ====================

    /// CSE eligibility: the catalog flag, minus comparisons that could
    /// re-enter user code.
    pub fn can_cse(&self, inst: &Instruction) -> bool {
        if !inst.op().has_flags(OpFlags::CAN_CSE) {
            return false;
        }
        if inst.op().is_cmp_op() && inst.num_srcs() == 2 {
            return !cmp_op_types_may_reenter(inst.op(), self.ty(inst.src(0)), self.ty(inst.src(1)));
        }
        true
    }

    // ==================== Strings and printing ====================

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn intern(&mut self, s: &str) -> StrId {
        self.strings.intern(s)
    }

    pub fn resolve(&self, id: StrId) -> Option<&str> {
        self.strings.resolve(id)
    }

    pub fn display<'a>(&'a self, inst: &'a Instruction) -> InstDisplay<'a> {
        InstDisplay::new(self, inst)
    }

    pub fn display_tmp(&self, tmp: TmpId) -> TmpDisplay<'_> {
        TmpDisplay::new(self, tmp)
    }
}

impl Default for IrFactory {
    fn default() -> Self {
        Self::new()
    }
}
