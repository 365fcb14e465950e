//! VM-level wrappers over `gen_ir!`
//!
//! Each helper picks the opcode for one VM operation and threads the
//! implicit operands (frame pointer, stack pointer, current function).
//! Helpers that consult tracked state may emit nothing at all when the
//! answer is already known.

use super::{get_stack_value, value, TraceBuilder};
use crate::error::Result;
use crate::gen_ir;
use crate::ir::{ClassId, FuncId, Label, LocalId, MarkerData, Opcode, RawMemSlot, Tca, TmpId, Type};
use crate::punt;
use tracing::trace;

impl TraceBuilder {
    // ==================== Constants ====================

    pub fn gen_def_uninit(&mut self) -> TmpId {
        self.gen_def_const_of_type(Type::UNINIT)
    }

    pub fn gen_def_init_null(&mut self) -> TmpId {
        self.gen_def_const_of_type(Type::INIT_NULL)
    }

    pub fn gen_def_null(&mut self) -> TmpId {
        self.gen_def_const_of_type(Type::NULL)
    }

    // ==================== Frame and stack pointers ====================

    pub fn gen_def_fp(&mut self) -> TmpId {
        value(gen_ir!(self, Opcode::DefFP))
    }

    pub fn gen_def_sp(&mut self, sp_offset: i32) -> TmpId {
        let fp = self.fp();
        let offset = self.gen_def_const(i64::from(sp_offset));
        value(gen_ir!(self, Opcode::DefSP, fp, offset))
    }

    /// Marks the bytecode position of the instructions that follow.
    pub fn gen_marker(&mut self, bc_off: u32, stack_off: i32) {
        let marker = MarkerData {
            bc_off,
            stack_off,
            func: self.func().id,
        };
        gen_ir!(self, Opcode::Marker, marker);
    }

    // ==================== Arithmetic and conversions ====================

    pub fn gen_add(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        let ty = Type::bin_arith_result_type(self.factory().ty(src1), self.factory().ty(src2));
        value(gen_ir!(self, Opcode::OpAdd, ty, src1, src2))
    }

    pub fn gen_sub(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        let ty = Type::bin_arith_result_type(self.factory().ty(src1), self.factory().ty(src2));
        value(gen_ir!(self, Opcode::OpSub, ty, src1, src2))
    }

    pub fn gen_mul(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        let ty = Type::bin_arith_result_type(self.factory().ty(src1), self.factory().ty(src2));
        value(gen_ir!(self, Opcode::OpMul, ty, src1, src2))
    }

    pub fn gen_and(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::OpAnd, src1, src2))
    }

    pub fn gen_or(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::OpOr, src1, src2))
    }

    pub fn gen_xor(&mut self, src1: TmpId, src2: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::OpXor, src1, src2))
    }

    /// Logical not of a `Bool`, as `(src ^ 1) != 0`.
    pub fn gen_not(&mut self, src: TmpId) -> TmpId {
        assert_eq!(self.factory().ty(src), Type::BOOL, "gen_not needs a Bool");
        let one = self.gen_def_const(1i64);
        let flipped = self.gen_xor(src, one);
        self.gen_conv_to_bool(flipped)
    }

    fn gen_conv(&mut self, ty: Type, src: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::Conv, ty, src))
    }

    pub fn gen_conv_to_bool(&mut self, src: TmpId) -> TmpId {
        self.gen_conv(Type::BOOL, src)
    }

    pub fn gen_conv_to_int(&mut self, src: TmpId) -> TmpId {
        self.gen_conv(Type::INT, src)
    }

    pub fn gen_conv_to_dbl(&mut self, src: TmpId) -> TmpId {
        self.gen_conv(Type::DBL, src)
    }

    /// Booleans convert to one of two static strings.
    pub fn gen_conv_to_str(&mut self, src: TmpId) -> TmpId {
        if self.factory().ty(src) == Type::BOOL {
            self.gen_conv(Type::STATIC_STR, src)
        } else {
            self.gen_conv(Type::STR, src)
        }
    }

    pub fn gen_conv_to_arr(&mut self, src: TmpId) -> TmpId {
        self.gen_conv(Type::ARR, src)
    }

    pub fn gen_conv_to_obj(&mut self, src: TmpId) -> TmpId {
        self.gen_conv(Type::OBJ, src)
    }

    pub fn gen_cmp(&mut self, op: Opcode, src1: TmpId, src2: TmpId) -> TmpId {
        assert!(op.is_cmp_op(), "{} is not a comparison", op);
        value(gen_ir!(self, op, src1, src2))
    }

    pub fn gen_concat(&mut self, left: TmpId, right: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::Concat, left, right))
    }

    // ==================== Jumps and guards ====================

    pub fn gen_jmp(&mut self, target: Label) {
        gen_ir!(self, Opcode::Jmp, target);
    }

    /// Branches to `target` when `src` is true, or when it is false if
    /// `negate` is set.
    pub fn gen_jmp_cond(&mut self, src: TmpId, target: Label, negate: bool) {
        assert_eq!(self.factory().ty(src), Type::BOOL, "conditional jump on a non-Bool");
        let op = if negate { Opcode::JmpZero } else { Opcode::JmpNZero };
        gen_ir!(self, op, target, src);
    }

    pub fn gen_exit_when_surprised(&mut self, target: Label) {
        gen_ir!(self, Opcode::ExitWhenSurprised, target);
    }

    pub fn gen_exit_on_var_env(&mut self, target: Label) {
        let fp = self.fp();
        gen_ir!(self, Opcode::ExitOnVarEnv, target, fp);
    }

    pub fn gen_release_vv_or_exit(&mut self, exit: Label) {
        let fp = self.fp();
        gen_ir!(self, Opcode::ReleaseVVOrExit, exit, fp);
    }

    pub fn gen_check_init(&mut self, src: TmpId, target: Label) {
        gen_ir!(self, Opcode::CheckInit, target, src);
    }

    pub fn gen_guard_type(&mut self, src: TmpId, ty: Type, exit: Label) -> TmpId {
        value(gen_ir!(self, Opcode::GuardType, ty, exit, src))
    }

    /// Checks the by-reference bits of a callee's parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn gen_guard_refs(
        &mut self,
        func_ptr: TmpId,
        num_params: TmpId,
        bits_ptr: TmpId,
        first_bit_num: TmpId,
        mask64: TmpId,
        vals64: TmpId,
        exit: Label,
    ) {
        let srcs = vec![func_ptr, num_params, bits_ptr, first_bit_num, mask64, vals64];
        gen_ir!(self, Opcode::GuardRefs, exit, srcs);
    }

    /// Exits unless `obj_class` is the parameter's constraint class. An
    /// unknown constraint is looked up in the class cache, never loaded.
    pub fn gen_verify_param_type(
        &mut self,
        obj_class: TmpId,
        class_name: TmpId,
        constraint: Option<ClassId>,
        exit: Label,
    ) {
        let constraint = match constraint {
            Some(cls) => self.gen_def_const(cls),
            None => value(gen_ir!(self, Opcode::LdCachedClass, class_name)),
        };
        gen_ir!(self, Opcode::JmpNSame, exit, obj_class, constraint);
    }

    // ==================== Locals ====================

    fn local_name_const(&mut self, id: LocalId) -> TmpId {
        let name = match self.func().local_name(id) {
            Some(name) => name.to_owned(),
            None => panic!("local {} has no name", id.0),
        };
        self.gen_def_const_str(&name)
    }

    /// Narrows a local's type, exiting to `exit` if the guess is wrong.
    pub fn gen_guard_loc(&mut self, id: LocalId, ty: Type, exit: Label) {
        if let Some(prev) = self.local_value(id) {
            self.gen_guard_type(prev, ty, exit);
            return;
        }
        match self.local_type(id) {
            None => {
                let fp = self.fp();
                gen_ir!(self, Opcode::GuardLoc, ty, exit, id, fp);
            }
            Some(prev) => assert_eq!(prev, ty, "guard on local {} can never pass", id.0),
        }
    }

    /// Records a local's type without a runtime check. Only emits when the
    /// assertion adds information.
    pub fn gen_assert_loc(&mut self, id: LocalId, ty: Type) {
        match self.local_type(id) {
            Some(prev) if !ty.strict_subtype_of(prev) => {
                assert!(
                    prev == ty || prev.strict_subtype_of(ty),
                    "assertion {} contradicts local {} of type {}",
                    ty,
                    id.0,
                    prev
                );
            }
            _ => {
                let fp = self.fp();
                gen_ir!(self, Opcode::AssertLoc, ty, id, fp);
            }
        }
    }

    pub fn gen_ld_asserted_loc(&mut self, id: LocalId, ty: Type) -> TmpId {
        self.gen_assert_loc(id, ty);
        self.gen_ld_loc(id)
    }

    /// The local's current value. Reuses a tracked value when there is one;
    /// otherwise the local's type must already be known.
    pub fn gen_ld_loc(&mut self, id: LocalId) -> TmpId {
        if let Some(tmp) = self.local_value(id) {
            return tmp;
        }
        let ty = match self.local_type(id) {
            Some(ty) => ty,
            None => panic!("load of local {} with unknown type", id.0),
        };
        assert_ne!(ty, Type::NULL, "local {} is either Uninit or InitNull", id.0);
        if ty.is_null() {
            return self.gen_def_const_of_type(ty);
        }
        let fp = self.fp();
        value(gen_ir!(self, Opcode::LdLoc, ty, id, fp))
    }

    /// Loads a local, reading through its reference cell if it is boxed.
    pub fn gen_ld_loc_as_cell(&mut self, id: LocalId, exit: Option<Label>) -> TmpId {
        let tmp = self.gen_ld_loc(id);
        let ty = self.factory().ty(tmp);
        if !ty.is_boxed() {
            return tmp;
        }
        self.gen_ld_ref(tmp, ty.inner_type(), exit)
    }

    pub fn gen_ld_loc_addr(&mut self, id: LocalId) -> TmpId {
        let ty = match self.local_type(id) {
            Some(ty) => ty,
            None => panic!("address of local {} with unknown type", id.0),
        };
        let fp = self.fp();
        value(gen_ir!(self, Opcode::LdLocAddr, ty.ptr(), id, fp))
    }

    pub fn gen_st_loc_aux(&mut self, id: LocalId, new_value: TmpId, store_type: bool) {
        let op = if store_type { Opcode::StLoc } else { Opcode::StLocNT };
        let fp = self.fp();
        gen_ir!(self, op, id, fp, new_value);
    }

    pub fn gen_init_loc(&mut self, id: LocalId, new_value: TmpId) {
        self.gen_st_loc_aux(id, new_value, true);
    }

    /// Releases the reference a local holds.
    pub fn gen_dec_ref_loc(&mut self, id: LocalId) {
        if let Some(tmp) = self.local_value(id) {
            self.gen_dec_ref(tmp);
            return;
        }
        let ty = match self.local_type(id) {
            Some(ty) if ty.not_counted() => return,
            // A boxed local's inner type can change through aliases.
            Some(ty) if ty.is_boxed() => Type::BOXED_CELL,
            Some(ty) => ty,
            None => Type::GEN,
        };
        let fp = self.fp();
        gen_ir!(self, Opcode::DecRefLoc, ty, id, fp);
    }

    /// Stores `new_value` into a local, replacing whatever it held. Also
    /// used to bind a reference cell to a local. With `do_ref_count`, the
    /// old value is released.
    pub fn gen_bind_loc(&mut self, id: LocalId, new_value: TmpId, do_ref_count: bool) {
        let tracked = self.local_type(id);
        let mut prev_value = None;
        match tracked {
            None => {
                if do_ref_count {
                    let fp = self.fp();
                    prev_value = gen_ir!(self, Opcode::LdLoc, Type::GEN, id, fp);
                }
            }
            Some(ty) => {
                prev_value = self.local_value(id);
                if prev_value == Some(new_value) {
                    // Silent store: the extra reference to the value goes.
                    if !ty.not_counted() && do_ref_count {
                        self.gen_dec_ref(new_value);
                    }
                    return;
                }
                if !ty.not_counted() && prev_value.is_none() && do_ref_count {
                    let fp = self.fp();
                    prev_value = gen_ir!(self, Opcode::LdLoc, ty, id, fp);
                }
            }
        }

        let new_ty = self.factory().ty(new_value);
        let store_type = match tracked {
            Some(ty) => !((ty.is_boxed() && new_ty.is_boxed()) || (ty == new_ty && !ty.is_string())),
            None => true,
        };
        self.gen_st_loc_aux(id, new_value, store_type);

        let counted = tracked.map_or(true, |ty| !ty.not_counted());
        if counted && do_ref_count {
            if let Some(prev) = prev_value {
                self.gen_dec_ref(prev);
            }
        }
    }

    /// Stores an unboxed value into a local that may be boxed, writing
    /// through the reference cell in that case. Returns the stored value,
    /// with a reference added when `do_ref_count` is set.
    pub fn gen_st_loc(
        &mut self,
        id: LocalId,
        new_value: TmpId,
        do_ref_count: bool,
        store_type: bool,
        exit: Option<Label>,
    ) -> TmpId {
        assert!(!self.factory().ty(new_value).is_boxed(), "gen_st_loc of a boxed value");
        let tracked = match self.local_type(id) {
            Some(ty) => ty,
            None => panic!("store to local {} with unknown type", id.0),
        };
        if tracked.not_boxed() {
            let ret = if do_ref_count { self.gen_inc_ref(new_value) } else { new_value };
            self.gen_bind_loc(id, new_value, do_ref_count);
            return ret;
        }

        assert!(tracked.is_boxed(), "local {} may or may not be boxed", id.0);
        let prev_ref = match self.local_value(id) {
            Some(tmp) => tmp,
            None => {
                let fp = self.fp();
                value(gen_ir!(self, Opcode::LdLoc, tracked, id, fp))
            }
        };
        let prev_value = if do_ref_count {
            Some(self.gen_ld_ref(prev_ref, tracked.inner_type(), exit))
        } else {
            None
        };
        let op = if store_type { Opcode::StRef } else { Opcode::StRefNT };
        gen_ir!(self, op, prev_ref, new_value);

        match prev_value {
            Some(prev) => {
                let ret = self.gen_inc_ref(new_value);
                self.gen_dec_ref(prev);
                ret
            }
            None => new_value,
        }
    }

    /// Makes a local boxed and returns its reference cell.
    pub fn gen_box_loc(&mut self, id: LocalId) -> TmpId {
        let prev = self.gen_ld_loc(id);
        let prev_ty = self.factory().ty(prev);
        if prev_ty.is_boxed() {
            return prev;
        }
        assert!(prev_ty.not_boxed(), "local {} may or may not be boxed", id.0);
        // The local's reference moves into the box.
        let boxed = value(gen_ir!(self, Opcode::Box, prev));
        self.gen_st_loc_aux(id, boxed, true);
        boxed
    }

    pub fn gen_raise_uninit_warning(&mut self, id: LocalId) {
        let name = self.local_name_const(id);
        gen_ir!(self, Opcode::RaiseUninitWarning, name);
    }

    // ==================== Stack ====================

    /// Immediate constants may be reused across calls. `LdConst` reads
    /// memory, so its value would have to live across the call.
    fn is_def_const(&self, tmp: TmpId) -> bool {
        self.factory().producer(tmp).op() == Opcode::DefConst
    }

    /// Loads the stack slot `index` cells below the stack pointer, reusing
    /// a value that was spilled there when it does not live across a call.
    pub fn gen_ld_stack(&mut self, index: i32, ty: Type) -> TmpId {
        let sp = self.sp();
        let found = get_stack_value(self.factory(), sp, i64::from(index), &self.config().calling_convention);
        match found.value {
            Some(tmp) if !found.spans_call || self.is_def_const(tmp) => {
                trace!(target: "hhir::builder", index, tmp = %tmp, "stack value reused");
                tmp
            }
            _ => {
                let ty = found.ty.map_or(ty, |known| Type::most_refined(ty, known));
                let index = self.gen_def_const(i64::from(index));
                value(gen_ir!(self, Opcode::LdStack, ty, sp, index))
            }
        }
    }

    pub fn gen_dec_ref_stack(&mut self, ty: Type, index: i32) {
        let sp = self.sp();
        let found = get_stack_value(self.factory(), sp, i64::from(index), &self.config().calling_convention);
        match found.value {
            Some(tmp) if !found.spans_call || self.is_def_const(tmp) => self.gen_dec_ref(tmp),
            _ => {
                let ty = found.ty.map_or(ty, |known| Type::most_refined(ty, known));
                let index = self.gen_def_const(i64::from(index));
                gen_ir!(self, Opcode::DecRefStack, ty, sp, index);
            }
        }
    }

    pub fn gen_guard_stk(&mut self, index: i32, ty: Type, exit: Label) {
        let sp = self.sp();
        let index = self.gen_def_const(i64::from(index));
        gen_ir!(self, Opcode::GuardStk, ty, exit, sp, index);
    }

    /// Records a stack slot's type. Only emits when the assertion adds
    /// information.
    pub fn gen_assert_stk(&mut self, index: i32, ty: Type) {
        let sp = self.sp();
        let found = get_stack_value(self.factory(), sp, i64::from(index), &self.config().calling_convention);
        if found.ty.map_or(true, |known| ty.strict_subtype_of(known)) {
            let index = self.gen_def_const(i64::from(index));
            gen_ir!(self, Opcode::AssertStk, ty, sp, index);
        }
    }

    /// Pops `adjustment` cells and pushes `opnds`. Returns the new stack
    /// pointer.
    pub fn gen_spill_stack(&mut self, adjustment: u32, opnds: &[TmpId]) -> TmpId {
        if adjustment == 0 && opnds.is_empty() {
            return self.sp();
        }
        let adjustment = self.gen_def_const(i64::from(adjustment));
        let mut srcs = vec![self.sp(), adjustment];
        srcs.extend_from_slice(opnds);
        value(gen_ir!(self, Opcode::SpillStack, srcs))
    }

    pub fn gen_ld_stack_addr(&mut self, index: i64) -> TmpId {
        let sp = self.sp();
        let index = self.gen_def_const(index);
        value(gen_ir!(self, Opcode::LdStackAddr, sp, index))
    }

    // ==================== Memory, properties, references ====================

    pub fn gen_ld_this(&mut self, exit: Option<Label>) -> TmpId {
        let fp = self.fp();
        if self.is_this_available() {
            value(gen_ir!(self, Opcode::LdThis, fp))
        } else {
            value(gen_ir!(self, Opcode::LdThis, exit, fp))
        }
    }

    pub fn gen_ld_ctx(&mut self) -> TmpId {
        let fp = self.fp();
        value(gen_ir!(self, Opcode::LdCtx, fp))
    }

    pub fn gen_ld_ctx_cls(&mut self) -> TmpId {
        let fp = self.fp();
        value(gen_ir!(self, Opcode::LdCtxCls, fp))
    }

    pub fn gen_ld_ret_addr(&mut self) -> TmpId {
        let fp = self.fp();
        value(gen_ir!(self, Opcode::LdRetAddr, fp))
    }

    pub fn gen_ld_raw(&mut self, base: TmpId, slot: RawMemSlot, ty: Type) -> TmpId {
        let slot = self.gen_def_const(slot as i64);
        value(gen_ir!(self, Opcode::LdRaw, ty, base, slot))
    }

    pub fn gen_st_raw(&mut self, base: TmpId, slot: RawMemSlot, val: TmpId, extra_off: i64) {
        let slot = self.gen_def_const(slot as i64);
        let extra_off = self.gen_def_const(extra_off);
        gen_ir!(self, Opcode::StRaw, base, slot, val, extra_off);
    }

    pub fn gen_ld_mem(&mut self, addr: TmpId, offset: i64, ty: Type, exit: Option<Label>) -> TmpId {
        let offset = self.gen_def_const(offset);
        value(gen_ir!(self, Opcode::LdMem, ty, exit, addr, offset))
    }

    pub fn gen_st_mem(&mut self, addr: TmpId, offset: i64, src: TmpId, store_type: bool) {
        let op = if store_type { Opcode::StMem } else { Opcode::StMemNT };
        let offset = self.gen_def_const(offset);
        gen_ir!(self, op, addr, offset, src);
    }

    pub fn gen_ld_prop(&mut self, obj: TmpId, prop: TmpId, ty: Type, exit: Option<Label>) -> TmpId {
        assert_eq!(self.factory().ty(obj), Type::OBJ, "property load from a non-object");
        assert!(
            self.factory().ty(prop) == Type::INT && self.factory().is_const(prop),
            "property offset must be an Int constant"
        );
        value(gen_ir!(self, Opcode::LdProp, ty, exit, obj, prop))
    }

    pub fn gen_st_prop(&mut self, obj: TmpId, prop: TmpId, src: TmpId, store_type: bool) {
        let op = if store_type { Opcode::StProp } else { Opcode::StPropNT };
        gen_ir!(self, op, obj, prop, src);
    }

    /// Overwrites a declared property, releasing its old value.
    pub fn gen_set_prop_cell(&mut self, base: TmpId, offset: i64, val: TmpId) {
        let prop = self.gen_def_const(offset);
        let old = self.gen_ld_prop(base, prop, Type::CELL, None);
        self.gen_st_prop(base, prop, val, true);
        self.gen_dec_ref(old);
    }

    pub fn gen_ld_prop_addr(&mut self, obj: TmpId, prop: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::LdPropAddr, obj, prop))
    }

    pub fn gen_ld_addr(&mut self, base: TmpId, offset: i64) -> TmpId {
        let offset = self.gen_def_const(offset);
        value(gen_ir!(self, Opcode::LdAddr, base, offset))
    }

    pub fn gen_ld_ref(&mut self, reference: TmpId, ty: Type, exit: Option<Label>) -> TmpId {
        assert!(ty.not_boxed(), "LdRef result {} is boxed", ty);
        assert!(self.factory().ty(reference).is_boxed(), "LdRef of an unboxed value");
        value(gen_ir!(self, Opcode::LdRef, ty, exit, reference))
    }

    pub fn gen_unbox(&mut self, src: TmpId, exit: Option<Label>) -> TmpId {
        value(gen_ir!(self, Opcode::Unbox, exit, src))
    }

    pub fn gen_unbox_ptr(&mut self, ptr: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::UnboxPtr, ptr))
    }

    // ==================== Reference counting ====================

    pub fn gen_inc_ref(&mut self, src: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::IncRef, src))
    }

    /// Whether `tmp`, or a value it was copied or increfed from, stays
    /// reachable from a local or the `this` pointer.
    fn is_value_available(&self, tmp: TmpId) -> bool {
        let mut tmp = tmp;
        loop {
            if self.state().any_local_has_value(tmp) {
                return true;
            }
            let producer = self.factory().producer(tmp);
            match producer.op() {
                Opcode::LdThis => return true,
                Opcode::IncRef | Opcode::Mov => tmp = producer.src(0),
                _ => return false,
            }
        }
    }

    /// Releases a reference. A value that was increfed from something
    /// still reachable cannot drop to zero, so it gets a `DecRefNZ`.
    pub fn gen_dec_ref(&mut self, tmp: TmpId) {
        if self.factory().ty(tmp).not_counted() {
            return;
        }
        let producer = self.factory().producer(tmp);
        if producer.op() == Opcode::IncRef && self.is_value_available(producer.src(0)) {
            gen_ir!(self, Opcode::DecRefNZ, tmp);
            return;
        }
        gen_ir!(self, Opcode::DecRef, tmp);
    }

    pub fn gen_dec_ref_mem(&mut self, base: TmpId, offset: i64, ty: Type) {
        let offset = self.gen_def_const(offset);
        gen_ir!(self, Opcode::DecRefMem, ty, base, offset);
    }

    pub fn gen_dec_ref_this(&mut self) {
        if self.is_this_available() {
            let this = self.gen_ld_this(None);
            self.gen_dec_ref(this);
        } else {
            let fp = self.fp();
            gen_ir!(self, Opcode::DecRefThis, fp);
        }
    }

    // ==================== Classes, functions, methods ====================

    pub fn gen_def_cls(&mut self) -> Result<()> {
        punt!(DefCls)
    }

    pub fn gen_def_func(&mut self, func: FuncId) {
        let func = self.gen_def_const(func);
        gen_ir!(self, Opcode::DefFunc, func);
    }

    pub fn gen_def_cns(&mut self, name: &str, val: TmpId) -> TmpId {
        let name = self.gen_def_const_str(name);
        value(gen_ir!(self, Opcode::DefCns, name, val))
    }

    pub fn gen_ld_ar_func_ptr(&mut self, base: TmpId, offset: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::LdARFuncPtr, base, offset))
    }

    pub fn gen_ld_cls_method(&mut self, cls: TmpId, method_slot: u32) -> TmpId {
        let slot = self.gen_def_const(i64::from(method_slot));
        value(gen_ir!(self, Opcode::LdClsMethod, cls, slot))
    }

    pub fn gen_ld_cls_method_cache(
        &mut self,
        class_name: TmpId,
        method_name: TmpId,
        base_class: TmpId,
        exit: Option<Label>,
    ) -> TmpId {
        value(gen_ir!(self, Opcode::LdClsMethodCache, exit, class_name, method_name, base_class))
    }

    /// Looks up a method through the method cache slot `cache_slot`.
    pub fn gen_ld_obj_method(&mut self, cache_slot: i64, method_name: &str, act_rec: TmpId) -> TmpId {
        let slot = self.gen_def_const(cache_slot);
        let name = self.gen_def_const_str(method_name);
        value(gen_ir!(self, Opcode::LdObjMethod, slot, name, act_rec))
    }

    pub fn gen_new_obj(&mut self, num_params: i32, cls: TmpId) -> TmpId {
        let num_params = self.gen_def_const(i64::from(num_params));
        let (sp, fp) = (self.sp(), self.fp());
        value(gen_ir!(self, Opcode::NewObj, num_params, cls, sp, fp))
    }

    pub fn gen_new_obj_named(&mut self, num_params: i32, class_name: &str) -> TmpId {
        let name = self.gen_def_const_str(class_name);
        self.gen_new_obj(num_params, name)
    }

    // ==================== Activation records, calls, returns ====================

    pub fn gen_def_act_rec(
        &mut self,
        func: TmpId,
        obj_or_class: TmpId,
        num_args: i32,
        inv_name: Option<&str>,
    ) -> TmpId {
        let fp = self.fp();
        let num_args = self.gen_def_const(i64::from(num_args));
        let inv_name = match inv_name {
            Some(name) => self.gen_def_const_str(name),
            None => self.gen_def_init_null(),
        };
        value(gen_ir!(self, Opcode::DefActRec, fp, func, obj_or_class, num_args, inv_name))
    }

    pub fn gen_free_act_rec(&mut self) -> TmpId {
        let fp = self.fp();
        value(gen_ir!(self, Opcode::FreeActRec, fp))
    }

    /// Calls `func` on the activation record at `act_rec`. Returns the new
    /// stack pointer, with the return value on top.
    pub fn gen_call(&mut self, act_rec: TmpId, ret_bc_off: u32, func: TmpId, params: &[TmpId]) -> TmpId {
        let ret = self.gen_def_const(i64::from(ret_bc_off));
        let mut srcs = vec![act_rec, ret, func];
        srcs.extend_from_slice(params);
        value(gen_ir!(self, Opcode::Call, srcs))
    }

    pub fn gen_native_impl(&mut self) {
        let (func, fp) = (self.cur_func(), self.fp());
        gen_ir!(self, Opcode::NativeImpl, func, fp);
    }

    pub fn gen_ret_val(&mut self, val: TmpId) {
        let fp = self.fp();
        gen_ir!(self, Opcode::RetVal, fp, val);
    }

    pub fn gen_ret_adjust_stack(&mut self) -> TmpId {
        let fp = self.fp();
        value(gen_ir!(self, Opcode::RetAdjustStack, fp))
    }

    pub fn gen_ret_ctrl(&mut self, sp: TmpId, fp: TmpId, ret_addr: TmpId) {
        gen_ir!(self, Opcode::RetCtrl, sp, fp, ret_addr);
    }

    pub fn gen_generic_ret_dec_refs(&mut self, ret_val: TmpId, num_locals: i32) -> TmpId {
        let fp = self.fp();
        let num_locals = self.gen_def_const(i64::from(num_locals));
        value(gen_ir!(self, Opcode::GenericRetDecRefs, fp, ret_val, num_locals))
    }

    /// Hands one bytecode to the interpreter. `result` is the type it
    /// leaves on the stack, if any.
    pub fn gen_interp_one(&mut self, pc_off: u32, stack_adjustment: u32, result: Option<Type>, target: Label) -> TmpId {
        let (fp, sp) = (self.fp(), self.sp());
        let pc = self.gen_def_const(i64::from(pc_off));
        let adjustment = self.gen_def_const(i64::from(stack_adjustment));
        let ty = result.unwrap_or(Type::NONE);
        value(gen_ir!(self, Opcode::InterpOne, ty, target, fp, sp, pc, adjustment))
    }

    // ==================== Arrays and printing ====================

    pub fn gen_new_array(&mut self, capacity: i32) -> TmpId {
        let capacity = self.gen_def_const(i64::from(capacity));
        value(gen_ir!(self, Opcode::NewArray, capacity))
    }

    pub fn gen_new_tuple(&mut self, num_args: i32, sp: TmpId) -> TmpId {
        assert!(num_args >= 0, "negative tuple size");
        let num_args = self.gen_def_const(i64::from(num_args));
        value(gen_ir!(self, Opcode::NewTuple, num_args, sp))
    }

    /// Adds `val` under `key`, choosing the helper by the key's type.
    pub fn gen_add_elem(&mut self, arr: TmpId, key: TmpId, val: TmpId) -> TmpId {
        let key_ty = self.factory().ty(key);
        let op = if key_ty.subtype_of(Type::INT) {
            Opcode::AddElemIntKey
        } else if key_ty.is_string() {
            Opcode::AddElemStrKey
        } else {
            panic!("array key of type {}", key_ty)
        };
        value(gen_ir!(self, op, arr, key, val))
    }

    pub fn gen_add_new_elem(&mut self, arr: TmpId, val: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::AddNewElem, arr, val))
    }

    pub fn gen_array_add(&mut self, left: TmpId, right: TmpId) -> TmpId {
        value(gen_ir!(self, Opcode::ArrayAdd, left, right))
    }

    /// Prints a string, integer or boolean.
    pub fn gen_print(&mut self, src: TmpId) {
        let ty = self.factory().ty(src);
        let op = if ty.is_string() {
            Opcode::PrintStr
        } else if ty.subtype_of(Type::INT) {
            Opcode::PrintInt
        } else if ty.subtype_of(Type::BOOL) {
            Opcode::PrintBool
        } else {
            panic!("no print helper for {}", ty)
        };
        gen_ir!(self, op, src);
    }

    // ==================== Member instructions ====================

    pub fn gen_def_mi_state_base(&mut self) -> TmpId {
        value(gen_ir!(self, Opcode::DefMIStateBase))
    }

    pub fn gen_prop_x(&mut self, helper: Tca, ctx: ClassId, base: TmpId, key: TmpId, mis: TmpId) -> TmpId {
        let (helper, ctx) = (self.gen_def_const(helper), self.gen_def_const(ctx));
        value(gen_ir!(self, Opcode::PropX, helper, ctx, base, key, mis))
    }

    pub fn gen_cget_prop(&mut self, helper: Tca, ctx: ClassId, base: TmpId, key: TmpId, mis: TmpId) -> TmpId {
        let (helper, ctx) = (self.gen_def_const(helper), self.gen_def_const(ctx));
        value(gen_ir!(self, Opcode::CGetProp, helper, ctx, base, key, mis))
    }

    /// Writes a property through `base`. Returns the value the operation
    /// produces, typed by the write's effects.
    pub fn gen_set_prop(&mut self, helper: Tca, ctx: ClassId, base: TmpId, key: TmpId, val: TmpId) -> TmpId {
        let (helper, ctx) = (self.gen_def_const(helper), self.gen_def_const(ctx));
        value(gen_ir!(self, Opcode::SetProp, helper, ctx, base, key, val))
    }

    pub fn gen_cget_elem(&mut self, helper: Tca, base: TmpId, key: TmpId, mis: TmpId) -> TmpId {
        let helper = self.gen_def_const(helper);
        value(gen_ir!(self, Opcode::CGetElem, helper, base, key, mis))
    }

    pub fn gen_set_elem(&mut self, helper: Tca, base: TmpId, key: TmpId, val: TmpId) -> TmpId {
        let helper = self.gen_def_const(helper);
        value(gen_ir!(self, Opcode::SetElem, helper, base, key, val))
    }

    // ==================== Iterators ====================

    pub fn gen_iter_init(&mut self, src: TmpId, iter_id: u32, val_local: LocalId) -> TmpId {
        let fp = self.fp();
        let iter = self.gen_def_const(i64::from(iter_id));
        let val = self.gen_def_const(i64::from(val_local.0));
        value(gen_ir!(self, Opcode::IterInit, Type::BOOL, src, fp, iter, val))
    }

    pub fn gen_iter_init_k(&mut self, src: TmpId, iter_id: u32, val_local: LocalId, key_local: LocalId) -> TmpId {
        let fp = self.fp();
        let iter = self.gen_def_const(i64::from(iter_id));
        let val = self.gen_def_const(i64::from(val_local.0));
        let key = self.gen_def_const(i64::from(key_local.0));
        value(gen_ir!(self, Opcode::IterInitK, Type::BOOL, src, fp, iter, val, key))
    }

    pub fn gen_iter_next(&mut self, iter_id: u32, val_local: LocalId) -> TmpId {
        let fp = self.fp();
        let iter = self.gen_def_const(i64::from(iter_id));
        let val = self.gen_def_const(i64::from(val_local.0));
        value(gen_ir!(self, Opcode::IterNext, Type::BOOL, fp, iter, val))
    }

    pub fn gen_iter_next_k(&mut self, iter_id: u32, val_local: LocalId, key_local: LocalId) -> TmpId {
        let fp = self.fp();
        let iter = self.gen_def_const(i64::from(iter_id));
        let val = self.gen_def_const(i64::from(val_local.0));
        let key = self.gen_def_const(i64::from(key_local.0));
        value(gen_ir!(self, Opcode::IterNextK, Type::BOOL, fp, iter, val, key))
    }

    // ==================== Continuations ====================

    pub fn gen_cont_enter(&mut self, cont_ar: TmpId, addr: TmpId, ret_bc_off: i64) {
        let ret = self.gen_def_const(ret_bc_off);
        gen_ir!(self, Opcode::ContEnter, cont_ar, addr, ret);
    }

    pub fn gen_unlink_cont_var_env(&mut self) {
        let fp = self.fp();
        gen_ir!(self, Opcode::UnlinkContVarEnv, fp);
    }

    pub fn gen_link_cont_var_env(&mut self) {
        let fp = self.fp();
        gen_ir!(self, Opcode::LinkContVarEnv, fp);
    }

    pub fn gen_cont_raise_check(&mut self, cont: TmpId, target: Label) -> Label {
        gen_ir!(self, Opcode::ContRaiseCheck, target, cont);
        target
    }

    pub fn gen_cont_pre_next(&mut self, cont: TmpId, target: Label) -> Label {
        gen_ir!(self, Opcode::ContPreNext, target, cont);
        target
    }

    pub fn gen_cont_started_check(&mut self, cont: TmpId, target: Label) -> Label {
        gen_ir!(self, Opcode::ContStartedCheck, target, cont);
        target
    }

    // ==================== Statistics ====================

    pub fn gen_inc_stat(&mut self, counter: i32, val: i32, force: bool) {
        let counter = self.gen_def_const(i64::from(counter));
        let val = self.gen_def_const(i64::from(val));
        let force = self.gen_def_const(force);
        gen_ir!(self, Opcode::IncStat, counter, val, force);
    }
}

#[cfg(test)]
mod tests {
    use super::super::FuncInfo;
    use super::*;
    use crate::config::JitConfig;
    use crate::error::Error;
    use crate::ir::ExitKind;
    use pretty_assertions::assert_eq;

    fn builder() -> TraceBuilder {
        let config = JitConfig {
            check_operand_types: true,
            ..JitConfig::default()
        };
        let func = FuncInfo::new(FuncId(3)).with_locals(["a", "b", "c"]);
        TraceBuilder::new(func, 0, 0, config)
    }

    fn last_op(tb: &TraceBuilder) -> Opcode {
        let last = *tb.trace().instructions().last().unwrap();
        tb.factory().inst(last).op()
    }

    fn count(tb: &TraceBuilder, op: Opcode) -> usize {
        tb.trace()
            .instructions()
            .iter()
            .filter(|&&i| tb.factory().inst(i).op() == op)
            .count()
    }

    #[test]
    fn test_guarded_local_loads_once() {
        let mut tb = builder();
        let exit = tb.gen_exit_guard_failure(0);
        tb.gen_guard_loc(LocalId(0), Type::INT, exit);
        assert_eq!(tb.local_type(LocalId(0)), Some(Type::INT));
        let first = tb.gen_ld_loc(LocalId(0));
        let second = tb.gen_ld_loc(LocalId(0));
        assert_eq!(first, second);
        assert_eq!(count(&tb, Opcode::LdLoc), 1);

        // A second guard on a known value becomes a type guard.
        tb.gen_guard_loc(LocalId(0), Type::INT, exit);
        assert_eq!(count(&tb, Opcode::GuardLoc), 1);
    }

    #[test]
    fn test_null_local_is_a_constant() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(1), Type::UNINIT);
        let v = tb.gen_ld_loc(LocalId(1));
        assert!(tb.factory().is_const(v));
        assert_eq!(count(&tb, Opcode::LdLoc), 0);
    }

    #[test]
    fn test_assert_loc_only_narrows() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::CELL);
        tb.gen_assert_loc(LocalId(0), Type::CELL);
        tb.gen_assert_loc(LocalId(0), Type::INT);
        assert_eq!(count(&tb, Opcode::AssertLoc), 2);
        assert_eq!(tb.local_type(LocalId(0)), Some(Type::INT));
    }

    #[test]
    fn test_st_loc_of_int_skips_type_store() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::INT);
        let five = tb.gen_def_const(5i64);
        let stored = tb.gen_st_loc(LocalId(0), five, true, true, None);
        assert_eq!(stored, five);
        assert_eq!(last_op(&tb), Opcode::StLocNT);
        assert_eq!(tb.gen_ld_loc(LocalId(0)), five);
    }

    #[test]
    fn test_st_loc_of_string_releases_old_value() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::STR);
        let s = tb.gen_ld_stack(0, Type::STR);
        let stored = tb.gen_st_loc(LocalId(0), s, true, true, None);
        assert_eq!(tb.factory().producer(stored).op(), Opcode::IncRef);
        assert_eq!(count(&tb, Opcode::LdLoc), 1);
        assert_eq!(count(&tb, Opcode::StLoc), 1);
        assert_eq!(last_op(&tb), Opcode::DecRef);
        assert_eq!(tb.local_value(LocalId(0)), Some(s));
    }

    #[test]
    fn test_dec_ref_of_available_value_is_nonzero() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::STR);
        let v = tb.gen_ld_loc(LocalId(0));
        let copy = tb.gen_inc_ref(v);
        tb.gen_dec_ref(copy);
        assert_eq!(last_op(&tb), Opcode::DecRefNZ);

        let other = tb.gen_ld_stack(0, Type::OBJ);
        let copy = tb.gen_inc_ref(other);
        tb.gen_dec_ref(copy);
        assert_eq!(last_op(&tb), Opcode::DecRef);
    }

    #[test]
    fn test_box_loc() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(2), Type::INT);
        let boxed = tb.gen_box_loc(LocalId(2));
        assert_eq!(tb.factory().ty(boxed), Type::BOXED_INT);
        assert_eq!(tb.local_type(LocalId(2)), Some(Type::BOXED_INT));
        assert_eq!(tb.gen_box_loc(LocalId(2)), boxed);
        assert_eq!(count(&tb, Opcode::Box), 1);
    }

    #[test]
    fn test_st_loc_through_reference() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::BOXED_INT);
        let exit = tb.get_exit_slow_trace(4, 0, &[]);
        let seven = tb.gen_def_const(7i64);
        tb.gen_st_loc(LocalId(0), seven, true, true, Some(exit));
        assert_eq!(count(&tb, Opcode::LdRef), 1);
        assert_eq!(count(&tb, Opcode::StRef), 1);
        let new_ref = tb.local_value(LocalId(0)).unwrap();
        assert_eq!(tb.factory().ty(new_ref), Type::BOXED_INT);
        assert_eq!(tb.factory().producer(new_ref).op(), Opcode::StRef);
    }

    #[test]
    fn test_st_ref_retargets_every_alias() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::BOXED_INT);
        let cell = tb.gen_ld_loc(LocalId(0));
        tb.gen_st_loc_aux(LocalId(1), cell, true);
        assert_eq!(tb.local_value(LocalId(1)), Some(cell));

        let seven = tb.gen_def_const(7i64);
        tb.gen_st_loc(LocalId(0), seven, false, true, None);
        let new_ref = tb.local_value(LocalId(0)).unwrap();
        assert_ne!(new_ref, cell);
        assert_eq!(tb.factory().producer(new_ref).op(), Opcode::StRef);
        assert_eq!(tb.local_value(LocalId(1)), Some(new_ref));
        assert_eq!(tb.local_type(LocalId(0)), Some(Type::BOXED_INT));
        assert_eq!(tb.local_type(LocalId(1)), Some(Type::BOXED_INT));
        assert_eq!(tb.local_value(LocalId(2)), None);
    }

    #[test]
    fn test_elem_write_through_unbox_ptr_keeps_boxing() {
        let mut tb = builder();
        let key = tb.gen_def_const(1i64);
        let val = tb.gen_def_const(2i64);

        // A Gen local may or may not hold a box.
        tb.gen_assert_loc(LocalId(0), Type::GEN);
        let addr = tb.gen_ld_loc_addr(LocalId(0));
        let cell = tb.gen_unbox_ptr(addr);
        tb.gen_set_elem(Tca(0), cell, key, val);
        let ty = tb.local_type(LocalId(0)).unwrap();
        assert!(!ty.is_boxed(), "{}", ty);
        assert_eq!(ty, Type::GEN);
        assert_eq!(tb.local_value(LocalId(0)), None);

        tb.gen_assert_loc(LocalId(1), Type::BOXED_ARR);
        let addr = tb.gen_ld_loc_addr(LocalId(1));
        let cell = tb.gen_unbox_ptr(addr);
        tb.gen_set_elem(Tca(0), cell, key, val);
        assert_eq!(tb.local_type(LocalId(1)), Some(Type::BOXED_CELL));

        tb.gen_assert_loc(LocalId(2), Type::ARR);
        let addr = tb.gen_ld_loc_addr(LocalId(2));
        let cell = tb.gen_unbox_ptr(addr);
        tb.gen_set_elem(Tca(0), cell, key, val);
        assert_eq!(tb.local_type(LocalId(2)), Some(Type::CELL));
    }

    #[test]
    fn test_ld_const_on_stack_is_reloaded_after_call() {
        let mut tb = builder();
        let loaded = tb.gen_ld_const(5i64);
        let immediate = tb.gen_def_const(6i64);
        tb.gen_spill_stack(0, &[loaded, immediate]);

        let func = tb.gen_def_const(FuncId(9));
        let null = tb.gen_def_init_null();
        let ar = tb.gen_def_act_rec(func, null, 0, None);
        let sp = tb.gen_spill_stack(0, &[ar, func, null, null, null]);
        tb.gen_call(sp, 8, func, &[]);
        assert_eq!(tb.sp_offset(), 3);

        let loads = count(&tb, Opcode::LdStack);
        assert_eq!(tb.gen_ld_stack(2, Type::INT), immediate);
        assert_eq!(count(&tb, Opcode::LdStack), loads);
        let reloaded = tb.gen_ld_stack(1, Type::INT);
        assert_ne!(reloaded, loaded);
        assert_eq!(tb.factory().producer(reloaded).op(), Opcode::LdStack);
        assert_eq!(count(&tb, Opcode::LdStack), loads + 1);
    }

    #[test]
    fn test_dec_ref_loc_by_type() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::INT);
        tb.gen_dec_ref_loc(LocalId(0));
        assert_eq!(count(&tb, Opcode::DecRefLoc), 0);

        tb.gen_dec_ref_loc(LocalId(1));
        let last = *tb.trace().instructions().last().unwrap();
        assert_eq!(tb.factory().inst(last).type_param(), Type::GEN);

        tb.gen_assert_loc(LocalId(2), Type::BOXED_STR);
        tb.gen_dec_ref_loc(LocalId(2));
        let last = *tb.trace().instructions().last().unwrap();
        assert_eq!(tb.factory().inst(last).type_param(), Type::BOXED_CELL);
    }

    #[test]
    fn test_call_keeps_types_not_values() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::OBJ);
        let obj = tb.gen_ld_loc(LocalId(0));
        tb.gen_assert_loc(LocalId(1), Type::INT);
        let one = tb.gen_def_const(1i64);
        tb.gen_st_loc(LocalId(1), one, false, true, None);

        let func = tb.gen_ld_stack(0, Type::FUNC);
        let null = tb.gen_def_init_null();
        let ar = tb.gen_def_act_rec(func, null, 0, None);
        let sp = tb.gen_spill_stack(0, &[ar, func, null, null, null]);
        assert_eq!(tb.sp_offset(), 3);
        tb.gen_call(sp, 8, func, &[]);

        assert_eq!(tb.local_type(LocalId(0)), Some(Type::OBJ));
        assert_eq!(tb.local_value(LocalId(0)), None);
        assert_eq!(tb.local_value(LocalId(1)), Some(one));
        assert_ne!(tb.gen_ld_loc(LocalId(0)), obj);
        assert_eq!(tb.sp_offset(), 1);
    }

    #[test]
    fn test_ld_stack_reuses_spilled_value() {
        let mut tb = builder();
        let a = tb.gen_def_const(10i64);
        let s = tb.gen_ld_stack(0, Type::STR);
        tb.gen_spill_stack(1, &[a, s]);
        assert_eq!(tb.sp_offset(), 1);
        let loads = count(&tb, Opcode::LdStack);
        assert_eq!(tb.gen_ld_stack(0, Type::INT), a);
        assert_eq!(tb.gen_ld_stack(1, Type::STR), s);
        assert_eq!(count(&tb, Opcode::LdStack), loads);

        tb.gen_dec_ref_stack(Type::STR, 1);
        assert_eq!(last_op(&tb), Opcode::DecRef);
    }

    #[test]
    fn test_assert_stk_uses_known_type() {
        let mut tb = builder();
        let exit = tb.gen_exit_guard_failure(0);
        tb.gen_guard_stk(0, Type::STR, exit);
        tb.gen_assert_stk(0, Type::STR);
        assert_eq!(count(&tb, Opcode::AssertStk), 0);
        tb.gen_assert_stk(0, Type::STATIC_STR);
        assert_eq!(count(&tb, Opcode::AssertStk), 1);
        let ld = tb.gen_ld_stack(0, Type::CELL);
        assert_eq!(tb.factory().ty(ld), Type::STATIC_STR);
    }

    #[test]
    fn test_spill_without_effect_is_elided() {
        let mut tb = builder();
        let sp = tb.sp();
        assert_eq!(tb.gen_spill_stack(0, &[]), sp);
        assert_eq!(count(&tb, Opcode::SpillStack), 0);
    }

    #[test]
    fn test_ld_this_and_dec_ref_this() {
        let mut tb = builder();
        tb.gen_dec_ref_this();
        assert_eq!(last_op(&tb), Opcode::DecRefThis);

        let exit = tb.get_exit_slow_trace(4, 0, &[]);
        let this = tb.gen_ld_this(Some(exit));
        assert!(tb.is_this_available());
        let again = tb.gen_ld_this(None);
        assert_ne!(this, again);
        assert_eq!(tb.factory().producer(again).taken(), None);
        tb.gen_dec_ref_this();
        assert_eq!(last_op(&tb), Opcode::DecRef);
    }

    #[test]
    fn test_not() {
        let mut tb = builder();
        let b = tb.gen_ld_stack(0, Type::BOOL);
        let not = tb.gen_not(b);
        assert_eq!(tb.factory().ty(not), Type::BOOL);
        let t = tb.gen_def_const(true);
        let f = tb.gen_not(t);
        assert_eq!(tb.factory().const_value::<bool>(f), Some(false));
    }

    #[test]
    fn test_verify_param_type() {
        let mut tb = builder();
        let exit = tb.get_exit_slow_trace(4, 0, &[]);
        let obj = tb.gen_ld_stack(0, Type::OBJ);
        let cls = value(gen_ir!(tb, Opcode::LdObjClass, obj));
        let name = tb.gen_def_const_str("Widget");
        tb.gen_verify_param_type(cls, name, None, exit);
        assert_eq!(last_op(&tb), Opcode::JmpNSame);
        tb.gen_verify_param_type(cls, name, Some(ClassId(9)), exit);
        assert_eq!(count(&tb, Opcode::JmpNSame), 2);
    }

    #[test]
    fn test_raise_uninit_warning_names_local() {
        let mut tb = builder();
        tb.gen_raise_uninit_warning(LocalId(1));
        let last = *tb.trace().instructions().last().unwrap();
        let name = tb.factory().inst(last).src(0);
        let id = tb.factory().const_value::<crate::ir::StrId>(name).unwrap();
        assert_eq!(tb.factory().resolve(id), Some("b"));
    }

    #[test]
    fn test_iterator_kills_written_locals() {
        let mut tb = builder();
        let one = tb.gen_def_const(1i64);
        tb.gen_init_loc(LocalId(0), one);
        tb.gen_init_loc(LocalId(1), one);
        let arr = tb.gen_ld_stack(0, Type::ARR);
        tb.gen_iter_init_k(arr, 0, LocalId(0), LocalId(1));
        assert_eq!(tb.local_value(LocalId(0)), None);
        assert_eq!(tb.local_value(LocalId(1)), None);
        tb.gen_init_loc(LocalId(2), one);
        tb.gen_iter_next(0, LocalId(2));
        assert_eq!(tb.local_value(LocalId(2)), None);
    }

    #[test]
    fn test_def_cls_punts() {
        let mut tb = builder();
        match tb.gen_def_cls() {
            Err(Error::Unsupported { construct, .. }) => assert_eq!(construct, "DefCls"),
            other => panic!("expected a punt, got {:?}", other),
        }
    }

    #[test]
    fn test_interp_one_moves_stack() {
        let mut tb = builder();
        let exit = tb.gen_exit_trace(12, 0, &[], ExitKind::Normal, None);
        tb.gen_interp_one(8, 0, Some(Type::INT), exit);
        assert_eq!(tb.sp_offset(), 1);
        let ld = tb.gen_ld_stack(0, Type::CELL);
        assert_eq!(tb.factory().ty(ld), Type::INT);
    }

    #[test]
    fn test_set_prop_retypes_local() {
        let mut tb = builder();
        tb.gen_assert_loc(LocalId(0), Type::INIT_NULL);
        let addr = tb.gen_ld_loc_addr(LocalId(0));
        let key = tb.gen_def_const_str("x");
        let one = tb.gen_def_const(1i64);
        let result = tb.gen_set_prop(Tca(0x10), ClassId(1), addr, key, one);
        assert_eq!(tb.factory().ty(result), Type::INT);
        assert_eq!(tb.local_type(LocalId(0)), Some(Type::OBJ));
    }

    #[test]
    fn test_print_and_arrays() {
        let mut tb = builder();
        let s = tb.gen_def_const_str("hi");
        tb.gen_print(s);
        assert_eq!(last_op(&tb), Opcode::PrintStr);
        let arr = tb.gen_new_array(4);
        let k = tb.gen_def_const(0i64);
        let arr = tb.gen_add_elem(arr, k, s);
        assert_eq!(last_op(&tb), Opcode::AddElemIntKey);
        assert_eq!(tb.factory().ty(arr), Type::ARR);
    }
}
