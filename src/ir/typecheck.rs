//! Destination type inference and operand contract checking
//!
//! Both walk the catalog row of an instruction's opcode. `output_type` is
//! recomputed from the current sources and type parameter on every call.

use super::factory::IrFactory;
use super::instruction::Instruction;
use super::opcode::{DestRule, Opcode, SrcCheck, SrcContract};
use super::tmp::TmpId;
use super::types::Type;
use thiserror::Error;
use tracing::error;

/// An instruction that violates its opcode's contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandTypeError {
    #[error("Error: failed type check on operand {index}\n   instruction: {inst}\n   was expecting: {expected}\n   received: {received}")]
    TypeMismatch {
        index: usize,
        inst: String,
        expected: String,
        received: String,
    },

    #[error("Error: instruction had too few operands\n   instruction: {inst}")]
    TooFewOperands { inst: String },

    #[error("Error: instruction had too many operands\n   instruction: {inst}\n   expected {expected} arguments")]
    TooManyOperands { inst: String, expected: usize },

    #[error("Error: instruction expected no operands\n   instruction: {inst}")]
    ExpectedNoOperands { inst: String },

    #[error("Error: failed type check on dest operand\n   instruction: {inst}\n   message: {message}")]
    BadDest { inst: String, message: &'static str },
}

/// Type of the destination of `inst`, derived from its catalog row.
///
/// # Panics
///
/// If the opcode has no destination.
pub fn output_type(inst: &Instruction, factory: &IrFactory) -> Type {
    let src_ty = |n: usize| factory.ty(inst.src(n));
    match inst.op().dest_rule() {
        DestRule::Fixed(ty) => ty,
        DestRule::OfSrc(n) => src_ty(n),
        DestRule::Unbox(n) => src_ty(n).unbox(),
        DestRule::Box(n) => src_ty(n).boxed(),
        DestRule::Param => inst.type_param(),
        DestRule::Label => Type::NONE,
        DestRule::Vector => VectorEffects::for_inst(inst, factory).val_type,
        DestRule::None => panic!("output_type requires a destination: {}", inst.op()),
    }
}

/// Checks operand count and per-operand types of `inst` against its
/// opcode's contract.
pub fn check_operand_types(inst: &Instruction, factory: &IrFactory) -> Result<(), OperandTypeError> {
    let show = || factory.display(inst).to_string();

    match inst.op().dest_rule() {
        DestRule::OfSrc(n) | DestRule::Box(n) | DestRule::Unbox(n) if n >= inst.num_srcs() => {
            return Err(OperandTypeError::BadDest {
                inst: show(),
                message: "invalid src num",
            });
        }
        DestRule::Param if inst.type_param() == Type::NONE => {
            return Err(OperandTypeError::BadDest {
                inst: show(),
                message: "DParam with paramType None",
            });
        }
        _ => {}
    }

    let checks = match inst.op().src_contract() {
        SrcContract::Unchecked => return Ok(()),
        SrcContract::NoSrcs if inst.num_srcs() == 0 => return Ok(()),
        SrcContract::NoSrcs => return Err(OperandTypeError::ExpectedNoOperands { inst: show() }),
        SrcContract::Checked(checks) => checks,
    };

    for (index, check) in checks.iter().enumerate() {
        let Some(&src) = inst.srcs().get(index) else {
            return Err(OperandTypeError::TooFewOperands { inst: show() });
        };
        if !src_satisfies(factory, src, check) {
            return Err(OperandTypeError::TypeMismatch {
                index,
                inst: show(),
                expected: check.to_string(),
                received: factory.ty(src).to_string(),
            });
        }
    }
    if inst.num_srcs() != checks.len() {
        return Err(OperandTypeError::TooManyOperands {
            inst: show(),
            expected: checks.len(),
        });
    }
    Ok(())
}

fn src_satisfies(factory: &IrFactory, src: TmpId, check: &SrcCheck) -> bool {
    let ty = factory.ty(src);
    match check {
        SrcCheck::Subtype(_) => ty.subtype_of(check.expected_type()),
        SrcCheck::Const(expected) => factory.is_const(src) && ty.subtype_of(*expected),
    }
}

/// Aborts with a diagnostic if `inst` violates its contract.
pub fn assert_operand_types(inst: &Instruction, factory: &IrFactory) {
    if let Err(err) = check_operand_types(inst, factory) {
        error!(target: "hhir::typecheck", "{}", err);
        panic!("instruction operand type check failure\n{}", err);
    }
}

// ==================== Member operations ====================

/// How a member key is passed to runtime helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Str,
    Int,
    Any,
}

impl KeyType {
    /// Classifies a key. Boxed keys can change type at any time and are
    /// always passed as full values.
    pub fn of(factory: &IrFactory, key: TmpId, non_lit_str: bool, non_lit_int: bool) -> KeyType {
        let ty = factory.ty(key);
        if ty.maybe_boxed() {
            return KeyType::Any;
        }
        let is_const = factory.is_const(key);
        if (is_const || non_lit_str) && ty.is_string() {
            KeyType::Str
        } else if (is_const || non_lit_int) && ty.subtype_of(Type::INT) {
            KeyType::Int
        } else {
            KeyType::Any
        }
    }
}

/// Source positions of base, key and value for a member mutation opcode.
pub fn vector_operands(op: Opcode) -> Option<(usize, usize, usize)> {
    match op {
        Opcode::SetProp => Some((2, 3, 4)),
        Opcode::SetElem => Some((1, 2, 3)),
        _ => None,
    }
}

/// Type effects of a `SetProp` or `SetElem`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorEffects {
    /// Type of the base after the operation
    pub base_type: Type,
    /// Type of the value the operation produces
    pub val_type: Type,
    pub base_type_changed: bool,
    pub base_val_changed: bool,
    pub val_type_changed: bool,
}

impl VectorEffects {
    pub fn for_inst(inst: &Instruction, factory: &IrFactory) -> VectorEffects {
        let (base, key, val) = vector_operands(inst.op())
            .unwrap_or_else(|| panic!("{} is not a member mutation", inst.op()));
        VectorEffects::new(
            inst.op(),
            factory.ty(inst.src(base)),
            factory.ty(inst.src(key)),
            factory.ty(inst.src(val)),
        )
    }

    /// Computes the effects of `op` on a base of type `base` (a value or a
    /// pointer to one, possibly boxed) when storing a value of type `val`.
    /// The key does not currently refine the result.
    pub fn new(op: Opcode, base: Type, _key: Type, val: Type) -> VectorEffects {
        let is_ptr = base.is_ptr();
        let outer = base.deref_if_ptr();
        let is_boxed = outer.is_boxed() && outer != Type::BOTTOM;
        let maybe_boxed = !is_boxed && outer.maybe_boxed();
        let inner = outer.unbox();

        let mut new_inner = inner;
        let mut val_type = val;
        let mut base_val_changed = false;
        match op {
            Opcode::SetProp => {
                // Null, false and the empty string promote to an object.
                if inner.subtype_of(Type::NULL | Type::BOOL | Type::STR) {
                    new_inner = Type::OBJ;
                    base_val_changed = true;
                } else if !inner.subtype_of(Type::OBJ) && inner.maybe(Type::NULL | Type::BOOL | Type::STR) {
                    new_inner = Type::CELL;
                    base_val_changed = true;
                }
            }
            Opcode::SetElem => {
                if inner.is_array() {
                    // Copy on write.
                    new_inner = Type::ARR;
                    base_val_changed = true;
                } else if inner.is_null() {
                    new_inner = Type::ARR;
                    base_val_changed = true;
                } else if inner.is_string() {
                    // A string offset write stores a one-character string.
                    new_inner = Type::STR;
                    val_type = Type::STR;
                    base_val_changed = true;
                } else if inner.subtype_of(Type::OBJ) {
                    // Objects handle element writes themselves.
                } else if inner.subtype_of(Type::BOOL | Type::INT | Type::DBL) {
                    val_type = Type::INIT_NULL;
                } else {
                    new_inner = Type::CELL;
                    base_val_changed = true;
                }
            }
            _ => panic!("{} is not a member mutation", op),
        }

        let mut base_type = new_inner;
        if is_boxed {
            base_type = base_type.boxed();
        } else if maybe_boxed {
            base_type = new_inner | new_inner.boxed();
        }
        if is_ptr {
            base_type = base_type.ptr();
        }
        VectorEffects {
            base_type,
            val_type,
            base_type_changed: new_inner != inner,
            base_val_changed,
            val_type_changed: val_type != val,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_ir;
    use crate::ir::ConstData;

    fn konst(factory: &mut IrFactory, ty: Type, bits: u64) -> TmpId {
        let iid = gen_ir!(factory, Opcode::DefConst, ty, ConstData::from_raw(bits));
        factory.inst(iid).dst().unwrap()
    }

    #[test]
    fn test_add_with_string_reports_union_and_actual() {
        let mut factory = IrFactory::with_operand_checks(false);
        let one = konst(&mut factory, Type::INT, 1);
        let s = konst(&mut factory, Type::STATIC_STR, 0);
        let mut inst = Instruction::new(Opcode::OpAdd);
        inst.set_type_param(Type::INT);
        inst.append_src(one);
        inst.append_src(s);
        let err = check_operand_types(&inst, &factory).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Int|Bool|Dbl"), "{}", msg);
        assert!(msg.contains("received: StaticStr"), "{}", msg);
        assert!(msg.contains("operand 1"), "{}", msg);
    }

    #[test]
    fn test_count_checks() {
        let mut factory = IrFactory::with_operand_checks(false);
        let one = konst(&mut factory, Type::INT, 1);

        let mut few = Instruction::new(Opcode::OpXor);
        few.append_src(one);
        assert!(matches!(
            check_operand_types(&few, &factory),
            Err(OperandTypeError::TooFewOperands { .. })
        ));

        let mut many = Instruction::new(Opcode::PrintInt);
        many.append_src(one);
        many.append_src(one);
        assert!(matches!(
            check_operand_types(&many, &factory),
            Err(OperandTypeError::TooManyOperands { expected: 1, .. })
        ));

        let mut none = Instruction::new(Opcode::DefFP);
        none.append_src(one);
        assert!(matches!(
            check_operand_types(&none, &factory),
            Err(OperandTypeError::ExpectedNoOperands { .. })
        ));
    }

    #[test]
    fn test_dest_checks() {
        let factory = IrFactory::with_operand_checks(false);
        let mov = Instruction::new(Opcode::Mov);
        assert!(matches!(
            check_operand_types(&mov, &factory),
            Err(OperandTypeError::BadDest { message: "invalid src num", .. })
        ));
        let ld = Instruction::new(Opcode::LdConst);
        assert!(matches!(
            check_operand_types(&ld, &factory),
            Err(OperandTypeError::BadDest { message: "DParam with paramType None", .. })
        ));
    }

    #[test]
    fn test_const_contract_requires_constant() {
        let mut factory = IrFactory::with_operand_checks(false);
        let one = konst(&mut factory, Type::INT, 1);
        let copy = gen_ir!(factory, Opcode::Mov, one);
        let not_const = factory.inst(copy).dst().unwrap();
        let mut inst = Instruction::new(Opcode::AllocSpill);
        inst.append_src(not_const);
        let err = check_operand_types(&inst, &factory).unwrap_err();
        assert!(err.to_string().contains("constant Int"));
    }

    #[test]
    fn test_output_type_rules() {
        let mut factory = IrFactory::with_operand_checks(true);
        let one = konst(&mut factory, Type::INT, 1);
        let boxed = gen_ir!(factory, Opcode::Box, one);
        let boxed = factory.inst(boxed).dst().unwrap();
        assert_eq!(factory.ty(boxed), Type::BOXED_INT);
        let unboxed = gen_ir!(factory, Opcode::Unbox, boxed);
        let unboxed = factory.inst(unboxed).dst().unwrap();
        assert_eq!(factory.ty(unboxed), Type::INT);
    }

    #[test]
    fn test_vector_effects() {
        let ve = VectorEffects::new(Opcode::SetProp, Type::PTR_TO_NULL, Type::STR, Type::INT);
        assert_eq!(ve.base_type, Type::PTR_TO_OBJ);
        assert!(ve.base_type_changed);
        assert!(!ve.val_type_changed);

        let ve = VectorEffects::new(Opcode::SetProp, Type::OBJ, Type::STR, Type::INT);
        assert!(!ve.base_type_changed && !ve.base_val_changed);

        let ve = VectorEffects::new(Opcode::SetElem, Type::PTR_TO_STATIC_ARR, Type::INT, Type::INT);
        assert_eq!(ve.base_type, Type::PTR_TO_ARR);
        assert!(ve.base_type_changed && ve.base_val_changed);

        let ve = VectorEffects::new(Opcode::SetElem, Type::PTR_TO_BOXED_STR, Type::INT, Type::INT);
        assert_eq!(ve.base_type, Type::PTR_TO_BOXED_STR);
        assert_eq!(ve.val_type, Type::STR);
        assert!(ve.val_type_changed);

        let ve = VectorEffects::new(Opcode::SetProp, Type::PTR_TO_GEN, Type::STR, Type::INT);
        assert_eq!(ve.base_type, Type::PTR_TO_GEN);
        assert!(ve.base_val_changed && !ve.base_type_changed);

        let ve = VectorEffects::new(Opcode::SetElem, Type::PTR_TO_INT, Type::INT, Type::DBL);
        assert_eq!(ve.val_type, Type::INIT_NULL);
        assert!(!ve.base_type_changed);
    }

    #[test]
    fn test_key_type() {
        let mut factory = IrFactory::with_operand_checks(false);
        let s = konst(&mut factory, Type::STATIC_STR, 0);
        let i = konst(&mut factory, Type::INT, 3);
        assert_eq!(KeyType::of(&factory, s, false, false), KeyType::Str);
        assert_eq!(KeyType::of(&factory, i, false, false), KeyType::Int);
        let copy = gen_ir!(factory, Opcode::Mov, i);
        let copy = factory.inst(copy).dst().unwrap();
        assert_eq!(KeyType::of(&factory, copy, false, false), KeyType::Any);
        assert_eq!(KeyType::of(&factory, copy, false, true), KeyType::Int);
    }
}
