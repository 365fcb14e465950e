//! Text forms of instructions and temporaries
//!
//! ```text
//! (7) t4:Int = OpAdd<Int> t2:Int, t3:Int
//! (9) JmpZero t4:Int -> L1
//! (3) t1:StaticStr = DefConst<StaticStr> "foo"
//! ```

use super::extra::{ClassId, ExtraData, FuncId, StrId, Tca};
use super::factory::IrFactory;
use super::instruction::Instruction;
use super::opcode::Opcode;
use super::tmp::TmpId;
use super::types::Type;
use std::fmt;

pub struct TmpDisplay<'a> {
    factory: &'a IrFactory,
    tmp: TmpId,
}

impl<'a> TmpDisplay<'a> {
    pub(crate) fn new(factory: &'a IrFactory, tmp: TmpId) -> Self {
        Self { factory, tmp }
    }
}

impl fmt::Display for TmpDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tmp, self.factory.ty(self.tmp))
    }
}

pub struct InstDisplay<'a> {
    factory: &'a IrFactory,
    inst: &'a Instruction,
}

impl<'a> InstDisplay<'a> {
    pub(crate) fn new(factory: &'a IrFactory, inst: &'a Instruction) -> Self {
        Self { factory, inst }
    }

    fn fmt_const(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(data) = self.inst.const_data() else {
            return Ok(());
        };
        let ty = self.inst.type_param();
        if ty.subtype_of(Type::BOOL) {
            write!(f, " {}", data.get::<bool>())
        } else if ty.subtype_of(Type::INT) {
            write!(f, " {}", data.get::<i64>())
        } else if ty.subtype_of(Type::DBL) {
            write!(f, " {}", data.get::<f64>())
        } else if ty.subtype_of(Type::STATIC_STR) {
            match self.factory.resolve(data.get::<StrId>()) {
                Some(s) => write!(f, " {:?}", s),
                None => write!(f, " {}", data.get::<StrId>()),
            }
        } else if ty.subtype_of(Type::FUNC) {
            write!(f, " {}", data.get::<FuncId>())
        } else if ty.subtype_of(Type::CLS) {
            write!(f, " {}", data.get::<ClassId>())
        } else if ty.subtype_of(Type::TCA) {
            write!(f, " {}", data.get::<Tca>())
        } else if ty.is_null() {
            Ok(())
        } else {
            write!(f, " {:#x}", data.bits())
        }
    }
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inst = self.inst;
        if let Some(iid) = inst.iid() {
            write!(f, "{} ", iid)?;
        }
        if let Some(dst) = inst.dst() {
            write!(f, "{} = ", self.factory.display_tmp(dst))?;
        } else if !inst.dsts().is_empty() {
            f.write_str("(")?;
            for (i, dst) in inst.dsts().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", self.factory.display_tmp(*dst))?;
            }
            f.write_str(") = ")?;
        }
        write!(f, "{}", inst.op())?;
        if inst.type_param() != Type::NONE {
            write!(f, "<{}>", inst.type_param())?;
        }
        match inst.extra() {
            Some(ExtraData::Const(_)) => self.fmt_const(f)?,
            Some(ExtraData::Local(id)) => write!(f, " [loc {}]", id.0)?,
            Some(extra) => write!(f, " {}", extra)?,
            None => {}
        }
        for (i, src) in inst.srcs().iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{}", self.factory.display_tmp(*src))?;
        }
        if let Some(label) = inst.taken() {
            write!(f, " -> L{}", self.factory.label_id(label))?;
        }
        if inst.op() == Opcode::DefLabel {
            f.write_str(":")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_ir;
    use crate::ir::ConstData;

    #[test]
    fn test_instruction_text() {
        let mut factory = IrFactory::with_operand_checks(true);
        let foo = factory.intern("foo");
        let s = gen_ir!(factory, Opcode::DefConst, Type::STATIC_STR, ConstData::new(foo));
        assert_eq!(
            factory.display(factory.inst(s)).to_string(),
            "(0) t0:StaticStr = DefConst<StaticStr> \"foo\""
        );

        let one = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(1i64));
        let one = factory.inst(one).dst().unwrap();
        let label = factory.def_label(None, 0);
        let jmp = gen_ir!(factory, Opcode::JmpZero, label, one);
        assert_eq!(
            factory.display(factory.inst(jmp)).to_string(),
            "(3) JmpZero t1:Int -> L0"
        );
        assert_eq!(factory.display(factory.inst(label.inst())).to_string(), "(2) DefLabel L0:");
    }
}
