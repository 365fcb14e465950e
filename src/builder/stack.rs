//! Symbolic search for values previously pushed on the VM stack

use super::state::const_src;
use crate::config::CallingConvention;
use crate::ir::{IrFactory, Opcode, TmpId, Type};
use tracing::trace;

/// What the search learned about one stack slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackValue {
    /// A temporary holding the slot's value
    pub value: Option<TmpId>,
    /// The slot's type, when known even without a value
    pub ty: Option<Type>,
    /// The value was pushed before a call that is still on the path
    pub spans_call: bool,
}

/// Walks the chain of stack-pointer definitions back from `sp` looking for
/// what was stored at `index` cells below it.
///
/// Stops at the frame's stack definition, at a guard or assertion on the
/// slot (type only), at a spill that pushed the slot (value and type), or at
/// an instruction that leaves a result on the stack without a temporary for
/// it. Unknown stack producers end the search empty-handed.
pub fn get_stack_value(factory: &IrFactory, sp: TmpId, index: i64, conv: &CallingConvention) -> StackValue {
    let mut found = StackValue::default();
    let mut sp = sp;
    let mut index = index;
    let act_rec_cells = i64::from(conv.act_rec_cells);
    loop {
        let inst = factory.producer(sp);
        trace!(target: "hhir::state", op = %inst.op(), index, "stack search");
        match inst.op() {
            Opcode::AssertStk | Opcode::GuardStk => {
                if const_src(factory, inst, 1) == index {
                    found.ty = Some(inst.type_param());
                    return found;
                }
                sp = inst.src(0);
            }
            Opcode::Call => {
                if index == 0 {
                    return found;
                }
                found.spans_call = true;
                // Below the return value sit the cells the call popped.
                index -= 1 - act_rec_cells;
                sp = inst.src(0);
            }
            Opcode::SpillStack => {
                let mut pushed = 0i64;
                let mut i = 2;
                while i < inst.num_srcs() {
                    let tmp = inst.src(i);
                    if factory.ty(tmp) == Type::ACT_REC {
                        pushed += act_rec_cells;
                        i += conv.spill_act_rec_extra_args + 1;
                        continue;
                    }
                    if index == pushed {
                        let producer = factory.producer(tmp);
                        let tmp = if producer.op() == Opcode::IncRef { producer.src(0) } else { tmp };
                        found.value = Some(tmp);
                        found.ty = Some(factory.ty(tmp));
                        return found;
                    }
                    pushed += 1;
                    i += 1;
                }
                let popped = const_src(factory, inst, 1);
                index -= pushed - popped;
                sp = inst.src(0);
            }
            Opcode::InterpOne => {
                let popped = const_src(factory, inst, 3);
                let result = inst.type_param();
                let pushed = i64::from(result != Type::NONE);
                if index == 0 && pushed == 1 {
                    found.ty = Some(result);
                    return found;
                }
                index -= pushed - popped;
                sp = inst.src(1);
            }
            Opcode::NewObj => {
                if index == act_rec_cells {
                    // The object itself, which has no temporary.
                    found.ty = Some(Type::OBJ);
                    return found;
                }
                index -= 1 + act_rec_cells;
                sp = inst.src(2);
            }
            _ => return found,
        }
    }
}
