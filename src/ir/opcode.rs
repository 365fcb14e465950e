//! The IR instruction catalog
//!
//! Every opcode has one row in [`OPCODE_TABLE`]: a destination rule, a
//! source contract and a flag set. Type inference ([`super::output_type`])
//! and operand checking ([`super::check_operand_types`]) both read this
//! table, so adding an opcode means adding one row here.
//!
//! Row notation:
//!
//! | Destination | Meaning |
//! |-------------|---------|
//! | `ND` | no destination |
//! | `D(T)` | destination of type `T` |
//! | `DofS(n)` | destination has the type of source `n` |
//! | `DUnbox(n)` / `DBox(n)` | unboxed / boxed type of source `n` |
//! | `DParam` | the instruction's type parameter |
//! | `DLabel` | any number of destinations, wired by hand |
//! | `DVector` | value type computed by the member-operation effects |
//!
//! | Sources | Meaning |
//! |---------|---------|
//! | `NA` | no sources |
//! | `SUnk` | not checked |
//! | `S(T1, T2..)` | one source, a subtype of `T1 \| T2 ..` |
//! | `C(T)` | one constant source of type `T` |
//!
//! | Flag | Meaning |
//! |------|---------|
//! | `C` | can be CSEd |
//! | `E` | essential, never removed as dead code |
//! | `N` | calls a native helper |
//! | `PRc` | produces a counted reference |
//! | `CRc` | consumes a counted reference |
//! | `Refs` | may modify reference cells |
//! | `Rm` | rematerializable |
//! | `Er` | may raise an error |
//! | `Mem` | has memory effects |
//! | `T` | terminates its trace |

use super::extra::ExtraKind;
use super::types::Type;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Properties of an opcode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpFlags: u16 {
        const CAN_CSE = 1 << 0;
        const ESSENTIAL = 1 << 1;
        const CALLS_NATIVE = 1 << 2;
        const PRODUCES_RC = 1 << 3;
        const CONSUMES_RC = 1 << 4;
        const MODIFIES_REFS = 1 << 5;
        const REMATERIALIZABLE = 1 << 6;
        const MAY_RAISE_ERROR = 1 << 7;
        const MEM_EFFECTS = 1 << 8;
        const TERMINAL = 1 << 9;
    }
}

/// How the type of an instruction's destination is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestRule {
    None,
    Fixed(Type),
    OfSrc(usize),
    Unbox(usize),
    Box(usize),
    Param,
    Label,
    Vector,
}

/// Contract for one source operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcCheck {
    /// Subtype of the union of the listed types, printed in listed order
    Subtype(&'static [Type]),
    /// A compile-time constant of the given type
    Const(Type),
}

impl SrcCheck {
    pub fn expected_type(&self) -> Type {
        match self {
            SrcCheck::Subtype(types) => types.iter().fold(Type::BOTTOM, |acc, t| acc | *t),
            SrcCheck::Const(t) => *t,
        }
    }
}

impl fmt::Display for SrcCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrcCheck::Subtype(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{}", t)?;
                }
                Ok(())
            }
            SrcCheck::Const(t) => write!(f, "constant {}", t),
        }
    }
}

/// Contract for an instruction's source list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcContract {
    NoSrcs,
    Unchecked,
    Checked(&'static [SrcCheck]),
}

/// One row of the catalog
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub dst: DestRule,
    pub srcs: SrcContract,
    pub flags: OpFlags,
}

macro_rules! dest_rule {
    (ND) => { DestRule::None };
    (D($t:ident)) => { DestRule::Fixed(Type::$t) };
    (DofS($n:literal)) => { DestRule::OfSrc($n) };
    (DUnbox($n:literal)) => { DestRule::Unbox($n) };
    (DBox($n:literal)) => { DestRule::Box($n) };
    (DParam) => { DestRule::Param };
    (DLabel) => { DestRule::Label };
    (DVector) => { DestRule::Vector };
}

macro_rules! src_check {
    (S, $($t:ident),+) => { SrcCheck::Subtype(&[$(Type::$t),+]) };
    (C, $t:ident) => { SrcCheck::Const(Type::$t) };
}

macro_rules! src_contract {
    (NA) => { SrcContract::NoSrcs };
    (SUnk) => { SrcContract::Unchecked };
    ($($kind:ident($($t:ident),+))+) => {
        SrcContract::Checked(&[$(src_check!($kind, $($t),+)),+])
    };
}

macro_rules! op_flag {
    (C) => { OpFlags::CAN_CSE };
    (E) => { OpFlags::ESSENTIAL };
    (N) => { OpFlags::CALLS_NATIVE };
    (PRc) => { OpFlags::PRODUCES_RC };
    (CRc) => { OpFlags::CONSUMES_RC };
    (Refs) => { OpFlags::MODIFIES_REFS };
    (Rm) => { OpFlags::REMATERIALIZABLE };
    (Er) => { OpFlags::MAY_RAISE_ERROR };
    (Mem) => { OpFlags::MEM_EFFECTS };
    (T) => { OpFlags::TERMINAL };
}

macro_rules! ir_opcodes {
    ($($name:ident: ($($dst:tt)+) {$($src:tt)+} [$($flag:ident)|*],)+) => {
        /// IR opcodes. Declaration order is the catalog order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $($name,)+
        }

        /// The catalog, indexed by `Opcode as usize`.
        pub static OPCODE_TABLE: &[OpInfo] = &[
            $(OpInfo {
                name: stringify!($name),
                dst: dest_rule!($($dst)+),
                srcs: src_contract!($($src)+),
                flags: OpFlags::empty()$(.union(op_flag!($flag)))*,
            },)+
        ];

        impl Opcode {
            /// Every opcode in catalog order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)+];
        }
    };
}

ir_opcodes! {
    // ==================== Guards and arithmetic ====================
    GuardType: (DParam) {S(GEN)} [C|E],
    GuardLoc: (ND) {S(STK_PTR)} [E],
    GuardStk: (D(STK_PTR)) {S(STK_PTR) C(INT)} [E],
    AssertStk: (D(STK_PTR)) {S(STK_PTR) C(INT)} [E],
    GuardRefs: (ND) {SUnk} [E],
    AssertLoc: (ND) {S(STK_PTR)} [E],
    OpAdd: (DParam) {S(INT, BOOL, DBL) S(INT, BOOL, DBL)} [C],
    OpSub: (DParam) {S(INT, BOOL, DBL) S(INT, BOOL, DBL)} [C],
    OpAnd: (D(INT)) {S(INT, BOOL) S(INT, BOOL)} [C],
    OpOr: (D(INT)) {S(INT, BOOL, DBL) S(INT, BOOL, DBL)} [C],
    OpXor: (D(INT)) {S(INT, BOOL) S(INT, BOOL)} [C],
    OpMul: (DParam) {S(INT, BOOL, DBL) S(INT, BOOL, DBL)} [C],
    Conv: (DParam) {S(GEN)} [C|N],
    ExtendsClass: (D(BOOL)) {S(CLS) C(CLS)} [C],
    IsTypeMem: (D(BOOL)) {S(PTR_TO_GEN)} [],
    IsNTypeMem: (D(BOOL)) {S(PTR_TO_GEN)} [],

    // ==================== Query ops ====================
    // Keep these contiguous and in step with the fused branches below.
    OpGt: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpGte: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpLt: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpLte: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpEq: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpNeq: (D(BOOL)) {S(GEN) S(GEN)} [C],
    OpSame: (D(BOOL)) {S(GEN, CLS) S(GEN, CLS)} [C|N],
    OpNSame: (D(BOOL)) {S(GEN, CLS) S(GEN, CLS)} [C|N],
    InstanceOf: (D(BOOL)) {S(CLS) S(CLS) C(BOOL)} [C|N],
    NInstanceOf: (D(BOOL)) {S(CLS) S(CLS) C(BOOL)} [C|N],
    InstanceOfBitmask: (D(BOOL)) {S(CLS) C(STATIC_STR)} [C],
    NInstanceOfBitmask: (D(BOOL)) {S(CLS) C(STATIC_STR)} [C],
    IsType: (D(BOOL)) {S(CELL)} [C],
    IsNType: (D(BOOL)) {S(CELL)} [C],

    // ==================== Fused branches ====================
    JmpGt: (ND) {S(GEN) S(GEN)} [E],
    JmpGte: (ND) {S(GEN) S(GEN)} [E],
    JmpLt: (ND) {S(GEN) S(GEN)} [E],
    JmpLte: (ND) {S(GEN) S(GEN)} [E],
    JmpEq: (ND) {S(GEN) S(GEN)} [E],
    JmpNeq: (ND) {S(GEN) S(GEN)} [E],
    JmpSame: (ND) {S(GEN, CLS) S(GEN, CLS)} [E],
    JmpNSame: (ND) {S(GEN, CLS) S(GEN, CLS)} [E],
    JmpInstanceOf: (ND) {S(CLS) S(CLS) C(BOOL)} [E|N],
    JmpNInstanceOf: (ND) {S(CLS) S(CLS) C(BOOL)} [E|N],
    JmpInstanceOfBitmask: (ND) {S(CLS) C(STATIC_STR)} [E],
    JmpNInstanceOfBitmask: (ND) {S(CLS) C(STATIC_STR)} [E],
    JmpIsType: (ND) {SUnk} [E],
    JmpIsNType: (ND) {SUnk} [E],

    // ==================== Control flow ====================
    JmpZero: (ND) {S(INT, BOOL, DBL)} [E],
    JmpNZero: (ND) {S(INT, BOOL, DBL)} [E],
    Jmp: (ND) {SUnk} [T|E],
    JmpIndirect: (ND) {S(TCA)} [T|E],
    ExitWhenSurprised: (ND) {NA} [E],
    ExitOnVarEnv: (ND) {S(STK_PTR)} [E],
    ReleaseVVOrExit: (ND) {S(STK_PTR)} [E],
    CheckInit: (ND) {S(GEN)} [],

    // ==================== Boxing, loads ====================
    Unbox: (DUnbox(0)) {S(GEN)} [PRc],
    Box: (DBox(0)) {S(GEN)} [E|N|Mem|CRc|PRc],
    UnboxPtr: (D(PTR_TO_CELL)) {S(PTR_TO_GEN)} [],
    BoxPtr: (D(PTR_TO_BOXED_CELL)) {S(PTR_TO_GEN)} [N|Mem],
    LdStack: (DParam) {S(STK_PTR) C(INT)} [],
    LdLoc: (DParam) {S(STK_PTR)} [],
    LdStackAddr: (D(PTR_TO_GEN)) {SUnk} [C],
    LdLocAddr: (DParam) {S(STK_PTR)} [C],
    LdMem: (DParam) {S(PTR_TO_GEN) C(INT)} [],
    LdProp: (DParam) {S(OBJ) C(INT)} [],
    LdRef: (DParam) {S(BOXED_CELL)} [],
    LdThis: (D(OBJ)) {S(STK_PTR)} [C|Rm],
    LdCtx: (D(CTX)) {S(STK_PTR)} [C|Rm],
    LdCtxCls: (D(CLS)) {S(STK_PTR)} [C|Rm],
    LdRetAddr: (D(RET_ADDR)) {S(STK_PTR)} [],
    LdConst: (DParam) {NA} [C|Rm],
    DefConst: (DParam) {NA} [C],

    // ==================== Classes, methods, functions ====================
    LdCls: (D(CLS)) {S(STR) C(CLS)} [C|E|N|Refs|Er|Mem],
    LdClsCached: (D(CLS)) {C(STATIC_STR)} [C|E|Refs|Er|Mem],
    LdCachedClass: (D(CLS)) {C(STATIC_STR)} [C],
    LdClsCns: (DParam) {C(STATIC_STR) C(STATIC_STR)} [C],
    LookupClsCns: (DParam) {C(STATIC_STR) C(STATIC_STR)} [E|Refs|Er|N|Mem],
    LdClsMethodCache: (D(FUNC_CLS)) {SUnk} [C|Er],
    LdClsMethodFCache: (D(FUNC_CTX)) {C(CLS) C(STATIC_STR) S(OBJ, CLS, CTX)} [C|Er],
    GetCtxFwdCall: (D(CTX)) {S(OBJ, CLS, CTX) S(FUNC)} [C],
    LdClsMethod: (D(FUNC)) {S(CLS) C(INT)} [C],
    LdPropAddr: (D(PTR_TO_GEN)) {S(OBJ) C(INT)} [C],
    LdClsPropAddr: (D(PTR_TO_GEN)) {S(CLS) S(STR) C(CLS)} [C|E|N|Er],
    LdClsPropAddrCached: (D(PTR_TO_GEN)) {S(CLS) C(STATIC_STR) C(STATIC_STR) C(CLS)} [C|E|Er],
    LdObjMethod: (D(FUNC)) {C(INT) C(STATIC_STR) S(STK_PTR)} [C|E|N|Refs|Er],
    LdObjClass: (D(CLS)) {S(OBJ)} [C],
    LdFunc: (D(FUNC)) {S(STR)} [E|N|CRc|Er],
    LdFixedFunc: (D(FUNC)) {C(STATIC_STR)} [C|E|Er],
    LdARFuncPtr: (D(FUNC)) {S(STK_PTR) C(INT)} [C],
    LdContLocalsPtr: (D(PTR_TO_CELL)) {S(OBJ)} [C|Rm],
    NewObj: (D(STK_PTR)) {C(INT) S(STR, CLS) S(STK_PTR) S(STK_PTR)} [E|Mem|N|PRc],
    NewArray: (D(ARR)) {C(INT)} [E|Mem|N|PRc],
    NewTuple: (D(ARR)) {C(INT) S(STK_PTR)} [E|Mem|N|PRc|CRc],
    LdRaw: (DParam) {SUnk} [],

    // ==================== Activation records and calls ====================
    DefActRec: (D(ACT_REC)) {S(STK_PTR) S(FUNC, FUNC_CLS, FUNC_CTX, NULL) S(CTX, CLS, INIT_NULL) C(INT) S(STR, NULL)} [Mem],
    FreeActRec: (D(STK_PTR)) {S(STK_PTR)} [Mem],
    Call: (D(STK_PTR)) {SUnk} [E|Mem|CRc|Refs],
    NativeImpl: (ND) {C(FUNC) S(STK_PTR)} [E|Mem|N|Refs],
    RetCtrl: (ND) {S(STK_PTR, PTR_TO_GEN) S(STK_PTR) S(RET_ADDR)} [T|E|Mem],
    RetVal: (ND) {S(STK_PTR) S(GEN)} [E|Mem|CRc],
    RetAdjustStack: (D(STK_PTR)) {S(STK_PTR)} [E],

    // ==================== Stores ====================
    StMem: (ND) {S(PTR_TO_CELL) C(INT) S(GEN)} [E|Mem|CRc|Refs],
    StMemNT: (ND) {S(PTR_TO_CELL) C(INT) S(GEN)} [E|Mem|CRc],
    StProp: (ND) {S(OBJ) S(INT) S(GEN)} [E|Mem|CRc|Refs],
    StPropNT: (ND) {S(OBJ) S(INT) S(GEN)} [E|Mem|CRc],
    StLoc: (ND) {S(STK_PTR) S(GEN)} [E|Mem|CRc],
    StLocNT: (ND) {S(STK_PTR) S(GEN)} [E|Mem|CRc],
    StRef: (DBox(1)) {SUnk} [E|Mem|CRc|Refs],
    StRefNT: (DBox(1)) {SUnk} [E|Mem|CRc],
    StRaw: (ND) {SUnk} [E|Mem],
    SpillStack: (D(STK_PTR)) {SUnk} [E|Mem|CRc],

    // ==================== Exits ====================
    ExitTrace: (ND) {SUnk} [T|E],
    ExitTraceCc: (ND) {SUnk} [T|E],
    ExitSlow: (ND) {SUnk} [T|E],
    ExitSlowNoProgress: (ND) {SUnk} [T|E],
    ExitGuardFailure: (ND) {SUnk} [T|E],
    SyncVMRegs: (ND) {S(STK_PTR) S(STK_PTR)} [E],

    // ==================== Copies and reference counting ====================
    Mov: (DofS(0)) {SUnk} [C],
    LdAddr: (DofS(0)) {SUnk} [C],
    IncRef: (DofS(0)) {S(GEN)} [Mem|PRc],
    DecRefLoc: (ND) {S(STK_PTR)} [E|Mem|Refs],
    DecRefStack: (ND) {S(STK_PTR) C(INT)} [E|Mem|Refs],
    DecRefThis: (ND) {SUnk} [E|Mem|Refs],
    GenericRetDecRefs: (D(STK_PTR)) {S(STK_PTR) S(GEN) C(INT)} [E|N|Mem|Refs],
    DecRef: (ND) {S(GEN)} [E|Mem|CRc|Refs],
    DecRefMem: (ND) {S(PTR_TO_GEN) C(INT)} [E|Mem|CRc|Refs],
    DecRefNZ: (ND) {S(GEN)} [Mem|CRc],

    // ==================== Trace structure ====================
    DefLabel: (DLabel) {SUnk} [E],
    Marker: (ND) {NA} [E],
    DefFP: (D(STK_PTR)) {NA} [E],
    DefSP: (D(STK_PTR)) {S(STK_PTR) C(INT)} [E],

    // ==================== Runtime helpers ====================
    RaiseUninitWarning: (ND) {S(STR)} [E|N|Mem|Refs|Er],
    PrintStr: (ND) {S(STR)} [E|N|Mem|CRc],
    PrintInt: (ND) {S(INT)} [E|N|Mem|CRc],
    PrintBool: (ND) {S(BOOL)} [E|N|Mem|CRc],
    AddElemStrKey: (D(ARR)) {S(ARR) S(STR) S(CELL)} [N|Mem|CRc|PRc|Refs],
    AddElemIntKey: (D(ARR)) {S(ARR) S(INT) S(CELL)} [N|Mem|CRc|PRc|Refs],
    AddNewElem: (D(ARR)) {SUnk} [N|Mem|CRc|PRc],
    DefCns: (D(BOOL)) {SUnk} [C|E|N|Mem],
    Concat: (D(STR)) {S(GEN) S(GEN)} [N|Mem|CRc|PRc|Refs],
    ArrayAdd: (D(ARR)) {SUnk} [N|Mem|CRc|PRc],
    DefCls: (ND) {SUnk} [C|E|N],
    DefFunc: (ND) {SUnk} [C|E|N],
    AKExists: (D(BOOL)) {S(CELL) S(CELL)} [C|N],
    InterpOne: (D(STK_PTR)) {SUnk} [E|N|Mem|Refs|Er],

    // ==================== Register allocation ====================
    Spill: (DofS(0)) {SUnk} [Mem],
    Reload: (DofS(0)) {SUnk} [Mem],
    AllocSpill: (ND) {C(INT)} [E|Mem],
    FreeSpill: (ND) {C(INT)} [E|Mem],

    // ==================== Continuations ====================
    CreateCont: (D(OBJ)) {C(TCA) S(STK_PTR) C(BOOL) C(FUNC) C(FUNC)} [E|N|Mem|PRc],
    FillContLocals: (ND) {S(STK_PTR) C(FUNC) C(FUNC) S(OBJ)} [E|N|Mem],
    FillContThis: (ND) {S(STK_PTR) C(FUNC) C(FUNC) S(OBJ)} [E|Mem],
    ContEnter: (ND) {SUnk} [E|Mem],
    UnlinkContVarEnv: (ND) {S(STK_PTR)} [E|N|Mem],
    LinkContVarEnv: (ND) {S(STK_PTR)} [E|N|Mem],
    ContRaiseCheck: (ND) {S(OBJ)} [E],
    ContPreNext: (ND) {S(OBJ)} [E|Mem],
    ContStartedCheck: (ND) {S(OBJ)} [E],

    // ==================== Iterators ====================
    IterInit: (D(BOOL)) {S(ARR, OBJ) S(STK_PTR) C(INT) C(INT)} [N|Mem|Refs|CRc],
    IterInitK: (D(BOOL)) {S(ARR, OBJ) S(STK_PTR) C(INT) C(INT) C(INT)} [N|Mem|Refs|CRc],
    IterNext: (D(BOOL)) {S(STK_PTR) C(INT) C(INT)} [N|Mem|Refs],
    IterNextK: (D(BOOL)) {S(STK_PTR) C(INT) C(INT) C(INT)} [N|Mem|Refs],

    // ==================== Member instructions ====================
    DefMIStateBase: (D(PTR_TO_CELL)) {NA} [],
    PropX: (D(PTR_TO_GEN)) {C(TCA) C(CLS) S(OBJ, PTR_TO_GEN) S(GEN) S(PTR_TO_CELL)} [E|N|Mem|Refs|Er],
    CGetProp: (D(CELL)) {C(TCA) C(CLS) S(OBJ, PTR_TO_GEN) S(GEN) S(PTR_TO_CELL)} [E|N|Mem|Refs|Er],
    SetProp: (DVector) {C(TCA) C(CLS) S(OBJ, PTR_TO_GEN) S(GEN) S(CELL)} [E|N|Mem|Refs|Er],
    CGetElem: (D(CELL)) {C(TCA) S(PTR_TO_GEN) S(GEN) S(PTR_TO_CELL)} [E|N|Mem|Refs|Er],
    SetElem: (DVector) {C(TCA) S(PTR_TO_GEN) S(GEN) S(CELL)} [E|N|Mem|Refs|Er],

    // ==================== Misc ====================
    IncStat: (ND) {C(INT) C(INT) C(BOOL)} [E|Mem],
    DbgAssertRefCount: (ND) {SUnk} [E],
    Nop: (ND) {NA} [],
}

// Query ops map onto fused branches by a constant offset.
const _: () = {
    let queries = Opcode::IsNType as u16 - Opcode::OpGt as u16;
    let branches = Opcode::JmpIsNType as u16 - Opcode::JmpGt as u16;
    assert!(queries == branches, "query ops and fused branches are out of step");
    assert!(Opcode::JmpEq as u16 - Opcode::JmpGt as u16 == Opcode::OpEq as u16 - Opcode::OpGt as u16);
    assert!(Opcode::JmpIsType as u16 - Opcode::JmpGt as u16 == Opcode::IsType as u16 - Opcode::OpGt as u16);
};

/// Kind of a trace exit, one per exit opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    Normal,
    NormalCc,
    Slow,
    SlowNoProgress,
    GuardFailure,
}

impl ExitKind {
    pub fn opcode(self) -> Opcode {
        match self {
            ExitKind::Normal => Opcode::ExitTrace,
            ExitKind::NormalCc => Opcode::ExitTraceCc,
            ExitKind::Slow => Opcode::ExitSlow,
            ExitKind::SlowNoProgress => Opcode::ExitSlowNoProgress,
            ExitKind::GuardFailure => Opcode::ExitGuardFailure,
        }
    }

    pub fn is_slow(self) -> bool {
        matches!(self, ExitKind::Slow | ExitKind::SlowNoProgress)
    }
}

impl Opcode {
    #[inline]
    pub fn info(self) -> &'static OpInfo {
        &OPCODE_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn flags(self) -> OpFlags {
        self.info().flags
    }

    pub fn has_flags(self, flags: OpFlags) -> bool {
        self.flags().contains(flags)
    }

    pub fn dest_rule(self) -> DestRule {
        self.info().dst
    }

    pub fn src_contract(self) -> SrcContract {
        self.info().srcs
    }

    /// Exactly one destination Value.
    pub fn has_dst(self) -> bool {
        !matches!(self.dest_rule(), DestRule::None | DestRule::Label)
    }

    /// Any number of hand-wired destinations.
    pub fn nary_dst(self) -> bool {
        self.dest_rule() == DestRule::Label
    }

    /// Shape of the extra data this opcode carries, if any.
    pub fn extra_kind(self) -> Option<ExtraKind> {
        match self {
            Opcode::GuardLoc
            | Opcode::AssertLoc
            | Opcode::LdLocAddr
            | Opcode::DecRefLoc
            | Opcode::LdLoc
            | Opcode::StLoc
            | Opcode::StLocNT => Some(ExtraKind::Local),
            Opcode::DefConst | Opcode::LdConst => Some(ExtraKind::Const),
            Opcode::Marker => Some(ExtraKind::Marker),
            Opcode::DefLabel => Some(ExtraKind::Label),
            _ => None,
        }
    }

    fn offset_from(self, base: Opcode) -> usize {
        self as usize - base as usize
    }

    pub fn is_cmp_op(self) -> bool {
        (Opcode::OpGt..=Opcode::OpNSame).contains(&self)
    }

    /// A query op returns a Bool and can be negated and fused into a branch.
    pub fn is_query_op(self) -> bool {
        (Opcode::OpGt..=Opcode::IsNType).contains(&self)
    }

    pub fn is_query_jmp_op(self) -> bool {
        (Opcode::JmpGt..=Opcode::JmpIsNType).contains(&self)
    }

    pub fn query_to_jmp_op(self) -> Opcode {
        assert!(self.is_query_op(), "{} is not a query op", self);
        Opcode::ALL[Opcode::JmpGt as usize + self.offset_from(Opcode::OpGt)]
    }

    pub fn query_jmp_to_query_op(self) -> Opcode {
        assert!(self.is_query_jmp_op(), "{} is not a fused branch", self);
        Opcode::ALL[Opcode::OpGt as usize + self.offset_from(Opcode::JmpGt)]
    }

    /// Instance checks are too expensive to repeat in a fused branch.
    pub fn disable_branch_fusion(self) -> bool {
        matches!(
            self,
            Opcode::InstanceOf
                | Opcode::NInstanceOf
                | Opcode::InstanceOfBitmask
                | Opcode::NInstanceOfBitmask
        )
    }

    pub fn negate_query_op(self) -> Opcode {
        match self {
            Opcode::OpGt => Opcode::OpLte,
            Opcode::OpGte => Opcode::OpLt,
            Opcode::OpLt => Opcode::OpGte,
            Opcode::OpLte => Opcode::OpGt,
            Opcode::OpEq => Opcode::OpNeq,
            Opcode::OpNeq => Opcode::OpEq,
            Opcode::OpSame => Opcode::OpNSame,
            Opcode::OpNSame => Opcode::OpSame,
            Opcode::InstanceOf => Opcode::NInstanceOf,
            Opcode::NInstanceOf => Opcode::InstanceOf,
            Opcode::InstanceOfBitmask => Opcode::NInstanceOfBitmask,
            Opcode::NInstanceOfBitmask => Opcode::InstanceOfBitmask,
            Opcode::IsType => Opcode::IsNType,
            Opcode::IsNType => Opcode::IsType,
            _ => panic!("{} is not a query op", self),
        }
    }

    /// The comparison with its operands swapped.
    pub fn commute_query_op(self) -> Opcode {
        match self {
            Opcode::OpGt => Opcode::OpLt,
            Opcode::OpGte => Opcode::OpLte,
            Opcode::OpLt => Opcode::OpGt,
            Opcode::OpLte => Opcode::OpGte,
            Opcode::OpEq | Opcode::OpNeq | Opcode::OpSame | Opcode::OpNSame => self,
            _ => panic!("{} is not a comparison", self),
        }
    }

    pub fn exit_kind(self) -> Option<ExitKind> {
        match self {
            Opcode::ExitTrace => Some(ExitKind::Normal),
            Opcode::ExitTraceCc => Some(ExitKind::NormalCc),
            Opcode::ExitSlow => Some(ExitKind::Slow),
            Opcode::ExitSlowNoProgress => Some(ExitKind::SlowNoProgress),
            Opcode::ExitGuardFailure => Some(ExitKind::GuardFailure),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparisons involving objects may call back into user code.
pub fn cmp_op_types_may_reenter(op: Opcode, t0: Type, t1: Type) -> bool {
    if matches!(op, Opcode::OpSame | Opcode::OpNSame) {
        return false;
    }
    let maybe_obj = |t: Type| t.unbox().maybe(Type::OBJ);
    maybe_obj(t0) || maybe_obj(t1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_enum() {
        assert_eq!(OPCODE_TABLE.len(), Opcode::ALL.len());
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(format!("{:?}", op), op.name());
        }
    }

    #[test]
    fn test_query_ops_pair_with_branches() {
        for op in Opcode::ALL.iter().copied().filter(|op| op.is_query_op()) {
            let jmp = op.query_to_jmp_op();
            assert!(jmp.is_query_jmp_op());
            assert_eq!(jmp.name(), format!("Jmp{}", op.name().trim_start_matches("Op")));
            assert_eq!(jmp.query_jmp_to_query_op(), op);
            assert_eq!(op.dest_rule(), DestRule::Fixed(Type::BOOL));
            assert_eq!(op.negate_query_op().negate_query_op(), op);
        }
    }

    #[test]
    fn test_flags() {
        assert!(Opcode::OpAdd.has_flags(OpFlags::CAN_CSE));
        assert!(Opcode::Jmp.has_flags(OpFlags::TERMINAL | OpFlags::ESSENTIAL));
        assert!(Opcode::Box.has_flags(OpFlags::PRODUCES_RC | OpFlags::CONSUMES_RC));
        assert!(Opcode::Nop.flags().is_empty());
        assert!(Opcode::LdConst.has_flags(OpFlags::REMATERIALIZABLE));
    }

    #[test]
    fn test_src_check_display() {
        let SrcContract::Checked(checks) = Opcode::OpAdd.src_contract() else {
            panic!("OpAdd sources are checked");
        };
        assert_eq!(checks[0].to_string(), "Int|Bool|Dbl");
        assert_eq!(checks[0].expected_type(), Type::INT | Type::BOOL | Type::DBL);
        let SrcContract::Checked(checks) = Opcode::LdClsCached.src_contract() else {
            panic!("LdClsCached sources are checked");
        };
        assert_eq!(checks[0].to_string(), "constant StaticStr");
    }

    #[test]
    fn test_commute_and_exits() {
        assert_eq!(Opcode::OpGt.commute_query_op(), Opcode::OpLt);
        assert_eq!(Opcode::OpEq.commute_query_op(), Opcode::OpEq);
        for kind in [
            ExitKind::Normal,
            ExitKind::NormalCc,
            ExitKind::Slow,
            ExitKind::SlowNoProgress,
            ExitKind::GuardFailure,
        ] {
            assert_eq!(kind.opcode().exit_kind(), Some(kind));
        }
        assert!(ExitKind::SlowNoProgress.is_slow());
    }

    #[test]
    fn test_dest_shapes() {
        assert!(Opcode::Mov.has_dst());
        assert!(!Opcode::StLoc.has_dst());
        assert!(Opcode::DefLabel.nary_dst());
        assert!(!Opcode::DefLabel.has_dst());
        assert_eq!(Opcode::LdLoc.extra_kind(), Some(ExtraKind::Local));
    }

    #[test]
    fn test_cmp_reentry() {
        assert!(cmp_op_types_may_reenter(Opcode::OpEq, Type::OBJ, Type::STR));
        assert!(!cmp_op_types_may_reenter(Opcode::OpSame, Type::OBJ, Type::STR));
        assert!(!cmp_op_types_may_reenter(Opcode::OpLt, Type::INT, Type::DBL));
    }
}
