//! Extra data attached to instructions, and compile-time constants
//!
//! Extra data is a small, non-SSA payload whose shape is fixed by the
//! opcode: a local slot for local loads and stores, constant bits for
//! constant definitions, a bytecode position for markers and a label id for
//! label definitions. [`Opcode::extra_kind`](super::Opcode::extra_kind)
//! names the shape each opcode expects.

use super::types::Type;
use std::fmt;

// ==================== Runtime handles ====================

macro_rules! runtime_handle {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

runtime_handle!(
    /// A function known at translation time
    FuncId,
    "Func"
);
runtime_handle!(
    /// A class known at translation time
    ClassId,
    "Cls"
);
runtime_handle!(
    /// A static (uncounted) array
    ArrayId,
    "Arr"
);
runtime_handle!(
    /// A named-entity cache slot
    NamedEntityId,
    "NamedEntity"
);
runtime_handle!(
    /// An interned static string; resolve through the factory's string table
    StrId,
    "Str"
);

/// Address in the translation cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tca(pub u64);

impl fmt::Display for Tca {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TCA({:#x})", self.0)
    }
}

/// A Rust value usable as the payload of a constant definition.
pub trait ConstValue: Copy {
    /// Lattice type of constants of this kind
    fn const_type(&self) -> Type;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl ConstValue for bool {
    fn const_type(&self) -> Type {
        Type::BOOL
    }
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

impl ConstValue for i64 {
    fn const_type(&self) -> Type {
        Type::INT
    }
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

impl ConstValue for f64 {
    fn const_type(&self) -> Type {
        Type::DBL
    }
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl ConstValue for Tca {
    fn const_type(&self) -> Type {
        Type::TCA
    }
    fn to_bits(self) -> u64 {
        self.0
    }
    fn from_bits(bits: u64) -> Self {
        Tca(bits)
    }
}

macro_rules! handle_const_value {
    ($($handle:ident => $ty:ident),* $(,)?) => {
        $(
            impl ConstValue for $handle {
                fn const_type(&self) -> Type {
                    Type::$ty
                }
                fn to_bits(self) -> u64 {
                    u64::from(self.0)
                }
                fn from_bits(bits: u64) -> Self {
                    $handle(bits as u32)
                }
            }
        )*
    };
}

handle_const_value! {
    FuncId => FUNC,
    ClassId => CLS,
    ArrayId => STATIC_ARR,
    NamedEntityId => NAMED_ENTITY,
    StrId => STATIC_STR,
}

// ==================== Payloads ====================

/// Index of a local variable slot in the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Raw bits of a compile-time constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstData {
    bits: u64,
}

impl ConstData {
    pub fn new<T: ConstValue>(value: T) -> Self {
        Self { bits: value.to_bits() }
    }

    pub fn from_raw(bits: u64) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn get<T: ConstValue>(&self) -> T {
        T::from_bits(self.bits)
    }
}

/// Bytecode position of the instructions that follow a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerData {
    pub bc_off: u32,
    /// Stack offset from the frame pointer at this position
    pub stack_off: i32,
    pub func: FuncId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelData {
    pub label_id: u32,
    pub func: Option<FuncId>,
}

/// Shape of the extra data an opcode carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraKind {
    Local,
    Const,
    Marker,
    Label,
}

/// Opcode-specific payload of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtraData {
    Local(LocalId),
    Const(ConstData),
    Marker(MarkerData),
    Label(LabelData),
}

impl ExtraData {
    pub fn kind(&self) -> ExtraKind {
        match self {
            ExtraData::Local(_) => ExtraKind::Local,
            ExtraData::Const(_) => ExtraKind::Const,
            ExtraData::Marker(_) => ExtraKind::Marker,
            ExtraData::Label(_) => ExtraKind::Label,
        }
    }
}

impl From<LocalId> for ExtraData {
    fn from(id: LocalId) -> Self {
        ExtraData::Local(id)
    }
}

impl From<ConstData> for ExtraData {
    fn from(data: ConstData) -> Self {
        ExtraData::Const(data)
    }
}

impl From<MarkerData> for ExtraData {
    fn from(data: MarkerData) -> Self {
        ExtraData::Marker(data)
    }
}

impl fmt::Display for ExtraData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraData::Local(id) => write!(f, "{}", id.0),
            ExtraData::Const(c) => write!(f, "{:#x}", c.bits),
            ExtraData::Marker(m) => {
                write!(f, "--- bc {}, spOff {}, {}", m.bc_off, m.stack_off, m.func)
            }
            ExtraData::Label(l) => write!(f, "L{}", l.label_id),
        }
    }
}

/// Fixed-offset runtime fields read and written with `LdRaw`/`StRaw`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RawMemSlot {
    ContLabel,
    ContDone,
    ContShouldThrow,
    ContRunning,
    ContArPtr,
    StrLen,
    FuncNumParams,
    FuncRefBitVec,
    FuncBody,
    MisBaseStrOff,
}

impl RawMemSlot {
    /// Type of the value stored in the slot.
    pub fn ty(self) -> Type {
        match self {
            RawMemSlot::ContLabel
            | RawMemSlot::StrLen
            | RawMemSlot::FuncNumParams
            | RawMemSlot::FuncRefBitVec => Type::INT,
            RawMemSlot::ContDone
            | RawMemSlot::ContShouldThrow
            | RawMemSlot::ContRunning
            | RawMemSlot::MisBaseStrOff => Type::BOOL,
            RawMemSlot::ContArPtr => Type::STK_PTR,
            RawMemSlot::FuncBody => Type::TCA,
        }
    }

    /// Width of the slot in bytes.
    pub fn size(self) -> u32 {
        match self {
            RawMemSlot::ContDone
            | RawMemSlot::ContShouldThrow
            | RawMemSlot::ContRunning
            | RawMemSlot::MisBaseStrOff => 1,
            RawMemSlot::StrLen => 4,
            _ => 8,
        }
    }

    /// Whether stores may write a value wider than the slot.
    pub fn allow_extra(self) -> bool {
        self == RawMemSlot::MisBaseStrOff
    }
}
