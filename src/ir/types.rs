//! The IR type lattice
//!
//! A [`Type`] is a 64-bit set of value-kind flags. The low ten bits are the
//! primitive PHP value kinds; three more bands of ten bits hold the same kinds
//! behind a reference cell (`Boxed*`), behind a pointer to a storage slot
//! (`PtrTo*`) and behind a pointer to a boxed slot (`PtrToBoxed*`). Bits 40 and
//! up are runtime-internal kinds (classes, functions, stack pointers, ...).
//!
//! Subtyping is bit containment, union is bitwise or, intersection is bitwise
//! and. Only the predefined unions listed in this module are ever produced by
//! [`Type::union_of`].

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const BOX_SHIFT: u32 = 10;
const PTR_SHIFT: u32 = BOX_SHIFT * 2;
const PTR_BOX_SHIFT: u32 = BOX_SHIFT + PTR_SHIFT;

bitflags! {
    /// A set of value kinds. See the module docs for the bit layout.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Type: u64 {
        // ==================== PHP values ====================
        const UNINIT = 1 << 0;
        const INIT_NULL = 1 << 1;
        const BOOL = 1 << 2;
        const INT = 1 << 3;
        const DBL = 1 << 4;
        const STATIC_STR = 1 << 5;
        const COUNTED_STR = 1 << 6;
        const STATIC_ARR = 1 << 7;
        const COUNTED_ARR = 1 << 8;
        const OBJ = 1 << 9;

        // Ordered from most to least specific.
        const NULL = Self::UNINIT.bits() | Self::INIT_NULL.bits();
        const STR = Self::STATIC_STR.bits() | Self::COUNTED_STR.bits();
        const ARR = Self::STATIC_ARR.bits() | Self::COUNTED_ARR.bits();
        const UNCOUNTED_INIT = Self::INIT_NULL.bits() | Self::BOOL.bits() | Self::INT.bits()
            | Self::DBL.bits() | Self::STATIC_STR.bits() | Self::STATIC_ARR.bits();
        const UNCOUNTED = Self::UNCOUNTED_INIT.bits() | Self::UNINIT.bits();
        const CELL = Self::UNCOUNTED.bits() | Self::STR.bits() | Self::ARR.bits() | Self::OBJ.bits();

        // ==================== Boxed values ====================
        const BOXED_UNINIT = Self::UNINIT.bits() << BOX_SHIFT;
        const BOXED_INIT_NULL = Self::INIT_NULL.bits() << BOX_SHIFT;
        const BOXED_BOOL = Self::BOOL.bits() << BOX_SHIFT;
        const BOXED_INT = Self::INT.bits() << BOX_SHIFT;
        const BOXED_DBL = Self::DBL.bits() << BOX_SHIFT;
        const BOXED_STATIC_STR = Self::STATIC_STR.bits() << BOX_SHIFT;
        const BOXED_COUNTED_STR = Self::COUNTED_STR.bits() << BOX_SHIFT;
        const BOXED_STATIC_ARR = Self::STATIC_ARR.bits() << BOX_SHIFT;
        const BOXED_COUNTED_ARR = Self::COUNTED_ARR.bits() << BOX_SHIFT;
        const BOXED_OBJ = Self::OBJ.bits() << BOX_SHIFT;
        const BOXED_NULL = Self::NULL.bits() << BOX_SHIFT;
        const BOXED_STR = Self::STR.bits() << BOX_SHIFT;
        const BOXED_ARR = Self::ARR.bits() << BOX_SHIFT;
        const BOXED_UNCOUNTED_INIT = Self::UNCOUNTED_INIT.bits() << BOX_SHIFT;
        const BOXED_UNCOUNTED = Self::UNCOUNTED.bits() << BOX_SHIFT;
        const BOXED_CELL = Self::CELL.bits() << BOX_SHIFT;

        // ==================== Pointers to values ====================
        const PTR_TO_UNINIT = Self::UNINIT.bits() << PTR_SHIFT;
        const PTR_TO_INIT_NULL = Self::INIT_NULL.bits() << PTR_SHIFT;
        const PTR_TO_BOOL = Self::BOOL.bits() << PTR_SHIFT;
        const PTR_TO_INT = Self::INT.bits() << PTR_SHIFT;
        const PTR_TO_DBL = Self::DBL.bits() << PTR_SHIFT;
        const PTR_TO_STATIC_STR = Self::STATIC_STR.bits() << PTR_SHIFT;
        const PTR_TO_COUNTED_STR = Self::COUNTED_STR.bits() << PTR_SHIFT;
        const PTR_TO_STATIC_ARR = Self::STATIC_ARR.bits() << PTR_SHIFT;
        const PTR_TO_COUNTED_ARR = Self::COUNTED_ARR.bits() << PTR_SHIFT;
        const PTR_TO_OBJ = Self::OBJ.bits() << PTR_SHIFT;
        const PTR_TO_NULL = Self::NULL.bits() << PTR_SHIFT;
        const PTR_TO_STR = Self::STR.bits() << PTR_SHIFT;
        const PTR_TO_ARR = Self::ARR.bits() << PTR_SHIFT;
        const PTR_TO_UNCOUNTED_INIT = Self::UNCOUNTED_INIT.bits() << PTR_SHIFT;
        const PTR_TO_UNCOUNTED = Self::UNCOUNTED.bits() << PTR_SHIFT;
        const PTR_TO_CELL = Self::CELL.bits() << PTR_SHIFT;

        // ==================== Pointers to boxed values ====================
        const PTR_TO_BOXED_UNINIT = Self::UNINIT.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_INIT_NULL = Self::INIT_NULL.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_BOOL = Self::BOOL.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_INT = Self::INT.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_DBL = Self::DBL.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_STATIC_STR = Self::STATIC_STR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_COUNTED_STR = Self::COUNTED_STR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_STATIC_ARR = Self::STATIC_ARR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_COUNTED_ARR = Self::COUNTED_ARR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_OBJ = Self::OBJ.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_NULL = Self::NULL.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_STR = Self::STR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_ARR = Self::ARR.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_UNCOUNTED_INIT = Self::UNCOUNTED_INIT.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_UNCOUNTED = Self::UNCOUNTED.bits() << PTR_BOX_SHIFT;
        const PTR_TO_BOXED_CELL = Self::CELL.bits() << PTR_BOX_SHIFT;

        // ==================== Runtime kinds ====================
        const CLS = 1 << 40;
        const FUNC = 1 << 41;
        const VAR_ENV = 1 << 42;
        const NAMED_ENTITY = 1 << 43;
        /// A function paired with a class context.
        const FUNC_CLS = 1 << 44;
        /// A function paired with an object context.
        const FUNC_OBJ = 1 << 45;
        /// A class pointer tagged as a static context.
        const CCTX = 1 << 46;
        const RET_ADDR = 1 << 47;
        /// Any pointer into the VM stack (stack or frame pointer).
        const STK_PTR = 1 << 48;
        const TCA = 1 << 49;
        const ACT_REC = 1 << 50;
        const NONE = 1 << 51;

        const CTX = Self::OBJ.bits() | Self::CCTX.bits();
        const FUNC_CTX = Self::FUNC_CLS.bits() | Self::FUNC_OBJ.bits();

        // ==================== Special ====================
        const BOTTOM = 0;
        const COUNTED = Self::COUNTED_STR.bits() | Self::COUNTED_ARR.bits() | Self::OBJ.bits()
            | Self::BOXED_CELL.bits();
        const PTR_TO_COUNTED = Self::COUNTED.bits() << PTR_SHIFT;
        const GEN = Self::CELL.bits() | Self::BOXED_CELL.bits();
        const PTR_TO_GEN = Self::GEN.bits() << PTR_SHIFT;
    }
}

/// Canonical names of every predefined type.
static TYPE_NAMES: &[(Type, &str)] = &[
    (Type::UNINIT, "Uninit"),
    (Type::INIT_NULL, "InitNull"),
    (Type::BOOL, "Bool"),
    (Type::INT, "Int"),
    (Type::DBL, "Dbl"),
    (Type::STATIC_STR, "StaticStr"),
    (Type::COUNTED_STR, "CountedStr"),
    (Type::STATIC_ARR, "StaticArr"),
    (Type::COUNTED_ARR, "CountedArr"),
    (Type::OBJ, "Obj"),
    (Type::NULL, "Null"),
    (Type::STR, "Str"),
    (Type::ARR, "Arr"),
    (Type::UNCOUNTED_INIT, "UncountedInit"),
    (Type::UNCOUNTED, "Uncounted"),
    (Type::CELL, "Cell"),
    (Type::BOXED_UNINIT, "BoxedUninit"),
    (Type::BOXED_INIT_NULL, "BoxedInitNull"),
    (Type::BOXED_BOOL, "BoxedBool"),
    (Type::BOXED_INT, "BoxedInt"),
    (Type::BOXED_DBL, "BoxedDbl"),
    (Type::BOXED_STATIC_STR, "BoxedStaticStr"),
    (Type::BOXED_COUNTED_STR, "BoxedCountedStr"),
    (Type::BOXED_STATIC_ARR, "BoxedStaticArr"),
    (Type::BOXED_COUNTED_ARR, "BoxedCountedArr"),
    (Type::BOXED_OBJ, "BoxedObj"),
    (Type::BOXED_NULL, "BoxedNull"),
    (Type::BOXED_STR, "BoxedStr"),
    (Type::BOXED_ARR, "BoxedArr"),
    (Type::BOXED_UNCOUNTED_INIT, "BoxedUncountedInit"),
    (Type::BOXED_UNCOUNTED, "BoxedUncounted"),
    (Type::BOXED_CELL, "BoxedCell"),
    (Type::PTR_TO_UNINIT, "PtrToUninit"),
    (Type::PTR_TO_INIT_NULL, "PtrToInitNull"),
    (Type::PTR_TO_BOOL, "PtrToBool"),
    (Type::PTR_TO_INT, "PtrToInt"),
    (Type::PTR_TO_DBL, "PtrToDbl"),
    (Type::PTR_TO_STATIC_STR, "PtrToStaticStr"),
    (Type::PTR_TO_COUNTED_STR, "PtrToCountedStr"),
    (Type::PTR_TO_STATIC_ARR, "PtrToStaticArr"),
    (Type::PTR_TO_COUNTED_ARR, "PtrToCountedArr"),
    (Type::PTR_TO_OBJ, "PtrToObj"),
    (Type::PTR_TO_NULL, "PtrToNull"),
    (Type::PTR_TO_STR, "PtrToStr"),
    (Type::PTR_TO_ARR, "PtrToArr"),
    (Type::PTR_TO_UNCOUNTED_INIT, "PtrToUncountedInit"),
    (Type::PTR_TO_UNCOUNTED, "PtrToUncounted"),
    (Type::PTR_TO_CELL, "PtrToCell"),
    (Type::PTR_TO_BOXED_UNINIT, "PtrToBoxedUninit"),
    (Type::PTR_TO_BOXED_INIT_NULL, "PtrToBoxedInitNull"),
    (Type::PTR_TO_BOXED_BOOL, "PtrToBoxedBool"),
    (Type::PTR_TO_BOXED_INT, "PtrToBoxedInt"),
    (Type::PTR_TO_BOXED_DBL, "PtrToBoxedDbl"),
    (Type::PTR_TO_BOXED_STATIC_STR, "PtrToBoxedStaticStr"),
    (Type::PTR_TO_BOXED_COUNTED_STR, "PtrToBoxedCountedStr"),
    (Type::PTR_TO_BOXED_STATIC_ARR, "PtrToBoxedStaticArr"),
    (Type::PTR_TO_BOXED_COUNTED_ARR, "PtrToBoxedCountedArr"),
    (Type::PTR_TO_BOXED_OBJ, "PtrToBoxedObj"),
    (Type::PTR_TO_BOXED_NULL, "PtrToBoxedNull"),
    (Type::PTR_TO_BOXED_STR, "PtrToBoxedStr"),
    (Type::PTR_TO_BOXED_ARR, "PtrToBoxedArr"),
    (Type::PTR_TO_BOXED_UNCOUNTED_INIT, "PtrToBoxedUncountedInit"),
    (Type::PTR_TO_BOXED_UNCOUNTED, "PtrToBoxedUncounted"),
    (Type::PTR_TO_BOXED_CELL, "PtrToBoxedCell"),
    (Type::CLS, "Cls"),
    (Type::FUNC, "Func"),
    (Type::VAR_ENV, "VarEnv"),
    (Type::NAMED_ENTITY, "NamedEntity"),
    (Type::FUNC_CLS, "FuncCls"),
    (Type::FUNC_OBJ, "FuncObj"),
    (Type::CCTX, "Cctx"),
    (Type::RET_ADDR, "RetAddr"),
    (Type::STK_PTR, "StkPtr"),
    (Type::TCA, "TCA"),
    (Type::ACT_REC, "ActRec"),
    (Type::NONE, "None"),
    (Type::CTX, "Ctx"),
    (Type::FUNC_CTX, "FuncCtx"),
    (Type::BOTTOM, "Bottom"),
    (Type::COUNTED, "Counted"),
    (Type::PTR_TO_COUNTED, "PtrToCounted"),
    (Type::GEN, "Gen"),
    (Type::PTR_TO_GEN, "PtrToGen"),
];

/// Targets of [`Type::union_of`], in non-decreasing order of generality.
const UNION_TARGETS: [Type; 13] = [
    Type::NULL,
    Type::BOXED_NULL,
    Type::STR,
    Type::BOXED_STR,
    Type::ARR,
    Type::BOXED_ARR,
    Type::UNCOUNTED_INIT,
    Type::BOXED_UNCOUNTED_INIT,
    Type::UNCOUNTED,
    Type::BOXED_UNCOUNTED,
    Type::CELL,
    Type::BOXED_CELL,
    Type::GEN,
];

impl Type {
    /// Non-strict subtype check: every kind in `self` is also in `other`.
    pub fn subtype_of(self, other: Type) -> bool {
        (self.bits() & other.bits()) == self.bits()
    }

    pub fn strict_subtype_of(self, other: Type) -> bool {
        self != other && self.subtype_of(other)
    }

    /// True if some kind is shared with `other`.
    pub fn maybe(self, other: Type) -> bool {
        self.intersects(other)
    }

    pub fn is_boxed(self) -> bool {
        self.subtype_of(Type::BOXED_CELL)
    }

    pub fn not_boxed(self) -> bool {
        self.subtype_of(Type::CELL)
    }

    pub fn maybe_boxed(self) -> bool {
        self.intersects(Type::BOXED_CELL)
    }

    pub fn is_ptr(self) -> bool {
        self.subtype_of(Type::PTR_TO_GEN)
    }

    pub fn is_counted(self) -> bool {
        self.subtype_of(Type::COUNTED)
    }

    pub fn maybe_counted(self) -> bool {
        self.intersects(Type::COUNTED)
    }

    pub fn not_counted(self) -> bool {
        !self.maybe_counted()
    }

    pub fn is_null(self) -> bool {
        self.subtype_of(Type::NULL)
    }

    pub fn is_string(self) -> bool {
        self.subtype_of(Type::STR)
    }

    pub fn is_array(self) -> bool {
        self.subtype_of(Type::ARR)
    }

    /// True if the type cannot hold an uninitialized value.
    pub fn is_init(self) -> bool {
        !Type::UNINIT.subtype_of(self)
    }

    pub fn maybe_uninit(self) -> bool {
        !self.is_init()
    }

    /// Whether code can dispatch on this type without a runtime tag check.
    ///
    /// `Str`, `Arr` and `Null` are unions but count as known, as does any
    /// union of purely boxed kinds.
    pub fn is_statically_known(self) -> bool {
        let pseudo_union = |t: Type| t.is_string() || t.is_array() || t.is_null();
        if pseudo_union(self) || (self.is_ptr() && pseudo_union(self.deref())) || self.is_boxed() {
            return true;
        }
        let bits = self.bits();
        bits & bits.wrapping_sub(1) == 0
    }

    pub fn is_statically_known_unboxed(self) -> bool {
        self.is_statically_known() && self.not_boxed()
    }

    pub fn needs_static_bit_check(self) -> bool {
        self.intersects(Type::STATIC_STR | Type::STATIC_ARR)
    }

    /// Destroying a value of this type may run user code.
    pub fn can_run_dtor(self) -> bool {
        self.intersects(Type::OBJ | Type::COUNTED_ARR | Type::BOXED_OBJ | Type::BOXED_COUNTED_ARR)
    }

    /// The type held inside a reference cell.
    pub fn inner_type(self) -> Type {
        assert!(self.is_boxed(), "inner_type of non-boxed type {}", self);
        Type::from_bits_retain(self.bits() >> BOX_SHIFT)
    }

    /// Returns the more refined of two related types.
    pub fn most_refined(t1: Type, t2: Type) -> Type {
        assert!(
            t1.subtype_of(t2) || t2.subtype_of(t1),
            "most_refined of unrelated types {} and {}",
            t1,
            t2
        );
        if t1.subtype_of(t2) {
            t1
        } else {
            t2
        }
    }

    /// Result type of an arithmetic operation: doubles win over ints.
    pub fn bin_arith_result_type(t1: Type, t2: Type) -> Type {
        if t1.subtype_of(Type::DBL) || t2.subtype_of(Type::DBL) {
            Type::DBL
        } else {
            Type::INT
        }
    }

    /// The least predefined supertype of both `t1` and `t2`.
    ///
    /// Both types must be program values (subtypes of `Gen`) unless they are
    /// equal.
    pub fn union_of(t1: Type, t2: Type) -> Type {
        assert_eq!(
            t1.subtype_of(Type::GEN),
            t2.subtype_of(Type::GEN),
            "union_of across value and non-value types: {} and {}",
            t1,
            t2
        );
        assert!(t1.subtype_of(Type::GEN) || t1 == t2, "union_of non-value types {} and {}", t1, t2);
        if t1 == t2 || t2.subtype_of(t1) {
            return t1;
        }
        if t1.subtype_of(t2) {
            return t2;
        }
        let joined = t1 | t2;
        UNION_TARGETS
            .iter()
            .copied()
            .find(|&u| joined.subtype_of(u))
            .unwrap_or(Type::GEN)
    }

    /// The type of a reference cell holding a value of this type.
    ///
    /// Boxing an uninitialized value yields a boxed null.
    pub fn boxed(self) -> Type {
        assert!(self.subtype_of(Type::GEN), "cannot box {}", self);
        assert!(self.not_boxed(), "cannot box already boxed {}", self);
        if self.subtype_of(Type::UNINIT) {
            return Type::BOXED_NULL;
        }
        Type::from_bits_retain(self.bits() << BOX_SHIFT)
    }

    /// Type of the value read through a possibly boxed value.
    pub fn unbox(self) -> Type {
        assert!(self.subtype_of(Type::GEN), "cannot unbox {}", self);
        (self & Type::CELL) | Type::from_bits_retain((self & Type::BOXED_CELL).bits() >> BOX_SHIFT)
    }

    pub fn deref(self) -> Type {
        assert!(self.is_ptr(), "deref of non-pointer {}", self);
        Type::from_bits_retain(self.bits() >> PTR_SHIFT)
    }

    pub fn deref_if_ptr(self) -> Type {
        assert!(self.subtype_of(Type::GEN | Type::PTR_TO_GEN), "deref_if_ptr of {}", self);
        if self.is_ptr() {
            self.deref()
        } else {
            self
        }
    }

    pub fn ptr(self) -> Type {
        assert!(!self.is_ptr(), "ptr of pointer type {}", self);
        assert!(self.subtype_of(Type::GEN), "ptr of non-value type {}", self);
        Type::from_bits_retain(self.bits() << PTR_SHIFT)
    }

    /// Canonical name if this is a predefined type.
    pub fn name(self) -> Option<&'static str> {
        TYPE_NAMES.iter().find(|(t, _)| *t == self).map(|(_, n)| *n)
    }

    pub fn to_data_type(self) -> DataType {
        assert!(!self.is_ptr() || self == Type::BOTTOM, "pointer types have no data type: {}", self);
        if self.is_boxed() && self != Type::BOTTOM {
            return DataType::Ref;
        }
        let order = [
            (Type::NONE, DataType::Invalid),
            (Type::UNINIT, DataType::Uninit),
            (Type::NULL, DataType::Null),
            (Type::BOOL, DataType::Boolean),
            (Type::INT, DataType::Int64),
            (Type::DBL, DataType::Double),
            (Type::STATIC_STR, DataType::StaticString),
            (Type::STR, DataType::String),
            (Type::ARR, DataType::Array),
            (Type::OBJ, DataType::Object),
            (Type::CLS, DataType::Class),
            (Type::UNCOUNTED_INIT, DataType::UncountedInit),
            (Type::UNCOUNTED, DataType::Uncounted),
            (Type::GEN, DataType::Any),
        ];
        order
            .iter()
            .find(|(t, _)| self.subtype_of(*t))
            .map(|(_, dt)| *dt)
            .unwrap_or_else(|| panic!("type {} has no data type", self))
    }

    /// Maps a runtime tag pair back into the lattice. `inner` is only
    /// consulted for `Ref`.
    pub fn from_data_type(outer: DataType, inner: DataType) -> Type {
        assert!(inner != DataType::Ref, "reference to reference");
        match outer {
            DataType::Invalid => Type::NONE,
            DataType::Uninit => Type::UNINIT,
            DataType::Null => Type::INIT_NULL,
            DataType::Boolean => Type::BOOL,
            DataType::Int64 => Type::INT,
            DataType::Double => Type::DBL,
            DataType::StaticString => Type::STATIC_STR,
            DataType::String => Type::STR,
            DataType::Array => Type::ARR,
            DataType::Object => Type::OBJ,
            DataType::Class => Type::CLS,
            DataType::UncountedInit => Type::UNCOUNTED_INIT,
            DataType::Uncounted => Type::UNCOUNTED,
            DataType::Any => Type::GEN,
            DataType::Ref if inner == DataType::Invalid => Type::BOXED_CELL,
            DataType::Ref => Type::from_data_type(inner, DataType::Invalid).boxed(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        let mut first = true;
        for bit in 0..u64::BITS {
            let single = Type::from_bits_retain(1 << bit);
            if !self.contains(single) {
                continue;
            }
            if !first {
                f.write_str("|")?;
            }
            first = false;
            match single.name() {
                Some(name) => f.write_str(name)?,
                None => write!(f, "Bit{}", bit)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self)
    }
}

/// Error returned when a type name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown type name '{0}'")]
pub struct ParseTypeError(pub String);

impl FromStr for Type {
    type Err = ParseTypeError;

    /// Parses a canonical name, or several joined with `|`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('|').try_fold(Type::BOTTOM, |acc, part| {
            let part = part.trim();
            TYPE_NAMES
                .iter()
                .find(|(_, n)| *n == part)
                .map(|(t, _)| acc | *t)
                .ok_or_else(|| ParseTypeError(part.to_string()))
        })
    }
}

/// Runtime value tags as stored in a typed value slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum DataType {
    /// No value
    Invalid = -1,
    Uninit = 0,
    Null = 8,
    Boolean = 9,
    Int64 = 10,
    Double = 11,
    StaticString = 12,
    String = 20,
    Array = 32,
    Object = 64,
    /// Class pointer (runtime-internal)
    Class = 65,
    /// Reference cell; the payload holds the inner value
    Ref = 66,
    /// Any uncounted, initialized value (translator-internal)
    UncountedInit = 67,
    /// Any uncounted value (translator-internal)
    Uncounted = 68,
    /// Any value (translator-internal)
    Any = 69,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindOf{:?}", self)
    }
}
