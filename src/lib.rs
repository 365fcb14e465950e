//! hhir: trace IR construction for a bytecode JIT
//!
//! hhir builds the typed SSA intermediate representation a tracing JIT
//! lowers bytecode into. A [`TraceBuilder`] receives one VM-level operation
//! at a time, runs each instruction through copy propagation, common
//! subexpression elimination and algebraic simplification, and tracks what
//! it knows about the VM's stack, frame and locals as it goes.
//!
//! # Quick Start
//!
//! ```
//! use hhir::builder::{FuncInfo, TraceBuilder};
//! use hhir::ir::{FuncId, Type};
//! use hhir::JitConfig;
//!
//! let mut tb = TraceBuilder::new(FuncInfo::new(FuncId(1)), 0, 2, JitConfig::default());
//! let a = tb.gen_ld_stack(0, Type::INT);
//! let b = tb.gen_ld_stack(1, Type::INT);
//! let sum = tb.gen_add(a, b);
//! // The same expression is only computed once.
//! assert_eq!(tb.gen_add(a, b), sum);
//! tb.gen_trace_end(4);
//!
//! let (trace, factory) = tb.into_parts();
//! println!("{}", trace.display(&factory));
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **IR** | [`ir::types`], [`ir::opcode`], [`ir::instruction`], [`ir::tmp`], [`ir::extra`] |
//! | **Construction** | [`ir::factory`], [`builder`], [`ir::typecheck`] |
//! | **Traces** | [`ir::trace`], [`ir::print`] |
//! | **Support** | [`config`], [`error`](Error) |
#![allow(clippy::new_without_default)]

pub mod builder;
pub mod config;
mod error;
pub mod ir;

pub use builder::TraceBuilder;
pub use config::{CallingConvention, JitConfig};
pub use error::{Error, Result, SourceLocation};
