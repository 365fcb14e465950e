//! Shared test helpers for integration tests

use hhir::builder::{FuncInfo, TraceBuilder};
use hhir::ir::{FuncId, Opcode};
use hhir::JitConfig;
use tracing_subscriber::EnvFilter;

/// Routes builder logs to the test output. Set `RUST_LOG=hhir=trace` to see
/// every instruction as it is generated.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with operand checking on regardless of build profile
pub fn checked_config() -> JitConfig {
    JitConfig {
        check_operand_types: true,
        ..JitConfig::default()
    }
}

/// A builder for a function with locals `a`, `b`, `c`, starting at
/// bytecode 0 with `sp_offset` cells on the stack
pub fn builder_at(sp_offset: i32) -> TraceBuilder {
    builder_with(sp_offset, checked_config())
}

pub fn builder_with(sp_offset: i32, config: JitConfig) -> TraceBuilder {
    init_logging();
    let func = FuncInfo::new(FuncId(1)).with_locals(["a", "b", "c"]);
    TraceBuilder::new(func, 0, sp_offset, config)
}

/// Opcodes of the main trace, in order
pub fn ops(tb: &TraceBuilder) -> Vec<Opcode> {
    tb.trace().instructions().iter().map(|&i| tb.factory().inst(i).op()).collect()
}

#[allow(dead_code)]
pub fn count(tb: &TraceBuilder, op: Opcode) -> usize {
    ops(tb).into_iter().filter(|o| *o == op).count()
}
