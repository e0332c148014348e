//! Shared fixtures for the df-flow integration tests.
#![allow(dead_code)]

pub mod assertions;

use df_core::config::FlowOptions;
use df_core::Result;
use df_flow::{build_flow, Flow, FlowListener, FragmentRoot, ValueFactory};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness; filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn build(root: FragmentRoot<'_>, decls: &df_core::ast::Declarations) -> Result<Flow> {
    build_with(root, decls, &FlowOptions::from_env())
}

pub fn build_with(
    root: FragmentRoot<'_>,
    decls: &df_core::ast::Declarations,
    options: &FlowOptions,
) -> Result<Flow> {
    init_tracing();
    let values = ValueFactory::new();
    let flow = build_flow(root, decls, &values, options, None)?;
    Ok(flow.expect("fragment should be translatable"))
}

pub fn build_listened<L: FlowListener>(
    root: FragmentRoot<'_>,
    decls: &df_core::ast::Declarations,
    listener: &mut L,
) -> Result<Option<Flow>> {
    init_tracing();
    let values = ValueFactory::new();
    build_flow(root, decls, &values, &FlowOptions::from_env(), Some(listener))
}
