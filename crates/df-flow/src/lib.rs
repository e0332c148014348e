//! Control-flow builder: translates a program fragment into a linear,
//! offset-addressed instruction sequence for an abstract interpreter.

#[macro_use]
extern crate df_core;

pub mod analyzer;
pub mod builder;
pub mod context;
pub mod dump;
pub mod flow;
pub mod inliner;
pub mod inst;
pub mod listener;
pub mod numeric;
pub mod offset;
pub mod place;
pub mod resolver;
pub mod trap;

pub use analyzer::{build_flow, build_flow_with, ControlFlowAnalyzer, FragmentRoot};
pub use builder::CfgBuilder;
pub use flow::Flow;
pub use inliner::{default_inliners, CallInliner};
pub use inst::{Anchor, Instruction, InstructionKind, NullabilityProblem, PushValue};
pub use listener::{FlowListener, RecordingListener};
pub use place::{PlaceValue, SpecialField, StablePlace, ValueFactory};
pub use resolver::ExpressionResolver;
pub use trap::{ControlTransfer, TransferTarget, Trap, TrapKind};
