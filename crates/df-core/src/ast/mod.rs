//! Source tree handed to the flow builder.
//!
//! Nodes are closed sum types; every node that can be the anchor of an
//! instruction or the target of a jump carries a [`NodeId`].

mod builder;
mod decl;
mod expr;
mod pat;
mod stmt;
mod ty;
pub mod visit;

pub use builder::*;
pub use decl::*;
pub use expr::*;
pub use pat::*;
pub use stmt::*;
pub use ty::*;

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("#{_0}")]
pub struct NodeId(pub u32);
