//! Human-readable listing of a finished flow, one instruction per line.

use crate::flow::Flow;
use crate::inst::{Anchor, Instruction, InstructionKind, PushValue};
use itertools::Itertools;
use std::fmt::Write;

pub fn dump_flow(flow: &Flow) -> String {
    let mut out = String::new();
    for instruction in flow.instructions() {
        let _ = writeln!(out, "{}", dump_instruction(instruction));
    }
    for diagnostic in flow.diagnostics() {
        let _ = writeln!(out, "; {diagnostic}");
    }
    out
}

pub fn dump_instruction(instruction: &Instruction) -> String {
    let mut line = format!("{:>4}: {}", instruction.index, instruction.kind.name());
    let operands = operands(&instruction.kind);
    if !operands.is_empty() {
        line.push(' ');
        line.push_str(&operands);
    }
    if let Some(anchor) = &instruction.anchor {
        let _ = write!(line, "  @{}", anchor_text(anchor));
    }
    line
}

fn anchor_text(anchor: &Anchor) -> String {
    match anchor {
        Anchor::Expr(node) => node.to_string(),
        Anchor::PolyadicPart { node, last_operand } => format!("{node}[..={last_operand}]"),
        Anchor::SwitchLabel(node) => format!("label {node}"),
    }
}

fn operands(kind: &InstructionKind) -> String {
    use InstructionKind::*;
    match kind {
        Push { value, .. } => match value {
            PushValue::Place(place) => place.place.to_string(),
            PushValue::Value(value) => value.to_string(),
            PushValue::Transfer(transfer) => format!("<{transfer}>"),
        },
        Splice { count, replacement } => format!("{count} -> [{}]", replacement.iter().join(", ")),
        ConditionalGoto { target, compare } => format!("{target} if {compare}"),
        Goto { target } => target.to_string(),
        Assign { target } => target
            .as_ref()
            .map(|t| t.place.to_string())
            .unwrap_or_default(),
        SimpleAssign { target } | Flush { place: target } => target.place.to_string(),
        Escape { places } => places.iter().join(", "),
        Closure { bodies } => bodies.iter().join(", "),
        Call {
            method,
            arg_count,
            receiver,
            result,
            ..
        } => {
            let method = method.map(|m| m.to_string()).unwrap_or_else(|| "?".into());
            let receiver = if *receiver { "+this" } else { "" };
            format!("{method}({arg_count}{receiver}) -> {result}")
        }
        MethodReference { method } => method.map(|m| m.to_string()).unwrap_or_default(),
        Ensure {
            relation,
            compare,
            message,
            ..
        } => format!("{relation:?} {compare} \"{message}\""),
        CheckNotNull { problem, .. } => format!("{problem:?}"),
        Throw { transfer } | MayThrow { transfer } | Return { transfer } => transfer.to_string(),
        InstructionKind::ControlTransfer {
            transfer,
            trap_depth,
        } => format!("{transfer} depth={trap_depth}"),
        ExactConversionTest { from, to } => format!("{} -> {}", from.name(), to.name()),
        TypeCast { ty, .. } | Wrap { ty, .. } => ty.to_string(),
        PrimitiveConversion { to } => to.name().to_string(),
        Unwrap { field } => format!("{field:?}"),
        NumericBinary { op } => format!("{op:?}"),
        BooleanBinary { relation } => format!("{relation:?}"),
        BooleanAndOr { or } => (if *or { "or" } else { "and" }).to_string(),
        ArrayAccess { element, .. } | ArrayStore { element, .. } => element
            .as_ref()
            .map(|e| e.place.to_string())
            .unwrap_or_default(),
        FoldArray { count, ty } => format!("{count} as {ty}"),
        EvalUnknown { arg_count, ty } => format!("{arg_count} -> {ty}"),
        FinishElement { node, flush } => {
            let node = node.map(|n| n.to_string()).unwrap_or_default();
            if flush.is_empty() {
                node
            } else {
                format!("{node} flush {}", flush.iter().map(|p| &p.place).join(", "))
            }
        }
        Pop | Dup | Swap | FlushFields | InstanceOf | StringConcat | Not | ResultOf
        | EndOfInitializer => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::ControlFlowOffset;
    use df_core::ast::NodeId;
    use df_core::types::DfType;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_index_kind_operands_and_anchor() {
        let instruction = Instruction {
            index: 7,
            kind: InstructionKind::Push {
                value: PushValue::Value(DfType::int(3)),
                for_write: false,
            },
            anchor: Some(Anchor::Expr(NodeId(12))),
        };
        let line = dump_instruction(&instruction);
        assert!(line.starts_with("   7: push "), "{line}");
        assert!(line.ends_with("@#12"), "{line}");
    }

    #[test]
    fn goto_shows_its_target() {
        let instruction = Instruction {
            index: 0,
            kind: InstructionKind::Goto {
                target: ControlFlowOffset::Resolved(4),
            },
            anchor: None,
        };
        assert_eq!(
            dump_instruction(&instruction),
            format!("   0: goto {}", ControlFlowOffset::Resolved(4))
        );
    }
}
