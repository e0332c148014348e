use df_core::ast::MethodId;
use df_flow::inst::{InstructionKind, PushValue};
use df_flow::{ControlTransfer, Flow, StablePlace, TransferTarget};

/// Instruction names in flow order.
pub fn kinds(flow: &Flow) -> Vec<&'static str> {
    flow.instructions().iter().map(|i| i.kind.name()).collect()
}

pub fn count(flow: &Flow, name: &str) -> usize {
    kinds(flow).into_iter().filter(|kind| *kind == name).count()
}

/// Positions of the instructions named `name`.
pub fn positions(flow: &Flow, name: &str) -> Vec<usize> {
    flow.instructions()
        .iter()
        .filter(|i| i.kind.name() == name)
        .map(|i| i.index)
        .collect()
}

/// Positions of the `call` instructions invoking `method`.
pub fn calls_to(flow: &Flow, method: MethodId) -> Vec<usize> {
    flow.instructions()
        .iter()
        .filter(|i| matches!(&i.kind, InstructionKind::Call { method: Some(m), .. } if *m == method))
        .map(|i| i.index)
        .collect()
}

/// Jump target of a `goto` or `cond_goto`.
pub fn jump_target(flow: &Flow, index: usize) -> usize {
    let target = match &flow.instruction(index).kind {
        InstructionKind::Goto { target } | InstructionKind::ConditionalGoto { target, .. } => target,
        other => panic!("instruction {index} is {}, not a jump", other.name()),
    };
    target.index().expect("jump target should be resolved")
}

/// Every explicit control transfer, in flow order.
pub fn transfers(flow: &Flow) -> Vec<&ControlTransfer> {
    flow.instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::ControlTransfer { transfer, .. } => Some(transfer),
            _ => None,
        })
        .collect()
}

/// Places pushed for reading, in flow order.
pub fn pushed_places(flow: &Flow) -> Vec<&StablePlace> {
    flow.instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::Push {
                value: PushValue::Place(place),
                for_write: false,
            } => Some(&place.place),
            _ => None,
        })
        .collect()
}

/// Places written by `assign` or `simple_assign`, in flow order.
pub fn assigned_places(flow: &Flow) -> Vec<&StablePlace> {
    flow.instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::Assign {
                target: Some(target),
            }
            | InstructionKind::SimpleAssign { target } => Some(&target.place),
            _ => None,
        })
        .collect()
}

/// Every jump and transfer target lies inside the flow.
pub fn assert_offsets_resolved(flow: &Flow) {
    let count = flow.instruction_count();
    for instruction in flow.instructions() {
        if let InstructionKind::Goto { target } | InstructionKind::ConditionalGoto { target, .. } =
            &instruction.kind
        {
            let index = target.index();
            assert!(
                index.is_some_and(|index| index < count),
                "instruction {} jumps to {:?}",
                instruction.index,
                index
            );
        }
    }
}

/// Stack depth before each instruction reachable through jumps and in-flow transfers.
///
/// Panics when two paths reach an instruction with different depths, or when a path
/// pops from an empty stack.
pub fn stack_depths(flow: &Flow) -> Vec<Option<usize>> {
    let count = flow.instruction_count();
    let mut depths: Vec<Option<usize>> = vec![None; count];
    let mut pending = vec![(0usize, 0usize)];
    while let Some((index, depth)) = pending.pop() {
        if index >= count {
            continue;
        }
        match depths[index] {
            Some(seen) => {
                assert_eq!(seen, depth, "instruction {index} reached with two stack depths");
                continue;
            }
            None => depths[index] = Some(depth),
        }
        let instruction = flow.instruction(index);
        let effect = instruction.stack_effect();
        assert!(depth >= effect.pops, "instruction {index} pops an empty stack");
        let after = depth - effect.pops + effect.pushes;
        match &instruction.kind {
            InstructionKind::Goto { target } => {
                pending.push((target.index().expect("resolved jump"), after));
            }
            InstructionKind::ConditionalGoto { target, .. } => {
                pending.push((target.index().expect("resolved jump"), after));
                pending.push((index + 1, after));
            }
            InstructionKind::ControlTransfer { transfer, .. } => {
                if let TransferTarget::Instruction { offset, .. } = &transfer.target {
                    pending.push((offset.index().expect("resolved transfer"), after));
                }
            }
            InstructionKind::Throw { .. } | InstructionKind::Return { .. } => {}
            _ => pending.push((index + 1, after)),
        }
    }
    depths
}
