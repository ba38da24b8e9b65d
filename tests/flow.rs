//! End-to-end coverage: literal instruction streams through the whole
//! pipeline, plus the structural invariants every accepted input must
//! satisfy.

mod common;

use common::*;
use scmscope::{
    depth_first_blocks, depth_first_calls, depth_first_spawns, flow, Arg, BlockId, BlockList,
    Direction, Error, ProcId, ProcKind, StatementKind,
};

/// Collects the blocks of one procedure in depth-first order.
fn proc_blocks(list: &BlockList<'_>, proc: ProcId) -> Vec<BlockId> {
    let mut blocks = Vec::new();
    depth_first_blocks(
        list,
        list.proc(proc).entry_block(),
        Direction::Forward,
        |id| {
            blocks.push(id);
            true
        },
    );
    blocks
}

/// Every edge must appear in both adjacency lists.
fn assert_edge_symmetry(list: &BlockList<'_>) {
    for (index, block) in list.blocks().iter().enumerate() {
        let id = BlockId::new(index);
        for &succ in block.successors() {
            assert!(
                list.block(succ).predecessors().contains(&id),
                "{succ:?} is missing predecessor {id:?}"
            );
        }
        for &pred in block.predecessors() {
            assert!(
                list.block(pred).successors().contains(&id),
                "{pred:?} is missing successor {id:?}"
            );
        }
    }
}

/// Within a segment, block ranges must be sorted, disjoint, and cover
/// every instruction.
fn assert_partition(list: &BlockList<'_>, range: std::ops::Range<usize>, segment_len: usize) {
    let mut next = 0u32;
    for index in range {
        let block = list.block(BlockId::new(index));
        assert_eq!(block.begin().data, next, "gap or overlap at {index}");
        next += block.len() as u32;
    }
    assert_eq!(next as usize, segment_len, "instructions left uncovered");
}

#[test]
fn test_straight_line() {
    let mut b = SegBuilder::new();
    b.op(NOP, vec![]).op(NOP, vec![]).op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();

    assert_eq!(list.proc_count(), 1);
    assert_eq!(list.proc(ProcId::new(0)).kind(), ProcKind::MAIN);
    assert_eq!(list.main_blocks(), 0..1);

    let entry = list.proc(ProcId::new(0)).entry_block();
    assert_eq!(list.block(entry).len(), 3);
    let succ = list.block(entry).successors();
    assert_eq!(succ.len(), 1);
    assert!(list.block(succ[0]).is_exit_node());

    assert!(list.natural_loops(ProcId::new(0)).is_empty());

    let statements = flow::structure_procedure(&list, ProcId::new(0)).unwrap();
    let entry_statement = statements.node(statements.entry());
    assert!(matches!(entry_statement.kind(), StatementKind::Block { .. }));
    assert_eq!(entry_statement.successors().len(), 1);
    assert_eq!(
        statements.node(entry_statement.successors()[0]).block_id(),
        Some(succ[0])
    );
}

#[test]
fn test_if_then() {
    // IF cond GOTO L1; A; L1: B; TERMINATE
    let mut b = SegBuilder::new();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(2)]);
    b.op(WAIT, vec![Arg::Int32(0)]);
    let l1 = b.mark();
    assert_eq!(l1, 2);
    b.op(NOP, vec![]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();
    assert_eq!(list.main_blocks(), 0..3);

    // The conditional links its branch target first, then the fallthrough.
    let head = BlockId::new(0);
    assert_eq!(
        list.block(head).successors(),
        &[BlockId::new(2), BlockId::new(1)]
    );

    // Two predecessors meet at L1.
    assert_eq!(
        list.block(BlockId::new(2)).predecessors(),
        &[BlockId::new(0), BlockId::new(1)]
    );

    assert!(list.natural_loops(ProcId::new(0)).is_empty());

    let statements = flow::structure_procedure(&list, ProcId::new(0)).unwrap();
    let StatementKind::If {
        condition,
        then_arm,
    } = *statements.node(statements.entry()).kind()
    else {
        panic!("expected an if statement at the entry");
    };
    assert_eq!(statements.node(condition).block_id(), Some(BlockId::new(0)));
    assert_eq!(statements.node(then_arm).block_id(), Some(BlockId::new(1)));

    // The merge is the node's sole successor.
    let after = statements.node(statements.entry()).successors();
    assert_eq!(after.len(), 1);
    assert_eq!(statements.resolved_block(after[0]), Some(BlockId::new(2)));
}

#[test]
fn test_while_loop() {
    // L0: IF !cond GOTO L1; A; GOTO L0; L1: TERMINATE
    let mut b = SegBuilder::new();
    let l0 = b.mark();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(3)]);
    b.op(WAIT, vec![Arg::Int32(0)]);
    b.op(GOTO, vec![Arg::Int32(l0)]);
    let l1 = b.mark();
    assert_eq!(l1, 3);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();

    let loops = list.natural_loops(ProcId::new(0));
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].head, BlockId::new(0));
    assert_eq!(loops[0].tail, BlockId::new(1));
    assert_eq!(loops[0].body, vec![BlockId::new(0), BlockId::new(1)]);
    assert!(list.block(loops[0].tail).dominated_by(loops[0].head));

    let statements = flow::structure_procedure(&list, ProcId::new(0)).unwrap();
    let StatementKind::While { head, tail } = *statements.node(statements.entry()).kind() else {
        panic!("expected a while statement at the entry");
    };
    assert_eq!(statements.resolved_block(head), Some(BlockId::new(0)));
    assert_eq!(statements.node(tail).block_id(), Some(BlockId::new(1)));

    // The tail's back-branch is trimmed from emission.
    assert!(matches!(
        statements.node(tail).kind(),
        StatementKind::Block { trim_end: 1, .. }
    ));

    // The loop-exit edge became a break inside the body.
    let head_succ = statements.node(head).successors();
    assert!(head_succ
        .iter()
        .any(|&succ| matches!(statements.node(succ).kind(), StatementKind::Break)));

    // After the loop: the terminate block.
    let after = statements.node(statements.entry()).successors();
    assert_eq!(after.len(), 1);
    assert_eq!(statements.resolved_block(after[0]), Some(BlockId::new(2)));
}

#[test]
fn test_gosub() {
    // GOSUB SUB; TERMINATE; SUB: RETURN
    let mut b = SegBuilder::new();
    b.op(GOSUB, vec![Arg::Int32(2)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let sub = b.mark();
    assert_eq!(sub, 2);
    b.op(RETURN, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();

    assert_eq!(list.proc_count(), 2);
    let main = list.proc(ProcId::new(0));
    let callee = list.proc(ProcId::new(1));
    assert_eq!(main.kind(), ProcKind::MAIN);
    assert_eq!(callee.kind(), ProcKind::GOSUB);
    assert_eq!(callee.entry_block(), BlockId::new(2));
    assert!(main.exit_block().is_some());
    assert!(callee.exit_block().is_some());

    // The call site block continues at its fallthrough; the cross-procedure
    // edge lives in the call graph only.
    assert_eq!(
        list.block(BlockId::new(0)).successors(),
        &[BlockId::new(1)]
    );

    assert_eq!(main.calls_into().len(), 1);
    assert_eq!(main.calls_into()[0].block, BlockId::new(0));
    assert_eq!(main.calls_into()[0].proc, ProcId::new(1));
    assert_eq!(callee.called_from().len(), 1);
    assert_eq!(callee.called_from()[0].block, BlockId::new(0));
    assert_eq!(callee.called_from()[0].proc, ProcId::new(0));
    assert!(main.spawns_script().is_empty());

    let mut reached = Vec::new();
    depth_first_calls(&list, ProcId::new(0), Direction::Forward, |proc| {
        reached.push(proc);
        true
    });
    assert_eq!(reached, vec![ProcId::new(0), ProcId::new(1)]);
}

#[test]
fn test_script_spawn() {
    // START_NEW_SCRIPT S; TERMINATE; S: SCRIPT_NAME 'WOO'; TERMINATE
    let mut b = SegBuilder::new();
    b.op(START_NEW_SCRIPT, vec![Arg::Int32(2)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let spawned = b.mark();
    assert_eq!(spawned, 2);
    b.op(SCRIPT_NAME, vec![Arg::Text(b"WOO\0\0\0\0\0".to_vec())]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();

    assert_eq!(list.proc_count(), 2);
    let main = list.proc(ProcId::new(0));
    let script = list.proc(ProcId::new(1));
    assert_eq!(script.kind(), ProcKind::SCRIPT);

    // Spawn edges only; no call-graph edge.
    assert!(main.calls_into().is_empty());
    assert_eq!(main.spawns_script().len(), 1);
    assert_eq!(main.spawns_script()[0].proc, ProcId::new(1));
    assert_eq!(script.spawned_from().len(), 1);
    assert_eq!(script.spawned_from()[0].block, BlockId::new(0));

    assert_eq!(
        list.script_name(&TestCommands, ProcId::new(1)).as_deref(),
        Some("WOO")
    );
    assert_eq!(list.script_name(&TestCommands, ProcId::new(0)), None);

    let mut reached = Vec::new();
    depth_first_spawns(&list, ProcId::new(1), Direction::Backward, |proc| {
        reached.push(proc);
        true
    });
    assert_eq!(reached, vec![ProcId::new(1), ProcId::new(0)]);
}

#[test]
fn test_mission_spawn_and_cross_segment_call() {
    // main: LOAD_AND_LAUNCH_MISSION 0; TERMINATE; SUB: RETURN
    // mission 0: GOSUB -SUB; TERMINATE
    let mut main = SegBuilder::new();
    main.op(LOAD_AND_LAUNCH_MISSION, vec![Arg::Int32(0)]);
    main.op(TERMINATE_THIS_SCRIPT, vec![]);
    let sub = main.mark();
    assert_eq!(sub, 2);
    main.op(RETURN, vec![]);

    let mut mission = SegBuilder::new();
    mission.op(GOSUB, vec![Arg::Int32(-sub)]);
    mission.op(TERMINATE_THIS_SCRIPT, vec![]);

    let image = with_missions(main.build(), vec![mission.build()]);
    let list = flow::analyze(&TestCommands, &image).unwrap();

    // main blocks 0..3, mission blocks 3..5, one sentinel per segment.
    assert_eq!(list.main_blocks(), 0..3);
    assert_eq!(list.mission_blocks(0), Some(3..5));
    assert_eq!(list.block_count(), 7);

    assert_eq!(list.proc_count(), 3);
    let main_proc = list.proc(ProcId::new(0));
    let mission_proc = list.proc(ProcId::new(1));
    let sub_proc = list.proc(ProcId::new(2));

    assert_eq!(main_proc.kind(), ProcKind::MAIN);
    assert!(mission_proc.kind().contains(ProcKind::MISSION));
    assert_eq!(sub_proc.kind(), ProcKind::GOSUB);

    // The spawn graph crosses from main into the mission...
    assert_eq!(main_proc.spawns_script().len(), 1);
    assert_eq!(main_proc.spawns_script()[0].proc, ProcId::new(1));
    assert_eq!(mission_proc.spawned_from().len(), 1);

    // ...and the mission gosubs back into a main-segment subroutine
    // through a negative label operand.
    assert_eq!(mission_proc.calls_into().len(), 1);
    assert_eq!(mission_proc.calls_into()[0].block, BlockId::new(3));
    assert_eq!(mission_proc.calls_into()[0].proc, ProcId::new(2));
    assert_eq!(sub_proc.entry_block(), BlockId::new(2));
    assert_eq!(sub_proc.called_from()[0].proc, ProcId::new(1));

    // Mission and main procedures anchor on their own segments' sentinels.
    assert_ne!(main_proc.exit_block(), mission_proc.exit_block());
    assert_eq!(main_proc.exit_block(), sub_proc.exit_block());
}

#[test]
fn test_nested_loops() {
    // L0: IF c GOTO LEXIT; A; L2: X; IF d GOTO L2; GOTO L0; LEXIT: TERMINATE
    let mut b = SegBuilder::new();
    let l0 = b.mark();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(5)]);
    b.op(WAIT, vec![Arg::Int32(0)]);
    let l2 = b.mark();
    assert_eq!(l2, 2);
    b.op(WAIT, vec![Arg::Int32(0)]);
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(l2)]);
    b.op(GOTO, vec![Arg::Int32(l0)]);
    let lexit = b.mark();
    assert_eq!(lexit, 5);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();
    assert_eq!(list.main_blocks(), 0..5);

    let mut loops = list.natural_loops(ProcId::new(0));
    assert_eq!(loops.len(), 2);
    scmscope::sort_natural_loops(&mut loops);

    // Inner (self-loop at L2) sorts before the enclosing loop.
    assert_eq!(loops[0].head, BlockId::new(2));
    assert_eq!(loops[0].tail, BlockId::new(2));
    assert_eq!(loops[0].body, vec![BlockId::new(2)]);
    assert_eq!(loops[1].head, BlockId::new(0));
    assert_eq!(loops[1].tail, BlockId::new(3));
    assert_eq!(
        loops[1].body,
        vec![
            BlockId::new(0),
            BlockId::new(1),
            BlockId::new(2),
            BlockId::new(3)
        ]
    );

    let statements = flow::structure_procedure(&list, ProcId::new(0)).unwrap();

    // The outer while replaced the procedure entry; its body contains the
    // inner while.
    let StatementKind::While { head, .. } = *statements.node(statements.entry()).kind() else {
        panic!("expected the outer while at the entry");
    };
    assert_eq!(statements.resolved_block(head), Some(BlockId::new(0)));

    let mut inner = None;
    statements.depth_first(head, |id| {
        if let StatementKind::While {
            head: inner_head,
            tail: inner_tail,
        } = *statements.node(id).kind()
        {
            assert_eq!(inner_head, inner_tail);
            inner = Some(inner_head);
        }
        true
    });
    let inner = inner.expect("inner while not found inside the outer body");
    assert_eq!(statements.resolved_block(inner), Some(BlockId::new(2)));

    // After the outer loop: the terminate block.
    let after = statements.node(statements.entry()).successors();
    assert_eq!(statements.resolved_block(after[0]), Some(BlockId::new(4)));
}

#[test]
fn test_duplicate_conditional_successor_is_collapsed() {
    // A conditional whose target is also its fallthrough links one edge.
    let mut b = SegBuilder::new();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(1)]);
    let l = b.mark();
    assert_eq!(l, 1);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();
    assert_eq!(
        list.block(BlockId::new(0)).successors(),
        &[BlockId::new(1)]
    );
}

#[test]
fn test_edge_symmetry_and_partition() {
    let mut main = SegBuilder::new();
    let l0 = main.mark();
    main.op(GOTO_IF_FALSE, vec![Arg::Int32(3)]);
    main.op(LOAD_AND_LAUNCH_MISSION, vec![Arg::Int32(0)]);
    main.op(GOTO, vec![Arg::Int32(l0)]);
    main.op(TERMINATE_THIS_SCRIPT, vec![]);

    let mut mission = SegBuilder::new();
    mission.op(WAIT, vec![Arg::Int32(250)]);
    mission.op(TERMINATE_THIS_SCRIPT, vec![]);

    let image = with_missions(main.build(), vec![mission.build()]);
    let list = flow::analyze(&TestCommands, &image).unwrap();

    assert_edge_symmetry(&list);
    assert_partition(&list, list.main_blocks(), image.main().len());
    assert_partition(&list, list.mission_blocks(0).unwrap(), image.missions()[0].len());

    // Sorted-range invariant: begins strictly increase inside a segment.
    let range = list.main_blocks();
    for window in range.clone().collect::<Vec<_>>().windows(2) {
        let earlier = list.block(BlockId::new(window[0])).begin();
        let later = list.block(BlockId::new(window[1])).begin();
        assert!(earlier < later);
    }
}

#[test]
fn test_exit_post_dominates_every_block() {
    let mut b = SegBuilder::new();
    let l0 = b.mark();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(3)]);
    b.op(WAIT, vec![Arg::Int32(0)]);
    b.op(GOTO, vec![Arg::Int32(l0)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let list = flow::analyze(&TestCommands, &image).unwrap();

    for index in 0..list.proc_count() {
        let proc = ProcId::new(index);
        let exit = list.proc(proc).exit_block().expect("exit assigned");
        for block in proc_blocks(&list, proc) {
            assert!(
                list.block(block).post_dominated_by(exit),
                "{exit:?} must post-dominate {block:?}"
            );
        }
    }
}

#[test]
fn test_pass_idempotence() {
    let mut b = SegBuilder::new();
    let l0 = b.mark();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(4)]);
    b.op(GOSUB, vec![Arg::Int32(5)]);
    b.op(START_NEW_SCRIPT, vec![Arg::Int32(7)]);
    b.op(GOTO, vec![Arg::Int32(l0)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let subroutine = b.mark();
    assert_eq!(subroutine, 5);
    b.op(WAIT, vec![Arg::Int32(0)]);
    b.op(RETURN, vec![]);
    let spawned = b.mark();
    assert_eq!(spawned, 7);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let mut list = flow::analyze(&TestCommands, &image).unwrap();

    let snapshot = |list: &BlockList<'_>| {
        let edges: Vec<_> = list
            .blocks()
            .iter()
            .map(|block| {
                (
                    block.predecessors().to_vec(),
                    block.successors().to_vec(),
                    block.dominators().clone(),
                    block.post_dominators().clone(),
                )
            })
            .collect();
        let xrefs: Vec<_> = list
            .procs()
            .iter()
            .map(|proc| {
                (
                    proc.kind(),
                    proc.calls_into().to_vec(),
                    proc.called_from().to_vec(),
                    proc.spawns_script().to_vec(),
                    proc.spawned_from().to_vec(),
                )
            })
            .collect();
        (edges, xrefs)
    };

    let before = snapshot(&list);

    list.link_edges(&TestCommands).unwrap();
    list.link_call_edges(&TestCommands).unwrap();
    list.compute_dominators().unwrap();

    assert_eq!(before, snapshot(&list));
}

#[test]
fn test_dominator_fixed_point() {
    let mut b = SegBuilder::new();
    let l0 = b.mark();
    b.op(GOTO_IF_FALSE, vec![Arg::Int32(3)]);
    b.op(WAIT, vec![Arg::Int32(0)]);
    b.op(GOTO, vec![Arg::Int32(l0)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    let mut list = flow::analyze(&TestCommands, &image).unwrap();
    let before: Vec<_> = list
        .blocks()
        .iter()
        .map(|block| (block.dominators().clone(), block.post_dominators().clone()))
        .collect();

    list.compute_dominators().unwrap();

    let after: Vec<_> = list
        .blocks()
        .iter()
        .map(|block| (block.dominators().clone(), block.post_dominators().clone()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_unresolved_label_is_fatal() {
    let mut b = SegBuilder::new();
    b.op(GOTO, vec![Arg::Int32(9)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    match flow::analyze(&TestCommands, &image) {
        Err(Error::UnresolvedLabel { target, .. }) => assert_eq!(target, 9),
        other => panic!("expected UnresolvedLabel, got {other:?}"),
    }
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut b = SegBuilder::new();
    b.op(0x0BAD, vec![]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    match flow::analyze(&TestCommands, &image) {
        Err(Error::UnknownOpcode { opcode, .. }) => assert_eq!(opcode, 0x0BAD),
        other => panic!("expected UnknownOpcode, got {other:?}"),
    }
}

#[test]
fn test_unresolved_mission_is_fatal() {
    let mut b = SegBuilder::new();
    b.op(LOAD_AND_LAUNCH_MISSION, vec![Arg::Int32(3)]);
    b.op(TERMINATE_THIS_SCRIPT, vec![]);
    let image = main_only(b.build());

    match flow::analyze(&TestCommands, &image) {
        Err(Error::UnresolvedMission { mission, .. }) => assert_eq!(mission, 3),
        other => panic!("expected UnresolvedMission, got {other:?}"),
    }
}
