//! Universal-invariant checks (spec §8) run over a table of hand-built
//! programs, in the style of the teacher crate's table-driven datatest
//! convention — just without pulling in `datatest-stable` itself, since
//! these cases are in-memory instruction streams rather than files on disk.

use monty_peephole::{optimize, CodeObject, CompareKind, ConstantValue, Opcode, OptimizerConfig, RawArgument, RawInstruction};

fn instr(opcode: Opcode, arg: RawArgument) -> RawInstruction {
    RawInstruction::new(opcode, arg, 1)
}

fn const_(v: ConstantValue) -> RawArgument {
    RawArgument::Constant(v)
}

/// A handful of representative programs: straight-line folds, a threaded
/// jump chain, a boolean fusion, and an unpack-to-rotate case.
fn sample_programs() -> Vec<Vec<RawInstruction>> {
    vec![
        vec![
            instr(Opcode::LoadConst, const_(ConstantValue::Int(1))),
            instr(Opcode::LoadConst, const_(ConstantValue::Int(3))),
            instr(Opcode::BinaryAdd, RawArgument::None),
            instr(Opcode::LoadConst, const_(ConstantValue::Int(7))),
            instr(Opcode::BinaryAdd, RawArgument::None),
            instr(Opcode::ReturnValue, RawArgument::None),
        ],
        vec![
            instr(Opcode::LoadName, RawArgument::Name("a".into())),
            instr(Opcode::LoadName, RawArgument::Name("b".into())),
            instr(Opcode::LoadName, RawArgument::Name("c".into())),
            instr(Opcode::BuildList, RawArgument::SmallInt(3)),
            instr(Opcode::UnpackSequence, RawArgument::SmallInt(3)),
            instr(Opcode::StoreName, RawArgument::Name("x".into())),
            instr(Opcode::StoreName, RawArgument::Name("y".into())),
            instr(Opcode::StoreName, RawArgument::Name("z".into())),
            instr(Opcode::LoadConst, const_(ConstantValue::None)),
            instr(Opcode::ReturnValue, RawArgument::None),
        ],
        vec![
            instr(Opcode::LoadName, RawArgument::Name("x".into())),
            instr(Opcode::UnaryNot, RawArgument::None),
            instr(Opcode::PopJumpIfFalse, RawArgument::Target(4)),
            instr(Opcode::ReturnValue, RawArgument::None),
            instr(Opcode::LoadConst, const_(ConstantValue::None)),
            instr(Opcode::ReturnValue, RawArgument::None),
        ],
        vec![
            instr(Opcode::JumpAbsolute, RawArgument::Target(2)),
            instr(Opcode::LoadConst, const_(ConstantValue::Int(1))),
            instr(Opcode::JumpAbsolute, RawArgument::Target(4)),
            instr(Opcode::Nop, RawArgument::None),
            instr(Opcode::LoadConst, const_(ConstantValue::None)),
            instr(Opcode::ReturnValue, RawArgument::None),
        ],
        vec![
            instr(Opcode::LoadConst, const_(ConstantValue::Int(1))),
            instr(Opcode::LoadConst, const_(ConstantValue::Int(2))),
            instr(Opcode::CompareOp, RawArgument::Compare(CompareKind::In)),
            instr(Opcode::UnaryNot, RawArgument::None),
            instr(Opcode::ReturnValue, RawArgument::None),
        ],
    ]
}

/// Idempotence: optimizing an already-optimized program is a no-op.
#[test]
fn optimize_is_idempotent() {
    for program in sample_programs() {
        let once = optimize(CodeObject::new(program), &OptimizerConfig::default()).unwrap();
        let twice = optimize(once.clone(), &OptimizerConfig::default()).unwrap();
        assert_eq!(once.instructions(), twice.instructions(), "optimize(optimize(P)) != optimize(P)");
    }
}

/// Label integrity: every jump in the output resolves to an instruction
/// actually present in the output (since at the flat-code stage a "label"
/// is just the instruction index a jump targets).
#[test]
fn every_jump_target_is_in_bounds() {
    for program in sample_programs() {
        let result = optimize(CodeObject::new(program), &OptimizerConfig::default()).unwrap();
        let len = result.instructions().len();
        for instr in result.instructions() {
            if let RawArgument::Target(idx) = instr.arg() {
                assert!(*idx < len, "jump target {idx} out of bounds for program of length {len}");
            }
        }
    }
}

/// Size bound: no folded constant the optimizer produces exceeds the
/// configured `MAX_SIZE`.
#[test]
fn folded_constants_respect_max_size() {
    let max_size = 3;
    let program = vec![
        instr(Opcode::LoadConst, const_(ConstantValue::Tuple(vec![ConstantValue::Int(9)]))),
        instr(Opcode::LoadConst, const_(ConstantValue::Int(3))),
        instr(Opcode::BinaryMultiply, RawArgument::None),
        instr(Opcode::ReturnValue, RawArgument::None),
    ];
    let result = optimize(CodeObject::new(program), &OptimizerConfig { max_size }).unwrap();
    for instr in result.instructions() {
        if let RawArgument::Constant(value) = instr.arg() {
            assert!(value.size() <= max_size, "folded constant {value:?} exceeds MAX_SIZE {max_size}");
        }
    }
}

/// Running the same program through `optimize` twice with different
/// `MAX_SIZE` settings never mixes up which run's bound applies.
#[test]
fn max_size_is_per_call_not_global() {
    let program = || {
        vec![
            instr(Opcode::LoadConst, const_(ConstantValue::Tuple(vec![ConstantValue::Int(1)]))),
            instr(Opcode::LoadConst, const_(ConstantValue::Int(5))),
            instr(Opcode::BinaryMultiply, RawArgument::None),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]
    };
    let permissive = optimize(CodeObject::new(program()), &OptimizerConfig { max_size: 10 }).unwrap();
    let strict = optimize(CodeObject::new(program()), &OptimizerConfig { max_size: 2 }).unwrap();
    assert_eq!(permissive.instructions().len(), 2, "5-element tuple fits under MAX_SIZE 10");
    assert_eq!(strict.instructions().len(), 4, "5-element tuple exceeds MAX_SIZE 2, multiply stays unfolded");
}
