//! Tests for the opcode table

use bytecode_system::{Opcode, OperandSize};

#[test]
fn test_push_constants_are_contiguous() {
    assert_eq!(Opcode::PushM1.byte(), 0x0F);
    assert_eq!(Opcode::Push0.byte(), 0x10);
    assert_eq!(Opcode::Push16.byte(), 0x20);
    assert_eq!(Opcode::from_byte(0x15), Some(Opcode::Push5));
}

#[test]
fn test_slot_families() {
    assert_eq!(Opcode::LdSFld0.byte(), 0x58);
    assert_eq!(Opcode::StSFld.byte(), 0x67);
    assert_eq!(Opcode::LdLoc6.byte(), 0x6E);
    assert_eq!(Opcode::StArg.byte(), 0x87);
    assert_eq!(Opcode::InitSlot.operand_size(), OperandSize::Fixed(2));
}

#[test]
fn test_long_jumps_take_four_bytes() {
    for op in [Opcode::JmpL, Opcode::JmpIfL, Opcode::JmpLeL, Opcode::CallL, Opcode::EndTryL] {
        assert_eq!(op.operand_size(), OperandSize::Fixed(4), "{op}");
        assert!(op.has_offset_operand());
    }
}

#[test]
fn test_try_from_byte() {
    assert_eq!(Opcode::try_from(0x9E), Ok(Opcode::Add));
    assert_eq!(Opcode::try_from(0xEE), Err(0xEE));
    assert_eq!(u8::from(Opcode::AssertMsg), 0xE1);
}

#[test]
fn test_table_has_no_duplicates() {
    let mut seen = std::collections::HashSet::new();
    for op in Opcode::ALL {
        assert!(seen.insert(op.byte()));
        assert!(seen.len() <= 256);
    }
    assert!(Opcode::ALL.len() > 180);
}
