//! Contract compliance tests for bytecode_system
//!
//! The byte encoding is a compatibility surface; these pin it down.

use bytecode_system::{Opcode, OperandSize, Script, StackItemType};

#[test]
fn test_contract_operand_table() {
    let expected: &[(u8, OperandSize)] = &[
        (0x00, OperandSize::Fixed(1)),
        (0x01, OperandSize::Fixed(2)),
        (0x02, OperandSize::Fixed(4)),
        (0x03, OperandSize::Fixed(8)),
        (0x04, OperandSize::Fixed(16)),
        (0x05, OperandSize::Fixed(32)),
        (0x0A, OperandSize::Fixed(4)),
        (0x0C, OperandSize::Prefixed(1)),
        (0x0D, OperandSize::Prefixed(2)),
        (0x0E, OperandSize::Prefixed(4)),
        (0x37, OperandSize::Fixed(2)),
        (0x3B, OperandSize::Fixed(2)),
        (0x3C, OperandSize::Fixed(8)),
        (0x41, OperandSize::Fixed(4)),
        (0x56, OperandSize::Fixed(1)),
        (0x57, OperandSize::Fixed(2)),
        (0xC4, OperandSize::Fixed(1)),
        (0xD9, OperandSize::Fixed(1)),
        (0xDB, OperandSize::Fixed(1)),
    ];
    for (byte, size) in expected {
        let op = Opcode::from_byte(*byte).unwrap();
        assert_eq!(op.operand_size(), *size, "{op}");
    }
}

#[test]
fn test_contract_type_tags() {
    assert_eq!(StackItemType::Any as u8, 0x00);
    assert_eq!(StackItemType::Pointer as u8, 0x10);
    assert_eq!(StackItemType::Boolean as u8, 0x20);
    assert_eq!(StackItemType::Integer as u8, 0x21);
    assert_eq!(StackItemType::ByteString as u8, 0x28);
    assert_eq!(StackItemType::Buffer as u8, 0x30);
    assert_eq!(StackItemType::Array as u8, 0x40);
    assert_eq!(StackItemType::Struct as u8, 0x41);
    assert_eq!(StackItemType::Map as u8, 0x48);
    assert_eq!(StackItemType::InteropInterface as u8, 0x60);
}

#[test]
fn test_contract_script_api() {
    let script = Script::new(vec![0x11, 0x40]);
    assert_eq!(script.len(), 2);
    assert!(!script.is_empty());
    assert_eq!(script.as_bytes(), &[0x11, 0x40]);
    assert_eq!(script.get_instruction(0).unwrap().opcode(), Opcode::Push1);
}
