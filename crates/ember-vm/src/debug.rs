//! Bytecode disassembler.
//!
//! Produces the listing format used by execution tracing: one line per
//! instruction with its offset, source line, mnemonic, and operands.

use ember_core::{Chunk, Heap, Obj, OpCode, Value};

/// Disassemble a whole chunk under a heading.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.len() {
        let (text, next) = disassemble_instruction(heap, chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassemble the instruction at `offset`; returns the rendered line and
/// the offset of the next instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut text = format!("{:04} ", offset);
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        text.push_str("   | ");
    } else {
        text.push_str(&format!("{:4} ", chunk.line(offset)));
    }

    let byte = chunk.read(offset);
    let Some(op) = OpCode::from_byte(byte) else {
        text.push_str(&format!("Unknown opcode {}", byte));
        return (text, offset + 1);
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => constant_instruction(heap, chunk, op, offset, &mut text),
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(chunk, op, offset, &mut text),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, offset, 1, &mut text),
        OpCode::Loop => jump_instruction(chunk, op, offset, -1, &mut text),
        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(heap, chunk, op, offset, &mut text),
        OpCode::Closure => closure_instruction(heap, chunk, offset, &mut text),
        _ => {
            text.push_str(op.name());
            (text, offset + 1)
        }
    }
}

fn constant_instruction(
    heap: &Heap,
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    text: &mut String,
) -> (String, usize) {
    let index = chunk.read(offset + 1);
    let value = chunk.constant(index);
    text.push_str(&format!(
        "{:<16} {:4} '{}'",
        op.name(),
        index,
        heap.format_value(value)
    ));
    (std::mem::take(text), offset + 2)
}

fn byte_instruction(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    text: &mut String,
) -> (String, usize) {
    let operand = chunk.read(offset + 1);
    text.push_str(&format!("{:<16} {:4}", op.name(), operand));
    (std::mem::take(text), offset + 2)
}

fn jump_instruction(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    sign: i64,
    text: &mut String,
) -> (String, usize) {
    let jump = ((chunk.read(offset + 1) as u16) << 8) | chunk.read(offset + 2) as u16;
    let target = offset as i64 + 3 + sign * jump as i64;
    text.push_str(&format!("{:<16} {:4} -> {}", op.name(), offset, target));
    (std::mem::take(text), offset + 3)
}

fn invoke_instruction(
    heap: &Heap,
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    text: &mut String,
) -> (String, usize) {
    let index = chunk.read(offset + 1);
    let arg_count = chunk.read(offset + 2);
    let value = chunk.constant(index);
    text.push_str(&format!(
        "{:<16} ({} args) {:4} '{}'",
        op.name(),
        arg_count,
        index,
        heap.format_value(value)
    ));
    (std::mem::take(text), offset + 3)
}

/// Closure is variable-length: the function constant is followed by one
/// (is_local, index) pair per upvalue.
fn closure_instruction(
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
    text: &mut String,
) -> (String, usize) {
    let index = chunk.read(offset + 1);
    let value = chunk.constant(index);
    text.push_str(&format!(
        "{:<16} {:4} {}",
        OpCode::Closure.name(),
        index,
        heap.format_value(value)
    ));

    let upvalue_count = match value {
        Value::Obj(r) => match heap.get(r) {
            Obj::Function(f) => f.upvalue_count,
            _ => 0,
        },
        _ => 0,
    };

    let mut next = offset + 2;
    for _ in 0..upvalue_count {
        let is_local = chunk.read(next);
        let slot = chunk.read(next + 1);
        text.push_str(&format!(
            "\n{:04}      |                     {} {}",
            next,
            if is_local == 1 { "local" } else { "upvalue" },
            slot
        ));
        next += 2;
    }
    (std::mem::take(text), next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_constant_instructions() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.2)).unwrap();
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(index, 1);
        chunk.write_op(OpCode::Return, 1);

        let listing = disassemble_chunk(&heap, &chunk, "test");
        assert!(listing.starts_with("== test ==\n"));
        assert!(listing.contains("OP_CONSTANT"));
        assert!(listing.contains("'1.2'"));
        assert!(listing.contains("OP_RETURN"));
        // Second instruction on the same source line shows the pipe marker.
        assert!(listing.contains("   | "), "{}", listing);
    }

    #[test]
    fn jump_targets_are_absolute() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write(0x00, 1);
        chunk.write(0x02, 1);

        let (text, next) = disassemble_instruction(&heap, &chunk, 0);
        assert_eq!(next, 3);
        // Jump of 2 from after the operand lands at 5.
        assert!(text.contains("-> 5"), "{}", text);
    }

    #[test]
    fn loop_targets_point_backward() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Loop, 1);
        chunk.write(0x00, 1);
        chunk.write(0x04, 1);

        let (text, next) = disassemble_instruction(&heap, &chunk, 1);
        assert_eq!(next, 4);
        assert!(text.contains("-> 0"), "{}", text);
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        chunk.write(0xEE, 1);
        let (text, next) = disassemble_instruction(&heap, &chunk, 0);
        assert!(text.contains("Unknown opcode 238"));
        assert_eq!(next, 1);
    }
}
