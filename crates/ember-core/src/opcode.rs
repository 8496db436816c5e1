/// A single bytecode instruction opcode.
///
/// Most instructions are one byte; some carry immediate operands (constant
/// indices, stack slots, argument counts, or 16-bit jump offsets) in the
/// bytes that follow.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum OpCode {
    /// Push a constant from the chunk's constant pool. Operand: pool index.
    Constant,
    Nil,
    True,
    False,
    /// Discard the top of the stack.
    Pop,
    /// Push a copy of a local slot. Operand: slot relative to the frame base.
    GetLocal,
    /// Overwrite a local slot with the stack top (not popped). Operand: slot.
    SetLocal,
    /// Look up a global by name. Operand: constant index of the name string.
    GetGlobal,
    /// Define a global from the stack top (popped). Operand: name constant.
    DefineGlobal,
    /// Assign an existing global. Operand: name constant.
    SetGlobal,
    /// Read an upvalue of the current closure. Operand: upvalue index.
    GetUpvalue,
    /// Write an upvalue of the current closure. Operand: upvalue index.
    SetUpvalue,
    /// Read a field or bind a method. Operand: name constant.
    GetProperty,
    /// Write an instance field. Operand: name constant.
    SetProperty,
    /// Look up a method on the popped superclass. Operand: name constant.
    GetSuper,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    /// Pop a value and write its display form to the output sink.
    Print,
    /// Unconditional forward jump. Operand: 16-bit offset.
    Jump,
    /// Forward jump if the stack top is falsey (not popped). Operand: 16-bit offset.
    JumpIfFalse,
    /// Unconditional backward jump. Operand: 16-bit offset.
    Loop,
    /// Call the value below the arguments. Operand: argument count.
    Call,
    /// Fused property lookup + call. Operands: name constant, argument count.
    Invoke,
    /// Fused superclass method lookup + call. Operands: name constant, argument count.
    SuperInvoke,
    /// Instantiate a closure from a function constant. Operand: constant
    /// index, followed by one (is_local, index) byte pair per upvalue.
    Closure,
    /// Close every open upvalue at or above the top stack slot, then pop it.
    CloseUpvalue,
    Return,
    /// Push a new class. Operand: name constant.
    Class,
    /// Copy all methods of a superclass into a subclass (stack: super, sub).
    Inherit,
    /// Bind the closure on top of the stack as a method of the class below.
    /// Operand: name constant.
    Method,
}

impl OpCode {
    /// Decode an opcode from a raw bytecode byte.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        if byte <= OpCode::Method as u8 {
            // Discriminants are contiguous from zero.
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// Instruction name used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::GetSuper => "OP_GET_SUPER",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}
