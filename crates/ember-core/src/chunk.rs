use crate::opcode::OpCode;
use crate::value::Value;

/// Maximum number of constants per chunk. Constant operands are one byte.
pub const MAX_CONSTANTS: usize = 256;

/// A function's compiled bytecode: opcode/operand bytes, a parallel
/// per-byte source-line table, and the constant pool.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    lines: Vec<u32>,
    constants: Vec<Value>,
}

impl Chunk {
    /// Create a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte, recording the source line it came from.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Append an opcode byte.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op.into(), line);
    }

    /// Add a constant to the pool and return its index.
    ///
    /// Returns `None` when the pool is full; the compiler reports that as a
    /// compile error rather than truncating the index.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if self.constants.len() >= MAX_CONSTANTS {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    /// The raw bytecode.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Check whether any bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Read one byte. The VM never reads out of bounds by construction.
    pub fn read(&self, offset: usize) -> u8 {
        self.code[offset]
    }

    /// Source line for the byte at `offset`.
    pub fn line(&self, offset: usize) -> u32 {
        self.lines[offset]
    }

    /// Look up a constant by pool index.
    pub fn constant(&self, index: u8) -> Value {
        self.constants[index as usize]
    }

    /// The whole constant pool, in insertion order.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Overwrite a previously written byte. Used for jump patching.
    pub fn patch(&mut self, offset: usize, byte: u8) {
        self.code[offset] = byte;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn write_records_parallel_lines() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::Return, 2);

        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.read(0), OpCode::Nil as u8);
        assert_eq!(chunk.line(0), 1);
        assert_eq!(chunk.line(2), 2);
    }

    #[test]
    fn add_constant_returns_sequential_indices() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.0)), Some(0));
        assert_eq!(chunk.add_constant(Value::Number(2.0)), Some(1));
        assert_eq!(chunk.constant(1), Value::Number(2.0));
    }

    #[test]
    fn add_constant_fails_when_pool_full() {
        let mut chunk = Chunk::new();
        for i in 0..MAX_CONSTANTS {
            assert_eq!(
                chunk.add_constant(Value::Number(i as f64)),
                Some(i as u8)
            );
        }
        assert_eq!(chunk.add_constant(Value::Nil), None);
        // The failed insert must not have grown the pool.
        assert_eq!(chunk.constants().len(), MAX_CONSTANTS);
    }

    #[test]
    fn patch_overwrites_in_place() {
        let mut chunk = Chunk::new();
        chunk.write(0xFF, 1);
        chunk.write(0xFF, 1);
        chunk.patch(0, 0x12);
        assert_eq!(chunk.read(0), 0x12);
        assert_eq!(chunk.read(1), 0xFF);
        assert_eq!(chunk.len(), 2);
    }

    proptest! {
        #[test]
        fn code_and_lines_stay_parallel(writes in prop::collection::vec((any::<u8>(), 1u32..10_000), 0..512)) {
            let mut chunk = Chunk::new();
            for &(byte, line) in &writes {
                chunk.write(byte, line);
            }
            prop_assert_eq!(chunk.len(), writes.len());
            for (i, &(byte, line)) in writes.iter().enumerate() {
                prop_assert_eq!(chunk.read(i), byte);
                prop_assert_eq!(chunk.line(i), line);
            }
        }
    }
}
