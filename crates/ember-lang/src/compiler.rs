//! Single-pass compiler: tokens in, bytecode out.
//!
//! Expressions parse by precedence climbing, statements by recursive
//! descent, and both emit straight into the current function's chunk. A
//! stack of [`FunctionCompiler`] contexts models function nesting; upvalue
//! resolution walks outward through it and threads capture descriptors
//! through every intermediate function.

use smallvec::SmallVec;

use ember_core::{
    Chunk, CompileError, Heap, Obj, ObjFunction, ObjRef, OpCode, Token, TokenType, Value,
};

use crate::scanner::Scanner;

/// Locals and upvalue descriptors per function; operands are one byte.
const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
/// Arguments and parameters share a one-byte count.
const MAX_ARITY: usize = 255;

/// Compile a source string into a top-level function object.
///
/// Functions nested in the source become constants in their enclosing
/// chunk; strings and functions are allocated on `heap`. On failure every
/// independent parse error is reported; no bytecode is handed out.
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, Vec<CompileError>> {
    let mut parser = Parser::new(source, heap);
    parser.advance();
    while !parser.matches(TokenType::Eof) {
        parser.declaration();
    }
    parser.finish()
}

/// Expression precedence, lowest to highest.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Call,
        }
    }
}

/// Infix binding power of a token; `None` for non-infix tokens.
fn infix_precedence(ty: TokenType) -> Precedence {
    match ty {
        TokenType::LeftParen | TokenType::Dot => Precedence::Call,
        TokenType::Minus | TokenType::Plus => Precedence::Term,
        TokenType::Slash | TokenType::Star => Precedence::Factor,
        TokenType::BangEqual | TokenType::EqualEqual => Precedence::Equality,
        TokenType::Greater
        | TokenType::GreaterEqual
        | TokenType::Less
        | TokenType::LessEqual => Precedence::Comparison,
        TokenType::And => Precedence::And,
        TokenType::Or => Precedence::Or,
        _ => Precedence::None,
    }
}

/// What kind of function body a context is compiling. Drives the implicit
/// slot-0 receiver and return semantics.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// A local variable while its function is being compiled.
struct Local<'src> {
    name: &'src str,
    /// Scope depth, or -1 while the initializer is still being compiled.
    depth: i32,
    /// Set when a nested function closes over this local; scope exit then
    /// emits CloseUpvalue instead of Pop.
    is_captured: bool,
}

/// Compile-time description of one upvalue: where the enclosing function
/// finds it.
#[derive(Copy, Clone, PartialEq, Eq)]
struct UpvalueDesc {
    index: u8,
    /// True when `index` is a local slot of the enclosing function, false
    /// when it is an index into the enclosing function's own upvalues.
    is_local: bool,
}

/// Per-function compilation context.
struct FunctionCompiler<'src> {
    function: ObjFunction,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: SmallVec<[UpvalueDesc; 8]>,
    scope_depth: i32,
}

impl<'src> FunctionCompiler<'src> {
    fn new(kind: FunctionKind, name: Option<String>) -> Self {
        // Slot 0 is reserved: the receiver in methods, the callee otherwise.
        let slot_zero = Local {
            name: match kind {
                FunctionKind::Method | FunctionKind::Initializer => "this",
                _ => "",
            },
            depth: 0,
            is_captured: false,
        };
        Self {
            function: ObjFunction {
                name,
                ..Default::default()
            },
            kind,
            locals: vec![slot_zero],
            upvalues: SmallVec::new(),
            scope_depth: 0,
        }
    }
}

/// Marker for the innermost enclosing class, validating `this`/`super`.
struct ClassCompiler {
    has_superclass: bool,
}

/// Parser and code generator state, threaded explicitly rather than held in
/// globals, so compilations are independent and re-entrant.
struct Parser<'src, 'h> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    errors: Vec<CompileError>,
    panic_mode: bool,
    heap: &'h mut Heap,
    contexts: Vec<FunctionCompiler<'src>>,
    classes: Vec<ClassCompiler>,
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        Self {
            scanner: Scanner::new(source),
            current: Token::synthetic(TokenType::Eof, ""),
            previous: Token::synthetic(TokenType::Eof, ""),
            errors: Vec::new(),
            panic_mode: false,
            heap,
            contexts: vec![FunctionCompiler::new(FunctionKind::Script, None)],
            classes: Vec::new(),
        }
    }

    fn finish(mut self) -> Result<ObjRef, Vec<CompileError>> {
        self.emit_return();
        if self.errors.is_empty() {
            let ctx = self.pop_context();
            Ok(self.heap.alloc(Obj::Function(ctx.function)))
        } else {
            Err(self.errors)
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.ty != TokenType::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current_bare(message);
        }
    }

    fn consume(&mut self, ty: TokenType, message: &str) {
        if self.current.ty == ty {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, ty: TokenType) -> bool {
        self.current.ty == ty
    }

    fn matches(&mut self, ty: TokenType) -> bool {
        if !self.check(ty) {
            return false;
        }
        self.advance();
        true
    }

    // ------------------------------------------------------------------
    // Error reporting
    // ------------------------------------------------------------------

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.report(token, message, false);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.report(token, message, false);
    }

    /// Scanner errors have no meaningful lexeme to point at.
    fn error_at_current_bare(&mut self, message: &str) {
        let token = self.current;
        self.report(token, message, true);
    }

    fn report(&mut self, token: Token<'src>, message: &str, bare: bool) {
        // Panic mode suppresses cascades until the next statement boundary.
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let error = if bare {
            CompileError::bare(token.line, message)
        } else if token.ty == TokenType::Eof {
            CompileError::at_end(token.line, message)
        } else {
            CompileError::at_token(token.line, token.lexeme, message)
        };
        self.errors.push(error);
    }

    /// Discard tokens up to a statement boundary so one mistake yields one
    /// report.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.ty != TokenType::Eof {
            if self.previous.ty == TokenType::Semicolon {
                return;
            }
            match self.current.ty {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn context(&self) -> &FunctionCompiler<'src> {
        &self.contexts[self.contexts.len() - 1]
    }

    fn context_mut(&mut self) -> &mut FunctionCompiler<'src> {
        let last = self.contexts.len() - 1;
        &mut self.contexts[last]
    }

    fn pop_context(&mut self) -> FunctionCompiler<'src> {
        match self.contexts.pop() {
            Some(ctx) => ctx,
            None => unreachable!("compiler context underflow"),
        }
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.context_mut().function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    fn emit_op_byte(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_return(&mut self) {
        // An initializer implicitly returns the receiver, not nil.
        if self.context().kind == FunctionKind::Initializer {
            self.emit_op_byte(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk().add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, index);
    }

    /// Emit a forward jump with a placeholder offset; returns the offset of
    /// the operand for later patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().len() - 2
    }

    fn patch_jump(&mut self, operand_offset: usize) {
        // -2 accounts for the operand itself.
        let jump = self.current_chunk().len() - operand_offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        self.current_chunk().patch(operand_offset, (jump >> 8) as u8);
        self.current_chunk().patch(operand_offset + 1, jump as u8);
    }

    /// Emit a backward jump to `loop_start` (already a known position).
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte((offset >> 8) as u8);
        self.emit_byte(offset as u8);
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenType::Class) {
            self.class_declaration();
        } else if self.matches(TokenType::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.matches(TokenType::Print) {
            self.print_statement();
        } else if self.matches(TokenType::If) {
            self.if_statement();
        } else if self.matches(TokenType::Return) {
            self.return_statement();
        } else if self.matches(TokenType::While) {
            self.while_statement();
        } else if self.matches(TokenType::For) {
            self.for_statement();
        } else if self.matches(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.matches(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// `for` desugars in place to initializer + while-shaped loop with the
    /// increment jumped over before the body and looped back to after it.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.matches(TokenType::Semicolon) {
            // No initializer.
        } else if self.matches(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump = None;
        if !self.matches(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenType::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.context().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.matches(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.context().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn begin_scope(&mut self) {
        self.context_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.context_mut().scope_depth -= 1;
        loop {
            let ctx = self.context();
            let Some(local) = ctx.locals.last() else { break };
            if local.depth <= ctx.scope_depth {
                break;
            }
            // Captured locals outlive the slot; everything else just pops.
            let captured = local.is_captured;
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.context_mut().locals.pop();
        }
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.matches(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    /// Consume an identifier; returns the name-constant index for globals,
    /// 0 for locals (which are addressed by slot, not name).
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenType::Identifier, message);

        self.declare_variable();
        if self.context().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = self.heap.intern(name);
        self.make_constant(Value::Obj(handle))
    }

    /// Record a new local in the current scope. Globals are late-bound and
    /// skip this.
    fn declare_variable(&mut self) {
        if self.context().scope_depth == 0 {
            return;
        }
        let name = self.previous;

        let mut duplicate = false;
        for local in self.context().locals.iter().rev() {
            if local.depth != -1 && local.depth < self.context().scope_depth {
                break;
            }
            if local.name == name.lexeme {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name.lexeme);
    }

    fn add_local(&mut self, name: &'src str) {
        if self.context().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.context_mut().locals.push(Local {
            name,
            // -1 marks "declared but not yet initialized".
            depth: -1,
            is_captured: false,
        });
    }

    fn define_variable(&mut self, global: u8) {
        if self.context().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    fn mark_initialized(&mut self) {
        if self.context().scope_depth == 0 {
            return;
        }
        let depth = self.context().scope_depth;
        if let Some(local) = self.context_mut().locals.last_mut() {
            local.depth = depth;
        }
    }

    /// Resolve `name` in the locals of context `ctx_idx`, innermost scope
    /// first.
    fn resolve_local(&mut self, ctx_idx: usize, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (i, local) in self.contexts[ctx_idx].locals.iter().enumerate().rev() {
            if local.name == name {
                uninitialized = local.depth == -1;
                found = Some(i as u8);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    /// Resolve `name` as an upvalue of context `ctx_idx`: find it as a local
    /// or upvalue of the enclosing context, threading a descriptor through
    /// every function in between.
    fn resolve_upvalue(&mut self, ctx_idx: usize, name: &str) -> Option<u8> {
        if ctx_idx == 0 {
            return None;
        }

        if let Some(local) = self.resolve_local(ctx_idx - 1, name) {
            self.contexts[ctx_idx - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(ctx_idx, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(ctx_idx - 1, name) {
            return Some(self.add_upvalue(ctx_idx, upvalue, false));
        }

        None
    }

    fn add_upvalue(&mut self, ctx_idx: usize, index: u8, is_local: bool) -> u8 {
        // Reuse an existing descriptor for the same capture.
        for (i, upvalue) in self.contexts[ctx_idx].upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return i as u8;
            }
        }

        let count = self.contexts[ctx_idx].upvalues.len();
        if count >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.contexts[ctx_idx]
            .upvalues
            .push(UpvalueDesc { index, is_local });
        self.contexts[ctx_idx].function.upvalue_count = count + 1;
        count as u8
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let top = self.contexts.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(top, name.lexeme) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(index) = self.resolve_upvalue(top, name.lexeme) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
        } else {
            let constant = self.identifier_constant(name.lexeme);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.matches(TokenType::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }

    // ------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // A function may refer to itself; it is initialized before its body.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    /// Compile a function body in a fresh nested context, then emit it as a
    /// closure over a constant in the enclosing chunk.
    fn function(&mut self, kind: FunctionKind) {
        let name = self.previous.lexeme.to_string();
        self.contexts
            .push(FunctionCompiler::new(kind, Some(name)));
        self.begin_scope();

        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                if self.context().function.arity as usize >= MAX_ARITY {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.context_mut().function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let ctx = self.pop_context();
        let upvalues = ctx.upvalues;
        let handle = self.heap.alloc(Obj::Function(ctx.function));
        let constant = self.make_constant(Value::Obj(handle));
        self.emit_op_byte(OpCode::Closure, constant);
        for upvalue in &upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name.lexeme);
        self.declare_variable();

        self.emit_op_byte(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCompiler {
            has_superclass: false,
        });

        if self.matches(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            self.variable(false);

            if class_name.lexeme == self.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            // The superclass lives in a scoped local named `super` so that
            // method bodies can close over it.
            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        let had_superclass = self
            .classes
            .last()
            .map(|c| c.has_superclass)
            .unwrap_or(false);
        if had_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.previous.lexeme);

        let kind = if self.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);
        self.emit_op_byte(OpCode::Method, constant);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.previous.ty, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= infix_precedence(self.current.ty) {
            self.advance();
            self.infix_rule(self.previous.ty, can_assign);
        }

        if can_assign && self.matches(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Dispatch on the token that can begin an expression. Returns false
    /// when the token has no prefix form.
    fn prefix_rule(&mut self, ty: TokenType, can_assign: bool) -> bool {
        match ty {
            TokenType::LeftParen => self.grouping(),
            TokenType::Minus | TokenType::Bang => self.unary(),
            TokenType::Number => self.number(),
            TokenType::String => self.string(),
            TokenType::Identifier => self.variable(can_assign),
            TokenType::Nil => self.emit_op(OpCode::Nil),
            TokenType::True => self.emit_op(OpCode::True),
            TokenType::False => self.emit_op(OpCode::False),
            TokenType::This => self.this_(),
            TokenType::Super => self.super_(),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, ty: TokenType, can_assign: bool) {
        match ty {
            TokenType::LeftParen => self.call(),
            TokenType::Dot => self.dot(can_assign),
            TokenType::And => self.and_(),
            TokenType::Or => self.or_(),
            _ => self.binary(ty),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or_default();
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        // Trim the surrounding quotes.
        let handle = self.heap.intern(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::Obj(handle));
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    fn this_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable(Token::synthetic(TokenType::This, "this"), false);
        if self.matches(TokenType::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(Token::synthetic(TokenType::Super, "super"), false);
            self.emit_op_byte(OpCode::SuperInvoke, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable(Token::synthetic(TokenType::Super, "super"), false);
            self.emit_op_byte(OpCode::GetSuper, name);
        }
    }

    fn unary(&mut self) {
        let operator = self.previous.ty;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenType::Minus => self.emit_op(OpCode::Negate),
            TokenType::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!("not a unary operator: {:?}", operator),
        }
    }

    fn binary(&mut self, operator: TokenType) {
        self.parse_precedence(infix_precedence(operator).next());
        match operator {
            TokenType::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenType::EqualEqual => self.emit_op(OpCode::Equal),
            TokenType::Greater => self.emit_op(OpCode::Greater),
            TokenType::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenType::Less => self.emit_op(OpCode::Less),
            TokenType::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            TokenType::Plus => self.emit_op(OpCode::Add),
            TokenType::Minus => self.emit_op(OpCode::Subtract),
            TokenType::Star => self.emit_op(OpCode::Multiply),
            TokenType::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("not a binary operator: {:?}", operator),
        }
    }

    fn and_(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_byte(OpCode::Call, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.matches(TokenType::Equal) {
            self.expression();
            self.emit_op_byte(OpCode::SetProperty, name);
        } else if self.matches(TokenType::LeftParen) {
            // Fused lookup + call for the common obj.method(args) shape.
            let arg_count = self.argument_list();
            self.emit_op_byte(OpCode::Invoke, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_op_byte(OpCode::GetProperty, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut arg_count: usize = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if arg_count >= MAX_ARITY {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    arg_count += 1;
                }
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        arg_count as u8
    }
}
