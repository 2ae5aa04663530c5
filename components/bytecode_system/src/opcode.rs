//! Opcode table of the register VM
//!
//! Opcode numbers are part of the snapshot format; the order of [`OpCode::ALL`]
//! must never change.

/// How an instruction's operands are laid out, both on the wire and in
/// [`Instruction`](crate::Instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    /// One wide operand (jump target or context end)
    Ax,
    /// A register plus one wide operand (constant index, jump offset)
    ABx,
    /// Up to three narrow operands
    Abc(u8),
}

macro_rules! opcodes {
    ($( $variant:ident = $name:literal, $arity:literal; )*) => {
        /// VM instruction opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $(
                #[doc = $name]
                $variant,
            )*
        }

        impl OpCode {
            /// Every opcode in numbering order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant),*];

            /// Mnemonic used by the disassembler.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            /// Number of operands the instruction carries.
            pub fn arity(self) -> u8 {
                match self {
                    $(OpCode::$variant => $arity,)*
                }
            }
        }
    };
}

opcodes! {
    Move = "MOVE", 2;
    LoadK = "LOADK", 2;
    Call = "CALL", 3;
    New = "NEW", 3;
    GetProperty = "GET_PROPERTY", 3;
    SetProperty = "SET_PROPERTY", 3;
    LoadUndefined = "LOAD_UNDEFINED", 1;
    LoadNull = "LOAD_NULL", 1;
    GetGlobal = "GET_GLOBAL", 2;
    GetByThisOrGlobal = "GET_BY_THIS_OR_GLOBAL", 3;
    GetLocal = "GET_LOCAL", 2;
    Inheritance = "INHERITANCE", 2;
    Constructor = "CONSTRUCTOR", 3;
    GetSuper = "GET_SUPER", 2;
    OutClosure = "OUT_CLOSURE", 1;
    TypeOf = "TYPEOF", 2;
    Add = "ADD", 3;
    Sub = "SUB", 3;
    Mul = "MUL", 3;
    Mod = "MOD", 3;
    Div = "DIV", 3;
    NJmp = "N_JMP", 2;
    JmpPc = "JMP_PC", 2;
    Goto = "GOTO", 1;
    Equal = "EQUAL", 3;
    StrictEqual = "STRICT_EQUAL", 3;
    Less = "LESS", 3;
    LessEqual = "LESS_EQUAL", 3;
    Greater = "GREATER", 3;
    GreaterEqual = "GREATER_EQUAL", 3;
    ForIn = "FOR_IN", 3;
    In = "IN", 3;
    Not = "NOT", 2;
    InstanceOf = "INSTANCEOF", 3;
    PreIncr = "PRE_INCR", 2;
    PreDecr = "PRE_DECR", 2;
    PostIncr = "POST_INCR", 2;
    PostDecr = "POST_DECR", 2;
    BitAnd = "BIT_AND", 3;
    BitOr = "BIT_OR", 3;
    BitXor = "BIT_XOR", 3;
    BitNot = "BIT_NOT", 2;
    LeftShift = "LEFT_SHIFT", 3;
    RightShift = "RIGHT_SHIFT", 3;
    ZeroRightShift = "ZERO_RIGHT_SHIFT", 3;
    Uns = "UNS", 3;
    Return0 = "RETURN0", 0;
    Return1 = "RETURN1", 1;
    Throw = "THROW", 1;
    Try = "TRY", 1;
    Catch = "CATCH", 2;
    Finally = "FINALLY", 1;
    PopContext = "POP_CONTEXT", 2;
    Delete = "DELETE", 2;
    DeleteProperty = "DELETE_PROPERTY", 3;
    SetGetter = "SET_GETTER", 3;
    SetSetter = "SET_SETTER", 3;
    Invalid = "INVALID", 0;
}

/// Number of opcodes including [`OpCode::Invalid`].
pub const NUM_OPCODES: usize = OpCode::ALL.len();

/// Bits of a full-width opcode field, derived from the opcode count.
pub const OP_BITS: u32 = op_bits(OpCode::Invalid as u32);

/// Bits of a half-width opcode field.
pub const OP_HALF_BITS: u32 = OP_BITS / 2;

const fn op_bits(max_code: u32) -> u32 {
    let mut bits = 1;
    let mut value = max_code;
    while value / 2 > 0 {
        value /= 2;
        bits += 1;
    }
    bits
}

impl OpCode {
    /// Decodes an opcode number. [`OpCode::Invalid`] itself is rejected, as
    /// it never appears in a well-formed stream.
    pub fn from_u8(code: u8) -> Option<Self> {
        OpCode::ALL
            .get(code as usize)
            .copied()
            .filter(|op| *op != OpCode::Invalid)
    }

    /// Operand layout.
    pub fn format(self) -> OperandFormat {
        match self {
            OpCode::Goto | OpCode::Try | OpCode::Finally => OperandFormat::Ax,
            OpCode::NJmp
            | OpCode::JmpPc
            | OpCode::Catch
            | OpCode::LoadK
            | OpCode::GetGlobal
            | OpCode::GetLocal => OperandFormat::ABx,
            other => OperandFormat::Abc(other.arity()),
        }
    }

    /// Whether the instruction transfers control.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::NJmp
                | OpCode::JmpPc
                | OpCode::Goto
                | OpCode::Try
                | OpCode::Catch
                | OpCode::Finally
                | OpCode::PopContext
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! subtype {
    ($(#[$meta:meta])* $name:ident { $( $variant:ident = $value:literal ),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant = $value,
            )*
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)*
                    other => Err(other),
                }
            }
        }
    };
}

subtype! {
    /// Kind of value created by `NEW` (operand B).
    NewKind {
        Map = 0,
        Array = 1,
        Function = 2,
        Object = 3,
        Constructor = 4,
        ImplConstructor = 5,
        ImplSuperConstructor = 6,
    }
}

subtype! {
    /// What `GET_SUPER` loads (operand B).
    SuperKind {
        Constructor = 0,
        Prototype = 1,
    }
}

subtype! {
    /// How `POP_CONTEXT` leaves a protected region (operand A).
    PopContextKind {
        End = 0,
        Jump = 1,
    }
}
