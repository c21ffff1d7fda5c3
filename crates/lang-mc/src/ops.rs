//! Operators and storage classes of the dialect.

/// Binary operators, including the compound assignments and the array
/// subscript (which the grammar treats as a binary operator whose right
/// operand is the index expression).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equality,
    Inequality,
    Inferior,
    InferiorOrEqual,
    Superior,
    SuperiorOrEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    ArrayRef,
    Assignment,
    IncAssign,
    DecAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LeftAssign,
    RightAssign,
}

impl BinaryOp {
    /// The token as written in source code, for diagnostics.
    pub fn token(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Equality => "==",
            Inequality => "!=",
            Inferior => "<",
            InferiorOrEqual => "<=",
            Superior => ">",
            SuperiorOrEqual => ">=",
            LogicalAnd => "&&",
            LogicalOr => "||",
            BitwiseAnd => "&",
            BitwiseOr => "|",
            BitwiseXor => "^",
            LeftShift => "<<",
            RightShift => ">>",
            ArrayRef => "[]",
            Assignment => "=",
            IncAssign => "+=",
            DecAssign => "-=",
            MulAssign => "*=",
            DivAssign => "/=",
            ModAssign => "%=",
            AndAssign => "&=",
            OrAssign => "|=",
            XorAssign => "^=",
            LeftAssign => "<<=",
            RightAssign => ">>=",
        }
    }

    pub fn is_relational(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Equality | Inequality | Inferior | InferiorOrEqual | Superior | SuperiorOrEqual
        )
    }

    /// Ordering comparisons, i.e. the relational operators for which the
    /// signedness of the operands changes the branch instruction.
    pub fn is_order_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Inferior | InferiorOrEqual | Superior | SuperiorOrEqual
        )
    }

    pub fn is_assignment(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Assignment
                | IncAssign
                | DecAssign
                | MulAssign
                | DivAssign
                | ModAssign
                | AndAssign
                | OrAssign
                | XorAssign
                | LeftAssign
                | RightAssign
        )
    }

    /// For a compound assignment, the operator that computes the new
    /// value. Plain assignment has none.
    pub fn compound_operation(self) -> Option<BinaryOp> {
        use BinaryOp::*;
        match self {
            IncAssign => Some(Add),
            DecAssign => Some(Sub),
            MulAssign => Some(Mul),
            DivAssign => Some(Div),
            ModAssign => Some(Mod),
            AndAssign => Some(BitwiseAnd),
            OrAssign => Some(BitwiseOr),
            XorAssign => Some(BitwiseXor),
            LeftAssign => Some(LeftShift),
            RightAssign => Some(RightShift),
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Identity,
    Neg,
    BooleanNeg,
    BitwiseNot,
    AddressOf,
    Indirection,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    SizeOf,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        use UnaryOp::*;
        match self {
            Identity => "unary +",
            Neg => "unary -",
            BooleanNeg => "!",
            BitwiseNot => "~",
            AddressOf => "&",
            Indirection => "*",
            PreInc => "++ (pre)",
            PreDec => "-- (pre)",
            PostInc => "++ (post)",
            PostDec => "-- (post)",
            SizeOf => "sizeof",
        }
    }

    pub fn is_inc_dec(self) -> bool {
        use UnaryOp::*;
        matches!(self, PreInc | PreDec | PostInc | PostDec)
    }
}

/// Storage class of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Local variable or formal parameter, lives in the stack frame.
    Auto,
    /// Function-local or file-local variable with static duration.
    Static,
    /// Declared here, defined in another translation unit.
    Extern,
    /// File-scope definition visible to the linker.
    Global,
}

impl StorageClass {
    pub fn is_static_duration(self) -> bool {
        !matches!(self, StorageClass::Auto)
    }
}

/// Jump statement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Break,
    Continue,
    Return,
    Goto,
}
