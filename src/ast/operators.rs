/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition (`add`)
    Add,
    /// Subtraction (`sub`)
    Sub,
    /// Multiplication (`mul`)
    Mul,
    /// Division, truncating for integers (`div`)
    Div,
    /// Real division (`divby`)
    DivBy,
    /// Remainder (`mod`)
    Mod,

    // Comparison
    /// Equal (`eq`), null-safe
    Eq,
    /// Not equal (`ne`), null-safe
    Ne,
    /// Greater than (`gt`)
    Gt,
    /// Greater than or equal (`ge`)
    Ge,
    /// Less than (`lt`)
    Lt,
    /// Less than or equal (`le`)
    Le,

    // Logical
    /// Logical AND (`and`)
    And,
    /// Logical OR (`or`)
    Or,
}

impl BinaryOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        use BinaryOp::*;
        let op = match word {
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "div" => Div,
            "divby" => DivBy,
            "mod" => Mod,
            "eq" => Eq,
            "ne" => Ne,
            "gt" => Gt,
            "ge" => Ge,
            "lt" => Lt,
            "le" => Le,
            "and" => And,
            "or" => Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn keyword(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            DivBy => "divby",
            Mod => "mod",
            Eq => "eq",
            Ne => "ne",
            Gt => "gt",
            Ge => "ge",
            Lt => "lt",
            Le => "le",
            And => "and",
            Or => "or",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Mul | Div | DivBy | Mod => 6,
            Add | Sub => 5,
            Gt | Ge | Lt | Le => 4,
            Eq | Ne => 3,
            And => 2,
            Or => 1,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        use BinaryOp::*;
        matches!(self, Add | Sub | Mul | Div | DivBy | Mod)
    }

    pub fn is_comparison(self) -> bool {
        self.is_equality() || self.is_relational()
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_relational(self) -> bool {
        use BinaryOp::*;
        matches!(self, Gt | Ge | Lt | Le)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// The comparison that holds when operands swap sides (`5 lt x` is `x gt 5`).
    pub fn flipped(self) -> Self {
        use BinaryOp::*;
        match self {
            Gt => Lt,
            Ge => Le,
            Lt => Gt,
            Le => Ge,
            other => other,
        }
    }

    /// The comparison that holds exactly when this one is false, for
    /// non-null operands.
    pub fn negated(self) -> Self {
        use BinaryOp::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Gt => Le,
            Ge => Lt,
            Lt => Ge,
            Le => Gt,
            other => other,
        }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation (`not`)
    Not,
    /// Arithmetic negation (`-`)
    Negate,
}

impl UnaryOp {
    pub const PRECEDENCE: u8 = 7;

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Negate => "-",
        }
    }
}

/// Precedence of `in`, the tightest-binding operator.
pub const IN_PRECEDENCE: u8 = 8;

/// Any operator as it appears in the compilation event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Membership test; followed by a literal list
    In,
}

impl Operator {
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Binary(op) => op.precedence(),
            Operator::Unary(_) => UnaryOp::PRECEDENCE,
            Operator::In => IN_PRECEDENCE,
        }
    }
}
