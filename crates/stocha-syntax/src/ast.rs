//! Expression trees for guards, weights, updates and constant initializers.

use std::fmt;

/// The type of an expression or state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Double,
    Bool,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Double => write!(f, "double"),
            Type::Bool => write!(f, "bool"),
        }
    }
}

/// A typed literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl TypedValue {
    /// The type of this value.
    pub fn value_type(&self) -> Type {
        match self {
            TypedValue::Int(_) => Type::Int,
            TypedValue::Double(_) => Type::Double,
            TypedValue::Bool(_) => Type::Bool,
        }
    }

    /// Numeric view as a double (bools map to 0/1).
    pub fn as_double(&self) -> f64 {
        match self {
            TypedValue::Int(n) => *n as f64,
            TypedValue::Double(d) => *d,
            TypedValue::Bool(b) => *b as i64 as f64,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(n) => write!(f, "{}", n),
            TypedValue::Double(d) => write!(f, "{}", d),
            TypedValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Floor,
    Ceil,
    Pow,
    Log,
    Mod,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Min => write!(f, "min"),
            Function::Max => write!(f, "max"),
            Function::Floor => write!(f, "floor"),
            Function::Ceil => write!(f, "ceil"),
            Function::Pow => write!(f, "pow"),
            Function::Log => write!(f, "log"),
            Function::Mod => write!(f, "mod"),
        }
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Arithmetic negation.
    Negate,
    /// Boolean negation.
    Not,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    /// Real division; the result is always double.
    Divide,
    And,
    Or,
    Imply,
    Iff,
    Less,
    LessEqual,
    GreaterEqual,
    Greater,
    Equal,
    NotEqual,
}

/// An expression tree. Children are owned exclusively by their parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(TypedValue),
    /// A named constant, state variable, or formula reference.
    Identifier(String),
    /// A call to a built-in function.
    FunctionCall {
        function: Function,
        arguments: Vec<Expression>,
    },
    /// A unary operation.
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    /// A binary operation.
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `condition ? if_branch : else_branch`.
    Conditional {
        condition: Box<Expression>,
        if_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
}

impl Expression {
    pub fn literal_int(n: i64) -> Expression {
        Expression::Literal(TypedValue::Int(n))
    }

    pub fn literal_double(d: f64) -> Expression {
        Expression::Literal(TypedValue::Double(d))
    }

    pub fn literal_bool(b: bool) -> Expression {
        Expression::Literal(TypedValue::Bool(b))
    }

    pub fn identifier(name: impl Into<String>) -> Expression {
        Expression::Identifier(name.into())
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Expression {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(
        condition: Expression,
        if_branch: Expression,
        else_branch: Expression,
    ) -> Expression {
        Expression::Conditional {
            condition: Box::new(condition),
            if_branch: Box::new(if_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn call(function: Function, arguments: Vec<Expression>) -> Expression {
        Expression::FunctionCall {
            function,
            arguments,
        }
    }

    /// Collect every identifier mentioned in this expression.
    pub fn collect_identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Identifier(name) => out.push(name.clone()),
            Expression::FunctionCall { arguments, .. } => {
                for arg in arguments {
                    arg.collect_identifiers(out);
                }
            }
            Expression::Unary { operand, .. } => operand.collect_identifiers(out),
            Expression::Binary { left, right, .. } => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
            Expression::Conditional {
                condition,
                if_branch,
                else_branch,
            } => {
                condition.collect_identifiers(out);
                if_branch.collect_identifiers(out);
                else_branch.collect_identifiers(out);
            }
        }
    }
}
