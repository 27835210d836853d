//! AST expression to register-code compiler.

use crate::error::CompileError;
use std::collections::HashMap;
use stocha_eval::{CompiledExpression, Operation};
use stocha_syntax::{BinaryOperator, Expression, Function, Type, TypedValue, UnaryOperator};

/// What a name refers to during compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierInfo {
    /// A constant, folded at compile time.
    Constant(TypedValue),
    /// A state variable: loads read the state vector at `index`.
    Variable {
        variable_type: Type,
        index: usize,
        min: i64,
        max: i64,
        init: i64,
    },
}

impl IdentifierInfo {
    pub fn identifier_type(&self) -> Type {
        match self {
            IdentifierInfo::Constant(value) => value.value_type(),
            IdentifierInfo::Variable { variable_type, .. } => *variable_type,
        }
    }
}

/// Compile an expression against an expected type.
///
/// Identifiers resolve through `substitutions` (renaming applied by the
/// module-composition layer), then `identifiers`, then `formulas`
/// (inlined by recursive compilation). Never panics on bad input: every
/// type mismatch, arity mismatch or unresolved name is reported in the
/// returned error list.
pub fn compile_expression(
    expr: &Expression,
    expected: Type,
    formulas: &HashMap<String, Expression>,
    identifiers: &HashMap<String, IdentifierInfo>,
    substitutions: &HashMap<String, String>,
) -> Result<CompiledExpression, Vec<CompileError>> {
    let mut compiler = ExpressionCompiler {
        formulas,
        identifiers,
        substitutions,
        inlining: Vec::new(),
        ops: Vec::new(),
        errors: Vec::new(),
    };
    let found = compiler.compile(expr, 0);
    compiler.coerce(found, expected, 0);
    if compiler.errors.is_empty() {
        Ok(CompiledExpression::new(compiler.ops))
    } else {
        Err(compiler.errors)
    }
}

struct ExpressionCompiler<'a> {
    formulas: &'a HashMap<String, Expression>,
    identifiers: &'a HashMap<String, IdentifierInfo>,
    substitutions: &'a HashMap<String, String>,
    /// Formula names currently being inlined, for cycle detection.
    inlining: Vec<String>,
    ops: Vec<Operation>,
    errors: Vec<CompileError>,
}

impl<'a> ExpressionCompiler<'a> {
    fn emit(&mut self, op: Operation) -> usize {
        let pc = self.ops.len();
        self.ops.push(op);
        pc
    }

    /// Patch a jump target at the given instruction.
    fn patch_jump(&mut self, pc: usize, target: usize) {
        if let Some(slot) = self.ops[pc].jump_target_mut() {
            *slot = target;
        }
    }

    /// Insert an operation, shifting jump targets that pointed at or
    /// past the insertion point.
    fn insert(&mut self, pos: usize, op: Operation) {
        for existing in self.ops.iter_mut() {
            if let Some(target) = existing.jump_target_mut() {
                if *target >= pos {
                    *target += 1;
                }
            }
        }
        self.ops.insert(pos, op);
    }

    fn error(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    /// Widen or reject: only int widens to double, everything else must
    /// match exactly.
    fn coerce(&mut self, found: Type, expected: Type, register: usize) {
        if found == expected {
            return;
        }
        if found == Type::Int && expected == Type::Double {
            self.emit(Operation::I2D { register });
            return;
        }
        self.error(CompileError::TypeMismatch {
            expected: expected.to_string(),
            found,
        });
    }

    fn require_bool(&mut self, found: Type) {
        if found != Type::Bool {
            self.error(CompileError::TypeMismatch {
                expected: Type::Bool.to_string(),
                found,
            });
        }
    }

    fn require_numeric(&mut self, found: Type) -> Type {
        if found == Type::Bool {
            self.error(CompileError::TypeMismatch {
                expected: "int or double".to_string(),
                found,
            });
            Type::Int
        } else {
            found
        }
    }

    /// Compile `expr` leaving its value in register `dst` (of the kind
    /// implied by the returned type). Subexpressions use `dst + 1` as
    /// scratch, so register pressure equals expression depth.
    fn compile(&mut self, expr: &Expression, dst: usize) -> Type {
        match expr {
            Expression::Literal(value) => self.compile_literal(*value, dst),
            Expression::Identifier(name) => self.compile_identifier(name, dst),
            Expression::Unary { op, operand } => self.compile_unary(*op, operand, dst),
            Expression::Binary { op, left, right } => self.compile_binary(*op, left, right, dst),
            Expression::Conditional {
                condition,
                if_branch,
                else_branch,
            } => self.compile_conditional(condition, if_branch, else_branch, dst),
            Expression::FunctionCall {
                function,
                arguments,
            } => self.compile_call(*function, arguments, dst),
        }
    }

    fn compile_literal(&mut self, value: TypedValue, dst: usize) -> Type {
        match value {
            TypedValue::Int(value) => {
                self.emit(Operation::IConst { value, dst });
                Type::Int
            }
            TypedValue::Double(value) => {
                self.emit(Operation::DConst { value, dst });
                Type::Double
            }
            TypedValue::Bool(value) => {
                self.emit(Operation::IConst {
                    value: value as i64,
                    dst,
                });
                Type::Bool
            }
        }
    }

    fn compile_identifier(&mut self, name: &str, dst: usize) -> Type {
        let name = self
            .substitutions
            .get(name)
            .map(String::as_str)
            .unwrap_or(name);
        if let Some(info) = self.identifiers.get(name) {
            return match *info {
                IdentifierInfo::Constant(value) => self.compile_literal(value, dst),
                IdentifierInfo::Variable {
                    variable_type: Type::Double,
                    ..
                } => {
                    self.error(CompileError::Unsupported(
                        "double variables not supported".to_string(),
                    ));
                    Type::Double
                }
                IdentifierInfo::Variable {
                    variable_type,
                    index,
                    ..
                } => {
                    self.emit(Operation::ILoad {
                        variable: index,
                        dst,
                    });
                    variable_type
                }
            };
        }
        if let Some(body) = self.formulas.get(name) {
            if self.inlining.iter().any(|inlined| inlined == name) {
                self.error(CompileError::CyclicFormula(name.to_string()));
                return Type::Int;
            }
            self.inlining.push(name.to_string());
            let found = self.compile(body, dst);
            self.inlining.pop();
            return found;
        }
        self.error(CompileError::UndefinedIdentifier(name.to_string()));
        Type::Int
    }

    fn compile_unary(&mut self, op: UnaryOperator, operand: &Expression, dst: usize) -> Type {
        let found = self.compile(operand, dst);
        match op {
            UnaryOperator::Negate => match self.require_numeric(found) {
                Type::Double => {
                    self.emit(Operation::DNeg { register: dst });
                    Type::Double
                }
                _ => {
                    self.emit(Operation::INeg { register: dst });
                    Type::Int
                }
            },
            UnaryOperator::Not => {
                self.require_bool(found);
                self.emit(Operation::Not { register: dst });
                Type::Bool
            }
        }
    }

    fn compile_binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        dst: usize,
    ) -> Type {
        use BinaryOperator::*;
        match op {
            // Short-circuit forms: the right operand is only evaluated
            // when it can still decide the result.
            And | Or | Imply => {
                let found = self.compile(left, dst);
                self.require_bool(found);
                if op == Imply {
                    self.emit(Operation::Not { register: dst });
                }
                let branch = match op {
                    And => self.emit(Operation::IfFalse {
                        condition: dst,
                        target: 0,
                    }),
                    _ => self.emit(Operation::IfTrue {
                        condition: dst,
                        target: 0,
                    }),
                };
                let found = self.compile(right, dst);
                self.require_bool(found);
                let end = self.ops.len();
                self.patch_jump(branch, end);
                Type::Bool
            }
            // Both sides always matter, so iff is a plain comparison of
            // the two boolean registers.
            Iff => {
                let found_left = self.compile(left, dst);
                self.require_bool(found_left);
                let found_right = self.compile(right, dst + 1);
                self.require_bool(found_right);
                self.emit(Operation::IEq { dst, src: dst + 1 });
                Type::Bool
            }
            Plus | Minus | Multiply => {
                let unified = self.compile_numeric_pair(left, right, dst);
                let (int_op, double_op): (
                    fn(usize, usize) -> Operation,
                    fn(usize, usize) -> Operation,
                ) = match op {
                    Plus => (
                        |dst, src| Operation::IAdd { dst, src },
                        |dst, src| Operation::DAdd { dst, src },
                    ),
                    Minus => (
                        |dst, src| Operation::ISub { dst, src },
                        |dst, src| Operation::DSub { dst, src },
                    ),
                    _ => (
                        |dst, src| Operation::IMul { dst, src },
                        |dst, src| Operation::DMul { dst, src },
                    ),
                };
                match unified {
                    Type::Double => {
                        self.emit(double_op(dst, dst + 1));
                        Type::Double
                    }
                    _ => {
                        self.emit(int_op(dst, dst + 1));
                        Type::Int
                    }
                }
            }
            // Division is real division regardless of operand types.
            Divide => {
                let found_left = self.compile(left, dst);
                let found_left = self.require_numeric(found_left);
                if found_left == Type::Int {
                    self.emit(Operation::I2D { register: dst });
                }
                let found_right = self.compile(right, dst + 1);
                let found_right = self.require_numeric(found_right);
                if found_right == Type::Int {
                    self.emit(Operation::I2D { register: dst + 1 });
                }
                self.emit(Operation::DDiv { dst, src: dst + 1 });
                Type::Double
            }
            Equal | NotEqual | Less | LessEqual | GreaterEqual | Greater => {
                self.compile_comparison(op, left, right, dst)
            }
        }
    }

    /// Compile two numeric operands into `dst` and `dst + 1`, widening
    /// the int side when the types differ. Returns the unified type.
    fn compile_numeric_pair(&mut self, left: &Expression, right: &Expression, dst: usize) -> Type {
        let found_left = self.compile(left, dst);
        let found_left = self.require_numeric(found_left);
        let found_right = self.compile(right, dst + 1);
        let found_right = self.require_numeric(found_right);
        match (found_left, found_right) {
            (Type::Int, Type::Double) => {
                // The right operand never touches dst, so widening here
                // still converts the left operand's value.
                self.emit(Operation::I2D { register: dst });
                Type::Double
            }
            (Type::Double, Type::Int) => {
                self.emit(Operation::I2D { register: dst + 1 });
                Type::Double
            }
            (Type::Double, Type::Double) => Type::Double,
            _ => Type::Int,
        }
    }

    fn compile_comparison(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        dst: usize,
    ) -> Type {
        use BinaryOperator::*;
        let found_left = self.compile(left, dst);
        let found_right = self.compile(right, dst + 1);

        if found_left == Type::Bool && found_right == Type::Bool {
            match op {
                Equal => {
                    self.emit(Operation::IEq { dst, src: dst + 1 });
                }
                NotEqual => {
                    self.emit(Operation::INe { dst, src: dst + 1 });
                }
                _ => {
                    self.error(CompileError::TypeMismatch {
                        expected: "int or double".to_string(),
                        found: Type::Bool,
                    });
                }
            }
            return Type::Bool;
        }

        let found_left = self.require_numeric(found_left);
        let found_right = self.require_numeric(found_right);
        let unified = match (found_left, found_right) {
            (Type::Int, Type::Double) => {
                self.emit(Operation::I2D { register: dst });
                Type::Double
            }
            (Type::Double, Type::Int) => {
                self.emit(Operation::I2D { register: dst + 1 });
                Type::Double
            }
            (Type::Double, _) => Type::Double,
            _ => Type::Int,
        };
        let src = dst + 1;
        let operation = match (op, unified) {
            (Equal, Type::Int) => Operation::IEq { dst, src },
            (Equal, _) => Operation::DEq { dst, src },
            (NotEqual, Type::Int) => Operation::INe { dst, src },
            (NotEqual, _) => Operation::DNe { dst, src },
            (Less, Type::Int) => Operation::ILt { dst, src },
            (Less, _) => Operation::DLt { dst, src },
            (LessEqual, Type::Int) => Operation::ILe { dst, src },
            (LessEqual, _) => Operation::DLe { dst, src },
            (GreaterEqual, Type::Int) => Operation::IGe { dst, src },
            (GreaterEqual, _) => Operation::DGe { dst, src },
            (Greater, Type::Int) => Operation::IGt { dst, src },
            (Greater, _) => Operation::DGt { dst, src },
            _ => unreachable!("non-comparison operator"),
        };
        self.emit(operation);
        Type::Bool
    }

    fn compile_conditional(
        &mut self,
        condition: &Expression,
        if_branch: &Expression,
        else_branch: &Expression,
        dst: usize,
    ) -> Type {
        let found = self.compile(condition, dst);
        self.require_bool(found);
        let branch = self.emit(Operation::IfFalse {
            condition: dst,
            target: 0,
        });
        let if_type = self.compile(if_branch, dst);
        let mut jump = self.emit(Operation::Goto { target: 0 });
        self.patch_jump(branch, self.ops.len());
        let else_type = self.compile(else_branch, dst);

        let result = match (if_type, else_type) {
            (a, b) if a == b => a,
            (Type::Int, Type::Double) => {
                // Widen at the end of the then-branch, before its exit
                // jump; the IFFALSE target shifts past the insertion.
                self.insert(jump, Operation::I2D { register: dst });
                jump += 1;
                Type::Double
            }
            (Type::Double, Type::Int) => {
                self.emit(Operation::I2D { register: dst });
                Type::Double
            }
            (a, b) => {
                self.error(CompileError::IncompatibleBranchTypes {
                    if_type: a,
                    else_type: b,
                });
                a
            }
        };
        self.patch_jump(jump, self.ops.len());
        result
    }

    fn compile_call(&mut self, function: Function, arguments: &[Expression], dst: usize) -> Type {
        match function {
            Function::Min | Function::Max => {
                if arguments.is_empty() {
                    self.error(CompileError::ArityMismatch {
                        function,
                        expected: "at least 1".to_string(),
                        found: 0,
                    });
                    return Type::Int;
                }
                // Fold pairwise left to right, widening the accumulator
                // as soon as a double argument appears.
                let found = self.compile(&arguments[0], dst);
                let mut acc = self.require_numeric(found);
                for argument in &arguments[1..] {
                    let found = self.compile(argument, dst + 1);
                    let found = self.require_numeric(found);
                    if acc == Type::Int && found == Type::Double {
                        self.emit(Operation::I2D { register: dst });
                        acc = Type::Double;
                    } else if acc == Type::Double && found == Type::Int {
                        self.emit(Operation::I2D { register: dst + 1 });
                    }
                    let src = dst + 1;
                    self.emit(match (function, acc) {
                        (Function::Min, Type::Int) => Operation::IMin { dst, src },
                        (Function::Min, _) => Operation::DMin { dst, src },
                        (Function::Max, Type::Int) => Operation::IMax { dst, src },
                        (Function::Max, _) => Operation::DMax { dst, src },
                        _ => unreachable!(),
                    });
                }
                acc
            }
            Function::Floor | Function::Ceil => {
                if arguments.len() != 1 {
                    self.error(CompileError::ArityMismatch {
                        function,
                        expected: "1".to_string(),
                        found: arguments.len(),
                    });
                    return Type::Int;
                }
                let found = self.compile(&arguments[0], dst);
                if self.require_numeric(found) == Type::Int {
                    self.emit(Operation::I2D { register: dst });
                }
                self.emit(match function {
                    Function::Floor => Operation::Floor { register: dst },
                    _ => Operation::Ceil { register: dst },
                });
                // The result re-widens only if the caller asks for a
                // double.
                Type::Int
            }
            Function::Pow | Function::Log => {
                if arguments.len() != 2 {
                    self.error(CompileError::ArityMismatch {
                        function,
                        expected: "2".to_string(),
                        found: arguments.len(),
                    });
                    return Type::Double;
                }
                for (offset, argument) in arguments.iter().enumerate() {
                    let found = self.compile(argument, dst + offset);
                    if self.require_numeric(found) == Type::Int {
                        self.emit(Operation::I2D {
                            register: dst + offset,
                        });
                    }
                }
                self.emit(match function {
                    Function::Pow => Operation::Pow { dst, src: dst + 1 },
                    _ => Operation::Log { dst, src: dst + 1 },
                });
                Type::Double
            }
            Function::Mod => {
                if arguments.len() != 2 {
                    self.error(CompileError::ArityMismatch {
                        function,
                        expected: "2".to_string(),
                        found: arguments.len(),
                    });
                    return Type::Int;
                }
                for (offset, argument) in arguments.iter().enumerate() {
                    let found = self.compile(argument, dst + offset);
                    if found != Type::Int {
                        self.error(CompileError::TypeMismatch {
                            expected: Type::Int.to_string(),
                            found,
                        });
                    }
                }
                self.emit(Operation::Mod { dst, src: dst + 1 });
                Type::Int
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocha_eval::{Evaluator, Operation as Op};
    use stocha_syntax::BinaryOperator as Bin;

    fn no_names() -> (
        HashMap<String, Expression>,
        HashMap<String, IdentifierInfo>,
        HashMap<String, String>,
    ) {
        (HashMap::new(), HashMap::new(), HashMap::new())
    }

    fn test_identifiers() -> HashMap<String, IdentifierInfo> {
        let mut identifiers = HashMap::new();
        identifiers.insert(
            "a".to_string(),
            IdentifierInfo::Variable {
                variable_type: Type::Int,
                index: 0,
                min: 0,
                max: 42,
                init: 17,
            },
        );
        identifiers.insert(
            "busy".to_string(),
            IdentifierInfo::Variable {
                variable_type: Type::Bool,
                index: 1,
                min: 0,
                max: 1,
                init: 0,
            },
        );
        identifiers.insert(
            "N".to_string(),
            IdentifierInfo::Constant(TypedValue::Int(4)),
        );
        identifiers
    }

    fn compile_ok(expr: &Expression, expected: Type) -> CompiledExpression {
        let (formulas, _, substitutions) = no_names();
        compile_expression(expr, expected, &formulas, &test_identifiers(), &substitutions)
            .expect("compilation failed")
    }

    fn compile_err(expr: &Expression, expected: Type) -> Vec<CompileError> {
        let (formulas, _, substitutions) = no_names();
        compile_expression(expr, expected, &formulas, &test_identifiers(), &substitutions)
            .expect_err("compilation unexpectedly succeeded")
    }

    #[test]
    fn literal_compiles_to_constant() {
        let expr = compile_ok(&Expression::literal_int(17), Type::Int);
        assert_eq!(expr.operations(), &[Op::IConst { value: 17, dst: 0 }]);
    }

    #[test]
    fn int_literal_widens_in_double_context() {
        let expr = compile_ok(&Expression::literal_int(17), Type::Double);
        assert_eq!(
            expr.operations(),
            &[Op::IConst { value: 17, dst: 0 }, Op::I2D { register: 0 }]
        );
    }

    #[test]
    fn mismatched_literal_is_exactly_one_error() {
        let errors = compile_err(&Expression::literal_bool(true), Type::Int);
        assert_eq!(
            errors,
            vec![CompileError::TypeMismatch {
                expected: "int".to_string(),
                found: Type::Bool
            }]
        );
        let errors = compile_err(&Expression::literal_double(0.5), Type::Int);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn constant_identifier_folds_to_literal() {
        let expr = compile_ok(&Expression::identifier("N"), Type::Int);
        assert_eq!(expr.operations(), &[Op::IConst { value: 4, dst: 0 }]);
    }

    #[test]
    fn variable_identifier_loads_state() {
        let expr = compile_ok(&Expression::identifier("a"), Type::Int);
        assert_eq!(
            expr.operations(),
            &[Op::ILoad {
                variable: 0,
                dst: 0
            }]
        );
        // Int variable in double context widens after the load.
        let expr = compile_ok(&Expression::identifier("a"), Type::Double);
        assert_eq!(
            expr.operations(),
            &[
                Op::ILoad {
                    variable: 0,
                    dst: 0
                },
                Op::I2D { register: 0 }
            ]
        );
    }

    #[test]
    fn undefined_identifier_is_one_error() {
        let errors = compile_err(&Expression::identifier("ghost"), Type::Int);
        assert_eq!(
            errors,
            vec![CompileError::UndefinedIdentifier("ghost".to_string())]
        );
    }

    #[test]
    fn substitution_applies_before_lookup() {
        let (formulas, _, _) = no_names();
        let mut substitutions = HashMap::new();
        substitutions.insert("b".to_string(), "a".to_string());
        let expr = compile_expression(
            &Expression::identifier("b"),
            Type::Int,
            &formulas,
            &test_identifiers(),
            &substitutions,
        )
        .unwrap();
        assert_eq!(
            expr.operations(),
            &[Op::ILoad {
                variable: 0,
                dst: 0
            }]
        );
    }

    #[test]
    fn formulas_inline_recursively() {
        let mut formulas = HashMap::new();
        formulas.insert(
            "two_a".to_string(),
            Expression::binary(
                Bin::Multiply,
                Expression::literal_int(2),
                Expression::identifier("a"),
            ),
        );
        let expr = compile_expression(
            &Expression::identifier("two_a"),
            Type::Int,
            &formulas,
            &test_identifiers(),
            &HashMap::new(),
        )
        .unwrap();
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_int(&expr, &[21, 0]), 42);
    }

    #[test]
    fn cyclic_formula_is_reported() {
        let mut formulas = HashMap::new();
        formulas.insert("f".to_string(), Expression::identifier("g"));
        formulas.insert("g".to_string(), Expression::identifier("f"));
        let errors = compile_expression(
            &Expression::identifier("f"),
            Type::Int,
            &formulas,
            &test_identifiers(),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompileError::CyclicFormula(_))));
    }

    #[test]
    fn and_short_circuits() {
        // busy && a == 17 must not evaluate the comparison when busy is
        // false.
        let expr = compile_ok(
            &Expression::binary(
                Bin::And,
                Expression::identifier("busy"),
                Expression::binary(
                    Bin::Equal,
                    Expression::identifier("a"),
                    Expression::literal_int(17),
                ),
            ),
            Type::Bool,
        );
        assert!(expr
            .operations()
            .iter()
            .any(|op| matches!(op, Op::IfFalse { .. })));
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_bool(&expr, &[17, 1]), true);
        assert_eq!(evaluator.evaluate_bool(&expr, &[17, 0]), false);
        assert_eq!(evaluator.evaluate_bool(&expr, &[16, 1]), false);
    }

    #[test]
    fn or_and_imply_evaluate_correctly() {
        let or = compile_ok(
            &Expression::binary(
                Bin::Or,
                Expression::identifier("busy"),
                Expression::literal_bool(false),
            ),
            Type::Bool,
        );
        let imply = compile_ok(
            &Expression::binary(
                Bin::Imply,
                Expression::identifier("busy"),
                Expression::binary(
                    Bin::Greater,
                    Expression::identifier("a"),
                    Expression::literal_int(10),
                ),
            ),
            Type::Bool,
        );
        let iff = compile_ok(
            &Expression::binary(
                Bin::Iff,
                Expression::identifier("busy"),
                Expression::binary(
                    Bin::Greater,
                    Expression::identifier("a"),
                    Expression::literal_int(10),
                ),
            ),
            Type::Bool,
        );
        let mut evaluator = Evaluator::new(
            or.register_counts()
                .max(imply.register_counts())
                .max(iff.register_counts()),
        );
        assert!(evaluator.evaluate_bool(&or, &[0, 1]));
        assert!(!evaluator.evaluate_bool(&or, &[0, 0]));
        // busy=1, a=5: 1 => false is false
        assert!(!evaluator.evaluate_bool(&imply, &[5, 1]));
        // busy=0: vacuous truth
        assert!(evaluator.evaluate_bool(&imply, &[5, 0]));
        assert!(evaluator.evaluate_bool(&imply, &[11, 1]));
        assert!(evaluator.evaluate_bool(&iff, &[11, 1]));
        assert!(evaluator.evaluate_bool(&iff, &[5, 0]));
        assert!(!evaluator.evaluate_bool(&iff, &[11, 0]));
    }

    #[test]
    fn mixed_arithmetic_widens() {
        // a + 0.5 is double
        let expr = compile_ok(
            &Expression::binary(
                Bin::Plus,
                Expression::identifier("a"),
                Expression::literal_double(0.5),
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[3, 0]), 3.5);
    }

    #[test]
    fn division_is_always_real() {
        let expr = compile_ok(
            &Expression::binary(
                Bin::Divide,
                Expression::literal_int(1),
                Expression::literal_int(4),
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[]), 0.25);
    }

    #[test]
    fn conditional_unifies_branch_types() {
        // busy ? a : 0.5 — the int branch widens inside the branch.
        let expr = compile_ok(
            &Expression::conditional(
                Expression::identifier("busy"),
                Expression::identifier("a"),
                Expression::literal_double(0.5),
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[7, 1]), 7.0);
        assert_eq!(evaluator.evaluate_double(&expr, &[7, 0]), 0.5);

        // Mirror case: double then-branch, int else-branch.
        let expr = compile_ok(
            &Expression::conditional(
                Expression::identifier("busy"),
                Expression::literal_double(0.5),
                Expression::identifier("a"),
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[7, 1]), 0.5);
        assert_eq!(evaluator.evaluate_double(&expr, &[7, 0]), 7.0);
    }

    #[test]
    fn conditional_with_bool_and_int_branches_is_an_error() {
        let errors = compile_err(
            &Expression::conditional(
                Expression::identifier("busy"),
                Expression::literal_bool(true),
                Expression::literal_int(3),
            ),
            Type::Bool,
        );
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompileError::IncompatibleBranchTypes { .. })));
    }

    #[test]
    fn min_max_fold_pairwise() {
        let expr = compile_ok(
            &Expression::call(
                Function::Min,
                vec![
                    Expression::identifier("a"),
                    Expression::literal_int(10),
                    Expression::literal_int(3),
                ],
            ),
            Type::Int,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_int(&expr, &[7, 0]), 3);

        // A double argument promotes the whole fold.
        let expr = compile_ok(
            &Expression::call(
                Function::Max,
                vec![
                    Expression::identifier("a"),
                    Expression::literal_double(2.5),
                ],
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[2, 0]), 2.5);
        assert_eq!(evaluator.evaluate_double(&expr, &[3, 0]), 3.0);
    }

    #[test]
    fn min_of_nothing_is_an_arity_error() {
        let errors = compile_err(&Expression::call(Function::Min, vec![]), Type::Int);
        assert_eq!(
            errors,
            vec![CompileError::ArityMismatch {
                function: Function::Min,
                expected: "at least 1".to_string(),
                found: 0
            }]
        );
    }

    #[test]
    fn floor_result_type_follows_expected_type() {
        let as_int = compile_ok(
            &Expression::call(Function::Floor, vec![Expression::literal_double(2.7)]),
            Type::Int,
        );
        assert_eq!(
            as_int.operations(),
            &[Op::DConst { value: 2.7, dst: 0 }, Op::Floor { register: 0 }]
        );
        let mut evaluator = Evaluator::for_expression(&as_int);
        assert_eq!(evaluator.evaluate_int(&as_int, &[]), 2);

        let as_double = compile_ok(
            &Expression::call(Function::Ceil, vec![Expression::literal_double(2.2)]),
            Type::Double,
        );
        // The extra I2D appears only because a double result was asked
        // for.
        assert_eq!(
            as_double.operations().last(),
            Some(&Op::I2D { register: 0 })
        );
        let mut evaluator = Evaluator::for_expression(&as_double);
        assert_eq!(evaluator.evaluate_double(&as_double, &[]), 3.0);
    }

    #[test]
    fn mod_requires_two_int_arguments() {
        let expr = compile_ok(
            &Expression::call(
                Function::Mod,
                vec![Expression::identifier("a"), Expression::literal_int(5)],
            ),
            Type::Int,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_int(&expr, &[17, 0]), 2);

        let errors = compile_err(
            &Expression::call(
                Function::Mod,
                vec![
                    Expression::literal_double(1.5),
                    Expression::literal_int(5),
                ],
            ),
            Type::Int,
        );
        assert_eq!(errors.len(), 1);

        let errors = compile_err(
            &Expression::call(Function::Mod, vec![Expression::literal_int(5)]),
            Type::Int,
        );
        assert_eq!(
            errors,
            vec![CompileError::ArityMismatch {
                function: Function::Mod,
                expected: "2".to_string(),
                found: 1
            }]
        );
    }

    #[test]
    fn pow_and_log_widen_int_arguments() {
        let expr = compile_ok(
            &Expression::call(
                Function::Pow,
                vec![Expression::literal_int(2), Expression::identifier("a")],
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert_eq!(evaluator.evaluate_double(&expr, &[10, 0]), 1024.0);

        let expr = compile_ok(
            &Expression::call(
                Function::Log,
                vec![Expression::literal_int(8), Expression::literal_int(2)],
            ),
            Type::Double,
        );
        let mut evaluator = Evaluator::for_expression(&expr);
        assert!((evaluator.evaluate_double(&expr, &[]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn double_variables_are_rejected() {
        let mut identifiers = test_identifiers();
        identifiers.insert(
            "x".to_string(),
            IdentifierInfo::Variable {
                variable_type: Type::Double,
                index: 2,
                min: 0,
                max: 1,
                init: 0,
            },
        );
        let errors = compile_expression(
            &Expression::identifier("x"),
            Type::Double,
            &HashMap::new(),
            &identifiers,
            &HashMap::new(),
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::Unsupported(
                "double variables not supported".to_string()
            )]
        );
    }

    #[test]
    fn negation_of_bool_is_an_error() {
        let errors = compile_err(
            &Expression::unary(UnaryOperator::Negate, Expression::identifier("busy")),
            Type::Int,
        );
        assert_eq!(errors.len(), 1);
    }
}
