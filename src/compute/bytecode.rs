use super::kernel::Builtin;
use super::parser::{BinaryOp, CompareOp, CompileError, Expr, UnaryOp};
use crate::store::{types::is_reserved, VarRef};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    Const(f64),
    /// Pushes the value bound to input slot `n`.
    Slot(u32),
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    /// Pops the condition and jumps to the absolute address when it is zero.
    JumpIfFalse(u32),
    Jump(u32),
    Call(Builtin, u32),
}

/// A linear stack program evaluating one right-hand side.
/// Slot `n` is the equation's `n`-th input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub ops: Vec<OpCode>,
}

pub struct Compiler<'a> {
    inputs: &'a [VarRef],
}

impl<'a> Compiler<'a> {
    pub fn new(inputs: &'a [VarRef]) -> Self {
        Self { inputs }
    }

    /// Rejects everything outside the permitted expression language: attribute
    /// access, calls to anything but the builtins, bare builtin names, and
    /// identifiers that are not variables.
    pub fn check_tree(expr: &Expr) -> Result<(), CompileError> {
        let violation = |detail: String| Err(CompileError::SandboxViolation(detail));
        match expr {
            Expr::Num(_) | Expr::Ref(_) => Ok(()),
            Expr::Name(name) => {
                if Builtin::from_name(name).is_some() {
                    violation(format!("builtin '{}' used as a value", name))
                } else if is_reserved(name) || VarRef::parse(name).is_err() {
                    violation(format!("'{}' is not a variable", name))
                } else {
                    Ok(())
                }
            }
            Expr::Attribute(_, attr) => violation(format!("attribute access '.{}'", attr)),
            Expr::Unary(_, e) => Self::check_tree(e),
            Expr::Binary(_, l, r) | Expr::Compare(_, l, r) => {
                Self::check_tree(l)?;
                Self::check_tree(r)
            }
            Expr::IfElse { cond, then, otherwise } => {
                Self::check_tree(cond)?;
                Self::check_tree(then)?;
                Self::check_tree(otherwise)
            }
            Expr::Call { func, args, kwargs } => {
                let builtin = match Builtin::from_name(func) {
                    Some(b) => b,
                    None => return violation(format!("call to '{}'", func)),
                };
                if !kwargs.is_empty() && builtin.keywords().is_empty() {
                    return violation(format!("'{}' takes no keyword arguments", func));
                }
                for a in args {
                    Self::check_tree(a)?;
                }
                for (_, v) in kwargs {
                    Self::check_tree(v)?;
                }
                Ok(())
            }
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Program, CompileError> {
        Self::check_tree(expr)?;
        let mut ops = Vec::new();
        self.emit(expr, &mut ops)?;
        Ok(Program { ops })
    }

    fn slot_of(&self, reference: &VarRef) -> Result<OpCode, CompileError> {
        self.inputs
            .iter()
            .position(|r| r == reference)
            .map(|i| OpCode::Slot(i as u32))
            .ok_or_else(|| CompileError::SandboxViolation(format!("'{}' is not a bound input", reference)))
    }

    fn emit(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Num(v) => ops.push(OpCode::Const(*v)),
            Expr::Name(name) => ops.push(self.slot_of(&VarRef::parse(name)?)?),
            Expr::Ref(r) => ops.push(self.slot_of(r)?),
            Expr::Unary(UnaryOp::Pos, e) => self.emit(e, ops)?,
            Expr::Unary(UnaryOp::Neg, e) => {
                self.emit(e, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Binary(op, l, r) => {
                self.emit(l, ops)?;
                self.emit(r, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::FloorDiv => OpCode::FloorDiv,
                    BinaryOp::Mod => OpCode::Mod,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Compare(op, l, r) => {
                self.emit(l, ops)?;
                self.emit(r, ops)?;
                ops.push(match op {
                    CompareOp::Lt => OpCode::Lt,
                    CompareOp::Lte => OpCode::Lte,
                    CompareOp::Gt => OpCode::Gt,
                    CompareOp::Gte => OpCode::Gte,
                    CompareOp::Eq => OpCode::Eq,
                    CompareOp::Neq => OpCode::Neq,
                });
            }
            Expr::IfElse { cond, then, otherwise } => {
                self.emit(cond, ops)?;
                let branch = ops.len();
                ops.push(OpCode::JumpIfFalse(0));
                self.emit(then, ops)?;
                let skip = ops.len();
                ops.push(OpCode::Jump(0));
                ops[branch] = OpCode::JumpIfFalse(ops.len() as u32);
                self.emit(otherwise, ops)?;
                ops[skip] = OpCode::Jump(ops.len() as u32);
            }
            Expr::Call { func, args, kwargs } => {
                let builtin = Builtin::from_name(func)
                    .ok_or_else(|| CompileError::SandboxViolation(format!("call to '{}'", func)))?;
                let ordered = Self::bind_arguments(builtin, args, kwargs)?;
                for a in &ordered {
                    self.emit(a, ops)?;
                }
                ops.push(OpCode::Call(builtin, ordered.len() as u32));
            }
            Expr::Attribute(_, attr) => {
                return Err(CompileError::SandboxViolation(format!("attribute access '.{}'", attr)))
            }
        }
        Ok(())
    }

    /// Normalizes keyword arguments into positional order.
    fn bind_arguments<'e>(
        builtin: Builtin,
        args: &'e [Expr],
        kwargs: &'e [(String, Expr)],
    ) -> Result<Vec<&'e Expr>, CompileError> {
        let keywords = builtin.keywords();
        if keywords.is_empty() {
            if args.is_empty() {
                return Err(CompileError::SandboxViolation(format!("'{}' needs at least one argument", builtin.name())));
            }
            return Ok(args.iter().collect());
        }

        let mut bound: Vec<Option<&Expr>> = vec![None; keywords.len()];
        if args.len() > keywords.len() {
            return Err(CompileError::SandboxViolation(format!(
                "'{}' takes {} arguments, got {}",
                builtin.name(),
                keywords.len(),
                args.len()
            )));
        }
        for (slot, a) in bound.iter_mut().zip(args) {
            *slot = Some(a);
        }
        for (key, value) in kwargs {
            let at = keywords.iter().position(|k| k == key).ok_or_else(|| {
                CompileError::SandboxViolation(format!("'{}' has no argument '{}'", builtin.name(), key))
            })?;
            if bound[at].replace(value).is_some() {
                return Err(CompileError::SandboxViolation(format!(
                    "argument '{}' of '{}' given twice",
                    key,
                    builtin.name()
                )));
            }
        }
        bound
            .into_iter()
            .zip(keywords)
            .map(|(b, k)| {
                b.ok_or_else(|| {
                    CompileError::SandboxViolation(format!("'{}' is missing argument '{}'", builtin.name(), k))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::parser::parse_expression;
    use rstest::rstest;

    fn compile(rhs: &str) -> Result<Program, CompileError> {
        let expr = parse_expression(rhs)?;
        let inputs = expr.references();
        Compiler::new(&inputs).compile(&expr)
    }

    #[test]
    fn test_ternary_jump_targets() {
        let program = compile("a if c else b").unwrap();
        assert_eq!(
            program.ops,
            vec![
                OpCode::Slot(1),
                OpCode::JumpIfFalse(4),
                OpCode::Slot(0),
                OpCode::Jump(5),
                OpCode::Slot(2),
            ]
        );
    }

    #[test]
    fn test_rbf_keywords_are_reordered() {
        let program = compile("rbf(n_nodes=2, inputs=x, param=p)").unwrap();
        assert_eq!(
            program.ops,
            vec![OpCode::Slot(0), OpCode::Slot(1), OpCode::Const(2.0), OpCode::Call(Builtin::Rbf, 3)]
        );
    }

    #[rstest]
    #[case("x.real")]
    #[case("open(x)")]
    #[case("__import__(x)")]
    #[case("sum")]
    #[case("max(x, key=y)")]
    #[case("rbf(x, p)")]
    #[case("rbf(x, p, 1, inputs=x)")]
    #[case("sum()")]
    #[case("None + 1")]
    fn test_forbidden_constructs(#[case] rhs: &str) {
        assert!(matches!(compile(rhs), Err(CompileError::SandboxViolation(_))), "{}", rhs);
    }
}
