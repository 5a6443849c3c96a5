use super::bytecode::{Compiler, Program};
use super::kernel;
use super::ledger::{ComputationError, Value};
use super::parser::{self, CompileError};
use crate::store::VarRef;
use smallvec::SmallVec;

/// One compiled `outputs = expression` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub text: String,
    pub outputs: SmallVec<[VarRef; 1]>,
    /// Variables the expression reads, in order of first appearance.
    /// Slot `n` of `calculate` binds `inputs[n]`.
    pub inputs: Vec<VarRef>,
    program: Program,
}

impl Equation {
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let text = text.trim();
        let (lhs, rhs) = parser::split_equation(text)?;
        let outputs = parser::parse_outputs(lhs)?;
        let expr = parser::parse_expression(rhs)?;
        let inputs = expr.references();
        let program = Compiler::new(&inputs).compile(&expr)?;

        Ok(Self { text: text.to_string(), outputs: outputs.into_iter().collect(), inputs, program })
    }

    /// Evaluates the expression with `slots` aligned to `inputs`.
    pub fn calculate(&self, slots: &[Value]) -> Result<f64, ComputationError> {
        if slots.len() != self.inputs.len() {
            return Err(ComputationError::MathError(format!(
                "'{}' expects {} inputs, got {}",
                self.text,
                self.inputs.len(),
                slots.len()
            )));
        }
        kernel::execute(&self.program, slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_calculate() {
        let eq = Equation::parse("  Z = X + Y  ").unwrap();
        assert_eq!(eq.text, "Z = X + Y");
        assert_eq!(eq.outputs[0].text(), "Z");
        assert_eq!(eq.inputs.iter().map(VarRef::text).collect::<Vec<_>>(), vec!["X", "Y"]);
        assert_eq!(eq.calculate(&[Value::Scalar(3.0), Value::Scalar(4.0)]), Ok(7.0));
    }

    #[test]
    fn test_time_symbol_is_an_input() {
        let eq = Equation::parse("X[t] = t * 2").unwrap();
        assert!(eq.inputs[0].is_time_symbol());
        assert_eq!(eq.calculate(&[Value::Scalar(5.0)]), Ok(10.0));
    }

    #[test]
    fn test_constant_equation() {
        let eq = Equation::parse("F[0] = 0").unwrap();
        assert!(eq.inputs.is_empty());
        assert_eq!(eq.calculate(&[]), Ok(0.0));
    }

    #[test]
    fn test_slot_count_mismatch() {
        let eq = Equation::parse("y = a + b").unwrap();
        assert!(eq.calculate(&[Value::Scalar(1.0)]).is_err());
    }

    #[test]
    fn test_rejects_sandbox_escape() {
        assert!(matches!(
            Equation::parse("y = x.__class__"),
            Err(CompileError::SandboxViolation(_))
        ));
        assert!(matches!(Equation::parse("y = eval(x)"), Err(CompileError::SandboxViolation(_))));
    }
}
