//! The stack machine executing compiled right-hand sides, and the builtin
//! functions available to equations.

use super::bytecode::{OpCode, Program};
use super::ledger::{ComputationError, Value};
use smallvec::SmallVec;

/// Operands with a magnitude above this are refused by `**`.
pub const POWER_OPERAND_LIMIT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Sum,
    Max,
    Min,
    Mean,
    Rbf,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Builtin::Sum),
            "max" => Some(Builtin::Max),
            "min" => Some(Builtin::Min),
            "mean" => Some(Builtin::Mean),
            "rbf" => Some(Builtin::Rbf),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Sum => "sum",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Mean => "mean",
            Builtin::Rbf => "rbf",
        }
    }

    /// Parameter names accepted as keywords. Empty for variadic builtins.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Builtin::Rbf => &["inputs", "param", "n_nodes"],
            _ => &[],
        }
    }

    pub fn apply(&self, args: &[Value]) -> Result<f64, ComputationError> {
        if *self == Builtin::Rbf {
            return match args {
                [inputs, param, n_nodes] => rbf(&inputs.to_vec(), &param.to_vec(), n_nodes.as_scalar()?),
                _ => Err(self.fail(format!("expects 3 arguments, got {}", args.len()))),
            };
        }

        let values: Vec<f64> = args.iter().flat_map(Value::to_vec).collect();
        match self {
            Builtin::Sum => Ok(values.iter().sum()),
            Builtin::Max => values
                .iter()
                .copied()
                .reduce(f64::max)
                .ok_or_else(|| self.fail("arg is an empty sequence".into())),
            Builtin::Min => values
                .iter()
                .copied()
                .reduce(f64::min)
                .ok_or_else(|| self.fail("arg is an empty sequence".into())),
            Builtin::Mean => {
                if values.is_empty() {
                    Err(self.fail("mean of an empty sequence".into()))
                } else {
                    Ok(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            Builtin::Rbf => unreachable!(),
        }
    }

    fn fail(&self, message: String) -> ComputationError {
        ComputationError::Builtin { name: self.name(), message }
    }
}

/// Gaussian radial-basis-function network.
///
/// `param` holds, for each node, a (center, scale) pair per input, then one
/// weight per node, then the bias.
pub fn rbf(inputs: &[f64], param: &[f64], n_nodes: f64) -> Result<f64, ComputationError> {
    let fail = |message: String| ComputationError::Builtin { name: "rbf", message };
    if n_nodes < 0.0 || n_nodes.fract() != 0.0 {
        return Err(fail(format!("n_nodes must be a non-negative integer, got {}", n_nodes)));
    }
    let n_nodes = n_nodes as usize;
    let needed = n_nodes * (2 * inputs.len() + 1) + 1;
    if param.len() < needed {
        return Err(fail(format!("needs {} parameters, got {}", needed, param.len())));
    }

    let mut idx = 0;
    let mut output = 0.0;
    let mut bases: SmallVec<[f64; 8]> = SmallVec::with_capacity(n_nodes);
    for _ in 0..n_nodes {
        let mut acc = 0.0;
        for &x in inputs {
            let (center, scale) = (param[idx], param[idx + 1]);
            acc += (x - center).powi(2) / scale.powi(2);
            idx += 2;
        }
        bases.push((-acc).exp());
    }
    for base in bases {
        output += base * param[idx];
        idx += 1;
    }
    Ok(output + param[idx])
}

/// `**` with its operand guard.
pub fn power(base: f64, exponent: f64) -> Result<f64, ComputationError> {
    if base.abs() > POWER_OPERAND_LIMIT || exponent.abs() > POWER_OPERAND_LIMIT {
        return Err(ComputationError::PowerOverflow { base, exponent });
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(ComputationError::DivisionByZero);
    }
    let result = base.powf(exponent);
    if result.is_infinite() {
        return Err(ComputationError::PowerOverflow { base, exponent });
    }
    if result.is_nan() && !base.is_nan() && !exponent.is_nan() {
        return Err(ComputationError::MathError(format!("{} ** {} has no real value", base, exponent)));
    }
    Ok(result)
}

/// Division rounding toward negative infinity.
pub fn floor_div(a: f64, b: f64) -> Result<f64, ComputationError> {
    if b == 0.0 {
        return Err(ComputationError::DivisionByZero);
    }
    Ok((a / b).floor())
}

/// Remainder taking the sign of the divisor.
pub fn modulo(a: f64, b: f64) -> Result<f64, ComputationError> {
    if b == 0.0 {
        return Err(ComputationError::DivisionByZero);
    }
    let r = a % b;
    Ok(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
}

#[inline(always)]
fn truth(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// Runs `program` with `slots[n]` bound to the equation's `n`-th input.
pub fn execute(program: &Program, slots: &[Value]) -> Result<f64, ComputationError> {
    let mut stack: SmallVec<[Value; 16]> = SmallVec::new();
    let underflow = || ComputationError::MathError("malformed program: stack underflow".into());
    let mut pc = 0;

    while pc < program.ops.len() {
        let op = program.ops[pc];
        pc += 1;
        match op {
            OpCode::Const(v) => stack.push(Value::Scalar(v)),
            OpCode::Slot(i) => {
                let value = slots
                    .get(i as usize)
                    .ok_or_else(|| ComputationError::MathError(format!("unbound input slot {}", i)))?;
                stack.push(value.clone());
            }
            OpCode::Neg => {
                let v = stack.pop().ok_or_else(underflow)?.as_scalar()?;
                stack.push(Value::Scalar(-v));
            }
            OpCode::JumpIfFalse(target) => {
                let cond = stack.pop().ok_or_else(underflow)?.as_scalar()?;
                if cond == 0.0 {
                    pc = target as usize;
                }
            }
            OpCode::Jump(target) => pc = target as usize,
            OpCode::Call(builtin, argc) => {
                let argc = argc as usize;
                if stack.len() < argc {
                    return Err(underflow());
                }
                let from = stack.len() - argc;
                let args: SmallVec<[Value; 4]> = stack.drain(from..).collect();
                stack.push(Value::Scalar(builtin.apply(&args)?));
            }
            binary => {
                let b = stack.pop().ok_or_else(underflow)?.as_scalar()?;
                let a = stack.pop().ok_or_else(underflow)?.as_scalar()?;
                let result = match binary {
                    OpCode::Add => a + b,
                    OpCode::Sub => a - b,
                    OpCode::Mul => a * b,
                    OpCode::Div => {
                        if b == 0.0 {
                            return Err(ComputationError::DivisionByZero);
                        }
                        a / b
                    }
                    OpCode::FloorDiv => floor_div(a, b)?,
                    OpCode::Mod => modulo(a, b)?,
                    OpCode::Pow => power(a, b)?,
                    OpCode::Lt => truth(a < b),
                    OpCode::Lte => truth(a <= b),
                    OpCode::Gt => truth(a > b),
                    OpCode::Gte => truth(a >= b),
                    OpCode::Eq => truth(a == b),
                    OpCode::Neq => truth(a != b),
                    _ => unreachable!(),
                };
                stack.push(Value::Scalar(result));
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(v), true) => v.as_scalar(),
        _ => Err(ComputationError::MathError("malformed program: unbalanced stack".into())),
    }
}
