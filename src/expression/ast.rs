use std::fmt;

/// Single-argument functions callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Radians,
    Degrees,
    Sin,
    Asin,
    Cos,
    Acos,
    Tan,
    Atan,
    Log2,
    Log,
    Sqrt,
    Exp2,
    Exp,
    Abs,
    Sign,
    Floor,
    Ceil,
    Fract,
}

impl Function {
    pub const ALL: [Function; 18] = [
        Function::Radians,
        Function::Degrees,
        Function::Sin,
        Function::Asin,
        Function::Cos,
        Function::Acos,
        Function::Tan,
        Function::Atan,
        Function::Log2,
        Function::Log,
        Function::Sqrt,
        Function::Exp2,
        Function::Exp,
        Function::Abs,
        Function::Sign,
        Function::Floor,
        Function::Ceil,
        Function::Fract,
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Name in the expression language. Matches the WGSL builtin.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Function::Radians => "radians",
            Function::Degrees => "degrees",
            Function::Sin => "sin",
            Function::Asin => "asin",
            Function::Cos => "cos",
            Function::Acos => "acos",
            Function::Tan => "tan",
            Function::Atan => "atan",
            Function::Log2 => "log2",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
            Function::Exp2 => "exp2",
            Function::Exp => "exp",
            Function::Abs => "abs",
            Function::Sign => "sign",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Fract => "fract",
        }
    }

    /// Evaluate with shader semantics: `sign(0) == 0`, `fract(x) == x - floor(x)`.
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Function::Radians => x.to_radians(),
            Function::Degrees => x.to_degrees(),
            Function::Sin => x.sin(),
            Function::Asin => x.asin(),
            Function::Cos => x.cos(),
            Function::Acos => x.acos(),
            Function::Tan => x.tan(),
            Function::Atan => x.atan(),
            Function::Log2 => x.log2(),
            Function::Log => x.ln(),
            Function::Sqrt => x.sqrt(),
            Function::Exp2 => x.exp2(),
            Function::Exp => x.exp(),
            Function::Abs => x.abs(),
            Function::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    x
                }
            }
            Function::Floor => x.floor(),
            Function::Ceil => x.ceil(),
            Function::Fract => x - x.floor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
        }
    }

    #[inline]
    #[must_use]
    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Neg,
}

/// Expression tree. Band indices are 0-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Band(usize),
    Unary { op: UnaryOp, expr: Box<Node> },
    Binary { lhs: Box<Node>, op: BinaryOp, rhs: Box<Node> },
    Call { func: Function, arg: Box<Node> },
}

impl Node {
    /// Evaluate against per-band values indexed by band. Missing bands read as NaN.
    #[must_use]
    pub fn eval(&self, bands: &[f64]) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::Band(index) => bands.get(*index).copied().unwrap_or(f64::NAN),
            Node::Unary { op: UnaryOp::Plus, expr } => expr.eval(bands),
            Node::Unary { op: UnaryOp::Neg, expr } => -expr.eval(bands),
            Node::Binary { lhs, op, rhs } => op.apply(lhs.eval(bands), rhs.eval(bands)),
            Node::Call { func, arg } => func.apply(arg.eval(bands)),
        }
    }

    /// Collect referenced band indices into `out`.
    pub fn collect_bands(&self, out: &mut Vec<usize>) {
        match self {
            Node::Number(_) => {}
            Node::Band(index) => out.push(*index),
            Node::Unary { expr, .. } => expr.collect_bands(out),
            Node::Binary { lhs, rhs, .. } => {
                lhs.collect_bands(out);
                rhs.collect_bands(out);
            }
            Node::Call { arg, .. } => arg.collect_bands(out),
        }
    }

    /// Write the node as a WGSL `f32` expression, reading band `i` through `band`.
    pub fn write_wgsl(&self, out: &mut String, band: &dyn Fn(usize) -> String) {
        match self {
            Node::Number(v) => out.push_str(&wgsl_float(*v)),
            Node::Band(index) => out.push_str(&band(*index)),
            Node::Unary { op, expr } => {
                out.push_str(if *op == UnaryOp::Neg { "(-" } else { "(" });
                expr.write_wgsl(out, band);
                out.push(')');
            }
            Node::Binary { lhs, op: BinaryOp::Pow, rhs } => {
                out.push_str("pow(");
                lhs.write_wgsl(out, band);
                out.push_str(", ");
                rhs.write_wgsl(out, band);
                out.push(')');
            }
            Node::Binary { lhs, op, rhs } => {
                out.push('(');
                lhs.write_wgsl(out, band);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                rhs.write_wgsl(out, band);
                out.push(')');
            }
            Node::Call { func, arg } => {
                out.push_str(func.name());
                out.push('(');
                arg.write_wgsl(out, band);
                out.push(')');
            }
        }
    }
}

/// `f32` literal accepted by WGSL.
fn wgsl_float(v: f64) -> String {
    let v = v as f32;
    if v.is_finite() { format!("{v:?}f") } else { "0.0f".to_string() }
}

/// Canonical fully parenthesized text.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(v) => write!(f, "{v:?}"),
            Node::Band(index) => write!(f, "b{}", index + 1),
            Node::Unary { op: UnaryOp::Plus, expr } => write!(f, "(+{expr})"),
            Node::Unary { op: UnaryOp::Neg, expr } => write!(f, "(-{expr})"),
            Node::Binary { lhs, op, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Node::Call { func, arg } => write!(f, "{}({arg})", func.name()),
        }
    }
}
