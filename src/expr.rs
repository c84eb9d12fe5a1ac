use serde::{Serialize, Serializer};
use smol_str::SmolStr;
use std::{
    fmt::{self, Display, Formatter},
    iter,
    ops::{Add, Div, Mul, Neg, Sub},
};

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A named symbol, either a free variable or a named constant like `pi`.
    Parameter(Parameter),
    Constant(f64),
    /// An expression involving two operands.
    Binary {
        left: Box<Expression>,
        right: Box<Expression>,
        op: BinaryOperation,
    },
    /// Negate the expression.
    Negate(Box<Expression>),
    /// Invoke a function with a single argument.
    FunctionCall {
        function: SmolStr,
        argument: Box<Expression>,
    },
}

impl Expression {
    /// Iterate over all [`Parameter`]s in this [`Expression`] (including
    /// duplicates), from left to right.
    pub fn params(&self) -> impl Iterator<Item = &Parameter> + '_ {
        let mut to_visit = vec![self];

        iter::from_fn(move || {
            while let Some(next_item) = to_visit.pop() {
                match next_item {
                    Expression::Parameter(p) => return Some(p),
                    Expression::Constant(_) => {},
                    Expression::Binary { left, right, .. } => {
                        to_visit.push(right);
                        to_visit.push(left);
                    },
                    Expression::Negate(inner)
                    | Expression::FunctionCall {
                        argument: inner, ..
                    } => to_visit.push(inner),
                }
            }

            None
        })
    }

    /// Does this [`Expression`] reference a [`Parameter`]?
    pub fn depends_on(&self, param: &Parameter) -> bool {
        self.params().any(|p| p == param)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    /// Get the numeric value, if this is a [`Expression::Constant`].
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Expression::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Raise this expression to some power.
    pub fn pow(self, exponent: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            right: Box::new(exponent),
            op: BinaryOperation::Power,
        }
    }

    pub fn call<S: Into<SmolStr>>(function: S, argument: Expression) -> Self {
        Expression::FunctionCall {
            function: function.into(),
            argument: Box::new(argument),
        }
    }

    fn is_negative(&self) -> bool {
        match self {
            Expression::Constant(value) => *value < 0.0,
            Expression::Negate(_) => true,
            _ => false,
        }
    }

    /// How tightly this expression binds when it is printed.
    fn precedence(&self) -> u8 {
        match self {
            Expression::Parameter(_) | Expression::FunctionCall { .. } => 4,
            Expression::Constant(value) if *value < 0.0 => 2,
            Expression::Constant(_) => 4,
            Expression::Binary { op, .. } => op.precedence(),
            Expression::Negate(_) => 2,
        }
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self { Expression::Constant(value) }
}

impl From<Parameter> for Expression {
    fn from(param: Parameter) -> Self { Expression::Parameter(param) }
}

/// A named symbol which may appear in an [`Expression`].
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
pub struct Parameter(SmolStr);

impl Parameter {
    pub fn named<S: Into<SmolStr>>(name: S) -> Self { Parameter(name.into()) }

    pub fn name(&self) -> &str { &self.0 }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operation that can be applied to two arguments.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BinaryOperation {
    Plus,
    Minus,
    Times,
    Divide,
    Power,
}

impl BinaryOperation {
    fn precedence(self) -> u8 {
        match self {
            BinaryOperation::Plus | BinaryOperation::Minus => 1,
            BinaryOperation::Times | BinaryOperation::Divide => 2,
            BinaryOperation::Power => 3,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOperation::Plus => " + ",
            BinaryOperation::Minus => " - ",
            BinaryOperation::Times => "*",
            BinaryOperation::Divide => "/",
            BinaryOperation::Power => "^",
        }
    }
}

// define some operator overloads to make constructing an expression easier.

impl Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            right: Box::new(rhs),
            op: BinaryOperation::Plus,
        }
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            right: Box::new(rhs),
            op: BinaryOperation::Minus,
        }
    }
}

impl Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            right: Box::new(rhs),
            op: BinaryOperation::Times,
        }
    }
}

impl Div for Expression {
    type Output = Expression;

    fn div(self, rhs: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            right: Box::new(rhs),
            op: BinaryOperation::Divide,
        }
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Self::Output { Expression::Negate(Box::new(self)) }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Parameter(p) => write!(f, "{}", p),
            Expression::Constant(value) => {
                write!(f, "{}", format_number(*value))
            },
            Expression::Binary { left, right, op } => {
                let precedence = op.precedence();
                // "^" groups to the right, everything else to the left
                let (left_min, right_min) = match op {
                    BinaryOperation::Plus | BinaryOperation::Times => {
                        (precedence, precedence)
                    },
                    BinaryOperation::Minus | BinaryOperation::Divide => {
                        (precedence, precedence + 1)
                    },
                    BinaryOperation::Power => (precedence + 1, precedence),
                };
                // "x*(-3)", not "x*-3"
                let right_min =
                    if right.is_negative() && *op != BinaryOperation::Plus {
                        right_min.max(3)
                    } else {
                        right_min
                    };

                write_operand(left, left_min, f)?;
                write!(f, "{}", op.symbol())?;
                write_operand(right, right_min, f)
            },
            Expression::Negate(inner) => {
                write!(f, "-")?;
                write_operand(inner, 3, f)
            },
            Expression::FunctionCall { function, argument } => {
                write!(f, "{}({})", function, argument)
            },
        }
    }
}

fn write_operand(
    expr: &Expression,
    min_precedence: u8,
    f: &mut Formatter<'_>,
) -> fmt::Result {
    if expr.precedence() < min_precedence {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Format a number the way a person would write it, hiding the floating
/// point noise left over from arithmetic (`0.1 + 0.2` prints as `0.3`).
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "inf" } else { "-inf" });
    }

    let value = snap_to_integer(value);
    let magnitude = value.abs();

    if magnitude != 0.0 && !(1e-6..1e15).contains(&magnitude) {
        let text = format!("{:.9e}", value);

        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let mantissa =
                    mantissa.trim_end_matches('0').trim_end_matches('.');
                format!("{}e{}", mantissa, exponent)
            },
            None => text,
        };
    }

    if value.fract() == 0.0 {
        return format!("{}", value as i64);
    }

    let text = format!("{:.10}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');

    match text {
        "-0" => String::from("0"),
        other => other.to_string(),
    }
}

/// Round values within a hair (relative) of a non-zero integer to that
/// integer. Only used for display.
fn snap_to_integer(value: f64) -> f64 {
    const EPSILON: f64 = 1e-9;

    let rounded = value.round();

    if rounded != 0.0 && (value - rounded).abs() <= EPSILON * rounded.abs() {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expression { Expression::Parameter(Parameter::named("x")) }

    #[test]
    fn display() {
        let inputs = vec![
            (Expression::Constant(3.0), "3"),
            (Expression::Constant(-2.5), "-2.5"),
            (Expression::call("sin", Expression::Constant(5.0)), "sin(5)"),
            (-Expression::Constant(5.0), "-5"),
            (-Expression::call("sin", Expression::Constant(5.0)), "-sin(5)"),
            (Expression::from(1.0) + Expression::from(1.0), "1 + 1"),
            (Expression::from(1.0) - Expression::from(1.0), "1 - 1"),
            (Expression::from(1.0) * Expression::from(1.0), "1*1"),
            (Expression::from(1.0) / Expression::from(1.0), "1/1"),
            (x().pow(Expression::from(2.0)), "x^2"),
            (
                (Expression::from(1.0) + Expression::from(2.0))
                    / Expression::from(3.0),
                "(1 + 2)/3",
            ),
            (
                Expression::from(1.0)
                    - (Expression::from(2.0) - Expression::from(3.0)),
                "1 - (2 - 3)",
            ),
            (
                (Expression::from(1.0) - Expression::from(2.0))
                    - Expression::from(3.0),
                "1 - 2 - 3",
            ),
            (
                Expression::from(2.0).pow(x().pow(Expression::from(3.0))),
                "2^x^3",
            ),
            ((-x()).pow(Expression::from(2.0)), "(-x)^2"),
            (-(x() + Expression::from(1.0)), "-(x + 1)"),
            (x() + Expression::from(-3.0), "x + -3"),
            (x() * Expression::from(-3.0), "x*(-3)"),
        ];

        for (expr, should_be) in inputs {
            let got = expr.to_string();
            assert_eq!(got, should_be);
        }
    }

    #[test]
    fn iterate_over_parameters_in_an_expression() {
        let expr = (x() + Expression::Parameter(Parameter::named("y")))
            * Expression::call("sin", x());
        let names: Vec<_> = expr.params().map(Parameter::name).collect();

        assert_eq!(names, vec!["x", "y", "x"]);
        assert!(expr.depends_on(&Parameter::named("y")));
        assert!(!expr.depends_on(&Parameter::named("z")));
    }

    #[test]
    fn format_numbers_without_float_noise() {
        let inputs = vec![
            (14.0, "14"),
            (0.1 + 0.2, "0.3"),
            (-0.0, "0"),
            (2.0000000000001, "2"),
            (1.0 / 3.0, "0.3333333333"),
            (-1.5, "-1.5"),
            (1e20, "1e20"),
            (1e9, "1000000000"),
            (1e-10, "1e-10"),
            (-0.000000001, "-1e-9"),
            (0.999999999999e-6, "1e-6"),
            (1.0 / 3.0 * 1e-8, "3.333333333e-9"),
            (f64::INFINITY, "inf"),
        ];

        for (value, should_be) in inputs {
            assert_eq!(format_number(value), should_be, "{}", value);
        }
    }

    #[test]
    fn expressions_serialize_as_their_display_form() {
        let expr = Expression::from(2.0) * x() + Expression::from(1.0);

        let got = serde_json::to_string(&expr).unwrap();

        assert_eq!(got, "\"2*x + 1\"");
    }
}
