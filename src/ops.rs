//! [`Expression`] operations.

use crate::{BinaryOperation, Expression, Parameter};
use approx::{abs_diff_eq, relative_eq};
use smol_str::SmolStr;
use std::f64::consts;
use thiserror::Error;

/// Contextual information used when evaluating an [`Expression`].
pub trait Context {
    fn evaluate_function(
        &self,
        name: &str,
        argument: f64,
    ) -> Result<f64, EvaluationError>;

    /// Look up a named constant (e.g. `pi`). Named constants are bound, so
    /// they never count as unknowns.
    fn constant(&self, name: &str) -> Option<f64>;

    /// For some [`Parameter`], `x`, and function, `f`, get `f'(x)`.
    fn differentiate_function(
        &self,
        name: &str,
        param: &Parameter,
    ) -> Result<Expression, EvaluationError>;
}

impl<'a, C: Context + ?Sized> Context for &'a C {
    fn evaluate_function(
        &self,
        name: &str,
        argument: f64,
    ) -> Result<f64, EvaluationError> {
        (**self).evaluate_function(name, argument)
    }

    fn constant(&self, name: &str) -> Option<f64> { (**self).constant(name) }

    fn differentiate_function(
        &self,
        name: &str,
        param: &Parameter,
    ) -> Result<Expression, EvaluationError> {
        (**self).differentiate_function(name, param)
    }
}

/// Numeric faults and other problems encountered while evaluating or
/// manipulating an [`Expression`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("unknown function \"{name}\"")]
    UnknownFunction { name: SmolStr },
    #[error("unable to differentiate \"{name}\"")]
    UnableToDifferentiate { name: SmolStr },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{function}({argument}) is undefined for real numbers")]
    Domain { function: SmolStr, argument: f64 },
    #[error("{base}^{exponent} is undefined for real numbers")]
    InvalidPower { base: f64, exponent: f64 },
    #[error("the result is too large to represent")]
    Overflow,
    #[error("\"{name}\" has no value")]
    UnboundParameter { name: SmolStr },
    #[error("unable to isolate {unknowns}")]
    CannotIsolate { unknowns: String },
    #[error(
        "no value of {unknown} was found numerically, starting from \
         [-{radius}, {radius}]"
    )]
    NoRootFound { unknown: SmolStr, radius: f64 },
}

/// The set of builtin functions and constants. Angles are in radians.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Builtins;

impl Context for Builtins {
    fn evaluate_function(
        &self,
        name: &str,
        argument: f64,
    ) -> Result<f64, EvaluationError> {
        let domain_error = || EvaluationError::Domain {
            function: name.into(),
            argument,
        };

        match name {
            "sin" => Ok(argument.sin()),
            "cos" => Ok(argument.cos()),
            "tan" => Ok(argument.tan()),
            "asin" | "acos" if !(-1.0..=1.0).contains(&argument) => {
                Err(domain_error())
            },
            "asin" => Ok(argument.asin()),
            "acos" => Ok(argument.acos()),
            "atan" => Ok(argument.atan()),
            "sqrt" if argument < 0.0 => Err(domain_error()),
            "sqrt" => Ok(argument.sqrt()),
            "ln" | "log" if argument <= 0.0 => Err(domain_error()),
            "ln" => Ok(argument.ln()),
            "log" => Ok(argument.log10()),
            "exp" => Ok(argument.exp()),
            "abs" => Ok(argument.abs()),
            _ => Err(EvaluationError::UnknownFunction { name: name.into() }),
        }
    }

    fn constant(&self, name: &str) -> Option<f64> {
        match name {
            "pi" => Some(consts::PI),
            "e" => Some(consts::E),
            _ => None,
        }
    }

    fn differentiate_function(
        &self,
        name: &str,
        param: &Parameter,
    ) -> Result<Expression, EvaluationError> {
        let x = Expression::Parameter(param.clone());
        let one = || Expression::Constant(1.0);

        match name {
            "sin" => Ok(Expression::call("cos", x)),
            "cos" => Ok(-Expression::call("sin", x)),
            "tan" => Ok(one()
                / Expression::call("cos", x).pow(Expression::Constant(2.0))),
            "asin" => Ok(one()
                / Expression::call(
                    "sqrt",
                    one() - x.pow(Expression::Constant(2.0)),
                )),
            "acos" => Ok(-(one()
                / Expression::call(
                    "sqrt",
                    one() - x.pow(Expression::Constant(2.0)),
                ))),
            "atan" => {
                Ok(one() / (one() + x.pow(Expression::Constant(2.0))))
            },
            "sqrt" => {
                let sqrt_x = Expression::call("sqrt", x);
                Ok(Expression::Constant(0.5) / sqrt_x)
            },
            "exp" => Ok(Expression::call("exp", x)),
            "ln" => Ok(one() / x),
            "log" => Ok(one() / (x * Expression::Constant(consts::LN_10))),
            "abs" => Ok(x.clone() / Expression::call("abs", x)),
            _ => Err(EvaluationError::UnableToDifferentiate {
                name: name.into(),
            }),
        }
    }
}

/// Get the free variables in an [`Expression`], sorted by name and without
/// duplicates. Named constants known to the [`Context`] are not free.
pub fn free_variables<C>(expr: &Expression, ctx: &C) -> Vec<Parameter>
where
    C: Context,
{
    let mut params: Vec<_> = expr
        .params()
        .filter(|p| ctx.constant(p.name()).is_none())
        .cloned()
        .collect();
    params.sort();
    params.dedup();

    params
}

/// Evaluate an [`Expression`] to a number, using `lookup_parameter_value` to
/// find the value of each free variable.
pub fn evaluate<F, C>(
    expr: &Expression,
    lookup_parameter_value: &F,
    ctx: &C,
) -> Result<f64, EvaluationError>
where
    F: Fn(&Parameter) -> Option<f64>,
    C: Context,
{
    let value = match expr {
        Expression::Parameter(p) => lookup_parameter_value(p)
            .or_else(|| ctx.constant(p.name()))
            .ok_or_else(|| EvaluationError::UnboundParameter {
                name: p.name().into(),
            })?,
        Expression::Constant(value) => *value,
        Expression::Binary { left, right, op } => {
            let left = evaluate(left, lookup_parameter_value, ctx)?;
            let right = evaluate(right, lookup_parameter_value, ctx)?;
            apply(*op, left, right)?
        },
        Expression::Negate(inner) => {
            -evaluate(inner, lookup_parameter_value, ctx)?
        },
        Expression::FunctionCall { function, argument } => {
            let argument = evaluate(argument, lookup_parameter_value, ctx)?;
            ctx.evaluate_function(function, argument)?
        },
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::Overflow)
    }
}

fn apply(
    op: BinaryOperation,
    left: f64,
    right: f64,
) -> Result<f64, EvaluationError> {
    match op {
        BinaryOperation::Plus => Ok(left + right),
        BinaryOperation::Minus => Ok(left - right),
        BinaryOperation::Times => Ok(left * right),
        BinaryOperation::Divide if right == 0.0 => {
            Err(EvaluationError::DivisionByZero)
        },
        BinaryOperation::Divide => Ok(left / right),
        BinaryOperation::Power if left == 0.0 && right < 0.0 => {
            Err(EvaluationError::DivisionByZero)
        },
        BinaryOperation::Power => {
            let value = left.powf(right);

            if value.is_nan() {
                Err(EvaluationError::InvalidPower {
                    base: left,
                    exponent: right,
                })
            } else {
                Ok(value)
            }
        },
    }
}

/// Simplify an expression by evaluating all constant operations and applying
/// arithmetic's identity laws.
///
/// Named constants are replaced by their value. Function calls whose
/// argument folds to a constant are evaluated, so `unknown(3)` is an error
/// while `unknown(x)` is left alone.
pub fn simplify<C>(
    expr: &Expression,
    ctx: &C,
) -> Result<Expression, EvaluationError>
where
    C: Context,
{
    match expr {
        Expression::Binary { left, right, op } => {
            fold_binary_op(left, right, *op, ctx)
        },
        Expression::Negate(expr) => Ok(match simplify(expr, ctx)? {
            Expression::Constant(value) => Expression::Constant(-value),
            // double negative
            Expression::Negate(inner) => *inner,
            // -(a - b) = b - a
            Expression::Binary {
                left,
                right,
                op: BinaryOperation::Minus,
            } => Expression::Binary {
                left: right,
                right: left,
                op: BinaryOperation::Minus,
            },
            other => -other,
        }),
        Expression::FunctionCall { function, argument } => {
            let argument = simplify(argument, ctx)?;

            match argument {
                Expression::Constant(argument) => ctx
                    .evaluate_function(function, argument)
                    .and_then(finite)
                    .map(Expression::Constant),
                argument => Ok(Expression::call(function.clone(), argument)),
            }
        },
        Expression::Parameter(p) => Ok(match ctx.constant(p.name()) {
            Some(value) => Expression::Constant(value),
            None => expr.clone(),
        }),
        Expression::Constant(_) => Ok(expr.clone()),
    }
}

fn finite(value: f64) -> Result<f64, EvaluationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::Overflow)
    }
}

fn fold_binary_op<C>(
    left: &Expression,
    right: &Expression,
    op: BinaryOperation,
    ctx: &C,
) -> Result<Expression, EvaluationError>
where
    C: Context,
{
    let left = simplify(left, ctx)?;
    let right = simplify(right, ctx)?;

    if let Some(collected) = collect_like_terms(&left, &right, op) {
        return simplify(&collected, ctx);
    }

    // If our operands contain constants, we can use arithmetic's identity laws
    // to simplify things
    let simplified = match (left, right, op) {
        // anything / 0 is always an error
        (_, Expression::Constant(r), BinaryOperation::Divide) if r == 0.0 => {
            return Err(EvaluationError::DivisionByZero);
        },

        // Evaluate in-place
        (Expression::Constant(l), Expression::Constant(r), op) => {
            Expression::Constant(apply(op, l, r).and_then(finite)?)
        },

        (left, right, BinaryOperation::Plus)
            if left == right && !left.is_constant() =>
        {
            simplify(&(Expression::Constant(2.0) * right), ctx)?
        },
        (left, right, BinaryOperation::Minus)
            if left == right && !left.is_constant() =>
        {
            Expression::Constant(0.0)
        },
        (left, right, BinaryOperation::Divide)
            if left == right && !left.is_constant() =>
        {
            Expression::Constant(1.0)
        },

        // x + 0 = x
        (Expression::Constant(l), right, BinaryOperation::Plus)
            if abs_diff_eq!(l, 0.0) =>
        {
            right
        },
        (left, Expression::Constant(r), BinaryOperation::Plus)
            if abs_diff_eq!(r, 0.0) =>
        {
            left
        },

        // 0 * x = 0
        (Expression::Constant(l), _, BinaryOperation::Times)
            if abs_diff_eq!(l, 0.0) =>
        {
            Expression::Constant(0.0)
        },
        (_, Expression::Constant(r), BinaryOperation::Times)
            if abs_diff_eq!(r, 0.0) =>
        {
            Expression::Constant(0.0)
        },

        // 1 * x = x
        (Expression::Constant(l), right, BinaryOperation::Times)
            if abs_diff_eq!(l, 1.0) =>
        {
            right
        },
        (left, Expression::Constant(r), BinaryOperation::Times)
            if abs_diff_eq!(r, 1.0) =>
        {
            left
        },

        // 0 / x = 0
        (Expression::Constant(l), _, BinaryOperation::Divide)
            if abs_diff_eq!(l, 0.0) =>
        {
            Expression::Constant(0.0)
        },

        // x / 1 = x
        (left, Expression::Constant(r), BinaryOperation::Divide)
            if abs_diff_eq!(r, 1.0) =>
        {
            left
        },

        // 0 - x = -x
        (Expression::Constant(l), right, BinaryOperation::Minus)
            if abs_diff_eq!(l, 0.0) =>
        {
            simplify(&-right, ctx)?
        },

        // x - 0 = x
        (left, Expression::Constant(r), BinaryOperation::Minus)
            if abs_diff_eq!(r, 0.0) =>
        {
            left
        },

        // x^1 = x, x^0 = 1
        (left, Expression::Constant(r), BinaryOperation::Power)
            if abs_diff_eq!(r, 1.0) =>
        {
            left
        },
        (_, Expression::Constant(r), BinaryOperation::Power)
            if abs_diff_eq!(r, 0.0) =>
        {
            Expression::Constant(1.0)
        },

        // x + -3 = x - 3, x - -3 = x + 3
        (left, Expression::Constant(r), BinaryOperation::Plus) if r < 0.0 => {
            left - Expression::Constant(-r)
        },
        (left, Expression::Constant(r), BinaryOperation::Minus) if r < 0.0 => {
            left + Expression::Constant(-r)
        },
        (left, Expression::Negate(r), BinaryOperation::Plus) => left - *r,
        (left, Expression::Negate(r), BinaryOperation::Minus) => left + *r,

        // (x * y) * z
        (
            Expression::Constant(constant_a),
            Expression::Binary {
                left,
                right,
                op: BinaryOperation::Times,
            },
            BinaryOperation::Times,
        ) if left.is_constant() || right.is_constant() => {
            let (constant_b, expr) = split_constant_factor(*left, *right);
            Expression::Constant(constant_a * constant_b) * expr
        },
        (
            Expression::Binary {
                left,
                right,
                op: BinaryOperation::Times,
            },
            Expression::Constant(constant_a),
            BinaryOperation::Times,
        ) if left.is_constant() || right.is_constant() => {
            let (constant_b, expr) = split_constant_factor(*left, *right);
            Expression::Constant(constant_a * constant_b) * expr
        },

        // x * 3 = 3 * x
        (left, Expression::Constant(r), BinaryOperation::Times) => {
            Expression::Constant(r) * left
        },

        // Oh well, we tried
        (left, right, op) => Expression::Binary {
            left: Box::new(left),
            right: Box::new(right),
            op,
        },
    };

    Ok(simplified)
}

/// `a*t + b*t = (a + b)*t`, and the same for subtraction.
fn collect_like_terms(
    left: &Expression,
    right: &Expression,
    op: BinaryOperation,
) -> Option<Expression> {
    let (a, term) = split_coefficient(left)?;
    let (b, other_term) = split_coefficient(right)?;

    if term != other_term {
        return None;
    }

    let coefficient = match op {
        BinaryOperation::Plus if relative_eq!(a, -b) => 0.0,
        BinaryOperation::Plus => a + b,
        BinaryOperation::Minus if relative_eq!(a, b) => 0.0,
        BinaryOperation::Minus => a - b,
        _ => return None,
    };

    Some(Expression::Constant(coefficient) * term.clone())
}

/// Split a non-constant term into its numeric coefficient and whatever it
/// multiplies.
fn split_coefficient(expr: &Expression) -> Option<(f64, &Expression)> {
    match expr {
        Expression::Constant(_) => None,
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Times,
        } => match (&**left, &**right) {
            (Expression::Constant(c), term)
            | (term, Expression::Constant(c)) => Some((*c, term)),
            _ => Some((1.0, expr)),
        },
        Expression::Negate(inner) => {
            split_coefficient(inner).map(|(c, term)| (-c, term))
        },
        _ => Some((1.0, expr)),
    }
}

fn split_constant_factor(
    left: Expression,
    right: Expression,
) -> (f64, Expression) {
    match (left, right) {
        (Expression::Constant(left), right) => (left, right),
        (left, Expression::Constant(right)) => (right, left),
        _ => unreachable!("One of the factors is always a constant"),
    }
}

/// Replace all references to a [`Parameter`] with an [`Expression`].
pub fn substitute(
    expression: &Expression,
    param: &Parameter,
    value: &Expression,
) -> Expression {
    match expression {
        Expression::Parameter(p) => {
            if p == param {
                value.clone()
            } else {
                Expression::Parameter(p.clone())
            }
        },
        Expression::Constant(value) => Expression::Constant(*value),
        Expression::Binary { left, right, op } => {
            let left = substitute(left, param, value);
            let right = substitute(right, param, value);
            Expression::Binary {
                left: Box::new(left),
                right: Box::new(right),
                op: *op,
            }
        },
        Expression::Negate(inner) => -substitute(inner, param, value),
        Expression::FunctionCall { function, argument } => {
            Expression::FunctionCall {
                function: function.clone(),
                argument: Box::new(substitute(argument, param, value)),
            }
        },
    }
}

/// Calculate an [`Expression`]'s partial derivative with respect to a
/// particular [`Parameter`].
pub fn partial_derivative<C>(
    expr: &Expression,
    param: &Parameter,
    ctx: &C,
) -> Result<Expression, EvaluationError>
where
    C: Context,
{
    let got = match expr {
        Expression::Parameter(p) => {
            if p == param {
                Expression::Constant(1.0)
            } else {
                Expression::Constant(0.0)
            }
        },
        Expression::Constant(_) => Expression::Constant(0.0),
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Plus,
        } => {
            partial_derivative(left, param, ctx)?
                + partial_derivative(right, param, ctx)?
        },
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Minus,
        } => {
            partial_derivative(left, param, ctx)?
                - partial_derivative(right, param, ctx)?
        },
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Times,
        } => {
            // The product rule
            let d_left = partial_derivative(left, param, ctx)?;
            let d_right = partial_derivative(right, param, ctx)?;
            let left = Expression::clone(left);
            let right = Expression::clone(right);

            d_left * right + d_right * left
        },
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Divide,
        } => {
            // The quotient rule
            let d_left = partial_derivative(left, param, ctx)?;
            let d_right = partial_derivative(right, param, ctx)?;
            let right = Expression::clone(right);
            let left = Expression::clone(left);

            (d_left * right.clone() - left * d_right)
                / right.pow(Expression::Constant(2.0))
        },
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Power,
        } if !right.depends_on(param) => {
            // The power rule: (f^n)' = n * f^(n - 1) * f'
            let d_left = partial_derivative(left, param, ctx)?;
            let n = Expression::clone(right);
            let base = Expression::clone(left);

            n.clone() * base.pow(n - Expression::Constant(1.0)) * d_left
        },
        Expression::Binary {
            left,
            right,
            op: BinaryOperation::Power,
        } => {
            // (f^g)' = f^g * (g' * ln(f) + g * f' / f)
            let d_left = partial_derivative(left, param, ctx)?;
            let d_right = partial_derivative(right, param, ctx)?;
            let f = Expression::clone(left);
            let g = Expression::clone(right);

            f.clone().pow(g.clone())
                * (d_right * Expression::call("ln", f.clone())
                    + g * d_left / f)
        },

        Expression::Negate(inner) => -partial_derivative(inner, param, ctx)?,
        Expression::FunctionCall { function, argument } => {
            // implement the chain rule: (f o g)' = (f' o g) * g'
            let g = Parameter::named("__temp__");
            let f_dash_of_g = ctx.differentiate_function(function, &g)?;
            let g_dash = partial_derivative(argument, param, ctx)?;

            substitute(&f_dash_of_g, &g, argument) * g_dash
        },
    };

    Ok(got)
}
