//! Numeric root finding.

use crate::{
    ops::{self, Context, EvaluationError},
    Expression, Parameter, ResolverConfig,
};
use nalgebra::{DMatrix as Matrix, DVector as Vector};
use std::{cmp::Ordering, slice};
use thiserror::Error;

/// Roots closer together than this (relative to their magnitude) are
/// considered the same root.
const DUPLICATE_ROOT_TOLERANCE: f64 = 1e-6;

/// Roots this close to each other are always the same root, however small
/// they are.
const DUPLICATE_ROOT_FLOOR: f64 = 1e-12;

/// How many times the seed interval is doubled before the numeric search
/// gives up.
pub(crate) const SEARCH_WIDENINGS: u32 = 4;

/// Sample points for [`is_identity()`] are shifted off the seed grid so they
/// don't all land on integers.
const SAMPLE_OFFSET: f64 = 0.371;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("evaluation failed")]
    Eval(#[from] EvaluationError),
    #[error("the solution didn't converge")]
    DidntConverge,
    #[error("the jacobian is singular")]
    SingularJacobian,
}

/// Find the real roots of `body = 0` by running Newton's method from evenly
/// spaced starting points in `[-radius, radius]`.
///
/// Roots are returned in ascending order without duplicates. A root may lie
/// outside the seed interval, but is only accepted when `body` evaluates to
/// within `config.residual_tolerance` of zero there.
pub(crate) fn find_roots<C>(
    body: &Expression,
    unknown: &Parameter,
    radius: f64,
    ctx: &C,
    config: &ResolverConfig,
) -> Result<Vec<f64>, EvaluationError>
where
    C: Context,
{
    let equations = slice::from_ref(body);
    let unknowns = slice::from_ref(unknown);
    let jacobian = Jacobian::for_equations(equations, unknowns, ctx)?;
    let mut roots = Vec::new();

    for seed in spread(radius, config.seed_count) {
        let initial = Vector::from_element(1, seed);

        match solve_with_newtons_method(&jacobian, initial, ctx, config) {
            Ok(solution) => {
                let root = solution[0];
                let lookup = jacobian.lookup_value_by_name(solution.as_slice());

                let accepted = ops::evaluate(body, &lookup, ctx)
                    .map(|residual| {
                        residual.abs() <= config.residual_tolerance
                    })
                    .unwrap_or(false);

                if accepted {
                    roots.push(root);
                }
            },
            Err(SolveError::Eval(e)) if is_fatal(&e) => return Err(e),
            Err(e) => {
                tracing::trace!(seed, error = %e, "Abandoned starting point")
            },
        }
    }

    roots.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    roots.dedup_by(|later, earlier| {
        let gap = (*later - *earlier).abs();
        gap <= DUPLICATE_ROOT_FLOOR
            || gap <= DUPLICATE_ROOT_TOLERANCE * later.abs().max(earlier.abs())
    });

    Ok(roots)
}

/// Errors which would happen no matter where we evaluate, as opposed to
/// stepping outside a function's domain.
fn is_fatal(error: &EvaluationError) -> bool {
    matches!(
        error,
        EvaluationError::UnknownFunction { .. }
            | EvaluationError::UnableToDifferentiate { .. }
            | EvaluationError::UnboundParameter { .. }
    )
}

/// Check whether `body` is zero everywhere by evaluating it at a fixed set of
/// sample points. Points outside the body's domain are ignored, but at least
/// one point must be inside it.
pub(crate) fn is_identity<C>(
    body: &Expression,
    unknowns: &[Parameter],
    ctx: &C,
    config: &ResolverConfig,
) -> bool
where
    C: Context,
{
    let samples: Vec<f64> = spread(config.search_radius, config.seed_count)
        .into_iter()
        .map(|s| s + SAMPLE_OFFSET)
        .collect();
    let mut in_domain = 0;

    for i in 0..samples.len() {
        // give each unknown a different value so x - y isn't mistaken for 0
        let values: Vec<f64> = (0..unknowns.len())
            .map(|j| samples[(i + 3 * j) % samples.len()])
            .collect();
        let lookup = |p: &Parameter| {
            unknowns.iter().position(|u| u == p).map(|ix| values[ix])
        };

        match ops::evaluate(body, &lookup, ctx) {
            Ok(value) if value.abs() <= config.residual_tolerance => {
                in_domain += 1
            },
            Ok(_) => return false,
            Err(_) => {},
        }
    }

    in_domain > 0
}

/// `count` evenly spaced points covering `[-radius, radius]`.
pub(crate) fn spread(radius: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![0.0];
    }

    let step = 2.0 * radius / (count - 1) as f64;

    (0..count).map(|i| -radius + step * i as f64).collect()
}

/// Solve a set of non-linear equations iteratively using Newton's method.
///
/// The iterative equation for Newton's method when applied to a set of
/// equations, `F`, is:
///
/// ```text
///  x_next = x_current - jacobian(F).inverse() * F(x_current)
/// ```
///
/// Calculating the inverse of a matrix is expensive, so we rearrange it to
/// look like this:
///
/// ```text
/// jacobian(F) * (x_next - x_current) = -F(x_current)
/// ```
///
/// ... Which is in the form `A.δx = b`, and can be solved with an LU
/// decomposition.
///
/// See also:
///
/// - https://en.wikipedia.org/wiki/Newton%27s_method#Nonlinear_systems_of_equations
pub(crate) fn solve_with_newtons_method<C>(
    jacobian: &Jacobian<'_>,
    initial_values: Vector<f64>,
    ctx: &C,
    config: &ResolverConfig,
) -> Result<Vector<f64>, SolveError>
where
    C: Context,
{
    let mut solution = initial_values;

    for iteration in 0..config.max_iterations {
        let x_next = {
            let evaluated_jacobian =
                jacobian.evaluate(solution.as_slice(), ctx)?;
            let f_of_x = jacobian.evaluate_equations(solution.as_slice(), ctx)?;
            step_newtons_method(evaluated_jacobian, &solution, f_of_x)?
        };

        tracing::trace!(iteration, x = ?x_next.as_slice(), "Newton step");

        if approx::relative_eq!(
            x_next,
            solution,
            epsilon = config.tolerance,
            max_relative = config.tolerance
        ) {
            return Ok(x_next);
        }
        solution = x_next;
    }

    Err(SolveError::DidntConverge)
}

fn step_newtons_method(
    jacobian: Matrix<f64>,
    x: &Vector<f64>,
    f_of_x: Vector<f64>,
) -> Result<Vector<f64>, SolveError> {
    let negative_f_of_x = -f_of_x;
    let delta_x = jacobian
        .lu()
        .solve(&negative_f_of_x)
        .ok_or(SolveError::SingularJacobian)?;

    if delta_x.iter().all(|d| d.is_finite()) {
        Ok(delta_x + x)
    } else {
        Err(SolveError::SingularJacobian)
    }
}

/// A matrix of [`Expression`]s representing the partial derivatives for each
/// unknown in each equation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Jacobian<'a> {
    cells: Box<[Expression]>,
    equations: &'a [Expression],
    unknowns: &'a [Parameter],
}

impl<'a> Jacobian<'a> {
    /// Differentiate each equation (an expression which should equal zero)
    /// with respect to each unknown.
    pub(crate) fn for_equations<C>(
        equations: &'a [Expression],
        unknowns: &'a [Parameter],
        ctx: &C,
    ) -> Result<Self, EvaluationError>
    where
        C: Context,
    {
        let mut cells = Vec::with_capacity(equations.len() * unknowns.len());

        for equation in equations {
            for unknown in unknowns {
                let value = if equation.depends_on(unknown) {
                    let derivative =
                        ops::partial_derivative(equation, unknown, ctx)?;
                    ops::simplify(&derivative, ctx)?
                } else {
                    Expression::Constant(0.0)
                };
                cells.push(value);
            }
        }

        Ok(Jacobian {
            cells: cells.into_boxed_slice(),
            equations,
            unknowns,
        })
    }

    fn rows(&self) -> usize { self.equations.len() }

    fn columns(&self) -> usize { self.unknowns.len() }

    fn evaluate<C>(
        &self,
        parameter_values: &[f64],
        ctx: &C,
    ) -> Result<Matrix<f64>, EvaluationError>
    where
        C: Context,
    {
        debug_assert_eq!(parameter_values.len(), self.unknowns.len());

        let lookup = self.lookup_value_by_name(parameter_values);
        let values = self
            .cells
            .iter()
            .map(|cell| ops::evaluate(cell, &lookup, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Matrix::from_row_slice(self.rows(), self.columns(), &values))
    }

    /// Evaluate every equation, `F(x)`.
    fn evaluate_equations<C>(
        &self,
        parameter_values: &[f64],
        ctx: &C,
    ) -> Result<Vector<f64>, EvaluationError>
    where
        C: Context,
    {
        let lookup = self.lookup_value_by_name(parameter_values);
        let values = self
            .equations
            .iter()
            .map(|equation| ops::evaluate(equation, &lookup, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Vector::from_vec(values))
    }

    fn lookup_value_by_name<'p>(
        &'p self,
        parameter_values: &'p [f64],
    ) -> impl Fn(&Parameter) -> Option<f64> + 'p {
        move |parameter| {
            self.unknowns
                .iter()
                .position(|p| p == parameter)
                .map(|ix| parameter_values[ix])
        }
    }

    #[cfg(test)]
    fn iter_rows(&self) -> impl Iterator<Item = &[Expression]> + '_ {
        self.cells.chunks_exact(self.columns())
    }
}
