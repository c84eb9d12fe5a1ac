use crate::{
    expr::format_number,
    ops::{self, Context, EvaluationError},
    parse::{self, DEFAULT_MAX_DEPTH},
    polynomial::{ClosedForm, Polynomial},
    solve, Expression, Parameter, ParseError, ResolveError, ResolverConfig,
    Solution, StepTrace,
};
use std::{collections::BTreeMap, str::FromStr};

/// An equation, `left = right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    left: Expression,
    right: Expression,
}

impl Equation {
    pub fn new(left: Expression, right: Expression) -> Self {
        Equation { left, right }
    }

    /// Parse an equation, splitting on its one and only `=`.
    pub fn parse_with_depth(
        s: &str,
        max_depth: usize,
    ) -> Result<Self, ParseError> {
        let halves: Vec<&str> = s.split('=').collect();

        match halves[..] {
            [left, right] => Ok(Equation::new(
                parse::parse_with_depth(left, max_depth)?,
                parse::parse_with_depth(right, max_depth)?,
            )),
            _ => Err(ParseError::ChainedEquality),
        }
    }

    pub fn left(&self) -> &Expression { &self.left }

    pub fn right(&self) -> &Expression { &self.right }

    /// The expression which is zero whenever the equation holds,
    /// `left - right`.
    pub fn body(&self) -> Expression {
        self.left.clone() - self.right.clone()
    }

    /// Every free variable on either side, sorted by name.
    pub fn unknowns<C: Context>(&self, ctx: &C) -> Vec<Parameter> {
        ops::free_variables(&self.body(), ctx)
    }

    /// Solve the equation for all of its unknowns, recording what was done
    /// in `steps`.
    pub fn solve<C>(
        &self,
        ctx: &C,
        config: &ResolverConfig,
        steps: &mut StepTrace,
    ) -> Result<Solution, ResolveError>
    where
        C: Context,
    {
        let unknowns = self.unknowns(ctx);

        if unknowns.is_empty() {
            return Err(ParseError::NoUnknowns.into());
        }
        steps.push(format!("Unknowns: {}", join(&unknowns)));

        let body = ops::simplify(&self.body(), ctx)?;
        steps.push(format!("Rearrange to {} = 0", body));

        if is_zero(&body) {
            steps.push(format!(
                "Both sides are equal for every value of {}",
                join(&unknowns)
            ));
            return Ok(Solution::Indeterminate);
        }

        let remaining = ops::free_variables(&body, ctx);
        let cancelled: Vec<_> = unknowns
            .iter()
            .filter(|u| !remaining.contains(u))
            .cloned()
            .collect();
        if !cancelled.is_empty() {
            steps.push(format!("{} cancels out", join(&cancelled)));
        }

        match remaining.as_slice() {
            [] => {
                steps.push(format!("{} = 0 is never true", body));
                Ok(Solution::NoSolution)
            },
            [unknown] => solve_for_one(&body, unknown, ctx, config, steps),
            _ => solve_for_several(&body, &remaining, ctx, config, steps),
        }
    }
}

impl FromStr for Equation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Equation::parse_with_depth(s, DEFAULT_MAX_DEPTH)
    }
}

fn solve_for_one<C>(
    body: &Expression,
    unknown: &Parameter,
    ctx: &C,
    config: &ResolverConfig,
    steps: &mut StepTrace,
) -> Result<Solution, ResolveError>
where
    C: Context,
{
    let mut radius = match Polynomial::from_expression(
        body,
        unknown,
        config.max_exponent,
    ) {
        Some(mut poly) => {
            poly.trim(config.tolerance);
            steps.push(format!(
                "Polynomial of degree {} in {}: {} = 0",
                poly.degree(),
                unknown,
                poly.in_terms_of(unknown)
            ));

            match poly.solve_closed_form(config.tolerance) {
                Some(ClosedForm::Identity) => {
                    steps.push(format!(
                        "Every coefficient is zero, so any value of {} works",
                        unknown
                    ));
                    return Ok(Solution::Indeterminate);
                },
                Some(ClosedForm::NoRoots) if poly.degree() == 2 => {
                    steps.push(
                        "The discriminant is negative, so there are no real \
                         roots",
                    );
                    return Ok(Solution::NoSolution);
                },
                Some(ClosedForm::NoRoots) => {
                    steps.push(format!(
                        "{} = 0 is never true",
                        poly.in_terms_of(unknown)
                    ));
                    return Ok(Solution::NoSolution);
                },
                Some(ClosedForm::Roots(roots)) => {
                    steps.push(match poly.degree() {
                        1 => format!("Isolate {}", unknown),
                        _ => String::from("Apply the quadratic formula"),
                    });
                    return Ok(roots_of(unknown, roots));
                },
                None => poly.root_bound().max(config.search_radius),
            }
        },
        None => {
            if solve::is_identity(
                body,
                std::slice::from_ref(unknown),
                ctx,
                config,
            ) {
                steps.push(format!(
                    "{} = 0 holds at every sample point, so any value of {} \
                     works",
                    body, unknown
                ));
                return Ok(Solution::Indeterminate);
            }

            config.search_radius
        },
    };

    for attempt in 0..=solve::SEARCH_WIDENINGS {
        if attempt > 0 {
            radius *= 2.0;
        }
        steps.push(format!(
            "Search numerically for roots, starting from [{}, {}]",
            format_number(-radius),
            format_number(radius)
        ));

        let roots = solve::find_roots(body, unknown, radius, ctx, config)?;

        if !roots.is_empty() {
            steps.push(format!("Found {} root(s) numerically", roots.len()));
            return Ok(roots_of(unknown, roots));
        }
    }

    steps.push("The numeric search found no roots");
    Err(EvaluationError::NoRootFound {
        unknown: unknown.name().into(),
        radius,
    }
    .into())
}

fn roots_of<I>(unknown: &Parameter, roots: I) -> Solution
where
    I: IntoIterator<Item = f64>,
{
    let mut solution = BTreeMap::new();
    solution.insert(
        unknown.clone(),
        roots.into_iter().map(Expression::Constant).collect(),
    );

    Solution::Roots(solution)
}

/// With several unknowns, express each one which appears linearly in terms of
/// the others.
fn solve_for_several<C>(
    body: &Expression,
    unknowns: &[Parameter],
    ctx: &C,
    config: &ResolverConfig,
    steps: &mut StepTrace,
) -> Result<Solution, ResolveError>
where
    C: Context,
{
    if solve::is_identity(body, unknowns, ctx, config) {
        steps.push(format!(
            "{} = 0 holds at every sample point, so any values of {} work",
            body,
            join(unknowns)
        ));
        return Ok(Solution::Indeterminate);
    }

    let mut isolated = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut cancelled = Vec::new();

    for unknown in unknowns {
        let (coefficient, rest) = match linear_form(body, unknown) {
            Some((a, b)) => (ops::simplify(&a, ctx)?, ops::simplify(&b, ctx)?),
            None => {
                skipped.push(unknown.clone());
                continue;
            },
        };

        if is_zero(&coefficient) {
            cancelled.push(unknown.clone());
            continue;
        }

        let value = ops::simplify(&(-rest / coefficient), ctx)?;
        steps.push(format!("Isolate {}: {} = {}", unknown, unknown, value));
        isolated.insert(unknown.clone(), vec![value]);
    }

    if cancelled.len() == unknowns.len() {
        // the body is a non-zero constant in disguise
        steps.push(format!(
            "{} cancel out, so {} = 0 is never true",
            join(&cancelled),
            body
        ));
        return Ok(Solution::NoSolution);
    }
    if !cancelled.is_empty() {
        steps.push(format!("{} cancels out", join(&cancelled)));
    }
    if !skipped.is_empty() {
        steps.push(format!(
            "Unable to isolate {}, it does not appear linearly",
            join(&skipped)
        ));
    }

    if isolated.is_empty() {
        Err(EvaluationError::CannotIsolate {
            unknowns: join(unknowns),
        }
        .into())
    } else {
        Ok(Solution::Roots(isolated))
    }
}

/// Try to write `expr` as `a*unknown + b`, where neither `a` nor `b` depend
/// on `unknown`.
fn linear_form(
    expr: &Expression,
    unknown: &Parameter,
) -> Option<(Expression, Expression)> {
    if !expr.depends_on(unknown) {
        return Some((Expression::Constant(0.0), expr.clone()));
    }

    match expr {
        Expression::Parameter(_) => {
            Some((Expression::Constant(1.0), Expression::Constant(0.0)))
        },
        Expression::Negate(inner) => {
            let (a, b) = linear_form(inner, unknown)?;
            Some((-a, -b))
        },
        Expression::Binary { left, right, op } => {
            use crate::BinaryOperation::*;

            match op {
                Plus | Minus => {
                    let (a_1, b_1) = linear_form(left, unknown)?;
                    let (a_2, b_2) = linear_form(right, unknown)?;

                    if *op == Plus {
                        Some((a_1 + a_2, b_1 + b_2))
                    } else {
                        Some((a_1 - a_2, b_1 - b_2))
                    }
                },
                Times if !left.depends_on(unknown) => {
                    let (a, b) = linear_form(right, unknown)?;
                    let factor = Expression::clone(left);
                    Some((factor.clone() * a, factor * b))
                },
                Times if !right.depends_on(unknown) => {
                    let (a, b) = linear_form(left, unknown)?;
                    let factor = Expression::clone(right);
                    Some((a * factor.clone(), b * factor))
                },
                Divide if !right.depends_on(unknown) => {
                    let (a, b) = linear_form(left, unknown)?;
                    let divisor = Expression::clone(right);
                    Some((a / divisor.clone(), b / divisor))
                },
                _ => None,
            }
        },
        Expression::Constant(_) | Expression::FunctionCall { .. } => None,
    }
}

fn is_zero(expr: &Expression) -> bool { expr.as_constant() == Some(0.0) }

fn join(params: &[Parameter]) -> String {
    params
        .iter()
        .map(Parameter::name)
        .collect::<Vec<_>>()
        .join(", ")
}
