//! Dense real polynomials in a single unknown.

use crate::{BinaryOperation, Expression, Parameter};
use arrayvec::ArrayVec;
use std::fmt::{self, Display, Formatter};

/// A polynomial, `c_0 + c_1 x + c_2 x^2 + ...`, stored as its coefficients
/// in ascending order of power.
///
/// Each coefficient carries the summed magnitude of every term that
/// contributed to it, so rounding noise left over from cancellation
/// (`0.1x + 0.2x - 0.3x`) can be told apart from a coefficient which is
/// genuinely small (`0.000000001x`).
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    magnitudes: Vec<f64>,
}

/// The roots of a polynomial of degree 2 or less.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosedForm {
    /// Every coefficient is zero, so any value is a root.
    Identity,
    /// There are no real roots.
    NoRoots,
    /// Distinct real roots, in ascending order.
    Roots(ArrayVec<[f64; 2]>),
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        let magnitudes = coefficients.iter().map(|c| c.abs()).collect();
        Polynomial::from_parts(coefficients, magnitudes)
    }

    fn from_parts(coefficients: Vec<f64>, magnitudes: Vec<f64>) -> Self {
        debug_assert_eq!(coefficients.len(), magnitudes.len());

        let mut poly = Polynomial {
            coefficients,
            magnitudes,
        };
        poly.trim(0.0);
        poly
    }

    fn constant(value: f64) -> Self { Polynomial::new(vec![value]) }

    /// Try to interpret an [`Expression`] as a polynomial in `unknown`.
    ///
    /// Expects an expression that has already been simplified, so named
    /// constants and constant function calls are gone. Returns `None` when
    /// the expression mentions another parameter, calls a function of the
    /// unknown, divides by something other than a constant, raises to
    /// anything other than a non-negative integer, or would expand to a
    /// degree above `max_degree`.
    pub fn from_expression(
        expr: &Expression,
        unknown: &Parameter,
        max_degree: u32,
    ) -> Option<Polynomial> {
        match expr {
            Expression::Constant(value) => Some(Polynomial::constant(*value)),
            Expression::Parameter(p) if p == unknown => {
                Some(Polynomial::new(vec![0.0, 1.0]))
            },
            Expression::Parameter(_) | Expression::FunctionCall { .. } => {
                None
            },
            Expression::Negate(inner) => {
                Polynomial::from_expression(inner, unknown, max_degree)
                    .map(|p| p.scaled(-1.0))
            },
            Expression::Binary { left, right, op } => {
                let left =
                    Polynomial::from_expression(left, unknown, max_degree)?;

                if *op == BinaryOperation::Power {
                    let exponent = right.as_constant()?;
                    return left.powi(exponent, max_degree);
                }

                let right =
                    Polynomial::from_expression(right, unknown, max_degree)?;

                match op {
                    BinaryOperation::Plus => Some(left.add(&right, 1.0)),
                    BinaryOperation::Minus => Some(left.add(&right, -1.0)),
                    BinaryOperation::Times => left.mul(&right, max_degree),
                    BinaryOperation::Divide => match right.coefficients[..] {
                        [divisor] if divisor != 0.0 => {
                            Some(left.scaled(1.0 / divisor))
                        },
                        _ => None,
                    },
                    BinaryOperation::Power => unreachable!(),
                }
            },
        }
    }

    /// The highest power with a non-zero coefficient. The zero polynomial
    /// has degree 0.
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn coefficients(&self) -> &[f64] { &self.coefficients }

    /// Evaluate using Horner's method.
    #[cfg(test)]
    fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Zero every coefficient which is within `tolerance` (relative) of the
    /// terms it was summed from, then drop leading zeros.
    ///
    /// A coefficient that didn't come from cancellation is never dropped,
    /// however small it is.
    pub fn trim(&mut self, tolerance: f64) {
        for (c, &magnitude) in
            self.coefficients.iter_mut().zip(self.magnitudes.iter())
        {
            if c.abs() <= tolerance * magnitude {
                *c = 0.0;
            }
        }

        while self.coefficients.len() > 1
            && self.coefficients.last() == Some(&0.0)
        {
            self.coefficients.pop();
            self.magnitudes.pop();
        }

        if self.coefficients.is_empty() {
            self.coefficients.push(0.0);
            self.magnitudes.push(0.0);
        }
    }

    /// Solve degree 0, 1, and 2 polynomials exactly. Returns `None` for
    /// anything of higher degree.
    pub fn solve_closed_form(&self, tolerance: f64) -> Option<ClosedForm> {
        let mut roots = ArrayVec::new();

        match self.coefficients[..] {
            [c] if c == 0.0 => return Some(ClosedForm::Identity),
            [_] => return Some(ClosedForm::NoRoots),
            [c_0, c_1] => roots.push(-c_0 / c_1 + 0.0),
            [c_0, c_1, c_2] => {
                let discriminant = c_1 * c_1 - 4.0 * c_0 * c_2;
                let scale = (c_1 * c_1).max((4.0 * c_0 * c_2).abs());

                if discriminant.abs() <= tolerance * scale {
                    // a repeated root
                    roots.push(-c_1 / (2.0 * c_2) + 0.0);
                } else if discriminant < 0.0 {
                    return Some(ClosedForm::NoRoots);
                } else {
                    // avoid cancellation when b and sqrt(discriminant) are
                    // close in magnitude
                    let q = -0.5 * (c_1 + c_1.signum() * discriminant.sqrt());
                    let (a, b) = (q / c_2, c_0 / q);
                    roots.push(a.min(b));
                    roots.push(a.max(b));
                }
            },
            _ => return None,
        }

        Some(ClosedForm::Roots(roots))
    }

    /// An upper bound on the magnitude of every real root (Cauchy's bound).
    pub fn root_bound(&self) -> f64 {
        let leading = self.coefficients[self.degree()];

        if leading == 0.0 {
            return 0.0;
        }

        let largest_ratio = self.coefficients[..self.degree()]
            .iter()
            .fold(0.0_f64, |acc, c| acc.max((c / leading).abs()));

        1.0 + largest_ratio
    }

    /// Turn the polynomial back into an [`Expression`], highest power first.
    pub fn to_expression(&self, unknown: &Parameter) -> Expression {
        let monomial = |power: usize| {
            let x = Expression::Parameter(unknown.clone());
            match power {
                1 => x,
                _ => x.pow(Expression::Constant(power as f64)),
            }
        };
        let term = |power: usize, c: f64| match power {
            0 => Expression::Constant(c),
            _ if c == 1.0 => monomial(power),
            _ if c == -1.0 => -monomial(power),
            _ => Expression::Constant(c) * monomial(power),
        };

        let mut terms = self
            .coefficients
            .iter()
            .enumerate()
            .rev()
            .filter(|&(_, &c)| c != 0.0);

        let mut expr = match terms.next() {
            Some((power, &c)) => term(power, c),
            None => return Expression::Constant(0.0),
        };

        for (power, &c) in terms {
            expr = if c < 0.0 {
                expr - term(power, -c)
            } else {
                expr + term(power, c)
            };
        }

        expr
    }

    fn scaled(mut self, factor: f64) -> Polynomial {
        self.coefficients.iter_mut().for_each(|c| *c *= factor);
        self.magnitudes.iter_mut().for_each(|m| *m *= factor.abs());
        self.trim(0.0);
        self
    }

    fn add(&self, other: &Polynomial, sign: f64) -> Polynomial {
        let len = self.coefficients.len().max(other.coefficients.len());
        let get =
            |values: &[f64], i: usize| values.get(i).copied().unwrap_or(0.0);

        Polynomial::from_parts(
            (0..len)
                .map(|i| {
                    get(&self.coefficients[..], i)
                        + sign * get(&other.coefficients[..], i)
                })
                .collect(),
            (0..len)
                .map(|i| {
                    get(&self.magnitudes[..], i)
                        + get(&other.magnitudes[..], i)
                })
                .collect(),
        )
    }

    fn mul(&self, other: &Polynomial, max_degree: u32) -> Option<Polynomial> {
        let degree = self.degree() + other.degree();

        if degree > max_degree as usize {
            return None;
        }

        let mut coefficients = vec![0.0; degree + 1];
        let mut magnitudes = vec![0.0; degree + 1];

        for (i, (a, m_a)) in
            self.coefficients.iter().zip(&self.magnitudes).enumerate()
        {
            for (j, (b, m_b)) in
                other.coefficients.iter().zip(&other.magnitudes).enumerate()
            {
                coefficients[i + j] += a * b;
                magnitudes[i + j] += m_a * m_b;
            }
        }

        Some(Polynomial::from_parts(coefficients, magnitudes))
    }

    fn powi(&self, exponent: f64, max_degree: u32) -> Option<Polynomial> {
        let is_natural = exponent >= 0.0
            && exponent.fract() == 0.0
            && exponent <= f64::from(max_degree);

        if !is_natural {
            return None;
        }

        let exponent = exponent as u32;
        if self.degree() as u64 * u64::from(exponent) > u64::from(max_degree) {
            return None;
        }

        let mut result = Polynomial::constant(1.0);
        for _ in 0..exponent {
            result = result.mul(self, max_degree)?;
        }

        Some(result)
    }
}

/// Displays a [`Polynomial`] using a particular name for its unknown.
#[derive(Debug, Copy, Clone)]
pub struct InTermsOf<'a> {
    polynomial: &'a Polynomial,
    unknown: &'a Parameter,
}

impl Polynomial {
    pub fn in_terms_of<'a>(&'a self, unknown: &'a Parameter) -> InTermsOf<'a> {
        InTermsOf {
            polynomial: self,
            unknown,
        }
    }
}

impl<'a> Display for InTermsOf<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let coefficients = &self.polynomial.coefficients;
        let mut wrote_anything = false;

        for (power, &c) in coefficients.iter().enumerate().rev() {
            if c == 0.0 && (wrote_anything || power > 0) {
                continue;
            }

            let magnitude = if wrote_anything {
                write!(f, " {} ", if c < 0.0 { "-" } else { "+" })?;
                c.abs()
            } else {
                c
            };
            let number = crate::expr::format_number(magnitude);

            match power {
                0 => write!(f, "{}", number)?,
                _ if magnitude == 1.0 => {},
                _ if magnitude == -1.0 => write!(f, "-")?,
                _ => write!(f, "{}*", number)?,
            }
            match power {
                0 => {},
                1 => write!(f, "{}", self.unknown)?,
                _ => write!(f, "{}^{}", self.unknown, power)?,
            }

            wrote_anything = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ops, parse};

    fn x() -> Parameter { Parameter::named("x") }

    fn polynomial_of(src: &str) -> Option<Polynomial> {
        let expr = parse(src).unwrap();
        let expr = ops::simplify(&expr, &ops::Builtins).unwrap();
        Polynomial::from_expression(&expr, &x(), 64)
    }

    #[test]
    fn extract_coefficients() {
        let inputs = vec![
            ("5", vec![5.0]),
            ("x", vec![0.0, 1.0]),
            ("2x + 3 - 7", vec![-4.0, 2.0]),
            ("x^2 - 4", vec![-4.0, 0.0, 1.0]),
            ("(x + 1)(x - 1)", vec![-1.0, 0.0, 1.0]),
            ("(x + 1)^3", vec![1.0, 3.0, 3.0, 1.0]),
            ("x/2 + 1", vec![1.0, 0.5]),
            ("-(x - 3)", vec![3.0, -1.0]),
            ("x - (x + 1)", vec![-1.0]),
            ("x + 1 - (1 + x)", vec![0.0]),
        ];

        for (src, should_be) in inputs {
            let got = polynomial_of(src).unwrap();

            assert_eq!(got.coefficients(), &should_be[..], "{}", src);
        }
    }

    #[test]
    fn non_polynomials_are_rejected() {
        let inputs = vec![
            "sin(x)",
            "1/x",
            "x^0.5",
            "x^-1",
            "2^x",
            "x^100",
            "x*y",
            "((x^64)^64)^16",
            "(x^8)^9",
            "x^40 * x^40",
            "(x^2 + 1)^33",
        ];

        for src in inputs {
            assert!(polynomial_of(src).is_none(), "{}", src);
        }
    }

    #[test]
    fn the_degree_budget_covers_nested_powers() {
        assert_eq!(polynomial_of("(x^8)^8").unwrap().degree(), 64);
        assert_eq!(polynomial_of("x^32 * x^32").unwrap().degree(), 64);
    }

    #[test]
    fn cancellation_noise_is_trimmed() {
        let inputs = vec![
            ("0.1*x + 0.2*x - 0.3*x", vec![0.0]),
            ("x + 0.1 + 0.2 - (x + 0.3)", vec![0.0]),
            ("(0.1 + 0.2)*x^2 - 0.3*x^2 + x", vec![0.0, 1.0]),
        ];

        for (src, should_be) in inputs {
            let mut got = polynomial_of(src).unwrap();
            got.trim(1e-9);

            assert_eq!(got.coefficients(), &should_be[..], "{}", src);
        }
    }

    #[test]
    fn small_coefficients_are_kept() {
        let inputs = vec![
            ("0.000000001*x - 1", vec![-1.0, 1e-9]),
            ("0.0000000001*x + 0.0000000001", vec![1e-10, 1e-10]),
            ("x - 0.0000000001", vec![-1e-10, 1.0]),
            ("0.000000000001", vec![1e-12]),
        ];

        for (src, should_be) in inputs {
            let mut got = polynomial_of(src).unwrap();
            got.trim(1e-9);

            assert_eq!(got.coefficients(), &should_be[..], "{}", src);
        }
    }

    #[test]
    fn tiny_quadratics_keep_both_roots() {
        let poly = Polynomial::new(vec![-1e-12, 0.0, 1.0]);

        match poly.solve_closed_form(1e-9) {
            Some(ClosedForm::Roots(roots)) => {
                assert_eq!(roots.len(), 2);
                assert!(approx::relative_eq!(
                    roots[0],
                    -1e-6,
                    max_relative = 1e-12
                ));
                assert!(approx::relative_eq!(
                    roots[1],
                    1e-6,
                    max_relative = 1e-12
                ));
            },
            other => panic!("Expected two roots, got {:?}", other),
        }
    }

    #[test]
    fn turn_back_into_an_expression() {
        let inputs = vec![
            (vec![0.0], "0"),
            (vec![1.0, 2.0], "2*x + 1"),
            (vec![0.0, 1.0], "x"),
            (vec![-4.0, 0.0, 1.0], "x^2 - 4"),
            (vec![1.0, -1.0, 0.0, -2.5], "-2.5*x^3 - x + 1"),
            (vec![0.0, 0.0, -1.0], "-x^2"),
        ];

        for (coefficients, should_be) in inputs {
            let poly = Polynomial::new(coefficients);

            let got = poly.to_expression(&x());

            assert_eq!(got.to_string(), should_be);
            assert_eq!(got.to_string(), poly.in_terms_of(&x()).to_string());
        }
    }

    #[test]
    fn closed_form_solutions() {
        let inputs = vec![
            (vec![0.0], ClosedForm::Identity),
            (vec![-1.0], ClosedForm::NoRoots),
            (
                vec![-4.0, 2.0],
                ClosedForm::Roots([2.0].iter().copied().collect()),
            ),
            (
                vec![-4.0, 0.0, 1.0],
                ClosedForm::Roots([-2.0, 2.0].iter().copied().collect()),
            ),
            (
                vec![1.0, -2.0, 1.0],
                ClosedForm::Roots([1.0].iter().copied().collect()),
            ),
            (
                vec![6.0, -5.0, 1.0],
                ClosedForm::Roots([2.0, 3.0].iter().copied().collect()),
            ),
            (vec![1.0, 0.0, 1.0], ClosedForm::NoRoots),
        ];

        for (coefficients, should_be) in inputs {
            let poly = Polynomial::new(coefficients);

            let got = poly.solve_closed_form(1e-9).unwrap();

            assert_eq!(got, should_be, "{}", poly.in_terms_of(&x()));
        }
    }

    #[test]
    fn cubics_are_not_solved_in_closed_form() {
        let poly = Polynomial::new(vec![-6.0, 11.0, -6.0, 1.0]);

        assert_eq!(poly.degree(), 3);
        assert!(poly.solve_closed_form(1e-9).is_none());
        assert_eq!(poly.evaluate(1.0), 0.0);
        assert_eq!(poly.evaluate(4.0), 6.0);
        assert_eq!(poly.root_bound(), 12.0);
    }

    #[test]
    fn display() {
        let inputs = vec![
            (vec![0.0], "0"),
            (vec![-4.0, 2.0], "2*x - 4"),
            (vec![-4.0, 0.0, 1.0], "x^2 - 4"),
            (vec![1.0, -1.0, 0.0, -2.5], "-2.5*x^3 - x + 1"),
        ];

        for (coefficients, should_be) in inputs {
            let got = Polynomial::new(coefficients).in_terms_of(&x()).to_string();

            assert_eq!(got, should_be);
        }
    }

    #[test]
    fn display_uses_the_name_of_the_unknown() {
        let poly = Polynomial::new(vec![-4.0, 0.0, 1.0]);

        let got = poly.in_terms_of(&Parameter::named("radius")).to_string();

        assert_eq!(got, "radius^2 - 4");
    }
}
