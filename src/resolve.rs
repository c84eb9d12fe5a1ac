//! Splitting a batch of statements and resolving each one.

use crate::{
    ops::{self, Builtins, Context, EvaluationError},
    parse, ConfigError, Equation, Expression, Parameter, ParseError,
    Polynomial, ResolverConfig,
};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    ops::Index,
    slice,
};
use thiserror::Error;

/// Resolve every statement in `input` using the default [`ResolverConfig`].
///
/// ```rust
/// let batch = resolver::resolve("2+2; 2x + 3 = 7");
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch[0].outcome.as_ref().unwrap().to_string(), "4");
/// assert_eq!(batch[1].outcome.as_ref().unwrap().to_string(), "x = 2");
/// ```
pub fn resolve(input: &str) -> BatchResult {
    Resolver::<Builtins>::default().resolve(input)
}

/// Resolves batches of statements.
///
/// A [`Resolver`] holds nothing but its configuration and evaluation
/// [`Context`], so it can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Resolver<C = Builtins> {
    config: ResolverConfig,
    ctx: C,
}

impl Resolver<Builtins> {
    /// Create a [`Resolver`] with the builtin functions and constants,
    /// rejecting a [`ResolverConfig`] which fails
    /// [`ResolverConfig::validate()`].
    pub fn new(config: ResolverConfig) -> Result<Self, ConfigError> {
        Resolver::with_context(config, Builtins)
    }
}

impl<C: Context> Resolver<C> {
    /// Create a [`Resolver`] which uses a custom set of functions and
    /// constants.
    pub fn with_context(
        config: ResolverConfig,
        ctx: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Resolver { config, ctx })
    }

    pub fn config(&self) -> &ResolverConfig { &self.config }

    pub fn context(&self) -> &C { &self.ctx }

    /// Split `input` into statements and resolve each of them.
    ///
    /// Blank statements are skipped, unless there is nothing else in the
    /// input, in which case the result is a single
    /// [`ParseError::EmptyStatement`].
    pub fn resolve(&self, input: &str) -> BatchResult {
        let statements: Vec<&str> = input
            .split(self.config.delimiter)
            .map(str::trim)
            .filter(|statement| !statement.is_empty())
            .collect();

        if statements.is_empty() {
            return BatchResult {
                entries: vec![self.empty_statement()],
            };
        }

        let is_batch = statements.len() > 1;
        let entries = statements
            .into_iter()
            .enumerate()
            .map(|(i, statement)| {
                let mut entry = self.resolve_statement(i + 1, statement);
                if is_batch {
                    entry.steps.push(self.config.trace_separator.as_str());
                }
                entry
            })
            .collect();

        BatchResult { entries }
    }

    fn empty_statement(&self) -> Entry {
        let error = ResolveError::from(ParseError::EmptyStatement);
        tracing::warn!(%error, "Nothing to resolve");

        let mut steps = StepTrace::default();
        steps.push("Statement 1: (empty)");
        steps.push(format!("Error: {}", error));

        Entry {
            statement: String::new(),
            kind: None,
            outcome: Err(error),
            steps,
        }
    }

    fn resolve_statement(&self, index: usize, statement: &str) -> Entry {
        let span = tracing::debug_span!("statement", index, statement);
        let _guard = span.enter();

        let mut steps = StepTrace::default();
        steps.push(format!("Statement {}: {}", index, statement));

        let kind = StatementKind::of(statement);
        steps.push(format!("Classified as {}", kind));
        tracing::debug!(%kind, "Classified the statement");

        let outcome = match kind {
            StatementKind::Equation => {
                self.solve_equation(statement, &mut steps)
            },
            StatementKind::Expression => {
                self.simplify_expression(statement, &mut steps)
            },
        };

        match outcome {
            Ok(ref solution) => {
                tracing::debug!(%solution, "Resolved");
                steps.push(format!("Result: {}", solution));
            },
            Err(ref error) => {
                tracing::warn!(%error, "Unable to resolve the statement");
                steps.push(format!("Error: {}", error));
            },
        }

        Entry {
            statement: statement.to_string(),
            kind: Some(kind),
            outcome,
            steps,
        }
    }

    fn solve_equation(
        &self,
        statement: &str,
        steps: &mut StepTrace,
    ) -> Result<Solution, ResolveError> {
        let equation =
            Equation::parse_with_depth(statement, self.config.max_depth)?;
        steps.push(format!(
            "Parsed as {} = {}",
            equation.left(),
            equation.right()
        ));

        equation.solve(&self.ctx, &self.config, steps)
    }

    fn simplify_expression(
        &self,
        statement: &str,
        steps: &mut StepTrace,
    ) -> Result<Solution, ResolveError> {
        let expr = parse::parse_with_depth(statement, self.config.max_depth)?;
        steps.push(format!("Parsed as {}", expr));

        let simplified = self.normalize(ops::simplify(&expr, &self.ctx)?);
        if simplified != expr {
            steps.push(format!("Simplify to {}", simplified));
        }

        Ok(Solution::Value(simplified))
    }

    /// Rewrite a polynomial in one unknown with its like terms collected,
    /// highest power first.
    fn normalize(&self, simplified: Expression) -> Expression {
        let unknowns = ops::free_variables(&simplified, &self.ctx);

        let normalized = match unknowns.as_slice() {
            [unknown] => Polynomial::from_expression(
                &simplified,
                unknown,
                self.config.max_exponent,
            )
            .map(|mut poly| {
                poly.trim(self.config.tolerance);
                poly.to_expression(unknown)
            }),
            _ => None,
        };

        normalized.unwrap_or(simplified)
    }
}

/// Is a statement an equation or an expression?
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Equation,
    Expression,
}

impl StatementKind {
    fn of(statement: &str) -> Self {
        if statement.contains('=') {
            StatementKind::Equation
        } else {
            StatementKind::Expression
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Equation => write!(f, "an equation"),
            StatementKind::Expression => write!(f, "an expression"),
        }
    }
}

/// The result of resolving a single statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Solution {
    /// The simplified form of an expression.
    Value(Expression),
    /// Candidate values for each unknown, in ascending order when they are
    /// numbers.
    Roots(BTreeMap<Parameter, Vec<Expression>>),
    /// The equation is never true.
    NoSolution,
    /// The equation is true no matter what values its unknowns take.
    Indeterminate,
}

impl Solution {
    /// The simplified value, if this is [`Solution::Value`].
    pub fn value(&self) -> Option<&Expression> {
        match self {
            Solution::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The values found for a particular unknown.
    pub fn roots_of(&self, name: &str) -> Option<&[Expression]> {
        match self {
            Solution::Roots(roots) => roots
                .iter()
                .find(|(unknown, _)| unknown.name() == name)
                .map(|(_, values)| values.as_slice()),
            _ => None,
        }
    }
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Solution::Value(value) => write!(f, "{}", value),
            Solution::Roots(roots) => {
                for (i, (unknown, values)) in roots.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }

                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            write!(f, " or ")?;
                        }
                        write!(f, "{} = {}", unknown, value)?;
                    }
                }

                Ok(())
            },
            Solution::NoSolution => write!(f, "no solution"),
            Solution::Indeterminate => {
                write!(f, "indeterminate (true for every value)")
            },
        }
    }
}

/// Why a statement couldn't be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl ResolveError {
    /// A machine-readable name for the kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Parse(_) => "parse_error",
            ResolveError::Evaluation(_) => "evaluation_error",
        }
    }
}

/// Human-readable notes on how a statement was resolved.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepTrace(Vec<String>);

impl StepTrace {
    pub fn push<S: Into<String>>(&mut self, step: S) {
        self.0.push(step.into());
    }

    pub fn iter(&self) -> slice::Iter<'_, String> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<'a> IntoIterator for &'a StepTrace {
    type IntoIter = slice::Iter<'a, String>;
    type Item = &'a String;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl Display for StepTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", step)?;
        }

        Ok(())
    }
}

/// One resolved statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The statement, with surrounding whitespace removed.
    pub statement: String,
    /// `None` when there was no statement to classify.
    pub kind: Option<StatementKind>,
    pub outcome: Result<Solution, ResolveError>,
    pub steps: StepTrace,
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.outcome.is_ok() { 5 } else { 6 };
        let mut state = serializer.serialize_struct("Entry", fields)?;

        state.serialize_field("statement", &self.statement)?;
        state.serialize_field("kind", &self.kind)?;

        match self.outcome {
            Ok(ref solution) => {
                state.serialize_field("status", "ok")?;
                state.serialize_field("solution", solution)?;
            },
            Err(ref error) => {
                state.serialize_field("status", "error")?;
                state.serialize_field("error", error.kind())?;
                state.serialize_field("message", &error.to_string())?;
            },
        }

        state.serialize_field("steps", &self.steps)?;
        state.end()
    }
}

/// The entries for every statement in a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BatchResult {
    entries: Vec<Entry>,
}

impl BatchResult {
    pub fn entries(&self) -> &[Entry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> slice::Iter<'_, Entry> { self.entries.iter() }
}

impl Index<usize> for BatchResult {
    type Output = Entry;

    fn index(&self, index: usize) -> &Entry { &self.entries[index] }
}

impl<'a> IntoIterator for &'a BatchResult {
    type IntoIter = slice::Iter<'a, Entry>;
    type Item = &'a Entry;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

impl IntoIterator for BatchResult {
    type IntoIter = std::vec::IntoIter<Entry>;
    type Item = Entry;

    fn into_iter(self) -> Self::IntoIter { self.entries.into_iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn resolvers_can_be_shared_between_threads() {
        assert_send_sync::<Resolver>();
        assert_send_sync::<BatchResult>();
    }

    #[test]
    fn classify_statements() {
        let inputs = vec![
            ("2 + 2", StatementKind::Expression),
            ("x = 5", StatementKind::Equation),
            ("a = b = c", StatementKind::Equation),
            ("sin(x)", StatementKind::Expression),
        ];

        for (src, should_be) in inputs {
            assert_eq!(StatementKind::of(src), should_be, "{}", src);
        }
    }

    #[test]
    fn simplify_an_expression() {
        let batch = resolve("2 * (3 + 4)");

        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch[0].outcome,
            Ok(Solution::Value(Expression::Constant(14.0)))
        );
        assert_eq!(batch[0].kind, Some(StatementKind::Expression));
    }

    #[test]
    fn symbolic_expressions_stay_symbolic() {
        let batch = resolve("x * 3 + 2 * 5");

        assert_eq!(
            batch[0].outcome.as_ref().unwrap().to_string(),
            "3*x + 10"
        );
    }

    #[test]
    fn single_statement_trace() {
        let batch = resolve("2x + 3 = 7");

        let got: Vec<_> = batch[0].steps.iter().cloned().collect();
        assert_eq!(
            got,
            vec![
                "Statement 1: 2x + 3 = 7",
                "Classified as an equation",
                "Parsed as 2*x + 3 = 7",
                "Unknowns: x",
                "Rearrange to 2*x + 3 - 7 = 0",
                "Polynomial of degree 1 in x: 2*x - 4 = 0",
                "Isolate x",
                "Result: x = 2",
            ]
        );
    }

    #[test]
    fn every_trace_in_a_batch_ends_with_a_separator() {
        let batch = resolve("2+2; x=5; 3*3");

        assert_eq!(batch.len(), 3);
        for (i, entry) in batch.iter().enumerate() {
            let first = entry.steps.iter().next().unwrap();
            let last = entry.steps.iter().last().unwrap();

            assert!(first.starts_with(&format!("Statement {}:", i + 1)));
            assert_eq!(last, "---");
        }
    }

    #[test]
    fn failures_are_recorded_in_the_trace() {
        let batch = resolve("1/0");

        let last = batch[0].steps.iter().last().unwrap();
        assert_eq!(last, "Error: division by zero");
        assert_eq!(
            batch[0].outcome,
            Err(ResolveError::Evaluation(EvaluationError::DivisionByZero))
        );
    }

    #[test]
    fn blank_statements_are_skipped() {
        let batch = resolve("1 + 1;  ; 2 * 2;");

        let statements: Vec<_> =
            batch.iter().map(|e| e.statement.as_str()).collect();
        assert_eq!(statements, vec!["1 + 1", "2 * 2"]);
    }

    #[test]
    fn nothing_but_whitespace_is_an_empty_statement() {
        for src in vec!["", "   ", ";;"] {
            let batch = resolve(src);

            assert_eq!(batch.len(), 1, "{:?}", src);
            assert_eq!(batch[0].kind, None);
            assert_eq!(
                batch[0].outcome,
                Err(ResolveError::Parse(ParseError::EmptyStatement))
            );
        }
    }

    #[test]
    fn use_a_custom_delimiter() {
        let config = ResolverConfig {
            delimiter: '|',
            trace_separator: String::from("==="),
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(config).unwrap();

        let batch = resolver.resolve("1 + 1 | x = 3");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].outcome.as_ref().unwrap().to_string(), "x = 3");
        assert_eq!(batch[1].steps.iter().last().unwrap(), "===");
    }

    #[test]
    fn depth_limit_comes_from_the_config() {
        let config = ResolverConfig {
            max_depth: 4,
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(config).unwrap();

        let batch = resolver.resolve("((((1))))");

        assert_eq!(
            batch[0].outcome,
            Err(ResolveError::Parse(ParseError::TooDeep { limit: 4 }))
        );
    }

    #[test]
    fn invalid_configs_are_rejected_up_front() {
        let inputs = vec![
            (
                ResolverConfig {
                    max_depth: 0,
                    ..ResolverConfig::default()
                },
                "max_depth",
            ),
            (
                ResolverConfig {
                    seed_count: 0,
                    ..ResolverConfig::default()
                },
                "seed_count",
            ),
            (
                ResolverConfig {
                    delimiter: '=',
                    ..ResolverConfig::default()
                },
                "delimiter",
            ),
        ];

        for (config, should_be) in inputs {
            match Resolver::new(config) {
                Err(ConfigError::Invalid { field, .. }) => {
                    assert_eq!(field, should_be)
                },
                other => panic!(
                    "Expected {} to be rejected, got {:?}",
                    should_be, other
                ),
            }
        }
    }

    #[test]
    fn equivalent_expressions_simplify_to_the_same_value() {
        let inputs = vec![
            ("x + 2*x", "3*x", "3*x"),
            ("2*x - x", "x", "x"),
            ("(x + 1)^2 - x^2", "2*x + 1", "2*x + 1"),
            ("x*(x + 1)", "x^2 + x", "x^2 + x"),
            ("(x - 1)(x + 1) + 1", "x*x", "x^2"),
            ("x/2 + x/2", "x", "x"),
            ("y + 1 - y", "1", "1"),
        ];

        for (left, right, should_be) in inputs {
            let batch = resolve(&format!("{}; {}", left, right));

            assert_eq!(
                batch[0].outcome, batch[1].outcome,
                "{} != {}",
                left, right
            );
            let got = batch[0].outcome.as_ref().unwrap().to_string();
            assert_eq!(got, should_be, "{}", left);
        }
    }

    #[derive(Debug, Default)]
    struct WithTau;

    impl Context for WithTau {
        fn evaluate_function(
            &self,
            name: &str,
            argument: f64,
        ) -> Result<f64, EvaluationError> {
            Builtins.evaluate_function(name, argument)
        }

        fn constant(&self, name: &str) -> Option<f64> {
            match name {
                "tau" => Some(2.0 * std::f64::consts::PI),
                other => Builtins.constant(other),
            }
        }

        fn differentiate_function(
            &self,
            name: &str,
            param: &Parameter,
        ) -> Result<Expression, EvaluationError> {
            Builtins.differentiate_function(name, param)
        }
    }

    #[test]
    fn custom_contexts_provide_named_constants() {
        let resolver =
            Resolver::with_context(ResolverConfig::default(), WithTau)
                .unwrap();

        let batch = resolver.resolve("tau/pi; tau = x");

        assert_eq!(
            batch[0].outcome,
            Ok(Solution::Value(Expression::Constant(2.0)))
        );
        let x = batch[1].outcome.as_ref().unwrap().roots_of("x").unwrap();
        assert_eq!(x, &[Expression::Constant(2.0 * std::f64::consts::PI)]);
    }

    #[test]
    fn display_solutions() {
        let x = Parameter::named("x");
        let y = Parameter::named("y");
        let mut two_unknowns = BTreeMap::new();
        two_unknowns.insert(x.clone(), vec![crate::parse("3 - y").unwrap()]);
        two_unknowns.insert(y, vec![crate::parse("3 - x").unwrap()]);
        let mut quadratic = BTreeMap::new();
        quadratic.insert(
            x,
            vec![Expression::Constant(-2.0), Expression::Constant(2.0)],
        );

        let inputs = vec![
            (Solution::Value(Expression::Constant(14.0)), "14"),
            (Solution::Roots(quadratic), "x = -2 or x = 2"),
            (Solution::Roots(two_unknowns), "x = 3 - y, y = 3 - x"),
            (Solution::NoSolution, "no solution"),
            (
                Solution::Indeterminate,
                "indeterminate (true for every value)",
            ),
        ];

        for (solution, should_be) in inputs {
            assert_eq!(solution.to_string(), should_be);
        }
    }

    #[test]
    fn serialize_a_batch() {
        let batch = resolve("x^2 = 4; 1/0");

        let got = serde_json::to_value(&batch).unwrap();

        let should_be = serde_json::json!([
            {
                "statement": "x^2 = 4",
                "kind": "equation",
                "status": "ok",
                "solution": { "type": "roots", "value": { "x": ["-2", "2"] } },
                "steps": batch[0].steps.iter().collect::<Vec<_>>(),
            },
            {
                "statement": "1/0",
                "kind": "expression",
                "status": "error",
                "error": "evaluation_error",
                "message": "division by zero",
                "steps": batch[1].steps.iter().collect::<Vec<_>>(),
            },
        ]);
        assert_eq!(got, should_be);
    }
}
