//! Rule expression language.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := compare ( "&&" compare )*
//! compare := primary ( ( "==" | "!=" | "=~" | "!~" ) primary )?
//! primary := "(" or ")" | $VAR | ${VAR} | "str" | 'str' | /regex/flags | null
//! ```

use super::Variables;
use crate::errors::ExpressionError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, none_of},
    combinator::{all_consuming, cut, map, opt, value},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use regex::Regex;

type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Eq,
    Ne,
    Match,
    NotMatch,
}

/// Parsed syntax, before regex literals are compiled.
#[derive(Debug, Clone)]
enum Ast {
    Variable(String),
    Str(String),
    Pattern(String, String),
    Null,
    Compare(Box<Ast>, Comparison, Box<Ast>),
    And(Vec<Ast>),
    Or(Vec<Ast>),
}

#[derive(Debug, Clone)]
enum Expr {
    Variable(String),
    Str(String),
    Pattern(Regex),
    Null,
    Compare(Box<Expr>, Comparison, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

#[derive(Debug, Clone)]
enum Value {
    Null,
    Str(String),
    Bool(bool),
    Pattern(Regex),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::Pattern(_) => true,
        }
    }
}

/// A parsed rule expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parses an expression.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let ast = match all_consuming(terminated(or_expr, multispace0))(source) {
            Ok((_, ast)) => ast,
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => return Err(syntax_error(source, &e)),
            Err(nom::Err::Incomplete(_)) => {
                return Err(ExpressionError::syntax(source, "unexpected end of expression"))
            }
        };
        Ok(Self {
            source: source.to_string(),
            root: lower(ast)?,
        })
    }

    /// Returns the source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression to a boolean.
    pub fn evaluate(&self, variables: &Variables) -> Result<bool, ExpressionError> {
        Ok(eval(&self.root, variables, &self.source)?.truthy())
    }
}

fn syntax_error(source: &str, error: &VerboseError<&str>) -> ExpressionError {
    let expected = error.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(name) => Some(*name),
        _ => None,
    });
    let remaining = error
        .errors
        .first()
        .map_or("", |(rest, _)| rest.trim_start());
    let position = source.len() - remaining.len();

    match (expected, remaining.chars().next()) {
        (Some(name), _) => {
            ExpressionError::syntax(source, format!("expected {name} at position {position}"))
        }
        (None, Some(character)) => ExpressionError::UnexpectedCharacter {
            character,
            position,
            expression: source.to_string(),
        },
        (None, None) => ExpressionError::syntax(source, "unexpected end of expression"),
    }
}

fn token<'a, O>(
    parser: impl FnMut(&'a str) -> ParseResult<'a, O>,
) -> impl FnMut(&'a str) -> ParseResult<'a, O> {
    preceded(multispace0, parser)
}

fn or_expr(input: &str) -> ParseResult<'_, Ast> {
    map(separated_list1(token(tag("||")), and_expr), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Ast::Or(terms)
        }
    })(input)
}

fn and_expr(input: &str) -> ParseResult<'_, Ast> {
    map(separated_list1(token(tag("&&")), compare_expr), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Ast::And(terms)
        }
    })(input)
}

fn compare_expr(input: &str) -> ParseResult<'_, Ast> {
    let (input, left) = primary(input)?;
    let (input, right) = opt(pair(
        token(comparison),
        cut(context("a value after the operator", primary)),
    ))(input)?;
    Ok((
        input,
        match right {
            Some((op, right)) => Ast::Compare(Box::new(left), op, Box::new(right)),
            None => left,
        },
    ))
}

fn comparison(input: &str) -> ParseResult<'_, Comparison> {
    alt((
        value(Comparison::Eq, tag("==")),
        value(Comparison::Ne, tag("!=")),
        value(Comparison::Match, tag("=~")),
        value(Comparison::NotMatch, tag("!~")),
    ))(input)
}

fn primary(input: &str) -> ParseResult<'_, Ast> {
    token(alt((
        parenthesized,
        variable,
        string_literal,
        pattern_literal,
        value(Ast::Null, tag("null")),
    )))(input)
}

fn parenthesized(input: &str) -> ParseResult<'_, Ast> {
    delimited(
        char('('),
        or_expr,
        cut(context("closing ')'", token(char(')')))),
    )(input)
}

fn identifier(input: &str) -> ParseResult<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn variable(input: &str) -> ParseResult<'_, Ast> {
    map(
        preceded(
            char('$'),
            alt((
                preceded(char('{'), cut(terminated(identifier, context("closing '}'", char('}'))))),
                identifier,
            )),
        ),
        |name: &str| Ast::Variable(name.to_string()),
    )(input)
}

fn string_literal(input: &str) -> ParseResult<'_, Ast> {
    map(
        alt((
            preceded(
                char('"'),
                cut(terminated(take_while(|c: char| c != '"'), context("closing quote", char('"')))),
            ),
            preceded(
                char('\''),
                cut(terminated(take_while(|c: char| c != '\''), context("closing quote", char('\'')))),
            ),
        )),
        |s: &str| Ast::Str(s.to_string()),
    )(input)
}

/// `/body/flags`, where `\/` stands for a literal slash.
fn pattern_literal(input: &str) -> ParseResult<'_, Ast> {
    let (input, body) = preceded(
        char('/'),
        fold_many0(
            alt((value('/', tag("\\/")), none_of("/"))),
            String::new,
            |mut body, c| {
                body.push(c);
                body
            },
        ),
    )(input)?;
    let (input, _) = cut(context("closing '/'", char('/')))(input)?;
    let (input, flags) = take_while(|c: char| matches!(c, 'i' | 'm' | 's' | 'x'))(input)?;
    Ok((input, Ast::Pattern(body, flags.to_string())))
}

fn lower(ast: Ast) -> Result<Expr, ExpressionError> {
    let all = |terms: Vec<Ast>| terms.into_iter().map(lower).collect::<Result<Vec<_>, _>>();
    Ok(match ast {
        Ast::Variable(name) => Expr::Variable(name),
        Ast::Str(s) => Expr::Str(s),
        Ast::Pattern(body, flags) => Expr::Pattern(compile_pattern(&body, &flags)?),
        Ast::Null => Expr::Null,
        Ast::Compare(l, op, r) => Expr::Compare(Box::new(lower(*l)?), op, Box::new(lower(*r)?)),
        Ast::And(terms) => Expr::And(all(terms)?),
        Ast::Or(terms) => Expr::Or(all(terms)?),
    })
}

fn compile_pattern(pattern: &str, flags: &str) -> Result<Regex, ExpressionError> {
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    };
    Regex::new(&source).map_err(|e| ExpressionError::InvalidRegex {
        pattern: pattern.to_string(),
        detail: e.to_string(),
    })
}

fn eval(expr: &Expr, variables: &Variables, source: &str) -> Result<Value, ExpressionError> {
    Ok(match expr {
        Expr::Variable(name) => variables
            .get(name)
            .map_or(Value::Null, |v| Value::Str(v.to_string())),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::Pattern(re) => Value::Pattern(re.clone()),
        Expr::Null => Value::Null,
        Expr::And(terms) => {
            for term in terms {
                if !eval(term, variables, source)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        Expr::Or(terms) => {
            for term in terms {
                if eval(term, variables, source)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        Expr::Compare(l, op, r) => {
            let left = eval(l, variables, source)?;
            let right = eval(r, variables, source)?;
            Value::Bool(compare(&left, *op, &right, source)?)
        }
    })
}

fn compare(left: &Value, op: Comparison, right: &Value, source: &str) -> Result<bool, ExpressionError> {
    match op {
        Comparison::Eq => Ok(values_equal(left, right)),
        Comparison::Ne => Ok(!values_equal(left, right)),
        Comparison::Match | Comparison::NotMatch => {
            let regex = match right {
                Value::Pattern(re) => re.clone(),
                Value::Str(s) => pattern_from_string(s, source)?,
                _ => {
                    return Err(ExpressionError::syntax(
                        source,
                        "right side of a match must be a regular expression",
                    ))
                }
            };
            let matched = match left {
                Value::Str(s) => regex.is_match(s),
                _ => false,
            };
            Ok(if matches!(op, Comparison::Match) {
                matched
            } else {
                !matched
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

/// Variables can hold `/pattern/flags` strings on the right side of `=~`.
fn pattern_from_string(value: &str, source: &str) -> Result<Regex, ExpressionError> {
    let body = value
        .strip_prefix('/')
        .and_then(|rest| rest.rfind('/').map(|end| (&rest[..end], &rest[end + 1..])));
    match body {
        Some((pattern, flags)) => compile_pattern(pattern, flags),
        None => Err(ExpressionError::syntax(
            source,
            format!("'{value}' is not a regular expression"),
        )),
    }
}
