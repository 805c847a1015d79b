//! Recursive-descent parser for the legacy condition/value mini-language
//!
//! Independent of the main grammar parser. Covers relational conditions
//! (`>`, `<`, `>=`, `<=`, `=`, `==`, `!=`, `<>` plus NOT/BETWEEN/IN/LIKE),
//! value literals, positional `%N` substitutions, and the parenthesized
//! comma-delimited list grammars (value arrays, column lists, typed column
//! declarations, single-argument aggregate calls).
//!
//! NOT applies recursively in the operator position: `NOT NOT LIKE` is
//! accepted and each NOT toggles the negation. The double form is
//! semantically vacuous but preserved for compatibility; it is never
//! collapsed.

use crate::error::{Error, Result};
use crate::parsing::token::{TokenKind, TokenStream};
use crate::types::data_type::SqlType;
use crate::types::expression::{ColumnRef, Expression};
use crate::types::value::Value;

pub struct ConditionParser<'a> {
    stream: TokenStream,
    substitutions: &'a [Value],
}

impl<'a> ConditionParser<'a> {
    pub fn new(stream: TokenStream, substitutions: &'a [Value]) -> Self {
        ConditionParser {
            stream,
            substitutions,
        }
    }

    pub fn from_source(source: &str, substitutions: &'a [Value]) -> Result<Self> {
        Ok(ConditionParser::new(
            TokenStream::from_source(source)?,
            substitutions,
        ))
    }

    /// True if every token has been consumed.
    pub fn at_end(&self) -> bool {
        self.stream.is_empty()
    }

    /// Parses a full condition: OR over AND over comparisons.
    pub fn parse_condition(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        while self.stream.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_term()?;
        while self.stream.eat_keyword("AND") {
            let right = self.parse_term()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expression> {
        // Prefix NOT over a whole term
        if self.stream.eat_keyword("NOT") {
            let inner = self.parse_term()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        let left = self.parse_value()?;
        self.parse_operator_tail(left)
    }

    /// Parses the operator position after a left operand, if present.
    /// Each NOT here toggles negation and may repeat.
    fn parse_operator_tail(&mut self, left: Expression) -> Result<Expression> {
        let mut negated = false;
        while self.stream.eat_keyword("NOT") {
            negated = !negated;
        }

        if self.stream.eat_keyword("BETWEEN") {
            let low = self.parse_value()?;
            let line = self.stream.line();
            if !self.stream.eat_keyword("AND") {
                return Err(Error::parse_at("expected AND in BETWEEN", line));
            }
            let high = self.parse_value()?;
            return Ok(Expression::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }
        if self.stream.eat_keyword("IN") {
            let list = self.parse_value_list()?;
            return Ok(Expression::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }
        if self.stream.eat_keyword("LIKE") {
            let pattern = self.parse_value()?;
            return Ok(Expression::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            });
        }
        if self.stream.eat_keyword("IS") {
            let mut is_negated = self.stream.eat_keyword("NOT");
            if negated {
                is_negated = !is_negated;
            }
            let line = self.stream.line();
            if !self.stream.eat_keyword("NULL") {
                return Err(Error::parse_at("expected NULL after IS", line));
            }
            return Ok(Expression::IsNull {
                expr: Box::new(left),
                negated: is_negated,
            });
        }

        let op = match self.stream.peek() {
            Some(t) => match &t.kind {
                TokenKind::Operator(op)
                    if matches!(op.as_str(), ">" | "<" | ">=" | "<=" | "=" | "==" | "!=" | "<>") =>
                {
                    op.clone()
                }
                _ => {
                    if negated {
                        let line = self.stream.line();
                        return Err(Error::parse_at(
                            "NOT must be followed by a relational operator, BETWEEN, IN or LIKE",
                            line,
                        ));
                    }
                    return Ok(left);
                }
            },
            None => {
                if negated {
                    return Err(Error::parse_at(
                        "NOT must be followed by a relational operator, BETWEEN, IN or LIKE",
                        self.stream.line(),
                    ));
                }
                return Ok(left);
            }
        };
        self.stream.next();
        let right = self.parse_value()?;
        let (l, r) = (Box::new(left), Box::new(right));
        let cmp = match op.as_str() {
            ">" => Expression::GreaterThan(l, r),
            "<" => Expression::LessThan(l, r),
            ">=" => Expression::GreaterThanOrEqual(l, r),
            "<=" => Expression::LessThanOrEqual(l, r),
            "=" | "==" => Expression::Equal(l, r),
            "!=" | "<>" => Expression::NotEqual(l, r),
            _ => unreachable!(),
        };
        Ok(if negated {
            Expression::Not(Box::new(cmp))
        } else {
            cmp
        })
    }

    /// Parses one value expression: arithmetic over primaries.
    pub fn parse_value(&mut self) -> Result<Expression> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.stream.peek() {
                Some(t) => match &t.kind {
                    TokenKind::Operator(op) if op == "+" || op == "-" => op.clone(),
                    _ => break,
                },
                None => break,
            };
            self.stream.next();
            let right = self.parse_product()?;
            left = if op == "+" {
                Expression::Add(Box::new(left), Box::new(right))
            } else {
                Expression::Subtract(Box::new(left), Box::new(right))
            };
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expression> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.stream.peek() {
                Some(t) => match &t.kind {
                    TokenKind::Operator(op) if op == "*" || op == "/" => op.clone(),
                    _ => break,
                },
                None => break,
            };
            self.stream.next();
            let right = self.parse_primary()?;
            left = if op == "*" {
                Expression::Multiply(Box::new(left), Box::new(right))
            } else {
                Expression::Divide(Box::new(left), Box::new(right))
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let line = self.stream.line();
        let token = self
            .stream
            .next()
            .ok_or_else(|| Error::parse_at("expected a value, found end of input", line))?;
        match token.kind {
            TokenKind::Str(s) => Ok(Expression::Constant(Value::Str(s))),
            // Numeric literals evaluate through f64 when they do not fit a
            // 64-bit integer; very large literals lose precision there.
            TokenKind::Number(n) => {
                if !n.contains('.') && !n.contains('e') && !n.contains('E') {
                    if let Ok(i) = n.parse::<i64>() {
                        return Ok(Expression::Constant(Value::Integer(i)));
                    }
                }
                let f = n
                    .parse::<f64>()
                    .map_err(|_| Error::parse_at(format!("invalid number '{}'", n), token.line))?;
                Ok(Expression::Constant(Value::Double(f)))
            }
            TokenKind::Substitution(index) => {
                if index >= self.substitutions.len() {
                    return Err(Error::parse_at(
                        format!(
                            "substitution %{} out of range ({} values supplied)",
                            index,
                            self.substitutions.len()
                        ),
                        token.line,
                    ));
                }
                Ok(Expression::Constant(self.substitutions[index].clone()))
            }
            TokenKind::Operator(op) if op == "-" => {
                let inner = self.parse_primary()?;
                Ok(Expression::Negate(Box::new(inner)))
            }
            TokenKind::Symbol('(') => {
                let inner = self.parse_condition()?;
                self.stream.expect_symbol(')', "parenthesized expression")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if name.eq_ignore_ascii_case("TRUE") {
                    return Ok(Expression::Constant(Value::Bool(true)));
                }
                if name.eq_ignore_ascii_case("FALSE") {
                    return Ok(Expression::Constant(Value::Bool(false)));
                }
                if name.eq_ignore_ascii_case("NULL") {
                    return Ok(Expression::Constant(Value::Null));
                }
                // Aggregate-style call
                if matches!(self.stream.peek(), Some(t) if t.kind == TokenKind::Symbol('(')) {
                    return self.parse_call_arguments(name);
                }
                // Possibly qualified column: a, t.a, s.t.a
                let mut parts = vec![name];
                while self.stream.eat_symbol('.') {
                    parts.push(self.stream.expect_ident("column reference")?);
                }
                let mut parts = parts.into_iter();
                let column = match (parts.next(), parts.next(), parts.next(), parts.next()) {
                    (Some(column), None, _, _) => ColumnRef::bare(column),
                    (Some(table), Some(column), None, _) => ColumnRef::qualified(table, column),
                    (Some(schema), Some(table), Some(column), None) => ColumnRef {
                        schema: Some(schema),
                        table: Some(table),
                        column,
                    },
                    _ => {
                        return Err(Error::parse_at(
                            "too many qualifiers in column reference",
                            token.line,
                        ));
                    }
                };
                Ok(Expression::Column(column))
            }
            other => Err(Error::parse_at(
                format!("expected a value, found '{}'", other),
                token.line,
            )),
        }
    }

    /// Parses a single-argument function call after its name; aggregate
    /// calls in this dialect take exactly one argument (or `*` for COUNT).
    fn parse_call_arguments(&mut self, name: String) -> Result<Expression> {
        self.stream.expect_symbol('(', "function call")?;
        // COUNT(*) counts rows
        if matches!(self.stream.peek(), Some(t) if t.kind == TokenKind::Operator("*".into())) {
            self.stream.next();
            self.stream.expect_symbol(')', "function call")?;
            return Ok(Expression::Function(name, vec![]));
        }
        let arg = self.parse_value()?;
        if self.stream.eat_symbol(',') {
            return Err(Error::parse_at(
                format!("function {} takes a single argument", name),
                self.stream.line(),
            ));
        }
        self.stream.expect_symbol(')', "function call")?;
        Ok(Expression::Function(name, vec![arg]))
    }

    /// Parses a parenthesized, comma-delimited value array.
    pub fn parse_value_list(&mut self) -> Result<Vec<Expression>> {
        self.stream.expect_symbol('(', "value list")?;
        let mut values = Vec::new();
        if self.stream.eat_symbol(')') {
            return Ok(values);
        }
        loop {
            values.push(self.parse_value()?);
            if self.stream.eat_symbol(',') {
                continue;
            }
            self.stream.expect_symbol(')', "value list")?;
            break;
        }
        Ok(values)
    }

    /// Parses a parenthesized, comma-delimited column-name list.
    pub fn parse_column_list(&mut self) -> Result<Vec<String>> {
        self.stream.expect_symbol('(', "column list")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.stream.expect_ident("column list")?);
            if self.stream.eat_symbol(',') {
                continue;
            }
            self.stream.expect_symbol(')', "column list")?;
            break;
        }
        Ok(columns)
    }

    /// Parses a parenthesized list of typed column declarations:
    /// `(name TYPE[(size[, scale])], ...)`.
    pub fn parse_column_declarations(&mut self) -> Result<Vec<(String, SqlType)>> {
        self.stream.expect_symbol('(', "column declarations")?;
        let mut decls = Vec::new();
        loop {
            let name = self.stream.expect_ident("column declaration")?;
            let type_name = self.stream.expect_ident("column declaration")?;
            let (mut size, mut scale) = (None, None);
            if self.stream.eat_symbol('(') {
                size = Some(self.parse_size_number()?);
                if self.stream.eat_symbol(',') {
                    scale = Some(self.parse_size_number()?);
                }
                self.stream.expect_symbol(')', "type size")?;
            }
            decls.push((name, SqlType::resolve(&type_name, size, scale)?));
            if self.stream.eat_symbol(',') {
                continue;
            }
            self.stream.expect_symbol(')', "column declarations")?;
            break;
        }
        Ok(decls)
    }

    fn parse_size_number(&mut self) -> Result<i64> {
        let line = self.stream.line();
        match self.stream.next() {
            Some(t) => match t.kind {
                TokenKind::Number(n) => n
                    .parse::<i64>()
                    .map_err(|_| Error::parse_at(format!("invalid size '{}'", n), t.line)),
                other => Err(Error::parse_at(
                    format!("expected size number, found '{}'", other),
                    t.line,
                )),
            },
            None => Err(Error::parse_at("expected size number", line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, subs: &[Value]) -> Result<Expression> {
        ConditionParser::from_source(source, subs)?.parse_condition()
    }

    #[test]
    fn relational_operators_parse() {
        for op in [">", "<", ">=", "<=", "=", "==", "!=", "<>"] {
            let expr = parse(&format!("a {} 5", op), &[]).unwrap();
            assert!(
                !matches!(expr, Expression::Column(_)),
                "operator {} did not parse",
                op
            );
        }
    }

    #[test]
    fn substitution_resolves_in_bounds_and_fails_out_of_range() {
        let subs = vec![Value::Str("hello".into())];
        let expr = ConditionParser::from_source("%0", &subs)
            .unwrap()
            .parse_value()
            .unwrap();
        assert_eq!(expr, Expression::Constant(Value::Str("hello".into())));

        let err = ConditionParser::from_source("%1", &subs)
            .unwrap()
            .parse_value()
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn double_negated_like_toggles_and_is_preserved() {
        let expr = parse("name NOT LIKE 'a%'", &[]).unwrap();
        assert!(matches!(expr, Expression::Like { negated: true, .. }));

        // Vacuous but legal; the two NOTs cancel.
        let expr = parse("name NOT NOT LIKE 'a%'", &[]).unwrap();
        assert!(matches!(expr, Expression::Like { negated: false, .. }));
    }

    #[test]
    fn between_and_in_with_not() {
        let expr = parse("a NOT BETWEEN 1 AND 10", &[]).unwrap();
        assert!(matches!(expr, Expression::Between { negated: true, .. }));

        let expr = parse("a IN (1, 2, 3)", &[]).unwrap();
        assert!(matches!(expr, Expression::InList { negated: false, .. }));
    }

    #[test]
    fn malformed_list_reports_line() {
        let mut parser = ConditionParser::from_source("(1, 2\n 3)", &[]).unwrap();
        let err = parser.parse_value_list().unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn column_declarations_resolve_types() {
        let mut parser =
            ConditionParser::from_source("(id INTEGER, name VARCHAR(50))", &[]).unwrap();
        let decls = parser.parse_column_declarations().unwrap();
        assert_eq!(decls[0], ("id".into(), SqlType::Integer));
        assert_eq!(decls[1], ("name".into(), SqlType::VarChar { size: 50 }));
    }

    #[test]
    fn aggregate_call_takes_one_argument() {
        let expr = ConditionParser::from_source("SUM(amount)", &[])
            .unwrap()
            .parse_value()
            .unwrap();
        assert!(matches!(expr, Expression::Function(name, args) if name == "SUM" && args.len() == 1));

        let err = ConditionParser::from_source("SUM(a, b)", &[])
            .unwrap()
            .parse_value()
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn large_integer_literal_falls_back_to_double() {
        let expr = ConditionParser::from_source("99999999999999999999999", &[])
            .unwrap()
            .parse_value()
            .unwrap();
        assert!(matches!(expr, Expression::Constant(Value::Double(_))));
    }
}
