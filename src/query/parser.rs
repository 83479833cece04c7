//! Textual query parsing
//!
//! Turns one statement of the query language into a [`Query`]:
//!
//! ```text
//! COUNT FROM t [WHERE field op value [AND ...]]
//! SELECT f1, f2 FROM t [WHERE ...]
//! DELETE FROM t [WHERE ...]
//! DUPLICATE FROM t [WHERE ...]
//! UPDATE t SET f = v [, f = v] [WHERE ...]
//! SUM|MIN|MAX|AVG f FROM t [WHERE ...]
//! INSERT INTO t (key, v1, ...)
//! NOOP
//! ```
//!
//! Keywords are case-insensitive; a trailing `;` is accepted. Field and
//! operand validation against the schema happens later at planning.

use super::{AggregateFunc, CompareOp, Predicate, Query, QueryKind};
use crate::table::Value;
use crate::{LemonError, Result};

/// Parse one statement into a query
pub fn parse_query(input: &str) -> Result<Query> {
    Parser::new(input)?.statement()
}

fn syntax(message: impl Into<String>) -> LemonError {
    LemonError::InvalidOperand(message.into())
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Result<String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| syntax("unexpected end of statement"))?;
        self.pos += 1;
        Ok(token)
    }

    fn accept(&mut self, token: &str) -> bool {
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case(token)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        let found = self.next()?;
        if found.eq_ignore_ascii_case(token) {
            Ok(())
        } else {
            Err(syntax(format!("expected \"{}\", found \"{}\"", token, found)))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        let token = self.next()?;
        if token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            Ok(token)
        } else {
            Err(syntax(format!("expected identifier, found \"{}\"", token)))
        }
    }

    fn integer(&mut self) -> Result<Value> {
        let token = self.next()?;
        token
            .parse::<Value>()
            .map_err(|_| syntax(format!("expected integer, found \"{}\"", token)))
    }

    fn statement(&mut self) -> Result<Query> {
        let keyword = self.next()?.to_ascii_uppercase();
        let query = match keyword.as_str() {
            "NOOP" => Query::new(QueryKind::Nop, ""),
            "COUNT" => self.from_where(QueryKind::Count)?,
            "DELETE" => self.from_where(QueryKind::Delete)?,
            "DUPLICATE" => self.from_where(QueryKind::Duplicate)?,
            "SELECT" => self.select()?,
            "UPDATE" => self.update()?,
            "SUM" | "MIN" | "MAX" | "AVG" => {
                // Checked against the keyword list just above
                let func = AggregateFunc::parse(&keyword)
                    .ok_or_else(|| LemonError::Internal("aggregate keyword".to_string()))?;
                self.aggregate(func)?
            }
            "INSERT" => self.insert()?,
            other => return Err(syntax(format!("unknown query \"{}\"", other))),
        };
        self.finish()?;
        Ok(query)
    }

    /// `FROM table [WHERE ...]` tail shared by COUNT/DELETE/DUPLICATE
    fn from_where(&mut self, kind: QueryKind) -> Result<Query> {
        self.expect("FROM")?;
        let table = self.identifier()?;
        let condition = self.where_clause()?;
        Ok(Query::new(kind, table).with_condition(condition))
    }

    fn select(&mut self) -> Result<Query> {
        let mut fields = vec![self.identifier()?];
        while self.accept(",") {
            fields.push(self.identifier()?);
        }
        // The key is always part of the output; a leading KEY operand is
        // the legacy spelling and carries no extra information.
        if fields[0] == "KEY" {
            fields.remove(0);
        }
        if fields.is_empty() {
            return Err(syntax("SELECT needs at least one field"));
        }
        self.expect("FROM")?;
        let table = self.identifier()?;
        let condition = self.where_clause()?;
        Ok(Query::new(QueryKind::Select { fields }, table).with_condition(condition))
    }

    fn update(&mut self) -> Result<Query> {
        let table = self.identifier()?;
        self.expect("SET")?;
        let mut assignments = Vec::new();
        loop {
            let field = self.identifier()?;
            self.expect("=")?;
            let value = self.integer()?;
            assignments.push((field, value));
            if !self.accept(",") {
                break;
            }
        }
        let condition = self.where_clause()?;
        Ok(Query::new(QueryKind::Update { assignments }, table).with_condition(condition))
    }

    fn aggregate(&mut self, func: AggregateFunc) -> Result<Query> {
        let field = self.identifier()?;
        self.expect("FROM")?;
        let table = self.identifier()?;
        let condition = self.where_clause()?;
        Ok(Query::new(QueryKind::Aggregate { func, field }, table).with_condition(condition))
    }

    fn insert(&mut self) -> Result<Query> {
        self.expect("INTO")?;
        let table = self.identifier()?;
        self.expect("(")?;
        let key = self.identifier()?;
        let mut values = Vec::new();
        while self.accept(",") {
            values.push(self.integer()?);
        }
        self.expect(")")?;
        Ok(Query::new(QueryKind::Insert { key, values }, table))
    }

    fn where_clause(&mut self) -> Result<Vec<Predicate>> {
        if !self.accept("WHERE") {
            return Ok(Vec::new());
        }
        let mut predicates = Vec::new();
        loop {
            let field = self.identifier()?;
            let op_token = self.next()?;
            let op = CompareOp::parse(&op_token)
                .ok_or_else(|| syntax(format!("unknown operator \"{}\"", op_token)))?;
            let value = self.next()?;
            predicates.push(Predicate::new(field, op, value));
            if !self.accept("AND") {
                break;
            }
        }
        Ok(predicates)
    }

    fn finish(&mut self) -> Result<()> {
        self.accept(";");
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(syntax(format!("trailing input at \"{}\"", token))),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | ';' | '=' => {
                chars.next();
                tokens.push(c.to_string());
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('>') => {
                        chars.next();
                        tokens.push("<>".to_string());
                    }
                    Some('=') => {
                        chars.next();
                        tokens.push("<=".to_string());
                    }
                    _ => tokens.push("<".to_string()),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(">=".to_string());
                } else {
                    tokens.push(">".to_string());
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(word);
            }
            other => return Err(syntax(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_noop() {
        let q = parse_query("NOOP;").unwrap();
        assert_eq!(q.kind, QueryKind::Nop);
    }

    #[test]
    fn test_parse_count_where() {
        let q = parse_query("COUNT FROM t WHERE A > 1 AND B <> 2").unwrap();
        assert_eq!(q.kind, QueryKind::Count);
        assert_eq!(q.table, "t");
        assert_eq!(
            q.condition,
            vec![
                Predicate::new("A", CompareOp::GreaterThan, "1"),
                Predicate::new("B", CompareOp::NotEqual, "2"),
            ]
        );
    }

    #[test]
    fn test_parse_select() {
        let q = parse_query("SELECT A, B FROM t WHERE KEY >= k2;").unwrap();
        assert_eq!(
            q.kind,
            QueryKind::Select {
                fields: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert_eq!(
            q.condition,
            vec![Predicate::new("KEY", CompareOp::GreaterEqual, "k2")]
        );
    }

    #[test]
    fn test_parse_select_strips_leading_key() {
        let q = parse_query("SELECT KEY, A FROM t").unwrap();
        assert_eq!(
            q.kind,
            QueryKind::Select {
                fields: vec!["A".to_string()]
            }
        );
        assert!(parse_query("SELECT KEY FROM t").is_err());
    }

    #[test]
    fn test_parse_update() {
        let q = parse_query("UPDATE t SET A = 3, B = -1 WHERE KEY = k1").unwrap();
        assert_eq!(
            q.kind,
            QueryKind::Update {
                assignments: vec![("A".to_string(), 3), ("B".to_string(), -1)]
            }
        );
    }

    #[test]
    fn test_parse_aggregates() {
        for (text, func) in [
            ("SUM A FROM t", AggregateFunc::Sum),
            ("min A from t", AggregateFunc::Min),
            ("MAX A FROM t", AggregateFunc::Max),
            ("AVG A FROM t WHERE A > 100", AggregateFunc::Avg),
        ] {
            let q = parse_query(text).unwrap();
            assert_eq!(
                q.kind,
                QueryKind::Aggregate {
                    func,
                    field: "A".to_string()
                },
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_parse_insert() {
        let q = parse_query("INSERT INTO t (k1, 1, -2)").unwrap();
        assert_eq!(
            q.kind,
            QueryKind::Insert {
                key: "k1".to_string(),
                values: vec![1, -2]
            }
        );
        // A bare key with no values is allowed; arity is checked at planning
        let q = parse_query("INSERT INTO empty (k)").unwrap();
        assert_eq!(
            q.kind,
            QueryKind::Insert {
                key: "k".to_string(),
                values: vec![]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_query("").is_err());
        assert!(parse_query("FROBNICATE t").is_err());
        assert!(parse_query("COUNT t").is_err());
        assert!(parse_query("COUNT FROM t WHERE A ! 1").is_err());
        assert!(parse_query("UPDATE t SET A = x").is_err());
        assert!(parse_query("COUNT FROM t extra").is_err());
    }
}
