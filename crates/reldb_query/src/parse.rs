//! Recursive-descent parser for the condition language.

use crate::ast::{CmpOp, Cond, Operand, Path};
use crate::token::{tokenize, Token, TokenKind};
use crate::{QueryError, QueryResult};

/// Parses a condition from its surface form.
pub fn parse(text: &str) -> QueryResult<Cond> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: text.len(),
        next_positional: 0,
    };
    let cond = parser.or()?;
    if let Some(token) = parser.peek() {
        return Err(QueryError::parse("trailing input", token.position));
    }
    Ok(cond)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    next_positional: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn or(&mut self) -> QueryResult<Cond> {
        let mut parts = vec![self.and()?];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::OrOr)) {
            self.bump();
            parts.push(self.and()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().expect("one part")
        } else {
            Cond::Or(parts)
        })
    }

    fn and(&mut self) -> QueryResult<Cond> {
        let mut parts = vec![self.unit()?];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::AndAnd)) {
            self.bump();
            parts.push(self.unit()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().expect("one part")
        } else {
            Cond::And(parts)
        })
    }

    fn unit(&mut self) -> QueryResult<Cond> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            self.bump();
            let inner = self.or()?;
            match self.bump() {
                Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                _ => Err(QueryError::parse("expected ')'", self.position())),
            }
        } else {
            self.cmp()
        }
    }

    fn cmp(&mut self) -> QueryResult<Cond> {
        let path = self.path()?;
        let op = self.op()?;
        let operand = self.operand()?;
        Ok(Cond::Cmp { path, op, operand })
    }

    fn path(&mut self) -> QueryResult<Path> {
        let position = self.position();
        let first = match self.bump() {
            Some(Token { kind: TokenKind::Ident(name), .. }) => name,
            _ => return Err(QueryError::parse("expected field path", position)),
        };
        let mut segments = vec![first];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
            self.bump();
            let position = self.position();
            match self.bump() {
                Some(Token { kind: TokenKind::Ident(name), .. }) => segments.push(name),
                _ => return Err(QueryError::parse("expected field after '.'", position)),
            }
        }
        Ok(Path(segments))
    }

    fn op(&mut self) -> QueryResult<CmpOp> {
        let position = self.position();
        let op = match self.bump().map(|t| t.kind) {
            Some(TokenKind::Eq) => CmpOp::Eq,
            Some(TokenKind::Ne) => CmpOp::Ne,
            Some(TokenKind::Match) => CmpOp::Contains,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Ge) => CmpOp::Ge,
            Some(TokenKind::Ident(word)) if word == "IN" => CmpOp::In,
            _ => return Err(QueryError::parse("expected comparison operator", position)),
        };
        Ok(op)
    }

    fn operand(&mut self) -> QueryResult<Operand> {
        let position = self.position();
        match self.bump().map(|t| t.kind) {
            Some(TokenKind::Placeholder) => {
                let index = self.next_positional;
                self.next_positional += 1;
                Ok(Operand::Positional(index))
            }
            Some(TokenKind::Named(name)) => Ok(Operand::Named(name)),
            Some(TokenKind::Literal(value)) => Ok(Operand::Literal(value)),
            _ => Err(QueryError::parse("expected operand", position)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reldb_value::Value;

    #[test]
    fn parses_single_comparison() {
        let cond = parse("email == 'joe@x.com'").unwrap();
        assert_eq!(
            cond,
            Cond::cmp(
                Path::field("email"),
                CmpOp::Eq,
                Operand::Literal(Value::Text("joe@x.com".into()))
            )
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let cond = parse("a == 1 || b == 2 && c == 3").unwrap();
        match cond {
            Cond::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Cond::Cmp { .. }));
                assert!(matches!(&parts[1], Cond::And(inner) if inner.len() == 2));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parens_group_or() {
        let cond = parse("(a == 1 || b == 2) && c == 3").unwrap();
        match cond {
            Cond::And(parts) => {
                assert!(matches!(&parts[0], Cond::Or(inner) if inner.len() == 2));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn positional_indices_assigned_left_to_right() {
        let cond = parse("a == ? && b == ?").unwrap();
        match cond {
            Cond::And(parts) => {
                assert!(
                    matches!(&parts[0], Cond::Cmp { operand: Operand::Positional(0), .. })
                );
                assert!(
                    matches!(&parts[1], Cond::Cmp { operand: Operand::Positional(1), .. })
                );
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parses_in_operator() {
        let cond = parse("address.state IN ?").unwrap();
        assert_eq!(
            cond,
            Cond::cmp(
                Path(vec!["address".into(), "state".into()]),
                CmpOp::In,
                Operand::Positional(0)
            )
        );
    }

    #[test]
    fn round_trip_is_idempotent() {
        for text in [
            "email == ?",
            "a == 1 && b != 'x'",
            "a == 1 && (b < 2 || c >= 3.5)",
            "roles =~ :role || #ID IN ?",
            "address.state IN ? && active == true",
        ] {
            let once = parse(text).unwrap();
            let twice = parse(&once.to_text()).unwrap();
            assert_eq!(once, twice, "round trip failed for {text:?}");
        }
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(parse("a == 1 b").is_err());
    }

    #[test]
    fn missing_operand_is_rejected() {
        assert!(parse("a ==").is_err());
    }
}
