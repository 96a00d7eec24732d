//! Search criteria filter for the catalog provider.
//!
//! Supports the flat predicate subset of the update agent's criteria
//! language: `Name=Value` / `Name!=Value` clauses joined with `AND` / `OR`,
//! with parentheses for grouping. `*` matches any value. `AND` binds tighter
//! than `OR`.

use super::{CatalogUpdate, DeploymentAction, UpdateType};
use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Eq,
    NotEq,
    And,
    Or,
    Word(String),
    Quoted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    IsInstalled,
    IsDownloaded,
    Type,
    DeploymentAction,
    UpdateId,
    RevisionNumber,
    RebootRequired,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "isinstalled" => Some(Field::IsInstalled),
            "isdownloaded" => Some(Field::IsDownloaded),
            "type" => Some(Field::Type),
            "deploymentaction" => Some(Field::DeploymentAction),
            "updateid" => Some(Field::UpdateId),
            "revisionnumber" => Some(Field::RevisionNumber),
            "rebootrequired" => Some(Field::RebootRequired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Any,
    Flag(bool),
    Type(UpdateType),
    Action(DeploymentAction),
    Text(String),
    Number(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    field: Field,
    negated: bool,
    value: Value,
}

impl Clause {
    fn matches(&self, update: &CatalogUpdate) -> bool {
        let hit = match (&self.field, &self.value) {
            (_, Value::Any) => true,
            (Field::IsInstalled, Value::Flag(b)) => update.is_installed == *b,
            (Field::IsDownloaded, Value::Flag(b)) => update.is_downloaded == *b,
            (Field::RebootRequired, Value::Flag(b)) => {
                update.installation_behavior.reboot_behavior.requires_reboot() == *b
            }
            (Field::Type, Value::Type(t)) => update.update_type == *t,
            (Field::DeploymentAction, Value::Action(a)) => update.deployment_action == *a,
            (Field::UpdateId, Value::Text(id)) => update.update_id.eq_ignore_ascii_case(id),
            (Field::RevisionNumber, Value::Number(n)) => update.revision == *n,
            _ => false,
        };
        hit != self.negated
    }
}

/// Parsed criteria expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Criteria {
    Or(Vec<Criteria>),
    And(Vec<Criteria>),
    Clause(Clause),
}

impl Criteria {
    pub fn parse(input: &str) -> ProviderResult<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ProviderError::malformed(input, "empty expression"));
        }
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(ProviderError::malformed(
                input,
                format!("unexpected token {:?}", parser.tokens[parser.pos]),
            ));
        }
        Ok(expr)
    }

    pub fn matches(&self, update: &CatalogUpdate) -> bool {
        match self {
            Criteria::Or(parts) => parts.iter().any(|p| p.matches(update)),
            Criteria::And(parts) => parts.iter().all(|p| p.matches(update)),
            Criteria::Clause(c) => c.matches(update),
        }
    }
}

fn tokenize(input: &str) -> ProviderResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(ProviderError::malformed(input, "expected '=' after '!'"));
                }
                tokens.push(Token::NotEq);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(ProviderError::malformed(input, "unterminated quoted value")),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                match word.to_ascii_uppercase().as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    _ => tokens.push(Token::Word(word)),
                }
            }
            other => {
                return Err(ProviderError::malformed(input, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '*' | '{' | '}' | '.')
}

/// Parenthesis depth accepted before a criteria string is rejected
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::malformed(self.input, reason)
    }

    fn parse_or(&mut self) -> ProviderResult<Criteria> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Criteria::Or(parts) })
    }

    fn parse_and(&mut self) -> ProviderResult<Criteria> {
        let mut parts = vec![self.parse_term()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            parts.push(self.parse_term()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Criteria::And(parts) })
    }

    fn parse_term(&mut self) -> ProviderResult<Criteria> {
        match self.next() {
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    return Err(self.error("criteria nested too deeply"));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::Word(name)) => {
                let field = Field::parse(&name)
                    .ok_or_else(|| self.error(format!("unknown property '{}'", name)))?;
                let negated = match self.next() {
                    Some(Token::Eq) => false,
                    Some(Token::NotEq) => true,
                    _ => return Err(self.error(format!("expected '=' or '!=' after '{}'", name))),
                };
                let raw = match self.next() {
                    Some(Token::Word(w)) => w,
                    Some(Token::Quoted(q)) => q,
                    _ => return Err(self.error(format!("missing value for '{}'", name))),
                };
                let value = self.parse_value(field, &raw)?;
                Ok(Criteria::Clause(Clause { field, negated, value }))
            }
            Some(tok) => Err(self.error(format!("unexpected token {:?}", tok))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_value(&self, field: Field, raw: &str) -> ProviderResult<Value> {
        if raw == "*" {
            return Ok(Value::Any);
        }
        let value = match field {
            Field::IsInstalled | Field::IsDownloaded | Field::RebootRequired => match raw {
                "0" => Some(Value::Flag(false)),
                "1" => Some(Value::Flag(true)),
                _ => None,
            },
            Field::Type => match raw.to_ascii_lowercase().as_str() {
                "software" => Some(Value::Type(UpdateType::Software)),
                "driver" => Some(Value::Type(UpdateType::Driver)),
                _ => None,
            },
            Field::DeploymentAction => match raw.to_ascii_lowercase().as_str() {
                "installation" => Some(Value::Action(DeploymentAction::Installation)),
                "uninstallation" => Some(Value::Action(DeploymentAction::Uninstallation)),
                _ => None,
            },
            Field::UpdateId => Some(Value::Text(raw.trim_matches(|c| c == '{' || c == '}').to_string())),
            Field::RevisionNumber => raw.parse().ok().map(Value::Number),
        };
        value.ok_or_else(|| self.error(format!("invalid value '{}' for {:?}", raw, field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InstallationBehavior, RebootBehavior};

    fn update(id: &str, installed: bool, kind: UpdateType) -> CatalogUpdate {
        CatalogUpdate {
            update_type: kind,
            is_installed: installed,
            ..CatalogUpdate::new(id, format!("Update {}", id))
        }
    }

    #[test]
    fn test_default_criteria() {
        let c = Criteria::parse("DeploymentAction=* AND Type='Software' AND IsInstalled=0").unwrap();
        assert!(c.matches(&update("a", false, UpdateType::Software)));
        assert!(!c.matches(&update("b", true, UpdateType::Software)));
        assert!(!c.matches(&update("c", false, UpdateType::Driver)));
    }

    #[test]
    fn test_or_and_grouping() {
        let c = Criteria::parse("IsInstalled=1 OR (Type='Driver' AND IsInstalled=0)").unwrap();
        assert!(c.matches(&update("a", true, UpdateType::Software)));
        assert!(c.matches(&update("b", false, UpdateType::Driver)));
        assert!(!c.matches(&update("c", false, UpdateType::Software)));
    }

    #[test]
    fn test_not_equal_and_case_insensitive_keywords() {
        let c = Criteria::parse("type!='driver' and isinstalled=0").unwrap();
        assert!(c.matches(&update("a", false, UpdateType::Software)));
        assert!(!c.matches(&update("b", false, UpdateType::Driver)));
    }

    #[test]
    fn test_update_id_and_reboot() {
        let mut u = update("{ABC-1}", false, UpdateType::Software);
        u.update_id = "abc-1".to_string();
        u.installation_behavior = InstallationBehavior {
            reboot_behavior: RebootBehavior::CanRequestReboot,
            can_request_user_input: false,
        };
        assert!(Criteria::parse("UpdateID='{ABC-1}'").unwrap().matches(&u));
        assert!(Criteria::parse("RebootRequired=1").unwrap().matches(&u));
    }

    #[test]
    fn test_malformed_criteria() {
        for bad in [
            "",
            "IsInstalled",
            "IsInstalled=2",
            "Colour='Blue'",
            "IsInstalled=0 AND",
            "(IsInstalled=0",
            "Type='Software",
            "IsInstalled=0 IsInstalled=1",
            "IsInstalled ! 0",
        ] {
            let err = Criteria::parse(bad).unwrap_err();
            assert!(matches!(err, ProviderError::MalformedCriteria { .. }), "accepted '{}'", bad);
        }

        let deep = format!("{}IsInstalled=0{}", "(".repeat(20_000), ")".repeat(20_000));
        let err = Criteria::parse(&deep).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedCriteria { ref reason, .. } if reason.contains("nested")));

        let nested = format!("{}IsInstalled=0{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(Criteria::parse(&nested).is_ok());
    }
}
