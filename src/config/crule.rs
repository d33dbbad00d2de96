//! Connection rules (`CRuleConf`, §4.4 "Connection rules").
//!
//! A small boolean expression language over `connected(mask)` and
//! `directcon(mask)`, evaluated against the current topology.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CRuleType {
    /// Evaluated automatically before attempting an outgoing autoconnect.
    Auto,
    /// Evaluated for every connection attempt, inbound or outbound.
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CRuleConf {
    /// Server name (or mask) this rule applies to.
    pub server_mask: String,
    pub rule_type: CRuleType,
    /// The rule expression, in the small surface grammar documented on [`CRuleExpr::parse`].
    pub rule: String,
}

/// A fully-connected-peer-set query the rule expression can test against.
pub trait TopologyQuery {
    /// Is any server matching `mask` present anywhere in the spanning tree?
    fn connected(&self, mask: &str) -> bool;
    /// Is any server matching `mask` a *direct* neighbor of this node?
    fn directcon(&self, mask: &str) -> bool;
}

/// The production [`TopologyQuery`], backed by the live [`crate::directory::Directory`].
pub struct DirectoryTopology<'a> {
    pub directory: &'a crate::directory::Directory,
    pub me: &'a crate::entity::EntityId,
}

impl TopologyQuery for DirectoryTopology<'_> {
    fn connected(&self, mask: &str) -> bool {
        self.directory
            .iterate_servers()
            .any(|entity| slirc_proto::wildcard_match(mask, &entity.name))
    }

    fn directcon(&self, mask: &str) -> bool {
        self.directory.iterate_servers().any(|entity| {
            entity.upstream.as_ref() == Some(self.me) && slirc_proto::wildcard_match(mask, &entity.name)
        })
    }
}

/// `conf_eval_crule(name, mask)` (§4.4): walks `crules` for the first entry
/// whose `server_mask` matches `name` and whose `rule_type` is [`CRuleType::All`]
/// (the only trigger point this core reaches — it never attempts outbound
/// autoconnects, so `CRuleType::Auto` rules are parsed and stored but never
/// fire; see DESIGN.md), evaluates its expression against `topo`, and returns
/// that rule's text if the expression is true (meaning: refuse the
/// connection).
pub fn conf_eval_crule(crules: &[CRuleConf], topo: &dyn TopologyQuery, name: &str) -> Option<String> {
    crules
        .iter()
        .filter(|rule| rule.rule_type == CRuleType::All)
        .filter(|rule| slirc_proto::wildcard_match(&rule.server_mask, name))
        .find_map(|rule| match CRuleExpr::parse(&rule.rule) {
            Ok(expr) if expr.eval(topo) => Some(rule.rule.clone()),
            _ => None,
        })
}

#[derive(Debug, Clone)]
pub enum CRuleExpr {
    Connected(String),
    DirectConn(String),
    And(Box<CRuleExpr>, Box<CRuleExpr>),
    Or(Box<CRuleExpr>, Box<CRuleExpr>),
    Not(Box<CRuleExpr>),
}

#[derive(Debug, thiserror::Error)]
pub enum CRuleParseError {
    #[error("unexpected end of rule expression")]
    UnexpectedEnd,
    #[error("unknown function `{0}` (expected connected/directcon)")]
    UnknownFunction(String),
    #[error("malformed rule expression near `{0}`")]
    Malformed(String),
}

impl CRuleExpr {
    /// Grammar: `connected(mask)`, `directcon(mask)`, `!expr`, `expr&expr`, `expr|expr`,
    /// parenthesised for grouping. No operator precedence beyond left-to-right with `!`
    /// binding tightest; this mirrors the small surface described in §4.4.
    pub fn parse(src: &str) -> Result<Self, CRuleParseError> {
        let tokens = tokenize(src)?;
        let mut pos = 0;
        let expr = parse_or(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(CRuleParseError::Malformed(src.to_string()));
        }
        Ok(expr)
    }

    pub fn eval(&self, topo: &dyn TopologyQuery) -> bool {
        match self {
            CRuleExpr::Connected(mask) => topo.connected(mask),
            CRuleExpr::DirectConn(mask) => topo.directcon(mask),
            CRuleExpr::And(a, b) => a.eval(topo) && b.eval(topo),
            CRuleExpr::Or(a, b) => a.eval(topo) || b.eval(topo),
            CRuleExpr::Not(a) => !a.eval(topo),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

fn tokenize(src: &str) -> Result<Vec<Tok>, CRuleParseError> {
    let mut out = Vec::new();
    let mut chars = src.chars().peekable();
    // True right after consuming `ident(` for a known function name, so the
    // next token is scanned as a raw mask (which may contain `*`, `.`, `-`)
    // rather than re-tokenized as an identifier.
    let mut expect_mask = false;
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Tok::LParen);
                expect_mask = matches!(out.iter().rev().nth(1), Some(Tok::Ident(_)));
            }
            ')' => {
                chars.next();
                out.push(Tok::RParen);
                expect_mask = false;
            }
            '&' => {
                chars.next();
                out.push(Tok::And);
            }
            '|' => {
                chars.next();
                out.push(Tok::Or);
            }
            '!' => {
                chars.next();
                out.push(Tok::Not);
            }
            _ if expect_mask => {
                let mut mask = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ')' {
                        break;
                    }
                    mask.push(c);
                    chars.next();
                }
                out.push(Tok::Str(mask));
                expect_mask = false;
            }
            _ if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Tok::Ident(ident));
            }
            _ => return Err(CRuleParseError::Malformed(src.to_string())),
        }
    }
    Ok(out)
}

fn parse_or(tokens: &[Tok], pos: &mut usize) -> Result<CRuleExpr, CRuleParseError> {
    let mut lhs = parse_and(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(Tok::Or)) {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = CRuleExpr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(tokens: &[Tok], pos: &mut usize) -> Result<CRuleExpr, CRuleParseError> {
    let mut lhs = parse_unary(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(Tok::And)) {
        *pos += 1;
        let rhs = parse_unary(tokens, pos)?;
        lhs = CRuleExpr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_unary(tokens: &[Tok], pos: &mut usize) -> Result<CRuleExpr, CRuleParseError> {
    if matches!(tokens.get(*pos), Some(Tok::Not)) {
        *pos += 1;
        return Ok(CRuleExpr::Not(Box::new(parse_unary(tokens, pos)?)));
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Tok], pos: &mut usize) -> Result<CRuleExpr, CRuleParseError> {
    match tokens.get(*pos) {
        Some(Tok::LParen) => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Tok::RParen) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(CRuleParseError::UnexpectedEnd),
            }
        }
        Some(Tok::Ident(name)) => {
            let name = name.clone();
            *pos += 1;
            match tokens.get(*pos) {
                Some(Tok::LParen) => {
                    *pos += 1;
                    let arg = match tokens.get(*pos) {
                        Some(Tok::Ident(mask)) => mask.clone(),
                        Some(Tok::Str(mask)) => mask.clone(),
                        _ => return Err(CRuleParseError::Malformed(name)),
                    };
                    *pos += 1;
                    match tokens.get(*pos) {
                        Some(Tok::RParen) => *pos += 1,
                        _ => return Err(CRuleParseError::UnexpectedEnd),
                    }
                    match name.as_str() {
                        "connected" => Ok(CRuleExpr::Connected(arg)),
                        "directcon" => Ok(CRuleExpr::DirectConn(arg)),
                        other => Err(CRuleParseError::UnknownFunction(other.to_string())),
                    }
                }
                _ => Err(CRuleParseError::Malformed(name)),
            }
        }
        _ => Err(CRuleParseError::UnexpectedEnd),
    }
}
