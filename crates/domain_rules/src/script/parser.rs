//! Recursive-descent parser
//!
//! ```text
//! script     := "when" expr "then" statement (";" statement)* ";"?
//! statement  := "Claim" "." Field "=" expr | "Retract" "(" string ")"
//! expr       := and ("||" and)*
//! and        := equality ("&&" equality)*
//! equality   := comparison (("==" | "!=") comparison)*
//! comparison := additive (("<" | "<=" | ">" | ">=") additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("!" | "-") unary | primary
//! primary    := literal | "[" list "]" | "(" expr ")" | "Claim" "." Field | Function "(" args ")"
//! ```

use domain_claims::ContextField;

use super::ast::{BinaryOp, Builtin, Expr, Node, NodeId, Span, Statement, UnaryOp};
use super::error::{position, ScriptError};
use super::lexer::{Token, TokenKind};

const MAX_DEPTH: usize = 64;
/// Longest root-to-leaf path allowed in an expression tree
const MAX_HEIGHT: usize = 256;
const CONTEXT_ROOT: &str = "Claim";
const RETRACT: &str = "Retract";

/// Output of a successful parse
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub nodes: Vec<Node>,
    pub condition: NodeId,
    pub actions: Vec<Statement>,
    pub action_span: Span,
}

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    nodes: Vec<Node>,
    heights: Vec<usize>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
            nodes: Vec::new(),
            heights: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<ParsedScript, ScriptError> {
        self.expect(&TokenKind::When)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::Then)?;

        let mut actions = vec![self.statement()?];
        while self.eat(&TokenKind::Semicolon) {
            if self.peek() == &TokenKind::Eof {
                break;
            }
            actions.push(self.statement()?);
        }

        if self.peek() != &TokenKind::Eof {
            return Err(self.unexpected("';' or end of script"));
        }

        let first = actions.first().map(Statement::span).unwrap_or_default();
        let last = actions.last().map(Statement::span).unwrap_or_default();

        Ok(ParsedScript {
            nodes: self.nodes,
            condition,
            actions,
            action_span: first.to(last),
        })
    }

    fn statement(&mut self) -> Result<Statement, ScriptError> {
        let start = self.current().span;
        match self.peek().clone() {
            TokenKind::Ident(name) if name == RETRACT => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let code = match self.peek().clone() {
                    TokenKind::Str(code) if !code.trim().is_empty() => {
                        self.advance();
                        code
                    }
                    _ => return Err(self.unexpected("a rule code string")),
                };
                let end = self.expect(&TokenKind::RParen)?;
                Ok(Statement::Retract {
                    code,
                    span: start.to(end),
                })
            }
            TokenKind::Ident(name) if name == CONTEXT_ROOT => {
                let (field, _) = self.field_reference()?;
                self.expect(&TokenKind::Assign)?;
                let value = self.expression()?;
                Ok(Statement::Assign {
                    field,
                    value,
                    span: start.to(self.span_of(value)),
                })
            }
            _ => Err(self.unexpected("an assignment to Claim.<Field> or Retract(\"CODE\")")),
        }
    }

    fn expression(&mut self) -> Result<NodeId, ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::syntax(
                self.source,
                self.current().span.start,
                "expression nested too deeply",
            ));
        }
        let result = self.binary_level(0);
        self.depth -= 1;
        result
    }

    /// Operator table, loosest binding first
    fn level_ops(level: usize, kind: &TokenKind) -> Option<BinaryOp> {
        match (level, kind) {
            (0, TokenKind::OrOr) => Some(BinaryOp::Or),
            (1, TokenKind::AndAnd) => Some(BinaryOp::And),
            (2, TokenKind::EqEq) => Some(BinaryOp::Eq),
            (2, TokenKind::NotEq) => Some(BinaryOp::Ne),
            (3, TokenKind::Lt) => Some(BinaryOp::Lt),
            (3, TokenKind::Le) => Some(BinaryOp::Le),
            (3, TokenKind::Gt) => Some(BinaryOp::Gt),
            (3, TokenKind::Ge) => Some(BinaryOp::Ge),
            (4, TokenKind::Plus) => Some(BinaryOp::Add),
            (4, TokenKind::Minus) => Some(BinaryOp::Sub),
            (5, TokenKind::Star) => Some(BinaryOp::Mul),
            (5, TokenKind::Slash) => Some(BinaryOp::Div),
            (5, TokenKind::Percent) => Some(BinaryOp::Rem),
            _ => None,
        }
    }

    fn binary_level(&mut self, level: usize) -> Result<NodeId, ScriptError> {
        if level > 5 {
            return self.unary();
        }
        let mut lhs = self.binary_level(level + 1)?;
        while let Some(op) = Self::level_ops(level, self.peek()) {
            self.advance();
            let rhs = self.binary_level(level + 1)?;
            let span = self.span_of(lhs).to(self.span_of(rhs));
            lhs = self.push(Expr::Binary { op, lhs, rhs }, span)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<NodeId, ScriptError> {
        let op = match self.peek() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.primary(),
        };
        let start = self.advance().span;
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::syntax(self.source, start.start, "expression nested too deeply"));
        }
        let operand = self.unary();
        self.depth -= 1;
        let operand = operand?;
        let span = start.to(self.span_of(operand));
        self.push(Expr::Unary { op, operand }, span)
    }

    fn primary(&mut self) -> Result<NodeId, ScriptError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(v) => {
                self.advance();
                self.push(Expr::Int(v), token.span)
            }
            TokenKind::Decimal(v) => {
                self.advance();
                self.push(Expr::Decimal(v), token.span)
            }
            TokenKind::Str(s) => {
                self.advance();
                self.push(Expr::Str(s), token.span)
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                self.push(Expr::Bool(token.kind == TokenKind::True), token.span)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                let end = self.expect(&TokenKind::RParen)?;
                if let Some(node) = self.nodes.get_mut(inner.index()) {
                    node.span = token.span.to(end);
                }
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.comma_list(&TokenKind::RBracket)?;
                let end = self.expect(&TokenKind::RBracket)?;
                self.push(Expr::List(items), token.span.to(end))
            }
            TokenKind::Ident(ref name) if name == CONTEXT_ROOT => {
                let (field, span) = self.field_reference()?;
                self.push(Expr::Field(field), span)
            }
            TokenKind::Ident(ref name) => {
                let func = Builtin::from_name(name).ok_or_else(|| {
                    let (line, column) = position(self.source, token.span.start);
                    ScriptError::UnknownFunction {
                        name: name.clone(),
                        line,
                        column,
                    }
                })?;
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let args = self.comma_list(&TokenKind::RParen)?;
                let end = self.expect(&TokenKind::RParen)?;
                if !func.arities().contains(&args.len()) {
                    let expected = func
                        .arities()
                        .iter()
                        .map(|n| n.to_string())
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(ScriptError::Arity {
                        function: func.name().to_string(),
                        expected,
                        found: args.len(),
                    });
                }
                self.push(Expr::Call { func, args }, token.span.to(end))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn comma_list(&mut self, close: &TokenKind) -> Result<Vec<NodeId>, ScriptError> {
        let mut items = Vec::new();
        if self.peek() == close {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    /// Parses `Claim.<Field>` and resolves the field
    fn field_reference(&mut self) -> Result<(ContextField, Span), ScriptError> {
        let start = self.advance().span;
        self.expect(&TokenKind::Dot)?;
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                let field = ContextField::from_name(&name).ok_or_else(|| {
                    let (line, column) = position(self.source, token.span.start);
                    ScriptError::UnknownField { name, line, column }
                })?;
                Ok((field, start.to(token.span)))
            }
            _ => Err(self.unexpected("a field name")),
        }
    }

    fn push(&mut self, expr: Expr, span: Span) -> Result<NodeId, ScriptError> {
        let height = 1 + match &expr {
            Expr::Unary { operand, .. } => self.height_of(*operand),
            Expr::Binary { lhs, rhs, .. } => self.height_of(*lhs).max(self.height_of(*rhs)),
            Expr::List(items) | Expr::Call { args: items, .. } => {
                items.iter().map(|id| self.height_of(*id)).max().unwrap_or(0)
            }
            _ => 0,
        };
        if height > MAX_HEIGHT {
            return Err(ScriptError::syntax(self.source, span.start, "expression too long"));
        }
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node { expr, span });
        self.heights.push(height);
        Ok(id)
    }

    fn height_of(&self, id: NodeId) -> usize {
        self.heights.get(id.index()).copied().unwrap_or(0)
    }

    fn span_of(&self, id: NodeId) -> Span {
        self.nodes.get(id.index()).map(|n| n.span).unwrap_or_default()
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Span, ScriptError> {
        if self.peek() == kind {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn unexpected(&self, wanted: &str) -> ScriptError {
        let token = self.current();
        ScriptError::syntax(
            self.source,
            token.span.start,
            format!("expected {}, found {}", wanted, token.kind.describe()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn parse(source: &str) -> Result<ParsedScript, ScriptError> {
        Parser::new(source, tokenize(source)?).parse()
    }

    #[test]
    fn test_precedence_multiplication_binds_tighter() {
        let parsed = parse("when 1 + 2 * 3 > 6 then Retract(\"X\")").unwrap();
        let root = &parsed.nodes[parsed.condition.index()];
        let Expr::Binary { op: BinaryOp::Gt, lhs, .. } = root.expr else {
            panic!("expected comparison at root");
        };
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = parsed.nodes[lhs.index()].expr else {
            panic!("expected addition");
        };
        assert!(matches!(parsed.nodes[rhs.index()].expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_statements_and_trailing_semicolon() {
        let parsed = parse(
            "when Claim.IsEmergency then Claim.Notes = Append(Claim.Notes, \"bonus\"); Retract(\"EMERGENCY_BONUS\");",
        )
        .unwrap();
        assert_eq!(parsed.actions.len(), 2);
        assert!(matches!(&parsed.actions[1], Statement::Retract { code, .. } if code == "EMERGENCY_BONUS"));
    }

    #[test]
    fn test_unknown_field() {
        let err = parse("when Claim.Nope > 1 then Retract(\"X\")").unwrap_err();
        assert!(matches!(err, ScriptError::UnknownField { name, .. } if name == "Nope"));
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("when Avg(1, 2) > 1 then Retract(\"X\")").unwrap_err();
        assert!(matches!(err, ScriptError::UnknownFunction { name, .. } if name == "Avg"));
    }

    #[test]
    fn test_arity_checked() {
        let err = parse("when Percent(1) > 1 then Retract(\"X\")").unwrap_err();
        assert!(matches!(err, ScriptError::Arity { found: 1, .. }));
    }

    #[test]
    fn test_missing_then() {
        assert!(matches!(
            parse("when Claim.IsEmergency Claim.Notes = []"),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("when {}true{} then Retract(\"X\")", "(".repeat(200), ")".repeat(200));
        assert!(matches!(parse(&source), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn test_long_flat_chain_is_rejected() {
        let terms = vec!["1"; 5_000].join(" + ");
        let source = format!("when true then Claim.ApprovedAmount = {}", terms);
        let err = parse(&source).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { ref message, .. } if message == "expression too long"));
    }

    #[test]
    fn test_chain_within_height_limit_parses() {
        let terms = vec!["Claim.Quantity"; 200].join(" * ");
        let source = format!("when true then Claim.ApprovedAmount = {}", terms);
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn test_action_span_covers_all_statements() {
        let source = "when true then Claim.IsApproved = true; Retract(\"A\")";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.action_span.slice(source), "Claim.IsApproved = true; Retract(\"A\")");
    }
}
