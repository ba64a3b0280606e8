//! Mini-notation parser
//!
//! Parses the pattern string grammar into the same algebra everything else
//! uses: `a b c` sequences, `[..]` groups, `<..>` alternation, `,` stacks,
//! `|` per-cycle choice, `a*n`/`a/n` tempo, `a(p,s,r)` Euclidean structure,
//! `@` weights, `!` replication, `_` holds, `~` rests and `?` degradation.
//! Malformed subexpressions recover to silence and are reported as
//! diagnostics; the parser never fails outright, so live edits keep playing.

use crate::pattern::{Pattern, SourceLocation};
use crate::pattern_rand::choose_cycles;
use crate::rational::Rational;
use crate::value::{VoiceData, VoiceValue};
use std::sync::Arc;
use thiserror::Error;

/// Writes a leaf's text into an appropriate voice field; supplied by the
/// caller so the same grammar can feed `note`, `sound`, `gain` and friends.
pub type LeafModifier = Arc<dyn Fn(&str) -> VoiceData + Send + Sync>;

/// The default leaf: parse into the `value` slot.
pub fn value_leaf() -> LeafModifier {
    Arc::new(|text| VoiceData::from_value(VoiceValue::parse(text)))
}

/// A leaf writing into a named field (and mirroring into `value`).
pub fn field_leaf(field: &str) -> LeafModifier {
    let field = field.to_string();
    Arc::new(move |text| {
        let value = VoiceValue::parse(text);
        VoiceData::from_value(value.clone()).with_field(&field, value)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("unbalanced `{0}`")]
    Unbalanced(char),
    #[error("malformed euclid arguments")]
    BadEuclid,
    #[error("malformed operator argument")]
    BadOperatorArgument,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseDiagnostic {
    pub kind: ParseErrorKind,
    pub location: SourceLocation,
}

/// The parsed pattern plus everything the parser recovered from.
pub struct ParseResult {
    pub pattern: Pattern,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseResult {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Parse with the default value leaf.
pub fn parse(input: &str) -> ParseResult {
    parse_with(input, value_leaf())
}

/// Parse with a caller-supplied leaf modifier.
pub fn parse_with(input: &str, leaf: LeafModifier) -> ParseResult {
    let tokens = tokenize(input);
    let mut parser = Parser {
        tokens,
        position: 0,
        diagnostics: Vec::new(),
    };
    let ast = parser.parse_top();
    if parser.position < parser.tokens.len() {
        let tok = parser.tokens[parser.position].clone();
        parser.report(ParseErrorKind::UnexpectedToken(tok.text), tok.loc);
    }
    for d in &parser.diagnostics {
        tracing::warn!(error = %d.kind, offset = d.location.offset, "mini-notation recovered");
    }
    let pattern = lower(&ast, &leaf);
    ParseResult {
        pattern,
        diagnostics: parser.diagnostics,
    }
}

/// Convenience: just the pattern, diagnostics logged and discarded.
pub fn pattern(input: &str) -> Pattern {
    parse(input).pattern
}

// ============= Tokenizer =============

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word,
    Rest,        // ~
    Hold,        // _
    Bang,        // !
    OpenBracket, // [
    CloseBracket,
    OpenAngle, // <
    CloseAngle,
    OpenParen, // (
    CloseParen,
    Comma,
    Pipe,
    Star,
    Slash,
    At,
    Question,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    loc: SourceLocation,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '#' | '\'' | '_')
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let kind = match c {
            '~' => Some(TokenKind::Rest),
            '!' => Some(TokenKind::Bang),
            '[' => Some(TokenKind::OpenBracket),
            ']' => Some(TokenKind::CloseBracket),
            '<' => Some(TokenKind::OpenAngle),
            '>' => Some(TokenKind::CloseAngle),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            ',' => Some(TokenKind::Comma),
            '|' => Some(TokenKind::Pipe),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '@' => Some(TokenKind::At),
            '?' => Some(TokenKind::Question),
            _ => None,
        };
        if let Some(kind) = kind {
            i += 1;
            tokens.push(Token {
                kind,
                text: c.to_string(),
                loc: SourceLocation { offset: start, len: 1 },
            });
            continue;
        }
        if c == '_' && (i + 1 >= chars.len() || !is_word_char(chars[i + 1])) {
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Hold,
                text: "_".to_string(),
                loc: SourceLocation { offset: start, len: 1 },
            });
            continue;
        }
        if is_word_char(c) {
            let mut word = String::new();
            while i < chars.len() {
                let ch = chars[i];
                if is_word_char(ch) {
                    word.push(ch);
                    i += 1;
                } else if ch == ':' && i + 1 < chars.len() && is_word_char(chars[i + 1]) {
                    // Colon compounds like 0.1:0.2:0.7 stay one leaf.
                    word.push(ch);
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Word,
                text: word,
                loc: SourceLocation {
                    offset: start,
                    len: i - start,
                },
            });
            continue;
        }
        // Unknown character: skip it, the parser reports nothing playable.
        i += 1;
    }
    tokens
}

// ============= AST =============

#[derive(Debug, Clone)]
enum Ast {
    Atom { text: String, loc: SourceLocation },
    Rest,
    Sequence(Vec<Step>),
    Stack(Vec<Ast>),
    Alternate(Vec<Ast>),
    Choose(Vec<Ast>),
    Fast { child: Box<Ast>, factor: Box<Ast> },
    Slow { child: Box<Ast>, factor: Box<Ast> },
    Euclid {
        child: Box<Ast>,
        pulses: Box<Ast>,
        steps: Box<Ast>,
        rotation: Option<Box<Ast>>,
    },
    Degrade { child: Box<Ast>, amount: f64 },
}

#[derive(Debug, Clone)]
struct Step {
    ast: Ast,
    weight: f64,
}

// ============= Parser =============

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    diagnostics: Vec<ParseDiagnostic>,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn report(&mut self, kind: ParseErrorKind, loc: SourceLocation) {
        self.diagnostics.push(ParseDiagnostic {
            kind,
            location: loc,
        });
    }

    fn end_loc(&self) -> SourceLocation {
        self.tokens
            .last()
            .map(|t| t.loc)
            .unwrap_or(SourceLocation { offset: 0, len: 0 })
    }

    /// Top level: sequences joined by `,` into a stack and `|` into a
    /// per-cycle choice.
    fn parse_top(&mut self) -> Ast {
        self.parse_joined(&[])
    }

    fn parse_joined(&mut self, terminators: &[TokenKind]) -> Ast {
        let mut stacked = vec![self.parse_sequence(terminators)];
        let mut chosen: Vec<Ast> = Vec::new();
        while let Some(token) = self.current() {
            match token.kind {
                TokenKind::Comma => {
                    self.advance();
                    stacked.push(self.parse_sequence(terminators));
                }
                TokenKind::Pipe => {
                    self.advance();
                    let done = if stacked.len() == 1 {
                        stacked.pop().unwrap()
                    } else {
                        Ast::Stack(std::mem::take(&mut stacked))
                    };
                    chosen.push(done);
                    stacked = vec![self.parse_sequence(terminators)];
                }
                _ => break,
            }
        }
        let last = if stacked.len() == 1 {
            stacked.pop().unwrap()
        } else {
            Ast::Stack(stacked)
        };
        if chosen.is_empty() {
            last
        } else {
            chosen.push(last);
            Ast::Choose(chosen)
        }
    }

    fn parse_sequence(&mut self, terminators: &[TokenKind]) -> Ast {
        let mut steps: Vec<Step> = Vec::new();
        while let Some(token) = self.current() {
            if terminators.contains(&token.kind)
                || matches!(token.kind, TokenKind::Comma | TokenKind::Pipe)
            {
                break;
            }
            match token.kind {
                TokenKind::CloseBracket | TokenKind::CloseAngle | TokenKind::CloseParen => break,
                TokenKind::Hold => {
                    let tok = self.advance().unwrap();
                    match steps.last_mut() {
                        Some(step) => step.weight += 1.0,
                        None => self.report(
                            ParseErrorKind::UnexpectedToken(tok.text),
                            tok.loc,
                        ),
                    }
                }
                TokenKind::Bang => {
                    let tok = self.advance().unwrap();
                    let copies = self.optional_number().map(|n| n as usize);
                    match steps.last().cloned() {
                        Some(step) => {
                            let extra = copies.map(|n| n.saturating_sub(1)).unwrap_or(1);
                            for _ in 0..extra {
                                steps.push(step.clone());
                            }
                        }
                        None => self.report(
                            ParseErrorKind::UnexpectedToken(tok.text),
                            tok.loc,
                        ),
                    }
                }
                _ => match self.parse_element() {
                    Some(step) => steps.push(step),
                    None => break,
                },
            }
        }
        if steps.is_empty() {
            Ast::Rest
        } else if steps.len() == 1 && steps[0].weight == 1.0 {
            steps.into_iter().next().unwrap().ast
        } else {
            Ast::Sequence(steps)
        }
    }

    fn parse_element(&mut self) -> Option<Step> {
        let token = self.current()?.clone();
        let mut node = match token.kind {
            TokenKind::Word => {
                self.advance();
                Ast::Atom {
                    text: token.text.clone(),
                    loc: token.loc,
                }
            }
            TokenKind::Rest => {
                self.advance();
                Ast::Rest
            }
            TokenKind::OpenBracket => {
                self.advance();
                let inner = self.parse_joined(&[TokenKind::CloseBracket]);
                match self.current().map(|t| t.kind.clone()) {
                    Some(TokenKind::CloseBracket) => {
                        self.advance();
                        inner
                    }
                    _ => {
                        // Malformed subexpression: silence, not the partial
                        // parse.
                        self.report(ParseErrorKind::Unbalanced('['), token.loc);
                        Ast::Rest
                    }
                }
            }
            TokenKind::OpenAngle => {
                self.advance();
                let mut children = Vec::new();
                while let Some(t) = self.current() {
                    if t.kind == TokenKind::CloseAngle {
                        break;
                    }
                    match self.parse_element() {
                        Some(step) => children.push(step.ast),
                        None => break,
                    }
                }
                match self.current().map(|t| t.kind.clone()) {
                    Some(TokenKind::CloseAngle) => {
                        self.advance();
                        if children.is_empty() {
                            Ast::Rest
                        } else {
                            Ast::Alternate(children)
                        }
                    }
                    _ => {
                        self.report(ParseErrorKind::Unbalanced('<'), token.loc);
                        Ast::Rest
                    }
                }
            }
            _ => {
                // Not the start of an element; report and consume so the
                // parser always makes progress.
                self.advance();
                self.report(
                    ParseErrorKind::UnexpectedToken(token.text.clone()),
                    token.loc,
                );
                return None;
            }
        };
        let mut weight = 1.0;
        loop {
            match self.current().map(|t| t.kind.clone()) {
                Some(TokenKind::Star) => {
                    self.advance();
                    match self.parse_operator_argument() {
                        Some(arg) => {
                            node = Ast::Fast {
                                child: Box::new(node),
                                factor: Box::new(arg),
                            }
                        }
                        None => {
                            let loc = self.end_loc();
                            self.report(ParseErrorKind::BadOperatorArgument, loc);
                            node = Ast::Rest;
                        }
                    }
                }
                Some(TokenKind::Slash) => {
                    self.advance();
                    match self.parse_operator_argument() {
                        Some(arg) => {
                            node = Ast::Slow {
                                child: Box::new(node),
                                factor: Box::new(arg),
                            }
                        }
                        None => {
                            let loc = self.end_loc();
                            self.report(ParseErrorKind::BadOperatorArgument, loc);
                            node = Ast::Rest;
                        }
                    }
                }
                Some(TokenKind::At) => {
                    self.advance();
                    match self.optional_number() {
                        Some(w) if w > 0.0 => weight = w,
                        _ => {
                            let loc = self.end_loc();
                            self.report(ParseErrorKind::BadOperatorArgument, loc);
                            node = Ast::Rest;
                        }
                    }
                }
                Some(TokenKind::Question) => {
                    self.advance();
                    let amount = self.optional_number().unwrap_or(0.5);
                    node = Ast::Degrade {
                        child: Box::new(node),
                        amount,
                    };
                }
                Some(TokenKind::OpenParen) => {
                    self.advance();
                    match self.parse_euclid_arguments() {
                        Some((pulses, steps, rotation)) => {
                            node = Ast::Euclid {
                                child: Box::new(node),
                                pulses: Box::new(pulses),
                                steps: Box::new(steps),
                                rotation: rotation.map(Box::new),
                            };
                        }
                        None => {
                            // Resync past the closing paren and silence the
                            // whole element so the leftovers don't leak into
                            // the enclosing sequence.
                            let loc = self.end_loc();
                            self.report(ParseErrorKind::BadEuclid, loc);
                            self.skip_to_close_paren();
                            node = Ast::Rest;
                        }
                    }
                }
                _ => break,
            }
        }
        Some(Step { ast: node, weight })
    }

    fn parse_operator_argument(&mut self) -> Option<Ast> {
        match self.current().map(|t| t.kind.clone()) {
            Some(TokenKind::Word) | Some(TokenKind::OpenAngle) | Some(TokenKind::OpenBracket) => {
                self.parse_element().map(|step| step.ast)
            }
            _ => None,
        }
    }

    fn parse_euclid_arguments(&mut self) -> Option<(Ast, Ast, Option<Ast>)> {
        let pulses = self.parse_operator_argument()?;
        if self.current().map(|t| t.kind.clone()) != Some(TokenKind::Comma) {
            return None;
        }
        self.advance();
        let steps = self.parse_operator_argument()?;
        let rotation = if self.current().map(|t| t.kind.clone()) == Some(TokenKind::Comma) {
            self.advance();
            Some(self.parse_operator_argument()?)
        } else {
            None
        };
        if self.current().map(|t| t.kind.clone()) != Some(TokenKind::CloseParen) {
            return None;
        }
        self.advance();
        Some((pulses, steps, rotation))
    }

    /// Consume through the matching `)`, honouring nesting; stops at end of
    /// input if the paren never closes.
    fn skip_to_close_paren(&mut self) {
        let mut depth = 1usize;
        while let Some(token) = self.advance() {
            match token.kind {
                TokenKind::OpenParen => depth += 1,
                TokenKind::CloseParen => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn optional_number(&mut self) -> Option<f64> {
        let token = self.current()?;
        if token.kind != TokenKind::Word {
            return None;
        }
        let parsed = token.text.parse::<f64>().ok()?;
        self.advance();
        Some(parsed)
    }
}

// ============= Lowering =============

fn lower(ast: &Ast, leaf: &LeafModifier) -> Pattern {
    match ast {
        Ast::Atom { text, loc } => Pattern::atom_at(leaf(text), vec![*loc]),
        Ast::Rest => Pattern::rest(),
        Ast::Sequence(steps) => Pattern::sequence(
            steps
                .iter()
                .map(|s| lower(&s.ast, leaf).with_weight(s.weight))
                .collect(),
        ),
        Ast::Stack(children) => {
            Pattern::stack(children.iter().map(|c| lower(c, leaf)).collect())
        }
        Ast::Alternate(children) => {
            Pattern::slowcat(children.iter().map(|c| lower(c, leaf)).collect())
        }
        Ast::Choose(children) => {
            choose_cycles(children.iter().map(|c| lower(c, leaf)).collect())
        }
        Ast::Fast { child, factor } => {
            let child = lower(child, leaf);
            match literal_number(factor) {
                Some(k) => child.fast(Rational::approx(k)),
                None => child.fast_by(lower(factor, &value_leaf())),
            }
        }
        Ast::Slow { child, factor } => {
            let child = lower(child, leaf);
            match literal_number(factor) {
                Some(k) => child.slow(Rational::approx(k)),
                None => child.slow_by(lower(factor, &value_leaf())),
            }
        }
        Ast::Euclid {
            child,
            pulses,
            steps,
            rotation,
        } => {
            let child = lower(child, leaf);
            let literal = (
                literal_number(pulses),
                literal_number(steps),
                rotation.as_ref().map(|r| literal_number(r)),
            );
            match literal {
                (Some(p), Some(s), None) => child.euclid(p as i64, s as i64, 0),
                (Some(p), Some(s), Some(Some(r))) => child.euclid(p as i64, s as i64, r as i64),
                _ => {
                    // Patterned arguments: sample each one per cycle.
                    let pulses = lower(pulses, &value_leaf());
                    let steps = lower(steps, &value_leaf());
                    let rotation = rotation
                        .as_ref()
                        .map(|r| lower(r, &value_leaf()))
                        .unwrap_or_else(|| Pattern::pure(0i64));
                    Pattern::per_cycle(move |cycle, ctx| {
                        let at = Rational::int(cycle);
                        let p = sample_int(&pulses, at, ctx).unwrap_or(1);
                        let s = sample_int(&steps, at, ctx).unwrap_or(8);
                        let r = sample_int(&rotation, at, ctx).unwrap_or(0);
                        child.euclid(p, s, r)
                    })
                }
            }
        }
        Ast::Degrade { child, amount } => lower(child, leaf).degrade_by(*amount),
    }
}

fn sample_int(
    pattern: &Pattern,
    at: Rational,
    ctx: &crate::context::QueryContext,
) -> Option<i64> {
    pattern.sample_at(at, ctx).and_then(|e| e.value().as_i64())
}

fn literal_number(ast: &Ast) -> Option<f64> {
    match ast {
        Ast::Atom { text, .. } => text.parse::<f64>().ok(),
        _ => None,
    }
}
