use std::{collections::VecDeque, fmt, rc::Rc};

use indexmap::IndexMap;
use log::trace;

use crate::{
    diagnostics::{Diagnostic, SourceSpan},
    lexer::Item,
    token::Token,
};

/// Parses an expression that starts with a given token.
///
/// The parselet is called with the token already consumed. Single-token
/// expressions such as names or literals consume nothing more.
pub trait PrefixParselet<E> {
    fn parse(&self, parser: &mut Parser<E>, item: Item) -> Result<E, Diagnostic>;
}

/// Parses the rest of an expression whose left-hand side is already built.
///
/// Binary operators parse their right operand with
/// [`Parser::parse_expression`]; postfix operators consume nothing more.
pub trait InfixParselet<E> {
    fn parse(&self, parser: &mut Parser<E>, left: E, item: Item) -> Result<E, Diagnostic>;
}

impl<E, F> PrefixParselet<E> for F
where
    F: Fn(&mut Parser<E>, Item) -> Result<E, Diagnostic>,
{
    fn parse(&self, parser: &mut Parser<E>, item: Item) -> Result<E, Diagnostic> {
        self(parser, item)
    }
}

impl<E, F> InfixParselet<E> for F
where
    F: Fn(&mut Parser<E>, E, Item) -> Result<E, Diagnostic>,
{
    fn parse(&self, parser: &mut Parser<E>, left: E, item: Item) -> Result<E, Diagnostic> {
        self(parser, left, item)
    }
}

/// An infix parselet with the binding power it was registered with.
pub struct InfixRule<E> {
    precedence: i32,
    parselet: Rc<dyn InfixParselet<E>>,
}

impl<E> InfixRule<E> {
    pub fn precedence(&self) -> i32 {
        self.precedence
    }
}

impl<E> Clone for InfixRule<E> {
    fn clone(&self) -> Self {
        Self {
            precedence: self.precedence,
            parselet: Rc::clone(&self.parselet),
        }
    }
}

/// Extensible precedence-climbing (Pratt) parser.
///
/// The parser knows nothing about the grammar: every token that can start an
/// expression needs a prefix parselet, and every operator token an infix
/// parselet with a precedence. Higher precedences bind tighter; `0` never
/// binds.
///
/// Infix parselets get left associativity by parsing their right operand with
/// their own precedence, and right associativity with one less.
pub struct Parser<E> {
    source: Box<dyn Iterator<Item = Item>>,
    read: VecDeque<Item>,
    last_end: usize,
    prefix: IndexMap<Token, Rc<dyn PrefixParselet<E>>>,
    infix: IndexMap<Token, InfixRule<E>>,
}

impl<E> Parser<E> {
    /// Parser over bare tokens. Each token's lexeme is its own text.
    pub fn new<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = Token>,
        I::IntoIter: 'static,
    {
        Self::from_items(tokens.into_iter().map(Item::bare))
    }

    /// Parser over scanned items, typically a lexer's output.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Item>,
        I::IntoIter: 'static,
    {
        Self {
            source: Box::new(items.into_iter()),
            read: VecDeque::new(),
            last_end: 0,
            prefix: IndexMap::new(),
            infix: IndexMap::new(),
        }
    }

    pub fn register_prefix<P>(&mut self, token: Token, parselet: P)
    where
        P: PrefixParselet<E> + 'static,
    {
        self.prefix.insert(token, Rc::new(parselet));
    }

    pub fn register_infix<P>(&mut self, token: Token, precedence: i32, parselet: P)
    where
        P: InfixParselet<E> + 'static,
    {
        let rule = InfixRule {
            precedence,
            parselet: Rc::new(parselet),
        };
        self.infix.insert(token, rule);
    }

    pub fn infix_rule(&self, token: Token) -> Option<&InfixRule<E>> {
        self.infix.get(&token)
    }

    /// Parses one complete expression and requires the input to end there.
    pub fn parse(&mut self) -> Result<E, Diagnostic> {
        let expression = self.parse_expression(0)?;
        self.consume(Token::EOF)?;
        Ok(expression)
    }

    /// Parses an expression, folding in infix operators for as long as they
    /// bind tighter than `precedence`.
    pub fn parse_expression(&mut self, precedence: i32) -> Result<E, Diagnostic> {
        let item = self.advance()?;
        let prefix = match self.prefix.get(&item.token) {
            Some(parselet) => Rc::clone(parselet),
            None => return Err(unexpected(&item)),
        };
        let mut left = prefix.parse(self, item)?;

        while precedence < self.precedence() {
            let item = self.advance()?;
            let infix = match self.infix.get(&item.token) {
                Some(rule) => Rc::clone(&rule.parselet),
                None => return Err(unexpected(&item)),
            };
            left = infix.parse(self, left, item)?;
        }

        Ok(left)
    }

    /// Consumes the next token only if it is `expected`.
    pub fn matches(&mut self, expected: Token) -> Result<bool, Diagnostic> {
        if self.look_ahead(0).token != expected {
            return Ok(false);
        }
        self.advance()?;
        Ok(true)
    }

    /// Consumes the next token, which must be `expected`.
    pub fn consume(&mut self, expected: Token) -> Result<Item, Diagnostic> {
        let next = self.look_ahead(0);
        if next.token != expected && !next.is_error() {
            return Err(Diagnostic::parser(format!(
                "expected token {:?} but found {next}",
                expected.text()
            ))
            .with_span(next.span));
        }
        self.advance()
    }

    /// Binding power of the next token's infix rule, or `0` without one.
    pub fn precedence(&mut self) -> i32 {
        let token = self.look_ahead(0).token;
        self.infix.get(&token).map_or(0, InfixRule::precedence)
    }

    /// Returns the item `distance` positions ahead without consuming anything.
    /// An exhausted source reads as an endless run of `EOF` items.
    pub fn look_ahead(&mut self, distance: usize) -> &Item {
        while self.read.len() <= distance {
            let item = self.pull();
            self.read.push_back(item);
        }
        &self.read[distance]
    }

    fn advance(&mut self) -> Result<Item, Diagnostic> {
        let item = match self.read.pop_front() {
            Some(item) => item,
            None => self.pull(),
        };
        trace!("parser: consume {} {item}", item.token);
        if item.is_error() {
            return Err(Diagnostic::lexer(item.lexeme).with_span(item.span));
        }
        Ok(item)
    }

    fn pull(&mut self) -> Item {
        match self.source.next() {
            Some(item) => {
                self.last_end = self.last_end.max(item.span.end);
                item
            }
            None => Item::new(
                Token::EOF,
                "",
                SourceSpan::new(self.last_end, self.last_end),
            ),
        }
    }
}

impl<E> fmt::Debug for Parser<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("buffered", &self.read)
            .field("prefix", &self.prefix.keys().collect::<Vec<_>>())
            .field(
                "infix",
                &self
                    .infix
                    .iter()
                    .map(|(token, rule)| (token, rule.precedence))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn unexpected(item: &Item) -> Diagnostic {
    Diagnostic::parser(format!("could not parse {item}"))
        .with_span(item.span)
        .with_note(format!("token: {}", item.token))
}
