use kiln::{
    Diagnostic, DiagnosticKind, InfixParselet, Item, Lexer, Parser, StateFn, Token, lexer,
};

const A: Token = Token::new("a");
const B: Token = Token::new("b");
const OR: Token = Token::new("|");
const LPAREN: Token = Token::new("(");
const RPAREN: Token = Token::new(")");

const NUMBER: Token = Token::new("number");
const NAME: Token = Token::new("name");
const PLUS: Token = Token::new("+");
const MINUS: Token = Token::new("-");
const STAR: Token = Token::new("*");
const CARET: Token = Token::new("^");
const BANG: Token = Token::new("!");
const QUESTION: Token = Token::new("?");
const COLON: Token = Token::new(":");

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Name(String),
    Number(i64),
    Group(Box<Expr>),
    Apply(Box<Expr>, Box<Expr>),
    Prefix(char, Box<Expr>),
    Postfix(char, Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

fn name(text: &str) -> Expr {
    Expr::Name(text.to_string())
}

fn binary(op: char, left: Expr, right: Expr) -> Expr {
    Expr::Binary(op, Box::new(left), Box::new(right))
}

fn number(value: i64) -> Expr {
    Expr::Number(value)
}

fn operator(item: &Item) -> char {
    item.token.text().chars().next().unwrap_or('?')
}

fn parse_name(_: &mut Parser<Expr>, item: Item) -> Result<Expr, Diagnostic> {
    Ok(Expr::Name(item.lexeme))
}

fn parse_number(_: &mut Parser<Expr>, item: Item) -> Result<Expr, Diagnostic> {
    item.lexeme
        .parse()
        .map(Expr::Number)
        .map_err(|err| Diagnostic::parser(format!("bad number: {err}")).with_span(item.span))
}

fn parse_group(parser: &mut Parser<Expr>, _: Item) -> Result<Expr, Diagnostic> {
    let inner = parser.parse_expression(0)?;
    parser.consume(RPAREN)?;
    Ok(Expr::Group(Box::new(inner)))
}

fn parse_apply(parser: &mut Parser<Expr>, left: Expr, _: Item) -> Result<Expr, Diagnostic> {
    let argument = parse_group(parser, Item::bare(LPAREN))?;
    Ok(Expr::Apply(Box::new(left), Box::new(argument)))
}

fn parse_or(parser: &mut Parser<Expr>, left: Expr, item: Item) -> Result<Expr, Diagnostic> {
    let right = parser.parse_expression(1)?;
    Ok(binary(operator(&item), left, right))
}

fn parse_negation(parser: &mut Parser<Expr>, item: Item) -> Result<Expr, Diagnostic> {
    let operand = parser.parse_expression(PREFIX)?;
    Ok(Expr::Prefix(operator(&item), Box::new(operand)))
}

fn parse_factorial(_: &mut Parser<Expr>, left: Expr, item: Item) -> Result<Expr, Diagnostic> {
    Ok(Expr::Postfix(operator(&item), Box::new(left)))
}

fn parse_conditional(parser: &mut Parser<Expr>, left: Expr, _: Item) -> Result<Expr, Diagnostic> {
    let then_branch = parser.parse_expression(0)?;
    parser.consume(COLON)?;
    let else_branch = parser.parse_expression(CONDITIONAL - 1)?;
    Ok(Expr::Conditional(
        Box::new(left),
        Box::new(then_branch),
        Box::new(else_branch),
    ))
}

const CONDITIONAL: i32 = 1;
const SUM: i32 = 3;
const PRODUCT: i32 = 4;
const EXPONENT: i32 = 5;
const PREFIX: i32 = 6;
const POSTFIX: i32 = 7;
const CALL: i32 = 8;

/// Binary operator parselet with its own binding power.
struct BinaryOperator {
    precedence: i32,
    right_associative: bool,
}

impl InfixParselet<Expr> for BinaryOperator {
    fn parse(
        &self,
        parser: &mut Parser<Expr>,
        left: Expr,
        item: Item,
    ) -> Result<Expr, Diagnostic> {
        let binding = if self.right_associative {
            self.precedence - 1
        } else {
            self.precedence
        };
        let right = parser.parse_expression(binding)?;
        Ok(binary(operator(&item), left, right))
    }
}

fn register_binary(parser: &mut Parser<Expr>, token: Token, precedence: i32, right: bool) {
    let parselet = BinaryOperator {
        precedence,
        right_associative: right,
    };
    parser.register_infix(token, precedence, parselet);
}

fn or_grammar(parser: &mut Parser<Expr>) {
    parser.register_prefix(A, parse_name);
    parser.register_prefix(B, parse_name);
    parser.register_prefix(LPAREN, parse_group);
    parser.register_infix(OR, 1, parse_or);
    parser.register_infix(LPAREN, CALL, parse_apply);
}

fn calculator(parser: &mut Parser<Expr>) {
    parser.register_prefix(NUMBER, parse_number);
    parser.register_prefix(NAME, parse_name);
    parser.register_prefix(LPAREN, parse_group);
    parser.register_prefix(MINUS, parse_negation);
    register_binary(parser, PLUS, SUM, false);
    register_binary(parser, MINUS, SUM, false);
    register_binary(parser, STAR, PRODUCT, false);
    register_binary(parser, CARET, EXPONENT, true);
    parser.register_infix(BANG, POSTFIX, parse_factorial);
    parser.register_infix(QUESTION, CONDITIONAL, parse_conditional);
    parser.register_infix(LPAREN, CALL, parse_apply);
}

fn lex_calculator(lexer: &mut Lexer) -> Option<StateFn> {
    match lexer.next() {
        None => {
            lexer.emit(Token::EOF);
            return None;
        }
        Some(ch) if ch.is_whitespace() => {
            lexer.accept_while(char::is_whitespace);
            lexer.ignore();
        }
        Some(ch) if ch.is_ascii_digit() => {
            lexer.accept_while(|ch| ch.is_ascii_digit());
            lexer.emit(NUMBER);
        }
        Some(ch) if ch.is_alphabetic() => {
            lexer.accept_while(char::is_alphanumeric);
            lexer.emit(NAME);
        }
        Some('+') => lexer.emit(PLUS),
        Some('-') => lexer.emit(MINUS),
        Some('*') => lexer.emit(STAR),
        Some('^') => lexer.emit(CARET),
        Some('!') => lexer.emit(BANG),
        Some('?') => lexer.emit(QUESTION),
        Some(':') => lexer.emit(COLON),
        Some('(') => lexer.emit(LPAREN),
        Some(')') => lexer.emit(RPAREN),
        Some(other) => return lexer.fail(format!("unexpected character {other:?}")),
    }
    Some(StateFn(lex_calculator))
}

fn parse(source: &str) -> Result<Expr, Diagnostic> {
    let mut parser = Parser::from_items(lexer::spawn(source, StateFn(lex_calculator)));
    calculator(&mut parser);
    parser.parse()
}

fn parse_ok(source: &str) -> Expr {
    parse(source).expect("source should parse")
}

#[test]
fn parses_grouped_alternation_from_tokens() {
    let tokens = vec![A, LPAREN, A, OR, B, RPAREN, Token::EOF];
    let mut parser = Parser::new(tokens);
    or_grammar(&mut parser);

    let expression = parser.parse_expression(0).expect("tokens should parse");
    assert_eq!(
        expression,
        Expr::Apply(
            Box::new(name("a")),
            Box::new(Expr::Group(Box::new(binary('|', name("a"), name("b"))))),
        )
    );
    assert!(parser.matches(Token::EOF).expect("next token is EOF"));
}

#[test]
fn binary_operators_respect_precedence() {
    assert_eq!(
        parse_ok("1 + 2 * 3"),
        binary('+', number(1), binary('*', number(2), number(3)))
    );
    assert_eq!(
        parse_ok("1 * 2 + 3"),
        binary('+', binary('*', number(1), number(2)), number(3))
    );
}

#[test]
fn same_precedence_associates_left() {
    assert_eq!(
        parse_ok("1 - 2 - 3"),
        binary('-', binary('-', number(1), number(2)), number(3))
    );
}

#[test]
fn right_associative_operator_nests_right() {
    assert_eq!(
        parse_ok("2 ^ 3 ^ 4"),
        binary('^', number(2), binary('^', number(3), number(4)))
    );
}

#[test]
fn prefix_postfix_and_mixfix_operators() {
    assert_eq!(
        parse_ok("-a!"),
        Expr::Prefix('-', Box::new(Expr::Postfix('!', Box::new(name("a")))))
    );
    assert_eq!(
        parse_ok("a ? b : c ? 1 : 2"),
        Expr::Conditional(
            Box::new(name("a")),
            Box::new(name("b")),
            Box::new(Expr::Conditional(
                Box::new(name("c")),
                Box::new(number(1)),
                Box::new(number(2)),
            )),
        )
    );
    assert_eq!(
        parse_ok("f(x + 1)"),
        Expr::Apply(
            Box::new(name("f")),
            Box::new(Expr::Group(Box::new(binary('+', name("x"), number(1))))),
        )
    );
}

#[test]
fn unregistered_prefix_token_is_fatal() {
    let err = parse("1 + * 2").expect_err("`*` cannot start an expression");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("could not parse"), "{}", err.message);
    assert!(err.message.contains(r#""*""#), "{}", err.message);
}

#[test]
fn consume_mismatch_is_fatal() {
    let err = parse("(1 + 2").expect_err("missing `)`");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(
        err.message.contains(r#"expected token ")" but found EOF"#),
        "{}",
        err.message
    );
}

#[test]
fn trailing_input_is_rejected() {
    let err = parse("1 2").expect_err("two expressions");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains(r#"found "2""#), "{}", err.message);
}

#[test]
fn lexer_failure_surfaces_through_parser() {
    let err = parse("1 + $").expect_err("`$` is not in the grammar");
    assert_eq!(err.kind, DiagnosticKind::Lexer);
    assert_eq!(err.message, "unexpected character '$'");

    let err = parse("1 $").expect_err("`$` after a complete expression");
    assert_eq!(err.kind, DiagnosticKind::Lexer);
}

#[test]
fn match_is_speculative() {
    let mut parser: Parser<Expr> = Parser::new(vec![A, B]);
    assert!(!parser.matches(B).expect("no lexer errors"));
    assert_eq!(parser.look_ahead(0).token, A);
    assert!(parser.matches(A).expect("no lexer errors"));
    assert!(parser.matches(B).expect("no lexer errors"));
}

#[test]
fn lookahead_is_fifo_and_exhaustion_reads_eof() {
    let mut parser: Parser<Expr> = Parser::new(vec![A, OR, B]);
    assert_eq!(parser.look_ahead(2).token, B);
    assert_eq!(parser.look_ahead(0).token, A);
    assert_eq!(parser.look_ahead(5).token, Token::EOF);
    assert_eq!(parser.consume(A).expect("a").token, A);
    assert_eq!(parser.consume(OR).expect("|").token, OR);
    assert_eq!(parser.consume(B).expect("b").token, B);
    assert_eq!(parser.consume(Token::EOF).expect("end").token, Token::EOF);
    assert_eq!(parser.look_ahead(0).token, Token::EOF);
}

#[test]
fn precedence_is_zero_without_infix_rule() {
    let mut parser = Parser::new(vec![OR, A]);
    or_grammar(&mut parser);
    assert_eq!(parser.precedence(), 1);
    assert_eq!(parser.infix_rule(OR).map(|rule| rule.precedence()), Some(1));
    parser.consume(OR).expect("|");
    assert_eq!(parser.precedence(), 0);
    assert!(parser.infix_rule(A).is_none());
}

#[test]
fn reregistering_overwrites_handler() {
    fn parse_constant(_: &mut Parser<Expr>, _: Item) -> Result<Expr, Diagnostic> {
        Ok(number(7))
    }

    let mut parser = Parser::new(vec![A, OR, B]);
    or_grammar(&mut parser);
    parser.register_prefix(A, parse_constant);
    parser.register_infix(OR, 1, parse_factorial);

    let expression = parser.parse_expression(0).expect("tokens should parse");
    assert_eq!(expression, Expr::Postfix('|', Box::new(number(7))));
    assert_eq!(parser.look_ahead(0).token, B);
}

#[test]
fn min_precedence_stops_climbing() {
    let mut parser = Parser::new(vec![A, OR, B]);
    or_grammar(&mut parser);
    let expression = parser.parse_expression(1).expect("tokens should parse");
    assert_eq!(expression, name("a"));
    assert_eq!(parser.look_ahead(0).token, OR);
}
