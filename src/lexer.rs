use std::{
    collections::VecDeque,
    fmt,
    sync::mpsc::{self, Receiver, SyncSender},
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};

use crate::{
    diagnostics::{Diagnostic, SourceSpan},
    token::Token,
};

/// A token together with the text it was scanned from.
///
/// For [`Token::ERROR`] items the lexeme holds the failure message instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub token: Token,
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Item {
    pub fn new(token: Token, lexeme: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            token,
            lexeme: lexeme.into(),
            span,
        }
    }

    /// Item carrying the token's own text, for token-only sources.
    pub fn bare(token: Token) -> Self {
        Self::new(token, token.text(), SourceSpan::new(0, 0))
    }

    pub fn is_error(&self) -> bool {
        self.token == Token::ERROR
    }

    pub fn is_eof(&self) -> bool {
        self.token == Token::EOF
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token {
            Token::ERROR => f.write_str(&self.lexeme),
            Token::EOF => f.write_str("EOF"),
            _ if self.lexeme.chars().count() > 10 => {
                let head: String = self.lexeme.chars().take(10).collect();
                write!(f, "{head:?}...")
            }
            _ => write!(f, "{:?}", self.lexeme),
        }
    }
}

/// One state of a scanner: consumes some input, emits items, and names the
/// state to run next. `None` stops the machine.
#[derive(Clone, Copy)]
pub struct StateFn(pub fn(&mut Lexer) -> Option<StateFn>);

impl StateFn {
    pub fn run(self, lexer: &mut Lexer) -> Option<StateFn> {
        (self.0)(lexer)
    }
}

impl fmt::Debug for StateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFn({:p})", self.0 as *const ())
    }
}

/// Grammar-agnostic scanner driven by caller-supplied [`StateFn`]s.
///
/// The lexer never decides what a token is. State functions move the cursor
/// with [`next`](Lexer::next), [`backup`](Lexer::backup) and the `accept`
/// family, and publish the text between `start` and `position` with
/// [`emit`](Lexer::emit).
pub struct Lexer {
    input: String,
    start: usize,
    position: usize,
    width: usize,
    state: Option<StateFn>,
    pending: VecDeque<Item>,
    finished: bool,
}

impl Lexer {
    pub fn new(input: impl Into<String>, start: StateFn) -> Self {
        Self {
            input: input.into(),
            start: 0,
            position: 0,
            width: 0,
            state: Some(start),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Runs the state machine lazily, one state step per pull.
    pub fn into_items(self) -> Items {
        Items { lexer: self }
    }

    /// Decodes and consumes one code point, or returns `None` at the end of
    /// the input without moving.
    pub fn next(&mut self) -> Option<char> {
        match self.input[self.position..].chars().next() {
            Some(ch) => {
                self.width = ch.len_utf8();
                self.position += self.width;
                Some(ch)
            }
            None => {
                self.width = 0;
                None
            }
        }
    }

    /// Steps back over the code point returned by the last [`next`](Lexer::next).
    /// Only one step can be undone; a second call is a no-op.
    pub fn backup(&mut self) {
        self.position -= self.width;
        self.width = 0;
    }

    pub fn peek(&mut self) -> Option<char> {
        let ch = self.next();
        self.backup();
        ch
    }

    /// Consumes the next code point if it belongs to `valid`.
    pub fn accept(&mut self, valid: &str) -> bool {
        self.accept_if(|ch| valid.contains(ch))
    }

    /// Consumes a run of code points from `valid`, returning how many matched.
    pub fn accept_run(&mut self, valid: &str) -> usize {
        self.accept_while(|ch| valid.contains(ch))
    }

    pub fn accept_if(&mut self, predicate: impl FnOnce(char) -> bool) -> bool {
        match self.next() {
            Some(ch) if predicate(ch) => true,
            _ => {
                self.backup();
                false
            }
        }
    }

    pub fn accept_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> usize {
        let mut count = 0;
        while self.accept_if(&mut predicate) {
            count += 1;
        }
        count
    }

    /// Consumes `literal` if the remaining input starts with it.
    pub fn accept_prefix(&mut self, literal: &str) -> bool {
        if literal.is_empty() || !self.remaining_input().starts_with(literal) {
            return false;
        }
        self.position += literal.len();
        self.width = 0;
        true
    }

    /// Publishes the pending lexeme as an item of kind `token`.
    ///
    /// Emitting [`Token::EOF`] ends the scan once the current state returns.
    pub fn emit(&mut self, token: Token) {
        if self.finished {
            debug!("lexer: dropping {token} emitted after the final item");
            return;
        }
        let span = SourceSpan::new(self.start, self.position);
        let item = Item::new(token, &self.input[self.start..self.position], span);
        trace!("lexer: emit {token} {item}");
        self.finished = token.is_terminal();
        self.pending.push_back(item);
        self.start = self.position;
    }

    /// Drops the pending lexeme without publishing it.
    pub fn ignore(&mut self) {
        self.start = self.position;
    }

    /// Publishes an error item and stops the scan. Meant to be returned
    /// directly from a state function: `return lexer.fail("...")`.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StateFn> {
        if !self.finished {
            let span = SourceSpan::new(self.start, self.position);
            let item = Item::new(Token::ERROR, message, span);
            trace!("lexer: fail {item}");
            self.pending.push_back(item);
            self.finished = true;
        }
        None
    }

    pub fn remaining_input(&self) -> &str {
        &self.input[self.position..]
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Text consumed since the last emit or ignore.
    pub fn pending(&self) -> &str {
        &self.input[self.start..self.position]
    }

    fn step(&mut self) {
        match self.state.take() {
            Some(state) if !self.finished => {
                self.state = state.run(self);
                if self.finished {
                    self.state = None;
                }
            }
            _ => {
                // The machine stopped without saying how; close it cleanly.
                self.emit(Token::EOF);
            }
        }
    }
}

impl fmt::Debug for Lexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer")
            .field("start", &self.start)
            .field("position", &self.position)
            .field("width", &self.width)
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

/// Pull-based item sequence. Ends right after the `EOF` or `ERROR` item.
#[derive(Debug)]
pub struct Items {
    lexer: Lexer,
}

impl Iterator for Items {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        loop {
            if let Some(item) = self.lexer.pending.pop_front() {
                return Some(item);
            }
            if self.lexer.finished {
                return None;
            }
            self.lexer.step();
        }
    }
}

/// Item sequence produced by a lexer running on its own thread.
///
/// Items are handed over one at a time through a rendezvous channel, so the
/// producer never runs more than one state step ahead of the reader. Dropping
/// the scanner (or calling [`cancel`](Scanner::cancel)) stops the producer.
#[derive(Debug)]
pub struct Scanner {
    receiver: Option<Receiver<Item>>,
    handle: Option<JoinHandle<()>>,
}

/// Starts scanning `input` on a new thread, beginning in state `start`.
pub fn spawn(input: impl Into<String>, start: StateFn) -> Scanner {
    let lexer = Lexer::new(input, start);
    let (sender, receiver) = mpsc::sync_channel(0);
    let handle = thread::spawn(move || produce(lexer, sender));
    debug!("lexer: producer thread started");
    Scanner {
        receiver: Some(receiver),
        handle: Some(handle),
    }
}

fn produce(lexer: Lexer, sender: SyncSender<Item>) {
    for item in lexer.into_items() {
        if sender.send(item).is_err() {
            warn!("lexer: consumer went away, stopping producer");
            return;
        }
    }
    debug!("lexer: producer thread finished");
}

impl Scanner {
    /// Stops the producer and waits for its thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("lexer: producer thread panicked");
            } else {
                debug!("lexer: producer thread joined");
            }
        }
    }
}

impl Iterator for Scanner {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scans all of `input` on the calling thread.
///
/// The returned items end with the `EOF` item. A scanning failure becomes a
/// lexer [`Diagnostic`] spanning the text pending when the scan failed.
pub fn scan_all(input: impl Into<String>, start: StateFn) -> Result<Vec<Item>, Diagnostic> {
    let mut items = Vec::new();
    for item in Lexer::new(input, start).into_items() {
        if item.is_error() {
            return Err(Diagnostic::lexer(item.lexeme).with_span(item.span));
        }
        items.push(item);
    }
    Ok(items)
}
