//! Test script parser.
//!
//! A script is a sequence of whitespace-separated tokens. A token may be
//! quoted with `"`; inside quotes `\"` and `\\` are escapes. Tokens come in
//! request/expected-response pairs, and the token `run` followed by a
//! thread count and a repetition count executes the pairs collected since
//! the previous `run`:
//!
//! ```text
//! "transaction=create&account=1"            "Account 1 created"
//! "transaction=credit&account=1&amount=50"  "Account balance updated"
//! "transaction=status&account=1"            "Account 1: $50.00"
//! run 1 1
//! ```

use crate::error::ScriptError;
use std::path::Path;

/// A request target and the response body it must produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub request: String,
    pub expected: String,
}

/// Concurrency and repetition for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDirective {
    /// Batch size: requests dispatched at once
    pub threads: usize,
    /// How many times the whole block is replayed
    pub repetitions: usize,
}

/// Test cases collected before a `run` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cases: Vec<TestCase>,
    pub run: RunDirective,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub blocks: Vec<Block>,
    /// Cases after the last `run`; they are never executed
    pub unrun: Vec<TestCase>,
}

impl Script {
    /// Total number of requests a full run will send
    pub fn request_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| block.cases.len() * block.run.repetitions)
            .sum()
    }
}

/// Read and parse a script file.
pub async fn load(path: &Path) -> Result<Script, ScriptError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ScriptError::Read(path.to_path_buf(), e))?;
    parse(&contents)
}

/// Parse script text into blocks.
pub fn parse(input: &str) -> Result<Script, ScriptError> {
    let mut tokens = Tokens::new(input);
    let mut script = Script::default();
    let mut pending = Vec::new();

    while let Some(token) = tokens.next_token()? {
        if token == "run" {
            let threads = run_count(&mut tokens, "thread count")?;
            let repetitions = run_count(&mut tokens, "repetitions")?;
            if threads == 0 {
                return Err(ScriptError::InvalidRunDirective(
                    "thread count must be at least 1".to_string(),
                ));
            }
            script.blocks.push(Block {
                cases: std::mem::take(&mut pending),
                run: RunDirective {
                    threads,
                    repetitions,
                },
            });
        } else {
            let expected = tokens
                .next_token()?
                .ok_or_else(|| ScriptError::MissingExpected(token.clone()))?;
            pending.push(TestCase {
                request: token,
                expected,
            });
        }
    }

    script.unrun = pending;
    Ok(script)
}

fn run_count(tokens: &mut Tokens<'_>, what: &str) -> Result<usize, ScriptError> {
    let token = tokens
        .next_token()?
        .ok_or_else(|| ScriptError::InvalidRunDirective(format!("missing {what}")))?;
    token
        .parse()
        .map_err(|_| ScriptError::InvalidRunDirective(format!("bad {what}: {token:?}")))
}

struct Tokens<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        Tokens { input, pos: 0 }
    }

    fn next_token(&mut self) -> Result<Option<String>, ScriptError> {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();

        let mut chars = trimmed.char_indices();
        match chars.next() {
            None => Ok(None),
            Some((_, '"')) => {
                let start = self.pos;
                let mut token = String::new();
                let mut escaped = false;
                for (i, c) in chars {
                    if escaped {
                        token.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        self.pos += i + c.len_utf8();
                        return Ok(Some(token));
                    } else {
                        token.push(c);
                    }
                }
                Err(ScriptError::UnterminatedQuote(start))
            }
            Some(_) => {
                let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
                self.pos += end;
                Ok(Some(trimmed[..end].to_string()))
            }
        }
    }
}
