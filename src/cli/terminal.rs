//! Line input and incremental echo for the interactive commands.

use std::future::Future;
use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

/// Prints only what changed since the last update. Streams normally grow by
/// appending; anything else (an error message replacing the text) is
/// reprinted whole on a fresh line.
#[derive(Default)]
pub struct Echo {
    shown: String,
}

impl Echo {
    /// Start from text that is already on screen.
    pub fn resume(shown: &str) -> Self {
        Self {
            shown: shown.to_string(),
        }
    }

    /// The part of `text` that still has to be written.
    pub fn delta<'t>(&self, text: &'t str) -> Delta<'t> {
        match text.strip_prefix(self.shown.as_str()) {
            Some(rest) => Delta::Append(rest),
            None => Delta::Replace(text),
        }
    }

    pub fn show(&mut self, text: &str) {
        let mut out = io::stdout();
        let written = match self.delta(text) {
            Delta::Append("") => return,
            Delta::Append(rest) => write!(out, "{rest}"),
            Delta::Replace(all) => write!(out, "\n{all}"),
        };
        let _ = written.and_then(|_| out.flush());
        self.shown.clear();
        self.shown.push_str(text);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delta<'t> {
    Append(&'t str),
    Replace(&'t str),
}

pub struct Prompter<R = BufReader<Stdin>> {
    lines: Lines<R>,
}

impl Prompter {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Prompter<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// `None` on end of input or Ctrl-C. Once a Ctrl-C listener has been
    /// installed the default SIGINT exit is gone, so every prompt listens
    /// for it itself.
    pub async fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.ask_or(prompt, tokio::signal::ctrl_c()).await
    }

    async fn ask_or<I>(&mut self, prompt: &str, interrupt: I) -> io::Result<Option<String>>
    where
        I: Future<Output = io::Result<()>>,
    {
        print!("{prompt}");
        io::stdout().flush()?;
        tokio::select! {
            line = self.lines.next_line() => Ok(line?.map(|line| line.trim().to_string())),
            interrupted = interrupt => {
                interrupted?;
                println!();
                Ok(None)
            }
        }
    }
}

/// Cancel `stop` on Ctrl-C until the returned guard is dropped.
pub fn cancel_on_interrupt(stop: &CancellationToken) -> InterruptGuard {
    let stop = stop.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });
    InterruptGuard(handle)
}

pub struct InterruptGuard(tokio::task::JoinHandle<()>);

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Parse a 1-based menu pick.
pub fn pick_index(input: &str, len: usize) -> Option<usize> {
    input
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}
