//! Free-form mentor conversation on the terminal.

use std::error::Error;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::terminal::{cancel_on_interrupt, Echo, Prompter};
use crate::core::decoder::StreamOutcome;
use crate::core::generator::TextGenerator;
use crate::core::mentor::MentorSession;

const MORE_COMMAND: &str = "/more";

#[derive(Debug, PartialEq, Eq)]
enum Turn<'a> {
    Quit,
    Skip,
    Send(&'a str),
    FollowUp(&'a str),
}

fn parse_turn(input: &str) -> Turn<'_> {
    let input = input.trim();
    if input.is_empty() {
        return Turn::Skip;
    }
    if input == "/quit" || input == "/exit" {
        return Turn::Quit;
    }
    match input.strip_prefix(MORE_COMMAND) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            let question = rest.trim();
            if question.is_empty() {
                Turn::Skip
            } else {
                Turn::FollowUp(question)
            }
        }
        _ => Turn::Send(input),
    }
}

pub async fn run_chat(
    generator: Arc<dyn TextGenerator>,
    user_name: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut mentor = MentorSession::new(generator, user_name);
    let mut prompter = Prompter::new();
    let lifetime = CancellationToken::new();
    let _lifetime = lifetime.clone().drop_guard();

    println!("🧑‍🏫 멘토와 대화를 시작합니다. '{MORE_COMMAND} <질문>'으로 직전 답변에 이어 묻고, /quit 으로 종료합니다.");

    loop {
        let Some(input) = prompter.ask("\n> ").await? else {
            return Ok(());
        };

        let outcome = match parse_turn(&input) {
            Turn::Quit => return Ok(()),
            Turn::Skip => continue,
            Turn::Send(text) => {
                let stop = lifetime.child_token();
                let _interrupt = cancel_on_interrupt(&stop);
                let mut echo = Echo::default();
                mentor.send(text, &stop, |reply| echo.show(reply)).await
            }
            Turn::FollowUp(question) => {
                let stop = lifetime.child_token();
                let _interrupt = cancel_on_interrupt(&stop);
                let mut echo = Echo::resume(mentor.last_reply().unwrap_or_default());
                mentor
                    .follow_up(question, &stop, |reply| echo.show(reply))
                    .await
            }
        };
        println!();
        if outcome == StreamOutcome::Cancelled {
            println!("⏹️  중단되었습니다.");
        }
    }
}
