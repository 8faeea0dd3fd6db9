//! Interactive scenario practice for one category.

use std::error::Error;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::terminal::{cancel_on_interrupt, pick_index, Echo, Prompter};
use crate::core::backend::BackendClient;
use crate::core::catalog::ExerciseCatalog;
use crate::core::decoder::StreamOutcome;
use crate::core::generator::TextGenerator;
use crate::core::practice::Practice;
use crate::core::session::{Advance, CategoryRun};

/// Where finished exercises are reported, when a backend is configured.
pub struct ProgressSink {
    pub backend: BackendClient,
    pub user_name: String,
}

pub async fn run_practice(
    generator: Arc<dyn TextGenerator>,
    catalog: &ExerciseCatalog,
    category: &str,
    structured: bool,
    progress: Option<ProgressSink>,
) -> Result<(), Box<dyn Error>> {
    let run = CategoryRun::new(catalog, category)?;
    let mut practice = Practice::new(generator, run);
    let mut prompter = Prompter::new();

    loop {
        let (position, total) = practice.run().position();
        let exercise = practice.session().exercise().clone();

        println!();
        println!("📋 [{position}/{total}] {}", exercise.title);
        println!("{}", exercise.description);
        println!();
        for (i, choice) in exercise.choices.iter().enumerate() {
            println!("  {}) {}", i + 1, choice.text);
        }

        let choice = loop {
            let Some(input) = prompter.ask("\n선택 (번호, q 종료): ").await? else {
                return Ok(());
            };
            if input.eq_ignore_ascii_case("q") {
                return Ok(());
            }
            match pick_index(&input, exercise.choices.len()) {
                Some(index) => break exercise.choices[index].id.clone(),
                None => eprintln!("⚠️  1부터 {}까지의 번호를 입력하세요.", exercise.choices.len()),
            }
        };

        println!();
        let outcome = if structured {
            let outcome = practice.choose_structured(&choice).await?;
            println!("{}", practice.session().payload().main_text);
            outcome
        } else {
            let stop = practice.stop_handle();
            let _interrupt = cancel_on_interrupt(&stop);
            let mut echo = Echo::default();
            let outcome = practice
                .choose(&choice, &stop, |payload| echo.show(&payload.main_text))
                .await?;
            println!();
            outcome
        };
        if outcome == StreamOutcome::Cancelled {
            println!("⏹️  중단되었습니다.");
        }

        if let Some(correct) = practice.session().answered_correctly() {
            println!("{}", if correct { "\n✅ 정답입니다." } else { "\n❌ 오답입니다." });
        }

        if !follow_ups(&mut practice, &mut prompter).await? {
            return Ok(());
        }

        if let Some(sink) = progress.as_ref().filter(|_| counts_as_completion(outcome)) {
            if let Err(err) = sink
                .backend
                .record_completion(&sink.user_name, &exercise.id)
                .await
            {
                warn!(error = %err, exercise = %exercise.id, "could not record completion");
            }
        }

        match practice.next()? {
            Advance::Next => continue,
            Advance::CategoryComplete(score) => {
                info!(category, correct = score.correct, total = score.total, "category finished");
                println!();
                println!(
                    "🏁 '{}' 완료: {}/{} 정답 ({}%)",
                    practice.run().category(),
                    score.correct,
                    score.total,
                    score.percent()
                );
                return Ok(());
            }
        }
    }
}

/// Only feedback that streamed to the end is reported to the backend.
fn counts_as_completion(outcome: StreamOutcome) -> bool {
    outcome == StreamOutcome::Completed
}

/// Offer the generated follow-up questions until one is asked or the user
/// moves on. `false` when input ended at the prompt.
async fn follow_ups(practice: &mut Practice, prompter: &mut Prompter) -> Result<bool, Box<dyn Error>> {
    let questions = practice.session().payload().follow_up_questions.clone();
    if !practice.session().can_pick_follow_up() || questions.is_empty() {
        return Ok(true);
    }

    println!();
    println!("💡 더 알아보기:");
    for (i, question) in questions.iter().enumerate() {
        println!("  {}) {}", i + 1, question);
    }

    let Some(input) = prompter.ask("\n질문 번호 (Enter 다음으로): ").await? else {
        return Ok(false);
    };
    let Some(index) = pick_index(&input, questions.len()) else {
        return Ok(true);
    };

    let stop = practice.stop_handle();
    let _interrupt = cancel_on_interrupt(&stop);
    let mut echo = Echo::resume(&practice.session().payload().main_text);
    practice
        .ask_follow_up(&questions[index], &stop, |payload| echo.show(&payload.main_text))
        .await?;
    println!();
    Ok(true)
}
