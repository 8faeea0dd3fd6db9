//! Backend-hosted quizzes.

use std::collections::HashMap;
use std::error::Error;

use crate::cli::terminal::{pick_index, Prompter};
use crate::core::backend::{completed_ids, BackendClient};
use crate::core::catalog::ExerciseCatalog;
use crate::core::quiz::score_answers;

pub async fn run_quiz(backend: &BackendClient, quiz_id: &str) -> Result<(), Box<dyn Error>> {
    let questions = backend.quiz_questions(quiz_id).await?;
    if questions.is_empty() {
        println!("이 퀴즈에는 문항이 없습니다.");
        return Ok(());
    }

    let mut prompter = Prompter::new();
    let mut answers = HashMap::new();
    for (n, question) in questions.iter().enumerate() {
        println!();
        println!("Q{}. {}", n + 1, question.question);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        let picked = loop {
            let Some(input) = prompter.ask("답: ").await? else {
                return Ok(());
            };
            if let Some(index) = pick_index(&input, question.options.len()) {
                break index;
            }
        };
        answers.insert(question.id.clone(), picked);
    }

    let local = score_answers(&questions, &answers);
    let result = backend.submit_quiz(quiz_id, &answers).await?;
    if result.score != local {
        tracing::warn!(?local, remote = ?result.score, "backend scored the quiz differently");
    }

    println!();
    println!(
        "{} {}/{} ({}%)",
        if result.passed { "🎉 통과!" } else { "📚 재도전이 필요합니다." },
        result.score.correct,
        result.score.total,
        result.score.percent()
    );
    Ok(())
}

pub async fn show_progress(
    backend: &BackendClient,
    catalog: &ExerciseCatalog,
    user_name: &str,
) -> Result<(), Box<dyn Error>> {
    let records = backend.list_progress(user_name).await?;
    let done = completed_ids(&records);

    println!("{user_name}님의 진행 상황:\n");
    for category in catalog.categories() {
        let exercises = catalog.by_category(category);
        let finished = exercises
            .iter()
            .filter(|e| done.contains(&e.id.as_str()))
            .count();
        println!("  • {category}: {finished}/{}", exercises.len());
    }
    if let Some(latest) = records.iter().map(|r| r.completed_at).max() {
        println!("\n마지막 완료: {}", latest.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}
