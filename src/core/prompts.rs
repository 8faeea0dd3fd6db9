//! Prompt text sent to the text-generation provider.

use crate::core::catalog::{Choice, Exercise};
use crate::core::constants::QUESTIONS_MARKER;

fn describe_exercise(exercise: &Exercise) -> String {
    let mut text = format!(
        "시나리오: {}\n상황: {}\n선택지:\n",
        exercise.title, exercise.description
    );
    for choice in &exercise.choices {
        text.push_str(&format!("- {}\n", choice.text));
    }
    text
}

/// Streamed feedback on a choice, followed by the marker and suggested
/// follow-up questions one per line.
pub fn choice_feedback_prompt(exercise: &Exercise, choice: &Choice) -> String {
    format!(
        "{context}\n신입 사원이 고른 답: \"{choice}\"\n\n\
이 선택이 왜 적절한지 또는 어떤 점을 보완하면 좋을지 3~5문장으로 피드백해 주세요. \
피드백을 마친 뒤 줄을 바꿔 정확히 {marker} 를 출력하고, \
그 다음 줄부터 신입 사원이 이어서 물어볼 만한 질문 3개를 한 줄에 하나씩 적어 주세요. \
질문 앞에 번호나 기호를 붙이지 마세요.",
        context = describe_exercise(exercise),
        choice = choice.text,
        marker = QUESTIONS_MARKER,
    )
}

/// One-shot variant asking for the `feedback` / `followUpQuestions` object.
pub fn structured_feedback_prompt(exercise: &Exercise, choice: &Choice) -> String {
    format!(
        "{context}\n신입 사원이 고른 답: \"{choice}\"\n\n\
이 선택에 대한 피드백을 `feedback` 필드에, 이어서 물어볼 만한 질문 3개를 \
`followUpQuestions` 배열에 담은 JSON 객체로만 답해 주세요.",
        context = describe_exercise(exercise),
        choice = choice.text,
    )
}

pub fn follow_up_prompt(exercise: &Exercise, previous_feedback: &str, question: &str) -> String {
    format!(
        "{context}\n앞서 제공한 피드백:\n{previous_feedback}\n\n\
신입 사원의 추가 질문: \"{question}\"\n\n\
앞의 피드백과 중복되지 않게, 이 질문에만 간결하게 답해 주세요.",
        context = describe_exercise(exercise),
    )
}
