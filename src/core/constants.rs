//! Shared constants used across the application

/// In-band separator between the main feedback text and the follow-up
/// question list carried over one text stream.
pub const QUESTIONS_MARKER: &str = "%%%QUESTIONS%%%";

/// Shown in place of the feedback when the primary stream fails.
pub const FEEDBACK_ERROR_MESSAGE: &str =
    "피드백을 생성하는 중 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.";

/// Appended after a partial follow-up answer when its stream fails.
pub const FOLLOW_UP_ERROR_MESSAGE: &str =
    "\n\n답변을 생성하는 중 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.";

/// Shown as the assistant turn when a mentor chat stream fails.
pub const MENTOR_ERROR_MESSAGE: &str =
    "죄송합니다. 응답을 생성하는 중 오류가 발생했습니다. 다시 시도해 주세요.";

/// Minimum percentage of correct answers for a quiz or category to pass.
pub const QUIZ_PASSING_PERCENT: usize = 80;

/// Role instruction seeding every mentor conversation.
pub const MENTOR_INSTRUCTION: &str = "당신은 신입 사원의 온보딩을 돕는 친절하고 경험 많은 사내 멘토입니다. \
항상 한국어로, 존중하는 말투로 답하세요. 답변은 간결하게 핵심부터 설명하고, \
필요하면 구체적인 예시를 들어 주세요. 회사 내부 정보를 모르는 경우 추측하지 말고 \
담당 부서에 확인하도록 안내하세요.";

/// Heading placed above a spliced follow-up answer.
pub fn follow_up_header(question: &str) -> String {
    format!("\n\n---\n\n### '{question}'에 대한 답변\n\n")
}
