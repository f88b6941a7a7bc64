pub mod chat_llm;
pub mod db;
pub mod image;
pub mod mailer;
pub mod memory;
pub mod stt;
pub mod summary_llm;
pub mod title_llm;
pub mod tts;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use image::OpenAiImageAdapter;
pub use mailer::LogMailer;
pub use memory::MemoryStore;
pub use stt::OpenAiSttAdapter;
pub use summary_llm::OpenAiSummaryAdapter;
pub use title_llm::OpenAiTitleAdapter;
pub use tts::OpenAiTtsAdapter;

use async_openai::error::OpenAIError;
use progress_core::ports::PortError;

/// Maps an OpenAI client error onto the port error taxonomy, so quota and
/// availability problems can be reported to the user specifically.
pub fn classify_openai_error(err: OpenAIError) -> PortError {
    classify_message(err.to_string())
}

fn classify_message(message: String) -> PortError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("exceeded your current quota") || lower.contains("rate limit") {
        PortError::QuotaExceeded(message)
    } else if lower.contains("503") || lower.contains("overloaded") || lower.contains("service unavailable") {
        PortError::Unavailable(message)
    } else {
        PortError::Unexpected(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_and_availability_errors_are_recognized() {
        assert!(matches!(
            classify_message("You exceeded your current quota, please check your plan".into()),
            PortError::QuotaExceeded(_)
        ));
        assert!(matches!(classify_message("status 429".into()), PortError::QuotaExceeded(_)));
        assert!(matches!(
            classify_message("The engine is currently overloaded".into()),
            PortError::Unavailable(_)
        ));
        assert!(matches!(classify_message("bad request".into()), PortError::Unexpected(_)));
    }
}
