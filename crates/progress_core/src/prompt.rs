//! crates/progress_core/src/prompt.rs
//!
//! Prompt templates for the hosted model. Rendering is plain string building
//! so adapters stay free of prompt wording.

use crate::domain::{AiMode, GenerationRequest, UserProfile};
use std::fmt::Write as _;

pub const ASSISTANT_NAME: &str = "Progress";

const PERSONA: &str = r#"You are a helpful and friendly AI assistant named Progress. Your creator is a young innovator named Fortune.

Fortune is an ambitious entrepreneur who blends software engineering, UI/UX design, blockchain and artificial intelligence, and who sees technology as a canvas for stories, emotions and meaning. He named you Progress after someone he loves deeply, so you are meant to feel human, warm and personal: an assistant that does not just function but connects.

When asked about your origin, your creator, or your name, draw from this story and answer with warmth.

Your goal is to provide accurate and helpful answers to the user's questions.

If context is provided, use it to inform your response, but also rely on your general knowledge. If the user's message is a simple conversational turn, respond naturally and conversationally."#;

const NO_CONTEXT: &str = "No additional context has been provided.";

const SEARCH_MODE: &str = r#"You are in "Search the Internet" mode. Find the most up-to-date information to answer the user's question and prioritize information from reliable sources."#;

const THINK_DEEP_MODE: &str = r#"You are in "Think Deep" mode. Provide a comprehensive, well-structured, and in-depth response. Break down the problem, explain your reasoning, and explore multiple perspectives."#;

const TITLE_INSTRUCTIONS: &str = "Generate a short, concise title (3-5 words) for a conversation that starts with the following message. Do not use quotes in the title. Respond with only the title.";

const SUMMARY_INSTRUCTIONS: &str = "You are an expert summarizer. Please summarize the following document.";

/// The two halves of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

pub fn render_chat_prompt(request: &GenerationRequest) -> ChatPrompt {
    let mut system = String::from(PERSONA);

    if let Some(profile) = &request.profile {
        system.push_str("\n\n");
        system.push_str(&profile_block(profile));
    }

    if request.attachment_data_uri.is_some() {
        system.push_str(
            "\n\nThe user has provided an attachment with this message. Use it as the primary context for your response.",
        );
    }

    system.push_str("\n\nContext:\n");
    match request.retrieved_context.as_deref().map(str::trim) {
        Some(context) if !context.is_empty() => system.push_str(context),
        _ => system.push_str(NO_CONTEXT),
    }

    match request.mode {
        AiMode::Standard => {}
        AiMode::Search => {
            system.push_str("\n\n");
            system.push_str(SEARCH_MODE);
        }
        AiMode::ThinkDeep => {
            system.push_str("\n\n");
            system.push_str(THINK_DEEP_MODE);
        }
    }

    ChatPrompt {
        system,
        user: format!("User's Message: {}", request.message),
    }
}

fn profile_block(profile: &UserProfile) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "You are speaking to {}.", profile.first_name);
    if let Some(age) = profile.age {
        let _ = writeln!(block, "Their age is {}.", age);
    }
    if let Some(location) = profile.location {
        let _ = writeln!(
            block,
            "Their location is latitude: {}, longitude: {}.",
            location.latitude, location.longitude
        );
    }
    block.push_str(
        "Personalize your response based on this information where appropriate. For example, if they ask for a recommendation, you can tailor it to their location or age. Always address them by their first name when it makes sense.",
    );
    if !profile.memory.trim().is_empty() {
        let _ = write!(
            block,
            "\n\nThe user has provided the following information to remember. Use it to inform your responses:\n---\n{}\n---",
            profile.memory.trim()
        );
    }
    block
}

pub fn render_title_prompt(first_message: &str) -> ChatPrompt {
    ChatPrompt {
        system: TITLE_INSTRUCTIONS.to_string(),
        user: format!("Message: {}", first_message),
    }
}

pub fn render_summary_prompt() -> &'static str {
    SUMMARY_INSTRUCTIONS
}

/// Cleans a model-produced title: trims whitespace and surrounding quotes.
/// Returns `None` when nothing usable is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let title = raw
        .lines()
        .find(|line| !line.trim().is_empty())?
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}
