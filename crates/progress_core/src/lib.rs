pub mod audio;
pub mod data_uri;
pub mod domain;
pub mod gate;
pub mod ports;
pub mod prompt;
pub mod regenerate;
pub mod typing;

pub use domain::{
    AiMode, AuthSession, Conversation, Feedback, FeedbackRating, GenerationRequest, Location,
    Message, MessageStatus, NewFeedback, NewMessage, ProfileUpdate, Role, User, UserCredentials,
    UserProfile,
};
pub use ports::{
    ChatModelService, DatabaseService, DocumentSummaryService, ImageGenerationService, Mailer,
    PortError, PortResult, SpeechToTextService, TextToSpeechService, TitleGenerationService,
};
