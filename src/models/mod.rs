mod content;
mod intent;
mod profile;

pub use content::{
    CandidateItem, ContentType, ItemType, Language, Outcome, Recommendation,
    RecommendationResult,
};
pub use intent::{ExtractedPreferences, IntentAnalysis};
pub use profile::{
    Feedback, FeedbackEntry, FieldUpdate, Preferences, ProfileView, ReadingLevel, UserProfile,
    NEW_USER_SUMMARY, NEW_USER_THRESHOLD,
};
