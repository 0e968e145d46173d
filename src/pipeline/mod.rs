pub mod annotate;
pub mod classifier;
pub mod font;
pub mod inference;
pub mod landmarks;
pub mod services;

pub use classifier::{GestureClassifier, TemplateClassifier};
pub use inference::Inference;
pub use landmarks::{LandmarkExtractor, ReplayLandmarkExtractor};
pub use services::FramePublishingService;
