pub mod classification_service;
pub mod extraction_service;
pub mod frame_publish;

pub use classification_service::ClassificationService;
pub use extraction_service::ExtractionService;
pub use frame_publish::FramePublishingService;
