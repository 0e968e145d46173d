pub mod frame;
pub mod gesture;
pub mod keypoints;

pub use frame::{EncodedFrame, RawFrame};
pub use gesture::{GestureResult, LabelEvent, Mode, NO_GESTURE, Prediction};
pub use keypoints::{HAND_LANDMARKS, KeypointSet, Landmark, Window};
