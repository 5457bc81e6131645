pub mod experiences;
pub mod progress;
