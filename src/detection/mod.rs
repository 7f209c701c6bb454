//! Game state detection from captured frames.

pub mod classifier;
pub mod keywords;
pub mod pixel;
pub mod result;
pub mod template;

pub use classifier::{ClassifierConfig, StateClassifier};
pub use keywords::{classify_text, KeywordConfig, KeywordGroup};
pub use pixel::{PixelConfig, PixelStats};
pub use result::{DetectionContext, DetectionSource, StateDetectionResult};
pub use template::{MatchResult, TemplateConfig, TemplateLibrary, TemplateMatcher};
