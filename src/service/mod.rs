//! Generation pipelines: story text and comic pages, avatars, fun facts.

pub mod avatar;
pub mod fun_facts;
pub mod story;

pub use avatar::AvatarStudio;
pub use fun_facts::{FunFact, FunFactsService};
pub use story::{GeneratedStory, StoryGenerator};
