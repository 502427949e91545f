// crates/server/src/services/mod.rs
//! Engine services: catalog, wrong words, users, tasks, settings, question
//! generation, the adaptive selection engine, and game sessions.

pub mod engine;
pub mod game;
pub mod generator;
pub mod settings;
pub mod tasks;
pub mod user;
pub mod word;
pub mod wrong_word;

pub use engine::SelectionEngine;
pub use game::GameService;
pub use generator::QuestionGeneratorService;
pub use settings::{SettingsPatch, SettingsService};
pub use tasks::TaskService;
pub use user::UserService;
pub use word::WordService;
pub use wrong_word::{WrongWordEntry, WrongWordService};
