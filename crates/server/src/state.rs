// crates/server/src/state.rs
//! Shared application state for the axum server.

use crate::services::{
    GameService, QuestionGeneratorService, SelectionEngine, SettingsService, TaskService,
    UserService, WordService, WrongWordService,
};
use std::sync::Arc;
use std::time::Instant;
use zixue_core::{BlobStore, DictionaryScraper, EngineConfig, HandwritingRecognizer};
use zixue_db::Database;
use zixue_llm::AiRequestManager;

/// Shared state reachable from every route handler.
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub db: Database,
    pub ai: Arc<AiRequestManager>,
    pub recognizer: Arc<dyn HandwritingRecognizer>,
    pub words: WordService,
    pub wrong_words: WrongWordService,
    pub users: UserService,
    pub tasks: TaskService,
    pub settings: SettingsService,
    pub generator: QuestionGeneratorService,
    pub engine: SelectionEngine,
    pub games: GameService,
}

impl AppState {
    /// Wire every service around the shared pool and collaborators.
    pub fn new(
        db: Database,
        ai: Arc<AiRequestManager>,
        scraper: Arc<dyn DictionaryScraper>,
        recognizer: Arc<dyn HandwritingRecognizer>,
        blob: Arc<dyn BlobStore>,
        engine_config: EngineConfig,
    ) -> Arc<Self> {
        let words = WordService::new(db.clone(), scraper);
        let wrong_words = WrongWordService::new(db.clone(), words.clone());
        let generator = QuestionGeneratorService::new(db.clone(), Arc::clone(&ai), blob);
        let engine = SelectionEngine::new(
            db.clone(),
            words.clone(),
            wrong_words.clone(),
            generator.clone(),
            Arc::new(engine_config),
        );
        Arc::new(Self {
            start_time: Instant::now(),
            users: UserService::new(db.clone()),
            tasks: TaskService::new(db.clone()),
            settings: SettingsService::new(db.clone()),
            games: GameService::new(db.clone()),
            db,
            ai,
            recognizer,
            words,
            wrong_words,
            generator,
            engine,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
