// crates/server/src/services/engine.rs
//! The adaptive selection engine.
//!
//! Produces exactly `count` questions for a user, or fails. Six stages:
//! revision-word selection, one-round-trip question fetch, scoring and
//! stochastic good/not-good classification, good-existing collection with a
//! never-outdated cap, parallel generation for unserved words, and a
//! coin-flip fallback (retry vs recycle) with a final any-unflagged top-up.

use crate::error::{ApiError, ApiResult};
use crate::services::generator::QuestionGeneratorService;
use crate::services::word::WordService;
use crate::services::wrong_word::WrongWordService;
use futures_util::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zixue_core::{char_for_codepoint, now_ts, EngineConfig, Question, QuestionKind};
use zixue_db::{Database, Fetch, QuestionRow, SqlValue};

/// A (user, word) pair prioritized for re-asking.
#[derive(Debug, Clone)]
pub struct RevisionCandidate {
    pub word: char,
    pub word_id: i64,
    pub wrong_count: i64,
    pub last_wrong_at: i64,
    pub priority: f64,
}

/// A stored question with its quality score.
#[derive(Debug, Clone)]
struct ScoredQuestion {
    row: QuestionRow,
    score: f64,
}

/// Every fetched question for one candidate word, split by classification.
#[derive(Debug, Clone)]
struct WordBatch {
    word_id: i64,
    word: char,
    good: Vec<ScoredQuestion>,
    not_good: Vec<ScoredQuestion>,
}

/// Score a stored question into [0, 1].
///
/// `random_factor` is sampled by the caller so the function stays
/// deterministic under test.
fn question_score(
    kind: QuestionKind,
    created_at: i64,
    use_count: i64,
    correct_count: i64,
    now: i64,
    config: &EngineConfig,
    random_factor: f64,
) -> f64 {
    let age_factor = if kind.is_never_outdated() {
        // Pinned midrange factor so agelessness is not an advantage.
        (-0.5f64).exp()
    } else {
        let age_hours = ((now - created_at) as f64 / 3600.0).max(0.0);
        (-age_hours / config.age_decay_hours).exp()
    };
    let usage_factor = 1.0 - (use_count as f64 / 100.0).min(1.0);
    let accuracy_factor = if config.use_accuracy_factor {
        let accuracy = correct_count as f64 / (use_count.max(1) as f64);
        0.5 + accuracy * 0.5
    } else {
        1.0
    };
    let score =
        age_factor * 0.3 + random_factor * 0.2 + usage_factor * 0.3 + accuracy_factor * 0.2;
    score.clamp(0.0, 1.0)
}

/// Probability that a score classifies as "good":
/// `sigmoid(k * (score - threshold))`.
fn good_probability(score: f64, config: &EngineConfig) -> f64 {
    1.0 / (1.0 + (-(config.classify_sigmoid_steepness) * (score - config.goodness_threshold)).exp())
}

/// Sample `amount` candidates without replacement, priorities as weights.
/// Negative priorities are shifted to non-negative; an all-zero total falls
/// back to uniform sampling.
fn weighted_sample(
    mut candidates: Vec<RevisionCandidate>,
    amount: usize,
    rng: &mut impl Rng,
) -> Vec<RevisionCandidate> {
    if candidates.len() <= amount {
        return candidates;
    }
    let min_priority = candidates
        .iter()
        .map(|c| c.priority)
        .fold(f64::INFINITY, f64::min);
    if min_priority < 0.0 {
        for candidate in &mut candidates {
            candidate.priority -= min_priority;
        }
    }
    let total: f64 = candidates.iter().map(|c| c.priority).sum();
    if total <= 0.0 {
        let mut picked: Vec<RevisionCandidate> =
            candidates.choose_multiple(rng, amount).cloned().collect();
        picked.shuffle(rng);
        return picked;
    }
    match candidates.choose_multiple_weighted(rng, amount, |c| c.priority) {
        Ok(iter) => iter.cloned().collect(),
        Err(e) => {
            warn!(error = %e, "weighted sampling failed, falling back to uniform");
            candidates.choose_multiple(rng, amount).cloned().collect()
        }
    }
}

fn convert_row(row: &QuestionRow, submit_url: &str) -> Option<Question> {
    match row.clone().into_question(Some(submit_url)) {
        Ok(question) => Some(question),
        Err(e) => {
            error!(question_id = %row.question_id, error = %e, "stored question failed conversion");
            None
        }
    }
}

/// Stage 4: walk batches in shuffled order and take the best good question
/// from each, capping never-outdated picks. Returns the questions and the
/// word ids that were served.
fn collect_good_existing(
    batches: &[WordBatch],
    submit_url: &str,
    never_outdated_cap: usize,
    count: usize,
) -> (Vec<Question>, HashSet<i64>) {
    let mut picked = Vec::new();
    let mut used = HashSet::new();
    let mut never_outdated_taken = 0usize;

    for batch in batches {
        if picked.len() >= count {
            break;
        }
        let Some(best) = batch.good.first() else {
            continue;
        };
        let is_never_outdated = best.row.question_type.is_never_outdated();
        if is_never_outdated && never_outdated_taken >= never_outdated_cap {
            debug!(word = %batch.word, "never-outdated cap reached, skipping");
            continue;
        }
        let Some(question) = convert_row(&best.row, submit_url) else {
            continue;
        };
        picked.push(question);
        used.insert(batch.word_id);
        if is_never_outdated {
            never_outdated_taken += 1;
        }
    }
    (picked, used)
}

/// Stage-6 recycling: best not-good question for each failed word.
fn collect_recycled(
    batches: &[WordBatch],
    failed_words: &HashSet<char>,
    submit_url: &str,
    needed: usize,
) -> Vec<Question> {
    let mut recycled = Vec::new();
    for batch in batches {
        if recycled.len() >= needed {
            break;
        }
        if !failed_words.contains(&batch.word) {
            continue;
        }
        let Some(best) = batch.not_good.first() else {
            continue;
        };
        if let Some(question) = convert_row(&best.row, submit_url) {
            debug!(word = %batch.word, "recycling not-good question");
            recycled.push(question);
        }
    }
    recycled
}

#[derive(Clone)]
pub struct SelectionEngine {
    db: Database,
    words: WordService,
    wrong_words: WrongWordService,
    generator: QuestionGeneratorService,
    config: Arc<EngineConfig>,
}

impl SelectionEngine {
    pub fn new(
        db: Database,
        words: WordService,
        wrong_words: WrongWordService,
        generator: QuestionGeneratorService,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            db,
            words,
            wrong_words,
            generator,
            config,
        }
    }

    /// Produce exactly `count` questions for the user, or fail with
    /// [`ApiError::NoQuestions`].
    pub async fn select_for_user(&self, user_id: Uuid, count: usize) -> ApiResult<Vec<Question>> {
        info!(%user_id, count, "starting question selection");
        let max_fetch = self.config.max_words.min(count * 2).max(1);

        // Stage 1
        let candidates = self.revision_words(user_id, max_fetch).await?;
        if candidates.is_empty() {
            error!(%user_id, "no revision words available");
            return Err(ApiError::NoQuestions);
        }
        debug!(words = candidates.len(), "revision words selected");

        // Stage 2
        let rows_by_word = self.fetch_questions_for_words(&candidates).await?;

        // Stage 3
        let batches = self.classify(&candidates, rows_by_word);

        // Stage 4
        let submit_url = self.generator.submit_url_for(user_id);
        let (mut picked, used) = collect_good_existing(
            &batches,
            &submit_url,
            self.config.max_never_outdated,
            count,
        );
        info!(existing = picked.len(), "collected good existing questions");

        // Stage 5
        if picked.len() < count {
            let needed = count - picked.len();
            let wanted = self.pick_generation_targets(&batches, &used, needed);
            if !wanted.is_empty() {
                let generated = self.generate_and_persist(&wanted, user_id).await;
                let mut failed: Vec<(char, QuestionKind)> = Vec::new();
                for ((word, kind), question) in generated {
                    if picked.len() >= count {
                        break;
                    }
                    match question {
                        Some(q) => picked.push(q),
                        None => failed.push((word, kind)),
                    }
                }

                // Stage 6
                if picked.len() < count && !failed.is_empty() {
                    let fallback = self
                        .fallback_strategy(&batches, &failed, user_id, count - picked.len())
                        .await;
                    picked.extend(fallback);
                }
            }
        }

        // Final top-up from the whole candidate pool.
        if picked.len() < count {
            let needed = count - picked.len();
            let word_ids: Vec<i64> = batches.iter().map(|b| b.word_id).collect();
            let already: HashSet<Uuid> = picked.iter().map(|q| q.question_id).collect();
            let extra = self
                .final_fallback(&word_ids, needed, &submit_url, &already)
                .await?;
            picked.extend(extra);
        }

        if picked.is_empty() {
            error!(%user_id, "all selection fallbacks exhausted");
            return Err(ApiError::NoQuestions);
        }
        picked.truncate(count);
        info!(%user_id, returned = picked.len(), "question selection finished");
        Ok(picked)
    }

    /// Stage 1: wrong-word edges weighted by recency, count, and jitter;
    /// random catalog filler when the history is thin.
    async fn revision_words(
        &self,
        user_id: Uuid,
        max_fetch: usize,
    ) -> ApiResult<Vec<RevisionCandidate>> {
        let edges = self.wrong_words.list(user_id).await?;

        if edges.is_empty() {
            warn!(%user_id, "no wrong words recorded, using random catalog words");
            return Ok(self.random_candidates(max_fetch, &HashSet::new()).await?);
        }

        let now = now_ts();
        let normal = Normal::new(
            self.config.revision_jitter_mean,
            self.config.revision_jitter_sigma,
        );
        // The thread rng is not Send; keep it scoped away from awaits.
        let mut candidates = {
            let mut rng = rand::thread_rng();
            let mut candidates = Vec::with_capacity(edges.len());
            for edge in edges {
                let Ok(word) = char_for_codepoint(edge.word_id) else {
                    warn!(word_id = edge.word_id, "skipping non-CJK wrong-word edge");
                    continue;
                };
                let hours_since = ((now - edge.last_wrong_at) as f64 / 3600.0).max(0.0);
                let jitter = match &normal {
                    Ok(dist) => dist.sample(&mut rng),
                    Err(_) => 0.0,
                };
                let priority = hours_since * self.config.time_weight
                    + edge.wrong_count as f64 * self.config.count_weight
                    + jitter;
                candidates.push(RevisionCandidate {
                    word,
                    word_id: edge.word_id,
                    wrong_count: edge.wrong_count,
                    last_wrong_at: edge.last_wrong_at,
                    priority,
                });
            }
            candidates
        };

        if candidates.len() <= max_fetch {
            let have: HashSet<i64> = candidates.iter().map(|c| c.word_id).collect();
            let filler = self
                .random_candidates(max_fetch - candidates.len(), &have)
                .await?;
            candidates.extend(filler);
            return Ok(candidates);
        }

        candidates = weighted_sample(candidates, max_fetch, &mut rand::thread_rng());
        Ok(candidates)
    }

    async fn random_candidates(
        &self,
        count: usize,
        exclude: &HashSet<i64>,
    ) -> ApiResult<Vec<RevisionCandidate>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        // Fetch extra to survive overlap with already-picked words.
        let words = self.words.get_random((count * 2) as i64).await?;
        let now = now_ts();
        let mut picked = Vec::with_capacity(count);
        let mut seen = exclude.clone();
        for word in words {
            if picked.len() >= count {
                break;
            }
            if !seen.insert(word.word_id) {
                continue;
            }
            let Ok(c) = word.character() else { continue };
            picked.push(RevisionCandidate {
                word: c,
                word_id: word.word_id,
                wrong_count: 0,
                last_wrong_at: now,
                priority: 0.0,
            });
        }
        Ok(picked)
    }

    /// Stage 2: one lateral-join round trip, newest `K` non-flagged
    /// questions per candidate word.
    async fn fetch_questions_for_words(
        &self,
        candidates: &[RevisionCandidate],
    ) -> ApiResult<HashMap<i64, Vec<QuestionRow>>> {
        let word_ids: Vec<i64> = candidates.iter().map(|c| c.word_id).collect();
        let query = format!(
            "SELECT t_limited.* \
             FROM ( \
                 SELECT DISTINCT target_word_id \
                 FROM questions q \
                 WHERE q.target_word_id = ANY($word_ids) \
                 AND q.question_id NOT IN ( \
                     SELECT DISTINCT fq.question_id FROM flagged_questions fq \
                 ) \
             ) t_groups \
             JOIN LATERAL ( \
                 SELECT * FROM questions q_all \
                 WHERE q_all.target_word_id = t_groups.target_word_id \
                 AND q_all.question_id NOT IN ( \
                     SELECT DISTINCT fq.question_id FROM flagged_questions fq \
                 ) \
                 ORDER BY q_all.created_at DESC \
                 LIMIT {} \
             ) t_limited ON true \
             ORDER BY t_limited.target_word_id, t_limited.created_at DESC",
            self.config.max_questions_per_word
        );

        let rows = self
            .db
            .execute_complex_query(&query, &[("word_ids", SqlValue::from(word_ids))], Fetch::All)
            .await?
            .into_rows();

        let mut by_word: HashMap<i64, Vec<QuestionRow>> = HashMap::new();
        for row in rows {
            match serde_json::from_value::<QuestionRow>(row) {
                Ok(question) => by_word.entry(question.target_word_id).or_default().push(question),
                Err(e) => error!(error = %e, "skipping malformed question row"),
            }
        }
        debug!(
            words = by_word.len(),
            total = by_word.values().map(Vec::len).sum::<usize>(),
            "fetched question batches"
        );
        Ok(by_word)
    }

    /// Stage 3: shuffle batch order, score every question, and Bernoulli-
    /// classify into good/not-good.
    fn classify(
        &self,
        candidates: &[RevisionCandidate],
        mut rows_by_word: HashMap<i64, Vec<QuestionRow>>,
    ) -> Vec<WordBatch> {
        let mut rng = rand::thread_rng();
        let now = now_ts();

        let mut batches: Vec<WordBatch> = candidates
            .iter()
            .map(|candidate| {
                let rows = rows_by_word.remove(&candidate.word_id).unwrap_or_default();
                let mut scored: Vec<ScoredQuestion> = rows
                    .into_iter()
                    .map(|row| {
                        let score = question_score(
                            row.question_type,
                            row.created_at,
                            row.use_count,
                            row.correct_count,
                            now,
                            &self.config,
                            rng.gen::<f64>(),
                        );
                        ScoredQuestion { row, score }
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));

                let mut good = Vec::new();
                let mut not_good = Vec::new();
                for question in scored {
                    let p = good_probability(question.score, &self.config);
                    if rng.gen_bool(p) {
                        good.push(question);
                    } else {
                        not_good.push(question);
                    }
                }
                WordBatch {
                    word_id: candidate.word_id,
                    word: candidate.word,
                    good,
                    not_good,
                }
            })
            .collect();

        // Shuffled walk order prevents positional bias downstream.
        batches.shuffle(&mut rng);
        batches
    }

    /// Pick (word, kind) targets for Stage 5 from batches that served
    /// nothing, one uniform-random kind each.
    fn pick_generation_targets(
        &self,
        batches: &[WordBatch],
        used: &HashSet<i64>,
        needed: usize,
    ) -> Vec<(char, QuestionKind)> {
        let mut rng = rand::thread_rng();
        batches
            .iter()
            .filter(|b| !used.contains(&b.word_id))
            .take(needed)
            .map(|b| {
                let kind = *self
                    .config
                    .available_kinds
                    .choose(&mut rng)
                    .unwrap_or(&QuestionKind::CopyStroke);
                (b.word, kind)
            })
            .collect()
    }

    /// Stage 5: launch every generation concurrently, validate targets,
    /// persist all successes in one batch insert, and bind store ids.
    async fn generate_and_persist(
        &self,
        wanted: &[(char, QuestionKind)],
        user_id: Uuid,
    ) -> Vec<((char, QuestionKind), Option<Question>)> {
        info!(count = wanted.len(), "generating questions");
        let tasks = wanted.iter().map(|(word, kind)| {
            let generator = self.generator.clone();
            let (word, kind) = (*word, *kind);
            async move {
                match generator.generate(word, user_id, kind).await {
                    Ok(question) => {
                        if question.target_word == word {
                            Some(question)
                        } else {
                            warn!(
                                requested = %word,
                                produced = %question.target_word,
                                "generated question misses its target, dropping"
                            );
                            None
                        }
                    }
                    Err(e) => {
                        error!(word = %word, kind = kind.as_str(), error = %e, "generation failed");
                        None
                    }
                }
            }
        });
        let generated: Vec<Option<Question>> = join_all(tasks).await;
        self.persist_generated(wanted, generated).await
    }

    /// Best-effort single batch insert; a short result marks the whole
    /// batch failed so those slots reach Stage 6.
    async fn persist_generated(
        &self,
        wanted: &[(char, QuestionKind)],
        generated: Vec<Option<Question>>,
    ) -> Vec<((char, QuestionKind), Option<Question>)> {
        let mut pending: Vec<(usize, Question, Vec<SqlValue>)> = Vec::new();
        for (i, question) in generated.iter().enumerate() {
            if let Some(question) = question {
                let values = QuestionRow::from_question(question)
                    .and_then(|row| row.insert_values());
                match values {
                    Ok(values) => pending.push((i, question.clone(), values)),
                    Err(e) => {
                        error!(error = %e, "generated question failed row conversion");
                    }
                }
            }
        }

        let mut out: Vec<((char, QuestionKind), Option<Question>)> = wanted
            .iter()
            .map(|pair| (*pair, None))
            .collect();
        if pending.is_empty() {
            return out;
        }

        let rows: Vec<Vec<SqlValue>> = pending.iter().map(|(_, _, v)| v.clone()).collect();
        let inserted = self
            .db
            .insert_many(
                zixue_db::Table::Questions,
                &QuestionRow::INSERT_COLUMNS,
                rows,
            )
            .await;

        match inserted {
            Ok(returned) if returned.len() == pending.len() => {
                for ((slot, mut question, _), row) in pending.into_iter().zip(returned) {
                    if let Some(id) = row
                        .get("question_id")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Uuid::parse_str(s).ok())
                    {
                        question.question_id = id;
                        out[slot].1 = Some(question);
                    }
                }
            }
            Ok(returned) => {
                error!(
                    expected = pending.len(),
                    received = returned.len(),
                    "batch insert returned a short result, treating batch as failed"
                );
            }
            Err(e) => {
                error!(error = %e, "batch insert of generated questions failed");
            }
        }
        out
    }

    /// Stage 6: per coin flip either retry generation once and recycle the
    /// stragglers, or recycle first and generate only for words recycling
    /// could not serve. Either way a (word, kind) sees at most two
    /// generation attempts in total.
    async fn fallback_strategy(
        &self,
        batches: &[WordBatch],
        failed: &[(char, QuestionKind)],
        user_id: Uuid,
        needed: usize,
    ) -> Vec<Question> {
        let submit_url = self.generator.submit_url_for(user_id);
        let mut collected = Vec::new();
        let retry_first = rand::thread_rng().gen_bool(0.5);

        if retry_first {
            info!("fallback: retrying generation before recycling");
            let retried = self.generate_and_persist(failed, user_id).await;
            let mut still_failed = HashSet::new();
            for ((word, _), question) in retried {
                if collected.len() >= needed {
                    break;
                }
                match question {
                    Some(q) => collected.push(q),
                    None => {
                        still_failed.insert(word);
                    }
                }
            }
            if collected.len() < needed && !still_failed.is_empty() {
                info!("fallback: retry incomplete, recycling not-good questions");
                collected.extend(collect_recycled(
                    batches,
                    &still_failed,
                    &submit_url,
                    needed - collected.len(),
                ));
            }
        } else {
            info!("fallback: recycling before a second generation attempt");
            let failed_words: HashSet<char> = failed.iter().map(|(w, _)| *w).collect();
            collected = collect_recycled(batches, &failed_words, &submit_url, needed);

            if collected.len() < needed {
                let served: HashSet<char> =
                    collected.iter().map(|q| q.target_word).collect();
                let remaining: Vec<(char, QuestionKind)> = failed
                    .iter()
                    .filter(|(w, _)| !served.contains(w))
                    .copied()
                    .collect();
                if !remaining.is_empty() {
                    info!(
                        count = remaining.len(),
                        "fallback: recycling insufficient, generating once more"
                    );
                    let retried = self.generate_and_persist(&remaining, user_id).await;
                    for (_, question) in retried {
                        if collected.len() >= needed {
                            break;
                        }
                        if let Some(q) = question {
                            collected.push(q);
                        }
                    }
                }
            }
        }
        collected
    }

    /// Last resort: any non-flagged question across the candidate words,
    /// newest first, excluding ids already picked.
    async fn final_fallback(
        &self,
        word_ids: &[i64],
        needed: usize,
        submit_url: &str,
        exclude: &HashSet<Uuid>,
    ) -> ApiResult<Vec<Question>> {
        if word_ids.is_empty() || needed == 0 {
            return Ok(Vec::new());
        }
        warn!(needed, "using final fallback query");
        let query = "SELECT * FROM questions q \
                     WHERE q.target_word_id = ANY($word_ids) \
                     AND q.question_id NOT IN ( \
                         SELECT DISTINCT fq.question_id FROM flagged_questions fq \
                     ) \
                     ORDER BY q.created_at DESC \
                     LIMIT $needed";
        let rows = self
            .db
            .execute_complex_query(
                query,
                &[
                    ("word_ids", SqlValue::from(word_ids.to_vec())),
                    ("needed", SqlValue::from((needed + exclude.len()) as i64)),
                ],
                Fetch::All,
            )
            .await?
            .into_rows();

        let mut picked = Vec::new();
        for row in rows {
            if picked.len() >= needed {
                break;
            }
            let Ok(question_row) = serde_json::from_value::<QuestionRow>(row) else {
                continue;
            };
            if exclude.contains(&question_row.question_id) {
                continue;
            }
            if let Some(question) = convert_row(&question_row, submit_url) {
                picked.push(question);
            }
        }
        Ok(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use zixue_core::{AnswerKind, McqBuilder, WritingBuilder};

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn mcq_row(word: char, created_at: i64, use_count: i64) -> QuestionRow {
        let q = McqBuilder::new(QuestionKind::FillInVocab)
            .target_word(word)
            .text_choices(&["一", "二", "三", "四"], &[true, false, false, false])
            .build()
            .unwrap();
        let mut row = QuestionRow::from_question(&q).unwrap();
        row.created_at = created_at;
        row.use_count = use_count;
        row
    }

    fn copy_stroke_row(word: char) -> QuestionRow {
        let q = WritingBuilder::new(QuestionKind::CopyStroke)
            .target_word(word)
            .handwrite_target(word)
            .submit_url("https://files.example/upload")
            .build()
            .unwrap();
        QuestionRow::from_question(&q).unwrap()
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let cfg = config();
        let now = 1_700_000_000;
        for age_hours in [0i64, 1, 100, 10_000] {
            for use_count in [0i64, 10, 100, 100_000] {
                for random in [0.0, 0.5, 1.0] {
                    let score = question_score(
                        QuestionKind::FillInVocab,
                        now - age_hours * 3600,
                        use_count,
                        0,
                        now,
                        &cfg,
                        random,
                    );
                    assert!((0.0..=1.0).contains(&score), "score {score} out of range");
                }
            }
        }
    }

    #[test]
    fn test_fresh_unused_question_scores_higher() {
        let cfg = config();
        let now = 1_700_000_000;
        let fresh = question_score(QuestionKind::FillInVocab, now, 0, 0, now, &cfg, 0.5);
        let stale = question_score(
            QuestionKind::FillInVocab,
            now - 1_000 * 3600,
            90,
            0,
            now,
            &cfg,
            0.5,
        );
        assert!(fresh > stale);
    }

    #[test]
    fn test_never_outdated_age_factor_is_pinned() {
        let cfg = config();
        let now = 1_700_000_000;
        // A decade-old copy_stroke question scores the same as a fresh one.
        let old = question_score(QuestionKind::CopyStroke, now - 87_600 * 3600, 0, 0, now, &cfg, 0.4);
        let new = question_score(QuestionKind::CopyStroke, now, 0, 0, now, &cfg, 0.4);
        assert!((old - new).abs() < 1e-12);
        // And lower than a brand-new ordinary question (pinned at e^-0.5).
        let ordinary = question_score(QuestionKind::FillInVocab, now, 0, 0, now, &cfg, 0.4);
        assert!(new < ordinary);
    }

    #[test]
    fn test_accuracy_factor_clamped_unless_enabled() {
        let mut cfg = config();
        let now = 1_700_000_000;
        let clamped = question_score(QuestionKind::FillInVocab, now, 10, 0, now, &cfg, 0.0);
        cfg.use_accuracy_factor = true;
        let with_accuracy = question_score(QuestionKind::FillInVocab, now, 10, 0, now, &cfg, 0.0);
        // With zero accuracy the enabled factor (0.5) scores lower than the
        // clamped 1.0.
        assert!(with_accuracy < clamped);
    }

    #[test]
    fn test_good_probability_centered_on_threshold() {
        let cfg = config();
        let at_threshold = good_probability(cfg.goodness_threshold, &cfg);
        assert!((at_threshold - 0.5).abs() < 1e-12);
        assert!(good_probability(0.9, &cfg) > 0.9);
        assert!(good_probability(0.2, &cfg) < 0.1);
    }

    #[test]
    fn test_weighted_sample_respects_amount_and_uniqueness() {
        let mut rng = StdRng::seed_from_u64(3);
        let candidates: Vec<RevisionCandidate> = (0..10)
            .map(|i| RevisionCandidate {
                word: char_for_codepoint(0x4E00 + i).unwrap(),
                word_id: 0x4E00 + i,
                wrong_count: 1,
                last_wrong_at: 0,
                priority: i as f64,
            })
            .collect();
        let picked = weighted_sample(candidates, 4, &mut rng);
        assert_eq!(picked.len(), 4);
        let ids: HashSet<i64> = picked.iter().map(|c| c.word_id).collect();
        assert_eq!(ids.len(), 4, "sampling must be without replacement");
    }

    #[test]
    fn test_weighted_sample_handles_negative_and_zero_priorities() {
        let mut rng = StdRng::seed_from_u64(9);
        let negatives: Vec<RevisionCandidate> = (0..6)
            .map(|i| RevisionCandidate {
                word: char_for_codepoint(0x4E00 + i).unwrap(),
                word_id: 0x4E00 + i,
                wrong_count: 1,
                last_wrong_at: 0,
                priority: -5.0 + i as f64,
            })
            .collect();
        assert_eq!(weighted_sample(negatives, 3, &mut rng).len(), 3);

        let zeros: Vec<RevisionCandidate> = (0..6)
            .map(|i| RevisionCandidate {
                word: char_for_codepoint(0x4E10 + i).unwrap(),
                word_id: 0x4E10 + i,
                wrong_count: 0,
                last_wrong_at: 0,
                priority: 0.0,
            })
            .collect();
        assert_eq!(weighted_sample(zeros, 2, &mut rng).len(), 2);
    }

    fn batch_with_good(word: char, rows: Vec<QuestionRow>) -> WordBatch {
        WordBatch {
            word_id: word as i64,
            word,
            good: rows
                .into_iter()
                .map(|row| ScoredQuestion { row, score: 0.9 })
                .collect(),
            not_good: Vec::new(),
        }
    }

    #[test]
    fn test_collect_good_respects_never_outdated_cap() {
        // Ten words whose only good question is copy_stroke.
        let batches: Vec<WordBatch> = (0..10)
            .map(|i| {
                let word = char_for_codepoint(0x4E00 + i).unwrap();
                batch_with_good(word, vec![copy_stroke_row(word)])
            })
            .collect();
        let (picked, used) =
            collect_good_existing(&batches, "https://files.example/upload", 3, 8);
        assert_eq!(picked.len(), 3, "cap limits copy_stroke picks");
        assert_eq!(used.len(), 3);
        assert!(picked
            .iter()
            .all(|q| q.question_type == QuestionKind::CopyStroke));
    }

    #[test]
    fn test_collect_good_mixes_kinds_under_cap() {
        let mut batches = Vec::new();
        for i in 0..4 {
            let word = char_for_codepoint(0x4E00 + i).unwrap();
            batches.push(batch_with_good(word, vec![copy_stroke_row(word)]));
        }
        for i in 4..8 {
            let word = char_for_codepoint(0x4E00 + i).unwrap();
            batches.push(batch_with_good(word, vec![mcq_row(word, 1_700_000_000, 0)]));
        }
        let (picked, _) = collect_good_existing(&batches, "https://files.example/upload", 3, 8);
        let stroke_count = picked
            .iter()
            .filter(|q| q.question_type == QuestionKind::CopyStroke)
            .count();
        assert_eq!(stroke_count, 3);
        assert_eq!(picked.len(), 7, "3 capped strokes + 4 mcq");
    }

    #[test]
    fn test_collect_good_stops_at_count() {
        let batches: Vec<WordBatch> = (0..10)
            .map(|i| {
                let word = char_for_codepoint(0x4E00 + i).unwrap();
                batch_with_good(word, vec![mcq_row(word, 1_700_000_000, 0)])
            })
            .collect();
        let (picked, used) =
            collect_good_existing(&batches, "https://files.example/upload", 3, 5);
        assert_eq!(picked.len(), 5);
        assert_eq!(used.len(), 5);
    }

    #[test]
    fn test_collect_recycled_only_serves_failed_words() {
        let word_a = '中';
        let word_b = '文';
        let batches = vec![
            WordBatch {
                word_id: word_a as i64,
                word: word_a,
                good: Vec::new(),
                not_good: vec![ScoredQuestion {
                    row: mcq_row(word_a, 1_600_000_000, 50),
                    score: 0.2,
                }],
            },
            WordBatch {
                word_id: word_b as i64,
                word: word_b,
                good: Vec::new(),
                not_good: vec![ScoredQuestion {
                    row: mcq_row(word_b, 1_600_000_000, 50),
                    score: 0.3,
                }],
            },
        ];
        let failed: HashSet<char> = [word_a].into_iter().collect();
        let recycled = collect_recycled(&batches, &failed, "https://files.example/upload", 5);
        assert_eq!(recycled.len(), 1);
        assert_eq!(recycled[0].target_word, word_a);
        assert_eq!(recycled[0].answer_type, AnswerKind::MultiChoice);
    }
}
