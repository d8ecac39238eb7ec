//! Decision engine (§4): the orchestrator behind `POST /amas/process`.
//! Wires perception -> state modeling -> cold start -> fatigue fusion ->
//! ensemble decision -> reward -> persistence into one call per learning
//! event, keyed by a per-user in-memory model cache.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::amas::config::{AMASConfig, NormalizationStat};
use crate::amas::decision::coldstart::ColdStartSignals;
use crate::amas::decision::{
    ActrLearner, ColdStartManager, EnsembleDecision, EnsembleOutput, EnsembleWeights,
    LinUcbLearner, ThompsonLearner,
};
use crate::amas::error::AmasError;
use crate::amas::feature::{self, FeatureContext};
use crate::amas::metrics::AlgorithmId;
use crate::amas::modeling::attention::AttentionFeatures;
use crate::amas::modeling::cognitive::CognitiveInput;
use crate::amas::modeling::fatigue::FatigueFeatures;
use crate::amas::modeling::motivation::MotivationEvent;
use crate::amas::modeling::{
    AttentionMonitor, CognitiveProfiler, FatigueEstimator, FatigueFusionEngine, MotivationTracker,
    TrendAnalyzer,
};
use crate::amas::monitoring::AMASMonitor;
use crate::amas::persistence::AMASPersistence;
use crate::amas::router::SmartRouter;
use crate::amas::trace::TraceRecorder;
use crate::amas::types::{
    Action, AmasProcessResult, ColdStartPhase, ColdStartState, DecisionExplanation, DecisionFactor,
    DifficultyLevel, HabitProfile, LearningEventInput, PersistedAmasState, ProcessOptions, Reward,
    RewardQueueItem, StrategyParams, UserState, UserType,
};
use crate::amas::visual::{DynamicWeightCalculator, ThresholdLearner, VisualFatigueProcessor};
use crate::db::DatabaseProxy;
use crate::track_algorithm;

/// Per-user in-memory learner state. Rebuilt from persistence on first
/// touch and cached for the process's lifetime. The bandit's `A`/`b`
/// matrices round-trip through `AMASPersistence`; the modeling trackers'
/// internal EMA state does not (no setters are exposed on them) and
/// reconverges from each tracker's own default over subsequent events.
struct UserModels {
    attention: AttentionMonitor,
    fatigue: FatigueEstimator,
    motivation: MotivationTracker,
    cognitive: CognitiveProfiler,
    trend: TrendAnalyzer,
    cold_start: ColdStartManager,
    linucb: LinUcbLearner,
    thompson: ThompsonLearner,
    actr: ActrLearner,
    habit: Option<HabitProfile>,
    interaction_count: i32,
}

impl UserModels {
    fn new(
        config: &AMASConfig,
        user_id: &str,
        bandit: Option<amas_native::BanditModel>,
        cold_start_state: Option<ColdStartState>,
        habit: Option<HabitProfile>,
        interaction_count: i32,
    ) -> Self {
        let linucb = match bandit {
            Some(model) => LinUcbLearner::from_model(model),
            None => LinUcbLearner::new(config.bandit.alpha),
        };
        let cold_start = match cold_start_state {
            Some(state) => ColdStartManager::from_state(config.cold_start.clone(), state),
            None => ColdStartManager::new(config.cold_start.clone()),
        };

        Self {
            attention: AttentionMonitor::new(config.attention_weights.clone(), config.attention_smoothing),
            fatigue: FatigueEstimator::new(config.fatigue.clone()),
            motivation: MotivationTracker::new(config.motivation.clone()),
            cognitive: CognitiveProfiler::new(config.cognitive.clone()),
            trend: TrendAnalyzer::new(config.trend.clone()),
            cold_start,
            linucb,
            thompson: ThompsonLearner::new(seed_for(user_id)),
            actr: ActrLearner::new(0.5, -0.8, 0.25),
            habit,
            interaction_count,
        }
    }
}

/// Stable per-user Thompson seed so repeated cold loads (after a process
/// restart) start from the same posterior shape rather than a new random
/// stream each time.
fn seed_for(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

fn normalize_stat(value: f64, stat: &NormalizationStat) -> f64 {
    let z = (value - stat.mean) / stat.std_dev.max(1e-6);
    (z.clamp(-3.0, 3.0) + 3.0) / 6.0
}

fn normalize_ratio(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        0.0
    } else {
        (value / max).clamp(0.0, 1.0)
    }
}

/// Orchestrates the full AMAS decision pipeline for a single tenant
/// process. All locks are engine-scoped (not per-request), so concurrent
/// calls for different users still serialize through the per-component
/// `RwLock`s; this mirrors the granularity the donor's equivalent
/// singleton service used.
pub struct AMASEngine {
    config: Arc<RwLock<AMASConfig>>,
    persistence: Option<Arc<AMASPersistence>>,
    monitor: Option<Arc<AMASMonitor>>,
    trace: Arc<TraceRecorder>,
    router: Arc<RwLock<SmartRouter>>,
    fusion: Arc<RwLock<FatigueFusionEngine>>,
    visual_processor: VisualFatigueProcessor,
    weight_calculator: DynamicWeightCalculator,
    threshold_learner: Arc<RwLock<ThresholdLearner>>,
    ensemble: Arc<RwLock<EnsembleDecision>>,
    user_models: Arc<RwLock<HashMap<String, UserModels>>>,
}

impl AMASEngine {
    pub fn new(config: AMASConfig, db_proxy: Option<Arc<DatabaseProxy>>) -> Self {
        let visual_processor = VisualFatigueProcessor::new(config.visual.clone());
        let weight_calculator = DynamicWeightCalculator::new(config.visual.clone(), config.fusion.clone());
        let threshold_learner = ThresholdLearner::new(config.visual.clone());
        let fusion = FatigueFusionEngine::new(config.fusion.clone());
        let router = SmartRouter::new(config.feature_flags.use_native);
        let ensemble = EnsembleDecision::new(EnsembleWeights::default());

        Self {
            persistence: db_proxy.clone().map(|db| Arc::new(AMASPersistence::new(db))),
            monitor: db_proxy.clone().map(|db| Arc::new(AMASMonitor::new(db))),
            trace: Arc::new(TraceRecorder::new(db_proxy)),
            router: Arc::new(RwLock::new(router)),
            fusion: Arc::new(RwLock::new(fusion)),
            visual_processor,
            weight_calculator,
            threshold_learner: Arc::new(RwLock::new(threshold_learner)),
            ensemble: Arc::new(RwLock::new(ensemble)),
            user_models: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn from_env(db_proxy: Option<Arc<DatabaseProxy>>) -> Self {
        Self::new(AMASConfig::from_env(), db_proxy)
    }

    async fn ensure_user_loaded(&self, user_id: &str, config: &AMASConfig) -> Result<(), AmasError> {
        {
            let cache = self.user_models.read().await;
            if cache.contains_key(user_id) {
                return Ok(());
            }
        }

        let (bandit, cold_start_state, habit, interaction_count) = match &self.persistence {
            Some(persistence) => {
                let bandit = persistence.load_bandit_model(user_id).await?;
                match persistence.load_state(user_id).await? {
                    Some(state) => (
                        bandit,
                        state.cold_start_state,
                        state.user_state.habit,
                        state.interaction_count,
                    ),
                    None => (bandit, None, None, 0),
                }
            }
            None => (None, None, None, 0),
        };

        let models = UserModels::new(config, user_id, bandit, cold_start_state, habit, interaction_count);

        let mut cache = self.user_models.write().await;
        cache.entry(user_id.to_string()).or_insert(models);
        Ok(())
    }

    /// Processes one raw learning event end to end: updates the perceptual
    /// models, fuses behavioral/visual fatigue, consults cold start or the
    /// ensemble for the next strategy, applies an immediate proxy reward,
    /// and persists the result.
    pub async fn process_event(
        &self,
        user_id: &str,
        event: LearningEventInput,
        options: ProcessOptions,
    ) -> Result<AmasProcessResult, AmasError> {
        let started = Instant::now();
        let config = self.config.read().await.clone();

        self.ensure_user_loaded(user_id, &config).await?;

        let accuracy = options
            .recent_accuracy
            .unwrap_or(if event.is_correct { 1.0 } else { 0.0 });
        let ctx = Self::feature_context(&event, &options, &config);

        let mut cache = self.user_models.write().await;
        let models = cache
            .get_mut(user_id)
            .expect("ensure_user_loaded populates the cache entry before this point");

        let mut state = Self::update_modeling(models, &event, &options, &config);

        let fusion_result = self
            .fuse_fatigue(user_id, state.fatigue, &options, &config)
            .await;

        let cold_start_signals = ColdStartSignals {
            attention: state.attention,
            motivation: state.motivation,
            cognitive_mem: state.cognitive.mem,
            rt_variance: options.rt_cv.unwrap_or(0.0),
            has_signals: true,
        };
        let cold_start_strategy = track_algorithm!(
            AlgorithmId::ColdStartManager,
            models
                .cold_start
                .update_with_signals(accuracy, event.response_time, &cold_start_signals)
        );

        let (strategy, ensemble_output, used_native) = if !models.cold_start.is_complete() {
            let strategy = cold_start_strategy.unwrap_or_default();
            (strategy, None, false)
        } else {
            let candidates = Self::generate_candidates(options.current_params.as_ref());
            let base_context = feature::build(
                &state,
                options.current_params.as_ref().unwrap_or(&StrategyParams::default()),
                &ctx,
            );
            let (output, used_native) = self
                .decide_with_ensemble(&state, &base_context, &candidates, models)
                .await;

            if !options.skip_update.unwrap_or(false) {
                let reward = Self::compute_reward(&event, &options, &config);
                models.linucb.update(&base_context, reward.value);
                models.thompson.update(&state, &output.action, reward.value);
            }

            let strategy = output.action.clone();
            (strategy, Some(output), used_native)
        };

        state.cold_start = Some(models.cold_start.state().clone());
        state.habit = models.habit.clone();
        state.clamp();

        models.interaction_count += 1;
        let interaction_count = models.interaction_count;
        let bandit_snapshot = models.linucb.model().clone();
        let cold_start_snapshot = models.cold_start.state().clone();

        drop(cache);

        let should_break = Some(matches!(
            fusion_result.fatigue_level,
            crate::amas::types::FatigueLevel::Moderate | crate::amas::types::FatigueLevel::Severe
        ));
        let suggestion = fusion_result.recommendations.first().cloned();
        let explanation = Self::build_explanation(&state, &strategy, ensemble_output.as_ref(), &fusion_result);

        let result = AmasProcessResult {
            session_id: options.session_id.clone(),
            strategy,
            state,
            explanation,
            suggestion,
            should_break,
            word_mastery_decision: None,
        };

        if let Some(persistence) = &self.persistence {
            let persisted = PersistedAmasState {
                user_id: user_id.to_string(),
                user_state: result.state.clone(),
                cold_start_state: Some(cold_start_snapshot),
                current_strategy: result.strategy.clone(),
                interaction_count,
                last_updated: chrono::Utc::now().timestamp_millis(),
            };
            if let Err(e) = persistence.save_state(&persisted).await {
                tracing::warn!(user_id = %user_id, error = %e, "failed to persist amas state");
            }
            if let Err(e) = persistence.save_bandit_model(user_id, &bandit_snapshot).await {
                tracing::warn!(user_id = %user_id, error = %e, "failed to persist bandit model");
            }
        }

        let decision_id = uuid::Uuid::new_v4().to_string();
        let trace_output = ensemble_output.unwrap_or_else(|| EnsembleOutput {
            action: result.strategy.clone(),
            confidence: 1.0,
            per_learner_scores: HashMap::new(),
            skipped: vec!["cold_start".to_string()],
        });
        let decision_duration_ms = Some(started.elapsed().as_millis() as i32);
        if let Err(e) = self
            .trace
            .record_decision(
                &decision_id,
                options.session_id.as_deref(),
                options.answer_record_id.as_deref(),
                &result.strategy,
                &trace_output,
                decision_duration_ms,
            )
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "failed to record decision trace");
        }

        if let Some(monitor) = &self.monitor {
            monitor
                .record_process_event(
                    user_id,
                    options.session_id.as_deref(),
                    &result,
                    result.state.cold_start.as_ref().map(|c| c.phase),
                    None,
                    started.elapsed().as_millis() as i64,
                )
                .await;
        }

        let _ = used_native;
        Ok(result)
    }

    async fn decide_with_ensemble(
        &self,
        state: &UserState,
        base_context: &[f64],
        candidates: &[Action],
        models: &mut UserModels,
    ) -> (EnsembleOutput, bool) {
        let ensemble = self.ensemble.read().await;
        let mut router = self.router.write().await;
        let linucb_healthy = models.linucb.is_healthy();

        let linucb_ref = &models.linucb;
        let actr_ref = &models.actr;
        let thompson_ref = &mut models.thompson;

        track_algorithm!(
            AlgorithmId::Ensemble,
            router.call::<EnsembleOutput, ()>(
                "ensemble",
                || {
                    if !linucb_healthy {
                        return Err(());
                    }
                    Ok(ensemble.decide(state, &[], base_context, candidates, linucb_ref, thompson_ref, actr_ref))
                },
                || EnsembleOutput {
                    action: ensemble.fallback(state),
                    confidence: 0.0,
                    per_learner_scores: HashMap::new(),
                    skipped: vec!["native_unhealthy".to_string()],
                },
            )
        )
    }

    async fn fuse_fatigue(
        &self,
        user_id: &str,
        behavior_fatigue: f64,
        options: &ProcessOptions,
        _config: &AMASConfig,
    ) -> crate::amas::types::FusionResult {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let (visual_score, visual_confidence) = if let Some(raw) = options.visual_fatigue_raw.as_ref() {
            let processed = track_algorithm!(
                AlgorithmId::VisualProcessor,
                self.visual_processor.process(raw, now_ms)
            );
            {
                let mut learner = self.threshold_learner.write().await;
                track_algorithm!(AlgorithmId::ThresholdLearner, learner.observe(user_id, raw));
            }
            // §4.e's dynamic weight preview: informational only here, since
            // `FatigueFusionEngine` owns the authoritative per-call weight
            // redistribution internally.
            let _weight_preview = track_algorithm!(
                AlgorithmId::WeightCalculator,
                self.weight_calculator.compute(&processed, None)
            );
            if processed.is_valid {
                (Some(processed.score), Some(processed.confidence))
            } else {
                (None, None)
            }
        } else {
            (options.visual_fatigue_score, options.visual_fatigue_confidence)
        };

        let study_duration = options.study_duration_minutes.unwrap_or(0.0);
        let mut fusion = self.fusion.write().await;
        track_algorithm!(
            AlgorithmId::FatigueFusion,
            fusion.fuse(user_id, behavior_fatigue, visual_score, visual_confidence, study_duration)
        )
    }

    fn feature_context(event: &LearningEventInput, options: &ProcessOptions, config: &AMASConfig) -> FeatureContext {
        FeatureContext {
            recent_accuracy: options
                .recent_accuracy
                .unwrap_or(if event.is_correct { 1.0 } else { 0.0 }),
            response_time_ms: event.response_time as f64,
            max_response_time_ms: config.perception.max_response_time as f64,
            rt_cv: options.rt_cv.unwrap_or(0.0),
            pace_cv: options.pace_cv.unwrap_or(0.0),
            hour_of_day: 0,
        }
        .now()
    }

    fn update_modeling(
        models: &mut UserModels,
        event: &LearningEventInput,
        options: &ProcessOptions,
        config: &AMASConfig,
    ) -> UserState {
        let attention_features = AttentionFeatures {
            rt_mean: normalize_stat(event.response_time as f64, &config.perception.rt),
            rt_cv: options.rt_cv.unwrap_or(0.0),
            pace_cv: options.pace_cv.unwrap_or(0.0),
            pause_count: normalize_ratio(event.pause_count as f64, config.perception.max_pause_count as f64),
            switch_count: normalize_ratio(event.switch_count as f64, config.perception.max_switch_count as f64),
            drift: 0.0,
            interaction_density: event.interaction_density.unwrap_or(0.5),
            focus_loss: normalize_ratio(
                event.focus_loss_duration.unwrap_or(0) as f64,
                config.perception.max_focus_loss as f64,
            ),
        };
        let attention = track_algorithm!(AlgorithmId::Attention, models.attention.update(attention_features));

        let accuracy = options
            .recent_accuracy
            .unwrap_or(if event.is_correct { 1.0 } else { 0.0 });
        let fatigue_features = FatigueFeatures {
            error_rate_trend: if event.is_correct { 0.0 } else { 0.3 },
            rt_increase_rate: (normalize_stat(event.response_time as f64, &config.perception.rt) - 0.5).max(0.0),
            repeat_errors: event.retry_count,
            break_minutes: event.paused_time_ms.map(|ms| ms as f64 / 60_000.0),
        };
        let fatigue = track_algorithm!(AlgorithmId::Fatigue, models.fatigue.update(fatigue_features));

        let motivation_event = MotivationEvent {
            is_correct: event.is_correct,
            is_quit: event.is_quit,
            streak_length: models.motivation.streak(),
        };
        let motivation = track_algorithm!(AlgorithmId::Motivation, models.motivation.update(motivation_event));

        let cognitive_input = CognitiveInput {
            accuracy,
            avg_response_time: event.response_time,
            error_variance: options
                .session_stats
                .as_ref()
                .map(|s| {
                    if s.words_studied > 0 {
                        1.0 - (s.correct_count as f64 / s.words_studied as f64)
                    } else {
                        0.1
                    }
                })
                .unwrap_or(0.1),
        };
        let cognitive = track_algorithm!(AlgorithmId::Cognitive, models.cognitive.update(cognitive_input));

        let trend = track_algorithm!(AlgorithmId::Trend, models.trend.update(event.timestamp, accuracy));

        let mut state = UserState {
            attention,
            fatigue,
            cognitive: cognitive.clone(),
            motivation,
            conf: ((attention + (1.0 - fatigue) + cognitive.stability) / 3.0).clamp(0.0, 1.0),
            ts: event.timestamp,
            cold_start: None,
            habit: None,
            trend: Some(trend),
        };
        state.clamp();
        state
    }

    /// Bounded candidate action set for the ensemble to score: the caller's
    /// current strategy plus a small grid over difficulty/batch/hint,
    /// matched with a difficulty-appropriate interval/new-ratio pairing.
    fn generate_candidates(current: Option<&StrategyParams>) -> Vec<Action> {
        let mut candidates = Vec::new();
        if let Some(current) = current {
            candidates.push(current.clone());
        }

        for difficulty in [DifficultyLevel::Easy, DifficultyLevel::Mid, DifficultyLevel::Hard] {
            let (interval_scale, new_ratio) = match difficulty {
                DifficultyLevel::Easy => (1.2, 0.1),
                DifficultyLevel::Mid => (1.0, 0.2),
                DifficultyLevel::Hard => (0.8, 0.3),
            };
            for batch_size in [5, 8, 12] {
                for hint_level in [0, 1, 2] {
                    candidates.push(StrategyParams {
                        interval_scale,
                        new_ratio,
                        difficulty,
                        batch_size,
                        hint_level,
                    });
                }
            }
        }

        candidates
    }

    fn compute_reward(event: &LearningEventInput, options: &ProcessOptions, config: &AMASConfig) -> Reward {
        let accuracy_term = if event.is_correct { 1.0 } else { -1.0 };
        let speed_term = 1.0 - normalize_ratio(event.response_time as f64, config.perception.max_response_time as f64);
        let stability_term = options
            .session_stats
            .as_ref()
            .filter(|s| s.words_studied > 0)
            .map(|s| (s.correct_count as f64 / s.words_studied as f64) * 2.0 - 1.0)
            .unwrap_or(0.0);
        let retention_term = if event.hint_used { -0.3 } else { 0.0 };

        let weights = &config.reward;
        let value = weights.accuracy_weight * accuracy_term
            + weights.speed_weight * speed_term
            + weights.stability_weight * stability_term
            + weights.retention_weight * retention_term;

        Reward::new(
            value,
            if event.is_correct { "correct_response" } else { "incorrect_response" },
        )
    }

    fn build_explanation(
        state: &UserState,
        strategy: &StrategyParams,
        ensemble_output: Option<&EnsembleOutput>,
        fusion: &crate::amas::types::FusionResult,
    ) -> DecisionExplanation {
        let mut factors = vec![
            DecisionFactor {
                name: "fatigue".to_string(),
                value: state.fatigue,
                impact: if state.fatigue >= 0.5 { "negative" } else { "neutral" }.to_string(),
                percentage: state.fatigue * 100.0,
            },
            DecisionFactor {
                name: "attention".to_string(),
                value: state.attention,
                impact: if state.attention < 0.4 { "negative" } else { "positive" }.to_string(),
                percentage: state.attention * 100.0,
            },
            DecisionFactor {
                name: "motivation".to_string(),
                value: state.motivation,
                impact: if state.motivation < 0.0 { "negative" } else { "positive" }.to_string(),
                percentage: ((state.motivation + 1.0) / 2.0) * 100.0,
            },
        ];

        if let Some(output) = ensemble_output {
            factors.push(DecisionFactor {
                name: "ensemble_confidence".to_string(),
                value: output.confidence,
                impact: "decision".to_string(),
                percentage: output.confidence * 100.0,
            });
        }

        let mut changes = Vec::new();
        if fusion.has_conflict {
            if let Some(desc) = &fusion.conflict_description {
                changes.push(desc.clone());
            }
        }

        let text = format!(
            "selected {} difficulty, batch {} (fatigue={:.2}, attention={:.2}, motivation={:.2})",
            strategy.difficulty.as_str(),
            strategy.batch_size,
            state.fatigue,
            state.attention,
            state.motivation,
        );

        DecisionExplanation { factors, changes, text }
    }

    /// Forces a user straight into the settled `Normal` cold-start phase,
    /// e.g. an operator override for a known-profile returning user.
    pub async fn cold_start_override(&self, user_id: &str, user_type: UserType) -> Result<StrategyParams, AmasError> {
        let config = self.config.read().await.clone();
        self.ensure_user_loaded(user_id, &config).await?;
        let mut cache = self.user_models.write().await;
        let models = cache.get_mut(user_id).expect("ensure_user_loaded populates the cache entry");
        Ok(models.cold_start.manual_override(user_type))
    }

    /// Applies a claimed delayed reward (§4.j) to the cached bandit model
    /// and persists the updated matrix.
    pub async fn apply_delayed_reward(
        &self,
        item: &RewardQueueItem,
        stored_context: &[f64],
    ) -> Result<(), AmasError> {
        let config = self.config.read().await.clone();
        self.ensure_user_loaded(&item.user_id, &config).await?;

        let bandit_snapshot = {
            let mut cache = self.user_models.write().await;
            let models = cache
                .get_mut(&item.user_id)
                .expect("ensure_user_loaded populates the cache entry");
            track_algorithm!(
                AlgorithmId::RewardPipeline,
                crate::amas::reward::apply_reward(&mut models.linucb, item, stored_context)
            )?;
            models.linucb.model().clone()
        };

        if let Some(persistence) = &self.persistence {
            persistence.save_bandit_model(&item.user_id, &bandit_snapshot).await?;
        }
        Ok(())
    }

    pub async fn explain_decision(&self, session_id: &str) -> Result<Option<DecisionExplanation>, AmasError> {
        self.trace.explain_last_decision(session_id).await
    }

    /// Reruns the ensemble against the user's last known state with the
    /// requested overrides applied, without persisting anything. Used by
    /// `/amas/counterfactual` to answer "what would we have suggested if
    /// attention/fatigue/motivation had been X instead".
    pub async fn counterfactual(
        &self,
        user_id: &str,
        overrides: crate::amas::types::StateOverrides,
        current_params: Option<StrategyParams>,
    ) -> Result<AmasProcessResult, AmasError> {
        let config = self.config.read().await.clone();
        self.ensure_user_loaded(user_id, &config).await?;

        let mut state = match &self.persistence {
            Some(persistence) => persistence
                .load_state(user_id)
                .await?
                .map(|p| p.user_state)
                .unwrap_or_default(),
            None => UserState::default(),
        };
        if let Some(attention) = overrides.attention {
            state.attention = attention;
        }
        if let Some(fatigue) = overrides.fatigue {
            state.fatigue = fatigue;
        }
        if let Some(motivation) = overrides.motivation {
            state.motivation = motivation;
        }
        state.clamp();

        let candidates = Self::generate_candidates(current_params.as_ref());
        let ctx = FeatureContext {
            recent_accuracy: 0.5,
            response_time_ms: 0.0,
            max_response_time_ms: config.perception.max_response_time as f64,
            rt_cv: 0.0,
            pace_cv: 0.0,
            hour_of_day: 0,
        }
        .now();
        let default_params = StrategyParams::default();
        let base_context = feature::build(&state, current_params.as_ref().unwrap_or(&default_params), &ctx);

        let mut cache = self.user_models.write().await;
        let models = cache
            .get_mut(user_id)
            .expect("ensure_user_loaded populates the cache entry before this point");
        let (output, _used_native) = self
            .decide_with_ensemble(&state, &base_context, &candidates, models)
            .await;
        drop(cache);

        let strategy = output.action.clone();
        let no_fusion = crate::amas::types::FusionResult {
            fused_fatigue: state.fatigue,
            behavior_fatigue: state.fatigue,
            visual_fatigue: 0.0,
            temporal_fatigue: 0.0,
            weights: crate::amas::types::FusionWeights::default(),
            dominant_source: crate::amas::types::DominantSource::Behavior,
            has_conflict: false,
            conflict_description: None,
            fatigue_level: crate::amas::types::FatigueLevel::Mild,
            recommendations: Vec::new(),
        };
        let explanation = Self::build_explanation(&state, &strategy, Some(&output), &no_fusion);

        Ok(AmasProcessResult {
            session_id: None,
            strategy,
            state,
            explanation,
            suggestion: None,
            should_break: None,
            word_mastery_decision: None,
        })
    }

    /// Per-algorithm call/error/latency counters (§6.7) for the
    /// `/amas/algorithms/status` endpoint.
    pub async fn algorithm_status(&self) -> Vec<crate::amas::types::AlgorithmStatus> {
        crate::amas::metrics::registry()
            .snapshot()
            .into_iter()
            .map(|s| crate::amas::types::AlgorithmStatus {
                name: s.name,
                calls: s.call_count,
                errors: s.error_count,
                avg_latency_ms: s.avg_latency_ms,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_event_returns_a_strategy_without_persistence() {
        let engine = AMASEngine::new(AMASConfig::default(), None);
        let result = engine
            .process_event("u1", LearningEventInput::default(), ProcessOptions::default())
            .await
            .unwrap();
        assert!(result.strategy.batch_size > 0);
    }

    #[tokio::test]
    async fn repeated_events_advance_cold_start_phase() {
        let engine = AMASEngine::new(
            AMASConfig {
                cold_start: crate::amas::config::ColdStartConfig {
                    classify_samples: 2,
                    explore_samples: 2,
                    min_classify_samples: 1,
                    min_explore_samples: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
            None,
        );

        let mut last = None;
        for _ in 0..8 {
            let result = engine
                .process_event("u2", LearningEventInput::default(), ProcessOptions::default())
                .await
                .unwrap();
            last = result.state.cold_start.map(|c| c.phase);
        }
        assert_eq!(last, Some(ColdStartPhase::Normal));
    }

    #[tokio::test]
    async fn visual_sample_feeds_fatigue_fusion() {
        let engine = AMASEngine::new(AMASConfig::default(), None);
        let options = ProcessOptions {
            visual_fatigue_score: Some(0.9),
            visual_fatigue_confidence: Some(0.9),
            study_duration_minutes: Some(60.0),
            ..Default::default()
        };
        let result = engine
            .process_event("u3", LearningEventInput::default(), options)
            .await
            .unwrap();
        assert!(result.suggestion.is_some());
    }

    #[tokio::test]
    async fn cold_start_override_forces_normal_phase() {
        let engine = AMASEngine::new(AMASConfig::default(), None);
        let strategy = engine.cold_start_override("u4", UserType::Fast).await.unwrap();
        assert_eq!(strategy.difficulty, DifficultyLevel::Hard);
    }
}
