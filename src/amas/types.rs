#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// Context-vector schema version. Bump whenever the feature layout in
/// `amas::feature` changes; readers of an older-dimension vector zero-pad
/// or truncate to align (see `amas::feature::align_to_current`).
pub const FEATURE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Mid,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Mid => "mid",
            Self::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Mid,
        }
    }

    /// Maps onto `[0,1]` for the feature vector (§4.a).
    pub fn as_unit(&self) -> f64 {
        match self {
            Self::Easy => 0.0,
            Self::Mid => 0.5,
            Self::Hard => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendLabel {
    Up,
    #[default]
    Flat,
    Stuck,
    Down,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Flat => "flat",
            Self::Stuck => "stuck",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrendState {
    pub label: TrendLabel,
    pub slope_per_day: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Fast,
    #[default]
    Stable,
    Cautious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartPhase {
    #[default]
    Classify,
    Explore,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveProfile {
    pub mem: f64,
    pub speed: f64,
    pub stability: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self {
            mem: 0.5,
            speed: 0.5,
            stability: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RhythmPreference {
    pub session_median_minutes: f64,
    pub batch_median: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HabitSamples {
    pub time_events: i32,
    pub sessions: i32,
    pub batches: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitProfile {
    /// 24-bin normalised time-of-day histogram.
    pub time_pref: Vec<f64>,
    pub rhythm_pref: RhythmPreference,
    /// Empty until `samples.time_events >= 10`.
    pub preferred_time_slots: Vec<i32>,
    pub samples: HabitSamples,
}

impl Default for HabitProfile {
    fn default() -> Self {
        Self {
            time_pref: vec![0.0; 24],
            rhythm_pref: RhythmPreference::default(),
            preferred_time_slots: vec![],
            samples: HabitSamples::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartEvent {
    ManualOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousUserProfile {
    pub speed: f64,
    pub stability: f64,
    pub risk_tolerance: f64,
    pub engagement: f64,
    pub confidence: [f64; 4],
}

impl Default for ContinuousUserProfile {
    fn default() -> Self {
        Self {
            speed: 0.5,
            stability: 0.5,
            risk_tolerance: 0.5,
            engagement: 0.5,
            confidence: [0.0; 4],
        }
    }
}

impl ContinuousUserProfile {
    pub fn from_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => Self {
                speed: 0.8,
                stability: 0.4,
                risk_tolerance: 0.7,
                engagement: 0.6,
                confidence: [0.3; 4],
            },
            UserType::Stable => Self {
                speed: 0.5,
                stability: 0.6,
                risk_tolerance: 0.5,
                engagement: 0.5,
                confidence: [0.3; 4],
            },
            UserType::Cautious => Self {
                speed: 0.3,
                stability: 0.7,
                risk_tolerance: 0.3,
                engagement: 0.4,
                confidence: [0.3; 4],
            },
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.confidence.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn to_strategy(&self) -> StrategyParams {
        let interval_scale = 0.8 + 0.4 * self.stability;
        let new_ratio = (0.1 + 0.2 * self.speed * self.engagement).clamp(0.1, 0.4);
        let batch_size = (5.0 + 10.0 * self.engagement).round() as i32;
        let hint_level = if self.risk_tolerance > 0.7 {
            0
        } else if self.risk_tolerance > 0.4 {
            1
        } else {
            2
        };
        let difficulty = if self.risk_tolerance > 0.6 {
            DifficultyLevel::Hard
        } else if self.risk_tolerance > 0.35 {
            DifficultyLevel::Mid
        } else {
            DifficultyLevel::Easy
        };

        StrategyParams {
            interval_scale,
            new_ratio,
            difficulty,
            batch_size: batch_size.clamp(5, 16),
            hint_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartState {
    pub phase: ColdStartPhase,
    pub user_type: Option<UserType>,
    pub probe_index: i32,
    pub update_count: i32,
    pub settled_strategy: Option<StrategyParams>,
    #[serde(default)]
    pub classification_scores: [f64; 3],
    #[serde(default)]
    pub continuous_profile: Option<ContinuousUserProfile>,
}

impl Default for ColdStartState {
    fn default() -> Self {
        Self {
            phase: ColdStartPhase::Classify,
            user_type: None,
            probe_index: 0,
            update_count: 0,
            settled_strategy: None,
            classification_scores: [0.0; 3],
            continuous_profile: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: DifficultyLevel,
    pub batch_size: i32,
    pub hint_level: i32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: DifficultyLevel::Mid,
            batch_size: 8,
            hint_level: 1,
        }
    }
}

impl StrategyParams {
    pub fn for_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => Self {
                interval_scale: 0.8,
                new_ratio: 0.3,
                difficulty: DifficultyLevel::Hard,
                batch_size: 12,
                hint_level: 0,
            },
            UserType::Stable => Self::default(),
            UserType::Cautious => Self {
                interval_scale: 1.2,
                new_ratio: 0.1,
                difficulty: DifficultyLevel::Easy,
                batch_size: 5,
                hint_level: 2,
            },
        }
    }
}

/// Strategy expressed as an action over a bounded action set (§4.h): the
/// bandit/decision learners operate over `Action`, the engine surfaces
/// `StrategyParams` externally. The two are isomorphic today; kept as
/// distinct types so the action set can diverge from the wire strategy
/// without breaking callers.
pub type Action = StrategyParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(rename = "A")]
    pub attention: f64,
    #[serde(rename = "F")]
    pub fatigue: f64,
    #[serde(rename = "C")]
    pub cognitive: CognitiveProfile,
    #[serde(rename = "M")]
    pub motivation: f64,
    pub conf: f64,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cold_start: Option<ColdStartState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habit: Option<HabitProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendState>,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            attention: 0.7,
            fatigue: 0.05,
            cognitive: CognitiveProfile::default(),
            motivation: 0.5,
            conf: 0.5,
            ts: chrono::Utc::now().timestamp_millis(),
            cold_start: Some(ColdStartState::default()),
            habit: None,
            trend: None,
        }
    }
}

impl UserState {
    /// Enforces §3's range invariants and guards against NaN propagation.
    pub fn clamp(&mut self) {
        if self.attention.is_nan() {
            self.attention = 0.7;
        }
        if self.fatigue.is_nan() {
            self.fatigue = 0.05;
        }
        if self.motivation.is_nan() {
            self.motivation = 0.0;
        }
        if self.conf.is_nan() {
            self.conf = 0.5;
        }
        self.attention = self.attention.clamp(0.0, 1.0);
        self.fatigue = self.fatigue.clamp(0.05, 1.0);
        self.motivation = self.motivation.clamp(-1.0, 1.0);
        self.conf = self.conf.clamp(0.0, 1.0);
        self.cognitive.mem = sanitize_unit(self.cognitive.mem);
        self.cognitive.speed = sanitize_unit(self.cognitive.speed);
        self.cognitive.stability = sanitize_unit(self.cognitive.stability);
    }
}

fn sanitize_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.5
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
    pub version: u32,
    #[serde(rename = "normMethod", default = "default_norm_method")]
    pub norm_method: String,
    pub ts: i64,
}

fn default_norm_method() -> String {
    "ucb-context".to_string()
}

impl FeatureVector {
    pub fn new(values: Vec<f64>, labels: Vec<String>) -> Self {
        Self {
            values,
            labels,
            version: FEATURE_VERSION,
            norm_method: default_norm_method(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEventInput {
    pub word_id: Option<String>,
    pub is_correct: bool,
    pub response_time: i64,
    pub dwell_time: Option<i64>,
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default)]
    pub hint_used: bool,
    pub paused_time_ms: Option<i64>,
    #[serde(default)]
    pub pause_count: i32,
    #[serde(default)]
    pub switch_count: i32,
    pub focus_loss_duration: Option<i64>,
    pub interaction_density: Option<f64>,
    pub timestamp: i64,
    #[serde(default)]
    pub is_quit: bool,
    #[serde(default)]
    pub device_type: Option<String>,
}

impl Default for LearningEventInput {
    fn default() -> Self {
        Self {
            word_id: None,
            is_correct: true,
            response_time: 3000,
            dwell_time: None,
            retry_count: 0,
            hint_used: false,
            paused_time_ms: None,
            pause_count: 0,
            switch_count: 0,
            focus_loss_duration: None,
            interaction_density: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_quit: false,
            device_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub word_id: Option<String>,
    pub word_difficulty: Option<f64>,
    pub session_length: Option<f64>,
    pub recent_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub words_studied: i32,
    pub correct_count: i32,
    pub total_time_ms: i64,
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    pub current_params: Option<StrategyParams>,
    pub interaction_count: Option<i32>,
    pub recent_accuracy: Option<f64>,
    pub skip_update: Option<bool>,
    pub answer_record_id: Option<String>,
    pub session_id: Option<String>,
    pub session_stats: Option<SessionStats>,
    pub visual_fatigue_score: Option<f64>,
    pub visual_fatigue_confidence: Option<f64>,
    pub visual_fatigue_raw: Option<VisualFatigueSample>,
    pub study_duration_minutes: Option<f64>,
    pub rt_cv: Option<f64>,
    pub pace_cv: Option<f64>,
}

/// Overrides for `/amas/counterfactual`: rerun the ensemble against a
/// hypothetical state without touching the user's persisted one.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateOverrides {
    pub attention: Option<f64>,
    pub fatigue: Option<f64>,
    pub motivation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFactor {
    pub name: String,
    pub value: f64,
    pub impact: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DecisionExplanation {
    pub factors: Vec<DecisionFactor>,
    pub changes: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub value: f64,
    pub reason: String,
    pub ts: i64,
}

impl Reward {
    pub fn new(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value: value.clamp(-1.0, 1.0),
            reason: reason.into(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    #[default]
    Pending,
    Processing,
    Done,
    DeadLetter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardQueueItem {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub reward: f64,
    pub scheduled_for: i64,
    pub session_id: Option<String>,
    pub answer_record_id: Option<String>,
    pub attempts: i32,
    pub status: RewardStatus,
}

/// Per-named-algorithm call/error/latency counters (§6.7), modeled on the
/// donor's `AlgorithmRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmStatus {
    pub name: String,
    pub calls: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VisualFatigueSample {
    pub score: f64,
    pub perclos: f64,
    pub blink_rate: f64,
    pub yawn_count: i32,
    pub head_pitch: Option<f64>,
    pub head_yaw: Option<f64>,
    pub head_roll: Option<f64>,
    pub squint: Option<f64>,
    pub gaze_off_screen: Option<f64>,
    pub confidence: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedVisualSample {
    pub score: f64,
    pub confidence: f64,
    pub is_valid: bool,
    pub freshness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FatigueLevel {
    #[default]
    Alert,
    Mild,
    Moderate,
    Severe,
}

impl FatigueLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score < 0.25 {
            Self::Alert
        } else if score < 0.5 {
            Self::Mild
        } else if score < 0.75 {
            Self::Moderate
        } else {
            Self::Severe
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionWeights {
    pub behavior: f64,
    pub visual: f64,
    pub temporal: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            behavior: 0.5,
            visual: 0.3,
            temporal: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DominantSource {
    Behavior,
    Visual,
    Temporal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionResult {
    pub fused_fatigue: f64,
    pub behavior_fatigue: f64,
    pub visual_fatigue: f64,
    pub temporal_fatigue: f64,
    pub weights: FusionWeights,
    pub dominant_source: DominantSource,
    pub has_conflict: bool,
    pub conflict_description: Option<String>,
    pub fatigue_level: FatigueLevel,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
}

impl MeanStd {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalisedThresholds {
    pub perclos: MeanStd,
    pub blink_rate: MeanStd,
    pub fatigue_score: MeanStd,
    pub updated_at: i64,
    pub sample_count: i32,
}

impl Default for PersonalisedThresholds {
    fn default() -> Self {
        Self {
            perclos: MeanStd::new(0.15, 0.05),
            blink_rate: MeanStd::new(15.0, 5.0),
            fatigue_score: MeanStd::new(0.3, 0.15),
            updated_at: chrono::Utc::now().timestamp_millis(),
            sample_count: 0,
        }
    }
}

/// Wire envelope for `POST /amas/process` (§6.1). `word_mastery_decision`
/// is always `None` here: word-mastery scheduling is an out-of-scope
/// collaborator (the CRUD surface), and this field exists purely so its
/// response envelope can pass a future value through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmasProcessResult {
    pub session_id: Option<String>,
    pub strategy: StrategyParams,
    pub state: UserState,
    pub explanation: DecisionExplanation,
    pub suggestion: Option<String>,
    pub should_break: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_mastery_decision: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAmasState {
    pub user_id: String,
    pub user_state: UserState,
    pub cold_start_state: Option<ColdStartState>,
    pub current_strategy: StrategyParams,
    pub interaction_count: i32,
    pub last_updated: i64,
}
