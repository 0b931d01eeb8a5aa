//! Text classifier: provider abstraction + Naive-Bayes artifact + service wrapper.
//!
//! The model is trained offline and shipped as a JSON artifact:
//!
//! ```json
//! {
//!   "model_version": "v1.0",
//!   "classes": ["ham", "spam"],
//!   "class_log_prior": [-0.51, -0.92],
//!   "feature_log_prob": { "umeshinda": [-9.2, -4.1], "habari": [-4.9, -7.4] }
//! }
//! ```
//!
//! Scoring is multinomial Naive Bayes over bag-of-words counts; tokens the
//! vocabulary does not know are ignored.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClassifierError, GuardError};
use crate::models::{Assessed, Classification, TextAnalysisResult};

/// Confidence reported when classification had to be skipped.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub vectorizer_type: String,
    pub loaded: bool,
    pub vocabulary_size: usize,
    pub model_version: String,
}

/// Anything that can label a text as ham/spam with a probability.
pub trait TextClassifier: Send + Sync {
    /// Returns the winning label and its probability in <0.0, 1.0>.
    fn predict(&self, text: &str) -> Result<(Classification, f32), ClassifierError>;
    fn model_info(&self) -> ModelInfo;
}

/// Convenient alias used by callers.
pub type DynClassifier = Arc<dyn TextClassifier>;

// ------------------------------------------------------------
// Naive-Bayes artifact
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    #[serde(default = "default_model_version")]
    model_version: String,
    classes: Vec<String>,
    class_log_prior: Vec<f64>,
    feature_log_prob: HashMap<String, Vec<f64>>,
}

fn default_model_version() -> String {
    "v1.0".to_string()
}

#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    version: String,
    classes: Vec<Classification>,
    class_log_prior: Vec<f64>,
    feature_log_prob: HashMap<String, Vec<f64>>,
}

impl NaiveBayesModel {
    pub fn from_json(raw: &str) -> Result<Self, ClassifierError> {
        let art: ModelArtifact =
            serde_json::from_str(raw).map_err(|e| ClassifierError::Artifact(e.to_string()))?;

        let classes = art
            .classes
            .iter()
            .map(|c| match c.trim().to_ascii_lowercase().as_str() {
                "ham" => Ok(Classification::Ham),
                "spam" => Ok(Classification::Spam),
                other => Err(ClassifierError::Artifact(format!("unknown class '{other}'"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if classes.len() != 2 || classes[0] == classes[1] {
            return Err(ClassifierError::Artifact(
                "expected exactly the classes ham and spam".to_string(),
            ));
        }
        if art.class_log_prior.len() != classes.len() {
            return Err(ClassifierError::Artifact(format!(
                "class_log_prior has {} entries, expected {}",
                art.class_log_prior.len(),
                classes.len()
            )));
        }
        if let Some((tok, _)) = art
            .feature_log_prob
            .iter()
            .find(|(_, v)| v.len() != classes.len())
        {
            return Err(ClassifierError::Artifact(format!(
                "token '{tok}' has the wrong number of class weights"
            )));
        }

        // Vocabulary keys are matched against lowercased tokens.
        let feature_log_prob = art
            .feature_log_prob
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();

        Ok(Self {
            version: art.model_version,
            classes,
            class_log_prior: art.class_log_prior,
            feature_log_prob,
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ClassifierError::ModelUnavailable(format!("{}: {e}", path.display()))
        })?;
        let model = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            version = %model.version,
            vocabulary = model.feature_log_prob.len(),
            "spam model loaded"
        );
        Ok(model)
    }

    /// Posterior probability per class (same order as the artifact's `classes`).
    fn posteriors(&self, text: &str) -> Vec<f64> {
        let mut jll = self.class_log_prior.clone();
        for tok in tokenize(text) {
            if let Some(weights) = self.feature_log_prob.get(&tok) {
                for (acc, w) in jll.iter_mut().zip(weights) {
                    *acc += w;
                }
            }
        }

        // log-sum-exp
        let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = jll.iter().map(|x| (x - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }
}

impl TextClassifier for NaiveBayesModel {
    fn predict(&self, text: &str) -> Result<(Classification, f32), ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyText);
        }
        let probs = self.posteriors(text);

        // Ties go to the first class listed in the artifact.
        let mut best = 0usize;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        Ok((self.classes[best], probs[best] as f32))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: "MultinomialNB".to_string(),
            vectorizer_type: "CountVectorizer".to_string(),
            loaded: true,
            vocabulary_size: self.feature_log_prob.len(),
            model_version: self.version.clone(),
        }
    }
}

/// Word tokens of two or more characters, lowercased (default bag-of-words rules).
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("token regex"));
    TOKEN.find_iter(s).map(|m| m.as_str().to_lowercase())
}

// ------------------------------------------------------------
// Stand-in classifiers
// ------------------------------------------------------------

/// Used when no model could be loaded; every call fails, so every analysis
/// degrades to the fail-closed result.
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    pub reason: String,
}

impl TextClassifier for UnavailableClassifier {
    fn predict(&self, _text: &str) -> Result<(Classification, f32), ClassifierError> {
        Err(ClassifierError::ModelUnavailable(self.reason.clone()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: "Unknown".to_string(),
            vectorizer_type: "Unknown".to_string(),
            loaded: false,
            vocabulary_size: 0,
            model_version: "none".to_string(),
        }
    }
}

/// Deterministic classifier for tests and local runs.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    pub label: Classification,
    pub confidence: f32,
}

impl FixedClassifier {
    pub fn new(label: Classification, confidence: f32) -> Self {
        Self { label, confidence }
    }
}

impl TextClassifier for FixedClassifier {
    fn predict(&self, text: &str) -> Result<(Classification, f32), ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyText);
        }
        Ok((self.label, self.confidence))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: "Fixed".to_string(),
            vectorizer_type: "None".to_string(),
            loaded: true,
            vocabulary_size: 0,
            model_version: "fixed".to_string(),
        }
    }
}

/// Load the artifact at `path`, or fall back to [`UnavailableClassifier`].
pub fn load_classifier<P: AsRef<Path>>(path: P) -> DynClassifier {
    match NaiveBayesModel::load_from_file(path) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            warn!(error = %e, "spam model unavailable; text analysis will fail closed");
            Arc::new(UnavailableClassifier {
                reason: e.to_string(),
            })
        }
    }
}

// ------------------------------------------------------------
// Service wrapper
// ------------------------------------------------------------

/// Runs the classifier with input hygiene and timing.
#[derive(Clone)]
pub struct TextAnalyzer {
    classifier: DynClassifier,
    max_text_length: usize,
}

impl TextAnalyzer {
    pub fn new(classifier: DynClassifier, max_text_length: usize) -> Self {
        Self {
            classifier,
            max_text_length: max_text_length.max(1),
        }
    }

    /// Classify `text`. Classifier failures degrade to (spam, 0.5).
    pub fn classify(&self, text: &str) -> Assessed<TextAnalysisResult> {
        let started = Instant::now();
        let version = self.classifier.model_info().model_version;

        let outcome = if text.trim().is_empty() {
            Err(ClassifierError::EmptyText)
        } else {
            let input = self.truncate(text);
            self.classifier.predict(&input)
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok((label, confidence)) => {
                debug!(
                    label = label.as_str(),
                    confidence,
                    chars = text.chars().count(),
                    "text classified"
                );
                Assessed::Confident(TextAnalysisResult::new(label, confidence, elapsed_ms, version))
            }
            Err(e) => {
                let err = GuardError::from(e);
                warn!(error = %err, "text classification degraded to spam");
                Assessed::Degraded {
                    value: TextAnalysisResult::new(
                        Classification::Spam,
                        FALLBACK_CONFIDENCE,
                        elapsed_ms,
                        version,
                    ),
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.classifier.model_info()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.classifier.model_info().loaded
    }

    fn truncate<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        match text.char_indices().nth(self.max_text_length) {
            Some((cut, _)) => {
                warn!(limit = self.max_text_length, "text truncated before scoring");
                std::borrow::Cow::Owned(text[..cut].to_string())
            }
            None => std::borrow::Cow::Borrowed(text),
        }
    }
}
