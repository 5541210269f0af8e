//! Input-guard policy for screening user queries
//!
//! Screening runs in front of the retrieval pipeline as a swappable
//! policy component; the pipeline itself never inspects input. The
//! bundled heuristics score regex pattern families plus character and
//! structure anomalies against a configurable risk threshold.

use crate::config::SecurityConfig;
use crate::error::{RagfuseError, Result};
use regex::Regex;

/// Outcome of screening one input
#[derive(Debug, Clone)]
pub struct GuardVerdict {
    pub malicious: bool,
    pub risk_score: f64,
    pub reason: String,
}

/// Screens and sanitizes user input before it reaches the pipeline
pub trait InputGuard: Send + Sync {
    fn inspect(&self, input: &str) -> GuardVerdict;

    fn sanitize(&self, input: &str) -> String;
}

/// Regex-scored prompt-injection heuristics, bilingual pattern set.
pub struct InjectionHeuristics {
    patterns: Vec<Regex>,
    control_chars: Regex,
    excess_whitespace: Regex,
    risk_threshold: f64,
    max_input_length: usize,
}

const PATTERNS: &[&str] = &[
    // instruction override
    r"(?i)ignore.*previous.*instructions",
    r"忽略.*之前.*指令",
    r"(?i)forget.*what.*was.*said",
    // role hijacking
    r"(?i)you.*are.*now",
    r"(?i)pretend.*to.*be",
    r"你现在.*是",
    // system prompt probing
    r"(?i)show.*your.*system.*prompt",
    r"(?i)what.*are.*your.*instructions",
    r"显示.*系统.*提示",
    // privilege escalation
    r"(?i)bypass.*restrictions",
    r"(?i)override.*rules",
    r"绕过.*限制",
    // code execution
    r"(?i)execute.*code",
    r"(?i)run.*command",
    r"执行.*代码",
    // encoding tricks
    r"\\u[0-9a-fA-F]{4}",
    r"\\x[0-9a-fA-F]{2}",
    // delimiter smuggling
    r"```[\s\S]*```",
    // keyword flooding
    r"(?i)(ignore|忽略|forget|忘记){2,}",
    r"(?i)(system|系统|prompt|提示){3,}",
];

impl InjectionHeuristics {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| RagfuseError::Config(format!("invalid guard pattern {p}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            control_chars: Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]")
                .map_err(|e| RagfuseError::Config(e.to_string()))?,
            excess_whitespace: Regex::new(r"\s{3,}")
                .map_err(|e| RagfuseError::Config(e.to_string()))?,
            risk_threshold: config.risk_threshold,
            max_input_length: config.max_input_length,
        })
    }

    fn risk_score(&self, input: &str) -> f64 {
        let mut score = 0.0;

        for pattern in &self.patterns {
            if pattern.is_match(input) {
                score += 0.15;
                tracing::debug!(pattern = pattern.as_str(), "injection pattern matched");
            }
        }
        if self.control_chars.is_match(input) {
            score += 0.15;
        }

        score += character_anomalies(input);
        score += structure_anomalies(input);

        score.min(1.0)
    }
}

fn character_anomalies(input: &str) -> f64 {
    let mut score = 0.0;
    let total = input.chars().count().max(1) as f64;

    let special = input
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count() as f64;
    if special / total > 0.3 {
        score += 0.2;
    }

    let upper = input.chars().filter(|c| c.is_uppercase()).count() as f64;
    if upper / total > 0.5 {
        score += 0.1;
    }

    // long runs of one character
    let mut run = 1usize;
    let mut previous = None;
    for c in input.chars() {
        if Some(c) == previous {
            run += 1;
            if run > 10 {
                score += 0.15;
                break;
            }
        } else {
            run = 1;
            previous = Some(c);
        }
    }

    score
}

fn structure_anomalies(input: &str) -> f64 {
    let mut score = 0.0;

    let words: Vec<&str> = input.split_whitespace().collect();
    if !words.is_empty() {
        let unique: ahash::AHashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();
        if (unique.len() as f64) / (words.len() as f64) < 0.5 {
            score += 0.15;
        }
    }

    if input.lines().count() > 10 {
        score += 0.1;
    }

    score
}

impl InputGuard for InjectionHeuristics {
    fn inspect(&self, input: &str) -> GuardVerdict {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return GuardVerdict {
                malicious: false,
                risk_score: 0.0,
                reason: "empty input".to_string(),
            };
        }

        if trimmed.chars().count() > self.max_input_length {
            return GuardVerdict {
                malicious: true,
                risk_score: 1.0,
                reason: format!("input exceeds {} characters", self.max_input_length),
            };
        }

        let risk_score = self.risk_score(trimmed);
        let malicious = risk_score >= self.risk_threshold;
        GuardVerdict {
            malicious,
            risk_score,
            reason: if malicious {
                "injection patterns detected".to_string()
            } else {
                "input accepted".to_string()
            },
        }
    }

    fn sanitize(&self, input: &str) -> String {
        let stripped = self.control_chars.replace_all(input, "");
        let collapsed = self.excess_whitespace.replace_all(&stripped, " ");
        collapsed
            .chars()
            .take(self.max_input_length)
            .collect::<String>()
            .trim()
            .to_string()
    }
}
