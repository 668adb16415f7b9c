//! Next-token selection from raw logits

use crate::{generation::GeneratorParams, CoreError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Turns a logits vector into a token id according to the run's parameters
pub struct LogitsSampler {
    rng: StdRng,
    greedy: bool,
    temperature: f32,
    top_k: usize,
    top_p: f32,
    repetition_penalty: f32,
}

impl LogitsSampler {
    /// Create a sampler; a fixed `random_seed` makes sampling reproducible
    pub fn new(params: &GeneratorParams) -> Self {
        let rng = match params.random_seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            greedy: params.is_greedy(),
            temperature: params.temperature(),
            top_k: params.top_k(),
            top_p: params.top_p(),
            repetition_penalty: params.repetition_penalty(),
        }
    }

    /// Select the next token given the logits and the sequence so far
    pub fn sample(&mut self, logits: &[f32], history: &[u32]) -> Result<u32> {
        if logits.is_empty() {
            return Err(CoreError::generation(
                "EMPTY_LOGITS",
                "Cannot sample from empty logits",
                "Token sampling",
                "Check that the model forward pass produces valid logits",
            ));
        }

        let mut logits = logits.to_vec();
        apply_repetition_penalty(&mut logits, history, self.repetition_penalty);

        if self.greedy {
            return greedy_sample(&logits);
        }

        for logit in &mut logits {
            *logit /= self.temperature;
        }

        if self.top_k > 0 && self.top_k < logits.len() {
            apply_top_k_filtering(&mut logits, self.top_k);
        }

        if self.top_p < 1.0 {
            apply_top_p_filtering(&mut logits, self.top_p);
        }

        let probabilities = softmax(&logits)?;
        self.sample_from_distribution(&probabilities)
    }

    fn sample_from_distribution(&mut self, probabilities: &[f32]) -> Result<u32> {
        let random_value: f32 = self.rng.gen();

        let mut cumulative_prob = 0.0;
        let mut last_candidate = None;
        for (i, &prob) in probabilities.iter().enumerate() {
            if prob <= 0.0 {
                continue;
            }
            cumulative_prob += prob;
            last_candidate = Some(i as u32);
            if random_value < cumulative_prob {
                return Ok(i as u32);
            }
        }

        // Rounding can leave the cumulative sum just below 1.0
        last_candidate.ok_or_else(|| {
            CoreError::generation(
                "EMPTY_DISTRIBUTION",
                "Cannot sample from empty probability distribution",
                "Probability sampling",
                "Check that top_k/top_p filtering leaves at least one candidate",
            )
        })
    }
}

/// Index of the highest logit; ties resolve to the lowest id
fn greedy_sample(logits: &[f32]) -> Result<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in logits.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }

    best.map(|(idx, _)| idx as u32).ok_or_else(|| {
        CoreError::generation(
            "SAMPLING_FAILED",
            "Failed to find maximum logit",
            "Greedy sampling",
            "Check that logits contain valid float values",
        )
    })
}

fn apply_repetition_penalty(logits: &mut [f32], previous_tokens: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }

    for &token in previous_tokens {
        if let Some(logit) = logits.get_mut(token as usize) {
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }
}

fn sorted_indices_desc(logits: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..logits.len()).collect();
    indices.sort_by(|&a, &b| {
        logits[b]
            .partial_cmp(&logits[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

fn apply_top_k_filtering(logits: &mut [f32], top_k: usize) {
    for idx in sorted_indices_desc(logits).into_iter().skip(top_k) {
        logits[idx] = f32::NEG_INFINITY;
    }
}

fn apply_top_p_filtering(logits: &mut [f32], top_p: f32) {
    let sorted = sorted_indices_desc(logits);
    let sorted_logits: Vec<f32> = sorted.iter().map(|&i| logits[i]).collect();
    let Ok(sorted_probs) = softmax(&sorted_logits) else {
        return;
    };

    let mut cumulative_prob = 0.0;
    let mut cutoff_index = sorted_probs.len();
    for (i, &prob) in sorted_probs.iter().enumerate() {
        cumulative_prob += prob;
        if cumulative_prob >= top_p {
            cutoff_index = i + 1;
            break;
        }
    }

    for &idx in sorted.iter().skip(cutoff_index) {
        logits[idx] = f32::NEG_INFINITY;
    }
}

fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    if !max_logit.is_finite() {
        return Err(CoreError::generation(
            "INVALID_LOGITS",
            "No finite logits left to sample from",
            "Softmax",
            "Check the model output and the top_k/top_p settings",
        ));
    }

    let exp_logits: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum_exp: f32 = exp_logits.iter().sum();
    Ok(exp_logits.iter().map(|&x| x / sum_exp).collect())
}
