#![forbid(unsafe_code)]

use rand::Rng;
use wellness_kernel_contracts::ContractViolation;

pub const DEFAULT_MOTIVATION_MESSAGES: &[&str] = &[
    "Small steps still move you forward.",
    "You showed up today, and that counts.",
    "Take a slow breath. You have time.",
    "Progress is not always loud.",
    "Be as kind to yourself as you are to others.",
    "Noticing how you feel is already a win.",
    "Rest is part of the work.",
];

/// Picks dashboard encouragement from a fixed catalog with a caller-supplied RNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotivationPicker {
    messages: Vec<String>,
}

impl MotivationPicker {
    pub fn new(messages: Vec<String>) -> Result<Self, ContractViolation> {
        if messages.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "motivation_picker.messages",
                reason: "must not be empty",
            });
        }
        if messages.iter().any(|m| m.trim().is_empty()) {
            return Err(ContractViolation::InvalidValue {
                field: "motivation_picker.messages",
                reason: "must not contain blank messages",
            });
        }
        Ok(Self { messages })
    }

    pub fn mvp_v1() -> Self {
        Self {
            messages: DEFAULT_MOTIVATION_MESSAGES
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        let idx = rng.gen_range(0..self.messages.len());
        &self.messages[idx]
    }
}
