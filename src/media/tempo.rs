//! Расчёт цепочки изменения темпа
//!
//! Фильтр `atempo` принимает коэффициент только из диапазона `[0.5, 2.0]`,
//! поэтому больший коэффициент раскладывается на произведение шагов.

use crate::error::{DubError, Result};

/// Минимальный коэффициент одного шага
pub const MIN_TEMPO_STEP: f64 = 0.5;
/// Максимальный коэффициент одного шага
pub const MAX_TEMPO_STEP: f64 = 2.0;

/// Точность последнего шага (знаков после запятой)
const STEP_PRECISION: i32 = 5;

/// Цепочка коэффициентов темпа, произведение которых равно требуемому
#[derive(Debug, Clone, PartialEq)]
pub struct TempoPlan {
    ratio: f64,
    steps: Vec<f64>,
}

impl TempoPlan {
    /// Строит план для синтезированной длительности `synthesized` и целевой `target`.
    pub fn new(synthesized: f64, target: f64) -> Result<Self> {
        if !(synthesized > 0.0) || !(target > 0.0) || !synthesized.is_finite() || !target.is_finite() {
            return Err(DubError::InvalidDuration { synthesized, target });
        }

        Ok(Self::from_ratio(synthesized / target))
    }

    fn from_ratio(ratio: f64) -> Self {
        let mut remaining = ratio;
        let mut steps = Vec::new();

        while remaining < MIN_TEMPO_STEP {
            steps.push(MIN_TEMPO_STEP);
            remaining /= MIN_TEMPO_STEP;
        }
        while remaining > MAX_TEMPO_STEP {
            steps.push(MAX_TEMPO_STEP);
            remaining /= MAX_TEMPO_STEP;
        }

        let scale = 10f64.powi(STEP_PRECISION);
        let last = ((remaining * scale).round() / scale).clamp(MIN_TEMPO_STEP, MAX_TEMPO_STEP);
        steps.push(last);

        Self { ratio, steps }
    }

    /// Требуемый коэффициент `D_syn / D_target`
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    pub fn product(&self) -> f64 {
        self.steps.iter().product()
    }

    /// План не меняет темп
    pub fn is_identity(&self) -> bool {
        self.steps.len() == 1 && (self.steps[0] - 1.0).abs() < f64::EPSILON
    }

    /// Строка фильтра для ffmpeg, например `atempo=2.0,atempo=1.12500`
    pub fn filter_chain(&self) -> String {
        let last = self.steps.len() - 1;
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                if i == last {
                    format!("atempo={:.*}", STEP_PRECISION as usize, step)
                } else {
                    format!("atempo={:.1}", step)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
