//! Statistics engine
//!
//! Aggregates assignments and events into per-variant results and runs a
//! fixed-horizon two-proportion z-test between control and each treatment.
//! Everything here is read-only over a best-effort snapshot: concurrent
//! writes during aggregation make results slightly stale, never wrong-shaped,
//! and zero denominators are guarded rather than divided by.

use crate::error::EngineError;
use crate::handle::StoreHandle;
use chrono::NaiveDate;
use scribe_exp_types::{
    Assignment, ConfidenceInterval, ConversionEvent, DailyResults, DailyVariantCounts,
    Experiment, ExperimentId, ExperimentResults, ResultsStatus, VariantId, VariantResults,
};
use std::collections::BTreeMap;
use tracing::debug;

/// z for a two-sided 95% interval
const Z_95: f64 = 1.96;
/// z for 80% power in the sample-size formula
const Z_POWER_80: f64 = 0.84;

/// Computes derived experiment results on demand
#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    store: StoreHandle,
}

/// Control-vs-treatment test outcome
#[derive(Debug, Clone, Copy, PartialEq)]
struct Comparison {
    variant_id: VariantId,
    p_value: f64,
    effect: f64,
}

#[derive(Debug, Default)]
struct Tally {
    participants: u64,
    conversions: u64,
    events_by_type: BTreeMap<String, u64>,
}

impl Tally {
    fn conversion_rate(&self) -> f64 {
        if self.participants == 0 {
            0.0
        } else {
            self.conversions as f64 / self.participants as f64
        }
    }

    fn metric_rate(&self, metric: &str) -> f64 {
        if self.participants == 0 {
            0.0
        } else {
            *self.events_by_type.get(metric).unwrap_or(&0) as f64 / self.participants as f64
        }
    }
}

impl StatisticsEngine {
    /// Create a statistics engine over the given store
    #[inline]
    #[must_use]
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Aggregate and test the experiment's current data
    pub async fn compute_results(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<ExperimentResults, EngineError> {
        let experiment = self
            .store
            .experiment(experiment_id)
            .await?
            .ok_or(EngineError::ExperimentNotFound(experiment_id))?;

        let assignments = self.store.assignments_for_experiment(experiment_id).await?;
        let events = self.store.events_for_experiment(experiment_id).await?;

        Ok(compute(&experiment, &assignments, &events))
    }
}

/// Pure aggregation and testing over a snapshot
fn compute(
    experiment: &Experiment,
    assignments: &[Assignment],
    events: &[ConversionEvent],
) -> ExperimentResults {
    let tallies = tally(experiment, assignments, events);
    let daily = daily_series(experiment, assignments);

    let control = experiment.control_variant();
    let control_tally = control.map(|c| &tallies[&c.id]);
    let control_rate = control_tally.map_or(0.0, |t| t.conversion_rate());

    let variant_results = variant_results(experiment, &tallies, control_rate);

    let populated = experiment
        .variants
        .iter()
        .filter(|v| tallies[&v.id].participants > 0)
        .count();
    let control_empty = control_tally.map_or(true, |t| t.participants == 0);
    if populated < 2 || control_empty {
        debug!(experiment = %experiment.id, "insufficient data for comparison");
        return ExperimentResults::insufficient(variant_results, daily);
    }

    // Safe: the guard above requires a populated control.
    let Some(control) = control else {
        return ExperimentResults::insufficient(variant_results, daily);
    };
    let control_tally = &tallies[&control.id];

    let comparisons: Vec<Comparison> = experiment
        .variants
        .iter()
        .filter(|v| !v.is_control && tallies[&v.id].participants > 0)
        .map(|v| {
            let (p_value, effect) = two_proportion_test(
                control_tally.participants,
                control_tally.conversions,
                tallies[&v.id].participants,
                tallies[&v.id].conversions,
            );
            Comparison {
                variant_id: v.id,
                p_value,
                effect,
            }
        })
        .collect();

    let alpha = 1.0 - experiment.confidence_level / 100.0;

    let candidate = comparisons
        .iter()
        .filter(|c| c.effect > 0.0)
        .min_by(|a, b| a.p_value.total_cmp(&b.p_value))
        .copied();
    let significant_loss = comparisons
        .iter()
        .filter(|c| c.effect <= 0.0 && c.p_value < alpha)
        .min_by(|a, b| a.p_value.total_cmp(&b.p_value))
        .copied();
    let lowest_p = comparisons
        .iter()
        .min_by(|a, b| a.p_value.total_cmp(&b.p_value))
        .copied();

    let (status, winning_variant, reported) = match candidate {
        Some(c) if c.p_value < alpha => (ResultsStatus::SignificantWinner, Some(c.variant_id), c),
        _ => match significant_loss {
            Some(l) => (ResultsStatus::SignificantLoser, None, l),
            // The populated-variants guard makes comparisons non-empty.
            None => match candidate.or(lowest_p) {
                Some(c) => (ResultsStatus::NoSignificantDifference, None, c),
                None => {
                    return ExperimentResults::insufficient(variant_results, daily);
                }
            },
        },
    };

    ExperimentResults {
        status,
        winning_variant,
        confidence: ((1.0 - reported.p_value) * 100.0).max(0.0),
        p_value: reported.p_value,
        effect: reported.effect,
        variants: variant_results,
        daily,
    }
}

fn tally(
    experiment: &Experiment,
    assignments: &[Assignment],
    events: &[ConversionEvent],
) -> BTreeMap<VariantId, Tally> {
    let mut tallies: BTreeMap<VariantId, Tally> = experiment
        .variants
        .iter()
        .map(|v| (v.id, Tally::default()))
        .collect();

    for assignment in assignments {
        if let Some(t) = tallies.get_mut(&assignment.variant_id) {
            t.participants += 1;
            if assignment.converted {
                t.conversions += 1;
            }
        }
    }
    for event in events {
        if let Some(t) = tallies.get_mut(&event.variant_id) {
            *t.events_by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
    }
    tallies
}

fn variant_results(
    experiment: &Experiment,
    tallies: &BTreeMap<VariantId, Tally>,
    control_rate: f64,
) -> Vec<VariantResults> {
    let control_tally = experiment.control_variant().map(|c| &tallies[&c.id]);
    let required = required_sample_size(control_rate, experiment.minimum_effect);

    let mut results: Vec<VariantResults> = experiment
        .variants
        .iter()
        .map(|v| {
            let t = &tallies[&v.id];
            let rate = t.conversion_rate();
            let deltas = experiment
                .secondary_metrics
                .iter()
                .map(|metric| {
                    let delta = control_tally.map_or(0.0, |c| {
                        relative_delta(c.metric_rate(metric), t.metric_rate(metric))
                    });
                    (metric.clone(), delta)
                })
                .collect();
            VariantResults {
                variant_id: v.id,
                name: v.name.clone(),
                is_control: v.is_control,
                participants: t.participants,
                conversions: t.conversions,
                conversion_rate: rate,
                confidence_interval: wald_interval(rate, t.participants),
                required_sample_size: required,
                secondary_metric_deltas: deltas,
            }
        })
        .collect();

    // Control first, for display.
    results.sort_by_key(|r| !r.is_control);
    results
}

fn daily_series(experiment: &Experiment, assignments: &[Assignment]) -> Vec<DailyResults> {
    let mut days: BTreeMap<NaiveDate, BTreeMap<VariantId, DailyVariantCounts>> = BTreeMap::new();

    for assignment in assignments {
        if experiment.variant(assignment.variant_id).is_none() {
            continue;
        }
        let counts = days
            .entry(assignment.assigned_at.date_naive())
            .or_default()
            .entry(assignment.variant_id)
            .or_default();
        counts.participants += 1;
        if assignment.converted {
            counts.conversions += 1;
        }
    }

    days.into_iter()
        .map(|(date, variants)| DailyResults { date, variants })
        .collect()
}

/// Two-proportion z-test; returns `(p_value, effect_pct)`
///
/// A zero pooled standard error means no detectable difference, reported as
/// `(1.0, 0.0)` rather than a division by zero.
#[must_use]
pub fn two_proportion_test(
    n_control: u64,
    conv_control: u64,
    n_test: u64,
    conv_test: u64,
) -> (f64, f64) {
    if n_control == 0 || n_test == 0 {
        return (1.0, 0.0);
    }

    let rate_control = conv_control as f64 / n_control as f64;
    let rate_test = conv_test as f64 / n_test as f64;

    let pooled = (conv_control + conv_test) as f64 / (n_control + n_test) as f64;
    let std_err =
        (pooled * (1.0 - pooled) * (1.0 / n_control as f64 + 1.0 / n_test as f64)).sqrt();
    if std_err == 0.0 {
        return (1.0, 0.0);
    }

    let z = (rate_test - rate_control).abs() / std_err;
    let p_value = (2.0 * (1.0 - normal_cdf(z))).clamp(0.0, 1.0);

    (p_value, relative_delta(rate_control, rate_test))
}

/// Relative change from `base` to `value`, in percent; 0 when `base` is 0
#[inline]
#[must_use]
pub fn relative_delta(base: f64, value: f64) -> f64 {
    if base > 0.0 {
        (value - base) / base * 100.0
    } else {
        0.0
    }
}

/// Two-sided 95% Wald interval on a conversion rate, clamped to `[0, 1]`
#[must_use]
pub fn wald_interval(rate: f64, n: u64) -> ConfidenceInterval {
    if n == 0 {
        return ConfidenceInterval {
            lower: 0.0,
            upper: 0.0,
        };
    }
    let half = Z_95 * (rate * (1.0 - rate) / n as f64).sqrt();
    ConfidenceInterval {
        lower: (rate - half).max(0.0),
        upper: (rate + half).min(1.0),
    }
}

/// Participants per arm needed to detect `minimum_effect_pct` relative lift
/// over `baseline_rate` at 95% significance and 80% power
///
/// Returns 0 when the baseline or the target delta is degenerate (no finite
/// sample size answers the question).
#[must_use]
pub fn required_sample_size(baseline_rate: f64, minimum_effect_pct: f64) -> u64 {
    let p1 = baseline_rate;
    let p2 = (p1 * (1.0 + minimum_effect_pct / 100.0)).min(1.0);
    let delta = p2 - p1;
    if p1 <= 0.0 || p1 >= 1.0 || delta.abs() < f64::EPSILON {
        return 0;
    }

    let p_bar = (p1 + p2) / 2.0;
    let numerator = Z_95 * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + Z_POWER_80 * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    (numerator * numerator / (delta * delta)).ceil() as u64
}

/// Standard normal CDF via the Abramowitz & Stegun erf approximation
/// (7.1.26, absolute error below 1.5e-7)
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
