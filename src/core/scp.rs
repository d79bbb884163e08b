//! Structural causal processes: generalized additive noise models with lagged
//! and contemporaneous links, optionally under hard or soft interventions.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::dag::ContempDag;
use crate::domain::model::{InterventionKind, Interventions, Links, Noise, Realization};
use crate::utils::error::{Result, SimError};

/// Share of `samples` simulated in front of the returned window and discarded.
pub const TRANSIENT_FRACTION: f64 = 0.2;

pub fn transient_len(samples: usize) -> usize {
    (TRANSIENT_FRACTION * samples as f64).floor() as usize
}

/// Validated structure of a set of links: largest lag and the order in which
/// variables are computed inside one time step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CausalStructure {
    pub max_lag: usize,
    pub causal_order: Vec<usize>,
}

/// Checks ids, lags and coefficients and orders the contemporaneous DAG.
pub fn analyze_links(links: &Links) -> Result<CausalStructure> {
    let n = links.len();
    if n == 0 {
        return Err(SimError::invalid_model("links must define at least one variable"));
    }
    if links.keys().next_back().copied() != Some(n - 1) {
        return Err(SimError::invalid_model("links keys must be 0..N-1"));
    }

    let mut max_lag = 0;
    let mut dag = ContempDag::new(n);

    for (&j, entries) in links {
        for link in entries {
            if link.parent >= n {
                return Err(SimError::invalid_model(format!(
                    "parent {} of variable {} must be in 0..{}",
                    link.parent,
                    j,
                    n - 1
                )));
            }
            if !link.coeff.is_finite() {
                return Err(SimError::invalid_model(format!(
                    "coefficient of link {} -> {} must be finite",
                    link.parent, j
                )));
            }
            if link.lag > 0 {
                return Err(SimError::invalid_model(format!(
                    "lag of link {} -> {} must be non-positive, got {}",
                    link.parent, j, link.lag
                )));
            }
            max_lag = max_lag.max(link.lag.unsigned_abs() as usize);

            if link.parent != j && link.lag == 0 {
                dag.add_edge(link.parent, j);
            }
        }
    }

    if dag.is_cyclic() {
        return Err(SimError::CyclicContemporaneous);
    }

    Ok(CausalStructure {
        max_lag,
        causal_order: dag.topological_sort(),
    })
}

fn check_interventions(interventions: &Interventions, n: usize, samples: usize) -> Result<()> {
    for (&j, intervention) in interventions {
        if j >= n {
            return Err(SimError::invalid_model(format!(
                "intervened variable {} must be in 0..{}",
                j,
                n - 1
            )));
        }
        if intervention.values.len() != samples {
            return Err(SimError::invalid_model(format!(
                "intervention array for j={} must be of length T = {}, got {}",
                j,
                samples,
                intervention.values.len()
            )));
        }
    }
    Ok(())
}

/// Simulates `X^j_t = eta^j_t + sum c f(X^i_{t+lag})` for `samples` steps after
/// a burn-in of [`transient_len`] steps. `noises` defaults to standard normal
/// for every variable. `seed = None` draws from system entropy.
pub fn structural_causal_process(
    links: &Links,
    samples: usize,
    noises: Option<&[Noise]>,
    interventions: &Interventions,
    seed: Option<u64>,
) -> Result<Realization> {
    let n = links.len();
    let default_noises;
    let noises = match noises {
        Some(noises) => noises,
        None => {
            default_noises = vec![Noise::StandardNormal; n];
            &default_noises
        }
    };
    if noises.len() != n {
        return Err(SimError::invalid_model(format!(
            "links and noises keys must match N = {}, got {} noises",
            n,
            noises.len()
        )));
    }

    let structure = analyze_links(links)?;
    check_interventions(interventions, n, samples)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let transient = transient_len(samples);
    let total = samples + transient;

    tracing::debug!(
        "Simulating {} variables for {} steps ({} transient), max lag {}, order {:?}",
        n,
        samples,
        transient,
        structure.max_lag,
        structure.causal_order
    );

    let mut data = DMatrix::zeros(total, n);
    for (j, noise) in noises.iter().enumerate() {
        let draws = noise.sample(&mut rng, total)?;
        data.set_column(j, &nalgebra::DVector::from_vec(draws));
    }

    for t in structure.max_lag..total {
        for &j in &structure.causal_order {
            if t >= transient {
                if let Some(intervention) = interventions.get(&j) {
                    if let Some(value) = intervention.values[t - transient] {
                        match intervention.kind {
                            InterventionKind::Hard => {
                                data[(t, j)] = value;
                                continue;
                            }
                            InterventionKind::Soft => data[(t, j)] += value,
                        }
                    }
                }
            }

            for link in &links[&j] {
                // lag <= 0 且 t >= max_lag，索引不會越界
                let source = t - link.lag.unsigned_abs() as usize;
                data[(t, j)] += link.coeff * link.transfer.apply(data[(source, link.parent)]);
            }
        }
    }

    let data = data.rows(transient, samples).into_owned();
    Ok(Realization::new(data))
}
