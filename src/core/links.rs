use std::collections::BTreeMap;

use crate::domain::graph::{EdgeMark, LagGraph};
use crate::domain::model::{LinkEntry, ParentMap};
use crate::utils::error::{Result, SimError};

/// Smallest and largest `|lag|` over active entries, `None` without any.
pub fn minmax_lag<L: LinkEntry>(links: &BTreeMap<usize, Vec<L>>) -> Option<(usize, usize)> {
    links
        .values()
        .flatten()
        .filter(|link| link.is_active())
        .map(|link| link.lag().unsigned_abs() as usize)
        .fold(None, |acc, lag| match acc {
            None => Some((lag, lag)),
            Some((lo, hi)) => Some((lo.min(lag), hi.max(lag))),
        })
}

/// Active `(parent, lag)` pairs of every variable. Variables without parents
/// still get an empty entry.
pub fn parents<L: LinkEntry>(links: &BTreeMap<usize, Vec<L>>, exclude_contemp: bool) -> ParentMap {
    links
        .iter()
        .map(|(&j, entries)| {
            let list = entries
                .iter()
                .filter(|link| link.is_active())
                .filter(|link| !(exclude_contemp && link.lag() == 0))
                .map(|link| (link.parent(), link.lag()))
                .collect();
            (j, list)
        })
        .collect()
}

/// Inverts a parent map into `parent -> [(child, |lag|)]`.
pub fn children(parents: &ParentMap) -> BTreeMap<usize, Vec<(usize, usize)>> {
    let mut children: BTreeMap<usize, Vec<(usize, usize)>> =
        parents.keys().map(|&j| (j, Vec::new())).collect();

    for (&j, list) in parents {
        for &(i, tau) in list {
            children
                .entry(i)
                .or_default()
                .push((j, tau.unsigned_abs() as usize));
        }
    }

    children
}

/// Converts links into the `-->` / `<--` graph array. `tau_max` defaults to the
/// largest lag present and may not be smaller than it.
pub fn links_to_graph<L: LinkEntry>(
    links: &BTreeMap<usize, Vec<L>>,
    tau_max: Option<usize>,
) -> Result<LagGraph> {
    let max_lag = minmax_lag(links).map(|(_, hi)| hi).unwrap_or(0);

    let tau_max = match tau_max {
        None => max_lag,
        Some(tau_max) if tau_max < max_lag => {
            return Err(SimError::InvalidConfigValueError {
                field: "tau_max".to_string(),
                value: tau_max.to_string(),
                reason: format!(
                    "tau_max is smaller than maximum lag = {} found in links",
                    max_lag
                ),
            });
        }
        Some(tau_max) => tau_max,
    };

    let n_vars = links.len();
    let mut graph = LagGraph::new(n_vars, tau_max);

    for (&j, entries) in links {
        for link in entries.iter().filter(|link| link.is_active()) {
            let i = link.parent();
            let tau = link.lag().unsigned_abs() as usize;
            let placed = graph.set(i, j, tau, EdgeMark::Forward)
                && (tau != 0 || graph.set(j, i, 0, EdgeMark::Backward));
            if !placed {
                return Err(SimError::invalid_model(format!(
                    "link {} -> {} refers to a variable outside 0..{}",
                    i, j, n_vars
                )));
            }
        }
    }

    Ok(graph)
}
