//! Derivation engine: reference resolution and change propagation.
//!
//! # Responsibility
//! - Resolve a raw value against the current resolved view.
//! - Discover the set of entries affected by a change (transitively) through
//!   the repository's reference query.
//! - Settle an affected set to a fixed point with bounded passes.
//!
//! # Invariants
//! - Substitution inside one value is left-to-right occurrence order.
//! - Pending entries are visited in key order, so results are deterministic.
//! - A pass that resolves nothing ends settlement; leftover entries keep
//!   partial resolution and are reported as [`UnresolvableReference`].
//! - Settlement itself is pure over already-fetched rows; only discovery
//!   touches the repository.

use crate::derive::scanner::{find_references, has_references, references_key};
use crate::derive::view::ResolvedView;
use crate::model::value::MetadataValue;
use crate::repo::metadata_repo::{MetadataRepository, MetadataRow, RepoResult};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Outcome of resolving one raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Value after substituting every reference that could be substituted.
    pub value: MetadataValue,
    /// `false` when at least one referent was still pending.
    pub complete: bool,
}

/// Non-fatal condition: entries whose references could not reach a fixed
/// point (cycles or chains blocked on each other).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvableReference {
    pub keys: Vec<String>,
}

impl Display for UnresolvableReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unresolvable reference chain among keys: {}",
            self.keys.join(", ")
        )
    }
}

impl Error for UnresolvableReference {}

/// Report produced by one settlement run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// Keys that reached a fixed point, in resolution order.
    pub resolved: Vec<String>,
    /// Number of passes performed (including the final stalled pass, if any).
    pub passes: usize,
    /// Set when settlement stalled with entries still pending.
    pub unresolved: Option<UnresolvableReference>,
}

impl Propagation {
    pub fn is_fixed_point(&self) -> bool {
        self.unresolved.is_none()
    }

    /// Keys left partially resolved, empty at a fixed point.
    pub fn unresolved_keys(&self) -> &[String] {
        match &self.unresolved {
            Some(unresolved) => &unresolved.keys,
            None => &[],
        }
    }
}

/// Resolves `raw` against `view`, treating every referent as settled.
///
/// Non-text values and text without references resolve to themselves.
/// References to keys absent from `view` stay in the output as literal text.
pub fn resolve(raw: &MetadataValue, view: &ResolvedView) -> Resolution {
    resolve_with(raw, view, |_| false)
}

/// Resolves `raw` against `view`, leaving tokens whose referent
/// `is_pending` reports as still awaiting resolution.
pub fn resolve_with(
    raw: &MetadataValue,
    view: &ResolvedView,
    is_pending: impl Fn(&str) -> bool,
) -> Resolution {
    let Some(text) = raw.as_text() else {
        return Resolution {
            value: raw.clone(),
            complete: true,
        };
    };

    let (value, complete) = substitute(text, view, is_pending);
    Resolution {
        value: MetadataValue::Text(value),
        complete,
    }
}

/// Substitutes references in an arbitrary template string.
pub fn resolve_text(template: &str, view: &ResolvedView) -> String {
    substitute(template, view, |_| false).0
}

fn substitute(
    text: &str,
    view: &ResolvedView,
    is_pending: impl Fn(&str) -> bool,
) -> (String, bool) {
    let references = find_references(text);
    if references.is_empty() {
        return (text.to_string(), true);
    }

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut complete = true;

    for reference in references {
        output.push_str(&text[cursor..reference.start]);
        cursor = reference.end;

        if is_pending(reference.key) {
            complete = false;
            output.push_str(reference.token);
            continue;
        }

        match view.get(reference.key) {
            Some(value) => output.push_str(&value.render()),
            // Missing referent: the token stays as plain text.
            None => output.push_str(reference.token),
        }
    }
    output.push_str(&text[cursor..]);

    (output, complete)
}

#[derive(Debug, Clone)]
struct Node {
    key: String,
    raw: MetadataValue,
    /// Indices of other nodes in this graph that `raw` references.
    deps: Vec<usize>,
    /// Referenced keys that are not members of this graph.
    external: Vec<String>,
}

/// Dependency graph over the entries taking part in one settlement.
///
/// Built fresh from raw values for every run; edges exist only between
/// members of the graph. Referents outside the graph are read from the view.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Builds a graph from raw rows. Duplicate keys keep the first row.
    pub fn build(rows: impl IntoIterator<Item = MetadataRow>) -> Self {
        let mut by_key = BTreeMap::new();
        for row in rows {
            by_key.entry(row.key).or_insert(row.value);
        }

        let index = by_key
            .keys()
            .enumerate()
            .map(|(idx, key)| (key.clone(), idx))
            .collect::<HashMap<_, _>>();

        let nodes = by_key
            .into_iter()
            .map(|(key, raw)| {
                let mut deps = Vec::new();
                let mut external = Vec::new();
                if let Some(text) = raw.as_text() {
                    for reference in find_references(text) {
                        match index.get(reference.key) {
                            Some(&dep) => deps.push(dep),
                            None => external.push(reference.key.to_string()),
                        }
                    }
                }
                deps.sort_unstable();
                deps.dedup();
                external.sort_unstable();
                external.dedup();
                Node {
                    key,
                    raw,
                    deps,
                    external,
                }
            })
            .collect();

        Self { nodes, index }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in settlement order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.key.as_str())
    }

    /// In-graph keys that `key` references, or `None` when `key` is absent.
    pub fn dependencies_of(&self, key: &str) -> Option<Vec<&str>> {
        let idx = *self.index.get(key)?;
        Some(
            self.nodes[idx]
                .deps
                .iter()
                .map(|&dep| self.nodes[dep].key.as_str())
                .collect(),
        )
    }

    /// Resolves every node into `view`, pass by pass, until all nodes are
    /// settled or a pass makes no progress.
    pub fn settle(&self, view: &mut ResolvedView) -> Propagation {
        self.settle_with(view, |_| false)
    }

    /// Like [`DependencyGraph::settle`], but keys outside the graph for which
    /// `is_stuck` holds count as permanently pending. Callers pass the keys a
    /// previous settlement left unresolved, so a later write sees the same
    /// outcome a full reload would.
    pub fn settle_with(
        &self,
        view: &mut ResolvedView,
        is_stuck: impl Fn(&str) -> bool,
    ) -> Propagation {
        let mut pending = vec![true; self.nodes.len()];
        let mut remaining = self.nodes.len();
        let mut report = Propagation::default();

        while remaining > 0 {
            report.passes += 1;
            let mut progressed = false;

            for (idx, node) in self.nodes.iter().enumerate() {
                if !pending[idx] {
                    continue;
                }
                // Referents settled earlier in this same pass count as ready.
                if node.deps.iter().any(|&dep| pending[dep]) {
                    continue;
                }
                if node.external.iter().any(|key| is_stuck(key)) {
                    continue;
                }

                let resolution = resolve(&node.raw, view);
                view.set(node.key.clone(), resolution.value);
                pending[idx] = false;
                remaining -= 1;
                progressed = true;
                report.resolved.push(node.key.clone());
            }

            if !progressed {
                break;
            }
        }

        if remaining > 0 {
            let is_pending = |key: &str| match self.index.get(key) {
                Some(&idx) => pending[idx],
                None => is_stuck(key),
            };
            let mut stalled = Vec::with_capacity(remaining);
            let mut partials = Vec::with_capacity(remaining);
            for (idx, node) in self.nodes.iter().enumerate() {
                if !pending[idx] {
                    continue;
                }
                let resolution = resolve_with(&node.raw, view, &is_pending);
                partials.push((node.key.clone(), resolution.value));
                stalled.push(node.key.clone());
            }
            for (key, value) in partials {
                view.set(key, value);
            }
            report.unresolved = Some(UnresolvableReference { keys: stalled });
        }

        debug!(
            "event=propagate module=derive status={} nodes={} passes={} unresolved={}",
            if report.is_fixed_point() { "ok" } else { "stalled" },
            self.nodes.len(),
            report.passes,
            report.unresolved_keys().len()
        );

        report
    }
}

/// Builds the initial graph for a freshly loaded namespace.
///
/// Rows without references are written straight into `view`; rows with
/// references become graph nodes for [`DependencyGraph::settle`].
pub fn classify_rows(rows: Vec<MetadataRow>, view: &mut ResolvedView) -> DependencyGraph {
    let mut derived = Vec::new();
    for row in rows {
        let is_derived = row.value.as_text().is_some_and(has_references);
        if is_derived {
            derived.push(row);
        } else {
            view.set(row.key, row.value);
        }
    }
    DependencyGraph::build(derived)
}

/// Collects every entry affected by a change to `changed_key`.
///
/// Walks dependents breadth-first through
/// [`MetadataRepository::find_by_reference_to`], discarding rows that do not
/// actually reference the key being expanded. `changed_raw` is the new raw
/// value of `changed_key`, or `None` when the key is being deleted; in the
/// latter case the key never joins the graph even if a cycle leads back to it.
pub fn collect_affected<R: MetadataRepository + ?Sized>(
    repo: &R,
    app: &str,
    changed_key: &str,
    changed_raw: Option<&MetadataValue>,
) -> RepoResult<DependencyGraph> {
    let mut rows = Vec::new();
    let mut visited = HashSet::from([changed_key.to_string()]);
    let mut queue = VecDeque::from([changed_key.to_string()]);

    if let Some(raw) = changed_raw {
        rows.push(MetadataRow::new(changed_key, raw.clone()));
    }

    while let Some(key) = queue.pop_front() {
        for row in repo.find_by_reference_to(app, &key)? {
            if visited.contains(&row.key) {
                continue;
            }
            let Some(text) = row.value.as_text() else {
                continue;
            };
            if !references_key(text, &key) {
                continue;
            }
            visited.insert(row.key.clone());
            queue.push_back(row.key.clone());
            rows.push(row);
        }
    }

    Ok(DependencyGraph::build(rows))
}

/// Discovers the entries affected by `changed_key` and settles them into
/// `view` in one call.
///
/// Combined form for embedders driving their own view. `AppMetadata` calls
/// [`collect_affected`] and [`DependencyGraph::settle_with`] separately so
/// the store write can sit between discovery and settlement.
///
/// The caller is responsible for having already applied the change itself to
/// the repository and, for deletes, removed the key from `view`.
pub fn propagate<R: MetadataRepository + ?Sized>(
    repo: &R,
    app: &str,
    changed_key: &str,
    changed_raw: Option<&MetadataValue>,
    view: &mut ResolvedView,
) -> RepoResult<Propagation> {
    let graph = collect_affected(repo, app, changed_key, changed_raw)?;
    Ok(graph.settle(view))
}
