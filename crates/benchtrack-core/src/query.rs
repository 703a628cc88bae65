//! Read-side access to series data
//!
//! A [`SeriesQuery`] captures the tool log at `read` time. Iterating it walks
//! that captured view lazily and hands out shared `Arc<Run>` handles, so
//! history is never copied and abandoning an iteration has no effect.

use std::sync::Arc;

use crate::model::Run;
use crate::store::{SeriesPoint, Store};

/// Query entry point over a shared store
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<Store>,
}

impl QueryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Points of `tool` filtered by benchmark name and an inclusive time
    /// range (epoch milliseconds). Without a name every run contributes its
    /// first-occurrence entries. An unknown tool yields an empty query.
    pub fn read(
        &self,
        tool: &str,
        name: Option<&str>,
        from: Option<i64>,
        to: Option<i64>,
    ) -> SeriesQuery {
        let runs = match self.store.runs(tool) {
            Some(log) => log.shared(),
            None => {
                tracing::debug!(tool, "Query on unknown tool");
                Arc::new(Vec::new())
            }
        };
        SeriesQuery {
            tool: tool.to_string(),
            name: name.map(str::to_string),
            from,
            to,
            runs,
        }
    }
}

/// A finite, restartable slice of one tool's history
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    tool: String,
    name: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
    runs: Arc<Vec<Arc<Run>>>,
}

impl SeriesQuery {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn in_range(&self, date: i64) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// Iterate from the start of the captured view
    pub fn iter(&self) -> impl Iterator<Item = SeriesPoint> + '_ {
        self.runs
            .iter()
            .enumerate()
            .filter(move |(_, run)| self.in_range(run.date))
            .flat_map(move |(run_index, run)| {
                let positions: Box<dyn Iterator<Item = usize> + '_> = match self.name.as_deref() {
                    Some(name) => Box::new(run.entry_index(name).into_iter()),
                    None => Box::new(run.representative_entries().map(|(i, _)| i)),
                };
                positions.map(move |entry_index| SeriesPoint {
                    run_index,
                    run: Arc::clone(run),
                    entry_index,
                })
            })
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommitMeta;
    use crate::normalize::RawBench;

    fn store() -> Arc<Store> {
        let store = Store::new("repo");
        let runs: [(i64, &[(&str, f64)]); 3] = [
            (100, &[("a", 1.0), ("b", 2.0)]),
            (300, &[("a", 3.0), ("a", 99.0)]),
            (200, &[("b", 4.0), ("a", 5.0)]),
        ];
        for (i, (date, benches)) in runs.iter().enumerate() {
            let raw: Vec<RawBench> = benches.iter().map(|(n, v)| RawBench::new(*n, *v)).collect();
            store
                .append(CommitMeta::new(format!("c{i}")), "go", *date, &raw)
                .unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn test_named_series_in_append_order() {
        let query = QueryService::new(store()).read("go", Some("a"), None, None);
        let values: Vec<f64> = query.iter().map(|p| p.value()).collect();
        assert_eq!(values, vec![1.0, 3.0, 5.0]);
        let commits: Vec<String> = query.iter().map(|p| p.commit().id.clone()).collect();
        assert_eq!(commits, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_inclusive_time_bounds() {
        let service = QueryService::new(store());
        let values: Vec<f64> = service
            .read("go", Some("a"), Some(200), Some(300))
            .iter()
            .map(|p| p.value())
            .collect();
        assert_eq!(values, vec![3.0, 5.0]);
        assert!(service.read("go", Some("a"), Some(301), None).is_empty());
        assert!(service.read("go", None, Some(300), Some(100)).is_empty());
    }

    #[test]
    fn test_unnamed_query_groups_by_run() {
        let query = QueryService::new(store()).read("go", None, None, None);
        let points: Vec<(usize, String, f64)> = query
            .iter()
            .map(|p| (p.run_index, p.entry().name.clone(), p.value()))
            .collect();
        assert_eq!(
            points,
            vec![
                (0, "a".to_string(), 1.0),
                (0, "b".to_string(), 2.0),
                (1, "a".to_string(), 3.0),
                (2, "b".to_string(), 4.0),
                (2, "a".to_string(), 5.0),
            ]
        );
    }

    #[test]
    fn test_query_is_restartable_and_isolated() {
        let store = store();
        let query = QueryService::new(Arc::clone(&store)).read("go", Some("b"), None, None);

        let mut first = query.iter();
        assert_eq!(first.next().map(|p| p.value()), Some(2.0));
        drop(first);

        store
            .append(CommitMeta::new("late"), "go", 400, &[RawBench::new("b", 8.0)])
            .unwrap();

        assert_eq!(query.count(), 2);
        assert_eq!(query.count(), 2);
        let fresh = QueryService::new(store).read("go", Some("b"), None, None);
        assert_eq!(fresh.count(), 3);
    }

    #[test]
    fn test_points_share_runs() {
        let store = store();
        let query = QueryService::new(Arc::clone(&store)).read("go", Some("a"), None, None);
        let point = query.iter().next().unwrap();
        let run = store.runs("go").unwrap().get(0).cloned().unwrap();
        assert!(Arc::ptr_eq(&point.run, &run));
    }

    #[test]
    fn test_unknown_tool_is_empty() {
        let query = QueryService::new(store()).read("rust", None, None, None);
        assert!(query.is_empty());
        assert_eq!(query.tool(), "rust");
    }
}
