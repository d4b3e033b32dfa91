//! Run search over one or more experiments

use super::SqliteStore;
use crate::entities::{Run, ViewType};
use crate::error::{Error, Result};
use crate::search::{self, RunsPage, SEARCH_MAX_RESULTS_THRESHOLD};
use crate::session::parse_experiment_id;

impl SqliteStore {
    /// Search runs across experiments with filtering, ordering, and
    /// pagination.
    ///
    /// All candidate runs are fetched eagerly in a single session; the filter
    /// string, `order_by` clauses, and page window are then applied in memory
    /// over that snapshot. Results within one page are consistent; pages are
    /// independent snapshots, and page tokens carry only an offset.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] when `max_results` exceeds the ceiling,
    /// an experiment id is malformed, the filter string or an `order_by`
    /// clause does not parse, or the page token is invalid.
    pub fn search_runs(
        &self,
        experiment_ids: &[impl AsRef<str>],
        filter_string: Option<&str>,
        view: ViewType,
        max_results: usize,
        order_by: &[&str],
        page_token: Option<&str>,
    ) -> Result<RunsPage> {
        if max_results > SEARCH_MAX_RESULTS_THRESHOLD {
            return Err(Error::InvalidParameter(format!(
                "Invalid value for request parameter max_results. It must be at most \
                 {SEARCH_MAX_RESULTS_THRESHOLD}, but got value {max_results}"
            )));
        }

        // All request parsing happens before the session opens.
        let clauses = search::parse_filter(filter_string.unwrap_or(""))?;
        let order_clauses = order_by
            .iter()
            .map(|c| search::parse_order_by(c))
            .collect::<Result<Vec<_>>>()?;
        let offset = page_token.map_or(Ok(0), search::decode_page_token)?;
        let ids = experiment_ids
            .iter()
            .map(|id| parse_experiment_id(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut runs = self.with_session(|session| session.list_runs(&ids, view))?;

        runs.retain(|run| clauses.iter().all(|c| c.matches(run)));
        search::sort_runs(&mut runs, &order_clauses);
        Ok(search::paginate(runs, offset, max_results))
    }

    /// List runs of a single experiment in the default ordering.
    ///
    /// Convenience wrapper over [`SqliteStore::search_runs`] with no filter.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteStore::search_runs`].
    pub fn list_runs(&self, experiment_id: &str, view: ViewType) -> Result<Vec<Run>> {
        let page = self.search_runs(
            &[experiment_id],
            None,
            view,
            SEARCH_MAX_RESULTS_THRESHOLD,
            &[],
            None,
        )?;
        Ok(page.runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Metric, Param, RunTag};

    fn seeded_store() -> (SqliteStore, String) {
        let store = SqliteStore::open_in_memory().unwrap();
        let exp_id = store.create_experiment("search-exp", None).unwrap();

        for (i, (acc, opt)) in [(0.5, "sgd"), (0.9, "adam"), (0.7, "adam")]
            .iter()
            .enumerate()
        {
            let run = store
                .create_run(&exp_id, "ada", 1000 + i as i64, vec![])
                .unwrap();
            store
                .log_metric(&run.info.run_id, Metric::new("acc", *acc, 100, 0))
                .unwrap();
            store
                .log_param(&run.info.run_id, Param::new("opt", *opt))
                .unwrap();
            store
                .set_tag(&run.info.run_id, RunTag::new("idx", i.to_string()))
                .unwrap();
        }
        (store, exp_id)
    }

    #[test]
    fn test_search_all_runs_default_order() {
        let (store, exp_id) = seeded_store();
        let page = store
            .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 100, &[], None)
            .unwrap();
        assert_eq!(page.runs.len(), 3);
        assert!(page.next_page_token.is_none());
        // Newest first
        assert_eq!(page.runs[0].info.start_time, 1002);
        assert_eq!(page.runs[2].info.start_time, 1000);
    }

    #[test]
    fn test_search_with_metric_filter() {
        let (store, exp_id) = seeded_store();
        let page = store
            .search_runs(
                &[&exp_id],
                Some("metrics.acc > 0.6"),
                ViewType::ActiveOnly,
                100,
                &[],
                None,
            )
            .unwrap();
        assert_eq!(page.runs.len(), 2);
        assert!(page
            .runs
            .iter()
            .all(|r| r.latest_metric("acc").unwrap().value > 0.6));
    }

    #[test]
    fn test_search_with_conjunction() {
        let (store, exp_id) = seeded_store();
        let page = store
            .search_runs(
                &[&exp_id],
                Some("metrics.acc > 0.6 AND params.opt = 'adam'"),
                ViewType::ActiveOnly,
                100,
                &[],
                None,
            )
            .unwrap();
        assert_eq!(page.runs.len(), 2);
    }

    #[test]
    fn test_search_order_by_metric() {
        let (store, exp_id) = seeded_store();
        let page = store
            .search_runs(
                &[&exp_id],
                None,
                ViewType::ActiveOnly,
                100,
                &["metrics.acc DESC"],
                None,
            )
            .unwrap();
        let values: Vec<f64> = page
            .runs
            .iter()
            .map(|r| r.latest_metric("acc").unwrap().value)
            .collect();
        assert_eq!(values, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn test_search_pagination_walks_all_runs() {
        let (store, exp_id) = seeded_store();
        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store
                .search_runs(
                    &[&exp_id],
                    None,
                    ViewType::ActiveOnly,
                    2,
                    &[],
                    token.as_deref(),
                )
                .unwrap();
            seen.extend(page.runs.into_iter().map(|r| r.info.run_id));
            match page.next_page_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(seen.len(), 3);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_search_excludes_deleted_runs_by_view() {
        let (store, exp_id) = seeded_store();
        let victim = store
            .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 100, &[], None)
            .unwrap()
            .runs[0]
            .info
            .run_id
            .clone();
        store.delete_run(&victim).unwrap();

        let active = store
            .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 100, &[], None)
            .unwrap();
        assert_eq!(active.runs.len(), 2);

        let deleted = store
            .search_runs(&[&exp_id], None, ViewType::DeletedOnly, 100, &[], None)
            .unwrap();
        assert_eq!(deleted.runs.len(), 1);
        assert_eq!(deleted.runs[0].info.run_id, victim);

        let all = store
            .search_runs(&[&exp_id], None, ViewType::All, 100, &[], None)
            .unwrap();
        assert_eq!(all.runs.len(), 3);
    }

    #[test]
    fn test_search_max_results_ceiling() {
        let (store, exp_id) = seeded_store();
        let err = store
            .search_runs(
                &[&exp_id],
                None,
                ViewType::ActiveOnly,
                SEARCH_MAX_RESULTS_THRESHOLD + 1,
                &[],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_search_rejects_bad_inputs_before_fetch() {
        let (store, exp_id) = seeded_store();
        assert!(store
            .search_runs(&["zero"], None, ViewType::All, 10, &[], None)
            .is_err());
        assert!(store
            .search_runs(&[&exp_id], Some("nope"), ViewType::All, 10, &[], None)
            .is_err());
        assert!(store
            .search_runs(&[&exp_id], None, ViewType::All, 10, &["acc DESC"], None)
            .is_err());
        assert!(store
            .search_runs(&[&exp_id], None, ViewType::All, 10, &[], Some("!!"))
            .is_err());
    }

    #[test]
    fn test_search_across_experiments() {
        let (store, exp_id) = seeded_store();
        let other = store.create_experiment("other-exp", None).unwrap();
        let run = store.create_run(&other, "bob", 5000, vec![]).unwrap();

        let page = store
            .search_runs(&[&exp_id, &other], None, ViewType::ActiveOnly, 100, &[], None)
            .unwrap();
        assert_eq!(page.runs.len(), 4);
        assert_eq!(page.runs[0].info.run_id, run.info.run_id);
    }

    #[test]
    fn test_list_runs_wrapper() {
        let (store, exp_id) = seeded_store();
        let runs = store.list_runs(&exp_id, ViewType::ActiveOnly).unwrap();
        assert_eq!(runs.len(), 3);
    }
}
