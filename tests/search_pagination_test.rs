//! Integration tests for run search: filters, ordering, pagination
//!
//! Seeds a store with a grid of runs and walks the search surface end to
//! end, including the exhaustive-pagination guarantee: for any page size,
//! walking tokens until exhaustion visits every matching run exactly once.

use rastro_db::entities::{Metric, Param, RunStatus, RunTag, ViewType};
use rastro_db::search::SEARCH_MAX_RESULTS_THRESHOLD;
use rastro_db::{Error, SqliteStore};
use std::collections::HashSet;

/// Ten runs with acc = i/10, opt alternating sgd/adam, distinct start times.
fn seeded_store() -> (SqliteStore, String) {
    let store = SqliteStore::open_in_memory().unwrap();
    let exp_id = store.create_experiment("grid", None).unwrap();

    for i in 0..10i64 {
        let run = store
            .create_run(&exp_id, "ada", 1000 + i, vec![RunTag::new("parity", (i % 2).to_string())])
            .unwrap();
        let run_id = &run.info.run_id;
        #[allow(clippy::cast_precision_loss)]
        store
            .log_metric(run_id, Metric::new("acc", i as f64 / 10.0, 100, 0))
            .unwrap();
        let opt = if i % 2 == 0 { "sgd" } else { "adam" };
        store.log_param(run_id, Param::new("opt", opt)).unwrap();
        if i == 9 {
            store
                .update_run_info(run_id, RunStatus::Finished, Some(2000 + i))
                .unwrap();
        }
    }
    (store, exp_id)
}

fn collect_all_pages(
    store: &SqliteStore,
    exp_id: &str,
    filter: Option<&str>,
    max_results: usize,
) -> Vec<String> {
    let mut ids = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = store
            .search_runs(
                &[exp_id],
                filter,
                ViewType::ActiveOnly,
                max_results,
                &[],
                token.as_deref(),
            )
            .unwrap();
        ids.extend(page.runs.into_iter().map(|r| r.info.run_id));
        match page.next_page_token {
            Some(t) => token = Some(t),
            None => break,
        }
    }
    ids
}

#[test]
fn test_pagination_is_exhaustive_and_duplicate_free() {
    let (store, exp_id) = seeded_store();
    for page_size in [1, 2, 3, 7, 10, 11] {
        let ids = collect_all_pages(&store, &exp_id, None, page_size);
        assert_eq!(ids.len(), 10, "page size {page_size} lost or repeated runs");
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), 10);
    }
}

#[test]
fn test_pagination_preserves_order_across_pages() {
    let (store, exp_id) = seeded_store();
    let paged = collect_all_pages(&store, &exp_id, None, 3);
    let whole = collect_all_pages(&store, &exp_id, None, 100);
    assert_eq!(paged, whole);
}

#[test]
fn test_filtered_pagination() {
    let (store, exp_id) = seeded_store();
    let ids = collect_all_pages(&store, &exp_id, Some("metrics.acc >= 0.5"), 2);
    assert_eq!(ids.len(), 5);
}

#[test]
fn test_metric_and_param_conjunction() {
    let (store, exp_id) = seeded_store();
    let page = store
        .search_runs(
            &[&exp_id],
            Some("metrics.acc >= 0.5 AND params.opt = 'adam'"),
            ViewType::ActiveOnly,
            100,
            &[],
            None,
        )
        .unwrap();
    // Odd i in 5..10: 5, 7, 9
    assert_eq!(page.runs.len(), 3);
    for run in &page.runs {
        assert_eq!(run.param("opt"), Some("adam"));
        assert!(run.latest_metric("acc").unwrap().value >= 0.5);
    }
}

#[test]
fn test_tag_filter() {
    let (store, exp_id) = seeded_store();
    let page = store
        .search_runs(
            &[&exp_id],
            Some("tags.parity = '0'"),
            ViewType::ActiveOnly,
            100,
            &[],
            None,
        )
        .unwrap();
    assert_eq!(page.runs.len(), 5);
}

#[test]
fn test_attribute_filters() {
    let (store, exp_id) = seeded_store();

    let page = store
        .search_runs(
            &[&exp_id],
            Some("attributes.status = 'FINISHED'"),
            ViewType::ActiveOnly,
            100,
            &[],
            None,
        )
        .unwrap();
    assert_eq!(page.runs.len(), 1);
    assert_eq!(page.runs[0].info.status, RunStatus::Finished);

    let page = store
        .search_runs(
            &[&exp_id],
            Some("attributes.start_time >= 1005"),
            ViewType::ActiveOnly,
            100,
            &[],
            None,
        )
        .unwrap();
    assert_eq!(page.runs.len(), 5);
}

#[test]
fn test_order_by_metric_with_direction() {
    let (store, exp_id) = seeded_store();

    let page = store
        .search_runs(
            &[&exp_id],
            None,
            ViewType::ActiveOnly,
            100,
            &["metrics.acc ASC"],
            None,
        )
        .unwrap();
    let values: Vec<f64> = page
        .runs
        .iter()
        .map(|r| r.latest_metric("acc").unwrap().value)
        .collect();
    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);
    assert_eq!(values, sorted);

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
    let mut sorted = values.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(values, sorted);
}

#[test]
fn test_order_by_param_groups_then_tiebreaks_by_recency() {
    let (store, exp_id) = seeded_store();
    let page = store
        .search_runs(
            &[&exp_id],
            None,
            ViewType::ActiveOnly,
            100,
            &["params.opt ASC"],
            None,
        )
        .unwrap();
    let opts: Vec<&str> = page.runs.iter().map(|r| r.param("opt").unwrap()).collect();
    assert_eq!(&opts[..5], &["adam"; 5]);
    assert_eq!(&opts[5..], &["sgd"; 5]);
    // Within a group, newer runs first
    let adam_times: Vec<i64> = page.runs[..5].iter().map(|r| r.info.start_time).collect();
    assert!(adam_times.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn test_page_token_from_one_query_shape_reused_with_another() {
    let (store, exp_id) = seeded_store();
    // Tokens carry only an offset; changing the filter between pages is the
    // caller's problem but must not error.
    let page = store
        .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 4, &[], None)
        .unwrap();
    let token = page.next_page_token.unwrap();
    let page = store
        .search_runs(
            &[&exp_id],
            Some("metrics.acc >= 0.0"),
            ViewType::ActiveOnly,
            4,
            &[],
            Some(&token),
        )
        .unwrap();
    assert!(!page.runs.is_empty());
}

#[test]
fn test_max_results_ceiling_and_bad_token() {
    let (store, exp_id) = seeded_store();
    assert!(matches!(
        store.search_runs(
            &[&exp_id],
            None,
            ViewType::ActiveOnly,
            SEARCH_MAX_RESULTS_THRESHOLD + 1,
            &[],
            None,
        ),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        store.search_runs(
            &[&exp_id],
            None,
            ViewType::ActiveOnly,
            10,
            &[],
            Some("garbage-token"),
        ),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_search_empty_experiment() {
    let store = SqliteStore::open_in_memory().unwrap();
    let exp_id = store.create_experiment("empty", None).unwrap();
    let page = store
        .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 10, &[], None)
        .unwrap();
    assert!(page.runs.is_empty());
    assert!(page.next_page_token.is_none());
}
