use hybench_core::model::{Document, ExpectedPages, RankedList};
use hybench_core::page::PageScheme;
use hybench_search::eval::{AccuracySummary, Evaluator};
use hybench_search::fusion::{rrf_contribution, rrf_fuse};
use proptest::prelude::*;
use std::collections::HashSet;

fn ids_to_list(ids: &[String]) -> RankedList {
    RankedList::from_documents(ids.iter().map(|id| Document::new(id.as_str())))
}

/// Ranked list over a small id space so lists overlap often.
fn arb_list(prefix: &'static str) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(0u8..20, 0..15).prop_map(move |raw| {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|n| seen.insert(*n))
            .map(|n| format!("{prefix}{n}_pages_{}", n % 7))
            .collect()
    })
}

fn arb_expected() -> impl Strategy<Value = ExpectedPages> {
    prop::collection::btree_set(1u8..8, 1..4)
        .prop_map(|pages| ExpectedPages::from_tokens(pages.iter().map(ToString::to_string)))
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn disjoint_lists_score_by_single_rank(a in arb_list("lex"), b in arb_list("vec")) {
        let fused = rrf_fuse(&[ids_to_list(&a), ids_to_list(&b)], 60);
        prop_assert_eq!(fused.len(), a.len() + b.len());
        for (id, score) in &fused {
            let rank = a
                .iter()
                .position(|x| x == id)
                .or_else(|| b.iter().position(|x| x == id))
                .map(|idx| idx + 1);
            prop_assert!(rank.is_some());
            prop_assert!((score - rrf_contribution(rank.unwrap_or(0), 60)).abs() < 1e-12);
        }
    }

    #[test]
    fn self_fusion_doubles_scores_and_keeps_order(a in arb_list("d")) {
        let list = ids_to_list(&a);
        let single = rrf_fuse(std::slice::from_ref(&list), 60);
        let double = rrf_fuse(&[list.clone(), list], 60);

        let single_order: Vec<&str> = single.iter().map(|(id, _)| id.as_str()).collect();
        let double_order: Vec<&str> = double.iter().map(|(id, _)| id.as_str()).collect();
        prop_assert_eq!(&single_order, &double_order);
        let input_order: Vec<&str> = a.iter().map(String::as_str).collect();
        prop_assert_eq!(single_order, input_order);

        for ((_, s), (_, d)) in single.iter().zip(&double) {
            prop_assert!((d - 2.0 * s).abs() < 1e-12);
        }
    }

    #[test]
    fn fusion_is_deterministic(a in arb_list("d"), b in arb_list("d"), k in 1u32..200) {
        let lists = [ids_to_list(&a), ids_to_list(&b)];
        prop_assert_eq!(rrf_fuse(&lists, k), rrf_fuse(&lists, k));
    }

    #[test]
    fn fused_scores_are_non_increasing(a in arb_list("d"), b in arb_list("d")) {
        let fused = rrf_fuse(&[ids_to_list(&a), ids_to_list(&b)], 60);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
        }
        let unique: HashSet<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        prop_assert_eq!(unique.len(), fused.len());
    }

    #[test]
    fn a_match_stays_a_match_at_larger_cutoffs(
        ranking in arb_list("d"),
        expected in arb_expected(),
    ) {
        let evaluator = Evaluator::new(PageScheme::default(), vec![1, 3, 5, 10, 25])
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let docs = ids_to_list(&ranking).into_documents();
        let results = evaluator.score(&expected, &docs);
        for pair in results.windows(2) {
            prop_assert!(!pair[0].matched || pair[1].matched);
        }
        for result in &results {
            prop_assert!((0.0..=1.0).contains(&result.ndcg));
            prop_assert!(result.pages.len() <= result.k);
        }
    }

    #[test]
    fn accuracy_is_bounded_and_monotone(
        rankings in prop::collection::vec((arb_list("d"), arb_expected()), 0..12),
    ) {
        let cutoffs = vec![1, 5, 10];
        let evaluator = Evaluator::new(PageScheme::default(), cutoffs.clone())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let records: Vec<_> = rankings
            .into_iter()
            .enumerate()
            .map(|(row, (ranking, expected))| {
                evaluator.evaluate(
                    hybench_core::model::QueryKey::for_row("prop.csv", row),
                    Some(row),
                    "q",
                    expected,
                    &ids_to_list(&ranking).into_documents(),
                    false,
                )
            })
            .collect();

        let summary = AccuracySummary::from_records(&records, &cutoffs, 0, 0);
        let mut previous = 0.0;
        for cutoff in &summary.cutoffs {
            prop_assert!((0.0..=1.0).contains(&cutoff.accuracy));
            prop_assert!(cutoff.accuracy >= previous);
            previous = cutoff.accuracy;
        }
    }
}
