use nori_knn::{
    brute_force_index, BoundedNeighborSet, FnSpace, InsertOutcome, KnnGraphConfig, NeighborTable,
    NnDescent, PointId, UNBOUNDED,
};
use proptest::prelude::*;

// Strategy: (distance, id) offers with plenty of repeated ids and distances
fn arb_offers() -> impl Strategy<Value = Vec<(f64, PointId)>> {
    prop::collection::vec(((0u32..50).prop_map(|d| d as f64 / 4.0), 0u32..40), 0..200)
}

fn arb_points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 2..40)
}

proptest! {
    #[test]
    fn test_property_bounded_set(k in 1usize..12, offers in arb_offers()) {
        let mut set = BoundedNeighborSet::new(k);

        for (distance, id) in offers {
            let before = set.worst_distance();
            let was_held = set.contains(id);
            let outcome = set.try_insert(distance, id);

            prop_assert!(set.len() <= k);
            match outcome {
                InsertOutcome::Rejected => {
                    prop_assert!(was_held || (set.is_full() && distance >= before));
                }
                InsertOutcome::Added => {
                    prop_assert!(!was_held);
                }
                InsertOutcome::Replaced { evicted } => {
                    prop_assert!(!was_held);
                    prop_assert!(distance < evicted.distance);
                    prop_assert!(!set.contains(evicted.id));
                }
            }
            prop_assert!(set.worst_distance() <= before);

            let sorted = set.to_sorted();
            let mut ids: Vec<PointId> = sorted.iter().map(|e| e.id).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), sorted.len());
            prop_assert!(sorted.windows(2).all(|w| w[0].distance <= w[1].distance));
            prop_assert_eq!(set.to_sorted(), sorted.clone());

            if set.is_full() {
                let last = sorted.last().map(|e| e.distance);
                prop_assert_eq!(Some(set.worst_distance()), last);
            } else {
                prop_assert_eq!(set.worst_distance(), UNBOUNDED);
            }
        }
    }

    #[test]
    fn test_property_new_flags_subset_of_held(k in 1usize..6, offers in arb_offers()) {
        let table = NeighborTable::new(1, k);
        for (i, (distance, id)) in offers.into_iter().enumerate() {
            if id == 0 {
                continue;
            }
            table.try_insert(0, distance, id);
            if i % 7 == 0 {
                table.clear_new(0);
            } else if i % 5 == 0 {
                table.unmark_new(0, id);
            } else if i % 3 == 0 {
                table.mark_new(0, id + 1);
            }

            let node = table.lock(0);
            let (new_ids, old_ids) = node.snapshot_new_and_old();
            prop_assert_eq!(new_ids.len() + old_ids.len(), node.set().len());
            for id in new_ids {
                prop_assert!(node.set().contains(id));
                prop_assert!(!old_ids.contains(&id));
            }
        }
    }

    #[test]
    fn test_property_index_well_formed(
        points in arb_points(),
        k in 1usize..8,
        seed in any::<u64>(),
    ) {
        let n = points.len();
        let space = FnSpace::new(n, |a, b| {
            let (pa, pb) = (points[a as usize], points[b as usize]);
            Ok(((pa.0 - pb.0).powi(2) + (pa.1 - pb.1).powi(2)).sqrt())
        });

        let config = KnnGraphConfig::new(k).with_seed(seed);
        let index = NnDescent::new(config).unwrap().build(&space).unwrap();
        let exact = brute_force_index(&space, k).unwrap();

        prop_assert_eq!(index.len(), n);
        for (p, list) in index.iter() {
            prop_assert_eq!(list.len(), k.min(n - 1));
            prop_assert!(list.iter().all(|e| e.id != p && (e.id as usize) < n));
            prop_assert!(list.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(index.knn_distance(p).unwrap() >= exact.knn_distance(p).unwrap());
        }
    }
}
