// Integration tests for constellation_api::steal_pool

use constellation_api::StealPool;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_merge_with_world_is_world() {
    let a = StealPool::tag("a");
    assert_eq!(StealPool::merge(&[a.clone(), StealPool::World]), StealPool::World);
    assert_eq!(StealPool::merge(&[StealPool::World, StealPool::None]), StealPool::World);
}

#[test]
fn test_merge_is_idempotent() {
    let a = StealPool::tag("a");
    assert_eq!(StealPool::merge(&[a.clone(), a.clone()]), a);

    let set = StealPool::set(["a", "b"]);
    assert_eq!(StealPool::merge(&[set.clone(), set.clone()]), set);
}

#[test]
fn test_merge_drops_none() {
    assert_eq!(StealPool::merge(&[]), StealPool::None);
    assert_eq!(StealPool::merge(&[StealPool::None, StealPool::None]), StealPool::None);
    assert_eq!(StealPool::merge(&[StealPool::None, StealPool::tag("a")]), StealPool::tag("a"));
}

#[test]
fn test_merge_unions_tags() {
    let merged = StealPool::merge(&[StealPool::tag("b"), StealPool::set(["a", "c"]), StealPool::tag("a")]);
    assert_eq!(merged, StealPool::set(["a", "b", "c"]));
    assert_eq!(merged.tags(), ["a", "b", "c"]);
}

#[test]
fn test_overlap() {
    let none = StealPool::None;
    let world = StealPool::World;
    let a = StealPool::tag("a");
    let ab = StealPool::set(["a", "b"]);
    let c = StealPool::tag("c");

    assert!(!none.overlap(&world));
    assert!(!world.overlap(&none));
    assert!(!none.overlap(&none));
    assert!(world.overlap(&a));
    assert!(a.overlap(&world));
    assert!(a.overlap(&ab));
    assert!(ab.overlap(&a));
    assert!(!ab.overlap(&c));
}

#[test]
fn test_set_is_order_independent() {
    assert_eq!(StealPool::set(["b", "a"]), StealPool::set(["a", "b", "a"]));
    assert!(StealPool::set(["b", "a"]).is_set());
}

#[test]
fn test_random_select() {
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(StealPool::World.random_select_with(&mut rng), StealPool::World);
    assert_eq!(StealPool::None.random_select_with(&mut rng), StealPool::None);
    assert_eq!(StealPool::tag("a").random_select_with(&mut rng), StealPool::tag("a"));

    let set = StealPool::set(["a", "b", "c"]);
    let mut seen = std::collections::HashSet::new();
    for _ in 0..200 {
        match set.random_select_with(&mut rng) {
            StealPool::Tag(name) => {
                seen.insert(name);
            }
            other => panic!("expected a single tag, got {}", other),
        }
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_display() {
    assert_eq!(StealPool::None.to_string(), "NONE");
    assert_eq!(StealPool::World.to_string(), "WORLD");
    assert_eq!(StealPool::tag("a").to_string(), "a");
    assert_eq!(StealPool::set(["b", "a"]).to_string(), "{a, b}");
}
