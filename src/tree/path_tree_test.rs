use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::path_tree::split_path;
use super::*;

/// Every reachable non-root node holds a value or has children.
fn assert_no_garbage(node: &Node) {
    for (segment, child) in node.children() {
        assert_eq!(segment, child.segment());
        assert!(
            child.has_value() || child.count() > 0,
            "garbage node {:?} left reachable",
            segment
        );
        assert_no_garbage(child);
    }
}

fn listing(
    root: &Node,
    prefix: &str,
) -> Vec<String> {
    let mut segments: Vec<String> = root
        .get_node(prefix)
        .map(|n| n.children().map(|(s, _)| s.to_string()).collect())
        .unwrap_or_default();
    segments.sort();
    segments
}

#[test]
fn test_split_path() {
    let cases: Vec<(&str, Vec<&str>)> = vec![
        ("", vec![]),
        ("a", vec!["a"]),
        ("/", vec!["/"]),
        ("a/b", vec!["a/", "b"]),
        ("a/b/", vec!["a/", "b/"]),
        ("a//b/c", vec!["a//", "b/", "c"]),
        ("a/b//", vec!["a/", "b//"]),
        ("/a", vec!["/a"]),
        ("/a/b", vec!["/a/", "b"]),
        ("//a//b//", vec!["//a//", "b//"]),
        ("///", vec!["///"]),
    ];
    for (i, (input, expected)) in cases.into_iter().enumerate() {
        assert_eq!(split_path(input), expected, "case {} {:?}", i, input);
    }
}

#[test]
fn test_split_path_never_yields_empty_segments() {
    for input in ["///", "a///", "x/y//z", "/"] {
        assert!(split_path(input).iter().all(|s| !s.is_empty()), "{:?}", input);
        assert_eq!(split_path(input).concat(), input);
    }
}

#[test]
fn test_add_delete() {
    let mut n = Node::new("");
    n.add_node("a", None);
    n.add_node("a/b", None);
    n.add_node("a/c", None);
    n.add_node("a/d/e/", None);
    n.add_node("a/d/f", None);
    n.add_node("/a/e", None);
    assert_eq!(n.count(), 3, "wrong root size");
    assert_eq!(n.get_node("a/").map(Node::count), Some(3), "wrong a/ size");
    assert_eq!(n.get_node("a/b").map(Node::count), Some(0), "wrong a/b size");
    assert_eq!(n.get_node("/a/").map(Node::count), Some(1), "wrong /a/ size");
    assert_eq!(n.get_node("a/d/").map(Node::count), Some(2), "wrong a/d/ size");
    assert!(!n.get_node("a/d/").unwrap().has_value(), "wrong a/d hasValue");
    assert!(n.get_node("a/d/e/").unwrap().has_value(), "wrong a/d/e/ hasValue");
    assert_eq!(n.get_node("a/b").unwrap().segment(), "b");
    assert_eq!(n.get_node("a/c").unwrap().segment(), "c");
    assert_eq!(n.get_node("a/d/").unwrap().segment(), "d/");
    assert_eq!(n.get_node("a/d/e/").unwrap().segment(), "e/");
    assert_eq!(n.get_node("a/d/f").unwrap().segment(), "f");
    assert_eq!(n.get_node("/a/e").unwrap().segment(), "e");
    assert!(n.get_node("a/e").is_none(), "a/e expected to not exist");

    n.delete_node("a/d/e/");
    assert!(n.get_node("a/d/e/").is_none(), "a/d/e/ expected to be gone");
    assert_eq!(n.get_node("a/d/f").unwrap().segment(), "f");
    n.delete_node("a/d/f");
    assert!(n.get_node("a/d/f").is_none(), "a/d/f expected to be gone");
    assert!(n.get_node("a/d/").is_none(), "a/d/ expected to be gone");
    assert_eq!(n.get_node("a/b").unwrap().segment(), "b");
    assert_no_garbage(&n);
}

#[test]
fn test_add_empty_path_marks_root() {
    let mut n = Node::new("");
    n.add_node("", None);
    assert!(n.has_value());
    assert_eq!(n.count(), 0);

    n.delete_node("");
    assert!(!n.has_value());
}

#[test]
fn test_add_is_idempotent_and_refreshes_lease() {
    let mut n = Node::new("");
    n.add_node("x/y", Some(7));
    let before = n.clone();
    n.add_node("x/y", Some(7));
    assert_eq!(before, n);

    n.add_node("x/y", None);
    assert_eq!(n.get_node("x/y").unwrap().lease_id(), None);
    n.add_node("x/y", Some(0));
    assert_eq!(n.get_node("x/y").unwrap().lease_id(), None);
    n.add_node("x/y", Some(9));
    assert_eq!(n.get_node("x/y").unwrap().lease_id(), Some(9));
}

#[test]
fn test_listing_scenario() {
    let mut n = Node::new("");
    n.add_node("a/b", None);
    n.add_node("a/c", None);
    assert_eq!(listing(&n, "a/"), vec!["b", "c"]);

    n.delete_node("a/b");
    assert_eq!(listing(&n, "a/"), vec!["c"]);

    n.delete_node("a/c");
    assert!(listing(&n, "a/").is_empty());
    assert!(n.get_node("a/").is_none());
    assert_eq!(n.count(), 0);
}

#[test]
fn test_delete_absent_path_is_noop() {
    let mut n = Node::new("");
    n.add_node("a/b/c", None);
    n.add_node("q", None);
    let before = n.clone();

    n.delete_node("a/b/x");
    n.delete_node("a/x/c");
    n.delete_node("zzz");
    n.delete_node("a/b/c/d");
    assert_eq!(before, n);
}

#[test]
fn test_delete_intermediate_without_value_is_noop_for_children() {
    let mut n = Node::new("");
    n.add_node("a/b/c", None);
    let before = n.clone();

    // "a/b/" exists only as an ancestor; there is no value to remove
    n.delete_node("a/b/");
    assert_eq!(before, n);
}

#[test]
fn test_delete_key_with_descendants_keeps_descendants() {
    let mut n = Node::new("");
    n.add_node("a/", None);
    n.add_node("a/b", None);

    n.delete_node("a/");
    let a = n.get_node("a/").expect("a/ must survive as an ancestor");
    assert!(!a.has_value());
    assert!(n.get_node("a/b").unwrap().has_value());
    assert_no_garbage(&n);
}

#[test]
fn test_pruning_stops_at_needed_ancestor() {
    let mut n = Node::new("");
    n.add_node("p/q/r/s/t", None);
    n.add_node("p/q/other", None);
    n.add_node("p/sibling", None);

    n.delete_node("p/q/r/s/t");
    assert!(n.get_node("p/q/r/").is_none());
    let q = n.get_node("p/q/").unwrap();
    assert_eq!(q.count(), 1);
    assert!(n.get_node("p/q/other").is_some());
    assert!(n.get_node("p/sibling").is_some());
    assert_no_garbage(&n);
}

#[test]
fn test_pruning_stops_at_valued_ancestor() {
    let mut n = Node::new("");
    n.add_node("k/", None);
    n.add_node("k/l/m/n", None);

    n.delete_node("k/l/m/n");
    let k = n.get_node("k/").unwrap();
    assert!(k.has_value());
    assert_eq!(k.count(), 0);
    assert_no_garbage(&n);
}

#[test]
fn test_deep_repeated_prefix_deletions() {
    let mut n = Node::new("");
    n.add_node("r/r/r/r", None);
    n.add_node("r/r/", None);
    n.add_node("r/r/r/x", None);

    n.delete_node("r/r/r/r");
    assert!(n.get_node("r/r/r/x").is_some());
    assert!(n.get_node("r/r/r/r").is_none());

    n.delete_node("r/r/r/x");
    assert!(n.get_node("r/r/r/").is_none());
    assert!(n.get_node("r/r/").unwrap().has_value());

    n.delete_node("r/r/");
    assert_eq!(n.count(), 0);
    assert_no_garbage(&n);
}

#[test]
fn test_separator_runs_form_one_edge() {
    let mut n = Node::new("");
    n.add_node("a//b", None);
    n.add_node("a/c//", None);
    n.add_node("//lead/x", None);

    assert_eq!(listing(&n, ""), vec!["//lead/", "a/", "a//"]);
    assert_eq!(listing(&n, "a//"), vec!["b"]);
    assert_eq!(listing(&n, "a/"), vec!["c//"]);
    assert_eq!(listing(&n, "//lead/"), vec!["x"]);
    // no lone separator edge anywhere
    assert!(n.get_node("a/").unwrap().children().all(|(s, _)| s != "/"));
    assert!(n.get_node("a//b").unwrap().has_value());
    assert!(n.get_node("a/c//").unwrap().has_value());

    n.delete_node("a//b");
    assert!(n.get_node("a//").is_none());
    assert!(n.get_node("a/c//").is_some());
    assert_no_garbage(&n);
}

#[test]
fn test_is_descendant_follows_segments() {
    assert!(is_descendant("a/b", "a/"));
    assert!(is_descendant("a//b", "a//"));
    assert!(!is_descendant("a//b", "a/"));
    assert!(!is_descendant("svc/a", "svc"));
    assert!(!is_descendant("a/", "a/"));
    assert!(is_descendant("x", ""));
}

#[test]
fn test_sweep_leases_short_circuits_expired_subtrees() {
    let mut n = Node::new("");
    n.add_node("lock/", Some(1));
    n.add_node("lock/holder", Some(2));
    n.add_node("lock/holder/meta", None);
    n.add_node("cfg/a", Some(3));
    n.add_node("cfg/b", None);

    let mut asked = Vec::new();
    let mut removed = n.sweep_leases(|lease| {
        asked.push(lease);
        lease == 1 || lease == 3
    });
    removed.sort();
    assert_eq!(removed, vec!["cfg/a", "lock/", "lock/holder", "lock/holder/meta"]);
    assert!(!asked.contains(&2), "descended into an expired subtree");
    assert!(n.get_node("lock/").is_none());
    assert!(n.get_node("cfg/b").is_some());
    assert_no_garbage(&n);
}

#[test]
fn test_leased_keys() {
    let mut n = Node::new("");
    n.add_node("a", Some(11));
    n.add_node("b/c", Some(12));
    n.add_node("b/d", None);
    let mut leased = n.leased_keys();
    leased.sort();
    assert_eq!(leased, vec![("a".to_string(), 11), ("b/c".to_string(), 12)]);
}

#[test]
fn test_round_trip_returns_terminal_segment() {
    let mut n = Node::new("");
    for path in ["a", "a/b", "/x//y", "deep/er/and/deeper/", "//", "m/n/"] {
        let added = n.add_node(path, None).segment().to_string();
        let last = *split_path(path).last().unwrap();
        assert_eq!(added, last);
        assert_eq!(n.get_node(path).unwrap().segment(), last);
    }
}

#[test]
fn test_random_sequences_preserve_invariant() {
    let alphabet = ["a", "b", "/", "c/", "a/", "/b"];
    let mut rng = StdRng::seed_from_u64(0x6d69_7272);
    for _ in 0..200 {
        let mut n = Node::new("");
        let mut live = std::collections::BTreeSet::new();
        for _ in 0..60 {
            let len = rng.gen_range(1..5);
            let path: String = (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect();
            if rng.gen_bool(0.55) {
                n.add_node(&path, None);
                live.insert(path);
            } else {
                n.delete_node(&path);
                live.remove(&path);
            }
            assert_no_garbage(&n);
        }
        for path in &live {
            assert!(n.get_node(path).is_some_and(Node::has_value), "{:?} lost", path);
        }
        let mut remaining = Vec::new();
        n.collect_keys(&mut String::new(), &mut remaining);
        remaining.sort();
        let expected: Vec<String> = live.into_iter().collect();
        assert_eq!(remaining, expected);
    }
}
