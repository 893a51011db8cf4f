use indexmap::IndexMap;
use nao::runtime::{Context, NamespaceRegistry, RetvalBag, RuntimeError, Value};
use proptest::prelude::*;
use std::collections::HashSet;
use std::rc::Rc;

fn arb_entries() -> impl Strategy<Value = IndexMap<String, Value>> {
    prop::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..5).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(k, v)| (k, Value::Integer(v)))
            .collect()
    })
}

#[test]
fn test_default_entry_needs_exactly_one() {
    let empty = RetvalBag::new(IndexMap::new()).unwrap();
    assert!(matches!(empty.get(None), Err(RuntimeError::MalformedBag(_))));

    let two = RetvalBag::from_pairs([
        ("a".to_string(), Value::Integer(1)),
        ("b".to_string(), Value::Integer(2)),
    ])
    .unwrap();
    assert!(matches!(two.get(None), Err(RuntimeError::MalformedBag(_))));

    let one = RetvalBag::from_pairs([("a".to_string(), Value::Integer(1))]).unwrap();
    assert_eq!(one.get(None).unwrap(), &Value::Integer(1));
}

#[test]
fn test_bags_do_not_nest() {
    let inner = RetvalBag::from_pairs([("a".to_string(), Value::Nil)]).unwrap();
    let err = RetvalBag::from_pairs([("outer".to_string(), Value::Bag(inner))]).unwrap_err();
    assert!(matches!(err, RuntimeError::MalformedBag(_)));
}

proptest! {
    #[test]
    fn default_entry_exists_iff_single(entries in arb_entries()) {
        let len = entries.len();
        let bag = RetvalBag::new(entries.clone()).unwrap();
        prop_assert_eq!(bag.length(), len);
        prop_assert_eq!(bag.get(None).is_ok(), len == 1);
        for (key, value) in &entries {
            prop_assert_eq!(bag.get(Some(key.as_str())).unwrap(), value);
        }
    }

    #[test]
    fn unwrapping_a_single_entry_bag_yields_its_value(v in any::<i64>(), key in "[a-z]{1,6}") {
        let bag = RetvalBag::from_pairs([(key, Value::Integer(v))]).unwrap();
        prop_assert_eq!(Value::Bag(bag).unwrap_bag().unwrap(), Value::Integer(v));
    }

    #[test]
    fn unique_names_never_repeat_within_a_context(
        roots in prop::collection::vec(prop::sample::select(vec!["add", "mul", "f", "add_0"]), 1..40)
    ) {
        let ctx = Context::root(Rc::new(NamespaceRegistry::new()));
        let mut per_root: std::collections::HashMap<&str, usize> = Default::default();
        let mut seen = HashSet::new();
        for root in roots {
            let name = ctx.unique_name(root);
            let n = per_root.entry(root).or_insert(0);
            prop_assert_eq!(&name, &format!("{}_{}", root, n));
            *n += 1;
            seen.insert((root, name));
        }
        prop_assert_eq!(seen.len(), per_root.values().sum::<usize>());
    }
}
